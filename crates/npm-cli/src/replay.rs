//! Drives a loaded model through repeated fork-point crossings until the
//! third crossing with no pending IRQ (B3), the way a real symbolic-CPU
//! host's translation-block loop would.

use npm_core::{NlpPeripheralModel, RunControl};

use crate::MockCpu;

/// Crosses the configured fork point repeatedly until the model reports
/// `RunControl::Complete`. Returns the number of crossings it took.
pub fn run_until_complete(model: &mut NlpPeripheralModel, cpu: &mut MockCpu, fork_point: u64) -> u32 {
    cpu.set_pc(fork_point);
    let mut crossings = 0;
    loop {
        model.on_translate_block_start(fork_point);
        crossings += 1;
        let rc = model.on_translate_block_end(cpu, fork_point, false);
        tracing::info!(crossings, ?rc, "fork point crossed");
        if rc == RunControl::Complete {
            return crossings;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use npm_core::NpmConfig;

    const ECHO_NLP: &str = "S_0x40004000_0\nR_0x40004004_0_8\nT_0x40004008_0_8\n==\nW,*0x40004008,*,*,*&F,0x40004000,7,=,1:F,0x40004000,5,=,1;20\n==\n==\n==\n";

    #[test]
    fn completes_on_third_crossing_with_no_pending_irq() {
        let mut model = NlpPeripheralModel::load(ECHO_NLP, None, NpmConfig::default()).unwrap();
        let mut cpu = MockCpu::new(Vec::new());
        let crossings = run_until_complete(&mut model, &mut cpu, 0x1000);
        assert_eq!(crossings, 3);
    }
}
