//! A tiny in-process stand-in for the real symbolic CPU host, backing the
//! `CpuHooks` trait boundary (§6.1) for local replay and the scenario tests
//! in `npm-testing`.

use npm_core::CpuHooks;

/// Feeds a fixed byte vector through `on_buffer_input` and records every
/// interrupt the model asks the CPU to take.
pub struct MockCpu {
    pc: u64,
    replay_bytes: Vec<u8>,
    cursor: usize,
    enabled_iser: Vec<u32>,
    accept_interrupts: bool,
    pub accepted_interrupts: Vec<u32>,
}

impl MockCpu {
    pub fn new(replay_bytes: Vec<u8>) -> Self {
        Self {
            pc: 0,
            replay_bytes,
            cursor: 0,
            enabled_iser: Vec::new(),
            accept_interrupts: true,
            accepted_interrupts: Vec::new(),
        }
    }

    pub fn set_pc(&mut self, pc: u64) {
        self.pc = pc;
    }

    pub fn set_enabled_iser(&mut self, irqs: Vec<u32>) {
        self.enabled_iser = irqs;
    }

    /// Controls whether `on_external_interrupt` reports the CPU as
    /// accepting the interrupt (maps to the NVIC's own masking state).
    pub fn set_accept_interrupts(&mut self, accept: bool) {
        self.accept_interrupts = accept;
    }
}

impl CpuHooks for MockCpu {
    fn on_external_interrupt(&mut self, irq_vector: u32) -> bool {
        tracing::debug!(irq_vector, "mock cpu interrupt request");
        if self.accept_interrupts {
            self.accepted_interrupts.push(irq_vector);
        }
        self.accept_interrupts
    }

    fn on_enable_iser(&mut self) -> Vec<u32> {
        self.enabled_iser.clone()
    }

    fn on_buffer_input(&mut self, _phaddr: u32, max_len: usize) -> Vec<u8> {
        let end = (self.cursor + max_len).min(self.replay_bytes.len());
        let chunk = self.replay_bytes[self.cursor..end].to_vec();
        self.cursor = end;
        chunk
    }

    fn mem_read_u32(&mut self, _addr: u32) -> u32 {
        0
    }

    fn mem_write_u32(&mut self, _addr: u32, _value: u32) {}

    fn current_pc(&self) -> u64 {
        self.pc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_input_drains_sequentially() {
        let mut cpu = MockCpu::new(vec![1, 2, 3, 4, 5]);
        assert_eq!(cpu.on_buffer_input(0, 2), vec![1, 2]);
        assert_eq!(cpu.on_buffer_input(0, 2), vec![3, 4]);
        assert_eq!(cpu.on_buffer_input(0, 2), vec![5]);
        assert_eq!(cpu.on_buffer_input(0, 2), Vec::<u8>::new());
    }

    #[test]
    fn rejected_interrupts_are_not_recorded() {
        let mut cpu = MockCpu::new(Vec::new());
        cpu.set_accept_interrupts(false);
        assert!(!cpu.on_external_interrupt(36));
        assert!(cpu.accepted_interrupts.is_empty());
    }
}
