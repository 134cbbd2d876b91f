//! Input Feeder (§4.6): supplies RX bytes from the external input source at
//! translation-block boundaries and tracks fork-point crossings.

use crate::gateway::{RuntimeState, SpecGraph};
use crate::hooks::CpuHooks;
use crate::rules::{FlagTickMode, MmioEvent};

/// Whether the run should keep going or the harness should treat this as
/// a completed execution (B3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunControl {
    Continue,
    Complete,
}

/// `on_translate_block_start` (§6.1): fork-point detection. Sets the
/// "prime RX" flag, clears pending-interrupt state, and counts crossings.
pub fn on_translate_block_start(rt: &mut RuntimeState, fork_point: u64, pc: u64) -> RunControl {
    if pc != fork_point {
        return RunControl::Continue;
    }
    rt.prime_rx = true;
    rt.irqs.clear_pending();
    rt.fork_crossings += 1;

    if rt.fork_crossings >= 3 && !rt.irqs.pending_interrupt() {
        RunControl::Complete
    } else {
        RunControl::Continue
    }
}

/// `on_translate_block_end` (§6.1): if the prime flag is set and the CPU is
/// not currently servicing an interrupt, feeds fresh bytes to every data
/// register and runs one flag tick plus one full-scope rule evaluation.
pub fn on_translate_block_end(
    shared: &SpecGraph,
    rt: &mut RuntimeState,
    hooks: &mut dyn CpuHooks,
    interrupt_active: bool,
    max_input_len: usize,
) {
    if !rt.prime_rx || interrupt_active {
        return;
    }

    let bytes = hooks.on_buffer_input(0, max_input_len);
    let data_addrs: Vec<u32> = rt
        .store
        .iter()
        .filter(|(_, r)| r.kind.is_data())
        .map(|(&a, _)| a)
        .collect();
    for addr in data_addrs {
        rt.store.push_rx(addr, &bytes, (bytes.len() * 8) as u32);
    }

    shared.rules.update_flags(FlagTickMode::Normal, None, &mut rt.store, hooks, &mut rt.rng, &mut rt.stats);
    let candidates = shared.rules.update_graph(MmioEvent::Unknown, 0, &mut rt.store, hooks, &mut rt.stats);
    rt.irqs.emit_candidates(candidates, hooks, &mut rt.rng);

    rt.prime_rx = false;
}
