//! IRQ Arbiter (§4.4): tracks pending/in-service state per IRQ, shuffles
//! simultaneous candidates, and enforces "one outstanding per IRQ until
//! exception-exit" (I2).

use rand::seq::SliceRandom;
use std::collections::HashMap;

use crate::hooks::CpuHooks;
use crate::rng::SharedRng;

/// Per-state IRQ bookkeeping, cloned on fork (§5, §9 "State forks").
#[derive(Debug, Clone, Default)]
pub struct IrqTable {
    exit_interrupt: HashMap<u32, u32>,
    interrupt_freq: HashMap<u32, u32>,
}

impl IrqTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn pending_count(&self, irq: u32) -> u32 {
        self.exit_interrupt.get(&irq).copied().unwrap_or(0)
    }

    pub fn freq(&self, irq: u32) -> u32 {
        self.interrupt_freq.get(&irq).copied().unwrap_or(0)
    }

    pub fn is_pending(&self, irq: u32) -> bool {
        self.pending_count(irq) > 0
    }

    /// True iff any IRQ has `exit_interrupt > 0` and has been emitted fewer
    /// than 2 times (I2; the Register Store's `pending_interrupt()` in
    /// §4.2 is modeled here since it is IRQ, not register, state).
    pub fn pending_interrupt(&self) -> bool {
        self.exit_interrupt
            .iter()
            .any(|(&irq, &count)| count > 0 && self.freq(irq) < 2)
    }

    pub fn all_known_irqs(&self) -> impl Iterator<Item = u32> + '_ {
        self.interrupt_freq.keys().copied()
    }

    /// Any IRQ currently pending, used as the compliance checker's IRQ
    /// context (§4.8).
    pub fn any_pending_irq(&self) -> Option<u32> {
        self.exit_interrupt.iter().find(|&(_, &c)| c > 0).map(|(&irq, _)| irq)
    }

    /// Clears pending state for all IRQs (fork-point reset, §4.6).
    pub fn clear_pending(&mut self) {
        self.exit_interrupt.clear();
    }

    /// Takes `candidates` (IRQ numbers that fired this MMIO event), shuffles
    /// them, and emits each through `hooks` in turn. Returns the IRQs
    /// dropped because they were already pending (the "missed-enable set").
    pub fn emit_candidates(
        &mut self,
        mut candidates: Vec<u32>,
        hooks: &mut dyn CpuHooks,
        rng: &mut SharedRng,
    ) -> Vec<u32> {
        candidates.shuffle(rng.inner_mut());
        let mut dropped = Vec::new();
        for irq in candidates {
            if self.pending_count(irq) > 0 {
                dropped.push(irq);
                continue;
            }
            let vector = irq + 16;
            if hooks.on_external_interrupt(vector) {
                *self.exit_interrupt.entry(irq).or_insert(0) += 1;
                *self.interrupt_freq.entry(irq).or_insert(0) += 1;
            }
        }
        dropped
    }

    /// `on_exception_exit` (§6.1): `vector >= 16`, decrements the
    /// corresponding IRQ's pending count.
    pub fn on_exception_exit(&mut self, vector: u32) {
        if vector < 16 {
            return;
        }
        let irq = vector - 16;
        if let Some(count) = self.exit_interrupt.get_mut(&irq) {
            *count = count.saturating_sub(1);
        }
    }
}
