//! MMIO Gateway (§4.5): the read/write entry points a host CPU calls into.
//! Handles address correction, bit-band aliasing, canned responses, and
//! hands off to the Rule Engine and Statistics & Diagnosis.

use std::collections::HashMap;

use crate::compliance::ComplianceState;
use crate::hooks::CpuHooks;
use crate::rng::SharedRng;
use crate::rules::{FlagTickMode, MmioEvent, RuleGraph};
use crate::stats::{AccessDir, Statistics};
use crate::store::{bit_band_resolve, RegisterStore};
use crate::types::{CannedResponse, Constraint, RegKind};

/// The immutable parsed model: shared by reference across forked states.
#[derive(Debug, Clone, Default)]
pub struct SpecGraph {
    pub rules: RuleGraph,
    pub constraints: Vec<Constraint>,
    pub canned: Vec<CannedResponse>,
    pub sequences: Vec<crate::types::SequenceRule>,
}

/// Per-state mutable runtime, cloned on fork (§5, §9).
#[derive(Debug, Clone)]
pub struct RuntimeState {
    pub store: RegisterStore,
    pub irqs: crate::irq::IrqTable,
    pub stats: Statistics,
    pub rng: SharedRng,
    pub compliance: ComplianceState,
    /// Total MMIO events observed; flag ticks are a no-op until this
    /// exceeds 1 (§3 "Flag tick gating").
    pub rw_count: u64,
    pub first_touch: bool,
    /// DR address -> whether its block's Status register has been read
    /// since the last access to this DR (§4.7 Type 3/4).
    pub sr_authorized: HashMap<u32, bool>,
    pub prime_rx: bool,
    pub fork_crossings: u32,
    pub last_enabled_iser: Vec<u32>,
}

impl RuntimeState {
    pub fn new(rng_seed: u64) -> Self {
        Self {
            store: RegisterStore::new(),
            irqs: crate::irq::IrqTable::new(),
            stats: Statistics::new(),
            rng: SharedRng::from_seed(rng_seed),
            compliance: ComplianceState::new(),
            rw_count: 0,
            first_touch: true,
            sr_authorized: HashMap::new(),
            prime_rx: false,
            fork_crossings: 0,
            last_enabled_iser: Vec::new(),
        }
    }
}

pub struct ReadResult {
    pub value: u32,
    pub is_data: bool,
}

fn ensure_bootstrap(shared: &SpecGraph, rt: &mut RuntimeState, hooks: &mut dyn CpuHooks, seed_len: usize) {
    if !rt.first_touch {
        return;
    }
    let seed: Vec<u8> = (0..seed_len)
        .map(|i| if i % 2 == 0 { 0x2D } else { 0x00 })
        .collect();
    let addrs: Vec<u32> = rt
        .store
        .iter()
        .filter(|(_, r)| r.kind.is_data())
        .map(|(&a, _)| a)
        .collect();
    for addr in addrs {
        rt.store.push_rx(addr, &seed, (seed.len() * 8) as u32);
    }
    shared.rules.update_graph(MmioEvent::Unknown, 0, &mut rt.store, hooks, &mut rt.stats);
    rt.first_touch = false;
}

fn tick_flags_gated(shared: &SpecGraph, rt: &mut RuntimeState, hooks: &mut dyn CpuHooks, phaddr: u32) {
    if rt.rw_count <= 1 {
        return;
    }
    shared.rules.update_flags(
        FlagTickMode::Normal,
        Some(phaddr),
        &mut rt.store,
        hooks,
        &mut rt.rng,
        &mut rt.stats,
    );
}

fn mark_sr_read(shared: &SpecGraph, rt: &mut RuntimeState, sr_addr: u32) {
    for (&dr, &sr) in &shared.rules.dr_to_sr {
        if sr == sr_addr {
            rt.sr_authorized.insert(dr, true);
        }
    }
}

fn check_unauthorized(rt: &mut RuntimeState, dr_addr: u32, dir: AccessDir, pc: u64) {
    let authorized = rt.sr_authorized.get(&dr_addr).copied().unwrap_or(false);
    if !authorized {
        rt.stats.record_unauthorized(dr_addr, dir, pc);
    }
    rt.sr_authorized.insert(dr_addr, false);
}

fn pop_le(store: &mut RegisterStore, addr: u32, size: u8) -> u32 {
    let mut value: u32 = 0;
    for i in 0..size.max(1) {
        let byte = store.read_rx_byte(addr) as u32;
        value |= byte << (8 * i as u32);
    }
    value
}

/// Resolves the declared register an access targets, via bit-band aliasing
/// first and then §4.2 address correction.
fn resolve(store: &RegisterStore, phaddr: u32) -> (u32, u32, Option<u32>) {
    if let Some((word, bit)) = bit_band_resolve(phaddr) {
        if let Some(c) = store.address_correct(word) {
            return (c.phaddr, c.bit_offset, Some(bit));
        }
        return (word, 0, Some(bit));
    }
    match store.address_correct(phaddr) {
        Some(c) => (c.phaddr, c.bit_offset, None),
        None => (phaddr, 0, None),
    }
}

pub fn read(
    shared: &SpecGraph,
    rt: &mut RuntimeState,
    hooks: &mut dyn CpuHooks,
    phaddr: u32,
    size: u8,
    rx_seed_len: usize,
) -> ReadResult {
    ensure_bootstrap(shared, rt, hooks, rx_seed_len);

    let (resolved, bit_offset, _bit_band) = resolve(&rt.store, phaddr);
    rt.rw_count += 1;
    tick_flags_gated(shared, rt, hooks, resolved);

    let pc = hooks.current_pc();
    rt.stats.check_constraints(&shared.constraints, resolved, AccessDir::Read, pc);

    let kind = rt.store.get(resolved).map(|r| r.kind);
    let (value, is_data) = match kind {
        Some(k) if k.is_data() => {
            check_unauthorized(rt, resolved, AccessDir::Read, pc);
            (pop_le(&mut rt.store, resolved, size), true)
        }
        Some(RegKind::Status) => {
            mark_sr_read(shared, rt, resolved);
            (rt.store.read_ph(resolved) >> bit_offset, false)
        }
        _ => (rt.store.read_ph(resolved) >> bit_offset, false),
    };

    let irq_ctx = rt.irqs.any_pending_irq();
    rt.compliance.record(crate::types::AccessKind::FirmwareRead, resolved, value as u64, hooks.current_pc(), irq_ctx);

    let candidates = shared.rules.update_graph(MmioEvent::Read, resolved, &mut rt.store, hooks, &mut rt.stats);
    rt.irqs.emit_candidates(candidates, hooks, &mut rt.rng);

    ReadResult { value, is_data }
}

pub fn write(
    shared: &SpecGraph,
    rt: &mut RuntimeState,
    hooks: &mut dyn CpuHooks,
    phaddr: u32,
    value: u32,
    rx_seed_len: usize,
) {
    ensure_bootstrap(shared, rt, hooks, rx_seed_len);

    let (resolved, bit_offset, bit_band_bit) = resolve(&rt.store, phaddr);
    rt.rw_count += 1;
    tick_flags_gated(shared, rt, hooks, resolved);

    let pc = hooks.current_pc();
    rt.stats.check_constraints(&shared.constraints, resolved, AccessDir::Write, pc);

    let kind = rt.store.get(resolved).map(|r| r.kind);

    if let Some(bit) = bit_band_bit {
        let bitval = value & 1;
        let word = rt.store.read_ph(resolved);
        let updated = (word & !(1 << bit)) | (bitval << bit);
        rt.store.write_ph(resolved, updated);
    } else if matches!(kind, Some(k) if k.is_data()) {
        check_unauthorized(rt, resolved, AccessDir::Write, pc);
        // Mutually exclusive, first-match-wins (mirrors the original's
        // `if / else if` sentinel chain) — a TX value is never allowed to
        // synthesize more than one canned response.
        if let Some(canned) = shared.canned.iter().find(|c| c.phaddr == resolved && c.sentinel.matches(value)) {
            rt.store.push_rx(resolved, &canned.response, (canned.response.len() * 8) as u32);
            if let Some(r) = rt.store.get_mut(resolved) {
                r.canned_ack = true;
            }
        }
        rt.store.write_tx(resolved, value, 1);
    } else {
        rt.store.write_ph(resolved, value << bit_offset);
    }

    let irq_ctx = rt.irqs.any_pending_irq();
    rt.compliance.record(crate::types::AccessKind::FirmwareWrite, resolved, value as u64, hooks.current_pc(), irq_ctx);

    let candidates = shared.rules.update_graph(MmioEvent::Write, resolved, &mut rt.store, hooks, &mut rt.stats);
    rt.irqs.emit_candidates(candidates, hooks, &mut rt.rng);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Register;
    use crate::types::RegKind;

    struct NullHooks {
        pc: u64,
    }
    impl CpuHooks for NullHooks {
        fn on_external_interrupt(&mut self, _irq_vector: u32) -> bool {
            true
        }
        fn on_enable_iser(&mut self) -> Vec<u32> {
            vec![]
        }
        fn on_buffer_input(&mut self, _phaddr: u32, _max_len: usize) -> Vec<u8> {
            vec![]
        }
        fn mem_read_u32(&mut self, _addr: u32) -> u32 {
            0
        }
        fn mem_write_u32(&mut self, _addr: u32, _value: u32) {}
        fn current_pc(&self) -> u64 {
            self.pc
        }
    }

    #[test]
    fn bit_band_write_sets_single_bit() {
        let shared = SpecGraph::default();
        let mut rt = RuntimeState::new(0);
        rt.first_touch = false;
        rt.store.insert(0x4000_4004, Register::new(RegKind::Other, 0, 32));
        let mut hooks = NullHooks { pc: 1 };

        write(&shared, &mut rt, &mut hooks, 0x4208_009C, 1, 258);

        assert_eq!(rt.store.read_ph(0x4000_4004), 0x80);
    }

    #[test]
    fn rx_drain_scenario() {
        let shared = SpecGraph::default();
        let mut rt = RuntimeState::new(0);
        rt.first_touch = false;
        rt.store.insert(0x4000_4004, Register::new(RegKind::Receive, 0, 8));
        rt.store.push_rx(0x4000_4004, &[0xAA, 0x55, 0xFF, 0x01], 32);
        let mut hooks = NullHooks { pc: 1 };

        for expect in [0xAA, 0x55, 0xFF, 0x01] {
            let r = read(&shared, &mut rt, &mut hooks, 0x4000_4004, 1, 258);
            assert_eq!(r.value, expect);
            assert!(r.is_data);
        }
        let r = read(&shared, &mut rt, &mut hooks, 0x4000_4004, 1, 258);
        assert_eq!(r.value, 0);
        assert!(r.is_data);
    }
}
