//! NLP Peripheral Model: a register-level MMIO peripheral emulator for ARM
//! Cortex-M firmware, driven by a declarative NLP hardware description.
//!
//! [`NlpPeripheralModel`] is the single entry point a host CPU embeds. It
//! owns the immutable parsed rule graph (shared across forked states behind
//! an `Arc`) and the per-state mutable runtime (register values, IRQ
//! bookkeeping, statistics, compliance log).

pub mod canned;
pub mod compliance;
pub mod config;
pub mod error;
pub mod feeder;
pub mod fields;
pub mod gateway;
pub mod hooks;
pub mod irq;
pub mod parser;
pub mod rng;
pub mod rules;
pub mod stats;
pub mod store;
pub mod types;

use std::path::Path;
use std::sync::Arc;

pub use config::NpmConfig;
pub use error::NpmError;
pub use feeder::RunControl;
pub use hooks::CpuHooks;

use gateway::{RuntimeState, SpecGraph};
use rules::FlagTickMode;
use stats::Report;
use types::RegKind;

/// A no-op `CpuHooks` used for the exception-exit flag broadcast, which the
/// facade (per spec) does not receive a live hooks reference for. Only
/// exercised if an NLP file routes a `MemMapped` field through a flag that
/// ticks on exception exit, which none of the modeled peripherals do.
struct NoHooks;

impl CpuHooks for NoHooks {
    fn on_external_interrupt(&mut self, _irq_vector: u32) -> bool {
        false
    }
    fn on_enable_iser(&mut self) -> Vec<u32> {
        Vec::new()
    }
    fn on_buffer_input(&mut self, _phaddr: u32, _max_len: usize) -> Vec<u8> {
        Vec::new()
    }
    fn mem_read_u32(&mut self, _addr: u32) -> u32 {
        0
    }
    fn mem_write_u32(&mut self, _addr: u32, _value: u32) {}
    fn current_pc(&self) -> u64 {
        0
    }
}

/// The library facade (§2): the single entry point a host CPU embeds.
pub struct NlpPeripheralModel {
    shared: Arc<SpecGraph>,
    rt: RuntimeState,
    config: NpmConfig,
    /// Set by `on_translate_block_start`'s fork-point crossing count, read
    /// and cleared by the following `on_translate_block_end` (B3): the
    /// counter is incremented on block start, but the run only actually
    /// completes once block end observes it.
    pending_run_control: RunControl,
}

impl NlpPeripheralModel {
    /// Parses `nlp_source` (and `cc_source`, if compliance checking is
    /// enabled) and builds a fresh model with an empty runtime state.
    pub fn load(nlp_source: &str, cc_source: Option<&str>, config: NpmConfig) -> Result<Self, NpmError> {
        let parsed = parser::parse_nlp_file(nlp_source)?;
        let sequences = match cc_source {
            Some(src) => parser::parse_cc_file(src)?,
            None => Vec::new(),
        };

        let mut rt = RuntimeState::new(config.rng_seed);
        let mut tx_addrs = Vec::new();
        for (addr, reg) in parsed.registers {
            if reg.kind == RegKind::Transmit {
                tx_addrs.push(addr);
            }
            rt.store.insert(addr, reg);
        }

        tracing::info!(registers = rt.store.iter().count(), rules = parsed.rules.rules.len(), "loaded NLP model");

        let shared = Arc::new(SpecGraph {
            rules: parsed.rules,
            constraints: parsed.constraints,
            canned: canned::built_in_table(&tx_addrs),
            sequences,
        });

        Ok(Self { shared, rt, config, pending_run_control: RunControl::Continue })
    }

    /// `on_read` (§6.1): resolves bit-band/address correction, ticks gated
    /// flags, checks constraints, and runs a scoped rule-evaluation pass.
    pub fn on_read(&mut self, hooks: &mut dyn CpuHooks, phaddr: u32, size: u8) -> (u32, bool) {
        let result = gateway::read(&self.shared, &mut self.rt, hooks, phaddr, size, self.config.initial_rx_seed_len);
        (result.value, result.is_data)
    }

    /// `on_write` (§6.1): same pipeline as `on_read`, plus canned-response
    /// synthesis on data-register writes.
    pub fn on_write(&mut self, hooks: &mut dyn CpuHooks, phaddr: u32, value: u32) {
        gateway::write(&self.shared, &mut self.rt, hooks, phaddr, value, self.config.initial_rx_seed_len);
    }

    /// `on_translate_block_start` (§4.6): fork-point detection.
    pub fn on_translate_block_start(&mut self, pc: u64) {
        self.pending_run_control = feeder::on_translate_block_start(&mut self.rt, self.config.fork_point, pc);
    }

    /// `on_translate_block_end` (§4.6): feeds RX bytes and ticks the rule
    /// graph if this block start primed the feeder. Returns the run
    /// decision computed at the matching `on_translate_block_start` (B3);
    /// on completion, also snapshots the host's enabled-IRQ set for the
    /// Type-1 un-enabled-flag diagnosis (§4.7, §3).
    pub fn on_translate_block_end(&mut self, hooks: &mut dyn CpuHooks, pc: u64, interrupt_flag: bool) -> RunControl {
        tracing::trace!(pc, interrupt_flag, "translate block end");
        feeder::on_translate_block_end(&self.shared, &mut self.rt, hooks, interrupt_flag, self.config.initial_rx_seed_len);

        if self.pending_run_control == RunControl::Complete {
            self.rt.last_enabled_iser = hooks.on_enable_iser();
        }
        self.pending_run_control
    }

    /// `on_exception_exit` (§6.1): decrements the exiting IRQ's pending
    /// count and broadcasts the exception-exit flag tick (clears "timer
    /// enable" flags) across every declared block.
    pub fn on_exception_exit(&mut self, irq_vector: u32) {
        self.rt.irqs.on_exception_exit(irq_vector);
        let mut no_hooks = NoHooks;
        self.shared.rules.update_flags(
            FlagTickMode::ExceptionExit,
            None,
            &mut self.rt.store,
            &mut no_hooks,
            &mut self.rt.rng,
            &mut self.rt.stats,
        );
    }

    /// Clones the per-state runtime for a new symbolic-execution path,
    /// sharing the immutable rule graph (§5, §9 "State forks").
    pub fn fork(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            rt: self.rt.clone(),
            config: self.config.clone(),
            pending_run_control: self.pending_run_control,
        }
    }

    /// Builds the Statistics & Diagnosis report (§4.7) without writing it.
    pub fn report(&self) -> Report {
        self.rt.stats.build_report(&self.shared.rules, &self.rt.irqs, &self.rt.last_enabled_iser)
    }

    /// Runs the compliance checker over the access log recorded so far
    /// (§4.8).
    pub fn compliance_violations(&self) -> Vec<compliance::Violation> {
        compliance::check_sequences(self.rt.compliance.log(), &self.shared.sequences)
    }

    /// Whether the compliance logical clock has crossed the configured
    /// budget with at least one outstanding violation (§3 "Compliance
    /// budget", §7). The embedder is expected to exit non-zero when this
    /// turns true.
    pub fn compliance_over_budget(&self) -> bool {
        self.rt.compliance.cur_time() >= self.config.compliance_budget && !self.compliance_violations().is_empty()
    }

    /// Writes `NLPStatistics.dat` and `ComplianceCheck.dat` to `out_dir`
    /// (§6.5).
    pub fn shutdown(&self, out_dir: &Path) -> Result<(), NpmError> {
        let report = self.report();
        std::fs::write(out_dir.join("NLPStatistics.dat"), serde_json::to_string_pretty(&report)?)?;

        let violations = self.compliance_violations();
        std::fs::write(out_dir.join("ComplianceCheck.dat"), serde_json::to_string_pretty(&violations)?)?;

        Ok(())
    }
}
