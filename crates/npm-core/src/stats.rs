//! Statistics & Diagnosis (§4.7): firing counters plus the six diagnosis
//! report types, written out as `NLPStatistics.dat` at shutdown.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::irq::IrqTable;
use crate::rules::RuleGraph;
use crate::types::{ConstraintKind, Constraint};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccessDir {
    Read,
    Write,
}

#[derive(Debug, Clone, Default)]
pub struct Statistics {
    rule_fires: Vec<u32>,
    flag_fires: Vec<u32>,
    chain_fires: u64,
    /// (DR address, direction) -> offending PCs. Aggregated per DR rather
    /// than per event so repeated violations against the same register
    /// collapse into one report entry (§4.7 Type 3/4).
    unauthorized: HashMap<(u32, AccessDir), Vec<u64>>,
    /// One entry per access event: the original only flags the first
    /// differing bit found (§3 "Unauthorized-access bit granularity").
    forbidden: Vec<ForbiddenEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForbiddenEntry {
    pub phaddr: u32,
    pub bit: i32,
    pub pc: u64,
    pub direction: AccessDir,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_rule_fire(&mut self, rule_idx: usize) {
        if self.rule_fires.len() <= rule_idx {
            self.rule_fires.resize(rule_idx + 1, 0);
        }
        self.rule_fires[rule_idx] += 1;
    }

    pub fn record_flag_fire(&mut self, flag_idx: usize) {
        if self.flag_fires.len() <= flag_idx {
            self.flag_fires.resize(flag_idx + 1, 0);
        }
        self.flag_fires[flag_idx] += 1;
    }

    pub fn record_chain_fire(&mut self) {
        self.chain_fires += 1;
    }

    pub fn rule_fires(&self, rule_idx: usize) -> u32 {
        self.rule_fires.get(rule_idx).copied().unwrap_or(0)
    }

    pub fn flag_fires(&self, flag_idx: usize) -> u32 {
        self.flag_fires.get(flag_idx).copied().unwrap_or(0)
    }

    pub fn record_unauthorized(&mut self, phaddr: u32, dir: AccessDir, pc: u64) {
        self.unauthorized.entry((phaddr, dir)).or_default().push(pc);
    }

    pub fn record_forbidden(&mut self, phaddr: u32, bit: i32, dir: AccessDir, pc: u64) {
        self.forbidden.push(ForbiddenEntry { phaddr, bit, pc, direction: dir });
    }

    /// Checks `phaddr`'s bit-level access against the declared constraints
    /// (§4.2 Constraint, §4.7 Type 5/6). Records at most one violation per
    /// call, matching the original's break-on-first-bit behavior.
    pub fn check_constraints(
        &mut self,
        constraints: &[Constraint],
        phaddr: u32,
        dir: AccessDir,
        pc: u64,
    ) {
        let forbidden_kind = match dir {
            AccessDir::Read => ConstraintKind::WriteOnly,
            AccessDir::Write => ConstraintKind::ReadOnly,
        };
        for c in constraints {
            if c.field.phaddr != phaddr || c.kind != forbidden_kind {
                continue;
            }
            let bit = c.field.bits.first().copied().unwrap_or(-1);
            self.record_forbidden(phaddr, bit, dir, pc);
            break;
        }
    }
}

/// Per-IRQ diagnosis entry: fired on hardware but never observed as
/// enabled via `on_enable_iser` (§4.7 Type 1, §3 supplement).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnEnabledFlag {
    pub irq: u32,
    pub enable_side_addrs: Vec<u32>,
}

/// An IRQ a rule declares but that never fired (§4.7 Type 2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UntriggeredIrq {
    pub irq: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnauthorizedAccessEntry {
    pub phaddr: u32,
    pub direction: AccessDir,
    pub pcs: Vec<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub rule_fires: Vec<u32>,
    pub flag_fires: Vec<u32>,
    pub chain_fires: u64,
    pub irq_freq: HashMap<u32, u32>,
    pub un_enabled_flags: Vec<UnEnabledFlag>,
    pub untriggered_irqs: Vec<UntriggeredIrq>,
    pub unauthorized_access: Vec<UnauthorizedAccessEntry>,
    pub forbidden_bit_access: Vec<ForbiddenEntry>,
}

impl Statistics {
    /// Builds the final report. `enabled_irqs` is the last `on_enable_iser`
    /// snapshot, taken at the fork point per the supplemented Type 1
    /// mechanism (§3).
    pub fn build_report(&self, graph: &RuleGraph, irqs: &IrqTable, enabled_irqs: &[u32]) -> Report {
        let mut declared_irqs: Vec<u32> = graph.rules.iter().filter_map(|r| r.irq).collect();
        declared_irqs.sort_unstable();
        declared_irqs.dedup();

        let mut un_enabled = Vec::new();
        let mut untriggered = Vec::new();
        for &irq in &declared_irqs {
            let freq = irqs.freq(irq);
            if freq == 0 {
                untriggered.push(UntriggeredIrq { irq });
                continue;
            }
            if !enabled_irqs.contains(&irq) {
                let enable_side_addrs: Vec<u32> = graph
                    .rules
                    .iter()
                    .filter(|r| r.irq == Some(irq))
                    .flat_map(|r| r.triggers.iter())
                    .filter(|eq| eq.trigger != crate::types::TriggerType::Wildcard)
                    .map(|eq| eq.field.phaddr)
                    .collect();
                un_enabled.push(UnEnabledFlag { irq, enable_side_addrs });
            }
        }

        let unauthorized_access = self
            .unauthorized
            .iter()
            .map(|(&(phaddr, direction), pcs)| UnauthorizedAccessEntry {
                phaddr,
                direction,
                pcs: pcs.clone(),
            })
            .collect();

        let irq_freq = irqs.all_known_irqs().map(|irq| (irq, irqs.freq(irq))).collect();

        Report {
            rule_fires: self.rule_fires.clone(),
            flag_fires: self.flag_fires.clone(),
            chain_fires: self.chain_fires,
            irq_freq,
            un_enabled_flags: un_enabled,
            untriggered_irqs: untriggered,
            unauthorized_access,
            forbidden_bit_access: self.forbidden.clone(),
        }
    }
}
