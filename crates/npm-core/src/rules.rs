//! Rule Engine (§4.3): evaluates trigger -> action pairs and autonomous
//! Flags against the live register store on every MMIO event and on flag
//! ticks. The rule/flag graph is parsed once and shared by reference
//! across forked states (§9 "State forks").

use std::collections::HashSet;

use rand::seq::SliceRandom;

use crate::fields::{get_field, set_field};
use crate::hooks::CpuHooks;
use crate::rng::SharedRng;
use crate::stats::Statistics;
use crate::store::RegisterStore;
use crate::types::{Combinator, Equation, Flag, FlagKind, Op, Operand, Rule, TriggerType};

/// The event that drove a rule evaluation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MmioEvent {
    Read,
    Write,
    /// `phaddr` is ignored; every rule across every block is evaluated.
    /// Used after an input injection, a flag flip, or an interrupt exit.
    Unknown,
}

/// A contiguous peripheral block's declared address span (§4.1 "grouped by
/// proximity"; I4).
#[derive(Debug, Clone, Copy)]
pub struct BlockSpan {
    pub min: u32,
    pub max: u32,
}

impl BlockSpan {
    pub fn contains(&self, addr: u32) -> bool {
        addr >= self.min && addr <= self.max
    }
}

/// Whether a flag tick is a routine poll or the exception-exit "timer
/// clear" (§4.3.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagTickMode {
    Normal,
    ExceptionExit,
}

/// The immutable, parsed rule graph. Shared (typically behind an `Arc`) by
/// every forked state.
#[derive(Debug, Clone, Default)]
pub struct RuleGraph {
    pub rules: Vec<Rule>,
    pub flags: Vec<Flag>,
    pub blocks: Vec<BlockSpan>,
    /// DR address -> its block's Status register address, if within 0x100
    /// (§4.1, I4). Used by Statistics & Diagnosis for unauthorized-access
    /// detection.
    pub dr_to_sr: std::collections::HashMap<u32, u32>,
}

impl RuleGraph {
    fn block_for(&self, phaddr: u32) -> Option<usize> {
        self.blocks.iter().position(|b| b.contains(phaddr))
    }

    /// Runs one full rule-evaluation pass (§4.3.1). Returns the IRQ
    /// candidates collected this pass, in file order (shuffled by the
    /// caller before emission, per §4.4).
    pub fn update_graph(
        &self,
        event: MmioEvent,
        phaddr: u32,
        store: &mut RegisterStore,
        hooks: &mut dyn CpuHooks,
        stats: &mut Statistics,
    ) -> Vec<u32> {
        let selected_block = match event {
            MmioEvent::Unknown => None,
            _ => self.block_for(phaddr),
        };

        let mut candidates = Vec::new();
        let mut dirtied_this_pass: HashSet<u32> = HashSet::new();

        for (idx, rule) in self.rules.iter().enumerate() {
            if let Some(block) = selected_block {
                if rule.block != block {
                    continue;
                }
            }

            let fired = eval_trigger_set(&rule.triggers, rule.combinator, event, phaddr, store, hooks);
            if !fired {
                continue;
            }

            let chained = rule.triggers.iter().any(|eq| {
                eq.trigger != TriggerType::Wildcard && dirtied_this_pass.contains(&eq.field.phaddr)
            });

            for action in &rule.actions {
                apply_action(action, store, hooks);
                dirtied_this_pass.insert(action.field.phaddr);
            }

            stats.record_rule_fire(idx);
            if chained {
                stats.record_chain_fire();
            }
            if let Some(irq) = rule.irq {
                candidates.push(irq);
            }
        }

        candidates
    }

    /// Flag tick (§4.3.3). `block_phaddr = Some(p)` restricts to the flags
    /// of the block containing `p` (the gateway's per-access tick);
    /// `None` ticks every flag (the arbiter's exception-exit broadcast).
    pub fn update_flags(
        &self,
        mode: FlagTickMode,
        block_phaddr: Option<u32>,
        store: &mut RegisterStore,
        hooks: &mut dyn CpuHooks,
        rng: &mut SharedRng,
        stats: &mut Statistics,
    ) {
        let selected_block = block_phaddr.and_then(|p| self.block_for(p));

        for (idx, flag) in self.flags.iter().enumerate() {
            if let Some(block) = selected_block {
                if flag.block != block {
                    continue;
                }
            }

            let changed = match flag.kind {
                FlagKind::Specific => {
                    let new_value = match mode {
                        FlagTickMode::ExceptionExit => 0,
                        FlagTickMode::Normal => flag.values.first().copied().unwrap_or(1),
                    };
                    let old = get_field(store, hooks, &flag.field);
                    set_field(store, hooks, &flag.field, new_value);
                    old != new_value
                }
                FlagKind::Value => {
                    if flag.values.is_empty() {
                        false
                    } else {
                        let old = get_field(store, hooks, &flag.field);
                        let pick = *flag.values.choose(rng.inner_mut()).unwrap();
                        set_field(store, hooks, &flag.field, pick);
                        old != pick
                    }
                }
                FlagKind::Counter => {
                    let old = get_field(store, hooks, &flag.field);
                    let max_value = flag.values.first().copied().unwrap_or(u64::MAX);
                    let mut new_value = (old << 1) + 1;
                    if new_value > max_value || new_value == old {
                        new_value = 0;
                    }
                    set_field(store, hooks, &flag.field, new_value);
                    old != new_value
                }
            };

            if changed {
                stats.record_flag_fire(idx);
            }
        }
    }
}

fn eval_trigger_set(
    triggers: &[Equation],
    combinator: Combinator,
    event: MmioEvent,
    phaddr: u32,
    store: &RegisterStore,
    hooks: &mut dyn CpuHooks,
) -> bool {
    match combinator {
        Combinator::All => triggers.iter().all(|eq| eval_equation(eq, event, phaddr, store, hooks)),
        Combinator::Any => triggers.iter().any(|eq| eval_equation(eq, event, phaddr, store, hooks)),
    }
}

fn eval_equation(
    eq: &Equation,
    event: MmioEvent,
    phaddr: u32,
    store: &RegisterStore,
    hooks: &mut dyn CpuHooks,
) -> bool {
    let type_matches = match eq.trigger {
        TriggerType::Wildcard => true,
        TriggerType::Read => event == MmioEvent::Read && phaddr == eq.field.phaddr,
        TriggerType::Write => event == MmioEvent::Write && phaddr == eq.field.phaddr,
        TriggerType::Condition => true,
    };
    if !type_matches {
        return false;
    }
    if eq.op == Op::Wildcard {
        return true;
    }

    let lhs = get_field(store, hooks, &eq.field);
    let rhs = match &eq.rhs {
        Operand::Literal(v) => *v,
        Operand::Wildcard => return true,
        Operand::Field(f) => get_field(store, hooks, f),
    };
    eq.op.apply(lhs, rhs)
}

fn apply_action(action: &Equation, store: &mut RegisterStore, hooks: &mut dyn CpuHooks) {
    let value = match &action.rhs {
        Operand::Literal(v) => *v,
        Operand::Wildcard => return,
        Operand::Field(f) => get_field(store, hooks, f),
    };
    set_field(store, hooks, &action.field, value);
}
