//! Compliance Checker (§4.8): records every hardware write, firmware
//! write, firmware read, and firmware condition-test event behind a
//! logical clock, then replays the NLP file's sequence rules against the
//! log to find atomicity and clear-on-event violations.
//!
//! Condition-kind (`CC`) stages have no dedicated external hook in this
//! crate's scope (§1 Non-goals excludes the symbolic condition machinery
//! that would drive them) — they are matched against the most recent
//! recorded access to the same field instead of a live signal.

use serde::{Deserialize, Serialize};

use crate::fields::extract_bits;
use crate::types::{AccessKind, Op, Operand, SeqFieldMatch, SeqStageKind, SequenceRule};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessEvent {
    pub kind: AccessKind,
    pub phaddr: u32,
    pub value: u32,
    pub pc: u64,
    pub time: u64,
    pub irq_context: Option<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct ComplianceState {
    log: Vec<AccessEvent>,
    cur_time: u64,
    last_kind: Option<AccessKind>,
    last_irq_context: Option<u32>,
}

impl ComplianceState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one access. The logical clock advances only when the access
    /// kind or the IRQ context differs from the immediately preceding
    /// event (§3 "Compliance clock").
    pub fn record(&mut self, kind: AccessKind, phaddr: u32, value: u64, pc: u64, irq_context: Option<u32>) {
        if self.last_kind != Some(kind) || self.last_irq_context != irq_context {
            self.cur_time += 1;
        }
        self.last_kind = Some(kind);
        self.last_irq_context = irq_context;
        self.log.push(AccessEvent { kind, phaddr, value: value as u32, pc, time: self.cur_time, irq_context });
    }

    pub fn log(&self) -> &[AccessEvent] {
        &self.log
    }

    pub fn cur_time(&self) -> u64 {
        self.cur_time
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViolationType {
    Atomicity,
    ClearOnEvent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    pub violation_type: ViolationType,
    pub rule_idx: usize,
    pub stage_idx: usize,
    pub pcs: Vec<u64>,
}

fn stage_matches(stage_kind: SeqStageKind, matches: &[SeqFieldMatch], event: &AccessEvent) -> bool {
    if event.kind != stage_kind.access_kind() {
        return false;
    }
    matches.iter().all(|m| {
        if m.field.phaddr != event.phaddr {
            return false;
        }
        let lhs = extract_bits(event.value, &m.field.bits);
        match &m.rhs {
            Operand::Literal(v) => m.op.apply(lhs, *v),
            Operand::Wildcard => true,
            Operand::Field(_) => m.op == Op::Wildcard,
        }
    })
}

fn events_for_stage<'a>(
    log: &'a [AccessEvent],
    stage: &crate::types::SeqStage,
) -> Vec<&'a AccessEvent> {
    let Some(first) = stage.matches.first() else { return Vec::new() };
    log.iter().filter(|e| stage_matches(first.kind, &stage.matches, e)).collect()
}

/// Runs both checks over the whole access log (§4.8).
pub fn check_sequences(log: &[AccessEvent], sequences: &[SequenceRule]) -> Vec<Violation> {
    let mut violations = Vec::new();

    for (rule_idx, rule) in sequences.iter().enumerate() {
        // Type 1: atomicity. Each stage[i+1] event must be immediately
        // preceded (time = t-1) by a matching stage[i] event in the same
        // IRQ context.
        for i in 0..rule.stages.len().saturating_sub(1) {
            let preceding = events_for_stage(log, &rule.stages[i]);
            let following = events_for_stage(log, &rule.stages[i + 1]);

            let mut offending_pcs = Vec::new();
            for ev in &following {
                let satisfied = preceding
                    .iter()
                    .any(|p| p.time + 1 == ev.time && p.irq_context == ev.irq_context);
                if !satisfied {
                    offending_pcs.push(ev.pc);
                }
            }
            if !offending_pcs.is_empty() {
                violations.push(Violation {
                    violation_type: ViolationType::Atomicity,
                    rule_idx,
                    stage_idx: i + 1,
                    pcs: offending_pcs,
                });
            }
        }

        // Type 4: clear-on-event. Every `CE` stage occurrence must be
        // followed, in the same IRQ context, by a later occurrence of the
        // next stage.
        for (i, stage) in rule.stages.iter().enumerate() {
            let is_clear_event = stage.matches.first().map(|m| m.kind == SeqStageKind::ClearEvent).unwrap_or(false);
            if !is_clear_event || i + 1 >= rule.stages.len() {
                continue;
            }
            let occurrences = events_for_stage(log, stage);
            let next_occurrences = events_for_stage(log, &rule.stages[i + 1]);

            let mut missing_pcs = Vec::new();
            for ev in &occurrences {
                let cleared = next_occurrences
                    .iter()
                    .any(|n| n.time > ev.time && n.irq_context == ev.irq_context);
                if !cleared {
                    missing_pcs.push(ev.pc);
                }
            }
            if !missing_pcs.is_empty() {
                violations.push(Violation {
                    violation_type: ViolationType::ClearOnEvent,
                    rule_idx,
                    stage_idx: i,
                    pcs: missing_pcs,
                });
            }
        }
    }

    violations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Field, RegKind, SeqStage};

    fn cc(phaddr: u32, bit: i32, eq: u64) -> SeqFieldMatch {
        SeqFieldMatch {
            kind: SeqStageKind::Condition,
            field: Field { kind: RegKind::Status, phaddr, bits: vec![bit] },
            op: Op::Eq,
            rhs: Operand::Literal(eq),
        }
    }

    fn cr(phaddr: u32) -> SeqFieldMatch {
        SeqFieldMatch {
            kind: SeqStageKind::Read,
            field: Field::whole_word(RegKind::Receive, phaddr),
            op: Op::Wildcard,
            rhs: Operand::Wildcard,
        }
    }

    // Scenario 6: CC,0x40004000,7,=,1 -> CR,0x40004004,*. Two back-to-back
    // reads of the DR with no intervening status check is one violation.
    #[test]
    fn atomicity_violation_on_missing_precedent() {
        let mut state = ComplianceState::new();
        state.record(AccessKind::FirmwareRead, 0x4000_4004, 0x80, 1, None);
        state.record(AccessKind::FirmwareRead, 0x4000_4004, 0x80, 2, None);

        let rule = SequenceRule {
            stages: vec![
                SeqStage { matches: vec![cc(0x4000_4000, 7, 1)] },
                SeqStage { matches: vec![cr(0x4000_4004)] },
            ],
        };

        let violations = check_sequences(state.log(), std::slice::from_ref(&rule));
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].violation_type, ViolationType::Atomicity);
        assert_eq!(violations[0].pcs, vec![1, 2]);
    }

    #[test]
    fn atomicity_satisfied_when_condition_immediately_precedes() {
        let mut state = ComplianceState::new();
        state.record(AccessKind::FirmwareCondition, 0x4000_4000, 0x80, 1, None);
        state.record(AccessKind::FirmwareRead, 0x4000_4004, 0x80, 2, None);

        let rule = SequenceRule {
            stages: vec![
                SeqStage { matches: vec![cc(0x4000_4000, 7, 1)] },
                SeqStage { matches: vec![cr(0x4000_4004)] },
            ],
        };

        let violations = check_sequences(state.log(), std::slice::from_ref(&rule));
        assert!(violations.is_empty());
    }
}
