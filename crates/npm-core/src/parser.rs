//! Spec Parser (§4.1): turns an NLP hardware-description file into a
//! [`SpecGraph`] plus the declared register list. Also parses the separate
//! compliance sequence-rule file (§4.8) consumed by the Compliance Checker.
//!
//! The NLP file has four `==`-delimited sections (register declarations;
//! rule lines, grouped into peripheral blocks by `--`; flag lines, grouped
//! the same way; a reserved section we skip; constraint lines). Exact token
//! grammars are reconstructed from the original S2E plugin's regex-driven
//! extraction functions, since the prose grammar alone leaves the equation
//! operand encoding ambiguous.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::NpmError;
use crate::rules::{BlockSpan, RuleGraph};
use crate::store::Register;
use crate::types::{
    Combinator, Constraint, ConstraintKind, Equation, Field, Flag, FlagKind, Op, Operand, RegKind,
    Rule, SeqFieldMatch, SeqStage, SeqStageKind, SequenceRule, TriggerType,
};

/// Everything a loaded NLP file produces: the declared registers (to seed a
/// fresh [`crate::store::RegisterStore`]) and the immutable rule graph.
pub struct ParsedModel {
    pub registers: Vec<(u32, Register)>,
    pub rules: RuleGraph,
    pub constraints: Vec<Constraint>,
}

/// Coarse line-shape gates, compiled once and reused: a `Regex` validates
/// overall line shape up front; the detailed token-by-token extraction —
/// which needs to resolve field kinds against the declared register table —
/// happens separately below. §4.1 "Parser invariants": "Rejects any line not
/// matching its regex with a fatal error".
static REGISTER_LINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^[rtsodl]_(0x)?[0-9a-f]+_(0x)?[0-9a-f]+(_[0-9]+)?$").unwrap());
static RULE_LINE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^:]+(:[^:]+(:[0-9]+)?)?$").unwrap());
static FLAG_LINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[SVC],[^,]+,[^,]+,[0-9]+,[0-9a-fA-F/]+$").unwrap());
static CONSTRAINT_LINE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[RW],[^,]+,[^,]+$").unwrap());
static SEQUENCE_LINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_,=*/>&-]+$").unwrap());

fn malformed(line_no: usize, text: &str, reason: &str) -> NpmError {
    NpmError::MalformedLine { line: line_no, text: format!("{text} ({reason})") }
}

fn parse_hex(tok: &str) -> Result<u32, String> {
    let stripped = tok.strip_prefix("0x").or_else(|| tok.strip_prefix("0X")).unwrap_or(tok);
    u32::from_str_radix(stripped, 16).map_err(|_| format!("{tok:?} is not hex"))
}

fn parse_bits(tok: &str) -> Result<Vec<i32>, String> {
    if tok == "*" {
        return Ok(vec![-1]);
    }
    tok.split('/')
        .map(|b| b.parse::<i32>().map_err(|_| format!("{tok:?} is not a bit list")))
        .collect()
}

/// Mirrors the original `getAddress`: `*` alone is the pure wildcard (no
/// kind, address 0); `*<Kind><hex>` names a kind explicitly (e.g. `*S4000`);
/// `*0x...` is a plain hex address with no kind letter at all (e.g. the
/// `*0x40004008` trigger address in the echo-device worked example) — the
/// leading character only counts as a kind tag when it is actually one of
/// `R,T,S,O,D,L`, otherwise the whole remainder is parsed as hex.
fn parse_addr_token(tok: &str) -> Result<(Option<RegKind>, u32), String> {
    if tok == "*" {
        return Ok((None, 0));
    }
    if let Some(rest) = tok.strip_prefix('*') {
        let mut chars = rest.char_indices();
        let (_, first_char) = chars.next().ok_or_else(|| format!("{tok:?} has no address"))?;
        if let Some(kind) = RegKind::from_letter(first_char) {
            let hex_part = &rest[first_char.len_utf8()..];
            return Ok((Some(kind), parse_hex(hex_part)?));
        }
        Ok((None, parse_hex(rest)?))
    } else {
        Ok((None, parse_hex(tok)?))
    }
}

fn resolve_field(
    addr: (Option<RegKind>, u32),
    bits_tok: &str,
    registers: &HashMap<u32, RegKind>,
) -> Result<Field, String> {
    let (kind_opt, phaddr) = addr;
    let kind = kind_opt.unwrap_or_else(|| registers.get(&phaddr).copied().unwrap_or(RegKind::Other));
    Ok(Field { kind, phaddr, bits: parse_bits(bits_tok)? })
}

/// A2's variable-length encoding: a binary literal, the bare wildcard, a
/// `V`/`C`/`O`-marked field reference (two further tokens: `ADDR,BITS`), or
/// a single `*KindAddr` field reference (whole word).
fn parse_operand(
    rest: &[&str],
    registers: &HashMap<u32, RegKind>,
    touched: &mut Vec<u32>,
) -> Result<Operand, String> {
    let first = *rest.first().ok_or_else(|| "missing a2 token".to_string())?;

    if matches!(first, "V" | "C" | "O") {
        let addr_tok = *rest.get(1).ok_or_else(|| "missing a2 address".to_string())?;
        let bits_tok = *rest.get(2).ok_or_else(|| "missing a2 bits".to_string())?;
        let addr = parse_addr_token(addr_tok)?;
        touched.push(addr.1);
        return Ok(Operand::Field(resolve_field(addr, bits_tok, registers)?));
    }

    if first == "*" {
        return Ok(Operand::Wildcard);
    }

    if !first.starts_with('*') {
        let v = u64::from_str_radix(first, 2).map_err(|_| format!("{first:?} is not a binary literal"))?;
        return Ok(Operand::Literal(v));
    }

    let addr = parse_addr_token(first)?;
    touched.push(addr.1);
    Ok(Operand::Field(resolve_field(addr, "*", registers)?))
}

fn wildcard_equation() -> Equation {
    Equation {
        trigger: TriggerType::Wildcard,
        field: Field { kind: RegKind::Other, phaddr: 0, bits: vec![-1] },
        op: Op::Wildcard,
        rhs: Operand::Wildcard,
    }
}

/// One equation token: `TYPE,ADDR,BITS,OP,A2...`.
fn parse_equation(
    tokens: &[&str],
    registers: &HashMap<u32, RegKind>,
    touched: &mut Vec<u32>,
) -> Result<Equation, String> {
    if tokens.first() == Some(&"*") {
        return Ok(wildcard_equation());
    }

    let trigger = TriggerType::from_token(tokens[0]).ok_or_else(|| format!("unknown trigger type {:?}", tokens[0]))?;
    let addr_tok = *tokens.get(1).ok_or_else(|| "missing equation address".to_string())?;
    let bits_tok = *tokens.get(2).ok_or_else(|| "missing equation bits".to_string())?;
    let op_tok = *tokens.get(3).ok_or_else(|| "missing equation operator".to_string())?;

    let addr = parse_addr_token(addr_tok)?;
    if addr_tok != "*" {
        touched.push(addr.1);
    }
    let field = resolve_field(addr, bits_tok, registers)?;
    let op = Op::from_token(op_tok).ok_or_else(|| format!("unknown operator {op_tok:?}"))?;
    let rhs = parse_operand(&tokens[4..], registers, touched)?;

    Ok(Equation { trigger, field, op, rhs })
}

/// Splits a trigger/action side on `&` (all-of) or `|` (any-of); a side with
/// neither is a single equation and the combinator is irrelevant.
fn split_side(s: &str) -> (Vec<&str>, Combinator) {
    if s.contains('&') {
        (s.split('&').collect(), Combinator::All)
    } else if s.contains('|') {
        (s.split('|').collect(), Combinator::Any)
    } else {
        (vec![s], Combinator::All)
    }
}

fn parse_equation_list(
    s: &str,
    registers: &HashMap<u32, RegKind>,
    touched: &mut Vec<u32>,
) -> Result<(Vec<Equation>, Combinator), String> {
    let (parts, combinator) = split_side(s);
    let equations = parts
        .iter()
        .map(|eq_str| {
            let toks: Vec<&str> = eq_str.split(',').collect();
            parse_equation(&toks, registers, touched)
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok((equations, combinator))
}

/// Rule line: `TRIGGERS:ACTIONS[:IRQ]`, where the IRQ number — per every
/// worked NLP file this crate has seen — is more commonly appended to the
/// action side as `;IRQ` than as a genuine third `:`-separated field. Both
/// spellings are accepted.
fn parse_rule_line(
    line_no: usize,
    line: &str,
    block: usize,
    registers: &HashMap<u32, RegKind>,
) -> Result<(Rule, Vec<u32>), NpmError> {
    let wrap = |e: String| malformed(line_no, line, &e);

    if !RULE_LINE_RE.is_match(line) {
        return Err(malformed(line_no, line, "does not match TRIGGERS:ACTIONS[:IRQ]"));
    }

    let parts: Vec<&str> = line.splitn(3, ':').collect();
    let (trig_str, rest_str, irq_from_colon) = match parts.len() {
        3 => (parts[0], Some(parts[1]), Some(parts[2])),
        2 => (parts[0], Some(parts[1]), None),
        1 => (parts[0], None, None),
        _ => return Err(malformed(line_no, line, "expected TRIGGERS:ACTIONS")),
    };

    let (actions_str, irq_from_semicolon) = match rest_str.and_then(|s| s.rsplit_once(';')) {
        Some((a, b)) => (Some(a), Some(b)),
        None => (rest_str, None),
    };

    let irq = irq_from_colon
        .or(irq_from_semicolon)
        .map(|s| s.trim().parse::<u32>().map_err(|_| format!("{s:?} is not an IRQ number")))
        .transpose()
        .map_err(wrap)?;

    let mut touched = Vec::new();
    let (triggers, combinator) = parse_equation_list(trig_str, registers, &mut touched).map_err(wrap)?;
    let (actions, _) = match actions_str {
        Some(s) => parse_equation_list(s, registers, &mut touched).map_err(wrap)?,
        None => (Vec::new(), Combinator::All),
    };

    Ok((Rule { triggers, combinator, actions, irq, block }, touched))
}

/// Flag line: `TYPE,ADDR,BITS,FREQ,VALUES` where `TYPE ∈ {S,V,C}` and
/// `VALUES` is `/`-separated hex.
fn parse_flag_line(
    line_no: usize,
    line: &str,
    block: usize,
    registers: &HashMap<u32, RegKind>,
) -> Result<Flag, NpmError> {
    if !FLAG_LINE_RE.is_match(line) {
        return Err(malformed(line_no, line, "does not match TYPE,ADDR,BITS,FREQ,VALUES"));
    }

    let wrap = |e: String| malformed(line_no, line, &e);
    let toks: Vec<&str> = line.split(',').collect();
    if toks.len() != 5 {
        return Err(malformed(line_no, line, "expected TYPE,ADDR,BITS,FREQ,VALUES"));
    }

    let kind = match toks[0] {
        "S" => FlagKind::Specific,
        "V" => FlagKind::Value,
        "C" => FlagKind::Counter,
        other => return Err(malformed(line_no, line, &format!("unknown flag type {other:?}"))),
    };
    let addr = parse_hex(toks[1]).map_err(wrap)?;
    let reg_kind = registers.get(&addr).copied().unwrap_or(RegKind::Other);
    let bits = parse_bits(toks[2]).map_err(wrap)?;
    let freq: u32 = toks[3].parse().map_err(|_| wrap(format!("{:?} is not a frequency", toks[3])))?;
    let values = toks[4]
        .split('/')
        .map(parse_hex)
        .collect::<Result<Vec<u32>, _>>()
        .map_err(wrap)?
        .into_iter()
        .map(u64::from)
        .collect();

    Ok(Flag { field: Field { kind: reg_kind, phaddr: addr, bits }, kind, freq, values, block })
}

/// Constraint line: `KIND,ADDR,BITS` where `KIND ∈ {R, W}` — a read-only or
/// write-only bit slice.
fn parse_constraint_line(line_no: usize, line: &str) -> Result<Constraint, NpmError> {
    if !CONSTRAINT_LINE_RE.is_match(line) {
        return Err(malformed(line_no, line, "does not match KIND,ADDR,BITS"));
    }

    let wrap = |e: String| malformed(line_no, line, &e);
    let toks: Vec<&str> = line.split(',').collect();
    if toks.len() != 3 {
        return Err(malformed(line_no, line, "expected KIND,ADDR,BITS"));
    }
    let kind = match toks[0] {
        "R" => ConstraintKind::ReadOnly,
        "W" => ConstraintKind::WriteOnly,
        other => return Err(malformed(line_no, line, &format!("unknown constraint kind {other:?}"))),
    };
    let addr = parse_hex(toks[1]).map_err(wrap)?;
    let bits = parse_bits(toks[2]).map_err(wrap)?;
    Ok(Constraint { kind, field: Field { kind: RegKind::Other, phaddr: addr, bits } })
}

/// Register line: `KIND_ADDRESS_RESET[_WIDTH]`.
fn parse_register_line(line_no: usize, line: &str) -> Result<(u32, Register), NpmError> {
    if !REGISTER_LINE_RE.is_match(line) {
        return Err(malformed(line_no, line, "does not match KIND_ADDR_RESET[_WIDTH]"));
    }

    let wrap = |e: String| malformed(line_no, line, &e);
    let parts: Vec<&str> = line.split('_').collect();
    if parts.len() != 3 && parts.len() != 4 {
        return Err(malformed(line_no, line, "expected KIND_ADDR_RESET[_WIDTH]"));
    }
    let kind_char = parts[0]
        .chars()
        .next()
        .ok_or_else(|| malformed(line_no, line, "empty register kind"))?;
    let kind = RegKind::from_letter(kind_char).ok_or(NpmError::UnknownRegKind(kind_char))?;
    let addr = parse_hex(parts[1]).map_err(wrap)?;
    let reset = parse_hex(parts[2]).map_err(wrap)?;
    let width = match parts.get(3) {
        Some(w) => w.parse().map_err(|_| malformed(line_no, line, "bad width"))?,
        None => 32,
    };
    Ok((addr, Register::new(kind, reset, width)))
}

/// Splits `text` into `==`-delimited sections, trimming the delimiter lines
/// themselves. Blank lines are dropped; every other line is kept verbatim
/// (with line numbers counted against the *original* file for diagnostics).
fn split_sections(text: &str) -> Vec<Vec<(usize, &str)>> {
    let mut sections: Vec<Vec<(usize, &str)>> = vec![Vec::new()];
    for (idx, raw_line) in text.lines().enumerate() {
        let line = raw_line.trim_end_matches('\r');
        if line == "==" {
            sections.push(Vec::new());
            continue;
        }
        if line.trim().is_empty() {
            continue;
        }
        sections.last_mut().unwrap().push((idx + 1, line));
    }
    sections
}

/// Splits one section's lines into `--`-delimited peripheral blocks.
fn split_blocks(lines: &[(usize, &str)]) -> Vec<Vec<(usize, &str)>> {
    let mut blocks: Vec<Vec<(usize, &str)>> = vec![Vec::new()];
    for &(line_no, line) in lines {
        if line == "--" {
            blocks.push(Vec::new());
        } else {
            blocks.last_mut().unwrap().push((line_no, line));
        }
    }
    blocks
}

/// Walks the declared registers in file order and builds the DR-to-SR index
/// (§4.1, I4): registers are clustered by address proximity (≤ 0x100 from
/// the previous register in the same cluster); within each cluster, the
/// most-recently-declared Status register becomes the SR for every
/// Receive/Transmit register that follows it in the same cluster.
fn build_dr_to_sr(registers: &[(u32, Register)]) -> HashMap<u32, u32> {
    let mut dr_to_sr = HashMap::new();
    let mut last_addr: Option<u32> = None;
    let mut last_status: Option<u32> = None;

    for &(addr, ref reg) in registers {
        let new_cluster = match last_addr {
            Some(prev) => addr.abs_diff(prev) > 0x100,
            None => false,
        };
        if new_cluster {
            last_status = None;
        }
        last_addr = Some(addr);

        match reg.kind {
            RegKind::Status => last_status = Some(addr),
            RegKind::Receive | RegKind::Transmit => {
                if let Some(sr) = last_status {
                    if addr.abs_diff(sr) <= 0x100 {
                        dr_to_sr.insert(addr, sr);
                    }
                }
            }
            _ => {}
        }
    }

    dr_to_sr
}

/// Parses a full NLP hardware-description file (§4.1) into its declared
/// registers and rule graph. Sequence rules (the `CCfileName` file) are
/// parsed separately by [`parse_cc_file`].
pub fn parse_nlp_file(source: &str) -> Result<ParsedModel, NpmError> {
    let sections = split_sections(source);
    if sections.len() < 4 {
        return Err(NpmError::MissingSection("expected register/rule/flag/constraint sections"));
    }

    let registers: Vec<(u32, Register)> = sections[0]
        .iter()
        .map(|&(line_no, line)| parse_register_line(line_no, line))
        .collect::<Result<_, _>>()?;
    let reg_kinds: HashMap<u32, RegKind> = registers.iter().map(|&(addr, ref r)| (addr, r.kind)).collect();

    let rule_blocks = split_blocks(&sections[1]);
    let flag_blocks = split_blocks(&sections[2]);

    let mut rules = Vec::new();
    let mut blocks = Vec::new();
    for (block_idx, block_lines) in rule_blocks.iter().enumerate() {
        let mut min = u32::MAX;
        let mut max = 0u32;
        for &(line_no, line) in block_lines {
            let (rule, touched) = parse_rule_line(line_no, line, block_idx, &reg_kinds)?;
            for addr in touched {
                min = min.min(addr);
                max = max.max(addr);
            }
            rules.push(rule);
        }
        blocks.push(if min <= max { BlockSpan { min, max } } else { BlockSpan { min: u32::MAX, max: 0 } });
    }

    let mut flags = Vec::new();
    for (block_idx, block_lines) in flag_blocks.iter().enumerate() {
        for &(line_no, line) in block_lines {
            flags.push(parse_flag_line(line_no, line, block_idx, &reg_kinds)?);
        }
    }

    let constraints: Vec<Constraint> = if sections.len() >= 5 {
        sections[4].iter().map(|&(line_no, line)| parse_constraint_line(line_no, line)).collect::<Result<_, _>>()?
    } else {
        Vec::new()
    };

    let dr_to_sr = build_dr_to_sr(&registers);
    let rule_graph = RuleGraph { rules, flags, blocks, dr_to_sr };

    Ok(ParsedModel { registers, rules: rule_graph, constraints })
}

/// A sequence-rule field-match token: `TYPE,ADDR,BITS[,OP,VALUE]`. `VALUE`
/// defaults to `1` when omitted; a whole-word `BITS = *` always matches
/// regardless of `VALUE` (the original's `checkField` short-circuits on
/// `bits[0] == -1` before ever comparing values).
fn parse_seq_field(line_no: usize, tok: &str) -> Result<SeqFieldMatch, NpmError> {
    let wrap = |e: String| malformed(line_no, tok, &e);
    let parts: Vec<&str> = tok.split(',').collect();
    if parts.len() != 3 && parts.len() != 5 {
        return Err(malformed(line_no, tok, "expected TYPE,ADDR,BITS[,OP,VALUE]"));
    }

    let kind = SeqStageKind::from_token(parts[0]).ok_or_else(|| malformed(line_no, tok, "unknown sequence type"))?;
    let addr = parse_hex(parts[1]).map_err(wrap)?;
    let bits = parse_bits(parts[2]).map_err(wrap)?;

    if bits == [-1] {
        return Ok(SeqFieldMatch {
            kind,
            field: Field { kind: RegKind::Other, phaddr: addr, bits },
            op: Op::Wildcard,
            rhs: Operand::Wildcard,
        });
    }

    let value = match parts.get(4) {
        Some(&"*") | None => 1,
        Some(v) => u64::from_str_radix(v, 2).map_err(|_| wrap(format!("{v:?} is not a binary literal")))?,
    };

    Ok(SeqFieldMatch { kind, field: Field { kind: RegKind::Other, phaddr: addr, bits }, op: Op::Eq, rhs: Operand::Literal(value) })
}

/// Parses the compliance-checker sequence-rule file: one [`SequenceRule`]
/// per line, stages separated by `->`, and each stage's field-matches
/// conjuncted with `&`.
pub fn parse_cc_file(source: &str) -> Result<Vec<SequenceRule>, NpmError> {
    let mut rules = Vec::new();
    for (idx, raw_line) in source.lines().enumerate() {
        let line = raw_line.trim_end_matches('\r');
        if line == "==" {
            break;
        }
        if line.trim().is_empty() {
            continue;
        }
        let line_no = idx + 1;
        if !SEQUENCE_LINE_RE.is_match(line) {
            return Err(malformed(line_no, line, "does not match the sequence-rule grammar"));
        }
        let stages = line
            .split("->")
            .map(|stage_str| {
                let matches = stage_str
                    .split('&')
                    .map(|tok| parse_seq_field(line_no, tok))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(SeqStage { matches })
            })
            .collect::<Result<Vec<_>, NpmError>>()?;
        rules.push(SequenceRule { stages });
    }
    Ok(rules)
}
