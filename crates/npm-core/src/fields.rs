//! Field get/set (§4.3.2): the indirection layer between the rule graph and
//! the register store (or, for `MemMapped` fields, the CPU's own memory).

use crate::hooks::CpuHooks;
use crate::store::RegisterStore;
use crate::types::{Field, RegKind};

/// Reads the numeric value addressed by `field`.
///
/// Whole-word fields (`bits == [-1]`) on `Transmit`/`Receive` registers read
/// the FIFO fullness counters (`t_size`/`r_size`) rather than `cur_value` —
/// this is the "TX/RX fullness reference" the data model allows as an
/// equation operand (§3). Every other kind, and every bit-sliced field,
/// reads `cur_value`.
pub fn get_field(store: &RegisterStore, hooks: &mut dyn CpuHooks, field: &Field) -> u64 {
    let word = source_word(store, hooks, field);
    extract_bits(word, &field.bits)
}

/// Writes `value` into the bits addressed by `field`.
pub fn set_field(store: &mut RegisterStore, hooks: &mut dyn CpuHooks, field: &Field, value: u64) {
    if field.kind == RegKind::MemMapped {
        let ptr = store.read_ph(field.phaddr);
        let word = hooks.mem_read_u32(ptr);
        let updated = place_bits(word, &field.bits, value);
        hooks.mem_write_u32(ptr, updated);
        return;
    }

    if field.is_whole_word() {
        match field.kind {
            RegKind::Transmit => {
                if let Some(r) = store.get_mut(field.phaddr) {
                    r.t_size = value as u32;
                }
            }
            RegKind::Receive => {
                if let Some(r) = store.get_mut(field.phaddr) {
                    r.r_size = value as u32;
                }
            }
            _ => store.write_ph(field.phaddr, value as u32),
        }
        return;
    }

    let word = store.read_ph(field.phaddr);
    let updated = place_bits(word, &field.bits, value) as u32;
    store.write_ph(field.phaddr, updated);
}

fn source_word(store: &RegisterStore, hooks: &mut dyn CpuHooks, field: &Field) -> u32 {
    if field.kind == RegKind::MemMapped {
        let ptr = store.read_ph(field.phaddr);
        return hooks.mem_read_u32(ptr);
    }
    if field.is_whole_word() {
        match field.kind {
            RegKind::Transmit => return store.get(field.phaddr).map(|r| r.t_size).unwrap_or(0),
            RegKind::Receive => return store.get(field.phaddr).map(|r| r.r_size).unwrap_or(0),
            _ => {}
        }
    }
    store.read_ph(field.phaddr)
}

/// Extracts a (possibly non-contiguous) MSB-first bit list from `word`.
/// `bits == [-1]` returns the whole word.
pub fn extract_bits(word: u32, bits: &[i32]) -> u64 {
    if bits == [-1] {
        return word as u64;
    }
    let n = bits.len();
    let mut result: u64 = 0;
    for (i, &b) in bits.iter().enumerate() {
        let bit_val = (word >> b) & 1;
        let pos = n - 1 - i;
        result |= (bit_val as u64) << pos;
    }
    result
}

/// Writes `value`'s bits (MSB-first, matching `extract_bits`) back into
/// `word` at the positions named by `bits`.
pub fn place_bits(word: u32, bits: &[i32], value: u64) -> u64 {
    if bits == [-1] {
        return value & 0xFFFF_FFFF;
    }
    let n = bits.len();
    let mut out = word;
    for (i, &b) in bits.iter().enumerate() {
        let pos = n - 1 - i;
        let bit_val = ((value >> pos) & 1) as u32;
        out = (out & !(1 << b)) | (bit_val << b);
    }
    out as u64
}
