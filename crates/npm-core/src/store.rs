//! Per-state register map: current values, TX/RX byte queues, and the
//! address-correction / bit-band-alias logic that lets sub-word and
//! single-bit MMIO accesses resolve against whole-word declared registers.

use std::collections::{BTreeMap, VecDeque};

use crate::types::RegKind;

pub const BIT_BAND_ALIAS_LOW: u32 = 0x4200_0000;
pub const BIT_BAND_ALIAS_HIGH: u32 = 0x43FF_FFFC;
pub const BIT_BAND_BASE: u32 = 0x4000_0000;

/// A single peripheral register, tagged by kind (§3, §9 "Polymorphism over
/// register kinds").
#[derive(Debug, Clone)]
pub struct Register {
    pub kind: RegKind,
    pub reset: u32,
    pub cur_value: u32,
    pub width: u32,
    /// TX fullness indicator (bit count) and last-written word.
    pub t_size: u32,
    pub t_value: u32,
    /// RX fullness, in bits. Invariant I1: always `8 * r_value.len()`.
    pub r_size: u32,
    pub r_value: VecDeque<u8>,
    /// Set when a canned response has been synthesized into `r_value` and
    /// not yet fully drained (§3 "Instruction/ACK bit").
    pub canned_ack: bool,
}

impl Register {
    pub fn new(kind: RegKind, reset: u32, width: u32) -> Self {
        Self {
            kind,
            reset,
            cur_value: reset,
            width,
            t_size: 0,
            t_value: 0,
            r_size: 0,
            r_value: VecDeque::new(),
            canned_ack: false,
        }
    }
}

/// The address-correction result: the nearest declared address at or below
/// the requested one, plus the bit offset between them.
#[derive(Debug, Clone, Copy)]
pub struct Corrected {
    pub phaddr: u32,
    pub bit_offset: u32,
}

#[derive(Debug, Clone, Default)]
pub struct RegisterStore {
    regs: BTreeMap<u32, Register>,
}

impl RegisterStore {
    pub fn new() -> Self {
        Self { regs: BTreeMap::new() }
    }

    pub fn insert(&mut self, phaddr: u32, reg: Register) {
        self.regs.insert(phaddr, reg);
    }

    pub fn get(&self, phaddr: u32) -> Option<&Register> {
        self.regs.get(&phaddr)
    }

    pub fn get_mut(&mut self, phaddr: u32) -> Option<&mut Register> {
        self.regs.get_mut(&phaddr)
    }

    pub fn contains(&self, phaddr: u32) -> bool {
        self.regs.contains_key(&phaddr)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&u32, &Register)> {
        self.regs.iter()
    }

    pub fn addresses(&self) -> impl Iterator<Item = u32> + '_ {
        self.regs.keys().copied()
    }

    pub fn write_ph(&mut self, phaddr: u32, val: u32) {
        if let Some(r) = self.regs.get_mut(&phaddr) {
            r.cur_value = val;
        }
    }

    pub fn read_ph(&self, phaddr: u32) -> u32 {
        self.regs.get(&phaddr).map(|r| r.cur_value).unwrap_or(0)
    }

    /// Shifts `t_value` left by `width` bits and ORs `byte` in; resets
    /// `t_size`. Per §9 Open Questions, `width` is always called with `1`
    /// at the gateway call site regardless of the actual access size — this
    /// store method honors whatever width its caller passes.
    pub fn write_tx(&mut self, phaddr: u32, byte: u32, width: u32) {
        if let Some(r) = self.regs.get_mut(&phaddr) {
            r.t_value = (r.t_value << width) | byte;
            r.t_size = 0;
        }
    }

    /// Pops one byte from the RX FIFO; returns 0 if empty.
    pub fn read_rx_byte(&mut self, phaddr: u32) -> u8 {
        let Some(r) = self.regs.get_mut(&phaddr) else { return 0 };
        let byte = r.r_value.pop_front().unwrap_or(0);
        r.r_size = r.r_size.saturating_sub(8);
        if r.r_value.is_empty() {
            r.canned_ack = false;
        }
        byte
    }

    /// Only pushes if the RX queue is currently empty (§4.2).
    pub fn push_rx(&mut self, phaddr: u32, bytes: &[u8], total_bits: u32) {
        if let Some(r) = self.regs.get_mut(&phaddr) {
            if r.r_value.is_empty() {
                r.r_value = bytes.iter().copied().collect();
                r.r_size = total_bits;
            }
        }
    }

    /// Pads the RX FIFO with zero bytes until it holds at least `n` bytes.
    pub fn pad_rx_to(&mut self, phaddr: u32, n: usize) {
        if let Some(r) = self.regs.get_mut(&phaddr) {
            while r.r_value.len() < n {
                r.r_value.push_back(0);
            }
            r.r_size = (r.r_value.len() * 8) as u32;
        }
    }

    /// Finds the nearest declared address `<= phaddr`, and the bit offset
    /// between them (B1). Matches the original's `upper_bound` then
    /// step-back: "largest declared address `<= phaddr`".
    pub fn address_correct(&self, phaddr: u32) -> Option<Corrected> {
        if self.regs.contains_key(&phaddr) {
            return Some(Corrected { phaddr, bit_offset: 0 });
        }
        self.regs
            .range(..=phaddr)
            .next_back()
            .map(|(&addr, _)| Corrected { phaddr: addr, bit_offset: (phaddr - addr) * 8 })
    }
}

/// Bit-band alias resolution (§4.2). Maps a single-bit alias address to the
/// aliased word address and the bit index within it.
pub fn bit_band_resolve(addr: u32) -> Option<(u32, u32)> {
    if !(BIT_BAND_ALIAS_LOW..=BIT_BAND_ALIAS_HIGH).contains(&addr) {
        return None;
    }
    let rel = addr - BIT_BAND_ALIAS_LOW;
    let word = rel / 32 + BIT_BAND_BASE;
    let bit = (rel % 32) / 4;
    Some((word, bit))
}
