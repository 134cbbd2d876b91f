//! Built-in canned-response table (§3 "Canned responses", §9 Design Notes):
//! a fixed, ordered table of TX-value-triggered RX synthesis rules, applied
//! at load time rather than parsed from the NLP file (the grammar in §4.1
//! has no line format for this).
//!
//! Only the `0xAAFA` -> "OK\r\n" sentinel is address-agnostic, matched
//! against every declared `Transmit` register. The other three sentinels
//! are gated to the two specific data registers the original hardcodes
//! (`0x40028014` for the bit-15/bit-12 one-byte responses, `0x40005410` for
//! the 66-byte `0x84` response) and are mutually exclusive with each
//! other and with the address-agnostic entry — `gateway::write` applies at
//! most the first matching entry per write, mirroring the original's
//! `if / else if` chain.

use crate::types::{CannedResponse, TxMatch};

/// "OK\r\n" — response for the `0xAAFA` TX sentinel.
const OK_RESPONSE: [u8; 4] = [0x4F, 0x4B, 0x0D, 0x0A];

/// The data register the bit-15/bit-12 one-byte canned responses are
/// gated to.
const ACK_REGISTER: u32 = 0x4002_8014;

/// The data register the 66-byte `0x84` canned response is gated to.
const LONG_RESPONSE_REGISTER: u32 = 0x4000_5410;

/// The 66-byte response synthesized for a TX value of `0x84` at
/// [`LONG_RESPONSE_REGISTER`].
fn long_response() -> Vec<u8> {
    let mut bytes = vec![0x00, 0x16];
    bytes.extend(std::iter::repeat(0x01).take(64));
    bytes
}

/// Builds the canned-response table: one address-agnostic `0xAAFA` entry
/// per declared Transmit register, plus the two address-gated entries.
/// Entries are in priority order — `gateway::write` stops at the first
/// match, so a write that happens to satisfy more than one sentinel (e.g.
/// `0xAAFA` also has bit 15 set) only ever produces one response.
pub fn built_in_table(tx_addrs: &[u32]) -> Vec<CannedResponse> {
    let mut table = Vec::new();
    for &phaddr in tx_addrs {
        table.push(CannedResponse { phaddr, sentinel: TxMatch::Equals(0xAAFA), response: OK_RESPONSE.to_vec() });
    }
    table.push(CannedResponse { phaddr: ACK_REGISTER, sentinel: TxMatch::BitSet(15), response: vec![0x04] });
    table.push(CannedResponse { phaddr: ACK_REGISTER, sentinel: TxMatch::BitSet(12), response: vec![0x20] });
    table.push(CannedResponse {
        phaddr: LONG_RESPONSE_REGISTER,
        sentinel: TxMatch::Equals(0x84),
        response: long_response(),
    });
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_sentinel_is_address_agnostic() {
        let table = built_in_table(&[0x4000_4008, 0x4000_9000]);
        let matches: Vec<u32> =
            table.iter().filter(|c| c.sentinel.matches(0xAAFA)).map(|c| c.phaddr).collect();
        assert_eq!(matches, vec![0x4000_4008, 0x4000_9000]);
    }

    #[test]
    fn bit_sentinels_are_gated_to_the_ack_register() {
        let table = built_in_table(&[0x4000_4008]);
        for entry in table.iter().filter(|c| c.sentinel.matches(0x8000) || c.sentinel.matches(0x1000)) {
            assert_eq!(entry.phaddr, ACK_REGISTER);
        }
    }

    #[test]
    fn long_response_entry_has_66_bytes_and_is_gated() {
        let table = built_in_table(&[0x4000_4008]);
        let entry = table.iter().find(|c| c.sentinel.matches(0x84) && c.phaddr == LONG_RESPONSE_REGISTER).unwrap();
        assert_eq!(entry.response.len(), 66);
        assert_eq!(&entry.response[..2], &[0x00, 0x16]);
    }
}
