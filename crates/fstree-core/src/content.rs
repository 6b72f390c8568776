// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Position-derived byte pattern used for content checks
//!
//! Every byte depends only on its file offset, so concurrent or overlapping writes of
//! the pattern can never disagree about what a region should hold.

use serde::Serialize;

pub fn pattern_byte(offset: u64) -> u8 {
    let mixed = offset.wrapping_mul(0x9E37_79B9_7F4A_7C15) >> 56;
    (mixed as u8) ^ (offset as u8)
}

pub fn pattern_bytes(offset: u64, len: usize) -> Vec<u8> {
    (0..len as u64).map(|i| pattern_byte(offset + i)).collect()
}

/// Result of reading a file back against its written ranges
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PatternReport {
    pub checked_bytes: u64,
    pub mismatches: u64,
    pub first_mismatch: Option<u64>,
}

impl PatternReport {
    pub fn is_clean(&self) -> bool {
        self.mismatches == 0
    }

    pub(crate) fn record_mismatch(&mut self, offset: u64) {
        self.mismatches += 1;
        if self.first_mismatch.is_none() {
            self.first_mismatch = Some(offset);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_depends_only_on_offset() {
        let whole = pattern_bytes(0, 64);
        let tail = pattern_bytes(32, 32);
        assert_eq!(&whole[32..], tail.as_slice());
    }

    #[test]
    fn pattern_is_not_constant() {
        let bytes = pattern_bytes(0, 256);
        assert!(bytes.iter().any(|b| *b != bytes[0]));
    }
}
