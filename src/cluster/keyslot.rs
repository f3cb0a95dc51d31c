// SPDX-License-Identifier: Apache-2.0

//! CRC16 keyslot computation (spec §4.5), including hash-tag support.
//!
//! Uses the `crc` crate the same way the teacher's storage checksum wrapper
//! does (`server/src/engine/storage/checksum.rs`), just with the 16-bit
//! XMODEM parameters (poly `0x1021`, init `0`, no reflect) that the
//! reference cluster keyslot algorithm is built on.

use crc::{Crc, CRC_16_XMODEM};

const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

pub const SLOT_COUNT: u16 = 16384;

/// Compute the cluster keyslot for `key`, honouring a `{...}` hash tag:
/// if `key` contains `{`, and a `}` follows it with at least one byte
/// between them, only that inner substring is hashed.
pub fn keyslot(key: &[u8]) -> u16 {
    let tagged = hash_tag(key).unwrap_or(key);
    CRC16.checksum(tagged) % SLOT_COUNT
}

fn hash_tag(key: &[u8]) -> Option<&[u8]> {
    let open = key.iter().position(|&b| b == b'{')?;
    let close_rel = key[open + 1..].iter().position(|&b| b == b'}')?;
    if close_rel == 0 {
        return None;
    }
    Some(&key[open + 1..open + 1 + close_rel])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_key_same_slot() {
        assert_eq!(keyslot(b"foo"), keyslot(b"foo"));
    }

    #[test]
    fn hash_tag_makes_two_keys_cohabit() {
        assert_eq!(keyslot(b"{user1000}.following"), keyslot(b"{user1000}.followers"));
    }

    #[test]
    fn empty_hash_tag_is_ignored() {
        // `{}` has nothing between the braces, so the whole key is hashed,
        // same as if no braces were present at all.
        assert_eq!(keyslot(b"{}foo"), keyslot(b"{}foo"));
        assert_ne!(keyslot(b"{}foo"), keyslot(b"foo"));
    }

    #[test]
    fn slot_is_in_range() {
        for k in ["a", "b", "{tag}rest", "unrelated-key-name"] {
            assert!(keyslot(k.as_bytes()) < SLOT_COUNT);
        }
    }
}
