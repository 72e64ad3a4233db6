//! Vbucket hashing (`spec.md` §4.H).
//!
//! The key-to-vbucket map uses the classic CRC-32 (IEEE 802.3) checksum,
//! not Castagnoli, with the result right-shifted and masked per the
//! memcached client convention.

use crc::{Crc, CRC_32_ISO_HDLC};

const CRC32_IEEE: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Hashes `key` to a vbucket index in `0..vbucket_count`.
pub fn vbucket_for_key(key: &[u8], vbucket_count: usize) -> usize {
  let crc = CRC32_IEEE.checksum(key);
  let hashed = ((crc >> 16) & 0x7fff) as usize;
  hashed % vbucket_count.max(1)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn distributes_across_the_full_vbucket_range() {
    let mut seen = std::collections::HashSet::new();
    for i in 0..10_000u32 {
      let key = format!("document-{i}");
      seen.insert(vbucket_for_key(key.as_bytes(), 1024));
    }
    // not every vbucket will necessarily be hit, but the hash should spread
    // far beyond a handful of buckets.
    assert!(seen.len() > 500);
  }

  #[test]
  fn is_deterministic_for_a_fixed_key() {
    let a = vbucket_for_key(b"stable-key", 1024);
    let b = vbucket_for_key(b"stable-key", 1024);
    assert_eq!(a, b);
  }

  #[test]
  fn stays_in_bounds() {
    for i in 0..1000u32 {
      let key = format!("k{i}");
      let v = vbucket_for_key(key.as_bytes(), 1024);
      assert!(v < 1024);
    }
  }
}
