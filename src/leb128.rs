//! Unsigned LEB128 encoding for collection-UID key prefixes (`spec.md` §3, §8).

use bytes::{Buf, BufMut};

/// Encodes `value` as unsigned LEB128 into `buf`, returning the number of bytes written.
pub fn encode_u32(mut value: u32, buf: &mut impl BufMut) -> usize {
  let mut written = 0;
  loop {
    let mut byte = (value & 0x7f) as u8;
    value >>= 7;
    if value != 0 {
      byte |= 0x80;
    }
    buf.put_u8(byte);
    written += 1;
    if value == 0 {
      break;
    }
  }
  written
}

/// Decodes an unsigned LEB128 value, advancing `buf` past the encoding.
pub fn decode_u32(buf: &mut impl Buf) -> Option<u32> {
  let mut value: u32 = 0;
  let mut shift = 0;
  loop {
    if !buf.has_remaining() || shift >= 35 {
      return None;
    }
    let byte = buf.get_u8();
    value |= ((byte & 0x7f) as u32) << shift;
    if byte & 0x80 == 0 {
      return Some(value);
    }
    shift += 7;
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use bytes::BytesMut;

  #[test]
  fn round_trips_across_the_u32_range() {
    for n in [0u32, 1, 127, 128, 300, u16::MAX as u32, u32::MAX / 2, u32::MAX] {
      let mut buf = BytesMut::new();
      encode_u32(n, &mut buf);
      let mut slice = &buf[..];
      assert_eq!(decode_u32(&mut slice), Some(n));
      assert!(slice.is_empty());
    }
  }

  #[test]
  fn zero_collection_uid_is_a_single_byte() {
    let mut buf = BytesMut::new();
    let written = encode_u32(0, &mut buf);
    assert_eq!(written, 1);
    assert_eq!(&buf[..], &[0x00]);
  }
}
