//! Protocol-specific `Buf`/`BufMut` helpers, in the style of this codebase's
//! `mysql::buf_ext`/`pg::buf_ext` extension traits, but for the KV binary
//! protocol's big-endian framing.

use bytes::{Buf, BufMut};

pub trait BufExt: Buf {
  /// Reads a big-endian length-prefixed (2-byte) byte string, as used for
  /// SCRAM challenge/response payloads embedded in a larger value.
  fn kv_get_u16_prefixed(&mut self) -> Vec<u8> {
    let len = self.get_u16() as usize;
    let mut bytes = vec![0; len];
    self.copy_to_slice(&mut bytes);
    bytes
  }

  fn kv_get_fixed(&mut self, len: usize) -> Vec<u8> {
    let mut bytes = vec![0; len];
    self.copy_to_slice(&mut bytes);
    bytes
  }
}

pub trait BufMutExt: BufMut {
  fn kv_put_u16_prefixed(&mut self, bytes: &[u8]) {
    self.put_u16(bytes.len() as u16);
    self.put_slice(bytes);
  }
}

impl<T> BufExt for T where T: Buf {}
impl<T> BufMutExt for T where T: BufMut {}
