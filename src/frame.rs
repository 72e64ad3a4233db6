//! Frame codec: the 24-byte KV header plus its four optional body sections
//! (`spec.md` §3 "Frame", §4.A, §6 "Wire (KV)").

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::opcode::Status;

/// One of the six magic bytes a KV frame may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Magic {
  ClientRequest,
  AltClientRequest,
  ClientResponse,
  AltClientResponse,
  ServerRequest,
  ServerResponse,
}

impl Magic {
  pub const fn as_u8(self) -> u8 {
    match self {
      Magic::ClientRequest => 0x80,
      Magic::AltClientRequest => 0x08,
      Magic::ClientResponse => 0x81,
      Magic::AltClientResponse => 0x18,
      Magic::ServerRequest => 0x82,
      Magic::ServerResponse => 0x83,
    }
  }

  pub const fn from_u8(b: u8) -> Option<Self> {
    match b {
      0x80 => Some(Magic::ClientRequest),
      0x08 => Some(Magic::AltClientRequest),
      0x81 => Some(Magic::ClientResponse),
      0x18 => Some(Magic::AltClientResponse),
      0x82 => Some(Magic::ServerRequest),
      0x83 => Some(Magic::ServerResponse),
      _ => None,
    }
  }

  pub const fn is_alt(self) -> bool {
    matches!(self, Magic::AltClientRequest | Magic::AltClientResponse)
  }

  pub const fn is_response(self) -> bool {
    matches!(self, Magic::ClientResponse | Magic::AltClientResponse | Magic::ServerResponse)
  }

  pub const fn is_request(self) -> bool {
    !self.is_response()
  }
}

bitflags::bitflags! {
  /// Datatype bitset (`spec.md` §3).
  #[derive(Debug, Clone, Copy, PartialEq, Eq)]
  pub struct Datatype: u8 {
    const RAW = 0;
    const JSON = 0x01;
    const SNAPPY = 0x02;
    const XATTR = 0x04;
  }
}

/// Framing-extras entries, nibble-packed `[id:4][len:4]` (`spec.md` §6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FramingExtra {
  Barrier,
  Durability { level: u8, timeout_ms: Option<u16> },
  Unknown { id: u8, data: Vec<u8> },
}

impl FramingExtra {
  fn encode(&self, buf: &mut BytesMut) {
    match self {
      FramingExtra::Barrier => {
        buf.put_u8((1 << 4) | 0);
      }
      FramingExtra::Durability { level, timeout_ms } => {
        let len: u8 = if timeout_ms.is_some() { 3 } else { 1 };
        buf.put_u8((2 << 4) | len);
        buf.put_u8(*level);
        if let Some(ms) = timeout_ms {
          buf.put_u16(*ms);
        }
      }
      FramingExtra::Unknown { id, data } => {
        buf.put_u8((id << 4) | (data.len() as u8 & 0x0f));
        buf.put_slice(data);
      }
    }
  }

  fn decode_all(mut body: Bytes) -> Vec<FramingExtra> {
    let mut out = Vec::new();
    while body.has_remaining() {
      let control = body.get_u8();
      let id = (control >> 4) & 0x0f;
      let mut len = (control & 0x0f) as usize;
      // the nibble length is itself an escape for >14 in the real protocol;
      // this core only needs lengths within the 4-bit range for barrier
      // and durability frames, which always fit.
      len = len.min(body.remaining());
      let data = body.copy_to_bytes(len);
      out.push(match (id, data.len()) {
        (1, _) => FramingExtra::Barrier,
        (2, 1) => FramingExtra::Durability {
          level: data[0],
          timeout_ms: None,
        },
        (2, 3) => FramingExtra::Durability {
          level: data[0],
          timeout_ms: Some(u16::from_be_bytes([data[1], data[2]])),
        },
        _ => FramingExtra::Unknown {
          id,
          data: data.to_vec(),
        },
      });
    }
    out
  }
}

pub const HEADER_SIZE: usize = 24;

/// A decoded (or about-to-be-encoded) KV frame.
#[derive(Debug, Clone)]
pub struct Frame {
  pub magic: Magic,
  pub opcode: u8,
  pub datatype: Datatype,
  /// vbucket id on requests, status code on responses.
  pub status_or_vbucket: u16,
  pub opaque: u32,
  pub cas: u64,
  pub framing_extras: Vec<FramingExtra>,
  pub extras: Bytes,
  pub key: Bytes,
  pub value: Bytes,
}

impl Frame {
  pub fn status(&self) -> Status {
    Status::from_u16(self.status_or_vbucket)
  }

  fn framing_extras_len(&self) -> usize {
    self
      .framing_extras
      .iter()
      .map(|e| {
        let mut tmp = BytesMut::new();
        e.encode(&mut tmp);
        tmp.len()
      })
      .sum()
  }

  /// Encodes this frame into a fresh contiguous buffer.
  pub fn encode(&self) -> Bytes {
    let mut framing_buf = BytesMut::new();
    for extra in &self.framing_extras {
      extra.encode(&mut framing_buf);
    }

    let key_len = self.key.len();
    let extras_len = self.extras.len();
    let value_len = self.value.len();
    let framing_len = framing_buf.len();

    let total_body_len = framing_len + extras_len + key_len + value_len;

    let mut buf = BytesMut::with_capacity(HEADER_SIZE + total_body_len);
    buf.put_u8(self.magic.as_u8());
    buf.put_u8(self.opcode);

    if self.magic.is_alt() {
      // high byte: framing-extras length, low byte: key length.
      buf.put_u8(framing_len as u8);
      buf.put_u8(key_len as u8);
    } else {
      buf.put_u16(key_len as u16);
    }

    buf.put_u8(extras_len as u8);
    buf.put_u8(self.datatype.bits());
    buf.put_u16(self.status_or_vbucket);
    buf.put_u32(total_body_len as u32);
    buf.put_u32(self.opaque);
    buf.put_u64(self.cas);

    buf.put_slice(&framing_buf);
    buf.put_slice(&self.extras);
    buf.put_slice(&self.key);
    buf.put_slice(&self.value);

    buf.freeze()
  }
}

/// Outcome of [`FrameCodec::next`].
#[derive(Debug)]
pub enum DecodeResult {
  Ok(Frame),
  NeedData,
  Failure(String),
}

/// Accumulates bytes from the socket and yields complete frames.
#[derive(Debug, Default)]
pub struct FrameCodec {
  buf: BytesMut,
}

impl FrameCodec {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn feed(&mut self, bytes: &[u8]) {
    self.buf.extend_from_slice(bytes);
  }

  /// Attempts to decode one frame from the accumulated buffer.
  pub fn next(&mut self) -> DecodeResult {
    if self.buf.len() < HEADER_SIZE {
      return DecodeResult::NeedData;
    }

    let magic_byte = self.buf[0];
    let magic = match Magic::from_u8(magic_byte) {
      Some(m) => m,
      None => return DecodeResult::Failure(format!("invalid magic byte 0x{magic_byte:02x}")),
    };

    let opcode = self.buf[1];
    let (framing_extras_len, key_len): (usize, usize) = if magic.is_alt() {
      (self.buf[2] as usize, self.buf[3] as usize)
    } else {
      (0, u16::from_be_bytes([self.buf[2], self.buf[3]]) as usize)
    };
    let extras_len = self.buf[4] as usize;
    let datatype = Datatype::from_bits_truncate(self.buf[5]);
    let status_or_vbucket = u16::from_be_bytes([self.buf[6], self.buf[7]]);
    let total_body_len = u32::from_be_bytes([self.buf[8], self.buf[9], self.buf[10], self.buf[11]]) as usize;
    let opaque = u32::from_be_bytes([self.buf[12], self.buf[13], self.buf[14], self.buf[15]]);
    let cas = u64::from_be_bytes([
      self.buf[16],
      self.buf[17],
      self.buf[18],
      self.buf[19],
      self.buf[20],
      self.buf[21],
      self.buf[22],
      self.buf[23],
    ]);

    if framing_extras_len + extras_len + key_len > total_body_len {
      return DecodeResult::Failure("body section lengths exceed total body length".into());
    }

    if self.buf.len() < HEADER_SIZE + total_body_len {
      return DecodeResult::NeedData;
    }

    self.buf.advance(HEADER_SIZE);
    let mut body = self.buf.split_to(total_body_len).freeze();

    let framing_bytes = body.split_to(framing_extras_len);
    let extras = body.split_to(extras_len);
    let key = body.split_to(key_len);
    let value = body;

    let framing_extras = FramingExtra::decode_all(framing_bytes);

    let frame = Frame {
      magic,
      opcode,
      datatype,
      status_or_vbucket,
      opaque,
      cas,
      framing_extras,
      extras,
      key,
      value,
    };

    // best-effort resynchronization: if the next frame in the buffer
    // starts with an invalid magic, assume the stream desynced and drop
    // everything we have buffered rather than spin on garbage.
    if let Some(&next_magic) = self.buf.first() {
      if Magic::from_u8(next_magic).is_none() {
        tracing::warn!(
          opcode = frame.opcode,
          opaque = frame.opaque,
          next_magic,
          buffered = self.buf.len(),
          "invalid magic for next frame, discarding buffered bytes"
        );
        self.buf.clear();
      }
    }

    DecodeResult::Ok(frame)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn sample_frame() -> Frame {
    Frame {
      magic: Magic::ClientRequest,
      opcode: 0x00,
      datatype: Datatype::RAW,
      status_or_vbucket: 42,
      opaque: 7,
      cas: 0,
      framing_extras: vec![],
      extras: Bytes::new(),
      key: Bytes::from_static(b"missing"),
      value: Bytes::new(),
    }
  }

  #[test]
  fn encode_then_decode_round_trips() {
    let frame = sample_frame();
    let encoded = frame.encode();

    let mut codec = FrameCodec::new();
    codec.feed(&encoded);
    match codec.next() {
      DecodeResult::Ok(decoded) => {
        assert_eq!(decoded.magic, frame.magic);
        assert_eq!(decoded.opcode, frame.opcode);
        assert_eq!(decoded.status_or_vbucket, frame.status_or_vbucket);
        assert_eq!(decoded.opaque, frame.opaque);
        assert_eq!(decoded.key, frame.key);
      }
      other => panic!("expected Ok, got {other:?}"),
    }
  }

  #[test]
  fn partial_header_needs_more_data() {
    let frame = sample_frame();
    let encoded = frame.encode();
    let mut codec = FrameCodec::new();
    codec.feed(&encoded[..10]);
    assert!(matches!(codec.next(), DecodeResult::NeedData));
  }

  #[test]
  fn partial_body_needs_more_data() {
    let frame = Frame {
      value: Bytes::from_static(b"some longer value here"),
      ..sample_frame()
    };
    let encoded = frame.encode();
    let mut codec = FrameCodec::new();
    codec.feed(&encoded[..encoded.len() - 3]);
    assert!(matches!(codec.next(), DecodeResult::NeedData));
  }

  #[test]
  fn empty_body_parses_with_empty_sections() {
    let frame = Frame {
      key: Bytes::new(),
      ..sample_frame()
    };
    let encoded = frame.encode();
    let mut codec = FrameCodec::new();
    codec.feed(&encoded);
    match codec.next() {
      DecodeResult::Ok(decoded) => {
        assert!(decoded.key.is_empty());
        assert!(decoded.extras.is_empty());
        assert!(decoded.value.is_empty());
      }
      other => panic!("expected Ok, got {other:?}"),
    }
  }

  #[test]
  fn invalid_magic_is_rejected() {
    let mut codec = FrameCodec::new();
    let mut bad = vec![0u8; HEADER_SIZE];
    bad[0] = 0xAB;
    codec.feed(&bad);
    assert!(matches!(codec.next(), DecodeResult::Failure(_)));
  }

  #[test]
  fn alt_magic_packs_framing_extras_length_into_the_high_byte() {
    let frame = Frame {
      magic: Magic::AltClientRequest,
      framing_extras: vec![FramingExtra::Durability {
        level: 1,
        timeout_ms: Some(2500),
      }],
      ..sample_frame()
    };
    let encoded = frame.encode();
    // byte 2 is the framing-extras length in alt-request frames.
    assert_eq!(encoded[2], 4); // 1 control byte + 1 level byte + 2 timeout bytes

    let mut codec = FrameCodec::new();
    codec.feed(&encoded);
    match codec.next() {
      DecodeResult::Ok(decoded) => {
        assert_eq!(decoded.framing_extras.len(), 1);
        assert_eq!(
          decoded.framing_extras[0],
          FramingExtra::Durability {
            level: 1,
            timeout_ms: Some(2500)
          }
        );
      }
      other => panic!("expected Ok, got {other:?}"),
    }
  }

  #[test]
  fn resynchronizes_after_an_invalid_next_magic() {
    let frame = sample_frame();
    let mut encoded = frame.encode().to_vec();
    encoded.push(0xFF); // garbage byte that isn't a valid magic
    let mut codec = FrameCodec::new();
    codec.feed(&encoded);
    assert!(matches!(codec.next(), DecodeResult::Ok(_)));
    // the trailing garbage byte should have been discarded, not retained
    // waiting for more data that would never complete it.
    assert!(codec.buf.is_empty());
  }
}
