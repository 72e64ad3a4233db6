//! Message registry (`spec.md` §4.B): per-opcode request assembly and
//! response parsing, grounded on `other_examples`
//! `ops_core.rs`/`ops_crud.rs` (`encode_collection_and_key`,
//! `encode_req_ext_frames`, `decode_common_status`). Expressed as plain
//! encode/decode functions over `Frame` rather than a runtime table, since
//! Rust's exhaustive `match` over `OpCode` already gives the "enumerable by
//! a test suite" property the distilled text asks for without an extra
//! indirection layer.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{status_to_kind, ErrorKind, KvError};
use crate::frame::{Datatype, Frame, FramingExtra, Magic};
use crate::leb128;
use crate::opcode::{OpCode, Status};

/// Enhanced durability requirement carried in framing-extras id 2
/// (`spec.md` §4.B, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Durability {
  None,
  Majority,
  MajorityAndPersistToActive,
  PersistToMajority,
}

impl Durability {
  fn level(self) -> u8 {
    match self {
      Durability::None => 0,
      Durability::Majority => 1,
      Durability::MajorityAndPersistToActive => 2,
      Durability::PersistToMajority => 3,
    }
  }
}

/// Prefixes `key` with the LEB128-encoded collection UID, unless the UID is
/// the implicit default collection (`0`), per `spec.md` §3 "document identity".
pub fn encode_collection_and_key(collection_uid: u32, key: &[u8]) -> Vec<u8> {
  let mut buf = BytesMut::with_capacity(key.len() + 5);
  leb128::encode_u32(collection_uid, &mut buf);
  buf.extend_from_slice(key);
  buf.to_vec()
}

fn durability_framing_extra(durability: Option<Durability>, timeout_ms: Option<u16>) -> Vec<FramingExtra> {
  match durability {
    Some(level) => vec![FramingExtra::Durability { level: level.level(), timeout_ms }],
    None => vec![],
  }
}

/// Request magic is `AltClientRequest` whenever framing-extras are present,
/// `ClientRequest` otherwise (`spec.md` §4.A).
fn magic_for(framing_extras: &[FramingExtra]) -> Magic {
  if framing_extras.is_empty() {
    Magic::ClientRequest
  } else {
    Magic::AltClientRequest
  }
}

pub struct GetRequest<'a> {
  pub vbucket_id: u16,
  pub collection_uid: u32,
  pub key: &'a [u8],
  pub opaque: u32,
}

pub fn encode_get(req: &GetRequest<'_>) -> Frame {
  let key = encode_collection_and_key(req.collection_uid, req.key);
  Frame {
    magic: Magic::ClientRequest,
    opcode: OpCode::Get.as_u8(),
    datatype: Datatype::empty(),
    status_or_vbucket: req.vbucket_id,
    opaque: req.opaque,
    cas: 0,
    framing_extras: vec![],
    extras: Bytes::new(),
    key: Bytes::from(key),
    value: Bytes::new(),
  }
}

#[derive(Debug, Clone)]
pub struct GetResponse {
  pub cas: u64,
  pub flags: u32,
  pub value: Bytes,
  pub datatype: Datatype,
}

pub fn decode_get_response(frame: &Frame) -> Result<GetResponse, KvError> {
  if let Some(kind) = map_common_status(OpCode::Get, frame.status())? {
    return Err(KvError::new(kind));
  }
  let mut extras = frame.extras.clone();
  if extras.len() < 4 {
    return Err(KvError::new(ErrorKind::ParsingFailure));
  }
  let flags = extras.get_u32();
  Ok(GetResponse { cas: frame.cas, flags, value: frame.value.clone(), datatype: frame.datatype })
}

pub struct UpsertRequest<'a> {
  pub vbucket_id: u16,
  pub collection_uid: u32,
  pub key: &'a [u8],
  pub value: &'a [u8],
  pub flags: u32,
  pub expiry: u32,
  pub cas: u64,
  pub datatype: Datatype,
  pub durability: Option<Durability>,
  pub durability_timeout_ms: Option<u16>,
  pub opaque: u32,
}

pub fn encode_upsert(req: &UpsertRequest<'_>) -> Frame {
  encode_store(OpCode::Upsert, req)
}

pub fn encode_insert(req: &UpsertRequest<'_>) -> Frame {
  encode_store(OpCode::Insert, req)
}

pub fn encode_replace(req: &UpsertRequest<'_>) -> Frame {
  encode_store(OpCode::Replace, req)
}

fn encode_store(opcode: OpCode, req: &UpsertRequest<'_>) -> Frame {
  let framing_extras = durability_framing_extra(req.durability, req.durability_timeout_ms);
  let key = encode_collection_and_key(req.collection_uid, req.key);

  let mut extras = BytesMut::with_capacity(8);
  extras.put_u32(req.flags);
  extras.put_u32(req.expiry);

  Frame {
    magic: magic_for(&framing_extras),
    opcode: opcode.as_u8(),
    datatype: req.datatype,
    status_or_vbucket: req.vbucket_id,
    opaque: req.opaque,
    cas: req.cas,
    framing_extras,
    extras: extras.freeze(),
    key: Bytes::from(key),
    value: Bytes::copy_from_slice(req.value),
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MutationResponse {
  pub cas: u64,
  pub mutation_token: Option<crate::document::MutationToken>,
}

/// Parses the common mutation response shape shared by upsert/insert/
/// replace/remove/append/prepend/increment/decrement; `mutation_seqno`
/// (negotiated at HELLO, `spec.md` §4.G) controls whether extras carry a
/// vbucket-uuid/seqno pair.
pub fn decode_mutation_response(opcode: OpCode, frame: &Frame, mutation_seqno_enabled: bool) -> Result<MutationResponse, KvError> {
  if let Some(kind) = map_common_status(opcode, frame.status())? {
    return Err(KvError::new(kind));
  }
  let mutation_token = if mutation_seqno_enabled && frame.extras.len() >= 16 {
    let mut extras = frame.extras.clone();
    let vbucket_uuid = extras.get_u64();
    let sequence_number = extras.get_u64();
    Some(crate::document::MutationToken::new(frame.status_or_vbucket, vbucket_uuid, sequence_number))
  } else {
    None
  };
  Ok(MutationResponse { cas: frame.cas, mutation_token })
}

pub struct RemoveRequest<'a> {
  pub vbucket_id: u16,
  pub collection_uid: u32,
  pub key: &'a [u8],
  pub cas: u64,
  pub durability: Option<Durability>,
  pub durability_timeout_ms: Option<u16>,
  pub opaque: u32,
}

pub fn encode_remove(req: &RemoveRequest<'_>) -> Frame {
  let framing_extras = durability_framing_extra(req.durability, req.durability_timeout_ms);
  let key = encode_collection_and_key(req.collection_uid, req.key);
  Frame {
    magic: magic_for(&framing_extras),
    opcode: OpCode::Remove.as_u8(),
    datatype: Datatype::empty(),
    status_or_vbucket: req.vbucket_id,
    opaque: req.opaque,
    cas: req.cas,
    framing_extras,
    extras: Bytes::new(),
    key: Bytes::from(key),
    value: Bytes::new(),
  }
}

pub struct TouchLikeRequest<'a> {
  pub vbucket_id: u16,
  pub collection_uid: u32,
  pub key: &'a [u8],
  pub expiry: u32,
  pub opaque: u32,
}

pub fn encode_touch(req: &TouchLikeRequest<'_>) -> Frame {
  encode_touch_like(OpCode::Touch, req)
}

pub fn encode_get_and_touch(req: &TouchLikeRequest<'_>) -> Frame {
  encode_touch_like(OpCode::GetAndTouch, req)
}

fn encode_touch_like(opcode: OpCode, req: &TouchLikeRequest<'_>) -> Frame {
  let key = encode_collection_and_key(req.collection_uid, req.key);
  let mut extras = BytesMut::with_capacity(4);
  extras.put_u32(req.expiry);
  Frame {
    magic: Magic::ClientRequest,
    opcode: opcode.as_u8(),
    datatype: Datatype::empty(),
    status_or_vbucket: req.vbucket_id,
    opaque: req.opaque,
    cas: 0,
    framing_extras: vec![],
    extras: extras.freeze(),
    key: Bytes::from(key),
    value: Bytes::new(),
  }
}

pub struct GetAndLockRequest<'a> {
  pub vbucket_id: u16,
  pub collection_uid: u32,
  pub key: &'a [u8],
  pub lock_time_secs: u32,
  pub opaque: u32,
}

pub fn encode_get_and_lock(req: &GetAndLockRequest<'_>) -> Frame {
  let key = encode_collection_and_key(req.collection_uid, req.key);
  let mut extras = BytesMut::with_capacity(4);
  extras.put_u32(req.lock_time_secs);
  Frame {
    magic: Magic::ClientRequest,
    opcode: OpCode::GetAndLock.as_u8(),
    datatype: Datatype::empty(),
    status_or_vbucket: req.vbucket_id,
    opaque: req.opaque,
    cas: 0,
    framing_extras: vec![],
    extras: extras.freeze(),
    key: Bytes::from(key),
    value: Bytes::new(),
  }
}

pub struct UnlockRequest<'a> {
  pub vbucket_id: u16,
  pub collection_uid: u32,
  pub key: &'a [u8],
  pub cas: u64,
  pub opaque: u32,
}

pub fn encode_unlock(req: &UnlockRequest<'_>) -> Frame {
  let key = encode_collection_and_key(req.collection_uid, req.key);
  Frame {
    magic: Magic::ClientRequest,
    opcode: OpCode::Unlock.as_u8(),
    datatype: Datatype::empty(),
    status_or_vbucket: req.vbucket_id,
    opaque: req.opaque,
    cas: req.cas,
    framing_extras: vec![],
    extras: Bytes::new(),
    key: Bytes::from(key),
    value: Bytes::new(),
  }
}

pub struct CounterRequest<'a> {
  pub vbucket_id: u16,
  pub collection_uid: u32,
  pub key: &'a [u8],
  pub delta: u64,
  pub initial: u64,
  pub expiry: u32,
  pub opaque: u32,
}

pub fn encode_increment(req: &CounterRequest<'_>) -> Frame {
  encode_counter(OpCode::Increment, req)
}

pub fn encode_decrement(req: &CounterRequest<'_>) -> Frame {
  encode_counter(OpCode::Decrement, req)
}

fn encode_counter(opcode: OpCode, req: &CounterRequest<'_>) -> Frame {
  let key = encode_collection_and_key(req.collection_uid, req.key);
  let mut extras = BytesMut::with_capacity(20);
  extras.put_u64(req.delta);
  extras.put_u64(req.initial);
  extras.put_u32(req.expiry);
  Frame {
    magic: Magic::ClientRequest,
    opcode: opcode.as_u8(),
    datatype: Datatype::empty(),
    status_or_vbucket: req.vbucket_id,
    opaque: req.opaque,
    cas: 0,
    framing_extras: vec![],
    extras: extras.freeze(),
    key: Bytes::from(key),
    value: Bytes::new(),
  }
}

#[derive(Debug, Clone, Copy)]
pub struct CounterResponse {
  pub cas: u64,
  pub value: u64,
}

pub fn decode_counter_response(opcode: OpCode, frame: &Frame) -> Result<CounterResponse, KvError> {
  if let Some(kind) = map_common_status(opcode, frame.status())? {
    return Err(KvError::new(kind));
  }
  if frame.value.len() < 8 {
    return Err(KvError::new(ErrorKind::ParsingFailure));
  }
  let mut value = frame.value.clone();
  Ok(CounterResponse { cas: frame.cas, value: value.get_u64() })
}

pub struct AppendLikeRequest<'a> {
  pub vbucket_id: u16,
  pub collection_uid: u32,
  pub key: &'a [u8],
  pub value: &'a [u8],
  pub cas: u64,
  pub opaque: u32,
}

pub fn encode_append(req: &AppendLikeRequest<'_>) -> Frame {
  encode_append_like(OpCode::Append, req)
}

pub fn encode_prepend(req: &AppendLikeRequest<'_>) -> Frame {
  encode_append_like(OpCode::Prepend, req)
}

fn encode_append_like(opcode: OpCode, req: &AppendLikeRequest<'_>) -> Frame {
  let key = encode_collection_and_key(req.collection_uid, req.key);
  Frame {
    magic: Magic::ClientRequest,
    opcode: opcode.as_u8(),
    datatype: Datatype::empty(),
    status_or_vbucket: req.vbucket_id,
    opaque: req.opaque,
    cas: req.cas,
    framing_extras: vec![],
    extras: Bytes::new(),
    key: Bytes::from(key),
    value: Bytes::copy_from_slice(req.value),
  }
}

/// `exists`/`observe_seqno` (`spec.md` §4.B "get_replica" subset entry).
pub fn encode_get_replica(vbucket_id: u16, collection_uid: u32, key: &[u8], opaque: u32) -> Frame {
  let key = encode_collection_and_key(collection_uid, key);
  Frame {
    magic: Magic::ClientRequest,
    opcode: OpCode::GetReplica.as_u8(),
    datatype: Datatype::empty(),
    status_or_vbucket: vbucket_id,
    opaque,
    cas: 0,
    framing_extras: vec![],
    extras: Bytes::new(),
    key: Bytes::from(key),
    value: Bytes::new(),
  }
}

pub fn encode_observe_seqno(vbucket_id: u16, vbucket_uuid: u64, opaque: u32) -> Frame {
  let mut value = BytesMut::with_capacity(8);
  value.put_u64(vbucket_uuid);
  Frame {
    magic: Magic::ClientRequest,
    opcode: OpCode::ObserveSeqno.as_u8(),
    datatype: Datatype::empty(),
    status_or_vbucket: vbucket_id,
    opaque,
    cas: 0,
    framing_extras: vec![],
    extras: Bytes::new(),
    key: Bytes::new(),
    value: value.freeze(),
  }
}

pub fn encode_noop(opaque: u32) -> Frame {
  Frame {
    magic: Magic::ClientRequest,
    opcode: OpCode::Noop.as_u8(),
    datatype: Datatype::empty(),
    status_or_vbucket: 0,
    opaque,
    cas: 0,
    framing_extras: vec![],
    extras: Bytes::new(),
    key: Bytes::new(),
    value: Bytes::new(),
  }
}

// --- subdoc -----------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubdocOpcode {
  Get = 0xc5,
  Exists = 0xc6,
  DictAdd = 0xc7,
  DictUpsert = 0xc8,
  Delete = 0xc9,
  Replace = 0xca,
  ArrayPushLast = 0xcb,
  ArrayPushFirst = 0xcc,
  ArrayInsert = 0xcd,
  ArrayAddUnique = 0xce,
  Counter = 0xcf,
}

bitflags::bitflags! {
  #[derive(Debug, Clone, Copy, PartialEq, Eq)]
  pub struct SubdocPathFlags: u8 {
    const XATTR = 0x01;
    const EXPAND_MACROS = 0x10;
  }
}

pub struct SubdocSpec<'a> {
  pub opcode: SubdocOpcode,
  pub path: &'a str,
  pub flags: SubdocPathFlags,
  pub value: &'a [u8],
}

fn encode_subdoc_spec(spec: &SubdocSpec<'_>, buf: &mut BytesMut) {
  buf.put_u8(spec.opcode as u8);
  buf.put_u8(spec.flags.bits());
  buf.put_u16(spec.path.len() as u16);
  buf.put_u32(spec.value.len() as u32);
  buf.extend_from_slice(spec.path.as_bytes());
  buf.extend_from_slice(spec.value);
}

pub struct SubdocLookupInRequest<'a> {
  pub vbucket_id: u16,
  pub collection_uid: u32,
  pub key: &'a [u8],
  pub specs: &'a [SubdocSpec<'a>],
  pub opaque: u32,
}

pub fn encode_subdoc_lookup_in(req: &SubdocLookupInRequest<'_>) -> Frame {
  let key = encode_collection_and_key(req.collection_uid, req.key);
  let mut value = BytesMut::new();
  for spec in req.specs {
    encode_subdoc_spec(spec, &mut value);
  }
  Frame {
    magic: Magic::ClientRequest,
    opcode: OpCode::SubdocLookupIn.as_u8(),
    datatype: Datatype::empty(),
    status_or_vbucket: req.vbucket_id,
    opaque: req.opaque,
    cas: 0,
    framing_extras: vec![],
    extras: Bytes::new(),
    key: Bytes::from(key),
    value: value.freeze(),
  }
}

pub struct SubdocMutateInRequest<'a> {
  pub vbucket_id: u16,
  pub collection_uid: u32,
  pub key: &'a [u8],
  pub cas: u64,
  pub specs: &'a [SubdocSpec<'a>],
  pub durability: Option<Durability>,
  pub durability_timeout_ms: Option<u16>,
  pub opaque: u32,
}

pub fn encode_subdoc_mutate_in(req: &SubdocMutateInRequest<'_>) -> Frame {
  let framing_extras = durability_framing_extra(req.durability, req.durability_timeout_ms);
  let key = encode_collection_and_key(req.collection_uid, req.key);
  let mut value = BytesMut::new();
  for spec in req.specs {
    encode_subdoc_spec(spec, &mut value);
  }
  Frame {
    magic: magic_for(&framing_extras),
    opcode: OpCode::SubdocMutateIn.as_u8(),
    datatype: Datatype::empty(),
    status_or_vbucket: req.vbucket_id,
    opaque: req.opaque,
    cas: req.cas,
    framing_extras,
    extras: Bytes::new(),
    key: Bytes::from(key),
    value: value.freeze(),
  }
}

#[derive(Debug, Clone)]
pub struct SubdocResult {
  pub status: Status,
  pub value: Bytes,
}

/// Parses the repeated `[status:2][len:4][value]` result array shared by
/// `subdoc_lookup_in`/`subdoc_mutate_in` responses.
pub fn decode_subdoc_results(mut value: Bytes) -> Result<Vec<SubdocResult>, KvError> {
  let mut results = Vec::new();
  while value.remaining() >= 6 {
    let status = Status::from_u16(value.get_u16());
    let len = value.get_u32() as usize;
    if value.remaining() < len {
      return Err(KvError::new(ErrorKind::ParsingFailure));
    }
    let item = value.split_to(len);
    results.push(SubdocResult { status, value: item });
  }
  Ok(results)
}

// --- SASL / HELLO / bucket / config -----------------------------------

pub fn encode_sasl_list_mechs(opaque: u32) -> Frame {
  Frame {
    magic: Magic::ClientRequest,
    opcode: OpCode::SaslListMechs.as_u8(),
    datatype: Datatype::empty(),
    status_or_vbucket: 0,
    opaque,
    cas: 0,
    framing_extras: vec![],
    extras: Bytes::new(),
    key: Bytes::new(),
    value: Bytes::new(),
  }
}

pub fn encode_sasl_auth(mechanism: &str, payload: &[u8], opaque: u32) -> Frame {
  Frame {
    magic: Magic::ClientRequest,
    opcode: OpCode::SaslAuth.as_u8(),
    datatype: Datatype::empty(),
    status_or_vbucket: 0,
    opaque,
    cas: 0,
    framing_extras: vec![],
    extras: Bytes::new(),
    key: Bytes::copy_from_slice(mechanism.as_bytes()),
    value: Bytes::copy_from_slice(payload),
  }
}

pub fn encode_sasl_step(mechanism: &str, payload: &[u8], opaque: u32) -> Frame {
  Frame {
    magic: Magic::ClientRequest,
    opcode: OpCode::SaslStep.as_u8(),
    datatype: Datatype::empty(),
    status_or_vbucket: 0,
    opaque,
    cas: 0,
    framing_extras: vec![],
    extras: Bytes::new(),
    key: Bytes::copy_from_slice(mechanism.as_bytes()),
    value: Bytes::copy_from_slice(payload),
  }
}

/// `spec.md` §4.G "feature negotiation": client identity + requested
/// feature codes, both big-endian u16 per feature.
pub fn encode_hello(client_identity: &str, requested_features: &[u16], opaque: u32) -> Frame {
  let mut value = BytesMut::with_capacity(requested_features.len() * 2);
  for feature in requested_features {
    value.put_u16(*feature);
  }
  Frame {
    magic: Magic::ClientRequest,
    opcode: OpCode::Hello.as_u8(),
    datatype: Datatype::empty(),
    status_or_vbucket: 0,
    opaque,
    cas: 0,
    framing_extras: vec![],
    extras: Bytes::new(),
    key: Bytes::copy_from_slice(client_identity.as_bytes()),
    value: value.freeze(),
  }
}

pub fn decode_hello_response(frame: &Frame) -> Result<Vec<u16>, KvError> {
  if frame.status() != Status::Success {
    return Err(KvError::new(ErrorKind::HandshakeFailure));
  }
  let mut value = frame.value.clone();
  let mut enabled = Vec::with_capacity(value.remaining() / 2);
  while value.remaining() >= 2 {
    enabled.push(value.get_u16());
  }
  Ok(enabled)
}

pub fn encode_select_bucket(bucket: &str, opaque: u32) -> Frame {
  Frame {
    magic: Magic::ClientRequest,
    opcode: OpCode::SelectBucket.as_u8(),
    datatype: Datatype::empty(),
    status_or_vbucket: 0,
    opaque,
    cas: 0,
    framing_extras: vec![],
    extras: Bytes::new(),
    key: Bytes::copy_from_slice(bucket.as_bytes()),
    value: Bytes::new(),
  }
}

pub fn encode_get_cluster_config(opaque: u32) -> Frame {
  Frame {
    magic: Magic::ClientRequest,
    opcode: OpCode::GetClusterConfig.as_u8(),
    datatype: Datatype::empty(),
    status_or_vbucket: 0,
    opaque,
    cas: 0,
    framing_extras: vec![],
    extras: Bytes::new(),
    key: Bytes::new(),
    value: Bytes::new(),
  }
}

pub fn encode_get_collections_manifest(opaque: u32) -> Frame {
  Frame {
    magic: Magic::ClientRequest,
    opcode: OpCode::GetCollectionsManifest.as_u8(),
    datatype: Datatype::empty(),
    status_or_vbucket: 0,
    opaque,
    cas: 0,
    framing_extras: vec![],
    extras: Bytes::new(),
    key: Bytes::new(),
    value: Bytes::new(),
  }
}

pub fn encode_get_collection_id(scope: &str, collection: &str, opaque: u32) -> Frame {
  let path = crate::collections::collection_path(scope, collection);
  Frame {
    magic: Magic::ClientRequest,
    opcode: OpCode::GetCollectionId.as_u8(),
    datatype: Datatype::empty(),
    status_or_vbucket: 0,
    opaque,
    cas: 0,
    framing_extras: vec![],
    extras: Bytes::new(),
    key: Bytes::new(),
    value: Bytes::from(path),
  }
}

#[derive(Debug, Clone, Copy)]
pub struct CollectionIdResponse {
  pub manifest_uid: u64,
  pub collection_uid: u32,
}

pub fn decode_get_collection_id_response(frame: &Frame) -> Result<CollectionIdResponse, KvError> {
  if frame.status() == Status::UnknownCollection {
    return Err(KvError::new(ErrorKind::CollectionNotFound));
  }
  if frame.status() != Status::Success {
    return Err(KvError::new(ErrorKind::ParsingFailure));
  }
  let mut extras = frame.extras.clone();
  if extras.len() < 12 {
    return Err(KvError::new(ErrorKind::ParsingFailure));
  }
  let manifest_uid = extras.get_u64();
  let collection_uid = extras.get_u32();
  Ok(CollectionIdResponse { manifest_uid, collection_uid })
}

/// Maps a wire status to a logical error kind for opcode-specific status
/// handling not covered by the shared table in [`crate::error::status_to_kind`].
fn map_common_status(opcode: OpCode, status: Status) -> Result<Option<ErrorKind>, KvError> {
  if status == Status::Success {
    return Ok(None);
  }
  match status_to_kind(status) {
    Some(kind) => Ok(Some(kind)),
    None => Err(KvError::new(ErrorKind::UnmappedStatus { opcode, status })),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::frame::FrameCodec;

  #[test]
  fn collection_prefixed_key_round_trips_through_a_frame() {
    let req = GetRequest { vbucket_id: 12, collection_uid: 9, key: b"airline_10", opaque: 7 };
    let frame = encode_get(&req);
    let bytes = frame.encode();

    let mut codec = FrameCodec::new();
    codec.feed(&bytes);
    let decoded = match codec.next() {
      crate::frame::DecodeResult::Ok(f) => f,
      other => panic!("expected a frame, got {other:?}"),
    };
    assert_eq!(decoded.opcode, OpCode::Get.as_u8());
    assert_eq!(decoded.key, Bytes::from(encode_collection_and_key(9, b"airline_10")));
  }

  #[test]
  fn get_response_parses_flags_and_value() {
    let mut extras = BytesMut::new();
    extras.put_u32(0xCAFEBABE);
    let frame = Frame {
      magic: Magic::ClientResponse,
      opcode: OpCode::Get.as_u8(),
      datatype: Datatype::empty(),
      status_or_vbucket: Status::Success.as_u16(),
      opaque: 1,
      cas: 42,
      framing_extras: vec![],
      extras: extras.freeze(),
      key: Bytes::new(),
      value: Bytes::from_static(b"hello"),
    };
    let parsed = decode_get_response(&frame).unwrap();
    assert_eq!(parsed.flags, 0xCAFEBABE);
    assert_eq!(parsed.value, Bytes::from_static(b"hello"));
    assert_eq!(parsed.cas, 42);
  }

  #[test]
  fn not_my_vbucket_status_is_surfaced_for_the_caller_to_special_case() {
    let frame = Frame {
      magic: Magic::ClientResponse,
      opcode: OpCode::Upsert.as_u8(),
      datatype: Datatype::empty(),
      status_or_vbucket: Status::NotMyVbucket.as_u16(),
      opaque: 1,
      cas: 0,
      framing_extras: vec![],
      extras: Bytes::new(),
      key: Bytes::new(),
      value: Bytes::new(),
    };
    assert_eq!(frame.status(), Status::NotMyVbucket);
  }

  #[test]
  fn subdoc_results_decode_in_order() {
    let mut value = BytesMut::new();
    value.put_u16(Status::Success.as_u16());
    value.put_u32(2);
    value.extend_from_slice(b"42");
    value.put_u16(Status::SubdocPathNotFound.as_u16());
    value.put_u32(0);

    let results = decode_subdoc_results(value.freeze()).unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].value, Bytes::from_static(b"42"));
    assert_eq!(results[1].status, Status::SubdocPathNotFound);
  }
}
