//! KV connection state machine (`spec.md` §4.G), grounded on
//! `mysql::conn::Connection`'s phased `connect` → `handshake` sequence,
//! generalized into an explicit state enum plus a per-connection actor task
//! because this protocol multiplexes many concurrent operations over one
//! socket instead of MySQL's single-outstanding-request model (`spec.md`
//! §5 "Scheduling model": one serializing executor per connection).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot, watch, Semaphore};

use crate::debug::{trace_inbound, trace_outbound};
use crate::error::{ErrorKind, KvError};
use crate::frame::{DecodeResult, Frame, FrameCodec, Magic};
use crate::opcode::{OpCode, Status};
use crate::registry;
use crate::sasl::{select_mechanism, SaslMechanism, StepOutcome};

/// HELLO feature codes this core requests (`spec.md` §4.G "Feature
/// negotiation"), values per the memcached binary protocol's `hello`
/// feature registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
  Tls,
  TcpNoDelay,
  MutationSeqno,
  Xerror,
  Snappy,
  Json,
  Duplex,
  ClustermapChangeNotification,
  Tracing,
  AltRequestSupport,
  SyncReplication,
  Collections,
}

impl Feature {
  pub const fn as_u16(self) -> u16 {
    match self {
      Feature::Tls => 0x02,
      Feature::TcpNoDelay => 0x03,
      Feature::MutationSeqno => 0x04,
      Feature::Xerror => 0x07,
      Feature::Snappy => 0x0a,
      Feature::Json => 0x0b,
      Feature::Duplex => 0x0c,
      Feature::ClustermapChangeNotification => 0x0d,
      Feature::Tracing => 0x0f,
      Feature::AltRequestSupport => 0x10,
      Feature::SyncReplication => 0x11,
      Feature::Collections => 0x12,
    }
  }

  const fn from_u16(code: u16) -> Option<Self> {
    match code {
      0x02 => Some(Feature::Tls),
      0x03 => Some(Feature::TcpNoDelay),
      0x04 => Some(Feature::MutationSeqno),
      0x07 => Some(Feature::Xerror),
      0x0a => Some(Feature::Snappy),
      0x0b => Some(Feature::Json),
      0x0c => Some(Feature::Duplex),
      0x0d => Some(Feature::ClustermapChangeNotification),
      0x0f => Some(Feature::Tracing),
      0x10 => Some(Feature::AltRequestSupport),
      0x11 => Some(Feature::SyncReplication),
      0x12 => Some(Feature::Collections),
      _ => None,
    }
  }
}

/// The features this core asks for on every `HELLO` (`spec.md` §4.G).
pub const REQUESTED_FEATURES: &[Feature] = &[
  Feature::TcpNoDelay,
  Feature::MutationSeqno,
  Feature::Xerror,
  Feature::Snappy,
  Feature::Json,
  Feature::Tracing,
  Feature::AltRequestSupport,
  Feature::SyncReplication,
  Feature::Collections,
  Feature::Duplex,
  Feature::ClustermapChangeNotification,
];

/// Which features the server actually enabled (`spec.md` §4.G "Feature
/// negotiation": "subsequent behavior depends on this set").
#[derive(Debug, Clone, Default)]
pub struct NegotiatedFeatures {
  enabled: HashSet<Feature>,
}

impl NegotiatedFeatures {
  fn from_wire(codes: &[u16]) -> Self {
    Self { enabled: codes.iter().filter_map(|c| Feature::from_u16(*c)).collect() }
  }

  pub fn has(&self, feature: Feature) -> bool {
    self.enabled.contains(&feature)
  }
}

/// Lifecycle states of a KV connection (`spec.md` §4.G diagram), tracked
/// for observability; the control flow itself lives in
/// [`Connection::handshake`]/[`Connection::run`]'s phased helper methods
/// rather than a dispatch-on-enum loop, since each phase only ever runs
/// once per connection lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
  Disconnected,
  Connecting,
  NegotiatingHello,
  ListingMechs,
  Authenticating,
  SelectingBucket,
  FetchingInitialConfig,
  Ready,
  Draining,
  Closed,
}

struct Pending {
  respond_to: oneshot::Sender<Result<Frame, KvError>>,
}

/// Owns the opaque counter and pending-operation table for one connection
/// (`spec.md` §3 "Pending operation", §5 "Shared resource policy" — owned
/// by the connection, touched only on its executor).
struct PendingTable {
  next_opaque: u32,
  entries: HashMap<u32, Pending>,
}

impl PendingTable {
  fn new() -> Self {
    Self { next_opaque: 1, entries: HashMap::new() }
  }

  /// Allocates a fresh opaque and parks `respond_to` under it.
  fn insert(&mut self, respond_to: oneshot::Sender<Result<Frame, KvError>>) -> u32 {
    let opaque = self.next_opaque;
    self.next_opaque = self.next_opaque.wrapping_add(1);
    self.entries.insert(opaque, Pending { respond_to });
    opaque
  }

  /// Matches a response to its pending request and removes the entry
  /// (`spec.md` §3 "on response, opaque selects exactly one pending
  /// operation and that operation is removed before handler invocation").
  fn complete(&mut self, opaque: u32, result: Result<Frame, KvError>) {
    if let Some(pending) = self.entries.remove(&opaque) {
      let _ = pending.respond_to.send(result);
    }
  }

  /// Fails every still-outstanding operation, used on socket close
  /// (`spec.md` §3 "on socket close, every pending operation is
  /// completed with a reason consulted by §5").
  fn fail_all(&mut self, kind: ErrorKind) {
    for (_, pending) in self.entries.drain() {
      let _ = pending.respond_to.send(Err(KvError::new(kind.clone())));
    }
  }
}

/// A request queued for the connection's writer half; `opaque` is assigned
/// by the actor, not the caller, so concurrent callers never collide.
struct Outbound {
  frame: Frame,
  respond_to: oneshot::Sender<Result<Frame, KvError>>,
}

/// A lightweight, cloneable front for a running connection actor.
#[derive(Clone)]
pub struct ConnectionHandle {
  outbound: mpsc::Sender<Outbound>,
  state: watch::Receiver<ConnectionState>,
  in_flight_limit: Arc<Semaphore>,
  wait_queue: Arc<Semaphore>,
}

impl ConnectionHandle {
  pub fn state(&self) -> ConnectionState {
    *self.state.borrow()
  }

  /// Sends `frame` and awaits its matching response. When the in-flight
  /// window is saturated, the caller waits in a bounded FIFO for a slot
  /// rather than failing immediately; only exceeding that FIFO's own
  /// capacity fails fast with `request_cancelled`, before any network
  /// attempt (`spec.md` §5 "Backpressure"). The FIFO ordering and the
  /// fail-fast-when-full behavior both come from the same two
  /// `tokio::sync::Semaphore`s: a queue slot is acquired without waiting
  /// (bounding how many callers may queue at once), then the in-flight
  /// permit is acquired with a real wait, and the queue slot is released
  /// once a caller actually holds an in-flight permit.
  pub async fn send(&self, frame: Frame) -> Result<Frame, KvError> {
    let _queue_slot = self.wait_queue.try_acquire().map_err(|_| KvError::new(ErrorKind::RequestCancelled))?;
    let _permit = self
      .in_flight_limit
      .acquire()
      .await
      .map_err(|_| KvError::new(ErrorKind::SocketClosedWhileInFlight))?;
    drop(_queue_slot);

    let (tx, rx) = oneshot::channel();
    self
      .outbound
      .send(Outbound { frame, respond_to: tx })
      .await
      .map_err(|_| KvError::new(ErrorKind::SocketClosedWhileInFlight))?;

    rx.await.unwrap_or_else(|_| Err(KvError::new(ErrorKind::SocketClosedWhileInFlight)))
  }
}

pub struct HandshakeParams<'a> {
  pub client_identity: &'a str,
  pub username: &'a str,
  pub password: &'a str,
  pub bucket: Option<&'a str>,
}

/// Invoked with the raw value of a `clustermap_change_notification` server
/// request as it arrives (`spec.md` §4.F source i, "push").
pub type ConfigPushHandler = Arc<dyn Fn(Bytes) + Send + Sync>;

/// Runs one connection's socket loop to completion: `HELLO` negotiation,
/// SASL, `SELECT_BUCKET`, the initial `get_cluster_config`, then the
/// steady-state read/write multiplexing loop, and finally graceful
/// teardown (`spec.md` §4.G).
pub struct Connection<S> {
  transport: S,
  codec: FrameCodec,
  pending: PendingTable,
  state_tx: watch::Sender<ConnectionState>,
  features: NegotiatedFeatures,
  config_push: Option<ConfigPushHandler>,
}

impl<S> Connection<S>
where
  S: AsyncReadExt + AsyncWriteExt + Unpin + Send,
{
  pub fn new(transport: S) -> (Self, watch::Receiver<ConnectionState>) {
    let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
    (
      Self {
        transport,
        codec: FrameCodec::new(),
        pending: PendingTable::new(),
        state_tx,
        features: NegotiatedFeatures::default(),
        config_push: None,
      },
      state_rx,
    )
  }

  pub fn on_config_push(&mut self, handler: ConfigPushHandler) {
    self.config_push = Some(handler);
  }

  fn set_state(&self, state: ConnectionState) {
    let _ = self.state_tx.send(state);
  }

  async fn write_frame(&mut self, frame: &Frame) -> Result<(), KvError> {
    let bytes = frame.encode();
    trace_outbound(&bytes);
    self.transport.write_all(&bytes).await.map_err(|_| KvError::new(ErrorKind::SocketClosedWhileInFlight))?;
    self.transport.flush().await.map_err(|_| KvError::new(ErrorKind::SocketClosedWhileInFlight))
  }

  /// Reads until one complete frame is decoded. Used only during the
  /// strictly sequential handshake phase, before the multiplexed steady
  /// state begins.
  async fn read_frame(&mut self) -> Result<Frame, KvError> {
    loop {
      match self.codec.next() {
        DecodeResult::Ok(frame) => return Ok(frame),
        DecodeResult::Failure(_) => return Err(KvError::new(ErrorKind::ParsingFailure)),
        DecodeResult::NeedData => {
          let mut buf = [0u8; 4096];
          let n = self.transport.read(&mut buf).await.map_err(|_| KvError::new(ErrorKind::EndOfStream))?;
          if n == 0 {
            return Err(KvError::new(ErrorKind::EndOfStream));
          }
          trace_inbound(&buf[..n]);
          self.codec.feed(&buf[..n]);
        }
      }
    }
  }

  async fn roundtrip(&mut self, frame: Frame) -> Result<Frame, KvError> {
    self.write_frame(&frame).await?;
    loop {
      let response = self.read_frame().await?;
      if response.opaque == frame.opaque {
        return Ok(response);
      }
      // a server-initiated frame arrived ahead of our response during the
      // handshake; clustermap push this early has nowhere to go yet.
    }
  }

  /// Drives `disconnected → ... → ready` (`spec.md` §4.G). On success,
  /// returns the initial cluster configuration bytes so the caller can
  /// seed the configuration monitor.
  pub async fn handshake(&mut self, params: &HandshakeParams<'_>) -> Result<Vec<u8>, KvError> {
    self.set_state(ConnectionState::NegotiatingHello);
    let mut opaque = 0u32;
    let requested: Vec<u16> = REQUESTED_FEATURES.iter().map(|f| f.as_u16()).collect();
    let hello = registry::encode_hello(params.client_identity, &requested, opaque);
    let response = self.roundtrip(hello).await?;
    let enabled = registry::decode_hello_response(&response)?;
    self.features = NegotiatedFeatures::from_wire(&enabled);

    self.set_state(ConnectionState::ListingMechs);
    opaque = opaque.wrapping_add(1);
    let list_mechs = registry::encode_sasl_list_mechs(opaque);
    let response = self.roundtrip(list_mechs).await?;
    if response.status() != Status::Success {
      return Err(KvError::new(ErrorKind::HandshakeFailure));
    }
    let available = String::from_utf8_lossy(&response.value).into_owned();

    self.set_state(ConnectionState::Authenticating);
    let mut mechanism = select_mechanism(&available, params.username, params.password)?;
    opaque = opaque.wrapping_add(1);
    let first_payload = mechanism.start()?;
    let auth_frame = registry::encode_sasl_auth(mechanism.name(), &first_payload, opaque);
    let mut response = self.roundtrip(auth_frame).await?;

    loop {
      match response.status() {
        Status::Success => break,
        Status::AuthContinue => {
          opaque = opaque.wrapping_add(1);
          match mechanism.step(&response.value)? {
            StepOutcome::Continue(payload) => {
              let step_frame = registry::encode_sasl_step(mechanism.name(), &payload, opaque);
              response = self.roundtrip(step_frame).await?;
            }
            StepOutcome::Complete => break,
          }
        }
        _ => return Err(KvError::new(ErrorKind::AuthenticationFailure)),
      }
    }

    if let Some(bucket) = params.bucket {
      self.set_state(ConnectionState::SelectingBucket);
      opaque = opaque.wrapping_add(1);
      let select = registry::encode_select_bucket(bucket, opaque);
      let response = self.roundtrip(select).await?;
      if response.status() != Status::Success {
        return Err(KvError::new(ErrorKind::BucketNotFound));
      }
    }

    self.set_state(ConnectionState::FetchingInitialConfig);
    opaque = opaque.wrapping_add(1);
    let get_config = registry::encode_get_cluster_config(opaque);
    let response = self.roundtrip(get_config).await?;
    if response.status() != Status::Success {
      return Err(KvError::new(ErrorKind::HandshakeFailure));
    }

    self.pending.next_opaque = opaque.wrapping_add(1);
    self.set_state(ConnectionState::Ready);
    Ok(response.value.to_vec())
  }

  pub fn mutation_seqno_enabled(&self) -> bool {
    self.features.has(Feature::MutationSeqno)
  }

  pub fn collections_enabled(&self) -> bool {
    self.features.has(Feature::Collections)
  }

  fn dispatch_inbound(&mut self, frame: Frame) {
    if frame.magic == Magic::ServerRequest {
      // server-initiated frames do not consume a pending slot
      // (`spec.md` §4.G "Multiplexing").
      if frame.opcode == OpCode::ClusterMapChangeNotification.as_u8() {
        if let Some(handler) = &self.config_push {
          handler(frame.value.clone());
        }
      }
      return;
    }
    self.pending.complete(frame.opaque, Ok(frame));
  }

  /// Runs the multiplexed steady state: pulls queued outbound requests,
  /// assigns each an opaque, writes it, and concurrently reads responses
  /// off the socket, matching them back by opaque. Returns once
  /// `outbound` is closed or the socket errors, after failing every
  /// operation still pending within `grace`
  /// (`socket_closed_while_in_flight`/`request_cancelled`, `spec.md` §4.G
  /// "Graceful teardown").
  async fn run(mut self, mut outbound: mpsc::Receiver<Outbound>, grace: Duration) {
    let mut read_buf = [0u8; 8192];

    'steady: loop {
      tokio::select! {
        maybe_outbound = outbound.recv() => {
          match maybe_outbound {
            Some(req) => {
              let opaque = self.pending.insert(req.respond_to);
              let mut frame = req.frame;
              frame.opaque = opaque;
              if let Err(err) = self.write_frame(&frame).await {
                self.pending.complete(opaque, Err(err));
                break 'steady;
              }
            }
            None => break 'steady,
          }
        }
        read_result = self.transport.read(&mut read_buf) => {
          match read_result {
            Ok(0) | Err(_) => break 'steady,
            Ok(n) => {
              trace_inbound(&read_buf[..n]);
              self.codec.feed(&read_buf[..n]);
              loop {
                match self.codec.next() {
                  DecodeResult::Ok(frame) => self.dispatch_inbound(frame),
                  DecodeResult::NeedData => break,
                  DecodeResult::Failure(_) => {
                    self.pending.fail_all(ErrorKind::SocketClosedWhileInFlight);
                    self.set_state(ConnectionState::Closed);
                    return;
                  }
                }
              }
            }
          }
        }
      }
    }

    self.set_state(ConnectionState::Draining);
    let grace_timer = tokio::time::sleep(grace);
    tokio::pin!(grace_timer);
    loop {
      if self.pending_is_empty() {
        break;
      }
      tokio::select! {
        _ = &mut grace_timer => break,
        read_result = self.transport.read(&mut read_buf) => {
          match read_result {
            Ok(0) | Err(_) => break,
            Ok(n) => {
              trace_inbound(&read_buf[..n]);
              self.codec.feed(&read_buf[..n]);
              while let DecodeResult::Ok(frame) = self.codec.next() {
                self.dispatch_inbound(frame);
              }
            }
          }
        }
      }
    }
    self.pending.fail_all(ErrorKind::RequestCancelled);
    self.set_state(ConnectionState::Closed);
  }

  fn pending_is_empty(&self) -> bool {
    self.pending.entries.is_empty()
  }

  /// Spawns [`Connection::run`] as a background task and returns a cheaply
  /// cloneable handle to it (`spec.md` §5 "one serializing executor per
  /// connection" — every write for this connection flows through the one
  /// task spawned here). `max_queued` bounds the FIFO of callers waiting
  /// for an in-flight slot (`spec.md` §5 "Backpressure").
  pub fn spawn(self, in_flight_window: usize, max_queued: usize, grace: Duration) -> (ConnectionHandle, watch::Receiver<ConnectionState>)
  where
    S: 'static,
  {
    let state_rx = self.state_tx.subscribe();
    let (outbound_tx, outbound_rx) = mpsc::channel(in_flight_window.max(1));
    let in_flight_limit = Arc::new(Semaphore::new(in_flight_window.max(1)));
    let wait_queue = Arc::new(Semaphore::new(max_queued.max(1)));
    let handle = ConnectionHandle { outbound: outbound_tx, state: state_rx.clone(), in_flight_limit, wait_queue };
    tokio::spawn(self.run(outbound_rx, grace));
    (handle, state_rx)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::frame::{Datatype, Frame, Magic};
  use bytes::Bytes;

  #[test]
  fn pending_table_opaques_are_monotonic_and_unique() {
    let mut table = PendingTable::new();
    let (tx1, _rx1) = oneshot::channel();
    let (tx2, _rx2) = oneshot::channel();
    let a = table.insert(tx1);
    let b = table.insert(tx2);
    assert_ne!(a, b);
    assert!(b > a);
  }

  #[tokio::test]
  async fn completing_a_registered_opaque_delivers_to_the_receiver() {
    let mut table = PendingTable::new();
    let (tx, rx) = oneshot::channel();
    let opaque = table.insert(tx);
    let frame = Frame {
      magic: Magic::ClientResponse,
      opcode: OpCode::Get.as_u8(),
      datatype: Datatype::empty(),
      status_or_vbucket: 0,
      opaque,
      cas: 0,
      framing_extras: vec![],
      extras: Bytes::new(),
      key: Bytes::new(),
      value: Bytes::new(),
    };
    table.complete(opaque, Ok(frame.clone()));
    let received = rx.await.unwrap().unwrap();
    assert_eq!(received.opaque, opaque);
  }

  #[tokio::test]
  async fn fail_all_delivers_the_given_kind_to_every_waiter() {
    let mut table = PendingTable::new();
    let (tx1, rx1) = oneshot::channel();
    let (tx2, rx2) = oneshot::channel();
    table.insert(tx1);
    table.insert(tx2);
    table.fail_all(ErrorKind::SocketClosedWhileInFlight);
    assert!(matches!(rx1.await.unwrap().unwrap_err().kind(), ErrorKind::SocketClosedWhileInFlight));
    assert!(matches!(rx2.await.unwrap().unwrap_err().kind(), ErrorKind::SocketClosedWhileInFlight));
  }

  #[test]
  fn negotiated_features_reflect_only_wire_enabled_codes() {
    let features = NegotiatedFeatures::from_wire(&[Feature::Collections.as_u16(), Feature::Json.as_u16()]);
    assert!(features.has(Feature::Collections));
    assert!(!features.has(Feature::SyncReplication));
  }

  #[tokio::test]
  async fn handshake_drives_through_plain_auth_against_a_fabricated_server() {
    let (client, mut server) = tokio::io::duplex(8192);
    let (mut connection, _state) = Connection::new(client);

    let server_task = tokio::spawn(async move {
      use tokio::io::{AsyncReadExt, AsyncWriteExt};
      use crate::frame::FrameCodec;

      let mut codec = FrameCodec::new();
      let mut buf = [0u8; 4096];

      async fn next_frame(server: &mut tokio::io::DuplexStream, codec: &mut FrameCodec, buf: &mut [u8]) -> Frame {
        loop {
          if let DecodeResult::Ok(frame) = codec.next() {
            return frame;
          }
          let n = server.read(buf).await.unwrap();
          codec.feed(&buf[..n]);
        }
      }

      // HELLO
      let hello = next_frame(&mut server, &mut codec, &mut buf).await;
      let hello_resp = Frame {
        magic: Magic::ClientResponse,
        opcode: hello.opcode,
        datatype: Datatype::empty(),
        status_or_vbucket: Status::Success.as_u16(),
        opaque: hello.opaque,
        cas: 0,
        framing_extras: vec![],
        extras: Bytes::new(),
        key: Bytes::new(),
        value: Bytes::new(),
      };
      server.write_all(&hello_resp.encode()).await.unwrap();

      // SASL_LIST_MECHS
      let list = next_frame(&mut server, &mut codec, &mut buf).await;
      let list_resp = Frame {
        magic: Magic::ClientResponse,
        opcode: list.opcode,
        datatype: Datatype::empty(),
        status_or_vbucket: Status::Success.as_u16(),
        opaque: list.opaque,
        cas: 0,
        framing_extras: vec![],
        extras: Bytes::new(),
        key: Bytes::new(),
        value: Bytes::from_static(b"PLAIN"),
      };
      server.write_all(&list_resp.encode()).await.unwrap();

      // SASL_AUTH
      let auth = next_frame(&mut server, &mut codec, &mut buf).await;
      let auth_resp = Frame {
        magic: Magic::ClientResponse,
        opcode: auth.opcode,
        datatype: Datatype::empty(),
        status_or_vbucket: Status::Success.as_u16(),
        opaque: auth.opaque,
        cas: 0,
        framing_extras: vec![],
        extras: Bytes::new(),
        key: Bytes::new(),
        value: Bytes::new(),
      };
      server.write_all(&auth_resp.encode()).await.unwrap();

      // GET_CLUSTER_CONFIG (no bucket selected in this test)
      let get_config = next_frame(&mut server, &mut codec, &mut buf).await;
      let config_resp = Frame {
        magic: Magic::ClientResponse,
        opcode: get_config.opcode,
        datatype: Datatype::empty(),
        status_or_vbucket: Status::Success.as_u16(),
        opaque: get_config.opaque,
        cas: 0,
        framing_extras: vec![],
        extras: Bytes::new(),
        key: Bytes::new(),
        value: Bytes::from_static(b"{\"rev\":1}"),
      };
      server.write_all(&config_resp.encode()).await.unwrap();
    });

    let params = HandshakeParams { client_identity: "test-client", username: "Administrator", password: "password", bucket: None };
    let config_bytes = connection.handshake(&params).await.unwrap();
    assert_eq!(config_bytes, b"{\"rev\":1}");
    server_task.await.unwrap();
  }
}
