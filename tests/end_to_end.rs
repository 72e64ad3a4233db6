//! End-to-end scenarios spanning the frame codec, SASL selection, and the
//! retry orchestrator together, rather than any one module in isolation
//! (`spec.md` §8 "End-to-end scenarios").

use kvcore::{
  maybe_retry, node_for_key, registry, select_mechanism, ClusterConfig, DecodeResult, FrameCodec, Node, PortMap, RetryContext,
  RetryDecision, RetryReason, RetryStrategy, SaslMechanism, VbucketMap,
};
use std::time::{Duration, Instant};

#[test]
fn plain_auth_payload_matches_the_known_wire_bytes() {
  // scenario 1: server only offers PLAIN; payload is `\0user\0pass`.
  let mut mechanism = select_mechanism("PLAIN", "user", "pass").unwrap();
  assert_eq!(mechanism.name(), "PLAIN");
  let payload = mechanism.start().unwrap();
  assert_eq!(payload, vec![0x00, b'u', b's', b'e', b'r', 0x00, b'p', b'a', b's', b's']);
}

#[test]
fn not_my_vbucket_triggers_a_retry_against_the_node_the_new_config_names() {
  // scenario 3: upsert returns not_my_vbucket; the pushed config is applied
  // (its rev strictly exceeds the current one), and the retry is scheduled
  // via controlled backoff at attempt 0 (1 ms).
  let stale = ClusterConfig {
    rev_epoch: 0,
    rev: 1,
    bucket: Some("travel-sample".into()),
    nodes: vec![Node { hostname: "node1".into(), ports: PortMap::default(), this_node: false }],
    vbucket_map: VbucketMap { map: vec![vec![0]; 1024] },
  };
  let pushed = ClusterConfig {
    rev_epoch: 0,
    rev: 2,
    bucket: Some("travel-sample".into()),
    nodes: vec![
      Node { hostname: "node1".into(), ports: PortMap::default(), this_node: false },
      Node { hostname: "node2".into(), ports: PortMap::default(), this_node: false },
    ],
    vbucket_map: VbucketMap { map: vec![vec![1]; 1024] },
  };
  assert!(pushed.supersedes(&stale));

  let mut ctx = RetryContext::new(RetryStrategy::BestEffort, false, Instant::now() + Duration::from_secs(5));
  let decision = maybe_retry(&mut ctx, RetryReason::KvNotMyVbucket, Instant::now());
  assert_eq!(decision, RetryDecision::RetryAfter(Duration::from_millis(1)));
  assert_eq!(ctx.retry_attempts, 1);
  assert!(ctx.reasons.contains(&RetryReason::KvNotMyVbucket));

  let (node, _vbucket) = node_for_key(&pushed, b"airline_10").unwrap();
  assert_eq!(node.hostname, "node2");
}

#[test]
fn get_request_on_a_missing_key_surfaces_document_not_found() {
  // scenario 2, exercised through the codec rather than a raw Frame literal.
  let req = registry::GetRequest { vbucket_id: 42, collection_uid: 0, key: b"missing", opaque: 7 };
  let request_frame = registry::encode_get(&req);
  assert_eq!(request_frame.opaque, 7);

  let response_bytes = {
    let mut response = request_frame.clone();
    response.magic = kvcore::Magic::ClientResponse;
    response.status_or_vbucket = kvcore::Status::KeyNotFound.as_u16();
    response.encode()
  };

  let mut codec = FrameCodec::new();
  codec.feed(&response_bytes);
  let decoded = match codec.next() {
    DecodeResult::Ok(frame) => frame,
    other => panic!("expected a decoded response frame, got {other:?}"),
  };

  let err = registry::decode_get_response(&decoded).unwrap_err();
  assert_eq!(err.kind(), &kvcore::ErrorKind::DocumentNotFound);
}
