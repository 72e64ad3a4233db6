//! DNS-SRV bootstrap (`spec.md` §6 "DNS-SRV bootstrap"), collaborator seam
//! per `spec.md` §6's instruction to keep the process-wide RNG/DNS state as
//! explicit, injectable state rather than a hidden singleton. None of this
//! workspace's teacher crates perform SRV lookups, so the default
//! implementation is a minimal raw-UDP client against `/etc/resolv.conf`'s
//! first nameserver, falling back to `8.8.8.8:53`, matching the only
//! network protocol shape this core already favors: hand-rolled
//! big-endian wire parsing (see `frame.rs`), not an external resolver crate.

use std::fs;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::UdpSocket;

use crate::error::{ErrorKind, KvError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrvTarget {
  pub priority: u16,
  pub weight: u16,
  pub port: u16,
  pub target: String,
}

/// Collaborator seam so tests and embedders can substitute a fake resolver.
pub trait DnsSrvResolver: Send + Sync {
  fn resolve_srv(&self, name: &str, timeout: Duration) -> impl std::future::Future<Output = Result<Vec<SrvTarget>, KvError>> + Send;
}

/// `_couchbase._tcp.<host>` / `_couchbases._tcp.<host>` as `spec.md` §6 names it.
pub fn srv_record_name(host: &str, use_tls: bool) -> String {
  let service = if use_tls { "_couchbases._tcp" } else { "_couchbase._tcp" };
  format!("{service}.{host}")
}

/// Reads the first nameserver out of `/etc/resolv.conf`, falling back to
/// `8.8.8.8:53` (`spec.md` §6).
pub fn system_nameserver() -> SocketAddr {
  if let Ok(contents) = fs::read_to_string("/etc/resolv.conf") {
    for line in contents.lines() {
      let line = line.trim();
      if let Some(rest) = line.strip_prefix("nameserver") {
        if let Some(addr) = rest.trim().parse::<std::net::IpAddr>().ok() {
          return SocketAddr::new(addr, 53);
        }
      }
    }
  }
  "8.8.8.8:53".parse().expect("fallback nameserver address is valid")
}

pub struct UdpDnsSrvResolver {
  nameserver: SocketAddr,
}

impl UdpDnsSrvResolver {
  pub fn new(nameserver: SocketAddr) -> Self {
    Self { nameserver }
  }

  pub fn from_system_config() -> Self {
    Self::new(system_nameserver())
  }
}

impl Default for UdpDnsSrvResolver {
  fn default() -> Self {
    Self::from_system_config()
  }
}

fn encode_qname(name: &str, buf: &mut Vec<u8>) {
  for label in name.split('.') {
    buf.push(label.len() as u8);
    buf.extend_from_slice(label.as_bytes());
  }
  buf.push(0);
}

fn build_srv_query(name: &str, id: u16) -> Vec<u8> {
  let mut buf = Vec::with_capacity(32 + name.len());
  buf.extend_from_slice(&id.to_be_bytes());
  buf.extend_from_slice(&0x0100u16.to_be_bytes()); // recursion desired
  buf.extend_from_slice(&1u16.to_be_bytes()); // QDCOUNT
  buf.extend_from_slice(&0u16.to_be_bytes()); // ANCOUNT
  buf.extend_from_slice(&0u16.to_be_bytes()); // NSCOUNT
  buf.extend_from_slice(&0u16.to_be_bytes()); // ARCOUNT
  encode_qname(name, &mut buf);
  buf.extend_from_slice(&33u16.to_be_bytes()); // QTYPE SRV
  buf.extend_from_slice(&1u16.to_be_bytes()); // QCLASS IN
  buf
}

/// Reads a (possibly pointer-compressed) domain name starting at `offset`.
fn read_name(packet: &[u8], mut offset: usize) -> Option<(String, usize)> {
  let mut labels = Vec::new();
  let start = offset;
  let mut jumped = false;
  let mut end_of_sequence = offset;
  let mut hops = 0;

  loop {
    hops += 1;
    if hops > 128 {
      return None; // malformed or a compression loop
    }
    let len = *packet.get(offset)?;
    if len == 0 {
      if !jumped {
        end_of_sequence = offset + 1;
      }
      break;
    } else if len & 0xc0 == 0xc0 {
      let next = *packet.get(offset + 1)? as usize;
      let pointer = (((len & 0x3f) as usize) << 8) | next;
      if !jumped {
        end_of_sequence = offset + 2;
      }
      jumped = true;
      offset = pointer;
      continue;
    } else {
      let label_start = offset + 1;
      let label = packet.get(label_start..label_start + len as usize)?;
      labels.push(String::from_utf8_lossy(label).into_owned());
      offset = label_start + len as usize;
    }
  }

  let _ = start;
  Some((labels.join("."), end_of_sequence))
}

fn parse_srv_response(packet: &[u8]) -> Result<Vec<SrvTarget>, KvError> {
  if packet.len() < 12 {
    return Err(KvError::new(ErrorKind::ParsingFailure));
  }
  let qdcount = u16::from_be_bytes([packet[4], packet[5]]) as usize;
  let ancount = u16::from_be_bytes([packet[6], packet[7]]) as usize;

  let mut offset = 12;
  for _ in 0..qdcount {
    let (_, next) = read_name(packet, offset).ok_or_else(|| KvError::new(ErrorKind::ParsingFailure))?;
    offset = next + 4; // QTYPE + QCLASS
  }

  let mut results = Vec::with_capacity(ancount);
  for _ in 0..ancount {
    let (_, after_name) = read_name(packet, offset).ok_or_else(|| KvError::new(ErrorKind::ParsingFailure))?;
    let rtype = u16::from_be_bytes([*packet.get(after_name)?, *packet.get(after_name + 1)?]);
    let rdlength = u16::from_be_bytes([*packet.get(after_name + 8)?, *packet.get(after_name + 9)?]) as usize;
    let rdata_start = after_name + 10;

    if rtype == 33 {
      let priority = u16::from_be_bytes([*packet.get(rdata_start)?, *packet.get(rdata_start + 1)?]);
      let weight = u16::from_be_bytes([*packet.get(rdata_start + 2)?, *packet.get(rdata_start + 3)?]);
      let port = u16::from_be_bytes([*packet.get(rdata_start + 4)?, *packet.get(rdata_start + 5)?]);
      let (target, _) = read_name(packet, rdata_start + 6).ok_or_else(|| KvError::new(ErrorKind::ParsingFailure))?;
      results.push(SrvTarget { priority, weight, port, target });
    }

    offset = rdata_start + rdlength;
  }

  results.sort_by_key(|t| (t.priority, std::cmp::Reverse(t.weight)));
  Ok(results)
}

impl DnsSrvResolver for UdpDnsSrvResolver {
  async fn resolve_srv(&self, name: &str, timeout: Duration) -> Result<Vec<SrvTarget>, KvError> {
    let socket = UdpSocket::bind("0.0.0.0:0")
      .await
      .map_err(|_| KvError::new(ErrorKind::ServiceNotAvailable))?;
    socket
      .connect(self.nameserver)
      .await
      .map_err(|_| KvError::new(ErrorKind::ServiceNotAvailable))?;

    let query = build_srv_query(name, 0x1234);
    socket.send(&query).await.map_err(|_| KvError::new(ErrorKind::ServiceNotAvailable))?;

    let mut buf = [0u8; 4096];
    let len = tokio::time::timeout(timeout, socket.recv(&mut buf))
      .await
      .map_err(|_| KvError::new(ErrorKind::UnambiguousTimeout))?
      .map_err(|_| KvError::new(ErrorKind::ServiceNotAvailable))?;

    parse_srv_response(&buf[..len])
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn srv_record_name_picks_the_tls_service_when_requested() {
    assert_eq!(srv_record_name("cb.example.com", false), "_couchbase._tcp.cb.example.com");
    assert_eq!(srv_record_name("cb.example.com", true), "_couchbases._tcp.cb.example.com");
  }

  #[test]
  fn qname_encoding_length_prefixes_each_label() {
    let mut buf = Vec::new();
    encode_qname("a.bb", &mut buf);
    assert_eq!(buf, vec![1, b'a', 2, b'b', b'b', 0]);
  }

  #[test]
  fn parses_a_single_srv_answer_with_no_name_compression() {
    let mut packet = Vec::new();
    packet.extend_from_slice(&0x1234u16.to_be_bytes()); // id
    packet.extend_from_slice(&0x8180u16.to_be_bytes()); // flags: response, recursion available
    packet.extend_from_slice(&1u16.to_be_bytes()); // qdcount
    packet.extend_from_slice(&1u16.to_be_bytes()); // ancount
    packet.extend_from_slice(&0u16.to_be_bytes());
    packet.extend_from_slice(&0u16.to_be_bytes());
    encode_qname("_couchbase._tcp.cb.example.com", &mut packet);
    packet.extend_from_slice(&33u16.to_be_bytes());
    packet.extend_from_slice(&1u16.to_be_bytes());

    // answer: name (pointer back to question), type, class, ttl, rdlength, rdata
    packet.extend_from_slice(&0xc00cu16.to_be_bytes());
    packet.extend_from_slice(&33u16.to_be_bytes());
    packet.extend_from_slice(&1u16.to_be_bytes());
    packet.extend_from_slice(&60u32.to_be_bytes());
    let mut rdata = Vec::new();
    rdata.extend_from_slice(&0u16.to_be_bytes()); // priority
    rdata.extend_from_slice(&0u16.to_be_bytes()); // weight
    rdata.extend_from_slice(&11210u16.to_be_bytes()); // port
    encode_qname("node1.cb.example.com", &mut rdata);
    packet.extend_from_slice(&(rdata.len() as u16).to_be_bytes());
    packet.extend_from_slice(&rdata);

    let targets = parse_srv_response(&packet).unwrap();
    assert_eq!(targets.len(), 1);
    assert_eq!(targets[0].port, 11210);
    assert_eq!(targets[0].target, "node1.cb.example.com");
  }
}
