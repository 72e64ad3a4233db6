//! Wire-level tracing helpers, adapted from this codebase's
//! `mysql::debug::DebugBytesRef` pretty-printer. Where the original module
//! paired this with `eprintln!`, this core logs through `tracing` so wire
//! traces participate in whatever subscriber the embedding application sets
//! up (`spec.md` §2 ambient stack, "logging").

use std::fmt::{self, Debug};

pub struct DebugBytesRef<'a>(pub &'a [u8]);

impl Debug for DebugBytesRef<'_> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "b\"")?;
    for &b in self.0 {
      // https://doc.rust-lang.org/reference/tokens.html#byte-escapes
      if b == b'\n' {
        write!(f, "\\n")?;
      } else if b == b'\r' {
        write!(f, "\\r")?;
      } else if b == b'\t' {
        write!(f, "\\t")?;
      } else if b == b'\\' || b == b'"' {
        write!(f, "\\{}", b as char)?;
      } else if b == b'\0' {
        write!(f, "\\0")?;
      // ASCII printable
      } else if (0x20..0x7f).contains(&b) {
        write!(f, "{}", b as char)?;
      } else {
        write!(f, "\\x{b:02x}")?;
      }
    }
    write!(f, "\"")?;
    Ok(())
  }
}

pub fn trace_outbound(bytes: &[u8]) {
  tracing::trace!(bytes = ?DebugBytesRef(bytes), ">> wrote frame");
}

pub fn trace_inbound(bytes: &[u8]) {
  tracing::trace!(bytes = ?DebugBytesRef(bytes), "<< read frame");
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn escapes_control_and_non_ascii_bytes() {
    let rendered = format!("{:?}", DebugBytesRef(b"a\n\t\0\xff"));
    assert_eq!(rendered, "b\"a\\n\\t\\0\\xff\"");
  }

  #[test]
  fn leaves_printable_ascii_untouched() {
    let rendered = format!("{:?}", DebugBytesRef(b"hello"));
    assert_eq!(rendered, "b\"hello\"");
  }
}
