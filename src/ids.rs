//! Thread/process identifiers on the wire.
//!
//! The reference C code spells these out ad hoc at each call site
//! (`sprintf(cmd, "vAttach;%x", tcp->pid)`, `strchr(r, '.')` to split
//! `pPID.TID`, ...). Centralizing the `p<pid>.<tid>` encode/decode here is
//! the "non-destructive scanner" approach used throughout this crate.

use std::fmt;

pub type RawId = u32;

/// A resolved thread identifier: process id (kernel tgid) plus thread id
/// (kernel tid). Under non-multiprocess mode the two are equal.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ThreadId {
    pub pid: RawId,
    pub tid: RawId,
}

impl ThreadId {
    pub fn new(pid: RawId, tid: RawId) -> ThreadId {
        ThreadId { pid, tid }
    }

    /// A thread id before its pid is known; pid defaults to tid, matching
    /// the reference's "just TID, assume same PID" rule.
    pub fn solo(tid: RawId) -> ThreadId {
        ThreadId { pid: tid, tid }
    }

    /// Parse the `thread:` value of a `T` stop reply: either `p<pid>.<tid>`,
    /// `p<pid>` (tid defaults to pid), or a bare `<tid>` (pid defaults to
    /// tid).
    pub fn parse(value: &[u8]) -> Option<ThreadId> {
        if value.first() == Some(&b'p') {
            let rest = &value[1..];
            match rest.iter().position(|&b| b == b'.') {
                Some(dot) => {
                    let pid = crate::codec::decode_hex_str(&rest[..dot])?;
                    let tid = crate::codec::decode_hex_str(&rest[dot + 1..])?;
                    Some(ThreadId::new(pid as RawId, tid as RawId))
                }
                None => {
                    let pid = crate::codec::decode_hex_str(rest)?;
                    Some(ThreadId::solo(pid as RawId))
                }
            }
        } else {
            let tid = crate::codec::decode_hex_str(value)?;
            Some(ThreadId::solo(tid as RawId))
        }
    }

    /// Render as `p<pid>.<tid>`, used by `vCont`/`Hg`/`D` commands under
    /// multiprocess mode.
    pub fn to_multiprocess_string(self) -> String {
        format!("p{:x}.{:x}", self.pid, self.tid)
    }

    /// Render a thread-id specifier for `vCont`/`Hg`/`D` the way the peer
    /// actually expects it: `p<pid>.<tid>` once the multiprocess
    /// extension is negotiated, bare `<tid>` otherwise: a non-multiprocess
    /// session expects `vCont;C0b:7b;c`, not the `p`-tagged form.
    pub fn to_wire_string(self, multiprocess: bool) -> String {
        if multiprocess {
            self.to_multiprocess_string()
        } else {
            format!("{:x}", self.tid)
        }
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self.tid)
    }
}

/// A tracer-side notion of target ABI variant, used to pick a signal table.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Personality(pub usize);

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_plain_tid() {
        let id = ThreadId::parse(b"7b").unwrap();
        assert_eq!(id, ThreadId::new(0x7b, 0x7b));
    }

    #[test]
    fn parse_pid_only() {
        let id = ThreadId::parse(b"p7b").unwrap();
        assert_eq!(id, ThreadId::new(0x7b, 0x7b));
    }

    #[test]
    fn parse_pid_dot_tid() {
        let id = ThreadId::parse(b"p7b.2a").unwrap();
        assert_eq!(id, ThreadId::new(0x7b, 0x2a));
    }

    #[test]
    fn round_trip_multiprocess_string() {
        let id = ThreadId::new(0x7b, 0x2a);
        assert_eq!(id.to_multiprocess_string(), "p7b.2a");
    }

    #[test]
    fn wire_string_is_bare_tid_without_multiprocess() {
        let id = ThreadId::new(0x7b, 0x7b);
        assert_eq!(id.to_wire_string(false), "7b");
        assert_eq!(id.to_wire_string(true), "p7b.7b");
    }
}
