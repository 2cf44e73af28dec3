//! Stop parser: decode `S`/`T`/`W`/`X`/`E` packets into a tagged
//! `StopReply`.
//!
//! Grounded in `gdb_recv_signal`/`gdb_recv_exit`/`gdb_recv_stop` in
//! `gdbserver/gdbserver.c`. The reference tokenizes destructively with
//! `strtok_r`; this implementation scans `;`-separated `key:value` pairs
//! as non-owning byte-slice pairs instead.

use crate::ids::ThreadId;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum StopKind {
    Unknown,
    Error,
    Signal,
    Trap,
    SyscallEntry,
    SyscallReturn,
    Exited,
    Terminated,
}

#[derive(Clone, Debug)]
pub struct StopReply {
    pub kind: StopKind,
    /// Error code, signal number, syscall number, or exit/term status,
    /// depending on `kind`.
    pub code: i64,
    pub pid: Option<u32>,
    pub tid: Option<u32>,
    pub raw: Vec<u8>,
}

impl StopReply {
    fn unknown(raw: &[u8]) -> StopReply {
        StopReply {
            kind: StopKind::Unknown,
            code: -1,
            pid: None,
            tid: None,
            raw: raw.to_vec(),
        }
    }

    pub fn thread_id(&self) -> Option<ThreadId> {
        match (self.pid, self.tid) {
            (Some(pid), Some(tid)) => Some(ThreadId::new(pid, tid)),
            _ => None,
        }
    }
}

/// Iterate `;`-separated `key:value` pairs without mutating `buf`.
fn key_value_pairs(buf: &[u8]) -> impl Iterator<Item = (&[u8], &[u8])> {
    buf.split(|&b| b == b';').filter(|s| !s.is_empty()).map(|pair| {
        match pair.iter().position(|&b| b == b':') {
            Some(colon) => (&pair[..colon], &pair[colon + 1..]),
            None => (pair, &pair[0..0]),
        }
    })
}

fn parse_signal(raw: &[u8]) -> StopReply {
    let code = crate::codec::decode_hex_n(&raw[1..], 2) as i64;
    let mut kind = if code == crate::signals::GDB_SIGNAL_TRAP as i64 || code == 0 {
        StopKind::Trap
    } else {
        StopKind::Signal
    };
    let mut stop_code = code;
    let mut pid = None;
    let mut tid = None;

    if raw.first() == Some(&b'T') {
        for (key, value) in key_value_pairs(&raw[3..]) {
            match key {
                b"thread" => {
                    if let Some(id) = ThreadId::parse(value) {
                        pid = Some(id.pid);
                        tid = Some(id.tid);
                    }
                }
                b"syscall_entry" if kind == StopKind::Trap => {
                    if let Some(scno) = crate::codec::decode_hex_str(value) {
                        kind = StopKind::SyscallEntry;
                        stop_code = scno as i64;
                    }
                }
                b"syscall_return" if kind == StopKind::Trap => {
                    if let Some(scno) = crate::codec::decode_hex_str(value) {
                        kind = StopKind::SyscallReturn;
                        stop_code = scno as i64;
                    }
                }
                _ => {}
            }
        }
    }

    StopReply {
        kind,
        code: stop_code,
        pid,
        tid,
        raw: raw.to_vec(),
    }
}

fn parse_exit(raw: &[u8]) -> StopReply {
    let kind = if raw[0] == b'W' {
        StopKind::Exited
    } else {
        StopKind::Terminated
    };
    let code = crate::codec::decode_hex_str(&raw[1..]).unwrap_or(0) as i64;

    let mut pid = None;
    const MARKER: &[u8] = b";process:";
    if let Some(pos) = find_subslice(raw, MARKER) {
        let value = &raw[pos + MARKER.len()..];
        if let Some(p) = crate::codec::decode_hex_str(value) {
            pid = Some(p as u32);
        }
    }

    StopReply {
        kind,
        code,
        pid,
        tid: pid,
        raw: raw.to_vec(),
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Parse one raw stop-reply payload. Requires at least 3 bytes,
/// matching the reference's "all good packets
/// are at least 3 bytes" rule; anything shorter is `Unknown`.
pub fn parse(raw: &[u8]) -> StopReply {
    if raw.len() < 3 {
        return StopReply::unknown(raw);
    }
    match raw[0] {
        b'E' => StopReply {
            kind: StopKind::Error,
            code: crate::codec::decode_hex_n(&raw[1..], 2) as i64,
            pid: None,
            tid: None,
            raw: raw.to_vec(),
        },
        b'S' | b'T' => parse_signal(raw),
        b'W' | b'X' => parse_exit(raw),
        _ => StopReply::unknown(raw),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn syscall_entry_decodes_pid_tid_and_code() {
        let reply = parse(b"T05syscall_entry:3b;thread:p7b.7b;");
        assert_eq!(reply.kind, StopKind::SyscallEntry);
        assert_eq!(reply.code, 0x3b);
        assert_eq!(reply.pid, Some(0x7b));
        assert_eq!(reply.tid, Some(0x7b));
    }

    #[test]
    fn syscall_return_decodes() {
        let reply = parse(b"T05syscall_return:3b;thread:p7b.7b;");
        assert_eq!(reply.kind, StopKind::SyscallReturn);
        assert_eq!(reply.code, 0x3b);
    }

    #[test]
    fn plain_trap_has_no_promotion() {
        let reply = parse(b"T05thread:p7b.7b;");
        assert_eq!(reply.kind, StopKind::Trap);
    }

    #[test]
    fn signal_is_not_trap() {
        let reply = parse(b"T0b;thread:p7b.7b;");
        assert_eq!(reply.kind, StopKind::Signal);
        assert_eq!(reply.code, 0x0b);
    }

    #[test]
    fn error_reply_decodes_code() {
        let reply = parse(b"E01");
        assert_eq!(reply.kind, StopKind::Error);
        assert_eq!(reply.code, 1);
    }

    #[test]
    fn exited_decodes_process_and_code() {
        let reply = parse(b"W2a;process:7b");
        assert_eq!(reply.kind, StopKind::Exited);
        assert_eq!(reply.code, 0x2a);
        assert_eq!(reply.pid, Some(0x7b));
        assert_eq!(reply.tid, Some(0x7b));
    }

    #[test]
    fn terminated_decodes() {
        let reply = parse(b"X0b;process:7b");
        assert_eq!(reply.kind, StopKind::Terminated);
        assert_eq!(reply.code, 0x0b);
    }

    #[test]
    fn short_reply_is_unknown() {
        let reply = parse(b"Ok");
        assert_eq!(reply.kind, StopKind::Unknown);
    }

    #[test]
    fn unrecognized_tag_is_unknown() {
        let reply = parse(b"Zxyz");
        assert_eq!(reply.kind, StopKind::Unknown);
    }
}
