//! Target I/O facades: register/memory reads, file-path
//! resolution via `vFile:readlink`, and bulk `qXfer` transfers.
//!
//! Grounded in `gdb_get_regs`/`gdb_read_mem`/`gdb_readlink`/`gdb_vfile`/
//! `gdb_xfer_read` in `gdbserver/protocol.c` and `gdbserver.c`.

use crate::codec;
use crate::error::{RspError, RspResult};
use crate::ids::ThreadId;
use crate::packet;
use crate::transport::Connection;

const MAX_MEM_CHUNK: usize = 0x1000;
const QXFER_MAX_LEN: usize = 0xfff;

/// Fetch the raw register blob for `tid`. Assumes the stub's currently
/// selected thread is already `tid` -- no `Hg` is sent first, matching
/// the reference's documented caveat.
pub fn get_regs(conn: &mut Connection, _tid: ThreadId) -> RspResult<Vec<u8>> {
    packet::send(conn, b"g")?;
    let reply = packet::recv(conn, false)?;
    codec::decode_hex_buf(&reply).ok_or_else(|| RspError::protocol("malformed register reply", &reply))
}

/// Read `len` bytes of tracee memory at `addr` into a fresh buffer,
/// chunked at `MAX_MEM_CHUNK` like the reference. If `check_nil` is set
/// and a NUL byte turns up inside a decoded chunk, returns
/// `Ok((buf, true))` for a "short read" (caller should treat `buf` as
/// NUL-terminated) rather than continuing to read past it.
pub fn read_mem(
    conn: &mut Connection,
    _tid: ThreadId,
    addr: u64,
    len: usize,
    check_nil: bool,
) -> RspResult<(Vec<u8>, bool)> {
    let mut out = Vec::with_capacity(len);
    let mut remaining = len;
    let mut cursor = addr;

    while remaining > 0 {
        let chunk_len = remaining.min(MAX_MEM_CHUNK);
        let cmd = format!("m{:x},{:x}", cursor, chunk_len);
        packet::send(conn, cmd.as_bytes())?;
        let reply = packet::recv(conn, false)?;

        if reply.is_empty() || reply[0] == b'E' || reply.len() % 2 != 0 || reply.len() > chunk_len * 2 {
            return Err(RspError::protocol("memory read failed", &reply));
        }
        let decoded = codec::decode_hex_buf(&reply)
            .ok_or_else(|| RspError::protocol("malformed memory reply", &reply))?;

        let got = decoded.len();
        if check_nil {
            if let Some(nil_pos) = decoded.iter().position(|&b| b == 0) {
                out.extend_from_slice(&decoded[..nil_pos]);
                return Ok((out, true));
            }
        }
        out.extend_from_slice(&decoded);

        cursor += got as u64;
        remaining -= got;
    }

    Ok((out, false))
}

pub struct VfileResponse {
    pub result: i64,
    pub errno: i64,
    pub attachment: Vec<u8>,
}

/// Generic `vFile:<op>:<params>` wrapper; parses `F <result>[,<errno>][;<attachment>]`.
pub fn vfile(conn: &mut Connection, operation: &str, parameters: &[u8]) -> RspResult<VfileResponse> {
    let mut cmd = format!("vFile:{}:", operation).into_bytes();
    cmd.extend_from_slice(parameters);
    packet::send(conn, &cmd)?;
    let reply = packet::recv(conn, false)?;

    if reply.first() != Some(&b'F') {
        return Err(RspError::protocol("malformed vFile reply", &reply));
    }

    let semi = reply.iter().position(|&b| b == b';');
    let body_end = semi.unwrap_or(reply.len());
    let body = &reply[1..body_end];
    let attachment = semi.map(|i| reply[i + 1..].to_vec()).unwrap_or_default();

    let comma = body.iter().position(|&b| b == b',');
    let (result_bytes, errno_bytes) = match comma {
        Some(i) => (&body[..i], Some(&body[i + 1..])),
        None => (body, None),
    };

    let result = codec::decode_signed_hex_str(result_bytes)
        .ok_or_else(|| RspError::protocol("malformed vFile result", &reply))?;
    let errno = errno_bytes
        .and_then(codec::decode_signed_hex_str)
        .unwrap_or(0);

    Ok(VfileResponse {
        result,
        errno,
        attachment,
    })
}

/// Resolve `/proc/<tid>/fd/<fd>` via `vFile:readlink`.
pub fn getfdpath(conn: &mut Connection, tid: ThreadId, fd: i32) -> RspResult<Option<Vec<u8>>> {
    let path = format!("/proc/{}/fd/{}", tid.tid, fd);
    let hex_path = codec::encode_hex_string(path.as_bytes());
    let response = vfile(conn, "readlink", &hex_path)?;
    if response.result >= 0 && response.result as usize == response.attachment.len() {
        Ok(Some(response.attachment))
    } else {
        Ok(None)
    }
}

/// Loop `qXfer:<object>:read:<annex>:<offset>,<len>` until the stub
/// signals the last chunk (`l`), concatenating payloads. An `E<hh>`
/// reply surfaces as a protocol error carrying the raw error code.
pub fn qxfer_read(conn: &mut Connection, object: &str, annex: &str) -> RspResult<Vec<u8>> {
    let mut data = Vec::new();
    let mut offset = 0usize;

    loop {
        let cmd = format!(
            "qXfer:{}:read:{}:{:x},{:x}",
            object, annex, offset, QXFER_MAX_LEN
        );
        packet::send(conn, cmd.as_bytes())?;
        let reply = packet::recv(conn, false)?;

        match reply.first() {
            Some(b'm') | Some(b'l') => {
                let last = reply[0] == b'l';
                data.extend_from_slice(&reply[1..]);
                offset += reply.len() - 1;
                if last {
                    return Ok(data);
                }
            }
            Some(b'E') => {
                let code = codec::decode_hex_str(&reply[1..]).unwrap_or(0);
                return Err(RspError::CommandError { code: code as u8 });
            }
            _ => return Err(RspError::protocol("malformed qXfer reply", &reply)),
        }
    }
}
