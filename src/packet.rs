//! Packet layer: `$payload#HH` framing, ack/nack
//! retransmission, the `QStartNoAckMode` downgrade, and notification
//! ingress.
//!
//! Grounded in `send_packet`/`gdb_send`/`recv_packet`/`gdb_recv` in
//! `gdbserver/protocol.c`. One divergence from the C source is
//! intentional and documented inline: the C's `case '%'` swallows the
//! literal `"Stop:"` tag into the checksum but not into the returned
//! buffer, so the payload callers see is already a bare stop-reply
//! (`T05...`), never `Stop:T05...`. This rewrite reproduces that exact
//! behavior rather than "fixing" it into two separate fields.

use crate::error::{RspError, RspResult};
use crate::transport::Connection;
use std::io::{Read, Write};

const NOTIFICATION_TAG: &[u8; 5] = b"Stop:";

fn read_byte(conn: &mut Connection) -> RspResult<u8> {
    let mut buf = [0u8; 1];
    conn.reader.read_exact(&mut buf)?;
    Ok(buf[0])
}

fn checksum_of(payload: &[u8]) -> u8 {
    payload.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

/// Send one command packet, retrying on nack until acked (or until acks
/// are disabled mid-loop, e.g. by a `QStartNoAckMode` reply processed
/// concurrently -- not possible in this single-threaded core, but the
/// loop condition matches the reference's structure regardless).
pub fn send(conn: &mut Connection, command: &[u8]) -> RspResult<()> {
    loop {
        let sum = checksum_of(command);
        conn.writer.write_all(b"$")?;
        conn.writer.write_all(command)?;
        write!(conn.writer, "#{:02x}", sum)?;
        conn.writer.flush()?;

        if !conn.ack_enabled {
            return Ok(());
        }
        if read_byte(conn)? == b'+' {
            return Ok(());
        }
        // '-' (or anything else treated as nack): resend.
    }
}

/// One raw `$...#HH` or `%Stop:...#HH` frame, with escape/RLE already
/// expanded. Returns the payload (for a notification frame, with the
/// `Stop:` tag already stripped, per the module doc above) and whether
/// its checksum matched.
fn recv_one(conn: &mut Connection) -> RspResult<(Vec<u8>, bool)> {
    // Fast-forward to the next packet start.
    let mut start;
    loop {
        start = read_byte(conn)?;
        if start == b'$' || start == b'%' {
            break;
        }
    }

    let mut payload = Vec::new();
    let mut sum: u8 = 0;
    let mut escape = false;

    if start == b'%' {
        let mut tag = [0u8; 5];
        for slot in tag.iter_mut() {
            let b = read_byte(conn)?;
            sum = sum.wrapping_add(b);
            *slot = b;
        }
        if &tag != NOTIFICATION_TAG {
            return Err(RspError::protocol("unknown non-stop notification", &tag));
        }
    }

    // Holds a byte already pulled off the wire but not yet dispatched --
    // used only to re-feed the would-be RLE count byte through the normal
    // dispatch below when it turns out `*` wasn't a valid RLE marker.
    let mut pending: Option<u8> = None;

    loop {
        let c = match pending.take() {
            Some(b) => b,
            None => read_byte(conn)?,
        };
        match c {
            b'$' => {
                // A fresh packet start mid-stream: discard what we had.
                payload.clear();
                sum = 0;
                escape = false;
                continue;
            }
            b'%' => {
                payload.clear();
                sum = 0;
                escape = false;
                let mut tag = [0u8; 5];
                for slot in tag.iter_mut() {
                    let b = read_byte(conn)?;
                    sum = sum.wrapping_add(b);
                    *slot = b;
                }
                if &tag != NOTIFICATION_TAG {
                    return Err(RspError::protocol("unknown non-stop notification", &tag));
                }
                continue;
            }
            b'#' => {
                let msb = read_byte(conn)?;
                let lsb = read_byte(conn)?;
                let ok = match crate::codec::decode_hex(msb, lsb) {
                    Some(expected) => expected == sum,
                    None => false,
                };
                return Ok((payload, ok));
            }
            b'}' => {
                sum = sum.wrapping_add(c);
                escape = true;
                continue;
            }
            b'*' if !payload.is_empty() => {
                let count_byte = read_byte(conn)?;
                if crate::codec::is_valid_rle_count_byte(count_byte) {
                    sum = sum.wrapping_add(c).wrapping_add(count_byte);
                    let repeat = crate::codec::rle_repeat_count(count_byte);
                    let last = *payload.last().unwrap();
                    payload.extend(std::iter::repeat(last).take(repeat));
                    continue;
                }
                // Not a valid count byte: `*` is a literal data byte, and
                // the byte that would have been the count is fed back
                // through the normal dispatch above instead of being
                // forced into the payload -- if it's `#`/`$`/`%` it still
                // has to terminate/restart the frame, not get swallowed.
                sum = sum.wrapping_add(c);
                if escape {
                    escape = false;
                    payload.push(crate::codec::unescape_byte(c));
                } else {
                    payload.push(c);
                }
                pending = Some(count_byte);
                continue;
            }
            _ => {}
        }

        sum = sum.wrapping_add(c);
        if escape {
            escape = false;
            payload.push(crate::codec::unescape_byte(c));
        } else {
            payload.push(c);
        }
    }
}

/// Receive one logical reply packet. When `want_stop` is false and the
/// arriving payload is a stray stop notification (`T05syscall...`
/// prefix), it's parked in the connection's `NotificationQueue` and the
/// read is retried transparently -- the "notification redirection" rule
/// that keeps stray stop notifications from confusing an unrelated command
/// reply.
pub fn recv(conn: &mut Connection, want_stop: bool) -> RspResult<Vec<u8>> {
    loop {
        let (payload, checksum_ok) = recv_one(conn)?;

        if conn.ack_enabled {
            conn.writer
                .write_all(if checksum_ok { b"+" } else { b"-" })?;
            conn.writer.flush()?;
            if !checksum_ok {
                continue;
            }
        }

        if !want_stop && payload.len() >= 10 && &payload[..10] == b"T05syscall" {
            conn.notifications.push(&payload);
            continue;
        }

        return Ok(payload);
    }
}

/// Send `QStartNoAckMode`; on an `OK` reply, disable acking on this
/// connection and report success.
pub fn start_noack(conn: &mut Connection) -> RspResult<bool> {
    send(conn, b"QStartNoAckMode")?;
    let reply = recv(conn, false)?;
    let ok = reply == b"OK";
    if ok {
        conn.ack_enabled = false;
    }
    Ok(ok)
}
