//! Test-only in-memory transport: a real Unix domain socketpair used as
//! the stub server side of the wire protocol in end-to-end tests,
//! standing in for TCP/path/piped-command transports so the packet
//! layer, session negotiation, and control loop can be driven without an
//! actual `gdbserver`.

#![cfg(test)]

use crate::notify::NotificationQueue;
use crate::transport::Connection;
use std::io::{BufReader, BufWriter};
use std::os::unix::net::UnixStream;

fn connection_from(stream: UnixStream) -> Connection {
    let read_half = stream.try_clone().expect("clone socket for reading");
    Connection {
        reader: BufReader::new(Box::new(read_half)),
        writer: BufWriter::new(Box::new(stream)),
        ack_enabled: true,
        non_stop_enabled: false,
        notifications: NotificationQueue::new(),
        _child: None,
    }
}

/// A pair of `Connection`s wired to each other over a real socketpair,
/// one playing the client (our tracer core), the other the stub server.
pub fn loopback() -> (Connection, Connection) {
    let (a, b) = UnixStream::pair().expect("create socketpair");
    (connection_from(a), connection_from(b))
}
