//! Transport: TCP / path / piped-command byte streams,
//! wrapped in a `Connection` that `packet::send`/`packet::recv` drive.
//!
//! Grounded in `gdb_begin`/`gdb_begin_tcp`/`gdb_begin_path`/
//! `gdb_begin_command` in `gdbserver/protocol.c`.

use crate::error::{RspError, RspResult};
use crate::notify::NotificationQueue;
use std::io::{BufReader, BufWriter, Read, Write};
use std::net::TcpStream;
use std::os::unix::io::{AsRawFd, FromRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::process::{Command as StdCommand, Stdio};

/// The session-owned, exclusive handle to the remote stub. Two
/// independent buffered half-duplex streams over one underlying duplex
/// channel, plus the per-connection negotiated flags.
pub struct Connection {
    pub(crate) reader: BufReader<Box<dyn Read + Send>>,
    pub(crate) writer: BufWriter<Box<dyn Write + Send>>,
    pub ack_enabled: bool,
    pub non_stop_enabled: bool,
    pub(crate) notifications: NotificationQueue,
    // Kept alive only so the spawned command's process isn't reaped out
    // from under us; never read directly.
    pub(crate) _child: Option<std::process::Child>,
}

impl Connection {
    fn from_raw_fd_pair(
        read_fd: RawFd,
        write_fd: RawFd,
        child: Option<std::process::Child>,
    ) -> RspResult<Connection> {
        // SAFETY: both fds are freshly dup'd/owned descriptors handed to us
        // by the caller; each constructor below guarantees they are valid,
        // open, and not otherwise aliased.
        let reader: Box<dyn Read + Send> = unsafe { Box::new(std::fs::File::from_raw_fd(read_fd)) };
        let writer: Box<dyn Write + Send> =
            unsafe { Box::new(std::fs::File::from_raw_fd(write_fd)) };
        let mut conn = Connection {
            reader: BufReader::new(reader),
            writer: BufWriter::new(writer),
            ack_enabled: true,
            non_stop_enabled: false,
            notifications: NotificationQueue::new(),
            _child: child,
        };
        // Reset any stale line state on the peer, as the reference does
        // immediately after gdb_begin's dup().
        conn.writer.write_all(b"+")?;
        conn.writer.flush()?;
        Ok(conn)
    }

    /// Connect over TCP to `host:port`. Tries each resolved address in
    /// turn and keeps the first that connects (matches the reference's
    /// `getaddrinfo` loop; IPv6 is not special-cased, matching the
    /// reference's `AF_UNSPEC` hint and its documented lack of IPv6
    /// support).
    pub fn tcp(host: &str, port: &str) -> RspResult<Connection> {
        let addr = format!("{}:{}", host, port);
        let stream = TcpStream::connect(&addr)?;
        let read_fd = stream.as_raw_fd();
        let dup_fd = dup_fd(read_fd)?;
        // `stream`'s fd now backs the reader; leak the TcpStream wrapper
        // so its Drop doesn't close the fd out from under the reader.
        let owned_fd = stream.as_raw_fd();
        std::mem::forget(stream);
        Connection::from_raw_fd_pair(owned_fd, dup_fd, None)
    }

    /// Open `path` for read+write use as a bidirectional handle (a
    /// character device or named pipe).
    pub fn path(path: &str) -> RspResult<Connection> {
        let file = std::fs::OpenOptions::new().read(true).write(true).open(path)?;
        let fd = file.as_raw_fd();
        let dup_fd = dup_fd(fd)?;
        let owned_fd = file.as_raw_fd();
        std::mem::forget(file);
        Connection::from_raw_fd_pair(owned_fd, dup_fd, None)
    }

    /// Spawn `/bin/sh -c command` wired to a bidirectional socketpair, its
    /// stderr inherited. SIGPIPE is ignored process-wide so a dying child
    /// doesn't take the tracer down with it.
    pub fn command(shell_command: &str) -> RspResult<Connection> {
        ignore_sigpipe();

        let (ours, theirs) = UnixStream::pair()?;
        let theirs_fd = theirs.as_raw_fd();

        let mut cmd = StdCommand::new("/bin/sh");
        cmd.arg("-c")
            .arg(shell_command)
            .stdin(unsafe { Stdio::from_raw_fd(dup_fd(theirs_fd)?) })
            .stdout(unsafe { Stdio::from_raw_fd(theirs_fd) })
            .stderr(Stdio::inherit());
        std::mem::forget(theirs);
        let child = cmd.spawn()?;

        let read_fd = ours.as_raw_fd();
        let dup_fd = dup_fd(read_fd)?;
        let owned_fd = ours.as_raw_fd();
        std::mem::forget(ours);
        Connection::from_raw_fd_pair(owned_fd, dup_fd, Some(child))
    }
}

fn dup_fd(fd: RawFd) -> RspResult<RawFd> {
    nix::unistd::dup(fd).map_err(|err| {
        let io_err = err
            .as_errno()
            .map(|e| std::io::Error::from_raw_os_error(e as i32))
            .unwrap_or_else(|| std::io::Error::new(std::io::ErrorKind::Other, err));
        RspError::Transport(io_err)
    })
}

fn ignore_sigpipe() {
    use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
    let action = SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::empty());
    // SAFETY: installing SIG_IGN for SIGPIPE has no memory-safety
    // implications; this only changes process-wide signal disposition.
    unsafe {
        let _ = sigaction(Signal::SIGPIPE, &action);
    }
}
