//! The tracer control loop: startup, thread enumeration, and the
//! step-by-step stop/continue dispatch that drives a remote stub the way
//! `strace` drives `ptrace`.
//!
//! Grounded in `gdb_launch`/`gdb_attach`/`gdb_init_resume`/`trace_syscall`'s
//! caller loop in `gdbserver/gdbserver.c`. Where the reference reaches into
//! process-wide tables (`tcbtab`, the global `Tcb` pointer), this version
//! threads `&mut dyn ThreadTable` / `&mut dyn Decoder` / `&dyn OutputRouter`
//! explicitly instead.

use crate::codec;
use crate::collab::{Decoder, OutputRouter, ThreadFlags, ThreadTable};
use crate::error::{RspError, RspResult};
use crate::ids::ThreadId;
use crate::packet;
use crate::session::Session;
use crate::signals::SignalMap;
use crate::stop::{self, StopKind, StopReply};
use crate::target_io;
use crate::transport::Connection;

/// Raw Linux `siginfo_t` size on the personalities this crate targets.
/// Used only to decide whether a `qXfer:siginfo:read::` reply is usable
/// (the "matches the expected siginfo size" check) -- the reference's own
/// `siginfo_fixup`/compat conversion remains a TODO there, so siginfo
/// bytes are passed through raw here too.
const EXPECTED_SIGINFO_SIZE: usize = 128;

/// Owns the negotiated connection plus the external collaborators
/// (thread table, decoder, output router) the control loop drives but
/// does not itself define.
pub struct Tracer<'a> {
    pub conn: Connection,
    pub session: Session,
    pub signals: SignalMap,
    threads: &'a mut dyn ThreadTable,
    decoder: &'a mut dyn Decoder,
    output: &'a mut dyn OutputRouter,
    /// Which thread record last received a stop, reused when a
    /// non-multiprocess stop doesn't carry its own `thread:` field.
    current_tracee: Option<ThreadId>,
}

impl<'a> Tracer<'a> {
    pub fn new(
        conn: Connection,
        session: Session,
        signals: SignalMap,
        threads: &'a mut dyn ThreadTable,
        decoder: &'a mut dyn Decoder,
        output: &'a mut dyn OutputRouter,
    ) -> Tracer<'a> {
        Tracer {
            conn,
            session,
            signals,
            threads,
            decoder,
            output,
            current_tracee: None,
        }
    }

    /// `vRun;hex(argv[0]);hex(argv[1]);...` and the startup trap every
    /// stub delivers once the fresh inferior is loaded. Allocates the
    /// first thread record as `ATTACHED|STARTUP` and keeps the decoder's
    /// log hidden until execve, matching the reference's "don't trace
    /// the dynamic linker's own syscalls" default.
    pub fn startup_child(&mut self, argv: &[&str]) -> RspResult<ThreadId> {
        let mut cmd = b"vRun".to_vec();
        for arg in argv {
            cmd.push(b';');
            cmd.extend_from_slice(&codec::encode_hex_string(arg.as_bytes()));
        }
        packet::send(&mut self.conn, &cmd)?;
        let reply = packet::recv(&mut self.conn, true)?;
        let stop = stop::parse(&reply);
        if stop.kind != StopKind::Trap {
            return Err(RspError::protocol("vRun did not report a startup trap", &reply));
        }
        let tid = stop.thread_id().unwrap_or_else(|| ThreadId::solo(1));

        self.threads
            .allocate(tid, ThreadFlags::ATTACHED | ThreadFlags::STARTUP);
        self.output.hide_log_until_execve(true);
        self.current_tracee = Some(tid);

        packet::send(&mut self.conn, b"QCatchSyscalls:1")?;
        let _ = packet::recv(&mut self.conn, false)?;

        Ok(tid)
    }

    /// Attach to a running `pid`, preferring non-stop mode and falling
    /// back to all-stop. Run here since it's this step that needs the
    /// resulting thread allocated.
    pub fn startup_attach(&mut self, pid: u32) -> RspResult<ThreadId> {
        self.session.startup_attach(&mut self.conn, pid)?;
        let tid = ThreadId::solo(pid);
        self.threads
            .allocate(tid, ThreadFlags::ATTACHED | ThreadFlags::STARTUP);
        self.current_tracee = Some(tid);

        packet::send(&mut self.conn, b"QCatchSyscalls:1")?;
        let _ = packet::recv(&mut self.conn, false)?;

        Ok(tid)
    }

    /// Enumerate every thread the stub already knows about
    /// (`qfThreadInfo`/`qsThreadInfo` until an `l` terminator), allocate
    /// a record and arm syscall catching for each one not already
    /// tracked, then start the inferior running.
    pub fn finalize_init(&mut self) -> RspResult<()> {
        packet::send(&mut self.conn, b"qfThreadInfo")?;
        let mut reply = packet::recv(&mut self.conn, false)?;

        loop {
            if reply.first() == Some(&b'l') {
                break;
            }
            if reply.first() == Some(&b'm') {
                for part in reply[1..].split(|&b| b == b',') {
                    if let Some(tid) = ThreadId::parse(part) {
                        if self.threads.lookup(tid).is_none() {
                            self.threads.allocate(tid, ThreadFlags::ATTACHED);
                            packet::send(
                                &mut self.conn,
                                format!("Hg{}", tid.to_wire_string(self.session.multiprocess)).as_bytes(),
                            )?;
                            let _ = packet::recv(&mut self.conn, false)?;
                            packet::send(&mut self.conn, b"QCatchSyscalls:1")?;
                            let _ = packet::recv(&mut self.conn, false)?;
                        }
                    }
                }
            }
            packet::send(&mut self.conn, b"qsThreadInfo")?;
            reply = packet::recv(&mut self.conn, false)?;
        }

        let resume = if self.session.vcont_supported {
            b"vCont;c".to_vec()
        } else {
            b"c".to_vec()
        };
        packet::send(&mut self.conn, &resume)
    }

    /// Run one stop/continue cycle: wait for the next stop (draining a
    /// queued non-stop notification first), dispatch it, and send the
    /// next continuation command. Returns `false` once the traced
    /// process has gone away and there is nothing left to step.
    pub fn trace_step(&mut self) -> RspResult<bool> {
        let stop = self.next_stop()?;

        match stop.kind {
            StopKind::Unknown => {
                return Err(RspError::protocol("unparseable stop reply", &stop.raw));
            }
            StopKind::Error => return Ok(false),
            StopKind::Exited | StopKind::Terminated => {
                let tid = self.resolve_target(&stop)?;
                if stop.kind == StopKind::Exited {
                    let status = crate::collab::w_exitcode(stop.code as i32, 0);
                    self.decoder.print_exited(tid, status);
                } else {
                    let personality = self.threads.personality(tid);
                    let host_sig = self
                        .signals
                        .rsp_to_host(personality, stop.code as u32)
                        .unwrap_or(stop.code as i32);
                    self.decoder
                        .print_signalled(tid, crate::collab::w_exitcode(0, host_sig));
                }
                self.threads.drop_thread(tid);
                if self.current_tracee == Some(tid) {
                    self.current_tracee = None;
                }
                if !self.session.multiprocess || self.threads.is_empty() {
                    return Ok(false);
                }
                // Other tracked threads remain (multiprocess mode):
                // let the stub pick the next one to report.
                self.send_continue(None)?;
            }
            StopKind::Trap => {
                let tid = self.resolve_target(&stop)?;
                self.note_first_stop(tid, &stop)?;
                self.decoder.print_stopped(tid, None, 0);
                self.send_continue(None)?;
            }
            StopKind::SyscallEntry => {
                let tid = self.resolve_target(&stop)?;
                self.note_first_stop(tid, &stop)?;
                if let Some(flags) = self.threads.lookup(tid) {
                    self.threads.set_flags(tid, flags - ThreadFlags::INSYSCALL);
                }
                self.decoder.set_scno(tid, stop.code);
                self.decoder.trace_syscall(tid);
                self.send_continue(None)?;
            }
            StopKind::SyscallReturn => {
                let tid = self.resolve_target(&stop)?;
                self.note_first_stop(tid, &stop)?;
                // A return with no matching entry (missed it, or a stray
                // retransmit) would only confuse the decoder; only act
                // when it still thinks this thread is exiting a syscall.
                if self.decoder.exiting(tid) {
                    self.decoder.set_scno(tid, stop.code);
                    self.decoder.trace_syscall(tid);
                }
                self.send_continue(None)?;
            }
            StopKind::Signal => {
                let tid = self.resolve_target(&stop)?;
                self.note_first_stop(tid, &stop)?;
                let personality = self.threads.personality(tid);
                let host_sig = self.signals.rsp_to_host(personality, stop.code as u32);
                let siginfo = match target_io::qxfer_read(&mut self.conn, "siginfo", "") {
                    Ok(blob) if blob.len() == EXPECTED_SIGINFO_SIZE => Some(blob),
                    _ => None,
                };
                self.decoder
                    .print_stopped(tid, siginfo.as_deref(), host_sig.unwrap_or(0));
                self.send_continue(host_sig.map(|sig| (tid, sig)))?;
            }
        }

        Ok(true)
    }

    /// Run `trace_step` until the traced process is gone.
    pub fn trace(&mut self) -> RspResult<()> {
        while self.trace_step()? {}
        Ok(())
    }

    /// Resolve which thread record a stop belongs to. Under the
    /// multiprocess extension the stop always carries its own `thread:`
    /// field and a not-yet-seen tid is find-or-allocated (marked
    /// `ATTACHED|STARTUP`, armed with `QCatchSyscalls`); otherwise the
    /// current tracee (established by `startup_child`/`startup_attach`
    /// before the first `trace_step`) is reused as-is and a missing
    /// record for it is a fatal protocol violation.
    fn resolve_target(&mut self, stop: &StopReply) -> RspResult<ThreadId> {
        if self.session.multiprocess {
            let tid = stop
                .thread_id()
                .ok_or_else(|| RspError::protocol("multiprocess stop missing thread id", &stop.raw))?;
            if self.threads.lookup(tid).is_none() {
                self.threads
                    .allocate(tid, ThreadFlags::ATTACHED | ThreadFlags::STARTUP);
                self.output.newoutf(tid);
                packet::send(&mut self.conn, b"QCatchSyscalls:1")?;
                let _ = packet::recv(&mut self.conn, false)?;
            }
            self.current_tracee = Some(tid);
            Ok(tid)
        } else {
            let tid = stop.thread_id().or(self.current_tracee).ok_or_else(|| {
                RspError::protocol("stop reply names no thread and none is current", &stop.raw)
            })?;
            if self.threads.lookup(tid).is_none() {
                return Err(RspError::protocol("no thread record for live stop", &stop.raw));
            }
            self.current_tracee = Some(tid);
            Ok(tid)
        }
    }

    /// Fetch the stopped thread's registers, then, on the first stop
    /// seen for it, clear its `STARTUP` flag; if that first stop's
    /// syscall number is `1`, let the thread table snapshot whatever it
    /// needs from the reference's `s_prev_ent = s_ent` quirk (preserved
    /// rather than silently dropped).
    fn note_first_stop(&mut self, tid: ThreadId, stop: &StopReply) -> RspResult<()> {
        let _ = target_io::get_regs(&mut self.conn, tid);
        if let Some(flags) = self.threads.lookup(tid) {
            if flags.contains(ThreadFlags::STARTUP) {
                self.threads.set_flags(tid, flags - ThreadFlags::STARTUP);
                if stop.code == 1 {
                    self.threads.note_first_syscall_one(tid);
                }
            }
        }
        Ok(())
    }

    fn next_stop(&mut self) -> RspResult<StopReply> {
        if self.session.non_stop {
            if let Some(stop) = self.session.drain_non_stop(&mut self.conn)? {
                return Ok(stop);
            }
            // Nothing queued: block for the next one directly.
        } else if let Some((payload, _len)) = self.conn.notifications.pop() {
            // All-stop mode can still park a stray T05syscall notification
            // via packet::recv's redirection rule; drain it before blocking.
            return Ok(stop::parse(&payload));
        }
        let reply = packet::recv(&mut self.conn, true)?;
        Ok(stop::parse(&reply))
    }

    /// Emit the continuation command for the current mode: `vCont`
    /// variants when the stub advertised support, plain `c`/`C<hh>`
    /// otherwise, injecting a signal for the given thread when one is
    /// supplied.
    fn send_continue(&mut self, inject: Option<(ThreadId, i32)>) -> RspResult<()> {
        let multiprocess = self.session.multiprocess;
        let cmd = match (self.session.vcont_supported, inject) {
            (true, Some((tid, sig))) => format!(
                "vCont;C{:02x}:{};c",
                sig as u8,
                tid.to_wire_string(multiprocess)
            ),
            (true, None) => "vCont;c".to_string(),
            (false, Some((_, sig))) => format!("C{:02x}", sig as u8),
            (false, None) => "c".to_string(),
        };
        packet::send(&mut self.conn, cmd.as_bytes())
    }

    /// Detach: `D;<pid>` under multiprocess, bare `D` otherwise. A
    /// rejected detach is followed by a `T;<pid>` liveness probe -- `OK`
    /// means the thread is still alive and detach genuinely failed (a
    /// warning, not a hard error); anything else means the tracee was
    /// already gone and the rejection is accepted silently, which is
    /// what keeps a second `detach()` idempotent.
    pub fn detach(&mut self, pid: u32) -> RspResult<()> {
        let cmd = if self.session.multiprocess {
            format!("D;{:x}", pid)
        } else {
            "D".to_string()
        };
        packet::send(&mut self.conn, cmd.as_bytes())?;
        let reply = packet::recv(&mut self.conn, false)?;
        if reply == b"OK" {
            return Ok(());
        }

        packet::send(&mut self.conn, format!("T;{:x}", pid).as_bytes())?;
        let probe = packet::recv(&mut self.conn, false)?;
        if probe == b"OK" {
            crate::log!(
                crate::log::LogLevel::LogWarn,
                "detach of {:x} rejected but thread is still alive",
                pid
            );
        }
        Ok(())
    }
}
