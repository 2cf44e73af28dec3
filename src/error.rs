//! Crate-wide error type.
//!
//! Mirrors the error taxonomy of the reference implementation, which used
//! `err(1, ...)`/`errx(1, ...)` to abort on transport and protocol failures.
//! The core here never aborts the process itself -- callers decide what a
//! fatal error means for them (see DESIGN.md, "Exit codes").

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RspError {
    /// Socket/open/dup/spawn failure, or an I/O error mid-stream.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// Empty reply, unknown stop kind, unhonored vRun/vAttach, unknown
    /// notification -- anything that indicates the peer violated the
    /// protocol as this crate understands it. `raw` is the offending
    /// packet, length-bounded for display.
    #[error("protocol error: {message} (raw: {raw:?})")]
    Protocol { message: String, raw: Vec<u8> },

    /// An `E<hh>` reply was received where a command expected success.
    #[error("command failed with error code {code:#04x}")]
    CommandError { code: u8 },

    /// A packet's trailing checksum didn't match its payload.
    #[error("checksum mismatch")]
    ChecksumMismatch,

    /// A negotiation step (noack, multiprocess, vCont?, QCatchSyscalls, ...)
    /// was not honored by the peer. Non-fatal by design: callers log a
    /// warning (see `log.rs`) and continue with degraded behavior.
    #[error("negotiation step '{0}' was not honored")]
    NegotiationSoftFail(&'static str),
}

impl RspError {
    pub fn protocol(message: impl Into<String>, raw: &[u8]) -> RspError {
        const MAX_RAW: usize = 200;
        let raw = if raw.len() > MAX_RAW {
            raw[..MAX_RAW].to_vec()
        } else {
            raw.to_vec()
        };
        RspError::Protocol {
            message: message.into(),
            raw,
        }
    }
}

pub type RspResult<T> = Result<T, RspError>;
