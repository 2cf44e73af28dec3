//! `rsp-trace`: a remote process-tracing adapter. Re-implements a local
//! ptrace-style syscall tracer's control flow (attach/trace/detach, stop
//! dispatch, signal delivery) on top of the GDB Remote Serial Protocol,
//! so a caller can trace a process over a wire instead of directly
//! `ptrace`-ing it.
//!
//! The three subsystems map onto this crate's modules:
//! transport framing (`codec`, `transport`, `packet`, `notify`), session
//! and capability negotiation (`session`, `signals`, `ids`), and the
//! tracee control loop (`stop`, `control`, `target_io`). `collab` defines
//! the trait contracts a caller supplies (thread table, syscall decoder,
//! output routing, signal-name oracle); this crate never assumes a
//! concrete implementation of any of them. `config` and `error` round out
//! the ambient stack; `log` is this crate's own leveled logging, kept
//! free of an external logging crate the way the teacher does it.

pub mod codec;
pub mod collab;
pub mod config;
pub mod control;
pub mod error;
pub mod ids;
pub mod log;
pub mod notify;
pub mod packet;
pub mod session;
pub mod signals;
pub mod stop;
pub mod target_io;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use control::Tracer;
pub use error::{RspError, RspResult};
pub use ids::{Personality, ThreadId};
pub use session::Session;
pub use transport::Connection;
