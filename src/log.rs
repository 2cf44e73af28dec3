//! Minimal leveled logging, in the same spirit as rd's own `log!` macro:
//! no external logging crate, just a level check and a write to stderr.

use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    LogError = 0,
    LogWarn = 1,
    LogInfo = 2,
    LogDebug = 3,
}

static MAX_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::LogWarn as u8);

/// Set the maximum log level that will actually be printed. Controlled by
/// `Config::verbose`/`Config::quiet` (see `config.rs`).
pub fn set_max_level(level: LogLevel) {
    MAX_LEVEL.store(level as u8, Ordering::Relaxed);
}

pub fn enabled(level: LogLevel) -> bool {
    level as u8 <= MAX_LEVEL.load(Ordering::Relaxed)
}

#[macro_export]
macro_rules! log {
    ($level:expr, $($arg:tt)*) => {
        if $crate::log::enabled($level) {
            eprintln!("[{:?}] {}", $level, format!($($arg)*));
        }
    };
}
