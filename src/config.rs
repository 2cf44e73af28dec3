//! Process-wide configuration: the transport endpoint syntax and the
//! quiet/verbose gating for negotiation warnings, kept separate from CLI
//! parsing the same way `rd` splits `flags.rs` (process-wide) from
//! `commands/` (CLI parsing, which stays out of this crate's core).

use crate::ids::Personality;
use crate::log::LogLevel;
use std::str::FromStr;
use structopt::StructOpt;

/// A transport endpoint, parsed from the `|<shell-command>` /
/// `<host>:<service>` / `<path>` syntax.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Endpoint {
    Command(String),
    Tcp { host: String, service: String },
    Path(String),
}

impl FromStr for Endpoint {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Endpoint, Self::Err> {
        if let Some(command) = s.strip_prefix('|') {
            return Ok(Endpoint::Command(command.to_string()));
        }
        // A bare path never contains ':' (host:service always does), so
        // a colon is enough to disambiguate without touching the
        // filesystem.
        if let Some(colon) = s.rfind(':') {
            let (host, service) = s.split_at(colon);
            return Ok(Endpoint::Tcp {
                host: host.to_string(),
                service: service[1..].to_string(),
            });
        }
        Ok(Endpoint::Path(s.to_string()))
    }
}

/// The `structopt`-derived command line, for an eventual binary. The core
/// itself never parses argv; it only ever consumes the `Config` this
/// produces.
#[derive(Clone, Debug, StructOpt)]
#[structopt(name = "rsp-trace", about = "Trace syscalls over the GDB remote protocol")]
pub struct Args {
    /// Transport endpoint: `|<shell-command>`, `<host>:<service>`, or a
    /// bare path.
    #[structopt(name = "endpoint")]
    pub endpoint: Endpoint,

    /// Suppress negotiation-soft-fail warnings.
    #[structopt(short = "q", long = "quiet")]
    pub quiet: bool,

    /// Raise the log level to `LogDebug`.
    #[structopt(short = "v", long = "verbose")]
    pub verbose: bool,

    /// Personality index to assume the target runs under; repeatable.
    /// Defaults to just personality 0 when empty.
    #[structopt(short = "p", long = "personality")]
    pub personalities: Vec<usize>,
}

/// Bundles the transport endpoint, the personalities to build a
/// `SignalMap` for, and the quiet/verbose flags.
#[derive(Clone, Debug)]
pub struct Config {
    pub endpoint: Endpoint,
    pub personalities: Vec<Personality>,
    pub quiet: bool,
    pub verbose: bool,
}

impl Config {
    pub fn from_args(args: Args) -> Config {
        let personalities = if args.personalities.is_empty() {
            vec![Personality(0)]
        } else {
            args.personalities.into_iter().map(Personality).collect()
        };
        Config {
            endpoint: args.endpoint,
            personalities,
            quiet: args.quiet,
            verbose: args.verbose,
        }
    }

    /// The log level this configuration implies: `verbose` wins over
    /// `quiet` if somehow both are set, matching the reference's
    /// `debug_flag` taking precedence over `qflag`.
    pub fn log_level(&self) -> LogLevel {
        if self.verbose {
            LogLevel::LogDebug
        } else if self.quiet {
            LogLevel::LogError
        } else {
            LogLevel::LogWarn
        }
    }

    /// Install this configuration's implied log level as the process-wide
    /// maximum (see `log::set_max_level`).
    pub fn apply_log_level(&self) {
        crate::log::set_max_level(self.log_level());
    }
}
