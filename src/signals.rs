//! Signal map: per-personality table mapping RSP signal numerals onto
//! host signal numbers.
//!
//! Grounded in `gdb_map_signal`/`gdb_signal_map_init` in
//! `gdbserver/gdbserver.c`. The RSP signal numbering (`GDB_SIGNAL_*`) is
//! GDB's own public `include/gdb/signals.def` enumeration, not anything
//! internal to this crate or to strace.

use crate::ids::Personality;

pub const GDB_SIGNAL_0: u32 = 0;
pub const GDB_SIGNAL_TRAP: u32 = 5;
pub const GDB_SIGNAL_REALTIME_32: u32 = 77;
pub const GDB_SIGNAL_REALTIME_33: u32 = 78;
pub const GDB_SIGNAL_REALTIME_63: u32 = 108;
pub const GDB_SIGNAL_REALTIME_64: u32 = 109;
pub const GDB_SIGNAL_REALTIME_127: u32 = 172;
pub const GDB_SIGNAL_LAST: u32 = 173;

const NO_MAPPING: i32 = -1;

/// External oracle for host signal names/count and the tracer's current
/// personality.
pub trait SignalOracle {
    fn signame(&self, host_signal: u32) -> Option<&str>;
    fn nsignals(&self) -> u32;
    fn set_personality(&mut self, personality: Personality);
    fn current_personality(&self) -> Personality;
    /// RSP's own name table for signal index `g`, independent of the
    /// host (e.g. GDB's "SIGHUP", "SIGINT", ...). Needed to compare
    /// against `signame` when no special-case rule applies.
    fn gdb_signame(&self, gdb_signal: u32) -> Option<&str>;
}

/// Restores the oracle's original personality on every exit path,
/// including early return via `?`.
struct PersonalityGuard<'a> {
    oracle: &'a mut dyn SignalOracle,
    original: Personality,
}

impl<'a> PersonalityGuard<'a> {
    fn new(oracle: &'a mut dyn SignalOracle) -> PersonalityGuard<'a> {
        let original = oracle.current_personality();
        PersonalityGuard { oracle, original }
    }
}

impl<'a> Drop for PersonalityGuard<'a> {
    fn drop(&mut self) {
        if self.oracle.current_personality() != self.original {
            self.oracle.set_personality(self.original);
        }
    }
}

fn map_one_signal(oracle: &dyn SignalOracle, gdb_sig: u32) -> i32 {
    if gdb_sig == GDB_SIGNAL_0 {
        return 0;
    }
    if gdb_sig == GDB_SIGNAL_REALTIME_32 {
        return 32;
    }
    if (GDB_SIGNAL_REALTIME_33..=GDB_SIGNAL_REALTIME_63).contains(&gdb_sig) {
        return (gdb_sig - GDB_SIGNAL_REALTIME_33 + 33) as i32;
    }
    if (GDB_SIGNAL_REALTIME_64..=GDB_SIGNAL_REALTIME_127).contains(&gdb_sig) {
        return (gdb_sig - GDB_SIGNAL_REALTIME_64 + 64) as i32;
    }

    let gdb_name = match oracle.gdb_signame(gdb_sig) {
        Some(n) => n,
        None => return NO_MAPPING,
    };

    if gdb_sig < oracle.nsignals() {
        if let Some(host_name) = oracle.signame(gdb_sig) {
            if host_name == gdb_name {
                return gdb_sig as i32;
            }
        }
    }

    for host_sig in 1..oracle.nsignals() {
        if host_sig == gdb_sig {
            continue;
        }
        if let Some(host_name) = oracle.signame(host_sig) {
            if host_name == gdb_name {
                return host_sig as i32;
            }
        }
    }

    NO_MAPPING
}

/// One table per supported personality, each of size `GDB_SIGNAL_LAST`.
pub struct SignalMap {
    tables: Vec<Vec<i32>>,
}

impl SignalMap {
    /// Build the map for every personality in `personalities`, switching
    /// the oracle's current personality as needed and restoring it
    /// afterward (even on an early return, via `PersonalityGuard`'s
    /// `Drop`).
    pub fn build(oracle: &mut dyn SignalOracle, personalities: &[Personality]) -> SignalMap {
        let guard = PersonalityGuard::new(oracle);
        let mut tables = Vec::with_capacity(personalities.len());
        for &pers in personalities {
            if guard.oracle.current_personality() != pers {
                guard.oracle.set_personality(pers);
            }
            let mut table = Vec::with_capacity(GDB_SIGNAL_LAST as usize);
            for gdb_sig in 0..GDB_SIGNAL_LAST {
                table.push(map_one_signal(&*guard.oracle, gdb_sig));
            }
            tables.push(table);
        }
        drop(guard);
        SignalMap { tables }
    }

    /// Map an RSP signal numeral to a host signal number for the given
    /// personality index. Returns `None` ("no mapping") when the
    /// personality is unsupported, the signal index is out of range, or
    /// no corresponding host signal was found.
    pub fn rsp_to_host(&self, personality: Personality, gdb_sig: u32) -> Option<i32> {
        let table = self.tables.get(personality.0)?;
        let mapped = *table.get(gdb_sig as usize)?;
        if mapped == NO_MAPPING {
            None
        } else {
            Some(mapped)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashMap;

    struct FakeOracle {
        personality: Personality,
        names: HashMap<u32, &'static str>,
        nsignals: u32,
    }

    impl SignalOracle for FakeOracle {
        fn signame(&self, host_signal: u32) -> Option<&str> {
            self.names.get(&host_signal).copied()
        }
        fn nsignals(&self) -> u32 {
            self.nsignals
        }
        fn set_personality(&mut self, personality: Personality) {
            self.personality = personality;
        }
        fn current_personality(&self) -> Personality {
            self.personality
        }
        fn gdb_signame(&self, gdb_signal: u32) -> Option<&str> {
            self.names.get(&gdb_signal).copied()
        }
    }

    fn fake_oracle() -> FakeOracle {
        let mut names = HashMap::new();
        names.insert(1, "SIGHUP");
        names.insert(2, "SIGINT");
        names.insert(5, "SIGTRAP");
        FakeOracle {
            personality: Personality(0),
            names,
            nsignals: 32,
        }
    }

    #[test]
    fn zero_maps_to_zero() {
        let mut oracle = fake_oracle();
        let map = SignalMap::build(&mut oracle, &[Personality(0)]);
        assert_eq!(map.rsp_to_host(Personality(0), GDB_SIGNAL_0), Some(0));
    }

    #[test]
    fn realtime_range_is_linear() {
        let mut oracle = fake_oracle();
        let map = SignalMap::build(&mut oracle, &[Personality(0)]);
        for g in GDB_SIGNAL_REALTIME_33..=GDB_SIGNAL_REALTIME_63 {
            assert_eq!(
                map.rsp_to_host(Personality(0), g),
                Some((g - GDB_SIGNAL_REALTIME_33 + 33) as i32)
            );
        }
    }

    #[test]
    fn identity_match_by_name() {
        let mut oracle = fake_oracle();
        let map = SignalMap::build(&mut oracle, &[Personality(0)]);
        assert_eq!(map.rsp_to_host(Personality(0), 1), Some(1));
    }

    #[test]
    fn unmapped_signal_is_none() {
        let mut oracle = fake_oracle();
        let map = SignalMap::build(&mut oracle, &[Personality(0)]);
        assert_eq!(map.rsp_to_host(Personality(0), 50), None);
    }

    #[test]
    fn personality_restored_after_build() {
        let mut oracle = fake_oracle();
        oracle.personality = Personality(0);
        let _ = SignalMap::build(&mut oracle, &[Personality(0), Personality(1)]);
        assert_eq!(oracle.current_personality(), Personality(0));
    }
}
