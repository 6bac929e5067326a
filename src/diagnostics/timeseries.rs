//! diagnostics/timeseries.rs
//! Time-series Sink collaborator contract (SPEC_FULL §6): optional,
//! out-of-scope persistence for FSM state transitions, raw barriers, and
//! fuser statistics. The core ships a no-op sink (default) and a
//! CSV-backed sink for local development, grounded on the teacher's
//! `utils/export.rs` consolidated-CSV-append pattern. Neither is wired by
//! default in production — this is explicitly out-of-scope persistence.

use std::fs::OpenOptions;
use std::io::Write;

use log::error;
use parking_lot::Mutex;

use crate::data::Location;

#[derive(Debug, Clone, Copy, Default)]
pub struct FuserStats {
    pub fused_events: u64,
    pub orphaned_barriers: u64,
    pub ghost_nfc: u64,
    pub total_barriers: u64,
    pub total_nfc: u64,
}

pub trait TimeseriesSink: Send + Sync {
    fn write_state(&self, entity_id: &str, state_name: &str, state_ordinal: u32, part_id: Option<&str>);
    fn write_barrier(&self, barrier_id: &str, location: &Location);
    fn write_fuser_stats(&self, stats: &FuserStats);
}

pub struct NoopTimeseriesSink;

impl TimeseriesSink for NoopTimeseriesSink {
    fn write_state(&self, _entity_id: &str, _state_name: &str, _state_ordinal: u32, _part_id: Option<&str>) {}
    fn write_barrier(&self, _barrier_id: &str, _location: &Location) {}
    fn write_fuser_stats(&self, _stats: &FuserStats) {}
}

/// Append-only CSV sink, one file per record kind, guarded by a plain
/// mutex (write volume here is orders of magnitude below the activity
/// logger's, so a lock-free queue isn't warranted).
pub struct CsvTimeseriesSink {
    states: Mutex<std::fs::File>,
    barriers: Mutex<std::fs::File>,
}

impl CsvTimeseriesSink {
    pub fn open(states_path: &str, barriers_path: &str) -> std::io::Result<Self> {
        let states = OpenOptions::new().create(true).append(true).open(states_path)?;
        let barriers = OpenOptions::new().create(true).append(true).open(barriers_path)?;
        Ok(CsvTimeseriesSink { states: Mutex::new(states), barriers: Mutex::new(barriers) })
    }
}

impl TimeseriesSink for CsvTimeseriesSink {
    fn write_state(&self, entity_id: &str, state_name: &str, state_ordinal: u32, part_id: Option<&str>) {
        let mut f = self.states.lock();
        if let Err(e) = writeln!(
            f,
            "{entity_id},{state_name},{state_ordinal},{}",
            part_id.unwrap_or("")
        ) {
            error!("failed to append state row: {e}");
        }
    }

    fn write_barrier(&self, barrier_id: &str, location: &Location) {
        let mut f = self.barriers.lock();
        if let Err(e) = writeln!(f, "{barrier_id},{:?},{}", location.kind, location.index) {
            error!("failed to append barrier row: {e}");
        }
    }

    fn write_fuser_stats(&self, stats: &FuserStats) {
        log::debug!(
            "fuser stats: fused={} orphaned={} ghost={} total_barriers={} total_nfc={}",
            stats.fused_events,
            stats.orphaned_barriers,
            stats.ghost_nfc,
            stats.total_barriers,
            stats.total_nfc
        );
    }
}
