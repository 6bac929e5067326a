//! coordination/fuser.rs
//! Complex-event-processing fuser: the single serial execution context
//! where all FSM mutation happens. Drains barrier/NFC events from the
//! producers, fuses entry barriers with NFC reads inside a sliding time
//! window, expires orphans and ghosts, and dispatches both fused events
//! and reified timer ticks to the owning station/corner FSM. No other
//! thread ever calls into an FSM directly.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crossbeam::channel::Receiver;
use log::error;

use crate::coordination::context::FsmContext;
use crate::coordination::corner_fsm::CornerFsm;
use crate::coordination::station_fsm::StationFsm;
use crate::data::{BarrierEvent, FsmKey, FusedEvent, LocationKind, NfcEvent, TimerFired};
use crate::diagnostics::timeseries::FuserStats;

/// Owns both FSM families behind a single lookup, keyed the same way the
/// fuser addresses dispatch targets.
pub struct FsmRegistry {
    stations: HashMap<u8, StationFsm>,
    corners: HashMap<u8, CornerFsm>,
}

impl FsmRegistry {
    pub fn new() -> Self {
        FsmRegistry { stations: HashMap::new(), corners: HashMap::new() }
    }

    pub fn insert_station(&mut self, fsm: StationFsm) {
        self.stations.insert(fsm.station_index, fsm);
    }

    pub fn insert_corner(&mut self, fsm: CornerFsm) {
        self.corners.insert(fsm.corner_index, fsm);
    }

    pub fn start_all(&self, ctx: &FsmContext) {
        for corner in self.corners.values() {
            corner.start(ctx);
        }
    }

    pub fn stop_all(&mut self, ctx: &FsmContext) {
        for corner in self.corners.values_mut() {
            corner.stop(ctx);
        }
    }

    fn dispatch(&mut self, key: FsmKey, event: &FusedEvent, ctx: &FsmContext) {
        match key {
            FsmKey::Station(idx) => match self.stations.get_mut(&idx) {
                Some(fsm) => fsm.handle(event, ctx),
                None => error!("no station FSM registered for index {idx}"),
            },
            FsmKey::Corner(idx) => match self.corners.get_mut(&idx) {
                Some(fsm) => fsm.handle(event, ctx),
                None => error!("no corner FSM registered for index {idx}"),
            },
        }
    }

    fn dispatch_timer(&mut self, fired: TimerFired, ctx: &FsmContext) {
        match fired.target {
            FsmKey::Station(idx) => match self.stations.get_mut(&idx) {
                Some(fsm) => fsm.handle_timer(fired.kind, ctx),
                None => error!("timer fired for unregistered station {idx}"),
            },
            FsmKey::Corner(idx) => match self.corners.get_mut(&idx) {
                Some(fsm) => fsm.handle_timer(fired.kind, ctx),
                None => error!("timer fired for unregistered corner {idx}"),
            },
        }
    }
}

impl Default for FsmRegistry {
    fn default() -> Self {
        Self::new()
    }
}

struct PendingNfc {
    event: NfcEvent,
    received_at: Instant,
}

/// Drives one pass of fuse-and-dispatch. Owns the pending-event buffers;
/// holding no shared state means the registry and buffers only ever move
/// within this loop's thread.
pub struct CepFuser {
    fusion_window: Duration,
    expiry_timeout: Duration,
    pending_barriers: Vec<BarrierEvent>,
    pending_nfc: Vec<PendingNfc>,
    stats: FuserStats,
}

impl CepFuser {
    pub fn new(fusion_window: Duration, expiry_timeout: Duration) -> Self {
        CepFuser {
            fusion_window,
            expiry_timeout,
            pending_barriers: Vec::new(),
            pending_nfc: Vec::new(),
            stats: FuserStats::default(),
        }
    }

    pub fn stats(&self) -> FuserStats {
        self.stats
    }

    /// Runs until `running` is cleared or every source has disconnected,
    /// polling on a short interval so expiry still runs when no new events
    /// arrive. `barrier_rxs` takes one receiver per physical source (GPIO
    /// interrupt feed, MCP poll feed) the way the original consumer drains
    /// two distinct queues into one pending list each tick.
    pub fn run(
        &mut self,
        running: &AtomicBool,
        barrier_rxs: &[Receiver<BarrierEvent>],
        nfc_rx: &Receiver<NfcEvent>,
        timer_rx: &Receiver<TimerFired>,
        registry: &mut FsmRegistry,
        ctx: &FsmContext,
    ) {
        while running.load(Ordering::Acquire) {
            let mut any_barrier_source_alive = barrier_rxs.is_empty();
            let mut nfc_alive = true;
            let mut timers_alive = true;

            for barrier_rx in barrier_rxs {
                loop {
                    match barrier_rx.try_recv() {
                        Ok(event) => {
                            self.stats.total_barriers += 1;
                            self.pending_barriers.push(event);
                            any_barrier_source_alive = true;
                        }
                        Err(crossbeam::channel::TryRecvError::Empty) => {
                            any_barrier_source_alive = true;
                            break;
                        }
                        Err(crossbeam::channel::TryRecvError::Disconnected) => break,
                    }
                }
            }

            loop {
                match nfc_rx.try_recv() {
                    Ok(event) => {
                        self.stats.total_nfc += 1;
                        self.pending_nfc.push(PendingNfc { event, received_at: Instant::now() });
                    }
                    Err(crossbeam::channel::TryRecvError::Empty) => break,
                    Err(crossbeam::channel::TryRecvError::Disconnected) => {
                        nfc_alive = false;
                        break;
                    }
                }
            }

            loop {
                match timer_rx.try_recv() {
                    Ok(fired) => registry.dispatch_timer(fired, ctx),
                    Err(crossbeam::channel::TryRecvError::Empty) => break,
                    Err(crossbeam::channel::TryRecvError::Disconnected) => {
                        timers_alive = false;
                        break;
                    }
                }
            }

            self.fuse_and_dispatch(registry, ctx);
            self.expire(ctx);
            ctx.timeseries.write_fuser_stats(&self.stats);

            if !any_barrier_source_alive && !nfc_alive && !timers_alive {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    fn fuse_and_dispatch(&mut self, registry: &mut FsmRegistry, ctx: &FsmContext) {
        let mut remaining = Vec::new();
        for barrier in self.pending_barriers.drain(..) {
            let Some(key) = FsmKey::for_barrier(&barrier.barrier_id, &barrier.location) else {
                continue;
            };

            if !barrier.barrier_id.is_entry() {
                let fused = FusedEvent {
                    timestamp: barrier.timestamp,
                    barrier_id: barrier.barrier_id,
                    location: barrier.location,
                    part_id: None,
                };
                registry.dispatch(key, &fused, ctx);
                continue;
            }

            if barrier.location.kind != LocationKind::Station {
                remaining.push(barrier);
                continue;
            }

            let match_index = self.pending_nfc.iter().position(|pending| {
                pending.event.station_index == barrier.location.index
                    && duration_between(pending.event.timestamp, barrier.timestamp) <= self.fusion_window
            });

            match match_index {
                Some(idx) => {
                    let matched = self.pending_nfc.remove(idx);
                    self.stats.fused_events += 1;
                    let fused = FusedEvent {
                        timestamp: barrier.timestamp,
                        barrier_id: barrier.barrier_id,
                        location: barrier.location,
                        part_id: Some(matched.event.tag_id),
                    };
                    registry.dispatch(key, &fused, ctx);
                }
                None => remaining.push(barrier),
            }
        }
        self.pending_barriers = remaining;
    }

    fn expire(&mut self, ctx: &FsmContext) {
        let now = Instant::now();

        let mut still_pending = Vec::new();
        for barrier in self.pending_barriers.drain(..) {
            if now.saturating_duration_since(barrier.timestamp) >= self.expiry_timeout {
                self.stats.orphaned_barriers += 1;
                ctx.activity_log.log_activity(
                    "UNKNOWN",
                    &format!("{:?}{}", barrier.location.kind, barrier.location.index),
                    &format!("ERROR_ORPHAN_{}", barrier.barrier_id.name()),
                    None,
                );
            } else {
                still_pending.push(barrier);
            }
        }
        self.pending_barriers = still_pending;

        let mut still_pending_nfc = Vec::new();
        for pending in self.pending_nfc.drain(..) {
            if now.saturating_duration_since(pending.received_at) >= self.expiry_timeout {
                self.stats.ghost_nfc += 1;
                ctx.activity_log.log_activity(
                    &pending.event.tag_id.0,
                    &format!("S{}", pending.event.station_index),
                    "ERROR_GHOST_NFC",
                    None,
                );
            } else {
                still_pending_nfc.push(pending);
            }
        }
        self.pending_nfc = still_pending_nfc;
    }
}

fn duration_between(a: Instant, b: Instant) -> Duration {
    if a >= b { a - b } else { b - a }
}
