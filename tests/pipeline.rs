//! End-to-end tests driving the fuser/FSM stack the way a real barrier
//! and NFC stream would, exercising the scenarios the pipeline is
//! expected to satisfy: a clean station cycle, a ghost NFC read, an
//! orphaned entry barrier, and a handshake jam.

use std::sync::atomic::AtomicBool;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crossbeam::channel::unbounded;

use manu_conveyor::coordination::arbiter::CollisionArbiter;
use manu_conveyor::coordination::context::FsmContext;
use manu_conveyor::coordination::corner_fsm::{CornerFsm, CornerPhase};
use manu_conveyor::coordination::fuser::{CepFuser, FsmRegistry};
use manu_conveyor::coordination::station_fsm::StationFsm;
use manu_conveyor::data::{BarrierEvent, BarrierId, EdgeSource, Location, NfcEvent, TagId};
use manu_conveyor::diagnostics::activity_log::{ActivityLogger, ActivityTag};
use manu_conveyor::diagnostics::timeseries::NoopTimeseriesSink;
use manu_conveyor::motors::MotorFacade;

struct RecordingActivityLogger {
    records: Mutex<Vec<(String, String, String)>>,
}

impl RecordingActivityLogger {
    fn new() -> Self {
        RecordingActivityLogger { records: Mutex::new(Vec::new()) }
    }

    fn activities_for(&self, part_id: &str) -> Vec<String> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _, _)| p == part_id)
            .map(|(_, _, a)| a.clone())
            .collect()
    }

    fn contains(&self, activity: &str) -> bool {
        self.records.lock().unwrap().iter().any(|(_, _, a)| a == activity)
    }
}

impl ActivityLogger for RecordingActivityLogger {
    fn log_activity(&self, part_id: &str, station_id: &str, activity: &str, _tag: Option<ActivityTag>) {
        self.records.lock().unwrap().push((part_id.to_string(), station_id.to_string(), activity.to_string()));
    }
}

fn barrier(barrier_id: BarrierId, location: Location, timestamp: Instant, source: EdgeSource) -> BarrierEvent {
    BarrierEvent { timestamp, barrier_id, location, source }
}

#[test]
fn clean_station_cycle_logs_enter_process_exit_in_order() {
    let motors = MotorFacade::simulated();
    let arbiter = CollisionArbiter::new();
    let log = RecordingActivityLogger::new();
    let ts = NoopTimeseriesSink;
    let (timer_tx, timer_rx) = unbounded();
    let (barrier_tx, barrier_rx) = unbounded();
    let (nfc_tx, nfc_rx) = unbounded();
    let ctx = FsmContext::new(&motors, &arbiter, &log, &ts, &timer_tx);

    let mut registry = FsmRegistry::new();
    registry.insert_station(StationFsm::new(1, 0.4, Duration::from_millis(20)));

    let t0 = Instant::now();
    nfc_tx.send(NfcEvent { timestamp: t0, station_index: 1, tag_id: TagId("AB".into()), reader_index: 0 }).unwrap();
    barrier_tx.send(barrier(BarrierId::S1Entry, Location::station(1), t0, EdgeSource::Interrupt)).unwrap();

    let mut fuser = CepFuser::new(Duration::from_secs(2), Duration::from_secs(5));
    let running = AtomicBool::new(true);

    // Drive one pass to fuse entry + dispatch ENTER.
    fuser.run(&running, &[barrier_rx.clone()], &nfc_rx, &timer_rx, &mut registry, &ctx);

    barrier_tx.send(barrier(BarrierId::S1Process, Location::station(1), Instant::now(), EdgeSource::Interrupt)).unwrap();
    fuser.run(&running, &[barrier_rx.clone()], &nfc_rx, &timer_rx, &mut registry, &ctx);

    // Let the process timer actually fire.
    std::thread::sleep(Duration::from_millis(40));
    fuser.run(&running, &[barrier_rx.clone()], &nfc_rx, &timer_rx, &mut registry, &ctx);

    barrier_tx.send(barrier(BarrierId::S1Exit, Location::station(1), Instant::now(), EdgeSource::Interrupt)).unwrap();
    fuser.run(&running, &[barrier_rx.clone()], &nfc_rx, &timer_rx, &mut registry, &ctx);

    std::thread::sleep(Duration::from_millis(1100));
    fuser.run(&running, &[barrier_rx], &nfc_rx, &timer_rx, &mut registry, &ctx);

    assert_eq!(log.activities_for("AB"), vec!["ENTER", "PROCESS_START", "PROCESS_END", "EXIT"]);
}

#[test]
fn ghost_nfc_read_is_counted_and_removed() {
    let motors = MotorFacade::simulated();
    let arbiter = CollisionArbiter::new();
    let log = RecordingActivityLogger::new();
    let ts = NoopTimeseriesSink;
    let (timer_tx, timer_rx) = unbounded();
    let (_barrier_tx, barrier_rx) = unbounded();
    let (nfc_tx, nfc_rx) = unbounded();
    let ctx = FsmContext::new(&motors, &arbiter, &log, &ts, &timer_tx);

    let mut registry = FsmRegistry::new();
    registry.insert_station(StationFsm::new(1, 0.4, Duration::from_secs(5)));

    let stale = Instant::now() - Duration::from_secs(6);
    nfc_tx.send(NfcEvent { timestamp: stale, station_index: 1, tag_id: TagId("CD".into()), reader_index: 0 }).unwrap();

    let mut fuser = CepFuser::new(Duration::from_secs(2), Duration::from_secs(5));
    let running = AtomicBool::new(true);
    fuser.run(&running, &[barrier_rx], &nfc_rx, &timer_rx, &mut registry, &ctx);

    assert!(log.contains("ERROR_GHOST_NFC"));
    assert_eq!(fuser.stats().ghost_nfc, 1);
}

#[test]
fn orphaned_entry_barrier_is_counted_and_dispatched_as_error() {
    let motors = MotorFacade::simulated();
    let arbiter = CollisionArbiter::new();
    let log = RecordingActivityLogger::new();
    let ts = NoopTimeseriesSink;
    let (timer_tx, timer_rx) = unbounded();
    let (barrier_tx, barrier_rx) = unbounded();
    let (_nfc_tx, nfc_rx) = unbounded();
    let ctx = FsmContext::new(&motors, &arbiter, &log, &ts, &timer_tx);

    let mut registry = FsmRegistry::new();
    registry.insert_station(StationFsm::new(1, 0.4, Duration::from_secs(5)));

    let stale = Instant::now() - Duration::from_secs(6);
    barrier_tx.send(barrier(BarrierId::S1Entry, Location::station(1), stale, EdgeSource::Interrupt)).unwrap();

    let mut fuser = CepFuser::new(Duration::from_secs(2), Duration::from_secs(5));
    let running = AtomicBool::new(true);
    fuser.run(&running, &[barrier_rx], &nfc_rx, &timer_rx, &mut registry, &ctx);

    assert!(log.contains("ERROR_ORPHAN_S1_ENTRY"));
    assert_eq!(fuser.stats().orphaned_barriers, 1);
    assert!(!log.contains("ERROR_NO_PART_ID"));
}

#[test]
fn handshake_jam_locks_corner_and_halts_feed_motor() {
    let motors = MotorFacade::simulated();
    let arbiter = CollisionArbiter::new();
    let log = RecordingActivityLogger::new();
    let ts = NoopTimeseriesSink;
    let (timer_tx, _timer_rx) = unbounded();
    let ctx = FsmContext::new(&motors, &arbiter, &log, &ts, &timer_tx);

    let mut corner = CornerFsm::new(
        2,
        0.7,
        0.5,
        Duration::from_millis(5),
        Duration::from_millis(5),
        Duration::from_millis(5),
        Duration::from_millis(30),
        false,
    );

    let pos = manu_conveyor::data::FusedEvent {
        timestamp: Instant::now(),
        barrier_id: BarrierId::C2Pos,
        location: Location::corner(2),
        part_id: None,
    };
    corner.handle(&pos, &ctx);
    corner.handle_timer(manu_conveyor::data::TimerKind::CornerApproachDone, &ctx);
    let ext = manu_conveyor::data::FusedEvent {
        timestamp: Instant::now(),
        barrier_id: BarrierId::Corner2Ext,
        location: Location::corner(2),
        part_id: None,
    };
    corner.handle(&ext, &ctx);
    assert_eq!(corner.phase(), CornerPhase::WaitingForConfirmation);

    corner.handle_timer(manu_conveyor::data::TimerKind::CornerHandshakeTimeout, &ctx);

    assert_eq!(corner.phase(), CornerPhase::Locked);
    assert!(arbiter.is_occupied(2));
    assert_eq!(motors.last_commanded(1), 0.0); // feed motor for corner 2 halted
}
