//! coordination/station_fsm.rs
//! Station passive FSM: entry -> process -> exit. Driven exclusively by
//! fused events and its own reified timer ticks; never touches collision
//! state (stations don't contend for shared regions).

use std::time::{Duration, Instant};

use log::warn;

use crate::coordination::context::FsmContext;
use crate::coordination::timer::arm_timer;
use crate::data::{BarrierId, FsmKey, FusedEvent, TagId, TimerKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StationPhase {
    Idle,
    Entering,
    Processing,
    AdvancingToExit,
    Exiting,
}

impl StationPhase {
    fn ordinal(self) -> u32 {
        match self {
            StationPhase::Idle => 0,
            StationPhase::Entering => 1,
            StationPhase::Processing => 2,
            StationPhase::AdvancingToExit => 3,
            StationPhase::Exiting => 4,
        }
    }

    fn name(self) -> &'static str {
        match self {
            StationPhase::Idle => "idle",
            StationPhase::Entering => "entering",
            StationPhase::Processing => "processing",
            StationPhase::AdvancingToExit => "advancing_to_exit",
            StationPhase::Exiting => "exiting",
        }
    }
}

pub struct StationFsm {
    pub station_index: u8,
    station_id: String,
    phase: StationPhase,
    current_part: Option<TagId>,
    entry_timestamp: Option<Instant>,
    motor_num: u8,
    motor_speed: f32,
    process_time: Duration,
    entry_barrier: BarrierId,
    process_barrier: BarrierId,
    exit_barrier: BarrierId,
}

impl StationFsm {
    pub fn new(station_index: u8, motor_speed: f32, process_time: Duration) -> Self {
        let (entry_barrier, process_barrier, exit_barrier) = match station_index {
            1 => (BarrierId::S1Entry, BarrierId::S1Process, BarrierId::S1Exit),
            2 => (BarrierId::S2Entry, BarrierId::S2Process, BarrierId::S2Exit),
            other => panic!("invalid station index {other}"),
        };
        StationFsm {
            station_index,
            station_id: format!("S{station_index}"),
            phase: StationPhase::Idle,
            current_part: None,
            entry_timestamp: None,
            motor_num: 2 + station_index,
            motor_speed,
            process_time,
            entry_barrier,
            process_barrier,
            exit_barrier,
        }
    }

    pub fn phase(&self) -> StationPhase {
        self.phase
    }

    pub fn current_part(&self) -> Option<&TagId> {
        self.current_part.as_ref()
    }

    fn key(&self) -> FsmKey {
        FsmKey::Station(self.station_index)
    }

    fn transition(&mut self, ctx: &FsmContext, new_phase: StationPhase) {
        self.phase = new_phase;
        ctx.timeseries.write_state(
            &self.station_id,
            new_phase.name(),
            new_phase.ordinal(),
            self.current_part.as_ref().map(|p| p.0.as_str()),
        );
    }

    pub fn handle(&mut self, event: &FusedEvent, ctx: &FsmContext) {
        match self.phase {
            StationPhase::Idle => self.handle_idle(event, ctx),
            StationPhase::Entering => self.handle_entering(event, ctx),
            StationPhase::Processing => self.handle_processing(event),
            StationPhase::AdvancingToExit => self.handle_advancing_to_exit(event, ctx),
            StationPhase::Exiting => {}
        }
    }

    pub fn handle_timer(&mut self, kind: TimerKind, ctx: &FsmContext) {
        match (self.phase, kind) {
            (StationPhase::Processing, TimerKind::StationProcessDone) => {
                ctx.activity_log.log_activity(
                    self.current_part.as_ref().map(|p| p.0.as_str()).unwrap_or("UNKNOWN"),
                    &self.station_id,
                    "PROCESS_END",
                    Some(crate::diagnostics::activity_log::ActivityTag::Finish),
                );
                ctx.motors.set_speed(self.motor_num, self.motor_speed);
                self.transition(ctx, StationPhase::AdvancingToExit);
            }
            (StationPhase::Exiting, TimerKind::StationExitDone) => {
                ctx.motors.stop(self.motor_num);
                if let Some(part) = self.current_part.take() {
                    ctx.activity_log.log_activity(&part.0, &self.station_id, "EXIT", None);
                }
                self.entry_timestamp = None;
                self.transition(ctx, StationPhase::Idle);
            }
            _ => {}
        }
    }

    fn handle_idle(&mut self, event: &FusedEvent, ctx: &FsmContext) {
        if event.barrier_id != self.entry_barrier {
            warn!("unexpected barrier {:?} in Idle for {}", event.barrier_id, self.station_id);
            return;
        }

        let Some(part_id) = event.part_id.clone() else {
            ctx.activity_log.log_activity("UNKNOWN", &self.station_id, "ERROR_NO_PART_ID", None);
            return;
        };

        self.current_part = Some(part_id.clone());
        self.entry_timestamp = Some(event.timestamp);
        ctx.activity_log.log_activity(&part_id.0, &self.station_id, "ENTER", None);
        ctx.motors.set_speed(self.motor_num, self.motor_speed);
        self.transition(ctx, StationPhase::Entering);
    }

    fn handle_entering(&mut self, event: &FusedEvent, ctx: &FsmContext) {
        if event.barrier_id == self.entry_barrier {
            return; // jitter on the entry sensor
        }
        if event.barrier_id == self.process_barrier {
            ctx.motors.stop(self.motor_num);
            ctx.activity_log.log_activity(
                self.current_part.as_ref().map(|p| p.0.as_str()).unwrap_or("UNKNOWN"),
                &self.station_id,
                "PROCESS_START",
                Some(crate::diagnostics::activity_log::ActivityTag::Start),
            );
            self.transition(ctx, StationPhase::Processing);
            arm_timer(self.process_time, self.key(), TimerKind::StationProcessDone, ctx.timers.clone());
            return;
        }
        warn!("unexpected barrier {:?} in Entering for {}", event.barrier_id, self.station_id);
    }

    fn handle_processing(&mut self, event: &FusedEvent) {
        if event.barrier_id == self.process_barrier {
            return; // jitter on the process sensor
        }
        warn!("unexpected event {:?} during Processing", event.barrier_id);
    }

    fn handle_advancing_to_exit(&mut self, event: &FusedEvent, ctx: &FsmContext) {
        if event.barrier_id != self.exit_barrier {
            warn!("unexpected barrier {:?} in AdvancingToExit for {}", event.barrier_id, self.station_id);
            return;
        }
        ctx.motors.stop(self.motor_num);
        ctx.motors.set_speed(self.motor_num, self.motor_speed); // briefly clear the sensor
        self.transition(ctx, StationPhase::Exiting);
        arm_timer(Duration::from_secs(1), self.key(), TimerKind::StationExitDone, ctx.timers.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::arbiter::CollisionArbiter;
    use crate::data::Location;
    use crate::diagnostics::activity_log::LoggingActivityLogger;
    use crate::diagnostics::timeseries::NoopTimeseriesSink;
    use crate::motors::MotorFacade;
    use crossbeam::channel::unbounded;

    fn fused(barrier: BarrierId, part: Option<&str>) -> FusedEvent {
        FusedEvent {
            timestamp: Instant::now(),
            barrier_id: barrier,
            location: Location::station(1),
            part_id: part.map(|p| TagId(p.to_string())),
        }
    }

    #[test]
    fn entry_without_part_id_stays_idle() {
        let motors = MotorFacade::simulated();
        let arbiter = CollisionArbiter::new();
        let log = LoggingActivityLogger;
        let ts = NoopTimeseriesSink;
        let (tx, _rx) = unbounded();
        let ctx = FsmContext::new(&motors, &arbiter, &log, &ts, &tx);

        let mut fsm = StationFsm::new(1, 0.4, Duration::from_millis(5));
        fsm.handle(&fused(BarrierId::S1Entry, None), &ctx);
        assert_eq!(fsm.phase(), StationPhase::Idle);
        assert!(fsm.current_part().is_none());
    }

    #[test]
    fn entry_with_part_id_transitions_to_entering() {
        let motors = MotorFacade::simulated();
        let arbiter = CollisionArbiter::new();
        let log = LoggingActivityLogger;
        let ts = NoopTimeseriesSink;
        let (tx, _rx) = unbounded();
        let ctx = FsmContext::new(&motors, &arbiter, &log, &ts, &tx);

        let mut fsm = StationFsm::new(1, 0.4, Duration::from_millis(5));
        fsm.handle(&fused(BarrierId::S1Entry, Some("ab12")), &ctx);
        assert_eq!(fsm.phase(), StationPhase::Entering);
        assert_eq!(fsm.current_part().unwrap().0, "ab12");
        assert_eq!(motors.last_commanded(3), 0.4);
    }

    #[test]
    fn jitter_on_entry_sensor_is_ignored_while_entering() {
        let motors = MotorFacade::simulated();
        let arbiter = CollisionArbiter::new();
        let log = LoggingActivityLogger;
        let ts = NoopTimeseriesSink;
        let (tx, _rx) = unbounded();
        let ctx = FsmContext::new(&motors, &arbiter, &log, &ts, &tx);

        let mut fsm = StationFsm::new(1, 0.4, Duration::from_millis(5));
        fsm.handle(&fused(BarrierId::S1Entry, Some("ab12")), &ctx);
        fsm.handle(&fused(BarrierId::S1Entry, Some("ab12")), &ctx);
        assert_eq!(fsm.phase(), StationPhase::Entering);
    }

    #[test]
    fn process_barrier_arms_timer_and_enters_processing() {
        let motors = MotorFacade::simulated();
        let arbiter = CollisionArbiter::new();
        let log = LoggingActivityLogger;
        let ts = NoopTimeseriesSink;
        let (tx, _rx) = unbounded();
        let ctx = FsmContext::new(&motors, &arbiter, &log, &ts, &tx);

        let mut fsm = StationFsm::new(1, 0.4, Duration::from_millis(5));
        fsm.handle(&fused(BarrierId::S1Entry, Some("ab12")), &ctx);
        fsm.handle(&fused(BarrierId::S1Process, None), &ctx);
        assert_eq!(fsm.phase(), StationPhase::Processing);
        assert_eq!(motors.last_commanded(3), 0.0);
    }
}
