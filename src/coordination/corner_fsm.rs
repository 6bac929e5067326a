//! coordination/corner_fsm.rs
//! Corner passive FSM: arrival -> approach -> reserve -> extend -> push ->
//! confirm -> retract. Coordinates with [`CollisionArbiter`] for mutual
//! exclusion of adjacent corners and with the feed conveyor's
//! safe-to-stop predicate; never inspects another corner's state directly.

use std::time::Duration;

use log::{error, warn};

use crate::coordination::context::FsmContext;
use crate::coordination::timer::{arm_timer, TimerHandle};
use crate::data::{BarrierId, FsmKey, FusedEvent, TimerKind};
use crate::diagnostics::activity_log::ActivityTag;

const PUSH_RETRY_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CornerPhase {
    Idle,
    FinalApproach,
    ReadyToPush,
    Extending,
    Pushing,
    WaitingForConfirmation,
    Retracting,
    /// Terminal: a jam was detected and the reservation was deliberately
    /// left held. Only an external arbiter `reset` plus a fresh FSM clears
    /// this — there is no automatic recovery (SPEC_FULL §1 Non-goals).
    Locked,
}

impl CornerPhase {
    fn ordinal(self) -> u32 {
        match self {
            CornerPhase::Idle => 0,
            CornerPhase::FinalApproach => 1,
            CornerPhase::ReadyToPush => 2,
            CornerPhase::Extending => 3,
            CornerPhase::Pushing => 4,
            CornerPhase::WaitingForConfirmation => 5,
            CornerPhase::Retracting => 6,
            CornerPhase::Locked => 7,
        }
    }

    fn name(self) -> &'static str {
        match self {
            CornerPhase::Idle => "idle",
            CornerPhase::FinalApproach => "final_approach",
            CornerPhase::ReadyToPush => "ready_to_push",
            CornerPhase::Extending => "extending",
            CornerPhase::Pushing => "pushing",
            CornerPhase::WaitingForConfirmation => "waiting_for_confirmation",
            CornerPhase::Retracting => "retracting",
            CornerPhase::Locked => "locked",
        }
    }
}

pub struct CornerFsm {
    pub corner_index: u8,
    corner_id: String,
    phase: CornerPhase,
    motor_num: u8,
    push_speed: f32,
    conveyor_speed: f32,
    feed_motor: Option<u8>,
    extend_barrier: BarrierId,
    retract_barrier: BarrierId,
    position_barrier: BarrierId,
    confirmation_barrier: BarrierId,
    final_delay: Duration,
    handshake_timeout: Duration,
    retract_timeout: Duration,
    preserve_pushing_state: bool,
    approach_timer: Option<TimerHandle>,
    handshake_timer: Option<TimerHandle>,
    retract_timer: Option<TimerHandle>,
}

impl CornerFsm {
    pub fn new(
        corner_index: u8,
        push_speed: f32,
        conveyor_speed: f32,
        extend_time: Duration,
        retract_time: Duration,
        final_delay: Duration,
        handshake_timeout: Duration,
        preserve_pushing_state: bool,
    ) -> Self {
        let (position_barrier, extend_barrier, retract_barrier) = match corner_index {
            1 => (BarrierId::C1Pos, BarrierId::Corner1Ext, BarrierId::Corner1Ret),
            2 => (BarrierId::C2Pos, BarrierId::Corner2Ext, BarrierId::Corner2Ret),
            3 => (BarrierId::C3Pos, BarrierId::Corner3Ext, BarrierId::Corner3Ret),
            4 => (BarrierId::C4Pos, BarrierId::Corner4Ext, BarrierId::Corner4Ret),
            other => panic!("invalid corner index {other}"),
        };
        let confirmation_barrier = match corner_index {
            1 => BarrierId::S1Entry,
            2 => BarrierId::M1Start,
            3 => BarrierId::S2Entry,
            4 => BarrierId::M2Start,
            other => panic!("invalid corner index {other}"),
        };
        let feed_motor = match corner_index {
            1 => Some(1),
            3 => Some(2),
            _ => None,
        };

        CornerFsm {
            corner_index,
            corner_id: format!("C{corner_index}"),
            phase: CornerPhase::Idle,
            motor_num: 4 + corner_index,
            push_speed,
            conveyor_speed,
            feed_motor,
            extend_barrier,
            retract_barrier,
            position_barrier,
            confirmation_barrier,
            final_delay,
            handshake_timeout,
            retract_timeout: retract_time * 2,
            preserve_pushing_state,
            approach_timer: None,
            handshake_timer: None,
            retract_timer: None,
        }
    }

    pub fn phase(&self) -> CornerPhase {
        self.phase
    }

    fn key(&self) -> FsmKey {
        FsmKey::Corner(self.corner_index)
    }

    fn transition(&mut self, ctx: &FsmContext, new_phase: CornerPhase) {
        self.phase = new_phase;
        ctx.timeseries.write_state(&self.corner_id, new_phase.name(), new_phase.ordinal(), None);
    }

    fn start_feed_conveyor(&self, ctx: &FsmContext) {
        if let Some(feed_motor) = self.feed_motor {
            ctx.motors.set_speed(feed_motor, self.conveyor_speed);
        }
    }

    fn stop_feed_conveyor(&self, ctx: &FsmContext) {
        if let Some(feed_motor) = self.feed_motor {
            ctx.motors.stop(feed_motor);
        }
    }

    /// Starts the corner's feed conveyor on construction, matching the
    /// source system initializing conveyor motion for fed corners at
    /// startup.
    pub fn start(&self, ctx: &FsmContext) {
        self.start_feed_conveyor(ctx);
    }

    pub fn handle(&mut self, event: &FusedEvent, ctx: &FsmContext) {
        match self.phase {
            CornerPhase::Idle => self.handle_idle(event, ctx),
            CornerPhase::FinalApproach => {} // jitter ignored while approaching
            CornerPhase::ReadyToPush => {} // waiting on collision clearance
            CornerPhase::Extending => self.handle_extending(event, ctx),
            CornerPhase::Pushing => {} // transition happens via timer
            CornerPhase::WaitingForConfirmation => self.handle_waiting_for_confirmation(event, ctx),
            CornerPhase::Retracting => self.handle_retracting(event, ctx),
            CornerPhase::Locked => {
                warn!("{} is locked (jammed), dropping event {:?}", self.corner_id, event.barrier_id);
            }
        }
    }

    pub fn handle_timer(&mut self, kind: TimerKind, ctx: &FsmContext) {
        match (self.phase, kind) {
            (CornerPhase::FinalApproach, TimerKind::CornerApproachDone) => {
                self.transition(ctx, CornerPhase::ReadyToPush);
                self.try_push(ctx);
            }
            (CornerPhase::ReadyToPush, TimerKind::CornerPushRetry) => {
                self.try_push(ctx);
            }
            (CornerPhase::Pushing, TimerKind::CornerPushingDone) => {
                self.enter_waiting_for_confirmation(ctx);
            }
            (CornerPhase::WaitingForConfirmation, TimerKind::CornerHandshakeTimeout) => {
                error!("JAM DETECTED at {}: part never arrived at next sensor", self.corner_id);
                ctx.arbiter.clear_handshake_wait(self.corner_index);
                ctx.activity_log.log_activity(
                    "UNKNOWN",
                    &self.corner_id,
                    "ERROR_JAM_HANDSHAKE_TIMEOUT",
                    Some(ActivityTag::Start),
                );
                // Corner stays locked; reservation is intentionally not released.
                self.transition(ctx, CornerPhase::Locked);
            }
            (CornerPhase::Retracting, TimerKind::CornerRetractTimeout) => {
                error!("JAM DETECTED at {}: pusher never reached retract limit", self.corner_id);
                self.stop_feed_conveyor(ctx);
                ctx.activity_log.log_activity(
                    "UNKNOWN",
                    &self.corner_id,
                    "ERROR_JAM_RETRACT_TIMEOUT",
                    Some(ActivityTag::Start),
                );
                self.transition(ctx, CornerPhase::Locked);
            }
            _ => {}
        }
    }

    fn handle_idle(&mut self, event: &FusedEvent, ctx: &FsmContext) {
        if event.barrier_id != self.position_barrier {
            return;
        }
        if let Some(feed_motor) = self.feed_motor {
            if !ctx.arbiter.is_conveyor_safe_to_stop(feed_motor) {
                return; // busy; retry on next position event
            }
            self.stop_feed_conveyor(ctx);
        }
        self.approach_timer = Some(arm_timer(
            self.final_delay,
            self.key(),
            TimerKind::CornerApproachDone,
            ctx.timers.clone(),
        ));
        self.transition(ctx, CornerPhase::FinalApproach);
    }

    fn try_push(&mut self, ctx: &FsmContext) {
        if ctx.arbiter.request_corner(self.corner_index) {
            ctx.motors.set_speed(self.motor_num, self.push_speed);
            self.transition(ctx, CornerPhase::Extending);
        } else {
            arm_timer(PUSH_RETRY_INTERVAL, self.key(), TimerKind::CornerPushRetry, ctx.timers.clone());
        }
    }

    fn handle_extending(&mut self, event: &FusedEvent, ctx: &FsmContext) {
        if event.barrier_id != self.extend_barrier {
            return;
        }
        ctx.motors.stop(self.motor_num);
        ctx.activity_log.log_activity("UNKNOWN", &self.corner_id, "PUSH_START", Some(ActivityTag::Start));

        if self.preserve_pushing_state {
            self.transition(ctx, CornerPhase::Pushing);
            arm_timer(Duration::ZERO, self.key(), TimerKind::CornerPushingDone, ctx.timers.clone());
        } else {
            self.enter_waiting_for_confirmation(ctx);
        }
    }

    fn enter_waiting_for_confirmation(&mut self, ctx: &FsmContext) {
        ctx.arbiter.set_handshake_wait(self.corner_index);
        self.handshake_timer = Some(arm_timer(
            self.handshake_timeout,
            self.key(),
            TimerKind::CornerHandshakeTimeout,
            ctx.timers.clone(),
        ));
        self.transition(ctx, CornerPhase::WaitingForConfirmation);
    }

    fn handle_waiting_for_confirmation(&mut self, event: &FusedEvent, ctx: &FsmContext) {
        if event.barrier_id != self.confirmation_barrier {
            return;
        }
        if let Some(handle) = self.handshake_timer.take() {
            handle.cancel();
        }
        ctx.activity_log.log_activity("UNKNOWN", &self.corner_id, "PUSH_COMPLETE", Some(ActivityTag::Finish));
        ctx.arbiter.clear_handshake_wait(self.corner_index);
        ctx.motors.set_speed(self.motor_num, -self.push_speed);
        self.retract_timer = Some(arm_timer(
            self.retract_timeout,
            self.key(),
            TimerKind::CornerRetractTimeout,
            ctx.timers.clone(),
        ));
        self.transition(ctx, CornerPhase::Retracting);
    }

    fn handle_retracting(&mut self, event: &FusedEvent, ctx: &FsmContext) {
        if event.barrier_id != self.retract_barrier {
            return;
        }
        if let Some(handle) = self.retract_timer.take() {
            handle.cancel();
        }
        ctx.motors.stop(self.motor_num);
        ctx.arbiter.release_corner(self.corner_index);
        self.start_feed_conveyor(ctx);
        self.transition(ctx, CornerPhase::Idle);
    }

    pub fn stop(&mut self, ctx: &FsmContext) {
        if let Some(handle) = self.approach_timer.take() {
            handle.cancel();
        }
        if let Some(handle) = self.handshake_timer.take() {
            handle.cancel();
        }
        if let Some(handle) = self.retract_timer.take() {
            handle.cancel();
        }
        ctx.motors.stop(self.motor_num);
    }
}
