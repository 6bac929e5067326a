//! coordination/context.rs
//! The set of collaborators an FSM needs to act: the motor facade, the
//! arbiter, the outbound logging/telemetry contracts, and the channel used
//! to arm deferred timers. Built once by the fuser and passed by reference
//! into every `handle`/`handle_timer` call — FSM state itself never leaves
//! the fuser's ownership.

use crossbeam::channel::Sender;

use crate::coordination::arbiter::CollisionArbiter;
use crate::data::TimerFired;
use crate::diagnostics::activity_log::ActivityLogger;
use crate::diagnostics::timeseries::TimeseriesSink;
use crate::motors::MotorFacade;

pub struct FsmContext<'a> {
    pub motors: &'a MotorFacade,
    pub arbiter: &'a CollisionArbiter,
    pub activity_log: &'a dyn ActivityLogger,
    pub timeseries: &'a dyn TimeseriesSink,
    pub timers: &'a Sender<TimerFired>,
}

impl<'a> FsmContext<'a> {
    pub fn new(
        motors: &'a MotorFacade,
        arbiter: &'a CollisionArbiter,
        activity_log: &'a dyn ActivityLogger,
        timeseries: &'a dyn TimeseriesSink,
        timers: &'a Sender<TimerFired>,
    ) -> Self {
        FsmContext { motors, arbiter, activity_log, timeseries, timers }
    }
}
