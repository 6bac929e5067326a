//! coordination/timer.rs
//! Deferred FSM timers, reified as events. A timer never mutates FSM state
//! directly from its own thread; it posts a [`TimerFired`] back onto the
//! fuser's serial dispatch channel, preserving the single-writer invariant
//! the FSMs depend on. This is a clarification of the source system's
//! behavior (there, `threading.Timer` callbacks mutated state directly),
//! not a change to observable timing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::channel::Sender;

use crate::data::FsmKey;
pub use crate::data::{TimerFired, TimerKind};

pub struct TimerHandle {
    cancelled: Arc<AtomicBool>,
}

impl TimerHandle {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

/// Spawns a one-shot timer that, after `duration` elapses without
/// cancellation, sends `TimerFired{target, kind}` on `tx`.
pub fn arm_timer(
    duration: Duration,
    target: FsmKey,
    kind: TimerKind,
    tx: Sender<TimerFired>,
) -> TimerHandle {
    let cancelled = Arc::new(AtomicBool::new(false));
    let cancelled_thread = cancelled.clone();

    thread::spawn(move || {
        thread::sleep(duration);
        if !cancelled_thread.load(Ordering::SeqCst) {
            let _ = tx.send(TimerFired { target, kind });
        }
    });

    TimerHandle { cancelled }
}
