//! coordination/arbiter.rs
//! Collision arbiter: grants exclusive use of adjacent corner regions.
//! All policy lives here as a pure predicate over mutex-protected state —
//! corner FSMs never inspect each other directly, which keeps them
//! independently testable. Every operation completes in bounded time
//! without touching I/O.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

const MIN_INTERVAL: Duration = Duration::from_secs(2);

fn adjacent(corner: u8) -> [u8; 2] {
    match corner {
        1 => [2, 4],
        2 => [1, 3],
        3 => [2, 4],
        4 => [1, 3],
        other => panic!("invalid corner number {other}"),
    }
}

struct ArbiterState {
    occupied: [bool; 4],
    last_released: [Instant; 4],
    waiting_handshake: [bool; 4],
}

pub struct CollisionArbiter {
    state: Mutex<ArbiterState>,
}

impl CollisionArbiter {
    pub fn new() -> Self {
        let epoch = Instant::now() - Duration::from_secs(3600);
        CollisionArbiter {
            state: Mutex::new(ArbiterState {
                occupied: [false; 4],
                last_released: [epoch; 4],
                waiting_handshake: [false; 4],
            }),
        }
    }

    /// Atomically checks and reserves a corner. Fails if the corner or
    /// either of its adjacent corners is occupied, or if less than
    /// `MIN_INTERVAL` has passed since the corner was last released.
    pub fn request_corner(&self, corner: u8) -> bool {
        let idx = (corner - 1) as usize;
        let mut state = self.state.lock();

        if state.occupied[idx] {
            return false;
        }
        if state.last_released[idx].elapsed() < MIN_INTERVAL {
            return false;
        }
        for adj in adjacent(corner) {
            if state.occupied[(adj - 1) as usize] {
                return false;
            }
        }

        state.occupied[idx] = true;
        true
    }

    pub fn release_corner(&self, corner: u8) {
        let idx = (corner - 1) as usize;
        let mut state = self.state.lock();
        state.occupied[idx] = false;
        state.last_released[idx] = Instant::now();
    }

    pub fn set_handshake_wait(&self, corner: u8) {
        self.state.lock().waiting_handshake[(corner - 1) as usize] = true;
    }

    pub fn clear_handshake_wait(&self, corner: u8) {
        self.state.lock().waiting_handshake[(corner - 1) as usize] = false;
    }

    /// Motor 1 feeds corner 2; motor 2 feeds corner 4. A conveyor is unsafe
    /// to stop while the corner it feeds is waiting on a handshake.
    pub fn is_conveyor_safe_to_stop(&self, feed_motor_num: u8) -> bool {
        let state = self.state.lock();
        match feed_motor_num {
            1 => !state.waiting_handshake[1],
            2 => !state.waiting_handshake[3],
            _ => true,
        }
    }

    /// Explicit manual-recovery operation: clears a corner's reservation
    /// regardless of how it got there. Never called by the core itself —
    /// exposed for external recovery tooling after a jam (invariant 3
    /// permits release "by explicit arbiter reset").
    pub fn reset(&self, corner: u8) {
        let idx = (corner - 1) as usize;
        let mut state = self.state.lock();
        state.occupied[idx] = false;
        state.waiting_handshake[idx] = false;
    }

    pub fn is_occupied(&self, corner: u8) -> bool {
        self.state.lock().occupied[(corner - 1) as usize]
    }
}

impl Default for CollisionArbiter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grants_then_blocks_adjacent() {
        let a = CollisionArbiter::new();
        assert!(a.request_corner(1));
        assert!(!a.request_corner(2)); // adjacent to 1
        assert!(!a.request_corner(4)); // adjacent to 1
        assert!(a.request_corner(3)); // not adjacent to 1
    }

    #[test]
    fn release_then_min_interval_blocks_immediate_reuse() {
        let a = CollisionArbiter::new();
        assert!(a.request_corner(1));
        a.release_corner(1);
        assert!(!a.request_corner(1));
    }

    #[test]
    fn handshake_wait_gates_conveyor_stop_safety() {
        let a = CollisionArbiter::new();
        assert!(a.is_conveyor_safe_to_stop(1));
        a.set_handshake_wait(2);
        assert!(!a.is_conveyor_safe_to_stop(1));
        a.clear_handshake_wait(2);
        assert!(a.is_conveyor_safe_to_stop(1));
    }

    #[test]
    fn reset_releases_without_touching_unrelated_state() {
        let a = CollisionArbiter::new();
        assert!(a.request_corner(1));
        a.set_handshake_wait(1);
        a.reset(1);
        assert!(!a.is_occupied(1));
        assert!(a.is_conveyor_safe_to_stop(1)); // corner 1's wait was cleared, motor 1 watches corner 2 anyway
    }
}
