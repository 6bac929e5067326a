//! motors.rs
//! Motor facade: eight motors across two I2C-addressed controllers (4
//! channels each), reached only through the narrow [`MotorDriver`]
//! collaborator contract. The facade owns clamping, index-to-address
//! routing, and the last-commanded-speed bookkeeping; it never talks to
//! hardware directly.

use log::debug;
use parking_lot::Mutex;

pub const HAT_ONE_ADDRESS: u8 = 0x60;
pub const HAT_TWO_ADDRESS: u8 = 0x61;

/// Outbound collaborator contract for commanding a single motor channel.
/// The core ships [`LoggingMotorDriver`] (simulation mode); a deployment
/// wires in the real I2C HAT driver behind this trait.
pub trait MotorDriver: Send + Sync {
    fn set_throttle(&self, address: u8, channel: u8, value: f32);
}

/// Simulation/default backend: logs the commanded throttle and keeps no
/// hardware state, matching the original system's no-hardware fallback.
pub struct LoggingMotorDriver;

impl MotorDriver for LoggingMotorDriver {
    fn set_throttle(&self, address: u8, channel: u8, value: f32) {
        debug!("motor hat=0x{address:02x} channel={channel} throttle={value:.2} (simulated)");
    }
}

fn route(motor_num: u8) -> Option<(u8, u8)> {
    match motor_num {
        1..=4 => Some((HAT_ONE_ADDRESS, motor_num - 1)),
        5..=8 => Some((HAT_TWO_ADDRESS, motor_num - 5)),
        _ => None,
    }
}

pub struct MotorFacade {
    driver: Box<dyn MotorDriver>,
    last_commanded: Mutex<[f32; 8]>,
}

impl MotorFacade {
    pub fn new(driver: Box<dyn MotorDriver>) -> Self {
        MotorFacade { driver, last_commanded: Mutex::new([0.0; 8]) }
    }

    pub fn simulated() -> Self {
        Self::new(Box::new(LoggingMotorDriver))
    }

    /// Commands motor `motor_num` (1..=8) to `speed`, clamped to [-1, 1].
    pub fn set_speed(&self, motor_num: u8, speed: f32) {
        let Some((address, channel)) = route(motor_num) else {
            debug!("ignoring set_speed for out-of-range motor {motor_num}");
            return;
        };
        let clamped = speed.clamp(-1.0, 1.0);
        self.driver.set_throttle(address, channel, clamped);
        if let Some(slot) = self.last_commanded.lock().get_mut((motor_num - 1) as usize) {
            *slot = clamped;
        }
    }

    pub fn stop(&self, motor_num: u8) {
        self.set_speed(motor_num, 0.0);
    }

    pub fn stop_all(&self) {
        for motor_num in 1..=8 {
            self.stop(motor_num);
        }
    }

    pub fn last_commanded(&self, motor_num: u8) -> f32 {
        self.last_commanded
            .lock()
            .get((motor_num.wrapping_sub(1)) as usize)
            .copied()
            .unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    struct CountingDriver(Arc<AtomicU32>);
    impl MotorDriver for CountingDriver {
        fn set_throttle(&self, _address: u8, _channel: u8, _value: f32) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn clamps_out_of_range_speed() {
        let facade = MotorFacade::simulated();
        facade.set_speed(1, 5.0);
        assert_eq!(facade.last_commanded(1), 1.0);
        facade.set_speed(1, -5.0);
        assert_eq!(facade.last_commanded(1), -1.0);
    }

    #[test]
    fn routes_motor_to_expected_hat_and_channel() {
        assert_eq!(route(1), Some((HAT_ONE_ADDRESS, 0)));
        assert_eq!(route(4), Some((HAT_ONE_ADDRESS, 3)));
        assert_eq!(route(5), Some((HAT_TWO_ADDRESS, 0)));
        assert_eq!(route(8), Some((HAT_TWO_ADDRESS, 3)));
        assert_eq!(route(9), None);
    }

    #[test]
    fn stop_all_commands_every_motor() {
        let counter = Arc::new(AtomicU32::new(0));
        let facade = MotorFacade::new(Box::new(CountingDriver(counter.clone())));
        facade.stop_all();
        assert_eq!(counter.load(Ordering::SeqCst), 8);
    }
}
