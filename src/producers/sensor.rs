//! producers/sensor.rs
//! Physical edge producers: GPIO interrupt callbacks (debounced) and an
//! MCP23017-style expander polled at 100Hz (rising-edge detection on an
//! active-low input). Both paths end up as [`BarrierEvent`]s pushed onto
//! the bus's bounded channels — never blocking, dropping and counting on
//! a full queue exactly like the original sensor reader.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::Sender;
use log::warn;
use parking_lot::Mutex;
use spin_sleep::{SpinSleeper, SpinStrategy};

use crate::data::{BarrierEvent, BarrierId, EdgeSource, Location};

const DEBOUNCE_TIME: Duration = Duration::from_millis(50);
const MCP_POLL_HZ: u64 = 100;

pub const STATION1_ENTRY_PIN: u8 = 17;
pub const STATION1_PROCESS_PIN: u8 = 27;
pub const STATION1_EXIT_PIN: u8 = 22;
pub const STATION2_ENTRY_PIN: u8 = 5;
pub const STATION2_PROCESS_PIN: u8 = 6;
pub const STATION2_EXIT_PIN: u8 = 13;
pub const CORNER1_POS_PIN: u8 = 21;
pub const CORNER3_POS_PIN: u8 = 12;

fn gpio_to_barriers(pin: u8) -> &'static [BarrierId] {
    match pin {
        STATION1_ENTRY_PIN => &[BarrierId::S1Entry],
        STATION1_PROCESS_PIN => &[BarrierId::S1Process],
        // S1_EXIT also marks the part's arrival at corner 4's position sensor.
        STATION1_EXIT_PIN => &[BarrierId::S1Exit, BarrierId::C4Pos],
        STATION2_ENTRY_PIN => &[BarrierId::S2Entry],
        STATION2_PROCESS_PIN => &[BarrierId::S2Process],
        // S2_EXIT also marks the part's arrival at corner 2's position sensor.
        STATION2_EXIT_PIN => &[BarrierId::S2Exit, BarrierId::C2Pos],
        CORNER1_POS_PIN => &[BarrierId::C1Pos],
        CORNER3_POS_PIN => &[BarrierId::C3Pos],
        _ => &[],
    }
}

const MCP_CORNER1_RET: u8 = 0;
const MCP_CORNER2_RET: u8 = 1;
const MCP_CORNER3_RET: u8 = 2;
const MCP_CORNER4_RET: u8 = 3;
const MCP_M1_START: u8 = 4;
const MCP_M2_START: u8 = 5;
const MCP_CORNER1_EXT: u8 = 8;
const MCP_CORNER2_EXT: u8 = 9;
const MCP_CORNER3_EXT: u8 = 10;
const MCP_CORNER4_EXT: u8 = 11;

const MCP_PINS: [u8; 10] = [
    MCP_CORNER1_RET,
    MCP_CORNER2_RET,
    MCP_CORNER3_RET,
    MCP_CORNER4_RET,
    MCP_M1_START,
    MCP_M2_START,
    MCP_CORNER1_EXT,
    MCP_CORNER2_EXT,
    MCP_CORNER3_EXT,
    MCP_CORNER4_EXT,
];

fn mcp_to_barrier(pin: u8) -> Option<BarrierId> {
    match pin {
        MCP_CORNER1_RET => Some(BarrierId::Corner1Ret),
        MCP_CORNER2_RET => Some(BarrierId::Corner2Ret),
        MCP_CORNER3_RET => Some(BarrierId::Corner3Ret),
        MCP_CORNER4_RET => Some(BarrierId::Corner4Ret),
        MCP_M1_START => Some(BarrierId::M1Start),
        MCP_M2_START => Some(BarrierId::M2Start),
        MCP_CORNER1_EXT => Some(BarrierId::Corner1Ext),
        MCP_CORNER2_EXT => Some(BarrierId::Corner2Ext),
        MCP_CORNER3_EXT => Some(BarrierId::Corner3Ext),
        MCP_CORNER4_EXT => Some(BarrierId::Corner4Ext),
        _ => None,
    }
}

/// A raw, pre-debounce interrupt edge. `inject_gpio_edge` is the entry
/// point a GPIO interrupt handler (or, in simulation, a test driver)
/// calls.
#[derive(Debug, Clone, Copy)]
pub struct RawEdge {
    pub pin: u8,
    pub timestamp: Instant,
}

/// Outbound collaborator contract for reading the expander's input pins.
/// The core ships [`NullExpander`] (simulation: always low); a deployment
/// wires in the real MCP23017 driver behind this trait.
pub trait ExpanderSource: Send + Sync {
    fn read_pin(&self, pin: u8) -> bool;
}

pub struct NullExpander;

impl ExpanderSource for NullExpander {
    fn read_pin(&self, _pin: u8) -> bool {
        false
    }
}

pub struct SensorReader {
    gpio_tx: Sender<BarrierEvent>,
    mcp_tx: Sender<BarrierEvent>,
    expander: Box<dyn ExpanderSource>,
    last_edge: Mutex<HashMap<u8, Instant>>,
    mcp_pin_state: Mutex<HashMap<u8, bool>>,
    running: Arc<AtomicBool>,
    dropped: AtomicU64,
}

impl SensorReader {
    pub fn new(
        gpio_tx: Sender<BarrierEvent>,
        mcp_tx: Sender<BarrierEvent>,
        expander: Box<dyn ExpanderSource>,
        running: Arc<AtomicBool>,
    ) -> Self {
        SensorReader {
            gpio_tx,
            mcp_tx,
            expander,
            last_edge: Mutex::new(HashMap::new()),
            mcp_pin_state: Mutex::new(MCP_PINS.iter().map(|&p| (p, false)).collect()),
            running,
            dropped: AtomicU64::new(0),
        }
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// GPIO interrupt callback. Captures the timestamp first (before any
    /// locking or dispatch work), debounces, then emits every barrier the
    /// pin maps to.
    pub fn inject_gpio_edge(&self, edge: RawEdge) {
        let mut last = self.last_edge.lock();
        if let Some(prev) = last.get(&edge.pin) {
            if edge.timestamp.saturating_duration_since(*prev) < DEBOUNCE_TIME {
                return;
            }
        }
        last.insert(edge.pin, edge.timestamp);
        drop(last);

        for &barrier_id in gpio_to_barriers(edge.pin) {
            let event = BarrierEvent {
                timestamp: edge.timestamp,
                barrier_id,
                location: barrier_id.location(),
                source: EdgeSource::Interrupt,
            };
            if self.gpio_tx.try_send(event).is_err() {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("gpio queue full, dropping barrier {:?}", barrier_id);
            }
        }
    }

    /// 100Hz polling loop over the expander's input pins, detecting
    /// active-low rising edges (false -> true, matching `not pin.value`
    /// semantics) and timestamping only on the edge.
    pub fn run_mcp_poll(&self) {
        let period = Duration::from_millis(1000 / MCP_POLL_HZ);
        let sleeper = SpinSleeper::new(100_000).with_spin_strategy(SpinStrategy::YieldThread);

        while self.running.load(Ordering::Acquire) {
            self.poll_once();
            sleeper.sleep(period);
        }
    }

    /// One expander scan: reads every MCP pin and emits a barrier for each
    /// active-low rising edge (false -> true). Split out from
    /// `run_mcp_poll` so a single tick is directly testable.
    fn poll_once(&self) {
        let now = Instant::now();
        for &pin in &MCP_PINS {
            let active = self.expander.read_pin(pin);
            let mut state = self.mcp_pin_state.lock();
            let prev = state.get(&pin).copied().unwrap_or(false);
            state.insert(pin, active);
            drop(state);

            if active && !prev {
                if let Some(barrier_id) = mcp_to_barrier(pin) {
                    let event = BarrierEvent {
                        timestamp: now,
                        barrier_id,
                        location: barrier_id.location(),
                        source: EdgeSource::Polled,
                    };
                    if self.mcp_tx.try_send(event).is_err() {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                        warn!("mcp queue full, dropping barrier {:?}", barrier_id);
                    }
                }
            }
        }
    }

    pub fn spawn_mcp_poll(self: Arc<Self>) -> thread::JoinHandle<()> {
        thread::spawn(move || self.run_mcp_poll())
    }
}
