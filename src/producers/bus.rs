//! producers/bus.rs
//! Event bus: the bounded channels every producer feeds and the fuser
//! drains. Capacities mirror the original queue sizes (GPIO/MCP barrier
//! feeds at 100, NFC at 20) so a stalled consumer shows up as counted
//! drops rather than unbounded memory growth or a blocked producer
//! thread.

use crossbeam::channel::{bounded, unbounded, Receiver, Sender};

use crate::data::{BarrierEvent, NfcEvent, TimerFired};

const GPIO_QUEUE_CAPACITY: usize = 100;
const MCP_QUEUE_CAPACITY: usize = 100;
const NFC_QUEUE_CAPACITY: usize = 20;

pub struct EventBus {
    pub gpio_tx: Sender<BarrierEvent>,
    pub gpio_rx: Receiver<BarrierEvent>,
    pub mcp_tx: Sender<BarrierEvent>,
    pub mcp_rx: Receiver<BarrierEvent>,
    pub nfc_tx: Sender<NfcEvent>,
    pub nfc_rx: Receiver<NfcEvent>,
    pub timer_tx: Sender<TimerFired>,
    pub timer_rx: Receiver<TimerFired>,
}

impl EventBus {
    pub fn new() -> Self {
        let (gpio_tx, gpio_rx) = bounded(GPIO_QUEUE_CAPACITY);
        let (mcp_tx, mcp_rx) = bounded(MCP_QUEUE_CAPACITY);
        let (nfc_tx, nfc_rx) = bounded(NFC_QUEUE_CAPACITY);
        let (timer_tx, timer_rx) = unbounded();
        EventBus { gpio_tx, gpio_rx, mcp_tx, mcp_rx, nfc_tx, nfc_rx, timer_tx, timer_rx }
    }

    pub fn barrier_receivers(&self) -> Vec<Receiver<BarrierEvent>> {
        vec![self.gpio_rx.clone(), self.mcp_rx.clone()]
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{BarrierId, EdgeSource, Location};
    use std::time::Instant;

    #[test]
    fn gpio_and_mcp_channels_are_independent() {
        let bus = EventBus::new();
        bus.gpio_tx
            .try_send(BarrierEvent {
                timestamp: Instant::now(),
                barrier_id: BarrierId::S1Entry,
                location: Location::station(1),
                source: EdgeSource::Interrupt,
            })
            .unwrap();
        assert!(bus.mcp_rx.try_recv().is_err());
        assert!(bus.gpio_rx.try_recv().is_ok());
    }

    #[test]
    fn barrier_receivers_drains_both_sources() {
        let bus = EventBus::new();
        bus.mcp_tx
            .try_send(BarrierEvent {
                timestamp: Instant::now(),
                barrier_id: BarrierId::Corner1Ext,
                location: Location::corner(1),
                source: EdgeSource::Polled,
            })
            .unwrap();
        let rxs = bus.barrier_receivers();
        assert_eq!(rxs.len(), 2);
        assert!(rxs[1].try_recv().is_ok());
    }
}
