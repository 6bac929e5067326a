//! supervisor.rs
//! Builds the full event pipeline graph and owns its start/stop lifecycle:
//! motors, arbiter, loggers, the event bus, the FSM registry, the producer
//! threads, and the fuser's dispatch loop. Mirrors the original system
//! manager's construction order and its explicit start()/stop() contract.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{error, info};

use crate::config::Config;
use crate::coordination::arbiter::CollisionArbiter;
use crate::coordination::context::FsmContext;
use crate::coordination::corner_fsm::CornerFsm;
use crate::coordination::fuser::{CepFuser, FsmRegistry};
use crate::coordination::station_fsm::StationFsm;
use crate::diagnostics::activity_log::{ActivityLogger, LoggingActivityLogger, QueueingActivityLogger};
use crate::diagnostics::timeseries::{NoopTimeseriesSink, TimeseriesSink};
use crate::motors::MotorFacade;
use crate::producers::bus::EventBus;
use crate::producers::nfc::{NfcProducer, SimulatedNfcReader};
use crate::producers::sensor::{NullExpander, SensorReader};

pub struct Supervisor {
    config: Config,
    motors: MotorFacade,
    arbiter: CollisionArbiter,
    activity_log: Box<dyn ActivityLogger>,
    timeseries: Box<dyn TimeseriesSink>,
    bus: EventBus,
    registry: FsmRegistry,
    sensor_reader: SensorReader,
    nfc_producers: Vec<NfcProducer>,
    fuser: CepFuser,
    running: Arc<AtomicBool>,
}

impl Supervisor {
    pub fn new(config: Config) -> Self {
        let motors = MotorFacade::simulated();
        let arbiter = CollisionArbiter::new();

        let activity_log: Box<dyn ActivityLogger> =
            match QueueingActivityLogger::start(config.logging.event_file.clone()) {
                Ok(logger) => Box::new(logger),
                Err(e) => {
                    error!("failed to start activity logger at {}: {e}, logging to console only", config.logging.event_file);
                    Box::new(LoggingActivityLogger)
                }
            };
        let timeseries: Box<dyn TimeseriesSink> = Box::new(NoopTimeseriesSink);

        let bus = EventBus::new();
        let running = Arc::new(AtomicBool::new(true));

        let mut registry = FsmRegistry::new();
        registry.insert_station(StationFsm::new(
            1,
            config.motors.station_speed,
            Duration::from_secs_f64(config.stations.station1_process_time_s),
        ));
        registry.insert_station(StationFsm::new(
            2,
            config.motors.station_speed,
            Duration::from_secs_f64(config.stations.station2_process_time_s),
        ));
        for corner_index in 1..=4u8 {
            registry.insert_corner(CornerFsm::new(
                corner_index,
                config.motors.corner_speed,
                config.motors.conveyor_speed,
                Duration::from_secs_f64(config.corners.extend_time_s),
                Duration::from_secs_f64(config.corners.retract_time_s),
                Duration::from_secs_f64(config.corners.final_approach_delay_s),
                Duration::from_secs_f64(config.corners.handshake_timeout_s),
                config.corners.preserve_pushing_state,
            ));
        }

        let sensor_reader = SensorReader::new(
            bus.gpio_tx.clone(),
            bus.mcp_tx.clone(),
            Box::new(NullExpander),
            running.clone(),
        );

        let nfc_producers = vec![
            NfcProducer::new(1, 0, Box::new(SimulatedNfcReader::default()), bus.nfc_tx.clone(), running.clone()),
            NfcProducer::new(2, 1, Box::new(SimulatedNfcReader::default()), bus.nfc_tx.clone(), running.clone()),
        ];

        let fuser = CepFuser::new(
            Duration::from_secs_f64(config.cep.fusion_window_s),
            Duration::from_secs_f64(config.cep.expiry_timeout_s),
        );

        Supervisor {
            config,
            motors,
            arbiter,
            activity_log,
            timeseries,
            bus,
            registry,
            sensor_reader,
            nfc_producers,
            fuser,
            running,
        }
    }

    /// A clone of the shutdown flag; storing `false` through it causes
    /// [`Supervisor::run`] to wind down and return on its next loop tick.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    /// Blocks until `shutdown_handle()` is cleared. Spawns the sensor
    /// expander poll loop and both NFC reader producers, then drives the
    /// fuser's dispatch loop on the calling thread — matching the
    /// original manager's "producers run on their own threads, consumer
    /// owns the main loop" shape.
    pub fn run(&mut self) {
        info!("supervisor starting: station process times {}s/{}s, preserve_pushing_state={}",
            self.config.stations.station1_process_time_s,
            self.config.stations.station2_process_time_s,
            self.config.corners.preserve_pushing_state);

        let ctx = FsmContext::new(&self.motors, &self.arbiter, self.activity_log.as_ref(), self.timeseries.as_ref(), &self.bus.timer_tx);
        let registry = &mut self.registry;
        registry.start_all(&ctx);

        let barrier_rxs = self.bus.barrier_receivers();
        let sensor_reader = &self.sensor_reader;
        let nfc_producers = &self.nfc_producers;
        let fuser = &mut self.fuser;
        let running = &self.running;
        let nfc_rx = &self.bus.nfc_rx;
        let timer_rx = &self.bus.timer_rx;

        thread::scope(|scope| {
            for producer in nfc_producers {
                scope.spawn(|| producer.run());
            }
            scope.spawn(|| sensor_reader.run_mcp_poll());

            fuser.run(running, &barrier_rxs, nfc_rx, timer_rx, registry, &ctx);
        });

        registry.stop_all(&ctx);
        info!(
            "supervisor stopped: dropped_gpio/mcp={} dropped_nfc={}",
            sensor_reader.dropped_count(),
            nfc_producers.iter().map(|p| p.dropped_count()).sum::<u64>()
        );
        info!("fuser stats at shutdown: {:?}", fuser.stats());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_registers_two_stations_and_four_corners() {
        let supervisor = Supervisor::new(Config::default());
        // indirect check: running flag starts set and shutdown handle shares it
        assert!(supervisor.shutdown_handle().load(Ordering::SeqCst));
    }

    #[test]
    fn run_returns_promptly_once_shutdown_is_requested() {
        let mut supervisor = Supervisor::new(Config::default());
        let handle = supervisor.shutdown_handle();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            handle.store(false, Ordering::SeqCst);
        });
        supervisor.run();
    }
}
