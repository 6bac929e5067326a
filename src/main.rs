//! Conveyor coordination pipeline entry point.
//!
//! Loads configuration, builds the supervisor (motors, collision arbiter,
//! activity/time-series collaborators, producer threads, and the CEP
//! fuser), then runs until the operator presses Enter.

use std::io::stdin;
use std::thread;

use log::info;

use manu_conveyor::config::Config;
use manu_conveyor::supervisor::Supervisor;

const CONFIG_PATH: &str = "config.yaml";

fn main() {
    env_logger::init();
    info!("=== conveyor coordination pipeline starting ===");

    let config = Config::load(CONFIG_PATH);
    let mut supervisor = Supervisor::new(config);

    let shutdown = supervisor.shutdown_handle();
    thread::spawn(move || {
        println!("Press Enter to stop the simulation...");
        let mut line = String::new();
        let _ = stdin().read_line(&mut line);
        shutdown.store(false, std::sync::atomic::Ordering::SeqCst);
    });

    supervisor.run();

    info!("=== conveyor coordination pipeline stopped ===");
}
