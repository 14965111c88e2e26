//! Точка входа `iqfeed-sim`: поднимает порты и работает до `Ctrl+C`.

mod cli;

use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use clap::Parser;
use log::info;

use iqfeed_sim::Simulator;

fn main() -> anyhow::Result<()> {
    // Логи через RUST_LOG=info/debug
    env_logger::init();

    let args = cli::Args::parse();
    args.validate()?;

    let sim = Simulator::start(args.sim_config())?;
    let shutdown = sim.shutdown_flag();

    // Ctrl+C => ставим shutdown=true
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || {
            shutdown.store(true, Ordering::Relaxed);
            info!("shutting down...");
        })?;
    }

    while !shutdown.load(Ordering::Relaxed) {
        thread::sleep(Duration::from_millis(100));
    }

    sim.stop();
    Ok(())
}
