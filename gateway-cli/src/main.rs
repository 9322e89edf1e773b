use std::sync::{mpsc, Arc};

use anyhow::{Context, Result};
use clap::Parser;
use gateway_cli::{populate, Args, ConfigSet, HttpServer};
use mqtt_bus::MqttBus;
use pico_gateway::{init_logging, Gateway};
use tracing::{error, info};

fn main() {
    let args = Args::parse();

    if let Err(e) = init_logging(args.log_mode) {
        eprintln!("{e}");
        std::process::exit(1);
    }

    if let Err(e) = run(args) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    args.validate()?;

    info!("Loading configuration from {}", args.config_dir.display());
    let mut configs = ConfigSet::new();
    let files = configs.load_dir(&args.config_dir)?;
    info!(
        "Loaded {} files: {} command stations, {} locos",
        files,
        configs.controllers.len(),
        configs.entities.len()
    );

    let mqtt = args.mqtt_config();
    info!("Connecting to broker {}", mqtt.address());
    let bus = Arc::new(MqttBus::connect(&mqtt).context("Failed to connect to broker")?);

    let mut gateway = Gateway::new(args.gateway_config(), bus)?;
    populate(&mut gateway, &configs)?;
    gateway.listen()?;
    info!("Listening on {}", gateway.config().listen_filter());

    let mut http = HttpServer::start(args.http_addr()?, Arc::new(gateway.snapshot()))?;

    let (stop_tx, stop_rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = stop_tx.send(());
    })
    .context("Failed to install signal handler")?;

    let _ = stop_rx.recv();
    info!("Shutting down");

    http.shutdown();
    gateway.close()?;
    Ok(())
}
