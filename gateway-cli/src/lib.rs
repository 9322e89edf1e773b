//! # pico-gateway-cli
//!
//! Library part of the `pico-gateway` binary: command line arguments, the
//! configuration directory loader, command station construction and the
//! HTTP introspection endpoint.

pub mod args;
pub mod http;
pub mod loader;

use anyhow::{anyhow, Context, Result};
use cs_client::{CommandStation, SimulatedStation};
use pico_gateway::{ControllerConfig, Gateway, Transport};

pub use args::Args;
pub use http::HttpServer;
pub use loader::{ConfigSet, LoadError};

/// Open the connection to the command station `config` describes.
pub fn open_station(config: &ControllerConfig) -> Result<Box<dyn CommandStation>> {
    match config.transport()? {
        Transport::Simulated => Ok(Box::new(SimulatedStation::new(config.name.clone()))),
        transport => Err(anyhow!(
            "command station {}: transport {} is not supported by this build, set 'simulated: true'",
            config.name,
            transport
        )),
    }
}

/// Add all stations and locos of `configs` to `gateway`.
///
/// Stations come first so every loco sees its final set of candidate
/// stations. An ownership conflict aborts.
pub fn populate(gateway: &mut Gateway, configs: &ConfigSet) -> Result<()> {
    for config in configs.controllers.values() {
        let station = open_station(config)?;
        gateway
            .add_controller(config.clone(), station)
            .with_context(|| format!("Failed to add command station {}", config.name))?;
        tracing::info!("Added command station {}", config.name);
    }

    for config in configs.entities.values() {
        let roles = gateway
            .add_entity(config)
            .with_context(|| format!("Failed to add loco {}", config.name))?;
        for (controller, role) in roles {
            tracing::info!("Loco {} -> {} ({})", config.name, controller, role);
        }
    }
    Ok(())
}
