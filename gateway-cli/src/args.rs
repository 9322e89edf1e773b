//! Command line arguments

use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use mqtt_bus::{MqttConfig, DEFAULT_HOST, DEFAULT_PORT};
use pico_gateway::{GatewayConfig, LoggingMode, DEFAULT_TOPIC_ROOT};

/// Default host of the HTTP introspection endpoint
pub const DEFAULT_HTTP_HOST: &str = "localhost";

/// Default port of the HTTP introspection endpoint
pub const DEFAULT_HTTP_PORT: u16 = 50000;

/// pico-cs MQTT gateway
///
/// Connects pico-cs command stations to an MQTT broker. Command stations
/// and locos are read from the YAML files of the configuration directory.
#[derive(Parser, Debug, Clone)]
#[command(name = "pico-gateway")]
#[command(about = "Bridges an MQTT broker to pico-cs command stations")]
#[command(version)]
pub struct Args {
    /// First level of every gateway topic
    #[arg(long, env = "PICO_GATEWAY_TOPIC_ROOT", default_value = DEFAULT_TOPIC_ROOT)]
    pub topic_root: String,

    /// MQTT broker host
    #[arg(long, env = "PICO_GATEWAY_HOST", default_value = DEFAULT_HOST)]
    pub host: String,

    /// MQTT broker port
    #[arg(long, env = "PICO_GATEWAY_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// MQTT user name
    #[arg(long, env = "PICO_GATEWAY_USERNAME")]
    pub username: Option<String>,

    /// MQTT password
    #[arg(long, env = "PICO_GATEWAY_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Directory with command station and loco configurations
    #[arg(long, env = "PICO_GATEWAY_CONFIG_DIR", default_value = ".")]
    pub config_dir: PathBuf,

    /// Host of the HTTP introspection endpoint
    #[arg(long, env = "PICO_GATEWAY_HTTP_HOST", default_value = DEFAULT_HTTP_HOST)]
    pub http_host: String,

    /// Port of the HTTP introspection endpoint
    #[arg(long, env = "PICO_GATEWAY_HTTP_PORT", default_value_t = DEFAULT_HTTP_PORT)]
    pub http_port: u16,

    /// Log output (silent, development, debug, json)
    #[arg(long, env = "PICO_GATEWAY_LOG_MODE", default_value = "development")]
    pub log_mode: LoggingMode,
}

impl Args {
    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig::default().with_topic_root(self.topic_root.clone())
    }

    pub fn mqtt_config(&self) -> MqttConfig {
        let config = MqttConfig::default().with_broker(self.host.clone(), self.port);
        match (&self.username, &self.password) {
            (Some(username), password) => config.with_credentials(
                username.clone(),
                password.clone().unwrap_or_default(),
            ),
            (None, _) => config,
        }
    }

    /// Resolve the HTTP endpoint address.
    pub fn http_addr(&self) -> Result<SocketAddr> {
        (self.http_host.as_str(), self.http_port)
            .to_socket_addrs()
            .with_context(|| format!("Failed to resolve HTTP host '{}'", self.http_host))?
            .next()
            .ok_or_else(|| anyhow!("No address for HTTP host '{}'", self.http_host))
    }

    /// Validate command line arguments
    pub fn validate(&self) -> Result<()> {
        self.gateway_config()
            .validate()
            .context("Invalid topic root")?;
        self.mqtt_config()
            .validate()
            .context("Invalid broker settings")?;

        if self.password.is_some() && self.username.is_none() {
            return Err(anyhow!("A password requires a user name"));
        }

        if !self.config_dir.is_dir() {
            return Err(anyhow!(
                "Configuration directory '{}' does not exist",
                self.config_dir.display()
            ));
        }

        Ok(())
    }
}
