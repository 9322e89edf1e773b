//! Broker connection settings

use std::time::Duration;

use crate::error::BusError;

/// Default broker host
pub const DEFAULT_HOST: &str = "localhost";

/// Default broker port
pub const DEFAULT_PORT: u16 = 1883;

/// Configuration for [`MqttBus`](crate::MqttBus)
#[derive(Debug, Clone)]
pub struct MqttConfig {
    /// Broker host name or address
    /// Default: "localhost"
    pub host: String,

    /// Broker port
    /// Default: 1883
    pub port: u16,

    /// Authentication user name
    pub username: Option<String>,

    /// Authentication password (only used together with `username`)
    pub password: Option<String>,

    /// MQTT client id
    /// Default: "pico-gateway-<process id>"
    pub client_id: Option<String>,

    /// Keep alive interval
    /// Default: 30 seconds
    pub keep_alive: Duration,

    /// Capacity of the request queue towards the connection thread
    /// Default: 100
    pub request_capacity: usize,

    /// How long `connect` waits for the first broker acknowledgement
    /// Default: 5 seconds
    pub connect_timeout: Duration,

    /// Pause between reconnection attempts
    /// Default: 1 second
    pub reconnect_delay: Duration,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            username: None,
            password: None,
            client_id: None,
            keep_alive: Duration::from_secs(30),
            request_capacity: 100,
            connect_timeout: Duration::from_secs(5),
            reconnect_delay: Duration::from_secs(1),
        }
    }
}

impl MqttConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// `host:port` of the broker
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn client_id(&self) -> String {
        self.client_id
            .clone()
            .unwrap_or_else(|| format!("pico-gateway-{}", std::process::id()))
    }

    pub fn validate(&self) -> Result<(), BusError> {
        if self.host.is_empty() {
            return Err(BusError::Configuration("Broker host must not be empty".to_string()));
        }

        if self.port == 0 {
            return Err(BusError::Configuration("Broker port must not be 0".to_string()));
        }

        if self.request_capacity == 0 {
            return Err(BusError::Configuration(
                "Request capacity must be greater than 0".to_string(),
            ));
        }

        if let Some(id) = &self.client_id {
            if id.is_empty() || id.starts_with(' ') {
                return Err(BusError::Configuration(format!("Invalid client id '{id}'")));
            }
        }

        Ok(())
    }

    pub fn with_broker(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn with_keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }
}
