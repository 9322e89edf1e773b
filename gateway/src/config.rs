//! Configuration types for the pico-gateway crate
//!
//! [`GatewayConfig`] controls the routing core. [`ControllerConfig`] and
//! [`EntityConfig`] describe command stations and locos; they deserialize
//! from the YAML documents the gateway binary loads.

use std::collections::BTreeMap;
use std::fmt;

use cs_client::MAX_FUNCTION;
use mqtt_bus::QoS;
use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, Result};
use crate::topic::{
    check_level_name, CLASS_ERROR, MULTI_LEVEL_WILDCARD, RESERVED_FUNCTION_NAMES, RESERVED_IO_NAMES,
};

/// Default topic root.
pub const DEFAULT_TOPIC_ROOT: &str = "pico-cs";

/// Default capacity of every command and outbound queue.
pub const DEFAULT_QUEUE_SIZE: usize = 100;

/// Configuration for the gateway core
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    /// First level of every gateway topic
    /// Default: "pico-cs"
    pub topic_root: String,

    /// Capacity of each command station queue and of the two outbound queues
    /// Default: 100
    pub queue_size: usize,

    /// Quality of service for subscriptions and publications
    /// Default: at least once
    pub qos: QoS,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            topic_root: DEFAULT_TOPIC_ROOT.to_string(),
            queue_size: DEFAULT_QUEUE_SIZE,
            qos: QoS::AtLeastOnce,
        }
    }
}

impl GatewayConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn validate(&self) -> Result<()> {
        check_level_name(&self.topic_root)?;
        if self.queue_size == 0 {
            return Err(GatewayError::Configuration(
                "Queue size must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Filter the gateway subscribes on the broker.
    pub fn listen_filter(&self) -> String {
        format!("{}/{}", self.topic_root, MULTI_LEVEL_WILDCARD)
    }

    /// Topic all error reports are published to.
    pub fn error_topic(&self) -> String {
        format!("{}/{}", self.topic_root, CLASS_ERROR)
    }

    pub fn with_topic_root(mut self, topic_root: impl Into<String>) -> Self {
        self.topic_root = topic_root.into();
        self
    }

    pub fn with_queue_size(mut self, queue_size: usize) -> Self {
        self.queue_size = queue_size;
        self
    }

    pub fn with_qos(mut self, qos: QoS) -> Self {
        self.qos = qos;
        self
    }
}

/// Include and exclude lists of regular expressions over entity names.
///
/// Exclusions take precedence over inclusions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterConfig {
    #[serde(default)]
    pub incls: Vec<String>,
    #[serde(default)]
    pub excls: Vec<String>,
}

impl FilterConfig {
    /// Filter including every name.
    pub fn all() -> Self {
        Self {
            incls: vec![".*".to_string()],
            excls: Vec::new(),
        }
    }

    pub fn including<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            incls: patterns.into_iter().map(Into::into).collect(),
            excls: Vec::new(),
        }
    }

    pub fn excluding<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excls.extend(patterns.into_iter().map(Into::into));
        self
    }
}

/// How a command station is reached
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transport {
    /// In-process simulated station
    Simulated,
    /// pico_w over WiFi
    Tcp { host: String, port: Option<String> },
    /// pico over USB serial
    Serial { port: String },
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Simulated => f.write_str("simulated"),
            Transport::Tcp { host, port: Some(port) } => write!(f, "tcp://{host}:{port}"),
            Transport::Tcp { host, port: None } => write!(f, "tcp://{host}"),
            Transport::Serial { port } => write!(f, "serial://{port}"),
        }
    }
}

/// Command station descriptor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Station name, used as topic level
    pub name: String,
    /// Host of a WiFi connected station
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// TCP port of a WiFi station or serial device of a USB station
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<String>,
    /// Use an in-process simulated station
    #[serde(default)]
    pub simulated: bool,
    /// Locos this station is primary for
    #[serde(default)]
    pub primary: FilterConfig,
    /// Locos this station mirrors
    #[serde(default)]
    pub secondary: FilterConfig,
    /// Station inputs, the name is used as topic level
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub ios: BTreeMap<String, IoConfig>,
}

/// Command station input descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IoConfig {
    /// GPIO number on the station board
    pub gpio: u8,
}

impl ControllerConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Simulated station that is primary for every loco.
    pub fn simulated(name: impl Into<String>) -> Self {
        Self {
            simulated: true,
            primary: FilterConfig::all(),
            ..Self::new(name)
        }
    }

    pub fn with_primary(mut self, filter: FilterConfig) -> Self {
        self.primary = filter;
        self
    }

    pub fn with_secondary(mut self, filter: FilterConfig) -> Self {
        self.secondary = filter;
        self
    }

    pub fn with_io(mut self, name: impl Into<String>, gpio: u8) -> Self {
        self.ios.insert(name.into(), IoConfig { gpio });
        self
    }

    pub fn validate(&self) -> Result<()> {
        check_level_name(&self.name).map_err(|e| {
            GatewayError::Configuration(format!("command station name {:?}: {e}", self.name))
        })?;
        for io in self.ios.keys() {
            if RESERVED_IO_NAMES.contains(&io.as_str()) {
                return Err(GatewayError::Configuration(format!(
                    "command station {}: io name {io} is reserved",
                    self.name
                )));
            }
            check_level_name(io).map_err(|e| {
                GatewayError::Configuration(format!("command station {}: io name {io:?}: {e}", self.name))
            })?;
        }
        self.transport().map(|_| ())
    }

    pub fn transport(&self) -> Result<Transport> {
        if self.simulated {
            return Ok(Transport::Simulated);
        }
        match (&self.host, &self.port) {
            (Some(host), port) => Ok(Transport::Tcp {
                host: host.clone(),
                port: port.clone(),
            }),
            (None, Some(port)) => Ok(Transport::Serial { port: port.clone() }),
            (None, None) => Err(GatewayError::Configuration(format!(
                "command station {}: neither host nor port configured",
                self.name
            ))),
        }
    }
}

/// Loco function descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionConfig {
    /// Decoder function number
    pub no: u8,
}

/// Loco descriptor
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityConfig {
    /// Loco name, used as topic level
    pub name: String,
    /// Decoder address
    pub addr: u16,
    /// Named decoder functions, the name is used as topic level
    #[serde(default)]
    pub fcts: BTreeMap<String, FunctionConfig>,
}

impl EntityConfig {
    pub fn new(name: impl Into<String>, addr: u16) -> Self {
        Self {
            name: name.into(),
            addr,
            fcts: BTreeMap::new(),
        }
    }

    pub fn with_function(mut self, name: impl Into<String>, no: u8) -> Self {
        self.fcts.insert(name.into(), FunctionConfig { no });
        self
    }

    pub fn validate(&self) -> Result<()> {
        check_level_name(&self.name)
            .map_err(|e| GatewayError::Configuration(format!("loco name {:?}: {e}", self.name)))?;

        for (fct, config) in &self.fcts {
            if RESERVED_FUNCTION_NAMES.contains(&fct.as_str()) {
                return Err(GatewayError::Configuration(format!(
                    "loco {}: function name {fct} is reserved",
                    self.name
                )));
            }
            check_level_name(fct).map_err(|e| {
                GatewayError::Configuration(format!("loco {}: function name {fct:?}: {e}", self.name))
            })?;
            if config.no > MAX_FUNCTION {
                return Err(GatewayError::Configuration(format!(
                    "loco {}: function {fct} number {} exceeds {MAX_FUNCTION}",
                    self.name, config.no
                )));
            }
        }
        Ok(())
    }
}
