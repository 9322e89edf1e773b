//! # pico-gateway
//!
//! Bridges an MQTT topic namespace to pico-cs command stations.
//!
//! Locos and command stations are addressed by topics of the form
//! `<root>/<class>/<name>/<property>[/<command>]`, for example
//! `pico-cs/loco/br01/speed/set`. Every loco is controlled by at most one
//! primary command station, which executes its commands and publishes the
//! resulting state as a retained message on the event topic
//! (`pico-cs/loco/br01/speed`). Secondary stations listen to the event topics
//! and mirror the state onto their own track.
//!
//! ## Architecture
//!
//! ```text
//! bus ──▶ Dispatcher ──▶ station queue ──▶ worker ──▶ CommandStation
//!                                             │
//!                     bus ◀── Publisher ◀─────┘
//! ```
//!
//! - [`topic`]: topic grammar and validation
//! - [`registry`] and [`ownership`]: routes and roles, guarded by one lock
//! - [`dispatcher`]: decodes inbound messages and queues commands
//! - [`controller`]: one worker thread per command station, plus the
//!   station's pushed IO changes
//! - [`publisher`]: event and error queues drained to the bus
//! - [`Gateway`]: the facade wiring it all together
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use cs_client::SimulatedStation;
//! use mqtt_bus::MemoryBus;
//! use pico_gateway::{ControllerConfig, EntityConfig, Gateway, GatewayConfig};
//!
//! # fn main() -> pico_gateway::Result<()> {
//! let bus = Arc::new(MemoryBus::new());
//! let mut gateway = Gateway::new(GatewayConfig::default(), bus.clone())?;
//!
//! gateway.add_controller(
//!     ControllerConfig::simulated("cs01"),
//!     Box::new(SimulatedStation::new("cs01")),
//! )?;
//! gateway.add_entity(&EntityConfig::new("br01", 3).with_function("light", 0))?;
//! gateway.listen()?;
//!
//! bus.inject("pico-cs/loco/br01/speed/set", "80", false);
//! gateway.close()?;
//!
//! assert_eq!(bus.retained("pico-cs/loco/br01/speed"), Some(b"80".to_vec()));
//! # Ok(())
//! # }
//! ```

pub mod action;
pub mod config;
pub mod controller;
pub mod dispatcher;
pub mod entity;
pub mod error;
pub mod filter;
pub mod gateway;
pub mod logging;
pub mod ownership;
pub mod payload;
pub mod publisher;
pub mod registry;
pub mod speed;
pub mod topic;

pub use config::{
    ControllerConfig, EntityConfig, FilterConfig, FunctionConfig, GatewayConfig, IoConfig,
    Transport, DEFAULT_QUEUE_SIZE, DEFAULT_TOPIC_ROOT,
};
pub use error::{CommandError, GatewayError, OwnershipError, PayloadError, Result, TopicError};
pub use gateway::{ControllerInfo, EntityInfo, Gateway, GatewaySnapshot};
pub use logging::{init_logging, LoggingError, LoggingMode};
pub use ownership::Role;
pub use payload::Value;
pub use speed::{DeviceSpeed, Speed};
pub use topic::{Command, Topic};
