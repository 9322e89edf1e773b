//! Broker transport for pico-gateway.
//!
//! This crate is the thin layer between the gateway core and an MQTT broker.
//! It has no knowledge of the gateway topic grammar or payloads: it connects,
//! subscribes a topic filter, delivers inbound messages to a callback and
//! publishes outbound messages.
//!
//! # Overview
//!
//! - [`BusClient`]: the capabilities the gateway consumes.
//! - [`MqttBus`]: implementation on top of the blocking `rumqttc` client. A
//!   dedicated connection thread polls the event loop, reconnects after
//!   failures and re-subscribes all listened filters on every new session.
//! - [`MemoryBus`]: in-process implementation for tests. It records every
//!   publication, keeps retained messages and can echo publications back to
//!   the listener the way a broker does.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use mqtt_bus::{BusClient, MqttBus, MqttConfig, QoS};
//!
//! let bus = MqttBus::connect(&MqttConfig::default()).expect("broker reachable");
//! bus.listen(
//!     "pico-cs/#",
//!     QoS::AtLeastOnce,
//!     Arc::new(|msg| println!("{} retained={}", msg.topic, msg.retained)),
//! )
//! .expect("subscribed");
//! ```

mod config;
mod error;
mod filter;
mod memory;
mod mqtt;

use std::sync::Arc;

pub use config::{MqttConfig, DEFAULT_HOST, DEFAULT_PORT};
pub use error::{BusError, Result};
pub use filter::topic_matches;
pub use memory::{MemoryBus, Published};
pub use mqtt::MqttBus;

/// MQTT delivery guarantee
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum QoS {
    AtMostOnce,
    #[default]
    AtLeastOnce,
    ExactlyOnce,
}

impl From<QoS> for rumqttc::QoS {
    fn from(qos: QoS) -> Self {
        match qos {
            QoS::AtMostOnce => rumqttc::QoS::AtMostOnce,
            QoS::AtLeastOnce => rumqttc::QoS::AtLeastOnce,
            QoS::ExactlyOnce => rumqttc::QoS::ExactlyOnce,
        }
    }
}

/// A message received from the broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    /// Set when the broker replayed a retained message on subscribe
    pub retained: bool,
}

/// Callback invoked for every inbound message of a listened filter.
///
/// The callback runs on the transport's delivery thread; blocking in it
/// delays the delivery of all following messages.
pub type InboundHandler = Arc<dyn Fn(InboundMessage) + Send + Sync>;

/// Capabilities of a broker connection
pub trait BusClient: Send + Sync {
    /// Install `handler` and subscribe `filter`. Messages arriving for the
    /// filter are delivered to the handler from then on, including retained
    /// messages replayed by the broker.
    fn listen(&self, filter: &str, qos: QoS, handler: InboundHandler) -> Result<()>;

    /// Stop delivery for `filter`
    fn unsubscribe(&self, filter: &str) -> Result<()>;

    fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool, qos: QoS) -> Result<()>;

    /// Close the broker connection. Later calls fail with [`BusError::Disconnected`].
    fn disconnect(&self) -> Result<()>;
}
