//! Outbound message queues
//!
//! Events and error reports travel on two independent bounded queues. Each
//! queue is drained by its own thread, so both are FIFO on their own but
//! carry no ordering relative to each other.

use std::fmt::Display;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{bounded, Receiver, Sender};
use mqtt_bus::{BusClient, QoS};
use serde::Serialize;

use crate::error::{GatewayError, Result};
use crate::payload::Value;

/// A property value to publish
#[derive(Debug, Clone, PartialEq)]
pub struct PublishMessage {
    pub topic: String,
    pub retain: bool,
    pub value: Value,
}

/// An error report about `topic`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorMessage {
    pub topic: String,
    pub error: String,
}

/// Body of a message on the error topic
#[derive(Debug, Serialize)]
struct ErrorPayload<'a> {
    topic: &'a str,
    error: &'a str,
}

/// Sending side of both outbound queues
///
/// Sends block while a queue is full. Messages sent after the publisher has
/// shut down are dropped.
#[derive(Debug, Clone)]
pub struct Outbox {
    events: Sender<PublishMessage>,
    errors: Sender<ErrorMessage>,
}

impl Outbox {
    pub fn publish(&self, topic: impl Into<String>, retain: bool, value: Value) {
        let msg = PublishMessage {
            topic: topic.into(),
            retain,
            value,
        };
        if let Err(e) = self.events.send(msg) {
            tracing::warn!("Publish queue closed, dropping event for {}", e.0.topic);
        }
    }

    pub fn error(&self, topic: impl Into<String>, error: impl Display) {
        let msg = ErrorMessage {
            topic: topic.into(),
            error: error.to_string(),
        };
        if let Err(e) = self.errors.send(msg) {
            tracing::warn!("Error queue closed, dropping error for {}", e.0.topic);
        }
    }

    /// Outbox whose queues are drained by the caller instead of the bus.
    pub fn detached(capacity: usize) -> (Self, Receiver<PublishMessage>, Receiver<ErrorMessage>) {
        let (events, event_rx) = bounded(capacity);
        let (errors, error_rx) = bounded(capacity);
        (Self { events, errors }, event_rx, error_rx)
    }
}

/// The two threads draining an [`Outbox`] to the bus
pub struct Publisher {
    outbox: Option<Outbox>,
    threads: Vec<JoinHandle<()>>,
}

impl Publisher {
    /// Start both drain threads.
    pub fn start(
        bus: Arc<dyn BusClient>,
        error_topic: String,
        qos: QoS,
        capacity: usize,
    ) -> Result<Self> {
        let (outbox, event_rx, error_rx) = Outbox::detached(capacity);

        let event_bus = Arc::clone(&bus);
        let events = thread::Builder::new()
            .name("gateway-publish".to_string())
            .spawn(move || drain_events(event_bus.as_ref(), event_rx, qos))
            .map_err(|e| GatewayError::Worker(e.to_string()))?;

        let errors = thread::Builder::new()
            .name("gateway-errors".to_string())
            .spawn(move || drain_errors(bus.as_ref(), &error_topic, error_rx, qos))
            .map_err(|e| GatewayError::Worker(e.to_string()))?;

        Ok(Self {
            outbox: Some(outbox),
            threads: vec![events, errors],
        })
    }

    /// A new sender onto both queues.
    pub fn outbox(&self) -> Option<Outbox> {
        self.outbox.clone()
    }

    /// Drain both queues and wait for the threads.
    ///
    /// The queues close once every [`Outbox`] clone is dropped; callers drop
    /// theirs before closing.
    pub fn close(&mut self) {
        self.outbox = None;
        for thread in self.threads.drain(..) {
            if thread.join().is_err() {
                tracing::error!("Publisher thread panicked");
            }
        }
    }
}

impl Drop for Publisher {
    fn drop(&mut self) {
        self.close();
    }
}

fn drain_events(bus: &dyn BusClient, queue: Receiver<PublishMessage>, qos: QoS) {
    for msg in queue {
        let payload = match msg.value.encode() {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!("Failed to encode value for {}: {}", msg.topic, e);
                continue;
            }
        };

        tracing::debug!(
            "Publish topic {} retain {} value {}",
            msg.topic,
            msg.retain,
            String::from_utf8_lossy(&payload)
        );
        if let Err(e) = bus.publish(&msg.topic, payload, msg.retain, qos) {
            tracing::warn!("Failed to publish {}: {}", msg.topic, e);
        }
    }
    tracing::debug!("Publish queue drained");
}

fn drain_errors(bus: &dyn BusClient, error_topic: &str, queue: Receiver<ErrorMessage>, qos: QoS) {
    for msg in queue {
        tracing::debug!("Publish error for topic {}: {}", msg.topic, msg.error);

        let payload = match serde_json::to_vec(&ErrorPayload {
            topic: &msg.topic,
            error: &msg.error,
        }) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!("Failed to encode error for {}: {}", msg.topic, e);
                continue;
            }
        };

        if let Err(e) = bus.publish(error_topic, payload, false, qos) {
            tracing::warn!("Failed to publish error for {}: {}", msg.topic, e);
        }
    }
    tracing::debug!("Error queue drained");
}

#[cfg(test)]
mod tests {
    use super::*;
    use mqtt_bus::MemoryBus;

    #[test]
    fn test_events_published_retained_in_order() {
        let bus = Arc::new(MemoryBus::new());
        let mut publisher =
            Publisher::start(bus.clone(), "pico-cs/error".to_string(), QoS::AtLeastOnce, 4).unwrap();
        let outbox = publisher.outbox().unwrap();

        outbox.publish("pico-cs/loco/br01/speed", true, Value::from(10u8));
        outbox.publish("pico-cs/loco/br01/speed", true, Value::from(20u8));
        drop(outbox);
        publisher.close();

        let published = bus.published();
        assert_eq!(published.len(), 2);
        assert_eq!(published[0].payload_str(), "10");
        assert_eq!(published[1].payload_str(), "20");
        assert!(published.iter().all(|p| p.retain && p.qos == QoS::AtLeastOnce));
    }

    #[test]
    fn test_errors_go_to_error_topic_unretained() {
        let bus = Arc::new(MemoryBus::new());
        let mut publisher =
            Publisher::start(bus.clone(), "pico-cs/error".to_string(), QoS::AtLeastOnce, 4).unwrap();
        let outbox = publisher.outbox().unwrap();

        outbox.error("pico-cs/loco/br01/speed/set", "Connection closed");
        drop(outbox);
        publisher.close();

        let published = bus.published_to("pico-cs/error");
        assert_eq!(published.len(), 1);
        assert!(!published[0].retain);
        let body: serde_json::Value = serde_json::from_slice(&published[0].payload).unwrap();
        assert_eq!(
            body,
            serde_json::json!({"topic": "pico-cs/loco/br01/speed/set", "error": "Connection closed"})
        );
    }

    #[test]
    fn test_publish_failure_is_not_fatal() {
        let bus = Arc::new(MemoryBus::new());
        bus.fail_publishes(true);
        let mut publisher =
            Publisher::start(bus.clone(), "pico-cs/error".to_string(), QoS::AtLeastOnce, 4).unwrap();
        let outbox = publisher.outbox().unwrap();

        outbox.publish("pico-cs/loco/br01/dir", true, Value::from(true));
        outbox.error("pico-cs/loco/br01/dir/set", "boom");
        drop(outbox);
        publisher.close();

        assert!(bus.published().is_empty());
    }

    #[test]
    fn test_detached_outbox() {
        let (outbox, events, errors) = Outbox::detached(2);
        outbox.publish("a/b", false, Value::Null);
        outbox.error("a/b/c", "bad");

        assert_eq!(events.try_recv().unwrap().topic, "a/b");
        assert_eq!(errors.try_recv().unwrap().error, "bad");
    }
}
