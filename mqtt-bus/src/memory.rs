//! In-process bus
//!
//! Behaves like a single-client broker: it keeps retained messages, replays
//! them when a filter is listened and, with echo enabled, delivers the
//! client's own publications back to it.
//!
//! Echoed publications are handed to a delivery thread over an unbounded
//! queue, so `publish` never waits for a listener. A broker decouples the
//! publishing client from the subscribers the same way.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{unbounded, Sender};
use parking_lot::Mutex;

use crate::error::{BusError, Result};
use crate::filter::topic_matches;
use crate::{BusClient, InboundHandler, InboundMessage, QoS};

/// A message written to a [`MemoryBus`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    pub topic: String,
    pub payload: Vec<u8>,
    pub retain: bool,
    pub qos: QoS,
}

impl Published {
    pub fn payload_str(&self) -> &str {
        std::str::from_utf8(&self.payload).unwrap_or("<binary>")
    }
}

#[derive(Default)]
struct MemoryState {
    listeners: Vec<(String, InboundHandler)>,
    published: Vec<Published>,
    retained: BTreeMap<String, Vec<u8>>,
    fail_publish: bool,
    disconnected: bool,
}

/// Bus implementation living entirely in memory
#[derive(Default)]
pub struct MemoryBus {
    state: Arc<Mutex<MemoryState>>,
    echo: Mutex<Option<Sender<InboundMessage>>>,
    delivery: Mutex<Option<JoinHandle<()>>>,
}

impl MemoryBus {
    /// Bus that only records publications
    pub fn new() -> Self {
        Self::default()
    }

    /// Bus that also delivers publications to matching listeners
    pub fn with_echo() -> Self {
        let state = Arc::new(Mutex::new(MemoryState::default()));
        let (tx, rx) = unbounded::<InboundMessage>();

        let delivery_state = Arc::clone(&state);
        let delivery = thread::Builder::new()
            .name("memory-bus-echo".to_string())
            .spawn(move || {
                for msg in rx {
                    deliver(&delivery_state, msg);
                }
            });
        let delivery = match delivery {
            Ok(handle) => Some(handle),
            Err(e) => {
                tracing::warn!("Failed to start echo delivery, echo disabled: {}", e);
                None
            }
        };

        Self {
            state,
            echo: Mutex::new(delivery.as_ref().map(|_| tx)),
            delivery: Mutex::new(delivery),
        }
    }

    /// Deliver a message as if another client had published it
    ///
    /// Runs the listeners on the calling thread. Returns `false` when no
    /// listener matched.
    pub fn inject(&self, topic: &str, payload: impl Into<Vec<u8>>, retained: bool) -> bool {
        deliver(
            &self.state,
            InboundMessage {
                topic: topic.to_string(),
                payload: payload.into(),
                retained,
            },
        )
    }

    /// Everything published so far, oldest first
    pub fn published(&self) -> Vec<Published> {
        self.state.lock().published.clone()
    }

    /// Publications to `topic`, oldest first
    pub fn published_to(&self, topic: &str) -> Vec<Published> {
        self.state
            .lock()
            .published
            .iter()
            .filter(|p| p.topic == topic)
            .cloned()
            .collect()
    }

    /// Current retained payload of `topic`
    pub fn retained(&self, topic: &str) -> Option<Vec<u8>> {
        self.state.lock().retained.get(topic).cloned()
    }

    /// Make publishes fail until reset
    pub fn fail_publishes(&self, fail: bool) {
        self.state.lock().fail_publish = fail;
    }

    pub fn listened(&self) -> Vec<String> {
        self.state.lock().listeners.iter().map(|(f, _)| f.clone()).collect()
    }

    pub fn is_disconnected(&self) -> bool {
        self.state.lock().disconnected
    }
}

/// Run every listener matching `msg.topic`, without holding the state lock.
fn deliver(state: &Mutex<MemoryState>, msg: InboundMessage) -> bool {
    let handlers: Vec<InboundHandler> = {
        let state = state.lock();
        if state.disconnected {
            return false;
        }
        state
            .listeners
            .iter()
            .filter(|(filter, _)| topic_matches(filter, &msg.topic))
            .map(|(_, handler)| InboundHandler::clone(handler))
            .collect()
    };
    for handler in &handlers {
        handler(msg.clone());
    }
    !handlers.is_empty()
}

impl BusClient for MemoryBus {
    fn listen(&self, filter: &str, _qos: QoS, handler: InboundHandler) -> Result<()> {
        let replay: Vec<(String, Vec<u8>)> = {
            let mut state = self.state.lock();
            if state.disconnected {
                return Err(BusError::Disconnected);
            }
            state.listeners.push((filter.to_string(), InboundHandler::clone(&handler)));
            state
                .retained
                .iter()
                .filter(|(topic, _)| topic_matches(filter, topic))
                .map(|(topic, payload)| (topic.clone(), payload.clone()))
                .collect()
        };

        for (topic, payload) in replay {
            handler(InboundMessage {
                topic,
                payload,
                retained: true,
            });
        }
        Ok(())
    }

    fn unsubscribe(&self, filter: &str) -> Result<()> {
        let mut state = self.state.lock();
        if state.disconnected {
            return Err(BusError::Disconnected);
        }
        state.listeners.retain(|(f, _)| f != filter);
        Ok(())
    }

    fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool, qos: QoS) -> Result<()> {
        {
            let mut state = self.state.lock();
            if state.disconnected {
                return Err(BusError::Disconnected);
            }
            if state.fail_publish {
                return Err(BusError::Publish {
                    topic: topic.to_string(),
                    reason: "publishing disabled".to_string(),
                });
            }
            if retain {
                if payload.is_empty() {
                    state.retained.remove(topic);
                } else {
                    state.retained.insert(topic.to_string(), payload.clone());
                }
            }
            state.published.push(Published {
                topic: topic.to_string(),
                payload: payload.clone(),
                retain,
                qos,
            });
        }

        if let Some(echo) = self.echo.lock().as_ref() {
            // live forwarding never carries the retain flag
            let _ = echo.send(InboundMessage {
                topic: topic.to_string(),
                payload,
                retained: false,
            });
        }
        Ok(())
    }

    fn disconnect(&self) -> Result<()> {
        {
            let mut state = self.state.lock();
            if state.disconnected {
                return Err(BusError::Disconnected);
            }
            state.disconnected = true;
            state.listeners.clear();
        }
        // the delivery thread ends once the queue is drained
        self.echo.lock().take();
        Ok(())
    }
}

impl Drop for MemoryBus {
    fn drop(&mut self) {
        self.echo.lock().take();
        if let Some(delivery) = self.delivery.lock().take() {
            if delivery.thread().id() != thread::current().id() && delivery.join().is_err() {
                tracing::warn!("Echo delivery thread panicked");
            }
        }
    }
}
