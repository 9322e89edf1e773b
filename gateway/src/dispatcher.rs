//! Inbound message dispatch
//!
//! Decodes every message delivered by the bus, looks up its routes and
//! queues one command per route on the owning station's queue.

use std::sync::{Arc, Weak};

use mqtt_bus::{InboundHandler, InboundMessage};
use parking_lot::RwLock;

use crate::controller::CommandMessage;
use crate::payload::Value;
use crate::publisher::Outbox;
use crate::registry::{Registries, Route};
use crate::topic::Topic;

/// What happened to an inbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Queued for this many routes
    Routed(usize),
    /// No route for the topic
    Unrouted,
    /// Retained replay of a command that must not run twice, dropped
    /// before any route lookup
    Skipped,
    /// Topic or payload could not be decoded, an error was reported
    Rejected,
}

pub struct Dispatcher {
    registries: Arc<RwLock<Registries>>,
    outbox: Outbox,
}

impl Dispatcher {
    pub fn new(registries: Arc<RwLock<Registries>>, outbox: Outbox) -> Self {
        Self { registries, outbox }
    }

    /// Bus callback forwarding to this dispatcher while it is alive.
    pub fn inbound_handler(self: &Arc<Self>) -> InboundHandler {
        let dispatcher: Weak<Self> = Arc::downgrade(self);
        Arc::new(move |msg: InboundMessage| {
            if let Some(dispatcher) = dispatcher.upgrade() {
                dispatcher.dispatch(&msg);
            }
        })
    }

    pub fn dispatch(&self, msg: &InboundMessage) -> Dispatch {
        let topic = match Topic::parse(&msg.topic) {
            Ok(topic) => topic,
            Err(e) => {
                self.outbox.error(msg.topic.as_str(), e);
                return Dispatch::Rejected;
            }
        };

        let value = match Value::decode(&msg.payload) {
            Ok(value) => value,
            Err(e) => {
                self.outbox.error(msg.topic.as_str(), e);
                return Dispatch::Rejected;
            }
        };

        tracing::trace!(
            "Receive topic {} retained {} value {:?}",
            msg.topic,
            msg.retained,
            value
        );

        if msg.retained && topic.command().is_some_and(|command| !command.is_idempotent()) {
            tracing::debug!("Skip retained non-idempotent command {}", msg.topic);
            return Dispatch::Skipped;
        }

        // clone the routes so no lock is held while a full queue blocks
        let routes: Vec<Route> = self
            .registries
            .read()
            .subscriptions
            .lookup(&topic.without_root())
            .to_vec();
        if routes.is_empty() {
            return Dispatch::Unrouted;
        }

        let count = routes.len();
        for route in routes {
            let command = CommandMessage {
                topic: topic.clone(),
                handler: route.handler,
                value: value.clone(),
            };
            if route.queue.send(command).is_err() {
                tracing::debug!("Command station {} stopped, dropping {}", route.owner, msg.topic);
            }
        }
        Dispatch::Routed(count)
    }
}
