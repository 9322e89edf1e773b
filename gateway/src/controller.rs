//! Command station workers
//!
//! Every command station is owned by one worker thread, the only code that
//! talks to its connection. Commands reach the worker through a bounded queue
//! and are executed strictly in arrival order.
//!
//! Input changes a station pushes on its own bypass the worker: they are
//! published as retained events on `<root>/cs/<station>/<io>` straight from
//! the push handler.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{bounded, Receiver, Sender};
use cs_client::{CommandStation, PushEvent, PushHandler};

use crate::action::Handler;
use crate::config::ControllerConfig;
use crate::error::{GatewayError, Result};
use crate::filter::NameFilter;
use crate::payload::Value;
use crate::publisher::Outbox;
use crate::registry::SubscriptionId;
use crate::topic::{Topic, CLASS_CS};

/// A command queued for a station
#[derive(Debug, Clone, PartialEq)]
pub struct CommandMessage {
    /// Full inbound topic, including root and command
    pub topic: Topic,
    pub handler: Handler,
    pub value: Value,
}

/// A registered command station and its worker
pub struct Controller {
    config: ControllerConfig,
    primary: NameFilter,
    secondary: NameFilter,
    queue: Option<Sender<CommandMessage>>,
    worker: Option<JoinHandle<()>>,
    /// Own station subscriptions, the loco ones are tracked per loco
    station_subscriptions: Vec<SubscriptionId>,
    entity_subscriptions: Vec<(String, Vec<SubscriptionId>)>,
}

impl Controller {
    /// Compile the filters, hook up pushed IO changes and start the worker
    /// owning `station`.
    pub fn start(
        config: ControllerConfig,
        mut station: Box<dyn CommandStation>,
        topic_root: &str,
        queue_size: usize,
        outbox: Outbox,
    ) -> Result<Self> {
        config.validate()?;
        let primary = NameFilter::compile(&config.primary)?;
        let secondary = NameFilter::compile(&config.secondary)?;
        station.set_push_handler(push_handler(topic_root, &config, outbox.clone())?);

        let (tx, rx) = bounded(queue_size);
        let name = config.name.clone();
        let worker = thread::Builder::new()
            .name(format!("cs-{name}"))
            .spawn(move || run_worker(&name, station, rx, outbox))
            .map_err(|e| GatewayError::Worker(e.to_string()))?;

        Ok(Self {
            config,
            primary,
            secondary,
            queue: Some(tx),
            worker: Some(worker),
            station_subscriptions: Vec::new(),
            entity_subscriptions: Vec::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn is_primary_for(&self, entity: &str) -> bool {
        self.primary.includes(entity)
    }

    pub fn is_secondary_for(&self, entity: &str) -> bool {
        self.secondary.includes(entity)
    }

    /// Sender for new subscriptions, `None` once shut down.
    pub fn queue(&self) -> Option<Sender<CommandMessage>> {
        self.queue.clone()
    }

    pub(crate) fn track_station(&mut self, ids: Vec<SubscriptionId>) {
        self.station_subscriptions.extend(ids);
    }

    pub(crate) fn track_entity(&mut self, entity: &str, ids: Vec<SubscriptionId>) {
        self.entity_subscriptions.push((entity.to_string(), ids));
    }

    /// Hand out every tracked subscription, grouped by loco.
    pub(crate) fn take_subscriptions(
        &mut self,
    ) -> (Vec<SubscriptionId>, Vec<(String, Vec<SubscriptionId>)>) {
        (
            std::mem::take(&mut self.station_subscriptions),
            std::mem::take(&mut self.entity_subscriptions),
        )
    }

    /// Drop the own queue sender and wait for the worker.
    ///
    /// The worker drains every command already queued, then closes the
    /// station. Subscriptions hold senders too and must be removed first.
    pub fn shutdown(&mut self) {
        self.queue = None;
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::error!("Worker of command station {} panicked", self.config.name);
            }
        }
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Handler publishing IO changes of the station described by `config`.
///
/// A GPIO may back several IOs; each of them gets the event. Read errors
/// are reported against the station topic.
fn push_handler(topic_root: &str, config: &ControllerConfig, outbox: Outbox) -> Result<PushHandler> {
    let station_topic = format!("{topic_root}/{CLASS_CS}/{}", config.name);
    let ios = config
        .ios
        .iter()
        .map(|(io, desc)| -> Result<(u8, String)> {
            let topic = Topic::event(topic_root, CLASS_CS, &config.name, io)?;
            Ok((desc.gpio, topic.to_string()))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Arc::new(move |msg: cs_client::Result<PushEvent>| match msg {
        Ok(PushEvent::Io { gpio, state }) => {
            let mut matched = false;
            for (_, topic) in ios.iter().filter(|(g, _)| *g == gpio) {
                outbox.publish(topic.clone(), true, Value::Bool(state));
                matched = true;
            }
            if !matched {
                tracing::debug!("No io configured for gpio {} on {}", gpio, station_topic);
            }
        }
        Err(e) => {
            tracing::warn!("Push from {} failed: {}", station_topic, e);
            outbox.error(station_topic.clone(), e);
        }
    }))
}

fn run_worker(
    name: &str,
    mut station: Box<dyn CommandStation>,
    queue: Receiver<CommandMessage>,
    outbox: Outbox,
) {
    tracing::info!("Command station {} worker started", name);

    for msg in queue {
        match msg.handler.invoke(station.as_mut(), &msg.value) {
            Ok(Some(value)) => outbox.publish(msg.topic.without_command().to_string(), true, value),
            Ok(None) => {}
            Err(e) => {
                tracing::debug!("Command {} on {} failed: {}", msg.topic, name, e);
                outbox.error(msg.topic.to_string(), e);
            }
        }
    }

    tracing::info!("Close command station {}", name);
    if let Err(e) = station.close() {
        tracing::warn!("Failed to close command station {}: {}", name, e);
    }
}
