//! Gateway facade
//!
//! Owns the registries, the dispatcher, the publisher and one worker per
//! command station, and wires them together:
//!
//! 1. [`Gateway::add_controller`] starts a station worker and subscribes the
//!    station topics.
//! 2. [`Gateway::add_entity`] decides the role of every station for a loco and
//!    subscribes the matching handlers.
//! 3. [`Gateway::listen`] subscribes the topic root on the broker. Retained
//!    messages replayed by the broker then initialize the stations.
//! 4. [`Gateway::close`] shuts everything down in dependency order.

use std::collections::BTreeMap;
use std::sync::Arc;

use cs_client::CommandStation;
use mqtt_bus::BusClient;
use parking_lot::RwLock;
use serde::Serialize;

use crate::action::{Handler, Property};
use crate::config::{ControllerConfig, EntityConfig, FilterConfig, GatewayConfig};
use crate::controller::Controller;
use crate::dispatcher::Dispatcher;
use crate::entity::Entity;
use crate::error::{GatewayError, Result};
use crate::ownership::Role;
use crate::publisher::Publisher;
use crate::registry::Registries;
use crate::topic::{
    Topic, CLASS_CS, CLASS_LOCO, PROPERTY_DIR, PROPERTY_ENABLED, PROPERTY_SPEED, PROPERTY_TEMP,
};

/// The routing core between the broker and the command stations
pub struct Gateway {
    config: GatewayConfig,
    bus: Arc<dyn BusClient>,
    registries: Arc<RwLock<Registries>>,
    dispatcher: Option<Arc<Dispatcher>>,
    publisher: Publisher,
    controllers: BTreeMap<String, Controller>,
    entities: BTreeMap<String, Entity>,
    listening: bool,
    closed: bool,
}

impl Gateway {
    /// Create a gateway publishing to `bus`. Nothing is subscribed until
    /// [`Gateway::listen`].
    pub fn new(config: GatewayConfig, bus: Arc<dyn BusClient>) -> Result<Self> {
        config.validate()?;

        let publisher = Publisher::start(
            Arc::clone(&bus),
            config.error_topic(),
            config.qos,
            config.queue_size,
        )?;
        let outbox = publisher.outbox().ok_or(GatewayError::Closed)?;
        let registries = Arc::new(RwLock::new(Registries::default()));
        let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&registries), outbox));

        Ok(Self {
            config,
            bus,
            registries,
            dispatcher: Some(dispatcher),
            publisher,
            controllers: BTreeMap::new(),
            entities: BTreeMap::new(),
            listening: false,
            closed: false,
        })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn is_listening(&self) -> bool {
        self.listening
    }

    /// Register a command station and start its worker.
    ///
    /// Locos added earlier are registered with the new station right away.
    pub fn add_controller(
        &mut self,
        config: ControllerConfig,
        station: Box<dyn CommandStation>,
    ) -> Result<()> {
        if self.closed {
            return Err(GatewayError::Closed);
        }
        if self.controllers.contains_key(&config.name) {
            return Err(GatewayError::DuplicateController(config.name));
        }

        let outbox = self.publisher.outbox().ok_or(GatewayError::Closed)?;
        let name = config.name.clone();
        let mut controller = Controller::start(
            config,
            station,
            &self.config.topic_root,
            self.config.queue_size,
            outbox,
        )?;
        tracing::info!(
            "Register command station {} ({})",
            name,
            controller
                .config()
                .transport()
                .map(|t| t.to_string())
                .unwrap_or_default()
        );

        subscribe_station(&self.config.topic_root, &self.registries, &mut controller)?;
        let controller = self.controllers.entry(name).or_insert(controller);

        for entity in self.entities.values() {
            register_entity(&self.config.topic_root, &self.registries, controller, entity)?;
        }
        Ok(())
    }

    /// Register a loco with every known command station.
    ///
    /// Returns the stations that took a role. An ownership conflict aborts
    /// the registration; stations registered before the conflict keep
    /// their role until [`Gateway::close`].
    pub fn add_entity(&mut self, config: &EntityConfig) -> Result<Vec<(String, Role)>> {
        if self.closed {
            return Err(GatewayError::Closed);
        }
        if self.entities.contains_key(&config.name) {
            return Err(GatewayError::DuplicateEntity(config.name.clone()));
        }

        let entity = Entity::from_config(config)?;
        let entity = self.entities.entry(config.name.clone()).or_insert(entity);

        let mut roles = Vec::new();
        for controller in self.controllers.values_mut() {
            if let Some(role) =
                register_entity(&self.config.topic_root, &self.registries, controller, entity)?
            {
                roles.push((controller.name().to_string(), role));
            }
        }

        if !roles.iter().any(|(_, role)| *role == Role::Primary) {
            tracing::warn!("Loco {} has no primary command station", entity.name());
        }
        Ok(roles)
    }

    /// Subscribe the topic root on the broker and start dispatching.
    pub fn listen(&mut self) -> Result<()> {
        if self.closed {
            return Err(GatewayError::Closed);
        }
        if self.listening {
            return Err(GatewayError::AlreadyListening);
        }
        let dispatcher = self.dispatcher.as_ref().ok_or(GatewayError::Closed)?;

        let filter = self.config.listen_filter();
        self.bus
            .listen(&filter, self.config.qos, dispatcher.inbound_handler())?;
        self.listening = true;
        tracing::info!("Listening on {}", filter);
        Ok(())
    }

    /// Shut down in dependency order.
    ///
    /// Stops listening, drops the dispatcher, removes each station's
    /// subscriptions and waits for its worker to drain the commands already
    /// queued, then drains the outbound queues and disconnects the bus.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        tracing::info!("Shutdown gateway...");

        if self.listening {
            self.listening = false;
            if let Err(e) = self.bus.unsubscribe(&self.config.listen_filter()) {
                tracing::warn!("Failed to unsubscribe {}: {}", self.config.listen_filter(), e);
            }
        }
        self.dispatcher = None;

        for controller in self.controllers.values_mut() {
            unregister_controller(&self.registries, controller);
            controller.shutdown();
        }
        self.controllers.clear();

        self.publisher.close();

        tracing::info!("Disconnect from broker");
        self.bus.disconnect()?;
        Ok(())
    }

    /// Current stations, locos and roles.
    pub fn snapshot(&self) -> GatewaySnapshot {
        let registries = self.registries.read();

        let controllers = self
            .controllers
            .values()
            .map(|controller| {
                let roles = registries.ownership.roles_of(controller.name());
                let select = |wanted: Role| -> Vec<String> {
                    roles
                        .iter()
                        .filter(|(_, role)| *role == wanted)
                        .map(|(entity, _)| entity.clone())
                        .collect()
                };
                let config = controller.config();
                ControllerInfo {
                    name: config.name.clone(),
                    transport: config.transport().map(|t| t.to_string()).unwrap_or_default(),
                    primary_filter: config.primary.clone(),
                    secondary_filter: config.secondary.clone(),
                    primaries: select(Role::Primary),
                    secondaries: select(Role::Secondary),
                    ios: config.ios.iter().map(|(io, desc)| (io.clone(), desc.gpio)).collect(),
                }
            })
            .collect();

        let entities = self
            .entities
            .values()
            .map(|entity| {
                let ownership = registries.ownership.get(entity.name());
                EntityInfo {
                    name: entity.name().to_string(),
                    addr: entity.addr(),
                    functions: entity
                        .functions()
                        .map(|(name, no)| (name.to_string(), no))
                        .collect(),
                    primary: ownership.and_then(|o| o.primary()).map(str::to_string),
                    secondaries: ownership
                        .map(|o| o.secondaries().map(str::to_string).collect())
                        .unwrap_or_default(),
                }
            })
            .collect();

        GatewaySnapshot {
            topic_root: self.config.topic_root.clone(),
            controllers,
            entities,
        }
    }
}

impl Drop for Gateway {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!("Failed to close gateway: {}", e);
        }
    }
}

/// Read-only view of the gateway state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GatewaySnapshot {
    pub topic_root: String,
    pub controllers: Vec<ControllerInfo>,
    pub entities: Vec<EntityInfo>,
}

impl GatewaySnapshot {
    pub fn controller(&self, name: &str) -> Option<&ControllerInfo> {
        self.controllers.iter().find(|c| c.name == name)
    }

    pub fn entity(&self, name: &str) -> Option<&EntityInfo> {
        self.entities.iter().find(|e| e.name == name)
    }
}

/// A command station as shown by the snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControllerInfo {
    pub name: String,
    pub transport: String,
    pub primary_filter: FilterConfig,
    pub secondary_filter: FilterConfig,
    /// Locos this station is primary for
    pub primaries: Vec<String>,
    /// Locos this station mirrors
    pub secondaries: Vec<String>,
    /// GPIO of every configured IO
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub ios: BTreeMap<String, u8>,
}

/// A loco as shown by the snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityInfo {
    pub name: String,
    pub addr: u16,
    pub functions: BTreeMap<String, u8>,
    pub primary: Option<String>,
    pub secondaries: Vec<String>,
}

fn subscribe_station(
    root: &str,
    registries: &RwLock<Registries>,
    controller: &mut Controller,
) -> Result<()> {
    let mut routes = Vec::new();
    for (level, property) in [
        (PROPERTY_ENABLED, Property::Enabled),
        (PROPERTY_TEMP, Property::Temperature),
    ] {
        for handler in Handler::actions(property) {
            let topic = Topic::action(root, CLASS_CS, controller.name(), level, handler.command)?;
            routes.push((topic, handler));
        }
    }

    let queue = controller.queue().ok_or(GatewayError::Closed)?;
    let ids = {
        let mut registries = registries.write();
        routes
            .iter()
            .map(|(topic, handler)| {
                registries
                    .subscriptions
                    .subscribe(controller.name(), topic, *handler, queue.clone())
            })
            .collect()
    };
    controller.track_station(ids);
    Ok(())
}

/// Loco properties and their topic level names.
fn loco_properties(entity: &Entity) -> Vec<(String, Property)> {
    let addr = entity.addr();
    let mut properties = vec![
        (PROPERTY_DIR.to_string(), Property::LocoDir { addr }),
        (PROPERTY_SPEED.to_string(), Property::LocoSpeed { addr }),
    ];
    properties.extend(
        entity
            .functions()
            .map(|(name, no)| (name.to_string(), Property::LocoFunction { addr, no })),
    );
    properties
}

/// Assign the role of `controller` for `entity` and subscribe its handlers.
fn register_entity(
    root: &str,
    registries: &RwLock<Registries>,
    controller: &mut Controller,
    entity: &Entity,
) -> Result<Option<Role>> {
    let name = entity.name();
    let mut actions = Vec::new();
    let mut listeners = Vec::new();
    for (level, property) in loco_properties(entity) {
        for handler in Handler::actions(property) {
            actions.push((Topic::action(root, CLASS_LOCO, name, &level, handler.command)?, handler));
        }
        if let Some(handler) = Handler::listener(property) {
            listeners.push((Topic::event(root, CLASS_LOCO, name, &level)?, handler));
        }
    }

    let queue = controller.queue().ok_or(GatewayError::Closed)?;
    let primary_match = controller.is_primary_for(name);
    let secondary_match = controller.is_secondary_for(name);

    let (role, ids) = {
        let mut registries = registries.write();
        let Some(role) = registries
            .ownership
            .assign(controller.name(), name, primary_match, secondary_match)?
        else {
            return Ok(None);
        };
        let routes = match role {
            Role::Primary => actions,
            Role::Secondary => listeners,
        };
        let ids: Vec<_> = routes
            .into_iter()
            .map(|(topic, handler)| {
                registries
                    .subscriptions
                    .subscribe(controller.name(), &topic, handler, queue.clone())
            })
            .collect();
        (role, ids)
    };

    tracing::info!(
        "Subscribe loco {} to command station {} as {}",
        name,
        controller.name(),
        role
    );
    controller.track_entity(name, ids);
    Ok(Some(role))
}

/// Remove every subscription and role of `controller`.
fn unregister_controller(registries: &RwLock<Registries>, controller: &mut Controller) {
    let (station_ids, entity_ids) = controller.take_subscriptions();
    let mut registries = registries.write();
    for id in station_ids {
        registries.subscriptions.unsubscribe(id);
    }
    for (entity, ids) in entity_ids {
        for id in ids {
            registries.subscriptions.unsubscribe(id);
        }
        registries.ownership.release(controller.name(), &entity);
    }
}
