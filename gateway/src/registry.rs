//! Subscription registry
//!
//! Maps a topic without its root to the routes interested in it. A route
//! names its owner, the handler to run and the queue of the command station
//! that runs it.

use std::collections::HashMap;
use std::fmt;

use crossbeam::channel::Sender;

use crate::action::Handler;
use crate::controller::CommandMessage;
use crate::ownership::OwnershipRegistry;
use crate::topic::Topic;

/// Opaque handle of a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// One subscriber of a topic
#[derive(Debug, Clone)]
pub struct Route {
    pub id: SubscriptionId,
    pub owner: String,
    pub handler: Handler,
    pub queue: Sender<CommandMessage>,
}

/// Routes keyed by topic without root
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    routes: HashMap<String, Vec<Route>>,
    keys: HashMap<SubscriptionId, String>,
    next_id: u64,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a route for `topic`.
    pub fn subscribe(
        &mut self,
        owner: &str,
        topic: &Topic,
        handler: Handler,
        queue: Sender<CommandMessage>,
    ) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        let key = topic.without_root();

        self.routes.entry(key.clone()).or_default().push(Route {
            id,
            owner: owner.to_string(),
            handler,
            queue,
        });
        self.keys.insert(id, key);
        id
    }

    /// Remove a single route. Order of the remaining routes is not kept.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let Some(key) = self.keys.remove(&id) else {
            return false;
        };
        self.remove_where(&key, |route| route.id == id)
    }

    /// Remove the first route of `owner` for `topic`.
    pub fn unsubscribe_owner(&mut self, owner: &str, topic: &Topic) -> bool {
        let key = topic.without_root();
        let Some(index) = self
            .routes
            .get(&key)
            .and_then(|routes| routes.iter().position(|route| route.owner == owner))
        else {
            return false;
        };
        let id = self.routes[&key][index].id;
        self.keys.remove(&id);
        self.remove_where(&key, |route| route.id == id)
    }

    /// Routes for a topic without root. Absence is not an error.
    pub fn lookup(&self, key: &str) -> &[Route] {
        self.routes.get(key).map_or(&[], Vec::as_slice)
    }

    /// Number of live subscriptions.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    fn remove_where(&mut self, key: &str, pred: impl Fn(&Route) -> bool) -> bool {
        let Some(routes) = self.routes.get_mut(key) else {
            return false;
        };
        let Some(index) = routes.iter().position(pred) else {
            return false;
        };
        routes.swap_remove(index);
        if routes.is_empty() {
            self.routes.remove(key);
        }
        true
    }
}

/// Subscription and ownership state, guarded by one lock
#[derive(Debug, Default)]
pub struct Registries {
    pub subscriptions: SubscriptionRegistry,
    pub ownership: OwnershipRegistry,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Property;
    use crate::topic::Command;
    use crossbeam::channel::bounded;

    fn handler() -> Handler {
        Handler {
            property: Property::LocoSpeed { addr: 3 },
            command: Command::Set,
            reply: true,
        }
    }

    fn speed_set() -> Topic {
        Topic::parse("pico-cs/loco/br01/speed/set").unwrap()
    }

    #[test]
    fn test_subscribe_and_lookup() {
        let (tx, _rx) = bounded(1);
        let mut registry = SubscriptionRegistry::new();

        let id = registry.subscribe("cs01", &speed_set(), handler(), tx);

        let routes = registry.lookup("loco/br01/speed/set");
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].id, id);
        assert_eq!(routes[0].owner, "cs01");
        assert!(registry.lookup("loco/unknown/speed/set").is_empty());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_roots_share_keys() {
        let (tx, _rx) = bounded(1);
        let mut registry = SubscriptionRegistry::new();
        registry.subscribe("cs01", &speed_set(), handler(), tx);

        let other_root = Topic::parse("layout/loco/br01/speed/set").unwrap();
        assert_eq!(registry.lookup(&other_root.without_root()).len(), 1);
    }

    #[test]
    fn test_unsubscribe_by_id() {
        let (tx, _rx) = bounded(1);
        let mut registry = SubscriptionRegistry::new();
        let first = registry.subscribe("cs01", &speed_set(), handler(), tx.clone());
        let second = registry.subscribe("cs02", &speed_set(), handler(), tx.clone());
        let third = registry.subscribe("cs03", &speed_set(), handler(), tx);

        assert!(registry.unsubscribe(first));
        assert!(!registry.unsubscribe(first));

        let mut remaining: Vec<SubscriptionId> =
            registry.lookup("loco/br01/speed/set").iter().map(|r| r.id).collect();
        remaining.sort();
        assert_eq!(remaining, vec![second, third]);

        assert!(registry.unsubscribe(second));
        assert!(registry.unsubscribe(third));
        assert!(registry.is_empty());
        assert!(registry.lookup("loco/br01/speed/set").is_empty());
    }

    #[test]
    fn test_unsubscribe_owner() {
        let (tx, _rx) = bounded(1);
        let mut registry = SubscriptionRegistry::new();
        registry.subscribe("cs01", &speed_set(), handler(), tx.clone());
        let kept = registry.subscribe("cs02", &speed_set(), handler(), tx);

        assert!(registry.unsubscribe_owner("cs01", &speed_set()));
        assert!(!registry.unsubscribe_owner("cs01", &speed_set()));

        let routes = registry.lookup("loco/br01/speed/set");
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].id, kept);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_subscription_id_display() {
        let (tx, _rx) = bounded(1);
        let mut registry = SubscriptionRegistry::new();
        let id = registry.subscribe("cs01", &speed_set(), handler(), tx);
        assert_eq!(id.to_string(), format!("sub-{}", id.as_u64()));
    }
}
