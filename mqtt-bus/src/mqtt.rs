//! `rumqttc` backed broker connection

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{unbounded, Receiver};
use parking_lot::{Mutex, RwLock};
use rumqttc::{Client, ConnectReturnCode, Connection, Event, MqttOptions, Packet};

use crate::config::MqttConfig;
use crate::error::{BusError, Result};
use crate::{BusClient, InboundHandler, InboundMessage, QoS};

/// State shared between the bus handle and its connection thread
#[derive(Default)]
struct Shared {
    handler: RwLock<Option<InboundHandler>>,
    /// Filters to restore on every new (clean) session
    listened: Mutex<Vec<(String, QoS)>>,
    closing: AtomicBool,
}

impl Shared {
    fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }
}

/// Broker connection using the blocking `rumqttc` client
///
/// The session is clean and carries no persistent client state: receiving
/// the broker's retained messages after (re)subscribing is what brings the
/// gateway back in sync.
pub struct MqttBus {
    client: Client,
    address: String,
    shared: Arc<Shared>,
    connection: Mutex<Option<JoinHandle<()>>>,
}

impl MqttBus {
    /// Connect to the broker and wait for its acknowledgement
    pub fn connect(config: &MqttConfig) -> Result<Self> {
        config.validate()?;

        let address = config.address();
        let mut options = MqttOptions::new(config.client_id(), config.host.clone(), config.port);
        options.set_keep_alive(config.keep_alive);
        options.set_clean_session(true);
        if let Some(username) = &config.username {
            options.set_credentials(username.clone(), config.password.clone().unwrap_or_default());
        }

        let (client, connection) = Client::new(options, config.request_capacity);
        let shared = Arc::new(Shared::default());
        let (ready_tx, ready_rx) = mpsc::channel();

        let handle = thread::Builder::new()
            .name("mqtt-connection".to_string())
            .spawn({
                let client = client.clone();
                let shared = Arc::clone(&shared);
                let address = address.clone();
                let reconnect_delay = config.reconnect_delay;
                move || run_connection(connection, client, shared, address, reconnect_delay, ready_tx)
            })
            .map_err(|e| BusError::Connection(e.to_string()))?;

        let bus = Self {
            client,
            address,
            shared,
            connection: Mutex::new(Some(handle)),
        };

        match ready_rx.recv_timeout(config.connect_timeout) {
            Ok(Ok(())) => {
                tracing::info!("Connected to broker {}", bus.address);
                Ok(bus)
            }
            Ok(Err(e)) => {
                bus.shared.closing.store(true, Ordering::SeqCst);
                Err(e)
            }
            Err(_) => {
                bus.shared.closing.store(true, Ordering::SeqCst);
                Err(BusError::Connection(format!(
                    "No acknowledgement from broker {} within {:?}",
                    bus.address, config.connect_timeout
                )))
            }
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }
}

/// Delivery thread: runs the inbound handler for every received publish
///
/// Ends when the connection thread drops its sender.
fn run_delivery(inbound: Receiver<InboundMessage>, shared: Arc<Shared>) {
    for msg in inbound {
        let handler = shared.handler.read().clone();
        if let Some(handler) = handler {
            handler(msg);
        }
    }
}

/// Connection thread: polls the event loop until the bus is closed
///
/// Inbound publishes go to the delivery thread over an unbounded queue. The
/// handler may block on a full station queue, and the event loop has to keep
/// draining our own outgoing publishes meanwhile.
fn run_connection(
    mut connection: Connection,
    client: Client,
    shared: Arc<Shared>,
    address: String,
    reconnect_delay: Duration,
    ready_tx: mpsc::Sender<Result<()>>,
) {
    let mut ready_tx = Some(ready_tx);

    let (inbound_tx, inbound_rx) = unbounded::<InboundMessage>();
    let delivery_shared = Arc::clone(&shared);
    let delivery = thread::Builder::new()
        .name("mqtt-delivery".to_string())
        .spawn(move || run_delivery(inbound_rx, delivery_shared));
    if let Err(e) = delivery {
        let err = BusError::Connection(format!("Failed to start delivery thread: {}", e));
        if let Some(tx) = ready_tx.take() {
            let _ = tx.send(Err(err));
        }
        return;
    }

    for notification in connection.iter() {
        match notification {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if ack.code != ConnectReturnCode::Success {
                    let err = BusError::Connection(format!("Broker {} refused connection: {:?}", address, ack.code));
                    tracing::warn!("{}", err);
                    if let Some(tx) = ready_tx.take() {
                        let _ = tx.send(Err(err));
                    }
                    continue;
                }

                tracing::debug!("Session established with broker {}", address);
                for (filter, qos) in shared.listened.lock().iter() {
                    // try_ variant: the request queue is drained by this very thread
                    if let Err(e) = client.try_subscribe(filter.clone(), (*qos).into()) {
                        tracing::warn!("Failed to restore subscription {}: {}", filter, e);
                    }
                }
                if let Some(tx) = ready_tx.take() {
                    let _ = tx.send(Ok(()));
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let _ = inbound_tx.send(InboundMessage {
                    topic: publish.topic.clone(),
                    payload: publish.payload.to_vec(),
                    retained: publish.retain,
                });
            }
            Ok(_) => {}
            Err(e) => {
                if shared.is_closing() {
                    break;
                }
                tracing::warn!("Connection to broker {} failed: {}", address, e);
                if let Some(tx) = ready_tx.take() {
                    let _ = tx.send(Err(BusError::Connection(e.to_string())));
                    break;
                }
                thread::sleep(reconnect_delay);
            }
        }
    }

    tracing::debug!("Connection thread for broker {} stopped", address);
}

impl BusClient for MqttBus {
    fn listen(&self, filter: &str, qos: QoS, handler: InboundHandler) -> Result<()> {
        if self.shared.is_closing() {
            return Err(BusError::Disconnected);
        }

        *self.shared.handler.write() = Some(handler);
        self.shared.listened.lock().push((filter.to_string(), qos));

        self.client
            .subscribe(filter, qos.into())
            .map_err(|e| BusError::Subscription {
                topic: filter.to_string(),
                reason: e.to_string(),
            })?;

        tracing::info!("Listening to {} on broker {}", filter, self.address);
        Ok(())
    }

    fn unsubscribe(&self, filter: &str) -> Result<()> {
        self.shared.listened.lock().retain(|(f, _)| f != filter);

        self.client
            .unsubscribe(filter)
            .map_err(|e| BusError::Subscription {
                topic: filter.to_string(),
                reason: e.to_string(),
            })
    }

    fn publish(&self, topic: &str, payload: Vec<u8>, retain: bool, qos: QoS) -> Result<()> {
        if self.shared.is_closing() {
            return Err(BusError::Disconnected);
        }

        self.client
            .publish(topic, qos.into(), retain, payload)
            .map_err(|e| BusError::Publish {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }

    fn disconnect(&self) -> Result<()> {
        if self.shared.closing.swap(true, Ordering::SeqCst) {
            return Err(BusError::Disconnected);
        }

        tracing::info!("Disconnecting from broker {}", self.address);
        *self.shared.handler.write() = None;

        let result = self
            .client
            .disconnect()
            .map_err(|e| BusError::Connection(e.to_string()));

        // detached: the thread ends on the next event loop error
        drop(self.connection.lock().take());

        result
    }
}

impl Drop for MqttBus {
    fn drop(&mut self) {
        if !self.shared.is_closing() {
            let _ = self.disconnect();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(topic: &str) -> InboundMessage {
        InboundMessage {
            topic: topic.to_string(),
            payload: b"1".to_vec(),
            retained: false,
        }
    }

    #[test]
    fn test_delivery_keeps_order_and_ends_with_sender() {
        let shared = Arc::new(Shared::default());
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        *shared.handler.write() = Some(Arc::new(move |msg: InboundMessage| sink.lock().push(msg.topic)));

        let (tx, rx) = unbounded();
        let delivery = thread::spawn({
            let shared = Arc::clone(&shared);
            move || run_delivery(rx, shared)
        });
        for topic in ["pico-cs/a", "pico-cs/b", "pico-cs/c"] {
            tx.send(message(topic)).unwrap();
        }
        drop(tx);
        delivery.join().unwrap();

        assert_eq!(*received.lock(), vec!["pico-cs/a", "pico-cs/b", "pico-cs/c"]);
    }

    #[test]
    fn test_blocked_handler_does_not_stall_sender() {
        let shared = Arc::new(Shared::default());
        let (release_tx, release_rx) = unbounded::<()>();
        *shared.handler.write() = Some(Arc::new(move |_msg: InboundMessage| {
            let _ = release_rx.recv();
        }));

        let (tx, rx) = unbounded();
        let delivery = thread::spawn({
            let shared = Arc::clone(&shared);
            move || run_delivery(rx, shared)
        });
        // what the connection thread does while the handler is stuck
        for _ in 0..1000 {
            tx.send(message("pico-cs/loco/br01/speed/set")).unwrap();
        }
        drop(tx);
        for _ in 0..1000 {
            release_tx.send(()).unwrap();
        }
        delivery.join().unwrap();
    }

    #[test]
    fn test_delivery_without_handler_drops_messages() {
        let shared = Arc::new(Shared::default());
        let (tx, rx) = unbounded();
        tx.send(message("pico-cs/a")).unwrap();
        drop(tx);
        run_delivery(rx, shared);
    }
}
