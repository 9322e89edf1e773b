//! Broker-like behaviour of the in-memory bus as seen through `BusClient`.

use std::sync::{Arc, Mutex};

use mqtt_bus::{topic_matches, BusClient, InboundHandler, InboundMessage, MemoryBus, QoS};
use proptest::prelude::*;

fn recording_listener(bus: &dyn BusClient, filter: &str) -> Arc<Mutex<Vec<InboundMessage>>> {
    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&received);
    let handler: InboundHandler = Arc::new(move |msg| sink.lock().unwrap().push(msg));
    bus.listen(filter, QoS::AtLeastOnce, handler).unwrap();
    received
}

#[test]
fn test_unsubscribe_stops_delivery() {
    let bus = MemoryBus::new();
    let received = recording_listener(&bus, "pico-cs/#");

    bus.inject("pico-cs/cs/cs01/enabled/get", "null", false);
    bus.unsubscribe("pico-cs/#").unwrap();
    bus.inject("pico-cs/cs/cs01/enabled/get", "null", false);

    assert_eq!(received.lock().unwrap().len(), 1);
    assert!(bus.listened().is_empty());
}

#[test]
fn test_latest_retained_value_wins() {
    let bus = MemoryBus::new();
    for speed in ["10", "20", "30"] {
        bus.publish("pico-cs/loco/br01/speed", speed.as_bytes().to_vec(), true, QoS::AtLeastOnce)
            .unwrap();
    }

    let received = recording_listener(&bus, "pico-cs/loco/+/speed");
    let received = received.lock().unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].payload, b"30".to_vec());
}

proptest! {
    #[test]
    fn prop_multi_level_wildcard_matches_every_subtopic(
        levels in proptest::collection::vec("[a-z0-9]{1,6}", 0..5)
    ) {
        let mut topic = String::from("pico-cs");
        for level in &levels {
            topic.push('/');
            topic.push_str(level);
        }
        prop_assert!(topic_matches("pico-cs/#", &topic));
        prop_assert!(topic_matches(&topic, &topic));
    }
}
