use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use vellum_core::service_bus::{BusMessage, Delivery, ServiceBus, Symbol};

fn collector() -> (Arc<Mutex<Vec<Delivery>>>, impl Fn(&Delivery) + Send + Sync + 'static) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let l = log.clone();
    (log, move |d: &Delivery| l.lock().unwrap().push(d.clone()))
}

#[test]
fn topics_are_isolated() {
    let bus = ServiceBus::new();
    let (b_all, b_cb) = collector();
    let (plain_x, x_cb) = collector();
    let _d1 = bus.subscribe("b:*", b_cb, false);
    let _d2 = bus.subscribe("x", x_cb, false);

    bus.send("a:x", Value::Null);
    bus.send(Symbol::new("x"), Value::Null);

    assert!(b_all.lock().unwrap().is_empty());
    assert!(plain_x.lock().unwrap().is_empty());

    bus.send("x", Value::Null);
    assert_eq!(plain_x.lock().unwrap().len(), 1);
}

#[test]
fn receive_last_delivers_synchronously() {
    let bus = ServiceBus::new();
    bus.send("auth:login", json!({"user": "x"}));

    let (log, cb) = collector();
    let _d = bus.subscribe("auth:login", cb, true);

    let log = log.lock().unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].message, "login");
    assert_eq!(log[0].detail, json!({"user": "x"}));
    assert!(log[0].sender.is_none());
}

#[test]
fn receive_last_without_prior_send_does_not_fire() {
    let bus = ServiceBus::new();
    let (log, cb) = collector();
    let _d = bus.subscribe("auth:login", cb, true);
    assert!(log.lock().unwrap().is_empty());
}

#[test]
fn receive_last_respects_message_filter() {
    let bus = ServiceBus::new();
    bus.send("auth:logout", Value::Null);

    let (exact, exact_cb) = collector();
    let (all, all_cb) = collector();
    let _d1 = bus.subscribe("auth:login", exact_cb, true);
    let _d2 = bus.subscribe("auth:*", all_cb, true);

    assert!(exact.lock().unwrap().is_empty());
    assert_eq!(all.lock().unwrap().len(), 1);
    assert_eq!(all.lock().unwrap()[0].message, "logout");
}

#[test]
fn transient_symbols_are_distinct_topics() {
    let bus = ServiceBus::new();
    let first = Symbol::new("dup");
    let second = Symbol::new("dup");
    let (log, cb) = collector();
    let _d = bus.subscribe(&first, cb, false);

    bus.send(&second, json!(2));
    assert!(log.lock().unwrap().is_empty());

    bus.send(&first, json!(1));
    let log = log.lock().unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].message, "dup");
    assert_eq!(log[0].detail, json!(1));
}

#[test]
fn registered_symbols_share_a_topic() {
    let bus = ServiceBus::new();
    let (log, cb) = collector();
    let _d = bus.subscribe(Symbol::for_key("topics-test:dup"), cb, false);

    bus.send(Symbol::for_key("topics-test:dup"), json!("hello"));
    let log = log.lock().unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].message, "dup");
}

#[test]
fn anonymous_symbol_is_delivered_as_itself() {
    let bus = ServiceBus::new();
    let symbol = Symbol::anonymous();
    let (log, cb) = collector();
    let _d = bus.subscribe(&symbol, cb, false);
    bus.send(&symbol, Value::Null);
    assert_eq!(log.lock().unwrap()[0].message, BusMessage::Symbol(symbol));
}

#[test]
fn symbols_have_no_wildcard() {
    let bus = ServiceBus::new();
    let star = Symbol::new("*");
    let (log, cb) = collector();
    let _d = bus.subscribe(&star, cb, false);
    assert_eq!(bus.topic_count(), 1);
    // Only the symbol itself reaches the symbol topic, a text wildcard topic stays separate.
    bus.send("*", Value::Null);
    assert!(log.lock().unwrap().is_empty());
}

#[test]
fn panicking_subscriber_aborts_remaining() {
    let bus = ServiceBus::new();
    let (log, cb) = collector();
    let _d1 = bus.subscribe("t:m", |_: &Delivery| panic!("subscriber bug"), false);
    let _d2 = bus.subscribe("t:m", cb, false);

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        bus.send("t:m", json!(1));
    }));
    assert!(result.is_err());
    assert!(log.lock().unwrap().is_empty());
    // The message was stored before the subscribers were notified.
    assert_eq!(bus.last_message("t:m").unwrap().detail, json!(1));
}
