//! # Service bus
//!
//! Topic based publish/subscribe broker with last-message replay.
//!
//! A message is either text or a [Symbol]:
//! - **Text** `"topic:message"` is split at the first colon into the topic and the message.
//!   Text without a colon belongs to the default topic `""`.
//! - **Symbol** messages use the symbol itself as the topic, so two symbols are always
//!   distinct topics, even with equal descriptions. The delivered message is parsed from the
//!   symbol's registered key (or description) the same way as text; a symbol without any label
//!   is delivered as the symbol itself.
//!
//! Every topic remembers the last delivery. [ServiceBus::send] stores it before notifying, so
//! a subscriber registered later with `receive_last` receives it synchronously while
//! subscribing. Subscribers of a topic run in subscription order and [ServiceBus::send] returns
//! only after all of them were invoked. The wildcard `"*"` subscribes to all messages of a text
//! topic; symbol topics have no wildcard.
//!
//! The bus is an ordinary value. Share one instance (e.g. `Arc<ServiceBus>`) between the
//! collaborators that need to talk to each other; topics live as long as the bus.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use serde_json::Value;
use tracing::{debug, trace};

use crate::observable::{Disposer, Subject};

static NEXT_SYMBOL_ID: AtomicU64 = AtomicU64::new(1);

fn symbol_registry() -> &'static scc::HashMap<String, Symbol> {
    static REGISTRY: OnceLock<scc::HashMap<String, Symbol>> = OnceLock::new();
    REGISTRY.get_or_init(scc::HashMap::new)
}

/// Opaque message identity. Equality and hashing use the identity only, never the label.
#[derive(Clone)]
pub struct Symbol {
    id: u64,
    description: Option<Arc<str>>,
    registered: bool,
}

impl Symbol {
    fn fresh(description: Option<&str>, registered: bool) -> Self {
        Symbol {
            id: NEXT_SYMBOL_ID.fetch_add(1, Ordering::Relaxed),
            description: description.map(Arc::from),
            registered,
        }
    }

    /// Create a new unique symbol.
    pub fn new(description: &str) -> Self {
        Self::fresh(Some(description), false)
    }

    /// Create a new unique symbol without a description.
    pub fn anonymous() -> Self {
        Self::fresh(None, false)
    }

    /// Get the process-wide symbol registered under `key`, creating it on first use.
    pub fn for_key(key: &str) -> Self {
        symbol_registry()
            .entry_sync(key.to_string())
            .or_insert_with(|| Symbol::fresh(Some(key), true))
            .get()
            .clone()
    }

    /// The registry key, if the symbol was created by [Symbol::for_key].
    pub fn key_for(&self) -> Option<&str> {
        if self.registered {
            self.description.as_deref()
        } else {
            None
        }
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Symbol {}

impl std::hash::Hash for Symbol {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol#{}({})", self.id, self.description().unwrap_or(""))
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({})", self.description().unwrap_or(""))
    }
}

/// Key of a topic.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TopicKey {
    Name(String),
    Symbol(Symbol),
}

impl fmt::Display for TopicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TopicKey::Name(name) => write!(f, "'{}'", name),
            TopicKey::Symbol(symbol) => write!(f, "{}", symbol),
        }
    }
}

/// Message as sent, subscribed to, and delivered.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum BusMessage {
    Text(String),
    Symbol(Symbol),
}

impl BusMessage {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            BusMessage::Text(text) => Some(text),
            BusMessage::Symbol(_) => None,
        }
    }
}

impl fmt::Display for BusMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusMessage::Text(text) => write!(f, "{}", text),
            BusMessage::Symbol(symbol) => write!(f, "{}", symbol),
        }
    }
}

impl PartialEq<str> for BusMessage {
    fn eq(&self, other: &str) -> bool {
        self.as_text() == Some(other)
    }
}

impl PartialEq<&str> for BusMessage {
    fn eq(&self, other: &&str) -> bool {
        self.as_text() == Some(*other)
    }
}

impl From<&str> for BusMessage {
    fn from(text: &str) -> Self {
        BusMessage::Text(text.to_string())
    }
}

impl From<String> for BusMessage {
    fn from(text: String) -> Self {
        BusMessage::Text(text)
    }
}

impl From<Symbol> for BusMessage {
    fn from(symbol: Symbol) -> Self {
        BusMessage::Symbol(symbol)
    }
}

impl From<&Symbol> for BusMessage {
    fn from(symbol: &Symbol) -> Self {
        BusMessage::Symbol(symbol.clone())
    }
}

/// Split a message into its topic key and the message delivered to subscribers.
pub fn parse_message(message: &BusMessage) -> (TopicKey, BusMessage) {
    fn split(text: &str) -> (&str, &str) {
        text.split_once(':').unwrap_or(("", text))
    }
    match message {
        BusMessage::Text(text) => {
            let (topic, message) = split(text);
            (
                TopicKey::Name(topic.to_string()),
                BusMessage::Text(message.to_string()),
            )
        }
        BusMessage::Symbol(symbol) => {
            let message = match symbol.key_for().or(symbol.description()) {
                Some(label) => BusMessage::Text(split(label).1.to_string()),
                None => BusMessage::Symbol(symbol.clone()),
            };
            (TopicKey::Symbol(symbol.clone()), message)
        }
    }
}

/// Optional originator of a message. Receivers may downcast it.
pub type SenderRef = Arc<dyn Any + Send + Sync>;

/// A message as delivered to subscribers, also kept as the last message of a topic.
#[derive(Clone)]
pub struct Delivery {
    pub sender: Option<SenderRef>,
    pub message: BusMessage,
    pub detail: Value,
}

impl Delivery {
    /// Downcast the sender to a concrete type.
    pub fn sender_as<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.sender.as_ref().and_then(|s| s.downcast_ref::<T>())
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("has_sender", &self.sender.is_some())
            .field("message", &self.message)
            .field("detail", &self.detail)
            .finish()
    }
}

struct Topic {
    subject: Subject<(), Delivery>,
    last_message: Option<Delivery>,
}

impl Topic {
    fn new() -> Self {
        Topic {
            subject: Subject::new(),
            last_message: None,
        }
    }
}

#[derive(Default)]
pub struct ServiceBus {
    topics: scc::HashMap<TopicKey, Topic>,
}

impl fmt::Debug for ServiceBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceBus")
            .field("topics", &self.topics.len())
            .finish()
    }
}

impl ServiceBus {
    pub fn new() -> Self {
        ServiceBus {
            topics: scc::HashMap::new(),
        }
    }

    /// Send a message without a sender.
    pub fn send(&self, message: impl Into<BusMessage>, detail: Value) {
        self.dispatch(None, message.into(), detail);
    }

    pub fn send_from(&self, sender: SenderRef, message: impl Into<BusMessage>, detail: Value) {
        self.dispatch(Some(sender), message.into(), detail);
    }

    fn dispatch(&self, sender: Option<SenderRef>, message: BusMessage, detail: Value) {
        let (topic_key, message) = parse_message(&message);
        let delivery = Delivery {
            sender,
            message,
            detail,
        };
        let subject = {
            let mut entry = self.topic_entry(&topic_key);
            entry.get_mut().last_message = Some(delivery.clone());
            entry.get().subject.clone()
        };
        trace!(topic = %topic_key, message = %delivery.message, "service bus send");
        subject.notify(&(), &delivery);
    }

    fn topic_entry(
        &self,
        topic_key: &TopicKey,
    ) -> scc::hash_map::OccupiedEntry<'_, TopicKey, Topic> {
        self.topics
            .entry_sync(topic_key.clone())
            .or_insert_with(|| {
                debug!(topic = %topic_key, "service bus topic created");
                Topic::new()
            })
    }

    /// Subscribe `callback` to `message`.
    ///
    /// With `receive_last`, the last message of the topic (if any, and if it matches) is
    /// delivered to `callback` before this call returns.
    pub fn subscribe(
        &self,
        message: impl Into<BusMessage>,
        callback: impl Fn(&Delivery) + Send + Sync + 'static,
        receive_last: bool,
    ) -> Disposer {
        let (topic_key, filter) = parse_message(&message.into());
        let wildcard = matches!(topic_key, TopicKey::Name(_)) && filter == "*";
        let (subject, last_message) = {
            let entry = self.topic_entry(&topic_key);
            (entry.get().subject.clone(), entry.get().last_message.clone())
        };
        trace!(topic = %topic_key, message = %filter, receive_last, "service bus subscribe");

        let callback = Arc::new(callback);
        let observer = callback.clone();
        let observer_filter = filter.clone();
        let disposer = subject.attach(move |_, delivery: &Delivery| {
            if wildcard || delivery.message == observer_filter {
                observer(delivery);
            }
        });

        if receive_last {
            if let Some(last) = last_message {
                if wildcard || last.message == filter {
                    callback(&last);
                }
            }
        }
        disposer
    }

    /// Last delivery on the topic of `message`, regardless of the message filter.
    pub fn last_message(&self, message: impl Into<BusMessage>) -> Option<Delivery> {
        let (topic_key, _) = parse_message(&message.into());
        self.topics
            .read_sync(&topic_key, |_, topic| topic.last_message.clone())
            .flatten()
    }

    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    fn collector() -> (Arc<Mutex<Vec<Delivery>>>, impl Fn(&Delivery) + Send + Sync + 'static) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let l = log.clone();
        (log, move |d: &Delivery| l.lock().unwrap().push(d.clone()))
    }

    #[test]
    fn test_parse_text_message() {
        let (topic, message) = parse_message(&"app-route:deactivate".into());
        assert_eq!(topic, TopicKey::Name("app-route".to_string()));
        assert_eq!(message, "deactivate");

        let (topic, message) = parse_message(&"path-changed".into());
        assert_eq!(topic, TopicKey::Name(String::new()));
        assert_eq!(message, "path-changed");

        let (_, message) = parse_message(&"a:b:c".into());
        assert_eq!(message, "b:c");
    }

    #[test]
    fn test_parse_symbol_message() {
        let symbol = Symbol::new("auth:login");
        let (topic, message) = parse_message(&symbol.clone().into());
        assert_eq!(topic, TopicKey::Symbol(symbol));
        assert_eq!(message, "login");

        let anonymous = Symbol::anonymous();
        let (_, message) = parse_message(&anonymous.clone().into());
        assert_eq!(message, BusMessage::Symbol(anonymous));
    }

    #[test]
    fn test_symbol_identity() {
        assert_ne!(Symbol::new("dup"), Symbol::new("dup"));
        assert_eq!(
            Symbol::for_key("service-bus-test-dup"),
            Symbol::for_key("service-bus-test-dup")
        );
        assert_eq!(
            Symbol::for_key("service-bus-test-dup").key_for(),
            Some("service-bus-test-dup")
        );
        assert_eq!(Symbol::new("x").key_for(), None);
    }

    #[test]
    fn test_send_reaches_exact_and_wildcard() {
        let bus = ServiceBus::new();
        let (exact, exact_cb) = collector();
        let (all, all_cb) = collector();
        let (other, other_cb) = collector();
        let _d1 = bus.subscribe("dialog:open", exact_cb, false);
        let _d2 = bus.subscribe("dialog:*", all_cb, false);
        let _d3 = bus.subscribe("dialog:close", other_cb, false);

        bus.send("dialog:open", json!({"id": 1}));
        assert_eq!(exact.lock().unwrap().len(), 1);
        assert_eq!(all.lock().unwrap().len(), 1);
        assert!(other.lock().unwrap().is_empty());
        assert_eq!(exact.lock().unwrap()[0].detail, json!({"id": 1}));
    }

    #[test]
    fn test_subscribers_in_order() {
        let bus = ServiceBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let o1 = order.clone();
        let o2 = order.clone();
        let _d1 = bus.subscribe("x", move |_| o1.lock().unwrap().push(1), false);
        let _d2 = bus.subscribe("x", move |_| o2.lock().unwrap().push(2), false);
        bus.send("x", Value::Null);
        assert_eq!(*order.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_dispose_stops_delivery() {
        let bus = ServiceBus::new();
        let (log, cb) = collector();
        let d = bus.subscribe("t:m", cb, false);
        bus.send("t:m", Value::Null);
        d.dispose();
        d.dispose();
        bus.send("t:m", Value::Null);
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_sender_is_delivered() {
        let bus = ServiceBus::new();
        let (log, cb) = collector();
        let _d = bus.subscribe("t:m", cb, false);
        bus.send_from(Arc::new("grid".to_string()), "t:m", Value::Null);
        let log = log.lock().unwrap();
        assert_eq!(log[0].sender_as::<String>().map(String::as_str), Some("grid"));
    }

    #[test]
    fn test_last_message() {
        let bus = ServiceBus::new();
        assert!(bus.last_message("t:a").is_none());
        bus.send("t:a", json!(1));
        bus.send("t:b", json!(2));
        let last = bus.last_message("t:a").unwrap();
        assert_eq!(last.message, "b");
        assert_eq!(last.detail, json!(2));
        assert_eq!(bus.topic_count(), 1);
    }
}
