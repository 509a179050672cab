//! # Observable
//!
//! Change notification primitives.
//!
//! [Subject] keeps an ordered set of observer callbacks. Every observer lives in a slot
//! identified by a monotonically increasing id; detaching removes the slot, ids are never reused.
//! Notification walks the slots in id order and looks each one up at the moment it is invoked,
//! so an observer detached by an earlier observer during the same notification is skipped and
//! an observer attached during the notification is still reached.
//!
//! [Observable] bundles the two subjects every data-bound object exposes:
//! `property_changed` ([PropertyChangedArgs]) and `array_changed` ([ArrayChangedArgs]).
//! Observable does not suppress no-op changes. The mutator is expected to compare the old and
//! new value and skip the notification if nothing changed.
//!
//! ## Failure policy
//! Notification is fail fast. A panicking observer unwinds out of [Subject::notify] and the
//! remaining observers are not invoked for that call. No lock is held while an observer runs,
//! so the subject stays usable afterwards.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{Arc, Mutex, Weak};

use serde_json::Value;

use crate::lock;

/// Observer callback receiving the notification source and its detail.
pub type Observer<S, D> = Arc<dyn Fn(&S, &D) + Send + Sync>;

struct Slots<S, D> {
    next_id: u64,
    observers: BTreeMap<u64, Observer<S, D>>,
}

/// Ordered list of observers for one kind of notification.
pub struct Subject<S, D> {
    slots: Arc<Mutex<Slots<S, D>>>,
}

impl<S, D> Clone for Subject<S, D> {
    fn clone(&self) -> Self {
        Self {
            slots: self.slots.clone(),
        }
    }
}

impl<S, D> Default for Subject<S, D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, D> std::fmt::Debug for Subject<S, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subject")
            .field("observers", &self.observer_count())
            .finish()
    }
}

impl<S, D> Subject<S, D> {
    pub fn new() -> Self {
        Subject {
            slots: Arc::new(Mutex::new(Slots {
                next_id: 0,
                observers: BTreeMap::new(),
            })),
        }
    }

    /// Number of currently attached observers.
    pub fn observer_count(&self) -> usize {
        lock(&self.slots).observers.len()
    }

    /// Invoke all attached observers in attachment order.
    pub fn notify(&self, source: &S, detail: &D) {
        let mut cursor: Option<u64> = None;
        loop {
            let next = {
                let slots = lock(&self.slots);
                let lower = match cursor {
                    Some(id) => Bound::Excluded(id),
                    None => Bound::Unbounded,
                };
                slots
                    .observers
                    .range((lower, Bound::Unbounded))
                    .next()
                    .map(|(id, observer)| (*id, observer.clone()))
            };
            match next {
                Some((id, observer)) => {
                    cursor = Some(id);
                    observer(source, detail);
                }
                None => break,
            }
        }
    }
}

impl<S: 'static, D: 'static> Subject<S, D> {
    /// Attach an observer. The observer stays attached until the returned [Disposer] is disposed.
    pub fn attach(&self, observer: impl Fn(&S, &D) + Send + Sync + 'static) -> Disposer {
        let id = {
            let mut slots = lock(&self.slots);
            let id = slots.next_id;
            slots.next_id += 1;
            slots.observers.insert(id, Arc::new(observer));
            id
        };
        let weak: Weak<Mutex<Slots<S, D>>> = Arc::downgrade(&self.slots);
        Disposer::new(move || {
            if let Some(slots) = weak.upgrade() {
                lock(&slots).observers.remove(&id);
            }
        })
    }
}

/// Handle detaching an observer or subscription.
///
/// Disposing is idempotent, the second call is a no-op. Dropping a disposer without calling
/// [Disposer::dispose] leaves the observer attached.
#[must_use = "dropping a Disposer keeps the observer attached for the subject's lifetime"]
#[derive(Clone)]
pub struct Disposer {
    detach: Arc<Mutex<Option<Box<dyn FnOnce() + Send>>>>,
}

impl Disposer {
    pub fn new(detach: impl FnOnce() + Send + 'static) -> Self {
        Disposer {
            detach: Arc::new(Mutex::new(Some(Box::new(detach)))),
        }
    }

    /// Disposer that has nothing to detach.
    pub fn noop() -> Self {
        Disposer {
            detach: Arc::new(Mutex::new(None)),
        }
    }

    pub fn dispose(&self) {
        let detach = lock(&self.detach).take();
        if let Some(detach) = detach {
            detach();
        }
    }

    pub fn is_disposed(&self) -> bool {
        lock(&self.detach).is_none()
    }
}

impl std::fmt::Debug for Disposer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Disposer")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Payload of a property change.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PropertyChangedArgs {
    pub property_name: String,
    pub new_value: Value,
    pub old_value: Value,
}

impl PropertyChangedArgs {
    pub fn new(property_name: &str, new_value: Value, old_value: Value) -> Self {
        PropertyChangedArgs {
            property_name: property_name.to_string(),
            new_value,
            old_value,
        }
    }
}

/// Payload of a change of an array-typed property.
/// `removed_items` were removed at `index`, then `added_items_count` items were inserted there.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ArrayChangedArgs {
    pub array_property_name: String,
    pub index: usize,
    pub removed_items: Vec<Value>,
    pub added_items_count: usize,
}

/// The pair of subjects exposed by every data-bound object. `S` is the type handed to
/// observers as the notification source, usually a cheap clonable handle of the owner.
pub struct Observable<S> {
    property_changed: Subject<S, PropertyChangedArgs>,
    array_changed: Subject<S, ArrayChangedArgs>,
}

impl<S> Default for Observable<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> Clone for Observable<S> {
    fn clone(&self) -> Self {
        Observable {
            property_changed: self.property_changed.clone(),
            array_changed: self.array_changed.clone(),
        }
    }
}

impl<S> std::fmt::Debug for Observable<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observable")
            .field("property_changed", &self.property_changed)
            .field("array_changed", &self.array_changed)
            .finish()
    }
}

impl<S> Observable<S> {
    pub fn new() -> Self {
        Observable {
            property_changed: Subject::new(),
            array_changed: Subject::new(),
        }
    }

    pub fn property_changed(&self) -> &Subject<S, PropertyChangedArgs> {
        &self.property_changed
    }

    pub fn array_changed(&self) -> &Subject<S, ArrayChangedArgs> {
        &self.array_changed
    }

    pub fn notify_property_changed(
        &self,
        source: &S,
        property_name: &str,
        new_value: Value,
        old_value: Value,
    ) {
        self.property_changed.notify(
            source,
            &PropertyChangedArgs::new(property_name, new_value, old_value),
        );
    }

    pub fn notify_array_changed(&self, source: &S, args: ArrayChangedArgs) {
        self.array_changed.notify(source, &args);
    }
}
