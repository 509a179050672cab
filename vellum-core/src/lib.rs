//!
//! # Vellum Core
//!
//! Vellum core defines the change notification and work serialization primitives
//! the data-binding layer is built on.
//!
//! ## Glossary
//!
//! **[Subject](crate::observable::Subject)** - an ordered list of observer callbacks.
//! Attaching returns a [Disposer](crate::observable::Disposer) that detaches the observer again.
//! Notification is synchronous and fail fast: a panicking observer stops the notification.
//!
//! **[Observable](crate::observable::Observable)** - an object exposing change notification
//! for its properties (`property_changed`) and its array-typed state (`array_changed`).
//! Notifications always carry the old and the new value.
//!
//! **[ObservableArray](crate::observable_array::ObservableArray)** - a vector reporting every
//! mutation as one normalized change: index, removed items and number of added items.
//!
//! **Topic** - a named (or [symbol](crate::service_bus::Symbol) identified) channel
//! within the [ServiceBus](crate::service_bus::ServiceBus) grouping related messages and their subscribers.
//!
//! **Last message replay** - delivering the most recently sent message on a topic to a
//! newly registered subscriber that opts in.
//!
//! **[Queue](crate::queue::Queue)** - runs async tasks with a limit on concurrently running
//! and on waiting tasks. A queue limited to one running task serializes work: at most one
//! asynchronous mutation runs at a time.
//!
//! **Busy state** - true while a stateful object has asynchronous work queued or executing.
//! See `vellum-lib`.
extern crate serde;
#[macro_use]
extern crate serde_derive;

pub mod config;
pub mod error;
pub mod observable;
pub mod observable_array;
pub mod queue;
pub mod service_bus;

/// Lock a mutex, recovering the data if a panicking observer poisoned it.
pub fn lock<T: ?Sized>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}
