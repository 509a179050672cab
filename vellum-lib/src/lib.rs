//!
//! # Vellum Lib
//!
//! Domain layer of vellum built on the primitives of `vellum-core`.
//!
//! ## Glossary
//!
//! **[Action](crate::action::Action)** - a named operation a user may trigger. It carries
//! observable `canExecute`, `isVisible` and `isPinned` flags. A blocked action can not execute.
//!
//! **[ActionGroup](crate::action_group::ActionGroup)** - a set of actions presented together.
//! The group can execute (is visible) if any of its members can execute (is visible).
//!
//! **[ServiceObjectWithActions](crate::service_object::ServiceObjectWithActions)** - a stateful
//! object owning a set of actions, a notification and a serial work queue.
//! All asynchronous mutations go through
//! [queue_work](crate::service_object::ServiceObjectWithActions::queue_work), so at most one of
//! them runs at a time and the object is busy while any work is running or waiting.
//!
//! **Notification** - a message (with a [type](crate::notification::NotificationType) and an
//! optional display duration) presented to the user on behalf of a service object.
extern crate serde;
#[macro_use]
extern crate serde_derive;

pub mod action;
pub mod action_group;
pub mod actions;
pub mod config;
pub mod notification;
pub mod service_object;
