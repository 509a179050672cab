//! # Service object with actions
//!
//! [ServiceObjectWithActions] is the base of stateful domain objects. It owns
//! - a set of [actions](crate::action::Action) and their [handlers](crate::action::ActionHandler),
//! - a [notification](crate::notification::Notification) presented to the user,
//! - a private serial [Queue] through which all asynchronous work runs.
//!
//! ## Busy state
//! `isBusy` turns true as soon as work is submitted with [ServiceObjectWithActions::queue_work]
//! and turns false only after a work item finished while no other work was waiting.
//! The busy flag and the queue are updated under the same lock, so overlapping submissions
//! never observe a spurious `false` between two work items.
//!
//! ## Property names
//! Changes are reported on the object's [Observable] as `isBusy`, `notification`,
//! `notificationType` and `notificationDuration`. Array-typed state created with
//! [ServiceObjectWithActions::observe_array] is reported on `array_changed`.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, Weak};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use vellum_core::error::Error;
use vellum_core::lock;
use vellum_core::observable::{ArrayChangedArgs, Observable, PropertyChangedArgs, Subject};
use vellum_core::observable_array::ObservableArray;
use vellum_core::queue::{Queue, QueuedTask};

use crate::action::{Action, ActionHandler};
use crate::actions::ActionCollection;
use crate::config::ServiceObjectConfig;
use crate::notification::{Notification, NotificationType};

struct ServiceState {
    is_busy: bool,
    notification: Notification,
    actions: ActionCollection,
    handlers: HashMap<String, Arc<dyn ActionHandler>>,
}

struct ServiceInner {
    queue: Queue,
    notification_duration_ms: Option<u64>,
    state: Mutex<ServiceState>,
    observable: Observable<ServiceObjectWithActions>,
}

/// Clonable handle; clones share the same object.
#[derive(Clone)]
pub struct ServiceObjectWithActions {
    inner: Arc<ServiceInner>,
}

impl Default for ServiceObjectWithActions {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ServiceObjectWithActions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.inner.state);
        f.debug_struct("ServiceObjectWithActions")
            .field("is_busy", &state.is_busy)
            .field("notification", &state.notification)
            .field("actions", &state.actions.names())
            .field("queue", &self.inner.queue)
            .finish()
    }
}

/// Releases the effects of a running work item: unblocks the actions and clears the busy
/// state if nothing else is waiting. Runs on every exit path of the work, including panics.
struct WorkGuard {
    service: ServiceObjectWithActions,
    blocked: bool,
}

impl WorkGuard {
    fn start(service: ServiceObjectWithActions, block_actions: bool) -> Self {
        if block_actions {
            service.block_actions(true);
        }
        WorkGuard {
            service,
            blocked: block_actions,
        }
    }
}

impl Drop for WorkGuard {
    fn drop(&mut self) {
        if self.blocked {
            self.service.block_actions(false);
        }
        let idle = {
            let mut state = lock(&self.service.inner.state);
            if self.service.inner.queue.queue_length() == 0 && state.is_busy {
                state.is_busy = false;
                true
            } else {
                false
            }
        };
        if idle {
            debug!("service object idle");
            self.service.notify("isBusy", Value::Bool(false), Value::Bool(true));
        }
    }
}

impl ServiceObjectWithActions {
    pub fn new() -> Self {
        Self::with_config(&ServiceObjectConfig::default())
    }

    /// Create a service object with the actions named in the configuration.
    pub fn with_config(config: &ServiceObjectConfig) -> Self {
        let actions = config
            .action_names
            .iter()
            .map(|name| Action::new(name))
            .collect();
        ServiceObjectWithActions {
            inner: Arc::new(ServiceInner {
                queue: Queue::new(1, config.max_queued_work()),
                notification_duration_ms: config.notification_duration_ms,
                state: Mutex::new(ServiceState {
                    is_busy: false,
                    notification: Notification::default(),
                    actions,
                    handlers: HashMap::new(),
                }),
                observable: Observable::new(),
            }),
        }
    }

    /// Add an action together with the handler executing it.
    pub fn with_handler(self, action: Action, handler: impl ActionHandler + 'static) -> Self {
        self.set_handler(action.name(), handler);
        self.add_action(action);
        self
    }

    pub fn observable(&self) -> &Observable<ServiceObjectWithActions> {
        &self.inner.observable
    }

    pub fn property_changed(&self) -> &Subject<ServiceObjectWithActions, PropertyChangedArgs> {
        self.inner.observable.property_changed()
    }

    pub fn array_changed(&self) -> &Subject<ServiceObjectWithActions, ArrayChangedArgs> {
        self.inner.observable.array_changed()
    }

    pub fn ptr_eq(&self, other: &ServiceObjectWithActions) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn notify(&self, property_name: &str, new_value: Value, old_value: Value) {
        self.inner
            .observable
            .notify_property_changed(self, property_name, new_value, old_value);
    }

    pub fn is_busy(&self) -> bool {
        lock(&self.inner.state).is_busy
    }

    /// Number of work items waiting behind the running one.
    pub fn queued_work(&self) -> usize {
        self.inner.queue.queue_length()
    }

    // Actions

    pub fn actions(&self) -> ActionCollection {
        lock(&self.inner.state).actions.clone()
    }

    pub fn action(&self, name: &str) -> Option<Action> {
        lock(&self.inner.state).actions.by_name(name).cloned()
    }

    /// Add an action, replacing an action with the same name.
    pub fn add_action(&self, action: Action) {
        lock(&self.inner.state).actions.push(action);
    }

    pub fn set_handler(&self, name: &str, handler: impl ActionHandler + 'static) {
        lock(&self.inner.state)
            .handlers
            .insert(name.to_string(), Arc::new(handler));
    }

    /// Block or unblock all actions.
    pub fn block_actions(&self, block: bool) {
        let actions = self.actions();
        for action in &actions {
            action.set_block(block);
        }
    }

    // Notification

    pub fn notification(&self) -> Notification {
        lock(&self.inner.state).notification.clone()
    }

    /// Set the notification. Without an explicit duration the configured default is used.
    pub fn set_notification(
        &self,
        message: &str,
        notification_type: NotificationType,
        duration_ms: Option<u64>,
    ) {
        let duration_ms = duration_ms.or(self.inner.notification_duration_ms);
        self.replace_notification(Notification::new(message, notification_type, duration_ms));
    }

    /// Report an error to the user. The notification stays until replaced or cleared.
    pub fn set_error_notification(&self, error: &Error) {
        self.replace_notification(Notification::from_error(error));
    }

    pub fn clear_notification(&self) {
        self.replace_notification(Notification::default());
    }

    fn replace_notification(&self, notification: Notification) {
        let old = std::mem::replace(
            &mut lock(&self.inner.state).notification,
            notification.clone(),
        );
        if old.message != notification.message {
            self.notify(
                "notification",
                notification.message_value(),
                old.message_value(),
            );
        }
        if old.notification_type != notification.notification_type {
            self.notify(
                "notificationType",
                notification.notification_type.to_value(),
                old.notification_type.to_value(),
            );
        }
        if old.duration_ms != notification.duration_ms {
            self.notify(
                "notificationDuration",
                notification.duration_value(),
                old.duration_value(),
            );
        }
    }

    // Work

    /// Run `work` after all previously queued work finished.
    ///
    /// The object becomes busy immediately. With `block_actions`, all actions are blocked while
    /// `work` runs. The busy state and action blocking are released on every exit path.
    /// If the backlog limit is reached, the returned future fails with a queue limit error and
    /// `work` is never invoked. Must be called within a tokio runtime.
    pub fn queue_work<T, F, Fut>(
        &self,
        work: F,
        block_actions: bool,
    ) -> impl Future<Output = Result<T, Error>> + Send + 'static
    where
        T: Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, Error>> + Send + 'static,
    {
        let task = self.enqueue_work(work, block_actions);
        async move { task?.await }
    }

    fn enqueue_work<T, F, Fut>(&self, work: F, block_actions: bool) -> Result<QueuedTask<T>, Error>
    where
        T: Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, Error>> + Send + 'static,
    {
        let service = self.clone();
        let (task, became_busy) = {
            let mut state = lock(&self.inner.state);
            let task = self.inner.queue.add(move || async move {
                let _guard = WorkGuard::start(service, block_actions);
                work().await
            })?;
            let became_busy = !state.is_busy;
            state.is_busy = true;
            (task, became_busy)
        };
        if became_busy {
            debug!("service object busy");
            self.notify("isBusy", Value::Bool(true), Value::Bool(false));
        }
        Ok(task)
    }

    /// Execute an action with its registered handler.
    ///
    /// Fails if the action does not exist, can not execute or has no handler. The handler runs
    /// as queued work with all actions blocked. A failure is also set as the error notification.
    pub async fn execute_action(&self, name: &str, parameters: Option<Value>) -> Result<Value, Error> {
        let (action, handler) = {
            let state = lock(&self.inner.state);
            let action = state
                .actions
                .by_name(name)
                .cloned()
                .ok_or_else(|| Error::action_not_found(name, &state.actions.names()))?;
            let handler = state.handlers.get(name).cloned().ok_or_else(|| {
                Error::not_supported(format!("Action '{}' has no handler", name))
            })?;
            (action, handler)
        };
        if !action.can_execute() {
            return Err(Error::action_not_executable(name));
        }
        debug!(action = name, "executing action");
        let result = self
            .queue_work(
                move || async move { handler.execute(action, parameters).await },
                true,
            )
            .await;
        if let Err(e) = &result {
            warn!(action = name, error = %e, "action failed");
            self.set_error_notification(e);
        }
        result
    }

    /// Create an observable array reported as the array-typed property `name`.
    pub fn observe_array<T>(&self, name: &str, items: Vec<T>) -> ObservableArray<T>
    where
        T: Serialize + Clone + PartialEq + Send + 'static,
    {
        let service: Weak<ServiceInner> = Arc::downgrade(&self.inner);
        let name = name.to_string();
        ObservableArray::wrap(items, move |_, change| {
            let Some(inner) = service.upgrade() else {
                return;
            };
            let service = ServiceObjectWithActions { inner };
            match change.to_args(&name) {
                Ok(args) => service.inner.observable.notify_array_changed(&service, args),
                Err(e) => warn!(array = %name, error = %e, "array change not reported"),
            }
        })
    }
}
