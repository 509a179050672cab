//! # Action
//!
//! An [Action] is a clonable handle; clones share the same state and observers.
//! Property changes are reported on the action's [Observable] with the property names
//! `canExecute`, `isVisible` and `isPinned`, only when the value actually changes.
//!
//! `can_execute` is derived: the action's own flag, unless the action is blocked.
//! Blocking is used by a service object while it executes queued work.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;
use tracing::trace;

use vellum_core::error::Error;
use vellum_core::lock;
use vellum_core::observable::{Observable, PropertyChangedArgs, Subject};

#[derive(Debug, Clone)]
struct ActionState {
    enabled: bool,
    is_visible: bool,
    is_pinned: bool,
    block: bool,
}

impl ActionState {
    fn can_execute(&self) -> bool {
        self.enabled && !self.block
    }
}

struct ActionInner {
    name: String,
    display_name: String,
    state: Mutex<ActionState>,
    observable: Observable<Action>,
}

#[derive(Clone)]
pub struct Action {
    inner: Arc<ActionInner>,
}

impl PartialEq for Action {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Action {}

impl std::fmt::Debug for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.inner.state).clone();
        f.debug_struct("Action")
            .field("name", &self.inner.name)
            .field("can_execute", &state.can_execute())
            .field("is_visible", &state.is_visible)
            .field("is_pinned", &state.is_pinned)
            .field("block", &state.block)
            .finish()
    }
}

impl Action {
    /// New executable, visible, not pinned action. The display name defaults to the name.
    pub fn new(name: &str) -> Self {
        Self::with_display_name(name, name)
    }

    pub fn with_display_name(name: &str, display_name: &str) -> Self {
        Action {
            inner: Arc::new(ActionInner {
                name: name.to_string(),
                display_name: display_name.to_string(),
                state: Mutex::new(ActionState {
                    enabled: true,
                    is_visible: true,
                    is_pinned: false,
                    block: false,
                }),
                observable: Observable::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn display_name(&self) -> &str {
        &self.inner.display_name
    }

    /// True if both handles refer to the same action.
    pub fn ptr_eq(&self, other: &Action) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn observable(&self) -> &Observable<Action> {
        &self.inner.observable
    }

    pub fn property_changed(&self) -> &Subject<Action, PropertyChangedArgs> {
        self.inner.observable.property_changed()
    }

    pub fn can_execute(&self) -> bool {
        lock(&self.inner.state).can_execute()
    }

    pub fn is_visible(&self) -> bool {
        lock(&self.inner.state).is_visible
    }

    pub fn is_pinned(&self) -> bool {
        lock(&self.inner.state).is_pinned
    }

    pub fn is_blocked(&self) -> bool {
        lock(&self.inner.state).block
    }

    pub fn set_can_execute(&self, value: bool) {
        self.update_can_execute(|state| state.enabled = value);
    }

    pub fn set_block(&self, value: bool) {
        self.update_can_execute(|state| state.block = value);
    }

    pub fn set_is_visible(&self, value: bool) {
        let old = std::mem::replace(&mut lock(&self.inner.state).is_visible, value);
        self.notify_if_changed("isVisible", value, old);
    }

    pub fn set_is_pinned(&self, value: bool) {
        let old = std::mem::replace(&mut lock(&self.inner.state).is_pinned, value);
        self.notify_if_changed("isPinned", value, old);
    }

    fn update_can_execute(&self, update: impl FnOnce(&mut ActionState)) {
        let (new, old) = {
            let mut state = lock(&self.inner.state);
            let old = state.can_execute();
            update(&mut state);
            (state.can_execute(), old)
        };
        self.notify_if_changed("canExecute", new, old);
    }

    fn notify_if_changed(&self, property_name: &str, new: bool, old: bool) {
        if new != old {
            trace!(action = %self.inner.name, property_name, new, "action property changed");
            self.inner.observable.notify_property_changed(
                self,
                property_name,
                Value::Bool(new),
                Value::Bool(old),
            );
        }
    }
}

/// Executes an action on behalf of a service object.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn execute(&self, action: Action, parameters: Option<Value>) -> Result<Value, Error>;
}

#[async_trait]
impl<F> ActionHandler for F
where
    F: Fn(Action, Option<Value>) -> BoxFuture<'static, Result<Value, Error>> + Send + Sync,
{
    async fn execute(&self, action: Action, parameters: Option<Value>) -> Result<Value, Error> {
        self(action, parameters).await
    }
}
