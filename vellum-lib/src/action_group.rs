//! # Action group
//!
//! Aggregates the state of its member actions: the group can execute if any member can,
//! and is visible if any member is. Changes of the aggregate are reported on the group's own
//! [Observable] as `canExecute` and `isVisible`, only when the aggregate value changes.
//!
//! The group observes its members through weak references, so members do not keep
//! a dropped group alive. Dropping the last handle of a group detaches it from all members.

use std::sync::{Arc, Mutex, Weak};

use serde_json::Value;
use tracing::trace;

use vellum_core::lock;
use vellum_core::observable::{Disposer, Observable, PropertyChangedArgs, Subject};

use crate::action::Action;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Aggregate {
    CanExecute,
    IsVisible,
}

impl Aggregate {
    fn property_name(&self) -> &'static str {
        match self {
            Aggregate::CanExecute => "canExecute",
            Aggregate::IsVisible => "isVisible",
        }
    }

    fn of(&self, action: &Action) -> bool {
        match self {
            Aggregate::CanExecute => action.can_execute(),
            Aggregate::IsVisible => action.is_visible(),
        }
    }

    fn from_property_name(property_name: &str) -> Option<Self> {
        match property_name {
            "canExecute" => Some(Aggregate::CanExecute),
            "isVisible" => Some(Aggregate::IsVisible),
            _ => None,
        }
    }
}

#[derive(Default)]
struct GroupState {
    members: Vec<(Action, Disposer)>,
    can_execute: bool,
    is_visible: bool,
}

impl GroupState {
    fn value_mut(&mut self, aggregate: Aggregate) -> &mut bool {
        match aggregate {
            Aggregate::CanExecute => &mut self.can_execute,
            Aggregate::IsVisible => &mut self.is_visible,
        }
    }
}

struct GroupInner {
    state: Mutex<GroupState>,
    observable: Observable<ActionGroup>,
}

impl Drop for GroupInner {
    fn drop(&mut self) {
        let state = self
            .state
            .get_mut()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        for (_, disposer) in state.members.drain(..) {
            disposer.dispose();
        }
    }
}

#[derive(Clone)]
pub struct ActionGroup {
    inner: Arc<GroupInner>,
}

impl Default for ActionGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ActionGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.inner.state);
        f.debug_struct("ActionGroup")
            .field("members", &state.members.len())
            .field("can_execute", &state.can_execute)
            .field("is_visible", &state.is_visible)
            .finish()
    }
}

impl ActionGroup {
    /// An empty group, which can not execute and is not visible.
    pub fn new() -> Self {
        ActionGroup {
            inner: Arc::new(GroupInner {
                state: Mutex::new(GroupState::default()),
                observable: Observable::new(),
            }),
        }
    }

    pub fn with_actions<'a>(actions: impl IntoIterator<Item = &'a Action>) -> Self {
        let group = Self::new();
        for action in actions {
            group.add_action(action);
        }
        group
    }

    pub fn observable(&self) -> &Observable<ActionGroup> {
        &self.inner.observable
    }

    pub fn property_changed(&self) -> &Subject<ActionGroup, PropertyChangedArgs> {
        self.inner.observable.property_changed()
    }

    pub fn can_execute(&self) -> bool {
        lock(&self.inner.state).can_execute
    }

    pub fn is_visible(&self) -> bool {
        lock(&self.inner.state).is_visible
    }

    pub fn actions(&self) -> Vec<Action> {
        lock(&self.inner.state)
            .members
            .iter()
            .map(|(action, _)| action.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.inner.state).members.len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.inner.state).members.is_empty()
    }

    pub fn contains(&self, action: &Action) -> bool {
        lock(&self.inner.state)
            .members
            .iter()
            .any(|(member, _)| member.ptr_eq(action))
    }

    /// Add a member. Adding an action that is already a member does nothing.
    pub fn add_action(&self, action: &Action) {
        {
            let mut state = lock(&self.inner.state);
            if state.members.iter().any(|(member, _)| member.ptr_eq(action)) {
                return;
            }
            let group = Arc::downgrade(&self.inner);
            let disposer = action
                .property_changed()
                .attach(move |_, args| Self::member_changed(&group, args));
            state.members.push((action.clone(), disposer));
        }
        trace!(action = action.name(), "action added to group");
        self.rescan(Aggregate::CanExecute);
        self.rescan(Aggregate::IsVisible);
    }

    /// Remove a member and stop observing it. Removing a non-member does nothing.
    pub fn remove_action(&self, action: &Action) {
        let removed = {
            let mut state = lock(&self.inner.state);
            let position = state
                .members
                .iter()
                .position(|(member, _)| member.ptr_eq(action));
            position.map(|i| state.members.remove(i))
        };
        if let Some((_, disposer)) = removed {
            disposer.dispose();
            trace!(action = action.name(), "action removed from group");
            self.rescan(Aggregate::CanExecute);
            self.rescan(Aggregate::IsVisible);
        }
    }

    fn member_changed(group: &Weak<GroupInner>, args: &PropertyChangedArgs) {
        let Some(aggregate) = Aggregate::from_property_name(&args.property_name) else {
            return;
        };
        let Some(inner) = group.upgrade() else {
            return;
        };
        let group = ActionGroup { inner };
        if args.new_value == Value::Bool(true) {
            group.set(aggregate, true);
        } else {
            group.rescan(aggregate);
        }
    }

    fn rescan(&self, aggregate: Aggregate) {
        let value = {
            let state = lock(&self.inner.state);
            state.members.iter().any(|(action, _)| aggregate.of(action))
        };
        self.set(aggregate, value);
    }

    fn set(&self, aggregate: Aggregate, value: bool) {
        let old = std::mem::replace(lock(&self.inner.state).value_mut(aggregate), value);
        if old != value {
            self.inner.observable.notify_property_changed(
                self,
                aggregate.property_name(),
                Value::Bool(value),
                Value::Bool(old),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorded(group: &ActionGroup) -> Arc<Mutex<Vec<(String, Value)>>> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let l = log.clone();
        let _ = group.property_changed().attach(move |_, args| {
            l.lock()
                .unwrap()
                .push((args.property_name.clone(), args.new_value.clone()))
        });
        log
    }

    #[test]
    fn test_empty_group() {
        let group = ActionGroup::new();
        assert!(!group.can_execute());
        assert!(!group.is_visible());
        assert!(group.is_empty());
    }

    #[test]
    fn test_or_aggregation() {
        let a = Action::new("a");
        let b = Action::new("b");
        a.set_can_execute(false);
        b.set_can_execute(false);
        let group = ActionGroup::with_actions([&a, &b]);
        assert!(!group.can_execute());
        assert!(group.is_visible());

        b.set_can_execute(true);
        assert!(group.can_execute());
        a.set_can_execute(true);
        b.set_can_execute(false);
        assert!(group.can_execute());
        a.set_can_execute(false);
        assert!(!group.can_execute());
    }

    #[test]
    fn test_notifies_only_on_aggregate_change() {
        let a = Action::new("a");
        let b = Action::new("b");
        let group = ActionGroup::with_actions([&a, &b]);
        let log = recorded(&group);

        a.set_is_visible(false);
        a.set_is_pinned(true);
        b.set_is_visible(false);
        a.set_is_visible(true);

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                ("isVisible".to_string(), Value::Bool(false)),
                ("isVisible".to_string(), Value::Bool(true)),
            ]
        );
    }

    #[test]
    fn test_add_and_remove_are_idempotent() {
        let a = Action::new("a");
        let group = ActionGroup::new();
        group.add_action(&a);
        group.add_action(&a);
        assert_eq!(group.len(), 1);
        assert_eq!(a.property_changed().observer_count(), 1);

        group.remove_action(&a);
        group.remove_action(&a);
        assert!(group.is_empty());
        assert_eq!(a.property_changed().observer_count(), 0);
        assert!(!group.can_execute());
    }

    #[test]
    fn test_removed_member_is_ignored() {
        let a = Action::new("a");
        let b = Action::new("b");
        b.set_can_execute(false);
        let group = ActionGroup::with_actions([&a, &b]);
        group.remove_action(&a);
        assert!(!group.can_execute());
        a.set_can_execute(false);
        a.set_can_execute(true);
        assert!(!group.can_execute());
    }

    #[test]
    fn test_dropped_group_detaches() {
        let a = Action::new("a");
        {
            let _group = ActionGroup::with_actions([&a]);
            assert_eq!(a.property_changed().observer_count(), 1);
        }
        assert_eq!(a.property_changed().observer_count(), 0);
        a.set_can_execute(false);
    }
}
