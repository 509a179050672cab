use std::collections::HashMap;

use crate::action::Action;

/// Ordered set of actions, addressable by name.
#[derive(Clone, Debug, Default)]
pub struct ActionCollection {
    actions: Vec<Action>,
    index: HashMap<String, usize>,
}

impl ActionCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an action. An action with the same name is replaced in place.
    pub fn push(&mut self, action: Action) {
        match self.index.get(action.name()) {
            Some(&i) => self.actions[i] = action,
            None => {
                self.index.insert(action.name().to_string(), self.actions.len());
                self.actions.push(action);
            }
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Action> {
        let i = self.index.remove(name)?;
        let action = self.actions.remove(i);
        for position in self.index.values_mut() {
            if *position > i {
                *position -= 1;
            }
        }
        Some(action)
    }

    pub fn by_name(&self, name: &str) -> Option<&Action> {
        self.index.get(name).map(|&i| &self.actions[i])
    }

    pub fn as_sequence(&self) -> &[Action] {
        &self.actions
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.actions.iter().map(|a| a.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Action> {
        self.actions.iter()
    }
}

impl FromIterator<Action> for ActionCollection {
    fn from_iter<I: IntoIterator<Item = Action>>(iter: I) -> Self {
        let mut collection = ActionCollection::new();
        for action in iter {
            collection.push(action);
        }
        collection
    }
}

impl<'a> IntoIterator for &'a ActionCollection {
    type Item = &'a Action;
    type IntoIter = std::slice::Iter<'a, Action>;

    fn into_iter(self) -> Self::IntoIter {
        self.actions.iter()
    }
}
