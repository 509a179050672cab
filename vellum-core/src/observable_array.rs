//! # Observable array
//!
//! [ObservableArray] wraps a `Vec<T>` and reports every mutation as a single normalized
//! [ArrayChange]: `removed_items` were removed at `index` and then `added_items_count` items
//! were inserted at the same position. Applying the change to the previous content always
//! yields the new content.
//!
//! Mutation goes through explicit methods named after the familiar array operations
//! (`push`, `pop`, `shift`, `unshift`, `splice`, `sort`, `reverse`, `fill`, `copy_within`, ...).
//! An operation that leaves the content untouched reports nothing.
//!
//! The change handler receives the array itself and may mutate it. Such re-entrant mutations
//! are applied directly without producing further changes. Only the thread running the
//! outermost mutation is re-entrant: mutations from other threads wait until it (including its
//! handler) finished and are then reported normally. A handler must not wait for another
//! thread that mutates the same array.
//!
//! Index arguments of `splice`, `fill` and `copy_within` are `isize`, negative values count
//! from the end of the array.

use std::cmp::Ordering;
use std::ops::Range;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, ThreadId};

use serde::Serialize;

use crate::error::Error;
use crate::lock;
use crate::observable::ArrayChangedArgs;

/// Net effect of one mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayChange<T> {
    pub index: usize,
    pub removed_items: Vec<T>,
    pub added_items_count: usize,
}

impl<T> ArrayChange<T> {
    pub fn new(index: usize, removed_items: Vec<T>, added_items_count: usize) -> Self {
        ArrayChange {
            index,
            removed_items,
            added_items_count,
        }
    }

    /// Length difference caused by the change.
    pub fn length_delta(&self) -> isize {
        self.added_items_count as isize - self.removed_items.len() as isize
    }
}

impl<T: Serialize> ArrayChange<T> {
    /// Convert to the payload of [Observable::notify_array_changed](crate::observable::Observable::notify_array_changed).
    pub fn to_args(&self, array_property_name: &str) -> Result<ArrayChangedArgs, Error> {
        let removed_items = self
            .removed_items
            .iter()
            .map(|item| serde_json::to_value(item).map_err(Error::serialization_error))
            .collect::<Result<Vec<_>, Error>>()?;
        Ok(ArrayChangedArgs {
            array_property_name: array_property_name.to_string(),
            index: self.index,
            removed_items,
            added_items_count: self.added_items_count,
        })
    }
}

pub type ArrayChangeHandler<T> = Arc<dyn Fn(&ObservableArray<T>, &ArrayChange<T>) + Send + Sync>;

struct ArrayInner<T> {
    items: Mutex<Vec<T>>,
    /// Thread running the outermost mutation.
    mutating: Mutex<Option<ThreadId>>,
    idle: Condvar,
    on_changed: ArrayChangeHandler<T>,
}

/// A `Vec<T>` reporting its mutations. Cloning creates another handle to the same array.
pub struct ObservableArray<T> {
    inner: Arc<ArrayInner<T>>,
}

impl<T> Clone for ObservableArray<T> {
    fn clone(&self) -> Self {
        ObservableArray {
            inner: self.inner.clone(),
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for ObservableArray<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(lock(&self.inner.items).iter()).finish()
    }
}

/// Releases the array to other threads when the outermost mutation finishes, also on unwind.
struct MutationGuard<'a> {
    mutating: &'a Mutex<Option<ThreadId>>,
    idle: &'a Condvar,
}

impl Drop for MutationGuard<'_> {
    fn drop(&mut self) {
        *lock(self.mutating) = None;
        self.idle.notify_all();
    }
}

fn normalize_index(index: isize, len: usize) -> usize {
    if index < 0 {
        len.saturating_sub(index.unsigned_abs())
    } else {
        (index as usize).min(len)
    }
}

/// Reports `range` as replaced if its content differs from `before`.
fn range_change<T: Clone + PartialEq>(
    items: &[T],
    range: Range<usize>,
    before: Vec<T>,
) -> Option<ArrayChange<T>> {
    if items[range.clone()] == before[..] {
        None
    } else {
        Some(ArrayChange::new(range.start, before, range.len()))
    }
}

impl<T: Clone + PartialEq + Send + 'static> ObservableArray<T> {
    /// Wrap `items`, reporting every subsequent change to `on_changed`.
    pub fn wrap(
        items: Vec<T>,
        on_changed: impl Fn(&ObservableArray<T>, &ArrayChange<T>) + Send + Sync + 'static,
    ) -> Self {
        ObservableArray {
            inner: Arc::new(ArrayInner {
                items: Mutex::new(items),
                mutating: Mutex::new(None),
                idle: Condvar::new(),
                on_changed: Arc::new(on_changed),
            }),
        }
    }

    /// Runs `op` on the items and reports the change it returns, unless this thread is already
    /// mutating the array, in which case the change is dropped.
    fn mutate<R>(&self, op: impl FnOnce(&mut Vec<T>) -> (R, Option<ArrayChange<T>>)) -> R {
        let current = thread::current().id();
        let reentrant = {
            let mut mutating = lock(&self.inner.mutating);
            if *mutating == Some(current) {
                true
            } else {
                while mutating.is_some() {
                    mutating = self
                        .inner
                        .idle
                        .wait(mutating)
                        .unwrap_or_else(PoisonError::into_inner);
                }
                *mutating = Some(current);
                false
            }
        };
        if reentrant {
            let (result, _) = op(&mut *lock(&self.inner.items));
            return result;
        }
        let _guard = MutationGuard {
            mutating: &self.inner.mutating,
            idle: &self.inner.idle,
        };
        let (result, change) = {
            let mut items = lock(&self.inner.items);
            op(&mut *items)
        };
        if let Some(change) = change {
            (self.inner.on_changed)(self, &change);
        }
        result
    }

    pub fn len(&self) -> usize {
        lock(&self.inner.items).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.inner.items).is_empty()
    }

    pub fn get(&self, index: usize) -> Option<T> {
        lock(&self.inner.items).get(index).cloned()
    }

    pub fn first(&self) -> Option<T> {
        lock(&self.inner.items).first().cloned()
    }

    pub fn last(&self) -> Option<T> {
        lock(&self.inner.items).last().cloned()
    }

    pub fn contains(&self, item: &T) -> bool {
        lock(&self.inner.items).contains(item)
    }

    pub fn index_of(&self, item: &T) -> Option<usize> {
        lock(&self.inner.items).iter().position(|x| x == item)
    }

    pub fn to_vec(&self) -> Vec<T> {
        lock(&self.inner.items).clone()
    }

    /// Read access to the items. The array must not be mutated from inside `f`.
    pub fn with<R>(&self, f: impl FnOnce(&[T]) -> R) -> R {
        f(lock(&self.inner.items).as_slice())
    }

    /// Replace the item at `index`. `index == len()` appends; a larger index is an error.
    pub fn set(&self, index: usize, value: T) -> Result<(), Error> {
        self.mutate(|items| {
            let len = items.len();
            if index < len {
                if items[index] == value {
                    return (Ok(()), None);
                }
                let old = std::mem::replace(&mut items[index], value);
                (Ok(()), Some(ArrayChange::new(index, vec![old], 1)))
            } else if index == len {
                items.push(value);
                (Ok(()), Some(ArrayChange::new(index, Vec::new(), 1)))
            } else {
                (Err(Error::index_out_of_range(index, len)), None)
            }
        })
    }

    /// Shorten the array to `len` items. Does nothing if the array is not longer than `len`.
    pub fn truncate(&self, len: usize) {
        self.mutate(|items| {
            if len >= items.len() {
                return ((), None);
            }
            let removed = items.split_off(len);
            ((), Some(ArrayChange::new(len, removed, 0)))
        })
    }

    pub fn clear(&self) {
        self.truncate(0)
    }

    /// Append one item, returns the new length.
    pub fn push(&self, value: T) -> usize {
        self.push_all(vec![value])
    }

    /// Append items, returns the new length.
    pub fn push_all(&self, values: Vec<T>) -> usize {
        self.mutate(|items| {
            let index = items.len();
            let added = values.len();
            items.extend(values);
            let change = (added > 0).then(|| ArrayChange::new(index, Vec::new(), added));
            (items.len(), change)
        })
    }

    pub fn pop(&self) -> Option<T> {
        self.mutate(|items| match items.pop() {
            Some(value) => {
                let change = ArrayChange::new(items.len(), vec![value.clone()], 0);
                (Some(value), Some(change))
            }
            None => (None, None),
        })
    }

    pub fn shift(&self) -> Option<T> {
        self.mutate(|items| {
            if items.is_empty() {
                return (None, None);
            }
            let value = items.remove(0);
            let change = ArrayChange::new(0, vec![value.clone()], 0);
            (Some(value), Some(change))
        })
    }

    /// Insert items at the front, returns the new length.
    pub fn unshift(&self, values: Vec<T>) -> usize {
        self.mutate(|items| {
            let added = values.len();
            items.splice(0..0, values);
            let change = (added > 0).then(|| ArrayChange::new(0, Vec::new(), added));
            (items.len(), change)
        })
    }

    /// Remove `delete_count` items starting at `start` and insert `values` in their place.
    /// `None` removes everything from `start` to the end. Returns the removed items.
    pub fn splice(&self, start: isize, delete_count: Option<usize>, values: Vec<T>) -> Vec<T> {
        self.mutate(|items| {
            let len = items.len();
            let start = normalize_index(start, len);
            let delete_count = delete_count.unwrap_or(len - start).min(len - start);
            let added = values.len();
            let removed: Vec<T> = items.splice(start..start + delete_count, values).collect();
            let change = (!removed.is_empty() || added > 0)
                .then(|| ArrayChange::new(start, removed.clone(), added));
            (removed, change)
        })
    }

    pub fn sort_by(&self, compare: impl FnMut(&T, &T) -> Ordering) {
        self.mutate(|items| {
            let before = items.clone();
            items.sort_by(compare);
            let len = items.len();
            ((), range_change(items, 0..len, before))
        })
    }

    pub fn reverse(&self) {
        self.mutate(|items| {
            let before = items.clone();
            items.reverse();
            let len = items.len();
            ((), range_change(items, 0..len, before))
        })
    }

    /// Set every item in `start..end` to `value`. `None` bounds mean the whole array.
    pub fn fill(&self, value: T, start: Option<isize>, end: Option<isize>) {
        self.mutate(|items| {
            let len = items.len();
            let start = normalize_index(start.unwrap_or(0), len);
            let end = end.map_or(len, |end| normalize_index(end, len));
            if start >= end {
                return ((), None);
            }
            let before = items[start..end].to_vec();
            items[start..end].fill(value);
            ((), range_change(items, start..end, before))
        })
    }

    /// Copy the items of `start..end` to position `target`, without changing the length.
    pub fn copy_within(&self, target: isize, start: isize, end: Option<isize>) {
        self.mutate(|items| {
            let len = items.len();
            let to = normalize_index(target, len);
            let from = normalize_index(start, len);
            let until = end.map_or(len, |end| normalize_index(end, len));
            let count = until.saturating_sub(from).min(len - to);
            if count == 0 {
                return ((), None);
            }
            let source = items[from..from + count].to_vec();
            let before = items[to..to + count].to_vec();
            items[to..to + count].clone_from_slice(&source);
            ((), range_change(items, to..to + count, before))
        })
    }
}

impl<T: Clone + Ord + Send + 'static> ObservableArray<T> {
    pub fn sort(&self) {
        self.sort_by(|a, b| a.cmp(b))
    }
}
