//! Per-key single-flight with latest-wins coalescing
//!
//! Every key has at most one owner draining it. While the owner is busy, new
//! items for the same key replace the pending one instead of queueing behind
//! it, since only the newest snapshot of a resource matters.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug)]
struct Slot<T> {
    pending: Option<T>,
}

#[derive(Debug)]
pub(crate) struct KeyedQueue<T> {
    slots: Mutex<HashMap<String, Slot<T>>>,
}

/// Outcome of [`KeyedQueue::push`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Push {
    /// No owner existed; the caller now owns the key and must drain it
    Owner,
    /// An owner exists and will pick the item up
    Queued,
    /// An owner exists and the item replaced an older pending one
    Replaced,
}

impl<T> Default for KeyedQueue<T> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<T> KeyedQueue<T> {
    fn slots(&self) -> MutexGuard<'_, HashMap<String, Slot<T>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn push(&self, key: &str, item: T) -> Push {
        let mut slots = self.slots();
        match slots.get_mut(key) {
            Some(slot) => match slot.pending.replace(item) {
                Some(_) => Push::Replaced,
                None => Push::Queued,
            },
            None => {
                slots.insert(key.to_string(), Slot { pending: Some(item) });
                Push::Owner
            }
        }
    }

    /// Next item for the owner of `key`.
    ///
    /// Returns `None` once nothing is pending, and releases ownership in the
    /// same step so a concurrent push becomes the new owner.
    pub(crate) fn next(&self, key: &str) -> Option<T> {
        let mut slots = self.slots();
        let item = slots.get_mut(key).and_then(|slot| slot.pending.take());
        if item.is_none() {
            slots.remove(key);
        }
        item
    }

    /// Keys that currently have an owner
    pub(crate) fn active(&self) -> usize {
        self.slots().len()
    }
}
