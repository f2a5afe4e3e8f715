//! Per-slot subscriber lists and change broadcast.

use crate::watcher::{Watcher, WeakWatcher};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

/// The watchers depending on one observable slot, in registration order.
///
/// The set holds watchers weakly and does not own their lifecycle: a
/// watcher whose last handle is dropped is skipped by `broadcast` and pruned
/// on the next registration. Registration appends unconditionally, so
/// registering the same watcher twice makes it run twice per broadcast.
#[derive(Clone, Default)]
pub struct SubscriberSet {
    subscribers: Vec<WeakWatcher>,
}

impl SubscriberSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a watcher, dropping registrations of watchers that are gone.
    pub fn register(&mut self, watcher: &Watcher) {
        self.subscribers.retain(WeakWatcher::is_alive);
        self.subscribers.push(watcher.downgrade());
    }

    /// Number of live registrations, duplicates included.
    pub fn len(&self) -> usize {
        self.subscribers.iter().filter(|weak| weak.is_alive()).count()
    }

    /// Whether no live watcher is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `watcher` is registered at least once.
    pub fn contains(&self, watcher: &Watcher) -> bool {
        self.iter().any(|registered| &registered == watcher)
    }

    /// Iterate the live registered watchers in order.
    pub fn iter(&self) -> impl Iterator<Item = Watcher> + '_ {
        self.subscribers.iter().filter_map(WeakWatcher::upgrade)
    }

    /// Invalidate every registered watcher, in registration order.
    ///
    /// Each invalidation is isolated: a watcher whose callback panics is
    /// logged and skipped, and the rest of the set still runs. Watchers
    /// dropped before their turn are skipped. Returns the number of watchers
    /// that panicked.
    pub fn broadcast(&self) -> usize {
        tracing::trace!(subscribers = self.subscribers.len(), "broadcasting change");
        let mut failures = 0;
        for watcher in self.iter() {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| watcher.invalidate()));
            if let Err(payload) = outcome {
                failures += 1;
                tracing::error!(
                    key = %watcher.key(),
                    panic = panic_message(payload.as_ref()),
                    "subscriber panicked during broadcast"
                );
            }
        }
        failures
    }
}

impl std::fmt::Debug for SubscriberSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.iter().map(|watcher| watcher.key()))
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
