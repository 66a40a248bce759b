//! Registration handles.
//!
//! Every dependent and every dependency queued in a matcher is tagged with a
//! unique [`RegistrationId`]. The [`Registration`] returned to the caller is
//! the capability to withdraw that entry again while it is still queued.

use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for one queued entry.
///
/// IDs come from a process-wide atomic counter, so they are unique across
/// matcher instances and threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RegistrationId(u64);

impl RegistrationId {
    /// Generate a new unique registration ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for RegistrationId {
    fn default() -> Self {
        Self::new()
    }
}

/// Which queue of a key an entry was placed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// A consumer waiting for a dependency.
    Dependent,

    /// A resource that satisfies dependents.
    Dependency,
}

/// Handle to a queued entry.
///
/// Holding a registration does not keep anything alive; dropping it simply
/// gives up the ability to cancel. Pass it to the matcher's `cancel` to
/// withdraw the entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Registration<K> {
    id: RegistrationId,
    key: K,
    side: Side,
}

impl<K> Registration<K> {
    pub(crate) fn new(key: K, side: Side) -> Self {
        Self {
            id: RegistrationId::new(),
            key,
            side,
        }
    }

    /// The entry's unique ID.
    pub fn id(&self) -> RegistrationId {
        self.id
    }

    /// The key the entry was queued under.
    pub fn key(&self) -> &K {
        &self.key
    }

    /// The queue the entry was placed in.
    pub fn side(&self) -> Side {
        self.side
    }
}

/// A queued value together with the ID of the registration that put it there.
#[derive(Debug, Clone)]
pub(crate) struct Entry<T> {
    pub(crate) id: RegistrationId,
    pub(crate) value: T,
}
