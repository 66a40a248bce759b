//! Match Engine
//!
//! The engine is the thread-safe core shared by every matcher in the crate.
//! It owns one exclusive section guarding all per-key queues of one reuse
//! policy, and it returns the matches a call formed instead of invoking
//! anything itself. Callers decide what to do with those matches after the
//! lock is gone.
//!
//! # Thread Safety
//!
//! A single `parking_lot::Mutex` covers every key. Calls on different keys
//! are serialized too; in exchange there is no lock ordering between keys
//! to get wrong. See `ShardedPairMatcher` for the per-shard alternative.

use std::hash::Hash;

use parking_lot::Mutex;

use super::queue::{Matches, PairQueues};
use super::registration::Registration;
use super::stats::MatcherStats;
use crate::config::ReusePolicy;

/// The outcome of queueing one dependent or dependency.
#[derive(Debug)]
pub struct Offer<K, D, P> {
    /// Handle for withdrawing the queued entry.
    pub registration: Registration<K>,

    /// Matches formed by this call, in formation order.
    pub matches: Matches<K, D, P>,
}

/// Locked per-key FIFO matching for one reuse policy.
pub struct MatchEngine<K, D, P> {
    queues: Mutex<PairQueues<K, D, P>>,
}

impl<K, D, P> MatchEngine<K, D, P>
where
    K: Hash + Eq + Clone,
    P: Clone,
{
    /// Create an empty engine with the given reuse policy.
    pub fn new(policy: ReusePolicy) -> Self {
        Self {
            queues: Mutex::new(PairQueues::new(policy)),
        }
    }

    /// The engine's reuse policy.
    pub fn policy(&self) -> ReusePolicy {
        self.queues.lock().policy()
    }

    /// Queue a dependent under `key` and drain the key.
    pub fn offer_dependent(&self, key: K, dependent: D) -> Offer<K, D, P> {
        let (registration, matches) = self.queues.lock().push_dependent(key, dependent);
        Self::trace_matches(&matches);
        Offer {
            registration,
            matches,
        }
    }

    /// Queue a dependency under `key` and drain the key.
    pub fn offer_dependency(&self, key: K, dependency: P) -> Offer<K, D, P> {
        let (registration, matches) = self.queues.lock().push_dependency(key, dependency);
        Self::trace_matches(&matches);
        Offer {
            registration,
            matches,
        }
    }

    /// Put dependencies back at the head of their queues, in order, and
    /// drain the affected keys.
    pub(crate) fn restore_dependencies(&self, restored: Vec<(K, P)>) -> Matches<K, D, P> {
        let matches = self.queues.lock().restore_dependencies(restored);
        Self::trace_matches(&matches);
        matches
    }

    /// Withdraw a still-queued entry.
    ///
    /// Returns `false` if the entry was already matched (and consumed),
    /// already cancelled, or belongs to another engine.
    pub fn cancel(&self, registration: &Registration<K>) -> bool {
        let cancelled = self.queues.lock().cancel(registration);
        if cancelled {
            tracing::debug!(
                registration = registration.id().raw(),
                side = ?registration.side(),
                "cancelled registration"
            );
        }
        cancelled
    }

    /// Number of dependents waiting on `key`.
    pub fn pending_dependents(&self, key: &K) -> usize {
        self.queues.lock().pending_dependents(key)
    }

    /// Number of dependencies available on `key`.
    pub fn pending_dependencies(&self, key: &K) -> usize {
        self.queues.lock().pending_dependencies(key)
    }

    /// Snapshot of the queue sizes.
    pub fn stats(&self) -> MatcherStats {
        self.queues.lock().stats()
    }

    /// True when nothing is queued.
    pub fn is_idle(&self) -> bool {
        self.stats().is_idle()
    }

    fn trace_matches(matches: &Matches<K, D, P>) {
        for matched in matches {
            tracing::trace!(
                dependent = matched.dependent_registration.raw(),
                dependency = matched.dependency_registration.raw(),
                "formed match"
            );
        }
    }
}
