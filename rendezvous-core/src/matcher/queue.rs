//! Per-key FIFO queues and the draining algorithm.
//!
//! # Algorithm
//!
//! Each key owns two queues: dependents waiting for a match, and
//! dependencies available to satisfy them. After anything is pushed for a
//! key, the key is drained:
//!
//! 1. While both queues are non-empty, pop the head of each and form a match.
//! 2. Under the reusable policy, push the popped dependency back onto the
//!    tail of its queue before continuing.
//! 3. Once the loop ends, delete either queue from its map if it is empty.
//!
//! Step 2 means a single reusable dependency serves every dependent already
//! waiting in one pass, and multiple reusable dependencies take turns in
//! round-robin order.
//!
//! Nothing here is synchronized; callers wrap [`PairQueues`] in a lock.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

use smallvec::SmallVec;

use super::registration::{Entry, Registration, RegistrationId, Side};
use super::shape::KeyedMatch;
use super::stats::MatcherStats;
use crate::config::ReusePolicy;

/// Matches formed by a single push, in formation order.
///
/// One push usually forms zero or one match, so a few slots are kept inline.
pub type Matches<K, D, P> = SmallVec<[KeyedMatch<K, D, P>; 4]>;

/// Pair up the heads of `dependents` and `dependencies` until one runs out.
pub(crate) fn drain<K, D, P>(
    key: &K,
    policy: ReusePolicy,
    dependents: &mut VecDeque<Entry<D>>,
    dependencies: &mut VecDeque<Entry<P>>,
    matches: &mut Matches<K, D, P>,
) where
    K: Clone,
    P: Clone,
{
    while !dependents.is_empty() && !dependencies.is_empty() {
        let (Some(dependent), Some(dependency)) = (dependents.pop_front(), dependencies.pop_front())
        else {
            break;
        };

        let dependency_registration = dependency.id;
        let value = if policy.is_reusable() {
            let value = dependency.value.clone();
            dependencies.push_back(dependency);
            value
        } else {
            dependency.value
        };

        matches.push(KeyedMatch {
            key: key.clone(),
            dependent: dependent.value,
            dependency: value,
            dependent_registration: dependent.id,
            dependency_registration,
        });
    }
}

/// Remove the entry with `id` from `key`'s queue, dropping the queue if it
/// ends up empty.
pub(crate) fn withdraw<K, T>(
    queues: &mut HashMap<K, VecDeque<Entry<T>>>,
    key: &K,
    id: RegistrationId,
) -> bool
where
    K: Hash + Eq,
{
    let Some(queue) = queues.get_mut(key) else {
        return false;
    };
    let Some(position) = queue.iter().position(|entry| entry.id == id) else {
        return false;
    };

    queue.remove(position);
    if queue.is_empty() {
        queues.remove(key);
    }
    true
}

/// The unlocked matching state for one reuse policy.
pub(crate) struct PairQueues<K, D, P> {
    policy: ReusePolicy,

    /// Pending dependents per key. Keys with no pending dependents are absent.
    dependents: HashMap<K, VecDeque<Entry<D>>>,

    /// Pending dependencies per key. Keys with no pending dependencies are absent.
    dependencies: HashMap<K, VecDeque<Entry<P>>>,
}

impl<K, D, P> PairQueues<K, D, P>
where
    K: Hash + Eq + Clone,
    P: Clone,
{
    pub(crate) fn new(policy: ReusePolicy) -> Self {
        Self {
            policy,
            dependents: HashMap::new(),
            dependencies: HashMap::new(),
        }
    }

    pub(crate) fn policy(&self) -> ReusePolicy {
        self.policy
    }

    /// Queue a dependent and drain its key.
    pub(crate) fn push_dependent(
        &mut self,
        key: K,
        dependent: D,
    ) -> (Registration<K>, Matches<K, D, P>) {
        let registration = Registration::new(key.clone(), Side::Dependent);
        self.dependents
            .entry(key)
            .or_default()
            .push_back(Entry {
                id: registration.id(),
                value: dependent,
            });

        let matches = self.drain_key(registration.key());
        (registration, matches)
    }

    /// Queue a dependency and drain its key.
    pub(crate) fn push_dependency(
        &mut self,
        key: K,
        dependency: P,
    ) -> (Registration<K>, Matches<K, D, P>) {
        let registration = Registration::new(key.clone(), Side::Dependency);
        self.dependencies
            .entry(key)
            .or_default()
            .push_back(Entry {
                id: registration.id(),
                value: dependency,
            });

        let matches = self.drain_key(registration.key());
        (registration, matches)
    }

    /// Put dependencies back at the head of their queues, keeping their
    /// relative order, then drain the affected keys.
    ///
    /// Used when matched dependencies could not be handed over, so they keep
    /// their place ahead of dependencies that arrived after them.
    pub(crate) fn restore_dependencies(&mut self, restored: Vec<(K, P)>) -> Matches<K, D, P> {
        let mut keys: Vec<K> = Vec::with_capacity(restored.len());
        for (key, dependency) in restored.into_iter().rev() {
            self.dependencies
                .entry(key.clone())
                .or_default()
                .push_front(Entry {
                    id: RegistrationId::new(),
                    value: dependency,
                });
            keys.push(key);
        }

        let mut matches = Matches::new();
        for key in keys.iter().rev() {
            matches.extend(self.drain_key(key));
        }
        matches
    }

    /// Withdraw a still-queued entry.
    pub(crate) fn cancel(&mut self, registration: &Registration<K>) -> bool {
        match registration.side() {
            Side::Dependent => {
                withdraw(&mut self.dependents, registration.key(), registration.id())
            }
            Side::Dependency => {
                withdraw(&mut self.dependencies, registration.key(), registration.id())
            }
        }
    }

    fn drain_key(&mut self, key: &K) -> Matches<K, D, P> {
        let mut matches = Matches::new();

        if let (Some(dependents), Some(dependencies)) =
            (self.dependents.get_mut(key), self.dependencies.get_mut(key))
        {
            drain(key, self.policy, dependents, dependencies, &mut matches);
        }

        if self.dependents.get(key).is_some_and(VecDeque::is_empty) {
            self.dependents.remove(key);
        }
        if self.dependencies.get(key).is_some_and(VecDeque::is_empty) {
            self.dependencies.remove(key);
        }

        matches
    }

    pub(crate) fn pending_dependents(&self, key: &K) -> usize {
        self.dependents.get(key).map_or(0, VecDeque::len)
    }

    pub(crate) fn pending_dependencies(&self, key: &K) -> usize {
        self.dependencies.get(key).map_or(0, VecDeque::len)
    }

    pub(crate) fn stats(&self) -> MatcherStats {
        MatcherStats {
            policy: self.policy,
            dependent_keys: self.dependents.len(),
            dependency_keys: self.dependencies.len(),
            pending_dependents: self.dependents.values().map(VecDeque::len).sum(),
            pending_dependencies: self.dependencies.values().map(VecDeque::len).sum(),
        }
    }
}
