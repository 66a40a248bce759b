//! Sharded Pair Matcher
//!
//! Same contract as [`PairMatcher`](super::PairMatcher), but instead of one
//! lock for every key, keys are spread over the shards of a `DashMap`. Calls
//! on keys in different shards proceed in parallel; calls on the same key
//! are still serialized by that key's shard lock, which is all the per-key
//! FIFO guarantee needs.
//!
//! Both queues of a key live in a single map entry. The entry is removed once
//! both queues are empty.

use std::collections::VecDeque;
use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;

use dashmap::DashMap;

use super::pair::MatchCallback;
use super::queue::{drain, Matches};
use super::registration::{Entry, Registration, RegistrationId, Side};
use super::shape::{MatchShape, WithKey};
use super::stats::MatcherStats;
use crate::config::{MatcherConfig, ReusePolicy};
use crate::error::ConfigError;

/// Both queues for one key.
struct KeyQueues<D, P> {
    dependents: VecDeque<Entry<D>>,
    dependencies: VecDeque<Entry<P>>,
}

impl<D, P> KeyQueues<D, P> {
    fn is_empty(&self) -> bool {
        self.dependents.is_empty() && self.dependencies.is_empty()
    }
}

fn remove_entry<T>(queue: &mut VecDeque<Entry<T>>, id: RegistrationId) -> bool {
    match queue.iter().position(|entry| entry.id == id) {
        Some(position) => {
            queue.remove(position);
            true
        }
        None => false,
    }
}

impl<D, P> Default for KeyQueues<D, P> {
    fn default() -> Self {
        Self {
            dependents: VecDeque::new(),
            dependencies: VecDeque::new(),
        }
    }
}

/// Per-key FIFO matcher with lock sharding by key hash.
pub struct ShardedPairMatcher<K, D, P, S = WithKey>
where
    K: Hash + Eq,
    S: MatchShape<K, D, P>,
{
    policy: ReusePolicy,
    queues: DashMap<K, KeyQueues<D, P>>,
    callback: MatchCallback<S::Output>,
    _shape: PhantomData<fn() -> S>,
}

impl<K, D, P, S> ShardedPairMatcher<K, D, P, S>
where
    K: Hash + Eq + Clone,
    P: Clone,
    S: MatchShape<K, D, P>,
{
    /// Create a matcher with the map's default shard count.
    pub fn new<F>(policy: ReusePolicy, callback: F) -> Self
    where
        F: Fn(S::Output) + Send + Sync + 'static,
    {
        Self {
            policy,
            queues: DashMap::new(),
            callback: Box::new(callback),
            _shape: PhantomData,
        }
    }

    /// Create a matcher with an explicit shard count.
    ///
    /// `shards` must be a power of two greater than one.
    pub fn with_shards<F>(
        policy: ReusePolicy,
        shards: usize,
        callback: F,
    ) -> Result<Self, ConfigError>
    where
        F: Fn(S::Output) + Send + Sync + 'static,
    {
        MatcherConfig::new(policy).with_shards(shards).validate()?;
        Ok(Self {
            policy,
            queues: DashMap::with_shard_amount(shards),
            callback: Box::new(callback),
            _shape: PhantomData,
        })
    }

    /// Create a matcher from a validated config.
    pub fn from_config<F>(config: &MatcherConfig, callback: F) -> Result<Self, ConfigError>
    where
        F: Fn(S::Output) + Send + Sync + 'static,
    {
        match config.shards {
            Some(shards) => Self::with_shards(config.policy, shards, callback),
            None => Ok(Self::new(config.policy, callback)),
        }
    }

    /// The matcher's reuse policy.
    pub fn policy(&self) -> ReusePolicy {
        self.policy
    }

    /// Queue a dependent under `key`, invoking the callback for any matches.
    pub fn add_dependent(&self, key: K, dependent: D) -> Registration<K> {
        let registration = Registration::new(key, Side::Dependent);
        let matches = self.push(&registration, |queues| {
            queues.dependents.push_back(Entry {
                id: registration.id(),
                value: dependent,
            });
        });
        self.dispatch(matches);
        registration
    }

    /// Queue a dependency under `key`, invoking the callback for any matches.
    pub fn add_dependency(&self, key: K, dependency: P) -> Registration<K> {
        let registration = Registration::new(key, Side::Dependency);
        let matches = self.push(&registration, |queues| {
            queues.dependencies.push_back(Entry {
                id: registration.id(),
                value: dependency,
            });
        });
        self.dispatch(matches);
        registration
    }

    /// Withdraw a still-queued dependent or dependency.
    pub fn cancel(&self, registration: &Registration<K>) -> bool {
        let cancelled = match self.queues.get_mut(registration.key()) {
            Some(mut queues) => match registration.side() {
                Side::Dependent => remove_entry(&mut queues.dependents, registration.id()),
                Side::Dependency => remove_entry(&mut queues.dependencies, registration.id()),
            },
            None => false,
        };

        if cancelled {
            self.queues.remove_if(registration.key(), |_, queues| queues.is_empty());
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
        self.queues.get(key).map_or(0, |queues| queues.dependents.len())
    }

    /// Number of dependencies available on `key`.
    pub fn pending_dependencies(&self, key: &K) -> usize {
        self.queues.get(key).map_or(0, |queues| queues.dependencies.len())
    }

    /// Number of keys with anything queued.
    pub fn key_count(&self) -> usize {
        self.queues.len()
    }

    /// Snapshot of the queue sizes.
    ///
    /// Shards are visited one at a time, so under concurrent use the
    /// totals may mix states from slightly different moments.
    pub fn stats(&self) -> MatcherStats {
        let mut stats = MatcherStats {
            policy: self.policy,
            ..MatcherStats::default()
        };
        for queues in self.queues.iter() {
            if !queues.dependents.is_empty() {
                stats.dependent_keys += 1;
                stats.pending_dependents += queues.dependents.len();
            }
            if !queues.dependencies.is_empty() {
                stats.dependency_keys += 1;
                stats.pending_dependencies += queues.dependencies.len();
            }
        }
        stats
    }

    /// True when nothing is queued.
    pub fn is_idle(&self) -> bool {
        self.queues.is_empty()
    }

    /// Run `enqueue` and drain the key under its shard lock, then drop the
    /// entry if both queues ended up empty.
    fn push<F>(&self, registration: &Registration<K>, enqueue: F) -> Matches<K, D, P>
    where
        F: FnOnce(&mut KeyQueues<D, P>),
    {
        let key = registration.key();
        let mut matches = Matches::new();
        {
            let mut entry = self.queues.entry(key.clone()).or_default();
            let queues: &mut KeyQueues<D, P> = &mut entry;
            enqueue(queues);
            drain(
                key,
                self.policy,
                &mut queues.dependents,
                &mut queues.dependencies,
                &mut matches,
            );
        }
        // Re-checked under the shard lock, so a concurrent push is never lost.
        self.queues.remove_if(key, |_, queues| queues.is_empty());

        for matched in &matches {
            tracing::trace!(
                dependent = matched.dependent_registration.raw(),
                dependency = matched.dependency_registration.raw(),
                "formed match"
            );
        }
        matches
    }

    fn dispatch(&self, matches: Matches<K, D, P>) {
        for matched in matches {
            (self.callback)(S::shape(matched));
        }
    }
}

impl<K, D, P, S> fmt::Debug for ShardedPairMatcher<K, D, P, S>
where
    K: Hash + Eq + Clone,
    P: Clone,
    S: MatchShape<K, D, P>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShardedPairMatcher")
            .field("stats", &self.stats())
            .finish()
    }
}
