//! Pair Matcher
//!
//! A [`PairMatcher`] is a [`MatchEngine`] plus a completion callback. Every
//! match a call forms is handed to the callback, in formation order, on the
//! calling thread, after the engine's lock has been released.
//!
//! # How It Works
//!
//! 1. `add_dependent` / `add_dependency` queue the value under its key.
//!
//! 2. The key is drained while the lock is held; formed matches are
//!    collected, not dispatched.
//!
//! 3. The lock is released and the callback runs once per match.
//!
//! Because of step 3 a callback may call back into the same matcher (for
//! example to queue a follow-up dependent) without deadlocking.
//!
//! # Callback Shape
//!
//! The shape parameter picks what the callback receives:
//!
//! - [`KeyedPairMatcher`]: a [`KeyedMatch`](super::KeyedMatch) carrying the key
//! - [`CachedPairMatcher`]: a [`MatchedPair`](super::MatchedPair) without it

use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;

use super::engine::{MatchEngine, Offer};
use super::registration::Registration;
use super::shape::{MatchShape, WithKey, WithoutKey};
use super::stats::MatcherStats;
use crate::config::{MatcherConfig, ReusePolicy};

/// Completion callback invoked once per formed match.
pub type MatchCallback<T> = Box<dyn Fn(T) + Send + Sync>;

/// Per-key FIFO matcher that reports each match to a callback.
///
/// # Example
///
/// ```rust,ignore
/// let matcher: KeyedPairMatcher<&str, &str, &str> =
///     KeyedPairMatcher::new(ReusePolicy::Consumable, |m| {
///         println!("{} got {} via {}", m.dependent, m.dependency, m.key);
///     });
///
/// matcher.add_dependent("db", "worker 0");
/// matcher.add_dependency("db", "connection 0"); // callback fires here
/// ```
pub struct PairMatcher<K, D, P, S>
where
    S: MatchShape<K, D, P>,
{
    engine: MatchEngine<K, D, P>,
    callback: MatchCallback<S::Output>,
    _shape: PhantomData<fn() -> S>,
}

/// Matcher whose callback receives the key alongside the pair.
pub type KeyedPairMatcher<K, D, P> = PairMatcher<K, D, P, WithKey>;

/// Matcher whose callback receives only `(dependent, dependency)`.
pub type CachedPairMatcher<K, D, P> = PairMatcher<K, D, P, WithoutKey>;

impl<K, D, P, S> PairMatcher<K, D, P, S>
where
    K: Hash + Eq + Clone,
    P: Clone,
    S: MatchShape<K, D, P>,
{
    /// Create a matcher with a fixed reuse policy and completion callback.
    pub fn new<F>(policy: ReusePolicy, callback: F) -> Self
    where
        F: Fn(S::Output) + Send + Sync + 'static,
    {
        Self {
            engine: MatchEngine::new(policy),
            callback: Box::new(callback),
            _shape: PhantomData,
        }
    }

    /// Create a matcher from a config. Only the policy is used.
    pub fn from_config<F>(config: &MatcherConfig, callback: F) -> Self
    where
        F: Fn(S::Output) + Send + Sync + 'static,
    {
        Self::new(config.policy, callback)
    }

    /// The matcher's reuse policy.
    pub fn policy(&self) -> ReusePolicy {
        self.engine.policy()
    }

    /// Queue a dependent under `key`, invoking the callback for any matches.
    pub fn add_dependent(&self, key: K, dependent: D) -> Registration<K> {
        let offer = self.engine.offer_dependent(key, dependent);
        self.dispatch(offer)
    }

    /// Queue a dependency under `key`, invoking the callback for any matches.
    pub fn add_dependency(&self, key: K, dependency: P) -> Registration<K> {
        let offer = self.engine.offer_dependency(key, dependency);
        self.dispatch(offer)
    }

    /// Withdraw a still-queued dependent or dependency.
    ///
    /// Returns `false` if the entry is no longer queued.
    pub fn cancel(&self, registration: &Registration<K>) -> bool {
        self.engine.cancel(registration)
    }

    /// Number of dependents waiting on `key`.
    pub fn pending_dependents(&self, key: &K) -> usize {
        self.engine.pending_dependents(key)
    }

    /// Number of dependencies available on `key`.
    pub fn pending_dependencies(&self, key: &K) -> usize {
        self.engine.pending_dependencies(key)
    }

    /// Snapshot of the queue sizes.
    pub fn stats(&self) -> MatcherStats {
        self.engine.stats()
    }

    /// True when nothing is queued.
    pub fn is_idle(&self) -> bool {
        self.engine.is_idle()
    }

    // The engine lock is already released by the time an Offer exists.
    fn dispatch(&self, offer: Offer<K, D, P>) -> Registration<K> {
        for matched in offer.matches {
            (self.callback)(S::shape(matched));
        }
        offer.registration
    }
}

impl<K, D, P, S> fmt::Debug for PairMatcher<K, D, P, S>
where
    K: Hash + Eq + Clone,
    P: Clone,
    S: MatchShape<K, D, P>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PairMatcher")
            .field("stats", &self.stats())
            .finish()
    }
}
