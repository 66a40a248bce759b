//! Aggregate Barrier
//!
//! An [`AggregateBarrier`] lets a dependent wait on several keys at once and
//! be told exactly once, with every resolved `(dependency, key)` pair, when
//! all of them are satisfied.
//!
//! # How It Works
//!
//! 1. The barrier owns two match engines: one reusable, one consumable.
//!
//! 2. `add_dependent` records how many key instances the dependent needs
//!    and queues it once per requested key in the matching engine. Asking
//!    for the same key twice needs two separate matches.
//!
//! 3. `add_dependency` queues a dependency in the engine named by its reuse
//!    policy.
//!
//! 4. Every match either call produces is credited to its dependent. When a
//!    dependent's credited count reaches its requested count, its
//!    bookkeeping is removed and the completion callback fires.
//!
//! # Thread Safety
//!
//! The barrier's own lock is held for the whole of steps 2 to 4, including
//! the calls into the engines (lock order is always barrier, then engine).
//! Completion callbacks run after the barrier lock is released.

use std::fmt;
use std::hash::Hash;

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::Serialize;

use super::obligation::{Obligation, Resolution};
use crate::config::ReusePolicy;
use crate::error::BarrierError;
use crate::matcher::{KeyedMatch, MatchEngine, MatcherStats, Matches, Registration};

/// Callback invoked once per completed dependent.
pub type CompletionCallback<K, D, P> = Box<dyn Fn(D, Vec<Resolution<K, P>>) + Send + Sync>;

type Completed<K, D, P> = Vec<(D, Vec<Resolution<K, P>>)>;

/// Point-in-time view of a barrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BarrierStats {
    /// Queues of the reusable engine.
    pub reusable: MatcherStats,

    /// Queues of the consumable engine.
    pub consumable: MatcherStats,

    /// Dependents still waiting on at least one key.
    pub pending_obligations: usize,
}

/// Multi-key completion barrier over a reusable and a consumable engine.
///
/// # Example
///
/// ```rust,ignore
/// let barrier = AggregateBarrier::new(|job, resolved| {
///     println!("{job} ready with {} inputs", resolved.len());
/// });
///
/// barrier.add_dependent("job", ["config"], ["input 0", "input 1"])?;
/// barrier.add_dependency("config", cfg, ReusePolicy::Reusable);
/// barrier.add_dependency("input 0", a, ReusePolicy::Consumable);
/// barrier.add_dependency("input 1", b, ReusePolicy::Consumable); // fires
/// ```
pub struct AggregateBarrier<K, D, P> {
    reusable: MatchEngine<K, D, P>,
    consumable: MatchEngine<K, D, P>,

    /// In-flight obligations, in registration order.
    obligations: Mutex<IndexMap<D, Obligation<K, P>>>,

    callback: CompletionCallback<K, D, P>,
}

impl<K, D, P> AggregateBarrier<K, D, P>
where
    K: Hash + Eq + Clone,
    D: Hash + Eq + Clone,
    P: Clone,
{
    /// Create an empty barrier.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(D, Vec<Resolution<K, P>>) + Send + Sync + 'static,
    {
        Self {
            reusable: MatchEngine::new(ReusePolicy::Reusable),
            consumable: MatchEngine::new(ReusePolicy::Consumable),
            obligations: Mutex::new(IndexMap::new()),
            callback: Box::new(callback),
        }
    }

    /// Register `dependent` as needing one match per listed key instance.
    ///
    /// Keys in `reusable_keys` are satisfied by reusable dependencies, keys
    /// in `nonreusable_keys` by consumable ones. A dependent with no keys at
    /// all completes immediately with an empty list.
    ///
    /// Fails with [`BarrierError::DuplicateRegistration`] if `dependent`
    /// already has an obligation that has not completed; nothing is queued
    /// in that case.
    pub fn add_dependent<R, N>(
        &self,
        dependent: D,
        reusable_keys: R,
        nonreusable_keys: N,
    ) -> Result<(), BarrierError>
    where
        R: IntoIterator<Item = K>,
        N: IntoIterator<Item = K>,
    {
        let completed = {
            let mut obligations = self.obligations.lock();
            if obligations.contains_key(&dependent) {
                tracing::warn!("rejected barrier registration for a dependent already in flight");
                return Err(BarrierError::DuplicateRegistration);
            }

            let requests: Vec<(K, ReusePolicy)> = reusable_keys
                .into_iter()
                .map(|key| (key, ReusePolicy::Reusable))
                .chain(
                    nonreusable_keys
                        .into_iter()
                        .map(|key| (key, ReusePolicy::Consumable)),
                )
                .collect();

            let mut obligation = Obligation::new(requests.len());
            let mut matches = Matches::new();
            for (key, policy) in requests {
                let offer = self.engine(policy).offer_dependent(key, dependent.clone());
                obligation.track(offer.registration, policy);
                matches.extend(offer.matches);
            }

            tracing::debug!(
                required = obligation.required(),
                immediate = matches.len(),
                "registered barrier obligation"
            );
            obligations.insert(dependent.clone(), obligation);

            let mut completed = Self::settle(&mut obligations, matches);
            // Only reachable with zero requested keys; anything else is
            // settled above.
            if obligations.get(&dependent).is_some_and(Obligation::is_satisfied) {
                if let Some((dependent, obligation)) = obligations.shift_remove_entry(&dependent) {
                    completed.push((dependent, obligation.into_parts().0));
                }
            }
            completed
        };

        self.notify(completed);
        Ok(())
    }

    /// Offer a dependency under `key`.
    ///
    /// The policy picks which engine it goes to; a reusable dependency only
    /// satisfies keys that dependents listed as reusable, and likewise for
    /// consumable ones.
    pub fn add_dependency(
        &self,
        key: K,
        dependency: P,
        policy: impl Into<ReusePolicy>,
    ) -> Registration<K> {
        let (registration, completed) = {
            let mut obligations = self.obligations.lock();
            let offer = self.engine(policy.into()).offer_dependency(key, dependency);
            let completed = Self::settle(&mut obligations, offer.matches);
            (offer.registration, completed)
        };

        self.notify(completed);
        registration
    }

    /// Withdraw a dependency that is still queued.
    pub fn cancel_dependency(&self, registration: &Registration<K>) -> bool {
        self.reusable.cancel(registration) || self.consumable.cancel(registration)
    }

    /// Withdraw a dependent's in-flight obligation.
    ///
    /// Every still-queued registration of the dependent is removed and its
    /// bookkeeping deleted. Returns the pairs already resolved on its behalf,
    /// so consumed dependencies can be offered again, or `None` if the
    /// dependent had no obligation in flight.
    pub fn cancel_dependent(&self, dependent: &D) -> Option<Vec<Resolution<K, P>>> {
        let mut obligations = self.obligations.lock();
        let obligation = obligations.shift_remove(dependent)?;

        let (resolved, outstanding) = obligation.into_parts();
        let withdrawn = outstanding.len();
        for pending in outstanding {
            self.engine(pending.policy).cancel(&pending.registration);
        }

        tracing::debug!(
            withdrawn,
            resolved = resolved.len(),
            "cancelled barrier obligation"
        );
        Some(resolved)
    }

    /// Check if `dependent` has an obligation in flight.
    pub fn is_pending(&self, dependent: &D) -> bool {
        self.obligations.lock().contains_key(dependent)
    }

    /// Number of key instances `dependent` is still waiting on.
    pub fn remaining(&self, dependent: &D) -> Option<usize> {
        self.obligations.lock().get(dependent).map(Obligation::remaining)
    }

    /// Dependents with an obligation in flight, in registration order.
    pub fn pending_dependents(&self) -> Vec<D> {
        self.obligations.lock().keys().cloned().collect()
    }

    /// Snapshot of both engines and the obligation count.
    pub fn stats(&self) -> BarrierStats {
        let pending_obligations = self.obligations.lock().len();
        BarrierStats {
            reusable: self.reusable.stats(),
            consumable: self.consumable.stats(),
            pending_obligations,
        }
    }

    fn engine(&self, policy: ReusePolicy) -> &MatchEngine<K, D, P> {
        match policy {
            ReusePolicy::Reusable => &self.reusable,
            ReusePolicy::Consumable => &self.consumable,
        }
    }

    /// Credit each match to its dependent and collect the ones that are done.
    fn settle(
        obligations: &mut IndexMap<D, Obligation<K, P>>,
        matches: Matches<K, D, P>,
    ) -> Completed<K, D, P> {
        let mut completed = Vec::new();

        for matched in matches {
            let KeyedMatch {
                key,
                dependent,
                dependency,
                dependent_registration,
                ..
            } = matched;

            let Some(obligation) = obligations.get_mut(&dependent) else {
                tracing::warn!(
                    registration = dependent_registration.raw(),
                    "match for a dependent with no obligation"
                );
                continue;
            };

            obligation.resolve(dependent_registration, Resolution { dependency, key });
            if obligation.is_satisfied() {
                if let Some((dependent, obligation)) = obligations.shift_remove_entry(&dependent) {
                    completed.push((dependent, obligation.into_parts().0));
                }
            }
        }

        completed
    }

    fn notify(&self, completed: Completed<K, D, P>) {
        for (dependent, resolved) in completed {
            tracing::debug!(resolutions = resolved.len(), "barrier obligation complete");
            (self.callback)(dependent, resolved);
        }
    }
}

impl<K, D, P> fmt::Debug for AggregateBarrier<K, D, P>
where
    K: Hash + Eq + Clone,
    D: Hash + Eq + Clone,
    P: Clone,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregateBarrier")
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    type Found = Arc<Mutex<Vec<(&'static str, Vec<Resolution<&'static str, &'static str>>)>>>;

    fn barrier() -> (AggregateBarrier<&'static str, &'static str, &'static str>, Found) {
        let found: Found = Arc::new(Mutex::new(Vec::new()));
        let sink = found.clone();
        let barrier = AggregateBarrier::new(move |dependent, resolved| {
            sink.lock().push((dependent, resolved));
        });
        (barrier, found)
    }

    fn resolution(
        dependency: &'static str,
        key: &'static str,
    ) -> Resolution<&'static str, &'static str> {
        Resolution { dependency, key }
    }

    const NONE: [&str; 0] = [];

    #[test]
    fn one_dependent_and_one_dependency() {
        let (barrier, found) = barrier();

        barrier.add_dependent("dependent 0", NONE, ["key"]).unwrap();
        assert!(found.lock().is_empty());

        barrier.add_dependency("key", "dependency 0", false);
        assert_eq!(
            *found.lock(),
            vec![("dependent 0", vec![resolution("dependency 0", "key")])]
        );
    }

    #[test]
    fn one_dependency_and_one_dependent() {
        let (barrier, found) = barrier();

        barrier.add_dependency("key", "dependency 0", false);
        assert!(found.lock().is_empty());

        barrier.add_dependent("dependent 0", NONE, ["key"]).unwrap();
        assert_eq!(
            *found.lock(),
            vec![("dependent 0", vec![resolution("dependency 0", "key")])]
        );
    }

    #[test]
    fn unrelated_dependency_does_not_fire() {
        let (barrier, found) = barrier();

        barrier.add_dependent("dependent 0", NONE, ["key"]).unwrap();
        barrier.add_dependency("other", "dependency 0", false);

        assert!(found.lock().is_empty());
        assert_eq!(barrier.remaining(&"dependent 0"), Some(1));
    }

    #[test]
    fn reuse_policies_do_not_cross() {
        let (barrier, found) = barrier();

        barrier.add_dependent("dependent 0", NONE, ["key"]).unwrap();
        barrier.add_dependency("key", "dependency 0", ReusePolicy::Reusable);
        assert!(found.lock().is_empty());

        barrier.add_dependency("key", "dependency 1", ReusePolicy::Consumable);
        assert_eq!(found.lock().len(), 1);
        assert_eq!(found.lock()[0].1, vec![resolution("dependency 1", "key")]);
    }

    #[test]
    fn fires_once_all_keys_are_satisfied() {
        let (barrier, found) = barrier();

        barrier.add_dependent("dependent 0", ["a"], ["b", "c"]).unwrap();
        barrier.add_dependency("a", "dep a", true);
        barrier.add_dependency("b", "dep b", false);
        assert!(found.lock().is_empty());
        assert_eq!(barrier.remaining(&"dependent 0"), Some(1));

        barrier.add_dependency("c", "dep c", false);

        let found = found.lock();
        assert_eq!(found.len(), 1);
        let mut resolved = found[0].1.clone();
        resolved.sort();
        assert_eq!(
            resolved,
            vec![
                resolution("dep a", "a"),
                resolution("dep b", "b"),
                resolution("dep c", "c"),
            ]
        );
        assert!(!barrier.is_pending(&"dependent 0"));
    }

    #[test]
    fn duplicate_keys_need_separate_matches() {
        let (barrier, found) = barrier();

        barrier.add_dependent("dependent 0", NONE, ["key", "key"]).unwrap();
        barrier.add_dependency("key", "dependency 0", false);
        assert!(found.lock().is_empty());

        barrier.add_dependency("key", "dependency 1", false);
        assert_eq!(found.lock().len(), 1);
    }

    #[test]
    fn reusable_duplicate_keys_share_one_dependency() {
        let (barrier, found) = barrier();

        barrier.add_dependent("dependent 0", ["key", "key"], NONE).unwrap();
        barrier.add_dependency("key", "dependency 0", true);

        assert_eq!(
            *found.lock(),
            vec![(
                "dependent 0",
                vec![resolution("dependency 0", "key"), resolution("dependency 0", "key")]
            )]
        );
    }

    #[test]
    fn reusable_dependencies_take_turns_across_dependents() {
        let (barrier, found) = barrier();

        barrier.add_dependency("key", "dependency 0", true);
        barrier.add_dependency("key", "dependency 1", true);
        for dependent in ["dependent 0", "dependent 1", "dependent 2"] {
            barrier.add_dependent(dependent, ["key"], NONE).unwrap();
        }

        assert_eq!(
            *found.lock(),
            vec![
                ("dependent 0", vec![resolution("dependency 0", "key")]),
                ("dependent 1", vec![resolution("dependency 1", "key")]),
                ("dependent 2", vec![resolution("dependency 0", "key")]),
            ]
        );

        // Nobody is waiting, so a newer reusable dependency only queues.
        barrier.add_dependency("key", "dependency 2", true);
        assert_eq!(found.lock().len(), 3);
        assert_eq!(barrier.stats().reusable.pending_dependencies, 3);
        assert_eq!(barrier.stats().pending_obligations, 0);
    }

    #[test]
    fn duplicate_in_flight_registration_is_rejected() {
        let (barrier, found) = barrier();

        barrier.add_dependent("dependent 0", NONE, ["key"]).unwrap();
        assert_eq!(
            barrier.add_dependent("dependent 0", NONE, ["other"]),
            Err(BarrierError::DuplicateRegistration)
        );

        // The rejected registration queued nothing.
        assert_eq!(barrier.stats().consumable.pending_dependents, 1);
        barrier.add_dependency("other", "dependency 0", false);
        assert!(found.lock().is_empty());
    }

    #[test]
    fn completed_dependent_can_register_again() {
        let (barrier, found) = barrier();

        barrier.add_dependent("dependent 0", NONE, ["key"]).unwrap();
        barrier.add_dependency("key", "dependency 0", false);
        barrier.add_dependent("dependent 0", NONE, ["key"]).unwrap();

        assert_eq!(found.lock().len(), 1);
        assert!(barrier.is_pending(&"dependent 0"));
    }

    #[test]
    fn zero_keys_complete_immediately() {
        let (barrier, found) = barrier();

        barrier.add_dependent("dependent 0", NONE, NONE).unwrap();

        assert_eq!(*found.lock(), vec![("dependent 0", vec![])]);
        assert!(!barrier.is_pending(&"dependent 0"));
    }

    #[test]
    fn cancel_dependent_returns_partial_resolutions() {
        let (barrier, found) = barrier();

        barrier.add_dependent("dependent 0", NONE, ["a", "b"]).unwrap();
        barrier.add_dependency("a", "dep a", false);

        let resolved = barrier.cancel_dependent(&"dependent 0").unwrap();
        assert_eq!(resolved, vec![resolution("dep a", "a")]);
        assert!(barrier.stats().consumable.is_idle());

        barrier.add_dependency("b", "dep b", false);
        assert!(found.lock().is_empty());
        assert_eq!(barrier.cancel_dependent(&"dependent 0"), None);
    }

    #[test]
    fn cancel_dependency_withdraws_it() {
        let (barrier, found) = barrier();

        let registration = barrier.add_dependency("key", "dependency 0", true);
        assert!(barrier.cancel_dependency(&registration));
        assert!(!barrier.cancel_dependency(&registration));

        barrier.add_dependent("dependent 0", ["key"], NONE).unwrap();
        assert!(found.lock().is_empty());
    }

    #[test]
    fn pending_dependents_in_registration_order() {
        let (barrier, _found) = barrier();

        for dependent in ["c", "a", "b"] {
            barrier.add_dependent(dependent, NONE, ["key"]).unwrap();
        }
        barrier.cancel_dependent(&"a");

        assert_eq!(barrier.pending_dependents(), vec!["c", "b"]);
        assert_eq!(barrier.stats().pending_obligations, 2);
    }
}
