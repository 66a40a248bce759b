//! Async Dependency Waiter
//!
//! A [`DependencyWaiter`] turns dependents into futures: `acquire(key)`
//! queues the calling task as a dependent and resolves with whatever
//! dependency it is matched with. Producers call `provide`.
//!
//! # Delivery
//!
//! Each waiting task is represented in the engine by the sending half of a
//! `tokio::sync::oneshot` channel. When a match forms, the dependency is sent
//! down that channel after the engine lock is released.
//!
//! # Cancellation
//!
//! Dropping an `acquire` future (for example when a `select!` picks another
//! branch, or `acquire_timeout` expires) withdraws its registration. If the
//! task goes away in the narrow window between being matched and receiving
//! the dependency, a consumable dependency goes back to the head of its
//! queue, ahead of any dependency that arrived meanwhile; a reusable one is
//! already back in its queue.

use std::hash::Hash;
use std::time::Duration;

use tokio::sync::oneshot;

use crate::config::ReusePolicy;
use crate::error::WaitError;
use crate::matcher::{MatchEngine, MatcherStats, Matches, Registration};

/// Async front end over a match engine.
pub struct DependencyWaiter<K, P> {
    engine: MatchEngine<K, oneshot::Sender<P>, P>,
}

impl<K, P> DependencyWaiter<K, P>
where
    K: Hash + Eq + Clone,
    P: Clone,
{
    /// Create a waiter with the given reuse policy.
    pub fn new(policy: ReusePolicy) -> Self {
        Self {
            engine: MatchEngine::new(policy),
        }
    }

    /// The waiter's reuse policy.
    pub fn policy(&self) -> ReusePolicy {
        self.engine.policy()
    }

    /// Make a dependency available under `key`.
    ///
    /// Waiting tasks are woken in arrival order. The returned registration
    /// can withdraw the dependency while it is still queued.
    pub fn provide(&self, key: K, dependency: P) -> Registration<K> {
        let offer = self.engine.offer_dependency(key, dependency);
        self.deliver(offer.matches);
        offer.registration
    }

    /// Withdraw a dependency that is still queued.
    pub fn withdraw(&self, registration: &Registration<K>) -> bool {
        self.engine.cancel(registration)
    }

    /// Wait until a dependency is available under `key`.
    pub async fn acquire(&self, key: K) -> Result<P, WaitError> {
        let (sender, receiver) = oneshot::channel();
        let offer = self.engine.offer_dependent(key, sender);
        let _guard = WithdrawOnDrop {
            engine: &self.engine,
            registration: offer.registration,
        };

        self.deliver(offer.matches);
        receiver.await.map_err(|_| WaitError::Abandoned)
    }

    /// Like [`acquire`](Self::acquire), giving up after `timeout`.
    pub async fn acquire_timeout(&self, key: K, timeout: Duration) -> Result<P, WaitError> {
        tokio::time::timeout(timeout, self.acquire(key))
            .await
            .map_err(|_| WaitError::TimedOut(timeout))?
    }

    /// Number of tasks waiting on `key`.
    pub fn waiting(&self, key: &K) -> usize {
        self.engine.pending_dependents(key)
    }

    /// Number of dependencies available on `key`.
    pub fn available(&self, key: &K) -> usize {
        self.engine.pending_dependencies(key)
    }

    /// Snapshot of the queue sizes.
    pub fn stats(&self) -> MatcherStats {
        self.engine.stats()
    }

    fn deliver(&self, matches: Matches<K, oneshot::Sender<P>, P>) {
        let mut undelivered = Vec::new();
        for matched in matches {
            if let Err(dependency) = matched.dependent.send(matched.dependency) {
                tracing::warn!(
                    dependent = matched.dependent_registration.raw(),
                    "waiter dropped before its dependency was delivered"
                );
                if !self.engine.policy().is_reusable() {
                    undelivered.push((matched.key, dependency));
                }
            }
        }

        if !undelivered.is_empty() {
            let matches = self.engine.restore_dependencies(undelivered);
            self.deliver(matches);
        }
    }
}

/// Withdraws the waiting registration when the `acquire` future ends.
///
/// After a successful match the registration is already gone and the
/// withdrawal is a no-op.
struct WithdrawOnDrop<'a, K, P>
where
    K: Hash + Eq + Clone,
    P: Clone,
{
    engine: &'a MatchEngine<K, oneshot::Sender<P>, P>,
    registration: Registration<K>,
}

impl<K, P> Drop for WithdrawOnDrop<'_, K, P>
where
    K: Hash + Eq + Clone,
    P: Clone,
{
    fn drop(&mut self) {
        self.engine.cancel(&self.registration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::{KeyedMatch, RegistrationId};
    use std::sync::Arc;

    #[tokio::test]
    async fn acquire_takes_available_dependency() {
        let waiter = DependencyWaiter::new(ReusePolicy::Consumable);
        waiter.provide("key", 7);

        assert_eq!(waiter.acquire("key").await, Ok(7));
        assert!(waiter.stats().is_idle());
    }

    #[tokio::test]
    async fn acquire_waits_for_provider() {
        let waiter = Arc::new(DependencyWaiter::new(ReusePolicy::Consumable));

        let task = {
            let waiter = waiter.clone();
            tokio::spawn(async move { waiter.acquire("key").await })
        };

        while waiter.waiting(&"key") == 0 {
            tokio::task::yield_now().await;
        }
        waiter.provide("key", "dependency 0");

        assert_eq!(task.await.unwrap(), Ok("dependency 0"));
        assert!(waiter.stats().is_idle());
    }

    #[tokio::test]
    async fn reusable_dependency_serves_many_acquirers() {
        let waiter = DependencyWaiter::new(ReusePolicy::Reusable);
        waiter.provide("key", 1);

        for _ in 0..3 {
            assert_eq!(waiter.acquire("key").await, Ok(1));
        }
        assert_eq!(waiter.available(&"key"), 1);
    }

    #[tokio::test]
    async fn timed_out_acquire_withdraws_registration() {
        let waiter: DependencyWaiter<&str, u32> = DependencyWaiter::new(ReusePolicy::Consumable);

        let result = waiter.acquire_timeout("key", Duration::from_millis(20)).await;

        assert_eq!(result, Err(WaitError::TimedOut(Duration::from_millis(20))));
        assert_eq!(waiter.waiting(&"key"), 0);

        // A later dependency stays available instead of going to the
        // abandoned waiter.
        waiter.provide("key", 3);
        assert_eq!(waiter.available(&"key"), 1);
    }

    #[tokio::test]
    async fn withdrawn_dependency_is_not_delivered() {
        let waiter: DependencyWaiter<&str, u32> = DependencyWaiter::new(ReusePolicy::Consumable);

        let registration = waiter.provide("key", 3);
        assert!(waiter.withdraw(&registration));

        let result = waiter.acquire_timeout("key", Duration::from_millis(20)).await;
        assert!(matches!(result, Err(WaitError::TimedOut(_))));
    }

    #[test]
    fn undelivered_consumable_dependency_is_offered_again() {
        let waiter: DependencyWaiter<&str, u32> = DependencyWaiter::new(ReusePolicy::Consumable);

        // Queue a dependent whose receiving side is already gone.
        let (sender, receiver) = oneshot::channel();
        drop(receiver);
        let offer = waiter.engine.offer_dependent("key", sender);
        assert!(offer.matches.is_empty());

        waiter.provide("key", 5);
        assert_eq!(waiter.waiting(&"key"), 0);
        assert_eq!(waiter.available(&"key"), 1);
    }

    #[tokio::test]
    async fn undelivered_dependency_keeps_its_place() {
        let waiter: DependencyWaiter<&str, u32> = DependencyWaiter::new(ReusePolicy::Consumable);

        // A later dependency is already queued when the earlier one comes back.
        waiter.provide("key", 2);

        let (sender, receiver) = oneshot::channel();
        drop(receiver);
        let mut matches = Matches::new();
        matches.push(KeyedMatch {
            key: "key",
            dependent: sender,
            dependency: 1,
            dependent_registration: RegistrationId::new(),
            dependency_registration: RegistrationId::new(),
        });
        waiter.deliver(matches);

        assert_eq!(waiter.available(&"key"), 2);
        assert_eq!(waiter.acquire("key").await, Ok(1));
        assert_eq!(waiter.acquire("key").await, Ok(2));
        assert!(waiter.stats().is_idle());
    }
}
