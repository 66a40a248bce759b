//! Per-dependent bookkeeping for the aggregate barrier.

use smallvec::SmallVec;

use crate::config::ReusePolicy;
use crate::matcher::{Registration, RegistrationId};

/// One requested key instance, satisfied by a dependency.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Resolution<K, P> {
    /// The dependency that satisfied the request.
    pub dependency: P,

    /// The key it was requested under.
    pub key: K,
}

/// A queued registration the obligation is still waiting on.
#[derive(Debug)]
pub(crate) struct Outstanding<K> {
    pub(crate) registration: Registration<K>,
    pub(crate) policy: ReusePolicy,
}

/// What a dependent is waiting on and what it has received so far.
#[derive(Debug)]
pub(crate) struct Obligation<K, P> {
    required: usize,
    resolved: Vec<Resolution<K, P>>,
    outstanding: SmallVec<[Outstanding<K>; 4]>,
}

impl<K, P> Obligation<K, P> {
    pub(crate) fn new(required: usize) -> Self {
        Self {
            required,
            resolved: Vec::with_capacity(required),
            outstanding: SmallVec::new(),
        }
    }

    /// Remember a registration so it can be withdrawn on cancellation.
    pub(crate) fn track(&mut self, registration: Registration<K>, policy: ReusePolicy) {
        self.outstanding.push(Outstanding {
            registration,
            policy,
        });
    }

    /// Record that the registration `id` was matched.
    pub(crate) fn resolve(&mut self, id: RegistrationId, resolution: Resolution<K, P>) {
        if let Some(position) = self
            .outstanding
            .iter()
            .position(|pending| pending.registration.id() == id)
        {
            self.outstanding.swap_remove(position);
        }
        self.resolved.push(resolution);
    }

    pub(crate) fn is_satisfied(&self) -> bool {
        self.resolved.len() >= self.required
    }

    pub(crate) fn required(&self) -> usize {
        self.required
    }

    pub(crate) fn remaining(&self) -> usize {
        self.required.saturating_sub(self.resolved.len())
    }

    /// Split into the resolutions so far and the registrations still queued.
    pub(crate) fn into_parts(self) -> (Vec<Resolution<K, P>>, SmallVec<[Outstanding<K>; 4]>) {
        (self.resolved, self.outstanding)
    }
}
