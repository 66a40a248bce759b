//! Match shapes.
//!
//! The engine always forms a full [`KeyedMatch`]. A [`MatchShape`] decides
//! what the completion callback actually receives, so the keyed matcher and
//! the key-less "cached" matcher share one draining implementation.

use super::registration::RegistrationId;

/// A dependent paired with a dependency under a shared key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyedMatch<K, D, P> {
    /// The key both sides were queued under.
    pub key: K,

    /// The waiting consumer.
    pub dependent: D,

    /// The resource that satisfied it.
    pub dependency: P,

    /// Registration that queued the dependent.
    pub dependent_registration: RegistrationId,

    /// Registration that queued the dependency. For reusable dependencies
    /// this stays the same across every match it takes part in.
    pub dependency_registration: RegistrationId,
}

/// A dependent paired with a dependency, without the key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedPair<D, P> {
    pub dependent: D,
    pub dependency: P,
}

impl<D, P> MatchedPair<D, P> {
    /// Split into `(dependent, dependency)`.
    pub fn into_parts(self) -> (D, P) {
        (self.dependent, self.dependency)
    }
}

/// Converts a formed match into what a completion callback receives.
pub trait MatchShape<K, D, P> {
    /// The value handed to the callback.
    type Output;

    /// Reshape a formed match.
    fn shape(matched: KeyedMatch<K, D, P>) -> Self::Output;
}

/// Callbacks receive the full [`KeyedMatch`].
#[derive(Debug, Clone, Copy, Default)]
pub struct WithKey;

impl<K, D, P> MatchShape<K, D, P> for WithKey {
    type Output = KeyedMatch<K, D, P>;

    fn shape(matched: KeyedMatch<K, D, P>) -> Self::Output {
        matched
    }
}

/// Callbacks receive a [`MatchedPair`]; the key is dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct WithoutKey;

impl<K, D, P> MatchShape<K, D, P> for WithoutKey {
    type Output = MatchedPair<D, P>;

    fn shape(matched: KeyedMatch<K, D, P>) -> Self::Output {
        MatchedPair {
            dependent: matched.dependent,
            dependency: matched.dependency,
        }
    }
}
