//! Error types.
//!
//! Matching itself never fails: every dependent and dependency is accepted
//! and either queued or matched. Errors only arise at the edges, from
//! configuration, from barrier bookkeeping, and from async waiting.

use std::time::Duration;

/// Errors from loading or validating a [`MatcherConfig`](crate::config::MatcherConfig).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The JSON could not be parsed into a config.
    #[error("invalid matcher config: {0}")]
    Parse(#[from] serde_json::Error),

    /// The shard count is not a power of two greater than one.
    #[error("shard count must be a power of two greater than one, got {0}")]
    InvalidShardCount(usize),
}

/// Errors from [`AggregateBarrier`](crate::barrier::AggregateBarrier) registration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BarrierError {
    /// The dependent already has an obligation that has not completed yet.
    #[error("dependent already has an in-flight obligation")]
    DuplicateRegistration,
}

/// Errors from awaiting a dependency through a
/// [`DependencyWaiter`](crate::waiter::DependencyWaiter).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WaitError {
    /// The registration was dropped without a dependency being delivered.
    #[error("waiter registration was abandoned before a dependency arrived")]
    Abandoned,

    /// No dependency arrived within the allotted time.
    #[error("no dependency arrived within {0:?}")]
    TimedOut(Duration),
}
