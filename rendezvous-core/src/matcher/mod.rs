//! Keyed Pair Matching
//!
//! This module pairs asynchronous consumers ("dependents") with asynchronous
//! producers ("dependencies") that share a key.
//!
//! # Concepts
//!
//! ## Keys
//!
//! A key partitions dependents and dependencies into independent channels.
//! Anything `Hash + Eq + Clone` works; the engine never looks inside.
//!
//! ## Queues
//!
//! Each key has a FIFO queue of waiting dependents and a FIFO queue of
//! available dependencies. Whenever both are non-empty their heads are
//! paired. Queues that become empty are removed, so churn over many keys
//! does not grow the maps.
//!
//! ## Reuse
//!
//! A matcher's [`ReusePolicy`](crate::config::ReusePolicy) is fixed at
//! construction. A consumable dependency satisfies exactly one dependent. A
//! reusable dependency is put back at the tail of its queue after each match
//! and keeps satisfying dependents indefinitely.
//!
//! ## Callbacks
//!
//! Matches are reported after the matcher's lock is released, on the thread
//! that made the call, in the order they were formed.
//!
//! # Layout
//!
//! - [`MatchEngine`]: the locked queues; returns matches to the caller
//! - [`PairMatcher`]: engine plus completion callback, in two shapes
//!   ([`KeyedPairMatcher`], [`CachedPairMatcher`])
//! - [`ShardedPairMatcher`]: the same contract with one lock per shard

mod engine;
mod pair;
mod queue;
mod registration;
mod shape;
mod sharded;
mod stats;

pub use engine::{MatchEngine, Offer};
pub use pair::{CachedPairMatcher, KeyedPairMatcher, MatchCallback, PairMatcher};
pub use queue::Matches;
pub use registration::{Registration, RegistrationId, Side};
pub use shape::{KeyedMatch, MatchShape, MatchedPair, WithKey, WithoutKey};
pub use sharded::ShardedPairMatcher;
pub use stats::MatcherStats;
