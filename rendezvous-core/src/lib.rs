//! Rendezvous Core
//!
//! This crate pairs asynchronous consumers with asynchronous producers that
//! share a key. It implements:
//!
//! - Per-key FIFO matching of dependents and dependencies
//! - Reusable and consumable dependency semantics
//! - A multi-key completion barrier
//! - An async waiter built on the same engine
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `matcher`: the matching engine, callback matchers and the sharded variant
//! - `barrier`: the aggregate barrier composed from two engines
//! - `waiter`: `tokio` futures that resolve when a dependency arrives
//! - `config`: reuse policy and matcher configuration
//! - `error`: error types
//!
//! # Example
//!
//! ```rust,ignore
//! use rendezvous_core::config::ReusePolicy;
//! use rendezvous_core::matcher::KeyedPairMatcher;
//!
//! let matcher: KeyedPairMatcher<&str, &str, &str> =
//!     KeyedPairMatcher::new(ReusePolicy::Consumable, |m| {
//!         println!("{} <- {} ({})", m.dependent, m.dependency, m.key);
//!     });
//!
//! matcher.add_dependent("gpu", "job 0");
//! matcher.add_dependency("gpu", "device 0");
//! // Callback runs: "job 0 <- device 0 (gpu)"
//! ```

pub mod barrier;
pub mod config;
pub mod error;
pub mod matcher;
pub mod waiter;

pub use barrier::{AggregateBarrier, Resolution};
pub use config::{MatcherConfig, ReusePolicy};
pub use error::{BarrierError, ConfigError, WaitError};
pub use matcher::{
    CachedPairMatcher, KeyedMatch, KeyedPairMatcher, MatchedPair, Registration, ShardedPairMatcher,
};
pub use waiter::DependencyWaiter;
