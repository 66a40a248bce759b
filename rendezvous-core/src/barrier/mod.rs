//! Aggregate Completion Barrier
//!
//! Composes two match engines into a barrier that waits on many keys per
//! dependent. See [`AggregateBarrier`].

mod aggregate;
mod obligation;

pub use aggregate::{AggregateBarrier, BarrierStats, CompletionCallback};
pub use obligation::Resolution;
