//! Introspection snapshots.

use serde::Serialize;

use crate::config::ReusePolicy;

/// Point-in-time view of a matcher's queues.
///
/// Serializable so it can be emitted as structured JSON alongside logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MatcherStats {
    /// Reuse policy of the matcher.
    pub policy: ReusePolicy,

    /// Keys with at least one waiting dependent.
    pub dependent_keys: usize,

    /// Keys with at least one available dependency.
    pub dependency_keys: usize,

    /// Waiting dependents across all keys.
    pub pending_dependents: usize,

    /// Available dependencies across all keys.
    pub pending_dependencies: usize,
}

impl MatcherStats {
    /// True when nothing is queued on either side.
    pub fn is_idle(&self) -> bool {
        self.dependent_keys == 0 && self.dependency_keys == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_stats_are_idle() {
        assert!(MatcherStats::default().is_idle());
    }

    #[test]
    fn stats_serialize_to_json() {
        let stats = MatcherStats {
            policy: ReusePolicy::Reusable,
            dependent_keys: 1,
            dependency_keys: 0,
            pending_dependents: 3,
            pending_dependencies: 0,
        };

        let json = serde_json::to_value(stats).unwrap();
        assert_eq!(json["policy"], "reusable");
        assert_eq!(json["pending_dependents"], 3);
        assert!(!stats.is_idle());
    }
}
