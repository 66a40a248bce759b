//! Matcher Configuration
//!
//! A matcher is configured once, at construction, with a reuse policy and
//! (for the sharded variant) a shard count. Configurations can be built in
//! code or loaded from JSON:
//!
//! ```rust,ignore
//! let config = MatcherConfig::from_json(r#"{"policy": "reusable", "shards": 16}"#)?;
//! ```

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// What happens to a dependency after it satisfies a dependent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReusePolicy {
    /// The dependency goes back to the tail of its queue and keeps
    /// satisfying later dependents.
    Reusable,

    /// The dependency satisfies exactly one dependent and is then gone.
    #[default]
    Consumable,
}

impl ReusePolicy {
    /// Check if matched dependencies are re-queued.
    pub fn is_reusable(&self) -> bool {
        matches!(self, ReusePolicy::Reusable)
    }
}

impl From<bool> for ReusePolicy {
    fn from(is_reusable: bool) -> Self {
        if is_reusable {
            ReusePolicy::Reusable
        } else {
            ReusePolicy::Consumable
        }
    }
}

/// Construction-time settings for a matcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MatcherConfig {
    /// Reuse policy applied to every dependency of the matcher.
    #[serde(default)]
    pub policy: ReusePolicy,

    /// Number of lock shards for `ShardedPairMatcher`. `None` lets the map
    /// pick its own default. Ignored by the single-lock matchers.
    #[serde(default)]
    pub shards: Option<usize>,
}

impl MatcherConfig {
    /// Create a config with the given policy and default sharding.
    pub fn new(policy: ReusePolicy) -> Self {
        Self {
            policy,
            shards: None,
        }
    }

    /// Set an explicit shard count.
    pub fn with_shards(mut self, shards: usize) -> Self {
        self.shards = Some(shards);
        self
    }

    /// Parse and validate a config from JSON.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the shard count, if any, is usable.
    ///
    /// Shard counts must be a power of two greater than one.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.shards {
            Some(shards) if shards < 2 || !shards.is_power_of_two() => {
                Err(ConfigError::InvalidShardCount(shards))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_defaults_to_consumable() {
        assert_eq!(ReusePolicy::default(), ReusePolicy::Consumable);
        assert!(!ReusePolicy::default().is_reusable());
    }

    #[test]
    fn policy_from_bool() {
        assert_eq!(ReusePolicy::from(true), ReusePolicy::Reusable);
        assert_eq!(ReusePolicy::from(false), ReusePolicy::Consumable);
    }

    #[test]
    fn config_parses_from_json() {
        let config = MatcherConfig::from_json(r#"{"policy": "reusable", "shards": 8}"#).unwrap();
        assert_eq!(config.policy, ReusePolicy::Reusable);
        assert_eq!(config.shards, Some(8));
    }

    #[test]
    fn config_fields_are_optional() {
        let config = MatcherConfig::from_json("{}").unwrap();
        assert_eq!(config, MatcherConfig::default());
    }

    #[test]
    fn config_rejects_bad_shard_counts() {
        for shards in [0, 1, 3, 12] {
            let json = format!(r#"{{"shards": {shards}}}"#);
            assert!(matches!(
                MatcherConfig::from_json(&json),
                Err(ConfigError::InvalidShardCount(n)) if n == shards
            ));
        }
    }

    #[test]
    fn config_rejects_unknown_policy() {
        assert!(matches!(
            MatcherConfig::from_json(r#"{"policy": "sometimes"}"#),
            Err(ConfigError::Parse(_))
        ));
    }
}
