//! Dispatch policies applied when a channel has no matching route.

use crate::error::ConfigurationError;
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(30_000);

/// How a dispatch reacts when no route matches.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DispatchPolicy {
    /// Wait for a matching subscribe instead of resolving immediately.
    pub block: bool,
    /// Upper bound on a blocking wait.
    pub timeout: Duration,
    /// Surface `NoMatchingRoute` instead of dropping (non-blocking only).
    pub fail_if_no_match: bool,
    /// Log dropped messages at warn level.
    pub warn_on_drop: bool,
}

impl Default for DispatchPolicy {
    fn default() -> Self {
        Self {
            block: false,
            timeout: DEFAULT_TIMEOUT,
            fail_if_no_match: false,
            warn_on_drop: false,
        }
    }
}

impl DispatchPolicy {
    pub fn blocking(timeout: Duration) -> Self {
        Self {
            block: true,
            timeout,
            ..Self::default()
        }
    }

    pub fn fail_fast() -> Self {
        Self {
            fail_if_no_match: true,
            ..Self::default()
        }
    }

    pub fn dropping(warn_on_drop: bool) -> Self {
        Self {
            warn_on_drop,
            ..Self::default()
        }
    }
}

/// Partial policy as written in configuration; unset fields inherit.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PolicyConfig {
    pub block: Option<bool>,
    pub timeout_ms: Option<u64>,
    pub fail_if_no_match: Option<bool>,
    pub warn_on_drop: Option<bool>,
}

impl PolicyConfig {
    /// Overlays this partial policy on `base` and validates the result.
    pub fn resolve(&self, base: DispatchPolicy) -> Result<DispatchPolicy, ConfigurationError> {
        let policy = DispatchPolicy {
            block: self.block.unwrap_or(base.block),
            timeout: self
                .timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(base.timeout),
            fail_if_no_match: self.fail_if_no_match.unwrap_or(base.fail_if_no_match),
            warn_on_drop: self.warn_on_drop.unwrap_or(base.warn_on_drop),
        };
        if policy.block && policy.timeout.is_zero() {
            return Err(ConfigurationError::new(
                "timeout_ms",
                "blocking policies need a timeout greater than zero",
            ));
        }
        Ok(policy)
    }
}

#[cfg(test)]
mod tests {
    use super::{DispatchPolicy, PolicyConfig, DEFAULT_TIMEOUT};
    use std::time::Duration;

    #[test]
    fn defaults_match_documented_values() {
        let policy = DispatchPolicy::default();
        assert!(!policy.block);
        assert_eq!(policy.timeout, DEFAULT_TIMEOUT);
        assert_eq!(policy.timeout, Duration::from_secs(30));
        assert!(!policy.fail_if_no_match);
        assert!(!policy.warn_on_drop);
    }

    #[test]
    fn partial_config_inherits_unset_fields() {
        let config: PolicyConfig =
            json5::from_str("{ block: true, timeout_ms: 500 }").expect("valid json5");
        let base = DispatchPolicy::dropping(true);

        let policy = config.resolve(base).expect("valid policy");

        assert!(policy.block);
        assert_eq!(policy.timeout, Duration::from_millis(500));
        assert!(policy.warn_on_drop);
        assert!(!policy.fail_if_no_match);
    }

    #[test]
    fn blocking_with_zero_timeout_is_rejected() {
        let config = PolicyConfig {
            block: Some(true),
            timeout_ms: Some(0),
            ..PolicyConfig::default()
        };
        let err = config
            .resolve(DispatchPolicy::default())
            .expect_err("zero timeout rejected");
        assert_eq!(err.field, "timeout_ms");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(json5::from_str::<PolicyConfig>("{ blok: true }").is_err());
    }
}
