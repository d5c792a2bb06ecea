//! Declarative router configuration, written as JSON5.

use crate::cache::{CacheConfig, CacheRegistry};
use crate::control_plane::control_message::ControlMessageDescriptor;
use crate::error::ConfigurationError;
use crate::routing::policy::{DispatchPolicy, PolicyConfig};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};
use std::fs;
use std::path::Path;

pub const DEFAULT_CONTROL_QUEUE_CAPACITY: usize = 64;

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(json5::Error),
    Validation(ConfigurationError),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "IO error: {err}"),
            ConfigError::Parse(err) => write!(f, "Parse error: {err}"),
            ConfigError::Validation(err) => write!(f, "Validation failed: {err}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(err) => Some(err),
            ConfigError::Parse(err) => Some(err),
            ConfigError::Validation(err) => Some(err),
        }
    }
}

impl From<ConfigurationError> for ConfigError {
    fn from(err: ConfigurationError) -> Self {
        ConfigError::Validation(err)
    }
}

/// Top-level configuration of one router instance.
///
/// ```json5
/// {
///   default_policy: { fail_if_no_match: true },
///   channels: { payments: { block: true, timeout_ms: 5000 } },
///   caches: [{ name: "tenants", capacity: 256, create_if_absent: true }],
///   routes: [
///     { id: "eu", channel: "orders", priority: 1, handler: "echo",
///       predicate: { type: "header_equals", name: "region", value: "eu" } },
///   ],
/// }
/// ```
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RouterConfig {
    #[serde(default)]
    pub default_policy: PolicyConfig,
    #[serde(default)]
    pub channels: HashMap<String, PolicyConfig>,
    #[serde(default)]
    pub caches: Vec<CacheConfig>,
    #[serde(default)]
    pub routes: Vec<ControlMessageDescriptor>,
    #[serde(default = "default_control_queue")]
    pub control_queue: usize,
}

fn default_control_queue() -> usize {
    DEFAULT_CONTROL_QUEUE_CAPACITY
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            default_policy: PolicyConfig::default(),
            channels: HashMap::new(),
            caches: Vec::new(),
            routes: Vec::new(),
            control_queue: DEFAULT_CONTROL_QUEUE_CAPACITY,
        }
    }
}

impl RouterConfig {
    pub fn from_json5_str(text: &str) -> Result<Self, ConfigError> {
        let config: RouterConfig = json5::from_str(text).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate configuration from a JSON5 file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::from_json5_str(&content)
    }

    /// Checks everything that can be checked without a handler resolver.
    /// Route descriptors are validated when they are applied.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.control_queue == 0 {
            return Err(ConfigurationError::new(
                "control_queue",
                "must be greater than zero",
            ));
        }
        self.dispatch_policies()?;
        self.cache_registry()?;
        Ok(())
    }

    /// Resolves the default policy and every per-channel override on top of it.
    pub fn dispatch_policies(
        &self,
    ) -> Result<(DispatchPolicy, HashMap<String, DispatchPolicy>), ConfigurationError> {
        let default_policy = self
            .default_policy
            .resolve(DispatchPolicy::default())
            .map_err(|err| nested("default_policy", err))?;

        let mut overrides = HashMap::with_capacity(self.channels.len());
        for (channel, config) in &self.channels {
            if channel.trim().is_empty() {
                return Err(ConfigurationError::new(
                    "channels",
                    "channel names must not be empty",
                ));
            }
            let policy = config
                .resolve(default_policy)
                .map_err(|err| nested(&format!("channels.{channel}"), err))?;
            overrides.insert(channel.clone(), policy);
        }
        Ok((default_policy, overrides))
    }

    pub fn cache_registry(&self) -> Result<CacheRegistry, ConfigurationError> {
        CacheRegistry::from_configs(&self.caches)
    }
}

fn nested(prefix: &str, err: ConfigurationError) -> ConfigurationError {
    ConfigurationError::new(format!("{prefix}.{}", err.field), err.reason)
}
