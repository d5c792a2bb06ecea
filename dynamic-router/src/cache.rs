//! Shared key/value cache collaborator.
//!
//! Caches are explicit dependencies: a [`CacheSlot`] either carries a cache the
//! host already built, or is allowed to create one lazily on first use. There is
//! no global registry lookup.

use crate::error::ConfigurationError;
use crate::observability::events;
use lru::LruCache;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use tracing::debug;

const COMPONENT: &str = "cache";

pub const DEFAULT_CACHE_CAPACITY: usize = 1024;

/// Bounded LRU cache shared between predicates.
pub struct SharedCache {
    name: String,
    entries: Mutex<LruCache<String, Value>>,
}

impl SharedCache {
    pub fn new(name: impl Into<String>, capacity: NonZeroUsize) -> Self {
        Self {
            name: name.into(),
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn put(&self, key: impl Into<String>, value: Value) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .put(key.into(), value);
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Declarative cache entry from the router configuration.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct CacheConfig {
    pub name: String,
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    #[serde(default)]
    pub create_if_absent: bool,
}

fn default_capacity() -> usize {
    DEFAULT_CACHE_CAPACITY
}

/// A cache dependency that is resolved on first use.
pub struct CacheSlot {
    name: String,
    capacity: usize,
    create_if_absent: bool,
    resolved: OnceLock<Arc<SharedCache>>,
}

impl CacheSlot {
    /// Slot backed by a cache the host already owns.
    pub fn existing(cache: Arc<SharedCache>) -> Self {
        let resolved = OnceLock::new();
        let name = cache.name().to_string();
        let _ = resolved.set(cache);
        Self {
            name,
            capacity: DEFAULT_CACHE_CAPACITY,
            create_if_absent: false,
            resolved,
        }
    }

    /// Slot without a cache yet; `create_if_absent` decides whether first use
    /// builds one or fails.
    pub fn lazy(name: impl Into<String>, capacity: usize, create_if_absent: bool) -> Self {
        Self {
            name: name.into(),
            capacity,
            create_if_absent,
            resolved: OnceLock::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved.get().is_some()
    }

    pub fn resolve(&self) -> Result<Arc<SharedCache>, ConfigurationError> {
        if let Some(cache) = self.resolved.get() {
            return Ok(cache.clone());
        }
        if !self.create_if_absent {
            return Err(ConfigurationError::new(
                "cache",
                format!(
                    "cache instance {:?} not found and create_if_absent is false",
                    self.name
                ),
            ));
        }
        let capacity = NonZeroUsize::new(self.capacity).ok_or_else(|| {
            ConfigurationError::new("capacity", format!("cache {:?} needs capacity > 0", self.name))
        })?;
        let cache = self.resolved.get_or_init(|| {
            debug!(
                event = events::CACHE_CREATED,
                component = COMPONENT,
                cache = %self.name,
                capacity = self.capacity,
                "creating cache on first use"
            );
            Arc::new(SharedCache::new(self.name.clone(), capacity))
        });
        Ok(cache.clone())
    }
}

/// Named cache slots available to declarative predicates.
#[derive(Default)]
pub struct CacheRegistry {
    slots: HashMap<String, Arc<CacheSlot>>,
}

impl CacheRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_configs(configs: &[CacheConfig]) -> Result<Self, ConfigurationError> {
        let mut registry = Self::new();
        for config in configs {
            if config.name.is_empty() {
                return Err(ConfigurationError::new("caches.name", "must not be empty"));
            }
            if registry.slots.contains_key(&config.name) {
                return Err(ConfigurationError::new(
                    "caches.name",
                    format!("cache {:?} declared twice", config.name),
                ));
            }
            registry.insert(CacheSlot::lazy(
                config.name.clone(),
                config.capacity,
                config.create_if_absent,
            ));
        }
        Ok(registry)
    }

    pub fn insert(&mut self, slot: CacheSlot) {
        self.slots.insert(slot.name().to_string(), Arc::new(slot));
    }

    pub fn slot(&self, name: &str) -> Option<Arc<CacheSlot>> {
        self.slots.get(name).cloned()
    }
}
