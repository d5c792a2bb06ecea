//! Channel ownership: name -> routing table + dispatch policy.

use crate::control_plane::route_table::RoutingTable;
use crate::observability::events;
use crate::routing::policy::DispatchPolicy;
use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::debug;

const COMPONENT: &str = "channel_registry";

/// A named message stream with its own routing table.
pub struct Channel {
    name: String,
    table: RoutingTable,
    policy: ArcSwap<DispatchPolicy>,
}

impl Channel {
    fn new(name: &str, policy: DispatchPolicy) -> Self {
        Self {
            name: name.to_string(),
            table: RoutingTable::new(),
            policy: ArcSwap::from_pointee(policy),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table(&self) -> &RoutingTable {
        &self.table
    }

    pub fn policy(&self) -> DispatchPolicy {
        **self.policy.load()
    }

    pub(crate) fn set_policy(&self, policy: DispatchPolicy) {
        self.policy.store(Arc::new(policy));
    }
}

/// Owns every channel. Channels are created lazily on first reference and live
/// until the registry is dropped.
pub struct ChannelRegistry {
    channels: RwLock<HashMap<String, Arc<Channel>>>,
    default_policy: DispatchPolicy,
    policy_overrides: HashMap<String, DispatchPolicy>,
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new(DispatchPolicy::default(), HashMap::new())
    }
}

impl ChannelRegistry {
    /// `policy_overrides` seeds the policy of channels created later under those
    /// names; every other channel starts with `default_policy`.
    pub fn new(
        default_policy: DispatchPolicy,
        policy_overrides: HashMap<String, DispatchPolicy>,
    ) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            default_policy,
            policy_overrides,
        }
    }

    /// Returns the channel, creating it if this is the first reference.
    pub fn channel(&self, name: &str) -> Arc<Channel> {
        if let Some(channel) = self.get(name) {
            return channel;
        }

        let mut channels = self
            .channels
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        channels
            .entry(name.to_string())
            .or_insert_with(|| {
                let policy = self.initial_policy(name);
                debug!(
                    event = events::CHANNEL_CREATED,
                    component = COMPONENT,
                    channel = name,
                    block = policy.block,
                    fail_if_no_match = policy.fail_if_no_match,
                    "creating channel"
                );
                Arc::new(Channel::new(name, policy))
            })
            .clone()
    }

    pub fn get(&self, name: &str) -> Option<Arc<Channel>> {
        self.channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn set_policy(&self, name: &str, policy: DispatchPolicy) {
        self.channel(name).set_policy(policy);
        debug!(
            event = events::CHANNEL_POLICY_UPDATED,
            component = COMPONENT,
            channel = name,
            block = policy.block,
            timeout_ms = crate::observability::fields::millis(policy.timeout),
            fail_if_no_match = policy.fail_if_no_match,
            warn_on_drop = policy.warn_on_drop,
            "channel policy updated"
        );
    }

    pub fn default_policy(&self) -> DispatchPolicy {
        self.default_policy
    }

    /// Sorted names of all channels created so far.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .channels
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    fn initial_policy(&self, name: &str) -> DispatchPolicy {
        self.policy_overrides
            .get(name)
            .copied()
            .unwrap_or(self.default_policy)
    }
}
