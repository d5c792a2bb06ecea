/********************************************************************************
 * Copyright (c) 2024 Contributors to the Eclipse Foundation
 *
 * See the NOTICE file(s) distributed with this work for additional
 * information regarding copyright ownership.
 *
 * This program and the accompanying materials are made available under the
 * terms of the Apache License Version 2.0 which is available at
 * https://www.apache.org/licenses/LICENSE-2.0
 *
 * SPDX-License-Identifier: Apache-2.0
 ********************************************************************************/

use crate::cache::CacheRegistry;
use crate::config::{ConfigError, RouterConfig, DEFAULT_CONTROL_QUEUE_CAPACITY};
use crate::control_plane::control_message::{ControlMessage, ControlMessageDescriptor};
use crate::control_plane::route_lifecycle::{ControlAck, ControlPlane};
use crate::control_plane::route_table::RouteInfo;
use crate::data_plane::blocking::BlockingCoordinator;
use crate::data_plane::dispatch::{DispatchEngine, DispatchOutcome};
use crate::data_plane::handler::HandlerResolver;
use crate::error::{ConfigurationError, DispatchError};
use crate::message::Message;
use crate::metrics::MetricsSink;
use crate::observability::events;
use crate::routing::channel_registry::ChannelRegistry;
use crate::routing::policy::DispatchPolicy;
use crate::runtime::control_loop::{spawn_control_loop, ControlChannel};
use std::collections::HashMap;
use std::future::Future;
use std::io;
use std::sync::Arc;
use tracing::{debug, info};

const COMPONENT: &str = "dynamic_router";

/// Construction parameters for [`DynamicRouter::new`].
#[derive(Clone)]
pub struct RouterOptions {
    /// Policy of every channel without an entry in `channel_policies`.
    pub default_policy: DispatchPolicy,
    pub channel_policies: HashMap<String, DispatchPolicy>,
    pub metrics: Option<Arc<dyn MetricsSink>>,
    /// Bound of the queue behind [`DynamicRouter::control_channel`].
    pub control_queue: usize,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            default_policy: DispatchPolicy::default(),
            channel_policies: HashMap::new(),
            metrics: None,
            control_queue: DEFAULT_CONTROL_QUEUE_CAPACITY,
        }
    }
}

/// A content-based router: channels of priority-ordered routes that can be
/// changed while messages are being dispatched.
pub struct DynamicRouter {
    name: String,
    registry: Arc<ChannelRegistry>,
    coordinator: Arc<BlockingCoordinator>,
    control_plane: Arc<ControlPlane>,
    engine: DispatchEngine,
    caches: CacheRegistry,
    control_queue: usize,
}

impl DynamicRouter {
    pub fn new(name: &str, options: RouterOptions) -> Self {
        let registry = Arc::new(ChannelRegistry::new(
            options.default_policy,
            options.channel_policies,
        ));
        let coordinator = Arc::new(BlockingCoordinator::new());
        let control_plane = Arc::new(ControlPlane::new(registry.clone(), coordinator.clone()));
        let engine = DispatchEngine::new(registry.clone(), coordinator.clone(), options.metrics);

        info!(
            component = COMPONENT,
            router = name,
            block = options.default_policy.block,
            fail_if_no_match = options.default_policy.fail_if_no_match,
            "router created"
        );

        Self {
            name: name.to_string(),
            registry,
            coordinator,
            control_plane,
            engine,
            caches: CacheRegistry::new(),
            control_queue: options.control_queue,
        }
    }

    /// Builds a router from configuration and applies its route descriptors in
    /// order. Every descriptor is validated before the first one is applied.
    pub fn from_config(
        name: &str,
        config: &RouterConfig,
        resolver: &dyn HandlerResolver,
        metrics: Option<Arc<dyn MetricsSink>>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let (default_policy, channel_policies) = config.dispatch_policies()?;
        let caches = config.cache_registry()?;

        let messages = config
            .routes
            .iter()
            .enumerate()
            .map(|(index, descriptor)| {
                descriptor
                    .clone()
                    .into_control_message(resolver, &caches)
                    .map_err(|err| {
                        ConfigurationError::new(format!("routes[{index}].{}", err.field), err.reason)
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut router = Self::new(
            name,
            RouterOptions {
                default_policy,
                channel_policies,
                metrics,
                control_queue: config.control_queue,
            },
        );
        router.caches = caches;

        for message in messages {
            router.control(message)?;
        }
        Ok(router)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Applies one control message synchronously.
    pub fn control(&self, message: ControlMessage) -> Result<ControlAck, ConfigurationError> {
        let route_id = message.id.clone();
        let channel = message.channel.clone();
        let ack = self.control_plane.handle(message)?;
        debug!(
            event = events::CONTROL_APPLIED,
            component = COMPONENT,
            router = %self.name,
            channel = %channel,
            route_id = %route_id,
            ack = ?ack,
            "control message applied"
        );
        Ok(ack)
    }

    /// Resolves an untyped descriptor against `resolver` and this router's
    /// caches, then applies it.
    pub fn control_descriptor(
        &self,
        descriptor: ControlMessageDescriptor,
        resolver: &dyn HandlerResolver,
    ) -> Result<ControlAck, ConfigurationError> {
        let message = descriptor.into_control_message(resolver, &self.caches)?;
        self.control(message)
    }

    /// Starts a serialized control loop and returns a handle to it.
    pub fn control_channel(&self) -> io::Result<ControlChannel> {
        spawn_control_loop(&self.name, self.control_plane.clone(), self.control_queue)
    }

    pub async fn dispatch(&self, message: Message) -> Result<DispatchOutcome, DispatchError> {
        self.engine.dispatch(message).await
    }

    pub async fn dispatch_with_policy(
        &self,
        message: Message,
        policy: DispatchPolicy,
    ) -> Result<DispatchOutcome, DispatchError> {
        self.engine.dispatch_with_policy(message, policy).await
    }

    pub async fn dispatch_until<C>(
        &self,
        message: Message,
        policy: DispatchPolicy,
        cancel: C,
    ) -> Result<DispatchOutcome, DispatchError>
    where
        C: Future<Output = ()>,
    {
        self.engine.dispatch_until(message, policy, cancel).await
    }

    /// Current routes of `channel` in evaluation order.
    pub fn routes(&self, channel: &str) -> Vec<RouteInfo> {
        self.registry
            .get(channel)
            .map(|channel| channel.table().snapshot().infos())
            .unwrap_or_default()
    }

    pub fn channel_policy(&self, channel: &str) -> DispatchPolicy {
        self.registry.channel(channel).policy()
    }

    pub fn set_channel_policy(&self, channel: &str, policy: DispatchPolicy) {
        self.registry.set_policy(channel, policy);
    }

    pub fn channel_names(&self) -> Vec<String> {
        self.registry.names()
    }

    /// Number of blocking dispatches currently parked on `channel`.
    pub fn pending_waiters(&self, channel: &str) -> usize {
        self.coordinator.pending(channel)
    }
}

#[cfg(test)]
mod tests {
    use super::{DynamicRouter, RouterOptions};
    use crate::config::{ConfigError, RouterConfig};
    use crate::control_plane::control_message::ControlMessageDescriptor;
    use crate::data_plane::dispatch::DispatchOutcome;
    use crate::data_plane::handler::{handler_fn, HandlerRegistry};
    use crate::message::Message;
    use crate::routing::policy::DispatchPolicy;
    use serde_json::json;
    use std::sync::Arc;

    fn handlers() -> HandlerRegistry {
        HandlerRegistry::new().with(
            "echo",
            handler_fn(|message: Arc<Message>| async move { Ok(message.payload.clone()) }),
        )
    }

    #[tokio::test]
    async fn config_routes_are_applied_in_order() {
        let config = RouterConfig::from_json5_str(
            r#"{
              routes: [
                { id: "eu", channel: "orders", priority: 1, handler: "echo",
                  predicate: { type: "header_equals", name: "region", value: "eu" } },
                { id: "any", channel: "orders", priority: 5, handler: "echo" },
              ],
            }"#,
        )
        .expect("valid config");
        let router = DynamicRouter::from_config("cfg", &config, &handlers(), None)
            .expect("router built");

        let ids: Vec<String> = router.routes("orders").into_iter().map(|info| info.id).collect();
        assert_eq!(ids, vec!["eu".to_string(), "any".to_string()]);

        let outcome = router
            .dispatch(Message::new("orders", json!(1)).with_header("region", "us"))
            .await
            .expect("delivered");
        assert_eq!(
            outcome,
            DispatchOutcome::Delivered {
                route_id: "any".to_string(),
                result: json!(1),
            }
        );
    }

    #[test]
    fn one_bad_route_rejects_the_whole_config() {
        let config = RouterConfig::from_json5_str(
            r#"{ routes: [
                { id: "ok", channel: "orders", handler: "echo" },
                { id: "bad", channel: "orders", handler: "missing" },
            ] }"#,
        )
        .expect("parses");

        let err = DynamicRouter::from_config("cfg", &config, &handlers(), None)
            .err()
            .expect("unknown handler rejected");
        match err {
            ConfigError::Validation(err) => assert_eq!(err.field, "routes[1].handler"),
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn descriptors_can_be_applied_at_runtime() {
        let router = DynamicRouter::new("rt", RouterOptions::default());
        let descriptor: ControlMessageDescriptor = serde_json::from_value(json!({
            "id": "late", "channel": "audit", "priority": 2, "handler": "echo"
        }))
        .expect("descriptor");

        router
            .control_descriptor(descriptor, &handlers())
            .expect("applied");

        assert_eq!(router.routes("audit").len(), 1);
        assert!(router.routes("unknown").is_empty());
        assert_eq!(router.channel_names(), vec!["audit".to_string()]);
    }

    #[test]
    fn channel_policy_can_be_changed() {
        let router = DynamicRouter::new("rt", RouterOptions::default());
        router.set_channel_policy("orders", DispatchPolicy::fail_fast());
        assert!(router.channel_policy("orders").fail_if_no_match);
        assert!(!router.channel_policy("other").fail_if_no_match);
    }
}
