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

//! # dynamic-router
//!
//! `dynamic-router` delivers each message to exactly one handler, chosen by
//! evaluating the routes of the message's channel in ascending priority order
//! (lower number first, ties broken by route id). Routes are added, replaced
//! and removed at runtime through control messages while dispatches run.
//!
//! ```
//! use std::sync::Arc;
//! use dynamic_router::{
//!     handler_fn, predicate_fn, ControlMessage, DispatchOutcome, DynamicRouter, Message,
//! };
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let router = DynamicRouter::new("quick-start", Default::default());
//!
//! router
//!     .control(ControlMessage::subscribe(
//!         "eu-orders",
//!         "orders",
//!         1,
//!         predicate_fn(|message: &Message| message.header("region") == Some("eu")),
//!         handler_fn(|_message: Arc<Message>| async { Ok(serde_json::json!("eu")) }),
//!     ))
//!     .unwrap();
//!
//! let outcome = router
//!     .dispatch(Message::new("orders", serde_json::Value::Null).with_header("region", "eu"))
//!     .await
//!     .unwrap();
//! assert_eq!(
//!     outcome,
//!     DispatchOutcome::Delivered { route_id: "eu-orders".to_string(), result: serde_json::json!("eu") }
//! );
//!
//! // Without a match the default policy drops the message.
//! let dropped = router
//!     .dispatch(Message::new("orders", serde_json::Value::Null))
//!     .await
//!     .unwrap();
//! assert_eq!(dropped, DispatchOutcome::Dropped);
//! # });
//! ```
//!
//! ## Dispatch policies
//!
//! When nothing matches, the channel's [`DispatchPolicy`] decides: wait for a
//! subscribe until a deadline (`block`), fail immediately
//! (`fail_if_no_match`), or drop the message, optionally with a warning.
//! Blocking takes precedence over failing fast.
//!
//! ## Internal architecture map
//!
//! - API facade: [`DynamicRouter`] and [`RouterConfig`]
//! - Control plane: control-message validation, routing tables and the
//!   subscribe/unsubscribe lifecycle
//! - Routing: channels, dispatch policies and predicates
//! - Data plane: dispatch engine, handlers and the blocking coordinator
//! - Runtime: the serialized control loop behind [`ControlChannel`]
//!
//! ## Observability model
//!
//! The crate uses `tracing` for logs/events and an injectable [`MetricsSink`]
//! for counters. Library code never installs a global subscriber or recorder;
//! binaries and tests do that at process boundaries.

mod cache;
pub use cache::{CacheConfig, CacheRegistry, CacheSlot, SharedCache, DEFAULT_CACHE_CAPACITY};

mod config;
pub use config::{ConfigError, RouterConfig, DEFAULT_CONTROL_QUEUE_CAPACITY};

mod control_plane;
pub use control_plane::control_message::{
    ControlMessage, ControlMessageDescriptor, Operation, DEFAULT_PRIORITY,
};
pub use control_plane::route_lifecycle::{ControlAck, ControlPlane};
pub use control_plane::route_table::{Route, RouteInfo, RouteSnapshot, RoutingTable};

mod data_plane;
pub use data_plane::blocking::{BlockingCoordinator, WaiterRegistration};
pub use data_plane::dispatch::{DispatchEngine, DispatchOutcome, DispatchState};
pub use data_plane::handler::{handler_fn, Handler, HandlerRegistry, HandlerResolver};

mod error;
pub use error::{ConfigurationError, ControlChannelError, DispatchError, HandlerError};

mod message;
pub use message::{Headers, Message};

pub mod metrics;
pub use crate::metrics::{MetricsCrateSink, MetricsSink};

#[doc(hidden)]
pub mod observability;

mod routing;
pub use routing::channel_registry::{Channel, ChannelRegistry};
pub use routing::policy::{DispatchPolicy, PolicyConfig, DEFAULT_TIMEOUT};
pub use routing::predicate::{predicate_fn, Predicate, PredicateSpec};

mod router;
pub use router::{DynamicRouter, RouterOptions};

mod runtime;
pub use runtime::control_loop::ControlChannel;
