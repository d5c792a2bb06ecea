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

//! Data-plane layer.
//!
//! Evaluates messages against a channel's routing snapshot, delivers them to
//! exactly one handler and parks blocking dispatches until a subscribe wakes
//! them or their deadline passes.
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use dynamic_router::{
//!     handler_fn, predicate_fn, ControlMessage, DispatchOutcome, DispatchPolicy, DynamicRouter,
//!     Message,
//! };
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let router = Arc::new(DynamicRouter::new("data-plane-doc", Default::default()));
//!
//! let waiting = {
//!     let router = router.clone();
//!     tokio::spawn(async move {
//!         router
//!             .dispatch_with_policy(
//!                 Message::new("orders", serde_json::json!({"sku": 7})),
//!                 DispatchPolicy::blocking(Duration::from_secs(5)),
//!             )
//!             .await
//!     })
//! };
//!
//! tokio::time::sleep(Duration::from_millis(20)).await;
//! router
//!     .control(ControlMessage::subscribe(
//!         "late",
//!         "orders",
//!         1,
//!         predicate_fn(|_message: &Message| true),
//!         handler_fn(|message: Arc<Message>| async move { Ok(message.payload.clone()) }),
//!     ))
//!     .unwrap();
//!
//! let outcome = waiting.await.unwrap().unwrap();
//! assert_eq!(
//!     outcome,
//!     DispatchOutcome::Delivered { route_id: "late".to_string(), result: serde_json::json!({"sku": 7}) }
//! );
//! # });
//! ```

pub(crate) mod blocking;
pub(crate) mod dispatch;
pub(crate) mod handler;
