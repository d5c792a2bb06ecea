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

//! Control-plane layer.
//!
//! Owns control-message validation, the per-channel routing table and the
//! subscribe/unsubscribe lifecycle. Repeated subscribes with the same id
//! overwrite (last writer wins) and unsubscribing an unknown id is a no-op.
//!
//! ```
//! use std::sync::Arc;
//! use dynamic_router::{handler_fn, predicate_fn, ControlAck, ControlMessage, DynamicRouter, Message};
//!
//! let router = DynamicRouter::new("control-plane-doc", Default::default());
//! let subscribe = || {
//!     ControlMessage::subscribe(
//!         "audit",
//!         "orders",
//!         10,
//!         predicate_fn(|_message: &Message| true),
//!         handler_fn(|_message: Arc<Message>| async { Ok(serde_json::Value::Null) }),
//!     )
//! };
//!
//! assert_eq!(router.control(subscribe()).unwrap(), ControlAck::Subscribed { replaced: false });
//! assert_eq!(router.control(subscribe()).unwrap(), ControlAck::Subscribed { replaced: true });
//! assert_eq!(
//!     router.control(ControlMessage::unsubscribe("audit", "orders")).unwrap(),
//!     ControlAck::Unsubscribed { removed: true }
//! );
//! assert_eq!(
//!     router.control(ControlMessage::unsubscribe("audit", "orders")).unwrap(),
//!     ControlAck::Unsubscribed { removed: false }
//! );
//! ```

pub(crate) mod control_message;
pub(crate) mod route_lifecycle;
pub(crate) mod route_table;
