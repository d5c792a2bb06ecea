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

//! Routing layer.
//!
//! Owns channels, their dispatch policies and the predicates routes are
//! matched with. Predicates can be supplied as closures or compiled from the
//! declarative [`PredicateSpec`](crate::PredicateSpec) form used in
//! configuration.
//!
//! ```
//! use dynamic_router::{CacheRegistry, Message, Predicate, PredicateSpec};
//!
//! let spec: PredicateSpec = serde_json::from_str(
//!     r#"{"type": "any", "predicates": [
//!         {"type": "header_equals", "name": "region", "value": "eu"},
//!         {"type": "header_present", "name": "priority"}
//!     ]}"#,
//! )
//! .unwrap();
//! let predicate = spec.compile(&CacheRegistry::new()).unwrap();
//!
//! let eu = Message::new("orders", serde_json::Value::Null).with_header("region", "eu");
//! let us = Message::new("orders", serde_json::Value::Null).with_header("region", "us");
//! assert!(predicate.matches(&eu));
//! assert!(!predicate.matches(&us));
//! ```

pub(crate) mod channel_registry;
pub(crate) mod policy;
pub(crate) mod predicate;
