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

//! Observability vocabulary.
//!
//! Every `tracing` event emitted by the crate carries an `event` field drawn from
//! [`events`] and a `component` field naming the emitting module, so log
//! pipelines can filter on stable identifiers instead of message text.

pub mod events;
pub mod fields;
