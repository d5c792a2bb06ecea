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

//! Shared fixtures for router integration tests and benches.

use async_trait::async_trait;
use dynamic_router::{Handler, HandlerError, Message, MetricsSink};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;
use tracing::trace;
use tracing_subscriber::EnvFilter;

static LOGGING: Once = Once::new();

/// Installs a test-friendly `tracing` subscriber once per process. Honors
/// `RUST_LOG`, defaulting to `warn`.
pub fn init_logging() {
    LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Handler that records every message it receives and replies with a fixed
/// value.
pub struct RecordingHandler {
    name: String,
    reply: Value,
    delay: Option<Duration>,
    received: Mutex<Vec<Arc<Message>>>,
    calls: AtomicUsize,
}

impl RecordingHandler {
    pub fn new(name: &str) -> Arc<Self> {
        Self::with_reply(name, Value::String(name.to_string()))
    }

    pub fn with_reply(name: &str, reply: Value) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            reply,
            delay: None,
            received: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        })
    }

    /// Sleeps for `delay` before replying.
    pub fn slow(name: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            reply: Value::String(name.to_string()),
            delay: Some(delay),
            received: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn received(&self) -> Vec<Arc<Message>> {
        self.received
            .lock()
            .expect("recording handler lock poisoned")
            .clone()
    }
}

#[async_trait]
impl Handler for RecordingHandler {
    async fn handle(&self, message: Arc<Message>) -> Result<Value, HandlerError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        trace!(handler = %self.name, channel = %message.channel, "recording message");
        self.received
            .lock()
            .expect("recording handler lock poisoned")
            .push(message);
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.reply.clone())
    }
}

/// Handler that always fails with the given reason.
pub struct FailingHandler {
    reason: String,
    calls: AtomicUsize,
}

impl FailingHandler {
    pub fn new(reason: &str) -> Arc<Self> {
        Arc::new(Self {
            reason: reason.to_string(),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Handler for FailingHandler {
    async fn handle(&self, _message: Arc<Message>) -> Result<Value, HandlerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(self.reason.clone().into())
    }
}

/// In-memory metrics sink.
#[derive(Default)]
pub struct CountingMetrics {
    counts: Mutex<HashMap<String, u64>>,
}

impl CountingMetrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn get(&self, name: &str) -> u64 {
        self.counts
            .lock()
            .expect("metrics lock poisoned")
            .get(name)
            .copied()
            .unwrap_or(0)
    }
}

impl MetricsSink for CountingMetrics {
    fn increment(&self, name: &str, by: u64) {
        *self
            .counts
            .lock()
            .expect("metrics lock poisoned")
            .entry(name.to_string())
            .or_insert(0) += by;
    }
}
