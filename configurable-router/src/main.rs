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

//! Loads a JSON5 router configuration and dispatches newline-delimited JSON
//! read from stdin. Lines of the form `{"control": {...}}` are applied as
//! control messages; every other line is dispatched as a message.

use clap::Parser;
use dynamic_router::{
    handler_fn, ControlMessageDescriptor, DispatchOutcome, DynamicRouter, HandlerError,
    HandlerRegistry, Message, MetricsCrateSink, MetricsSink, RouterConfig,
};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use serde::Deserialize;
use serde_json::{json, Value};
use std::error::Error;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about = "Priority-ordered content-based router fed from stdin")]
struct Args {
    /// Path to the JSON5 configuration file.
    #[arg(short, long, default_value = "configs/router.json5")]
    config: PathBuf,
    /// Router name used in logs.
    #[arg(short, long, default_value = "configurable-router")]
    name: String,
    /// Serve Prometheus metrics on this address. Counters are discarded when unset.
    #[arg(long)]
    metrics_listen: Option<SocketAddr>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum InputLine {
    Control { control: ControlMessageDescriptor },
    Message(Message),
}

fn builtin_handlers() -> HandlerRegistry {
    HandlerRegistry::new()
        .with(
            "echo",
            handler_fn(|message: Arc<Message>| async move { Ok(message.payload.clone()) }),
        )
        .with(
            "log",
            handler_fn(|message: Arc<Message>| async move {
                info!(
                    channel = %message.channel,
                    payload = %message.payload,
                    "message received"
                );
                Ok(json!({ "logged": true }))
            }),
        )
        .with(
            "reject",
            handler_fn(|_message: Arc<Message>| async move {
                let err: HandlerError = "rejected by the reject handler".into();
                Err(err)
            }),
        )
}

fn metrics_sink(listen: Option<SocketAddr>) -> Result<Option<Arc<dyn MetricsSink>>, BuildError> {
    let Some(address) = listen else {
        return Ok(None);
    };
    PrometheusBuilder::new()
        .with_http_listener(address)
        .install()?;
    info!(address = %address, "serving metrics");
    let sink: Arc<dyn MetricsSink> = Arc::new(MetricsCrateSink);
    Ok(Some(sink))
}

fn print_line(value: Value) {
    println!("{value}");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    info!(config = %args.config.display(), name = %args.name, "starting router");

    let config = RouterConfig::load(&args.config)?;
    let handlers = Arc::new(builtin_handlers());
    let metrics = metrics_sink(args.metrics_listen)?;
    let router = Arc::new(DynamicRouter::from_config(
        &args.name,
        &config,
        handlers.as_ref(),
        metrics,
    )?);

    for channel in router.channel_names() {
        for route in router.routes(&channel) {
            info!(
                channel = %channel,
                route_id = %route.id,
                priority = route.priority,
                predicate = %route.predicate,
                "configured route"
            );
        }
    }

    let mut in_flight = JoinSet::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, shutting down");
                break;
            }
        };
        let Some(line) = line else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<InputLine>(&line) {
            Ok(InputLine::Control { control }) => {
                match router.control_descriptor(control, handlers.as_ref()) {
                    Ok(ack) => print_line(json!({ "control": format!("{ack:?}") })),
                    Err(err) => print_line(json!({ "error": err.to_string() })),
                }
            }
            Ok(InputLine::Message(message)) => {
                // Blocking dispatches must not hold up control lines further down
                // the input, so each dispatch runs on its own task.
                let router = router.clone();
                in_flight.spawn(async move {
                    let channel = message.channel.clone();
                    match router.dispatch(message).await {
                        Ok(DispatchOutcome::Delivered { route_id, result }) => print_line(json!({
                            "channel": channel,
                            "outcome": "delivered",
                            "route_id": route_id,
                            "result": result,
                        })),
                        Ok(DispatchOutcome::Dropped) => print_line(json!({
                            "channel": channel,
                            "outcome": "dropped",
                        })),
                        Err(err) => {
                            warn!(channel = %channel, err = %err, "dispatch failed");
                            print_line(json!({
                                "channel": channel,
                                "outcome": "failed",
                                "error": err.to_string(),
                            }));
                        }
                    }
                });
            }
            Err(err) => {
                error!(err = %err, "unreadable input line");
                print_line(json!({ "error": format!("unreadable input: {err}") }));
            }
        }
    }

    while in_flight.join_next().await.is_some() {}
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{builtin_handlers, metrics_sink, Args, InputLine};
    use clap::Parser;
    use dynamic_router::DynamicRouter;

    #[test]
    fn metrics_listener_is_optional() {
        let args = Args::try_parse_from(["configurable-router"]).expect("defaults parse");
        assert_eq!(args.metrics_listen, None);
        assert!(metrics_sink(args.metrics_listen).expect("no exporter").is_none());

        let args = Args::try_parse_from([
            "configurable-router",
            "--metrics-listen",
            "127.0.0.1:9000",
        ])
        .expect("address parses");
        assert_eq!(args.metrics_listen, Some("127.0.0.1:9000".parse().expect("address")));

        assert!(
            Args::try_parse_from(["configurable-router", "--metrics-listen", "nowhere"]).is_err()
        );
    }

    #[test]
    fn control_line_without_id_is_rejected_by_field() {
        let line = r#"{"control": {"channel": "orders", "handler": "echo"}}"#;
        let Ok(InputLine::Control { control }) = serde_json::from_str::<InputLine>(line) else {
            panic!("control line must parse as a control message");
        };

        let handlers = builtin_handlers();
        let router = DynamicRouter::new("cli-test", Default::default());
        let err = router
            .control_descriptor(control, &handlers)
            .expect_err("missing id rejected");
        assert_eq!(err.field, "id");
    }
}
