use dynamic_router::metrics::{DISPATCHED_TOTAL, DROPPED_TOTAL, FAILED_TOTAL, TIMED_OUT_TOTAL};
use dynamic_router::{
    predicate_fn, ControlMessage, DispatchError, DispatchOutcome, DispatchPolicy, DynamicRouter,
    Handler, Message, MetricsSink, RouterOptions,
};
use router_test_utils::{init_logging, CountingMetrics, FailingHandler, RecordingHandler};
use serde_json::json;
use std::error::Error;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn router_with_metrics() -> (Arc<DynamicRouter>, Arc<CountingMetrics>) {
    init_logging();
    let metrics = CountingMetrics::new();
    let sink: Arc<dyn MetricsSink> = metrics.clone();
    let router = DynamicRouter::new(
        "dispatch-policies",
        RouterOptions {
            metrics: Some(sink),
            ..Default::default()
        },
    );
    (Arc::new(router), metrics)
}

fn subscribe(id: &str, channel: &str, priority: i32, handler: Arc<dyn Handler>) -> ControlMessage {
    ControlMessage::subscribe(
        id,
        channel,
        priority,
        predicate_fn(|_message: &Message| true),
        handler,
    )
}

#[tokio::test]
async fn lower_priority_number_is_selected() {
    let (router, metrics) = router_with_metrics();
    let a = RecordingHandler::new("A");
    let b = RecordingHandler::new("B");
    router.control(subscribe("A", "orders", 5, a.clone())).expect("applied");
    router.control(subscribe("B", "orders", 1, b.clone())).expect("applied");

    let outcome = router
        .dispatch(Message::new("orders", json!({"n": 1})))
        .await
        .expect("delivered");

    assert_eq!(
        outcome,
        DispatchOutcome::Delivered {
            route_id: "B".to_string(),
            result: json!("B"),
        }
    );
    assert_eq!(b.calls(), 1);
    assert_eq!(a.calls(), 0);
    assert_eq!(metrics.get(DISPATCHED_TOTAL), 1);
}

#[tokio::test]
async fn only_matching_routes_are_considered() {
    let (router, _) = router_with_metrics();
    let eu = RecordingHandler::new("eu");
    let fallback = RecordingHandler::new("fallback");
    router
        .control(ControlMessage::subscribe(
            "eu",
            "orders",
            1,
            predicate_fn(|message: &Message| message.header("region") == Some("eu")),
            eu.clone(),
        ))
        .expect("applied");
    router
        .control(subscribe("fallback", "orders", 100, fallback.clone()))
        .expect("applied");

    router
        .dispatch(Message::new("orders", json!(1)).with_header("region", "us"))
        .await
        .expect("delivered");
    router
        .dispatch(Message::new("orders", json!(2)).with_header("region", "eu"))
        .await
        .expect("delivered");

    assert_eq!(eu.calls(), 1);
    assert_eq!(fallback.calls(), 1);
    assert_eq!(eu.received()[0].payload, json!(2));
}

#[tokio::test]
async fn unmatched_message_is_dropped_and_counted_once() {
    let (router, metrics) = router_with_metrics();

    let outcome = router
        .dispatch_with_policy(
            Message::new("empty", json!(null)),
            DispatchPolicy::dropping(true),
        )
        .await
        .expect("drop is not an error");

    assert_eq!(outcome, DispatchOutcome::Dropped);
    assert_eq!(metrics.get(DROPPED_TOTAL), 1);
    assert_eq!(metrics.get(FAILED_TOTAL), 0);
}

#[tokio::test]
async fn fail_fast_returns_without_waiting() {
    let (router, metrics) = router_with_metrics();
    let started = Instant::now();

    let result = tokio::time::timeout(
        Duration::from_millis(500),
        router.dispatch_with_policy(Message::new("empty", json!(null)), DispatchPolicy::fail_fast()),
    )
    .await
    .expect("fail-fast never suspends");

    assert!(matches!(
        result,
        Err(DispatchError::NoMatchingRoute { ref channel }) if channel == "empty"
    ));
    assert!(started.elapsed() < Duration::from_millis(500));
    assert_eq!(router.pending_waiters("empty"), 0);
    assert_eq!(metrics.get(FAILED_TOTAL), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn blocking_dispatch_completes_when_a_route_arrives() {
    let (router, _) = router_with_metrics();
    let started = Instant::now();

    let waiting = {
        let router = router.clone();
        tokio::spawn(async move {
            router
                .dispatch_with_policy(
                    Message::new("late", json!("payload")),
                    DispatchPolicy::blocking(Duration::from_millis(30_000)),
                )
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(router.pending_waiters("late"), 1);
    let handler = RecordingHandler::new("late-handler");
    router
        .control(subscribe("late-handler", "late", 1, handler.clone()))
        .expect("applied");

    let outcome = waiting.await.expect("task joined").expect("delivered");
    let elapsed = started.elapsed();

    assert!(matches!(outcome, DispatchOutcome::Delivered { ref route_id, .. } if route_id == "late-handler"));
    assert!(elapsed >= Duration::from_millis(50));
    assert!(elapsed < Duration::from_secs(1), "took {elapsed:?}");
    assert_eq!(handler.calls(), 1);
    assert_eq!(router.pending_waiters("late"), 0);
}

#[tokio::test]
async fn blocking_dispatch_times_out() {
    let (router, metrics) = router_with_metrics();

    let err = router
        .dispatch_with_policy(
            Message::new("nobody", json!(null)),
            DispatchPolicy::blocking(Duration::from_millis(30)),
        )
        .await
        .expect_err("no subscriber arrives");

    assert!(matches!(
        err,
        DispatchError::RouteTimeout { ref channel, timeout }
            if channel == "nobody" && timeout == Duration::from_millis(30)
    ));
    assert_eq!(metrics.get(TIMED_OUT_TOTAL), 1);
    assert_eq!(router.pending_waiters("nobody"), 0);
}

#[tokio::test]
async fn non_matching_subscribe_keeps_the_waiter_parked() {
    let (router, _) = router_with_metrics();
    let blocking = DispatchPolicy::blocking(Duration::from_millis(200));

    let dispatch = router.dispatch_with_policy(
        Message::new("orders", json!(null)).with_header("kind", "refund"),
        blocking,
    );
    let control = async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        router
            .control(ControlMessage::subscribe(
                "sales-only",
                "orders",
                1,
                predicate_fn(|message: &Message| message.header("kind") == Some("sale")),
                RecordingHandler::new("sales"),
            ))
            .expect("applied");
        tokio::time::sleep(Duration::from_millis(20)).await;
        router.pending_waiters("orders")
    };

    let (result, still_waiting) = tokio::join!(dispatch, control);

    assert_eq!(still_waiting, 1);
    assert!(matches!(result, Err(DispatchError::RouteTimeout { .. })));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn every_waiter_on_the_channel_is_woken() {
    let (router, _) = router_with_metrics();
    let waiters: Vec<_> = (0..8)
        .map(|n| {
            let router = router.clone();
            tokio::spawn(async move {
                router
                    .dispatch_with_policy(
                        Message::new("shared", json!(n)),
                        DispatchPolicy::blocking(Duration::from_secs(10)),
                    )
                    .await
            })
        })
        .collect();

    while router.pending_waiters("shared") < 8 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let handler = RecordingHandler::new("shared");
    router
        .control(subscribe("shared", "shared", 1, handler.clone()))
        .expect("applied");

    for waiter in waiters {
        let outcome = waiter.await.expect("task joined").expect("delivered");
        assert!(matches!(outcome, DispatchOutcome::Delivered { .. }));
    }
    assert_eq!(handler.calls(), 8);
    assert_eq!(router.pending_waiters("shared"), 0);
}

#[tokio::test]
async fn external_cancellation_deregisters_the_waiter() {
    let (router, _) = router_with_metrics();
    let (cancel, cancelled) = tokio::sync::oneshot::channel::<()>();

    let dispatch = router.dispatch_until(
        Message::new("orders", json!(null)),
        DispatchPolicy::blocking(Duration::from_secs(30)),
        async move {
            let _ = cancelled.await;
        },
    );
    let canceller = async {
        while router.pending_waiters("orders") == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        let _ = cancel.send(());
    };

    let (result, ()) = tokio::join!(dispatch, canceller);

    assert!(matches!(result, Err(DispatchError::Cancelled { .. })));
    assert_eq!(router.pending_waiters("orders"), 0);
}

#[tokio::test]
async fn handler_errors_carry_route_context() {
    let (router, metrics) = router_with_metrics();
    let failing = FailingHandler::new("database offline");
    router
        .control(subscribe("billing", "orders", 1, failing.clone()))
        .expect("applied");

    let err = router
        .dispatch(Message::new("orders", json!(null)))
        .await
        .expect_err("handler failure surfaces");

    match &err {
        DispatchError::Handler {
            channel, route_id, ..
        } => {
            assert_eq!(channel, "orders");
            assert_eq!(route_id, "billing");
        }
        other => panic!("unexpected error {other}"),
    }
    assert_eq!(
        err.source().map(ToString::to_string),
        Some("database offline".to_string())
    );
    assert_eq!(failing.calls(), 1);
    assert_eq!(metrics.get(FAILED_TOTAL), 1);
    assert_eq!(metrics.get(DISPATCHED_TOTAL), 0);
}

#[tokio::test]
async fn channel_policy_applies_to_plain_dispatch() {
    let (router, metrics) = router_with_metrics();
    router.set_channel_policy("strict", DispatchPolicy::fail_fast());

    let strict = router.dispatch(Message::new("strict", json!(null))).await;
    let lenient = router.dispatch(Message::new("lenient", json!(null))).await;

    assert!(matches!(strict, Err(DispatchError::NoMatchingRoute { .. })));
    assert!(matches!(lenient, Ok(DispatchOutcome::Dropped)));
    assert_eq!(metrics.get(DROPPED_TOTAL), 1);
}
