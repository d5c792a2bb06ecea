//! Dispatch engine: match one message against a channel snapshot and invoke the
//! selected handler.

use crate::control_plane::route_table::Route;
use crate::data_plane::blocking::BlockingCoordinator;
use crate::error::DispatchError;
use crate::message::Message;
use crate::metrics::{self, Counters, MetricsSink};
use crate::observability::{events, fields};
use crate::routing::channel_registry::{Channel, ChannelRegistry};
use crate::routing::policy::DispatchPolicy;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace, warn};
use uuid::Uuid;

const COMPONENT: &str = "dispatch_engine";

/// Far-future stand-in for timeouts too large to add to `Instant::now()`.
const MAX_WAIT: Duration = Duration::from_secs(60 * 60 * 24 * 365);

/// Successful completion of a dispatch.
#[derive(Clone, Debug, PartialEq)]
pub enum DispatchOutcome {
    /// Exactly one handler received the message.
    Delivered { route_id: String, result: Value },
    /// No route matched and the policy allows dropping.
    Dropped,
}

/// Lifecycle of a single dispatch request.
///
/// ```text
/// Pending -> Matched -> Delivered
///                    -> Failed      (handler error)
/// Pending -> TimedOut | Dropped | Failed | Cancelled
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchState {
    Pending,
    Matched,
    Delivered,
    TimedOut,
    Dropped,
    Failed,
    Cancelled,
}

impl DispatchState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, DispatchState::Pending | DispatchState::Matched)
    }

    pub fn can_transition_to(self, next: DispatchState) -> bool {
        use DispatchState::*;
        matches!(
            (self, next),
            (Pending, Matched)
                | (Pending, TimedOut)
                | (Pending, Dropped)
                | (Pending, Failed)
                | (Pending, Cancelled)
                | (Matched, Delivered)
                | (Matched, Failed)
        )
    }
}

struct DispatchRequest {
    id: Uuid,
    message: Arc<Message>,
    deadline: Option<Instant>,
    state: DispatchState,
}

impl DispatchRequest {
    fn new(message: Arc<Message>) -> Self {
        Self {
            id: Uuid::new_v4(),
            message,
            deadline: None,
            state: DispatchState::Pending,
        }
    }

    fn channel(&self) -> &str {
        &self.message.channel
    }

    fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    fn transition(&mut self, next: DispatchState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal dispatch transition {:?} -> {:?}",
            self.state,
            next
        );
        trace!(
            event = events::DISPATCH_STATE,
            component = COMPONENT,
            request_id = %self.id,
            channel = %self.message.channel,
            from = ?self.state,
            to = ?next,
            "dispatch state transition"
        );
        self.state = next;
    }
}

pub struct DispatchEngine {
    registry: Arc<ChannelRegistry>,
    coordinator: Arc<BlockingCoordinator>,
    counters: Counters,
}

impl DispatchEngine {
    pub fn new(
        registry: Arc<ChannelRegistry>,
        coordinator: Arc<BlockingCoordinator>,
        metrics: Option<Arc<dyn MetricsSink>>,
    ) -> Self {
        Self {
            registry,
            coordinator,
            counters: Counters::new(metrics),
        }
    }

    /// Dispatches using the target channel's configured policy.
    pub async fn dispatch(&self, message: Message) -> Result<DispatchOutcome, DispatchError> {
        let policy = self.registry.channel(&message.channel).policy();
        self.dispatch_with_policy(message, policy).await
    }

    pub async fn dispatch_with_policy(
        &self,
        message: Message,
        policy: DispatchPolicy,
    ) -> Result<DispatchOutcome, DispatchError> {
        self.dispatch_until(message, policy, std::future::pending())
            .await
    }

    /// Like [`Self::dispatch_with_policy`], but a blocking wait also ends with
    /// [`DispatchError::Cancelled`] once `cancel` resolves. Dropping the returned
    /// future cancels as well; either way the waiter is deregistered.
    pub async fn dispatch_until<C>(
        &self,
        message: Message,
        policy: DispatchPolicy,
        cancel: C,
    ) -> Result<DispatchOutcome, DispatchError>
    where
        C: Future<Output = ()>,
    {
        let channel = self.registry.channel(&message.channel);
        let mut request = DispatchRequest::new(Arc::new(message));

        let selected = channel
            .table()
            .snapshot()
            .first_match(&request.message)
            .cloned();
        if let Some(route) = selected {
            request.transition(DispatchState::Matched);
            return self.deliver(&mut request, &route).await;
        }

        if policy.block {
            return self
                .wait_for_route(&channel, &mut request, policy.timeout, cancel)
                .await;
        }

        if policy.fail_if_no_match {
            request.transition(DispatchState::Failed);
            self.counters.increment(metrics::FAILED_TOTAL);
            debug!(
                event = events::DISPATCH_NO_MATCH,
                component = COMPONENT,
                request_id = %request.id,
                channel = request.channel(),
                "no matching route, failing fast"
            );
            return Err(DispatchError::NoMatchingRoute {
                channel: request.channel().to_string(),
            });
        }

        request.transition(DispatchState::Dropped);
        self.counters.increment(metrics::DROPPED_TOTAL);
        if policy.warn_on_drop {
            warn!(
                event = events::DISPATCH_DROPPED,
                component = COMPONENT,
                request_id = %request.id,
                channel = request.channel(),
                headers = %fields::format_headers(&request.message.headers),
                "no matching route, message dropped"
            );
        } else {
            debug!(
                event = events::DISPATCH_DROPPED,
                component = COMPONENT,
                request_id = %request.id,
                channel = request.channel(),
                "no matching route, message dropped"
            );
        }
        Ok(DispatchOutcome::Dropped)
    }

    async fn wait_for_route<C>(
        &self,
        channel: &Channel,
        request: &mut DispatchRequest,
        timeout: Duration,
        cancel: C,
    ) -> Result<DispatchOutcome, DispatchError>
    where
        C: Future<Output = ()>,
    {
        let now = Instant::now();
        let deadline = now
            .checked_add(timeout)
            .unwrap_or_else(|| now + MAX_WAIT);
        request.deadline = Some(deadline);

        // Register before re-scanning so a subscribe racing with the first scan
        // still leaves a wake-up permit behind.
        let registration = self.coordinator.register(channel.name());
        debug!(
            component = COMPONENT,
            request_id = %request.id,
            channel = channel.name(),
            waiter_id = registration.id(),
            timeout_ms = fields::millis(timeout),
            "no matching route, waiting for subscriber"
        );

        let sleep = tokio::time::sleep_until(deadline);
        tokio::pin!(sleep);
        tokio::pin!(cancel);

        loop {
            let selected = channel
                .table()
                .snapshot()
                .first_match(&request.message)
                .cloned();
            if let Some(route) = selected {
                drop(registration);
                request.transition(DispatchState::Matched);
                return self.deliver(request, &route).await;
            }

            tokio::select! {
                _ = registration.notified() => {
                    trace!(
                        component = COMPONENT,
                        request_id = %request.id,
                        channel = channel.name(),
                        remaining_ms = request.remaining().map(fields::millis),
                        "subscribe observed, re-evaluating"
                    );
                }
                _ = &mut sleep => {
                    request.transition(DispatchState::TimedOut);
                    self.counters.increment(metrics::TIMED_OUT_TOTAL);
                    warn!(
                        event = events::DISPATCH_TIMED_OUT,
                        component = COMPONENT,
                        request_id = %request.id,
                        channel = channel.name(),
                        timeout_ms = fields::millis(timeout),
                        "no route matched before the deadline"
                    );
                    return Err(DispatchError::RouteTimeout {
                        channel: channel.name().to_string(),
                        timeout,
                    });
                }
                _ = &mut cancel => {
                    request.transition(DispatchState::Cancelled);
                    debug!(
                        event = events::DISPATCH_CANCELLED,
                        component = COMPONENT,
                        request_id = %request.id,
                        channel = channel.name(),
                        "blocking dispatch cancelled"
                    );
                    return Err(DispatchError::Cancelled {
                        channel: channel.name().to_string(),
                    });
                }
            }
        }
    }

    async fn deliver(
        &self,
        request: &mut DispatchRequest,
        route: &Arc<Route>,
    ) -> Result<DispatchOutcome, DispatchError> {
        match route.handler().handle(request.message.clone()).await {
            Ok(result) => {
                request.transition(DispatchState::Delivered);
                self.counters.increment(metrics::DISPATCHED_TOTAL);
                debug!(
                    event = events::DISPATCH_DELIVERED,
                    component = COMPONENT,
                    request_id = %request.id,
                    channel = request.channel(),
                    route_id = route.id(),
                    priority = route.priority(),
                    "message delivered"
                );
                Ok(DispatchOutcome::Delivered {
                    route_id: route.id().to_string(),
                    result,
                })
            }
            Err(source) => {
                request.transition(DispatchState::Failed);
                self.counters.increment(metrics::FAILED_TOTAL);
                warn!(
                    event = events::DISPATCH_HANDLER_FAILED,
                    component = COMPONENT,
                    request_id = %request.id,
                    channel = request.channel(),
                    route_id = route.id(),
                    err = %source,
                    "route handler failed"
                );
                Err(DispatchError::Handler {
                    channel: request.channel().to_string(),
                    route_id: route.id().to_string(),
                    source,
                })
            }
        }
    }
}
