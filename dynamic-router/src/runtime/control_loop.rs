//! Serialized control-message loop fed by a bounded queue.

use crate::control_plane::control_message::ControlMessage;
use crate::control_plane::route_lifecycle::{ControlAck, ControlPlane};
use crate::error::{ConfigurationError, ControlChannelError};
use crate::observability::events;
use std::io;
use std::sync::Arc;
use std::thread;
use tokio::runtime::Builder;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};
use uuid::Uuid;

const COMPONENT: &str = "control_loop";

type Reply = oneshot::Sender<Result<ControlAck, ConfigurationError>>;

struct ControlRequest {
    message: ControlMessage,
    reply: Reply,
}

/// Cloneable handle for submitting control messages to a running loop.
///
/// Messages are applied one at a time in the order they were queued. The loop
/// stops once every handle has been dropped.
#[derive(Clone)]
pub struct ControlChannel {
    sender: mpsc::Sender<ControlRequest>,
}

impl ControlChannel {
    /// Queues `message` and waits for it to be applied.
    pub async fn send(&self, message: ControlMessage) -> Result<ControlAck, ControlChannelError> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(ControlRequest { message, reply })
            .await
            .map_err(|_| ControlChannelError::Closed)?;
        let ack = response.await.map_err(|_| ControlChannelError::Closed)?;
        Ok(ack?)
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Starts a control loop on a dedicated thread with its own current-thread
/// runtime.
pub(crate) fn spawn_control_loop(
    router_name: &str,
    control_plane: Arc<ControlPlane>,
    capacity: usize,
) -> io::Result<ControlChannel> {
    let runtime = Builder::new_current_thread().enable_all().build()?;
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    let loop_id = Uuid::new_v4().to_string();
    let router_name = router_name.to_string();

    thread::Builder::new()
        .name(format!("{router_name}-control"))
        .spawn(move || {
            runtime.block_on(control_loop(loop_id, router_name, control_plane, receiver));
        })?;

    Ok(ControlChannel { sender })
}

async fn control_loop(
    loop_id: String,
    router_name: String,
    control_plane: Arc<ControlPlane>,
    mut receiver: mpsc::Receiver<ControlRequest>,
) {
    info!(
        event = events::CONTROL_LOOP_STARTED,
        component = COMPONENT,
        loop_id = %loop_id,
        router = %router_name,
        "control loop started"
    );

    let mut applied: u64 = 0;
    while let Some(ControlRequest { message, reply }) = receiver.recv().await {
        let route_id = message.id.clone();
        let result = control_plane.handle(message);
        if result.is_ok() {
            applied += 1;
        }
        if reply.send(result).is_err() {
            debug!(
                event = events::CONTROL_REPLY_DROPPED,
                component = COMPONENT,
                loop_id = %loop_id,
                route_id = %route_id,
                "caller went away before the reply"
            );
        }
    }

    info!(
        event = events::CONTROL_LOOP_STOPPED,
        component = COMPONENT,
        loop_id = %loop_id,
        router = %router_name,
        applied,
        "control loop stopped, all handles dropped"
    );
}

#[cfg(test)]
mod tests {
    use super::spawn_control_loop;
    use crate::control_plane::control_message::ControlMessage;
    use crate::control_plane::route_lifecycle::{ControlAck, ControlPlane};
    use crate::data_plane::blocking::BlockingCoordinator;
    use crate::data_plane::handler::handler_fn;
    use crate::error::ControlChannelError;
    use crate::message::Message;
    use crate::routing::channel_registry::ChannelRegistry;
    use crate::routing::predicate::predicate_fn;
    use serde_json::json;
    use std::sync::Arc;

    fn plane() -> (Arc<ChannelRegistry>, Arc<ControlPlane>) {
        let registry = Arc::new(ChannelRegistry::default());
        let plane = Arc::new(ControlPlane::new(
            registry.clone(),
            Arc::new(BlockingCoordinator::new()),
        ));
        (registry, plane)
    }

    fn subscribe(id: &str, priority: i32) -> ControlMessage {
        ControlMessage::subscribe(
            id,
            "orders",
            priority,
            predicate_fn(|_message: &Message| true),
            handler_fn(|_message: Arc<Message>| async { Ok(json!(null)) }),
        )
    }

    #[tokio::test]
    async fn messages_are_applied_in_arrival_order() {
        let (registry, plane) = plane();
        let channel = spawn_control_loop("loop-test", plane, 4).expect("loop spawned");

        assert_eq!(
            channel.send(subscribe("a", 1)).await,
            Ok(ControlAck::Subscribed { replaced: false })
        );
        assert_eq!(
            channel.send(subscribe("a", 7)).await,
            Ok(ControlAck::Subscribed { replaced: true })
        );
        assert_eq!(
            channel
                .send(ControlMessage::unsubscribe("missing", "orders"))
                .await,
            Ok(ControlAck::Unsubscribed { removed: false })
        );

        let infos = registry.channel("orders").table().snapshot().infos();
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].priority, 7);
    }

    #[tokio::test]
    async fn rejection_is_returned_to_the_sender() {
        let (_, plane) = plane();
        let channel = spawn_control_loop("loop-test", plane, 1).expect("loop spawned");

        let err = channel
            .send(subscribe(" ", 1))
            .await
            .expect_err("blank id rejected");

        match err {
            ControlChannelError::Rejected(err) => assert_eq!(err.field, "id"),
            other => panic!("unexpected error {other:?}"),
        }
        assert!(!channel.is_closed());
    }
}
