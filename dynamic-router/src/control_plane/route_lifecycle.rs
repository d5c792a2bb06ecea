//! Subscribe/unsubscribe lifecycle applied against channel routing tables.

use crate::control_plane::control_message::{ControlMessage, Operation};
use crate::control_plane::route_table::Route;
use crate::data_plane::blocking::BlockingCoordinator;
use crate::error::ConfigurationError;
use crate::observability::events;
use crate::routing::channel_registry::ChannelRegistry;
use crate::routing::predicate::PredicateSpec;
use std::sync::Arc;
use tracing::{debug, info, warn};

const COMPONENT: &str = "control_plane";

/// Result of an applied control message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlAck {
    /// `replaced` is true when a route with the same id was overwritten.
    Subscribed { replaced: bool },
    /// `removed` is false when no route had that id.
    Unsubscribed { removed: bool },
}

pub struct ControlPlane {
    registry: Arc<ChannelRegistry>,
    coordinator: Arc<BlockingCoordinator>,
}

impl ControlPlane {
    pub fn new(registry: Arc<ChannelRegistry>, coordinator: Arc<BlockingCoordinator>) -> Self {
        Self {
            registry,
            coordinator,
        }
    }

    /// Validates and applies one control message.
    ///
    /// Writes to a table are serialized, so concurrent messages for the same id
    /// land in the order they acquire the table's writer.
    pub fn handle(&self, message: ControlMessage) -> Result<ControlAck, ConfigurationError> {
        if let Err(err) = message.validate() {
            warn!(
                event = events::CONTROL_REJECTED,
                component = COMPONENT,
                route_id = %message.id,
                channel = %message.channel,
                operation = %message.operation,
                field = %err.field,
                reason = %err.reason,
                "rejecting control message"
            );
            return Err(err);
        }

        match message.operation {
            Operation::Subscribe => self.subscribe(message),
            Operation::Unsubscribe => Ok(self.unsubscribe(&message.id, &message.channel)),
        }
    }

    fn subscribe(&self, message: ControlMessage) -> Result<ControlAck, ConfigurationError> {
        let ControlMessage {
            id,
            channel: channel_name,
            priority,
            predicate,
            predicate_description,
            handler,
            ..
        } = message;
        let handler = handler.ok_or_else(|| {
            ConfigurationError::new("handler", "subscribe requires a target handler")
        })?;
        let predicate = match predicate {
            Some(predicate) => predicate,
            None => PredicateSpec::Always.compile(&Default::default())?,
        };

        let channel = self.registry.channel(&channel_name);
        let route = Route::new(id.clone(), priority, predicate, handler)
            .with_description(predicate_description);
        let replaced = channel.table().insert(route);

        match &replaced {
            Some(previous) => info!(
                event = events::ROUTE_REPLACED,
                component = COMPONENT,
                channel = %channel_name,
                route_id = %id,
                previous_priority = previous.priority(),
                priority,
                "duplicate route id, overwriting previous route"
            ),
            None => debug!(
                event = events::ROUTE_INSERTED,
                component = COMPONENT,
                channel = %channel_name,
                route_id = %id,
                priority,
                "route inserted"
            ),
        }

        self.coordinator.notify_subscribed(&channel_name);
        Ok(ControlAck::Subscribed {
            replaced: replaced.is_some(),
        })
    }

    fn unsubscribe(&self, id: &str, channel_name: &str) -> ControlAck {
        let removed = self.registry.channel(channel_name).table().remove(id);
        if removed.is_some() {
            debug!(
                event = events::ROUTE_REMOVED,
                component = COMPONENT,
                channel = channel_name,
                route_id = id,
                "route removed"
            );
        } else {
            debug!(
                event = events::ROUTE_REMOVE_MISSING,
                component = COMPONENT,
                channel = channel_name,
                route_id = id,
                "no route to remove"
            );
        }
        ControlAck::Unsubscribed {
            removed: removed.is_some(),
        }
    }
}
