//! Control messages: typed form plus the untyped boundary descriptor.

use crate::cache::CacheRegistry;
use crate::data_plane::handler::{Handler, HandlerResolver};
use crate::error::ConfigurationError;
use crate::routing::predicate::{Predicate, PredicateSpec};
use serde::Deserialize;
use serde_json::Value;
use std::fmt::{self, Debug, Formatter};
use std::str::FromStr;
use std::sync::Arc;
use strum::{AsRefStr, Display, EnumString};

/// Priority assumed when a subscribe descriptor omits one: evaluated last.
pub const DEFAULT_PRIORITY: i32 = i32::MAX;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumString, Display, AsRefStr)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Operation {
    Subscribe,
    Unsubscribe,
}

/// A validated-on-apply request to add, replace or remove one route.
#[derive(Clone)]
pub struct ControlMessage {
    pub id: String,
    pub channel: String,
    pub priority: i32,
    pub operation: Operation,
    pub predicate: Option<Arc<dyn Predicate>>,
    pub predicate_description: String,
    pub handler: Option<Arc<dyn Handler>>,
}

impl ControlMessage {
    pub fn subscribe(
        id: impl Into<String>,
        channel: impl Into<String>,
        priority: i32,
        predicate: Arc<dyn Predicate>,
        handler: Arc<dyn Handler>,
    ) -> Self {
        Self {
            id: id.into(),
            channel: channel.into(),
            priority,
            operation: Operation::Subscribe,
            predicate: Some(predicate),
            predicate_description: "custom".to_string(),
            handler: Some(handler),
        }
    }

    pub fn unsubscribe(id: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            channel: channel.into(),
            priority: DEFAULT_PRIORITY,
            operation: Operation::Unsubscribe,
            predicate: None,
            predicate_description: String::new(),
            handler: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.predicate_description = description.into();
        self
    }

    /// Checks every field the operation depends on.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.id.trim().is_empty() {
            return Err(ConfigurationError::new("id", "must not be empty"));
        }
        if self.channel.trim().is_empty() {
            return Err(ConfigurationError::new("channel", "must not be empty"));
        }
        if self.operation == Operation::Subscribe && self.handler.is_none() {
            return Err(ConfigurationError::new(
                "handler",
                "subscribe requires a target handler",
            ));
        }
        Ok(())
    }
}

impl Debug for ControlMessage {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlMessage")
            .field("id", &self.id)
            .field("channel", &self.channel)
            .field("priority", &self.priority)
            .field("operation", &self.operation)
            .field("predicate", &self.predicate_description)
            .field("has_handler", &self.handler.is_some())
            .finish()
    }
}

/// Untyped control message as received from configuration or an admin client.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ControlMessageDescriptor {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub priority: Value,
    #[serde(default)]
    pub predicate: PredicateSpec,
    #[serde(default)]
    pub handler: Option<String>,
    #[serde(default = "default_operation")]
    pub operation: String,
}

fn default_operation() -> String {
    Operation::Subscribe.to_string()
}

impl ControlMessageDescriptor {
    /// Validates every field and resolves the handler name.
    ///
    /// Fails on the first violated field; nothing is applied anywhere.
    pub fn into_control_message(
        self,
        resolver: &dyn HandlerResolver,
        caches: &CacheRegistry,
    ) -> Result<ControlMessage, ConfigurationError> {
        if self.id.trim().is_empty() {
            return Err(ConfigurationError::new("id", "must not be empty"));
        }
        if self.channel.trim().is_empty() {
            return Err(ConfigurationError::new("channel", "must not be empty"));
        }
        let operation = Operation::from_str(&self.operation).map_err(|_| {
            ConfigurationError::new(
                "operation",
                format!(
                    "{:?} is not one of {:?}/{:?}",
                    self.operation,
                    Operation::Subscribe.as_ref(),
                    Operation::Unsubscribe.as_ref()
                ),
            )
        })?;
        let priority = parse_priority(&self.priority)?;

        match operation {
            Operation::Unsubscribe => Ok(ControlMessage {
                priority,
                ..ControlMessage::unsubscribe(self.id, self.channel)
            }),
            Operation::Subscribe => {
                let name = self
                    .handler
                    .filter(|name| !name.is_empty())
                    .ok_or_else(|| {
                        ConfigurationError::new("handler", "subscribe requires a handler name")
                    })?;
                let handler = resolver.resolve(&name).ok_or_else(|| {
                    ConfigurationError::new("handler", format!("no handler named {name:?}"))
                })?;
                let predicate = self.predicate.compile(caches)?;
                Ok(
                    ControlMessage::subscribe(self.id, self.channel, priority, predicate, handler)
                        .with_description(self.predicate.to_string()),
                )
            }
        }
    }
}

fn parse_priority(value: &Value) -> Result<i32, ConfigurationError> {
    let invalid = || {
        ConfigurationError::new(
            "priority",
            format!("{value} is not an integer in the 32-bit signed range"),
        )
    };
    match value {
        Value::Null => Ok(DEFAULT_PRIORITY),
        Value::Number(number) => number
            .as_i64()
            .and_then(|priority| i32::try_from(priority).ok())
            .ok_or_else(invalid),
        Value::String(text) => text.trim().parse::<i32>().map_err(|_| invalid()),
        _ => Err(invalid()),
    }
}
