//! Error taxonomy shared by the control and data planes.

use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::time::Duration;

/// Error type returned by route handlers.
pub type HandlerError = Box<dyn Error + Send + Sync + 'static>;

/// A malformed control message or configuration entry.
///
/// Always rejected as a whole: nothing from the offending input is applied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfigurationError {
    pub field: String,
    pub reason: String,
}

impl ConfigurationError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl Display for ConfigurationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "invalid `{}`: {}", self.field, self.reason)
    }
}

impl Error for ConfigurationError {}

/// Failures of a control message sent through a [`crate::ControlChannel`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ControlChannelError {
    /// The control loop rejected the message.
    Rejected(ConfigurationError),
    /// The control loop is no longer running.
    Closed,
}

impl Display for ControlChannelError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ControlChannelError::Rejected(err) => write!(f, "control message rejected: {err}"),
            ControlChannelError::Closed => write!(f, "control channel closed"),
        }
    }
}

impl Error for ControlChannelError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            ControlChannelError::Rejected(err) => Some(err),
            ControlChannelError::Closed => None,
        }
    }
}

impl From<ConfigurationError> for ControlChannelError {
    fn from(err: ConfigurationError) -> Self {
        ControlChannelError::Rejected(err)
    }
}

/// Failures surfaced to the caller of a dispatch.
#[derive(Debug)]
pub enum DispatchError {
    /// Fail-fast dispatch found no matching route.
    NoMatchingRoute { channel: String },
    /// Blocking dispatch reached its deadline without a matching route.
    RouteTimeout { channel: String, timeout: Duration },
    /// Blocking dispatch was cancelled before any route matched.
    Cancelled { channel: String },
    /// The selected handler failed.
    Handler {
        channel: String,
        route_id: String,
        source: HandlerError,
    },
}

impl DispatchError {
    pub fn channel(&self) -> &str {
        match self {
            DispatchError::NoMatchingRoute { channel }
            | DispatchError::RouteTimeout { channel, .. }
            | DispatchError::Cancelled { channel }
            | DispatchError::Handler { channel, .. } => channel,
        }
    }
}

impl Display for DispatchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::NoMatchingRoute { channel } => {
                write!(f, "no matching route on channel {channel:?}")
            }
            DispatchError::RouteTimeout { channel, timeout } => write!(
                f,
                "no route matched on channel {channel:?} within {}ms",
                timeout.as_millis()
            ),
            DispatchError::Cancelled { channel } => {
                write!(f, "dispatch on channel {channel:?} was cancelled")
            }
            DispatchError::Handler {
                channel,
                route_id,
                source,
            } => write!(
                f,
                "handler for route {route_id:?} on channel {channel:?} failed: {source}"
            ),
        }
    }
}

impl Error for DispatchError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            DispatchError::Handler { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigurationError, DispatchError, HandlerError};
    use std::error::Error;
    use std::time::Duration;

    #[test]
    fn configuration_error_names_the_field() {
        let err = ConfigurationError::new("channel", "must not be empty");
        assert_eq!(err.to_string(), "invalid `channel`: must not be empty");
    }

    #[test]
    fn handler_error_keeps_source_and_route_context() {
        let source: HandlerError = "downstream unavailable".into();
        let err = DispatchError::Handler {
            channel: "orders".to_string(),
            route_id: "billing".to_string(),
            source,
        };

        assert_eq!(err.channel(), "orders");
        assert!(err.to_string().contains("\"billing\""));
        assert_eq!(
            err.source().map(|source| source.to_string()),
            Some("downstream unavailable".to_string())
        );
    }

    #[test]
    fn timeout_reports_milliseconds() {
        let err = DispatchError::RouteTimeout {
            channel: "orders".to_string(),
            timeout: Duration::from_millis(250),
        };
        assert!(err.to_string().ends_with("within 250ms"));
        assert!(err.source().is_none());
    }
}
