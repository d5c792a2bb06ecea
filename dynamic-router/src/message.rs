//! Messages flowing through the data plane.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Header mapping carried alongside a message payload.
pub type Headers = BTreeMap<String, String>;

/// A message addressed to a named channel.
///
/// Messages are shared as `Arc<Message>` for the whole dispatch, so handlers and
/// predicates only ever observe them immutably.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub channel: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub headers: Headers,
}

impl Message {
    pub fn new(channel: impl Into<String>, payload: Value) -> Self {
        Self {
            channel: channel.into(),
            payload,
            headers: Headers::new(),
        }
    }

    /// Adds a header, replacing any previous value under the same name.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::Message;
    use serde_json::json;

    #[test]
    fn with_header_overwrites_previous_value() {
        let message = Message::new("orders", json!({"id": 1}))
            .with_header("region", "eu")
            .with_header("region", "us");

        assert_eq!(message.header("region"), Some("us"));
        assert_eq!(message.header("missing"), None);
    }

    #[test]
    fn deserializes_with_missing_payload_and_headers() {
        let message: Message =
            serde_json::from_str(r#"{"channel": "orders"}"#).expect("valid message json");

        assert_eq!(message.channel, "orders");
        assert!(message.payload.is_null());
        assert!(message.headers.is_empty());
    }
}
