//! Field formatting helpers for structured events.

use crate::message::Headers;
use std::time::Duration;

/// Renders headers as a compact `k=v,k=v` list.
pub fn format_headers(headers: &Headers) -> String {
    headers
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join(",")
}

pub fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
