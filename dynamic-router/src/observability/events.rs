//! Stable event names.

pub const ROUTE_INSERTED: &str = "route_inserted";
pub const ROUTE_REPLACED: &str = "route_replaced";
pub const ROUTE_REMOVED: &str = "route_removed";
pub const ROUTE_REMOVE_MISSING: &str = "route_remove_missing";

pub const CHANNEL_CREATED: &str = "channel_created";
pub const CHANNEL_POLICY_UPDATED: &str = "channel_policy_updated";

pub const CONTROL_REJECTED: &str = "control_rejected";
pub const CONTROL_APPLIED: &str = "control_applied";
pub const CONTROL_LOOP_STARTED: &str = "control_loop_started";
pub const CONTROL_LOOP_STOPPED: &str = "control_loop_stopped";
pub const CONTROL_REPLY_DROPPED: &str = "control_reply_dropped";

pub const DISPATCH_STATE: &str = "dispatch_state";
pub const DISPATCH_DELIVERED: &str = "dispatch_delivered";
pub const DISPATCH_DROPPED: &str = "dispatch_dropped";
pub const DISPATCH_NO_MATCH: &str = "dispatch_no_match";
pub const DISPATCH_TIMED_OUT: &str = "dispatch_timed_out";
pub const DISPATCH_CANCELLED: &str = "dispatch_cancelled";
pub const DISPATCH_HANDLER_FAILED: &str = "dispatch_handler_failed";

pub const WAITER_REGISTERED: &str = "waiter_registered";
pub const WAITER_RELEASED: &str = "waiter_released";
pub const WAITERS_NOTIFIED: &str = "waiters_notified";

pub const CACHE_CREATED: &str = "cache_created";
