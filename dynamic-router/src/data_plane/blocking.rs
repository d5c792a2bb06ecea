//! Wait registry for blocking dispatches.
//!
//! Each blocked dispatch parks on its own [`Notify`], keyed by channel. A
//! successful subscribe wakes every waiter of that channel individually; each
//! waiter then re-scans a fresh snapshot on its own task, so there is no shared
//! decision point between them. Nothing here touches a routing table lock.

use crate::observability::events;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::futures::Notified;
use tokio::sync::Notify;
use tracing::debug;

const COMPONENT: &str = "blocking_coordinator";

type WaiterMap = HashMap<String, HashMap<u64, Arc<Notify>>>;

#[derive(Default)]
pub struct BlockingCoordinator {
    waiters: Mutex<WaiterMap>,
    next_waiter_id: AtomicU64,
}

impl BlockingCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parks a new waiter on `channel`. The waiter stays registered until the
    /// returned guard is dropped.
    pub fn register(&self, channel: &str) -> WaiterRegistration<'_> {
        let id = self.next_waiter_id.fetch_add(1, Ordering::Relaxed);
        let notify = Arc::new(Notify::new());

        self.waiters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(channel.to_string())
            .or_default()
            .insert(id, notify.clone());

        debug!(
            event = events::WAITER_REGISTERED,
            component = COMPONENT,
            channel,
            waiter_id = id,
            "waiter registered"
        );

        WaiterRegistration {
            coordinator: self,
            channel: channel.to_string(),
            id,
            notify,
        }
    }

    /// Wakes every waiter currently parked on `channel`. Returns how many were
    /// woken.
    pub fn notify_subscribed(&self, channel: &str) -> usize {
        let notifies: Vec<Arc<Notify>> = {
            let waiters = self.waiters.lock().unwrap_or_else(PoisonError::into_inner);
            match waiters.get(channel) {
                Some(channel_waiters) => channel_waiters.values().cloned().collect(),
                None => return 0,
            }
        };

        for notify in &notifies {
            notify.notify_one();
        }

        debug!(
            event = events::WAITERS_NOTIFIED,
            component = COMPONENT,
            channel,
            waiters = notifies.len(),
            "woke waiters after subscribe"
        );
        notifies.len()
    }

    /// Removes a waiter. Returns `false` when it was already gone.
    pub fn deregister(&self, channel: &str, waiter_id: u64) -> bool {
        let mut waiters = self.waiters.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(channel_waiters) = waiters.get_mut(channel) else {
            return false;
        };
        let removed = channel_waiters.remove(&waiter_id).is_some();
        if channel_waiters.is_empty() {
            waiters.remove(channel);
        }
        removed
    }

    pub fn pending(&self, channel: &str) -> usize {
        self.waiters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(channel)
            .map(HashMap::len)
            .unwrap_or(0)
    }

    pub fn total_pending(&self) -> usize {
        self.waiters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(HashMap::len)
            .sum()
    }
}

/// RAII handle for one parked waiter.
pub struct WaiterRegistration<'a> {
    coordinator: &'a BlockingCoordinator,
    channel: String,
    id: u64,
    notify: Arc<Notify>,
}

impl WaiterRegistration<'_> {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Resolves after the next subscribe on this channel. A subscribe that lands
    /// between registration and this call is not lost.
    pub fn notified(&self) -> Notified<'_> {
        self.notify.notified()
    }
}

impl Drop for WaiterRegistration<'_> {
    fn drop(&mut self) {
        if self.coordinator.deregister(&self.channel, self.id) {
            debug!(
                event = events::WAITER_RELEASED,
                component = COMPONENT,
                channel = %self.channel,
                waiter_id = self.id,
                "waiter released"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::BlockingCoordinator;
    use std::time::Duration;

    #[test]
    fn drop_deregisters_exactly_once() {
        let coordinator = BlockingCoordinator::new();
        let registration = coordinator.register("orders");
        let id = registration.id();
        assert_eq!(coordinator.pending("orders"), 1);

        drop(registration);

        assert_eq!(coordinator.pending("orders"), 0);
        assert!(!coordinator.deregister("orders", id));
        assert_eq!(coordinator.total_pending(), 0);
    }

    #[test]
    fn notify_only_reaches_the_subscribed_channel() {
        let coordinator = BlockingCoordinator::new();
        let _orders = coordinator.register("orders");
        let _orders_again = coordinator.register("orders");
        let _audit = coordinator.register("audit");

        assert_eq!(coordinator.notify_subscribed("orders"), 2);
        assert_eq!(coordinator.notify_subscribed("unknown"), 0);
        assert_eq!(coordinator.total_pending(), 3);
    }

    #[tokio::test]
    async fn notification_before_wait_is_not_lost() {
        let coordinator = BlockingCoordinator::new();
        let registration = coordinator.register("orders");

        coordinator.notify_subscribed("orders");

        tokio::time::timeout(Duration::from_secs(1), registration.notified())
            .await
            .expect("stored permit resolves immediately");
    }
}
