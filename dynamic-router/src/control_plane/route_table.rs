//! Per-channel routing table with copy-on-write snapshots.
//!
//! Readers load the current route list through an [`ArcSwap`] and never take a
//! lock. Writers serialize on a short mutex, build the next list from the
//! current one and publish it atomically, so a snapshot observed by a dispatch
//! is always one complete table state.

use crate::data_plane::handler::Handler;
use crate::message::Message;
use crate::routing::predicate::Predicate;
use arc_swap::ArcSwap;
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt::{self, Debug, Formatter};
use std::sync::{Arc, Mutex, PoisonError};

/// Priority + predicate + handler triple scoped to one channel.
///
/// Lower priority values are evaluated first; ties break on ascending id.
pub struct Route {
    id: String,
    priority: i32,
    predicate: Arc<dyn Predicate>,
    handler: Arc<dyn Handler>,
    description: String,
}

impl Route {
    pub fn new(
        id: impl Into<String>,
        priority: i32,
        predicate: Arc<dyn Predicate>,
        handler: Arc<dyn Handler>,
    ) -> Self {
        Self {
            id: id.into(),
            priority,
            predicate,
            handler,
            description: "custom".to_string(),
        }
    }

    /// Human-readable predicate description shown in route listings.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn handler(&self) -> &Arc<dyn Handler> {
        &self.handler
    }

    pub fn matches(&self, message: &Message) -> bool {
        self.predicate.matches(message)
    }

    pub fn info(&self) -> RouteInfo {
        RouteInfo {
            id: self.id.clone(),
            priority: self.priority,
            predicate: self.description.clone(),
        }
    }

    #[inline(always)]
    fn order_key(&self) -> (i32, &str) {
        (self.priority, self.id.as_str())
    }
}

impl Debug for Route {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("predicate", &self.description)
            .finish_non_exhaustive()
    }
}

/// Plain-data view of a route, used for listings and equality checks.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct RouteInfo {
    pub id: String,
    pub priority: i32,
    pub predicate: String,
}

/// An immutable, ordered view of one table state.
#[derive(Clone, Debug)]
pub struct RouteSnapshot {
    routes: Arc<Vec<Arc<Route>>>,
}

impl RouteSnapshot {
    /// First route in `(priority, id)` order whose predicate accepts `message`.
    pub fn first_match(&self, message: &Message) -> Option<&Arc<Route>> {
        self.routes.iter().find(|route| route.matches(message))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Route>> {
        self.routes.iter()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn infos(&self) -> Vec<RouteInfo> {
        self.routes.iter().map(|route| route.info()).collect()
    }
}

pub struct RoutingTable {
    routes: ArcSwap<Vec<Arc<Route>>>,
    writer: Mutex<()>,
}

impl Default for RoutingTable {
    fn default() -> Self {
        Self::new()
    }
}

impl RoutingTable {
    pub fn new() -> Self {
        Self {
            routes: ArcSwap::from_pointee(Vec::new()),
            writer: Mutex::new(()),
        }
    }

    /// Adds `route`, replacing any route with the same id. Returns the replaced
    /// route, if there was one.
    pub fn insert(&self, route: Route) -> Option<Arc<Route>> {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.routes.load_full();

        let mut next: Vec<Arc<Route>> = Vec::with_capacity(current.len() + 1);
        let mut replaced = None;
        for existing in current.iter() {
            if existing.id == route.id {
                replaced = Some(existing.clone());
            } else {
                next.push(existing.clone());
            }
        }

        let route = Arc::new(route);
        let position = next
            .binary_search_by(|probe| compare(probe, &route))
            .unwrap_or_else(|position| position);
        next.insert(position, route);

        self.routes.store(Arc::new(next));
        replaced
    }

    /// Removes the route with `id`. Absent ids are a no-op and return `None`.
    pub fn remove(&self, id: &str) -> Option<Arc<Route>> {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.routes.load_full();

        let position = current.iter().position(|route| route.id == id)?;
        let mut next = current.as_ref().clone();
        let removed = next.remove(position);

        self.routes.store(Arc::new(next));
        Some(removed)
    }

    pub fn snapshot(&self) -> RouteSnapshot {
        RouteSnapshot {
            routes: self.routes.load_full(),
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.routes.load().iter().any(|route| route.id == id)
    }

    pub fn len(&self) -> usize {
        self.routes.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[inline(always)]
fn compare(a: &Route, b: &Route) -> Ordering {
    a.order_key().cmp(&b.order_key())
}
