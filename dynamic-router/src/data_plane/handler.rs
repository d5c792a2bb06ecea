//! Route handlers and the handler-resolution boundary.

use crate::error::HandlerError;
use crate::message::Message;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// Consumer invoked with every message its route is selected for.
///
/// The engine never serializes invocations: one handler registered once may be
/// running for several messages at the same time.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, message: Arc<Message>) -> Result<Value, HandlerError>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(Arc<Message>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
{
    async fn handle(&self, message: Arc<Message>) -> Result<Value, HandlerError> {
        (self.0)(message).await
    }
}

/// Builds a handler from an async closure.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn Handler>
where
    F: Fn(Arc<Message>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, HandlerError>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// Supplies ready-to-invoke handlers by name.
///
/// Name lookup happens only where untyped control messages enter the system;
/// the routing core itself is handed resolved handlers.
pub trait HandlerResolver: Send + Sync {
    fn resolve(&self, name: &str) -> Option<Arc<dyn Handler>>;
}

/// In-memory handler directory.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` under `name`, returning any handler it displaced.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        handler: Arc<dyn Handler>,
    ) -> Option<Arc<dyn Handler>> {
        self.handlers.insert(name.into(), handler)
    }

    pub fn with(mut self, name: impl Into<String>, handler: Arc<dyn Handler>) -> Self {
        self.register(name, handler);
        self
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }
}

impl HandlerResolver for HandlerRegistry {
    fn resolve(&self, name: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::{handler_fn, Handler, HandlerRegistry, HandlerResolver};
    use crate::message::Message;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn handler_fn_invokes_closure() {
        let handler = handler_fn(|message: Arc<Message>| async move {
            Ok(json!({"echo": message.payload.clone()}))
        });

        let result = handler
            .handle(Arc::new(Message::new("orders", json!(7))))
            .await
            .expect("handler succeeds");

        assert_eq!(result, json!({"echo": 7}));
    }

    #[tokio::test]
    async fn registry_resolves_registered_names_only() {
        let registry = HandlerRegistry::new().with(
            "ok",
            handler_fn(|_message: Arc<Message>| async { Ok(json!("ok")) }),
        );

        assert!(registry.resolve("ok").is_some());
        assert!(registry.resolve("missing").is_none());
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["ok"]);
    }

    #[test]
    fn register_returns_displaced_handler() {
        let mut registry = HandlerRegistry::new();
        let first = handler_fn(|_message: Arc<Message>| async { Ok(json!(1)) });
        let second = handler_fn(|_message: Arc<Message>| async { Ok(json!(2)) });

        assert!(registry.register("h", first).is_none());
        assert!(registry.register("h", second).is_some());
    }
}
