//! Method registry for inbound calls.
//!
//! Maps method names to request handlers (at most one per method) and
//! notification listeners (any number per method, kept in registration
//! order). Params are deserialized here so a malformed payload is reported
//! as this handler's input error, not as a protocol failure.

// ============================================================================
// Imports
// ============================================================================

use std::future::Future;
use std::sync::Arc;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use rustc_hash::FxHashMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{Error, Result};
use crate::protocol::RpcError;

// ============================================================================
// Types
// ============================================================================

/// Future returned by a type-erased request handler.
pub type HandlerFuture = BoxFuture<'static, std::result::Result<Value, RpcError>>;

/// Type-erased request handler.
pub(crate) type RequestHandler = Arc<dyn Fn(Option<Value>) -> HandlerFuture + Send + Sync>;

/// Type-erased notification listener.
pub(crate) type NotificationListener = Arc<dyn Fn(Option<Value>) + Send + Sync>;

// ============================================================================
// MethodRegistry
// ============================================================================

/// Handlers and listeners for the methods this side answers.
#[derive(Default)]
pub struct MethodRegistry {
    handlers: FxHashMap<String, RequestHandler>,
    listeners: FxHashMap<String, Vec<NotificationListener>>,
}

impl MethodRegistry {
    /// Creates an empty registry.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the request handler for `method`.
    ///
    /// The handler receives the deserialized params and returns a result or
    /// a structured error. Params that fail to deserialize are answered with
    /// `InvalidParams` without calling the handler.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateHandler`] if `method` already has a handler.
    pub fn register_handler<P, R, F, Fut>(&mut self, method: impl Into<String>, handler: F) -> Result<()>
    where
        P: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<R, RpcError>> + Send + 'static,
    {
        let method = method.into();
        if self.handlers.contains_key(&method) {
            return Err(Error::duplicate_handler(method));
        }

        let erased: RequestHandler = Arc::new(move |params| match decode_params::<P>(params) {
            Ok(params) => {
                let fut = handler(params);
                async move {
                    let result = fut.await?;
                    serde_json::to_value(result)
                        .map_err(|e| RpcError::internal(format!("Failed to serialize result: {e}")))
                }
                .boxed()
            }
            Err(error) => async move { Err(error) }.boxed(),
        });

        self.handlers.insert(method, erased);
        Ok(())
    }

    /// Adds a notification listener for `method`.
    ///
    /// Listeners run in registration order. Params that fail to deserialize
    /// are logged and the listener is skipped.
    pub fn register_listener<P, F>(&mut self, method: impl Into<String>, listener: F)
    where
        P: DeserializeOwned + 'static,
        F: Fn(P) + Send + Sync + 'static,
    {
        let method = method.into();
        let name = method.clone();

        let erased: NotificationListener = Arc::new(move |params| match decode_params::<P>(params) {
            Ok(params) => listener(params),
            Err(error) => {
                warn!(method = %name, error = %error.message, "Ignoring notification with invalid params");
            }
        });

        self.listeners.entry(method).or_default().push(erased);
    }

    /// Returns `true` if `method` has a request handler.
    #[inline]
    #[must_use]
    pub fn has_handler(&self, method: &str) -> bool {
        self.handlers.contains_key(method)
    }

    /// Returns the number of listeners for `method`.
    #[inline]
    #[must_use]
    pub fn listener_count(&self, method: &str) -> usize {
        self.listeners.get(method).map_or(0, Vec::len)
    }

    pub(crate) fn handler(&self, method: &str) -> Option<RequestHandler> {
        self.handlers.get(method).cloned()
    }

    pub(crate) fn listeners(&self, method: &str) -> &[NotificationListener] {
        self.listeners.get(method).map_or(&[], Vec::as_slice)
    }
}

// ============================================================================
// Params
// ============================================================================

/// Deserializes params, treating absent, `null`, `{}` and `[]` as
/// interchangeable "no params" forms.
fn decode_params<P: DeserializeOwned>(params: Option<Value>) -> std::result::Result<P, RpcError> {
    let value = params.unwrap_or(Value::Null);

    match serde_json::from_value::<P>(value.clone()) {
        Ok(params) => Ok(params),
        Err(first) => {
            let fallback = match &value {
                Value::Null => Some(Value::Object(Map::new())),
                Value::Object(map) if map.is_empty() => Some(Value::Null),
                Value::Array(items) if items.is_empty() => Some(Value::Null),
                _ => None,
            };

            fallback
                .and_then(|v| serde_json::from_value(v).ok())
                .ok_or_else(|| RpcError::invalid_params(first.to_string()))
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde::Deserialize;
    use serde_json::json;

    use crate::protocol::ErrorCode;

    #[derive(Debug, Deserialize, Serialize)]
    struct Echo {
        v: i64,
    }

    #[derive(Debug, Default, Deserialize)]
    struct Options {
        #[serde(default)]
        verbose: bool,
    }

    #[test]
    fn test_duplicate_handler_is_rejected() {
        let mut registry = MethodRegistry::new();
        registry
            .register_handler("echo", |p: Echo| async move { Ok(p) })
            .expect("first registration");

        let err = registry
            .register_handler("echo", |p: Echo| async move { Ok(p) })
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateHandler { ref method } if method == "echo"));
    }

    #[tokio::test]
    async fn test_handler_receives_typed_params() {
        let mut registry = MethodRegistry::new();
        registry
            .register_handler("echo", |p: Echo| async move { Ok(Echo { v: p.v * 2 }) })
            .expect("register");

        let handler = registry.handler("echo").expect("registered");
        let result = handler(Some(json!({"v": 21}))).await.expect("ok");
        assert_eq!(result, json!({"v": 42}));
    }

    #[tokio::test]
    async fn test_malformed_params_yield_invalid_params() {
        let mut registry = MethodRegistry::new();
        registry
            .register_handler("echo", |p: Echo| async move { Ok(p) })
            .expect("register");

        let handler = registry.handler("echo").expect("registered");
        let err = handler(Some(json!({"v": "not a number"}))).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn test_no_params_forms_are_interchangeable() {
        let mut registry = MethodRegistry::new();
        registry
            .register_handler("unit", |(): ()| async move { Ok("unit") })
            .expect("register");
        registry
            .register_handler("opts", |o: Options| async move { Ok(o.verbose) })
            .expect("register");

        let unit = registry.handler("unit").expect("registered");
        assert_eq!(unit(None).await.expect("ok"), json!("unit"));
        assert_eq!(unit(Some(json!({}))).await.expect("ok"), json!("unit"));
        assert_eq!(unit(Some(json!([]))).await.expect("ok"), json!("unit"));

        let opts = registry.handler("opts").expect("registered");
        assert_eq!(opts(None).await.expect("ok"), json!(false));
    }

    #[test]
    fn test_listeners_accumulate_in_order() {
        let mut registry = MethodRegistry::new();
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            registry.register_listener("changed", move |(): ()| order.lock().push(tag));
        }

        assert_eq!(registry.listener_count("changed"), 3);
        for listener in registry.listeners("changed") {
            listener(None);
        }
        assert_eq!(*order.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_listener_skipped_on_invalid_params() {
        let mut registry = MethodRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        registry.register_listener("tick", move |_: Echo| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let listener = &registry.listeners("tick")[0];
        listener(Some(json!({"v": "bad"})));
        listener(Some(json!({"v": 1})));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_lookup_of_unknown_method() {
        let registry = MethodRegistry::new();
        assert!(!registry.has_handler("missing"));
        assert!(registry.handler("missing").is_none());
        assert!(registry.listeners("missing").is_empty());
    }
}
