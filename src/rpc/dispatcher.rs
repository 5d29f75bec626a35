//! Inbound message dispatch.
//!
//! Each inbound text is decoded and routed in a single synchronous step:
//!
//! | Shape | Route |
//! |-------|-------|
//! | Response | [`PendingCalls`] by id |
//! | Notification | every listener, in registration order |
//! | Request | the method's handler; always answered |
//!
//! A request carrying an id is always answered, whether the handler
//! succeeds, returns an error, panics, or does not exist.

// ============================================================================
// Imports
// ============================================================================

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tracing::{debug, error, warn};

use crate::protocol::{
    DecodeError, Envelope, Notification, Outcome, Request, Response, RpcError, decode,
};

use super::pending::PendingCalls;
use super::registry::MethodRegistry;

// ============================================================================
// Dispatch
// ============================================================================

/// What the caller must do after dispatching one message.
pub enum Dispatch {
    /// Nothing to send.
    Done,
    /// Send this envelope now.
    Reply(Envelope),
    /// Drive this future; it yields the response to send.
    Handle(BoxFuture<'static, Envelope>),
}

impl std::fmt::Debug for Dispatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Done => f.write_str("Done"),
            Self::Reply(envelope) => f.debug_tuple("Reply").field(envelope).finish(),
            Self::Handle(_) => f.write_str("Handle(..)"),
        }
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Routes decoded envelopes to the pending table or the registry.
pub struct Dispatcher {
    registry: Arc<MethodRegistry>,
    pending: Arc<PendingCalls>,
    stopped: AtomicBool,
}

impl Dispatcher {
    /// Creates a dispatcher over a sealed registry and the pending table.
    #[must_use]
    pub fn new(registry: Arc<MethodRegistry>, pending: Arc<PendingCalls>) -> Self {
        Self {
            registry,
            pending,
            stopped: AtomicBool::new(false),
        }
    }

    /// Stops invoking handlers and listeners.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    /// Returns `true` once [`stop`](Self::stop) was called.
    #[inline]
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Classifies and routes one inbound message.
    pub fn dispatch(&self, text: &str) -> Dispatch {
        match decode(text) {
            Err(err) => self.on_decode_error(err),
            Ok(Envelope::Response(response)) => {
                self.route_response(response);
                Dispatch::Done
            }
            Ok(Envelope::Notification(notification)) => {
                self.notify_listeners(notification);
                Dispatch::Done
            }
            Ok(Envelope::Request(request)) => self.handle_request(request),
        }
    }

    fn on_decode_error(&self, err: DecodeError) -> Dispatch {
        match err.id.clone() {
            Some(id) => {
                warn!(%id, error = %err, "Rejecting malformed message");
                Dispatch::Reply(Response::error(Some(id), err.to_rpc_error()).into())
            }
            None => {
                warn!(error = %err, "Dropping undecodable message without id");
                Dispatch::Done
            }
        }
    }

    fn route_response(&self, response: Response) {
        match (response.id, response.outcome) {
            (Some(id), Outcome::Result(result)) => {
                self.pending.complete(&id, result);
            }
            (Some(id), Outcome::Error(error)) => {
                self.pending.fail(&id, error);
            }
            (None, Outcome::Error(error)) => {
                warn!(
                    code = error.code.as_i32(),
                    message = %error.message,
                    "Remote reported an error without a request id"
                );
            }
            (None, Outcome::Result(_)) => {
                warn!("Dropping success response without id");
            }
        }
    }

    fn notify_listeners(&self, notification: Notification) {
        if self.is_stopped() {
            debug!(method = %notification.method, "Dispatcher stopped, dropping notification");
            return;
        }

        let listeners = self.registry.listeners(&notification.method);
        if listeners.is_empty() {
            debug!(method = %notification.method, "No listener for notification");
            return;
        }

        for (index, listener) in listeners.iter().enumerate() {
            let params = notification.params.clone();
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| listener(params))) {
                warn!(
                    method = %notification.method,
                    index,
                    panic = %panic_message(panic.as_ref()),
                    "Notification listener panicked"
                );
            }
        }
    }

    fn handle_request(&self, request: Request) -> Dispatch {
        let Request { id, method, params } = request;

        if self.is_stopped() {
            debug!(%id, %method, "Dispatcher stopped, dropping request");
            return Dispatch::Done;
        }

        let Some(handler) = self.registry.handler(&method) else {
            debug!(%id, %method, "Method not found");
            return Dispatch::Reply(
                Response::error(Some(id), RpcError::method_not_found(&method)).into(),
            );
        };

        let fut = async move {
            let started = Instant::now();
            let outcome = AssertUnwindSafe(async move { handler(params).await })
                .catch_unwind()
                .await;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            let response = match outcome {
                Ok(Ok(result)) => {
                    debug!(%id, %method, elapsed_ms, "Request handled");
                    Response::success(id, result)
                }
                Ok(Err(error)) => {
                    debug!(
                        %id,
                        %method,
                        elapsed_ms,
                        code = error.code.as_i32(),
                        message = %error.message,
                        "Request failed"
                    );
                    Response::error(Some(id), error)
                }
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    error!(%id, %method, elapsed_ms, panic = %message, "Request handler panicked");
                    Response::error(Some(id), RpcError::internal(message))
                }
            };

            Envelope::Response(response)
        };

        Dispatch::Handle(fut.boxed())
    }
}

/// Extracts a printable message from a panic payload.
fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use serde_json::{Value, json};

    use crate::protocol::{ErrorCode, encode};

    fn dispatcher_with(registry: MethodRegistry) -> (Dispatcher, Arc<PendingCalls>) {
        let pending = PendingCalls::new(16);
        let dispatcher = Dispatcher::new(Arc::new(registry), Arc::clone(&pending));
        (dispatcher, pending)
    }

    async fn reply_json(dispatch: Dispatch) -> Option<Value> {
        let envelope = match dispatch {
            Dispatch::Done => return None,
            Dispatch::Reply(envelope) => envelope,
            Dispatch::Handle(fut) => fut.await,
        };
        let text = encode(&envelope).expect("encode");
        Some(serde_json::from_str(&text).expect("json"))
    }

    #[tokio::test]
    async fn test_unknown_method_yields_method_not_found() {
        let (dispatcher, _) = dispatcher_with(MethodRegistry::new());

        let reply = reply_json(dispatcher.dispatch(r#"{"jsonrpc":"2.0","method":"nope","id":"q1"}"#))
            .await
            .expect("reply");

        assert_eq!(reply["id"], json!("q1"));
        assert_eq!(reply["error"]["code"], json!(ErrorCode::METHOD_NOT_FOUND.as_i32()));
    }

    #[tokio::test]
    async fn test_handler_error_becomes_error_response() {
        let mut registry = MethodRegistry::new();
        registry
            .register_handler("save", |(): ()| async move {
                Err::<(), _>(RpcError::internal("disk full"))
            })
            .expect("register");
        let (dispatcher, _) = dispatcher_with(registry);

        let reply = reply_json(dispatcher.dispatch(r#"{"jsonrpc":"2.0","method":"save","id":9}"#))
            .await
            .expect("reply");

        assert_eq!(
            reply,
            json!({"jsonrpc": "2.0", "error": {"code": -32603, "message": "disk full"}, "id": 9})
        );
    }

    #[tokio::test]
    async fn test_handler_panic_is_answered() {
        let mut registry = MethodRegistry::new();
        registry
            .register_handler("explode", |(): ()| async move {
                if true {
                    panic!("disk full");
                }
                Ok(())
            })
            .expect("register");
        let (dispatcher, _) = dispatcher_with(registry);

        let reply = reply_json(dispatcher.dispatch(r#"{"jsonrpc":"2.0","method":"explode","id":1}"#))
            .await
            .expect("reply");

        assert_eq!(reply["error"]["code"], json!(-32603));
        assert_eq!(reply["error"]["message"], json!("disk full"));
        assert_eq!(reply["id"], json!(1));
    }

    #[tokio::test]
    async fn test_handler_success() {
        let mut registry = MethodRegistry::new();
        registry
            .register_handler("echo", |params: Value| async move { Ok(params) })
            .expect("register");
        let (dispatcher, _) = dispatcher_with(registry);

        let reply = reply_json(
            dispatcher.dispatch(r#"{"jsonrpc":"2.0","method":"echo","params":{"v":1},"id":2}"#),
        )
        .await
        .expect("reply");

        assert_eq!(reply, json!({"jsonrpc": "2.0", "result": {"v": 1}, "id": 2}));
    }

    #[tokio::test]
    async fn test_wide_numeric_ids_are_answered() {
        let mut registry = MethodRegistry::new();
        registry
            .register_handler("echo", |params: Value| async move { Ok(params) })
            .expect("register");
        let (dispatcher, _) = dispatcher_with(registry);

        let reply = reply_json(dispatcher.dispatch(
            r#"{"jsonrpc":"2.0","method":"echo","params":1,"id":18446744073709551615}"#,
        ))
        .await
        .expect("reply");
        assert_eq!(reply["id"], json!(u64::MAX));
        assert_eq!(reply["result"], json!(1));

        let reply = reply_json(dispatcher.dispatch(r#"{"jsonrpc":"2.0","method":"nope","id":1.0}"#))
            .await
            .expect("reply");
        assert_eq!(reply["id"], json!(1.0));
        assert_eq!(reply["error"]["code"], json!(ErrorCode::METHOD_NOT_FOUND.as_i32()));
    }

    #[tokio::test]
    async fn test_listener_panic_does_not_stop_others() {
        let mut registry = MethodRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let first = Arc::clone(&calls);
        registry.register_listener("changed", move |(): ()| {
            first.fetch_add(1, Ordering::SeqCst);
        });
        registry.register_listener("changed", |(): ()| panic!("listener bug"));
        let third = Arc::clone(&calls);
        registry.register_listener("changed", move |(): ()| {
            third.fetch_add(1, Ordering::SeqCst);
        });
        let (dispatcher, _) = dispatcher_with(registry);

        let reply = reply_json(dispatcher.dispatch(r#"{"jsonrpc":"2.0","method":"changed"}"#)).await;

        assert!(reply.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_response_routes_to_pending_call() {
        let (dispatcher, pending) = dispatcher_with(MethodRegistry::new());
        let (id, reply) = pending.issue("echo", Duration::from_secs(5)).expect("issue");

        let text = format!(r#"{{"jsonrpc":"2.0","result":{{"v":1}},"id":{id}}}"#);
        assert!(matches!(dispatcher.dispatch(&text), Dispatch::Done));
        assert_eq!(reply.await.expect("resolved"), json!({"v": 1}));
    }

    #[tokio::test]
    async fn test_unknown_response_is_noop() {
        let (dispatcher, pending) = dispatcher_with(MethodRegistry::new());

        let dispatch = dispatcher.dispatch(r#"{"jsonrpc":"2.0","result":1,"id":404}"#);
        assert!(matches!(dispatch, Dispatch::Done));
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_message_with_id_is_rejected() {
        let (dispatcher, _) = dispatcher_with(MethodRegistry::new());

        let reply = reply_json(dispatcher.dispatch(r#"{"jsonrpc":"2.0","id":5}"#))
            .await
            .expect("reply");

        assert_eq!(reply["id"], json!(5));
        assert_eq!(reply["error"]["code"], json!(ErrorCode::INVALID_REQUEST.as_i32()));
    }

    #[tokio::test]
    async fn test_garbage_without_id_is_dropped() {
        let (dispatcher, _) = dispatcher_with(MethodRegistry::new());

        assert!(matches!(dispatcher.dispatch("not json"), Dispatch::Done));
        assert!(matches!(dispatcher.dispatch(r#"{"jsonrpc":"2.0"}"#), Dispatch::Done));
    }

    #[tokio::test]
    async fn test_stopped_dispatcher_invokes_nothing() {
        let mut registry = MethodRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        registry.register_listener("tick", move |(): ()| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        registry
            .register_handler("echo", |params: Value| async move { Ok(params) })
            .expect("register");
        let (dispatcher, _) = dispatcher_with(registry);

        dispatcher.stop();

        assert!(matches!(
            dispatcher.dispatch(r#"{"jsonrpc":"2.0","method":"tick"}"#),
            Dispatch::Done
        ));
        assert!(matches!(
            dispatcher.dispatch(r#"{"jsonrpc":"2.0","method":"echo","id":1}"#),
            Dispatch::Done
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
