//! Bridge: one logical channel to one remote endpoint.
//!
//! The bridge owns the transport and runs two tasks once
//! [`initialize`](Bridge::initialize) is called:
//!
//! - a reader task draining the transport receiver into a channel
//! - the event loop, selecting over inbound text and outbound commands
//!
//! # Event Loop
//!
//! ```text
//! transport ──► reader task ──► inbound_rx ─┐
//!                                           ├─► select! ──► Dispatcher
//! call / notify / replies ──► command_rx ───┘        └────► transport sender
//! ```
//!
//! Inbound messages are classified and routed in delivery order. Request
//! handlers run as spawned tasks and send their replies back through the
//! command channel, so replies may complete out of order. Listeners run
//! inline on the loop.
//!
//! The loop only holds a weak command sender. Dropping every [`Bridge`]
//! handle without [`dispose`](Bridge::dispose) still closes the transport.

// ============================================================================
// Imports
// ============================================================================

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::RequestId;
use crate::protocol::{Envelope, Notification, Request, RpcError, encode};
use crate::transport::{Transport, TransportReceiver, TransportSender};

use super::dispatcher::{Dispatch, Dispatcher};
use super::options::BridgeOptions;
use super::pending::{CloseReason, PendingCalls};
use super::registry::MethodRegistry;

// ============================================================================
// Types
// ============================================================================

/// Internal commands for the event loop.
enum BridgeCommand {
    /// Write one encoded envelope.
    ///
    /// `request_id` is set for outbound requests so a failed write rejects
    /// the matching call.
    Send {
        text: String,
        request_id: Option<RequestId>,
    },
    /// Close the transport and stop the loop.
    Shutdown,
}

/// Transport halves and the command receiver, held until `initialize`.
struct Startup {
    sender: Box<dyn TransportSender>,
    receiver: Box<dyn TransportReceiver>,
    command_rx: mpsc::UnboundedReceiver<BridgeCommand>,
}

struct BridgeInner {
    options: BridgeOptions,
    pending: Arc<PendingCalls>,
    /// `Some` until the registry is sealed by `initialize`.
    registry: Mutex<Option<MethodRegistry>>,
    /// `Some` between `initialize` and `dispose`.
    dispatcher: Mutex<Option<Arc<Dispatcher>>>,
    startup: Mutex<Option<Startup>>,
    command_tx: mpsc::UnboundedSender<BridgeCommand>,
    disposed: AtomicBool,
}

// ============================================================================
// Bridge
// ============================================================================

/// Bidirectional request/response channel to a single remote endpoint.
///
/// Register handlers and listeners first, then call
/// [`initialize`](Self::initialize) to start processing messages. Outbound
/// calls made before `initialize` are queued.
///
/// # Thread Safety
///
/// `Bridge` is `Clone + Send + Sync`; clones share the same channel.
///
/// # Example
///
/// ```ignore
/// use panel_bridge::{Bridge, BridgeOptions, transport::ChannelTransport};
///
/// let (host_side, _panel_side) = ChannelTransport::pair();
/// let bridge = Bridge::new(host_side, BridgeOptions::default())?;
///
/// bridge.register_handler("echo", |params: serde_json::Value| async move { Ok(params) })?;
/// bridge.initialize()?;
///
/// let reply: serde_json::Value = bridge.call("panel/ping", ()).await?;
/// ```
#[derive(Clone)]
pub struct Bridge {
    inner: Arc<BridgeInner>,
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("pending", &self.pending_count())
            .field("initialized", &self.is_initialized())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

impl Bridge {
    /// Creates a bridge over `transport`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `options` are invalid.
    pub fn new<T: Transport>(transport: T, options: BridgeOptions) -> Result<Self> {
        options.validate().map_err(Error::config)?;

        let (sender, receiver) = transport.split();
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let inner = BridgeInner {
            pending: PendingCalls::new(options.max_pending),
            options,
            registry: Mutex::new(Some(MethodRegistry::new())),
            dispatcher: Mutex::new(None),
            startup: Mutex::new(Some(Startup {
                sender: Box::new(sender),
                receiver: Box::new(receiver),
                command_rx,
            })),
            command_tx,
            disposed: AtomicBool::new(false),
        };

        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Registers the request handler for `method`.
    ///
    /// # Errors
    ///
    /// - [`Error::DuplicateHandler`] if `method` already has a handler
    /// - [`Error::Config`] after [`initialize`](Self::initialize)
    /// - [`Error::Disposed`] after [`dispose`](Self::dispose)
    pub fn register_handler<P, R, F, Fut>(&self, method: impl Into<String>, handler: F) -> Result<()>
    where
        P: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<R, RpcError>> + Send + 'static,
    {
        let mut guard = self.inner.registry.lock();
        let registry = guard.as_mut().ok_or_else(|| self.sealed_error())?;
        registry.register_handler(method, handler)
    }

    /// Adds a notification listener for `method`.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] after [`initialize`](Self::initialize)
    /// - [`Error::Disposed`] after [`dispose`](Self::dispose)
    pub fn register_listener<P, F>(&self, method: impl Into<String>, listener: F) -> Result<()>
    where
        P: DeserializeOwned + 'static,
        F: Fn(P) + Send + Sync + 'static,
    {
        let mut guard = self.inner.registry.lock();
        let registry = guard.as_mut().ok_or_else(|| self.sealed_error())?;
        registry.register_listener(method, listener);
        Ok(())
    }

    fn sealed_error(&self) -> Error {
        if self.is_disposed() {
            Error::Disposed
        } else {
            Error::config("handlers must be registered before initialize()")
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Seals the registry and starts processing messages.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if already initialized
    /// - [`Error::Disposed`] after [`dispose`](Self::dispose)
    pub fn initialize(&self) -> Result<()> {
        if self.is_disposed() {
            return Err(Error::Disposed);
        }

        let startup = self
            .inner
            .startup
            .lock()
            .take()
            .ok_or_else(|| Error::config("bridge is already initialized"))?;

        let registry = self.inner.registry.lock().take().unwrap_or_default();
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::new(registry),
            Arc::clone(&self.inner.pending),
        ));
        *self.inner.dispatcher.lock() = Some(Arc::clone(&dispatcher));

        let Startup {
            sender,
            receiver,
            command_rx,
        } = startup;

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let reader = tokio::spawn(run_reader(receiver, inbound_tx));

        tokio::spawn(run_event_loop(EventLoop {
            sender,
            inbound_rx,
            command_rx,
            command_tx: self.inner.command_tx.downgrade(),
            dispatcher,
            pending: Arc::clone(&self.inner.pending),
            reader: reader.abort_handle(),
        }));

        info!("Bridge initialized");
        Ok(())
    }

    /// Tears the bridge down.
    ///
    /// Synchronously rejects every pending call with [`Error::Disposed`],
    /// stops handler and listener invocation, and shuts the event loop
    /// down. Idempotent.
    pub fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }

        let failed = self.inner.pending.close_all(CloseReason::Disposed);

        if let Some(dispatcher) = self.inner.dispatcher.lock().take() {
            dispatcher.stop();
        }

        // Handlers may hold bridge clones; dropping them breaks the cycle.
        self.inner.registry.lock().take();
        self.inner.startup.lock().take();

        let _ = self.inner.command_tx.send(BridgeCommand::Shutdown);

        info!(failed, "Bridge disposed");
    }

    // ========================================================================
    // Outbound
    // ========================================================================

    /// Calls `method` on the remote with the timeout configured for it.
    ///
    /// # Errors
    ///
    /// - [`Error::Remote`] if the remote answered with an error
    /// - [`Error::RequestTimeout`] if no response arrived in time
    /// - [`Error::ConnectionClosed`] / [`Error::Disposed`] on teardown
    /// - [`Error::Protocol`] if too many calls are pending
    /// - [`Error::Json`] if params or result don't (de)serialize
    pub async fn call<P, R>(&self, method: &str, params: P) -> Result<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let timeout = self.inner.options.timeout_for(method);
        self.call_with_timeout(method, params, timeout).await
    }

    /// Calls `method` on the remote with an explicit timeout.
    ///
    /// # Errors
    ///
    /// Same as [`call`](Self::call).
    pub async fn call_with_timeout<P, R>(&self, method: &str, params: P, timeout: Duration) -> Result<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        self.ensure_live()?;
        let params = to_params(params)?;

        let (id, reply) = self.inner.pending.issue(method, timeout)?;

        let text = match encode(&Request::new(id.clone(), method, params).into()) {
            Ok(text) => text,
            Err(e) => {
                self.inner.pending.cancel(&id);
                return Err(e);
            }
        };

        let command = BridgeCommand::Send {
            text,
            request_id: Some(id.clone()),
        };
        if self.inner.command_tx.send(command).is_err() {
            self.inner.pending.cancel(&id);
            return Err(Error::ConnectionClosed);
        }

        let value = reply.await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Sends a notification; no response is expected.
    ///
    /// # Errors
    ///
    /// - [`Error::Disposed`] after [`dispose`](Self::dispose)
    /// - [`Error::ConnectionClosed`] if the event loop has stopped
    pub fn notify<P: Serialize>(&self, method: &str, params: P) -> Result<()> {
        self.ensure_live()?;
        let params = to_params(params)?;
        let text = encode(&Notification::new(method, params).into())?;

        trace!(method, "Notification queued");

        self.inner
            .command_tx
            .send(BridgeCommand::Send {
                text,
                request_id: None,
            })
            .map_err(|_| Error::ConnectionClosed)
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_disposed() {
            return Err(Error::Disposed);
        }
        match self.inner.pending.close_reason() {
            Some(CloseReason::ChannelClosed) => Err(Error::ConnectionClosed),
            Some(CloseReason::Disposed) => Err(Error::Disposed),
            None => Ok(()),
        }
    }

    // ========================================================================
    // Diagnostics
    // ========================================================================

    /// Returns the number of outbound calls awaiting a response.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    /// Returns `true` once [`dispose`](Self::dispose) was called.
    #[inline]
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    /// Returns `true` once [`initialize`](Self::initialize) succeeded.
    #[inline]
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.inner.startup.lock().is_none() && !self.is_disposed()
    }

    /// Returns the bridge options.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &BridgeOptions {
        &self.inner.options
    }
}

/// Serializes params, omitting the field for `()` and `null`.
fn to_params<P: Serialize>(params: P) -> Result<Option<Value>> {
    match serde_json::to_value(params)? {
        Value::Null => Ok(None),
        value => Ok(Some(value)),
    }
}

// ============================================================================
// Tasks
// ============================================================================

/// Drains the transport receiver into the event loop.
async fn run_reader(mut receiver: Box<dyn TransportReceiver>, inbound_tx: mpsc::UnboundedSender<Result<String>>) {
    while let Some(message) = receiver.recv().await {
        let failed = message.is_err();
        if inbound_tx.send(message).is_err() || failed {
            break;
        }
    }
    debug!("Transport reader finished");
}

struct EventLoop {
    sender: Box<dyn TransportSender>,
    inbound_rx: mpsc::UnboundedReceiver<Result<String>>,
    command_rx: mpsc::UnboundedReceiver<BridgeCommand>,
    /// Upgraded by handler tasks to send their reply.
    command_tx: mpsc::WeakUnboundedSender<BridgeCommand>,
    dispatcher: Arc<Dispatcher>,
    pending: Arc<PendingCalls>,
    reader: tokio::task::AbortHandle,
}

async fn run_event_loop(mut state: EventLoop) {
    loop {
        tokio::select! {
            // Inbound text from the remote
            inbound = state.inbound_rx.recv() => {
                match inbound {
                    Some(Ok(text)) => {
                        trace!(bytes = text.len(), "Message received");
                        handle_inbound(&mut state, &text).await;
                    }

                    Some(Err(e)) => {
                        error!(error = %e, "Transport receive failed");
                        break;
                    }

                    None => {
                        debug!("Transport closed by remote");
                        break;
                    }
                }
            }

            // Commands from the API and spawned handlers
            command = state.command_rx.recv() => {
                match command {
                    Some(BridgeCommand::Send { text, request_id }) => {
                        if let Err(e) = state.sender.send(text).await {
                            error!(error = %e, "Transport send failed");
                            if let Some(id) = request_id {
                                state.pending.reject(&id, e);
                            }
                        }
                    }

                    Some(BridgeCommand::Shutdown) => {
                        debug!("Shutdown command received");
                        if let Err(e) = state.sender.close().await {
                            debug!(error = %e, "Transport close failed");
                        }
                        break;
                    }

                    None => {
                        debug!("Every bridge handle dropped, closing transport");
                        if let Err(e) = state.sender.close().await {
                            debug!(error = %e, "Transport close failed");
                        }
                        break;
                    }
                }
            }
        }
    }

    state.reader.abort();
    state.pending.close_all(CloseReason::ChannelClosed);

    debug!("Event loop terminated");
}

async fn handle_inbound(state: &mut EventLoop, text: &str) {
    match state.dispatcher.dispatch(text) {
        Dispatch::Done => {}

        Dispatch::Reply(envelope) => send_envelope(&mut state.sender, &envelope).await,

        Dispatch::Handle(fut) => {
            let command_tx = state.command_tx.clone();
            tokio::spawn(async move {
                let envelope = fut.await;
                let Some(command_tx) = command_tx.upgrade() else {
                    debug!("Bridge dropped, discarding reply");
                    return;
                };
                match encode(&envelope) {
                    Ok(text) => {
                        let _ = command_tx.send(BridgeCommand::Send {
                            text,
                            request_id: None,
                        });
                    }
                    Err(e) => error!(error = %e, "Failed to encode response"),
                }
            });
        }
    }
}

async fn send_envelope(sender: &mut Box<dyn TransportSender>, envelope: &Envelope) {
    match encode(envelope) {
        Ok(text) => {
            if let Err(e) = sender.send(text).await {
                warn!(error = %e, "Failed to send reply");
            }
        }
        Err(e) => error!(error = %e, "Failed to encode reply"),
    }
}

// ============================================================================
// Tests
// ============================================================================
