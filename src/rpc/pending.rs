//! Pending-call table for outbound requests.
//!
//! Every outbound request gets a fresh id and an entry holding a single-use
//! `oneshot` sender. Whoever removes the entry owns the sender, so each call
//! settles exactly once: by its response, by its timeout, or by
//! [`PendingCalls::close_all`]. A response for an id that is no longer in the
//! table is dropped.
//!
//! Dropping an unsettled [`PendingReply`] removes its entry, so abandoned
//! calls stop counting against the pending limit.

// ============================================================================
// Imports
// ============================================================================

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::RequestId;
use crate::protocol::RpcError;

// ============================================================================
// Types
// ============================================================================

/// Single-use completion token for a pending call.
type Completion = oneshot::Sender<Result<Value>>;

/// Why the table stopped accepting calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The transport disconnected.
    ChannelClosed,
    /// The bridge was disposed.
    Disposed,
}

impl CloseReason {
    fn to_error(self) -> Error {
        match self {
            Self::ChannelClosed => Error::ConnectionClosed,
            Self::Disposed => Error::Disposed,
        }
    }
}

/// Bookkeeping for one in-flight request.
struct PendingCall {
    method: String,
    created_at: Instant,
    completion: Completion,
    timer: Option<AbortHandle>,
}

impl PendingCall {
    fn settle(self, outcome: Result<Value>) {
        if let Some(timer) = self.timer {
            timer.abort();
        }
        // The caller may have stopped waiting; nothing to do then.
        let _ = self.completion.send(outcome);
    }

    fn elapsed_ms(&self) -> u64 {
        self.created_at.elapsed().as_millis() as u64
    }
}

#[derive(Default)]
struct TableState {
    calls: FxHashMap<RequestId, PendingCall>,
    closed: Option<CloseReason>,
}

// ============================================================================
// PendingCalls
// ============================================================================

/// Tracks outbound requests awaiting a response.
pub struct PendingCalls {
    next_id: AtomicI64,
    max_pending: usize,
    state: Mutex<TableState>,
}

impl PendingCalls {
    /// Creates an empty table.
    #[must_use]
    pub fn new(max_pending: usize) -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicI64::new(1),
            max_pending,
            state: Mutex::new(TableState::default()),
        })
    }

    /// Registers a new call and starts its timeout timer.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] / [`Error::Disposed`] after [`close_all`](Self::close_all)
    /// - [`Error::Protocol`] if the pending-call limit is reached
    pub fn issue(self: &Arc<Self>, method: &str, timeout: Duration) -> Result<(RequestId, PendingReply)> {
        let (completion, rx) = oneshot::channel();

        let id = {
            let mut state = self.state.lock();

            if let Some(reason) = state.closed {
                return Err(reason.to_error());
            }

            if state.calls.len() >= self.max_pending {
                warn!(
                    pending = state.calls.len(),
                    max = self.max_pending,
                    "Too many pending requests"
                );
                return Err(Error::protocol(format!(
                    "Too many pending requests: {}/{}",
                    state.calls.len(),
                    self.max_pending
                )));
            }

            let id = RequestId::from(self.next_id.fetch_add(1, Ordering::Relaxed));
            state.calls.insert(
                id.clone(),
                PendingCall {
                    method: method.to_string(),
                    created_at: Instant::now(),
                    completion,
                    timer: None,
                },
            );
            id
        };

        let timer = tokio::spawn(Self::run_timer(Arc::downgrade(self), id.clone(), timeout));

        // The timer may already have fired; only attach it to a live entry.
        match self.state.lock().calls.get_mut(&id) {
            Some(call) => call.timer = Some(timer.abort_handle()),
            None => timer.abort(),
        }

        trace!(%id, method, timeout_ms = timeout.as_millis() as u64, "Call issued");

        Ok((
            id.clone(),
            PendingReply {
                id,
                rx,
                table: Arc::downgrade(self),
                settled: false,
            },
        ))
    }

    /// Resolves a call with a result.
    ///
    /// Returns `false` if no call is pending under `id`.
    pub fn complete(&self, id: &RequestId, result: Value) -> bool {
        self.settle(id, Ok(result))
    }

    /// Rejects a call with the remote's error object.
    ///
    /// Returns `false` if no call is pending under `id`.
    pub fn fail(&self, id: &RequestId, error: RpcError) -> bool {
        self.settle(id, Err(Error::Remote(error)))
    }

    /// Rejects a call with a local error, such as a failed send.
    ///
    /// Returns `false` if no call is pending under `id`.
    pub(crate) fn reject(&self, id: &RequestId, error: Error) -> bool {
        self.settle(id, Err(error))
    }

    /// Removes a call without completing it.
    ///
    /// Used when the request could not be sent and the caller reports the
    /// failure directly, and when the caller stops waiting.
    pub fn cancel(&self, id: &RequestId) -> bool {
        let removed = self.state.lock().calls.remove(id);
        match removed {
            Some(call) => {
                if let Some(timer) = call.timer {
                    timer.abort();
                }
                trace!(%id, method = %call.method, "Call cancelled");
                true
            }
            None => false,
        }
    }

    /// Rejects every pending call and refuses new ones.
    ///
    /// The first close reason sticks; a later close with another reason
    /// rejects with the original one. Returns the number of calls rejected.
    pub fn close_all(&self, reason: CloseReason) -> usize {
        let (reason, drained): (CloseReason, Vec<(RequestId, PendingCall)>) = {
            let mut state = self.state.lock();
            let reason = *state.closed.get_or_insert(reason);
            (reason, state.calls.drain().collect())
        };

        let count = drained.len();
        for (_, call) in drained {
            call.settle(Err(reason.to_error()));
        }

        if count > 0 {
            debug!(count, ?reason, "Failed pending requests on close");
        }

        count
    }

    /// Returns the number of pending calls.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().calls.len()
    }

    /// Returns `true` if no call is pending.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns why the table was closed, if it was.
    #[inline]
    #[must_use]
    pub fn close_reason(&self) -> Option<CloseReason> {
        self.state.lock().closed
    }

    fn settle(&self, id: &RequestId, outcome: Result<Value>) -> bool {
        let removed = self.state.lock().calls.remove(id);

        match removed {
            Some(call) => {
                debug!(
                    %id,
                    method = %call.method,
                    elapsed_ms = call.elapsed_ms(),
                    ok = outcome.is_ok(),
                    "Response received"
                );
                call.settle(outcome);
                true
            }
            None => {
                debug!(%id, "Dropping response for unknown or settled request");
                false
            }
        }
    }

    fn expire(&self, id: &RequestId) {
        let removed = self.state.lock().calls.remove(id);

        if let Some(call) = removed {
            let elapsed_ms = call.elapsed_ms();
            warn!(%id, method = %call.method, elapsed_ms, "Request timed out");
            let error = Error::request_timeout(id.clone(), call.method.clone(), elapsed_ms);
            // The timer is this task; no need to abort it.
            let _ = call.completion.send(Err(error));
        }
    }

    async fn run_timer(table: Weak<Self>, id: RequestId, timeout: Duration) {
        tokio::time::sleep(timeout).await;
        if let Some(table) = table.upgrade() {
            table.expire(&id);
        }
    }
}

// ============================================================================
// PendingReply
// ============================================================================

/// Awaitable completion of a pending call.
///
/// Resolves with the remote result, or rejects with
/// [`Error::Remote`], [`Error::RequestTimeout`], [`Error::ConnectionClosed`]
/// or [`Error::Disposed`].
///
/// Dropping it before it resolves cancels the call.
#[derive(Debug)]
pub struct PendingReply {
    id: RequestId,
    rx: oneshot::Receiver<Result<Value>>,
    table: Weak<PendingCalls>,
    settled: bool,
}

impl PendingReply {
    /// Returns the id of the call.
    #[inline]
    #[must_use]
    pub fn id(&self) -> &RequestId {
        &self.id
    }
}

impl Future for PendingReply {
    type Output = Result<Value>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let outcome = match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(outcome)) => outcome,
            Poll::Ready(Err(_)) => Err(Error::ConnectionClosed),
            Poll::Pending => return Poll::Pending,
        };
        self.settled = true;
        Poll::Ready(outcome)
    }
}

impl Drop for PendingReply {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        if let Some(table) = self.table.upgrade()
            && table.cancel(&self.id)
        {
            debug!(id = %self.id, "Caller stopped waiting, call abandoned");
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
