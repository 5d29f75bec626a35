//! Envelope types.
//!
//! One envelope is one JSON message on the wire. Its shape is decided by
//! which fields are present:
//!
//! | Shape | `method` | `id` | `result`/`error` |
//! |-------|----------|------|------------------|
//! | [`Request`] | yes | yes | no |
//! | [`Notification`] | yes | no | no |
//! | [`Response`] | no | yes (or `null` for errors) | exactly one |

// ============================================================================
// Imports
// ============================================================================

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::RequestId;

use super::RpcError;

// ============================================================================
// Constants
// ============================================================================

/// Fixed literal carried in the `jsonrpc` field of every envelope.
pub const JSONRPC_VERSION: &str = "2.0";

// ============================================================================
// Envelope
// ============================================================================

/// A decoded wire message.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    /// Call expecting a response.
    Request(Request),
    /// Reply to an earlier request.
    Response(Response),
    /// One-way message, never answered.
    Notification(Notification),
}

impl Envelope {
    /// Returns the method name for requests and notifications.
    #[must_use]
    pub fn method(&self) -> Option<&str> {
        match self {
            Self::Request(request) => Some(&request.method),
            Self::Notification(notification) => Some(&notification.method),
            Self::Response(_) => None,
        }
    }

    /// Returns the id, if the envelope carries one.
    #[must_use]
    pub fn id(&self) -> Option<&RequestId> {
        match self {
            Self::Request(request) => Some(&request.id),
            Self::Response(response) => response.id.as_ref(),
            Self::Notification(_) => None,
        }
    }
}

impl From<Request> for Envelope {
    #[inline]
    fn from(value: Request) -> Self {
        Self::Request(value)
    }
}

impl From<Response> for Envelope {
    #[inline]
    fn from(value: Response) -> Self {
        Self::Response(value)
    }
}

impl From<Notification> for Envelope {
    #[inline]
    fn from(value: Notification) -> Self {
        Self::Notification(value)
    }
}

impl Serialize for Envelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Request(request) => request.serialize(serializer),
            Self::Response(response) => response.serialize(serializer),
            Self::Notification(notification) => notification.serialize(serializer),
        }
    }
}

// ============================================================================
// Request
// ============================================================================

/// A method call that expects exactly one response.
///
/// # Format
///
/// ```json
/// { "jsonrpc": "2.0", "method": "document/load", "params": { ... }, "id": 1 }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Correlation id echoed back in the response.
    pub id: RequestId,
    /// Method name.
    pub method: String,
    /// Optional parameters.
    pub params: Option<Value>,
}

impl Request {
    /// Creates a new request.
    #[inline]
    #[must_use]
    pub fn new(id: RequestId, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            id,
            method: method.into(),
            params,
        }
    }
}

impl Serialize for Request {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let len = if self.params.is_some() { 4 } else { 3 };
        let mut map = serializer.serialize_map(Some(len))?;
        map.serialize_entry("jsonrpc", JSONRPC_VERSION)?;
        map.serialize_entry("method", &self.method)?;
        if let Some(params) = &self.params {
            map.serialize_entry("params", params)?;
        }
        map.serialize_entry("id", &self.id)?;
        map.end()
    }
}

// ============================================================================
// Notification
// ============================================================================

/// A one-way message. Carries no id and is never answered.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    /// Method name.
    pub method: String,
    /// Optional parameters.
    pub params: Option<Value>,
}

impl Notification {
    /// Creates a new notification.
    #[inline]
    #[must_use]
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }
}

impl Serialize for Notification {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let len = if self.params.is_some() { 3 } else { 2 };
        let mut map = serializer.serialize_map(Some(len))?;
        map.serialize_entry("jsonrpc", JSONRPC_VERSION)?;
        map.serialize_entry("method", &self.method)?;
        if let Some(params) = &self.params {
            map.serialize_entry("params", params)?;
        }
        map.end()
    }
}

// ============================================================================
// Response
// ============================================================================

/// A reply to a request.
///
/// # Format
///
/// Success:
/// ```json
/// { "jsonrpc": "2.0", "result": { ... }, "id": 1 }
/// ```
///
/// Error:
/// ```json
/// { "jsonrpc": "2.0", "error": { "code": -32601, "message": "..." }, "id": 1 }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Id of the request being answered. `None` only for error responses
    /// to requests whose id could not be determined.
    pub id: Option<RequestId>,
    /// Success value or error object.
    pub outcome: Outcome,
}

/// Payload of a [`Response`].
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Successful result (may be `null`).
    Result(Value),
    /// Structured failure.
    Error(RpcError),
}

impl Response {
    /// Creates a success response.
    #[inline]
    #[must_use]
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            id: Some(id),
            outcome: Outcome::Result(result),
        }
    }

    /// Creates an error response.
    #[inline]
    #[must_use]
    pub fn error(id: Option<RequestId>, error: RpcError) -> Self {
        Self {
            id,
            outcome: Outcome::Error(error),
        }
    }

    /// Returns `true` if this is a success response.
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Result(_))
    }

    /// Returns `true` if this is an error response.
    #[inline]
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self.outcome, Outcome::Error(_))
    }

    /// Extracts the result value, returning error if response was error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Remote`] carrying the remote error object.
    pub fn into_result(self) -> Result<Value> {
        match self.outcome {
            Outcome::Result(value) => Ok(value),
            Outcome::Error(error) => Err(Error::Remote(error)),
        }
    }
}

impl Serialize for Response {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry("jsonrpc", JSONRPC_VERSION)?;
        match &self.outcome {
            Outcome::Result(result) => map.serialize_entry("result", result)?,
            Outcome::Error(error) => map.serialize_entry("error", error)?,
        }
        map.serialize_entry("id", &self.id)?;
        map.end()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::protocol::ErrorCode;

    #[test]
    fn test_request_serialization() {
        let request = Request::new(RequestId::from(1), "echo", Some(json!({"v": 1})));
        let value = serde_json::to_value(&request).expect("serialize");

        assert_eq!(
            value,
            json!({"jsonrpc": "2.0", "method": "echo", "params": {"v": 1}, "id": 1})
        );
    }

    #[test]
    fn test_notification_has_no_id() {
        let notification = Notification::new("document/didChange", None);
        let value = serde_json::to_value(&notification).expect("serialize");

        assert_eq!(value, json!({"jsonrpc": "2.0", "method": "document/didChange"}));
    }

    #[test]
    fn test_error_response_with_null_id() {
        let response = Response::error(None, RpcError::invalid_request("bad"));
        let value = serde_json::to_value(&response).expect("serialize");

        assert_eq!(value["id"], Value::Null);
        assert_eq!(value["error"]["code"], json!(-32600));
        assert!(value.get("result").is_none());
    }

    #[test]
    fn test_null_result_is_serialized() {
        let response = Response::success(RequestId::from("a"), Value::Null);
        let value = serde_json::to_value(&response).expect("serialize");

        assert_eq!(value, json!({"jsonrpc": "2.0", "result": null, "id": "a"}));
    }

    #[test]
    fn test_into_result() {
        let ok = Response::success(RequestId::from(1), json!({"value": 42}));
        assert_eq!(ok.into_result().expect("success"), json!({"value": 42}));

        let err = Response::error(
            Some(RequestId::from(1)),
            RpcError::new(ErrorCode::INTERNAL_ERROR, "boom"),
        );
        let result = err.into_result();
        assert!(matches!(result, Err(Error::Remote(ref e)) if e.message == "boom"));
    }

    #[test]
    fn test_envelope_accessors() {
        let request: Envelope = Request::new(RequestId::from(5), "a", None).into();
        assert_eq!(request.method(), Some("a"));
        assert_eq!(request.id(), Some(&RequestId::from(5)));

        let notification: Envelope = Notification::new("b", None).into();
        assert_eq!(notification.id(), None);

        let response: Envelope = Response::success(RequestId::from(5), Value::Null).into();
        assert_eq!(response.method(), None);
    }
}
