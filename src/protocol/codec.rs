//! Envelope encoding and decoding.
//!
//! [`decode`] never panics. Failures come back as a [`DecodeError`] that
//! tells the dispatcher whether a reply can still be addressed.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::identifiers::RequestId;

use super::envelope::{Envelope, JSONRPC_VERSION, Notification, Outcome, Request, Response};
use super::{ErrorCode, RpcError};

// ============================================================================
// DecodeError
// ============================================================================

/// Classification of a decode failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeErrorKind {
    /// The text is not valid JSON.
    Parse,
    /// Valid JSON that matches none of the envelope shapes.
    InvalidEnvelope,
}

/// Typed decode failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeError {
    /// Failure class.
    pub kind: DecodeErrorKind,
    /// Id recovered from the message, if it carried a usable one.
    pub id: Option<RequestId>,
    /// What was wrong.
    pub reason: String,
}

impl DecodeError {
    fn parse(reason: impl Into<String>) -> Self {
        Self {
            kind: DecodeErrorKind::Parse,
            id: None,
            reason: reason.into(),
        }
    }

    fn invalid(id: Option<RequestId>, reason: impl Into<String>) -> Self {
        Self {
            kind: DecodeErrorKind::InvalidEnvelope,
            id,
            reason: reason.into(),
        }
    }

    /// Converts the failure into the error object sent back to the peer.
    #[must_use]
    pub fn to_rpc_error(&self) -> RpcError {
        let code = match self.kind {
            DecodeErrorKind::Parse => ErrorCode::PARSE_ERROR,
            DecodeErrorKind::InvalidEnvelope => ErrorCode::INVALID_REQUEST,
        };
        RpcError::new(code, self.reason.clone())
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            DecodeErrorKind::Parse => write!(f, "parse error: {}", self.reason),
            DecodeErrorKind::InvalidEnvelope => write!(f, "invalid envelope: {}", self.reason),
        }
    }
}

impl std::error::Error for DecodeError {}

// ============================================================================
// Encode
// ============================================================================

/// Serializes an envelope to its wire text.
///
/// # Errors
///
/// Returns [`Error::Json`] if a payload cannot be serialized.
pub fn encode(envelope: &Envelope) -> Result<String> {
    serde_json::to_string(envelope).map_err(Error::from)
}

// ============================================================================
// Decode
// ============================================================================

/// State of the `id` member.
enum IdField {
    Absent,
    Null,
    Present(RequestId),
}

/// Parses wire text into an envelope.
///
/// # Errors
///
/// - [`DecodeErrorKind::Parse`] if the text is not JSON
/// - [`DecodeErrorKind::InvalidEnvelope`] if the JSON is not a valid envelope
pub fn decode(text: &str) -> std::result::Result<Envelope, DecodeError> {
    let value: Value = serde_json::from_str(text).map_err(|e| DecodeError::parse(e.to_string()))?;

    let Value::Object(mut map) = value else {
        return Err(DecodeError::invalid(None, "envelope must be a JSON object"));
    };

    let id = match map.remove("id") {
        None => IdField::Absent,
        Some(Value::Null) => IdField::Null,
        Some(raw) => match RequestId::from_value(&raw) {
            Some(id) => IdField::Present(id),
            None => {
                return Err(DecodeError::invalid(
                    None,
                    "\"id\" must be a number or a string",
                ));
            }
        },
    };
    let recovered = match &id {
        IdField::Present(id) => Some(id.clone()),
        _ => None,
    };

    match map.remove("jsonrpc") {
        Some(Value::String(version)) if version == JSONRPC_VERSION => {}
        _ => {
            return Err(DecodeError::invalid(
                recovered,
                format!("\"jsonrpc\" must be \"{JSONRPC_VERSION}\""),
            ));
        }
    }

    match map.remove("method") {
        Some(Value::String(method)) => decode_call(method, id, recovered, map),
        Some(_) => Err(DecodeError::invalid(recovered, "\"method\" must be a string")),
        None => decode_response(id, recovered, map),
    }
}

/// Decodes a request or notification once `method` has been extracted.
fn decode_call(
    method: String,
    id: IdField,
    recovered: Option<RequestId>,
    mut map: Map<String, Value>,
) -> std::result::Result<Envelope, DecodeError> {
    if map.contains_key("result") || map.contains_key("error") {
        return Err(DecodeError::invalid(
            recovered,
            "a call must not carry \"result\" or \"error\"",
        ));
    }

    let params = map.remove("params");

    match id {
        IdField::Absent => Ok(Envelope::Notification(Notification { method, params })),
        IdField::Present(id) => Ok(Envelope::Request(Request { id, method, params })),
        IdField::Null => Err(DecodeError::invalid(None, "request \"id\" must not be null")),
    }
}

/// Decodes a response once it is known to carry no `method`.
fn decode_response(
    id: IdField,
    recovered: Option<RequestId>,
    mut map: Map<String, Value>,
) -> std::result::Result<Envelope, DecodeError> {
    let outcome = match (map.remove("result"), map.remove("error")) {
        (Some(result), None) => Outcome::Result(result),
        (None, Some(error)) => match serde_json::from_value::<RpcError>(error) {
            Ok(error) => Outcome::Error(error),
            Err(e) => {
                return Err(DecodeError::invalid(
                    recovered,
                    format!("malformed \"error\" object: {e}"),
                ));
            }
        },
        (Some(_), Some(_)) => {
            return Err(DecodeError::invalid(
                recovered,
                "response carries both \"result\" and \"error\"",
            ));
        }
        (None, None) => {
            return Err(DecodeError::invalid(
                recovered,
                "message has no \"method\", \"result\" or \"error\"",
            ));
        }
    };

    let id = match (id, &outcome) {
        (IdField::Present(id), _) => Some(id),
        (IdField::Null, Outcome::Error(_)) => None,
        (IdField::Null, Outcome::Result(_)) => {
            return Err(DecodeError::invalid(None, "success response \"id\" must not be null"));
        }
        (IdField::Absent, _) => {
            return Err(DecodeError::invalid(None, "response is missing \"id\""));
        }
    };

    Ok(Envelope::Response(Response { id, outcome }))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_decode_request() {
        let envelope =
            decode(r#"{"jsonrpc":"2.0","method":"echo","params":{"v":1},"id":7}"#).expect("decode");

        assert_eq!(
            envelope,
            Envelope::Request(Request::new(RequestId::from(7), "echo", Some(json!({"v": 1}))))
        );
    }

    #[test]
    fn test_decode_notification() {
        let envelope = decode(r#"{"jsonrpc":"2.0","method":"ping"}"#).expect("decode");
        assert_eq!(envelope, Envelope::Notification(Notification::new("ping", None)));
    }

    #[test]
    fn test_decode_success_with_null_result() {
        let envelope = decode(r#"{"jsonrpc":"2.0","result":null,"id":"abc"}"#).expect("decode");
        assert_eq!(
            envelope,
            Envelope::Response(Response::success(RequestId::from("abc"), Value::Null))
        );
    }

    #[test]
    fn test_decode_error_with_null_id() {
        let envelope = decode(
            r#"{"jsonrpc":"2.0","error":{"code":-32700,"message":"bad json"},"id":null}"#,
        )
        .expect("decode");

        let Envelope::Response(response) = envelope else {
            panic!("expected response");
        };
        assert_eq!(response.id, None);
        assert!(response.is_error());
    }

    #[test]
    fn test_parse_error() {
        let err = decode("{not json").unwrap_err();
        assert_eq!(err.kind, DecodeErrorKind::Parse);
        assert_eq!(err.id, None);
        assert_eq!(err.to_rpc_error().code, ErrorCode::PARSE_ERROR);
    }

    #[test]
    fn test_invalid_envelope_recovers_id() {
        let err = decode(r#"{"jsonrpc":"2.0","id":3}"#).unwrap_err();
        assert_eq!(err.kind, DecodeErrorKind::InvalidEnvelope);
        assert_eq!(err.id, Some(RequestId::from(3)));
        assert_eq!(err.to_rpc_error().code, ErrorCode::INVALID_REQUEST);
    }

    #[test]
    fn test_invalid_shapes() {
        let cases = [
            r#"[1,2,3]"#,
            r#"{"method":"no-marker","id":1}"#,
            r#"{"jsonrpc":"1.0","method":"old","id":1}"#,
            r#"{"jsonrpc":"2.0","method":5,"id":1}"#,
            r#"{"jsonrpc":"2.0","method":"m","result":1,"id":1}"#,
            r#"{"jsonrpc":"2.0","result":1,"error":{"code":1,"message":"x"},"id":1}"#,
            r#"{"jsonrpc":"2.0","result":1}"#,
            r#"{"jsonrpc":"2.0","result":1,"id":null}"#,
            r#"{"jsonrpc":"2.0","error":{"code":"x"},"id":1}"#,
            r#"{"jsonrpc":"2.0","method":"m","id":{"nested":true}}"#,
        ];

        for case in cases {
            let err = decode(case).unwrap_err();
            assert_eq!(err.kind, DecodeErrorKind::InvalidEnvelope, "case: {case}");
        }
    }

    #[test]
    fn test_string_and_numeric_ids_echo_unchanged() {
        let text = r#"{"jsonrpc":"2.0","result":true,"id":"17"}"#;
        let envelope = decode(text).expect("decode");
        let encoded = encode(&envelope).expect("encode");
        assert!(encoded.contains(r#""id":"17""#));

        let text = r#"{"jsonrpc":"2.0","result":true,"id":17}"#;
        let encoded = encode(&decode(text).expect("decode")).expect("encode");
        assert!(encoded.contains(r#""id":17"#));
    }

    #[test]
    fn test_wide_numeric_ids_are_kept() {
        let text = r#"{"jsonrpc":"2.0","method":"echo","params":1,"id":18446744073709551615}"#;
        let Envelope::Request(request) = decode(text).expect("decode") else {
            panic!("expected request");
        };
        assert_eq!(request.id, RequestId::Number(u64::MAX.into()));

        let reply = encode(&Response::success(request.id, json!(1)).into()).expect("encode");
        assert!(reply.contains(r#""id":18446744073709551615"#));

        let text = r#"{"jsonrpc":"2.0","result":true,"id":1.0}"#;
        let encoded = encode(&decode(text).expect("decode")).expect("encode");
        assert!(encoded.contains(r#""id":1.0"#));
    }

    fn arb_id() -> impl Strategy<Value = RequestId> {
        prop_oneof![
            any::<i64>().prop_map(RequestId::from),
            any::<u64>().prop_map(|n| RequestId::Number(n.into())),
            "[a-z0-9-]{0,12}".prop_map(RequestId::String),
        ]
    }

    fn arb_params() -> impl Strategy<Value = Option<Value>> {
        prop_oneof![
            Just(None),
            any::<i32>().prop_map(|n| Some(json!({ "n": n }))),
            "[ -~]{0,16}".prop_map(|s| Some(json!([s]))),
        ]
    }

    fn arb_envelope() -> impl Strategy<Value = Envelope> {
        let method = "[a-zA-Z/]{1,16}";
        prop_oneof![
            (arb_id(), method, arb_params())
                .prop_map(|(id, m, p)| Envelope::Request(Request::new(id, m, p))),
            (method, arb_params())
                .prop_map(|(m, p)| Envelope::Notification(Notification::new(m, p))),
            (arb_id(), any::<i32>())
                .prop_map(|(id, n)| Envelope::Response(Response::success(id, json!(n)))),
            (proptest::option::of(arb_id()), any::<i32>(), "[ -~]{0,16}").prop_map(
                |(id, code, message)| {
                    Envelope::Response(Response::error(
                        id,
                        RpcError::new(ErrorCode(code), message),
                    ))
                }
            ),
        ]
    }

    proptest! {
        #[test]
        fn prop_decode_inverts_encode(envelope in arb_envelope()) {
            let text = encode(&envelope).expect("encode");
            prop_assert_eq!(decode(&text).expect("decode"), envelope);
        }
    }
}
