//! Wire frames exchanged between a bridge and a daemon.
//!
//! Every frame is one JSON object sent as a text message:
//!
//! - Request: `{"id": "<string>", "method": "<string>", "params": [...]}`
//! - Response (success): `{"id": "<string>", "result": <any>}`
//! - Response (failure): `{"id": "<string>", "error": {"code": <integer>, "message": "<string>",
//!   "details": {...}?}}`
//!
//! Inbound frames are never trusted field by field. They go through [`ResponseFrame::parse`] or
//! [`RequestFrame::parse`] first, which either produce a validated frame or a [`ProtocolError`].

use serde::{Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;

use crate::{Method, StorageError};

/// The error produced when an inbound frame is not structurally valid.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The payload is not JSON.
    #[error("frame is not valid JSON")]
    Json(#[from] serde_json::Error),
    /// The payload is JSON, but not an object.
    #[error("frame is not a JSON object")]
    NotAnObject,
    /// The `id` field is missing or not a string.
    #[error("frame has no string `id`")]
    MissingId,
    /// The `method` field is missing or not a string.
    #[error("frame has no string `method`")]
    MissingMethod,
    /// The `params` field is not an array.
    #[error("frame `params` is not an array")]
    InvalidParams,
    /// The response carries neither `result` nor `error`.
    #[error("frame has neither `result` nor `error`")]
    MissingOutcome,
    /// The `error` object is present but malformed.
    #[error("frame has a malformed `error`: {0}")]
    MalformedError(&'static str),
}

/// A request sent by a bridge.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestFrame {
    /// The correlation id, echoed by the response.
    pub id: String,
    /// The operation name.
    pub method: String,
    /// The operation arguments, in declared order.
    pub params: Vec<Value>,
}

/// A request that failed validation on the daemon side.
#[derive(Error, Debug)]
#[error("malformed request: {error}")]
pub struct MalformedRequest {
    /// The correlation id, if it could be recovered.
    pub id: Option<String>,
    /// Why the frame was rejected.
    #[source]
    pub error: ProtocolError,
}

impl RequestFrame {
    /// Creates a request frame.
    pub fn new<S>(id: S, method: Method, params: Vec<Value>) -> Self
    where
        S: Into<String>,
    {
        Self {
            id: id.into(),
            method: method.as_str().to_string(),
            params,
        }
    }

    /// Parses and validates an inbound request.
    ///
    /// A missing `params` is treated as an empty list.
    pub fn parse(raw: &str) -> Result<Self, MalformedRequest> {
        let malformed = |id: Option<String>, error: ProtocolError| MalformedRequest { id, error };

        let value: Value = serde_json::from_str(raw).map_err(|e| malformed(None, e.into()))?;
        let Value::Object(mut object) = value else {
            return Err(malformed(None, ProtocolError::NotAnObject));
        };
        let Some(Value::String(id)) = object.remove("id") else {
            return Err(malformed(None, ProtocolError::MissingId));
        };
        let Some(Value::String(method)) = object.remove("method") else {
            return Err(malformed(Some(id), ProtocolError::MissingMethod));
        };
        let params = match object.remove("params") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(m)) => m,
            Some(_) => return Err(malformed(Some(id), ProtocolError::InvalidParams)),
        };

        Ok(Self { id, method, params })
    }

    /// Serialises this frame to its wire text.
    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// The outcome carried by a response frame.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseOutcome {
    /// The call succeeded. The value may be `null` for operations without a result.
    Result(Value),
    /// The daemon reported a failure for this call.
    Error(StorageError),
}

impl ResponseOutcome {
    /// Converts into a [`Result`].
    pub fn into_result(self) -> Result<Value, StorageError> {
        match self {
            Self::Result(m) => Ok(m),
            Self::Error(e) => Err(e),
        }
    }
}

impl From<Result<Value, StorageError>> for ResponseOutcome {
    fn from(value: Result<Value, StorageError>) -> Self {
        match value {
            Ok(m) => Self::Result(m),
            Err(e) => Self::Error(e),
        }
    }
}

/// A response sent by a daemon.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseFrame {
    /// The correlation id of the request this frame answers.
    pub id: String,
    /// The outcome of the call.
    pub outcome: ResponseOutcome,
}

impl ResponseFrame {
    /// Creates a response frame.
    pub fn new<S, O>(id: S, outcome: O) -> Self
    where
        S: Into<String>,
        O: Into<ResponseOutcome>,
    {
        Self {
            id: id.into(),
            outcome: outcome.into(),
        }
    }

    /// Parses and validates an inbound response.
    ///
    /// A present `error` takes precedence over `result`, `"error": null` counts as absent.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(raw)?;
        let Value::Object(mut object) = value else {
            return Err(ProtocolError::NotAnObject);
        };
        let Some(Value::String(id)) = object.remove("id") else {
            return Err(ProtocolError::MissingId);
        };

        match object.remove("error") {
            None | Some(Value::Null) => {}
            Some(error) => {
                return parse_error_object(error).map(|e| Self {
                    id,
                    outcome: ResponseOutcome::Error(e),
                })
            }
        }

        object
            .remove("result")
            .map(|m| Self {
                id,
                outcome: ResponseOutcome::Result(m),
            })
            .ok_or(ProtocolError::MissingOutcome)
    }

    /// Serialises this frame to its wire text.
    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl Serialize for ResponseFrame {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        #[derive(Serialize)]
        struct Wire<'a> {
            id: &'a str,
            #[serde(skip_serializing_if = "Option::is_none")]
            result: Option<&'a Value>,
            #[serde(skip_serializing_if = "Option::is_none")]
            error: Option<&'a StorageError>,
        }

        let (result, error) = match self.outcome {
            ResponseOutcome::Result(ref m) => (Some(m), None),
            ResponseOutcome::Error(ref e) => (None, Some(e)),
        };

        Wire {
            id: &self.id,
            result,
            error,
        }
        .serialize(serializer)
    }
}

fn parse_error_object(value: Value) -> Result<StorageError, ProtocolError> {
    let Value::Object(mut object) = value else {
        return Err(ProtocolError::MalformedError("`error` is not an object"));
    };

    let code = object
        .get("code")
        .and_then(Value::as_i64)
        .ok_or(ProtocolError::MalformedError("`code` is not an integer"))?;
    let Some(Value::String(message)) = object.remove("message") else {
        return Err(ProtocolError::MalformedError("`message` is not a string"));
    };
    let details = match object.remove("details") {
        None | Some(Value::Null) => None,
        Some(m @ (Value::Object(_) | Value::Array(_))) => Some(m),
        Some(_) => {
            return Err(ProtocolError::MalformedError(
                "`details` is not a structured value",
            ))
        }
    };

    Ok(StorageError {
        code,
        message,
        details,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn request_serialises_to_wire_shape() {
        let frame = RequestFrame::new("req_1", Method::Read, vec![json!("User"), json!("u1")]);

        assert_eq!(
            serde_json::to_value(&frame).unwrap(),
            json!({"id": "req_1", "method": "read", "params": ["User", "u1"]})
        );
    }

    #[test]
    fn parses_success_response() {
        let frame = ResponseFrame::parse(r#"{"id":"req_1","result":{"id":"u1","name":"a"}}"#)
            .unwrap();

        assert_eq!(frame.id, "req_1");
        assert_eq!(
            frame.outcome,
            ResponseOutcome::Result(json!({"id": "u1", "name": "a"}))
        );
    }

    #[test]
    fn null_result_is_a_void_success() {
        let frame = ResponseFrame::parse(r#"{"id":"req_1","result":null,"error":null}"#).unwrap();

        assert_eq!(frame.outcome, ResponseOutcome::Result(Value::Null));
    }

    #[test]
    fn parses_error_response() {
        let frame = ResponseFrame::parse(
            r#"{"id":"req_2","error":{"code":403,"message":"forbidden","details":{"field":"x"}}}"#,
        )
        .unwrap();

        match frame.outcome {
            ResponseOutcome::Error(e) => {
                assert_eq!(e.code, 403);
                assert_eq!(e.message, "forbidden");
                assert_eq!(e.details, Some(json!({"field": "x"})));
            }
            m => panic!("expected error, got {m:?}"),
        }
    }

    #[test]
    fn error_wins_over_result() {
        let frame =
            ResponseFrame::parse(r#"{"id":"a","result":1,"error":{"code":1,"message":"m"}}"#)
                .unwrap();

        assert!(matches!(frame.outcome, ResponseOutcome::Error(_)));
    }

    #[test]
    fn rejects_malformed_responses() {
        for raw in [
            "not json",
            "[1, 2]",
            "{}",
            r#"{"id": 7, "result": 1}"#,
            r#"{"id": "a"}"#,
            r#"{"id": "a", "error": "boom"}"#,
            r#"{"id": "a", "error": {"code": "403", "message": "m"}}"#,
            r#"{"id": "a", "error": {"code": 4.5, "message": "m"}}"#,
            r#"{"id": "a", "error": {"code": 403}}"#,
            r#"{"id": "a", "error": {"code": 403, "message": "m", "details": 3}}"#,
        ] {
            assert!(ResponseFrame::parse(raw).is_err(), "accepted {raw}");
        }
    }

    #[test]
    fn response_serialisation_keeps_null_result() {
        let frame = ResponseFrame::new("a", Ok(Value::Null));

        assert_eq!(frame.to_text().unwrap(), r#"{"id":"a","result":null}"#);
    }

    #[test]
    fn parses_request_and_recovers_id() {
        let frame = RequestFrame::parse(r#"{"id":"r","method":"getCapabilities"}"#).unwrap();
        assert_eq!(frame.method, "getCapabilities");
        assert!(frame.params.is_empty());

        let err = RequestFrame::parse(r#"{"id":"r","method":"read","params":{}}"#).unwrap_err();
        assert_eq!(err.id.as_deref(), Some("r"));
        assert!(matches!(err.error, ProtocolError::InvalidParams));

        let err = RequestFrame::parse("nope").unwrap_err();
        assert!(err.id.is_none());
    }
}
