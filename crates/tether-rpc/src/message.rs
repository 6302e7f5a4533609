//! JSON-RPC 2.0 envelopes.
//!
//! Parameters are always positional: a request's `params` is a JSON array
//! and handlers pick arguments out of it by index through [`Params`].
use std::sync::atomic::{AtomicI64, Ordering};

use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::error::RpcError;

/// Invalid JSON was received.
pub const PARSE_ERROR: i32 = -32700;
/// The JSON is not a valid request object.
pub const INVALID_REQUEST: i32 = -32600;
/// No such method.
pub const METHOD_NOT_FOUND: i32 = -32601;
/// Wrong number or type of parameters.
pub const INVALID_PARAMS: i32 = -32602;
/// The handler failed to encode its result.
pub const INTERNAL_ERROR: i32 = -32603;
/// The server is busy producing an earlier reply; try again shortly.
pub const NOT_READY: i32 = -32002;

static NEXT_REQUEST_ID: AtomicI64 = AtomicI64::new(1);

/// Generate the next unique request id.
pub fn next_request_id() -> i64 {
    NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed)
}

/// An error raised by a handler, sent back as a JSON-RPC error object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    /// Fault code.
    pub code: i32,
    /// Diagnostic text.
    pub message: String,
}

impl Fault {
    /// A fault with an arbitrary code.
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// The named method does not exist.
    pub fn method_not_found(method: &str) -> Self {
        Self::new(METHOD_NOT_FOUND, format!("method not found: {method}"))
    }

    /// A parameter is missing or has the wrong type.
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(INVALID_PARAMS, message)
    }

    /// The server cannot answer right now.
    pub fn not_ready() -> Self {
        Self::new(NOT_READY, "response not ready")
    }

    /// The handler could not produce a result.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(INTERNAL_ERROR, message)
    }
}

impl From<Fault> for RpcError {
    fn from(fault: Fault) -> Self {
        match fault.code {
            NOT_READY => RpcError::ResponseNotReady,
            code => RpcError::Fault {
                code,
                message: fault.message,
            },
        }
    }
}

/// Positional request parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params(Vec<Value>);

impl Params {
    /// Wrap positional values.
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    /// Number of values supplied.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no values were supplied.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Required parameter at `index`.
    pub fn get<T: DeserializeOwned>(&self, index: usize, name: &str) -> Result<T, Fault> {
        let value = self
            .0
            .get(index)
            .ok_or_else(|| Fault::invalid_params(format!("missing parameter {index} ({name})")))?;
        serde_json::from_value(value.clone())
            .map_err(|e| Fault::invalid_params(format!("parameter {index} ({name}): {e}")))
    }

    /// Optional parameter at `index`; absent and `null` both yield `None`.
    pub fn opt<T: DeserializeOwned>(&self, index: usize, name: &str) -> Result<Option<T>, Fault> {
        match self.0.get(index) {
            None | Some(Value::Null) => Ok(None),
            Some(_) => self.get(index, name).map(Some),
        }
    }
}

/// A decoded request.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Request id, echoed in the response.
    pub id: Value,
    /// Method name.
    pub method: String,
    /// Positional parameters.
    pub params: Params,
}

/// Serialize a request with positional parameters.
///
/// `params` must be an array or `null`.
pub fn serialize_request(id: i64, method: &str, params: Value) -> String {
    let params = match params {
        Value::Null => Value::Array(Vec::new()),
        other => other,
    };
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": method,
        "params": params
    })
    .to_string()
}

/// Serialize a successful response.
pub fn serialize_response(id: &Value, result: Value) -> String {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result
    })
    .to_string()
}

/// Serialize an error response.
pub fn serialize_error_response(id: &Value, fault: &Fault) -> String {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {
            "code": fault.code,
            "message": fault.message
        }
    })
    .to_string()
}

/// Decode a request body. Failures come back as the fault to answer with.
pub fn parse_request(body: &[u8]) -> Result<Request, Fault> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| Fault::new(PARSE_ERROR, format!("invalid JSON: {e}")))?;

    let id = value.get("id").cloned().unwrap_or(Value::Null);
    let method = value
        .get("method")
        .and_then(Value::as_str)
        .ok_or_else(|| Fault::new(INVALID_REQUEST, "method must be a string"))?
        .to_string();
    let params = match value.get("params") {
        None | Some(Value::Null) => Params::default(),
        Some(Value::Array(values)) => Params::new(values.clone()),
        Some(_) => return Err(Fault::invalid_params("params must be an array")),
    };
    Ok(Request { id, method, params })
}

/// Decode a response body for request `expected_id`.
pub fn parse_response(body: &[u8], expected_id: i64) -> Result<Value, RpcError> {
    let mut value: Value = serde_json::from_slice(body)?;

    if value.get("id").and_then(Value::as_i64) != Some(expected_id) {
        return Err(RpcError::InvalidResponse(format!(
            "expected response to request {expected_id}, got id {}",
            value.get("id").unwrap_or(&Value::Null)
        )));
    }

    if let Some(error) = value.get("error") {
        let code = error
            .get("code")
            .and_then(Value::as_i64)
            .and_then(|c| i32::try_from(c).ok())
            .ok_or_else(|| RpcError::InvalidResponse("error without integer code".into()))?;
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default();
        return Err(Fault::new(code, message).into());
    }

    match value.get_mut("result") {
        Some(result) => Ok(result.take()),
        None => Err(RpcError::InvalidResponse(
            "response has neither result nor error".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_ids_increase() {
        let a = next_request_id();
        let b = next_request_id();
        assert!(b > a);
    }

    #[test]
    fn null_params_become_empty_array() {
        let body = serialize_request(7, "get_status", Value::Null);
        let req = parse_request(body.as_bytes()).unwrap();
        assert_eq!(req.id, json!(7));
        assert_eq!(req.method, "get_status");
        assert!(req.params.is_empty());
    }

    #[test]
    fn params_by_position() {
        let body = serialize_request(1, "set_breakpoint", json!(["/a.c", 4, null]));
        let req = parse_request(body.as_bytes()).unwrap();
        assert_eq!(req.params.len(), 3);
        assert_eq!(req.params.get::<String>(0, "file").unwrap(), "/a.c");
        assert_eq!(req.params.get::<u32>(1, "line").unwrap(), 4);
        assert_eq!(req.params.opt::<String>(2, "condition").unwrap(), None);
        assert_eq!(req.params.opt::<u32>(3, "ignore_count").unwrap(), None);
    }

    #[test]
    fn missing_or_mistyped_params_are_invalid() {
        let params = Params::new(vec![json!("x")]);
        let missing = params.get::<u32>(1, "line").unwrap_err();
        assert_eq!(missing.code, INVALID_PARAMS);
        assert!(missing.message.contains("line"));
        let mistyped = params.get::<u32>(0, "line").unwrap_err();
        assert_eq!(mistyped.code, INVALID_PARAMS);
    }

    #[test]
    fn malformed_requests() {
        assert_eq!(parse_request(b"{").unwrap_err().code, PARSE_ERROR);
        assert_eq!(
            parse_request(br#"{"jsonrpc":"2.0","id":1}"#).unwrap_err().code,
            INVALID_REQUEST
        );
        assert_eq!(
            parse_request(br#"{"jsonrpc":"2.0","id":1,"method":"m","params":{"a":1}}"#)
                .unwrap_err()
                .code,
            INVALID_PARAMS
        );
    }

    #[test]
    fn response_result_is_extracted() {
        let body = serialize_response(&json!(3), json!("running"));
        assert_eq!(parse_response(body.as_bytes(), 3).unwrap(), json!("running"));
    }

    #[test]
    fn null_result_is_a_result() {
        let body = serialize_response(&json!(3), Value::Null);
        assert_eq!(parse_response(body.as_bytes(), 3).unwrap(), Value::Null);
    }

    #[test]
    fn mismatched_id_is_rejected() {
        let body = serialize_response(&json!(4), json!(1));
        assert!(matches!(
            parse_response(body.as_bytes(), 3),
            Err(RpcError::InvalidResponse(_))
        ));
    }

    #[test]
    fn not_ready_fault_becomes_transient_error() {
        let body = serialize_error_response(&json!(5), &Fault::not_ready());
        let err = parse_response(body.as_bytes(), 5).unwrap_err();
        assert!(matches!(err, RpcError::ResponseNotReady));
    }

    #[test]
    fn other_faults_keep_code_and_message() {
        let body = serialize_error_response(&json!(5), &Fault::new(1, "no process"));
        match parse_response(body.as_bytes(), 5).unwrap_err() {
            RpcError::Fault { code, message } => {
                assert_eq!(code, 1);
                assert_eq!(message, "no process");
            }
            other => panic!("expected fault, got {other:?}"),
        }
    }

    #[test]
    fn method_not_found_names_method() {
        let fault = Fault::method_not_found("warp");
        assert_eq!(fault.code, METHOD_NOT_FOUND);
        assert!(fault.message.contains("warp"));
    }
}
