//! JSON-RPC 2.0 codec

use base64::Engine;
use chrono::SecondsFormat;
use serde::Serialize;
use serde_json::{Number, Value as JsonValue};

use super::{DecodeError, Inbound, Unit, WireCodec};
use crate::models::{
    validate_method_name, ErrorCode, Params, Request, RequestId, ResponsePart, RpcError,
};
use crate::{Protocol, Value};

pub const JSONRPC_VERSION: &str = "2.0";

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

/// Convert a native value to JSON.
///
/// Date/times become RFC 3339 strings and bytes become Base64 strings.
/// Non-finite doubles become `null`.
pub fn to_json(value: &Value) -> JsonValue {
    match value {
        Value::Int(i) => JsonValue::Number((*i).into()),
        Value::Double(d) => Number::from_f64(*d)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        Value::Bool(b) => JsonValue::Bool(*b),
        Value::Str(s) => JsonValue::String(s.clone()),
        Value::Nil => JsonValue::Null,
        Value::DateTime(dt) => JsonValue::String(dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        Value::Bytes(bytes) => {
            JsonValue::String(base64::engine::general_purpose::STANDARD.encode(bytes))
        }
        Value::Array(items) => JsonValue::Array(items.iter().map(to_json).collect()),
        Value::Struct(members) => JsonValue::Object(
            members
                .iter()
                .map(|(name, value)| (name.clone(), to_json(value)))
                .collect(),
        ),
    }
}

/// Convert JSON to a native value
pub fn from_json(value: JsonValue) -> Value {
    match value {
        JsonValue::Null => Value::Nil,
        JsonValue::Bool(b) => Value::Bool(b),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Double(n.as_f64().unwrap_or(f64::NAN)),
        },
        JsonValue::String(s) => Value::Str(s),
        JsonValue::Array(items) => Value::Array(items.into_iter().map(from_json).collect()),
        JsonValue::Object(members) => Value::Struct(
            members
                .into_iter()
                .map(|(name, value)| (name, from_json(value)))
                .collect(),
        ),
    }
}

/// Read an id strictly: only strings, integers and null are ids
fn id_from_json(value: Option<&JsonValue>) -> Option<RequestId> {
    match value {
        None | Some(JsonValue::Null) => Some(RequestId::Null),
        Some(JsonValue::String(s)) => Some(RequestId::String(s.clone())),
        Some(JsonValue::Number(n)) => n.as_i64().map(RequestId::Number),
        Some(_) => None,
    }
}

fn params_to_json(params: &Params) -> JsonValue {
    match params {
        Params::Positional(values) => JsonValue::Array(values.iter().map(to_json).collect()),
        Params::Named(values) => JsonValue::Object(
            values
                .iter()
                .map(|(name, value)| (name.clone(), to_json(value)))
                .collect(),
        ),
    }
}

#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<JsonValue>,
    /// Absent for notifications
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<&'a RequestId>,
}

#[derive(Debug, Serialize)]
struct WireResponse<'a> {
    jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<WireError<'a>>,
    id: &'a RequestId,
}

#[derive(Debug, Serialize)]
struct WireError<'a> {
    code: i64,
    message: &'a str,
    time: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<JsonValue>,
}

impl<'a> From<&'a RpcError> for WireError<'a> {
    fn from(error: &'a RpcError) -> Self {
        Self {
            code: error.code.code(),
            message: &error.message,
            time: error.time,
            source: error.source.as_ref().map(to_json),
        }
    }
}

fn to_wire<T: Serialize>(wire: &T) -> String {
    serde_json::to_string(wire).unwrap_or_else(|e| {
        tracing::error!("Failed to serialize JSON-RPC message: {}", e);
        String::new()
    })
}

fn error_from_json(value: &JsonValue) -> Result<RpcError, DecodeError> {
    let object = value
        .as_object()
        .ok_or_else(|| DecodeError::Structure("error member is not an object".to_string()))?;

    let code = object
        .get("code")
        .and_then(JsonValue::as_i64)
        .map(ErrorCode::from_code)
        .unwrap_or(ErrorCode::InternalError);
    let message = object
        .get("message")
        .and_then(JsonValue::as_str)
        .unwrap_or_default();

    let mut error = RpcError::new(code, message);
    if let Some(time) = object.get("time").and_then(JsonValue::as_i64) {
        error = error.with_time(time);
    }
    if let Some(source) = object.get("source").filter(|s| !s.is_null()) {
        error = error.with_source(from_json(source.clone()));
    }
    Ok(error)
}

impl JsonCodec {
    fn decode_unit(&self, raw: JsonValue) -> Unit {
        let source = from_json(raw.clone());

        let object = match raw {
            JsonValue::Object(object) => object,
            _ => {
                return Unit::invalid(
                    RequestId::Null,
                    RpcError::invalid_request("Invalid Request").with_source(source),
                )
            }
        };

        let id = match id_from_json(object.get("id")) {
            Some(id) => id,
            None => {
                return Unit::invalid(
                    RequestId::Null,
                    RpcError::invalid_request("Invalid Request. Bad id").with_source(source),
                )
            }
        };

        let version = object.get("jsonrpc").and_then(JsonValue::as_str);
        let method = object.get("method").and_then(JsonValue::as_str);
        let (version, method) = match (version, method) {
            (Some(version), Some(method)) => (version, method),
            _ => {
                return Unit::invalid(
                    id,
                    RpcError::invalid_request("Invalid Request").with_source(source),
                )
            }
        };

        if let Err(error) = validate_method_name(method) {
            return Unit::invalid(id, error.with_source(source));
        }

        if version != JSONRPC_VERSION {
            return Unit::invalid(
                id,
                RpcError::new(
                    ErrorCode::VersionMismatch,
                    "Server JSON-RPC version mismatch. Expected '2.0'",
                )
                .with_source(source),
            );
        }

        let params = match object.get("params") {
            None | Some(JsonValue::Null) => None,
            Some(JsonValue::Array(values)) => Some(Params::Positional(
                values.iter().cloned().map(from_json).collect(),
            )),
            Some(JsonValue::Object(values)) => Some(Params::Named(
                values
                    .iter()
                    .map(|(name, value)| (name.clone(), from_json(value.clone())))
                    .collect(),
            )),
            Some(_) => {
                return Unit::invalid(
                    id,
                    RpcError::invalid_request("Invalid Request. Params must be an array or object")
                        .with_source(source),
                )
            }
        };

        Unit::Call(Request::new(method, params, id))
    }

    fn decode_part(&self, raw: &JsonValue) -> Result<ResponsePart, DecodeError> {
        let object = raw
            .as_object()
            .ok_or_else(|| DecodeError::Structure("response part is not an object".to_string()))?;

        let id = match object.get("id") {
            None | Some(JsonValue::Null) => RequestId::Null,
            Some(JsonValue::String(s)) => RequestId::String(s.clone()),
            Some(JsonValue::Number(n)) => n
                .as_i64()
                .map(RequestId::Number)
                .unwrap_or_else(|| RequestId::String(n.to_string())),
            Some(other) => {
                return Err(DecodeError::Structure(format!(
                    "unsupported response id {}",
                    other
                )))
            }
        };

        if let Some(error) = object.get("error").filter(|e| !e.is_null()) {
            return Ok(ResponsePart::failure(error_from_json(error)?, id));
        }

        match object.get("result") {
            Some(result) => Ok(ResponsePart::success(from_json(result.clone()), id)),
            None => Ok(ResponsePart::empty(id)),
        }
    }
}

impl WireCodec for JsonCodec {
    fn protocol(&self) -> Protocol {
        Protocol::JsonRpc
    }

    fn encode_value(&self, value: &Value) -> String {
        to_json(value).to_string()
    }

    fn decode_value(&self, fragment: &str) -> Result<Value, DecodeError> {
        let raw: JsonValue = serde_json::from_str(fragment)
            .map_err(|e| DecodeError::Malformed(e.to_string()))?;
        Ok(from_json(raw))
    }

    fn encode_request(&self, request: &Request) -> String {
        to_wire(&WireRequest {
            jsonrpc: JSONRPC_VERSION,
            method: &request.method,
            params: request.params.as_ref().map(params_to_json),
            id: (!request.is_notification()).then_some(&request.id),
        })
    }

    fn decode_inbound(&self, payload: &str) -> Result<Inbound, RpcError> {
        let payload = payload.trim();
        if payload.is_empty() {
            return Err(RpcError::invalid_request("Invalid Request"));
        }

        let raw: JsonValue =
            serde_json::from_str(payload).map_err(|_| RpcError::parse_error("Request parse error"))?;

        match raw {
            JsonValue::Array(items) => {
                if items.is_empty() {
                    return Err(RpcError::invalid_request("Invalid Request. Empty batch"));
                }
                Ok(Inbound::Batch(
                    items.into_iter().map(|item| self.decode_unit(item)).collect(),
                ))
            }
            other => Ok(Inbound::Single(self.decode_unit(other))),
        }
    }

    fn encode_response(&self, part: &ResponsePart) -> String {
        let error = part.error.as_ref().map(WireError::from);
        let result = if error.is_some() {
            None
        } else {
            part.result.as_ref().map(to_json)
        };
        to_wire(&WireResponse {
            jsonrpc: JSONRPC_VERSION,
            result,
            error,
            id: &part.id,
        })
    }

    fn decode_responses(&self, payload: &str) -> Result<Vec<ResponsePart>, DecodeError> {
        let raw: JsonValue = serde_json::from_str(payload.trim())
            .map_err(|e| DecodeError::Malformed(e.to_string()))?;

        match raw {
            JsonValue::Array(items) => items.iter().map(|item| self.decode_part(item)).collect(),
            other => Ok(vec![self.decode_part(&other)?]),
        }
    }
}
