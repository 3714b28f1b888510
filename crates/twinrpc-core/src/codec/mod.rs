//! Value codecs for the two wire formats
//!
//! Each protocol provides a [`WireCodec`] that converts between [`Value`] and
//! its wire grammar, and that frames requests and responses. The server uses
//! `decode_inbound` / `encode_response`, the client uses `encode_request` /
//! `decode_responses`.

pub mod json;
pub mod xml;

use crate::models::{Request, RequestId, ResponsePart, RpcError};
use crate::{Protocol, Value};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    #[error("Malformed payload: {0}")]
    Malformed(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Unexpected structure: {0}")]
    Structure(String),
}

/// One element of an inbound payload, as seen by the server
#[derive(Debug, Clone, PartialEq)]
pub enum Unit {
    /// A structurally valid request
    Call(Request),
    /// A unit that failed decoding or validation. `id` is echoed when it
    /// could be recovered.
    Invalid { id: RequestId, error: RpcError },
}

impl Unit {
    pub fn invalid(id: RequestId, error: RpcError) -> Self {
        Unit::Invalid { id, error }
    }
}

/// A decoded inbound payload
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Single(Unit),
    Batch(Vec<Unit>),
}

impl Inbound {
    pub fn into_units(self) -> Vec<Unit> {
        match self {
            Inbound::Single(unit) => vec![unit],
            Inbound::Batch(units) => units,
        }
    }

    pub fn is_batch(&self) -> bool {
        matches!(self, Inbound::Batch(_))
    }
}

/// Wire grammar for one protocol
pub trait WireCodec: Send + Sync {
    fn protocol(&self) -> Protocol;

    /// Encode a single value fragment
    fn encode_value(&self, value: &Value) -> String;

    /// Decode a single value fragment
    fn decode_value(&self, fragment: &str) -> Result<Value, DecodeError>;

    /// Encode one request (never wrapped)
    fn encode_request(&self, request: &Request) -> String;

    /// Parse a whole inbound payload. Payload-level failures (empty body,
    /// parse error, empty batch) are returned as `Err`; unit-level failures
    /// are carried in [`Unit::Invalid`].
    fn decode_inbound(&self, payload: &str) -> Result<Inbound, RpcError>;

    /// Encode one response part (never wrapped)
    fn encode_response(&self, part: &ResponsePart) -> String;

    /// Parse a whole response payload into its parts, in wire order
    fn decode_responses(&self, payload: &str) -> Result<Vec<ResponsePart>, DecodeError>;
}

/// Encode a native value for the given protocol
pub fn encode_value(value: &Value, protocol: Protocol) -> String {
    protocol.codec().encode_value(value)
}

/// Decode a wire fragment for the given protocol
pub fn decode_value(fragment: &str, protocol: Protocol) -> Result<Value, DecodeError> {
    protocol.codec().decode_value(fragment)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn samples() -> Vec<Value> {
        vec![
            Value::Int(42),
            Value::Int(-7),
            Value::Double(2.5),
            Value::Bool(true),
            Value::Bool(false),
            Value::Str("a <b> & \"c\" 'd'\n\u{1}".to_string()),
            Value::Nil,
            Value::Array(vec![Value::Int(1), Value::Str("two".to_string())]),
            Value::structure([
                ("name", Value::from("moo")),
                ("nested", Value::Array(vec![Value::Nil, Value::Double(0.5)])),
            ]),
        ]
    }

    #[test]
    fn test_round_trip_both_protocols() {
        for protocol in [Protocol::JsonRpc, Protocol::XmlRpc] {
            for value in samples() {
                let encoded = encode_value(&value, protocol);
                let decoded = decode_value(&encoded, protocol).unwrap();
                assert_eq!(decoded, value, "{} via {}", encoded, protocol);
            }
        }
    }

    #[test]
    fn test_xml_round_trip_rich_kinds() {
        let when = Utc.with_ymd_and_hms(2012, 7, 30, 13, 45, 9).unwrap();
        for value in [Value::DateTime(when), Value::Bytes(vec![0, 159, 146, 150, 255])] {
            let encoded = encode_value(&value, Protocol::XmlRpc);
            assert_eq!(decode_value(&encoded, Protocol::XmlRpc).unwrap(), value);
        }
    }

    #[test]
    fn test_xml_date_truncated_to_seconds() {
        let when = Utc.with_ymd_and_hms(2020, 1, 2, 3, 4, 5).unwrap()
            + chrono::Duration::milliseconds(678);
        let encoded = encode_value(&Value::DateTime(when), Protocol::XmlRpc);
        let decoded = decode_value(&encoded, Protocol::XmlRpc).unwrap();
        assert_eq!(
            decoded,
            Value::DateTime(Utc.with_ymd_and_hms(2020, 1, 2, 3, 4, 5).unwrap())
        );
    }
}
