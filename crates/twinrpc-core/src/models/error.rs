//! Protocol error taxonomy

use chrono::Utc;
use std::fmt;

use crate::Value;

/// Error codes, mirroring the reserved JSON-RPC range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,
    /// Uncaught capability failure
    ServerError,
    ReservedPrefix,
    /// JSON-RPC only
    VersionMismatch,
    /// Any code received from a peer that is not in the fixed taxonomy
    Other(i64),
}

impl ErrorCode {
    pub fn code(&self) -> i64 {
        match self {
            ErrorCode::ParseError => -32700,
            ErrorCode::InvalidRequest => -32600,
            ErrorCode::MethodNotFound => -32601,
            ErrorCode::InvalidParams => -32602,
            ErrorCode::InternalError => -32603,
            ErrorCode::ServerError => -32099,
            ErrorCode::ReservedPrefix => -32098,
            ErrorCode::VersionMismatch => -32097,
            ErrorCode::Other(code) => *code,
        }
    }

    pub fn from_code(code: i64) -> Self {
        match code {
            -32700 => ErrorCode::ParseError,
            -32600 => ErrorCode::InvalidRequest,
            -32601 => ErrorCode::MethodNotFound,
            -32602 => ErrorCode::InvalidParams,
            -32603 => ErrorCode::InternalError,
            -32099 => ErrorCode::ServerError,
            -32098 => ErrorCode::ReservedPrefix,
            -32097 => ErrorCode::VersionMismatch,
            other => ErrorCode::Other(other),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// An error carried inside a response part
#[derive(Debug, Clone, PartialEq)]
pub struct RpcError {
    pub code: ErrorCode,
    pub message: String,
    /// Creation time, unix seconds
    pub time: i64,
    /// The offending request, if exposed
    pub source: Option<Value>,
}

impl RpcError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        let mut message = message.into();
        if message.trim().is_empty() {
            message = "Unknown error".to_string();
        }

        Self {
            code,
            message,
            time: Utc::now().timestamp(),
            source: None,
        }
    }

    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ParseError, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, message)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            ErrorCode::MethodNotFound,
            format!("Method [{}] not found", method),
        )
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidParams, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    pub fn server_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ServerError, message)
    }

    pub fn with_source(mut self, source: Value) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_time(mut self, time: i64) -> Self {
        self.time = time;
        self
    }

    /// Drop the attached source
    pub fn redacted(mut self) -> Self {
        self.source = None;
        self
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RPC error {}: {}", self.code, self.message)
    }
}

impl std::error::Error for RpcError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_message_replaced() {
        let err = RpcError::new(ErrorCode::InternalError, "   ");
        assert_eq!(err.message, "Unknown error");
    }

    #[test]
    fn test_code_round_trip() {
        for code in [
            ErrorCode::ParseError,
            ErrorCode::InvalidRequest,
            ErrorCode::MethodNotFound,
            ErrorCode::InvalidParams,
            ErrorCode::InternalError,
            ErrorCode::ServerError,
            ErrorCode::ReservedPrefix,
            ErrorCode::VersionMismatch,
        ] {
            assert_eq!(ErrorCode::from_code(code.code()), code);
        }
        assert_eq!(ErrorCode::from_code(-32000), ErrorCode::Other(-32000));
    }

    #[test]
    fn test_redaction_clears_source() {
        let err = RpcError::server_error("boom").with_source(Value::from("req"));
        assert!(err.source.is_some());
        assert!(err.redacted().source.is_none());
    }
}
