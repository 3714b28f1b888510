//! Request model

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::{ErrorCode, RpcError};
use crate::Value;

/// Methods starting with this prefix are reserved for the protocol itself
pub const RESERVED_PREFIX: &str = "rpc.";

static METHOD_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("method name pattern is valid")
});

/// Correlation id (string, number, or null for notifications)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
    #[default]
    Null,
}

impl RequestId {
    pub fn is_null(&self) -> bool {
        matches!(self, RequestId::Null)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{}", n),
            RequestId::String(s) => write!(f, "{}", s),
            RequestId::Null => write!(f, "null"),
        }
    }
}

impl From<i64> for RequestId {
    fn from(id: i64) -> Self {
        RequestId::Number(id)
    }
}

impl From<&str> for RequestId {
    fn from(id: &str) -> Self {
        RequestId::String(id.to_string())
    }
}

impl From<String> for RequestId {
    fn from(id: String) -> Self {
        RequestId::String(id)
    }
}

/// Call parameters, either by position or by name
#[derive(Debug, Clone, PartialEq)]
pub enum Params {
    Positional(Vec<Value>),
    Named(IndexMap<String, Value>),
}

impl Params {
    pub fn len(&self) -> usize {
        match self {
            Params::Positional(values) => values.len(),
            Params::Named(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Build named params from `(name, value)` pairs
    pub fn named<I, K>(members: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Params::Named(members.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// The params as a single value, used when attaching a failing request as error source
    pub fn to_value(&self) -> Value {
        match self {
            Params::Positional(values) => Value::Array(values.clone()),
            Params::Named(values) => Value::Struct(values.clone()),
        }
    }
}

impl From<Vec<Value>> for Params {
    fn from(values: Vec<Value>) -> Self {
        Params::Positional(values)
    }
}

/// A single remote call
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: String,
    pub params: Option<Params>,
    pub id: RequestId,
}

impl Request {
    pub fn new(method: impl Into<String>, params: Option<Params>, id: RequestId) -> Self {
        Self {
            method: method.into(),
            params,
            id,
        }
    }

    /// Create a request that expects no response
    pub fn notification(method: impl Into<String>, params: Option<Params>) -> Self {
        Self::new(method, params, RequestId::Null)
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_null()
    }

    /// Check the method name against the reserved prefix and identifier grammar
    pub fn validate_method(&self) -> Result<(), RpcError> {
        validate_method_name(&self.method)
    }

    /// Describe this request as a value, for attaching to errors
    pub fn to_value(&self) -> Value {
        let id = match &self.id {
            RequestId::Number(n) => Value::Int(*n),
            RequestId::String(s) => Value::Str(s.clone()),
            RequestId::Null => Value::Nil,
        };

        Value::structure([
            ("method", Value::Str(self.method.clone())),
            (
                "params",
                self.params.as_ref().map(Params::to_value).unwrap_or(Value::Nil),
            ),
            ("id", id),
        ])
    }
}

/// Validate a method name
pub fn validate_method_name(method: &str) -> Result<(), RpcError> {
    if method.is_empty() {
        return Err(RpcError::new(ErrorCode::InvalidRequest, "Invalid Request"));
    }

    if method.starts_with(RESERVED_PREFIX) {
        return Err(RpcError::new(
            ErrorCode::ReservedPrefix,
            "Illegal method name. Method cannot start with 'rpc.'",
        ));
    }

    if !METHOD_NAME.is_match(method) {
        return Err(RpcError::new(ErrorCode::InvalidRequest, "Invalid Request"));
    }

    Ok(())
}
