//! Response model

use super::error::RpcError;
use super::request::RequestId;
use crate::Value;

/// One part of a (possibly batched) response
#[derive(Debug, Clone, PartialEq)]
pub struct ResponsePart {
    pub id: RequestId,
    pub result: Option<Value>,
    pub error: Option<RpcError>,
}

impl ResponsePart {
    pub fn success(result: Value, id: RequestId) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(error: RpcError, id: RequestId) -> Self {
        Self {
            id,
            result: None,
            error: Some(error),
        }
    }

    /// A bare envelope with neither result nor error
    pub fn empty(id: RequestId) -> Self {
        Self {
            id,
            result: None,
            error: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.result.is_none() && self.error.is_none()
    }
}
