//! Pending-call registry

use std::collections::HashMap;

use crate::call::Completion;
use twinrpc_core::models::RequestId;

/// A call waiting for its response
pub struct PendingCall {
    pub method: String,
    pub scope: String,
    pub completion: Option<Completion>,
}

/// Calls keyed by correlation id. Each entry is removed exactly once, when
/// its response arrives. Entries for calls that are never answered stay until
/// the client is dropped.
#[derive(Default)]
pub struct PendingRegistry {
    calls: HashMap<RequestId, PendingCall>,
}

impl PendingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a call; hands it back if the id is already pending
    pub fn register(&mut self, id: RequestId, call: PendingCall) -> Result<(), PendingCall> {
        if self.calls.contains_key(&id) {
            return Err(call);
        }
        self.calls.insert(id, call);
        Ok(())
    }

    pub fn take(&mut self, id: &RequestId) -> Option<PendingCall> {
        self.calls.remove(id)
    }

    pub fn contains(&self, id: &RequestId) -> bool {
        self.calls.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}
