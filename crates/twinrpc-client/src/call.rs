//! Call specifications

use std::fmt;
use std::sync::Arc;

use twinrpc_core::models::{Params, RequestId};
use twinrpc_core::Value;

/// Where a result is delivered, recorded when the call is made
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallContext {
    pub id: RequestId,
    pub method: String,
    pub scope: String,
}

/// One-shot completion for a single call
pub type Completion = Box<dyn FnOnce(&CallContext, Value) + Send>;

/// Client-wide result handler for a method
pub type ResultHandler = Arc<dyn Fn(&CallContext, Value) + Send + Sync>;

/// Transform applied to a method's result before its callback runs
pub type ResponseHook = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// How the correlation id of a call is chosen
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum IdSpec {
    /// A fresh UUID
    #[default]
    Auto,
    Explicit(RequestId),
    /// No id, no response
    Notification,
}

pub struct CallSpec {
    pub method: String,
    pub params: Option<Params>,
    pub id: IdSpec,
    pub scope: Option<String>,
    /// Position inside a batch, lower goes first
    pub batch_order: i64,
    pub(crate) completion: Option<Completion>,
}

impl CallSpec {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            params: None,
            id: IdSpec::Auto,
            scope: None,
            batch_order: 0,
            completion: None,
        }
    }

    pub fn params(mut self, params: Params) -> Self {
        self.params = Some(params);
        self
    }

    pub fn positional(self, values: Vec<Value>) -> Self {
        self.params(Params::Positional(values))
    }

    pub fn named<I, K>(self, members: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        self.params(Params::named(members))
    }

    /// Use a caller-chosen id. A null id makes this a notification.
    pub fn id(mut self, id: impl Into<RequestId>) -> Self {
        let id = id.into();
        self.id = if id.is_null() {
            IdSpec::Notification
        } else {
            IdSpec::Explicit(id)
        };
        self
    }

    pub fn notification(mut self) -> Self {
        self.id = IdSpec::Notification;
        self
    }

    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn batch_order(mut self, order: i64) -> Self {
        self.batch_order = order;
        self
    }

    pub fn on_result<F>(mut self, completion: F) -> Self
    where
        F: FnOnce(&CallContext, Value) + Send + 'static,
    {
        self.completion = Some(Box::new(completion));
        self
    }

    pub fn is_notification(&self) -> bool {
        matches!(self.id, IdSpec::Notification)
    }
}

impl fmt::Debug for CallSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallSpec")
            .field("method", &self.method)
            .field("params", &self.params)
            .field("id", &self.id)
            .field("scope", &self.scope)
            .field("batch_order", &self.batch_order)
            .field("completion", &self.completion.is_some())
            .finish()
    }
}
