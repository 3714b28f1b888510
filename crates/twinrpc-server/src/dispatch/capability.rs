//! Capability registration

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use twinrpc_core::models::RpcError;
use twinrpc_core::Value;

/// Failure raised by a capability
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CapabilityError {
    #[error("{0}")]
    InvalidParams(String),

    #[error("{0}")]
    Failed(String),
}

impl From<CapabilityError> for RpcError {
    fn from(error: CapabilityError) -> Self {
        match error {
            CapabilityError::InvalidParams(msg) => RpcError::invalid_params(msg),
            CapabilityError::Failed(msg) => RpcError::server_error(msg),
        }
    }
}

pub type CapabilityResult = std::result::Result<Value, CapabilityError>;

/// A callable method exposed by the server
#[async_trait]
pub trait Capability: Send + Sync {
    /// Declared parameter names, used to map named params onto positions
    fn param_names(&self) -> &[String];

    async fn invoke(&self, args: Vec<Value>) -> CapabilityResult;
}

/// Adapts a synchronous closure into a [`Capability`]
pub struct FnCapability<F> {
    param_names: Vec<String>,
    func: F,
}

impl<F> FnCapability<F>
where
    F: Fn(Vec<Value>) -> CapabilityResult + Send + Sync + 'static,
{
    pub fn new(param_names: &[&str], func: F) -> Self {
        Self {
            param_names: param_names.iter().map(|name| name.to_string()).collect(),
            func,
        }
    }
}

#[async_trait]
impl<F> Capability for FnCapability<F>
where
    F: Fn(Vec<Value>) -> CapabilityResult + Send + Sync + 'static,
{
    fn param_names(&self) -> &[String] {
        &self.param_names
    }

    async fn invoke(&self, args: Vec<Value>) -> CapabilityResult {
        (self.func)(args)
    }
}

/// Checks normalized arguments before a capability is invoked.
/// A rejection is reported as `Invalid params`.
pub trait ParamValidator: Send + Sync {
    fn validate(&self, method: &str, param_names: &[String], args: &[Value]) -> Result<(), String>;
}

/// Rejects calls that leave a required parameter nil
#[derive(Debug, Clone, Default)]
pub struct RequirePresence {
    required: HashMap<String, Vec<String>>,
}

impl RequirePresence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn require(mut self, method: &str, names: &[&str]) -> Self {
        self.required.insert(
            method.to_string(),
            names.iter().map(|name| name.to_string()).collect(),
        );
        self
    }
}

impl ParamValidator for RequirePresence {
    fn validate(&self, method: &str, param_names: &[String], args: &[Value]) -> Result<(), String> {
        let Some(required) = self.required.get(method) else {
            return Ok(());
        };

        for name in required {
            let present = param_names
                .iter()
                .position(|declared| declared == name)
                .and_then(|index| args.get(index))
                .is_some_and(|value| !value.is_nil());
            if !present {
                return Err(format!("Parameter [{}] of [{}] is required", name, method));
            }
        }
        Ok(())
    }
}

/// Name to capability table, built once at startup and read-only afterwards
#[derive(Default, Clone)]
pub struct CapabilitySet {
    entries: HashMap<String, Arc<dyn Capability>>,
    validator: Option<Arc<dyn ParamValidator>>,
}

impl CapabilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a synchronous handler under `name`
    pub fn register<F>(&mut self, name: &str, param_names: &[&str], func: F) -> &mut Self
    where
        F: Fn(Vec<Value>) -> CapabilityResult + Send + Sync + 'static,
    {
        self.insert(name, Arc::new(FnCapability::new(param_names, func)))
    }

    pub fn insert(&mut self, name: &str, capability: Arc<dyn Capability>) -> &mut Self {
        if self.entries.insert(name.to_string(), capability).is_some() {
            tracing::warn!("Capability [{}] registered twice, keeping the last one", name);
        }
        self
    }

    pub fn set_validator(&mut self, validator: Arc<dyn ParamValidator>) -> &mut Self {
        self.validator = Some(validator);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Capability>> {
        self.entries.get(name)
    }

    pub fn validator(&self) -> Option<&Arc<dyn ParamValidator>> {
        self.validator.as_ref()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
