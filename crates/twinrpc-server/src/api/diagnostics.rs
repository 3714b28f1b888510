//! Capabilities for probing a running server

use crate::dispatch::{CapabilityError, CapabilityResult, CapabilitySet};
use twinrpc_core::Value;

pub fn register(set: &mut CapabilitySet) {
    set.register("echo", &["value"], echo)
        .register("fail", &["message"], fail);
}

pub fn echo(mut args: Vec<Value>) -> CapabilityResult {
    if args.is_empty() {
        return Ok(Value::Nil);
    }
    Ok(args.swap_remove(0))
}

/// Always raises, with `message` as the failure text
pub fn fail(args: Vec<Value>) -> CapabilityResult {
    let message = args
        .first()
        .and_then(Value::as_str)
        .unwrap_or("Requested failure");
    Err(CapabilityError::Failed(message.to_string()))
}
