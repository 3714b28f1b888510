//! Payload dispatch
//!
//! A payload is decoded into units, each unit is validated, resolved against
//! the capability set and invoked, and the resulting response parts are
//! joined into one reply. Failures stay inside their unit.

use futures::future::join_all;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;

use super::capability::CapabilitySet;
use twinrpc_core::batch;
use twinrpc_core::models::{Params, Request, RequestId, ResponsePart, RpcError, ServerConfig};
use twinrpc_core::{Protocol, Unit, Value};

pub struct Dispatcher {
    capabilities: CapabilitySet,
    protocol: Protocol,
    expose_error_source: bool,
    parallel_batch: bool,
}

impl Dispatcher {
    pub fn new(capabilities: CapabilitySet, config: &ServerConfig) -> Self {
        Self {
            capabilities,
            protocol: config.protocol,
            expose_error_source: config.expose_error_source,
            parallel_batch: config.parallel_batch,
        }
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }

    /// Process a raw request body. A body that is not UTF-8 is a parse error.
    pub async fn handle_bytes(&self, body: &[u8]) -> String {
        match std::str::from_utf8(body) {
            Ok(payload) => self.handle_payload(payload).await,
            Err(e) => self.reject(RpcError::parse_error(format!("Request parse error: {}", e))),
        }
    }

    /// Process a raw payload and return the reply body. Empty when every unit
    /// was a notification.
    pub async fn handle_payload(&self, payload: &str) -> String {
        let inbound = match self.protocol.codec().decode_inbound(payload) {
            Ok(inbound) => inbound,
            Err(error) => return self.reject(error),
        };

        let units = inbound.into_units();
        tracing::debug!("Dispatching {} unit(s)", units.len());
        let parts = self.dispatch_units(units).await;
        self.encode_parts(parts)
    }

    /// Reply to a payload that never got as far as its units
    fn reject(&self, error: RpcError) -> String {
        tracing::debug!("Rejected payload: {}", error);
        self.encode_parts(vec![ResponsePart::failure(error, RequestId::Null)])
    }

    fn encode_parts(&self, parts: Vec<ResponsePart>) -> String {
        let codec = self.protocol.codec();
        let fragments = parts
            .into_iter()
            .map(|part| codec.encode_response(&self.redact(part)));
        batch::join(fragments, self.protocol).unwrap_or_default()
    }

    async fn dispatch_units(&self, units: Vec<Unit>) -> Vec<ResponsePart> {
        if self.parallel_batch && units.len() > 1 {
            return join_all(units.into_iter().map(|unit| self.dispatch_unit(unit)))
                .await
                .into_iter()
                .flatten()
                .collect();
        }

        let mut parts = Vec::with_capacity(units.len());
        for unit in units {
            if let Some(part) = self.dispatch_unit(unit).await {
                parts.push(part);
            }
        }
        parts
    }

    /// One unit in, at most one response part out
    pub async fn dispatch_unit(&self, unit: Unit) -> Option<ResponsePart> {
        let request = match unit {
            Unit::Invalid { id, error } => {
                tracing::debug!("Invalid unit (id {}): {}", id, error);
                return Some(ResponsePart::failure(error, id));
            }
            Unit::Call(request) => request,
        };

        let id = request.id.clone();
        let method = request.method.clone();

        match self.invoke(request).await {
            Ok(_) if id.is_null() => None,
            Ok(result) => Some(ResponsePart::success(result, id)),
            Err(error) if id.is_null() => {
                tracing::warn!("Notification [{}] failed: {}", method, error);
                None
            }
            Err(error) => {
                tracing::debug!("Call [{}] (id {}) failed: {}", method, id, error);
                Some(ResponsePart::failure(error, id))
            }
        }
    }

    async fn invoke(&self, request: Request) -> Result<Value, RpcError> {
        let source = request.to_value();
        let Request { method, params, .. } = request;

        let capability = self
            .capabilities
            .get(&method)
            .ok_or_else(|| RpcError::method_not_found(&method).with_source(source.clone()))?;

        let params = match self.protocol {
            Protocol::XmlRpc => unfold_struct_param(params, capability.param_names()),
            Protocol::JsonRpc => params,
        };
        let args = normalize(params, capability.param_names());

        if let Some(validator) = self.capabilities.validator() {
            validator
                .validate(&method, capability.param_names(), &args)
                .map_err(|msg| RpcError::invalid_params(msg).with_source(source.clone()))?;
        }

        tracing::debug!("Invoking [{}] with {} arg(s)", method, args.len());

        match AssertUnwindSafe(capability.invoke(args)).catch_unwind().await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(RpcError::from(e).with_source(source)),
            Err(_) => {
                tracing::error!("Capability [{}] panicked", method);
                Err(RpcError::server_error(format!("Capability [{}] panicked", method))
                    .with_source(source))
            }
        }
    }

    fn redact(&self, part: ResponsePart) -> ResponsePart {
        if self.expose_error_source {
            return part;
        }
        ResponsePart {
            error: part.error.map(RpcError::redacted),
            ..part
        }
    }
}

/// XML-RPC has no named params, so a caller sends them as one struct param.
/// A lone struct whose members are all declared names of a capability taking
/// several params is read back as named params.
pub fn unfold_struct_param(params: Option<Params>, param_names: &[String]) -> Option<Params> {
    let mut values = match params {
        Some(Params::Positional(values)) => values,
        other => return other,
    };

    let unfolds = param_names.len() > 1
        && matches!(values.as_slice(), [Value::Struct(members)]
            if !members.is_empty() && members.keys().all(|name| param_names.contains(name)));

    match values.pop() {
        Some(Value::Struct(members)) if unfolds => Some(Params::Named(members)),
        Some(value) => {
            values.push(value);
            Some(Params::Positional(values))
        }
        None => Some(Params::Positional(values)),
    }
}

/// Reduce params to positional arguments. Named params follow the declared
/// order; missing names become nil and extra names are dropped.
pub fn normalize(params: Option<Params>, param_names: &[String]) -> Vec<Value> {
    match params {
        None => Vec::new(),
        Some(Params::Positional(values)) => values,
        Some(Params::Named(mut members)) => param_names
            .iter()
            .map(|name| members.shift_remove(name).unwrap_or_default())
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::capability::{CapabilityError, RequirePresence};
    use std::sync::Arc;
    use twinrpc_core::models::ErrorCode;

    fn capabilities() -> CapabilitySet {
        let mut set = CapabilitySet::new();
        set.register("subtract", &["minuend", "subtrahend"], |args| {
            let a = args.first().and_then(Value::as_i64).unwrap_or_default();
            let b = args.get(1).and_then(Value::as_i64).unwrap_or_default();
            Ok(Value::Int(a - b))
        })
        .register("fail", &["message"], |args| {
            let msg = args.first().and_then(Value::as_str).unwrap_or("failed");
            Err(CapabilityError::Failed(msg.to_string()))
        })
        .register("panics", &[], |_| panic!("capability bug"));
        set
    }

    fn dispatcher(protocol: Protocol) -> Dispatcher {
        let config = ServerConfig {
            protocol,
            ..ServerConfig::default()
        };
        Dispatcher::new(capabilities(), &config)
    }

    async fn json_reply(payload: &str) -> serde_json::Value {
        let reply = dispatcher(Protocol::JsonRpc).handle_payload(payload).await;
        serde_json::from_str(&reply).unwrap()
    }

    #[tokio::test]
    async fn test_positional_call() {
        let reply =
            json_reply(r#"{"jsonrpc":"2.0","method":"subtract","params":[42,23],"id":1}"#).await;
        assert_eq!(reply["result"], 19);
        assert_eq!(reply["id"], 1);
    }

    #[tokio::test]
    async fn test_named_params_follow_declaration_order() {
        let reply = json_reply(
            r#"{"jsonrpc":"2.0","method":"subtract","params":{"subtrahend":23,"minuend":42,"extra":1},"id":"n"}"#,
        )
        .await;
        assert_eq!(reply["result"], 19);
        assert_eq!(reply["id"], "n");
    }

    #[tokio::test]
    async fn test_unknown_method() {
        let reply =
            json_reply(r#"{"jsonrpc":"2.0","method":"doesNotExist","id":"abc"}"#).await;
        assert_eq!(reply["error"]["code"], -32601);
        assert_eq!(reply["error"]["message"], "Method [doesNotExist] not found");
        assert_eq!(reply["id"], "abc");
        assert!(reply["error"].get("source").is_none());
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let reply = json_reply("[]").await;
        assert_eq!(reply["error"]["code"], -32600);
        assert!(reply["id"].is_null());
    }

    #[tokio::test]
    async fn test_reserved_prefix_rejected() {
        let mut set = capabilities();
        set.register("rpc.internal", &[], |_| Ok(Value::from("reached")));
        let dispatcher = Dispatcher::new(set, &ServerConfig::default());

        let reply = dispatcher
            .handle_payload(r#"{"jsonrpc":"2.0","method":"rpc.internal","id":1}"#)
            .await;
        let reply: serde_json::Value = serde_json::from_str(&reply).unwrap();
        assert_eq!(reply["error"]["code"], ErrorCode::ReservedPrefix.code());
        assert!(reply.get("result").is_none());
    }

    #[tokio::test]
    async fn test_notifications_get_no_part() {
        let dispatcher = dispatcher(Protocol::JsonRpc);
        let reply = dispatcher
            .handle_payload(
                r#"[{"jsonrpc":"2.0","method":"subtract","params":[1,1]},
                    {"jsonrpc":"2.0","method":"doesNotExist"}]"#,
            )
            .await;
        assert_eq!(reply, "");
    }

    #[tokio::test]
    async fn test_batch_keeps_unit_order() {
        let reply = json_reply(
            r#"[{"jsonrpc":"2.0","method":"subtract","params":[5,1],"id":1},
                {"jsonrpc":"2.0","method":"subtract","params":[1]},
                1,
                {"jsonrpc":"2.0","method":"fail","params":["nope"],"id":2},
                {"jsonrpc":"2.0","method":"subtract","params":[9,1],"id":3}]"#,
        )
        .await;

        let parts = reply.as_array().unwrap();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0]["result"], 4);
        assert_eq!(parts[1]["error"]["code"], -32600);
        assert!(parts[1]["id"].is_null());
        assert_eq!(parts[2]["error"]["code"], -32099);
        assert_eq!(parts[2]["error"]["message"], "nope");
        assert_eq!(parts[3]["result"], 8);
    }

    #[tokio::test]
    async fn test_sequential_batch_matches_parallel() {
        let config = ServerConfig {
            parallel_batch: false,
            ..ServerConfig::default()
        };
        let dispatcher = Dispatcher::new(capabilities(), &config);
        let payload = r#"[{"jsonrpc":"2.0","method":"subtract","params":[3,1],"id":1},
                          {"jsonrpc":"2.0","method":"subtract","params":[7,1],"id":2}]"#;

        let sequential = dispatcher.handle_payload(payload).await;
        let parallel = self::dispatcher(Protocol::JsonRpc)
            .handle_payload(payload)
            .await;
        assert_eq!(sequential, parallel);
    }

    #[tokio::test]
    async fn test_panicking_capability_is_contained() {
        let reply = json_reply(
            r#"[{"jsonrpc":"2.0","method":"panics","id":1},
                {"jsonrpc":"2.0","method":"subtract","params":[2,1],"id":2}]"#,
        )
        .await;
        let parts = reply.as_array().unwrap();
        assert_eq!(parts[0]["error"]["code"], -32099);
        assert_eq!(parts[1]["result"], 1);
    }

    #[tokio::test]
    async fn test_parse_error() {
        let reply = json_reply(r#"{"jsonrpc":"2.0","method""#).await;
        assert_eq!(reply["error"]["code"], -32700);
        assert!(reply["id"].is_null());
    }

    #[tokio::test]
    async fn test_expose_error_source() {
        let config = ServerConfig {
            expose_error_source: true,
            ..ServerConfig::default()
        };
        let dispatcher = Dispatcher::new(capabilities(), &config);
        let reply = dispatcher
            .handle_payload(r#"{"jsonrpc":"2.0","method":"missing","id":1}"#)
            .await;
        let reply: serde_json::Value = serde_json::from_str(&reply).unwrap();
        assert_eq!(reply["error"]["source"]["method"], "missing");
    }

    #[tokio::test]
    async fn test_validator_rejects_missing_param() {
        let mut set = capabilities();
        set.set_validator(Arc::new(
            RequirePresence::new().require("subtract", &["subtrahend"]),
        ));
        let dispatcher = Dispatcher::new(set, &ServerConfig::default());

        let reply = dispatcher
            .handle_payload(r#"{"jsonrpc":"2.0","method":"subtract","params":{"minuend":1},"id":1}"#)
            .await;
        let reply: serde_json::Value = serde_json::from_str(&reply).unwrap();
        assert_eq!(reply["error"]["code"], -32602);
    }

    #[tokio::test]
    async fn test_xml_fault() {
        let dispatcher = dispatcher(Protocol::XmlRpc);
        let reply = dispatcher
            .handle_payload(
                "<?xml version=\"1.0\"?><methodCall><methodName>fail</methodName>\
                 <id><value><int>7</int></value></id>\
                 <params><param><value><string>boom</string></value></param></params></methodCall>",
            )
            .await;

        let parts = Protocol::XmlRpc.codec().decode_responses(&reply).unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].id, RequestId::Number(7));
        assert_eq!(parts[0].error.as_ref().map(|e| e.message.as_str()), Some("boom"));
    }

    #[tokio::test]
    async fn test_deeply_nested_xml_is_parse_error() {
        let depth = 40_000;
        let payload = format!(
            "<methodCall><methodName>fail</methodName><id>1</id><params><param>{}<value>x</value>{}</param></params></methodCall>",
            "<value><array><data>".repeat(depth),
            "</data></array></value>".repeat(depth),
        );

        let reply = dispatcher(Protocol::XmlRpc).handle_payload(&payload).await;
        let parts = Protocol::XmlRpc.codec().decode_responses(&reply).unwrap();
        assert_eq!(parts[0].id, RequestId::Null);
        assert_eq!(
            parts[0].error.as_ref().map(|e| e.code),
            Some(ErrorCode::ParseError)
        );
    }

    #[tokio::test]
    async fn test_xml_struct_param_unfolds_to_named() {
        let dispatcher = dispatcher(Protocol::XmlRpc);
        let request = Request::new(
            "subtract",
            Some(Params::named([
                ("subtrahend", Value::Int(2)),
                ("minuend", Value::Int(10)),
            ])),
            RequestId::Number(4),
        );
        let payload = Protocol::XmlRpc.codec().encode_request(&request);

        let reply = dispatcher.handle_payload(&payload).await;
        let parts = Protocol::XmlRpc.codec().decode_responses(&reply).unwrap();
        assert_eq!(parts[0].result, Some(Value::Int(8)));
    }

    #[tokio::test]
    async fn test_invalid_utf8_body_is_parse_error() {
        let reply = dispatcher(Protocol::JsonRpc)
            .handle_bytes(b"{\"jsonrpc\":\"2.0\",\"method\":\"f\xff\",\"id\":1}")
            .await;
        let reply: serde_json::Value = serde_json::from_str(&reply).unwrap();
        assert_eq!(reply["error"]["code"], -32700);
        assert!(reply["id"].is_null());
    }

    #[test]
    fn test_unfold_struct_param() {
        let names = vec!["a".to_string(), "b".to_string()];
        let lone = |value: Value| Some(Params::Positional(vec![value]));

        assert_eq!(
            unfold_struct_param(lone(Value::structure([("b", Value::Int(2))])), &names),
            Some(Params::named([("b", Value::Int(2))]))
        );

        // Unknown member names and single-param capabilities keep the struct as is
        let foreign = lone(Value::structure([("c", Value::Int(3))]));
        assert_eq!(unfold_struct_param(foreign.clone(), &names), foreign);
        let single = lone(Value::structure([("a", Value::Int(1))]));
        assert_eq!(unfold_struct_param(single.clone(), &names[..1]), single);

        let two = Some(Params::Positional(vec![Value::Int(1), Value::Int(2)]));
        assert_eq!(unfold_struct_param(two.clone(), &names), two);
        assert_eq!(unfold_struct_param(None, &names), None);
    }

    #[test]
    fn test_normalize() {
        let names = vec!["a".to_string(), "b".to_string()];
        assert!(normalize(None, &names).is_empty());
        assert_eq!(
            normalize(Some(Params::named([("b", Value::Int(2))])), &names),
            vec![Value::Nil, Value::Int(2)]
        );
        assert_eq!(
            normalize(Some(Params::Positional(vec![Value::Int(1)])), &names),
            vec![Value::Int(1)]
        );
    }
}
