//! XML-RPC codec
//!
//! Follows the XML-RPC grammar with two extensions: an `<id>` element carrying
//! the correlation id (right after `<methodName>` in calls and right after
//! the opening `<methodResponse>` in responses), and a `<batch>` wrapper for
//! several calls or responses in one payload. Neither is part of the official
//! XML-RPC specification.

pub mod escape;
pub mod tree;
pub mod value;

use super::{DecodeError, Inbound, Unit, WireCodec};
use crate::models::{
    validate_method_name, ErrorCode, Params, Request, RequestId, ResponsePart, RpcError,
};
use crate::{Protocol, Value};
use escape::escape;
use tree::Element;

#[derive(Debug, Clone, Copy, Default)]
pub struct XmlCodec;

fn write_id(id: &RequestId, out: &mut String) {
    let value = match id {
        RequestId::Number(n) => Value::Int(*n),
        RequestId::String(s) => Value::Str(s.clone()),
        RequestId::Null => return,
    };
    out.push_str("<id>");
    value::write_value(&value, out);
    out.push_str("</id>");
}

/// Read an `<id>` element; both a typed `<value>` and bare text are accepted
fn read_id(element: Option<&Element>) -> Result<RequestId, DecodeError> {
    let Some(element) = element else {
        return Ok(RequestId::Null);
    };

    if let Some(typed) = element.child("value") {
        return match value::read_value(typed)? {
            Value::Int(n) => Ok(RequestId::Number(n)),
            Value::Str(s) => Ok(RequestId::String(s)),
            Value::Nil => Ok(RequestId::Null),
            other => Err(DecodeError::Structure(format!(
                "id cannot be of type {}",
                other.kind()
            ))),
        };
    }

    let text = element.text.trim();
    if text.is_empty() {
        Ok(RequestId::Null)
    } else if let Ok(n) = text.parse::<i64>() {
        Ok(RequestId::Number(n))
    } else {
        Ok(RequestId::String(text.to_string()))
    }
}

impl XmlCodec {
    fn decode_call(&self, element: &Element) -> Unit {
        if element.name != "methodCall" {
            return Unit::invalid(
                RequestId::Null,
                RpcError::invalid_request(format!(
                    "Invalid Request. Unexpected <{}>",
                    element.name
                )),
            );
        }

        let id = match read_id(element.child("id")) {
            Ok(id) => id,
            Err(e) => {
                return Unit::invalid(
                    RequestId::Null,
                    RpcError::invalid_request(format!("Invalid Request. {}", e)),
                )
            }
        };

        let method = match element.child("methodName") {
            Some(name) => name.text.trim().to_string(),
            None => {
                return Unit::invalid(id, RpcError::invalid_request("Invalid Request"));
            }
        };

        let source = Request::new(method.clone(), None, id.clone()).to_value();

        if let Err(error) = validate_method_name(&method) {
            return Unit::invalid(id, error.with_source(source));
        }

        let mut params = Vec::new();
        if let Some(list) = element.child("params") {
            for param in list.children_named("param") {
                let decoded = param
                    .child("value")
                    .ok_or_else(|| DecodeError::InvalidParameter("<param> without <value>".into()))
                    .and_then(value::read_value);
                match decoded {
                    Ok(v) => params.push(v),
                    Err(e) => {
                        return Unit::invalid(
                            id,
                            RpcError::invalid_params(e.to_string()).with_source(source),
                        )
                    }
                }
            }
        }

        let params = if params.is_empty() {
            None
        } else {
            Some(Params::Positional(params))
        };
        Unit::Call(Request::new(method, params, id))
    }

    fn decode_part(&self, element: &Element) -> Result<ResponsePart, DecodeError> {
        if element.name != "methodResponse" {
            return Err(DecodeError::Structure(format!(
                "expected <methodResponse>, found <{}>",
                element.name
            )));
        }

        let id = read_id(element.child("id"))?;

        if let Some(fault) = element.child("fault") {
            let value = fault
                .child("value")
                .ok_or_else(|| DecodeError::Structure("<fault> without <value>".into()))
                .and_then(value::read_value)?;
            let code = value
                .get("faultCode")
                .and_then(Value::as_i64)
                .map(ErrorCode::from_code)
                .unwrap_or(ErrorCode::InternalError);
            let message = value
                .get("faultString")
                .and_then(Value::as_str)
                .unwrap_or_default();
            return Ok(ResponsePart::failure(RpcError::new(code, message), id));
        }

        let result = element
            .child("params")
            .and_then(|params| params.child("param"))
            .and_then(|param| param.child("value"));

        match result {
            Some(result) => Ok(ResponsePart::success(value::read_value(result)?, id)),
            None => Ok(ResponsePart::empty(id)),
        }
    }
}

impl WireCodec for XmlCodec {
    fn protocol(&self) -> Protocol {
        Protocol::XmlRpc
    }

    fn encode_value(&self, value: &Value) -> String {
        value::encode(value)
    }

    fn decode_value(&self, fragment: &str) -> Result<Value, DecodeError> {
        value::read_value(&tree::parse(fragment)?)
    }

    /// Named params have no XML-RPC spelling and travel as one struct param
    fn encode_request(&self, request: &Request) -> String {
        let mut out = String::from("<methodCall><methodName>");
        out.push_str(&escape(&request.method));
        out.push_str("</methodName>");
        write_id(&request.id, &mut out);
        out.push_str("<params>");
        match &request.params {
            Some(Params::Positional(values)) => {
                for v in values {
                    out.push_str("<param>");
                    value::write_value(v, &mut out);
                    out.push_str("</param>");
                }
            }
            Some(named @ Params::Named(_)) => {
                out.push_str("<param>");
                value::write_value(&named.to_value(), &mut out);
                out.push_str("</param>");
            }
            None => {}
        }
        out.push_str("</params></methodCall>");
        out
    }

    fn decode_inbound(&self, payload: &str) -> Result<Inbound, RpcError> {
        if payload.trim().is_empty() {
            return Err(RpcError::invalid_request("Invalid Request"));
        }

        let root =
            tree::parse(payload).map_err(|e| RpcError::parse_error(format!("Request parse error: {}", e)))?;

        match root.name.as_str() {
            "batch" => {
                if root.children.is_empty() {
                    return Err(RpcError::invalid_request("Invalid Request. Empty batch"));
                }
                Ok(Inbound::Batch(
                    root.children.iter().map(|call| self.decode_call(call)).collect(),
                ))
            }
            _ => Ok(Inbound::Single(self.decode_call(&root))),
        }
    }

    fn encode_response(&self, part: &ResponsePart) -> String {
        let mut out = String::from("<methodResponse>");
        write_id(&part.id, &mut out);
        if let Some(error) = &part.error {
            let fault = Value::structure([
                ("faultCode", Value::Int(error.code.code())),
                ("faultString", Value::Str(error.message.clone())),
            ]);
            out.push_str("<fault>");
            value::write_value(&fault, &mut out);
            out.push_str("</fault>");
        } else if let Some(result) = &part.result {
            out.push_str("<params><param>");
            value::write_value(result, &mut out);
            out.push_str("</param></params>");
        }
        out.push_str("</methodResponse>");
        out
    }

    fn decode_responses(&self, payload: &str) -> Result<Vec<ResponsePart>, DecodeError> {
        let root = tree::parse(payload)?;

        if root.name == "batch" {
            root.children
                .iter()
                .map(|part| self.decode_part(part))
                .collect()
        } else {
            Ok(vec![self.decode_part(&root)?])
        }
    }
}
