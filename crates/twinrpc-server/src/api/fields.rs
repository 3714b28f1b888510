//! Form field capabilities

use crate::dispatch::{CapabilityResult, CapabilitySet};
use twinrpc_core::Value;

pub const SUSPICIOUS_FIELD: &str = "Chupacabra";

pub fn register(set: &mut CapabilitySet) {
    set.register("getFields", &[], get_fields)
        .register("saveFields", &["field1", "field2", "field3"], save_fields);
}

/// Current values of the three form fields
pub fn get_fields(_args: Vec<Value>) -> CapabilityResult {
    Ok(Value::structure([
        ("field1", Value::from("mimi")),
        ("field2", Value::from("pipi")),
        ("field3", Value::from("popo")),
    ]))
}

pub fn save_fields(args: Vec<Value>) -> CapabilityResult {
    let field = |index: usize| args.get(index).map(text).unwrap_or_default();
    let (field1, field2, field3) = (field(0), field(1), field(2));

    if field2 == SUSPICIOUS_FIELD {
        return Ok(Value::from("Chupacabra detected on second field!!!"));
    }

    Ok(Value::from(format!(
        "Hey dude! We are really got your fields: field1=[{}]; field2=[{}]; field3=[{}]",
        field1, field2, field3
    )))
}

/// Render a scalar the way it would be shown in a form
fn text(value: &Value) -> String {
    match value {
        Value::Str(s) => s.clone(),
        Value::Int(n) => n.to_string(),
        Value::Double(d) => d.to_string(),
        Value::Bool(true) => "1".to_string(),
        Value::DateTime(dt) => dt.to_rfc3339(),
        Value::Bool(false) | Value::Nil => String::new(),
        other => other.kind().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_fields() {
        let fields = get_fields(Vec::new()).unwrap();
        assert_eq!(fields.get("field1"), Some(&Value::from("mimi")));
        assert_eq!(fields.get("field3"), Some(&Value::from("popo")));
    }

    #[test]
    fn test_save_fields() {
        let reply = save_fields(vec![Value::from("a"), Value::Int(2), Value::Nil]).unwrap();
        assert_eq!(
            reply,
            Value::from("Hey dude! We are really got your fields: field1=[a]; field2=[2]; field3=[]")
        );
    }

    #[test]
    fn test_save_fields_detects_chupacabra() {
        let reply = save_fields(vec![
            Value::from("a"),
            Value::from(SUSPICIOUS_FIELD),
            Value::from("c"),
        ])
        .unwrap();
        assert_eq!(reply, Value::from("Chupacabra detected on second field!!!"));
    }
}
