//! XML-RPC value marshalling

use base64::Engine;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;

use super::escape::escape;
use super::tree::Element;
use crate::codec::DecodeError;
use crate::Value;

static INT_TEXT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[+-]?\d+$").expect("int pattern is valid"));

static DOUBLE_TEXT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[+-]?\d+(\.\d+)?$").expect("double pattern is valid"));

// Any prefix of YYYY-MM-DDTHH:MM:SS(.fff), dashes and colons optional,
// with an optional zone suffix.
static DATE_TIME_TEXT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(\d{4})(?:-?(\d{2})(?:-?(\d{2})(?:T(\d{2})(?::?(\d{2})(?::?(\d{2})(?:[.,](\d+))?)?)?)?)?)?(Z|[+-]\d{2}:?\d{2})?$",
    )
    .expect("dateTime pattern is valid")
});

const DATE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

fn invalid(message: impl Into<String>) -> DecodeError {
    DecodeError::InvalidParameter(message.into())
}

/// Append `<value>…</value>` for `value` to `out`
pub fn write_value(value: &Value, out: &mut String) {
    out.push_str("<value>");
    match value {
        Value::Int(i) => out.push_str(&format!("<int>{}</int>", i)),
        Value::Double(d) if d.is_finite() => {
            out.push_str(&format!("<double>{}</double>", format_double(*d)))
        }
        // NaN and infinities have no XML-RPC spelling
        Value::Double(_) | Value::Nil => out.push_str("<nil/>"),
        Value::Bool(b) => out.push_str(if *b {
            "<boolean>1</boolean>"
        } else {
            "<boolean>0</boolean>"
        }),
        Value::Str(s) => {
            out.push_str("<string>");
            out.push_str(&escape(s));
            out.push_str("</string>");
        }
        Value::DateTime(dt) => out.push_str(&format!(
            "<dateTime.iso8601>{}</dateTime.iso8601>",
            clamp_to_four_digit_year(*dt).format(DATE_TIME_FORMAT)
        )),
        Value::Bytes(bytes) => out.push_str(&format!(
            "<base64>{}</base64>",
            base64::engine::general_purpose::STANDARD.encode(bytes)
        )),
        Value::Array(items) => {
            out.push_str("<array><data>");
            for item in items {
                write_value(item, out);
            }
            out.push_str("</data></array>");
        }
        Value::Struct(members) => {
            out.push_str("<struct>");
            for (name, member) in members {
                out.push_str("<member><name>");
                out.push_str(&escape(name));
                out.push_str("</name>");
                write_value(member, out);
                out.push_str("</member>");
            }
            out.push_str("</struct>");
        }
    }
    out.push_str("</value>");
}

/// Encode a value fragment
pub fn encode(value: &Value) -> String {
    let mut out = String::new();
    write_value(value, &mut out);
    out
}

/// The wire format only has four year digits; instants outside years
/// 0000..=9999 are pinned to the nearest representable second.
fn clamp_to_four_digit_year(dt: DateTime<Utc>) -> DateTime<Utc> {
    let earliest = NaiveDate::from_ymd_opt(0, 1, 1).and_then(|d| d.and_hms_opt(0, 0, 0));
    let latest = NaiveDate::from_ymd_opt(9999, 12, 31).and_then(|d| d.and_hms_opt(23, 59, 59));
    match (earliest, latest) {
        (Some(earliest), _) if dt.naive_utc() < earliest => Utc.from_utc_datetime(&earliest),
        (_, Some(latest)) if dt.naive_utc() > latest => Utc.from_utc_datetime(&latest),
        _ => dt,
    }
}

fn format_double(d: f64) -> String {
    // f64 Display never uses exponent notation
    let text = d.to_string();
    if text.contains('.') {
        text
    } else {
        format!("{}.0", text)
    }
}

/// Decode a `<value>` element
pub fn read_value(element: &Element) -> Result<Value, DecodeError> {
    if element.name != "value" {
        return Err(invalid(format!("expected <value>, found <{}>", element.name)));
    }

    let typed = match element.children.as_slice() {
        // Untyped content is a string
        [] => return Ok(Value::Str(element.text.clone())),
        [typed] => typed,
        _ => return Err(invalid("<value> must contain exactly one element")),
    };

    let text = typed.text.trim();
    match typed.name.as_str() {
        "int" | "i4" | "i8" => read_int(text),
        "double" => {
            if !DOUBLE_TEXT.is_match(text) {
                return Err(invalid(format!("'{}' is not a double", text)));
            }
            text.parse::<f64>()
                .map(Value::Double)
                .map_err(|e| invalid(e.to_string()))
        }
        "boolean" => match text {
            "0" => Ok(Value::Bool(false)),
            "1" => Ok(Value::Bool(true)),
            other => Err(invalid(format!("'{}' is not a boolean", other))),
        },
        "string" => Ok(Value::Str(typed.text.clone())),
        "nil" => Ok(Value::Nil),
        "dateTime.iso8601" => read_date_time(text).map(Value::DateTime),
        "base64" => {
            let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
            base64::engine::general_purpose::STANDARD
                .decode(compact)
                .map(Value::Bytes)
                .map_err(|e| invalid(format!("bad base64: {}", e)))
        }
        "array" => {
            let data = typed
                .child("data")
                .ok_or_else(|| invalid("<array> without <data>"))?;
            data.children
                .iter()
                .map(read_value)
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array)
        }
        "struct" => {
            let mut members = IndexMap::new();
            for member in &typed.children {
                if member.name != "member" {
                    return Err(invalid(format!(
                        "unexpected <{}> inside <struct>",
                        member.name
                    )));
                }
                let name = member
                    .child("name")
                    .ok_or_else(|| invalid("<member> without <name>"))?;
                let value = member
                    .child("value")
                    .ok_or_else(|| invalid("<member> without <value>"))?;
                members.insert(name.text.clone(), read_value(value)?);
            }
            Ok(Value::Struct(members))
        }
        other => Err(invalid(format!("unknown element <{}>", other))),
    }
}

/// Integers are checked against their double reading; when the two differ by
/// more than one unit the value overflowed somewhere and is kept as a double.
fn read_int(text: &str) -> Result<Value, DecodeError> {
    if !INT_TEXT.is_match(text) {
        return Err(invalid(format!("'{}' is not an integer", text)));
    }

    let double = text
        .parse::<f64>()
        .map_err(|e| invalid(e.to_string()))?;

    match text.parse::<i64>() {
        Ok(int) if (double.floor() - int as f64).abs() <= 1.0 => Ok(Value::Int(int)),
        _ => Ok(Value::Double(double)),
    }
}

/// Parse a possibly partial ISO-8601 date/time as UTC.
///
/// Missing month and day default to 1, missing time fields to 0.
pub fn read_date_time(text: &str) -> Result<DateTime<Utc>, DecodeError> {
    let caps = DATE_TIME_TEXT
        .captures(text)
        .ok_or_else(|| invalid(format!("'{}' is not an ISO-8601 date", text)))?;

    let field = |index: usize, default: u32| -> u32 {
        caps.get(index)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(default)
    };

    let year: i32 = caps
        .get(1)
        .and_then(|m| m.as_str().parse().ok())
        .ok_or_else(|| invalid("missing year"))?;

    let nanos = caps
        .get(7)
        .map(|m| {
            let digits: String = m.as_str().chars().take(9).collect();
            format!("{:0<9}", digits).parse::<u32>().unwrap_or(0)
        })
        .unwrap_or(0);

    let naive = NaiveDate::from_ymd_opt(year, field(2, 1), field(3, 1))
        .and_then(|date| date.and_hms_nano_opt(field(4, 0), field(5, 0), field(6, 0), nanos))
        .ok_or_else(|| invalid(format!("'{}' is out of range", text)))?;

    let offset_seconds = match caps.get(8).map(|m| m.as_str()) {
        None | Some("Z") => 0,
        Some(zone) => {
            let sign = if zone.starts_with('-') { -1 } else { 1 };
            let digits: String = zone.chars().filter(char::is_ascii_digit).collect();
            let hours: i64 = digits[..2].parse().unwrap_or(0);
            let minutes: i64 = digits[2..].parse().unwrap_or(0);
            sign * (hours * 3600 + minutes * 60)
        }
    };

    Ok(Utc.from_utc_datetime(&(naive - Duration::seconds(offset_seconds))))
}
