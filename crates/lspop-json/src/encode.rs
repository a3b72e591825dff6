//! JSON encoder for outgoing protocol messages.

use crate::value::Value;
use std::fmt::{self, Write};

/// Integers below this magnitude are printed without a fractional part.
const EXACT_INTEGER_LIMIT: f64 = 9_007_199_254_740_992.0;

/// Encode `value` as compact JSON text.
pub fn to_string(value: &Value) -> String {
    let mut out = String::new();
    // Writing into a `String` cannot fail.
    let _ = write_value(&mut out, value);
    out
}

/// Encode `value` as compact JSON into any [`fmt::Write`] sink.
pub fn write_value<W: Write>(out: &mut W, value: &Value) -> fmt::Result {
    match value {
        Value::Null => out.write_str("null"),
        Value::Bool(true) => out.write_str("true"),
        Value::Bool(false) => out.write_str("false"),
        Value::Number(n) => write_number(out, *n),
        Value::String(s) => write_string(out, s),
        Value::Array(items) => {
            out.write_char('[')?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.write_char(',')?;
                }
                write_value(out, item)?;
            }
            out.write_char(']')
        }
        Value::Object(map) => {
            out.write_char('{')?;
            for (i, (key, item)) in map.iter().enumerate() {
                if i > 0 {
                    out.write_char(',')?;
                }
                write_string(out, key)?;
                out.write_char(':')?;
                write_value(out, item)?;
            }
            out.write_char('}')
        }
    }
}

fn write_number<W: Write>(out: &mut W, n: f64) -> fmt::Result {
    if !n.is_finite() {
        // JSON has no NaN/Infinity.
        return out.write_str("null");
    }
    if n.fract() == 0.0 && n.abs() < EXACT_INTEGER_LIMIT {
        return write!(out, "{}", n as i64);
    }
    write!(out, "{n}")
}

fn write_string<W: Write>(out: &mut W, s: &str) -> fmt::Result {
    out.write_char('"')?;
    for c in s.chars() {
        match c {
            '"' => out.write_str("\\\"")?,
            '\\' => out.write_str("\\\\")?,
            '\n' => out.write_str("\\n")?,
            '\r' => out.write_str("\\r")?,
            '\t' => out.write_str("\\t")?,
            '\u{8}' => out.write_str("\\b")?,
            '\u{c}' => out.write_str("\\f")?,
            c if (c as u32) < 0x20 => write!(out, "\\u{:04x}", c as u32)?,
            c => out.write_char(c)?,
        }
    }
    out.write_char('"')
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_value(f, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object;

    #[test]
    fn test_request_ids_have_no_fraction() {
        assert_eq!(to_string(&Value::from(42u64)), "42");
        assert_eq!(to_string(&Value::from(-7i64)), "-7");
        assert_eq!(to_string(&Value::Number(0.5)), "0.5");
        assert_eq!(to_string(&Value::Number(f64::NAN)), "null");
    }

    #[test]
    fn test_string_escaping() {
        let value = Value::from("say \"hi\"\\\n\r\t\u{1}");
        assert_eq!(to_string(&value), r#""say \"hi\"\\\n\r\t\u0001""#);
    }

    #[test]
    fn test_nested_object() {
        let value = object! {
            "jsonrpc" => "2.0",
            "id" => 1u64,
            "params" => object! { "items" => vec![Value::Null, Value::Bool(false)] },
        };
        assert_eq!(
            value.to_string(),
            r#"{"id":1,"jsonrpc":"2.0","params":{"items":[null,false]}}"#
        );
    }
}
