#![warn(missing_docs)]
//! `lspop-json` - the JSON value engine behind `lspop`.
//!
//! A recursive-descent decoder and a matching encoder for the subset of JSON exchanged with
//! language servers. Decoded documents are a tagged [`Value`] with typed accessors, so protocol
//! code asks for "an array" and gets a [`ShapeError`] instead of a silently missing field.
//!
//! ```
//! use lspop_json::{Value, object};
//!
//! let (value, next) = lspop_json::parse(r#"{"id":1} tail"#, 0).unwrap();
//! assert_eq!(next, 8);
//! assert_eq!(value.get("id").and_then(Value::as_u64), Some(1));
//!
//! let request = object! { "jsonrpc" => "2.0", "id" => 7u64 };
//! assert_eq!(request.to_string(), r#"{"id":7,"jsonrpc":"2.0"}"#);
//! ```

mod encode;
mod error;
mod parse;
mod value;

pub use encode::{to_string, write_value};
pub use error::{ShapeError, SyntaxError};
pub use parse::{MAX_DEPTH, from_slice, from_str, parse};
pub use value::{Map, Value};

/// Build a [`Value::Object`] from `key => value` pairs.
///
/// Values go through `Value::from`, so strings, numbers, booleans, nested values and options
/// can be mixed freely.
#[macro_export]
macro_rules! object {
    () => {
        $crate::Value::Object($crate::Map::new())
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut map = $crate::Map::new();
        $(
            map.insert(::std::string::String::from($key), $crate::Value::from($value));
        )+
        $crate::Value::Object(map)
    }};
}
