use crate::error::ShapeError;
use std::collections::BTreeMap;

/// Object representation. Key order carries no meaning; a sorted map keeps encoding stable.
pub type Map = BTreeMap<String, Value>;

/// A decoded JSON document.
///
/// `Value::Null` is an explicit `null` in the text. An absent key is not a `Value` at all:
/// [`Value::get`] returns `None` for it.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// `null`
    #[default]
    Null,
    /// `true` / `false`
    Bool(bool),
    /// Any JSON number, stored as `f64`.
    Number(f64),
    /// A string with escapes resolved.
    String(String),
    /// An ordered array.
    Array(Vec<Value>),
    /// An object.
    Object(Map),
}

/// Largest integer magnitude an `f64` represents exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

impl Value {
    /// Name of the variant, as used in [`ShapeError`] messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }

    /// Look up `key` when `self` is an object.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Object(map) => map.get(key),
            _ => None,
        }
    }

    /// Mutable lookup of `key` when `self` is an object.
    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        match self {
            Value::Object(map) => map.get_mut(key),
            _ => None,
        }
    }

    /// Insert `key` into an object value. Returns `false` (and does nothing) for non-objects.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> bool {
        match self {
            Value::Object(map) => {
                map.insert(key.into(), value.into());
                true
            }
            _ => false,
        }
    }

    /// Returns `true` for an explicit `null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The boolean payload, if any.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The numeric payload, if any.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The number as a non-negative integer, if it is one exactly.
    pub fn as_u64(&self) -> Option<u64> {
        let n = self.as_f64()?;
        if n >= 0.0 && n.fract() == 0.0 && n <= MAX_SAFE_INTEGER {
            Some(n as u64)
        } else {
            None
        }
    }

    /// The number as a signed integer, if it is one exactly.
    pub fn as_i64(&self) -> Option<i64> {
        let n = self.as_f64()?;
        if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
            Some(n as i64)
        } else {
            None
        }
    }

    /// The string payload, if any.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// The array payload, if any.
    pub fn as_array(&self) -> Option<&Vec<Value>> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// The object payload, if any.
    pub fn as_object(&self) -> Option<&Map> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Mutable object payload, if any.
    pub fn as_object_mut(&mut self) -> Option<&mut Map> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Like [`Value::as_str`], failing with the actual kind.
    pub fn expect_str(&self) -> Result<&str, ShapeError> {
        self.as_str().ok_or_else(|| self.shape_error("string"))
    }

    /// Like [`Value::as_f64`], failing with the actual kind.
    pub fn expect_f64(&self) -> Result<f64, ShapeError> {
        self.as_f64().ok_or_else(|| self.shape_error("number"))
    }

    /// Like [`Value::as_u64`], failing with the actual kind.
    pub fn expect_u64(&self) -> Result<u64, ShapeError> {
        self.as_u64()
            .ok_or_else(|| self.shape_error("non-negative integer"))
    }

    /// Like [`Value::as_bool`], failing with the actual kind.
    pub fn expect_bool(&self) -> Result<bool, ShapeError> {
        self.as_bool().ok_or_else(|| self.shape_error("boolean"))
    }

    /// Like [`Value::as_array`], failing with the actual kind.
    pub fn expect_array(&self) -> Result<&[Value], ShapeError> {
        self.as_array()
            .map(Vec::as_slice)
            .ok_or_else(|| self.shape_error("array"))
    }

    /// Like [`Value::as_object`], failing with the actual kind.
    pub fn expect_object(&self) -> Result<&Map, ShapeError> {
        self.as_object().ok_or_else(|| self.shape_error("object"))
    }

    /// Look up a required key. An absent key reports `found: "missing"` and the key name.
    pub fn field(&self, key: &str) -> Result<&Value, ShapeError> {
        self.expect_object()?
            .get(key)
            .ok_or_else(|| ShapeError::missing_key(key))
    }

    fn shape_error(&self, expected: &'static str) -> ShapeError {
        ShapeError::new(expected, self.kind())
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

macro_rules! impl_from_integer {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Value::Number(value as f64)
                }
            }
        )*
    };
}

impl_from_integer!(i32, i64, u32, u64, usize);

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<&String> for Value {
    fn from(value: &String) -> Self {
        Value::String(value.clone())
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::Array(value)
    }
}

impl From<Map> for Value {
    fn from(value: Map) -> Self {
        Value::Object(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

impl<T: Into<Value>> FromIterator<T> for Value {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Value::Array(iter.into_iter().map(Into::into).collect())
    }
}
