use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
/// Errors produced while decoding JSON text.
///
/// Every variant carries the byte position where decoding stopped.
pub enum SyntaxError {
    #[error("unexpected end of input at byte {position}")]
    /// The input ended before a value was complete.
    UnexpectedEnd {
        /// Byte offset of the end of input.
        position: usize,
    },

    #[error("unterminated string starting at byte {position}")]
    /// A string literal had no closing quote.
    UnterminatedString {
        /// Byte offset of the opening quote.
        position: usize,
    },

    #[error("expected {expected} at byte {position}, found {found:?}")]
    /// A structural character was missing (`,` `:` `]` `}` or a string key).
    UnexpectedChar {
        /// What the grammar required at this point.
        expected: &'static str,
        /// The character actually found.
        found: char,
        /// Byte offset of `found`.
        position: usize,
    },

    #[error("malformed number {text:?} at byte {position}")]
    /// A numeric token could not be converted.
    InvalidNumber {
        /// The offending token text.
        text: String,
        /// Byte offset of the token.
        position: usize,
    },

    #[error("unrecognized token at byte {position}")]
    /// Neither a value start nor one of `true`, `false`, `null`.
    UnknownLiteral {
        /// Byte offset of the token.
        position: usize,
    },

    #[error("trailing characters after JSON value at byte {position}")]
    /// [`crate::from_str`] found more than whitespace after the document.
    TrailingCharacters {
        /// Byte offset of the first trailing character.
        position: usize,
    },

    #[error("invalid UTF-8 at byte {position}")]
    /// [`crate::from_slice`] input was not UTF-8.
    InvalidUtf8 {
        /// Byte offset of the first invalid sequence.
        position: usize,
    },

    #[error("nesting deeper than {limit} levels at byte {position}")]
    /// Arrays/objects nested beyond [`crate::MAX_DEPTH`].
    TooDeep {
        /// The configured limit.
        limit: usize,
        /// Byte offset of the container that crossed the limit.
        position: usize,
    },
}

impl SyntaxError {
    /// Byte position associated with the error.
    pub fn position(&self) -> usize {
        match self {
            Self::UnexpectedEnd { position }
            | Self::UnterminatedString { position }
            | Self::UnexpectedChar { position, .. }
            | Self::InvalidNumber { position, .. }
            | Self::UnknownLiteral { position }
            | Self::TrailingCharacters { position }
            | Self::InvalidUtf8 { position }
            | Self::TooDeep { position, .. } => *position,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("expected {expected}, got {found}{}", key_suffix(.key))]
/// A decoded value did not have the shape the caller asked for.
pub struct ShapeError {
    /// The requested kind (e.g. `"array"`).
    pub expected: &'static str,
    /// The kind actually present (e.g. `"object"`), or `"missing"` for an absent key.
    pub found: &'static str,
    /// The object key being looked up, when the error came from [`crate::Value::field`].
    pub key: Option<String>,
}

impl ShapeError {
    /// A value of kind `found` where `expected` was required.
    pub fn new(expected: &'static str, found: &'static str) -> Self {
        Self {
            expected,
            found,
            key: None,
        }
    }

    /// A required object key was absent.
    pub fn missing_key(key: &str) -> Self {
        Self {
            expected: "field",
            found: "missing",
            key: Some(key.to_string()),
        }
    }
}

fn key_suffix(key: &Option<String>) -> String {
    key.as_deref()
        .map(|key| format!(" for key `{key}`"))
        .unwrap_or_default()
}
