//! Protocol positions.
//!
//! Language servers count columns in UTF-16 code units while hosts address text by `char`.
//! Everything crossing the wire goes through [`Utf16Converter`].

use lspop_json::{ShapeError, Value, object};

/// A protocol position: 0-based line and UTF-16 column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct LspPosition {
    /// Line number (0-based).
    pub line: u32,
    /// Column in UTF-16 code units (0-based).
    pub character: u32,
}

impl LspPosition {
    /// Create a new position.
    pub fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }

    /// Decode `{ "line": .., "character": .. }`.
    pub fn from_value(value: &Value) -> Result<Self, ShapeError> {
        Ok(Self {
            line: value.field("line")?.expect_u64()? as u32,
            character: value.field("character")?.expect_u64()? as u32,
        })
    }

    /// Encode as a protocol `Position` object.
    pub fn to_value(self) -> Value {
        object! { "line" => self.line, "character" => self.character }
    }
}

/// A half-open protocol range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct LspRange {
    /// Start (inclusive).
    pub start: LspPosition,
    /// End (exclusive).
    pub end: LspPosition,
}

impl LspRange {
    /// Create a new range.
    pub fn new(start: LspPosition, end: LspPosition) -> Self {
        Self { start, end }
    }

    /// Decode `{ "start": Position, "end": Position }`.
    pub fn from_value(value: &Value) -> Result<Self, ShapeError> {
        Ok(Self {
            start: LspPosition::from_value(value.field("start")?)?,
            end: LspPosition::from_value(value.field("end")?)?,
        })
    }

    /// Encode as a protocol `Range` object.
    pub fn to_value(self) -> Value {
        object! { "start" => self.start.to_value(), "end" => self.end.to_value() }
    }
}

/// Conversions between `char` columns and UTF-16 columns within a single line.
pub struct Utf16Converter;

impl Utf16Converter {
    /// Number of UTF-16 code units needed for `text`.
    pub fn utf16_len(text: &str) -> usize {
        text.encode_utf16().count()
    }

    /// Convert a `char` column into a UTF-16 column.
    pub fn char_to_utf16(line_text: &str, char_column: usize) -> usize {
        line_text
            .chars()
            .take(char_column)
            .map(char::len_utf16)
            .sum()
    }

    /// Convert a UTF-16 column into a `char` column.
    ///
    /// A column pointing into the middle of a surrogate pair rounds up to the next `char`.
    /// Columns past the end clamp to the line length.
    pub fn utf16_to_char(line_text: &str, utf16_column: usize) -> usize {
        let mut units = 0;
        let mut chars = 0;
        for ch in line_text.chars() {
            if units >= utf16_column {
                break;
            }
            units += ch.len_utf16();
            chars += 1;
        }
        chars
    }

    /// Build a protocol position from a host `(line, char column)` pair.
    pub fn to_lsp(line_text: &str, line: usize, char_column: usize) -> LspPosition {
        LspPosition::new(line as u32, Self::char_to_utf16(line_text, char_column) as u32)
    }

    /// Resolve the `char` column of a protocol position against its line text.
    pub fn from_lsp(line_text: &str, position: LspPosition) -> usize {
        Self::utf16_to_char(line_text, position.character as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lspop_json::from_str;

    #[test]
    fn test_utf16_len() {
        assert_eq!(Utf16Converter::utf16_len("abc"), 3);
        assert_eq!(Utf16Converter::utf16_len("你好"), 2);
        assert_eq!(Utf16Converter::utf16_len("👋"), 2);
    }

    #[test]
    fn test_emoji_column() {
        let line = "let 👋 = x";
        assert_eq!(Utf16Converter::to_lsp(line, 3, 5).character, 6);
        assert_eq!(Utf16Converter::from_lsp(line, LspPosition::new(3, 6)), 5);
        // Inside the surrogate pair.
        assert_eq!(Utf16Converter::utf16_to_char(line, 5), 5);
    }

    #[test]
    fn test_past_end_clamps() {
        assert_eq!(Utf16Converter::utf16_to_char("ab", 40), 2);
        assert_eq!(Utf16Converter::char_to_utf16("ab", 40), 2);
    }

    #[test]
    fn test_roundtrip_every_column() {
        let text = "hello 你好 👋 world";
        for column in 0..=text.chars().count() {
            let utf16 = Utf16Converter::char_to_utf16(text, column);
            assert_eq!(Utf16Converter::utf16_to_char(text, utf16), column);
        }
    }

    #[test]
    fn test_range_from_value() {
        let value = from_str(
            r#"{"start":{"line":1,"character":2},"end":{"line":3,"character":4}}"#,
        )
        .unwrap();
        let range = LspRange::from_value(&value).unwrap();
        assert_eq!(range, LspRange::new(LspPosition::new(1, 2), LspPosition::new(3, 4)));
        assert_eq!(range.to_value(), value);
    }

    #[test]
    fn test_position_missing_field() {
        let value = from_str(r#"{"line":1}"#).unwrap();
        let err = LspPosition::from_value(&value).unwrap_err();
        assert_eq!(err.found, "missing");
        assert_eq!(err.key.as_deref(), Some("character"));
    }
}
