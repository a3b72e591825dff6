//! `TextEdit` decoding and application.
//!
//! Formatting replies are lists of edits whose ranges all refer to the *original* document.
//! Applying them back to front keeps every later range valid.

use crate::position::{LspPosition, LspRange, Utf16Converter};
use lspop_json::{ShapeError, Value};
use std::cmp::Reverse;

#[derive(Debug, Clone, PartialEq, Eq)]
/// A protocol `TextEdit`.
pub struct TextEdit {
    /// Range to replace, in UTF-16 positions.
    pub range: LspRange,
    /// Replacement text; may contain newlines.
    pub new_text: String,
}

impl TextEdit {
    /// Decode a `TextEdit` object. A missing `newText` is an empty replacement.
    pub fn from_value(value: &Value) -> Result<Self, ShapeError> {
        Ok(Self {
            range: LspRange::from_value(value.field("range")?)?,
            new_text: value
                .get("newText")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        })
    }
}

/// Decode a `TextEdit[] | null` result. Malformed entries are skipped.
pub fn text_edits_from_value(value: &Value) -> Result<Vec<TextEdit>, ShapeError> {
    if value.is_null() {
        return Ok(Vec::new());
    }
    Ok(value
        .expect_array()?
        .iter()
        .filter_map(|edit| TextEdit::from_value(edit).ok())
        .collect())
}

/// Order edits for sequential application: last start position first. Edits sharing a start keep
/// their reverse arrival order, so an insertion listed first ends up first in the text.
pub fn application_order(edits: &[TextEdit]) -> Vec<&TextEdit> {
    let mut ordered = edits.iter().enumerate().collect::<Vec<_>>();
    ordered.sort_by_key(|(index, edit)| (Reverse(edit.range.start), Reverse(*index)));
    ordered.into_iter().map(|(_, edit)| edit).collect()
}

/// Byte offset of a protocol position inside `text`. Positions past the end of a line clamp to
/// the line end; lines past the end of the text clamp to the text end.
pub fn byte_offset(text: &str, position: LspPosition) -> usize {
    let mut line_start = 0;
    for _ in 0..position.line {
        match text[line_start..].find('\n') {
            Some(newline) => line_start += newline + 1,
            None => return text.len(),
        }
    }

    let line_end = text[line_start..]
        .find('\n')
        .map_or(text.len(), |newline| line_start + newline);
    let line = text[line_start..line_end]
        .strip_suffix('\r')
        .unwrap_or(&text[line_start..line_end]);

    let column = Utf16Converter::from_lsp(line, position);
    line_start
        + line
            .char_indices()
            .nth(column)
            .map_or(line.len(), |(offset, _)| offset)
}

/// Apply `edits` to `text` and return the result.
pub fn apply_text_edits(text: &str, edits: &[TextEdit]) -> String {
    let mut resolved = application_order(edits)
        .into_iter()
        .map(|edit| {
            let start = byte_offset(text, edit.range.start);
            let end = byte_offset(text, edit.range.end);
            (start.min(end), start.max(end), edit.new_text.as_str())
        })
        .collect::<Vec<_>>();
    // Offsets are computed against the original text; apply back to front.
    resolved.sort_by_key(|(start, _, _)| Reverse(*start));

    let mut out = text.to_string();
    for (start, end, new_text) in resolved {
        out.replace_range(start..end, new_text);
    }
    out
}
