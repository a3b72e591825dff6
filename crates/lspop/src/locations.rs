//! Normalisation of definition/reference results.
//!
//! Servers answer with `Location`, `Location[]`, `LocationLink`, `LocationLink[]` or `null`.
//! All of them become a flat list of [`Location`]s.

use crate::position::LspRange;
use crate::uri::file_uri_to_path;
use lspop_json::Value;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
/// A target document and range.
pub struct Location {
    /// Document URI, usually `file://`.
    pub uri: String,
    /// Target range. Navigation uses `range.start`.
    pub range: LspRange,
}

impl Location {
    /// Local path of the target, for `file://` URIs.
    pub fn path(&self) -> Option<PathBuf> {
        file_uri_to_path(&self.uri)
    }

    fn from_value(value: &Value) -> Option<Self> {
        if let (Some(uri), Some(range)) = (
            value.get("uri").and_then(Value::as_str),
            value.get("range").and_then(|r| LspRange::from_value(r).ok()),
        ) {
            return Some(Self {
                uri: uri.to_string(),
                range,
            });
        }

        // LocationLink
        let uri = value.get("targetUri").and_then(Value::as_str)?;
        let range = value
            .get("targetSelectionRange")
            .or_else(|| value.get("targetRange"))
            .and_then(|r| LspRange::from_value(r).ok())?;
        Some(Self {
            uri: uri.to_string(),
            range,
        })
    }
}

/// Flatten any location-shaped result. Unreadable entries are skipped.
pub fn locations_from_value(value: &Value) -> Vec<Location> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items.iter().filter_map(Location::from_value).collect(),
        single => Location::from_value(single).into_iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lspop_json::from_str;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_single_location() {
        let value = from_str(
            r#"{"uri":"file:///src/a.rs","range":{"start":{"line":4,"character":2},"end":{"line":4,"character":9}}}"#,
        )
        .unwrap();
        let locations = locations_from_value(&value);
        assert_eq!(locations.len(), 1);
        assert_eq!(locations[0].uri, "file:///src/a.rs");
        assert_eq!(locations[0].range.start.line, 4);
        assert_eq!(locations[0].path(), Some(PathBuf::from("/src/a.rs")));
    }

    #[test]
    fn test_location_links_prefer_selection_range() {
        let value = from_str(
            r#"[{"targetUri":"file:///b.rs",
                 "targetRange":{"start":{"line":1,"character":0},"end":{"line":9,"character":0}},
                 "targetSelectionRange":{"start":{"line":2,"character":4},"end":{"line":2,"character":8}}},
                {"bogus":true}]"#,
        )
        .unwrap();
        let locations = locations_from_value(&value);
        assert_eq!(locations.len(), 1);
        assert_eq!(locations[0].range.start.character, 4);
    }

    #[test]
    fn test_null_is_empty() {
        assert_eq!(locations_from_value(&Value::Null), vec![]);
    }
}
