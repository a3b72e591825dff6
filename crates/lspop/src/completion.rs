//! Completion candidates, ranking and pagination.
//!
//! [`compute_visible_page`] is the pure core: filter, sort, clamp the selection and scroll so the
//! selection is visible. [`CompletionMenu`] keeps that state between keystrokes.

use crate::position::LspRange;
use lspop_json::{ShapeError, Value};

/// `insertTextFormat` value marking snippet syntax.
const INSERT_TEXT_FORMAT_SNIPPET: u64 = 2;

/// A single completion suggestion as received from the server.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CompletionCandidate {
    /// Text shown in the menu.
    pub label: String,
    /// Text to insert instead of the label. Snippets are already reduced to plain text.
    pub insert_text: Option<String>,
    /// Range the insertion replaces, when the server sent a `textEdit`.
    pub edit_range: Option<LspRange>,
    /// Ordering key overriding the label.
    pub sort_text: Option<String>,
    /// Matching key overriding the label.
    pub filter_text: Option<String>,
    /// Secondary column, e.g. a type signature.
    pub detail: Option<String>,
    /// Protocol `CompletionItemKind`.
    pub kind: Option<u32>,
}

impl CompletionCandidate {
    /// A candidate with only a label.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }

    /// Decode a `CompletionItem`. Only `label` is required.
    ///
    /// `textEdit.newText` wins over `insertText`. For an `InsertReplaceEdit` the insert range is
    /// used.
    pub fn from_value(item: &Value) -> Result<Self, ShapeError> {
        let label = item.field("label")?.expect_str()?.to_string();
        let snippet = item.get("insertTextFormat").and_then(Value::as_u64)
            == Some(INSERT_TEXT_FORMAT_SNIPPET);
        let plain = |text: &str| {
            if snippet {
                snippet_to_plain_text(text)
            } else {
                text.to_string()
            }
        };

        let text_edit = item.get("textEdit");
        let edit_range = text_edit.and_then(|edit| {
            edit.get("range")
                .or_else(|| edit.get("insert"))
                .and_then(|range| LspRange::from_value(range).ok())
        });
        let insert_text = text_edit
            .and_then(|edit| edit.get("newText"))
            .or_else(|| item.get("insertText"))
            .and_then(Value::as_str)
            .map(plain);

        let optional_str = |key: &str| item.get(key).and_then(Value::as_str).map(str::to_string);

        Ok(Self {
            label,
            insert_text,
            edit_range,
            sort_text: optional_str("sortText"),
            filter_text: optional_str("filterText"),
            detail: optional_str("detail"),
            kind: item.get("kind").and_then(Value::as_u64).map(|k| k as u32),
        })
    }

    /// Key used for ordering: `sort_text`, else the label.
    pub fn sort_key(&self) -> &str {
        self.sort_text.as_deref().unwrap_or(&self.label)
    }

    /// Key used for prefix matching: `filter_text`, else the label.
    pub fn filter_key(&self) -> &str {
        self.filter_text.as_deref().unwrap_or(&self.label)
    }

    /// Text to put into the document when this candidate is accepted.
    pub fn text_to_insert(&self) -> &str {
        match self.insert_text.as_deref() {
            Some(text) if !text.is_empty() => text,
            _ => &self.label,
        }
    }
}

/// Decode a completion result: `CompletionItem[]`, `CompletionList` (`{ items }`) or `null`.
/// Items without a label are skipped.
pub fn parse_completion_result(result: &Value) -> Result<Vec<CompletionCandidate>, ShapeError> {
    let items = match result {
        Value::Null => return Ok(Vec::new()),
        Value::Array(items) => items.as_slice(),
        Value::Object(_) => result.field("items")?.expect_array()?,
        other => {
            return Err(ShapeError::new("array or object", other.kind()));
        }
    };
    Ok(items
        .iter()
        .filter_map(|item| CompletionCandidate::from_value(item).ok())
        .collect())
}

/// Reduce snippet syntax to the text it would insert with every placeholder at its default.
///
/// `${1:foo}` becomes `foo`, `${1|a,b|}` becomes `a`, tab stops and variables disappear,
/// `\$` becomes `$`.
pub fn snippet_to_plain_text(snippet: &str) -> String {
    let chars = snippet.chars().collect::<Vec<_>>();
    let mut out = String::with_capacity(snippet.len());
    expand_snippet(&chars, &mut out);
    out
}

fn expand_snippet(chars: &[char], out: &mut String) {
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '\\' if i + 1 < chars.len() => {
                out.push(chars[i + 1]);
                i += 2;
            }
            '$' if chars.get(i + 1) == Some(&'{') => {
                let Some(close) = matching_brace(chars, i + 1) else {
                    // Unbalanced: keep the rest verbatim.
                    out.extend(&chars[i..]);
                    return;
                };
                expand_placeholder(&chars[i + 2..close], out);
                i = close + 1;
            }
            '$' if chars
                .get(i + 1)
                .is_some_and(|c| c.is_ascii_alphanumeric() || *c == '_') =>
            {
                i += 1;
                while chars
                    .get(i)
                    .is_some_and(|c| c.is_ascii_alphanumeric() || *c == '_')
                {
                    i += 1;
                }
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
}

/// Expand the inside of `${...}`.
fn expand_placeholder(content: &[char], out: &mut String) {
    let name_len = content
        .iter()
        .take_while(|c| c.is_ascii_alphanumeric() || **c == '_')
        .count();
    match content.get(name_len) {
        Some(':') => expand_snippet(&content[name_len + 1..], out),
        Some('|') => {
            let choices = &content[name_len + 1..];
            let first = choices
                .iter()
                .take_while(|c| **c != ',' && **c != '|')
                .collect::<String>();
            out.push_str(&first);
        }
        _ => {}
    }
}

fn matching_brace(chars: &[char], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut i = open;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 1,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Filter `all` by `prefix` and sort the result.
///
/// A candidate matches when its filter key contains `prefix`, ignoring case. When nothing matches
/// the whole list is used instead. The sort is stable and compares sort keys byte-wise, so
/// `"Foobar"` orders before `"foo"`.
pub fn filter_and_sort(all: &[CompletionCandidate], prefix: &str) -> Vec<CompletionCandidate> {
    let needle = prefix.to_lowercase();
    let mut matched = all
        .iter()
        .filter(|candidate| candidate.filter_key().to_lowercase().contains(&needle))
        .cloned()
        .collect::<Vec<_>>();
    if matched.is_empty() {
        matched = all.to_vec();
    }
    matched.sort_by(|a, b| a.sort_key().cmp(b.sort_key()));
    matched
}

/// One page of the completion menu.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisiblePage {
    /// Candidates on this page, top to bottom.
    pub candidates: Vec<CompletionCandidate>,
    /// 1-based selection over the whole filtered list; `0` when the list is empty.
    pub selection: usize,
    /// Number of filtered candidates above this page.
    pub scroll_offset: usize,
    /// Number of filtered candidates in total.
    pub total: usize,
}

impl VisiblePage {
    /// Row of the selection within this page.
    pub fn selected_row(&self) -> Option<usize> {
        self.selection
            .checked_sub(self.scroll_offset + 1)
            .filter(|row| *row < self.candidates.len())
    }
}

/// Filter, sort and paginate `all`, returning the page containing `selection`.
///
/// `selection` is 1-based; a value outside `1..=count` resets to the first candidate. The offset
/// moves just enough to show the selection and is clamped to `0..=count - page_size`.
pub fn compute_visible_page(
    all: &[CompletionCandidate],
    prefix: &str,
    selection: usize,
    scroll_offset: usize,
    page_size: usize,
) -> VisiblePage {
    let filtered = filter_and_sort(all, prefix);
    let total = filtered.len();
    if total == 0 {
        return VisiblePage {
            candidates: Vec::new(),
            selection: 0,
            scroll_offset: 0,
            total,
        };
    }

    let page_size = page_size.max(1);
    let selection = clamp_selection(selection, total);
    let scroll_offset = scroll_to(selection, scroll_offset, page_size, total);
    let end = (scroll_offset + page_size).min(total);

    VisiblePage {
        candidates: filtered[scroll_offset..end].to_vec(),
        selection,
        scroll_offset,
        total,
    }
}

fn clamp_selection(selection: usize, count: usize) -> usize {
    if selection == 0 || selection > count {
        1
    } else {
        selection
    }
}

/// Smallest move of `offset` that puts `selection` inside `[offset + 1, offset + page_size]`.
fn scroll_to(selection: usize, offset: usize, page_size: usize, count: usize) -> usize {
    let mut offset = offset;
    if selection > offset + page_size {
        offset = selection - page_size;
    } else if selection <= offset {
        offset = selection.saturating_sub(1);
    }
    offset.min(count.saturating_sub(page_size))
}

/// Completion menu state across keystrokes.
#[derive(Debug, Clone)]
pub struct CompletionMenu {
    all: Vec<CompletionCandidate>,
    prefix: String,
    filtered: Vec<CompletionCandidate>,
    selection: usize,
    scroll_offset: usize,
    page_size: usize,
}

impl Default for CompletionMenu {
    fn default() -> Self {
        Self::new(10)
    }
}

impl CompletionMenu {
    /// An empty, closed menu showing up to `page_size` rows.
    pub fn new(page_size: usize) -> Self {
        Self {
            all: Vec::new(),
            prefix: String::new(),
            filtered: Vec::new(),
            selection: 0,
            scroll_offset: 0,
            page_size: page_size.max(1),
        }
    }

    /// Replace the raw candidate list (a fresh server reply). The selection survives when still
    /// in range.
    pub fn set_candidates(&mut self, candidates: Vec<CompletionCandidate>) {
        self.all = candidates;
        self.refresh();
    }

    /// Update the typed prefix and re-filter.
    pub fn set_prefix(&mut self, prefix: impl Into<String>) {
        self.prefix = prefix.into();
        self.refresh();
    }

    /// Current prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Change how many rows fit on screen. Zero is treated as one.
    pub fn set_page_size(&mut self, page_size: usize) {
        self.page_size = page_size.max(1);
        self.rescroll();
    }

    /// Rows per page.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Move down one row, wrapping from the last candidate to the first.
    pub fn select_next(&mut self) {
        let count = self.filtered.len();
        if count == 0 {
            return;
        }
        self.selection = self.selection % count + 1;
        self.rescroll();
    }

    /// Move up one row, wrapping from the first candidate to the last.
    pub fn select_prev(&mut self) {
        let count = self.filtered.len();
        if count == 0 {
            return;
        }
        self.selection = if self.selection <= 1 {
            count
        } else {
            self.selection - 1
        };
        self.rescroll();
    }

    /// Move down one page, stopping at the last candidate.
    pub fn page_down(&mut self) {
        let count = self.filtered.len();
        if count == 0 {
            return;
        }
        self.selection = (self.selection + self.page_size).min(count);
        self.rescroll();
    }

    /// Move up one page, stopping at the first candidate.
    pub fn page_up(&mut self) {
        if self.filtered.is_empty() {
            return;
        }
        self.selection = self.selection.saturating_sub(self.page_size).max(1);
        self.rescroll();
    }

    /// Jump to a 1-based index, resetting to the first candidate when out of range.
    pub fn select(&mut self, selection: usize) {
        if self.filtered.is_empty() {
            return;
        }
        self.selection = clamp_selection(selection, self.filtered.len());
        self.rescroll();
    }

    /// The highlighted candidate.
    pub fn selected(&self) -> Option<&CompletionCandidate> {
        self.selection
            .checked_sub(1)
            .and_then(|index| self.filtered.get(index))
    }

    /// 1-based selection; `0` when empty.
    pub fn selection(&self) -> usize {
        self.selection
    }

    /// Filtered candidates above the visible page.
    pub fn scroll_offset(&self) -> usize {
        self.scroll_offset
    }

    /// Every filtered candidate, in menu order.
    pub fn candidates(&self) -> &[CompletionCandidate] {
        &self.filtered
    }

    /// Number of filtered candidates.
    pub fn len(&self) -> usize {
        self.filtered.len()
    }

    /// `true` when nothing is listed.
    pub fn is_empty(&self) -> bool {
        self.filtered.is_empty()
    }

    /// `true` while the menu has something to show.
    pub fn is_open(&self) -> bool {
        !self.filtered.is_empty()
    }

    /// The current page.
    pub fn visible(&self) -> VisiblePage {
        let end = (self.scroll_offset + self.page_size).min(self.filtered.len());
        VisiblePage {
            candidates: self.filtered[self.scroll_offset..end].to_vec(),
            selection: self.selection,
            scroll_offset: self.scroll_offset,
            total: self.filtered.len(),
        }
    }

    /// Close the menu and forget everything.
    pub fn clear(&mut self) {
        self.all.clear();
        self.prefix.clear();
        self.filtered.clear();
        self.selection = 0;
        self.scroll_offset = 0;
    }

    fn refresh(&mut self) {
        self.filtered = filter_and_sort(&self.all, &self.prefix);
        if self.filtered.is_empty() {
            self.selection = 0;
            self.scroll_offset = 0;
            return;
        }
        self.selection = clamp_selection(self.selection, self.filtered.len());
        self.rescroll();
    }

    fn rescroll(&mut self) {
        if self.filtered.is_empty() {
            self.scroll_offset = 0;
            return;
        }
        self.scroll_offset = scroll_to(
            self.selection,
            self.scroll_offset,
            self.page_size,
            self.filtered.len(),
        );
    }
}

/// The identifier fragment ending at char column `column` of `line`.
///
/// Returns the char column where the fragment starts and the fragment itself.
pub fn prefix_at(line: &str, column: usize) -> (usize, &str) {
    let boundaries = line.char_indices().take(column).collect::<Vec<_>>();
    let end = boundaries
        .last()
        .map_or(0, |(offset, ch)| offset + ch.len_utf8());

    let word_chars = boundaries
        .iter()
        .rev()
        .take_while(|(_, ch)| ch.is_alphanumeric() || *ch == '_')
        .count();
    let start_column = boundaries.len() - word_chars;
    let start = boundaries.get(start_column).map_or(end, |(offset, _)| *offset);

    (start_column, &line[start..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use lspop_json::from_str;
    use pretty_assertions::assert_eq;

    fn labels(candidates: &[CompletionCandidate]) -> Vec<&str> {
        candidates.iter().map(|c| c.label.as_str()).collect()
    }

    #[test]
    fn test_filter_falls_back_to_full_list() {
        let all = vec![CompletionCandidate::new("b"), CompletionCandidate::new("a")];
        assert_eq!(labels(&filter_and_sort(&all, "zzz")), vec!["a", "b"]);
    }

    #[test]
    fn test_sort_text_overrides_label() {
        let mut first = CompletionCandidate::new("zeta");
        first.sort_text = Some("0".to_string());
        let all = vec![CompletionCandidate::new("alpha"), first];
        assert_eq!(labels(&filter_and_sort(&all, "")), vec!["zeta", "alpha"]);
    }

    #[test]
    fn test_filter_text_is_matched() {
        let mut item = CompletionCandidate::new("push(…)");
        item.filter_text = Some("push".to_string());
        let all = vec![item, CompletionCandidate::new("pop")];
        assert_eq!(labels(&filter_and_sort(&all, "PUS")), vec!["push(…)"]);
    }

    #[test]
    fn test_parse_completion_list_and_array() {
        let list = from_str(r#"{"isIncomplete":false,"items":[{"label":"a"},{"nolabel":1}]}"#)
            .unwrap();
        assert_eq!(labels(&parse_completion_result(&list).unwrap()), vec!["a"]);

        let array = from_str(r#"[{"label":"x","insertText":"x()"}]"#).unwrap();
        let parsed = parse_completion_result(&array).unwrap();
        assert_eq!(parsed[0].text_to_insert(), "x()");

        assert_eq!(parse_completion_result(&Value::Null).unwrap(), vec![]);
        assert!(parse_completion_result(&Value::from(1u32)).is_err());
    }

    #[test]
    fn test_text_edit_wins_over_insert_text() {
        let item = from_str(
            r#"{"label":"vec!","insertText":"vec","insertTextFormat":2,
                "textEdit":{"range":{"start":{"line":0,"character":0},"end":{"line":0,"character":2}},"newText":"vec![$0]"}}"#,
        )
        .unwrap();
        let candidate = CompletionCandidate::from_value(&item).unwrap();
        assert_eq!(candidate.insert_text.as_deref(), Some("vec![]"));
        assert_eq!(candidate.edit_range.map(|r| r.end.character), Some(2));
    }

    #[test]
    fn test_snippet_to_plain_text() {
        assert_eq!(snippet_to_plain_text("foo(${1:a}, ${2:b})$0"), "foo(a, b)");
        assert_eq!(snippet_to_plain_text("${1|one,two|}"), "one");
        assert_eq!(snippet_to_plain_text("${1:outer ${2:inner}}"), "outer inner");
        assert_eq!(snippet_to_plain_text("\\$1 costs $TM_X"), "$1 costs ");
        assert_eq!(snippet_to_plain_text("${1:open"), "${1:open");
        assert_eq!(snippet_to_plain_text("a $ b"), "a $ b");
    }

    #[test]
    fn test_menu_page_navigation() {
        let mut menu = CompletionMenu::new(4);
        menu.set_candidates((0..10).map(|i| CompletionCandidate::new(format!("c{i}"))).collect());
        assert_eq!(menu.selection(), 1);

        menu.page_down();
        assert_eq!(menu.selection(), 5);
        assert_eq!(menu.scroll_offset(), 1);

        menu.page_down();
        menu.page_down();
        assert_eq!(menu.selection(), 10);
        assert_eq!(menu.scroll_offset(), 6);

        menu.page_up();
        assert_eq!(menu.selection(), 6);
        assert_eq!(menu.scroll_offset(), 5);
    }

    #[test]
    fn test_menu_keeps_selection_on_requery() {
        let mut menu = CompletionMenu::new(3);
        menu.set_candidates(vec![
            CompletionCandidate::new("a"),
            CompletionCandidate::new("b"),
            CompletionCandidate::new("c"),
        ]);
        menu.select(3);
        menu.set_candidates(vec![CompletionCandidate::new("x"), CompletionCandidate::new("y")]);
        assert_eq!(menu.selection(), 1);
        assert_eq!(menu.selected().map(|c| c.label.as_str()), Some("x"));
    }

    #[test]
    fn test_prefix_at() {
        assert_eq!(prefix_at("let foo_ba", 10), (4, "foo_ba"));
        assert_eq!(prefix_at("x.len", 2), (2, ""));
        assert_eq!(prefix_at("été", 3), (0, "été"));
        assert_eq!(prefix_at("ab cd", 99), (3, "cd"));
        assert_eq!(prefix_at("", 0), (0, ""));
    }
}
