//! Overlay composition: text lines plus a placed rectangle, ready for the host to draw.

use crate::completion::CompletionMenu;
use crate::config::OverlayConfig;
use crate::placement::{ScreenPoint, ScreenRect, place};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

/// What an overlay shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayKind {
    /// A completion menu.
    Completion,
    /// Informational text (diagnostics, server messages).
    Message,
}

/// A positioned block of text lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Overlay {
    /// What this overlay is for.
    pub kind: OverlayKind,
    /// Screen rectangle.
    pub rect: ScreenRect,
    /// One entry per row, each exactly `rect.width` columns wide.
    pub lines: Vec<String>,
    /// Row to highlight.
    pub selected_row: Option<usize>,
}

/// Layout inputs shared by every overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayArea {
    /// Screen position of the anchoring buffer location.
    pub anchor: ScreenPoint,
    /// Visible region the overlay must stay in.
    pub region: ScreenRect,
    /// First row of the reserved bottom strip.
    pub reserved_bottom_y: u16,
}

/// Lay out the completion menu at `area.anchor`.
///
/// The placed height becomes the menu's page size, so a menu squeezed near the bottom of the
/// screen scrolls instead of overflowing. Returns `None` for a closed menu.
pub fn completion_overlay(
    menu: &mut CompletionMenu,
    area: OverlayArea,
    config: &OverlayConfig,
) -> Option<Overlay> {
    if !menu.is_open() {
        return None;
    }

    let label_width = menu
        .candidates()
        .iter()
        .map(|candidate| candidate.label.width())
        .max()
        .unwrap_or(0);
    let detail_width = menu
        .candidates()
        .iter()
        .filter_map(|candidate| candidate.detail.as_deref())
        .map(UnicodeWidthStr::width)
        .max();
    let content_width = match detail_width {
        Some(detail) => label_width + 1 + detail,
        None => label_width,
    };
    let width = clamp_width(content_width, config.min_width, config.max_width);

    let height = menu.len().min(usize::from(config.max_items.max(1))) as u16;
    let rect = place(
        area.anchor,
        width,
        height,
        area.region,
        area.reserved_bottom_y,
        config.safety_margin,
    );
    menu.set_page_size(usize::from(rect.height));

    let page = menu.visible();
    let cell_width = usize::from(rect.width);
    let lines = page
        .candidates
        .iter()
        .map(|candidate| {
            let mut row = candidate.label.clone();
            if let Some(detail) = candidate.detail.as_deref() {
                let pad = label_width.saturating_sub(candidate.label.width()) + 1;
                row.extend(std::iter::repeat_n(' ', pad));
                row.push_str(detail);
            }
            fit_to_width(&row, cell_width)
        })
        .collect();

    Some(Overlay {
        kind: OverlayKind::Completion,
        rect,
        lines,
        selected_row: page.selected_row(),
    })
}

/// Lay out free text (diagnostics, server messages) at `area.anchor`. Returns `None` when there
/// is nothing to show.
pub fn message_overlay(lines: &[String], area: OverlayArea, config: &OverlayConfig) -> Option<Overlay> {
    if lines.is_empty() {
        return None;
    }

    let content_width = lines.iter().map(|line| line.width()).max().unwrap_or(0);
    let width = clamp_width(content_width, 1, config.max_width);
    let height = lines.len().min(usize::from(u16::MAX)) as u16;
    let rect = place(
        area.anchor,
        width,
        height,
        area.region,
        area.reserved_bottom_y,
        config.safety_margin,
    );

    let cell_width = usize::from(rect.width);
    let lines = lines
        .iter()
        .take(usize::from(rect.height))
        .map(|line| fit_to_width(line, cell_width))
        .collect();

    Some(Overlay {
        kind: OverlayKind::Message,
        rect,
        lines,
        selected_row: None,
    })
}

fn clamp_width(content: usize, min: u16, max: u16) -> u16 {
    let max = max.max(1);
    (content.min(usize::from(max)) as u16).clamp(min.min(max), max)
}

/// Truncate or pad `text` so it occupies exactly `width` terminal columns.
///
/// A wide character that would straddle the edge is replaced by a space.
pub fn fit_to_width(text: &str, width: usize) -> String {
    let mut out = String::with_capacity(width);
    let mut used = 0;
    for ch in text.chars() {
        let ch = if ch.is_control() { ' ' } else { ch };
        let w = ch.width().unwrap_or(0);
        if used + w > width {
            break;
        }
        out.push(ch);
        used += w;
    }
    out.extend(std::iter::repeat_n(' ', width - used));
    out
}
