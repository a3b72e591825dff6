//! What the client needs from the editor it runs in.

use crate::overlay::Overlay;
use crate::placement::{ScreenPoint, ScreenRect};
use std::io;
use std::path::{Path, PathBuf};

/// A buffer location: 0-based line and `char` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TextPoint {
    /// Line (0-based).
    pub line: usize,
    /// Column in `char`s (0-based).
    pub column: usize,
}

impl TextPoint {
    /// Create a new point.
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

/// The editor side of the integration.
///
/// One host shows one active document. Every method is called from the host's own event loop;
/// nothing here needs to be thread-safe.
pub trait EditorHost {
    /// Absolute path of the active document, if it has one.
    fn document_path(&self) -> Option<PathBuf>;

    /// Protocol language id of the active document.
    fn language_id(&self) -> String;

    /// Full text of the active document, lines joined by `\n`.
    fn document_text(&self) -> String;

    /// Text of one line, without its line break.
    fn line_text(&self, line: usize) -> Option<String>;

    /// Cursor location.
    fn cursor(&self) -> TextPoint;

    /// Move the cursor. Out-of-range points are clamped by the host.
    fn set_cursor(&mut self, point: TextPoint);

    /// Replace the text between `start` and `end` (exclusive) with `text`.
    fn replace_range(&mut self, start: TextPoint, end: TextPoint, text: &str);

    /// Make `path` the active document.
    fn open_file(&mut self, path: &Path) -> io::Result<()>;

    /// Show a transient one-line message.
    fn show_status(&mut self, message: &str);

    /// Draw `overlay`, replacing any overlay already shown.
    fn show_overlay(&mut self, overlay: Overlay);

    /// Remove the overlay, if any.
    fn hide_overlay(&mut self);

    /// Drawable area of the screen.
    fn screen_bounds(&self) -> ScreenRect;

    /// First screen row of the strip overlays must not cover (status line and below).
    fn reserved_bottom_row(&self) -> u16;

    /// Screen cell showing the buffer location `point`, or `None` when it is scrolled out of
    /// view.
    fn screen_position(&self, point: TextPoint) -> Option<ScreenPoint>;
}
