//! The demo editor: a line buffer implementing [`EditorHost`], plus key handling and drawing.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use lspop::{
    Client, EditorHost, Overlay, OverlayKind, ProcessEvent, ScreenPoint, ScreenRect, ServerConfig,
    ServerProcess, TextPoint,
};
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::Line,
    widgets::{Block, Borders, Clear, Paragraph},
};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{info, warn};
use unicode_width::UnicodeWidthChar;

const TAB_WIDTH: usize = 4;
/// How long quitting waits for the `shutdown` reply before killing the server.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// The buffer and everything the client draws on it.
pub struct Editor {
    path: PathBuf,
    language_id: String,
    lines: Vec<String>,
    cursor: TextPoint,
    scroll_top: usize,
    modified: bool,
    status: String,
    overlay: Option<Overlay>,
    /// Text area of the last frame, inside the border.
    text_area: Rect,
}

impl Editor {
    /// Load `path`, or start empty when it does not exist yet.
    pub fn open(path: PathBuf, language_id: String) -> io::Result<Self> {
        let text = if path.exists() {
            fs::read_to_string(&path)?
        } else {
            String::new()
        };
        Ok(Self {
            path,
            language_id,
            lines: split_lines(&text),
            cursor: TextPoint::default(),
            scroll_top: 0,
            modified: false,
            status: String::new(),
            overlay: None,
            text_area: Rect::default(),
        })
    }

    fn line_len(&self, line: usize) -> usize {
        self.lines.get(line).map_or(0, |text| text.chars().count())
    }

    fn clamp(&self, point: TextPoint) -> TextPoint {
        let line = point.line.min(self.lines.len().saturating_sub(1));
        TextPoint::new(line, point.column.min(self.line_len(line)))
    }

    fn write(&mut self) -> io::Result<()> {
        fs::write(&self.path, self.document_text())?;
        self.modified = false;
        Ok(())
    }

    fn insert(&mut self, text: &str) {
        let cursor = self.cursor;
        self.replace_range(cursor, cursor, text);
        let lines = text.split('\n').collect::<Vec<_>>();
        self.cursor = match lines.as_slice() {
            [single] => TextPoint::new(cursor.line, cursor.column + single.chars().count()),
            [.., last] => TextPoint::new(cursor.line + lines.len() - 1, last.chars().count()),
            [] => cursor,
        };
    }

    fn backspace(&mut self) -> bool {
        let cursor = self.cursor;
        let start = if cursor.column > 0 {
            TextPoint::new(cursor.line, cursor.column - 1)
        } else if cursor.line > 0 {
            TextPoint::new(cursor.line - 1, self.line_len(cursor.line - 1))
        } else {
            return false;
        };
        self.replace_range(start, cursor, "");
        self.cursor = start;
        true
    }

    fn delete(&mut self) -> bool {
        let cursor = self.cursor;
        let end = if cursor.column < self.line_len(cursor.line) {
            TextPoint::new(cursor.line, cursor.column + 1)
        } else if cursor.line + 1 < self.lines.len() {
            TextPoint::new(cursor.line + 1, 0)
        } else {
            return false;
        };
        self.replace_range(cursor, end, "");
        true
    }

    fn move_cursor(&mut self, key: KeyCode) {
        let TextPoint { line, column } = self.cursor;
        let page = usize::from(self.text_area.height.max(1));
        self.cursor = match key {
            KeyCode::Left if column > 0 => TextPoint::new(line, column - 1),
            KeyCode::Left if line > 0 => TextPoint::new(line - 1, self.line_len(line - 1)),
            KeyCode::Right if column < self.line_len(line) => TextPoint::new(line, column + 1),
            KeyCode::Right if line + 1 < self.lines.len() => TextPoint::new(line + 1, 0),
            KeyCode::Up => self.clamp(TextPoint::new(line.saturating_sub(1), column)),
            KeyCode::Down => self.clamp(TextPoint::new(line + 1, column)),
            KeyCode::PageUp => self.clamp(TextPoint::new(line.saturating_sub(page), column)),
            KeyCode::PageDown => self.clamp(TextPoint::new(line + page, column)),
            KeyCode::Home => TextPoint::new(line, 0),
            KeyCode::End => TextPoint::new(line, self.line_len(line)),
            _ => self.cursor,
        };
    }

    fn scroll_to_cursor(&mut self) {
        let height = usize::from(self.text_area.height);
        if height == 0 {
            return;
        }
        if self.cursor.line < self.scroll_top {
            self.scroll_top = self.cursor.line;
        } else if self.cursor.line >= self.scroll_top + height {
            self.scroll_top = self.cursor.line + 1 - height;
        }
    }

    fn char_index(&self, point: TextPoint) -> usize {
        let point = self.clamp(point);
        let before = self.lines[..point.line]
            .iter()
            .map(|line| line.chars().count() + 1)
            .sum::<usize>();
        before + point.column
    }
}

impl EditorHost for Editor {
    fn document_path(&self) -> Option<PathBuf> {
        std::path::absolute(&self.path).ok()
    }

    fn language_id(&self) -> String {
        self.language_id.clone()
    }

    fn document_text(&self) -> String {
        self.lines.join("\n")
    }

    fn line_text(&self, line: usize) -> Option<String> {
        self.lines.get(line).cloned()
    }

    fn cursor(&self) -> TextPoint {
        self.cursor
    }

    fn set_cursor(&mut self, point: TextPoint) {
        self.cursor = self.clamp(point);
        self.scroll_to_cursor();
    }

    fn replace_range(&mut self, start: TextPoint, end: TextPoint, text: &str) {
        let (start, end) = (self.char_index(start), self.char_index(end));
        let (start, end) = (start.min(end), start.max(end));
        let document = self.document_text();
        let byte = |index: usize| {
            document
                .char_indices()
                .nth(index)
                .map_or(document.len(), |(offset, _)| offset)
        };
        let mut updated = String::with_capacity(document.len() + text.len());
        updated.push_str(&document[..byte(start)]);
        updated.push_str(text);
        updated.push_str(&document[byte(end)..]);
        self.lines = split_lines(&updated);
        self.cursor = self.clamp(self.cursor);
        self.modified = true;
    }

    fn open_file(&mut self, path: &Path) -> io::Result<()> {
        if self.modified {
            return Err(io::Error::other("unsaved changes"));
        }
        let text = fs::read_to_string(path)?;
        self.path = path.to_path_buf();
        self.lines = split_lines(&text);
        self.cursor = TextPoint::default();
        self.scroll_top = 0;
        self.overlay = None;
        Ok(())
    }

    fn show_status(&mut self, message: &str) {
        self.status = message.to_string();
    }

    fn show_overlay(&mut self, overlay: Overlay) {
        self.overlay = Some(overlay);
    }

    fn hide_overlay(&mut self) {
        self.overlay = None;
    }

    fn screen_bounds(&self) -> ScreenRect {
        ScreenRect::new(
            self.text_area.x,
            self.text_area.y,
            self.text_area.width,
            self.text_area.height,
        )
    }

    fn reserved_bottom_row(&self) -> u16 {
        self.text_area.bottom()
    }

    fn screen_position(&self, point: TextPoint) -> Option<ScreenPoint> {
        let row = point.line.checked_sub(self.scroll_top)?;
        if row >= usize::from(self.text_area.height) {
            return None;
        }
        let line = self.lines.get(point.line)?;
        let col = display_width(line, point.column).min(usize::from(self.text_area.width));
        Some(ScreenPoint::new(
            self.text_area.y + row as u16,
            self.text_area.x + col as u16,
        ))
    }
}

fn split_lines(text: &str) -> Vec<String> {
    text.split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line).to_string())
        .collect()
}

/// Terminal columns taken by the first `column` chars of `line`.
fn display_width(line: &str, column: usize) -> usize {
    line.chars().take(column).map(char_width).sum()
}

fn char_width(ch: char) -> usize {
    if ch == '\t' {
        TAB_WIDTH
    } else {
        ch.width().unwrap_or(0)
    }
}

fn expand_tabs(line: &str) -> String {
    line.replace('\t', &" ".repeat(TAB_WIDTH))
}

/// The editor plus its language server.
pub struct App {
    editor: Editor,
    client: Client,
    server_config: Option<ServerConfig>,
    server: Option<ServerProcess>,
    should_quit: bool,
}

impl App {
    /// Open `path`. The server is started separately with [`App::start_server`].
    pub fn new(path: PathBuf, language_id: String, server_config: Option<ServerConfig>) -> io::Result<Self> {
        Ok(Self {
            editor: Editor::open(path, language_id)?,
            client: Client::default(),
            server_config,
            server: None,
            should_quit: false,
        })
    }

    /// `true` once the user asked to quit.
    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    /// Spawn the configured server and begin the handshake.
    pub fn start_server(&mut self) {
        let Some(config) = self.server_config.as_ref() else {
            self.editor.show_status("no language server configured");
            return;
        };

        let process = match ServerProcess::spawn(config) {
            Ok(process) => process,
            Err(err) => {
                warn!("failed to start {}: {err}", config.command);
                let message = format!("failed to start {}: {err}", config.command);
                self.editor.show_status(&message);
                return;
            }
        };
        info!("started {} (pid {})", process.command(), process.id());

        let transport = Box::new(process.transport());
        match self.client.start(&mut self.editor, transport, &config.root) {
            Ok(()) => {
                let message = format!("starting {}", config.command);
                self.editor.show_status(&message);
                self.server = Some(process);
            }
            Err(err) => self.editor.show_status(&err.to_string()),
        }
    }

    fn restart_server(&mut self) {
        if let Some(mut server) = self.server.take() {
            server.stop();
        }
        self.client.stop(&mut self.editor);
        self.start_server();
    }

    /// Hand everything the server produced to the client.
    pub fn poll_server(&mut self) {
        let Some(server) = self.server.as_mut() else {
            return;
        };
        let events = server.drain();
        let exited = server.has_exited();
        for event in events {
            self.client.handle_process_event(&mut self.editor, event);
        }
        if exited {
            self.server = None;
        }
    }

    /// Ask the server to shut down, wait briefly for its reply (which sends `exit`), then stop it.
    pub fn shutdown(&mut self) {
        if let Some(mut server) = self.server.take() {
            if self.client.session().is_initialized() {
                match self.client.session_mut().shutdown() {
                    Ok(_) => self.await_shutdown_reply(&mut server),
                    Err(err) => warn!("shutdown request failed: {err}"),
                }
            }
            server.stop();
        }
        self.client.stop(&mut self.editor);
    }

    fn await_shutdown_reply(&mut self, server: &mut ServerProcess) {
        let deadline = Instant::now() + SHUTDOWN_TIMEOUT;
        while self.client.session().pending().is_some() {
            let Some(event) = deadline
                .checked_duration_since(Instant::now())
                .and_then(|remaining| server.next_timeout(remaining))
            else {
                warn!("language server did not answer shutdown");
                return;
            };
            let exited = matches!(event, ProcessEvent::Exited(_));
            self.client.handle_process_event(&mut self.editor, event);
            if exited {
                return;
            }
        }
    }

    /// React to one key press.
    pub fn handle_key(&mut self, key: KeyEvent) {
        if self
            .editor
            .overlay
            .as_ref()
            .is_some_and(|overlay| overlay.kind == OverlayKind::Message)
        {
            self.editor.hide_overlay();
        }
        if self.client.is_completing() && self.handle_completion_key(key) {
            return;
        }

        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        let shift = key.modifiers.contains(KeyModifiers::SHIFT);
        match key.code {
            KeyCode::Char('x') if ctrl => self.should_quit = true,
            KeyCode::Char('s') if ctrl => self.save(),
            KeyCode::Char(' ') if ctrl => self.client.trigger_completion(&mut self.editor),
            KeyCode::Char('f') if ctrl => self.client.format(&mut self.editor),
            KeyCode::Char('e') if ctrl => self.client.show_line_diagnostics(&mut self.editor),
            KeyCode::Char('l') if ctrl => self.restart_server(),
            KeyCode::F(12) if shift => self.client.find_references(&mut self.editor),
            KeyCode::F(12) => self.client.goto_definition(&mut self.editor),
            KeyCode::Char(ch) if !ctrl => self.edit(|editor| {
                editor.insert(ch.encode_utf8(&mut [0; 4]));
                true
            }),
            KeyCode::Tab => self.edit(|editor| {
                editor.insert("\t");
                true
            }),
            KeyCode::Enter => self.edit(|editor| {
                editor.insert("\n");
                true
            }),
            KeyCode::Backspace => self.edit(Editor::backspace),
            KeyCode::Delete => self.edit(Editor::delete),
            KeyCode::Esc => self.editor.hide_overlay(),
            code => {
                self.client.close_completion(&mut self.editor);
                self.editor.move_cursor(code);
                self.editor.scroll_to_cursor();
            }
        }
    }

    /// Keys the open completion menu consumes.
    fn handle_completion_key(&mut self, key: KeyEvent) -> bool {
        let editor = &mut self.editor;
        match key.code {
            KeyCode::Down => self.client.select_next(editor),
            KeyCode::Up => self.client.select_prev(editor),
            KeyCode::PageDown => self.client.page_down(editor),
            KeyCode::PageUp => self.client.page_up(editor),
            KeyCode::Enter | KeyCode::Tab => self.client.accept_completion(editor),
            KeyCode::Esc => {
                self.client.close_completion(editor);
                true
            }
            _ => false,
        }
    }

    fn edit(&mut self, change: impl FnOnce(&mut Editor) -> bool) {
        if change(&mut self.editor) {
            self.editor.scroll_to_cursor();
            self.client.document_changed(&mut self.editor);
        }
    }

    fn save(&mut self) {
        match self.editor.write() {
            Ok(()) => {
                let message = format!("wrote {}", self.editor.path.display());
                self.editor.show_status(&message);
                self.client.save(&mut self.editor);
            }
            Err(err) => {
                let message = format!("cannot write {}: {err}", self.editor.path.display());
                self.editor.show_status(&message);
            }
        }
    }

    /// Draw the whole screen.
    pub fn render(&mut self, frame: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(1),
                Constraint::Length(1),
                Constraint::Length(1),
            ])
            .split(frame.area());

        let block = Block::default().borders(Borders::ALL).title(format!(
            " {}{} ",
            self.editor.path.display(),
            if self.editor.modified { " [+]" } else { "" }
        ));
        self.editor.text_area = block.inner(chunks[0]);
        self.editor.scroll_to_cursor();

        self.render_text(frame, block, chunks[0]);
        self.render_overlay(frame);
        self.render_status_line(frame, chunks[1]);
        render_shortcuts(frame, chunks[2]);
    }

    fn render_text(&self, frame: &mut Frame, block: Block, area: Rect) {
        let editor = &self.editor;
        let height = usize::from(editor.text_area.height);
        let lines = editor
            .lines
            .iter()
            .skip(editor.scroll_top)
            .take(height)
            .map(|line| Line::from(expand_tabs(line)))
            .collect::<Vec<_>>();
        frame.render_widget(Paragraph::new(lines).block(block), area);

        if let Some(cursor) = editor.screen_position(editor.cursor) {
            frame.set_cursor_position((cursor.col, cursor.row));
        }
    }

    fn render_overlay(&self, frame: &mut Frame) {
        let Some(overlay) = self.editor.overlay.as_ref() else {
            return;
        };
        let area = Rect::new(
            overlay.rect.x,
            overlay.rect.y,
            overlay.rect.width,
            overlay.rect.height,
        )
        .intersection(frame.area());
        if area.is_empty() {
            return;
        }

        let base = match overlay.kind {
            OverlayKind::Completion => Style::default().bg(Color::DarkGray).fg(Color::White),
            OverlayKind::Message => Style::default().bg(Color::Blue).fg(Color::White),
        };
        let lines = overlay
            .lines
            .iter()
            .enumerate()
            .map(|(row, text)| {
                let style = if overlay.selected_row == Some(row) {
                    base.add_modifier(Modifier::REVERSED)
                } else {
                    base
                };
                Line::styled(text.as_str(), style)
            })
            .collect::<Vec<_>>();

        frame.render_widget(Clear, area);
        frame.render_widget(Paragraph::new(lines).style(base), area);
    }

    fn render_status_line(&self, frame: &mut Frame, area: Rect) {
        let editor = &self.editor;
        let server = match self.client.session().server_info() {
            Some(info) => info.label().unwrap_or_else(|| "lsp".to_string()),
            None if self.server.is_some() => "starting".to_string(),
            None => "no server".to_string(),
        };
        let diagnostics = self.client.session().diagnostics().len();
        let position = format!(
            "{}:{} | {server} | {diagnostics} diagnostics",
            editor.cursor.line + 1,
            editor.cursor.column + 1
        );
        let text = if editor.status.is_empty() {
            position
        } else {
            format!("{} | {position}", editor.status)
        };

        let status_line = Paragraph::new(text).style(
            Style::default()
                .bg(Color::DarkGray)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        );
        frame.render_widget(status_line, area);
    }
}

fn render_shortcuts(frame: &mut Frame, area: Rect) {
    let shortcuts = "Ctrl-Space:complete  F12:definition  Shift-F12:references  Ctrl-F:format  Ctrl-E:diagnostics  Ctrl-L:restart server  Ctrl-S:save  Ctrl-X:quit";
    let shortcuts_line =
        Paragraph::new(shortcuts).style(Style::default().bg(Color::Blue).fg(Color::White));
    frame.render_widget(shortcuts_line, area);
}
