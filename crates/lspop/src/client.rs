//! User-facing actions: the glue between an [`EditorHost`], the [`Session`] and the overlays.
//!
//! Every action reports its outcome through [`EditorHost::show_status`]. A missing server and an
//! empty answer are reported differently; neither is an error for the caller.

use crate::completion::{CompletionMenu, prefix_at};
use crate::config::{OverlayConfig, SessionOptions};
use crate::error::ClientError;
use crate::events::DiagnosticSeverity;
use crate::host::{EditorHost, TextPoint};
use crate::locations::Location;
use crate::overlay::{OverlayArea, completion_overlay, message_overlay};
use crate::position::{LspPosition, Utf16Converter};
use crate::process::ProcessEvent;
use crate::session::{Reply, Session, SessionEvent, Transport};
use crate::text_edits::{TextEdit, application_order};
use crate::uri::path_to_file_uri;
use std::path::Path;
use tracing::{debug, warn};

/// Drives one [`Session`] on behalf of one host.
pub struct Client {
    session: Session,
    menu: CompletionMenu,
    overlay_config: OverlayConfig,
    /// Buffer location where the completed word starts, while completing.
    completion_anchor: Option<TextPoint>,
    tab_size: u32,
    insert_spaces: bool,
}

impl Default for Client {
    fn default() -> Self {
        Self::new(SessionOptions::default(), OverlayConfig::default())
    }
}

impl Client {
    /// A client with no server attached.
    pub fn new(session_options: SessionOptions, overlay_config: OverlayConfig) -> Self {
        Self {
            session: Session::new(session_options),
            menu: CompletionMenu::new(usize::from(overlay_config.max_items.max(1))),
            overlay_config,
            completion_anchor: None,
            tab_size: 4,
            insert_spaces: true,
        }
    }

    /// The underlying session.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// The underlying session, mutably.
    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    /// The completion menu.
    pub fn menu(&self) -> &CompletionMenu {
        &self.menu
    }

    /// Indentation sent with formatting requests.
    pub fn set_indent(&mut self, tab_size: u32, insert_spaces: bool) {
        self.tab_size = tab_size;
        self.insert_spaces = insert_spaces;
    }

    /// Attach a fresh server: reset the session, send `initialize` for `root` and open the host's
    /// document (held back until the handshake completes).
    pub fn start(
        &mut self,
        host: &mut dyn EditorHost,
        transport: Box<dyn Transport>,
        root: &Path,
    ) -> Result<(), ClientError> {
        self.close_completion(host);
        self.session.start(transport);
        self.session.initialize(root)?;
        self.open_active_document(host)
    }

    /// Detach the server. Nothing is sent; in-flight replies are forgotten.
    pub fn stop(&mut self, host: &mut dyn EditorHost) {
        self.close_completion(host);
        self.session.stop();
    }

    /// Announce the host's current document to the server.
    pub fn open_active_document(&mut self, host: &mut dyn EditorHost) -> Result<(), ClientError> {
        let Some(path) = host.document_path() else {
            return Ok(());
        };
        let uri = path_to_file_uri(&path);
        self.session
            .open_document(&uri, &host.language_id(), host.document_text())
    }

    /// Route one event of the server process.
    pub fn handle_process_event(&mut self, host: &mut dyn EditorHost, event: ProcessEvent) {
        match event {
            ProcessEvent::Stdout(bytes) => self.receive(host, &bytes),
            ProcessEvent::Stderr(line) => debug!(target: "lspop::server", "{line}"),
            ProcessEvent::Exited(code) => {
                self.stop(host);
                let message = match code {
                    Some(code) => format!("language server exited with status {code}"),
                    None => "language server exited".to_string(),
                };
                host.show_status(&message);
            }
        }
    }

    /// Feed server output and act on everything it produced.
    pub fn receive(&mut self, host: &mut dyn EditorHost, chunk: &[u8]) {
        self.session.receive(chunk);
        self.process_events(host);
    }

    /// Act on queued session events.
    pub fn process_events(&mut self, host: &mut dyn EditorHost) {
        for event in self.session.drain_events() {
            match event {
                SessionEvent::Initialized(info) => {
                    let label = info.label().unwrap_or_else(|| "language server".to_string());
                    host.show_status(&format!("{label} ready"));
                }
                SessionEvent::Reply(_, reply) => self.handle_reply(host, reply),
                SessionEvent::Diagnostics(published) => {
                    let count = |severity| {
                        published
                            .diagnostics
                            .iter()
                            .filter(|diag| diag.severity == severity)
                            .count()
                    };
                    let errors = count(DiagnosticSeverity::Error);
                    let warnings = count(DiagnosticSeverity::Warning);
                    if errors + warnings > 0 {
                        host.show_status(&format!("{errors} errors, {warnings} warnings"));
                    }
                }
                SessionEvent::ShowMessage(shown) => host.show_status(&shown.message),
                SessionEvent::LogMessage(logged) => {
                    debug!(target: "lspop::server", "{:?}: {}", logged.typ, logged.message);
                }
            }
        }
    }

    fn handle_reply(&mut self, host: &mut dyn EditorHost, reply: Reply) {
        match reply {
            Reply::Completion(candidates) => {
                if self.completion_anchor.is_none() {
                    return;
                }
                self.menu.set_candidates(candidates);
                if self.menu.is_open() {
                    self.render_completion(host);
                } else {
                    self.close_completion(host);
                    host.show_status("no completions");
                }
            }
            Reply::Formatting(edits) => {
                if edits.is_empty() {
                    report(host, ClientError::NoResults);
                    return;
                }
                apply_edits(host, &edits);
                self.document_changed(host);
                host.show_status(&format!("applied {} formatting edits", edits.len()));
            }
            Reply::Definition(locations) => match locations.first() {
                Some(location) => self.jump_to(host, location),
                None => report(host, ClientError::NoResults),
            },
            Reply::References(locations) => {
                if locations.is_empty() {
                    report(host, ClientError::NoResults);
                    return;
                }
                self.show_references(host, &locations);
            }
            Reply::Error(error) => report(host, ClientError::Server(error)),
            Reply::Initialize(_) | Reply::Shutdown | Reply::Other(_) => {}
        }
    }

    /// Tell the server the host's text changed, and follow the edit with the completion menu.
    pub fn document_changed(&mut self, host: &mut dyn EditorHost) {
        if self.session.active_document().is_some() {
            match self.session.did_change(host.document_text()) {
                Ok(()) | Err(ClientError::TransportUnavailable) => {}
                Err(err) => warn!("didChange failed: {err}"),
            }
        }
        if self.completion_anchor.is_some() {
            self.update_completion(host);
        }
    }

    /// Tell the server the document was saved.
    pub fn save(&mut self, host: &mut dyn EditorHost) {
        match self.session.did_save(None) {
            Ok(()) | Err(ClientError::TransportUnavailable | ClientError::NoActiveDocument) => {}
            Err(err) => report(host, err),
        }
    }

    /// `true` while a completion menu is open or awaited.
    pub fn is_completing(&self) -> bool {
        self.completion_anchor.is_some()
    }

    /// Ask for completions at the cursor.
    pub fn trigger_completion(&mut self, host: &mut dyn EditorHost) {
        let cursor = host.cursor();
        let line = host.line_text(cursor.line).unwrap_or_default();
        let (start, prefix) = prefix_at(&line, cursor.column);
        let position = Utf16Converter::to_lsp(&line, cursor.line, cursor.column);

        match self.session.request_completion(position) {
            Ok(_) => {
                self.completion_anchor = Some(TextPoint::new(cursor.line, start));
                self.menu.set_prefix(prefix);
            }
            Err(err) => {
                self.close_completion(host);
                report(host, err);
            }
        }
    }

    fn update_completion(&mut self, host: &mut dyn EditorHost) {
        let Some(anchor) = self.completion_anchor else {
            return;
        };
        let cursor = host.cursor();
        let line = host.line_text(cursor.line).unwrap_or_default();
        let (start, prefix) = prefix_at(&line, cursor.column);
        if cursor.line != anchor.line || start != anchor.column {
            self.close_completion(host);
            return;
        }

        self.menu.set_prefix(prefix);
        let position = Utf16Converter::to_lsp(&line, cursor.line, cursor.column);
        if let Err(err) = self.session.request_completion(position) {
            debug!("completion re-query failed: {err}");
        }
        self.render_completion(host);
    }

    fn render_completion(&mut self, host: &mut dyn EditorHost) {
        let Some(anchor) = self.completion_anchor else {
            return;
        };
        let Some(area) = overlay_area(host, anchor) else {
            host.hide_overlay();
            return;
        };
        match completion_overlay(&mut self.menu, area, &self.overlay_config) {
            Some(overlay) => host.show_overlay(overlay),
            None => host.hide_overlay(),
        }
    }

    /// Move the completion selection down. Returns `false` when no menu is open.
    pub fn select_next(&mut self, host: &mut dyn EditorHost) -> bool {
        self.navigate(host, CompletionMenu::select_next)
    }

    /// Move the completion selection up. Returns `false` when no menu is open.
    pub fn select_prev(&mut self, host: &mut dyn EditorHost) -> bool {
        self.navigate(host, CompletionMenu::select_prev)
    }

    /// Move the completion selection down a page. Returns `false` when no menu is open.
    pub fn page_down(&mut self, host: &mut dyn EditorHost) -> bool {
        self.navigate(host, CompletionMenu::page_down)
    }

    /// Move the completion selection up a page. Returns `false` when no menu is open.
    pub fn page_up(&mut self, host: &mut dyn EditorHost) -> bool {
        self.navigate(host, CompletionMenu::page_up)
    }

    fn navigate(&mut self, host: &mut dyn EditorHost, step: fn(&mut CompletionMenu)) -> bool {
        if self.completion_anchor.is_none() || !self.menu.is_open() {
            return false;
        }
        step(&mut self.menu);
        self.render_completion(host);
        true
    }

    /// Insert the selected candidate in place of the typed prefix. Returns `false` when there is
    /// nothing to accept.
    pub fn accept_completion(&mut self, host: &mut dyn EditorHost) -> bool {
        let Some(anchor) = self.completion_anchor else {
            return false;
        };
        let Some(candidate) = self.menu.selected().cloned() else {
            self.close_completion(host);
            return false;
        };

        let cursor = host.cursor();
        let start = candidate
            .edit_range
            .map(|range| text_point(host, range.start))
            .filter(|start| start.line == cursor.line && start.column <= cursor.column)
            .unwrap_or(anchor);
        let text = candidate.text_to_insert();

        host.replace_range(start, cursor, text);
        host.set_cursor(end_of_insert(start, text));
        self.close_completion(host);
        self.document_changed(host);
        true
    }

    /// Close the menu and release the retained completion slot.
    pub fn close_completion(&mut self, host: &mut dyn EditorHost) {
        if self.completion_anchor.take().is_some() || self.menu.is_open() {
            self.menu.clear();
            host.hide_overlay();
        }
        self.session.release_pending();
    }

    /// Reformat the whole document.
    pub fn format(&mut self, host: &mut dyn EditorHost) {
        let (tab_size, insert_spaces) = (self.tab_size, self.insert_spaces);
        if let Err(err) = self.session.request_formatting(tab_size, insert_spaces) {
            report(host, err);
        }
    }

    /// Jump to the definition of the symbol under the cursor.
    pub fn goto_definition(&mut self, host: &mut dyn EditorHost) {
        let position = lsp_position(host, host.cursor());
        if let Err(err) = self.session.request_definition(position) {
            report(host, err);
        }
    }

    /// List references to the symbol under the cursor.
    pub fn find_references(&mut self, host: &mut dyn EditorHost) {
        let position = lsp_position(host, host.cursor());
        if let Err(err) = self.session.request_references(position, true) {
            report(host, err);
        }
    }

    /// Show the diagnostics of the cursor line in an overlay.
    pub fn show_line_diagnostics(&mut self, host: &mut dyn EditorHost) {
        let cursor = host.cursor();
        let lines = self
            .session
            .diagnostics_on_line(cursor.line as u32)
            .map(|diag| format!("{}: {}", diag.severity.label(), diag.message.replace('\n', " ")))
            .collect::<Vec<_>>();
        if lines.is_empty() {
            host.show_status("no diagnostics on this line");
            return;
        }
        self.show_message_lines(host, cursor, &lines);
    }

    fn show_references(&mut self, host: &mut dyn EditorHost, locations: &[Location]) {
        let lines = locations
            .iter()
            .map(|location| {
                let name = location
                    .path()
                    .map(|path| path.display().to_string())
                    .unwrap_or_else(|| location.uri.clone());
                format!(
                    "{name}:{}:{}",
                    location.range.start.line + 1,
                    location.range.start.character + 1
                )
            })
            .collect::<Vec<_>>();
        host.show_status(&format!("{} references", lines.len()));
        let cursor = host.cursor();
        self.show_message_lines(host, cursor, &lines);
    }

    fn show_message_lines(&mut self, host: &mut dyn EditorHost, at: TextPoint, lines: &[String]) {
        self.close_completion(host);
        let Some(area) = overlay_area(host, at) else {
            return;
        };
        if let Some(overlay) = message_overlay(lines, area, &self.overlay_config) {
            host.show_overlay(overlay);
        }
    }

    fn jump_to(&mut self, host: &mut dyn EditorHost, location: &Location) {
        let Some(path) = location.path() else {
            host.show_status(&format!("cannot open {}", location.uri));
            return;
        };

        let current = host.document_path().map(|current| path_to_file_uri(&current));
        if current.as_deref() != Some(location.uri.as_str()) {
            if let Err(err) = host.open_file(&path) {
                host.show_status(&format!("cannot open {}: {err}", path.display()));
                return;
            }
            if let Err(err) = self.open_active_document(host) {
                warn!("didOpen after jump failed: {err}");
            }
        }

        let point = text_point(host, location.range.start);
        host.set_cursor(point);
        host.show_status(&format!("{}:{}", path.display(), point.line + 1));
    }

    /// Restart with a new transport, e.g. after the server crashed.
    pub fn restart(
        &mut self,
        host: &mut dyn EditorHost,
        transport: Box<dyn Transport>,
        root: &Path,
    ) -> Result<(), ClientError> {
        self.stop(host);
        self.start(host, transport, root)
    }
}

fn report(host: &mut dyn EditorHost, err: ClientError) {
    host.show_status(&err.to_string());
}

fn overlay_area(host: &dyn EditorHost, anchor: TextPoint) -> Option<OverlayArea> {
    Some(OverlayArea {
        anchor: host.screen_position(anchor)?,
        region: host.screen_bounds(),
        reserved_bottom_y: host.reserved_bottom_row(),
    })
}

fn lsp_position(host: &dyn EditorHost, point: TextPoint) -> LspPosition {
    let line = host.line_text(point.line).unwrap_or_default();
    Utf16Converter::to_lsp(&line, point.line, point.column)
}

fn text_point(host: &dyn EditorHost, position: LspPosition) -> TextPoint {
    let line = host.line_text(position.line as usize).unwrap_or_default();
    TextPoint::new(position.line as usize, Utf16Converter::from_lsp(&line, position))
}

/// Location right after `text` inserted at `start`.
fn end_of_insert(start: TextPoint, text: &str) -> TextPoint {
    match text.rsplit_once('\n') {
        Some((before, last)) => TextPoint::new(
            start.line + before.matches('\n').count() + 1,
            last.chars().count(),
        ),
        None => TextPoint::new(start.line, start.column + text.chars().count()),
    }
}

fn apply_edits(host: &mut dyn EditorHost, edits: &[TextEdit]) {
    for edit in application_order(edits) {
        let start = text_point(host, edit.range.start);
        let end = text_point(host, edit.range.end);
        host.replace_range(start.min(end), start.max(end), &edit.new_text);
    }
}
