use lspop::json::{Value, from_str, object};
use lspop::{
    Client, EditorHost, MessageFramer, Overlay, OverlayKind, ProcessEvent, ScreenPoint, ScreenRect,
    TextPoint, Transport, encode_message, path_to_file_uri,
};
use pretty_assertions::assert_eq;
use std::cell::RefCell;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;

#[derive(Clone, Default)]
struct Recorder(Rc<RefCell<Vec<u8>>>);

impl Transport for Recorder {
    fn send(&mut self, frame: &[u8]) -> io::Result<()> {
        self.0.borrow_mut().extend_from_slice(frame);
        Ok(())
    }
}

impl Recorder {
    fn take(&self) -> Vec<Value> {
        MessageFramer::new().feed(&self.0.borrow_mut().split_off(0))
    }

    fn methods(&self) -> Vec<String> {
        self.take()
            .iter()
            .filter_map(|message| message.get("method").and_then(Value::as_str))
            .map(str::to_string)
            .collect()
    }
}

/// An in-memory editor.
struct FakeHost {
    path: Option<PathBuf>,
    lines: Vec<String>,
    cursor: TextPoint,
    status: Vec<String>,
    overlay: Option<Overlay>,
    files: Vec<(PathBuf, Vec<String>)>,
}

impl FakeHost {
    fn new(path: &str, text: &str) -> Self {
        Self {
            path: Some(PathBuf::from(path)),
            lines: text.split('\n').map(str::to_string).collect(),
            cursor: TextPoint::default(),
            status: Vec::new(),
            overlay: None,
            files: Vec::new(),
        }
    }

    fn char_offset(&self, point: TextPoint) -> usize {
        let before = self.lines[..point.line.min(self.lines.len())]
            .iter()
            .map(|line| line.chars().count() + 1)
            .sum::<usize>();
        before + point.column
    }

    fn type_text(&mut self, text: &str) {
        let cursor = self.cursor;
        self.replace_range(cursor, cursor, text);
        self.cursor = TextPoint::new(cursor.line, cursor.column + text.chars().count());
    }

    fn last_status(&self) -> &str {
        self.status.last().map(String::as_str).unwrap_or("")
    }
}

impl EditorHost for FakeHost {
    fn document_path(&self) -> Option<PathBuf> {
        self.path.clone()
    }

    fn language_id(&self) -> String {
        "rust".to_string()
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
        self.cursor = point;
    }

    fn replace_range(&mut self, start: TextPoint, end: TextPoint, text: &str) {
        let (start, end) = (self.char_offset(start), self.char_offset(end));
        let mut chars = self.document_text().chars().collect::<Vec<_>>();
        chars.splice(start..end, text.chars());
        let joined = chars.into_iter().collect::<String>();
        self.lines = joined.split('\n').map(str::to_string).collect();
    }

    fn open_file(&mut self, path: &Path) -> io::Result<()> {
        let Some((_, lines)) = self.files.iter().find(|(known, _)| known == path) else {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no such file"));
        };
        self.lines = lines.clone();
        self.path = Some(path.to_path_buf());
        self.cursor = TextPoint::default();
        Ok(())
    }

    fn show_status(&mut self, message: &str) {
        self.status.push(message.to_string());
    }

    fn show_overlay(&mut self, overlay: Overlay) {
        self.overlay = Some(overlay);
    }

    fn hide_overlay(&mut self) {
        self.overlay = None;
    }

    fn screen_bounds(&self) -> ScreenRect {
        ScreenRect::new(0, 0, 80, 20)
    }

    fn reserved_bottom_row(&self) -> u16 {
        19
    }

    fn screen_position(&self, point: TextPoint) -> Option<ScreenPoint> {
        Some(ScreenPoint::new(point.line as u16, point.column as u16))
    }
}

const MAIN: &str = "/work/src/main.rs";

fn reply(id: u64, result: Value) -> Vec<u8> {
    encode_message(&object! { "jsonrpc" => "2.0", "id" => id, "result" => result })
}

fn started(host: &mut FakeHost) -> (Client, Recorder) {
    let recorder = Recorder::default();
    let mut client = Client::default();
    client
        .start(host, Box::new(recorder.clone()), Path::new("/work"))
        .unwrap();
    client.receive(
        host,
        &reply(
            0,
            from_str(r#"{"capabilities":{},"serverInfo":{"name":"fake-ls"}}"#).unwrap(),
        ),
    );
    assert_eq!(
        recorder.methods(),
        vec!["initialize", "initialized", "textDocument/didOpen"]
    );
    assert_eq!(host.last_status(), "fake-ls ready");
    (client, recorder)
}

#[test]
fn test_complete_select_and_accept() {
    let mut host = FakeHost::new(MAIN, "fn main() {\n    let v = Vec::ne\n}");
    host.cursor = TextPoint::new(1, 19);
    let (mut client, recorder) = started(&mut host);

    client.trigger_completion(&mut host);
    let sent = recorder.take();
    assert_eq!(
        sent[0].get("params").and_then(|p| p.get("position")),
        Some(&from_str(r#"{"line":1,"character":19}"#).unwrap())
    );

    client.receive(
        &mut host,
        &reply(
            1,
            from_str(r#"[{"label":"new"},{"label":"new_in"},{"label":"len"}]"#).unwrap(),
        ),
    );
    let overlay = host.overlay.clone().unwrap();
    assert_eq!(overlay.kind, OverlayKind::Completion);
    assert_eq!(overlay.lines.len(), 2);
    assert_eq!(overlay.rect.y, 2);
    assert_eq!(overlay.rect.x, 17);

    assert!(client.select_next(&mut host));
    assert!(client.accept_completion(&mut host));

    assert_eq!(host.lines[1], "    let v = Vec::new_in");
    assert_eq!(host.cursor, TextPoint::new(1, 23));
    assert_eq!(host.overlay, None);
    assert!(!client.is_completing());
    assert!(client.session().pending().is_none());
    assert_eq!(recorder.methods(), vec!["textDocument/didChange"]);

    assert!(!client.select_next(&mut host));
    assert!(!client.accept_completion(&mut host));
}

#[test]
fn test_typing_refilters_and_requeries() {
    let mut host = FakeHost::new(MAIN, "x.l");
    host.cursor = TextPoint::new(0, 3);
    let (mut client, recorder) = started(&mut host);

    client.trigger_completion(&mut host);
    client.receive(
        &mut host,
        &reply(1, from_str(r#"[{"label":"len"},{"label":"last"}]"#).unwrap()),
    );
    assert_eq!(client.menu().len(), 2);
    recorder.take();

    host.type_text("e");
    client.document_changed(&mut host);
    assert_eq!(
        recorder.methods(),
        vec!["textDocument/didChange", "textDocument/completion"]
    );
    assert_eq!(client.menu().prefix(), "le");
    assert_eq!(client.menu().len(), 1);

    client.receive(
        &mut host,
        &reply(2, from_str(r#"[{"label":"len"},{"label":"length"}]"#).unwrap()),
    );
    assert_eq!(client.menu().len(), 2);

    // A repeated answer to the first query cannot replace the newer list.
    client.receive(&mut host, &reply(1, from_str(r#"[{"label":"last"}]"#).unwrap()));
    assert_eq!(client.menu().len(), 2);

    host.type_text(" ");
    client.document_changed(&mut host);
    assert!(!client.is_completing());
    assert_eq!(host.overlay, None);
}

#[test]
fn test_cancel_releases_the_slot() {
    let mut host = FakeHost::new(MAIN, "pri");
    host.cursor = TextPoint::new(0, 3);
    let (mut client, _recorder) = started(&mut host);

    client.trigger_completion(&mut host);
    client.close_completion(&mut host);
    assert!(client.session().pending().is_none());

    // A late reply has nothing to attach to.
    client.receive(&mut host, &reply(1, from_str(r#"[{"label":"print"}]"#).unwrap()));
    assert!(!client.menu().is_open());
    assert_eq!(host.overlay, None);
}

#[test]
fn test_format_applies_edits_back_to_front() {
    let mut host = FakeHost::new(MAIN, "fn  main(){}");
    let (mut client, recorder) = started(&mut host);

    client.format(&mut host);
    let sent = recorder.take();
    assert_eq!(
        sent[0].get("params").and_then(|p| p.get("options")),
        Some(&from_str(r#"{"insertSpaces":true,"tabSize":4}"#).unwrap())
    );

    client.receive(
        &mut host,
        &reply(
            1,
            from_str(
                r#"[
                    {"range":{"start":{"line":0,"character":2},"end":{"line":0,"character":4}},"newText":" "},
                    {"range":{"start":{"line":0,"character":10},"end":{"line":0,"character":10}},"newText":" "}
                ]"#,
            )
            .unwrap(),
        ),
    );
    assert_eq!(host.document_text(), "fn main() {}");
    assert_eq!(host.last_status(), "applied 2 formatting edits");
    assert_eq!(recorder.methods(), vec!["textDocument/didChange"]);
}

#[test]
fn test_definition_in_another_file() {
    let mut host = FakeHost::new(MAIN, "fn main() { helper(); }");
    host.files.push((
        PathBuf::from("/work/src/lib.rs"),
        vec!["// lib".to_string(), "pub fn helper() {}".to_string()],
    ));
    host.cursor = TextPoint::new(0, 14);
    let (mut client, recorder) = started(&mut host);

    client.goto_definition(&mut host);
    assert_eq!(recorder.methods(), vec!["textDocument/definition"]);

    let target = path_to_file_uri(Path::new("/work/src/lib.rs"));
    client.receive(
        &mut host,
        &reply(
            1,
            from_str(&format!(
                r#"[{{"uri":"{target}","range":{{"start":{{"line":1,"character":7}},"end":{{"line":1,"character":13}}}}}}]"#
            ))
            .unwrap(),
        ),
    );

    assert_eq!(host.path, Some(PathBuf::from("/work/src/lib.rs")));
    assert_eq!(host.cursor, TextPoint::new(1, 7));
    assert_eq!(host.last_status(), "/work/src/lib.rs:2");
    assert_eq!(recorder.methods(), vec!["textDocument/didOpen"]);
    assert_eq!(client.session().active_document(), Some(target.as_str()));
}

#[test]
fn test_empty_answers_report_no_results() {
    let mut host = FakeHost::new(MAIN, "let x = 1;");
    let (mut client, _recorder) = started(&mut host);

    client.goto_definition(&mut host);
    client.receive(&mut host, &reply(1, Value::Null));
    assert_eq!(host.last_status(), "no results");

    client.find_references(&mut host);
    client.receive(&mut host, &reply(2, from_str("[]").unwrap()));
    assert_eq!(host.last_status(), "no results");
}

#[test]
fn test_references_overlay() {
    let mut host = FakeHost::new(MAIN, "let x = 1;\nx + x");
    let (mut client, _recorder) = started(&mut host);
    let uri = path_to_file_uri(Path::new(MAIN));

    client.find_references(&mut host);
    let location = |line: u32, character: u32| {
        object! {
            "uri" => uri.as_str(),
            "range" => object! {
                "start" => object! { "line" => line, "character" => character },
                "end" => object! { "line" => line, "character" => character + 1 },
            },
        }
    };
    client.receive(
        &mut host,
        &reply(1, Value::Array(vec![location(0, 4), location(1, 4)])),
    );

    assert_eq!(host.last_status(), "2 references");
    let overlay = host.overlay.clone().unwrap();
    assert_eq!(overlay.kind, OverlayKind::Message);
    assert_eq!(overlay.lines[0].trim_end(), "/work/src/main.rs:1:5");
    assert_eq!(overlay.lines[1].trim_end(), "/work/src/main.rs:2:5");
}

#[test]
fn test_server_error_is_reported() {
    let mut host = FakeHost::new(MAIN, "x");
    let (mut client, _recorder) = started(&mut host);

    client.format(&mut host);
    client.receive(
        &mut host,
        &encode_message(
            &from_str(r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"unsupported"}}"#)
                .unwrap(),
        ),
    );
    assert_eq!(host.last_status(), "server error -32601: unsupported");
}

#[test]
fn test_line_diagnostics_overlay() {
    let mut host = FakeHost::new(MAIN, "let x: u8 = 300;");
    let (mut client, _recorder) = started(&mut host);
    let uri = path_to_file_uri(Path::new(MAIN));

    client.receive(
        &mut host,
        &encode_message(&object! {
            "jsonrpc" => "2.0",
            "method" => "textDocument/publishDiagnostics",
            "params" => object! {
                "uri" => uri.as_str(),
                "diagnostics" => vec![from_str(
                    r#"{"range":{"start":{"line":0,"character":12},"end":{"line":0,"character":15}},"severity":1,"message":"literal out of range"}"#,
                ).unwrap()],
            },
        }),
    );
    assert_eq!(host.last_status(), "1 errors, 0 warnings");

    client.show_line_diagnostics(&mut host);
    let overlay = host.overlay.clone().unwrap();
    assert_eq!(overlay.lines[0].trim_end(), "error: literal out of range");
}

#[test]
fn test_actions_without_server() {
    let mut host = FakeHost::new(MAIN, "x");
    let mut client = Client::default();

    client.format(&mut host);
    assert_eq!(host.last_status(), "language server is not running");
    client.trigger_completion(&mut host);
    assert_eq!(host.last_status(), "language server is not running");
    assert!(!client.is_completing());

    client.save(&mut host);
    client.document_changed(&mut host);
    assert_eq!(host.status.len(), 2);
}

#[test]
fn test_server_exit_stops_the_session() {
    let mut host = FakeHost::new(MAIN, "x");
    let (mut client, _recorder) = started(&mut host);

    client.handle_process_event(&mut host, ProcessEvent::Stderr("panicked".to_string()));
    client.handle_process_event(&mut host, ProcessEvent::Exited(Some(101)));
    assert!(!client.session().is_running());
    assert_eq!(host.last_status(), "language server exited with status 101");

    client.goto_definition(&mut host);
    assert_eq!(host.last_status(), "language server is not running");
}
