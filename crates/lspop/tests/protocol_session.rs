use lspop::json::{Value, from_str, object};
use lspop::{
    ClientError, LspPosition, MessageFramer, Method, Reply, Session, SessionEvent, SessionOptions,
    Transport, encode_frame, encode_message,
};
use pretty_assertions::assert_eq;
use std::cell::RefCell;
use std::io;
use std::path::Path;
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
    /// Messages written since the last call.
    fn take(&self) -> Vec<Value> {
        MessageFramer::new().feed(&self.0.borrow_mut().split_off(0))
    }

    fn methods(&self) -> Vec<String> {
        self.take()
            .iter()
            .map(|message| {
                message
                    .get("method")
                    .and_then(Value::as_str)
                    .unwrap_or("<response>")
                    .to_string()
            })
            .collect()
    }
}

struct Broken;

impl Transport for Broken {
    fn send(&mut self, _frame: &[u8]) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "gone"))
    }
}

fn reply(id: u64, result: Value) -> Vec<u8> {
    encode_message(&object! { "jsonrpc" => "2.0", "id" => id, "result" => result })
}

const URI: &str = "file:///work/src/main.rs";

/// A session past the handshake with `URI` open.
fn ready_session(options: SessionOptions) -> (Session, Recorder) {
    let recorder = Recorder::default();
    let mut session = Session::new(options);
    session.start(Box::new(recorder.clone()));
    session.initialize(Path::new("/work")).unwrap();
    session.open_document(URI, "rust", "fn main() {}\n").unwrap();
    session.receive(&reply(0, object! { "capabilities" => object! {} }));
    session.drain_events();
    recorder.take();
    (session, recorder)
}

fn completion_labels(event: &SessionEvent) -> Option<(u64, Vec<String>)> {
    match event {
        SessionEvent::Reply(handle, Reply::Completion(items)) => Some((
            handle.id,
            items.iter().map(|item| item.label.clone()).collect(),
        )),
        _ => None,
    }
}

#[test]
fn test_handshake_flushes_queued_did_open() {
    let recorder = Recorder::default();
    let mut session = Session::default();
    session.start(Box::new(recorder.clone()));
    session.initialize(Path::new("/work")).unwrap();
    session.open_document(URI, "rust", "fn main() {}\n").unwrap();
    session.did_change("fn main() { }\n").unwrap();
    assert_eq!(recorder.methods(), vec!["initialize"]);

    let err = session
        .request_completion(LspPosition::new(0, 3))
        .unwrap_err();
    assert!(matches!(err, ClientError::NotInitialized));
    assert_eq!(session.pending().map(|p| p.method.clone()), Some(Method::Initialize));

    session.receive(&reply(
        0,
        from_str(r#"{"capabilities":{},"serverInfo":{"name":"fake","version":"1"}}"#).unwrap(),
    ));
    assert!(session.is_initialized());

    let sent = recorder.take();
    let methods = sent
        .iter()
        .filter_map(|message| message.get("method").and_then(Value::as_str))
        .collect::<Vec<_>>();
    assert_eq!(methods, vec!["initialized", "textDocument/didOpen"]);
    let document = sent[1].get("params").and_then(|p| p.get("textDocument")).unwrap();
    assert_eq!(document.get("text"), Some(&Value::from("fn main() { }\n")));
    assert_eq!(document.get("version"), Some(&Value::from(1u32)));

    let events = session.drain_events();
    assert!(matches!(
        events.as_slice(),
        [SessionEvent::Initialized(info)] if info.label().as_deref() == Some("fake 1")
    ));
}

#[test]
fn test_only_latest_request_is_delivered() {
    let (mut session, _recorder) = ready_session(SessionOptions {
        retain_completion_slot: false,
        ..SessionOptions::default()
    });

    let first = session.request_definition(LspPosition::new(0, 3)).unwrap();
    let second = session.request_definition(LspPosition::new(0, 4)).unwrap();
    assert_eq!((first.id, second.id), (1, 2));

    let location = from_str(
        r#"{"uri":"file:///work/src/main.rs","range":{"start":{"line":0,"character":3},"end":{"line":0,"character":7}}}"#,
    )
    .unwrap();
    session.receive(&reply(1, location.clone()));
    assert_eq!(session.drain_events(), vec![]);
    assert_eq!(session.pending().map(|p| p.id), Some(2));

    session.receive(&reply(2, location));
    let events = session.drain_events();
    assert_eq!(events.len(), 1);
    assert!(matches!(
        &events[0],
        SessionEvent::Reply(handle, Reply::Definition(locations))
            if handle.id == 2 && locations.len() == 1
    ));
    assert!(session.pending().is_none());
}

#[test]
fn test_completion_streak_delivers_earlier_replies() {
    let (mut session, _recorder) = ready_session(SessionOptions::default());

    session.request_completion(LspPosition::new(0, 1)).unwrap();
    session.request_completion(LspPosition::new(0, 2)).unwrap();
    let pending = session.pending().cloned().unwrap();
    assert_eq!((pending.first_id, pending.id), (1, 2));

    session.receive(&reply(1, from_str(r#"[{"label":"fn"}]"#).unwrap()));
    session.receive(&reply(2, from_str(r#"[{"label":"for"}]"#).unwrap()));
    let delivered = session
        .drain_events()
        .iter()
        .filter_map(completion_labels)
        .collect::<Vec<_>>();
    assert_eq!(
        delivered,
        vec![(1, vec!["fn".to_string()]), (2, vec!["for".to_string()])]
    );

    // A different method starts over; the old streak is stale.
    session.request_formatting(4, true).unwrap();
    session.receive(&reply(2, from_str("[]").unwrap()));
    assert_eq!(session.drain_events(), vec![]);
    session.receive(&reply(3, Value::Null));
    assert!(matches!(
        session.drain_events().as_slice(),
        [SessionEvent::Reply(_, Reply::Formatting(edits))] if edits.is_empty()
    ));
}

#[test]
fn test_out_of_order_streak_reply_is_dropped() {
    let (mut session, _recorder) = ready_session(SessionOptions::default());

    session.request_completion(LspPosition::new(0, 1)).unwrap();
    session.request_completion(LspPosition::new(0, 3)).unwrap();

    session.receive(&reply(2, from_str(r#"[{"label":"foo_new"}]"#).unwrap()));
    session.receive(&reply(1, from_str(r#"[{"label":"f_old"}]"#).unwrap()));
    let delivered = session
        .drain_events()
        .iter()
        .filter_map(completion_labels)
        .collect::<Vec<_>>();
    assert_eq!(delivered, vec![(2, vec!["foo_new".to_string()])]);
    assert_eq!(session.pending().unwrap().last_delivered, Some(2));

    // The streak continues past the delivered reply.
    session.request_completion(LspPosition::new(0, 4)).unwrap();
    session.receive(&reply(3, from_str(r#"[{"label":"foo_newer"}]"#).unwrap()));
    let delivered = session
        .drain_events()
        .iter()
        .filter_map(completion_labels)
        .collect::<Vec<_>>();
    assert_eq!(delivered, vec![(3, vec!["foo_newer".to_string()])]);
}

#[test]
fn test_server_requests_are_answered() {
    let (mut session, recorder) = ready_session(SessionOptions::default());
    let pending_before = session.pending().cloned();

    session.receive(&encode_message(&from_str(
        r#"{"jsonrpc":"2.0","id":"cfg-1","method":"workspace/configuration","params":{"items":[{"section":"a"},{"section":"b"}]}}"#,
    ).unwrap()));
    session.receive(&encode_message(&from_str(
        r#"{"jsonrpc":"2.0","id":7,"method":"client/registerCapability","params":{"registrations":[]}}"#,
    ).unwrap()));

    assert_eq!(
        recorder.take(),
        vec![
            from_str(r#"{"jsonrpc":"2.0","id":"cfg-1","result":[null,null]}"#).unwrap(),
            from_str(r#"{"jsonrpc":"2.0","id":7,"result":null}"#).unwrap(),
        ]
    );
    assert_eq!(session.pending().cloned(), pending_before);
    assert_eq!(session.drain_events(), vec![]);
}

#[test]
fn test_diagnostics_only_for_active_document() {
    let (mut session, _recorder) = ready_session(SessionOptions::default());

    let publish = |uri: &str| {
        encode_message(&object! {
            "jsonrpc" => "2.0",
            "method" => "textDocument/publishDiagnostics",
            "params" => object! {
                "uri" => uri,
                "diagnostics" => vec![from_str(
                    r#"{"range":{"start":{"line":0,"character":0},"end":{"line":0,"character":2}},"severity":1,"message":"bad"}"#,
                ).unwrap()],
            },
        })
    };

    session.receive(&publish("file:///work/src/other.rs"));
    assert!(session.diagnostics().is_empty());
    assert_eq!(session.drain_events(), vec![]);

    session.receive(&publish(URI));
    assert_eq!(session.diagnostics().len(), 1);
    assert_eq!(session.diagnostics_on_line(0).count(), 1);
    assert_eq!(session.diagnostics_on_line(1).count(), 0);
    assert!(matches!(
        session.drain_events().as_slice(),
        [SessionEvent::Diagnostics(published)] if published.uri == URI
    ));
}

#[test]
fn test_garbage_between_messages_is_survivable() {
    let (mut session, _recorder) = ready_session(SessionOptions::default());
    session.request_completion(LspPosition::new(0, 0)).unwrap();

    let mut bytes = encode_frame(b"{not json");
    bytes.extend(reply(1, from_str(r#"{"isIncomplete":false,"items":[{"label":"x"}]}"#).unwrap()));
    session.receive(&bytes);

    let delivered = session
        .drain_events()
        .iter()
        .filter_map(completion_labels)
        .collect::<Vec<_>>();
    assert_eq!(delivered, vec![(1, vec!["x".to_string()])]);
}

#[test]
fn test_restart_resets_protocol_state() {
    let (mut session, _recorder) = ready_session(SessionOptions::default());
    session.request_completion(LspPosition::new(0, 0)).unwrap();
    session.receive(b"Content-Length: 40\r\n\r\n{\"jsonrpc\"");

    let recorder = Recorder::default();
    session.start(Box::new(recorder.clone()));
    assert_eq!(session.next_id(), 0);
    assert!(session.pending().is_none());
    assert!(!session.is_initialized());
    assert_eq!(session.active_document(), None);

    // The half-received frame from the old server is gone.
    session.initialize(Path::new("/work")).unwrap();
    session.receive(&reply(0, object! { "capabilities" => object! {} }));
    assert!(session.is_initialized());
}

#[test]
fn test_failed_write_stops_the_session() {
    let mut session = Session::default();
    session.start(Box::new(Broken));
    let err = session.initialize(Path::new("/work")).unwrap_err();
    assert!(matches!(err, ClientError::Transport(_)));
    assert!(!session.is_running());
    assert!(session.pending().is_none());

    let err = session.shutdown().unwrap_err();
    assert!(matches!(err, ClientError::TransportUnavailable));
}

#[test]
fn test_shutdown_is_followed_by_exit() {
    let (mut session, recorder) = ready_session(SessionOptions::default());
    session.shutdown().unwrap();
    session.receive(&reply(1, Value::Null));
    assert_eq!(recorder.methods(), vec!["shutdown", "exit"]);
    assert!(matches!(
        session.drain_events().as_slice(),
        [SessionEvent::Reply(_, Reply::Shutdown)]
    ));
}
