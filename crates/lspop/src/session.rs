//! The protocol session: one connection to one language server.
//!
//! The session owns everything with a protocol lifetime: the request id counter, the single
//! pending-request slot, the inbound framer, open documents and the event queue. Hosts feed it
//! server output with [`Session::receive`] and collect results with [`Session::drain_events`].
//!
//! Only one request is tracked at a time. Issuing a request overwrites the slot; a reply for an
//! overwritten request is stale and dropped. Completion is the exception: with
//! [`SessionOptions::retain_completion_slot`] set, the slot stays installed after a completion
//! reply, and replies to earlier queries of the same typing streak are still delivered as long
//! as nothing newer from the streak has been.

use crate::completion::{CompletionCandidate, parse_completion_result};
use crate::config::SessionOptions;
use crate::error::ClientError;
use crate::events::{
    Diagnostic, Incoming, Notification, PublishDiagnostics, Response, ResponseError, ServerMessage,
};
use crate::framing::{MessageFramer, encode_message};
use crate::locations::{Location, locations_from_value};
use crate::position::LspPosition;
use crate::text_edits::{TextEdit, text_edits_from_value};
use crate::uri::path_to_file_uri;
use lspop_json::{ShapeError, Value, object};
use std::collections::{BTreeMap, VecDeque};
use std::io;
use std::path::Path;
use tracing::{debug, info, warn};

/// Outbound byte sink, usually the server's stdin.
pub trait Transport {
    /// Write one complete frame.
    fn send(&mut self, frame: &[u8]) -> io::Result<()>;
}

/// Requests this client issues.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    /// `initialize`
    Initialize,
    /// `textDocument/completion`
    Completion,
    /// `textDocument/formatting`
    Formatting,
    /// `textDocument/definition`
    Definition,
    /// `textDocument/references`
    References,
    /// `shutdown`
    Shutdown,
    /// Any other method; its result is passed through untouched.
    Other(String),
}

impl Method {
    /// Wire name.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Initialize => "initialize",
            Self::Completion => "textDocument/completion",
            Self::Formatting => "textDocument/formatting",
            Self::Definition => "textDocument/definition",
            Self::References => "textDocument/references",
            Self::Shutdown => "shutdown",
            Self::Other(method) => method,
        }
    }

    /// Whether the pending slot may outlive a reply to this method.
    pub fn retains_slot(&self) -> bool {
        matches!(self, Self::Completion)
    }
}

/// The single outstanding exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    /// Id of the most recent request.
    pub id: u64,
    /// Its method.
    pub method: Method,
    /// Slot survives replies.
    pub retain: bool,
    /// First id of the retained streak; equals `id` when not retained.
    pub first_id: u64,
    /// Newest id of the streak whose reply has been delivered.
    pub last_delivered: Option<u64>,
}

/// Identifies the request a reply belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHandle {
    /// Request id.
    pub id: u64,
    /// Request method.
    pub method: Method,
}

/// What the server told us in `initialize`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ServerInfo {
    /// `serverInfo.name`
    pub name: Option<String>,
    /// `serverInfo.version`
    pub version: Option<String>,
    /// Raw `capabilities`.
    pub capabilities: Value,
}

impl ServerInfo {
    /// Decode an `InitializeResult`.
    pub fn from_result(result: &Value) -> Result<Self, ShapeError> {
        result.expect_object()?;
        let server_info = result.get("serverInfo");
        let text = |key: &str| {
            server_info
                .and_then(|info| info.get(key))
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        Ok(Self {
            name: text("name"),
            version: text("version"),
            capabilities: result.get("capabilities").cloned().unwrap_or_default(),
        })
    }

    /// `name version`, or whatever part is known.
    pub fn label(&self) -> Option<String> {
        match (&self.name, &self.version) {
            (Some(name), Some(version)) => Some(format!("{name} {version}")),
            (Some(name), None) => Some(name.clone()),
            _ => None,
        }
    }

    /// Whether `capabilities.<key>` is present and not `false`/`null`.
    pub fn supports(&self, key: &str) -> bool {
        !matches!(
            self.capabilities.get(key),
            None | Some(Value::Null) | Some(Value::Bool(false))
        )
    }
}

/// A decoded reply.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// `initialize`
    Initialize(ServerInfo),
    /// `textDocument/completion`
    Completion(Vec<CompletionCandidate>),
    /// `textDocument/formatting`
    Formatting(Vec<TextEdit>),
    /// `textDocument/definition`
    Definition(Vec<Location>),
    /// `textDocument/references`
    References(Vec<Location>),
    /// `shutdown`
    Shutdown,
    /// Untyped result of [`Method::Other`].
    Other(Value),
    /// The server answered with an error object.
    Error(ResponseError),
}

impl Reply {
    /// Decode `result` according to the method that produced it.
    pub fn decode(method: &Method, result: &Value) -> Result<Self, ShapeError> {
        Ok(match method {
            Method::Initialize => Self::Initialize(ServerInfo::from_result(result)?),
            Method::Completion => Self::Completion(parse_completion_result(result)?),
            Method::Formatting => Self::Formatting(text_edits_from_value(result)?),
            Method::Definition => Self::Definition(locations_from_value(result)),
            Method::References => Self::References(locations_from_value(result)),
            Method::Shutdown => Self::Shutdown,
            Method::Other(_) => Self::Other(result.clone()),
        })
    }
}

/// Something the host should react to.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The handshake finished; `initialized` was sent.
    Initialized(ServerInfo),
    /// A reply to one of our requests.
    Reply(RequestHandle, Reply),
    /// New diagnostics for the active document.
    Diagnostics(PublishDiagnostics),
    /// `window/showMessage`
    ShowMessage(ServerMessage),
    /// `window/logMessage`
    LogMessage(ServerMessage),
}

#[derive(Debug, Clone)]
struct DocumentState {
    language_id: String,
    version: i64,
    /// Text waiting for `didOpen` until the handshake completes.
    unopened_text: Option<String>,
}

/// A protocol session. See the module docs.
pub struct Session {
    options: SessionOptions,
    transport: Option<Box<dyn Transport>>,
    next_id: u64,
    pending: Option<PendingRequest>,
    framer: MessageFramer,
    initialized: bool,
    server_info: Option<ServerInfo>,
    documents: BTreeMap<String, DocumentState>,
    active: Option<String>,
    diagnostics: Vec<Diagnostic>,
    events: VecDeque<SessionEvent>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(SessionOptions::default())
    }
}

impl Session {
    /// A stopped session.
    pub fn new(options: SessionOptions) -> Self {
        Self {
            options,
            transport: None,
            next_id: 0,
            pending: None,
            framer: MessageFramer::new(),
            initialized: false,
            server_info: None,
            documents: BTreeMap::new(),
            active: None,
            diagnostics: Vec::new(),
            events: VecDeque::new(),
        }
    }

    /// Options in effect.
    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Reset all protocol state and attach `transport`.
    pub fn start(&mut self, transport: Box<dyn Transport>) {
        self.reset();
        self.transport = Some(transport);
        info!("session started");
    }

    /// Detach the transport and reset all protocol state. Replies still in flight are lost.
    pub fn stop(&mut self) {
        if self.transport.is_some() {
            info!("session stopped");
        }
        self.reset();
    }

    fn reset(&mut self) {
        self.transport = None;
        self.next_id = 0;
        self.pending = None;
        self.framer.clear();
        self.initialized = false;
        self.server_info = None;
        self.documents.clear();
        self.active = None;
        self.diagnostics.clear();
        self.events.clear();
    }

    /// Whether a transport is attached.
    pub fn is_running(&self) -> bool {
        self.transport.is_some()
    }

    /// Whether the `initialize` handshake completed.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Server details from the handshake.
    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.server_info.as_ref()
    }

    /// The occupied pending slot, if any.
    pub fn pending(&self) -> Option<&PendingRequest> {
        self.pending.as_ref()
    }

    /// Id the next request will get.
    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    /// URI of the active document.
    pub fn active_document(&self) -> Option<&str> {
        self.active.as_deref()
    }

    /// Last version sent for `uri`.
    pub fn document_version(&self, uri: &str) -> Option<i64> {
        self.documents.get(uri).map(|doc| doc.version)
    }

    /// Latest diagnostics of the active document.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Diagnostics of the active document touching `line`.
    pub fn diagnostics_on_line(&self, line: u32) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(move |diag| diag.range.start.line <= line && line <= diag.range.end.line)
    }

    /// Take every queued event, oldest first.
    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        self.events.drain(..).collect()
    }

    /// Drop a retained completion slot, e.g. when the menu closes.
    pub fn release_pending(&mut self) {
        if self.pending.as_ref().is_some_and(|pending| pending.retain) {
            self.pending = None;
        }
    }

    /// Send a request and install it in the pending slot, replacing whatever was there.
    ///
    /// Without a transport nothing changes and [`ClientError::TransportUnavailable`] is returned.
    pub fn request(&mut self, method: Method, params: Value) -> Result<RequestHandle, ClientError> {
        if self.transport.is_none() {
            return Err(ClientError::TransportUnavailable);
        }

        let id = self.next_id;
        self.next_id += 1;

        let retain = method.retains_slot() && self.options.retain_completion_slot;
        let (first_id, last_delivered) = match &self.pending {
            Some(previous) if retain && previous.retain && previous.method == method => {
                (previous.first_id, previous.last_delivered)
            }
            _ => (id, None),
        };
        if let Some(previous) = &self.pending
            && !retain
        {
            debug!(
                "request id={} ({}) superseded by id={id}",
                previous.id,
                previous.method.as_str()
            );
        }
        self.pending = Some(PendingRequest {
            id,
            method: method.clone(),
            retain,
            first_id,
            last_delivered,
        });

        let message = object! {
            "jsonrpc" => "2.0",
            "id" => id,
            "method" => method.as_str(),
            "params" => params,
        };
        self.send_message(&message)?;
        Ok(RequestHandle { id, method })
    }

    /// Send a notification. The pending slot is untouched.
    pub fn notify(&mut self, method: &str, params: Value) -> Result<(), ClientError> {
        let message = object! {
            "jsonrpc" => "2.0",
            "method" => method,
            "params" => params,
        };
        self.send_message(&message)
    }

    fn send_message(&mut self, message: &Value) -> Result<(), ClientError> {
        let Some(transport) = self.transport.as_mut() else {
            return Err(ClientError::TransportUnavailable);
        };
        if let Err(err) = transport.send(&encode_message(message)) {
            warn!("language server transport failed: {err}");
            self.transport = None;
            self.pending = None;
            return Err(ClientError::Transport(err));
        }
        Ok(())
    }

    /// Feed raw server output. Every complete message is handled before returning; malformed,
    /// stale and unsolicited messages are logged and dropped.
    pub fn receive(&mut self, chunk: &[u8]) {
        for message in self.framer.feed(chunk) {
            if let Err(err) = self.dispatch(&message) {
                if err.is_ignorable() {
                    debug!("ignoring message: {err}");
                } else {
                    warn!("failed to handle message: {err}");
                }
            }
        }
    }

    fn dispatch(&mut self, message: &Value) -> Result<(), ClientError> {
        match Incoming::classify(message)? {
            Incoming::Request(request) => {
                debug!("auto-replying to server request {}", request.method);
                self.send_message(&request.auto_reply_message())
            }
            Incoming::Notification { method, params } => {
                match Notification::from_method_and_params(&method, &params)? {
                    Some(Notification::PublishDiagnostics(published)) => {
                        if self.active.as_deref() == Some(published.uri.as_str()) {
                            self.diagnostics = published.diagnostics.clone();
                            self.push_event(SessionEvent::Diagnostics(published));
                        } else {
                            debug!("ignoring diagnostics for inactive {}", published.uri);
                        }
                    }
                    Some(Notification::ShowMessage(shown)) => {
                        self.push_event(SessionEvent::ShowMessage(shown));
                    }
                    Some(Notification::LogMessage(logged)) => {
                        self.push_event(SessionEvent::LogMessage(logged));
                    }
                    None => debug!("ignoring notification {method}"),
                }
                Ok(())
            }
            Incoming::Response(response) => self.handle_response(response),
        }
    }

    fn handle_response(&mut self, response: Response) -> Result<(), ClientError> {
        let Some(pending) = &mut self.pending else {
            return Err(ClientError::ProtocolMismatch { id: response.id });
        };

        // A streak reply older than one already delivered would roll the menu back.
        let current = response.id == pending.id;
        let earlier_in_streak = pending.retain
            && pending.first_id <= response.id
            && response.id < pending.id
            && pending.last_delivered.is_none_or(|delivered| response.id > delivered);
        if !current && !earlier_in_streak {
            return Err(ClientError::StaleResponse {
                id: response.id,
                pending: pending.id,
            });
        }

        let method = pending.method.clone();
        if pending.retain {
            pending.last_delivered = Some(response.id);
        } else {
            self.pending = None;
        }
        let handle = RequestHandle {
            id: response.id,
            method,
        };

        let reply = match response.outcome {
            Ok(result) => Reply::decode(&handle.method, &result)?,
            Err(error) => Reply::Error(error),
        };

        match reply {
            Reply::Initialize(info) => self.finish_handshake(info),
            Reply::Shutdown => {
                self.push_event(SessionEvent::Reply(handle, Reply::Shutdown));
                self.notify("exit", Value::Null)
            }
            reply => {
                self.push_event(SessionEvent::Reply(handle, reply));
                Ok(())
            }
        }
    }

    fn finish_handshake(&mut self, info: ServerInfo) -> Result<(), ClientError> {
        info!(
            "language server initialized: {}",
            info.label().as_deref().unwrap_or("unnamed")
        );
        self.initialized = true;
        self.server_info = Some(info.clone());
        self.notify("initialized", object! {})?;

        let unopened = self
            .documents
            .iter_mut()
            .filter_map(|(uri, doc)| {
                let text = doc.unopened_text.take()?;
                Some((uri.clone(), doc.language_id.clone(), doc.version, text))
            })
            .collect::<Vec<_>>();
        for (uri, language_id, version, text) in unopened {
            self.send_did_open(&uri, &language_id, version, text)?;
        }

        self.push_event(SessionEvent::Initialized(info));
        Ok(())
    }

    fn push_event(&mut self, event: SessionEvent) {
        if self.options.event_capacity == 0 {
            return;
        }
        if self.events.len() == self.options.event_capacity {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    fn require_running(&self) -> Result<(), ClientError> {
        if self.transport.is_some() {
            Ok(())
        } else {
            Err(ClientError::TransportUnavailable)
        }
    }

    fn active_uri(&self) -> Result<String, ClientError> {
        self.require_running()?;
        self.active.clone().ok_or(ClientError::NoActiveDocument)
    }

    fn text_document(uri: &str) -> Value {
        object! { "uri" => uri }
    }

    /// Send `initialize` for a workspace rooted at `root`.
    pub fn initialize(&mut self, root: &Path) -> Result<RequestHandle, ClientError> {
        self.require_running()?;
        let root_uri = path_to_file_uri(root);
        let name = root
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("workspace")
            .to_string();

        let params = object! {
            "processId" => std::process::id(),
            "rootUri" => root_uri.as_str(),
            "workspaceFolders" => vec![object! { "uri" => root_uri.as_str(), "name" => name }],
            "capabilities" => object! {
                "workspace" => object! {
                    "configuration" => true,
                    "workspaceFolders" => true,
                },
                "textDocument" => object! {
                    "synchronization" => object! { "didSave" => true },
                    "completion" => object! {
                        "completionItem" => object! { "snippetSupport" => false },
                    },
                    "publishDiagnostics" => object! { "relatedInformation" => false },
                },
            },
            "clientInfo" => object! {
                "name" => "lspop",
                "version" => env!("CARGO_PKG_VERSION"),
            },
        };
        self.request(Method::Initialize, params)
    }

    /// Announce `uri` and make it the active document.
    ///
    /// Before the handshake completes the `didOpen` is held back and sent right after
    /// `initialized`. Opening a known document sends its text as a change instead.
    pub fn open_document(
        &mut self,
        uri: &str,
        language_id: &str,
        text: impl Into<String>,
    ) -> Result<(), ClientError> {
        self.require_running()?;
        let text = text.into();

        if self.documents.contains_key(uri) {
            self.set_active(uri);
            return self.did_change(text);
        }

        self.set_active(uri);
        if self.initialized {
            self.documents.insert(
                uri.to_string(),
                DocumentState {
                    language_id: language_id.to_string(),
                    version: 1,
                    unopened_text: None,
                },
            );
            self.send_did_open(uri, language_id, 1, text)
        } else {
            self.documents.insert(
                uri.to_string(),
                DocumentState {
                    language_id: language_id.to_string(),
                    version: 1,
                    unopened_text: Some(text),
                },
            );
            Ok(())
        }
    }

    fn set_active(&mut self, uri: &str) {
        if self.active.as_deref() != Some(uri) {
            self.active = Some(uri.to_string());
            self.diagnostics.clear();
        }
    }

    fn send_did_open(
        &mut self,
        uri: &str,
        language_id: &str,
        version: i64,
        text: String,
    ) -> Result<(), ClientError> {
        self.notify(
            "textDocument/didOpen",
            object! {
                "textDocument" => object! {
                    "uri" => uri,
                    "languageId" => language_id,
                    "version" => version,
                    "text" => text,
                },
            },
        )
    }

    /// Send the full new text of the active document with the next version number.
    pub fn did_change(&mut self, text: impl Into<String>) -> Result<(), ClientError> {
        let uri = self.active_uri()?;
        let text = text.into();
        let Some(doc) = self.documents.get_mut(&uri) else {
            return Err(ClientError::NoActiveDocument);
        };

        if doc.unopened_text.is_some() {
            doc.unopened_text = Some(text);
            return Ok(());
        }

        doc.version += 1;
        let version = doc.version;
        self.notify(
            "textDocument/didChange",
            object! {
                "textDocument" => object! { "uri" => uri.as_str(), "version" => version },
                "contentChanges" => vec![object! { "text" => text }],
            },
        )
    }

    /// Tell the server the active document was written to disk.
    pub fn did_save(&mut self, text: Option<&str>) -> Result<(), ClientError> {
        let uri = self.active_uri()?;
        if self
            .documents
            .get(&uri)
            .is_some_and(|doc| doc.unopened_text.is_some())
        {
            return Ok(());
        }

        let mut params = object! { "textDocument" => Self::text_document(&uri) };
        if let Some(text) = text {
            params.insert("text", text);
        }
        self.notify("textDocument/didSave", params)
    }

    /// Close the active document.
    pub fn did_close(&mut self) -> Result<(), ClientError> {
        let uri = self.active_uri()?;
        self.active = None;
        self.diagnostics.clear();
        let Some(doc) = self.documents.remove(&uri) else {
            return Ok(());
        };
        if doc.unopened_text.is_some() {
            return Ok(());
        }
        self.notify(
            "textDocument/didClose",
            object! { "textDocument" => Self::text_document(&uri) },
        )
    }

    fn document_request(
        &mut self,
        method: Method,
        extra: impl FnOnce(&mut Value),
    ) -> Result<RequestHandle, ClientError> {
        let uri = self.active_uri()?;
        if !self.initialized {
            return Err(ClientError::NotInitialized);
        }
        let mut params = object! { "textDocument" => Self::text_document(&uri) };
        extra(&mut params);
        self.request(method, params)
    }

    /// Ask for completions at `position` in the active document.
    pub fn request_completion(
        &mut self,
        position: LspPosition,
    ) -> Result<RequestHandle, ClientError> {
        self.document_request(Method::Completion, |params| {
            params.insert("position", position.to_value());
        })
    }

    /// Ask for whole-document formatting edits.
    pub fn request_formatting(
        &mut self,
        tab_size: u32,
        insert_spaces: bool,
    ) -> Result<RequestHandle, ClientError> {
        self.document_request(Method::Formatting, |params| {
            params.insert(
                "options",
                object! { "tabSize" => tab_size, "insertSpaces" => insert_spaces },
            );
        })
    }

    /// Ask where the symbol at `position` is defined.
    pub fn request_definition(
        &mut self,
        position: LspPosition,
    ) -> Result<RequestHandle, ClientError> {
        self.document_request(Method::Definition, |params| {
            params.insert("position", position.to_value());
        })
    }

    /// Ask for every reference to the symbol at `position`.
    pub fn request_references(
        &mut self,
        position: LspPosition,
        include_declaration: bool,
    ) -> Result<RequestHandle, ClientError> {
        self.document_request(Method::References, |params| {
            params.insert("position", position.to_value());
            params.insert(
                "context",
                object! { "includeDeclaration" => include_declaration },
            );
        })
    }

    /// Ask the server to shut down. `exit` follows automatically when it answers.
    pub fn shutdown(&mut self) -> Result<RequestHandle, ClientError> {
        self.request(Method::Shutdown, Value::Null)
    }
}
