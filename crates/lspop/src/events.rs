//! Typed views of server-initiated traffic: notifications, server requests and response errors.
//!
//! Classification of raw JSON-RPC messages happens here so the session only deals with
//! [`Incoming`] values.

use crate::position::LspRange;
use lspop_json::{ShapeError, Value, object};

/// Severity of a published diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DiagnosticSeverity {
    /// `1`
    Error,
    /// `2`
    Warning,
    /// Anything else, including an absent severity.
    Information,
}

impl DiagnosticSeverity {
    /// Map the numeric protocol severity.
    pub fn from_number(value: Option<u64>) -> Self {
        match value {
            Some(1) => Self::Error,
            Some(2) => Self::Warning,
            _ => Self::Information,
        }
    }

    /// Short label used in status lines and overlays.
    pub fn label(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Information => "info",
        }
    }
}

/// One entry of `textDocument/publishDiagnostics`.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    /// Affected range.
    pub range: LspRange,
    /// Severity, defaulting to information.
    pub severity: DiagnosticSeverity,
    /// Human-readable message.
    pub message: String,
    /// Producer, e.g. `rustc`.
    pub source: Option<String>,
}

impl Diagnostic {
    /// Decode a `Diagnostic` object. `range` is required; a missing message decodes as empty.
    pub fn from_value(value: &Value) -> Result<Self, ShapeError> {
        Ok(Self {
            range: LspRange::from_value(value.field("range")?)?,
            severity: DiagnosticSeverity::from_number(
                value.get("severity").and_then(Value::as_u64),
            ),
            message: value
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            source: value
                .get("source")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }
}

/// Parameters of `textDocument/publishDiagnostics`.
#[derive(Debug, Clone, PartialEq)]
pub struct PublishDiagnostics {
    /// Document the diagnostics belong to.
    pub uri: String,
    /// Document version, when the server reports one.
    pub version: Option<i64>,
    /// Diagnostics; entries with an unreadable range are skipped.
    pub diagnostics: Vec<Diagnostic>,
}

impl PublishDiagnostics {
    /// Decode the notification params.
    pub fn from_params(params: &Value) -> Result<Self, ShapeError> {
        let uri = params.field("uri")?.expect_str()?.to_string();
        let diagnostics = match params.get("diagnostics") {
            Some(list) => list
                .expect_array()?
                .iter()
                .filter_map(|item| Diagnostic::from_value(item).ok())
                .collect(),
            None => Vec::new(),
        };
        Ok(Self {
            uri,
            version: params.get("version").and_then(Value::as_i64),
            diagnostics,
        })
    }
}

/// `MessageType` of `window/showMessage` and `window/logMessage`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    /// `1`
    Error,
    /// `2`
    Warning,
    /// `3`
    Info,
    /// `4` and anything unrecognised.
    Log,
}

impl MessageType {
    /// Map the numeric protocol message type.
    pub fn from_number(value: Option<u64>) -> Self {
        match value {
            Some(1) => Self::Error,
            Some(2) => Self::Warning,
            Some(3) => Self::Info,
            _ => Self::Log,
        }
    }
}

/// Params of `window/showMessage` / `window/logMessage`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerMessage {
    /// Severity.
    pub typ: MessageType,
    /// Message text.
    pub message: String,
}

impl ServerMessage {
    fn from_params(params: &Value) -> Result<Self, ShapeError> {
        Ok(Self {
            typ: MessageType::from_number(params.get("type").and_then(Value::as_u64)),
            message: params.field("message")?.expect_str()?.to_string(),
        })
    }
}

/// Notifications the client understands.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// `textDocument/publishDiagnostics`
    PublishDiagnostics(PublishDiagnostics),
    /// `window/showMessage`
    ShowMessage(ServerMessage),
    /// `window/logMessage`
    LogMessage(ServerMessage),
}

impl Notification {
    /// Decode a notification by method name. Unknown methods yield `Ok(None)`.
    pub fn from_method_and_params(method: &str, params: &Value) -> Result<Option<Self>, ShapeError> {
        let notification = match method {
            "textDocument/publishDiagnostics" => {
                Self::PublishDiagnostics(PublishDiagnostics::from_params(params)?)
            }
            "window/showMessage" => Self::ShowMessage(ServerMessage::from_params(params)?),
            "window/logMessage" => Self::LogMessage(ServerMessage::from_params(params)?),
            _ => return Ok(None),
        };
        Ok(Some(notification))
    }
}

/// A request initiated by the server. The id is kept verbatim so the reply echoes it exactly.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerRequest {
    /// Request id (number or string).
    pub id: Value,
    /// Method name.
    pub method: String,
    /// Params, `null` when absent.
    pub params: Value,
}

impl ServerRequest {
    /// The result this client answers with. The client has no UI for server requests, so every
    /// request gets a harmless default that keeps the server from blocking.
    pub fn auto_reply(&self) -> Value {
        match self.method.as_str() {
            "workspace/configuration" => {
                let items = self
                    .params
                    .get("items")
                    .and_then(Value::as_array)
                    .map_or(0, Vec::len);
                Value::Array(vec![Value::Null; items])
            }
            _ => Value::Null,
        }
    }

    /// The complete JSON-RPC response message for [`ServerRequest::auto_reply`].
    pub fn auto_reply_message(&self) -> Value {
        object! {
            "jsonrpc" => "2.0",
            "id" => self.id.clone(),
            "result" => self.auto_reply(),
        }
    }
}

/// A JSON-RPC error object.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseError {
    /// Error code.
    pub code: i64,
    /// Human-readable message.
    pub message: String,
}

impl ResponseError {
    /// Decode `{ "code": .., "message": .. }`.
    pub fn from_value(value: &Value) -> Result<Self, ShapeError> {
        Ok(Self {
            code: value
                .field("code")?
                .as_i64()
                .ok_or(ShapeError::new("integer", "number"))?,
            message: value
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        })
    }
}

/// A response to one of our requests.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Echoed request id.
    pub id: u64,
    /// `Ok(result)` or the server's error object.
    pub outcome: Result<Value, ResponseError>,
}

/// A classified inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    /// Has `id` and `result`/`error`, no `method`.
    Response(Response),
    /// Has `method`, no `id`.
    Notification {
        /// Method name.
        method: String,
        /// Params, `null` when absent.
        params: Value,
    },
    /// Has both `method` and `id`.
    Request(ServerRequest),
}

impl Incoming {
    /// Classify a decoded message.
    ///
    /// Responses must carry the `"jsonrpc"` marker and either `result` or `error`; anything else
    /// is a shape error.
    pub fn classify(message: &Value) -> Result<Self, ShapeError> {
        message.expect_object()?;
        let params = || message.get("params").cloned().unwrap_or_default();

        if let Some(method) = message.get("method") {
            let method = method.expect_str()?.to_string();
            return Ok(match message.get("id") {
                Some(id) => Self::Request(ServerRequest {
                    id: id.clone(),
                    method,
                    params: params(),
                }),
                None => Self::Notification {
                    method,
                    params: params(),
                },
            });
        }

        message.field("jsonrpc")?.expect_str()?;
        let id = message.field("id")?.expect_u64()?;
        let outcome = match (message.get("result"), message.get("error")) {
            (_, Some(error)) => Err(ResponseError::from_value(error)?),
            (Some(result), None) => Ok(result.clone()),
            (None, None) => {
                return Err(ShapeError::new("result or error", "missing"));
            }
        };
        Ok(Self::Response(Response { id, outcome }))
    }
}
