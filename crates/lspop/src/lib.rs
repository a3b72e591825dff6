#![warn(missing_docs)]
//! `lspop` - a single-slot language server client for terminal editors.
//!
//! The crate covers the protocol side of editor integration: Content-Length stream framing,
//! JSON-RPC request correlation through one pending-request slot, completion filtering and
//! paging, and placement of popup overlays inside a character grid. Editors plug in through
//! [`EditorHost`]; [`Client`] turns user actions into requests and server replies into edits,
//! cursor jumps, status messages and overlays.
//!
//! JSON values come from the companion `lspop-json` crate and are re-exported as [`json`].

pub mod client;
pub mod completion;
pub mod config;
pub mod error;
pub mod events;
pub mod framing;
pub mod host;
pub mod locations;
pub mod overlay;
pub mod placement;
pub mod position;
pub mod process;
pub mod session;
pub mod text_edits;
pub mod uri;

pub use lspop_json as json;

pub use client::Client;
pub use completion::{
    CompletionCandidate, CompletionMenu, VisiblePage, compute_visible_page, filter_and_sort,
    parse_completion_result, prefix_at, snippet_to_plain_text,
};
pub use config::{
    OverlayConfig, ServerConfig, SessionOptions, default_server_command, find_project_root,
    guess_language_id,
};
pub use error::ClientError;
pub use events::{
    Diagnostic, DiagnosticSeverity, Incoming, MessageType, Notification, PublishDiagnostics,
    Response, ResponseError, ServerMessage, ServerRequest,
};
pub use framing::{MessageFramer, decode_body, encode_frame, encode_message};
pub use host::{EditorHost, TextPoint};
pub use locations::{Location, locations_from_value};
pub use overlay::{
    Overlay, OverlayArea, OverlayKind, completion_overlay, fit_to_width, message_overlay,
};
pub use placement::{ScreenPoint, ScreenRect, place};
pub use position::{LspPosition, LspRange, Utf16Converter};
pub use process::{ChildTransport, ProcessEvent, ServerProcess};
pub use session::{
    Method, PendingRequest, Reply, RequestHandle, ServerInfo, Session, SessionEvent, Transport,
};
pub use text_edits::{TextEdit, application_order, apply_text_edits, byte_offset, text_edits_from_value};
pub use uri::{file_uri_to_path, path_to_file_uri};
