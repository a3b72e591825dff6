use crate::events::ResponseError;
use lspop_json::{ShapeError, SyntaxError};
use thiserror::Error;

#[derive(Debug, Error)]
/// Errors produced by the protocol session and the user-facing client actions.
///
/// Only [`ClientError::TransportUnavailable`], [`ClientError::NoResults`] and
/// [`ClientError::Server`] are meant for the user; the rest are logged and swallowed at the
/// message-decode boundary.
pub enum ClientError {
    #[error("language server is not running")]
    /// No live server process; send operations are no-ops.
    TransportUnavailable,

    #[error("failed to write to language server: {0}")]
    /// Writing a frame to the server failed. The transport is dropped afterwards.
    Transport(#[from] std::io::Error),

    #[error("language server is still starting")]
    /// A document request was issued before the `initialize` handshake finished.
    NotInitialized,

    #[error("no document is open")]
    /// A document-scoped request was issued before any `didOpen`.
    NoActiveDocument,

    #[error("no results")]
    /// The server answered with an empty result.
    NoResults,

    #[error("response id={id} arrived with no request pending")]
    /// A response arrived while the pending slot was empty.
    ProtocolMismatch {
        /// Id carried by the response.
        id: u64,
    },

    #[error("response id={id} superseded by pending request id={pending}")]
    /// A response for a request that was overwritten by a newer one.
    StaleResponse {
        /// Id carried by the response.
        id: u64,
        /// Id currently occupying the pending slot.
        pending: u64,
    },

    #[error("malformed message body: {0}")]
    /// A framed body was not valid JSON.
    Json(#[from] SyntaxError),

    #[error("unexpected message shape: {0}")]
    /// A decoded message did not have the required shape.
    Shape(#[from] ShapeError),

    #[error("server error {}: {}", .0.code, .0.message)]
    /// The server answered with a JSON-RPC error object.
    Server(ResponseError),
}

impl ClientError {
    /// Returns `true` for errors that only mean "this message contributes nothing".
    pub fn is_ignorable(&self) -> bool {
        matches!(
            self,
            Self::ProtocolMismatch { .. } | Self::StaleResponse { .. } | Self::Json(_) | Self::Shape(_)
        )
    }
}
