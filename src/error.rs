//! Error types for the request/response protocol.

use std::io;

use thiserror::Error;

use crate::protocol::{
    CONTENT_LENGTH_MISMATCH, CONTENT_LENGTH_MUST_BE_ZERO, MALFORMED_REQUEST, MessageKind,
    UnknownMessageKind,
};

/// Failures that can occur while serving a single connection.
///
/// The `Display` text of each variant is exactly what goes back to the
/// client in an ERROR response, so it must stay stable.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Header could not be read in full.
    #[error("{}", MALFORMED_REQUEST)]
    MalformedRequest,

    /// Declared content length disagrees with the bytes actually received.
    #[error("{}", CONTENT_LENGTH_MISMATCH)]
    ContentLengthMismatch { expected: usize, actual: usize },

    /// Declared content length is above the configured maximum.
    #[error("The request content length exceeds the maximum of {max} bytes!")]
    ContentTooLarge { size: u64, max: usize },

    /// A command that takes no content was sent with some.
    #[error("{}", CONTENT_LENGTH_MUST_BE_ZERO)]
    NonEmptyContent,

    #[error(transparent)]
    UnknownCommand(#[from] UnknownMessageKind),

    /// A known kind that is not valid as a request (ERROR).
    #[error("Unexpected message type: {0}!")]
    UnexpectedCommand(MessageKind),

    /// Backing file operation failed. `message` is the client-facing text.
    #[error("{message}")]
    FileIo {
        message: &'static str,
        #[source]
        source: io::Error,
    },

    /// Socket read or write failed.
    #[error("transport failure: {0}")]
    Transport(#[from] io::Error),
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;

impl ProtocolError {
    /// Returns `true` when the framing itself is unusable and no response
    /// should be attempted on the connection.
    pub fn aborts_connection(&self) -> bool {
        matches!(self, Self::MalformedRequest | Self::Transport(_))
    }
}
