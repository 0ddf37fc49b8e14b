pub mod message;

pub use message::{MessageKind, Request, Response, UnknownMessageKind};

/// Size of the fixed frame header: 1 byte kind, 3 reserved bytes, 4 byte length.
pub const HEADER_LEN: usize = 8;

pub const MALFORMED_REQUEST: &str = "The request is not the right format!";
pub const CONTENT_LENGTH_MISMATCH: &str =
    "The request content length does not match the actual content size!";
pub const CONTENT_LENGTH_MUST_BE_ZERO: &str = "Content length must be 0!";
pub const WRITE_FAILED: &str = "Couldn't write to the file!";
pub const CLEAR_FAILED: &str = "Couldn't clear the file!";
