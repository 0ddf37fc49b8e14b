use std::fmt;

use thiserror::Error;

/// One-byte command / status code shared by requests and responses.
///
/// The numeric values are part of the wire format and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    Ok = 0,
    Error = 1,
    Write = 2,
    Clear = 3,
    Ping = 4,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown message type: {0}!")]
pub struct UnknownMessageKind(pub u8);

impl MessageKind {
    pub const fn code(self) -> u8 {
        self as u8
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            MessageKind::Ok => "OK",
            MessageKind::Error => "ERROR",
            MessageKind::Write => "WRITE",
            MessageKind::Clear => "CLEAR",
            MessageKind::Ping => "PING",
        }
    }
}

impl TryFrom<u8> for MessageKind {
    type Error = UnknownMessageKind;

    fn try_from(code: u8) -> Result<Self, UnknownMessageKind> {
        match code {
            0 => Ok(MessageKind::Ok),
            1 => Ok(MessageKind::Error),
            2 => Ok(MessageKind::Write),
            3 => Ok(MessageKind::Clear),
            4 => Ok(MessageKind::Ping),
            other => Err(UnknownMessageKind(other)),
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded request frame.
///
/// The raw code is kept rather than a [`MessageKind`] so that frames with
/// unrecognized codes still decode and can be answered with an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub code: u8,
    pub content: Vec<u8>,
}

impl Request {
    pub fn new(kind: MessageKind, content: impl Into<Vec<u8>>) -> Self {
        Self {
            code: kind.code(),
            content: content.into(),
        }
    }

    pub fn ping() -> Self {
        Self::new(MessageKind::Ping, Vec::new())
    }

    pub fn ok() -> Self {
        Self::new(MessageKind::Ok, Vec::new())
    }

    pub fn clear() -> Self {
        Self::new(MessageKind::Clear, Vec::new())
    }

    pub fn write(content: impl Into<Vec<u8>>) -> Self {
        Self::new(MessageKind::Write, content)
    }

    pub fn kind(&self) -> Result<MessageKind, UnknownMessageKind> {
        MessageKind::try_from(self.code)
    }

    pub fn content_length(&self) -> usize {
        self.content.len()
    }
}

/// A response frame: status plus an optional message payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: MessageKind,
    pub payload: Vec<u8>,
}

impl Response {
    /// Successful response with an empty payload
    pub fn ok() -> Self {
        Self {
            status: MessageKind::Ok,
            payload: Vec::new(),
        }
    }

    /// Error response carrying a human-readable message
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: MessageKind::Error,
            payload: message.into().into_bytes(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == MessageKind::Ok
    }

    pub fn message(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}
