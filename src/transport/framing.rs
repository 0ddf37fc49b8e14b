use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{ProtocolError, ProtocolResult};
use crate::protocol::{HEADER_LEN, MessageKind, Request, Response};

/// Default cap on the content length a request header may declare (64 MiB).
pub const DEFAULT_MAX_CONTENT_LENGTH: usize = 64 * 1024 * 1024;

/// Frame format: [1-byte kind][3 reserved zero bytes][4-byte length][payload]
///
/// The length is the payload size in bytes (u32, big-endian). Requests and
/// responses share this shape; only the meaning of the first byte differs.
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    max_content_length: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONTENT_LENGTH)
    }
}

impl FrameCodec {
    pub fn new(max_content_length: usize) -> Self {
        Self { max_content_length }
    }

    /// Reads exactly one request frame.
    ///
    /// A short header is `MalformedRequest`; a payload shorter than the
    /// header declares is `ContentLengthMismatch`.
    pub async fn read_request<R>(&self, reader: &mut R) -> ProtocolResult<Request>
    where
        R: AsyncRead + Unpin,
    {
        let (code, content) = self.read_frame(reader).await?;
        Ok(Request { code, content })
    }

    /// Writes a response frame and flushes it.
    pub async fn write_response<W>(writer: &mut W, response: &Response) -> io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        Self::write_frame(writer, response.status.code(), &response.payload).await
    }

    /// Writes a request frame and flushes it (client side).
    pub async fn write_request<W>(writer: &mut W, request: &Request) -> io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        Self::write_frame(writer, request.code, &request.content).await
    }

    /// Reads a response frame (client side).
    ///
    /// Returns `Ok(None)` if the server closed the connection without
    /// writing anything, which is how a valid OK probe is answered.
    pub async fn read_response<R>(&self, reader: &mut R) -> ProtocolResult<Option<Response>>
    where
        R: AsyncRead + Unpin,
    {
        let mut first = [0u8; 1];
        if reader.read(&mut first).await? == 0 {
            return Ok(None);
        }

        let mut chained = (&first[..]).chain(reader);
        let (code, payload) = self.read_frame(&mut chained).await?;
        let status = MessageKind::try_from(code)?;
        Ok(Some(Response { status, payload }))
    }

    async fn read_frame<R>(&self, reader: &mut R) -> ProtocolResult<(u8, Vec<u8>)>
    where
        R: AsyncRead + Unpin,
    {
        // Read 8-byte header
        let mut header = [0u8; HEADER_LEN];
        if let Err(e) = reader.read_exact(&mut header).await {
            return Err(match e.kind() {
                io::ErrorKind::UnexpectedEof => ProtocolError::MalformedRequest,
                _ => ProtocolError::Transport(e),
            });
        }

        let code = header[0];
        let declared = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
        let expected =
            usize::try_from(declared).map_err(|_| ProtocolError::MalformedRequest)?;

        if expected > self.max_content_length {
            return Err(ProtocolError::ContentTooLarge {
                size: u64::from(declared),
                max: self.max_content_length,
            });
        }

        // Grow the buffer as bytes arrive instead of trusting the header up front
        let mut content = Vec::new();
        let actual = reader
            .take(u64::from(declared))
            .read_to_end(&mut content)
            .await?;

        if actual != expected {
            return Err(ProtocolError::ContentLengthMismatch { expected, actual });
        }

        Ok((code, content))
    }

    async fn write_frame<W>(writer: &mut W, code: u8, payload: &[u8]) -> io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let len = u32::try_from(payload.len()).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Message too large: {} bytes", payload.len()),
            )
        })?;

        let mut header = [0u8; HEADER_LEN];
        header[0] = code;
        header[4..].copy_from_slice(&len.to_be_bytes());

        writer.write_all(&header).await?;
        writer.write_all(payload).await?;
        writer.flush().await?;

        Ok(())
    }
}
