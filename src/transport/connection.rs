use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::sync::OwnedSemaphorePermit;
use tracing::{Instrument, debug, info_span, warn};
use uuid::Uuid;

use crate::error::{ProtocolError, ProtocolResult};
use crate::protocol::Response;
use crate::server::handlers;
use crate::server::metrics::{Metrics, RequestTracer};
use crate::store::BackingFile;
use crate::transport::framing::FrameCodec;

/// Longest pause tolerated while discarding the body of a rejected request.
const DISCARD_IDLE_TIMEOUT: Duration = Duration::from_secs(1);

/// Bytes past a complete request that are dropped before closing.
const TRAILING_DISCARD_LIMIT: u64 = 64 * 1024;

/// Shared state every connection handler needs.
#[derive(Debug)]
pub struct ConnectionContext {
    pub file: BackingFile,
    pub codec: FrameCodec,
    pub metrics: Arc<Metrics>,
}

impl ConnectionContext {
    pub fn new(file: BackingFile, codec: FrameCodec, metrics: Arc<Metrics>) -> Self {
        Self {
            file,
            codec,
            metrics,
        }
    }
}

/// Serve one accepted connection and close it.
///
/// The permit is held until the connection is done, which is what bounds
/// the number of concurrent handlers.
pub async fn serve_connection(
    mut stream: UnixStream,
    context: Arc<ConnectionContext>,
    permit: OwnedSemaphorePermit,
) {
    let id = Uuid::new_v4();
    let span = info_span!("connection", %id);

    async move {
        debug!("Accepted connection");
        match handle_connection(&mut stream, &context).await {
            Ok(()) => debug!("Connection closed"),
            Err(e) => warn!("Connection error: {}", e),
        }
        drop(permit);
    }
    .instrument(span)
    .await
}

/// Run one decode, dispatch, encode cycle on `stream`.
///
/// Errors returned here are ones where the connection could not be answered;
/// everything else has already been turned into an ERROR response.
pub async fn handle_connection<S>(stream: &mut S, context: &ConnectionContext) -> ProtocolResult<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request = match context.codec.read_request(stream).await {
        Ok(request) => request,
        Err(e) if e.aborts_connection() => {
            context.metrics.record_dropped();
            return Err(e);
        }
        Err(e) => {
            let message = e.to_string();
            RequestTracer::new("INVALID", context.metrics.clone()).error(&message);
            FrameCodec::write_response(stream, &Response::error(message)).await?;

            // An oversized body was never read; the client may still be sending it
            let (limit, idle) = match e {
                ProtocolError::ContentTooLarge { size, .. } => (size, DISCARD_IDLE_TIMEOUT),
                _ => (TRAILING_DISCARD_LIMIT, Duration::ZERO),
            };
            discard_input(stream, limit, idle).await;
            stream.shutdown().await?;
            return Ok(());
        }
    };

    let label = request.kind().map_or("UNKNOWN", |kind| kind.as_str());
    let tracer = RequestTracer::new(label, context.metrics.clone());

    match handlers::dispatch(&request, &context.file).await {
        Some(response) => {
            if response.is_ok() {
                tracer.success();
            } else {
                tracer.error(&response.message());
            }
            FrameCodec::write_response(stream, &response).await?;
        }
        None => tracer.success(),
    }

    discard_input(stream, TRAILING_DISCARD_LIMIT, Duration::ZERO).await;
    stream.shutdown().await?;
    Ok(())
}

/// Read and drop up to `limit` bytes of input the request did not consume.
///
/// Closing a Unix socket with unread data resets the peer, which can destroy
/// a response it has not read yet. Stops at EOF, at `limit`, on a read error,
/// or when nothing arrives within `idle` (`Duration::ZERO` only takes what is
/// already buffered).
async fn discard_input<S>(stream: &mut S, limit: u64, idle: Duration)
where
    S: AsyncRead + Unpin,
{
    let mut scratch = vec![0u8; 8 * 1024];
    let mut remaining = limit;

    while remaining > 0 {
        let want = usize::try_from(remaining).map_or(scratch.len(), |r| r.min(scratch.len()));
        match tokio::time::timeout(idle, stream.read(&mut scratch[..want])).await {
            Ok(Ok(0)) | Ok(Err(_)) | Err(_) => break,
            Ok(Ok(n)) => remaining = remaining.saturating_sub(n as u64),
        }
    }

    if remaining < limit {
        debug!("Discarded {} unread byte(s)", limit - remaining);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::duplex;

    fn context() -> (TempDir, ConnectionContext) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.txt");
        std::fs::write(&path, b"").unwrap();
        let context = ConnectionContext::new(
            BackingFile::new(path),
            FrameCodec::default(),
            Arc::new(Metrics::new()),
        );
        (dir, context)
    }

    /// Send raw bytes, close the write side, and collect everything the
    /// handler writes back.
    async fn exchange(context: &ConnectionContext, input: &[u8]) -> (ProtocolResult<()>, Vec<u8>) {
        let (mut client, mut server) = duplex(1024);
        client.write_all(input).await.unwrap();
        client.shutdown().await.unwrap();

        let result = handle_connection(&mut server, context).await;
        drop(server);

        let mut output = Vec::new();
        client.read_to_end(&mut output).await.unwrap();
        (result, output)
    }

    #[tokio::test]
    async fn test_write_hello() {
        let (_dir, context) = context();

        let (result, output) =
            exchange(&context, &[2, 0, 0, 0, 0, 0, 0, 5, b'H', b'e', b'l', b'l', b'o']).await;

        assert!(result.is_ok());
        assert_eq!(output, [0, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(std::fs::read(context.file.path()).unwrap(), b"Hello");
    }

    #[tokio::test]
    async fn test_clear_with_content() {
        let (_dir, context) = context();
        std::fs::write(context.file.path(), b"keep").unwrap();

        let (result, output) = exchange(&context, &[3, 0, 0, 0, 0, 0, 0, 3, b'x', b'y', b'z']).await;

        assert!(result.is_ok());
        let mut expected = vec![1, 0, 0, 0, 0, 0, 0, 25];
        expected.extend_from_slice(b"Content length must be 0!");
        assert_eq!(output, expected);
        assert_eq!(std::fs::read(context.file.path()).unwrap(), b"keep");
    }

    #[tokio::test]
    async fn test_truncated_header_gets_no_response() {
        let (_dir, context) = context();

        let (result, output) = exchange(&context, &[4, 0, 0, 0]).await;

        assert!(result.is_err());
        assert!(output.is_empty());
        assert_eq!(context.metrics.snapshot().dropped_connections, 1);
    }

    #[tokio::test]
    async fn test_short_content_gets_error_response() {
        let (_dir, context) = context();

        let (result, output) = exchange(&context, &[2, 0, 0, 0, 0, 0, 0, 5, b'H', b'i']).await;

        assert!(result.is_ok());
        let message = b"The request content length does not match the actual content size!";
        assert_eq!(output[0], 1);
        assert_eq!(&output[4..8], &(message.len() as u32).to_be_bytes());
        assert_eq!(&output[8..], message);
        assert!(std::fs::read(context.file.path()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_oversized_body_is_discarded_after_the_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data.txt");
        std::fs::write(&path, b"").unwrap();
        let context = ConnectionContext::new(
            BackingFile::new(path),
            FrameCodec::new(4),
            Arc::new(Metrics::new()),
        );
        let (mut client, mut server) = duplex(64);

        let peer = async {
            client.write_all(&[2, 0, 0, 0, 0, 0, 0, 10]).await.unwrap();

            // The answer arrives before the body is sent
            let response = FrameCodec::default()
                .read_response(&mut client)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(
                response,
                Response::error("The request content length exceeds the maximum of 4 bytes!")
            );

            client.write_all(b"0123456789").await.unwrap();
            client.shutdown().await.unwrap();

            let mut rest = Vec::new();
            client.read_to_end(&mut rest).await.unwrap();
            rest
        };

        let (result, rest) = tokio::join!(handle_connection(&mut server, &context), peer);

        assert!(result.is_ok());
        assert!(rest.is_empty());
        assert!(std::fs::read(context.file.path()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_trailing_bytes_are_discarded() {
        let (_dir, context) = context();

        let (result, output) =
            exchange(&context, &[4, 0, 0, 0, 0, 0, 0, 0, b'e', b'x', b't', b'r', b'a']).await;

        assert!(result.is_ok());
        assert_eq!(output, [0, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[tokio::test]
    async fn test_ok_probe_closes_silently() {
        let (_dir, context) = context();

        let (result, output) = exchange(&context, &[0, 0, 0, 0, 0, 0, 0, 0]).await;

        assert!(result.is_ok());
        assert!(output.is_empty());
        assert_eq!(context.metrics.snapshot().total_success, 1);
    }
}
