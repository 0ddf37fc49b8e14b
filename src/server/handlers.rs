use crate::error::{ProtocolError, ProtocolResult};
use crate::protocol::{CLEAR_FAILED, MessageKind, Request, Response, WRITE_FAILED};
use crate::store::BackingFile;

/// Execute a decoded request against the backing file.
///
/// `Ok(None)` means the request is valid but gets no response (an OK probe).
pub async fn execute(request: &Request, file: &BackingFile) -> ProtocolResult<Option<Response>> {
    match request.kind()? {
        // Health check
        MessageKind::Ping => {
            require_empty(request)?;
            Ok(Some(Response::ok()))
        }

        // Acknowledgement probe, answered by closing the connection
        MessageKind::Ok => {
            require_empty(request)?;
            Ok(None)
        }

        MessageKind::Write => {
            file.append(&request.content)
                .await
                .map_err(|source| ProtocolError::FileIo {
                    message: WRITE_FAILED,
                    source,
                })?;
            Ok(Some(Response::ok()))
        }

        MessageKind::Clear => {
            require_empty(request)?;
            file.clear().await.map_err(|source| ProtocolError::FileIo {
                message: CLEAR_FAILED,
                source,
            })?;
            Ok(Some(Response::ok()))
        }

        MessageKind::Error => Err(ProtocolError::UnexpectedCommand(MessageKind::Error)),
    }
}

/// Like [`execute`], but folds every failure into an ERROR response.
pub async fn dispatch(request: &Request, file: &BackingFile) -> Option<Response> {
    match execute(request, file).await {
        Ok(response) => response,
        Err(e) => Some(Response::error(e.to_string())),
    }
}

fn require_empty(request: &Request) -> ProtocolResult<()> {
    if request.content.is_empty() {
        Ok(())
    } else {
        Err(ProtocolError::NonEmptyContent)
    }
}
