use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;

use crate::protocol::{Request, Response};
use crate::transport::framing::FrameCodec;

#[derive(Parser, Debug)]
pub struct ClientArgs {
    /// Path of the server's Unix socket
    pub socket: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

/// Request to send
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Health check
    Ping,
    /// Acknowledgement probe (the server closes without answering)
    Ok,
    /// Truncate the backing file
    Clear,
    /// Append text to the backing file
    Write { text: String },
}

impl Command {
    pub fn into_request(self) -> Request {
        match self {
            Self::Ping => Request::ping(),
            Self::Ok => Request::ok(),
            Self::Clear => Request::clear(),
            Self::Write { text } => Request::write(text),
        }
    }
}

/// Send one request on a fresh connection and read the reply, if any.
pub async fn send_request(socket: &Path, request: &Request) -> anyhow::Result<Option<Response>> {
    let mut stream = UnixStream::connect(socket)
        .await
        .with_context(|| format!("failed to connect to {}", socket.display()))?;

    FrameCodec::write_request(&mut stream, request).await?;
    // Half-close so the server sees the end of the request
    stream.shutdown().await?;

    let response = FrameCodec::default().read_response(&mut stream).await?;
    Ok(response)
}

pub async fn run_client(args: ClientArgs) -> anyhow::Result<()> {
    let request = args.command.into_request();

    match send_request(&args.socket, &request).await? {
        Some(response) if response.payload.is_empty() => {
            println!("Response: {}", response.status);
        }
        Some(response) => {
            println!("Response: {} {}", response.status, response.message());
        }
        None => println!("No response (connection closed)"),
    }

    Ok(())
}
