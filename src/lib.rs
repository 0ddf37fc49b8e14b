// Wire format
pub mod protocol;

// Error types
pub mod error;

// Configuration and startup checks
pub mod config;
pub mod preflight;

// Backing file
pub mod store;

// Transport layer
pub mod transport;

// Server lifecycle and request handling
pub mod server;

// Client
pub mod client;

pub use config::ServerConfig;
pub use error::{ProtocolError, ProtocolResult};
pub use protocol::{MessageKind, Request, Response};
pub use server::metrics::Metrics;
pub use server::{Server, ServerHandle, ServerState};
pub use store::BackingFile;
