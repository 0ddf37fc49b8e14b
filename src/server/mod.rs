pub mod handlers;
pub mod metrics;
#[allow(clippy::module_inception)]
pub mod server;

pub use server::{Server, ServerHandle, ServerState};
