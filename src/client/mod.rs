#[allow(clippy::module_inception)]
pub mod client;

pub use client::{ClientArgs, Command, run_client, send_request};
