pub mod connection;
pub mod framing;
pub mod shutdown;

pub use connection::{ConnectionContext, handle_connection};
pub use framing::FrameCodec;
pub use shutdown::ShutdownCoordinator;
