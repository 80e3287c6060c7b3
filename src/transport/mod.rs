//! The `transport` module handles network communication with clients over a
//! plain TCP byte stream.
//!
//! It defines the line-delimited framing, the body codec, the per-connection
//! protocol handler and the listener that accepts connections.

pub mod codec;
pub mod connection;
pub mod frame;
pub mod server;


pub use codec::{JsonCodec, WireCodec};
pub use frame::{DEFAULT_MAX_BODY_SIZE, Frame, FrameDecoder, Side};
pub use server::{Server, start_server};
