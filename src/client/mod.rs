//! The `client` module covers both ends of a client connection.
//!
//! `Subscriber` is the broker's handle for a connected client: a unique id
//! and the channel used to push frames to it. `Client` is the library side
//! that applications use to talk to a running broker.

pub mod pubsub_client;
pub mod subscriber;

pub use pubsub_client::Client;
pub use subscriber::{Backlog, Subscriber};

#[cfg(test)]
mod tests;
