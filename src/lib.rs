//! # linecast
//!
//! `linecast` is a minimal, in-memory, topic-based publish/subscribe broker.
//! Clients talk to it over plain TCP using a line-delimited text protocol
//! with length-prefixed binary-safe bodies. Delivery is best-effort and
//! at-most-once: nothing is persisted, acknowledged or retried.
//!
//! ## Core Modules
//!
//! - `broker`: subscription registry, notification pipeline and the `Broker` handle.
//! - `client`: the broker-side subscriber handle and the client library.
//! - `config`: loads and merges server configuration.
//! - `transport`: framing, body codec, connection handler and TCP listener.
//! - `utils`: error types and logging setup.

pub mod broker;
pub mod client;
pub mod config;
pub mod transport;
pub mod utils;

#[cfg(test)]
mod tests;
