//! Error types shared across the broker.
//!
//! Errors are grouped by where they are contained: codec and delivery
//! failures never leave a single publish or a single delivery attempt, while
//! `Error` covers conditions that end a connection or stop the process.

use thiserror::Error;
use uuid::Uuid;

/// Failure to turn a message body into bytes or back.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("invalid json body: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure to hand one message to one subscriber.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("subscriber {0} is no longer accepting frames")]
    Closed(Uuid),
    #[error("failed to encode message body: {0}")]
    Encode(#[from] CodecError),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("notification pipeline is closed")]
    PipelineClosed,
    #[error("connection closed by peer")]
    ConnectionClosed,
    #[error("invalid topic name: {0:?}")]
    InvalidTopic(String),
}

pub type Result<T> = std::result::Result<T, Error>;
