//! Wire codec
//!
//! Bodies of `PUB` and `MSG` frames carry a payload and a header mapping.
//! The topic never travels in the body; it comes from the command line.
//! `JsonCodec` is the default format:
//!
//! ```text
//! {"payload": <any json>, "headers": {"k": "v", ...}}
//! ```
//!
//! `headers` is always written, even when empty. On decode a missing
//! `headers` becomes an empty mapping and a missing `payload` becomes `null`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::broker::message::Headers;
use crate::utils::CodecError;

/// Format-agnostic body encoding. `decode(encode(p, h))` must give back
/// exactly `p` and `h`.
pub trait WireCodec: Send + Sync + 'static {
    fn encode(&self, payload: &Value, headers: &Headers) -> Result<Vec<u8>, CodecError>;
    fn decode(&self, bytes: &[u8]) -> Result<(Value, Headers), CodecError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[derive(Serialize)]
struct BodyRef<'a> {
    payload: &'a Value,
    headers: &'a Headers,
}

#[derive(Deserialize)]
struct BodyOwned {
    #[serde(default)]
    payload: Value,
    #[serde(default)]
    headers: Headers,
}

impl WireCodec for JsonCodec {
    fn encode(&self, payload: &Value, headers: &Headers) -> Result<Vec<u8>, CodecError> {
        Ok(serde_json::to_vec(&BodyRef { payload, headers })?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<(Value, Headers), CodecError> {
        let body: BodyOwned = serde_json::from_slice(bytes)?;
        Ok((body.payload, body.headers))
    }
}
