//! Line-delimited framing
//!
//! Commands are ASCII lines terminated by `\n`. Verbs are case-insensitive.
//! `PUB` and `MSG` announce a body of exactly `<size>` bytes that follows
//! the line immediately:
//!
//! ```text
//! SUB <topic>\n
//! UNSUB <topic>\n
//! PUB <topic> <size>\n<body>
//! MSG <topic> <size>\n<body>
//! ```
//!
//! `FrameDecoder` is a two-state machine (awaiting a line, awaiting a body)
//! over an accumulating buffer. Bytes may arrive in arbitrary fragments;
//! anything left over after a frame stays buffered for the next one.
//! Malformed lines are dropped without consuming any body bytes.
//!
//! A decoder is built for one side of the connection. The broker side
//! accepts `SUB`, `UNSUB` and `PUB`; the client side accepts `MSG`. A verb
//! meant for the other direction is dropped as a single line, exactly like
//! an unknown one. Bodies larger than the configured maximum are skipped
//! as they arrive instead of being buffered.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::{debug, warn};

/// Largest body accepted unless configured otherwise (16 MiB).
pub const DEFAULT_MAX_BODY_SIZE: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Sub { topic: String },
    Unsub { topic: String },
    Pub { topic: String, body: Bytes },
    Msg { topic: String, body: Bytes },
}

impl Frame {
    /// Wire representation of this frame as one contiguous buffer.
    pub fn encode(&self) -> Bytes {
        match self {
            Frame::Sub { topic } => Bytes::from(format!("SUB {topic}\n")),
            Frame::Unsub { topic } => Bytes::from(format!("UNSUB {topic}\n")),
            Frame::Pub { topic, body } => encode_with_body("PUB", topic, body),
            Frame::Msg { topic, body } => encode_with_body("MSG", topic, body),
        }
    }
}

fn encode_with_body(verb: &str, topic: &str, body: &[u8]) -> Bytes {
    let header = format!("{verb} {topic} {}\n", body.len());
    let mut buf = BytesMut::with_capacity(header.len() + body.len());
    buf.put_slice(header.as_bytes());
    buf.put_slice(body);
    buf.freeze()
}

/// The end of the connection a `FrameDecoder` reads for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// Reads what clients send: `SUB`, `UNSUB`, `PUB`.
    Broker,
    /// Reads what the broker sends: `MSG`.
    Client,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyKind {
    Pub,
    Msg,
}

#[derive(Debug, PartialEq, Eq)]
enum State {
    AwaitingLine,
    AwaitingBody {
        kind: BodyKind,
        topic: String,
        size: usize,
    },
    Skipping {
        remaining: usize,
    },
}

enum Line {
    Frame(Frame),
    Header {
        kind: BodyKind,
        topic: String,
        size: usize,
    },
}

#[derive(Debug)]
pub struct FrameDecoder {
    buf: BytesMut,
    state: State,
    side: Side,
    max_body_size: usize,
}

impl FrameDecoder {
    pub fn new(side: Side) -> Self {
        Self {
            buf: BytesMut::new(),
            state: State::AwaitingLine,
            side,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }

    /// Decoder for frames a client sends to the broker.
    pub fn for_broker() -> Self {
        Self::new(Side::Broker)
    }

    /// Decoder for frames the broker sends to a client.
    pub fn for_client() -> Self {
        Self::new(Side::Client)
    }

    /// Bodies announced with more than `max` bytes are skipped.
    pub fn with_max_body_size(mut self, max: usize) -> Self {
        self.max_body_size = max;
        self
    }

    pub fn side(&self) -> Side {
        self.side
    }

    /// Append freshly read bytes.
    pub fn feed(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Number of bytes received but not yet consumed by a frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// `true` while a `PUB`/`MSG` header has been read but its body has not
    /// fully arrived (or not fully been skipped).
    pub fn awaiting_body(&self) -> bool {
        !matches!(self.state, State::AwaitingLine)
    }

    /// Pull the next complete frame out of the buffer, or `None` if more
    /// bytes are needed.
    pub fn next_frame(&mut self) -> Option<Frame> {
        loop {
            match std::mem::replace(&mut self.state, State::AwaitingLine) {
                State::AwaitingBody { kind, topic, size } if self.buf.len() >= size => {
                    let body = self.buf.split_to(size).freeze();
                    return Some(match kind {
                        BodyKind::Pub => Frame::Pub { topic, body },
                        BodyKind::Msg => Frame::Msg { topic, body },
                    });
                }
                pending @ State::AwaitingBody { .. } => {
                    self.state = pending;
                    return None;
                }
                State::Skipping { remaining } => {
                    let n = remaining.min(self.buf.len());
                    self.buf.advance(n);
                    if n < remaining {
                        self.state = State::Skipping {
                            remaining: remaining - n,
                        };
                        return None;
                    }
                }
                State::AwaitingLine => {}
            }

            let end = self.buf.iter().position(|b| *b == b'\n')?;
            let line = self.buf.split_to(end + 1);
            match parse_line(&line[..end], self.side) {
                Some(Line::Frame(frame)) => return Some(frame),
                Some(Line::Header { topic, size, .. }) if size > self.max_body_size => {
                    warn!(%topic, size, max = self.max_body_size, "skipping oversized body");
                    self.state = State::Skipping { remaining: size };
                }
                Some(Line::Header { kind, topic, size }) => {
                    self.state = State::AwaitingBody { kind, topic, size };
                }
                None => {}
            }
        }
    }
}

fn parse_line(raw: &[u8], side: Side) -> Option<Line> {
    let Ok(text) = std::str::from_utf8(raw) else {
        debug!(len = raw.len(), "ignoring non utf-8 command line");
        return None;
    };
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    let parts: Vec<&str> = text.split_whitespace().collect();
    let verb = parts[0].to_ascii_uppercase();
    let line = match (side, verb.as_str(), parts.as_slice()) {
        (Side::Broker, "SUB", [_, topic]) => Line::Frame(Frame::Sub {
            topic: topic.to_string(),
        }),
        (Side::Broker, "UNSUB", [_, topic]) => Line::Frame(Frame::Unsub {
            topic: topic.to_string(),
        }),
        (Side::Broker, "PUB", [_, topic, size]) | (Side::Client, "MSG", [_, topic, size]) => {
            let Ok(size) = size.parse::<usize>() else {
                debug!(command = text, "ignoring command with invalid size");
                return None;
            };
            let kind = match side {
                Side::Broker => BodyKind::Pub,
                Side::Client => BodyKind::Msg,
            };
            Line::Header {
                kind,
                topic: topic.to_string(),
                size,
            }
        }
        _ => {
            debug!(command = text, "ignoring unknown or malformed command");
            return None;
        }
    };
    Some(line)
}
