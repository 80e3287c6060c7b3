//! Connection handler
//!
//! One `Connection` per accepted stream. The read side runs the framing
//! state machine and turns frames into broker operations; the write side is
//! a dedicated task that owns the socket's write half and drains the
//! connection's outbound channel one frame at a time. Since that task is the
//! only writer, frames from different sources can never interleave.
//!
//! On end of stream or read error the handler removes the connection from
//! every topic. The writer exits once the last sender handle is gone.
//!
//! The read side only accepts client verbs (`SUB`, `UNSUB`, `PUB`); a stray
//! `MSG` line is dropped on its own and never swallows the bytes after it.
//! The writer reports progress to the subscriber's `Backlog`, so a peer that
//! stops reading shows up as a growing pending count.

use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::broker::Broker;
use crate::broker::dispatch::Deliver;
use crate::broker::message::Message;
use crate::client::{Backlog, Subscriber};
use crate::transport::codec::WireCodec;
use crate::transport::frame::{Frame, FrameDecoder};
use crate::utils::{DeliveryError, Result};

/// Delivers a message by encoding it as a `MSG` frame and queueing it on the
/// subscriber's outbound channel.
pub struct FrameDelivery {
    codec: Arc<dyn WireCodec>,
}

impl FrameDelivery {
    pub fn new(codec: Arc<dyn WireCodec>) -> Self {
        Self { codec }
    }
}

impl Deliver<Subscriber> for FrameDelivery {
    fn deliver(&self, subscriber: &Subscriber, message: &Message) -> std::result::Result<(), DeliveryError> {
        if subscriber.is_closed() {
            return Err(DeliveryError::Closed(subscriber.id()));
        }
        let body = self.codec.encode(message.payload(), message.headers())?;
        let frame = Frame::Msg {
            topic: message.topic().to_string(),
            body: Bytes::from(body),
        };
        subscriber.send_frame(frame.encode())
    }
}

pub struct Connection {
    broker: Broker,
    subscriber: Subscriber,
    decoder: FrameDecoder,
}

impl Connection {
    /// Create the connection state and spawn its writer task over `writer`.
    pub fn new<W>(broker: Broker, writer: W) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscriber = Subscriber::new(tx);
        tokio::spawn(write_loop(writer, rx, subscriber.backlog(), subscriber.id()));

        Self {
            broker,
            subscriber,
            decoder: FrameDecoder::for_broker(),
        }
    }

    /// Skip `PUB` bodies larger than `max` bytes instead of buffering them.
    pub fn with_max_body_size(mut self, max: usize) -> Self {
        self.decoder = FrameDecoder::for_broker().with_max_body_size(max);
        self
    }

    pub fn subscriber(&self) -> &Subscriber {
        &self.subscriber
    }

    /// Read until the peer closes or an error occurs, then tear down.
    pub async fn run<R>(mut self, reader: R, read_buffer_size: usize) -> Result<()>
    where
        R: AsyncRead + Unpin,
    {
        let result = self.read_loop(reader, read_buffer_size).await;
        let topics = self.broker.cleanup_client(&self.subscriber);
        debug!(
            subscriber = %self.subscriber,
            topics = topics.len(),
            "connection torn down"
        );
        result
    }

    async fn read_loop<R>(&mut self, mut reader: R, read_buffer_size: usize) -> Result<()>
    where
        R: AsyncRead + Unpin,
    {
        let mut chunk = vec![0u8; read_buffer_size.max(1)];
        loop {
            let n = reader.read(&mut chunk).await?;
            if n == 0 {
                if self.decoder.awaiting_body() {
                    debug!(
                        subscriber = %self.subscriber,
                        buffered = self.decoder.buffered(),
                        "peer closed mid-body, dropping partial publish"
                    );
                }
                return Ok(());
            }

            self.decoder.feed(&chunk[..n]);
            while let Some(frame) = self.decoder.next_frame() {
                self.handle_frame(frame)?;
            }
        }
    }

    /// Apply one inbound frame. Only a closed pipeline is an error.
    pub fn handle_frame(&mut self, frame: Frame) -> Result<()> {
        match frame {
            Frame::Sub { topic } => self.broker.subscribe(&topic, &self.subscriber),
            Frame::Unsub { topic } => self.broker.unsubscribe(&topic, &self.subscriber),
            Frame::Pub { topic, body } => {
                let (payload, headers) = match self.broker.codec().decode(&body) {
                    Ok(decoded) => decoded,
                    Err(e) => {
                        warn!(subscriber = %self.subscriber, %topic, error = %e, "rejected publish");
                        return Ok(());
                    }
                };
                match Message::new(&topic, payload, headers) {
                    Ok(message) => self.broker.publish(message)?,
                    Err(e) => warn!(subscriber = %self.subscriber, error = %e, "rejected publish"),
                }
            }
            Frame::Msg { topic, .. } => {
                debug!(subscriber = %self.subscriber, %topic, "ignoring MSG frame from client");
            }
        }
        Ok(())
    }
}

async fn write_loop<W>(
    mut writer: W,
    mut frames: UnboundedReceiver<Bytes>,
    backlog: Backlog,
    id: Uuid,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = frames.recv().await {
        let written = match writer.write_all(&frame).await {
            Ok(()) => writer.flush().await,
            Err(e) => Err(e),
        };
        backlog.written();
        if let Err(e) = written {
            debug!(subscriber = %id, error = %e, "write failed, closing send loop");
            break;
        }
    }
    frames.close();
    while frames.try_recv().is_ok() {
        backlog.written();
    }
    let _ = writer.shutdown().await;
    debug!(subscriber = %id, "send loop closed");
}
