//! Client library
//!
//! `Client` speaks the broker's line protocol over TCP. It can publish,
//! manage subscriptions and receive deliveries; deliveries are decoded with
//! the same wire codec the broker uses.

use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::warn;

use crate::broker::message::{Headers, Message, validate_topic};
use crate::transport::codec::{JsonCodec, WireCodec};
use crate::transport::frame::{Frame, FrameDecoder};
use crate::utils::{Error, Result};

const READ_CHUNK: usize = 4096;

pub struct Client {
    stream: TcpStream,
    decoder: FrameDecoder,
    codec: Box<dyn WireCodec>,
}

impl Client {
    pub async fn connect(host: &str, port: u16) -> Result<Self> {
        let stream = TcpStream::connect((host, port)).await?;
        stream.set_nodelay(true)?;
        Ok(Self {
            stream,
            decoder: FrameDecoder::for_client(),
            codec: Box::new(JsonCodec),
        })
    }

    pub async fn publish(&mut self, topic: &str, payload: Value) -> Result<()> {
        self.publish_with_headers(topic, payload, Headers::new()).await
    }

    pub async fn publish_with_headers(
        &mut self,
        topic: &str,
        payload: Value,
        headers: Headers,
    ) -> Result<()> {
        validate_topic(topic)?;
        let body = self.codec.encode(&payload, &headers)?;
        self.send(Frame::Pub {
            topic: topic.to_string(),
            body: body.into(),
        })
        .await
    }

    pub async fn subscribe(&mut self, topic: &str) -> Result<()> {
        validate_topic(topic)?;
        self.send(Frame::Sub {
            topic: topic.to_string(),
        })
        .await
    }

    pub async fn unsubscribe(&mut self, topic: &str) -> Result<()> {
        validate_topic(topic)?;
        self.send(Frame::Unsub {
            topic: topic.to_string(),
        })
        .await
    }

    async fn send(&mut self, frame: Frame) -> Result<()> {
        self.stream.write_all(&frame.encode()).await?;
        Ok(())
    }

    /// Wait for the next delivered message. Returns `Ok(None)` once the
    /// broker closes the connection. Deliveries whose body cannot be decoded
    /// are skipped.
    pub async fn next_message(&mut self) -> Result<Option<Message>> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            while let Some(frame) = self.decoder.next_frame() {
                let Frame::Msg { topic, body } = frame else {
                    continue;
                };
                match self.codec.decode(&body) {
                    Ok((payload, headers)) => {
                        return Message::new(&topic, payload, headers).map(Some);
                    }
                    Err(e) => warn!(%topic, error = %e, "skipping undecodable delivery"),
                }
            }

            let n = self.stream.read(&mut chunk).await?;
            if n == 0 {
                return Ok(None);
            }
            self.decoder.feed(&chunk[..n]);
        }
    }

    /// Invoke `on_message` for every delivery until the broker closes the
    /// connection.
    pub async fn listen<F>(&mut self, mut on_message: F) -> Result<()>
    where
        F: FnMut(Message),
    {
        while let Some(message) = self.next_message().await? {
            on_message(message);
        }
        Ok(())
    }

    /// Flush and close the write side, then drop the connection.
    pub async fn close(mut self) -> Result<()> {
        match self.stream.shutdown().await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotConnected => Err(Error::ConnectionClosed),
            Err(e) => Err(e.into()),
        }
    }
}
