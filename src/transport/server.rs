//! TCP listener
//!
//! Binds the configured address, accepts connections and spawns one
//! `Connection` task per stream. An optional connection cap rejects new
//! streams once reached.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::broker::Broker;
use crate::config::Settings;
use crate::transport::connection::Connection;
use crate::utils::Result;

pub struct Server {
    listener: TcpListener,
    broker: Broker,
    connection_limit: Option<Arc<Semaphore>>,
    read_buffer_size: usize,
    max_body_size: usize,
}

impl Server {
    pub async fn bind(settings: &Settings, broker: Broker) -> Result<Self> {
        let addr = format!("{}:{}", settings.server.host, settings.server.port);
        let listener = TcpListener::bind(&addr).await?;
        let connection_limit = match settings.broker.max_connections {
            0 => None,
            n => Some(Arc::new(Semaphore::new(n))),
        };

        Ok(Self {
            listener,
            broker,
            connection_limit,
            read_buffer_size: settings.broker.read_buffer_size,
            max_body_size: settings.broker.max_body_size,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn broker(&self) -> &Broker {
        &self.broker
    }

    /// Accept connections forever.
    pub async fn run(self) -> Result<()> {
        info!(addr = %self.local_addr()?, "broker listening");
        loop {
            match self.listener.accept().await {
                Ok((socket, peer)) => self.handle_connection(socket, peer),
                Err(e) => error!(error = %e, "failed to accept connection"),
            }
        }
    }

    /// Accept connections until `shutdown` completes.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            result = self.run() => result,
            _ = shutdown => {
                info!("shutdown signal received");
                Ok(())
            }
        }
    }

    fn handle_connection(&self, socket: TcpStream, peer: SocketAddr) {
        let permit = match &self.connection_limit {
            Some(limit) => match limit.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    warn!(%peer, "connection rejected: limit reached");
                    return;
                }
            },
            None => None,
        };

        if let Err(e) = socket.set_nodelay(true) {
            debug!(%peer, error = %e, "failed to set TCP_NODELAY");
        }

        let (reader, writer) = socket.into_split();
        let connection = Connection::new(self.broker.clone(), writer)
            .with_max_body_size(self.max_body_size);
        let span = info_span!("connection", id = %connection.subscriber().id(), %peer);
        let read_buffer_size = self.read_buffer_size;

        tokio::spawn(
            async move {
                info!("client connected");
                match connection.run(reader, read_buffer_size).await {
                    Ok(()) => info!("client disconnected"),
                    Err(e) => info!(error = %e, "client disconnected with error"),
                }
                drop(permit);
            }
            .instrument(span),
        );
    }
}

/// Bind using `settings` and serve until the process is stopped.
pub async fn start_server(settings: &Settings, broker: Broker) -> Result<()> {
    Server::bind(settings, broker).await?.run().await
}
