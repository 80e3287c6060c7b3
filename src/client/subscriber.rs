//! Subscriber handle
//!
//! `Subscriber` is the broker-side identity of one open connection: a UUID
//! plus the sending side of that connection's outbound frame channel. The
//! registry stores clones of it, and equality and hashing look only at the id,
//! so two clones of the same handle always compare equal.
//!
//! The outbound channel is unbounded, so every handle shares a backlog
//! counter: `send_frame` increments it and the connection's writer calls
//! `Backlog::written` after each frame hits the socket. A warning is logged
//! each time the backlog crosses another multiple of `BACKLOG_WARN_STEP`.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use tokio::sync::mpsc::UnboundedSender;
use tracing::warn;
use uuid::Uuid;

use crate::utils::DeliveryError;

/// Backlog size at which (and at every multiple of which) a warning is logged.
pub const BACKLOG_WARN_STEP: usize = 1024;

/// Count of frames queued for a connection but not yet written.
#[derive(Debug, Clone, Default)]
pub struct Backlog(Arc<AtomicUsize>);

impl Backlog {
    pub fn pending(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    /// Record that one queued frame has been written or discarded.
    pub fn written(&self) {
        let _ = self
            .0
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    fn queued(&self) -> usize {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[derive(Debug, Clone)]
pub struct Subscriber {
    id: Uuid,
    sender: UnboundedSender<Bytes>,
    backlog: Backlog,
}

impl Subscriber {
    /// Create a handle with a fresh id around a connection's outbound channel.
    pub fn new(sender: UnboundedSender<Bytes>) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender,
            backlog: Backlog::default(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Shared backlog counter; the writer side keeps a clone of it.
    pub fn backlog(&self) -> Backlog {
        self.backlog.clone()
    }

    /// Frames queued but not yet written.
    pub fn pending(&self) -> usize {
        self.backlog.pending()
    }

    /// Queue an already framed buffer for the connection's writer.
    pub fn send_frame(&self, frame: Bytes) -> Result<(), DeliveryError> {
        let pending = self.backlog.queued();
        if self.sender.send(frame).is_err() {
            self.backlog.written();
            return Err(DeliveryError::Closed(self.id));
        }
        if pending % BACKLOG_WARN_STEP == 0 {
            warn!(subscriber = %self, pending, "outbound backlog growing, peer is not reading");
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl PartialEq for Subscriber {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Subscriber {}

impl Hash for Subscriber {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client-{}", self.id)
    }
}
