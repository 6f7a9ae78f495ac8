use super::session::SessionId;
use crate::protocol::Frame;
use std::collections::HashMap;
use tokio::sync::mpsc;

/// What the engine asks a connection's writer task to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Frame(Frame),
    /// Flush what is queued, then shut the socket down.
    Close,
}

pub type Outbox = mpsc::UnboundedSender<Outbound>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("session is not connected")]
    NotConnected,
    #[error("connection writer has gone away")]
    Closed,
}

/// Write handles of every live connection, keyed by session.
#[derive(Debug, Default)]
pub struct Outboxes {
    senders: HashMap<SessionId, Outbox>,
}

impl Outboxes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, session: SessionId, outbox: Outbox) {
        self.senders.insert(session, outbox);
    }

    pub fn remove(&mut self, session: SessionId) -> Option<Outbox> {
        self.senders.remove(&session)
    }

    /// Queues `frame` for `session`. Never blocks; fails if the session has
    /// no outbox or its writer task has exited.
    pub fn deliver(&self, session: SessionId, frame: Frame) -> Result<(), DeliveryError> {
        let outbox = self
            .senders
            .get(&session)
            .ok_or(DeliveryError::NotConnected)?;
        outbox
            .send(Outbound::Frame(frame))
            .map_err(|_| DeliveryError::Closed)
    }

    /// Asks the writer to flush and close, and forgets the outbox.
    pub fn close(&mut self, session: SessionId) {
        if let Some(outbox) = self.senders.remove(&session) {
            let _ = outbox.send(Outbound::Close);
        }
    }
}
