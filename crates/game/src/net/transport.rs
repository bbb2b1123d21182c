//! The seam to the peer-connection brokering service.
//!
//! The core only needs four things from it: register under an id, dial an
//! id, move opaque frames, and observe open/close/error. [`Signaling`] is
//! that contract; [`PeerLink`] is one established (or establishing) data
//! connection. `LocalBroker` in the simulator module is the in-process
//! implementation.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

use super::protocol::PeerIdentity;
use super::stats::{LinkConditions, LinkStats};

pub type LinkId = u64;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("signaling service is unreachable")]
    SignalingUnavailable,
    #[error("peer id `{0}` is already registered")]
    IdTaken(String),
    #[error("peer `{0}` is unreachable")]
    PeerUnavailable(String),
    #[error("link is closed")]
    Closed,
    #[error("link failed: {0}")]
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Open,
    Data(Vec<u8>),
    Close,
    Error(TransportError),
}

pub trait Signaling: Send + Sync {
    fn register(&self, peer_id: &str) -> Result<Registration, TransportError>;

    fn unregister(&self, peer_id: &str);

    /// Starts a connection to `remote_id`. The returned link is pending
    /// until [`LinkEvent::Open`] arrives on it.
    fn dial(&self, local: &PeerIdentity, remote_id: &str) -> Result<PeerLink, TransportError>;
}

/// A registered signaling id and the queue of inbound connection requests
/// addressed to it.
#[derive(Debug)]
pub struct Registration {
    peer_id: String,
    incoming: mpsc::UnboundedReceiver<PeerLink>,
}

impl Registration {
    pub fn new(peer_id: impl Into<String>, incoming: mpsc::UnboundedReceiver<PeerLink>) -> Self {
        Self {
            peer_id: peer_id.into(),
            incoming,
        }
    }

    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    pub fn next_request(&mut self) -> Option<PeerLink> {
        self.incoming.try_recv().ok()
    }
}

#[derive(Debug)]
pub struct PeerLink {
    id: LinkId,
    remote_id: String,
    remote: Option<PeerIdentity>,
    tx: mpsc::UnboundedSender<LinkEvent>,
    local_tx: mpsc::UnboundedSender<LinkEvent>,
    rx: mpsc::UnboundedReceiver<LinkEvent>,
    conditions: LinkConditions,
    stats: LinkStats,
    closed: bool,
}

impl PeerLink {
    /// Builds both ends of one connection: `(dialer_end, acceptor_end)`.
    /// The acceptor end knows the dialer's identity from the handshake.
    pub fn pair(
        id: LinkId,
        dialer: &PeerIdentity,
        dialer_id: &str,
        acceptor_id: &str,
        conditions: LinkConditions,
    ) -> (PeerLink, PeerLink) {
        let (to_dialer, dialer_rx) = mpsc::unbounded_channel();
        let (to_acceptor, acceptor_rx) = mpsc::unbounded_channel();

        let dialer_end = PeerLink {
            id,
            remote_id: acceptor_id.to_string(),
            remote: None,
            tx: to_acceptor.clone(),
            local_tx: to_dialer.clone(),
            rx: dialer_rx,
            conditions: conditions.clone(),
            stats: LinkStats::default(),
            closed: false,
        };

        let acceptor_end = PeerLink {
            id,
            remote_id: dialer_id.to_string(),
            remote: Some(dialer.clone()),
            tx: to_dialer,
            local_tx: to_acceptor,
            rx: acceptor_rx,
            conditions,
            stats: LinkStats::default(),
            closed: false,
        };

        (dialer_end, acceptor_end)
    }

    pub fn id(&self) -> LinkId {
        self.id
    }

    pub fn remote_id(&self) -> &str {
        &self.remote_id
    }

    /// Identity announced by the remote side during the handshake. Only the
    /// accepting end has one.
    pub fn remote(&self) -> Option<&PeerIdentity> {
        self.remote.as_ref()
    }

    pub fn stats(&self) -> &LinkStats {
        &self.stats
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Completes the handshake; both ends observe [`LinkEvent::Open`].
    pub fn accept(&mut self) {
        if self.closed {
            return;
        }
        let _ = self.local_tx.send(LinkEvent::Open);
        let _ = self.tx.send(LinkEvent::Open);
    }

    pub fn send(&mut self, frame: Vec<u8>) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }

        if self.conditions.should_drop() {
            self.stats.frames_dropped += 1;
            return Ok(());
        }

        let len = frame.len();
        self.tx
            .send(LinkEvent::Data(frame))
            .map_err(|_| TransportError::Closed)?;
        self.stats.record_sent(len);
        Ok(())
    }

    pub fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            let _ = self.tx.send(LinkEvent::Close);
        }
    }

    pub fn try_recv(&mut self) -> Option<LinkEvent> {
        match self.rx.try_recv() {
            Ok(event) => Some(self.observe(event)),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    pub async fn recv(&mut self) -> Option<LinkEvent> {
        let event = self.rx.recv().await?;
        Some(self.observe(event))
    }

    pub(crate) fn local_sender(&self) -> mpsc::UnboundedSender<LinkEvent> {
        self.local_tx.clone()
    }

    fn observe(&mut self, event: LinkEvent) -> LinkEvent {
        if let LinkEvent::Data(frame) = &event {
            self.stats.record_received(frame.len());
        }
        event
    }
}

impl Drop for PeerLink {
    fn drop(&mut self) {
        self.close();
    }
}
