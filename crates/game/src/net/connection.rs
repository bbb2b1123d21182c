use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::protocol::{PeerId, PeerIdentity};
use super::transport::{LinkId, PeerLink};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
        }
    }
}

/// The set of peers currently in the match, in join order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Roster {
    peers: Vec<PeerIdentity>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_peers(peers: Vec<PeerIdentity>) -> Self {
        Self { peers }
    }

    pub fn contains(&self, uuid: &PeerId) -> bool {
        self.peers.iter().any(|p| &p.uuid == uuid)
    }

    pub fn get(&self, uuid: &PeerId) -> Option<&PeerIdentity> {
        self.peers.iter().find(|p| &p.uuid == uuid)
    }

    pub fn as_slice(&self) -> &[PeerIdentity] {
        &self.peers
    }

    pub fn iter(&self) -> impl Iterator<Item = &PeerIdentity> {
        self.peers.iter()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn replace(&mut self, peers: Vec<PeerIdentity>) {
        self.peers = peers;
    }

    pub fn clear(&mut self) {
        self.peers.clear();
    }
}

/// An open link on the host side together with the identity it announced.
#[derive(Debug)]
pub struct PeerConnection {
    pub identity: PeerIdentity,
    pub link: PeerLink,
    pub connected_at: Instant,
}

impl PeerConnection {
    pub fn new(identity: PeerIdentity, link: PeerLink) -> Self {
        Self {
            identity,
            link,
            connected_at: Instant::now(),
        }
    }

    pub fn link_id(&self) -> LinkId {
        self.link.id()
    }

    pub fn uptime(&self) -> Duration {
        self.connected_at.elapsed()
    }
}
