use std::collections::vec_deque::Drain;

use crate::event::EventBus;
use crate::room::RoomId;

use super::channel::Channel;
use super::client::ClientNetwork;
use super::connection::ConnectionStatus;
use super::error::NetworkError;
use super::host::HostNetwork;
use super::network::{Network, NetworkEvent, Role};
use super::protocol::{Payload, PeerIdentity, PeerMetadata};

/// Either network variant behind one type.
pub enum AnyNetwork {
    Host(HostNetwork),
    Client(ClientNetwork),
}

impl AnyNetwork {
    pub fn as_host(&self) -> Option<&HostNetwork> {
        match self {
            AnyNetwork::Host(host) => Some(host),
            AnyNetwork::Client(_) => None,
        }
    }

    pub fn as_host_mut(&mut self) -> Option<&mut HostNetwork> {
        match self {
            AnyNetwork::Host(host) => Some(host),
            AnyNetwork::Client(_) => None,
        }
    }

    pub fn as_client(&self) -> Option<&ClientNetwork> {
        match self {
            AnyNetwork::Client(client) => Some(client),
            AnyNetwork::Host(_) => None,
        }
    }

    pub fn as_client_mut(&mut self) -> Option<&mut ClientNetwork> {
        match self {
            AnyNetwork::Client(client) => Some(client),
            AnyNetwork::Host(_) => None,
        }
    }
}

impl From<HostNetwork> for AnyNetwork {
    fn from(host: HostNetwork) -> Self {
        AnyNetwork::Host(host)
    }
}

impl From<ClientNetwork> for AnyNetwork {
    fn from(client: ClientNetwork) -> Self {
        AnyNetwork::Client(client)
    }
}

impl Network for AnyNetwork {
    fn role(&self) -> Role {
        match self {
            AnyNetwork::Host(n) => n.role(),
            AnyNetwork::Client(n) => n.role(),
        }
    }

    fn status(&self) -> ConnectionStatus {
        match self {
            AnyNetwork::Host(n) => n.status(),
            AnyNetwork::Client(n) => n.status(),
        }
    }

    fn identity(&self) -> PeerIdentity {
        match self {
            AnyNetwork::Host(n) => n.identity(),
            AnyNetwork::Client(n) => n.identity(),
        }
    }

    fn metadata(&self) -> Option<&PeerMetadata> {
        match self {
            AnyNetwork::Host(n) => n.metadata(),
            AnyNetwork::Client(n) => n.metadata(),
        }
    }

    fn set_metadata(&mut self, metadata: PeerMetadata) {
        match self {
            AnyNetwork::Host(n) => n.set_metadata(metadata),
            AnyNetwork::Client(n) => n.set_metadata(metadata),
        }
    }

    fn connected_peers(&self) -> &[PeerIdentity] {
        match self {
            AnyNetwork::Host(n) => n.connected_peers(),
            AnyNetwork::Client(n) => n.connected_peers(),
        }
    }

    fn channel<T: Payload>(&self, name: &str, check_peer: bool) -> Channel<T> {
        match self {
            AnyNetwork::Host(n) => n.channel(name, check_peer),
            AnyNetwork::Client(n) => n.channel(name, check_peer),
        }
    }

    fn send<T: Payload>(&mut self, channel: &str, payload: &T) -> Result<(), NetworkError> {
        match self {
            AnyNetwork::Host(n) => n.send(channel, payload),
            AnyNetwork::Client(n) => n.send(channel, payload),
        }
    }

    async fn connect(&mut self, room: &RoomId) -> Result<(), NetworkError> {
        match self {
            AnyNetwork::Host(n) => n.connect(room).await,
            AnyNetwork::Client(n) => n.connect(room).await,
        }
    }

    fn disconnect(&mut self) {
        match self {
            AnyNetwork::Host(n) => n.disconnect(),
            AnyNetwork::Client(n) => n.disconnect(),
        }
    }

    async fn pump(&mut self) -> usize {
        match self {
            AnyNetwork::Host(n) => n.pump().await,
            AnyNetwork::Client(n) => n.pump().await,
        }
    }

    fn drain_events(&mut self) -> Drain<'_, NetworkEvent> {
        match self {
            AnyNetwork::Host(n) => n.drain_events(),
            AnyNetwork::Client(n) => n.drain_events(),
        }
    }
}

/// Holds the one active network and the event bus attached to it.
///
/// Replacing the network detaches the bus and fully tears down the old
/// network before the new one becomes reachable, so no subscription or
/// registration of the old one outlives the switch.
#[derive(Default)]
pub struct NetworkContext {
    network: Option<AnyNetwork>,
    events: EventBus,
}

impl NetworkContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn network(&self) -> Option<&AnyNetwork> {
        self.network.as_ref()
    }

    pub fn network_mut(&mut self) -> Option<&mut AnyNetwork> {
        self.network.as_mut()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn events_mut(&mut self) -> &mut EventBus {
        &mut self.events
    }

    pub fn replace(&mut self, next: impl Into<AnyNetwork>) -> &mut AnyNetwork {
        self.clear();

        let network = self.network.insert(next.into());
        self.events.attach(network);
        network
    }

    /// Tears down the active network, leaving the bus local-only.
    pub fn clear(&mut self) {
        self.events.detach();
        if let Some(mut previous) = self.network.take() {
            log::debug!("tearing down {:?} network", previous.role());
            previous.disconnect();
        }
    }

    /// Pumps the active network, then the event bus.
    pub async fn pump(&mut self) -> usize {
        let Some(network) = self.network.as_mut() else {
            return 0;
        };
        let processed = network.pump().await;
        self.events.pump();
        processed
    }
}
