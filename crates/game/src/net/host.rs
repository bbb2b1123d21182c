use std::collections::vec_deque::Drain;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::room::{RoomId, RoomOptions, create_room_id};

use super::channel::Channel;
use super::config::NetworkConfig;
use super::connection::{ConnectionStatus, PeerConnection};
use super::error::NetworkError;
use super::network::{ConnectAttempt, Network, NetworkCore, NetworkEvent, Role};
use super::protocol::{
    CHANNEL_JOIN, CHANNEL_LEAVE, Envelope, Payload, PeerId, PeerIdentity, PeerMetadata,
    RosterUpdate,
};
use super::transport::{LinkEvent, LinkId, PeerLink, Signaling, TransportError};

/// What the admission predicate gets to decide on.
#[derive(Debug, Clone)]
pub struct AdmissionRequest {
    pub peer: PeerIdentity,
    /// Remote peers already connected or mid-handshake.
    pub connected: usize,
}

pub type AdmissionFuture = Pin<Box<dyn Future<Output = bool> + Send>>;
type AdmissionFn = Box<dyn Fn(AdmissionRequest) -> AdmissionFuture + Send + Sync>;

#[derive(Debug)]
struct PendingLink {
    peer: PeerIdentity,
    link: PeerLink,
}

/// Hub of a star topology: registers the room id, admits dialing peers and
/// relays traffic between them.
pub struct HostNetwork {
    core: NetworkCore,
    room: Option<RoomId>,
    admission: Option<AdmissionFn>,
    pending: Vec<PendingLink>,
    connections: Vec<PeerConnection>,
}

impl HostNetwork {
    pub fn new(signaling: Arc<dyn Signaling>, config: NetworkConfig) -> Self {
        Self {
            core: NetworkCore::new(signaling, config),
            room: None,
            admission: None,
            pending: Vec::new(),
            connections: Vec::new(),
        }
    }

    /// Installs the admission predicate. Without one every peer is let in
    /// (subject to `max_peers`).
    pub fn set_handle_connection<F, Fut>(&mut self, predicate: F)
    where
        F: Fn(AdmissionRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        self.admission = Some(Box::new(move |request| Box::pin(predicate(request))));
    }

    /// Picks a room id and opens it. Prefix and code length fall back to
    /// the configured ones when `options` leaves them unset.
    pub async fn create_room(&mut self, mut options: RoomOptions) -> Result<RoomId, NetworkError> {
        let config = &self.core.config;
        options
            .prefix
            .get_or_insert_with(|| config.app_prefix.clone());
        options.length.get_or_insert(config.room_code_length);

        let room = create_room_id(&options);
        self.connect(&room).await?;
        Ok(room)
    }

    pub fn room(&self) -> Option<&RoomId> {
        self.room.as_ref()
    }

    pub fn connections(&self) -> &[PeerConnection] {
        &self.connections
    }

    /// Drops one peer as if its link had closed. Returns false if it was
    /// not connected.
    pub fn kick(&mut self, uuid: &PeerId) -> bool {
        let Some(link_id) = self
            .connections
            .iter()
            .find(|c| &c.identity.uuid == uuid)
            .map(PeerConnection::link_id)
        else {
            return false;
        };
        log::info!("kicking {}", uuid);
        self.remove_peer(link_id, None);
        true
    }

    async fn admit_requests(&mut self) {
        let mut requests = Vec::new();
        if let Some(registration) = self.core.registration_mut() {
            while let Some(link) = registration.next_request() {
                requests.push(link);
            }
        }

        for mut link in requests {
            let Some(peer) = link.remote().cloned() else {
                log::debug!("refusing link {} without a handshake identity", link.id());
                link.close();
                continue;
            };

            if !self.admits(&peer).await {
                log::debug!("rejected {} ({})", peer.metadata.display_name, peer.uuid);
                link.close();
                continue;
            }

            log::debug!("accepted {} ({})", peer.metadata.display_name, peer.uuid);
            link.accept();
            self.pending.push(PendingLink { peer, link });
        }
    }

    async fn admits(&self, peer: &PeerIdentity) -> bool {
        let connected = self.connections.len() + self.pending.len();

        if let Some(max) = self.core.config.max_peers {
            if connected >= max {
                log::debug!("room full ({}/{})", connected, max);
                return false;
            }
        }

        let duplicate = self.core.roster.contains(&peer.uuid)
            || self.pending.iter().any(|p| p.peer.uuid == peer.uuid);
        if duplicate || &peer.uuid == self.core.uuid() {
            return false;
        }

        match &self.admission {
            Some(predicate) => {
                predicate(AdmissionRequest {
                    peer: peer.clone(),
                    connected,
                })
                .await
            }
            None => true,
        }
    }

    fn poll_pending(&mut self) {
        for mut entry in std::mem::take(&mut self.pending) {
            match entry.link.try_recv() {
                Some(LinkEvent::Open) => self.add_peer(entry.peer, entry.link),
                Some(LinkEvent::Close) => {
                    log::debug!("{} left before the link opened", entry.peer.uuid);
                }
                Some(LinkEvent::Error(err)) => {
                    log::warn!("handshake with {} failed: {}", entry.peer.uuid, err);
                }
                Some(LinkEvent::Data(_)) => {
                    log::trace!("dropped frame on half-open link {}", entry.link.id());
                    self.pending.push(entry);
                }
                None => self.pending.push(entry),
            }
        }
    }

    fn add_peer(&mut self, peer: PeerIdentity, link: PeerLink) {
        log::info!("{} joined ({})", peer.metadata.display_name, peer.uuid);
        self.connections.push(PeerConnection::new(peer.clone(), link));
        self.refresh_roster();
        self.broadcast_roster(CHANNEL_JOIN, &peer);
        self.core.push_event(NetworkEvent::PeerJoined(peer));
    }

    fn remove_peer(&mut self, link_id: LinkId, error: Option<TransportError>) {
        let Some(index) = self.connections.iter().position(|c| c.link_id() == link_id) else {
            return;
        };
        let mut connection = self.connections.remove(index);
        connection.link.close();
        let uptime = connection.uptime();

        let peer = connection.identity;
        match error {
            Some(err) => log::warn!("dropping {} after link error: {}", peer.uuid, err),
            None => log::info!(
                "{} left ({}) after {:.1}s",
                peer.metadata.display_name,
                peer.uuid,
                uptime.as_secs_f32()
            ),
        }

        self.refresh_roster();
        self.broadcast_roster(CHANNEL_LEAVE, &peer);
        self.core.push_event(NetworkEvent::PeerLeft(peer));
    }

    fn poll_connections(&mut self) -> usize {
        let mut inbound: Vec<(LinkId, Envelope)> = Vec::new();
        let mut closed: Vec<(LinkId, Option<TransportError>)> = Vec::new();

        for connection in &mut self.connections {
            let link_id = connection.link_id();
            while let Some(event) = connection.link.try_recv() {
                match event {
                    LinkEvent::Data(frame) => match Envelope::from_frame(&frame) {
                        Ok(mut envelope) => {
                            if envelope.channel == CHANNEL_JOIN || envelope.channel == CHANNEL_LEAVE
                            {
                                log::trace!("dropped `{}` from {}", envelope.channel, link_id);
                                continue;
                            }
                            envelope.sender = connection.identity.uuid.clone();
                            inbound.push((link_id, envelope));
                        }
                        Err(err) => log::trace!("malformed frame on link {}: {}", link_id, err),
                    },
                    LinkEvent::Close => {
                        closed.push((link_id, None));
                        break;
                    }
                    LinkEvent::Error(err) => {
                        closed.push((link_id, Some(err)));
                        break;
                    }
                    LinkEvent::Open => {}
                }
            }
        }

        let processed = inbound.len();
        for (origin, envelope) in inbound {
            self.core.mux.dispatch(&envelope, &self.core.roster);
            log::trace!("relaying `{}` from {}", envelope.channel, envelope.sender);
            self.broadcast(&envelope, Some(origin));
        }

        for (link_id, error) in closed {
            self.remove_peer(link_id, error);
        }

        processed
    }

    fn refresh_roster(&mut self) {
        let mut peers = Vec::with_capacity(self.connections.len() + 1);
        if let Some(metadata) = self.core.metadata() {
            peers.push(PeerIdentity::new(self.core.uuid().clone(), metadata.clone()));
        }
        peers.extend(self.connections.iter().map(|c| c.identity.clone()));
        self.core.roster.replace(peers);
    }

    fn broadcast_roster(&mut self, channel: &str, peer: &PeerIdentity) {
        let update = RosterUpdate {
            peer: peer.clone(),
            peers: self.core.roster.as_slice().to_vec(),
        };
        match update.encode() {
            Ok(payload) => {
                let envelope = Envelope::new(channel, self.core.uuid().clone(), payload);
                self.broadcast(&envelope, None);
            }
            Err(err) => log::warn!("failed to encode `{}` update: {}", channel, err),
        }
    }

    fn broadcast(&mut self, envelope: &Envelope, except: Option<LinkId>) {
        let frame = match envelope.to_frame() {
            Ok(frame) => frame,
            Err(err) => {
                log::warn!("not sending `{}`: {}", envelope.channel, err);
                return;
            }
        };

        for connection in &mut self.connections {
            if Some(connection.link_id()) == except {
                continue;
            }
            if let Err(err) = connection.link.send(frame.clone()) {
                log::debug!("send to {} failed: {}", connection.identity.uuid, err);
            }
        }
    }

    fn flush(&mut self, sends: Vec<(String, Vec<u8>)>) {
        for (channel, payload) in sends {
            let envelope = Envelope::new(channel, self.core.uuid().clone(), payload);
            self.broadcast(&envelope, None);
        }
    }
}

impl Network for HostNetwork {
    fn role(&self) -> Role {
        Role::Host
    }

    fn status(&self) -> ConnectionStatus {
        self.core.status()
    }

    fn identity(&self) -> PeerIdentity {
        self.core.identity()
    }

    fn metadata(&self) -> Option<&PeerMetadata> {
        self.core.metadata()
    }

    fn set_metadata(&mut self, metadata: PeerMetadata) {
        self.core.set_metadata(metadata);
        if self.core.is_connected() {
            self.refresh_roster();
        }
    }

    fn connected_peers(&self) -> &[PeerIdentity] {
        self.core.roster.as_slice()
    }

    fn channel<T: Payload>(&self, name: &str, check_peer: bool) -> Channel<T> {
        self.core.channel(name, check_peer)
    }

    fn send<T: Payload>(&mut self, channel: &str, payload: &T) -> Result<(), NetworkError> {
        self.core.queue_send(channel, payload)?;
        let sends = self.core.take_commands();
        self.flush(sends);
        Ok(())
    }

    async fn connect(&mut self, room: &RoomId) -> Result<(), NetworkError> {
        self.disconnect();

        let mut attempt = ConnectAttempt::begin(&mut self.core);
        attempt.core().register(room.full())?;
        attempt.complete();

        log::info!("hosting room {}", room.code());
        self.room = Some(room.clone());
        self.refresh_roster();
        Ok(())
    }

    fn disconnect(&mut self) {
        for mut pending in self.pending.drain(..) {
            pending.link.close();
        }
        for mut connection in self.connections.drain(..) {
            connection.link.close();
        }
        if let Some(room) = self.room.take() {
            log::info!("closed room {}", room.code());
        }
        self.core.teardown();
    }

    async fn pump(&mut self) -> usize {
        let sends = self.core.take_commands();
        if !self.core.is_connected() {
            return 0;
        }

        self.admit_requests().await;
        self.poll_pending();
        let processed = self.poll_connections();
        self.flush(sends);
        processed
    }

    fn drain_events(&mut self) -> Drain<'_, NetworkEvent> {
        self.core.drain_events()
    }
}

impl Drop for HostNetwork {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::simulator::LocalBroker;
    use crate::room::RoomId;

    fn host(broker: &LocalBroker) -> HostNetwork {
        let mut host = HostNetwork::new(Arc::new(broker.clone()), NetworkConfig::default());
        host.set_metadata(PeerMetadata::new("host", Default::default()));
        host
    }

    fn identity(id: &str) -> PeerIdentity {
        PeerIdentity::new(PeerId::new(id), PeerMetadata::new(id, Default::default()))
    }

    #[tokio::test]
    async fn create_room_uses_configured_prefix() {
        let broker = LocalBroker::new();
        let mut host = host(&broker);
        let room = host.create_room(RoomOptions::default()).await.unwrap();

        assert!(room.full().starts_with("toonks-TOONKS-"));
        assert_eq!(room.code().len(), 6);
        assert!(broker.is_registered(room.full()));
        assert_eq!(host.status(), ConnectionStatus::Connected);
        assert_eq!(host.connected_peers().len(), 1);
    }

    #[tokio::test]
    async fn taken_room_fails_cleanly() {
        let broker = LocalBroker::new();
        let room = RoomId::from_code("TOONKS", "ABCDEF");
        let mut first = host(&broker);
        first.connect(&room).await.unwrap();

        let mut second = host(&broker);
        let err = second.connect(&room).await.unwrap_err();
        assert!(matches!(
            err,
            NetworkError::Transport(TransportError::IdTaken(_))
        ));
        assert_eq!(second.status(), ConnectionStatus::Disconnected);
        assert!(second.room().is_none());
    }

    #[tokio::test]
    async fn peers_join_only_once_open() {
        let broker = LocalBroker::new();
        let mut host = host(&broker);
        let room = host.create_room(RoomOptions::default()).await.unwrap();

        let mut link = broker.dial(&identity("ada"), room.full()).unwrap();
        host.pump().await;
        assert_eq!(link.try_recv(), Some(LinkEvent::Open));
        assert_eq!(host.connections().len(), 1);
        assert_eq!(host.connected_peers()[0].metadata.display_name, "host");
        assert_eq!(host.connected_peers()[1].uuid.as_str(), "ada");

        let joined: Vec<_> = host
            .drain_events()
            .filter(|e| matches!(e, NetworkEvent::PeerJoined(_)))
            .collect();
        assert_eq!(joined.len(), 1);
    }

    #[tokio::test]
    async fn max_peers_is_enforced_before_predicate() {
        let broker = LocalBroker::new();
        let config = NetworkConfig {
            max_peers: Some(1),
            ..NetworkConfig::default()
        };
        let mut host = HostNetwork::new(Arc::new(broker.clone()), config);
        host.set_handle_connection(|_| async { true });
        let room = host.create_room(RoomOptions::default()).await.unwrap();

        let _a = broker.dial(&identity("a"), room.full()).unwrap();
        let mut b = broker.dial(&identity("b"), room.full()).unwrap();
        host.pump().await;

        assert_eq!(host.connections().len(), 1);
        assert_eq!(b.try_recv(), Some(LinkEvent::Close));
    }

    #[tokio::test]
    async fn kick_broadcasts_leave() {
        let broker = LocalBroker::new();
        let mut host = host(&broker);
        let room = host.create_room(RoomOptions::default()).await.unwrap();

        let _ada = broker.dial(&identity("ada"), room.full()).unwrap();
        let mut bob = broker.dial(&identity("bob"), room.full()).unwrap();
        host.pump().await;
        host.pump().await;
        while bob.try_recv().is_some() {}

        assert!(host.kick(&PeerId::new("ada")));
        assert!(!host.kick(&PeerId::new("ada")));

        let Some(LinkEvent::Data(frame)) = bob.try_recv() else {
            panic!("bob saw no leave");
        };
        let envelope = Envelope::from_frame(&frame).unwrap();
        assert_eq!(envelope.channel, CHANNEL_LEAVE);
        let update = RosterUpdate::decode(&envelope.payload).unwrap();
        assert_eq!(update.peer.uuid.as_str(), "ada");
        assert_eq!(update.peers.len(), 2);
    }

    #[tokio::test]
    async fn disconnect_releases_room() {
        let broker = LocalBroker::new();
        let mut host = host(&broker);
        let room = host.create_room(RoomOptions::default()).await.unwrap();
        let mut link = broker.dial(&identity("ada"), room.full()).unwrap();
        host.pump().await;

        host.disconnect();
        host.disconnect();

        assert!(!broker.is_registered(room.full()));
        assert!(host.connected_peers().is_empty());
        assert_eq!(link.try_recv(), Some(LinkEvent::Open));
        assert!(matches!(link.try_recv(), Some(LinkEvent::Data(_))));
        assert_eq!(link.try_recv(), Some(LinkEvent::Close));

        let statuses: Vec<_> = host
            .drain_events()
            .filter(|e| matches!(e, NetworkEvent::Status(ConnectionStatus::Disconnected)))
            .collect();
        assert_eq!(statuses.len(), 1);
    }
}
