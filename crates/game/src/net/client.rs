use std::collections::vec_deque::Drain;
use std::sync::Arc;

use crate::room::RoomId;

use super::channel::Channel;
use super::config::NetworkConfig;
use super::connection::ConnectionStatus;
use super::error::NetworkError;
use super::network::{ConnectAttempt, Network, NetworkCore, NetworkEvent, Role};
use super::protocol::{
    CHANNEL_JOIN, CHANNEL_LEAVE, Envelope, Payload, PeerId, PeerIdentity, PeerMetadata,
    RosterUpdate,
};
use super::transport::{LinkEvent, PeerLink, Signaling};

/// Leaf of the star: one upstream link to the host of a room.
pub struct ClientNetwork {
    core: NetworkCore,
    room: Option<RoomId>,
    host: Option<PeerId>,
    link: Option<PeerLink>,
}

impl ClientNetwork {
    pub fn new(signaling: Arc<dyn Signaling>, config: NetworkConfig) -> Self {
        Self {
            core: NetworkCore::new(signaling, config),
            room: None,
            host: None,
            link: None,
        }
    }

    /// Joins the room behind a user-entered code under the configured
    /// app prefix.
    pub async fn join_room(&mut self, code: &str) -> Result<RoomId, NetworkError> {
        let code = code.trim();
        if code.is_empty() || code.contains('-') {
            return Err(NetworkError::InvalidRoom(code.to_string()));
        }

        let room = RoomId::from_code(&self.core.config.app_prefix, code);
        self.connect(&room).await?;
        Ok(room)
    }

    pub fn room(&self) -> Option<&RoomId> {
        self.room.as_ref()
    }

    /// The host's uuid, known once its first roster update arrived.
    pub fn host(&self) -> Option<&PeerId> {
        self.host.as_ref()
    }

    pub fn link(&self) -> Option<&PeerLink> {
        self.link.as_ref()
    }

    fn apply_roster(&mut self, envelope: &Envelope) {
        let update = match RosterUpdate::decode(&envelope.payload) {
            Ok(update) => update,
            Err(err) => {
                log::trace!("malformed `{}` update: {}", envelope.channel, err);
                return;
            }
        };

        self.host.get_or_insert_with(|| envelope.sender.clone());
        self.core.roster.replace(update.peers);

        if envelope.channel == CHANNEL_JOIN {
            log::info!("{} joined ({})", update.peer.metadata.display_name, update.peer.uuid);
            self.core.push_event(NetworkEvent::PeerJoined(update.peer));
        } else {
            log::info!("{} left ({})", update.peer.metadata.display_name, update.peer.uuid);
            self.core.push_event(NetworkEvent::PeerLeft(update.peer));
        }
    }

    fn flush(&mut self, sends: Vec<(String, Vec<u8>)>) {
        let Some(link) = self.link.as_mut() else {
            return;
        };

        for (channel, payload) in sends {
            let envelope = Envelope::new(channel, self.core.uuid().clone(), payload);
            let frame = match envelope.to_frame() {
                Ok(frame) => frame,
                Err(err) => {
                    log::warn!("not sending `{}`: {}", envelope.channel, err);
                    continue;
                }
            };
            if let Err(err) = link.send(frame) {
                log::debug!("send to host failed: {}", err);
            }
        }
    }
}

impl Network for ClientNetwork {
    fn role(&self) -> Role {
        Role::Client
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

    /// Takes effect on the next connect; the host learns metadata from the
    /// handshake only.
    fn set_metadata(&mut self, metadata: PeerMetadata) {
        self.core.set_metadata(metadata);
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
        log::info!("joining room {}", room.code());

        let mut attempt = ConnectAttempt::begin(&mut self.core);
        let core = attempt.core();
        let identity = core.identity();
        let timeout = core.config.connect_timeout;

        core.register(identity.uuid.as_str())?;
        let mut link = core.signaling.dial(&identity, room.full())?;

        match tokio::time::timeout(timeout, link.recv()).await {
            Ok(Some(LinkEvent::Open)) => {}
            Ok(Some(LinkEvent::Error(err))) => return Err(err.into()),
            Ok(Some(LinkEvent::Close | LinkEvent::Data(_)) | None) => {
                return Err(NetworkError::ClosedBeforeOpen);
            }
            Err(_) => return Err(NetworkError::Timeout(timeout)),
        }

        attempt.complete();
        self.link = Some(link);
        self.room = Some(room.clone());
        Ok(())
    }

    fn disconnect(&mut self) {
        if let Some(mut link) = self.link.take() {
            link.close();
        }
        if let Some(room) = self.room.take() {
            log::info!("left room {}", room.code());
        }
        self.host = None;
        self.core.teardown();
    }

    async fn pump(&mut self) -> usize {
        let sends = self.core.take_commands();

        let mut inbound = Vec::new();
        let mut failure = None;
        if let Some(link) = self.link.as_mut() {
            while let Some(event) = link.try_recv() {
                match event {
                    LinkEvent::Data(frame) => match Envelope::from_frame(&frame) {
                        Ok(envelope) => inbound.push(envelope),
                        Err(err) => log::trace!("malformed frame from host: {}", err),
                    },
                    LinkEvent::Close => {
                        failure = Some(String::from("host closed the connection"));
                        break;
                    }
                    LinkEvent::Error(err) => {
                        failure = Some(err.to_string());
                        break;
                    }
                    LinkEvent::Open => {}
                }
            }
        }

        let processed = inbound.len();
        for envelope in inbound {
            if envelope.channel == CHANNEL_JOIN || envelope.channel == CHANNEL_LEAVE {
                self.apply_roster(&envelope);
            }
            self.core.mux.dispatch(&envelope, &self.core.roster);
        }

        if let Some(reason) = failure {
            log::warn!("lost connection to host: {}", reason);
            self.disconnect();
            self.core.push_event(NetworkEvent::Error(reason));
            return processed;
        }

        self.flush(sends);
        processed
    }

    fn drain_events(&mut self) -> Drain<'_, NetworkEvent> {
        self.core.drain_events()
    }
}

impl Drop for ClientNetwork {
    fn drop(&mut self) {
        self.disconnect();
    }
}
