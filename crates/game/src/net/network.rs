use std::collections::VecDeque;
use std::collections::vec_deque::Drain;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::room::RoomId;

use super::channel::{Channel, ChannelMux, MuxCommand};
use super::config::NetworkConfig;
use super::connection::{ConnectionStatus, Roster};
use super::error::NetworkError;
use super::protocol::{Payload, PeerId, PeerIdentity, PeerMetadata};
use super::transport::{Registration, Signaling, TransportError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Host,
    Client,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkEvent {
    Status(ConnectionStatus),
    Connected(PeerIdentity),
    PeerJoined(PeerIdentity),
    PeerLeft(PeerIdentity),
    Error(String),
}

/// What every network variant can do. `HostNetwork` and `ClientNetwork`
/// implement it directly; `AnyNetwork` dispatches between them.
#[allow(async_fn_in_trait)]
pub trait Network {
    fn role(&self) -> Role;

    fn status(&self) -> ConnectionStatus;

    fn identity(&self) -> PeerIdentity;

    fn metadata(&self) -> Option<&PeerMetadata>;

    fn set_metadata(&mut self, metadata: PeerMetadata);

    fn connected_peers(&self) -> &[PeerIdentity];

    fn channel<T: Payload>(&self, name: &str, check_peer: bool) -> Channel<T>;

    fn send<T: Payload>(&mut self, channel: &str, payload: &T) -> Result<(), NetworkError>;

    /// Tears down whatever was open, then opens `room`. Resolves once the
    /// transport is usable. A resolved connect is advisory: check
    /// [`Network::status`] before relying on it later.
    async fn connect(&mut self, room: &RoomId) -> Result<(), NetworkError>;

    /// Idempotent.
    fn disconnect(&mut self);

    /// One cooperative step: applies queued subscriptions, handles link
    /// events, dispatches messages and flushes queued sends. Returns the
    /// number of application frames handled.
    async fn pump(&mut self) -> usize;

    fn drain_events(&mut self) -> Drain<'_, NetworkEvent>;
}

/// State shared by both variants: identity, status machine, roster, the
/// channel mux and the signaling registration.
pub(crate) struct NetworkCore {
    pub(crate) config: NetworkConfig,
    pub(crate) signaling: Arc<dyn Signaling>,
    pub(crate) roster: Roster,
    pub(crate) mux: ChannelMux,
    uuid: PeerId,
    metadata: Option<PeerMetadata>,
    status: ConnectionStatus,
    commands_tx: mpsc::UnboundedSender<MuxCommand>,
    commands_rx: mpsc::UnboundedReceiver<MuxCommand>,
    events: VecDeque<NetworkEvent>,
    registration: Option<Registration>,
}

impl NetworkCore {
    pub(crate) fn new(signaling: Arc<dyn Signaling>, config: NetworkConfig) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();

        Self {
            config,
            signaling,
            roster: Roster::new(),
            mux: ChannelMux::new(),
            uuid: PeerId::generate(),
            metadata: None,
            status: ConnectionStatus::Disconnected,
            commands_tx,
            commands_rx,
            events: VecDeque::new(),
            registration: None,
        }
    }

    pub(crate) fn uuid(&self) -> &PeerId {
        &self.uuid
    }

    pub(crate) fn identity(&self) -> PeerIdentity {
        PeerIdentity::new(self.uuid.clone(), self.metadata.clone().unwrap_or_default())
    }

    pub(crate) fn metadata(&self) -> Option<&PeerMetadata> {
        self.metadata.as_ref()
    }

    pub(crate) fn set_metadata(&mut self, metadata: PeerMetadata) {
        self.metadata = Some(metadata);
    }

    pub(crate) fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    pub(crate) fn set_status(&mut self, status: ConnectionStatus) {
        if self.status == status {
            return;
        }
        log::debug!("{} -> {}", self.status.as_str(), status.as_str());
        self.status = status;
        self.events.push_back(NetworkEvent::Status(status));
    }

    pub(crate) fn push_event(&mut self, event: NetworkEvent) {
        self.events.push_back(event);
    }

    pub(crate) fn drain_events(&mut self) -> Drain<'_, NetworkEvent> {
        self.events.drain(..)
    }

    pub(crate) fn channel<T: Payload>(&self, name: &str, check_peer: bool) -> Channel<T> {
        Channel::new(name, check_peer, self.commands_tx.clone())
    }

    pub(crate) fn queue_send<T: Payload>(
        &mut self,
        channel: &str,
        payload: &T,
    ) -> Result<(), NetworkError> {
        let payload = payload.encode()?;
        self.commands_tx
            .send(MuxCommand::Send {
                channel: channel.to_string(),
                payload,
            })
            .map_err(|_| NetworkError::Detached)
    }

    /// Applies queued subscriptions and returns queued sends. Sends queued
    /// while not connected are discarded.
    pub(crate) fn take_commands(&mut self) -> Vec<(String, Vec<u8>)> {
        let mut sends = Vec::new();
        while let Ok(command) = self.commands_rx.try_recv() {
            match command {
                MuxCommand::Subscribe {
                    channel,
                    check_peer,
                    sink,
                } => self.mux.subscribe(channel, check_peer, sink),
                MuxCommand::Send { channel, payload } => {
                    if self.is_connected() {
                        sends.push((channel, payload));
                    } else {
                        log::trace!("dropped `{}` send while {}", channel, self.status.as_str());
                    }
                }
            }
        }
        sends
    }

    pub(crate) fn register(&mut self, peer_id: &str) -> Result<(), TransportError> {
        let registration = self.signaling.register(peer_id)?;
        self.registration = Some(registration);
        Ok(())
    }

    pub(crate) fn registration_mut(&mut self) -> Option<&mut Registration> {
        self.registration.as_mut()
    }

    /// Releases the signaling id, clears the roster and discards queued
    /// sends. Callers close their own links first.
    pub(crate) fn teardown(&mut self) {
        if let Some(registration) = self.registration.take() {
            self.signaling.unregister(registration.peer_id());
        }
        self.roster.clear();
        self.set_status(ConnectionStatus::Disconnected);
        self.take_commands();
    }
}

/// Tears the core down if the connect that created it fails or is dropped
/// before [`ConnectAttempt::complete`].
pub(crate) struct ConnectAttempt<'a> {
    core: &'a mut NetworkCore,
    armed: bool,
}

impl<'a> ConnectAttempt<'a> {
    pub(crate) fn begin(core: &'a mut NetworkCore) -> Self {
        core.set_status(ConnectionStatus::Connecting);
        Self { core, armed: true }
    }

    pub(crate) fn core(&mut self) -> &mut NetworkCore {
        self.core
    }

    pub(crate) fn complete(mut self) {
        self.armed = false;
        self.core.set_status(ConnectionStatus::Connected);
        let identity = self.core.identity();
        self.core.push_event(NetworkEvent::Connected(identity));
    }
}

impl Drop for ConnectAttempt<'_> {
    fn drop(&mut self) {
        if self.armed {
            log::debug!("connect attempt abandoned, tearing down");
            self.core.teardown();
        }
    }
}
