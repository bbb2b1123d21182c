mod channel;
mod client;
mod config;
mod connection;
mod context;
mod error;
mod host;
mod network;
mod protocol;
mod simulator;
mod stats;
mod transport;

pub(crate) use protocol::rkyv_payload;

pub use channel::{Channel, ChannelMux, Message, Subscription};
pub use client::ClientNetwork;
pub use config::{DEFAULT_APP_PREFIX, DEFAULT_CONNECT_TIMEOUT, NetworkConfig};
pub use connection::{ConnectionStatus, PeerConnection, Roster};
pub use context::{AnyNetwork, NetworkContext};
pub use error::NetworkError;
pub use host::{AdmissionFuture, AdmissionRequest, HostNetwork};
pub use network::{Network, NetworkEvent, Role};
pub use protocol::{
    CHANNEL_CHAT, CHANNEL_EVENT, CHANNEL_JOIN, CHANNEL_LEAVE, CHANNEL_UPDATE, ChatMessage,
    Envelope, MAX_FRAME_SIZE, PacketError, Payload, PeerId, PeerIdentity, PeerMetadata,
    RosterUpdate, TankVariant,
};
pub use simulator::LocalBroker;
pub use stats::{LinkConditions, LinkStats};
pub use transport::{LinkEvent, LinkId, PeerLink, Registration, Signaling, TransportError};
