pub mod event;
pub mod net;
pub mod room;
pub mod simulation;
pub mod sync;

pub use event::{EventBus, EventDelivery, EventReceiver, GameEvent, GameEventKind};
pub use net::{
    AdmissionRequest, AnyNetwork, CHANNEL_CHAT, CHANNEL_EVENT, CHANNEL_JOIN, CHANNEL_LEAVE,
    CHANNEL_UPDATE, Channel, ChatMessage, ClientNetwork, ConnectionStatus, DEFAULT_APP_PREFIX,
    HostNetwork, LinkConditions, LocalBroker, Message, Network, NetworkConfig, NetworkContext,
    NetworkError, NetworkEvent, PacketError, Payload, PeerId, PeerIdentity, PeerMetadata, Role,
    Signaling, Subscription, TankVariant, TransportError,
};
pub use room::{NAMESPACE, RoomId, RoomOptions, create_room_id, parse_room_id};
pub use simulation::{SyncSchedule, Throttle};
pub use sync::{
    Interpolation, RemoteTank, SyncConfig, TankFlags, TankNetwork, TankRegistry, TankSnapshot,
    Transform, TransformSink,
};
