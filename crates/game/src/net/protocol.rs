use rkyv::{Archive, Deserialize, Serialize, rancor};

pub const CHANNEL_JOIN: &str = "join";
pub const CHANNEL_LEAVE: &str = "leave";
pub const CHANNEL_UPDATE: &str = "update";
pub const CHANNEL_EVENT: &str = "event";
pub const CHANNEL_CHAT: &str = "chat";

/// Data channels start fragmenting (or refusing) messages past this size.
pub const MAX_FRAME_SIZE: usize = 16 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum PacketError {
    #[error("serialization failed: {0}")]
    Serialize(rancor::Error),
    #[error("deserialization failed: {0}")]
    Deserialize(rancor::Error),
    #[error("frame of {0} bytes exceeds the {MAX_FRAME_SIZE} byte limit")]
    Oversized(usize),
}

/// Anything that can ride inside an [`Envelope`] on a logical channel.
pub trait Payload: Sized {
    fn encode(&self) -> Result<Vec<u8>, PacketError>;
    fn decode(data: &[u8]) -> Result<Self, PacketError>;
}

/// Implements [`Payload`] through rkyv for concrete archivable types.
macro_rules! rkyv_payload {
    ($($ty:ty),* $(,)?) => {
        $(
            impl $crate::net::Payload for $ty {
                fn encode(&self) -> Result<Vec<u8>, $crate::net::PacketError> {
                    rkyv::to_bytes::<rkyv::rancor::Error>(self)
                        .map(|aligned| aligned.into_vec())
                        .map_err($crate::net::PacketError::Serialize)
                }

                fn decode(data: &[u8]) -> Result<Self, $crate::net::PacketError> {
                    // Frames come off the transport with no alignment guarantee.
                    let mut aligned = rkyv::util::AlignedVec::<16>::with_capacity(data.len());
                    aligned.extend_from_slice(data);
                    rkyv::from_bytes::<Self, rkyv::rancor::Error>(&aligned)
                        .map_err($crate::net::PacketError::Deserialize)
                }
            }
        )*
    };
}

pub(crate) use rkyv_payload;

impl Payload for Vec<u8> {
    fn encode(&self) -> Result<Vec<u8>, PacketError> {
        Ok(self.clone())
    }

    fn decode(data: &[u8]) -> Result<Self, PacketError> {
        Ok(data.to_vec())
    }
}

#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Archive,
    Serialize,
    Deserialize,
    serde::Serialize,
    serde::Deserialize,
)]
#[rkyv(derive(Debug))]
pub struct PeerId(String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Archive,
    Serialize,
    Deserialize,
    serde::Serialize,
    serde::Deserialize,
)]
#[rkyv(derive(Debug))]
pub enum TankVariant {
    #[default]
    Olive,
    Desert,
    Arctic,
    Crimson,
}

#[derive(
    Debug,
    Clone,
    Default,
    PartialEq,
    Eq,
    Archive,
    Serialize,
    Deserialize,
    serde::Serialize,
    serde::Deserialize,
)]
#[rkyv(derive(Debug))]
pub struct PeerMetadata {
    pub display_name: String,
    pub variant: TankVariant,
}

impl PeerMetadata {
    pub fn new(display_name: impl Into<String>, variant: TankVariant) -> Self {
        Self {
            display_name: display_name.into(),
            variant,
        }
    }
}

#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    Archive,
    Serialize,
    Deserialize,
    serde::Serialize,
    serde::Deserialize,
)]
#[rkyv(derive(Debug))]
pub struct PeerIdentity {
    pub uuid: PeerId,
    pub metadata: PeerMetadata,
}

impl PeerIdentity {
    pub fn new(uuid: PeerId, metadata: PeerMetadata) -> Self {
        Self { uuid, metadata }
    }
}

/// One physical transport frame. `sender` names the peer the payload
/// originated from; the host overwrites it when relaying.
#[derive(Debug, Clone, PartialEq, Eq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct Envelope {
    pub channel: String,
    pub sender: PeerId,
    pub payload: Vec<u8>,
}

impl Envelope {
    pub fn new(channel: impl Into<String>, sender: PeerId, payload: Vec<u8>) -> Self {
        Self {
            channel: channel.into(),
            sender,
            payload,
        }
    }

    pub fn to_frame(&self) -> Result<Vec<u8>, PacketError> {
        let frame = self.encode()?;
        if frame.len() > MAX_FRAME_SIZE {
            return Err(PacketError::Oversized(frame.len()));
        }
        Ok(frame)
    }

    pub fn from_frame(frame: &[u8]) -> Result<Self, PacketError> {
        if frame.len() > MAX_FRAME_SIZE {
            return Err(PacketError::Oversized(frame.len()));
        }
        Self::decode(frame)
    }
}

/// Body of `join` and `leave`: the peer that changed plus the full roster
/// after the change.
#[derive(Debug, Clone, PartialEq, Eq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct RosterUpdate {
    pub peer: PeerIdentity,
    pub peers: Vec<PeerIdentity>,
}

#[derive(Debug, Clone, PartialEq, Eq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct ChatMessage {
    pub text: String,
}

impl ChatMessage {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

rkyv_payload!(Envelope, RosterUpdate, ChatMessage, PeerIdentity);
