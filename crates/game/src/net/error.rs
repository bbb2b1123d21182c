use std::time::Duration;

use super::protocol::PacketError;
use super::transport::TransportError;

#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Packet(#[from] PacketError),
    #[error("no open connection after {0:?}")]
    Timeout(Duration),
    #[error("connection closed before it opened")]
    ClosedBeforeOpen,
    #[error("invalid room code `{0}`")]
    InvalidRoom(String),
    #[error("network handle is no longer attached")]
    Detached,
}
