use rkyv::{Archive, Deserialize, Serialize};

use crate::net::{PeerId, rkyv_payload};

/// Gameplay notifications shared between peers over the `event` channel.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub enum GameEvent {
    Kill {
        killer: PeerId,
        victim: PeerId,
    },
    Hit {
        target: PeerId,
        damage: f32,
        position: [f32; 3],
    },
    Explosion {
        position: [f32; 3],
        radius: f32,
    },
    Shoot {
        origin: [f32; 3],
        direction: [f32; 3],
    },
    Honk,
    Toast {
        message: String,
    },
    Respawn {
        position: [f32; 3],
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GameEventKind {
    Kill,
    Hit,
    Explosion,
    Shoot,
    Honk,
    Toast,
    Respawn,
}

impl GameEvent {
    pub fn kind(&self) -> GameEventKind {
        match self {
            Self::Kill { .. } => GameEventKind::Kill,
            Self::Hit { .. } => GameEventKind::Hit,
            Self::Explosion { .. } => GameEventKind::Explosion,
            Self::Shoot { .. } => GameEventKind::Shoot,
            Self::Honk => GameEventKind::Honk,
            Self::Toast { .. } => GameEventKind::Toast,
            Self::Respawn { .. } => GameEventKind::Respawn,
        }
    }
}

impl GameEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GameEventKind::Kill => "kill",
            GameEventKind::Hit => "hit",
            GameEventKind::Explosion => "explosion",
            GameEventKind::Shoot => "shoot",
            GameEventKind::Honk => "honk",
            GameEventKind::Toast => "toast",
            GameEventKind::Respawn => "respawn",
        }
    }
}

rkyv_payload!(GameEvent);
