use std::time::Instant;

use bitflags::bitflags;
use rkyv::{Archive, Deserialize, Serialize};

use crate::net::{PeerId, TankVariant, rkyv_payload};

use super::config::SyncConfig;
use super::interpolation::{Interpolation, Transform};

bitflags! {
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct TankFlags: u8 {
        const DEAD  = 0b0001;
        const BOOST = 0b0010;
    }
}

/// The owner's view of its tank, broadcast on `update`. Who owns it comes
/// from the envelope, never from the payload.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
#[rkyv(derive(Debug))]
pub struct TankSnapshot {
    pub position: [f32; 3],
    pub rotation: [f32; 4],
    pub turret_angle: f32,
    pub health: f32,
    pub name: String,
    pub variant: TankVariant,
    pub flags: u8,
    /// Bumped by the owner on every respawn.
    pub life: u32,
}

impl Default for TankSnapshot {
    fn default() -> Self {
        Self {
            position: [0.0; 3],
            rotation: [0.0, 0.0, 0.0, 1.0],
            turret_angle: 0.0,
            health: 100.0,
            name: String::new(),
            variant: TankVariant::default(),
            flags: 0,
            life: 0,
        }
    }
}

impl TankSnapshot {
    pub fn transform(&self) -> Transform {
        Transform::from_arrays(self.position, self.rotation)
    }

    pub fn flags(&self) -> TankFlags {
        TankFlags::from_bits_truncate(self.flags)
    }

    pub fn is_dead(&self) -> bool {
        self.flags().contains(TankFlags::DEAD)
    }
}

rkyv_payload!(TankSnapshot);

/// Local proxy of a tank owned by another peer.
#[derive(Debug, Clone)]
pub struct RemoteTank {
    id: PeerId,
    name: String,
    variant: TankVariant,
    turret_angle: f32,
    health: f32,
    flags: TankFlags,
    life: u32,
    interpolation: Interpolation,
}

impl RemoteTank {
    pub fn new(id: PeerId, snapshot: TankSnapshot, now: Instant, config: &SyncConfig) -> Self {
        let mut tank = Self {
            id,
            name: String::new(),
            variant: snapshot.variant,
            turret_angle: 0.0,
            health: 0.0,
            flags: TankFlags::empty(),
            life: snapshot.life,
            interpolation: Interpolation::new(snapshot.transform(), now, config.initial_interval),
        };
        tank.copy_fields(snapshot, now);
        tank
    }

    /// Folds a newer snapshot in. Returns false when it was ignored: a dead
    /// tank only listens to snapshots from a later life, and snapshots from
    /// an earlier life are always stale.
    pub fn apply(&mut self, snapshot: TankSnapshot, now: Instant, config: &SyncConfig) -> bool {
        if snapshot.life < self.life {
            return false;
        }

        if snapshot.life > self.life {
            log::debug!("{} respawned (life {})", self.id, snapshot.life);
            self.life = snapshot.life;
            self.flags.remove(TankFlags::DEAD);
            self.interpolation.reset(snapshot.transform(), now);
            self.copy_fields(snapshot, now);
            return true;
        }

        if self.is_dead() {
            return false;
        }

        if !snapshot.is_dead() {
            self.interpolation
                .push(snapshot.transform(), now, config.max_interval);
        }
        self.copy_fields(snapshot, now);
        true
    }

    fn copy_fields(&mut self, snapshot: TankSnapshot, now: Instant) {
        let flags = snapshot.flags();
        self.name = snapshot.name;
        self.variant = snapshot.variant;
        self.turret_angle = snapshot.turret_angle;
        self.health = snapshot.health;
        self.flags = flags - TankFlags::DEAD;
        if flags.contains(TankFlags::DEAD) {
            self.die(now);
        }
    }

    /// Freezes the tank where it is currently drawn.
    pub fn die(&mut self, now: Instant) {
        if self.is_dead() {
            return;
        }
        let here = self.interpolation.sample(now);
        self.interpolation.reset(here, now);
        self.flags.insert(TankFlags::DEAD);
    }

    pub fn sample(&self, now: Instant) -> Transform {
        self.interpolation.sample(now)
    }

    pub fn is_dead(&self) -> bool {
        self.flags.contains(TankFlags::DEAD)
    }

    pub fn collidable(&self) -> bool {
        !self.is_dead()
    }

    pub fn id(&self) -> &PeerId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn variant(&self) -> TankVariant {
        self.variant
    }

    pub fn turret_angle(&self) -> f32 {
        self.turret_angle
    }

    pub fn health(&self) -> f32 {
        self.health
    }

    pub fn flags(&self) -> TankFlags {
        self.flags
    }

    pub fn life(&self) -> u32 {
        self.life
    }

    pub fn interpolation(&self) -> &Interpolation {
        &self.interpolation
    }
}
