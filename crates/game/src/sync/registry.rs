use std::collections::HashMap;
use std::time::Instant;

use crate::net::{PeerId, PeerIdentity};

use super::config::SyncConfig;
use super::tank::{RemoteTank, TankSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TankUpdate {
    Spawned,
    Updated,
    Ignored,
}

/// Remote tanks keyed by the uuid of the peer that owns them.
#[derive(Debug, Default)]
pub struct TankRegistry {
    tanks: HashMap<PeerId, RemoteTank>,
    config: SyncConfig,
}

impl TankRegistry {
    pub fn new(config: SyncConfig) -> Self {
        Self {
            tanks: HashMap::new(),
            config,
        }
    }

    pub fn apply(&mut self, owner: PeerId, snapshot: TankSnapshot, now: Instant) -> TankUpdate {
        if let Some(tank) = self.tanks.get_mut(&owner) {
            return if tank.apply(snapshot, now, &self.config) {
                TankUpdate::Updated
            } else {
                TankUpdate::Ignored
            };
        }

        log::debug!("spawning remote tank for {}", owner);
        let tank = RemoteTank::new(owner.clone(), snapshot, now, &self.config);
        self.tanks.insert(owner, tank);
        TankUpdate::Spawned
    }

    pub fn get(&self, owner: &PeerId) -> Option<&RemoteTank> {
        self.tanks.get(owner)
    }

    pub fn get_mut(&mut self, owner: &PeerId) -> Option<&mut RemoteTank> {
        self.tanks.get_mut(owner)
    }

    pub fn remove(&mut self, owner: &PeerId) -> Option<RemoteTank> {
        self.tanks.remove(owner)
    }

    /// Drops every tank whose owner is no longer in `roster`. Returns the
    /// owners removed.
    pub fn retain_roster(&mut self, roster: &[PeerIdentity]) -> Vec<PeerId> {
        let mut removed = Vec::new();
        self.tanks.retain(|owner, _| {
            let present = roster.iter().any(|peer| &peer.uuid == owner);
            if !present {
                removed.push(owner.clone());
            }
            present
        });

        for owner in &removed {
            log::debug!("despawned remote tank for {}", owner);
        }
        removed
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PeerId, &RemoteTank)> {
        self.tanks.iter()
    }

    pub fn contains(&self, owner: &PeerId) -> bool {
        self.tanks.contains_key(owner)
    }

    pub fn len(&self) -> usize {
        self.tanks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tanks.is_empty()
    }

    pub fn clear(&mut self) {
        self.tanks.clear();
    }
}
