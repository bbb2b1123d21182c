use std::time::Instant;

use crate::net::{
    CHANNEL_UPDATE, Channel, Network, NetworkError, PeerId, PeerIdentity, Subscription,
};

use super::config::SyncConfig;
use super::interpolation::Transform;
use super::registry::{TankRegistry, TankUpdate};
use super::tank::{RemoteTank, TankSnapshot};

/// Whatever draws or simulates remote tanks.
pub trait TransformSink {
    fn set_transform(&mut self, owner: &PeerId, transform: Transform, tank: &RemoteTank);

    fn remove(&mut self, _owner: &PeerId) {}
}

/// Wires the `update` channel to a [`TankRegistry`].
#[derive(Debug)]
pub struct TankNetwork {
    channel: Channel<TankSnapshot>,
    updates: Subscription<TankSnapshot>,
    registry: TankRegistry,
}

impl TankNetwork {
    pub fn new<N: Network>(network: &N, config: SyncConfig) -> Self {
        let channel = network.channel::<TankSnapshot>(CHANNEL_UPDATE, true);
        let updates = channel.subscribe();

        Self {
            channel,
            updates,
            registry: TankRegistry::new(config),
        }
    }

    /// Publishes the local tank. Flushed by the network's next pump.
    pub fn broadcast(&self, snapshot: &TankSnapshot) -> Result<(), NetworkError> {
        self.channel.send(snapshot)
    }

    /// Folds every snapshot received since the last call into the registry,
    /// each at the time its frame arrived. Returns the owners of newly
    /// spawned tanks.
    pub fn receive(&mut self) -> Vec<PeerId> {
        let mut spawned = Vec::new();
        for message in self.updates.drain() {
            let owner = message.sender;
            let update = self
                .registry
                .apply(owner.clone(), message.payload, message.received);
            if update == TankUpdate::Spawned {
                spawned.push(owner);
            }
        }
        spawned
    }

    pub fn apply_to<S: TransformSink>(&self, sink: &mut S, now: Instant) {
        for (owner, tank) in self.registry.iter() {
            sink.set_transform(owner, tank.sample(now), tank);
        }
    }

    /// Despawns tanks of peers that left the roster.
    pub fn reconcile(&mut self, roster: &[PeerIdentity]) -> Vec<PeerId> {
        self.registry.retain_roster(roster)
    }

    pub fn reconcile_into<S: TransformSink>(&mut self, roster: &[PeerIdentity], sink: &mut S) {
        for owner in self.reconcile(roster) {
            sink.remove(&owner);
        }
    }

    pub fn registry(&self) -> &TankRegistry {
        &self.registry
    }
}
