use std::collections::HashMap;
use std::f32::consts::TAU;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use glam::{Quat, Vec3};
use toonks::net::LinkStats;
use toonks::{
    CHANNEL_CHAT, ChatMessage, ClientNetwork, EventBus, EventReceiver, GameEvent, HostNetwork,
    LocalBroker, Network, NetworkConfig, NetworkContext, NetworkEvent, PeerId, PeerMetadata,
    RemoteTank, RoomId, RoomOptions, Signaling, Subscription, SyncConfig, SyncSchedule,
    TankFlags, TankNetwork, TankSnapshot, TankVariant, Transform, TransformSink,
};

const JOIN_WINDOW: Duration = Duration::from_millis(50);
const VARIANTS: [TankVariant; 4] = [
    TankVariant::Olive,
    TankVariant::Desert,
    TankVariant::Arctic,
    TankVariant::Crimson,
];

pub struct SessionConfig {
    pub players: usize,
    pub duration: Duration,
    pub network: NetworkConfig,
    pub sync: SyncConfig,
}

/// Drives one locally owned tank around a circle.
struct Driver {
    name: String,
    variant: TankVariant,
    radius: f32,
    phase: f32,
    life: u32,
    dead: bool,
}

impl Driver {
    fn new(name: &str, index: usize) -> Self {
        Self {
            name: name.to_string(),
            variant: VARIANTS[index % VARIANTS.len()],
            radius: 5.0 + index as f32 * 3.0,
            phase: index as f32 * 0.7,
            life: 0,
            dead: false,
        }
    }

    fn snapshot(&self, elapsed: f32) -> TankSnapshot {
        let angle = self.phase + elapsed * 0.5;
        let position = Vec3::new(angle.cos(), 0.0, angle.sin()) * self.radius;
        let heading = Quat::from_rotation_y(-(angle + TAU / 4.0));

        let mut flags = TankFlags::empty();
        if self.dead {
            flags |= TankFlags::DEAD;
        }

        TankSnapshot {
            position: position.to_array(),
            rotation: heading.to_array(),
            turret_angle: elapsed.sin(),
            health: if self.dead { 0.0 } else { 100.0 },
            name: self.name.clone(),
            variant: self.variant,
            flags: flags.bits(),
            life: self.life,
        }
    }
}

/// Stands in for the renderer.
#[derive(Default)]
struct View {
    drawn: HashMap<PeerId, Transform>,
    frames: u64,
}

impl TransformSink for View {
    fn set_transform(&mut self, owner: &PeerId, transform: Transform, _tank: &RemoteTank) {
        self.drawn.insert(owner.clone(), transform);
        self.frames += 1;
    }

    fn remove(&mut self, owner: &PeerId) {
        self.drawn.remove(owner);
    }
}

struct Player {
    network: ClientNetwork,
    tanks: TankNetwork,
    bus: EventBus,
    feed: EventReceiver,
    chat: Subscription<ChatMessage>,
    driver: Driver,
    view: View,
}

impl Player {
    fn name(&self) -> &str {
        &self.driver.name
    }
}

pub struct Session {
    config: SessionConfig,
    context: NetworkContext,
    host_tanks: TankNetwork,
    host_feed: EventReceiver,
    host_driver: Driver,
    host_view: View,
    players: Vec<Player>,
    room: RoomId,
}

async fn serve(context: &mut NetworkContext, window: Duration) {
    let deadline = Instant::now() + window;
    while Instant::now() < deadline {
        context.pump().await;
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

impl Session {
    pub async fn open(broker: LocalBroker, config: SessionConfig) -> Result<Self> {
        let signaling: Arc<dyn Signaling> = Arc::new(broker);

        let mut host = HostNetwork::new(signaling.clone(), config.network.clone());
        host.set_metadata(PeerMetadata::new("host", TankVariant::Olive));
        host.set_handle_connection(|request| async move {
            !request.peer.metadata.display_name.trim().is_empty()
        });

        let mut context = NetworkContext::new();
        let host_feed = context.events_mut().subscribe_all();
        let network = context.replace(host);
        let room = network
            .as_host_mut()
            .context("context lost the host network")?
            .create_room(RoomOptions::default())
            .await?;
        let host_tanks = TankNetwork::new(&*network, config.sync.clone());
        log::info!("room code {}", room.code());

        let mut players = Vec::with_capacity(config.players);
        for index in 0..config.players {
            let name = format!("player-{}", index + 1);
            let driver = Driver::new(&name, index + 1);

            let mut network = ClientNetwork::new(signaling.clone(), config.network.clone());
            network.set_metadata(PeerMetadata::new(&name, driver.variant));
            let tanks = TankNetwork::new(&network, config.sync.clone());
            let chat = network
                .channel::<ChatMessage>(CHANNEL_CHAT, true)
                .subscribe();
            let mut bus = EventBus::new();
            bus.attach(&network);
            let feed = bus.subscribe_all();

            let (joined, ()) = tokio::join!(
                network.join_room(room.code()),
                serve(&mut context, JOIN_WINDOW)
            );
            joined.with_context(|| format!("{name} could not join {}", room.code()))?;

            players.push(Player {
                network,
                tanks,
                bus,
                feed,
                chat,
                driver,
                view: View::default(),
            });
        }

        Ok(Self {
            config,
            context,
            host_tanks,
            host_feed,
            host_driver: Driver::new("host", 0),
            host_view: View::default(),
            players,
            room,
        })
    }

    pub async fn run(&mut self) -> Result<()> {
        let started = Instant::now();
        let deadline = started + self.config.duration;
        let leave_at = started + self.config.duration / 2;
        let mut schedule = SyncSchedule::new(&self.config.sync, started);
        let mut round = 0u32;
        let mut departed = false;

        while Instant::now() < deadline {
            self.pump().await;

            let now = Instant::now();
            let elapsed = now.duration_since(started).as_secs_f32();

            if schedule.update.is_due(now) {
                self.broadcast_tanks(elapsed)?;
                self.draw(now);
                schedule.update.complete(now, Instant::now());
            }

            if schedule.maintenance.is_due(now) {
                round += 1;
                self.script(round)?;
                self.reconcile();
                schedule.maintenance.complete(now, Instant::now());
            }

            if !departed && now >= leave_at && self.players.len() > 1 {
                departed = true;
                if let Some(player) = self.players.last_mut() {
                    log::info!("{} leaves the match", player.driver.name);
                    player.network.disconnect();
                }
            }

            schedule.wait().await;
        }

        self.context.clear();
        Ok(())
    }

    async fn pump(&mut self) {
        self.context.pump().await;
        if let Some(network) = self.context.network_mut() {
            for event in network.drain_events() {
                log_network_event("host", &event);
            }
        }
        while let Ok(delivery) = self.host_feed.try_recv() {
            log::debug!("host heard {:?} from {:?}", delivery.event.kind(), delivery.from);
        }

        for player in &mut self.players {
            player.network.pump().await;
            player.bus.pump();

            let name = player.driver.name.clone();
            for event in player.network.drain_events() {
                log_network_event(&name, &event);
            }
            for message in player.chat.drain() {
                log::info!("[{}] chat from {}: {}", name, message.sender, message.payload.text);
            }
            while let Ok(delivery) = player.feed.try_recv() {
                log::debug!("{} heard {:?}", name, delivery.event.kind());
            }
        }
    }

    fn broadcast_tanks(&mut self, elapsed: f32) -> Result<()> {
        self.host_tanks
            .broadcast(&self.host_driver.snapshot(elapsed))?;
        for player in &self.players {
            if player.network.room().is_some() {
                player.tanks.broadcast(&player.driver.snapshot(elapsed))?;
            }
        }
        Ok(())
    }

    fn draw(&mut self, now: Instant) {
        for owner in self.host_tanks.receive() {
            log::info!("host sees a new tank for {}", owner);
        }
        self.host_tanks.apply_to(&mut self.host_view, now);

        for player in &mut self.players {
            player.tanks.receive();
            player.tanks.apply_to(&mut player.view, now);
        }
    }

    fn reconcile(&mut self) {
        if let Some(network) = self.context.network() {
            self.host_tanks
                .reconcile_into(network.connected_peers(), &mut self.host_view);
        }
        for player in &mut self.players {
            player
                .tanks
                .reconcile_into(player.network.connected_peers(), &mut player.view);
        }
    }

    /// A few scripted moments so every channel carries traffic.
    fn script(&mut self, round: u32) -> Result<()> {
        let Some(first) = self.players.first_mut() else {
            return Ok(());
        };
        let victim = first.network.identity().uuid;

        match round {
            2 => {
                first
                    .network
                    .send(CHANNEL_CHAT, &ChatMessage::new("gl hf"))?;
            }
            4 => {
                first.bus.send(GameEvent::Honk, true)?;
            }
            6 => {
                first.driver.dead = true;
                let killer = self
                    .context
                    .network()
                    .map(|network| network.identity().uuid)
                    .context("no active network")?;
                self.context
                    .events_mut()
                    .send(GameEvent::Kill { killer, victim }, true)?;
            }
            10 => {
                first.driver.dead = false;
                first.driver.life += 1;
                let position = first.driver.snapshot(0.0).position;
                first.bus.send(GameEvent::Respawn { position }, true)?;
                log::info!("{} respawned (life {})", first.name(), first.driver.life);
            }
            _ => {}
        }
        Ok(())
    }

    pub fn report(&self) {
        log::info!("match in room {} finished", self.room.code());
        log::info!(
            "host drew {} remote tanks ({} frames)",
            self.host_view.drawn.len(),
            self.host_view.frames
        );

        let mut total = LinkStats::default();
        for player in &self.players {
            let stats = player
                .network
                .link()
                .map(|link| link.stats().clone())
                .unwrap_or_default();
            total.merge(&stats);
            let dead = player
                .tanks
                .registry()
                .iter()
                .filter(|(_, tank)| tank.is_dead())
                .count();

            log::info!(
                "{}: {} tanks known ({} dead), {} frames drawn, {} sent / {} received / {} dropped",
                player.name(),
                player.tanks.registry().len(),
                dead,
                player.view.frames,
                stats.frames_sent,
                stats.frames_received,
                stats.frames_dropped
            );
        }

        log::info!(
            "client links: {} sent / {} received / {} dropped, {} B out / {} B in",
            total.frames_sent,
            total.frames_received,
            total.frames_dropped,
            total.bytes_sent,
            total.bytes_received
        );
    }
}

fn log_network_event(who: &str, event: &NetworkEvent) {
    match event {
        NetworkEvent::Status(status) => log::debug!("[{}] {}", who, status.as_str()),
        NetworkEvent::Connected(identity) => log::info!("[{}] connected as {}", who, identity.uuid),
        NetworkEvent::PeerJoined(peer) => {
            log::info!("[{}] {} joined", who, peer.metadata.display_name)
        }
        NetworkEvent::PeerLeft(peer) => log::info!("[{}] {} left", who, peer.metadata.display_name),
        NetworkEvent::Error(message) => log::warn!("[{}] {}", who, message),
    }
}
