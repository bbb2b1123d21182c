use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use toonks::net::{Envelope, RosterUpdate};
use toonks::{
    CHANNEL_CHAT, CHANNEL_JOIN, CHANNEL_LEAVE, ChatMessage, ClientNetwork, ConnectionStatus,
    EventBus, GameEvent, GameEventKind, HostNetwork, LocalBroker, Network, NetworkConfig,
    NetworkContext, NetworkError, NetworkEvent, Payload, PeerId, PeerIdentity, PeerMetadata,
    RemoteTank, Role, RoomId, RoomOptions, Signaling, SyncConfig, TankNetwork, TankSnapshot,
    TankVariant, Transform, TransformSink,
};

fn host_named(broker: &LocalBroker, name: Option<&str>) -> HostNetwork {
    let mut host = HostNetwork::new(Arc::new(broker.clone()), NetworkConfig::default());
    if let Some(name) = name {
        host.set_metadata(PeerMetadata::new(name, TankVariant::Olive));
    }
    host
}

fn client_named(broker: &LocalBroker, name: &str) -> ClientNetwork {
    let mut client = ClientNetwork::new(Arc::new(broker.clone()), NetworkConfig::default());
    client.set_metadata(PeerMetadata::new(name, TankVariant::Desert));
    client
}

async fn serve(host: &mut HostNetwork, duration: Duration) {
    let deadline = Instant::now() + duration;
    while Instant::now() < deadline {
        host.pump().await;
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

async fn connect_client(
    host: &mut HostNetwork,
    client: &mut ClientNetwork,
    room: &RoomId,
) -> Result<(), NetworkError> {
    let (result, ()) = tokio::join!(client.connect(room), serve(host, Duration::from_millis(30)));
    result
}

async fn settle(host: &mut HostNetwork, clients: &mut [&mut ClientNetwork]) {
    for _ in 0..4 {
        host.pump().await;
        for client in clients.iter_mut() {
            client.pump().await;
        }
    }
}

fn uuids(peers: &[PeerIdentity]) -> Vec<&str> {
    peers.iter().map(|p| p.uuid.as_str()).collect()
}

#[tokio::test]
async fn test_host_client_join_chat_leave() {
    let broker = LocalBroker::new();
    let mut host = host_named(&broker, Some("host"));
    let room = host.create_room(RoomOptions::default()).await.unwrap();

    let mut ada = client_named(&broker, "ada");
    let mut bob = client_named(&broker, "bob");
    let ada_id = ada.identity().uuid;
    let bob_id = bob.identity().uuid;

    let mut host_chat = host.channel::<ChatMessage>(CHANNEL_CHAT, true).subscribe();
    let mut bob_chat = bob.channel::<ChatMessage>(CHANNEL_CHAT, true).subscribe();

    connect_client(&mut host, &mut ada, &room).await.unwrap();
    connect_client(&mut host, &mut bob, &room).await.unwrap();
    settle(&mut host, &mut [&mut ada, &mut bob]).await;

    let host_id = host.identity().uuid;
    let expected = vec![host_id.as_str(), ada_id.as_str(), bob_id.as_str()];
    assert_eq!(uuids(host.connected_peers()), expected);
    assert_eq!(uuids(ada.connected_peers()), expected);
    assert_eq!(uuids(bob.connected_peers()), expected);
    assert_eq!(ada.host(), Some(&host_id));

    ada.channel::<ChatMessage>(CHANNEL_CHAT, true)
        .send(&ChatMessage::new("hello"))
        .unwrap();
    settle(&mut host, &mut [&mut ada, &mut bob]).await;

    let at_host = host_chat.try_recv().expect("host missed chat");
    assert_eq!(at_host.sender, ada_id);
    assert_eq!(at_host.payload.text, "hello");
    let at_bob = bob_chat.try_recv().expect("bob missed relayed chat");
    assert_eq!(at_bob.sender, ada_id);

    bob.disconnect();
    settle(&mut host, &mut [&mut ada]).await;

    assert_eq!(uuids(host.connected_peers()), vec![host_id.as_str(), ada_id.as_str()]);
    assert_eq!(uuids(ada.connected_peers()), vec![host_id.as_str(), ada_id.as_str()]);

    let host_events: Vec<_> = host.drain_events().collect();
    let joined = host_events
        .iter()
        .filter(|e| matches!(e, NetworkEvent::PeerJoined(_)))
        .count();
    assert_eq!(joined, 2);
    assert!(
        host_events
            .iter()
            .any(|e| matches!(e, NetworkEvent::PeerLeft(p) if p.uuid == bob_id))
    );
    assert!(
        ada.drain_events()
            .any(|e| matches!(e, NetworkEvent::PeerLeft(p) if p.uuid == bob_id))
    );
}

#[tokio::test]
async fn test_rejected_admission_never_grows_roster() {
    let broker = LocalBroker::new();
    let mut host = host_named(&broker, Some("host"));
    host.set_handle_connection(|request| async move {
        request.peer.metadata.display_name != "mallory"
    });
    let room = host.create_room(RoomOptions::default()).await.unwrap();
    host.drain_events().for_each(drop);

    let mut mallory = client_named(&broker, "mallory");
    let result = connect_client(&mut host, &mut mallory, &room).await;

    assert!(matches!(result, Err(NetworkError::ClosedBeforeOpen)));
    assert_eq!(mallory.status(), ConnectionStatus::Disconnected);
    assert_eq!(host.connected_peers().len(), 1);
    assert!(host.connections().is_empty());
    assert!(
        !host
            .drain_events()
            .any(|e| matches!(e, NetworkEvent::PeerJoined(_)))
    );

    let mut ada = client_named(&broker, "ada");
    connect_client(&mut host, &mut ada, &room).await.unwrap();
    assert_eq!(host.connected_peers().len(), 2);
}

#[tokio::test]
async fn test_admission_sees_connected_count() {
    let broker = LocalBroker::new();
    let mut host = host_named(&broker, None);
    host.set_handle_connection(|request| async move { request.connected < 1 });
    let room = host.create_room(RoomOptions::default()).await.unwrap();

    let mut ada = client_named(&broker, "ada");
    let mut bob = client_named(&broker, "bob");
    connect_client(&mut host, &mut ada, &room).await.unwrap();
    let result = connect_client(&mut host, &mut bob, &room).await;

    assert!(matches!(result, Err(NetworkError::ClosedBeforeOpen)));
    assert_eq!(host.connections().len(), 1);
}

#[tokio::test]
async fn test_switch_tears_down_before_next_network() {
    let broker = LocalBroker::new();
    let signaling: Arc<dyn Signaling> = Arc::new(broker.clone());
    let mut context = NetworkContext::new();

    let network = context.replace(HostNetwork::new(signaling.clone(), NetworkConfig::default()));
    let room = network
        .as_host_mut()
        .unwrap()
        .create_room(RoomOptions::default())
        .await
        .unwrap();
    assert!(broker.is_registered(room.full()));
    assert!(context.events().is_attached());

    let mut ada = client_named(&broker, "ada");
    let (result, ()) = tokio::join!(ada.connect(&room), async {
        for _ in 0..20 {
            context.pump().await;
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    });
    result.unwrap();

    let next = context.replace(ClientNetwork::new(signaling.clone(), NetworkConfig::default()));
    assert_eq!(next.role(), Role::Client);
    assert_eq!(next.status(), ConnectionStatus::Disconnected);
    assert!(!broker.is_registered(room.full()));
    assert_eq!(broker.registered_count(), 1);

    ada.pump().await;
    assert_eq!(ada.status(), ConnectionStatus::Disconnected);
    assert!(
        ada.drain_events()
            .any(|e| matches!(e, NetworkEvent::Error(_)))
    );
    assert_eq!(broker.registered_count(), 0);

    context.clear();
    assert!(context.network().is_none());
    assert!(!context.events().is_attached());
}

#[tokio::test]
async fn test_join_is_unchecked_chat_is_checked() {
    let broker = LocalBroker::new();
    // Without metadata the host is not part of its own roster.
    let mut host = host_named(&broker, None);
    let room = host.create_room(RoomOptions::default()).await.unwrap();

    let mut ada = client_named(&broker, "ada");
    let mut joins = ada.channel::<RosterUpdate>(CHANNEL_JOIN, false).subscribe();
    let mut checked = ada.channel::<ChatMessage>(CHANNEL_CHAT, true).subscribe();
    let mut unchecked = ada.channel::<ChatMessage>(CHANNEL_CHAT, false).subscribe();

    connect_client(&mut host, &mut ada, &room).await.unwrap();
    settle(&mut host, &mut [&mut ada]).await;

    let join = joins.try_recv().expect("join not delivered");
    assert_eq!(join.payload.peer.uuid, ada.identity().uuid);
    assert_eq!(join.payload.peers.len(), 1);

    host.send(CHANNEL_CHAT, &ChatMessage::new("psst")).unwrap();
    settle(&mut host, &mut [&mut ada]).await;

    assert!(checked.try_recv().is_none());
    assert_eq!(unchecked.try_recv().unwrap().payload.text, "psst");
}

#[tokio::test]
async fn test_client_link_error_disconnects_fully() {
    let broker = LocalBroker::new();
    let mut host = host_named(&broker, Some("host"));
    let room = host.create_room(RoomOptions::default()).await.unwrap();
    let mut ada = client_named(&broker, "ada");
    let ada_id = ada.identity().uuid;
    connect_client(&mut host, &mut ada, &room).await.unwrap();
    settle(&mut host, &mut [&mut ada]).await;

    assert_eq!(broker.fail_link(ada_id.as_str(), room.full()), 1);
    ada.pump().await;

    assert_eq!(ada.status(), ConnectionStatus::Disconnected);
    assert!(ada.connected_peers().is_empty());
    assert!(ada.room().is_none());
    assert!(!broker.is_registered(ada_id.as_str()));
    let events: Vec<_> = ada.drain_events().collect();
    assert!(events.contains(&NetworkEvent::Status(ConnectionStatus::Disconnected)));
    assert!(events.iter().any(|e| matches!(e, NetworkEvent::Error(_))));

    // The host sees the closed link as a normal departure.
    settle(&mut host, &mut []).await;
    assert_eq!(host.connected_peers().len(), 1);
}

#[tokio::test]
async fn test_host_link_error_removes_only_that_peer() {
    let broker = LocalBroker::new();
    let mut host = host_named(&broker, Some("host"));
    let room = host.create_room(RoomOptions::default()).await.unwrap();
    let mut ada = client_named(&broker, "ada");
    let mut bob = client_named(&broker, "bob");
    let ada_id = ada.identity().uuid;
    connect_client(&mut host, &mut ada, &room).await.unwrap();
    connect_client(&mut host, &mut bob, &room).await.unwrap();
    settle(&mut host, &mut [&mut ada, &mut bob]).await;
    bob.drain_events().for_each(drop);

    assert_eq!(broker.fail_link(room.full(), ada_id.as_str()), 1);
    settle(&mut host, &mut [&mut ada, &mut bob]).await;

    assert_eq!(host.status(), ConnectionStatus::Connected);
    assert_eq!(host.connected_peers().len(), 2);
    assert!(!host.connected_peers().iter().any(|p| p.uuid == ada_id));
    assert_eq!(bob.connected_peers().len(), 2);
    assert!(
        bob.drain_events()
            .any(|e| matches!(e, NetworkEvent::PeerLeft(p) if p.uuid == ada_id))
    );
    assert_eq!(ada.status(), ConnectionStatus::Disconnected);
}

#[tokio::test]
async fn test_dropped_connect_leaves_no_state() {
    let broker = LocalBroker::new();
    let room = RoomId::from_code("TOONKS", "STALLS");
    let _silent = broker.register(room.full()).unwrap();

    let mut ada = client_named(&broker, "ada");
    let attempt = tokio::time::timeout(Duration::from_millis(20), ada.connect(&room)).await;
    assert!(attempt.is_err());

    assert_eq!(ada.status(), ConnectionStatus::Disconnected);
    assert!(!broker.is_registered(ada.identity().uuid.as_str()));
    assert_eq!(broker.registered_count(), 1);
}

#[tokio::test]
async fn test_relay_stamps_origin_and_drops_forged_roster() {
    let broker = LocalBroker::new();
    let mut host = host_named(&broker, Some("host"));
    let room = host.create_room(RoomOptions::default()).await.unwrap();
    let mut bob = client_named(&broker, "bob");
    let mut bob_chat = bob.channel::<ChatMessage>(CHANNEL_CHAT, true).subscribe();
    connect_client(&mut host, &mut bob, &room).await.unwrap();

    let raw_identity = PeerIdentity::new(
        PeerId::new("raw"),
        PeerMetadata::new("raw", TankVariant::Arctic),
    );
    let mut raw = broker.dial(&raw_identity, room.full()).unwrap();
    settle(&mut host, &mut [&mut bob]).await;
    assert!(bob.connected_peers().iter().any(|p| p.uuid.as_str() == "raw"));

    let forged_chat = Envelope::new(
        CHANNEL_CHAT,
        PeerId::new("host"),
        ChatMessage::new("trust me").encode().unwrap(),
    );
    let forged_leave = Envelope::new(
        CHANNEL_LEAVE,
        PeerId::new("host"),
        RosterUpdate {
            peer: raw_identity.clone(),
            peers: Vec::new(),
        }
        .encode()
        .unwrap(),
    );
    raw.send(forged_chat.to_frame().unwrap()).unwrap();
    raw.send(forged_leave.to_frame().unwrap()).unwrap();
    raw.send(vec![0xff, 0x00]).unwrap();
    settle(&mut host, &mut [&mut bob]).await;

    let message = bob_chat.try_recv().expect("relayed chat missing");
    assert_eq!(message.sender.as_str(), "raw");
    assert_eq!(message.payload.text, "trust me");
    assert_eq!(bob.connected_peers().len(), 3);
    assert_eq!(host.connected_peers().len(), 3);
}

#[derive(Default)]
struct Recorder {
    transforms: HashMap<PeerId, Transform>,
}

impl TransformSink for Recorder {
    fn set_transform(&mut self, owner: &PeerId, transform: Transform, _tank: &RemoteTank) {
        self.transforms.insert(owner.clone(), transform);
    }

    fn remove(&mut self, owner: &PeerId) {
        self.transforms.remove(owner);
    }
}

#[tokio::test]
async fn test_tank_snapshots_and_events_cross_the_star() {
    let broker = LocalBroker::new();
    let mut host = host_named(&broker, Some("host"));
    let room = host.create_room(RoomOptions::default()).await.unwrap();
    let mut ada = client_named(&broker, "ada");
    let mut bob = client_named(&broker, "bob");
    let ada_id = ada.identity().uuid;

    let mut host_tanks = TankNetwork::new(&host, SyncConfig::default());
    let mut bob_tanks = TankNetwork::new(&bob, SyncConfig::default());
    let ada_tanks = TankNetwork::new(&ada, SyncConfig::default());

    let mut host_bus = EventBus::new();
    host_bus.attach(&host);
    let mut host_honks = host_bus.subscribe(GameEventKind::Honk);
    let mut ada_bus = EventBus::new();
    ada_bus.attach(&ada);
    let mut ada_honks = ada_bus.subscribe(GameEventKind::Honk);

    connect_client(&mut host, &mut ada, &room).await.unwrap();
    connect_client(&mut host, &mut bob, &room).await.unwrap();
    settle(&mut host, &mut [&mut ada, &mut bob]).await;

    ada_tanks
        .broadcast(&TankSnapshot {
            position: [1.0, 2.0, 3.0],
            name: "ada".into(),
            ..TankSnapshot::default()
        })
        .unwrap();
    ada_bus.send(GameEvent::Honk, true).unwrap();
    settle(&mut host, &mut [&mut ada, &mut bob]).await;
    host_bus.pump();

    let local = ada_honks.try_recv().unwrap();
    assert_eq!(local.from, None);
    let remote = host_honks.try_recv().expect("honk not forwarded");
    assert_eq!(remote.from, Some(ada_id.clone()));

    let now = Instant::now();
    assert_eq!(host_tanks.receive(), vec![ada_id.clone()]);
    assert_eq!(bob_tanks.receive(), vec![ada_id.clone()]);

    let mut recorder = Recorder::default();
    bob_tanks.apply_to(&mut recorder, now);
    let drawn = recorder.transforms[&ada_id];
    assert_eq!(drawn.position.to_array(), [1.0, 2.0, 3.0]);
    assert_eq!(bob_tanks.registry().get(&ada_id).unwrap().name(), "ada");

    ada.disconnect();
    settle(&mut host, &mut [&mut bob]).await;
    bob_tanks.reconcile_into(bob.connected_peers(), &mut recorder);
    assert!(recorder.transforms.is_empty());
    assert_eq!(host_tanks.reconcile(host.connected_peers()), vec![ada_id]);
}

#[tokio::test]
async fn test_batched_snapshots_interpolate_over_arrival_gap() {
    let broker = LocalBroker::new();
    let mut host = host_named(&broker, Some("host"));
    let room = host.create_room(RoomOptions::default()).await.unwrap();
    let mut ada = client_named(&broker, "ada");
    let mut bob = client_named(&broker, "bob");
    let ada_id = ada.identity().uuid;

    let ada_tanks = TankNetwork::new(&ada, SyncConfig::default());
    let mut bob_tanks = TankNetwork::new(&bob, SyncConfig::default());

    connect_client(&mut host, &mut ada, &room).await.unwrap();
    connect_client(&mut host, &mut bob, &room).await.unwrap();
    settle(&mut host, &mut [&mut ada, &mut bob]).await;

    let at = |x: f32| TankSnapshot {
        position: [x, 0.0, 0.0],
        name: "ada".into(),
        ..TankSnapshot::default()
    };

    ada_tanks.broadcast(&at(5.0)).unwrap();
    settle(&mut host, &mut [&mut ada, &mut bob]).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    ada_tanks.broadcast(&at(10.0)).unwrap();
    settle(&mut host, &mut [&mut ada, &mut bob]).await;

    // Both snapshots are read in one go, well after they arrived.
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(bob_tanks.receive(), vec![ada_id.clone()]);

    let tank = bob_tanks.registry().get(&ada_id).unwrap();
    let interpolation = tank.interpolation();
    assert!(
        interpolation.interval() >= Duration::from_millis(50),
        "interval {:?}",
        interpolation.interval()
    );
    assert_eq!(interpolation.target().position.x, 10.0);

    let x = tank
        .sample(interpolation.last_update() + Duration::from_millis(16))
        .position
        .x;
    assert!(x > 5.0 && x < 10.0, "x = {x}");
}
