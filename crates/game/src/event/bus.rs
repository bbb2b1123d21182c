use tokio::sync::mpsc;

use crate::net::{CHANNEL_EVENT, Channel, Network, NetworkError, PeerId, Subscription};

use super::types::{GameEvent, GameEventKind};

/// One event as seen by a listener. `from` is `None` for events raised on
/// this peer.
#[derive(Debug, Clone, PartialEq)]
pub struct EventDelivery {
    pub from: Option<PeerId>,
    pub event: GameEvent,
}

pub type EventReceiver = mpsc::UnboundedReceiver<EventDelivery>;

#[derive(Debug)]
struct Listener {
    kind: Option<GameEventKind>,
    sink: mpsc::UnboundedSender<EventDelivery>,
}

#[derive(Debug)]
struct Uplink {
    channel: Channel<GameEvent>,
    incoming: Subscription<GameEvent>,
}

/// Local pub/sub for [`GameEvent`]s, optionally bridged to a network's
/// `event` channel. Detached, it only delivers locally.
#[derive(Debug, Default)]
pub struct EventBus {
    listeners: Vec<Listener>,
    uplink: Option<Uplink>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, kind: GameEventKind) -> EventReceiver {
        self.listen(Some(kind))
    }

    pub fn subscribe_all(&mut self) -> EventReceiver {
        self.listen(None)
    }

    fn listen(&mut self, kind: Option<GameEventKind>) -> EventReceiver {
        let (sink, rx) = mpsc::unbounded_channel();
        self.listeners.push(Listener { kind, sink });
        rx
    }

    pub fn attach<N: Network>(&mut self, network: &N) {
        let channel = network.channel::<GameEvent>(CHANNEL_EVENT, true);
        let incoming = channel.subscribe();
        self.uplink = Some(Uplink { channel, incoming });
    }

    pub fn detach(&mut self) {
        self.uplink = None;
    }

    pub fn is_attached(&self) -> bool {
        self.uplink.is_some()
    }

    /// Raises `event`: queued on the network (flushed by its next pump)
    /// when attached, and delivered locally right away if `send_to_self`.
    pub fn send(&mut self, event: GameEvent, send_to_self: bool) -> Result<(), NetworkError> {
        let forwarded = match &self.uplink {
            Some(uplink) => uplink.channel.send(&event),
            None => Ok(()),
        };

        if send_to_self {
            self.emit(None, event);
        }

        forwarded
    }

    /// Delivers to matching listeners, pruning dropped ones. Returns how
    /// many received it.
    pub fn emit(&mut self, from: Option<PeerId>, event: GameEvent) -> usize {
        let kind = event.kind();
        let mut delivered = 0;

        self.listeners.retain(|listener| {
            if listener.kind.is_some_and(|k| k != kind) {
                return !listener.sink.is_closed();
            }
            let delivery = EventDelivery {
                from: from.clone(),
                event: event.clone(),
            };
            let alive = listener.sink.send(delivery).is_ok();
            delivered += usize::from(alive);
            alive
        });

        delivered
    }

    /// Re-emits events that arrived from remote peers. Call after the
    /// network's pump.
    pub fn pump(&mut self) -> usize {
        let Some(uplink) = self.uplink.as_mut() else {
            return 0;
        };

        let messages = uplink.incoming.drain();
        let count = messages.len();
        for message in messages {
            log::trace!("{} from {}", message.payload.kind().as_str(), message.sender);
            self.emit(Some(message.sender), message.payload);
        }
        count
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.iter().filter(|l| !l.sink.is_closed()).count()
    }
}
