//! Named logical channels multiplexed over one transport.
//!
//! Handles ([`Channel`], [`Subscription`]) never touch the network directly.
//! Subscriptions and sends are queued as [`MuxCommand`]s on one ordered
//! queue which the owning network applies at the start of every pump, so a
//! subscription made before a pump sees every message dispatched by it.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::time::Instant;

use tokio::sync::mpsc;

use super::connection::Roster;
use super::error::NetworkError;
use super::protocol::{Envelope, Payload, PeerId};

#[derive(Debug)]
pub(crate) enum MuxCommand {
    Subscribe {
        channel: String,
        check_peer: bool,
        sink: mpsc::UnboundedSender<Incoming>,
    },
    Send {
        channel: String,
        payload: Vec<u8>,
    },
}

#[derive(Debug, Clone)]
pub(crate) struct Incoming {
    sender: PeerId,
    payload: Vec<u8>,
    received: Instant,
}

#[derive(Debug)]
struct Subscriber {
    check_peer: bool,
    sink: mpsc::UnboundedSender<Incoming>,
}

#[derive(Debug, Default)]
pub struct ChannelMux {
    subscribers: HashMap<String, Vec<Subscriber>>,
}

impl ChannelMux {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn subscribe(
        &mut self,
        channel: String,
        check_peer: bool,
        sink: mpsc::UnboundedSender<Incoming>,
    ) {
        self.subscribers
            .entry(channel)
            .or_default()
            .push(Subscriber { check_peer, sink });
    }

    /// Delivers `envelope` to every live subscriber of its channel. Returns
    /// how many received it. Unknown channels and senders missing from the
    /// roster (for roster-checked subscriptions) are dropped silently.
    pub fn dispatch(&mut self, envelope: &Envelope, roster: &Roster) -> usize {
        let Some(subscribers) = self.subscribers.get_mut(&envelope.channel) else {
            log::trace!("no listener on channel `{}`", envelope.channel);
            return 0;
        };

        let known_sender = roster.contains(&envelope.sender);
        let received = Instant::now();
        let mut delivered = 0;

        subscribers.retain(|subscriber| {
            if subscriber.check_peer && !known_sender {
                return !subscriber.sink.is_closed();
            }

            let incoming = Incoming {
                sender: envelope.sender.clone(),
                payload: envelope.payload.clone(),
                received,
            };
            match subscriber.sink.send(incoming) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(_) => false,
            }
        });

        if delivered == 0 && !known_sender {
            log::trace!(
                "dropped `{}` from {} (not in roster)",
                envelope.channel,
                envelope.sender
            );
        }

        delivered
    }

    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.subscribers
            .get(channel)
            .map_or(0, |subs| subs.iter().filter(|s| !s.sink.is_closed()).count())
    }

    pub fn clear(&mut self) {
        self.subscribers.clear();
    }
}

/// A typed view of one logical channel: `subscribe` to listen, `send` to
/// publish through the owning network.
pub struct Channel<T> {
    name: String,
    check_peer: bool,
    commands: mpsc::UnboundedSender<MuxCommand>,
    _payload: PhantomData<fn() -> T>,
}

impl<T> Clone for Channel<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            check_peer: self.check_peer,
            commands: self.commands.clone(),
            _payload: PhantomData,
        }
    }
}

impl<T> std::fmt::Debug for Channel<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("name", &self.name)
            .field("check_peer", &self.check_peer)
            .finish()
    }
}

impl<T: Payload> Channel<T> {
    pub(crate) fn new(
        name: &str,
        check_peer: bool,
        commands: mpsc::UnboundedSender<MuxCommand>,
    ) -> Self {
        Self {
            name: name.to_string(),
            check_peer,
            commands,
            _payload: PhantomData,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn check_peer(&self) -> bool {
        self.check_peer
    }

    pub fn subscribe(&self) -> Subscription<T> {
        let (sink, rx) = mpsc::unbounded_channel();
        // A detached network leaves the receiver closed; recv yields None.
        let _ = self.commands.send(MuxCommand::Subscribe {
            channel: self.name.clone(),
            check_peer: self.check_peer,
            sink,
        });

        Subscription {
            channel: self.name.clone(),
            rx,
            _payload: PhantomData,
        }
    }

    /// Queues `payload` for the next flush. Delivery is not guaranteed
    /// unless the network is connected by then.
    pub fn send(&self, payload: &T) -> Result<(), NetworkError> {
        let payload = payload.encode()?;
        self.commands
            .send(MuxCommand::Send {
                channel: self.name.clone(),
                payload,
            })
            .map_err(|_| NetworkError::Detached)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message<T> {
    pub sender: PeerId,
    pub payload: T,
    /// When the owning network dispatched the frame, not when it was read.
    pub received: Instant,
}

#[derive(Debug)]
pub struct Subscription<T> {
    channel: String,
    rx: mpsc::UnboundedReceiver<Incoming>,
    _payload: PhantomData<fn() -> T>,
}

impl<T: Payload> Subscription<T> {
    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn try_recv(&mut self) -> Option<Message<T>> {
        loop {
            let incoming = self.rx.try_recv().ok()?;
            if let Some(message) = self.decode(incoming) {
                return Some(message);
            }
        }
    }

    pub async fn recv(&mut self) -> Option<Message<T>> {
        loop {
            let incoming = self.rx.recv().await?;
            if let Some(message) = self.decode(incoming) {
                return Some(message);
            }
        }
    }

    pub fn drain(&mut self) -> Vec<Message<T>> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    fn decode(&self, incoming: Incoming) -> Option<Message<T>> {
        match T::decode(&incoming.payload) {
            Ok(payload) => Some(Message {
                sender: incoming.sender,
                payload,
                received: incoming.received,
            }),
            Err(err) => {
                log::trace!(
                    "malformed `{}` payload from {}: {}",
                    self.channel,
                    incoming.sender,
                    err
                );
                None
            }
        }
    }
}
