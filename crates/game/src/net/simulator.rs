use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;

use super::protocol::PeerIdentity;
use super::stats::LinkConditions;
use super::transport::{LinkEvent, LinkId, PeerLink, Registration, Signaling, TransportError};

#[derive(Debug)]
struct LinkRecord {
    dialer_id: String,
    acceptor_id: String,
    to_dialer: mpsc::UnboundedSender<LinkEvent>,
    to_acceptor: mpsc::UnboundedSender<LinkEvent>,
}

#[derive(Debug)]
struct BrokerState {
    online: bool,
    endpoints: HashMap<String, mpsc::UnboundedSender<PeerLink>>,
    links: HashMap<LinkId, LinkRecord>,
    conditions: LinkConditions,
    next_link_id: LinkId,
}

impl BrokerState {
    fn prune_links(&mut self) {
        self.links
            .retain(|_, link| !(link.to_dialer.is_closed() && link.to_acceptor.is_closed()));
    }
}

/// In-process signaling service. Every clone shares one id namespace, so a
/// host and its clients in the same process find each other through it.
#[derive(Debug, Clone)]
pub struct LocalBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl Default for LocalBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalBroker {
    pub fn new() -> Self {
        Self::with_conditions(LinkConditions::default())
    }

    pub fn with_conditions(conditions: LinkConditions) -> Self {
        Self {
            state: Arc::new(Mutex::new(BrokerState {
                online: true,
                endpoints: HashMap::new(),
                links: HashMap::new(),
                conditions,
                next_link_id: 1,
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Takes the signaling service offline; registrations and dials fail
    /// until it comes back. Established links are unaffected.
    pub fn set_online(&self, online: bool) {
        self.state().online = online;
    }

    /// Links with at least one end still alive.
    pub fn link_count(&self) -> usize {
        let mut state = self.state();
        state.prune_links();
        state.links.len()
    }

    pub fn is_registered(&self, peer_id: &str) -> bool {
        self.state()
            .endpoints
            .get(peer_id)
            .is_some_and(|endpoint| !endpoint.is_closed())
    }

    pub fn registered_count(&self) -> usize {
        self.state()
            .endpoints
            .values()
            .filter(|endpoint| !endpoint.is_closed())
            .count()
    }

    /// Injects a transport error into the end of a link owned by `owner`
    /// whose other side is `remote`. Returns how many link ends were hit.
    pub fn fail_link(&self, owner: &str, remote: &str) -> usize {
        let mut state = self.state();
        state.prune_links();

        let error = LinkEvent::Error(TransportError::Failed(format!(
            "injected failure between {owner} and {remote}"
        )));

        let mut hit = 0;
        for link in state.links.values() {
            let target = if link.dialer_id == owner && link.acceptor_id == remote {
                &link.to_dialer
            } else if link.acceptor_id == owner && link.dialer_id == remote {
                &link.to_acceptor
            } else {
                continue;
            };

            if target.send(error.clone()).is_ok() {
                hit += 1;
            }
        }
        hit
    }
}

impl Signaling for LocalBroker {
    fn register(&self, peer_id: &str) -> Result<Registration, TransportError> {
        let mut state = self.state();
        if !state.online {
            return Err(TransportError::SignalingUnavailable);
        }

        if state
            .endpoints
            .get(peer_id)
            .is_some_and(|endpoint| !endpoint.is_closed())
        {
            return Err(TransportError::IdTaken(peer_id.to_string()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        state.endpoints.insert(peer_id.to_string(), tx);
        log::debug!("broker: registered {}", peer_id);

        Ok(Registration::new(peer_id, rx))
    }

    fn unregister(&self, peer_id: &str) {
        if self.state().endpoints.remove(peer_id).is_some() {
            log::debug!("broker: released {}", peer_id);
        }
    }

    fn dial(&self, local: &PeerIdentity, remote_id: &str) -> Result<PeerLink, TransportError> {
        let mut state = self.state();
        if !state.online {
            return Err(TransportError::SignalingUnavailable);
        }

        let endpoint = state
            .endpoints
            .get(remote_id)
            .filter(|endpoint| !endpoint.is_closed())
            .cloned()
            .ok_or_else(|| TransportError::PeerUnavailable(remote_id.to_string()))?;

        state.prune_links();
        let id = state.next_link_id;
        state.next_link_id += 1;

        let dialer_id = local.uuid.as_str();
        let (dialer_end, acceptor_end) =
            PeerLink::pair(id, local, dialer_id, remote_id, state.conditions.clone());

        state.links.insert(
            id,
            LinkRecord {
                dialer_id: dialer_id.to_string(),
                acceptor_id: remote_id.to_string(),
                to_dialer: dialer_end.local_sender(),
                to_acceptor: acceptor_end.local_sender(),
            },
        );

        if endpoint.send(acceptor_end).is_err() {
            state.links.remove(&id);
            return Err(TransportError::PeerUnavailable(remote_id.to_string()));
        }

        Ok(dialer_end)
    }
}
