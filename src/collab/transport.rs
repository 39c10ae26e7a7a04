//! Transports carry wire messages between the peers of a room.
//!
//! [`LocalHub`] connects sessions living in the same process. Peers can be
//! taken offline to simulate a network partition: while offline they neither
//! send nor receive, and coming back online re-runs the sync handshake with
//! everyone in the room.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::rc::{Rc, Weak};

use super::CollabError;
use super::protocol::WireMessage;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A (re)connection with the room; the session should sync.
    Connected,
    Message(WireMessage),
}

pub trait Transport {
    fn send(&self, message: &WireMessage) -> Result<(), CollabError>;

    /// Drain pending events. Frames that fail to decode come back as errors.
    fn poll(&self) -> Vec<Result<TransportEvent, CollabError>>;

    fn close(&self);

    fn is_connected(&self) -> bool;
}

/// Opens transports into rooms.
pub trait Provider {
    fn connect(
        &self,
        room: &str,
        signaling: &[String],
        client: u64,
    ) -> Result<Box<dyn Transport>, CollabError>;
}

#[derive(Debug)]
enum Inbound {
    Connected,
    Frame(String),
}

#[derive(Debug)]
struct Endpoint {
    online: bool,
    inbox: VecDeque<Inbound>,
}

#[derive(Debug, Default)]
struct Hub {
    rooms: BTreeMap<String, BTreeMap<u64, Endpoint>>,
}

impl Hub {
    fn broadcast(&mut self, room: &str, sender: u64, frame: &str) {
        let Some(endpoints) = self.rooms.get_mut(room) else {
            return;
        };
        for (_, endpoint) in endpoints
            .iter_mut()
            .filter(|(client, endpoint)| **client != sender && endpoint.online)
        {
            endpoint.inbox.push_back(Inbound::Frame(frame.to_string()));
        }
    }
}

/// In-process signaling and relay.
#[derive(Debug, Clone, Default)]
pub struct LocalHub(Rc<RefCell<Hub>>);

impl LocalHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clients currently joined to `room`.
    pub fn peers(&self, room: &str) -> Vec<u64> {
        self.0
            .borrow()
            .rooms
            .get(room)
            .map(|endpoints| endpoints.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Take `client` off the network or bring it back. Reconnecting asks
    /// every online peer in its rooms to sync again.
    pub fn set_online(&self, client: u64, online: bool) {
        let mut hub = self.0.borrow_mut();
        for endpoints in hub.rooms.values_mut() {
            let Some(endpoint) = endpoints.get_mut(&client) else {
                continue;
            };
            if endpoint.online == online {
                continue;
            }
            endpoint.online = online;
            if online {
                endpoints
                    .values_mut()
                    .filter(|endpoint| endpoint.online)
                    .for_each(|endpoint| endpoint.inbox.push_back(Inbound::Connected));
            } else {
                endpoint.inbox.clear();
            }
        }
        tracing::debug!(client, online, "peer network state changed");
    }

    /// Deliver a raw frame to `client`, as if a peer had sent it.
    pub fn inject(&self, room: &str, client: u64, frame: &str) {
        if let Some(endpoint) = self
            .0
            .borrow_mut()
            .rooms
            .get_mut(room)
            .and_then(|endpoints| endpoints.get_mut(&client))
        {
            endpoint.inbox.push_back(Inbound::Frame(frame.to_string()));
        }
    }
}

impl Provider for LocalHub {
    fn connect(
        &self,
        room: &str,
        _signaling: &[String],
        client: u64,
    ) -> Result<Box<dyn Transport>, CollabError> {
        let mut hub = self.0.borrow_mut();
        let endpoints = hub.rooms.entry(room.to_string()).or_default();
        if endpoints.contains_key(&client) {
            return Err(CollabError::Connection(format!(
                "client {client} already joined room {room}"
            )));
        }
        endpoints.insert(
            client,
            Endpoint {
                online: true,
                inbox: VecDeque::from([Inbound::Connected]),
            },
        );
        tracing::debug!(room, client, "joined room");
        Ok(Box::new(LocalTransport {
            hub: Rc::downgrade(&self.0),
            room: room.to_string(),
            client,
        }))
    }
}

#[derive(Debug)]
pub struct LocalTransport {
    hub: Weak<RefCell<Hub>>,
    room: String,
    client: u64,
}

impl LocalTransport {
    fn online(&self, hub: &Hub) -> Option<bool> {
        hub.rooms
            .get(&self.room)
            .and_then(|endpoints| endpoints.get(&self.client))
            .map(|endpoint| endpoint.online)
    }
}

impl Transport for LocalTransport {
    fn send(&self, message: &WireMessage) -> Result<(), CollabError> {
        let hub = self.hub.upgrade().ok_or(CollabError::Closed)?;
        let mut hub = hub.borrow_mut();
        match self.online(&hub) {
            None => Err(CollabError::Closed),
            // Dropped on the floor, like a packet into a dead link.
            Some(false) => Ok(()),
            Some(true) => {
                let frame = message.encode()?;
                hub.broadcast(&self.room, self.client, &frame);
                Ok(())
            }
        }
    }

    fn poll(&self) -> Vec<Result<TransportEvent, CollabError>> {
        let Some(hub) = self.hub.upgrade() else {
            return Vec::new();
        };
        let inbox: Vec<Inbound> = hub
            .borrow_mut()
            .rooms
            .get_mut(&self.room)
            .and_then(|endpoints| endpoints.get_mut(&self.client))
            .map(|endpoint| endpoint.inbox.drain(..).collect())
            .unwrap_or_default();
        inbox
            .into_iter()
            .map(|inbound| match inbound {
                Inbound::Connected => Ok(TransportEvent::Connected),
                Inbound::Frame(frame) => WireMessage::decode(&frame).map(TransportEvent::Message),
            })
            .collect()
    }

    fn close(&self) {
        let Some(hub) = self.hub.upgrade() else {
            return;
        };
        let mut hub = hub.borrow_mut();
        if let Some(endpoints) = hub.rooms.get_mut(&self.room) {
            endpoints.remove(&self.client);
            if endpoints.is_empty() {
                hub.rooms.remove(&self.room);
            }
        }
        tracing::debug!(room = %self.room, client = self.client, "left room");
    }

    fn is_connected(&self) -> bool {
        self.hub
            .upgrade()
            .is_some_and(|hub| self.online(&hub.borrow()) == Some(true))
    }
}
