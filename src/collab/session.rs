//! One participant's connection to a room.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::awareness::Awareness;
use super::protocol::WireMessage;
use super::shared::SharedDocument;
use super::transport::{Provider, Transport, TransportEvent};
use super::{CollabError, CollabHandle};
use crate::document::{Node, Schema};

pub struct CollabSession {
    room: String,
    shared: SharedDocument,
    awareness: Rc<RefCell<Awareness>>,
    transport: Box<dyn Transport>,
    error: Option<CollabError>,
}

impl fmt::Debug for CollabSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollabSession")
            .field("room", &self.room)
            .field("client", &self.client())
            .field("shared", &self.shared)
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

impl CollabSession {
    /// Join `room`. With `seed` the shared document starts from that
    /// content; without it the session adopts whatever the room holds.
    pub fn start(
        provider: &dyn Provider,
        room: &str,
        signaling: &[String],
        client: u64,
        name: Option<&str>,
        seed: Option<&Node>,
    ) -> Result<Self, CollabError> {
        let transport = provider.connect(room, signaling, client)?;
        let mut shared = SharedDocument::new(client);
        if let Some(doc) = seed.filter(|doc| !doc.is_empty_doc()) {
            shared.apply_local(doc);
        }
        tracing::info!(room, client, seeded = seed.is_some(), "collaboration started");
        Ok(Self {
            room: room.to_string(),
            shared,
            awareness: Rc::new(RefCell::new(Awareness::new(client, name))),
            transport,
            error: None,
        })
    }

    pub fn room(&self) -> &str {
        &self.room
    }

    pub fn client(&self) -> u64 {
        self.awareness.borrow().client()
    }

    pub fn user_name(&self) -> String {
        self.awareness.borrow().local().name.clone()
    }

    /// The last transport or protocol failure, if any.
    pub const fn error(&self) -> Option<&CollabError> {
        self.error.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    pub fn handle(&self) -> CollabHandle {
        CollabHandle::new(&self.awareness)
    }

    fn send(&mut self, message: &WireMessage) {
        if let Err(err) = self.transport.send(message) {
            tracing::warn!(room = %self.room, error = %err, "send failed");
            self.error = Some(err);
        }
    }

    fn awareness_message(&self) -> WireMessage {
        let awareness = self.awareness.borrow();
        WireMessage::Awareness {
            client: awareness.client(),
            state: Some(awareness.local().clone()),
        }
    }

    /// Mirror a local edit and broadcast it.
    pub fn local_change(&mut self, doc: &Node) {
        if let Some(update) = self.shared.apply_local(doc) {
            self.send(&WireMessage::Update { update });
        }
    }

    pub fn set_cursor(&mut self, cursor: Option<usize>) {
        let changed = self.awareness.borrow_mut().set_cursor(cursor);
        if changed {
            let message = self.awareness_message();
            self.send(&message);
        }
    }

    /// Process everything the transport has queued. Returns true when the
    /// shared document changed.
    pub fn poll(&mut self) -> bool {
        let mut changed = false;
        for event in self.transport.poll() {
            match event.and_then(|event| self.handle_event(event)) {
                Ok(doc_changed) => changed |= doc_changed,
                Err(err) => {
                    tracing::warn!(room = %self.room, error = %err, "dropped incoming message");
                    self.error = Some(err);
                }
            }
        }
        changed
    }

    fn handle_event(&mut self, event: TransportEvent) -> Result<bool, CollabError> {
        match event {
            TransportEvent::Connected => {
                let state_vector = self.shared.state_vector();
                self.send(&WireMessage::SyncStep1 { state_vector });
                let awareness = self.awareness_message();
                self.send(&awareness);
                Ok(false)
            }
            TransportEvent::Message(WireMessage::SyncStep1 { state_vector }) => {
                let update = self.shared.encode_diff(&state_vector)?;
                self.send(&WireMessage::SyncStep2 { update });
                let awareness = self.awareness_message();
                self.send(&awareness);
                Ok(false)
            }
            TransportEvent::Message(
                WireMessage::SyncStep2 { update } | WireMessage::Update { update },
            ) => self.shared.apply_remote(&update),
            TransportEvent::Message(WireMessage::Awareness { client, state }) => {
                self.awareness.borrow_mut().apply(client, state);
                Ok(false)
            }
        }
    }

    pub fn doc(&self, schema: &Schema) -> Result<Node, CollabError> {
        self.shared.to_doc(schema)
    }

    /// Undo this client's last change; the reversal is broadcast.
    pub fn undo(&mut self) -> bool {
        match self.shared.undo() {
            Some(update) => {
                self.send(&WireMessage::Update { update });
                true
            }
            None => false,
        }
    }

    pub fn redo(&mut self) -> bool {
        match self.shared.redo() {
            Some(update) => {
                self.send(&WireMessage::Update { update });
                true
            }
            None => false,
        }
    }

    /// Replace the transport with a fresh connection to the same room. The
    /// shared document is kept, so edits made while disconnected sync on
    /// the new handshake.
    pub fn reconnect(&mut self, provider: &dyn Provider, signaling: &[String]) -> Result<(), CollabError> {
        let client = self.client();
        self.transport.close();
        self.transport = provider.connect(&self.room, signaling, client)?;
        self.error = None;
        let update = self.shared.encode_all();
        self.send(&WireMessage::Update { update });
        tracing::info!(room = %self.room, client, "collaboration reconnected");
        Ok(())
    }

    /// Announce departure and close the transport.
    pub fn stop(mut self) {
        let client = self.client();
        self.send(&WireMessage::Awareness { client, state: None });
        self.transport.close();
        self.awareness.borrow_mut().clear();
        tracing::info!(room = %self.room, client, "collaboration stopped");
    }
}
