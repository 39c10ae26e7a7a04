//! Real-time collaboration.
//!
//! Each participant mirrors its document into a shared CRDT (one array of
//! serialized top-level blocks) and exchanges sync, update, and awareness
//! messages with the other peers in a room through a [`Transport`].
//!
//! - [`SharedDocument`]: the CRDT replica and its undo manager
//! - [`CollabSession`]: sync protocol driver for one room
//! - [`LocalHub`]: in-process rendezvous used for tests and the CLI

mod awareness;
mod protocol;
mod session;
mod shared;
mod transport;

pub use awareness::{Awareness, Peer, UserState, color_for, generated_name};
pub use protocol::WireMessage;
pub use session::CollabSession;
pub use shared::SharedDocument;
pub use transport::{LocalHub, LocalTransport, Provider, Transport, TransportEvent};

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollabError {
    #[error("malformed message: {0}")]
    Decode(String),

    #[error("could not apply update: {0}")]
    Apply(String),

    #[error("connection closed")]
    Closed,

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("shared document is invalid: {0}")]
    Document(String),
}

/// Read-only view of a session's peers, handed to the editor so it can
/// draw remote cursors. Dangles harmlessly once the session ends.
#[derive(Clone, Default)]
pub struct CollabHandle(Weak<RefCell<Awareness>>);

impl CollabHandle {
    pub(crate) fn new(awareness: &Rc<RefCell<Awareness>>) -> Self {
        Self(Rc::downgrade(awareness))
    }

    pub fn peers(&self) -> Vec<Peer> {
        self.0
            .upgrade()
            .map(|awareness| awareness.borrow().peers())
            .unwrap_or_default()
    }

    pub fn is_live(&self) -> bool {
        self.0.strong_count() > 0
    }
}

impl fmt::Debug for CollabHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollabHandle")
            .field("live", &self.is_live())
            .finish()
    }
}
