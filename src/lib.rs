// Only allow lints that are either transitive-dependency noise or
// genuinely opinionated style choices that don't indicate real issues.
#![allow(
    // Transitive dependency version mismatches we can't control
    clippy::multiple_crate_versions,
    // module_name_repetitions is pure style preference (e.g. schema::SchemaError)
    clippy::module_name_repetitions
)]

//! # Draftsmith
//!
//! An extensible rich-text document engine with markdown interop and
//! real-time collaboration.
//!
//! ## Architecture
//!
//! The editor state is an immutable value advanced by transactions. The
//! controller around it follows The Elm Architecture (TEA):
//! - **Model**: controller state (document, files, config, collaboration)
//! - **Msg**: everything that can happen to it
//! - **Update**: pure state transitions
//! - **Effects**: storage, transport, and timers
//!
//! ## Modules
//!
//! - [`document`]: document tree, schema, and positions
//! - [`state`]: editor state, transactions, plugins, and commands
//! - [`extension`]: composable schema and plugin contributions
//! - [`markdown`]: markdown parsing and serialization
//! - [`collab`]: CRDT replication and peer presence
//! - [`app`]: the controller and its persistence
//! - [`config`]: user settings and flag files

pub mod app;
pub mod collab;
pub mod config;
pub mod document;
pub mod error;
pub mod extension;
pub mod markdown;
pub mod perf;
pub mod state;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::app::{Controller, Model, Msg, update};
    pub use crate::document::{Node, Schema};
    pub use crate::state::{EditorState, Transaction};
}
