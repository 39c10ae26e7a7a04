//! The plugin protocol.
//!
//! A plugin may keep its own state (initialized with the editor state and
//! advanced by every applied transaction) and may claim input events by
//! returning a transaction. Handlers are asked in plugin-list order and the
//! first one that returns `Some` wins.

use std::any::Any;
use std::rc::Rc;

use super::EditorState;
use super::input::{KeyEvent, PasteEvent};
use super::transaction::Transaction;
use super::view::Decoration;
use crate::document::{Node, Schema};

/// Opaque per-plugin state.
pub type PluginState = Rc<dyn Any>;

pub trait Plugin {
    /// Unique key; plugin state survives reconfiguration when the key is
    /// present on both sides.
    fn key(&self) -> &'static str;

    fn init(&self, _schema: &Schema, _doc: &Node) -> Option<PluginState> {
        None
    }

    /// Advance this plugin's state. `old` is the state the transaction was
    /// applied to.
    fn apply(&self, _tr: &Transaction, value: &PluginState, _old: &EditorState) -> PluginState {
        Rc::clone(value)
    }

    fn handle_key(&self, _state: &EditorState, _key: &KeyEvent) -> Option<Transaction> {
        None
    }

    fn handle_key_up(&self, _state: &EditorState, _key: &KeyEvent) -> Option<Transaction> {
        None
    }

    fn handle_text_input(
        &self,
        _state: &EditorState,
        _from: usize,
        _to: usize,
        _text: &str,
    ) -> Option<Transaction> {
        None
    }

    fn handle_paste(&self, _state: &EditorState, _event: &PasteEvent) -> Option<Transaction> {
        None
    }

    fn handle_click(&self, _state: &EditorState, _pos: usize) -> Option<Transaction> {
        None
    }

    fn handle_drop(&self, _state: &EditorState, _pos: usize, _text: &str) -> Option<Transaction> {
        None
    }

    /// Dragging over the editor; `None` when the drag left it.
    fn handle_drag_over(&self, _state: &EditorState, _pos: Option<usize>) -> Option<Transaction> {
        None
    }

    /// Move the top-level block at `from` to `to`.
    fn handle_move_block(&self, _state: &EditorState, _from: usize, _to: usize) -> Option<Transaction> {
        None
    }

    fn decorations(&self, _state: &EditorState) -> Vec<Decoration> {
        Vec::new()
    }
}

pub type PluginRef = Rc<dyn Plugin>;

/// Downcast a plugin state to its concrete type.
pub fn state_as<T: 'static>(value: &PluginState) -> Option<&T> {
    value.downcast_ref::<T>()
}
