//! Local undo history.
//!
//! Each history-eligible transaction pushes the document and selection it
//! started from. Undo and redo restore a snapshot with a whole-document
//! replacement tagged with [`meta::HISTORY`].

use std::rc::Rc;

use serde_json::Value;

use super::keymap::{Command, command};
use super::plugin::{Plugin, PluginState, state_as};
use super::selection::Selection;
use super::transaction::{Transaction, meta};
use super::EditorState;
use crate::document::{Node, Schema};

pub const HISTORY_KEY: &str = "history";
pub const DEFAULT_DEPTH: usize = 100;

#[derive(Debug, Clone, Default)]
pub struct HistoryState {
    done: Vec<(Node, Selection)>,
    undone: Vec<(Node, Selection)>,
}

impl HistoryState {
    pub fn undo_depth(&self) -> usize {
        self.done.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.undone.len()
    }
}

#[derive(Debug)]
pub struct History {
    depth: usize,
}

impl History {
    pub const fn new(depth: usize) -> Self {
        Self { depth }
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new(DEFAULT_DEPTH)
    }
}

fn push_bounded(stack: &mut Vec<(Node, Selection)>, entry: (Node, Selection), depth: usize) {
    stack.push(entry);
    if stack.len() > depth {
        stack.remove(0);
    }
}

impl Plugin for History {
    fn key(&self) -> &'static str {
        HISTORY_KEY
    }

    fn init(&self, _schema: &Schema, _doc: &Node) -> Option<PluginState> {
        Some(Rc::new(HistoryState::default()))
    }

    fn apply(&self, tr: &Transaction, value: &PluginState, old: &EditorState) -> PluginState {
        let Some(current) = state_as::<HistoryState>(value) else {
            return Rc::clone(value);
        };
        let snapshot = (old.doc().clone(), old.selection());
        let mut next = current.clone();
        match tr.get_meta(meta::HISTORY).and_then(Value::as_str) {
            Some("undo") => {
                next.done.pop();
                push_bounded(&mut next.undone, snapshot, self.depth);
            }
            Some("redo") => {
                next.undone.pop();
                push_bounded(&mut next.done, snapshot, self.depth);
            }
            _ if tr.doc_changed() && tr.adds_to_history() => {
                push_bounded(&mut next.done, snapshot, self.depth);
                next.undone.clear();
            }
            _ => return Rc::clone(value),
        }
        Rc::new(next)
    }
}

pub fn history_state(state: &EditorState) -> Option<&HistoryState> {
    state.plugin_state(HISTORY_KEY).and_then(state_as::<HistoryState>)
}

fn restore(state: &EditorState, entry: &(Node, Selection), direction: &'static str) -> Option<Transaction> {
    let (doc, selection) = entry;
    let mut tr = state.tr();
    tr.replace_doc(doc).ok()?;
    tr.set_selection(*selection);
    tr.set_meta(meta::HISTORY, direction);
    Some(tr)
}

pub fn undo() -> Command {
    command(|state| {
        let entry = history_state(state)?.done.last()?;
        restore(state, entry, "undo")
    })
}

pub fn redo() -> Command {
    command(|state| {
        let entry = history_state(state)?.undone.last()?;
        restore(state, entry, "redo")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extension::tests::rich_state;

    fn type_text(state: &EditorState, text: &str) -> EditorState {
        let mut tr = state.tr();
        let at = state.selection().from();
        tr.insert_text(text, at, at).unwrap();
        state.apply(&tr)
    }

    #[test]
    fn test_undo_then_redo_restores_document() {
        let state = rich_state("");
        let typed = type_text(&type_text(&state, "a"), "b");
        assert_eq!(history_state(&typed).map(HistoryState::undo_depth), Some(2));

        let undone = typed.apply(&undo()(&typed).unwrap());
        assert_eq!(undone.doc().text_content(), "a");
        assert_eq!(undone.selection(), Selection::cursor(2));

        let redone = undone.apply(&redo()(&undone).unwrap());
        assert_eq!(redone.doc(), typed.doc());
        assert!(redo()(&redone).is_none());
    }

    #[test]
    fn test_new_edit_clears_redo() {
        let state = type_text(&rich_state(""), "a");
        let undone = state.apply(&undo()(&state).unwrap());
        assert_eq!(history_state(&undone).map(HistoryState::redo_depth), Some(1));
        let edited = type_text(&undone, "z");
        assert_eq!(history_state(&edited).map(HistoryState::redo_depth), Some(0));
    }

    #[test]
    fn test_opted_out_transactions_are_skipped() {
        let state = rich_state("");
        let mut tr = state.tr();
        tr.insert_text("x", 1, 1).unwrap();
        tr.set_meta(meta::ADD_TO_HISTORY, false);
        let next = state.apply(&tr);
        assert!(undo()(&next).is_none());
    }

    #[test]
    fn test_depth_is_bounded() {
        let mut state = rich_state("");
        for _ in 0..(DEFAULT_DEPTH + 5) {
            state = type_text(&state, "x");
        }
        assert_eq!(history_state(&state).map(HistoryState::undo_depth), Some(DEFAULT_DEPTH));
    }
}
