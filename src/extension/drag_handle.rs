//! Drag handle for top-level blocks.

use std::rc::Rc;

use super::Extension;
use crate::state::view::{Decoration, Widget};
use crate::state::{Assoc, EditorState, Plugin, Transaction};

/// Start positions of top-level blocks.
fn block_starts(state: &EditorState) -> Vec<usize> {
    let mut starts = Vec::with_capacity(state.doc().child_count());
    state.doc().for_each_child(|_, offset, _| starts.push(offset));
    starts
}

/// Move the top-level block starting at `from` to the block boundary `to`.
pub fn move_block(state: &EditorState, from: usize, to: usize) -> Option<Transaction> {
    let doc = state.doc();
    let starts = block_starts(state);
    let index = starts.iter().position(|&s| s == from)?;
    let node = doc.child(index)?.clone();
    let end = from + node.node_size();
    if (to != doc.content_size() && !starts.contains(&to)) || (from..=end).contains(&to) {
        return None;
    }
    let mut tr = state.tr();
    tr.delete(from, end).ok()?;
    let target = tr.map_pos(to, Assoc::Before);
    tr.replace(target, target, vec![node]).ok()?;
    Some(tr)
}

#[derive(Debug, Default)]
pub struct DragHandle;

impl Plugin for DragHandle {
    fn key(&self) -> &'static str {
        "drag-handle"
    }

    fn handle_move_block(&self, state: &EditorState, from: usize, to: usize) -> Option<Transaction> {
        move_block(state, from, to)
    }

    fn decorations(&self, state: &EditorState) -> Vec<Decoration> {
        let head = state.selection().from();
        block_starts(state)
            .into_iter()
            .zip(state.doc().content())
            .find(|(start, node)| *start <= head && head < start + node.node_size())
            .map(|(pos, _)| Decoration::Widget {
                pos,
                widget: Widget::DragHandle,
            })
            .into_iter()
            .collect()
    }
}

pub fn extension() -> Extension {
    Extension::new("drag-handle").with_plugins(|mut plugins, _schema| {
        plugins.push(Rc::new(DragHandle));
        plugins
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extension::tests::state_from_markdown;
    use crate::markdown::serialize;
    use crate::state::Selection;

    #[test]
    fn test_move_block_down() {
        let state = state_from_markdown("a\n\nb\n\nc\n");
        // blocks at 0, 3, 6; move "a" after "b"
        let tr = move_block(&state, 0, 6).unwrap();
        assert_eq!(serialize(state.apply(&tr).doc()), "b\n\na\n\nc\n");
    }

    #[test]
    fn test_move_block_to_end() {
        let state = state_from_markdown("a\n\nb\n");
        let tr = move_block(&state, 0, 6).unwrap();
        assert_eq!(serialize(state.apply(&tr).doc()), "b\n\na\n");
    }

    #[test]
    fn test_move_onto_itself_is_rejected() {
        let state = state_from_markdown("a\n\nb\n");
        assert!(move_block(&state, 0, 3).is_none());
        assert!(move_block(&state, 1, 6).is_none());
    }

    #[test]
    fn test_handle_follows_selection() {
        let state = state_from_markdown("a\n\nb\n");
        let mut tr = state.tr();
        tr.set_selection(Selection::cursor(4));
        let state = state.apply(&tr);
        assert_eq!(
            DragHandle.decorations(&state),
            vec![Decoration::Widget {
                pos: 3,
                widget: Widget::DragHandle
            }]
        );
    }
}
