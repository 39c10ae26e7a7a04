//! The host view boundary.
//!
//! Input events go in, transactions and decorations come out. Node views
//! handle events aimed at a specific node and report back only through
//! transactions.

use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use super::EditorState;
use super::commands;
use super::input::{InputEvent, PasteEvent};
use super::selection::Selection;
use super::step::Assoc;
use super::transaction::{Transaction, meta};
use crate::document::{Node, NodeKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Widget {
    DragHandle,
    DropCursor,
    RemoteCursor { client: u64, name: String, color: String },
    /// Hint text shown in an empty document.
    Placeholder { text: String },
    /// Where the viewport follows the cursor; `center` keeps it mid-screen.
    ScrollAnchor { center: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoration {
    /// A widget rendered at a position.
    Widget { pos: usize, widget: Widget },
    /// A class on the node starting at `from`.
    Node { from: usize, to: usize, class: String },
    /// Styled inline range.
    Inline {
        from: usize,
        to: usize,
        class: String,
        style: Option<String>,
    },
    /// Class and inline style for the editor element itself.
    Editor { class: String, style: String },
}

impl Decoration {
    pub const fn from(&self) -> usize {
        match self {
            Self::Widget { pos, .. } => *pos,
            Self::Node { from, .. } | Self::Inline { from, .. } => *from,
            Self::Editor { .. } => 0,
        }
    }
}

/// Events emitted by custom node views.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeViewEvent {
    ToggleCheckbox,
    Resize { width: u32 },
}

pub trait NodeView {
    fn handle(&self, state: &EditorState, pos: usize, node: &Node, event: &NodeViewEvent) -> Option<Transaction>;
}

pub type NodeViewRef = Rc<dyn NodeView>;

/// Routes input through the plugin list, falling back to default editing
/// behavior, and collects decorations.
#[derive(Clone, Default)]
pub struct EditorView {
    node_views: BTreeMap<NodeKind, NodeViewRef>,
}

impl fmt::Debug for EditorView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EditorView")
            .field("node_views", &self.node_views.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl EditorView {
    pub fn new(node_views: impl IntoIterator<Item = (NodeKind, NodeViewRef)>) -> Self {
        Self {
            node_views: node_views.into_iter().collect(),
        }
    }

    pub fn has_node_view(&self, kind: NodeKind) -> bool {
        self.node_views.contains_key(&kind)
    }

    /// Translate one input event into a transaction, if it does anything.
    pub fn handle_input(&self, state: &EditorState, event: &InputEvent) -> Option<Transaction> {
        let plugins = state.plugins();
        match event {
            InputEvent::Key(key) => plugins.iter().find_map(|p| p.handle_key(state, key)),
            InputEvent::KeyUp(key) => plugins.iter().find_map(|p| p.handle_key_up(state, key)),
            InputEvent::Text(text) => {
                let from = state.selection().from();
                let to = state.selection().to(state.doc());
                plugins
                    .iter()
                    .find_map(|p| p.handle_text_input(state, from, to, text))
                    .or_else(|| commands::insert_text(text)(state))
            }
            InputEvent::Paste(paste) => plugins
                .iter()
                .find_map(|p| p.handle_paste(state, paste))
                .or_else(|| paste_plain(state, paste)),
            InputEvent::Click { pos } => plugins
                .iter()
                .find_map(|p| p.handle_click(state, *pos))
                .or_else(|| {
                    let mut tr = state.tr();
                    tr.set_selection(Selection::near(state.doc(), *pos, Assoc::After));
                    Some(tr)
                }),
            InputEvent::Drop { pos, text } => plugins
                .iter()
                .find_map(|p| p.handle_drop(state, *pos, text))
                .or_else(|| {
                    let target = Selection::near(state.doc(), *pos, Assoc::After).from();
                    let mut tr = state.tr();
                    tr.insert_text(text, target, target).ok()?;
                    Some(tr)
                }),
            InputEvent::DragOver { pos } => plugins.iter().find_map(|p| p.handle_drag_over(state, *pos)),
            InputEvent::MoveBlock { from, to } => plugins
                .iter()
                .find_map(|p| p.handle_move_block(state, *from, *to)),
            InputEvent::NodeView { pos, event } => {
                let node = state.doc().resolve(*pos).ok()?.node_after()?;
                let view = self.node_views.get(&node.kind())?;
                view.handle(state, *pos, &node, event)
            }
        }
    }

    /// Decorations from every plugin, ordered by position.
    pub fn decorations(&self, state: &EditorState) -> Vec<Decoration> {
        let mut out: Vec<Decoration> = state
            .plugins()
            .iter()
            .flat_map(|p| p.decorations(state))
            .collect();
        out.sort_by_key(Decoration::from);
        out
    }
}

/// Default paste: plain text, newlines become paragraph breaks.
fn paste_plain(state: &EditorState, paste: &PasteEvent) -> Option<Transaction> {
    let text = paste.text.as_deref()?;
    let mut tr = state.tr();
    if !state.selection().is_empty(state.doc()) {
        tr.delete_selection().ok()?;
    }
    for (i, line) in text.split('\n').enumerate() {
        if i > 0 {
            let pos = tr.selection().head()?;
            tr.split(pos, 1, Vec::new()).ok()?;
            tr.set_selection(Selection::cursor(pos + 2));
        }
        let at = tr.selection().from();
        if !line.is_empty() {
            tr.insert_text(line, at, at).ok()?;
        }
    }
    tr.set_meta(meta::PASTE, true);
    Some(tr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extension::tests::rich_state;
    use crate::state::input::KeyEvent;

    struct Stamp;

    impl NodeView for Stamp {
        fn handle(&self, state: &EditorState, pos: usize, _node: &Node, event: &NodeViewEvent) -> Option<Transaction> {
            let NodeViewEvent::Resize { width } = event else {
                return None;
            };
            let mut tr = state.tr();
            tr.set_node_markup(pos, None, crate::attrs! { "level" => *width }).ok()?;
            Some(tr)
        }
    }

    #[test]
    fn test_text_input_falls_back_to_insert() {
        let state = rich_state("");
        let view = EditorView::default();
        let tr = view
            .handle_input(&state, &InputEvent::Text("hi".into()))
            .unwrap();
        assert_eq!(state.apply(&tr).doc().text_content(), "hi");
    }

    /// An empty paragraph under the rich schema, with no plugins installed.
    fn bare_state() -> EditorState {
        let schema = crate::extension::tests::rich_composition().schema;
        let para = schema.node(NodeKind::Paragraph, crate::document::Attrs::new(), Vec::new()).unwrap();
        let doc = schema.node(NodeKind::Doc, crate::document::Attrs::new(), vec![para]).unwrap();
        EditorState::create(schema, Vec::new(), Some(doc), Some(Selection::cursor(1))).unwrap()
    }

    fn paste_text(text: &str) -> InputEvent {
        InputEvent::Paste(PasteEvent {
            text: Some(text.into()),
            ..PasteEvent::default()
        })
    }

    #[test]
    fn test_plain_paste_splits_lines() {
        let state = bare_state();
        let view = EditorView::default();
        let next = state.apply(&view.handle_input(&state, &paste_text("one\ntwo")).unwrap());
        assert_eq!(next.doc().child_count(), 2);
        assert_eq!(next.doc().text_content(), "onetwo");
    }

    #[test]
    fn test_paste_plugin_reads_lines_as_markdown() {
        let state = rich_state("");
        let view = EditorView::default();
        let next = state.apply(&view.handle_input(&state, &paste_text("one\ntwo")).unwrap());
        assert_eq!(next.doc().child_count(), 1);
        assert_eq!(next.doc().text_content(), "one two");
    }

    #[test]
    fn test_unbound_key_is_ignored() {
        let state = rich_state("");
        let view = EditorView::default();
        let key = KeyEvent::parse("Alt-F12");
        assert!(view.handle_input(&state, &InputEvent::Key(key)).is_none());
    }

    #[test]
    fn test_node_view_events_reach_their_view() {
        let state = crate::extension::tests::state_from_markdown("# x\n");
        let view = EditorView::new([(NodeKind::Heading, Rc::new(Stamp) as NodeViewRef)]);
        let event = InputEvent::NodeView {
            pos: 0,
            event: NodeViewEvent::Resize { width: 3 },
        };
        let next = state.apply(&view.handle_input(&state, &event).unwrap());
        assert_eq!(next.doc().content()[0].attr_u64("level"), Some(3));
        let missing = InputEvent::NodeView {
            pos: 0,
            event: NodeViewEvent::ToggleCheckbox,
        };
        assert!(view.handle_input(&state, &missing).is_none());
    }
}
