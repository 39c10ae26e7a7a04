//! The base extension: schema, editing keymap, history, drop cursor, and
//! Tab handling.

use std::rc::Rc;

use serde_json::{Value, json};

use super::{Extension, ExtensionProps};
use crate::config::PrettierOptions;
use crate::document::{Attrs, Group, MarkKind, MarkSpec, Node, NodeKind, NodeSpec, Schema, SchemaSpec};
use crate::state::commands::{
    delete_char_backward, delete_char_forward, delete_selection, hard_break, join_backward,
    join_forward, lift, lift_list_item, new_line_in_code, select_all, set_block_type,
    sink_list_item, split_block, split_list_item, toggle_mark, wrap_in,
};
use crate::state::history::{History, redo, undo};
use crate::state::keymap::{Command, Keymap, chain, command};
use crate::state::view::{Decoration, Widget};
use crate::state::{EditorState, Plugin, PluginState, Transaction, state_as};

fn null() -> Option<Value> {
    Some(Value::Null)
}

/// The rich-text schema.
pub fn rich_schema_spec() -> SchemaSpec {
    SchemaSpec::new()
        .update_node(NodeKind::Doc, NodeSpec::new("block+"))
        .update_node(NodeKind::Paragraph, NodeSpec::new("inline*").group(Group::Block))
        .update_node(
            NodeKind::Blockquote,
            NodeSpec::new("block+").group(Group::Block).defining(),
        )
        .update_node(NodeKind::HorizontalRule, NodeSpec::new("").group(Group::Block))
        .update_node(
            NodeKind::Heading,
            NodeSpec::new("(text | image)*")
                .group(Group::Block)
                .defining()
                .attr("level", Some(json!(1))),
        )
        .update_node(
            NodeKind::CodeBlock,
            NodeSpec::new("text*")
                .group(Group::Block)
                .code()
                .defining()
                .attr("lang", null()),
        )
        .update_node(
            NodeKind::OrderedList,
            NodeSpec::new("list_item+")
                .group(Group::Block)
                .attr("order", Some(json!(1)))
                .attr("tight", Some(json!(false))),
        )
        .update_node(
            NodeKind::BulletList,
            NodeSpec::new("list_item+")
                .group(Group::Block)
                .attr("tight", Some(json!(false))),
        )
        .update_node(NodeKind::ListItem, NodeSpec::new("paragraph block*").defining())
        .update_node(NodeKind::Text, NodeSpec::new("").group(Group::Inline))
        .update_node(
            NodeKind::Image,
            NodeSpec::new("")
                .group(Group::Inline)
                .draggable()
                .attr("src", None)
                .attr("alt", null())
                .attr("title", null()),
        )
        .update_node(NodeKind::HardBreak, NodeSpec::new("").group(Group::Inline))
        .append_mark(MarkKind::Em, MarkSpec::new())
        .append_mark(MarkKind::Strong, MarkSpec::new())
        .append_mark(
            MarkKind::Link,
            MarkSpec::new()
                .attr("href", None)
                .attr("title", null())
                .exclusive(),
        )
        .append_mark(MarkKind::Code, MarkSpec::new().exclusive())
}

/// The markdown-source schema: paragraphs of unmarked text.
pub fn plain_schema_spec() -> SchemaSpec {
    SchemaSpec::new()
        .update_node(NodeKind::Doc, NodeSpec::new("block+"))
        .update_node(NodeKind::Paragraph, NodeSpec::new("text*").group(Group::Block))
        .update_node(NodeKind::Text, NodeSpec::new("").group(Group::Inline))
}

fn heading(level: u8) -> Command {
    set_block_type(NodeKind::Heading, crate::attrs! { "level" => level })
}

/// Editing bindings shared by both modes.
pub fn base_keymap() -> Keymap {
    let mut bindings: Vec<(&str, Command)> = vec![
        (
            "Enter",
            chain(vec![
                new_line_in_code(),
                split_list_item(NodeKind::ListItem),
                split_list_item(NodeKind::TodoItem),
                split_block(),
            ]),
        ),
        (
            "Backspace",
            chain(vec![delete_selection(), join_backward(), delete_char_backward()]),
        ),
        (
            "Delete",
            chain(vec![delete_selection(), join_forward(), delete_char_forward()]),
        ),
        ("Mod-a", select_all()),
        ("Mod-b", toggle_mark(MarkKind::Strong, Attrs::new())),
        ("Mod-i", toggle_mark(MarkKind::Em, Attrs::new())),
        ("Mod-`", toggle_mark(MarkKind::Code, Attrs::new())),
        ("Shift-Ctrl-0", set_block_type(NodeKind::Paragraph, Attrs::new())),
        ("Shift-Ctrl-\\", set_block_type(NodeKind::CodeBlock, Attrs::new())),
        ("Ctrl->", wrap_in(vec![(NodeKind::Blockquote, Attrs::new())])),
        ("Shift-Enter", hard_break()),
        ("Mod-Enter", hard_break()),
        ("Mod-[", lift()),
        ("Mod-z", undo()),
        ("Shift-Mod-z", redo()),
        ("Mod-y", redo()),
    ];
    let headings = [
        ("Shift-Ctrl-1", 1),
        ("Shift-Ctrl-2", 2),
        ("Shift-Ctrl-3", 3),
        ("Shift-Ctrl-4", 4),
        ("Shift-Ctrl-5", 5),
        ("Shift-Ctrl-6", 6),
    ];
    bindings.extend(headings.into_iter().map(|(key, level)| (key, heading(level))));
    Keymap::new("base-keymap", bindings)
}

/// Swallow the key so focus stays in the editor.
fn swallow() -> Command {
    command(|state| Some(state.tr()))
}

/// Indent inside code blocks.
fn indent_code(prettier: &PrettierOptions) -> Command {
    let indent = prettier.indent();
    command(move |state| {
        let pos = state.selection().head()?;
        let rp = state.doc().resolve(pos).ok()?;
        if !state.schema().node_spec(rp.parent().kind()).is_some_and(|s| s.code) {
            return None;
        }
        let mut tr = state.tr();
        tr.insert_text(&indent, pos, pos).ok()?;
        Some(tr)
    })
}

pub fn tab_keymap(prettier: &PrettierOptions) -> Keymap {
    Keymap::new(
        "tab",
        [
            (
                "Tab",
                chain(vec![
                    indent_code(prettier),
                    sink_list_item(NodeKind::ListItem),
                    sink_list_item(NodeKind::TodoItem),
                    swallow(),
                ]),
            ),
            (
                "Shift-Tab",
                chain(vec![
                    lift_list_item(NodeKind::ListItem),
                    lift_list_item(NodeKind::TodoItem),
                    swallow(),
                ]),
            ),
        ],
    )
}

pub const DROP_CURSOR_KEY: &str = "drop-cursor";
const DROP_META: &str = "dropCursor";

/// Tracks the drag-over position and renders a cursor there.
#[derive(Debug, Default)]
pub struct DropCursor;

impl Plugin for DropCursor {
    fn key(&self) -> &'static str {
        DROP_CURSOR_KEY
    }

    fn init(&self, _schema: &Schema, _doc: &Node) -> Option<PluginState> {
        Some(Rc::new(None::<usize>))
    }

    fn apply(&self, tr: &Transaction, value: &PluginState, _old: &EditorState) -> PluginState {
        if let Some(meta) = tr.get_meta(DROP_META) {
            let pos = meta.as_u64().and_then(|p| usize::try_from(p).ok());
            return Rc::new(pos);
        }
        if tr.doc_changed() {
            return Rc::new(None::<usize>);
        }
        Rc::clone(value)
    }

    fn handle_drag_over(&self, state: &EditorState, pos: Option<usize>) -> Option<Transaction> {
        let mut tr = state.tr();
        tr.set_meta(DROP_META, pos.map_or(Value::Null, |p| json!(p)));
        Some(tr)
    }

    fn decorations(&self, state: &EditorState) -> Vec<Decoration> {
        state
            .plugin_state(DROP_CURSOR_KEY)
            .and_then(state_as::<Option<usize>>)
            .copied()
            .flatten()
            .map(|pos| Decoration::Widget {
                pos,
                widget: Widget::DropCursor,
            })
            .into_iter()
            .collect()
    }
}

pub fn extension(props: &ExtensionProps) -> Extension {
    let markdown = props.markdown;
    let prettier = props.config.prettier.clone();
    Extension::new("base")
        .with_schema(move |_| {
            if markdown {
                plain_schema_spec()
            } else {
                rich_schema_spec()
            }
        })
        .with_plugins(move |mut plugins, _schema| {
            plugins.push(Rc::new(base_keymap()));
            plugins.push(Rc::new(tab_keymap(&prettier)));
            plugins.push(Rc::new(History::default()));
            plugins.push(Rc::new(DropCursor));
            plugins
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extension::tests::{rich_state, state_from_markdown};
    use crate::markdown::serialize;
    use crate::state::Selection;
    use crate::state::input::{InputEvent, KeyEvent};
    use crate::state::view::EditorView;

    fn press(state: &EditorState, key: &str) -> EditorState {
        let event = InputEvent::Key(KeyEvent::parse(key));
        let tr = EditorView::default().handle_input(state, &event).unwrap();
        state.apply(&tr)
    }

    #[test]
    fn test_rich_and_plain_schemas_build() {
        assert!(Schema::new(rich_schema_spec()).is_ok());
        let plain = Schema::new(plain_schema_spec()).unwrap();
        assert!(!plain.has_node(NodeKind::Heading));
        assert!(!plain.has_mark(MarkKind::Em));
    }

    #[test]
    fn test_heading_shortcut() {
        let state = press(&rich_state("title"), "Shift-Ctrl-2");
        assert_eq!(serialize(state.doc()), "## title\n");
    }

    #[test]
    fn test_backspace_deletes_character() {
        let state = press(&rich_state("abc"), "Backspace");
        assert_eq!(state.doc().text_content(), "ab");
    }

    #[test]
    fn test_tab_nests_list_item_and_shift_tab_lifts() {
        let state = state_from_markdown("* one\n* two\n");
        let mut tr = state.tr();
        tr.set_selection(Selection::cursor(10));
        let state = state.apply(&tr);
        let nested = press(&state, "Tab");
        assert_eq!(serialize(nested.doc()), "* one\n  * two\n");
        let lifted = press(&nested, "Shift-Tab");
        assert_eq!(serialize(lifted.doc()), "* one\n* two\n");
    }

    #[test]
    fn test_tab_outside_lists_is_swallowed() {
        let state = rich_state("plain");
        let next = press(&state, "Tab");
        assert_eq!(next.doc(), state.doc());
    }

    #[test]
    fn test_tab_indents_code() {
        let state = state_from_markdown("```\nx\n```\n");
        let mut tr = state.tr();
        tr.set_selection(Selection::cursor(1));
        let state = state.apply(&tr);
        let next = press(&state, "Tab");
        assert_eq!(next.doc().text_content(), "  x");
    }

    #[test]
    fn test_drop_cursor_tracks_drag() {
        let state = rich_state("drag");
        let view = EditorView::default();
        let over = view
            .handle_input(&state, &InputEvent::DragOver { pos: Some(2) })
            .unwrap();
        let state = state.apply(&over);
        assert!(view.decorations(&state).contains(&Decoration::Widget {
            pos: 2,
            widget: Widget::DropCursor
        }));
        let left = view
            .handle_input(&state, &InputEvent::DragOver { pos: None })
            .unwrap();
        let state = state.apply(&left);
        assert!(view.decorations(&state).iter().all(|d| !matches!(
            d,
            Decoration::Widget {
                widget: Widget::DropCursor,
                ..
            }
        )));
    }
}
