//! Todo items with a checkbox view.

use std::rc::Rc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;

use super::Extension;
use crate::document::{Attrs, Group, Node, NodeKind, NodeSpec};
use crate::state::input::{InputRule, InputRules};
use crate::state::view::{NodeView, NodeViewEvent};
use crate::state::{EditorState, Selection, Transaction};

static TODO: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\[( |x)]\s$").unwrap());

fn todo_rule() -> InputRule {
    InputRule::new(TODO.clone(), |state, caps, from, to| {
        let done = &caps[1] == "x";
        let schema = state.schema();
        if !schema.has_node(NodeKind::TodoItem) {
            return None;
        }
        let mut tr = state.tr();
        tr.delete(from, to).ok()?;
        let rp = tr.doc().resolve(from).ok()?;
        let depth = rp.depth();
        if rp.parent_offset() != 0 || rp.parent().kind() != NodeKind::Paragraph {
            return None;
        }
        let attrs = crate::attrs! { "done" => done };
        // `- [ ] ` first makes a bullet list; a lone item becomes a todo.
        if depth >= 3
            && rp.node(depth - 1).kind() == NodeKind::ListItem
            && rp.node(depth - 1).child_count() == 1
            && rp.node(depth - 2).child_count() == 1
        {
            let para = rp.parent().clone();
            let todo = schema.node(NodeKind::TodoItem, attrs, vec![para]).ok()?;
            let list_start = rp.before(depth - 2);
            tr.replace(list_start, rp.after(depth - 2), vec![todo]).ok()?;
            tr.set_selection(Selection::cursor(list_start + 2));
            return Some(tr);
        }
        let (start, end) = (rp.before(depth), rp.after(depth));
        tr.wrap(start, end, vec![(NodeKind::TodoItem, attrs)]).ok()?;
        Some(tr)
    })
}

/// Toggles `done` when the checkbox is clicked.
#[derive(Debug, Default)]
pub struct TodoCheckbox;

impl NodeView for TodoCheckbox {
    fn handle(&self, state: &EditorState, pos: usize, node: &Node, event: &NodeViewEvent) -> Option<Transaction> {
        if *event != NodeViewEvent::ToggleCheckbox {
            return None;
        }
        let done = node.attr_bool("done").unwrap_or(false);
        let mut tr = state.tr();
        tr.set_node_markup(pos, None, crate::attrs! { "done" => !done }).ok()?;
        Some(tr)
    }
}

pub fn extension() -> Extension {
    Extension::new("todo-list")
        .with_schema(|spec| {
            spec.append_nodes([(
                NodeKind::TodoItem,
                NodeSpec::new("paragraph+")
                    .group(Group::Block)
                    .defining()
                    .attr("done", Some(json!(false))),
            )])
        })
        .with_plugins(|mut plugins, _schema| {
            plugins.push(Rc::new(InputRules::new("todo-list", vec![todo_rule()])));
            plugins
        })
        .with_node_view(NodeKind::TodoItem, Rc::new(TodoCheckbox))
}

/// Attributes for a fresh unchecked item.
pub fn unchecked() -> Attrs {
    crate::attrs! { "done" => false }
}
