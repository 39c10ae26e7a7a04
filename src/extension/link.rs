//! Markdown links: `[text](href)` becomes a link once the cursor leaves it,
//! and a link expands back to its source when the cursor moves into it.

use std::rc::Rc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use super::Extension;
use crate::document::{Mark, MarkKind, Node, find_mark};
use crate::state::input::KeyEvent;
use crate::state::{Assoc, EditorState, Plugin, PluginState, Selection, Transaction, state_as};

static LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(^|\s)\[([^\]]+)\]\(([^ )]+)(?: "([^"]+)")?\)"#).unwrap());

const KEY: &str = "markdown-links";
/// Meta carrying the cursor position the plugin last looked at.
const META: &str = "markdownLinks";

/// Last observed cursor position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkState {
    pub pos: Option<usize>,
}

fn link_state(state: &EditorState) -> LinkState {
    state
        .plugin_state(KEY)
        .and_then(|value| state_as::<LinkState>(value).copied())
        .unwrap_or_default()
}

/// Cursor position when the selection is collapsed inside a textblock
/// that is not code.
fn text_cursor(state: &EditorState, pos: usize) -> Option<crate::document::ResolvedPos> {
    let rp = state.doc().resolve(pos).ok()?;
    let code = state
        .schema()
        .node_spec(rp.parent().kind())
        .is_some_and(|spec| spec.code);
    (rp.depth() > 0 && rp.parent().is_textblock() && !code).then_some(rp)
}

fn char_offset(text: &str, byte: usize) -> usize {
    text[..byte].chars().count()
}

/// Convert markdown link syntax near the last position into a link mark,
/// unless the cursor is still inside it.
fn to_link(state: &EditorState) -> Option<Transaction> {
    let head = state.selection().head()?;
    let last = link_state(state).pos?;
    let rp = text_cursor(state, last)?;
    let depth = rp.depth();
    let start = rp.start(depth);
    let line = state.doc().text_between(start, rp.end(depth), "", "\u{fffc}");
    let caps = LINK.captures(&line)?;
    let whole = caps.get(0)?;
    let lead = caps.get(1).map_or(0, |m| m.as_str().chars().count());
    let from = start + char_offset(&line, whole.start()) + lead;
    let to = start + char_offset(&line, whole.end());
    if (from..=to).contains(&head) {
        return None;
    }
    if !state.doc().resolve(from).ok()?.marks().is_empty() {
        return None;
    }
    let title = caps.get(4).map(|m| m.as_str());
    let mark = state
        .schema()
        .mark(
            MarkKind::Link,
            crate::attrs! { "href" => &caps[3], "title" => title },
        )
        .ok()?;
    let text = state.schema().text(&caps[2], vec![mark]).ok()?;
    let mut tr = state.tr();
    tr.replace(from, to, vec![text]).ok()?;
    let cursor = tr.map_pos(head, Assoc::After);
    tr.set_selection(Selection::cursor(cursor));
    tr.set_meta(META, cursor);
    Some(tr)
}

/// Range of the run of inline nodes carrying `mark` around `pos`.
fn mark_range(parent: &Node, start: usize, pos: usize, mark: &Mark) -> Option<(usize, usize)> {
    let mut spans = Vec::with_capacity(parent.child_count());
    parent.for_each_child(|child, offset, _| {
        spans.push((start + offset, start + offset + child.node_size(), mark.is_in_set(child.marks())));
    });
    let hit = spans
        .iter()
        .position(|&(from, to, marked)| marked && from <= pos && pos <= to)?;
    let first = spans[..=hit]
        .iter()
        .rposition(|&(_, _, marked)| !marked)
        .map_or(0, |i| i + 1);
    let last = spans[hit..]
        .iter()
        .position(|&(_, _, marked)| !marked)
        .map_or(spans.len() - 1, |i| hit + i - 1);
    Some((spans[first].0, spans[last].1))
}

/// Expand the link under the cursor back into `[text](href)`.
fn to_markdown(state: &EditorState) -> Option<Transaction> {
    let head = state.selection().head()?;
    let rp = text_cursor(state, head)?;
    let marks = rp.marks();
    let link = find_mark(&marks, MarkKind::Link)?;
    let href = link.attr_str("href").unwrap_or_default();
    let (from, to) = mark_range(rp.parent(), rp.start(rp.depth()), head, link)?;
    let text = state.doc().text_between(from, to, "", "");
    let source = match link.attr_str("title") {
        Some(title) => format!("[{text}]({href} \"{title}\")"),
        None => format!("[{text}]({href})"),
    };
    let node = state.schema().text(source, Vec::new()).ok()?;
    let mut tr = state.tr();
    tr.replace(from, to, vec![node]).ok()?;
    tr.set_selection(Selection::cursor(head + 1));
    tr.set_meta(META, head);
    Some(tr)
}

/// Run after the cursor moved. Always yields a transaction recording the
/// new position when the selection is a cursor.
fn handle_move(state: &EditorState) -> Option<Transaction> {
    if !state.selection().is_empty(state.doc()) {
        return None;
    }
    let head = state.selection().head()?;
    to_link(state).or_else(|| to_markdown(state)).or_else(|| {
        let mut tr = state.tr();
        tr.set_meta(META, head);
        Some(tr)
    })
}

fn is_navigation(key: &KeyEvent) -> bool {
    matches!(
        key.key.as_str(),
        "ArrowLeft" | "ArrowRight" | "ArrowUp" | "ArrowDown" | "Home" | "End" | "PageUp" | "PageDown"
    )
}

#[derive(Debug, Default)]
pub struct MarkdownLinks;

impl Plugin for MarkdownLinks {
    fn key(&self) -> &'static str {
        KEY
    }

    fn init(&self, _schema: &crate::document::Schema, _doc: &Node) -> Option<PluginState> {
        Some(Rc::new(LinkState::default()))
    }

    fn apply(&self, tr: &Transaction, value: &PluginState, _old: &EditorState) -> PluginState {
        let prev = state_as::<LinkState>(value).copied().unwrap_or_default();
        let pos = match tr.get_meta(META) {
            Some(Value::Number(n)) => n.as_u64().and_then(|n| usize::try_from(n).ok()),
            Some(_) => None,
            None if tr.doc_changed() => tr.selection().head(),
            None => prev.pos.map(|pos| tr.map_pos(pos, Assoc::Before)),
        };
        Rc::new(LinkState { pos })
    }

    fn handle_key_up(&self, state: &EditorState, key: &KeyEvent) -> Option<Transaction> {
        if !is_navigation(key) {
            return None;
        }
        handle_move(state)
    }

    fn handle_click(&self, state: &EditorState, pos: usize) -> Option<Transaction> {
        let mut tr = state.tr();
        tr.set_selection(Selection::near(state.doc(), pos, Assoc::After));
        let moved = state.apply(&tr);
        let follow = handle_move(&moved)?;
        for step in follow.steps() {
            tr.step(step.clone()).ok()?;
        }
        tr.set_selection(follow.selection());
        if let Some(value) = follow.get_meta(META) {
            tr.set_meta(META, value.clone());
        }
        Some(tr)
    }
}

pub fn extension() -> Extension {
    Extension::new("link").with_plugins(|mut plugins, _schema| {
        plugins.push(Rc::new(MarkdownLinks));
        plugins
    })
}
