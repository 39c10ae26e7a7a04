//! Pasted plain text is read as markdown. URLs become links unless Shift
//! was held, in which case the default plain-text paste runs.

use std::rc::Rc;

use once_cell::sync::Lazy;
use regex::Regex;

use super::Extension;
use crate::document::{MarkKind, Node, NodeKind, Schema, normalize_inline};
use crate::markdown;
use crate::state::input::PasteEvent;
use crate::state::{Assoc, EditorState, Plugin, Selection, Transaction, meta};

static URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:ftp|https?)://(?:\w+(?::\w*)?@)?[^\s<>()\[\]]+[^\s<>()\[\].,;:!?]").unwrap());

/// Split text runs so that URLs carry a link mark.
pub fn autolink(schema: &Schema, node: &Node) -> Node {
    if node.is_leaf() {
        return node.clone();
    }
    let code = schema.node_spec(node.kind()).is_some_and(|spec| spec.code);
    if code {
        return node.clone();
    }
    let mut children = Vec::with_capacity(node.child_count());
    for child in node.content() {
        match child.text_str() {
            Some(text) if linkable(child) => children.extend(link_runs(child, text)),
            _ => children.push(autolink(schema, child)),
        }
    }
    if node.is_textblock() {
        children = normalize_inline(children);
    }
    node.copy(children)
}

fn linkable(text: &Node) -> bool {
    !text
        .marks()
        .iter()
        .any(|m| matches!(m.kind(), MarkKind::Link | MarkKind::Code))
}

fn link_runs(child: &Node, text: &str) -> Vec<Node> {
    let mut out = Vec::new();
    let mut last = 0;
    for found in URL.find_iter(text) {
        if found.start() > last {
            out.push(Node::text(&text[last..found.start()], child.marks().to_vec()));
        }
        let link = crate::document::Mark::link(found.as_str());
        out.push(Node::text(found.as_str(), link.add_to_set(child.marks())));
        last = found.end();
    }
    if last < text.len() {
        out.push(Node::text(&text[last..], child.marks().to_vec()));
    }
    out
}

/// Insert parsed content at the selection.
fn insert_parsed(state: &EditorState, doc: &Node) -> Option<Transaction> {
    let mut tr = state.tr();
    if !state.selection().is_empty(state.doc()) {
        tr.delete_selection().ok()?;
    }
    let pos = tr.selection().from();
    let rp = tr.doc().resolve(pos).ok()?;
    let single = doc.child_count() == 1 && doc.content()[0].kind() == NodeKind::Paragraph;
    if single && rp.parent().is_textblock() {
        let inline = doc.content()[0].content().to_vec();
        let size: usize = inline.iter().map(Node::node_size).sum();
        tr.replace(pos, pos, inline).ok()?;
        tr.set_selection(Selection::cursor(pos + size));
    } else {
        let blocks = doc.content().to_vec();
        let size: usize = blocks.iter().map(Node::node_size).sum();
        let empty_top = rp.depth() == 1 && rp.parent().content_size() == 0;
        let (from, to) = if empty_top {
            (rp.before(1), rp.after(1))
        } else {
            let after = if rp.depth() == 0 { pos } else { rp.after(1) };
            (after, after)
        };
        tr.replace(from, to, blocks).ok()?;
        tr.set_selection(Selection::near(tr.doc(), from + size, Assoc::Before));
    }
    tr.set_meta(meta::PASTE, true);
    Some(tr)
}

#[derive(Debug, Default)]
pub struct PasteMarkdown;

impl Plugin for PasteMarkdown {
    fn key(&self) -> &'static str {
        "paste-markdown"
    }

    fn handle_paste(&self, state: &EditorState, event: &PasteEvent) -> Option<Transaction> {
        let text = event.text.as_deref().filter(|text| !text.is_empty())?;
        if event.html.is_some() || event.shift {
            return None;
        }
        let rp = state.doc().resolve(state.selection().from()).ok()?;
        if state.schema().node_spec(rp.parent().kind()).is_some_and(|spec| spec.code) {
            return None;
        }
        let parsed = markdown::parse(state.schema(), text);
        let linked = autolink(state.schema(), &parsed);
        insert_parsed(state, &linked)
    }
}

pub fn extension() -> Extension {
    Extension::new("paste-markdown").with_plugins(|mut plugins, _schema| {
        plugins.push(Rc::new(PasteMarkdown));
        plugins
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::find_mark;
    use crate::extension::tests::{rich_composition, rich_state};
    use crate::markdown::serialize;
    use crate::state::input::InputEvent;

    fn paste(state: &EditorState, text: &str, shift: bool) -> EditorState {
        let view = rich_composition().view;
        let event = InputEvent::Paste(PasteEvent {
            text: Some(text.to_string()),
            html: None,
            shift,
        });
        state.apply(&view.handle_input(state, &event).unwrap())
    }

    #[test]
    fn test_markdown_blocks_replace_empty_paragraph() {
        let state = paste(&rich_state(""), "# Title\n\nbody", false);
        assert_eq!(serialize(state.doc()), "# Title\n\nbody\n");
    }

    #[test]
    fn test_inline_markdown_pastes_into_paragraph() {
        let state = paste(&rich_state("a"), "**b**", false);
        assert_eq!(serialize(state.doc()), "a**b**\n");
        assert_eq!(state.selection(), Selection::cursor(3));
    }

    #[test]
    fn test_urls_become_links() {
        let state = paste(&rich_state(""), "see https://a.io/x now", false);
        let para = &state.doc().content()[0];
        let link = para
            .content()
            .iter()
            .find_map(|n| find_mark(n.marks(), MarkKind::Link).map(|m| (n.text_str(), m.attr_str("href"))));
        assert_eq!(link, Some((Some("https://a.io/x"), Some("https://a.io/x"))));
    }

    #[test]
    fn test_shift_paste_keeps_plain_text() {
        let state = paste(&rich_state(""), "**x** https://a.io", true);
        assert_eq!(state.doc().text_content(), "**x** https://a.io");
        assert!(state.doc().content()[0].content().iter().all(|n| n.marks().is_empty()));
    }

    #[test]
    fn test_trailing_punctuation_is_not_part_of_url() {
        let schema = rich_composition().schema;
        let para = schema
            .node(
                NodeKind::Paragraph,
                crate::document::Attrs::new(),
                vec![schema.text("go to http://a.io.", Vec::new()).unwrap()],
            )
            .unwrap();
        let linked = autolink(&schema, &para);
        assert_eq!(linked.child_count(), 3);
        assert_eq!(linked.content()[1].text_str(), Some("http://a.io"));
    }
}
