//! Selections and their mapping through edits.

use serde_json::{Value, json};

use super::step::{Assoc, StepMap};
use crate::document::Node;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// A text range; `anchor == head` is a cursor.
    Text { anchor: usize, head: usize },
    /// A single selected node starting at `pos`.
    Node { pos: usize },
    /// The whole document.
    All,
}

impl Selection {
    pub const fn cursor(pos: usize) -> Self {
        Self::Text {
            anchor: pos,
            head: pos,
        }
    }

    /// Lower bound of the selection in `doc`.
    pub fn from(&self) -> usize {
        match *self {
            Self::Text { anchor, head } => anchor.min(head),
            Self::Node { pos } => pos,
            Self::All => 0,
        }
    }

    /// Upper bound of the selection in `doc`.
    pub fn to(&self, doc: &Node) -> usize {
        match *self {
            Self::Text { anchor, head } => anchor.max(head),
            Self::Node { pos } => doc
                .resolve(pos)
                .ok()
                .and_then(|rp| rp.node_after())
                .map_or(pos, |node| pos + node.node_size()),
            Self::All => doc.content_size(),
        }
    }

    pub const fn head(&self) -> Option<usize> {
        match *self {
            Self::Text { head, .. } => Some(head),
            _ => None,
        }
    }

    pub fn is_empty(&self, doc: &Node) -> bool {
        self.from() == self.to(doc)
    }

    /// A cursor at the first valid text position.
    pub fn at_start(doc: &Node) -> Self {
        Self::near(doc, 0, Assoc::After)
    }

    pub fn at_end(doc: &Node) -> Self {
        Self::near(doc, doc.content_size(), Assoc::Before)
    }

    /// The closest valid cursor to `pos`, searching in the `bias` direction
    /// first.
    pub fn near(doc: &Node, pos: usize, bias: Assoc) -> Self {
        let ranges = textblock_ranges(doc);
        let pos = pos.min(doc.content_size());
        if let Some(&(start, end)) = ranges.iter().find(|(s, e)| *s <= pos && pos <= *e) {
            return Self::cursor(pos.clamp(start, end));
        }
        let forward = ranges.iter().find(|(s, _)| *s >= pos).map(|(s, _)| *s);
        let backward = ranges.iter().rev().find(|(_, e)| *e <= pos).map(|(_, e)| *e);
        let found = match bias {
            Assoc::After => forward.or(backward),
            Assoc::Before => backward.or(forward),
        };
        found.map_or(Self::All, Self::cursor)
    }

    /// Map through a step and re-resolve against the new document.
    #[must_use]
    pub fn map(&self, map: &StepMap, doc: &Node) -> Self {
        match *self {
            Self::Text { anchor, head } => {
                let anchor = map.map(anchor, Assoc::After);
                let head = map.map(head, Assoc::After);
                Self::Text { anchor, head }.resolve(doc)
            }
            Self::Node { pos } => {
                if map.deletes(pos) {
                    return Self::near(doc, map.map(pos, Assoc::After), Assoc::After);
                }
                Self::Node {
                    pos: map.map(pos, Assoc::After),
                }
                .resolve(doc)
            }
            Self::All => Self::All,
        }
    }

    /// Snap to valid positions in `doc`.
    #[must_use]
    pub fn resolve(&self, doc: &Node) -> Self {
        match *self {
            Self::Text { anchor, head } => {
                let anchor_sel = Self::near(doc, anchor, Assoc::After);
                let head_sel = Self::near(doc, head, Assoc::After);
                match (anchor_sel, head_sel) {
                    (
                        Self::Text { anchor, .. },
                        Self::Text { head, .. },
                    ) => Self::Text { anchor, head },
                    _ => Self::All,
                }
            }
            Self::Node { pos } => match doc.resolve(pos).ok().and_then(|rp| rp.node_after()) {
                Some(node) if !node.is_text() => Self::Node { pos },
                _ => Self::near(doc, pos, Assoc::After),
            },
            Self::All => Self::All,
        }
    }

    pub fn to_json(&self) -> Value {
        match *self {
            Self::Text { anchor, head } => json!({"type": "text", "anchor": anchor, "head": head}),
            Self::Node { pos } => json!({"type": "node", "anchor": pos}),
            Self::All => json!({"type": "all"}),
        }
    }

    /// Read a selection back, falling back to the document start.
    pub fn from_json(value: &Value, doc: &Node) -> Self {
        let pos = |key: &str| {
            value
                .get(key)
                .and_then(Value::as_u64)
                .and_then(|v| usize::try_from(v).ok())
        };
        let sel = match value.get("type").and_then(Value::as_str) {
            Some("text") => match (pos("anchor"), pos("head")) {
                (Some(anchor), Some(head)) => Self::Text { anchor, head },
                _ => return Self::at_start(doc),
            },
            Some("node") => match pos("anchor") {
                Some(pos) => Self::Node { pos },
                None => return Self::at_start(doc),
            },
            Some("all") => Self::All,
            _ => return Self::at_start(doc),
        };
        sel.resolve(doc)
    }
}

/// Content ranges of every textblock in document order.
fn textblock_ranges(doc: &Node) -> Vec<(usize, usize)> {
    let mut ranges = Vec::new();
    doc.descendants(&mut |node, pos, _| {
        if node.is_textblock() {
            ranges.push((pos + 1, pos + 1 + node.content_size()));
            return false;
        }
        true
    });
    ranges
}
