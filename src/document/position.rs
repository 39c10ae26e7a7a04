//! Resolved positions.
//!
//! A position is an integer offset into the document: entering or leaving a
//! non-leaf node counts one, each character counts one, and a leaf node
//! counts one. Resolving a position records the chain of ancestors around
//! it so commands can ask for the parent, the surrounding block, or the
//! marks in effect.

use thiserror::Error;

use super::node::{Mark, Node};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("position {pos} is outside the document (size {size})")]
pub struct PositionError {
    pub pos: usize,
    pub size: usize,
}

#[derive(Debug, Clone)]
struct Level {
    node: Node,
    index: usize,
    /// Absolute position of the child at `index`.
    offset: usize,
}

#[derive(Debug, Clone)]
pub struct ResolvedPos {
    pub pos: usize,
    path: Vec<Level>,
    parent_offset: usize,
}

impl Node {
    /// Resolve a position inside this node's content.
    pub fn resolve(&self, pos: usize) -> Result<ResolvedPos, PositionError> {
        if pos > self.content_size() {
            return Err(PositionError {
                pos,
                size: self.content_size(),
            });
        }
        let mut path = Vec::new();
        let mut start = 0;
        let mut parent_offset = pos;
        let mut node = self.clone();
        loop {
            let (index, offset) = find_index(&node, parent_offset);
            let rem = parent_offset - offset;
            path.push(Level {
                node: node.clone(),
                index,
                offset: start + offset,
            });
            if rem == 0 {
                break;
            }
            let Some(child) = node.child(index).cloned() else {
                break;
            };
            if child.is_text() {
                break;
            }
            node = child;
            parent_offset = rem - 1;
            start += offset + 1;
        }
        Ok(ResolvedPos {
            pos,
            path,
            parent_offset,
        })
    }
}

/// Index of the child that contains or starts at `pos`, with its offset.
fn find_index(node: &Node, pos: usize) -> (usize, usize) {
    if pos == 0 {
        return (0, 0);
    }
    if pos == node.content_size() {
        return (node.child_count(), pos);
    }
    let mut cur = 0;
    for (i, child) in node.content().iter().enumerate() {
        let end = cur + child.node_size();
        if end >= pos {
            if end == pos {
                return (i + 1, end);
            }
            return (i, cur);
        }
        cur = end;
    }
    (node.child_count(), cur)
}

impl ResolvedPos {
    /// Depth of the innermost parent (0 = the document).
    pub fn depth(&self) -> usize {
        self.path.len() - 1
    }

    pub fn node(&self, depth: usize) -> &Node {
        &self.path[depth].node
    }

    pub fn parent(&self) -> &Node {
        self.node(self.depth())
    }

    pub fn doc(&self) -> &Node {
        self.node(0)
    }

    pub fn index(&self, depth: usize) -> usize {
        self.path[depth].index
    }

    /// Index into the parent after the position.
    pub fn index_after(&self, depth: usize) -> usize {
        let index = self.index(depth);
        if depth == self.depth() && self.text_offset() == 0 {
            index
        } else {
            index + 1
        }
    }

    pub const fn parent_offset(&self) -> usize {
        self.parent_offset
    }

    /// Start of the content of the node at `depth`.
    pub fn start(&self, depth: usize) -> usize {
        if depth == 0 { 0 } else { self.path[depth - 1].offset + 1 }
    }

    pub fn end(&self, depth: usize) -> usize {
        self.start(depth) + self.node(depth).content_size()
    }

    /// Position directly before the node at `depth` (depth >= 1).
    pub fn before(&self, depth: usize) -> usize {
        if depth == self.depth() + 1 {
            self.pos
        } else {
            self.path[depth - 1].offset
        }
    }

    pub fn after(&self, depth: usize) -> usize {
        if depth == self.depth() + 1 {
            self.pos + self.parent().child(self.index(self.depth())).map_or(0, Node::node_size)
        } else {
            self.path[depth - 1].offset + self.node(depth).node_size()
        }
    }

    /// Offset into a text node when the position points inside one.
    pub fn text_offset(&self) -> usize {
        self.pos - self.path[self.depth()].offset
    }

    pub fn node_after(&self) -> Option<Node> {
        let parent = self.parent();
        let index = self.index(self.depth());
        let child = parent.child(index)?;
        let offset = self.text_offset();
        if offset > 0 {
            Some(child.cut_text(offset, child.node_size()))
        } else {
            Some(child.clone())
        }
    }

    pub fn node_before(&self) -> Option<Node> {
        let parent = self.parent();
        let index = self.index(self.depth());
        let offset = self.text_offset();
        if offset > 0 {
            return parent.child(index).map(|child| child.cut_text(0, offset));
        }
        if index == 0 {
            None
        } else {
            parent.child(index - 1).cloned()
        }
    }

    /// Marks that text typed here would get.
    pub fn marks(&self) -> Vec<Mark> {
        let parent = self.parent();
        let index = self.index(self.depth());
        if parent.child_count() == 0 {
            return Vec::new();
        }
        if self.text_offset() > 0 {
            return parent
                .child(index)
                .map(|c| c.marks().to_vec())
                .unwrap_or_default();
        }
        let before = if index > 0 { parent.child(index - 1) } else { None };
        let after = parent.child(index);
        let (main, other) = match before {
            Some(before) => (before, after),
            None => match after {
                Some(after) => (after, None),
                None => return Vec::new(),
            },
        };
        main.marks()
            .iter()
            .filter(|mark| {
                mark.kind().is_inclusive()
                    || other.is_some_and(|o| mark.is_in_set(o.marks()))
            })
            .cloned()
            .collect()
    }

    /// Deepest depth shared with a position `pos`.
    pub fn shared_depth(&self, pos: usize) -> usize {
        (1..=self.depth())
            .rev()
            .find(|&d| self.start(d) <= pos && self.end(d) >= pos)
            .unwrap_or(0)
    }

    pub fn same_parent(&self, other: &Self) -> bool {
        self.depth() == other.depth() && self.start(self.depth()) == other.start(other.depth())
    }

    /// Depth of the nearest ancestor matching `pred`.
    pub fn find_ancestor(&self, pred: impl Fn(&Node) -> bool) -> Option<usize> {
        (0..=self.depth()).rev().find(|&d| pred(self.node(d)))
    }
}
