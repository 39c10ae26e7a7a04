//! Atomic document edits and position maps.

use thiserror::Error;

use crate::document::{
    Attrs, Mark, MarkKind, Node, NodeKind, PositionError, ResolvedPos, Schema, SchemaError,
    normalize_inline,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StepError {
    #[error(transparent)]
    Position(#[from] PositionError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error("range {from}..{to} is not a valid replace range")]
    InvalidRange { from: usize, to: usize },
    #[error("no node at position {0}")]
    NoNode(usize),
    #[error("cannot split at {pos} with depth {depth}")]
    InvalidSplit { pos: usize, depth: usize },
    #[error("cannot join at {0}")]
    InvalidJoin(usize),
}

/// Which side a position sticks to when content is inserted exactly at it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assoc {
    Before,
    After,
}

/// Maps positions in the document before a step to positions after it.
///
/// Each range is `(start, old_size, new_size)` in pre-step coordinates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepMap {
    ranges: Vec<(usize, usize, usize)>,
}

impl StepMap {
    pub const fn identity() -> Self {
        Self { ranges: Vec::new() }
    }

    pub fn new(ranges: Vec<(usize, usize, usize)>) -> Self {
        Self { ranges }
    }

    pub fn single(start: usize, old_size: usize, new_size: usize) -> Self {
        if old_size == 0 && new_size == 0 {
            return Self::identity();
        }
        Self::new(vec![(start, old_size, new_size)])
    }

    pub fn map(&self, pos: usize, assoc: Assoc) -> usize {
        let mut diff: isize = 0;
        for &(start, old_size, new_size) in &self.ranges {
            if start > pos {
                break;
            }
            let end = start + old_size;
            if pos <= end {
                let side = if old_size == 0 {
                    assoc
                } else if pos == start {
                    Assoc::Before
                } else if pos == end {
                    Assoc::After
                } else {
                    assoc
                };
                let offset = if side == Assoc::Before { 0 } else { new_size };
                return offset_pos(start + offset, diff);
            }
            diff += to_isize(new_size) - to_isize(old_size);
        }
        offset_pos(pos, diff)
    }

    /// True when the position was inside a deleted range.
    pub fn deletes(&self, pos: usize) -> bool {
        self.ranges
            .iter()
            .any(|&(start, old_size, _)| old_size > 0 && pos > start && pos < start + old_size)
    }
}

fn to_isize(n: usize) -> isize {
    isize::try_from(n).unwrap_or(isize::MAX)
}

fn offset_pos(pos: usize, diff: isize) -> usize {
    pos.saturating_add_signed(diff)
}

/// One edit. Steps are applied in order; each produces a [`StepMap`].
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Replace `from..to` with `content`. When the endpoints sit in
    /// different textblocks, the blocks are joined around the gap.
    Replace {
        from: usize,
        to: usize,
        content: Vec<Node>,
    },
    AddMark {
        from: usize,
        to: usize,
        mark: Mark,
    },
    RemoveMark {
        from: usize,
        to: usize,
        kind: MarkKind,
    },
    /// Change the type and/or attributes of the node starting at `pos`.
    SetAttrs {
        pos: usize,
        kind: Option<NodeKind>,
        attrs: Attrs,
    },
    /// Split `depth` levels of ancestors at `pos`. `types_after[i]` may
    /// give a different type for the new node `i` levels up from the
    /// innermost.
    Split {
        pos: usize,
        depth: usize,
        types_after: Vec<Option<(NodeKind, Attrs)>>,
    },
    /// Join the nodes on either side of `pos`.
    Join { pos: usize },
    /// Wrap the sibling range `from..to` in `wrappers` (outermost first).
    Wrap {
        from: usize,
        to: usize,
        wrappers: Vec<(NodeKind, Attrs)>,
    },
    /// Replace the node at `pos` with its children.
    Unwrap { pos: usize },
}

impl Step {
    pub fn apply(&self, doc: &Node, schema: &Schema) -> Result<(Node, StepMap), StepError> {
        match self {
            Self::Replace { from, to, content } => replace(doc, schema, *from, *to, content),
            Self::AddMark { from, to, mark } => {
                if !schema.has_mark(mark.kind()) {
                    return Err(SchemaError::MarkNotInSchema(mark.kind()).into());
                }
                let doc = mark_range(schema, doc, 0, *from, *to, &|marks| mark.add_to_set(marks));
                Ok((doc, StepMap::identity()))
            }
            Self::RemoveMark { from, to, kind } => {
                let doc = mark_range(schema, doc, 0, *from, *to, &|marks| {
                    Mark::remove_from_set(*kind, marks)
                });
                Ok((doc, StepMap::identity()))
            }
            Self::SetAttrs { pos, kind, attrs } => set_attrs(doc, schema, *pos, *kind, attrs),
            Self::Split {
                pos,
                depth,
                types_after,
            } => split(doc, schema, *pos, *depth, types_after),
            Self::Join { pos } => join(doc, schema, *pos),
            Self::Wrap { from, to, wrappers } => wrap(doc, schema, *from, *to, wrappers),
            Self::Unwrap { pos } => unwrap(doc, schema, *pos),
        }
    }
}

/// Replace the node at `depth` on the path of `rp` and rebuild its ancestors.
fn rebuild(rp: &ResolvedPos, depth: usize, node: Node) -> Node {
    (0..depth)
        .rev()
        .fold(node, |child, d| rp.node(d).replace_child(rp.index(d), child))
}

/// Children of `parent` with the content range `from..to` (parent offsets)
/// replaced by `insert`.
fn splice(parent: &Node, from: usize, to: usize, insert: &[Node]) -> Vec<Node> {
    let mut out = Vec::with_capacity(parent.child_count() + insert.len());
    let mut inserted = false;
    let mut pos = 0;
    for child in parent.content() {
        let end = pos + child.node_size();
        if end <= from {
            out.push(child.clone());
        } else if pos >= to {
            if !inserted {
                out.extend_from_slice(insert);
                inserted = true;
            }
            out.push(child.clone());
        } else {
            if child.is_text() && pos < from {
                out.push(child.cut_text(0, from - pos));
            }
            if !inserted {
                out.extend_from_slice(insert);
                inserted = true;
            }
            if child.is_text() && end > to {
                out.push(child.cut_text(to - pos, child.node_size()));
            }
        }
        pos = end;
    }
    if !inserted {
        out.extend_from_slice(insert);
    }
    out
}

fn finish_children(parent: &Node, children: Vec<Node>) -> Vec<Node> {
    if parent.is_textblock() {
        normalize_inline(children)
    } else {
        children
    }
}

fn replace(
    doc: &Node,
    schema: &Schema,
    from: usize,
    to: usize,
    content: &[Node],
) -> Result<(Node, StepMap), StepError> {
    if from > to {
        return Err(StepError::InvalidRange { from, to });
    }
    let a = doc.resolve(from)?;
    let b = doc.resolve(to)?;
    let inserted: usize = content.iter().map(Node::node_size).sum();

    if a.same_parent(&b) {
        let depth = a.depth();
        let parent = a.parent();
        let start = a.start(depth);
        let children = finish_children(parent, splice(parent, from - start, to - start, content));
        schema.check_content(parent.kind(), &children)?;
        let doc = rebuild(&a, depth, parent.copy(children));
        return Ok((doc, StepMap::single(from, to - from, inserted)));
    }

    if !a.parent().is_textblock() || !b.parent().is_textblock() {
        return Err(StepError::InvalidRange { from, to });
    }
    let shared = a.shared_depth(to);
    let (da, db) = (a.depth(), b.depth());

    // Left side: the textblock at `from`, cut there, with the inserted
    // content and the tail of the textblock at `to` appended.
    let a_parent = a.parent();
    let a_off = from - a.start(da);
    let mut inline = splice(a_parent, a_off, a_parent.content_size(), &[]);
    inline.extend_from_slice(content);
    let b_parent = b.parent();
    let tail = splice(b_parent, 0, to - b.start(db), &[]);
    inline.extend(tail);
    let inline = normalize_inline(inline);
    schema.check_content(a_parent.kind(), &inline)?;
    let mut left = a_parent.copy(inline);
    for depth in (shared + 1..da).rev() {
        let ancestor = a.node(depth);
        let mut kids = ancestor.content()[..a.index(depth)].to_vec();
        kids.push(left);
        schema.check_content(ancestor.kind(), &kids)?;
        left = ancestor.copy(kids);
    }

    // Right side: whatever followed the textblock at `to` inside its
    // ancestors below the shared depth, closed into copies of them.
    let mut right: Option<Node> = None;
    for depth in (shared + 1..db).rev() {
        let ancestor = b.node(depth);
        let mut kids: Vec<Node> = right.take().into_iter().collect();
        kids.extend_from_slice(&ancestor.content()[b.index(depth) + 1..]);
        if !kids.is_empty() {
            schema.check_content(ancestor.kind(), &kids)?;
            right = Some(ancestor.copy(kids));
        }
    }

    let container = a.node(shared);
    let mut children = container.content()[..a.index(shared)].to_vec();
    let replaced_start = a.before(shared + 1);
    let replaced_end = b.after(shared + 1);
    let mut new_size = left.node_size();
    children.push(left);
    if let Some(right) = right {
        new_size += right.node_size();
        children.push(right);
    }
    children.extend_from_slice(&container.content()[b.index(shared) + 1..]);
    schema.check_content(container.kind(), &children)?;
    let doc = rebuild(&a, shared, container.copy(children));

    let tail_len = b.end(db) - to;
    let old_tail_start = to + tail_len;
    let new_tail_start = from + inserted + tail_len;
    let map = StepMap::new(vec![
        (from, to - from, inserted),
        (
            old_tail_start,
            replaced_end - old_tail_start,
            replaced_start + new_size - new_tail_start,
        ),
    ]);
    Ok((doc, map))
}

fn mark_range(
    schema: &Schema,
    node: &Node,
    start: usize,
    from: usize,
    to: usize,
    f: &impl Fn(&[Mark]) -> Vec<Mark>,
) -> Node {
    let mut children = Vec::with_capacity(node.child_count());
    let mut pos = start;
    let allows = schema.allows_marks(node.kind());
    for child in node.content() {
        let end = pos + child.node_size();
        if end <= from || pos >= to {
            children.push(child.clone());
        } else if child.is_text() {
            if !allows {
                children.push(child.clone());
            } else {
                let s = from.max(pos) - pos;
                let e = to.min(end) - pos;
                if s > 0 {
                    children.push(child.cut_text(0, s));
                }
                children.push(child.cut_text(s, e).with_marks(f(child.marks())));
                if e < child.node_size() {
                    children.push(child.cut_text(e, child.node_size()));
                }
            }
        } else if child.is_inline() {
            if allows {
                children.push(child.with_marks(f(child.marks())));
            } else {
                children.push(child.clone());
            }
        } else {
            children.push(mark_range(schema, child, pos + 1, from, to, f));
        }
        pos = end;
    }
    node.copy(finish_children(node, children))
}

fn node_at(doc: &Node, pos: usize) -> Result<(ResolvedPos, Node), StepError> {
    let rp = doc.resolve(pos)?;
    match rp.node_after() {
        Some(node) if !node.is_text() && rp.text_offset() == 0 => Ok((rp, node)),
        _ => Err(StepError::NoNode(pos)),
    }
}

fn set_attrs(
    doc: &Node,
    schema: &Schema,
    pos: usize,
    kind: Option<NodeKind>,
    attrs: &Attrs,
) -> Result<(Node, StepMap), StepError> {
    let (rp, node) = node_at(doc, pos)?;
    let kind = kind.unwrap_or_else(|| node.kind());
    let attrs = schema.node_attrs(kind, attrs.clone())?;
    let content: Vec<Node> = if schema.allows_marks(kind) {
        node.content().to_vec()
    } else {
        node.content()
            .iter()
            .map(|child| child.with_marks(Vec::new()))
            .collect()
    };
    let content = if kind.is_textblock() {
        normalize_inline(content)
    } else {
        content
    };
    schema.check_content(kind, &content)?;
    let replacement = Node::branch(kind, attrs, content);
    let depth = rp.depth();
    let parent = rp.parent().replace_child(rp.index(depth), replacement);
    schema.check_content(parent.kind(), parent.content())?;
    Ok((rebuild(&rp, depth, parent), StepMap::identity()))
}

fn split(
    doc: &Node,
    schema: &Schema,
    pos: usize,
    depth: usize,
    types_after: &[Option<(NodeKind, Attrs)>],
) -> Result<(Node, StepMap), StepError> {
    let rp = doc.resolve(pos)?;
    if depth == 0 || depth > rp.depth() {
        return Err(StepError::InvalidSplit { pos, depth });
    }
    let inner = rp.depth();
    let parent = rp.parent();
    let offset = rp.parent_offset();
    let left_children = finish_children(parent, splice(parent, offset, parent.content_size(), &[]));
    let mut left = parent.copy(left_children);
    let right_children = finish_children(parent, splice(parent, 0, offset, &[]));
    let mut right = typed_copy(schema, parent, types_after.first(), right_children)?;
    schema.check_content(left.kind(), left.content())?;

    for level in 1..depth {
        let d = inner - level;
        let ancestor = rp.node(d);
        let index = rp.index(d);
        let mut left_kids = ancestor.content()[..index].to_vec();
        left_kids.push(left);
        let mut right_kids = vec![right];
        right_kids.extend_from_slice(&ancestor.content()[index + 1..]);
        left = ancestor.copy(left_kids);
        schema.check_content(left.kind(), left.content())?;
        right = typed_copy(schema, ancestor, types_after.get(level), right_kids)?;
    }

    let d = inner - depth;
    let container = rp.node(d);
    let index = rp.index(d);
    let mut kids = container.content()[..index].to_vec();
    kids.push(left);
    kids.push(right);
    kids.extend_from_slice(&container.content()[index + 1..]);
    schema.check_content(container.kind(), &kids)?;
    let doc = rebuild(&rp, d, container.copy(kids));
    Ok((doc, StepMap::single(pos, 0, depth * 2)))
}

fn typed_copy(
    schema: &Schema,
    original: &Node,
    typed: Option<&Option<(NodeKind, Attrs)>>,
    content: Vec<Node>,
) -> Result<Node, StepError> {
    match typed {
        Some(Some((kind, attrs))) => Ok(schema.node(*kind, attrs.clone(), content)?),
        _ => {
            schema.check_content(original.kind(), &content)?;
            Ok(original.copy(content))
        }
    }
}

fn join(doc: &Node, schema: &Schema, pos: usize) -> Result<(Node, StepMap), StepError> {
    let rp = doc.resolve(pos)?;
    let (Some(before), Some(after)) = (rp.node_before(), rp.node_after()) else {
        return Err(StepError::InvalidJoin(pos));
    };
    if rp.text_offset() != 0 || before.is_leaf() || after.is_leaf() {
        return Err(StepError::InvalidJoin(pos));
    }
    let mut content = before.content().to_vec();
    content.extend_from_slice(after.content());
    let content = finish_children(&before, content);
    schema.check_content(before.kind(), &content)?;
    let joined = before.copy(content);
    let depth = rp.depth();
    let parent = rp.parent();
    let index = rp.index(depth);
    let mut kids = parent.content()[..index - 1].to_vec();
    kids.push(joined);
    kids.extend_from_slice(&parent.content()[index + 1..]);
    schema.check_content(parent.kind(), &kids)?;
    let doc = rebuild(&rp, depth, parent.copy(kids));
    Ok((doc, StepMap::single(pos - 1, 2, 0)))
}

fn wrap(
    doc: &Node,
    schema: &Schema,
    from: usize,
    to: usize,
    wrappers: &[(NodeKind, Attrs)],
) -> Result<(Node, StepMap), StepError> {
    let a = doc.resolve(from)?;
    let b = doc.resolve(to)?;
    if from >= to || !a.same_parent(&b) || a.parent().is_textblock() {
        return Err(StepError::InvalidRange { from, to });
    }
    let depth = a.depth();
    let parent = a.parent();
    let (start, end) = (a.index(depth), b.index(depth));
    let mut inner = parent.content()[start..end].to_vec();
    for (kind, attrs) in wrappers.iter().rev() {
        inner = vec![schema.node(*kind, attrs.clone(), inner)?];
    }
    let mut kids = parent.content()[..start].to_vec();
    kids.extend(inner);
    kids.extend_from_slice(&parent.content()[end..]);
    schema.check_content(parent.kind(), &kids)?;
    let doc = rebuild(&a, depth, parent.copy(kids));
    let n = wrappers.len();
    Ok((doc, StepMap::new(vec![(from, 0, n), (to, 0, n)])))
}

fn unwrap(doc: &Node, schema: &Schema, pos: usize) -> Result<(Node, StepMap), StepError> {
    let (rp, node) = node_at(doc, pos)?;
    if node.is_leaf() {
        return Err(StepError::NoNode(pos));
    }
    let depth = rp.depth();
    let parent = rp.parent();
    let index = rp.index(depth);
    let mut kids = parent.content()[..index].to_vec();
    kids.extend_from_slice(node.content());
    kids.extend_from_slice(&parent.content()[index + 1..]);
    let kids = finish_children(parent, kids);
    schema.check_content(parent.kind(), &kids)?;
    let doc = rebuild(&rp, depth, parent.copy(kids));
    let close = pos + node.node_size() - 1;
    Ok((doc, StepMap::new(vec![(pos, 1, 0), (close, 1, 0)])))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extension::base::rich_schema_spec;

    fn schema() -> Schema {
        Schema::new(rich_schema_spec()).unwrap()
    }

    fn para(schema: &Schema, text: &str) -> Node {
        let content = if text.is_empty() {
            Vec::new()
        } else {
            vec![schema.text(text, Vec::new()).unwrap()]
        };
        schema.node(NodeKind::Paragraph, Attrs::new(), content).unwrap()
    }

    fn doc(schema: &Schema, blocks: Vec<Node>) -> Node {
        schema.node(NodeKind::Doc, Attrs::new(), blocks).unwrap()
    }

    #[test]
    fn test_step_map_maps_around_insertion() {
        let map = StepMap::single(3, 0, 2);
        assert_eq!(map.map(1, Assoc::After), 1);
        assert_eq!(map.map(3, Assoc::Before), 3);
        assert_eq!(map.map(3, Assoc::After), 5);
        assert_eq!(map.map(7, Assoc::After), 9);
    }

    #[test]
    fn test_step_map_collapses_deleted_range() {
        let map = StepMap::single(2, 4, 0);
        assert_eq!(map.map(4, Assoc::After), 2);
        assert_eq!(map.map(8, Assoc::After), 4);
        assert!(map.deletes(4));
        assert!(!map.deletes(2));
    }

    #[test]
    fn test_replace_inserts_text() {
        let schema = schema();
        let d = doc(&schema, vec![para(&schema, "Hllo")]);
        let step = Step::Replace {
            from: 2,
            to: 2,
            content: vec![schema.text("e", Vec::new()).unwrap()],
        };
        let (next, map) = step.apply(&d, &schema).unwrap();
        assert_eq!(next.text_content(), "Hello");
        assert_eq!(next.content()[0].child_count(), 1);
        assert_eq!(map.map(3, Assoc::After), 4);
    }

    #[test]
    fn test_replace_across_blocks_joins_them() {
        let schema = schema();
        let d = doc(&schema, vec![para(&schema, "one"), para(&schema, "two")]);
        // "o|ne" .. "tw|o"
        let (next, map) = Step::Replace {
            from: 2,
            to: 8,
            content: Vec::new(),
        }
        .apply(&d, &schema)
        .unwrap();
        assert_eq!(next.child_count(), 1);
        assert_eq!(next.text_content(), "oo");
        assert_eq!(map.map(8, Assoc::After), 2);
        assert_eq!(map.map(10, Assoc::After), 4);
    }

    #[test]
    fn test_replace_rejects_invalid_content() {
        let schema = schema();
        let d = doc(&schema, vec![para(&schema, "x")]);
        let err = Step::Replace {
            from: 0,
            to: d.content_size(),
            content: Vec::new(),
        }
        .apply(&d, &schema)
        .unwrap_err();
        assert_eq!(err, StepError::Schema(SchemaError::InvalidContent(NodeKind::Doc)));
    }

    #[test]
    fn test_add_and_remove_mark() {
        let schema = schema();
        let d = doc(&schema, vec![para(&schema, "bold")]);
        let (marked, _) = Step::AddMark {
            from: 1,
            to: 3,
            mark: Mark::new(MarkKind::Strong),
        }
        .apply(&d, &schema)
        .unwrap();
        let p = &marked.content()[0];
        assert_eq!(p.child_count(), 2);
        assert_eq!(p.content()[0].marks().len(), 1);
        let (plain, _) = Step::RemoveMark {
            from: 0,
            to: 6,
            kind: MarkKind::Strong,
        }
        .apply(&marked, &schema)
        .unwrap();
        assert_eq!(plain, d);
    }

    #[test]
    fn test_split_and_join_are_inverse() {
        let schema = schema();
        let d = doc(&schema, vec![para(&schema, "abcd")]);
        let (split, map) = Step::Split {
            pos: 3,
            depth: 1,
            types_after: Vec::new(),
        }
        .apply(&d, &schema)
        .unwrap();
        assert_eq!(split.child_count(), 2);
        assert_eq!(split.content()[1].text_content(), "cd");
        assert_eq!(map.map(3, Assoc::After), 5);
        let (joined, _) = Step::Join { pos: 4 }.apply(&split, &schema).unwrap();
        assert_eq!(joined, d);
    }

    #[test]
    fn test_split_with_new_type_after() {
        let schema = schema();
        let heading = schema
            .node(
                NodeKind::Heading,
                crate::attrs! { "level" => 2 },
                vec![schema.text("Title", Vec::new()).unwrap()],
            )
            .unwrap();
        let d = doc(&schema, vec![heading]);
        let (split, _) = Step::Split {
            pos: 6,
            depth: 1,
            types_after: vec![Some((NodeKind::Paragraph, Attrs::new()))],
        }
        .apply(&d, &schema)
        .unwrap();
        assert_eq!(split.content()[0].kind(), NodeKind::Heading);
        assert_eq!(split.content()[1].kind(), NodeKind::Paragraph);
    }

    #[test]
    fn test_wrap_and_unwrap() {
        let schema = schema();
        let d = doc(&schema, vec![para(&schema, "quote")]);
        let (wrapped, map) = Step::Wrap {
            from: 0,
            to: 7,
            wrappers: vec![(NodeKind::Blockquote, Attrs::new())],
        }
        .apply(&d, &schema)
        .unwrap();
        assert_eq!(wrapped.content()[0].kind(), NodeKind::Blockquote);
        assert_eq!(map.map(1, Assoc::After), 2);
        let (unwrapped, _) = Step::Unwrap { pos: 0 }.apply(&wrapped, &schema).unwrap();
        assert_eq!(unwrapped, d);
    }

    #[test]
    fn test_set_attrs_changes_block_type() {
        let schema = schema();
        let d = doc(&schema, vec![para(&schema, "x")]);
        let (next, _) = Step::SetAttrs {
            pos: 0,
            kind: Some(NodeKind::Heading),
            attrs: crate::attrs! { "level" => 3 },
        }
        .apply(&d, &schema)
        .unwrap();
        assert_eq!(next.content()[0].kind(), NodeKind::Heading);
        assert_eq!(next.content()[0].attr_u64("level"), Some(3));
    }
}
