//! Editing commands.
//!
//! Every command is a function from a state to an optional transaction;
//! `None` means "not applicable here" so keymaps can fall through.

use super::keymap::{Command, command};
use super::selection::Selection;
use super::step::Assoc;
use super::transaction::Transaction;
use super::EditorState;
use crate::document::{Attrs, Mark, MarkKind, Node, NodeKind, ResolvedPos};

fn cursor(state: &EditorState) -> Option<ResolvedPos> {
    match state.selection() {
        Selection::Text { anchor, head } if anchor == head => state.doc().resolve(head).ok(),
        _ => None,
    }
}

fn is_code(state: &EditorState, kind: NodeKind) -> bool {
    state.schema().node_spec(kind).is_some_and(|spec| spec.code)
}

const fn is_list(kind: NodeKind) -> bool {
    matches!(kind, NodeKind::BulletList | NodeKind::OrderedList)
}

pub fn insert_text(text: &str) -> Command {
    let text = text.to_string();
    command(move |state| {
        let from = state.selection().from();
        let to = state.selection().to(state.doc());
        let mut tr = state.tr();
        if matches!(state.selection(), Selection::All | Selection::Node { .. }) {
            tr.delete_selection().ok()?;
            let at = tr.selection().from();
            tr.insert_text(&text, at, at).ok()?;
        } else {
            tr.insert_text(&text, from, to).ok()?;
        }
        Some(tr)
    })
}

pub fn delete_selection() -> Command {
    command(|state| {
        if state.selection().is_empty(state.doc()) {
            return None;
        }
        let mut tr = state.tr();
        tr.delete_selection().ok()?;
        Some(tr)
    })
}

/// Delete one character before an in-block cursor.
pub fn delete_char_backward() -> Command {
    command(|state| {
        let rp = cursor(state)?;
        if rp.parent_offset() == 0 {
            return None;
        }
        let mut tr = state.tr();
        tr.delete(rp.pos - 1, rp.pos).ok()?;
        Some(tr)
    })
}

pub fn delete_char_forward() -> Command {
    command(|state| {
        let rp = cursor(state)?;
        if rp.parent_offset() >= rp.parent().content_size() {
            return None;
        }
        let mut tr = state.tr();
        tr.delete(rp.pos, rp.pos + 1).ok()?;
        Some(tr)
    })
}

/// Position at the end of the last textblock inside `node`, where `end` is
/// the position right after `node`.
fn last_textblock_end(node: &Node, end: usize) -> Option<usize> {
    let mut node = node;
    let mut pos = end - 1;
    while !node.is_textblock() {
        node = node.last_child()?;
        if node.is_leaf() {
            return None;
        }
        pos -= 1;
    }
    Some(pos)
}

fn first_textblock_start(node: &Node, start: usize) -> Option<usize> {
    let mut node = node;
    let mut pos = start + 1;
    while !node.is_textblock() {
        node = node.first_child()?;
        if node.is_leaf() {
            return None;
        }
        pos += 1;
    }
    Some(pos)
}

/// Backspace at the start of a textblock: lift out of a wrapper, delete a
/// leaf block before, or join with the previous textblock.
pub fn join_backward() -> Command {
    command(|state| {
        let rp = cursor(state)?;
        if rp.parent_offset() != 0 || rp.depth() == 0 {
            return None;
        }
        let depth = rp.depth();
        // First child of a list item or blockquote: lift instead.
        if depth >= 2 && rp.index(depth - 1) == 0 {
            let wrapper = rp.node(depth - 1).kind();
            if matches!(wrapper, NodeKind::ListItem | NodeKind::TodoItem) {
                return lift_list_item(wrapper)(state);
            }
            if wrapper == NodeKind::Blockquote {
                let mut tr = state.tr();
                tr.unwrap_node(rp.before(depth - 1)).ok()?;
                return Some(tr);
            }
        }
        let d = (0..depth).rev().find(|&d| rp.index(d) > 0)?;
        let container = rp.node(d);
        let prev = container.child(rp.index(d) - 1)?;
        let prev_end = rp.before(d + 1);
        let mut tr = state.tr();
        if prev.is_leaf() {
            tr.delete(prev_end - prev.node_size(), prev_end).ok()?;
            return Some(tr);
        }
        if prev.kind() == NodeKind::Table {
            return None;
        }
        let target = last_textblock_end(prev, prev_end)?;
        tr.delete(target, rp.pos).ok()?;
        tr.set_selection(Selection::cursor(target));
        Some(tr)
    })
}

/// Delete at the end of a textblock: join with the following one.
pub fn join_forward() -> Command {
    command(|state| {
        let rp = cursor(state)?;
        if rp.depth() == 0 || rp.parent_offset() != rp.parent().content_size() {
            return None;
        }
        let depth = rp.depth();
        let d = (0..depth)
            .rev()
            .find(|&d| rp.index(d) + 1 < rp.node(d).child_count())?;
        let next = rp.node(d).child(rp.index(d) + 1)?;
        let next_start = rp.after(d + 1);
        let mut tr = state.tr();
        if next.is_leaf() {
            tr.delete(next_start, next_start + next.node_size()).ok()?;
            return Some(tr);
        }
        if next.kind() == NodeKind::Table {
            return None;
        }
        let target = first_textblock_start(next, next_start)?;
        tr.delete(rp.pos, target).ok()?;
        Some(tr)
    })
}

/// Split the textblock at the cursor. Splitting at the end of a heading
/// (or any non-paragraph textblock) continues with a paragraph.
pub fn split_block() -> Command {
    command(|state| {
        let mut tr = state.tr();
        if !state.selection().is_empty(state.doc()) {
            tr.delete_selection().ok()?;
        }
        let pos = tr.selection().head()?;
        let rp = tr.doc().resolve(pos).ok()?;
        let parent = rp.parent();
        if !parent.is_textblock()
            || matches!(parent.kind(), NodeKind::TableCell | NodeKind::TableHeader)
        {
            return None;
        }
        let at_end = rp.parent_offset() == parent.content_size();
        let after = (at_end && parent.kind() != NodeKind::Paragraph)
            .then(|| (NodeKind::Paragraph, Attrs::new()));
        tr.split(pos, 1, vec![after]).ok()?;
        tr.set_selection(Selection::cursor(pos + 2));
        Some(tr)
    })
}

/// Split a list item (or todo item) at the cursor. In an empty item the
/// item is lifted out of its list instead.
pub fn split_list_item(kind: NodeKind) -> Command {
    command(move |state| {
        let rp = cursor(state)?;
        let depth = rp.depth();
        if depth < 2 || rp.node(depth - 1).kind() != kind || !rp.parent().is_textblock() {
            return None;
        }
        if rp.parent().content_size() == 0 && rp.node(depth - 1).child_count() == 1 {
            return lift_list_item(kind)(state);
        }
        let parent = rp.parent();
        let at_end = rp.parent_offset() == parent.content_size();
        let inner = (at_end && parent.kind() != NodeKind::Paragraph)
            .then(|| (NodeKind::Paragraph, Attrs::new()));
        let item = (kind == NodeKind::TodoItem).then(|| (kind, crate::attrs! { "done" => false }));
        let mut tr = state.tr();
        tr.split(rp.pos, 2, vec![inner, item]).ok()?;
        tr.set_selection(Selection::cursor(rp.pos + 4));
        Some(tr)
    })
}

/// Move the item at the cursor out of its list: into the outer list when
/// nested, otherwise into the list's parent.
pub fn lift_list_item(kind: NodeKind) -> Command {
    command(move |state| {
        let rp = cursor(state).or_else(|| state.doc().resolve(state.selection().from()).ok())?;
        let di = rp.find_ancestor(|n| n.kind() == kind)?;
        if di == 0 {
            return None;
        }
        let item = rp.node(di);
        let item_start = rp.before(di);
        let offset_in_item = rp.pos - item_start;
        let dl = di - 1;
        let list = rp.node(dl);
        let mut tr = state.tr();

        if !is_list(list.kind()) {
            tr.unwrap_node(item_start).ok()?;
            return Some(tr);
        }

        let index = rp.index(dl);
        let items_before = &list.content()[..index];
        let items_after = &list.content()[index + 1..];
        let nested = dl >= 1 && rp.node(dl - 1).kind() == kind;

        if nested {
            // Becomes the next sibling of the outer item; later siblings
            // move along as its own sublist.
            let outer = rp.node(dl - 1);
            let outer_start = rp.before(dl - 1);
            let list_index = rp.index(dl - 1);
            let mut outer_kids = outer.content()[..list_index].to_vec();
            if !items_before.is_empty() {
                outer_kids.push(list.copy(items_before.to_vec()));
            }
            outer_kids.extend_from_slice(&outer.content()[list_index + 1..]);
            let left = outer.copy(outer_kids);
            let mut item_kids = item.content().to_vec();
            if !items_after.is_empty() {
                item_kids.push(list.copy(items_after.to_vec()));
            }
            let lifted = item.copy(item_kids);
            let new_item_start = outer_start + left.node_size();
            tr.replace(outer_start, rp.after(dl - 1), vec![left, lifted]).ok()?;
            tr.set_selection(Selection::cursor(new_item_start + offset_in_item));
            return Some(tr);
        }

        let list_start = rp.before(dl);
        let mut blocks = Vec::new();
        if !items_before.is_empty() {
            blocks.push(list.copy(items_before.to_vec()));
        }
        let head = blocks.iter().map(Node::node_size).sum::<usize>();
        blocks.extend_from_slice(item.content());
        if !items_after.is_empty() {
            blocks.push(list.copy(items_after.to_vec()));
        }
        tr.replace(list_start, rp.after(dl), blocks).ok()?;
        tr.set_selection(Selection::cursor(list_start + head + offset_in_item - 1));
        Some(tr)
    })
}

/// Nest the item at the cursor under its previous sibling.
pub fn sink_list_item(kind: NodeKind) -> Command {
    command(move |state| {
        let rp = cursor(state)?;
        let di = rp.find_ancestor(|n| n.kind() == kind)?;
        if di == 0 {
            return None;
        }
        let dl = di - 1;
        let list = rp.node(dl);
        let index = rp.index(dl);
        if !is_list(list.kind()) || index == 0 {
            return None;
        }
        let item = rp.node(di).clone();
        let prev = list.child(index - 1)?;
        let item_start = rp.before(di);
        let prev_start = item_start - prev.node_size();
        let (new_prev, shift) = match prev.last_child() {
            Some(sub) if sub.kind() == list.kind() => {
                let mut sub_kids = sub.content().to_vec();
                sub_kids.push(item);
                let sub = sub.copy(sub_kids);
                (prev.replace_child(prev.child_count() - 1, sub), 2)
            }
            _ => {
                let mut kids = prev.content().to_vec();
                kids.push(list.copy(vec![item]));
                (prev.copy(kids), 0)
            }
        };
        let mut tr = state.tr();
        tr.replace(prev_start, rp.after(di), vec![new_prev]).ok()?;
        tr.set_selection(Selection::cursor(rp.pos - shift));
        Some(tr)
    })
}

pub fn select_all() -> Command {
    command(|state| {
        let mut tr = state.tr();
        tr.set_selection(Selection::All);
        Some(tr)
    })
}

/// Add or remove a mark over the selection, or toggle it in the stored
/// marks for an empty selection.
pub fn toggle_mark(kind: MarkKind, attrs: Attrs) -> Command {
    command(move |state| {
        if !state.schema().has_mark(kind) {
            return None;
        }
        let mark = state.schema().mark(kind, attrs.clone()).ok()?;
        let doc = state.doc();
        let (from, to) = (state.selection().from(), state.selection().to(doc));
        let mut tr = state.tr();
        if from == to {
            let rp = doc.resolve(from).ok()?;
            let current = state.stored_marks().map_or_else(|| rp.marks(), <[Mark]>::to_vec);
            let next = if current.iter().any(|m| m.kind() == kind) {
                Mark::remove_from_set(kind, &current)
            } else {
                mark.add_to_set(&current)
            };
            tr.set_stored_marks(Some(next));
            return Some(tr);
        }
        let mut everywhere = true;
        let mut any_text = false;
        doc.nodes_between(from, to, &mut |node, _, _| {
            if node.is_text() {
                any_text = true;
                everywhere &= node.marks().iter().any(|m| m.kind() == kind);
            }
            true
        });
        if !any_text {
            return None;
        }
        if everywhere {
            tr.remove_mark(from, to, kind).ok()?;
        } else {
            tr.add_mark(from, to, mark).ok()?;
        }
        Some(tr)
    })
}

/// Change every textblock touched by the selection to `kind`.
pub fn set_block_type(kind: NodeKind, attrs: Attrs) -> Command {
    command(move |state| {
        if !state.schema().has_node(kind) {
            return None;
        }
        let doc = state.doc();
        let (from, to) = (state.selection().from(), state.selection().to(doc));
        let mut targets = Vec::new();
        doc.nodes_between(from, to, &mut |node, pos, _| {
            if node.is_textblock() {
                let same = node.kind() == kind && attrs.iter().all(|(k, v)| node.attrs().get(k) == Some(v));
                if !same {
                    targets.push(pos);
                }
                return false;
            }
            true
        });
        if targets.is_empty() {
            return None;
        }
        let mut tr = state.tr();
        for pos in targets {
            tr.set_node_markup(pos, Some(kind), attrs.clone()).ok()?;
        }
        Some(tr)
    })
}

/// Block range around the selection: positions before the first and after
/// the last sibling block it touches.
fn block_range(state: &EditorState) -> Option<(usize, usize)> {
    let doc = state.doc();
    let (from, to) = (state.selection().from(), state.selection().to(doc));
    let a = doc.resolve(from).ok()?;
    let b = doc.resolve(to).ok()?;
    let mut shared = a.shared_depth(to);
    if a.node(shared).is_textblock() {
        shared = shared.checked_sub(1)?;
    }
    if a.depth() <= shared || b.depth() <= shared {
        return None;
    }
    Some((a.before(shared + 1), b.after(shared + 1)))
}

/// Wrap the selected blocks in `wrappers` (outermost first).
pub fn wrap_in(wrappers: Vec<(NodeKind, Attrs)>) -> Command {
    command(move |state| {
        let (start, end) = block_range(state)?;
        let mut tr = state.tr();
        tr.wrap(start, end, wrappers.clone()).ok()?;
        Some(tr)
    })
}

pub fn wrap_in_list(kind: NodeKind, attrs: Attrs) -> Command {
    wrap_in(vec![(kind, attrs), (NodeKind::ListItem, Attrs::new())])
}

/// Lift the selected blocks out of their wrapper node.
pub fn lift() -> Command {
    command(|state| {
        let rp = state.doc().resolve(state.selection().from()).ok()?;
        let depth = rp.find_ancestor(|n| {
            matches!(n.kind(), NodeKind::Blockquote | NodeKind::ListItem | NodeKind::TodoItem)
        })?;
        let kind = rp.node(depth).kind();
        if kind == NodeKind::Blockquote {
            let mut tr = state.tr();
            tr.unwrap_node(rp.before(depth)).ok()?;
            return Some(tr);
        }
        lift_list_item(kind)(state)
    })
}

/// Insert a newline inside code blocks.
pub fn new_line_in_code() -> Command {
    command(|state| {
        let rp = cursor(state)?;
        if !is_code(state, rp.parent().kind()) {
            return None;
        }
        let mut tr = state.tr();
        tr.insert_text("\n", rp.pos, rp.pos).ok()?;
        Some(tr)
    })
}

/// Insert a hard break (a newline in code).
pub fn hard_break() -> Command {
    command(|state| {
        let rp = state.doc().resolve(state.selection().from()).ok()?;
        if is_code(state, rp.parent().kind()) {
            return new_line_in_code()(state);
        }
        let node = state
            .schema()
            .node(NodeKind::HardBreak, Attrs::new(), Vec::new())
            .ok()?;
        let mut tr = state.tr();
        tr.replace_selection_with(node).ok()?;
        Some(tr)
    })
}

/// Move the cursor by `delta` positions, snapping to valid text positions.
pub fn move_cursor(delta: isize) -> Command {
    command(move |state| {
        let head = match state.selection() {
            Selection::Text { head, .. } => head,
            Selection::Node { pos } => pos,
            Selection::All => return None,
        };
        let target = head.checked_add_signed(delta)?;
        if target > state.doc().content_size() {
            return None;
        }
        let bias = if delta < 0 { Assoc::Before } else { Assoc::After };
        let mut tr = state.tr();
        tr.set_selection(Selection::near(state.doc(), target, bias));
        Some(tr)
    })
}

/// Insert a paragraph after the node at `pos` and put the cursor in it.
pub fn insert_paragraph_after(tr: &mut Transaction, after: usize) -> Option<()> {
    let para = tr
        .schema()
        .node(NodeKind::Paragraph, Attrs::new(), Vec::new())
        .ok()?;
    tr.replace(after, after, vec![para]).ok()?;
    tr.set_selection(Selection::cursor(after + 1));
    Some(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extension::tests::{rich_state, state_from_markdown};
    use crate::markdown::serialize;

    fn run(cmd: &Command, state: &EditorState) -> EditorState {
        let tr = cmd(state).expect("command should apply");
        state.apply(&tr)
    }

    fn at(state: &EditorState, pos: usize) -> EditorState {
        let mut tr = state.tr();
        tr.set_selection(Selection::cursor(pos));
        state.apply(&tr)
    }

    #[test]
    fn test_split_block_then_join_backward() {
        let state = at(&rich_state("abcd"), 3);
        let split = run(&split_block(), &state);
        assert_eq!(serialize(split.doc()), "ab\n\ncd\n");
        assert_eq!(split.selection(), Selection::cursor(5));
        let joined = run(&join_backward(), &split);
        assert_eq!(serialize(joined.doc()), "abcd\n");
        assert_eq!(joined.selection(), Selection::cursor(3));
    }

    #[test]
    fn test_split_heading_at_end_makes_paragraph() {
        let state = state_from_markdown("# Title\n");
        let state = at(&state, 6);
        let next = run(&split_block(), &state);
        assert_eq!(next.doc().content()[1].kind(), NodeKind::Paragraph);
    }

    #[test]
    fn test_join_forward_merges_next_block() {
        let state = state_from_markdown("ab\n\ncd\n");
        let state = at(&state, 3);
        let next = run(&join_forward(), &state);
        assert_eq!(serialize(next.doc()), "abcd\n");
    }

    #[test]
    fn test_split_list_item_creates_sibling() {
        let state = state_from_markdown("* one\n");
        // doc > bullet_list(0) > list_item(1) > paragraph(2) > "one"(3..6)
        let state = at(&state, 6);
        let next = run(&split_list_item(NodeKind::ListItem), &state);
        let list = &next.doc().content()[0];
        assert_eq!(list.child_count(), 2);
        assert_eq!(next.selection(), Selection::cursor(10));
    }

    #[test]
    fn test_enter_in_empty_item_lifts_it() {
        let state = state_from_markdown("* one\n");
        let state = at(&state, 6);
        let split = run(&split_list_item(NodeKind::ListItem), &state);
        let lifted = run(&split_list_item(NodeKind::ListItem), &split);
        assert_eq!(lifted.doc().child_count(), 2);
        assert_eq!(lifted.doc().content()[1].kind(), NodeKind::Paragraph);
        assert_eq!(lifted.selection(), Selection::cursor(10));
    }

    #[test]
    fn test_sink_and_lift_list_item() {
        let state = state_from_markdown("* one\n* two\n");
        // second item paragraph content starts at 10
        let state = at(&state, 10);
        let sunk = run(&sink_list_item(NodeKind::ListItem), &state);
        assert_eq!(sunk.doc().content()[0].child_count(), 1);
        assert_eq!(serialize(sunk.doc()), "* one\n  * two\n");
        let lifted = run(&lift_list_item(NodeKind::ListItem), &sunk);
        assert_eq!(serialize(lifted.doc()), "* one\n* two\n");
    }

    #[test]
    fn test_toggle_mark_on_range() {
        let state = rich_state("bold");
        let mut tr = state.tr();
        tr.set_selection(Selection::Text { anchor: 1, head: 5 });
        let state = state.apply(&tr);
        let on = run(&toggle_mark(MarkKind::Strong, Attrs::new()), &state);
        assert_eq!(serialize(on.doc()), "**bold**\n");
        let off = run(&toggle_mark(MarkKind::Strong, Attrs::new()), &on);
        assert_eq!(serialize(off.doc()), "bold\n");
    }

    #[test]
    fn test_toggle_mark_on_cursor_sets_stored_marks() {
        let state = at(&rich_state("x"), 2);
        let next = run(&toggle_mark(MarkKind::Em, Attrs::new()), &state);
        assert_eq!(next.stored_marks().map(<[Mark]>::len), Some(1));
        let typed = run(&insert_text("y"), &next);
        assert_eq!(serialize(typed.doc()), "x*y*\n");
    }

    #[test]
    fn test_set_block_type_and_wrap() {
        let state = at(&rich_state("text"), 2);
        let heading = run(&set_block_type(NodeKind::Heading, crate::attrs! { "level" => 2 }), &state);
        assert_eq!(serialize(heading.doc()), "## text\n");
        let quoted = run(&wrap_in(vec![(NodeKind::Blockquote, Attrs::new())]), &state);
        assert_eq!(serialize(quoted.doc()), "> text\n");
        let listed = run(&wrap_in_list(NodeKind::BulletList, Attrs::new()), &state);
        assert_eq!(serialize(listed.doc()), "* text\n");
    }

    #[test]
    fn test_hard_break_and_code_newline() {
        let state = at(&rich_state("ab"), 2);
        let next = run(&hard_break(), &state);
        assert_eq!(serialize(next.doc()), "a\\\nb\n");
        let code = state_from_markdown("```\nx\n```\n");
        let code = at(&code, 2);
        let next = run(&hard_break(), &code);
        assert_eq!(next.doc().text_content(), "x\n");
    }

    #[test]
    fn test_select_all_then_delete() {
        let state = rich_state("everything");
        let all = run(&select_all(), &state);
        let cleared = run(&delete_selection(), &all);
        assert!(cleared.doc().is_empty_doc());
        assert!(delete_selection()(&cleared).is_none());
    }

    #[test]
    fn test_backspace_after_rule_deletes_it() {
        let state = state_from_markdown("---\n\nafter\n");
        // rule(0..1) paragraph(1..) content starts at 2
        let state = at(&state, 2);
        let next = run(&join_backward(), &state);
        assert_eq!(serialize(next.doc()), "after\n");
    }

    #[test]
    fn test_move_cursor_skips_structure() {
        let state = state_from_markdown("a\n\nb\n");
        let state = at(&state, 2);
        let next = run(&move_cursor(1), &state);
        assert_eq!(next.selection(), Selection::cursor(4));
    }
}
