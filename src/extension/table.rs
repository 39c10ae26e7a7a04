//! Tables with a head section, a body section, and a structural keymap.
//!
//! The keymap is placed ahead of every other plugin. Commands return `None`
//! outside tables, so the base keymap still handles those keys.

use std::rc::Rc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use super::Extension;
use crate::document::{Attrs, Group, Node, NodeKind, NodeSpec, ResolvedPos};
use crate::state::commands::insert_paragraph_after;
use crate::state::input::{InputRule, InputRules};
use crate::state::keymap::{Command, Keymap, command};
use crate::state::{Assoc, EditorState, Selection};

static TABLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\|{2,}\s$").unwrap());

fn cell_spec() -> NodeSpec {
    NodeSpec::new("inline*")
        .group(Group::TableBlock)
        .isolating()
        .attr("style", Some(Value::Null))
}

/// Cursor inside a table cell. Depths relative to the cell: row `- 1`,
/// section `- 2`, table `- 3`.
struct CellCursor {
    rp: ResolvedPos,
    depth: usize,
}

impl CellCursor {
    fn at(state: &EditorState) -> Option<Self> {
        if !state.selection().is_empty(state.doc()) {
            return None;
        }
        let rp = state.doc().resolve(state.selection().head()?).ok()?;
        let depth = rp.depth();
        let in_cell = matches!(rp.parent().kind(), NodeKind::TableCell | NodeKind::TableHeader);
        if !in_cell || depth < 4 || rp.node(depth - 3).kind() != NodeKind::Table {
            return None;
        }
        Some(Self { rp, depth })
    }

    fn cell(&self) -> &Node {
        self.rp.parent()
    }

    fn row(&self) -> &Node {
        self.rp.node(self.depth - 1)
    }

    fn section(&self) -> &Node {
        self.rp.node(self.depth - 2)
    }

    fn table(&self) -> &Node {
        self.rp.node(self.depth - 3)
    }

    fn in_head(&self) -> bool {
        self.section().kind() == NodeKind::TableHead
    }

    fn row_pos(&self) -> usize {
        self.rp.before(self.depth - 1)
    }

    /// Every row of the table with its position, head first.
    fn rows(&self) -> Vec<(usize, Node)> {
        let start = self.rp.start(self.depth - 3);
        let mut out = Vec::new();
        self.table().for_each_child(|section, offset, _| {
            let section_start = start + offset + 1;
            section.for_each_child(|row, row_offset, _| {
                out.push((section_start + row_offset, row.clone()));
            });
        });
        out
    }
}

/// Content start and content size of each cell in the row at `row_pos`.
fn cells(row_pos: usize, row: &Node) -> Vec<(usize, usize)> {
    let mut out = Vec::with_capacity(row.child_count());
    row.for_each_child(|cell, offset, _| out.push((row_pos + 1 + offset + 1, cell.content_size())));
    out
}

/// An empty body row shaped like `like`.
fn empty_row(state: &EditorState, like: &Node) -> Option<Node> {
    let schema = state.schema();
    let cells = like
        .content()
        .iter()
        .map(|cell| schema.node(NodeKind::TableCell, cell.attrs().clone(), Vec::new()))
        .collect::<Result<Vec<_>, _>>()
        .ok()?;
    schema.node(NodeKind::TableRow, Attrs::new(), cells).ok()
}

/// Enter adds a row below, or at the top of the body from the head.
fn add_row() -> Command {
    command(|state| {
        let cur = CellCursor::at(state)?;
        let row = empty_row(state, cur.row())?;
        let mut tr = state.tr();
        if cur.in_head() {
            let table_start = cur.rp.start(cur.depth - 3);
            let mut body = None;
            cur.table().for_each_child(|section, offset, _| {
                if section.kind() == NodeKind::TableBody {
                    body = Some(table_start + offset);
                }
            });
            let target = match body {
                Some(body) => {
                    tr.replace(body + 1, body + 1, vec![row]).ok()?;
                    body + 1
                }
                None => {
                    let section = state.schema().node(NodeKind::TableBody, Attrs::new(), vec![row]).ok()?;
                    let after = cur.rp.after(cur.depth - 2);
                    tr.replace(after, after, vec![section]).ok()?;
                    after + 1
                }
            };
            tr.set_selection(Selection::near(tr.doc(), target + 2, Assoc::After));
            return Some(tr);
        }
        let target = cur.rp.after(cur.depth - 1);
        tr.replace(target, target, vec![row]).ok()?;
        tr.set_selection(Selection::near(tr.doc(), target + 2, Assoc::After));
        Some(tr)
    })
}

/// Mod-Enter leaves the table into a new paragraph below it.
fn exit_table() -> Command {
    command(|state| {
        let cur = CellCursor::at(state)?;
        let mut tr = state.tr();
        insert_paragraph_after(&mut tr, cur.rp.after(cur.depth - 3))?;
        Some(tr)
    })
}

/// Backspace inside a table cell.
///
/// In an empty cell it moves to the previous cell, then removes an empty body
/// row, then an empty table. At the start of a filled cell it is consumed
/// with an empty transaction, so the default join never merges two cells.
/// Anywhere else it falls through to the default handler.
fn backspace() -> Command {
    command(|state| {
        let cur = CellCursor::at(state)?;
        if cur.cell().content_size() > 0 {
            return (cur.rp.parent_offset() == 0).then(|| state.tr());
        }
        let cell_before = cur.rp.before(cur.depth);
        if cur.rp.index(cur.depth - 1) > 0 {
            let mut tr = state.tr();
            tr.set_selection(Selection::near(state.doc(), cell_before - 1, Assoc::Before));
            return Some(tr);
        }
        let mut tr = state.tr();
        if !cur.in_head() && cur.row().text_content().is_empty() {
            let row_pos = cur.row_pos();
            if cur.section().child_count() > 1 {
                tr.delete(row_pos, row_pos + cur.row().node_size()).ok()?;
            } else {
                let section_pos = cur.rp.before(cur.depth - 2);
                tr.delete(section_pos, section_pos + cur.section().node_size()).ok()?;
            }
            let target = tr.map_pos(row_pos, Assoc::Before);
            tr.set_selection(Selection::near(tr.doc(), target, Assoc::Before));
            return Some(tr);
        }
        if cur.table().text_content().is_empty() {
            let table_pos = cur.rp.before(cur.depth - 3);
            let para = state.schema().node(NodeKind::Paragraph, Attrs::new(), Vec::new()).ok()?;
            tr.replace(table_pos, table_pos + cur.table().node_size(), vec![para]).ok()?;
            tr.set_selection(Selection::cursor(table_pos + 1));
            return Some(tr);
        }
        Some(tr)
    })
}

/// Move to the same column one row up or down, keeping the offset when the
/// target cell is long enough.
fn vertical(up: bool) -> Command {
    command(move |state| {
        let cur = CellCursor::at(state)?;
        let rows = cur.rows();
        let index = rows.iter().position(|(pos, _)| *pos == cur.row_pos())?;
        let target = if up { index.checked_sub(1) } else { Some(index + 1) };
        let mut tr = state.tr();
        if let Some((row_pos, row)) = target.and_then(|i| rows.get(i)) {
            let targets = cells(*row_pos, row);
            let column = cur.rp.index(cur.depth - 1).min(targets.len().checked_sub(1)?);
            let (start, size) = targets[column];
            tr.set_selection(Selection::cursor(start + cur.rp.parent_offset().min(size)));
            return Some(tr);
        }
        let table_pos = cur.rp.before(cur.depth - 3);
        let table_end = cur.rp.after(cur.depth - 3);
        if up {
            if table_pos == 0 && cur.rp.parent_offset() == 0 {
                let para = state.schema().node(NodeKind::Paragraph, Attrs::new(), Vec::new()).ok()?;
                tr.replace(0, 0, vec![para]).ok()?;
                tr.set_selection(Selection::cursor(1));
            } else if table_pos == 0 {
                tr.set_selection(Selection::cursor(cur.rp.start(cur.depth)));
            } else {
                tr.set_selection(Selection::near(state.doc(), table_pos, Assoc::Before));
            }
        } else if table_end >= state.doc().content_size() {
            insert_paragraph_after(&mut tr, table_end)?;
        } else {
            tr.set_selection(Selection::near(state.doc(), table_end, Assoc::After));
        }
        Some(tr)
    })
}

/// Tab moves to the next cell, adding a row after the last one.
/// Shift-Tab moves back and stops at the first cell.
fn cell_step(forward: bool) -> Command {
    command(move |state| {
        let cur = CellCursor::at(state)?;
        let all: Vec<(usize, usize)> = cur
            .rows()
            .iter()
            .flat_map(|(pos, row)| cells(*pos, row))
            .collect();
        let here = all.iter().position(|(start, _)| *start == cur.rp.start(cur.depth))?;
        let next = if forward { Some(here + 1) } else { here.checked_sub(1) };
        let mut tr = state.tr();
        match next.and_then(|i| all.get(i)) {
            Some(&(start, size)) => {
                tr.set_selection(Selection::cursor(start + size));
            }
            None if forward => return add_row()(state),
            None => {}
        }
        Some(tr)
    })
}

pub fn keymap() -> Keymap {
    Keymap::new(
        "table-keymap",
        [
            ("Mod-Enter", exit_table()),
            ("Backspace", backspace()),
            ("Enter", add_row()),
            ("ArrowUp", vertical(true)),
            ("ArrowDown", vertical(false)),
            ("Tab", cell_step(true)),
            ("Shift-Tab", cell_step(false)),
        ],
    )
}

/// `||| ` creates a table with one column per extra bar.
fn table_rule() -> InputRule {
    InputRule::new(TABLE.clone(), |state, caps, from, _to| {
        let schema = state.schema();
        if !schema.has_node(NodeKind::Table) {
            return None;
        }
        let columns = caps[0].trim().len().checked_sub(1)?;
        let row = |kind| -> Option<Node> {
            let cells = (0..columns)
                .map(|_| schema.node(kind, Attrs::new(), Vec::new()))
                .collect::<Result<Vec<_>, _>>()
                .ok()?;
            schema.node(NodeKind::TableRow, Attrs::new(), cells).ok()
        };
        let head = schema.node(NodeKind::TableHead, Attrs::new(), vec![row(NodeKind::TableHeader)?]).ok()?;
        let body = schema.node(NodeKind::TableBody, Attrs::new(), vec![row(NodeKind::TableCell)?]).ok()?;
        let table = schema.node(NodeKind::Table, Attrs::new(), vec![head, body]).ok()?;
        let rp = state.doc().resolve(from).ok()?;
        let depth = rp.depth();
        let start = rp.before(depth);
        let mut tr = state.tr();
        tr.replace(start, rp.after(depth), vec![table]).ok()?;
        tr.set_selection(Selection::near(tr.doc(), start + 4, Assoc::After));
        Some(tr)
    })
}

pub fn extension() -> Extension {
    Extension::new("table")
        .with_schema(|spec| {
            spec.append_nodes([
                (
                    NodeKind::Table,
                    NodeSpec::new("(table_head | table_body)*")
                        .group(Group::Block)
                        .isolating(),
                ),
                (
                    NodeKind::TableHead,
                    NodeSpec::new("table_row").group(Group::TableBlock).isolating(),
                ),
                (
                    NodeKind::TableBody,
                    NodeSpec::new("table_row+").group(Group::TableBlock).isolating(),
                ),
                (NodeKind::TableRow, NodeSpec::new("(table_cell | table_header)*")),
                (NodeKind::TableCell, cell_spec()),
                (NodeKind::TableHeader, cell_spec()),
            ])
        })
        .with_plugins(|plugins, _schema| {
            let mut out: Vec<crate::state::PluginRef> = Vec::with_capacity(plugins.len() + 2);
            out.push(Rc::new(keymap()));
            out.extend(plugins);
            out.push(Rc::new(InputRules::new("table", vec![table_rule()])));
            out
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extension::tests::{rich_composition, rich_state, state_from_markdown};
    use crate::state::input::{InputEvent, KeyEvent, Modifiers};

    const SOURCE: &str = "| a | b |\n|---|--:|\n| c | d |\n";

    fn at(state: &EditorState, pos: usize) -> EditorState {
        let mut tr = state.tr();
        tr.set_selection(Selection::cursor(pos));
        state.apply(&tr)
    }

    fn press(state: &EditorState, key: KeyEvent) -> EditorState {
        let view = rich_composition().view;
        state.apply(&view.handle_input(state, &InputEvent::Key(key)).unwrap())
    }

    fn key(name: &str) -> KeyEvent {
        KeyEvent::new(name)
    }

    fn body(state: &EditorState) -> Node {
        state.doc().content()[0].content()[1].clone()
    }

    fn empty_table() -> EditorState {
        let view = rich_composition().view;
        "||| ".chars().fold(rich_state(""), |state, ch| {
            state.apply(&view.handle_input(&state, &InputEvent::Text(ch.to_string())).unwrap())
        })
    }

    #[test]
    fn test_bars_create_table() {
        let state = empty_table();
        let table = &state.doc().content()[0];
        assert_eq!(table.kind(), NodeKind::Table);
        assert_eq!(table.child_count(), 2);
        assert_eq!(table.content()[0].content()[0].child_count(), 2);
        assert_eq!(state.selection(), Selection::cursor(4));
    }

    #[test]
    fn test_enter_in_body_adds_row_below() {
        let state = press(&at(&state_from_markdown(SOURCE), 15), key("Enter"));
        assert_eq!(body(&state).child_count(), 2);
        assert_eq!(state.selection(), Selection::cursor(22));
    }

    #[test]
    fn test_enter_in_head_adds_row_at_body_start() {
        let state = press(&at(&state_from_markdown(SOURCE), 5), key("Enter"));
        let body = body(&state);
        assert_eq!(body.child_count(), 2);
        assert_eq!(body.content()[0].text_content(), "");
        assert_eq!(body.content()[1].text_content(), "cd");
        assert_eq!(state.selection(), Selection::cursor(14));
    }

    #[test]
    fn test_new_row_keeps_column_alignment() {
        let state = press(&at(&state_from_markdown(SOURCE), 15), key("Enter"));
        let body = body(&state);
        let row = &body.content()[1];
        assert_eq!(row.content()[1].attrs(), body.content()[0].content()[1].attrs());
    }

    #[test]
    fn test_arrow_down_moves_to_same_column() {
        let state = press(&at(&state_from_markdown(SOURCE), 5), key("ArrowDown"));
        assert_eq!(state.selection(), Selection::cursor(15));
        let state = press(&state, key("ArrowUp"));
        assert_eq!(state.selection(), Selection::cursor(5));
    }

    #[test]
    fn test_arrow_up_from_first_row_opens_paragraph_above() {
        let state = press(&at(&state_from_markdown(SOURCE), 4), key("ArrowUp"));
        assert_eq!(state.doc().content()[0].kind(), NodeKind::Paragraph);
        assert_eq!(state.selection(), Selection::cursor(1));
    }

    #[test]
    fn test_mod_enter_leaves_table() {
        let ctrl_enter = KeyEvent {
            key: "Enter".to_string(),
            modifiers: Modifiers {
                ctrl: true,
                ..Modifiers::default()
            },
        };
        let state = press(&at(&state_from_markdown(SOURCE), 15), ctrl_enter);
        assert_eq!(state.doc().child_count(), 2);
        assert_eq!(state.selection(), Selection::cursor(23));
    }

    #[test]
    fn test_backspace_walks_back_and_removes_empty_table() {
        let state = at(&empty_table(), 14);
        let state = press(&state, key("Backspace"));
        assert_eq!(state.selection(), Selection::cursor(12));
        let state = press(&state, key("Backspace"));
        assert_eq!(state.doc().content()[0].child_count(), 1);
        assert_eq!(state.selection(), Selection::cursor(6));
        let state = press(&state, key("Backspace"));
        assert_eq!(state.selection(), Selection::cursor(4));
        let state = press(&state, key("Backspace"));
        assert_eq!(state.doc().content()[0].kind(), NodeKind::Paragraph);
        assert!(state.doc().is_empty_doc());
    }

    #[test]
    fn test_backspace_at_start_of_filled_cell_keeps_cells_apart() {
        let before = at(&state_from_markdown(SOURCE), 17);
        let state = press(&before, key("Backspace"));
        assert_eq!(state.doc(), before.doc());
        assert_eq!(state.selection(), Selection::cursor(17));
    }

    #[test]
    fn test_tab_moves_between_cells() {
        let state = press(&empty_table(), key("Tab"));
        assert_eq!(state.selection(), Selection::cursor(6));
        let shift_tab = KeyEvent {
            key: "Tab".to_string(),
            modifiers: Modifiers {
                shift: true,
                ..Modifiers::default()
            },
        };
        let state = press(&state, shift_tab);
        assert_eq!(state.selection(), Selection::cursor(4));
    }

    #[test]
    fn test_tab_in_last_cell_appends_row() {
        let state = press(&at(&empty_table(), 14), key("Tab"));
        assert_eq!(body(&state).child_count(), 2);
        assert_eq!(state.selection(), Selection::cursor(18));
    }

    #[test]
    fn test_keys_outside_table_fall_back() {
        let state = press(&rich_state("ab"), key("Enter"));
        assert_eq!(state.doc().child_count(), 2);
    }
}
