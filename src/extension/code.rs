//! Inline code and code block conveniences.

use std::rc::Rc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use super::Extension;
use crate::document::{Mark, MarkKind, NodeKind};
use crate::state::commands::insert_paragraph_after;
use crate::state::input::{InputRule, InputRules};
use crate::state::keymap::{Command, Keymap, command};

static INLINE_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?:`)([^`]+)(?:`)$").unwrap());

fn inline_code_rule() -> InputRule {
    InputRule::mark(INLINE_CODE.clone(), MarkKind::Code)
}

/// ArrowRight at the end of inline code stops typing in code.
fn escape_inline_code() -> Command {
    command(|state| {
        let pos = state.selection().head()?;
        if !state.selection().is_empty(state.doc()) {
            return None;
        }
        let rp = state.doc().resolve(pos).ok()?;
        let before_code = rp
            .node_before()
            .is_some_and(|n| n.marks().iter().any(|m| m.kind() == MarkKind::Code));
        let after_code = rp
            .node_after()
            .is_some_and(|n| n.marks().iter().any(|m| m.kind() == MarkKind::Code));
        let stored = state.stored_marks().map_or_else(|| rp.marks(), <[Mark]>::to_vec);
        if !before_code || after_code || !stored.iter().any(|m| m.kind() == MarkKind::Code) {
            return None;
        }
        let mut tr = state.tr();
        tr.set_stored_marks(Some(Mark::remove_from_set(MarkKind::Code, &stored)));
        Some(tr)
    })
}

/// ArrowDown at the end of a trailing code block opens a paragraph below.
fn escape_code_block() -> Command {
    command(|state| {
        let pos = state.selection().head()?;
        let rp = state.doc().resolve(pos).ok()?;
        let parent = rp.parent();
        if parent.kind() != NodeKind::CodeBlock
            || rp.parent_offset() != parent.content_size()
            || rp.depth() != 1
            || rp.index(0) + 1 != state.doc().child_count()
        {
            return None;
        }
        let mut tr = state.tr();
        insert_paragraph_after(&mut tr, rp.after(1))?;
        Some(tr)
    })
}

pub fn keymap() -> Keymap {
    Keymap::new(
        "code",
        [
            ("ArrowRight", escape_inline_code()),
            ("ArrowDown", escape_code_block()),
        ],
    )
}

pub fn extension() -> Extension {
    Extension::new("code")
        .with_schema(|spec| {
            let Some(code_block) = spec.node(NodeKind::CodeBlock).cloned() else {
                return spec;
            };
            spec.update_node(
                NodeKind::CodeBlock,
                code_block
                    .attr("src", Some(Value::Null))
                    .attr("title", Some(Value::Null)),
            )
        })
        .with_plugins(|mut plugins, _schema| {
            plugins.push(Rc::new(keymap()));
            plugins.push(Rc::new(InputRules::new("code", vec![inline_code_rule()])));
            plugins
        })
}

#[cfg(test)]
mod tests {
    use crate::extension::tests::{rich_composition, rich_state, state_from_markdown};
    use crate::markdown::serialize;
    use crate::state::EditorState;
    use crate::state::Selection;
    use crate::state::input::{InputEvent, KeyEvent};

    fn input(state: &EditorState, event: InputEvent) -> EditorState {
        let view = rich_composition().view;
        state.apply(&view.handle_input(state, &event).unwrap())
    }

    fn type_text(state: &EditorState, text: &str) -> EditorState {
        text.chars()
            .fold(state.clone(), |s, ch| input(&s, InputEvent::Text(ch.to_string())))
    }

    #[test]
    fn test_backticks_make_inline_code() {
        let state = type_text(&rich_state(""), "run `ls` now");
        assert_eq!(serialize(state.doc()), "run `ls` now\n");
        let para = &state.doc().content()[0];
        assert_eq!(para.child_count(), 3);
    }

    #[test]
    fn test_arrow_right_leaves_inline_code() {
        let state = state_from_markdown("`ls`\n");
        let mut tr = state.tr();
        tr.set_selection(Selection::cursor(3));
        let state = state.apply(&tr);
        let state = input(&state, InputEvent::Key(KeyEvent::new("ArrowRight")));
        let state = type_text(&state, "x");
        assert_eq!(serialize(state.doc()), "`ls`x\n");
    }

    #[test]
    fn test_arrow_down_leaves_trailing_code_block() {
        let state = state_from_markdown("```\ncode\n```\n");
        let mut tr = state.tr();
        tr.set_selection(Selection::cursor(5));
        let state = state.apply(&tr);
        let state = input(&state, InputEvent::Key(KeyEvent::new("ArrowDown")));
        assert_eq!(state.doc().child_count(), 2);
        assert_eq!(state.selection(), Selection::cursor(7));
    }
}
