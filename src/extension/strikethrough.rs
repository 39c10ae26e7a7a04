//! The `~~strikethrough~~` mark.

use std::rc::Rc;

use once_cell::sync::Lazy;
use regex::Regex;

use super::Extension;
use crate::document::{Attrs, MarkKind, MarkSpec};
use crate::state::commands::toggle_mark;
use crate::state::input::{InputRule, InputRules};
use crate::state::keymap::Keymap;

static STRIKETHROUGH: Lazy<Regex> = Lazy::new(|| Regex::new(r"~~([^~]+)~~$").unwrap());

pub fn extension() -> Extension {
    Extension::new("strikethrough")
        .with_schema(|spec| spec.append_mark(MarkKind::Strikethrough, MarkSpec::new()))
        .with_plugins(|mut plugins, _schema| {
            plugins.push(Rc::new(Keymap::new(
                "strikethrough-keymap",
                [("Mod-d", toggle_mark(MarkKind::Strikethrough, Attrs::new()))],
            )));
            plugins.push(Rc::new(InputRules::new(
                "strikethrough",
                vec![InputRule::mark(STRIKETHROUGH.clone(), MarkKind::Strikethrough)],
            )));
            plugins
        })
}

#[cfg(test)]
mod tests {
    use crate::extension::tests::{rich_composition, rich_state};
    use crate::markdown::serialize;
    use crate::state::EditorState;
    use crate::state::Selection;
    use crate::state::input::{InputEvent, KeyEvent, Modifiers};

    fn type_text(state: &EditorState, text: &str) -> EditorState {
        let view = rich_composition().view;
        text.chars().fold(state.clone(), |state, ch| {
            let tr = view
                .handle_input(&state, &InputEvent::Text(ch.to_string()))
                .unwrap();
            state.apply(&tr)
        })
    }

    #[test]
    fn test_tildes_strike_text() {
        let state = type_text(&rich_state(""), "a ~~old~~ new");
        assert_eq!(serialize(state.doc()), "a ~~old~~ new\n");
        assert_eq!(state.doc().content()[0].child_count(), 3);
    }

    #[test]
    fn test_mod_d_toggles_strikethrough() {
        let state = rich_state("gone");
        let mut tr = state.tr();
        tr.set_selection(Selection::Text { anchor: 1, head: 5 });
        let state = state.apply(&tr);
        let key = KeyEvent {
            key: "d".to_string(),
            modifiers: Modifiers {
                ctrl: true,
                ..Modifiers::default()
            },
        };
        let view = rich_composition().view;
        let next = state.apply(&view.handle_input(&state, &InputEvent::Key(key)).unwrap());
        assert_eq!(serialize(next.doc()), "~~gone~~\n");
    }
}
