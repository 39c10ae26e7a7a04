//! Controller-level shortcuts.
//!
//! These bindings do not edit the document. They emit an empty transaction
//! tagged with [`meta::ACTION`] and the controller acts on it.

use std::rc::Rc;

use serde::{Deserialize, Serialize};

use super::{Extension, ExtensionProps};
use crate::state::keymap::{Command, Keymap, command};
use crate::state::{Transaction, meta};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyAction {
    New,
    Discard,
    Undo,
    Redo,
    ToggleMarkdown,
}

impl KeyAction {
    pub const fn name(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Discard => "discard",
            Self::Undo => "undo",
            Self::Redo => "redo",
            Self::ToggleMarkdown => "toggle_markdown",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        [
            Self::New,
            Self::Discard,
            Self::Undo,
            Self::Redo,
            Self::ToggleMarkdown,
        ]
        .into_iter()
        .find(|action| action.name() == name)
    }

    /// The action a transaction asks the controller to run.
    pub fn from_transaction(tr: &Transaction) -> Option<Self> {
        tr.get_meta(meta::ACTION)
            .and_then(serde_json::Value::as_str)
            .and_then(Self::from_name)
    }
}

/// Ordered binding → action list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyBindings(pub Vec<(String, KeyAction)>);

impl Default for KeyBindings {
    fn default() -> Self {
        Self(
            [
                ("Ctrl-n", KeyAction::New),
                ("Ctrl-w", KeyAction::Discard),
                ("Ctrl-z", KeyAction::Undo),
                ("Shift-Ctrl-z", KeyAction::Redo),
                ("Ctrl-y", KeyAction::Redo),
                ("Ctrl-m", KeyAction::ToggleMarkdown),
            ]
            .into_iter()
            .map(|(key, action)| (key.to_string(), action))
            .collect(),
        )
    }
}

fn emit(action: KeyAction) -> Command {
    command(move |state| {
        let mut tr = state.tr();
        tr.set_meta(meta::ACTION, action.name());
        Some(tr)
    })
}

pub fn keymap(bindings: &KeyBindings) -> Keymap {
    Keymap::new(
        "custom-keymap",
        bindings
            .0
            .iter()
            .map(|(key, action)| (key.as_str(), emit(*action))),
    )
}

pub fn extension(props: &ExtensionProps) -> Extension {
    let bindings = props.keys.clone();
    Extension::new("custom-keymap").with_plugins(move |mut plugins, _schema| {
        plugins.push(Rc::new(keymap(&bindings)));
        plugins
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extension::tests::rich_state;
    use crate::state::input::KeyEvent;

    #[test]
    fn test_bindings_emit_actions_without_editing() {
        let state = rich_state("keep");
        let keymap = keymap(&KeyBindings::default());
        let tr = keymap.run(&state, &KeyEvent::parse("Ctrl-m")).unwrap();
        assert!(!tr.doc_changed());
        assert_eq!(KeyAction::from_transaction(&tr), Some(KeyAction::ToggleMarkdown));
        let redo = keymap.run(&state, &KeyEvent::parse("Shift-Ctrl-z")).unwrap();
        assert_eq!(KeyAction::from_transaction(&redo), Some(KeyAction::Redo));
    }

    #[test]
    fn test_action_names_round_trip() {
        for (_, action) in KeyBindings::default().0 {
            assert_eq!(KeyAction::from_name(action.name()), Some(action));
        }
    }
}
