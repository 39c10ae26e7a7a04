//! Key bindings.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use super::EditorState;
use super::input::KeyEvent;
use super::plugin::Plugin;
use super::transaction::Transaction;

/// A command inspects a state and, when applicable, returns the transaction
/// that performs it.
pub type Command = Rc<dyn Fn(&EditorState) -> Option<Transaction>>;

pub fn command(f: impl Fn(&EditorState) -> Option<Transaction> + 'static) -> Command {
    Rc::new(f)
}

/// Try each command in turn; the first that applies wins.
pub fn chain(commands: Vec<Command>) -> Command {
    Rc::new(move |state| commands.iter().find_map(|cmd| cmd(state)))
}

/// Plugin mapping normalized key names to commands.
pub struct Keymap {
    key: &'static str,
    bindings: HashMap<String, Command>,
}

impl fmt::Debug for Keymap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.bindings.keys().collect();
        names.sort();
        f.debug_struct("Keymap")
            .field("key", &self.key)
            .field("bindings", &names)
            .finish()
    }
}

impl Keymap {
    pub fn new<'a>(key: &'static str, bindings: impl IntoIterator<Item = (&'a str, Command)>) -> Self {
        let mut map = HashMap::new();
        for (binding, cmd) in bindings {
            map.insert(KeyEvent::parse(binding).name(), cmd);
        }
        Self { key, bindings: map }
    }

    pub fn binds(&self, binding: &str) -> bool {
        self.bindings.contains_key(&KeyEvent::parse(binding).name())
    }

    pub fn run(&self, state: &EditorState, key: &KeyEvent) -> Option<Transaction> {
        let cmd = self.bindings.get(&key.name())?;
        cmd(state)
    }
}

impl Plugin for Keymap {
    fn key(&self) -> &'static str {
        self.key
    }

    fn handle_key(&self, state: &EditorState, key: &KeyEvent) -> Option<Transaction> {
        self.run(state, key)
    }
}
