//! Input events and input rules.
//!
//! Events are plain values. Modifier state travels on the event itself, so
//! a handler never has to consult global key-tracking state.

use std::fmt;
use std::rc::Rc;

use regex::{Captures, Regex};

use super::{EditorState, Selection};
use super::plugin::Plugin;
use super::transaction::Transaction;
use super::view::NodeViewEvent;
use crate::document::{Attrs, Mark, MarkKind, NodeKind};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub alt: bool,
    pub ctrl: bool,
    pub meta: bool,
    pub shift: bool,
}

/// A key press, named like `"Enter"`, `"a"`, `"ArrowUp"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEvent {
    pub key: String,
    pub modifiers: Modifiers,
}

impl KeyEvent {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            modifiers: Modifiers::default(),
        }
    }

    /// Parse a binding such as `"Shift-Ctrl-z"` or `"Mod-Enter"`.
    /// `Mod` means Ctrl.
    pub fn parse(binding: &str) -> Self {
        let mut parts: Vec<&str> = binding.split('-').collect();
        // A binding for the minus key ends in an empty segment.
        let mut key = parts.pop().unwrap_or_default().to_string();
        if key.is_empty() {
            parts.pop();
            key = "-".to_string();
        }
        let mut modifiers = Modifiers::default();
        for part in parts {
            match part {
                "Alt" | "a" => modifiers.alt = true,
                "Ctrl" | "Control" | "c" | "Mod" | "Cmd" => modifiers.ctrl = true,
                "Meta" | "m" => modifiers.meta = true,
                "Shift" | "s" => modifiers.shift = true,
                _ => {}
            }
        }
        Self { key, modifiers }
    }

    /// Canonical binding name: modifiers in `Alt-Ctrl-Meta-Shift-` order.
    pub fn name(&self) -> String {
        let mut out = String::new();
        if self.modifiers.alt {
            out.push_str("Alt-");
        }
        if self.modifiers.ctrl {
            out.push_str("Ctrl-");
        }
        if self.modifiers.meta {
            out.push_str("Meta-");
        }
        if self.modifiers.shift {
            out.push_str("Shift-");
        }
        out.push_str(&self.key);
        out
    }
}

impl fmt::Display for KeyEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Clipboard payload. `shift` is true when Shift was held during paste.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PasteEvent {
    pub text: Option<String>,
    pub html: Option<String>,
    pub shift: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    Key(KeyEvent),
    KeyUp(KeyEvent),
    Text(String),
    Paste(PasteEvent),
    Click { pos: usize },
    Drop { pos: usize, text: String },
    DragOver { pos: Option<usize> },
    MoveBlock { from: usize, to: usize },
    NodeView { pos: usize, event: NodeViewEvent },
}

type RuleHandler = dyn Fn(&EditorState, &Captures<'_>, usize, usize) -> Option<Transaction>;

/// A pattern matched against the textblock text before the cursor,
/// including the text being typed. Patterns should end in `$`.
#[derive(Clone)]
pub struct InputRule {
    pattern: Regex,
    handler: Rc<RuleHandler>,
}

impl fmt::Debug for InputRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputRule")
            .field("pattern", &self.pattern.as_str())
            .finish_non_exhaustive()
    }
}

const MAX_MATCH: usize = 500;

impl InputRule {
    pub fn new(
        pattern: Regex,
        handler: impl Fn(&EditorState, &Captures<'_>, usize, usize) -> Option<Transaction> + 'static,
    ) -> Self {
        Self {
            pattern,
            handler: Rc::new(handler),
        }
    }

    /// Replace the matched text with a fixed string. With a capture group,
    /// only the group is replaced.
    pub fn text(pattern: Regex, replacement: &'static str) -> Self {
        Self::new(pattern, move |state, caps, from, to| {
            let whole = caps.get(0)?;
            let (start, insert) = match caps.get(1) {
                Some(group) => {
                    let lead = &whole.as_str()[..group.start() - whole.start()];
                    let suffix = &whole.as_str()[group.end() - whole.start()..];
                    (from + lead.chars().count(), format!("{replacement}{suffix}"))
                }
                None => (from, replacement.to_string()),
            };
            let mut tr = state.tr();
            tr.insert_text(&insert, start, to).ok()?;
            Some(tr)
        })
    }

    /// Replace the match with capture group 1 carrying `kind`. Typing
    /// continues without the mark.
    pub fn mark(pattern: Regex, kind: MarkKind) -> Self {
        Self::new(pattern, move |state, caps, from, to| {
            let schema = state.schema();
            let mark = schema.mark(kind, Attrs::new()).ok()?;
            let rp = state.doc().resolve(from).ok()?;
            let text = schema.text(&caps[1], mark.add_to_set(&rp.marks())).ok()?;
            let end = from + text.node_size();
            let mut tr = state.tr();
            tr.replace(from, to, vec![text]).ok()?;
            tr.set_selection(Selection::cursor(end));
            tr.set_stored_marks(Some(Mark::remove_from_set(kind, &rp.marks())));
            Some(tr)
        })
    }

    /// Turn the textblock into `kind` when the pattern matches at its start.
    pub fn textblock_type(
        pattern: Regex,
        kind: NodeKind,
        attrs: impl Fn(&Captures<'_>) -> Attrs + 'static,
    ) -> Self {
        Self::new(pattern, move |state, caps, from, to| {
            let rp = state.doc().resolve(from).ok()?;
            let depth = rp.depth();
            if rp.parent_offset() != 0 || !state.schema().has_node(kind) {
                return None;
            }
            let mut tr = state.tr();
            tr.delete(from, to).ok()?;
            tr.set_node_markup(rp.before(depth), Some(kind), attrs(caps)).ok()?;
            Some(tr)
        })
    }

    /// Wrap the textblock in `kind` when the pattern matches at its start.
    /// `join` decides whether the new wrapper merges into an equal node
    /// directly before it.
    pub fn wrapping(
        pattern: Regex,
        wrappers: impl Fn(&Captures<'_>) -> Vec<(NodeKind, Attrs)> + 'static,
        join: impl Fn(&Captures<'_>, &crate::document::Node) -> bool + 'static,
    ) -> Self {
        Self::new(pattern, move |state, caps, from, to| {
            let wrappers = wrappers(caps);
            if wrappers.iter().any(|(kind, _)| !state.schema().has_node(*kind)) {
                return None;
            }
            let rp = state.doc().resolve(from).ok()?;
            if rp.parent_offset() != 0 || rp.depth() == 0 {
                return None;
            }
            let mut tr = state.tr();
            tr.delete(from, to).ok()?;
            let rp = tr.doc().resolve(from).ok()?;
            let depth = rp.depth();
            let (start, end) = (rp.before(depth), rp.after(depth));
            let outer = wrappers.first().map(|(kind, _)| *kind);
            tr.wrap(start, end, wrappers).ok()?;
            // Merge into a preceding wrapper of the same type.
            let rp = tr.doc().resolve(start).ok()?;
            if let Some(before) = rp.node_before()
                && Some(before.kind()) == outer
                && join(caps, &before)
            {
                let _ = tr.join(start);
            }
            Some(tr)
        })
    }

    pub fn pattern(&self) -> &Regex {
        &self.pattern
    }
}

/// Plugin running a list of input rules on typed text.
#[derive(Debug)]
pub struct InputRules {
    key: &'static str,
    rules: Vec<InputRule>,
}

impl InputRules {
    pub const fn new(key: &'static str, rules: Vec<InputRule>) -> Self {
        Self { key, rules }
    }
}

impl Plugin for InputRules {
    fn key(&self) -> &'static str {
        self.key
    }

    fn handle_text_input(
        &self,
        state: &EditorState,
        from: usize,
        to: usize,
        text: &str,
    ) -> Option<Transaction> {
        let rp = state.doc().resolve(from).ok()?;
        let parent = rp.parent();
        let code = state
            .schema()
            .node_spec(parent.kind())
            .is_some_and(|spec| spec.code);
        if code || !parent.is_textblock() {
            return None;
        }
        let start = rp.start(rp.depth());
        let offset = rp.parent_offset();
        let skip = offset.saturating_sub(MAX_MATCH);
        let mut before = state
            .doc()
            .text_between(start + skip, from, "", "\u{fffc}");
        before.push_str(text);
        for rule in &self.rules {
            let Some(caps) = rule.pattern.captures(&before) else {
                continue;
            };
            let Some(whole) = caps.get(0) else {
                continue;
            };
            let matched = whole.as_str().chars().count();
            let typed = text.chars().count();
            let Some(match_from) = (from + typed).checked_sub(matched) else {
                continue;
            };
            // Insert the typed text first so the handler sees a document
            // holding the full match.
            let mut typed_state_tr = state.tr();
            typed_state_tr.insert_text(text, from, to).ok()?;
            let typed_state = state.apply(&typed_state_tr);
            if let Some(rule_tr) = (rule.handler)(&typed_state, &caps, match_from, from + typed) {
                let mut tr = typed_state_tr;
                for step in rule_tr.steps() {
                    tr.step(step.clone()).ok()?;
                }
                if rule_tr.selection_set() {
                    tr.set_selection(rule_tr.selection());
                }
                if rule_tr.stored_marks_set() {
                    tr.set_stored_marks(rule_tr.stored_marks().map(<[_]>::to_vec));
                }
                return Some(tr);
            }
        }
        None
    }
}
