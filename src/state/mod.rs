//! Immutable editor state advanced by transactions.
//!
//! - [`EditorState`]: document, selection, schema, plugins, and plugin state
//! - [`Transaction`]: steps plus selection and metadata, built from a state
//! - [`EditorState::apply`]: pure transition to the next state

pub mod commands;
pub mod history;
pub mod input;
pub mod keymap;
mod plugin;
mod selection;
mod step;
mod transaction;
pub mod view;

pub use plugin::{Plugin, PluginRef, PluginState, state_as};
pub use selection::Selection;
pub use step::{Assoc, Step, StepError, StepMap};
pub use transaction::{Transaction, meta};

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use serde_json::{Value, json};

use crate::document::{Mark, Node, Schema, SchemaError};

#[derive(Clone)]
pub struct EditorState {
    doc: Node,
    selection: Selection,
    schema: Rc<Schema>,
    plugins: Rc<[PluginRef]>,
    plugin_states: HashMap<&'static str, PluginState>,
    stored_marks: Option<Vec<Mark>>,
}

impl fmt::Debug for EditorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EditorState")
            .field("doc", &self.doc)
            .field("selection", &self.selection)
            .field("plugins", &self.plugin_keys())
            .finish_non_exhaustive()
    }
}

impl EditorState {
    /// Create a state. Without `doc` the schema's empty document is used.
    pub fn create(
        schema: Rc<Schema>,
        plugins: Vec<PluginRef>,
        doc: Option<Node>,
        selection: Option<Selection>,
    ) -> Result<Self, SchemaError> {
        let doc = match doc {
            Some(doc) => {
                schema.check(&doc)?;
                doc
            }
            None => schema.empty_doc()?,
        };
        let selection = selection.map_or_else(|| Selection::at_start(&doc), |s| s.resolve(&doc));
        let plugin_states = plugins
            .iter()
            .filter_map(|p| p.init(&schema, &doc).map(|state| (p.key(), state)))
            .collect();
        Ok(Self {
            doc,
            selection,
            schema,
            plugins: plugins.into(),
            plugin_states,
            stored_marks: None,
        })
    }

    /// Rebuild a state from its JSON form (`{doc, selection}`).
    pub fn from_json(schema: Rc<Schema>, plugins: Vec<PluginRef>, value: &Value) -> Result<Self, SchemaError> {
        let doc_json = value
            .get("doc")
            .ok_or_else(|| SchemaError::Malformed("state without `doc`".into()))?;
        let doc = schema.node_from_json(doc_json)?;
        let selection = value
            .get("selection")
            .map(|sel| Selection::from_json(sel, &doc));
        Self::create(schema, plugins, Some(doc), selection)
    }

    pub fn to_json(&self) -> Value {
        json!({
            "doc": self.doc.to_json(),
            "selection": self.selection.to_json(),
        })
    }

    pub const fn doc(&self) -> &Node {
        &self.doc
    }

    pub const fn selection(&self) -> Selection {
        self.selection
    }

    pub fn schema(&self) -> &Rc<Schema> {
        &self.schema
    }

    pub fn plugins(&self) -> &[PluginRef] {
        &self.plugins
    }

    pub fn plugin_keys(&self) -> Vec<&'static str> {
        self.plugins.iter().map(|p| p.key()).collect()
    }

    pub fn plugin_state(&self, key: &str) -> Option<&PluginState> {
        self.plugin_states.get(key)
    }

    pub fn stored_marks(&self) -> Option<&[Mark]> {
        self.stored_marks.as_deref()
    }

    /// Start a transaction against this state.
    pub fn tr(&self) -> Transaction {
        Transaction::new(
            self.doc.clone(),
            self.selection,
            Rc::clone(&self.schema),
            self.stored_marks.clone(),
        )
    }

    /// Produce the next state. `self` is left untouched.
    #[must_use]
    pub fn apply(&self, tr: &Transaction) -> Self {
        let doc = tr.doc().clone();
        let selection = tr.selection().resolve(&doc);
        let plugin_states = self
            .plugins
            .iter()
            .filter_map(|plugin| {
                let key = plugin.key();
                self.plugin_states
                    .get(key)
                    .map(|value| (key, plugin.apply(tr, value, self)))
            })
            .collect();
        Self {
            doc,
            selection,
            schema: Rc::clone(&self.schema),
            plugins: Rc::clone(&self.plugins),
            plugin_states,
            stored_marks: tr.stored_marks().map(<[Mark]>::to_vec),
        }
    }

    /// Re-express this state's document under a new schema and plugin set.
    /// Plugin state is kept for keys present in both plugin lists.
    pub fn reconfigure(&self, schema: Rc<Schema>, plugins: Vec<PluginRef>) -> Result<Self, SchemaError> {
        let doc = schema.node_from_json(&self.doc.to_json())?;
        let selection = self.selection.resolve(&doc);
        let plugin_states = plugins
            .iter()
            .filter_map(|plugin| {
                let key = plugin.key();
                match self.plugin_states.get(key) {
                    Some(value) => Some((key, Rc::clone(value))),
                    None => plugin.init(&schema, &doc).map(|state| (key, state)),
                }
            })
            .collect();
        Ok(Self {
            doc,
            selection,
            schema,
            plugins: plugins.into(),
            plugin_states,
            stored_marks: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Attrs, NodeKind};
    use crate::extension::base::{plain_schema_spec, rich_schema_spec};

    struct Counter;

    impl Plugin for Counter {
        fn key(&self) -> &'static str {
            "counter"
        }

        fn init(&self, _schema: &Schema, _doc: &Node) -> Option<PluginState> {
            Some(Rc::new(0_u32))
        }

        fn apply(&self, tr: &Transaction, value: &PluginState, _old: &EditorState) -> PluginState {
            let n = state_as::<u32>(value).copied().unwrap_or(0);
            Rc::new(if tr.doc_changed() { n + 1 } else { n })
        }
    }

    fn state() -> EditorState {
        let schema = Rc::new(Schema::new(rich_schema_spec()).unwrap());
        EditorState::create(schema, vec![Rc::new(Counter)], None, None).unwrap()
    }

    #[test]
    fn test_create_places_cursor_in_first_paragraph() {
        let state = state();
        assert!(state.doc().is_empty_doc());
        assert_eq!(state.selection(), Selection::cursor(1));
    }

    #[test]
    fn test_apply_is_pure() {
        let state = state();
        let before = state.doc().clone();
        let mut tr = state.tr();
        tr.insert_text("Hello", 1, 1).unwrap();
        let next = state.apply(&tr);
        assert_eq!(state.doc(), &before);
        assert_eq!(state.selection(), Selection::cursor(1));
        assert_eq!(next.doc().text_content(), "Hello");
        assert_eq!(next.selection(), Selection::cursor(6));
    }

    #[test]
    fn test_plugin_state_advances() {
        let state = state();
        let mut tr = state.tr();
        tr.insert_text("a", 1, 1).unwrap();
        let next = state.apply(&tr);
        let count = next.plugin_state("counter").and_then(state_as::<u32>).copied();
        assert_eq!(count, Some(1));
        let unchanged = next.apply(&next.tr());
        let count = unchanged.plugin_state("counter").and_then(state_as::<u32>).copied();
        assert_eq!(count, Some(1));
    }

    #[test]
    fn test_reconfigure_keeps_content_and_plugin_state() {
        let state = state();
        let mut tr = state.tr();
        tr.insert_text("keep", 1, 1).unwrap();
        let state = state.apply(&tr);
        let plain = Rc::new(Schema::new(plain_schema_spec()).unwrap());
        let next = state.reconfigure(plain, vec![Rc::new(Counter)]).unwrap();
        assert_eq!(next.doc().text_content(), "keep");
        let count = next.plugin_state("counter").and_then(state_as::<u32>).copied();
        assert_eq!(count, Some(1));
    }

    #[test]
    fn test_reconfigure_rejects_incompatible_content() {
        let schema = Rc::new(Schema::new(rich_schema_spec()).unwrap());
        let rule = schema
            .node(NodeKind::HorizontalRule, Attrs::new(), Vec::new())
            .unwrap();
        let doc = schema.node(NodeKind::Doc, Attrs::new(), vec![rule]).unwrap();
        let state = EditorState::create(schema, Vec::new(), Some(doc), None).unwrap();
        let plain = Rc::new(Schema::new(plain_schema_spec()).unwrap());
        assert!(state.reconfigure(plain, Vec::new()).is_err());
    }

    #[test]
    fn test_json_round_trip() {
        let state = state();
        let mut tr = state.tr();
        tr.insert_text("json", 1, 1).unwrap();
        let state = state.apply(&tr);
        let restored =
            EditorState::from_json(Rc::clone(state.schema()), Vec::new(), &state.to_json()).unwrap();
        assert_eq!(restored.doc(), state.doc());
        assert_eq!(restored.selection(), state.selection());
    }
}
