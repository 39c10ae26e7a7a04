//! Extensions: independent contributions of schema, plugins, and node
//! views, composed by folding over an ordered list.
//!
//! The [`registry`] decides which extensions make up each editing mode.
//! Everything here is a pure function of its inputs, so composing the same
//! list twice yields equal schemas and plugin key lists.

pub mod appearance;
pub mod base;
pub mod code;
pub mod collab;
pub mod custom_keymap;
pub mod drag_handle;
pub mod image;
pub mod link;
pub mod markdown_rules;
pub mod paste_markdown;
pub mod placeholder;
pub mod registry;
pub mod scroll;
pub mod strikethrough;
pub mod table;
pub mod todo_list;

pub use custom_keymap::{KeyAction, KeyBindings};
pub use registry::create_extensions;

use std::fmt;
use std::rc::Rc;

use serde_json::Value;

use crate::collab::CollabHandle;
use crate::config::Config;
use crate::document::{Node, NodeKind, Schema, SchemaError, SchemaSpec};
use crate::state::view::{EditorView, NodeViewRef};
use crate::state::{EditorState, PluginRef, Selection};

type SchemaFn = Rc<dyn Fn(SchemaSpec) -> SchemaSpec>;
type PluginsFn = Rc<dyn Fn(Vec<PluginRef>, &Rc<Schema>) -> Vec<PluginRef>>;

/// A capability record. Any part may be absent.
#[derive(Clone)]
pub struct Extension {
    name: &'static str,
    schema: Option<SchemaFn>,
    plugins: Option<PluginsFn>,
    node_views: Vec<(NodeKind, NodeViewRef)>,
}

impl fmt::Debug for Extension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extension")
            .field("name", &self.name)
            .field("schema", &self.schema.is_some())
            .field("plugins", &self.plugins.is_some())
            .field(
                "node_views",
                &self.node_views.iter().map(|(k, _)| *k).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Extension {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            schema: None,
            plugins: None,
            node_views: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_schema(mut self, f: impl Fn(SchemaSpec) -> SchemaSpec + 'static) -> Self {
        self.schema = Some(Rc::new(f));
        self
    }

    #[must_use]
    pub fn with_plugins(
        mut self,
        f: impl Fn(Vec<PluginRef>, &Rc<Schema>) -> Vec<PluginRef> + 'static,
    ) -> Self {
        self.plugins = Some(Rc::new(f));
        self
    }

    #[must_use]
    pub fn with_node_view(mut self, kind: NodeKind, view: NodeViewRef) -> Self {
        self.node_views.push((kind, view));
        self
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }
}

/// Inputs the registry derives the extension list from.
#[derive(Debug, Clone, Default)]
pub struct ExtensionProps {
    pub config: Config,
    pub markdown: bool,
    pub path: Option<String>,
    pub keys: KeyBindings,
    pub collab: Option<CollabHandle>,
}

/// Fold schema contributions left to right.
pub fn fold_schema_spec(extensions: &[Extension]) -> SchemaSpec {
    extensions
        .iter()
        .filter_map(|ext| ext.schema.as_ref())
        .fold(SchemaSpec::new(), |spec, f| f(spec))
}

pub fn fold_plugins(extensions: &[Extension], schema: &Rc<Schema>) -> Vec<PluginRef> {
    extensions
        .iter()
        .filter_map(|ext| ext.plugins.as_ref())
        .fold(Vec::new(), |plugins, f| f(plugins, schema))
}

/// Schema, plugins, and view built from one extension list.
#[derive(Clone)]
pub struct Composition {
    pub schema: Rc<Schema>,
    pub plugins: Vec<PluginRef>,
    pub view: EditorView,
}

impl fmt::Debug for Composition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Composition")
            .field("plugins", &self.plugin_keys())
            .field("view", &self.view)
            .finish_non_exhaustive()
    }
}

impl Composition {
    pub fn new(extensions: &[Extension]) -> Result<Self, SchemaError> {
        let schema = Rc::new(Schema::new(fold_schema_spec(extensions))?);
        let plugins = fold_plugins(extensions, &schema);
        let view = EditorView::new(extensions.iter().flat_map(|ext| ext.node_views.iter().cloned()));
        Ok(Self {
            schema,
            plugins,
            view,
        })
    }

    pub fn plugin_keys(&self) -> Vec<&'static str> {
        self.plugins.iter().map(|p| p.key()).collect()
    }

    /// A state holding `doc`, or an empty document.
    pub fn state(&self, doc: Option<Node>) -> Result<EditorState, SchemaError> {
        EditorState::create(Rc::clone(&self.schema), self.plugins.clone(), doc, None)
    }

    /// A state rebuilt from serialized `{doc, selection}` JSON.
    pub fn state_from_json(&self, value: &Value) -> Result<EditorState, SchemaError> {
        EditorState::from_json(Rc::clone(&self.schema), self.plugins.clone(), value)
    }

    /// Carry `state` over to this composition, resetting the selection
    /// to the document start.
    pub fn reconfigure(&self, state: &EditorState) -> Result<EditorState, SchemaError> {
        let next = state.reconfigure(Rc::clone(&self.schema), self.plugins.clone())?;
        let mut tr = next.tr();
        tr.set_selection(Selection::at_start(next.doc()));
        Ok(next.apply(&tr))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::document::Attrs;
    use crate::markdown;

    pub(crate) fn rich_props() -> ExtensionProps {
        ExtensionProps::default()
    }

    pub(crate) fn rich_composition() -> Composition {
        Composition::new(&create_extensions(&rich_props())).unwrap()
    }

    /// Rich-text state with one paragraph holding `text`, cursor at its end.
    pub(crate) fn rich_state(text: &str) -> EditorState {
        let composition = rich_composition();
        let schema = &composition.schema;
        let content = if text.is_empty() {
            Vec::new()
        } else {
            vec![schema.text(text, Vec::new()).unwrap()]
        };
        let para = schema.node(NodeKind::Paragraph, Attrs::new(), content).unwrap();
        let doc = schema.node(NodeKind::Doc, Attrs::new(), vec![para]).unwrap();
        let end = 1 + text.chars().count();
        EditorState::create(
            Rc::clone(schema),
            composition.plugins.clone(),
            Some(doc),
            Some(Selection::cursor(end)),
        )
        .unwrap()
    }

    pub(crate) fn state_from_markdown(source: &str) -> EditorState {
        let composition = rich_composition();
        let doc = markdown::parse(&composition.schema, source);
        composition.state(Some(doc)).unwrap()
    }

    #[test]
    fn test_schema_fold_is_deterministic() {
        let extensions = create_extensions(&rich_props());
        assert_eq!(fold_schema_spec(&extensions), fold_schema_spec(&extensions));
        let again = create_extensions(&rich_props());
        assert_eq!(fold_schema_spec(&extensions), fold_schema_spec(&again));
    }

    #[test]
    fn test_plugin_order_is_deterministic() {
        let a = rich_composition();
        let b = rich_composition();
        assert_eq!(a.plugin_keys(), b.plugin_keys());
        assert_eq!(a.schema, b.schema);
    }

    #[test]
    fn test_later_schema_contribution_replaces_earlier() {
        let first = Extension::new("first").with_schema(|_| base::plain_schema_spec());
        let second = Extension::new("second").with_schema(|spec| {
            spec.update_node(
                NodeKind::Paragraph,
                crate::document::NodeSpec::new("text*").group(crate::document::Group::Block),
            )
        });
        let spec = fold_schema_spec(&[first, second]);
        assert_eq!(spec.node(NodeKind::Paragraph).unwrap().content, "text*");
    }

    #[test]
    fn test_reconfigure_resets_selection() {
        let state = rich_state("hello");
        let markdown = Composition::new(&create_extensions(&ExtensionProps {
            markdown: true,
            ..ExtensionProps::default()
        }))
        .unwrap();
        let next = markdown.reconfigure(&state).unwrap();
        assert_eq!(next.selection(), Selection::cursor(1));
        assert_eq!(next.doc().text_content(), "hello");
    }
}
