//! Node and mark specs, schema folding, and validation.

use std::collections::HashMap;

use serde_json::Value;
use thiserror::Error;

use super::content::ContentExpr;
use super::node::{Attrs, Mark, MarkKind, Node, NodeKind, normalize_inline};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("unknown node type `{0}`")]
    UnknownNodeType(String),
    #[error("unknown mark type `{0}`")]
    UnknownMarkType(String),
    #[error("node type `{0}` is not enabled in this schema")]
    NodeNotInSchema(NodeKind),
    #[error("mark type `{0}` is not enabled in this schema")]
    MarkNotInSchema(MarkKind),
    #[error("invalid content for `{0}`")]
    InvalidContent(NodeKind),
    #[error("mark `{mark}` is not allowed inside `{parent}`")]
    MarkNotAllowed { mark: MarkKind, parent: NodeKind },
    #[error("missing required attribute `{attr}` on `{owner}`")]
    MissingAttr { owner: String, attr: String },
    #[error("unknown attribute `{attr}` on `{owner}`")]
    UnknownAttr { owner: String, attr: String },
    #[error("text nodes must not be empty")]
    EmptyText,
    #[error("malformed document JSON: {0}")]
    Malformed(String),
    #[error("invalid content expression `{0}`")]
    InvalidContentExpr(String),
    #[error("schema has no `{0}` node type")]
    MissingRequiredNode(NodeKind),
}

/// Node groups referenced by content expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Group {
    Block,
    Inline,
    TableBlock,
}

impl Group {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Block => "block",
            Self::Inline => "inline",
            Self::TableBlock => "table_block",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        [Self::Block, Self::Inline, Self::TableBlock]
            .into_iter()
            .find(|group| group.name() == name)
    }
}

/// One attribute declaration. `default == None` makes it required.
#[derive(Debug, Clone, PartialEq)]
pub struct AttrSpec {
    pub name: &'static str,
    pub default: Option<Value>,
}

/// Which marks a node's inline content may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkRule {
    All,
    None,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeSpec {
    pub content: String,
    pub group: Option<Group>,
    pub attrs: Vec<AttrSpec>,
    pub marks: MarkRule,
    pub code: bool,
    pub defining: bool,
    pub isolating: bool,
    pub draggable: bool,
}

impl NodeSpec {
    pub fn new(content: &str) -> Self {
        Self {
            content: content.to_string(),
            group: None,
            attrs: Vec::new(),
            marks: MarkRule::All,
            code: false,
            defining: false,
            isolating: false,
            draggable: false,
        }
    }

    #[must_use]
    pub const fn group(mut self, group: Group) -> Self {
        self.group = Some(group);
        self
    }

    /// Declare an attribute; `None` means required.
    #[must_use]
    pub fn attr(mut self, name: &'static str, default: Option<Value>) -> Self {
        self.attrs.retain(|a| a.name != name);
        self.attrs.push(AttrSpec { name, default });
        self
    }

    #[must_use]
    pub const fn code(mut self) -> Self {
        self.code = true;
        self.marks = MarkRule::None;
        self
    }

    #[must_use]
    pub const fn defining(mut self) -> Self {
        self.defining = true;
        self
    }

    #[must_use]
    pub const fn isolating(mut self) -> Self {
        self.isolating = true;
        self
    }

    #[must_use]
    pub const fn draggable(mut self) -> Self {
        self.draggable = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MarkSpec {
    pub attrs: Vec<AttrSpec>,
    pub inclusive: bool,
}

impl MarkSpec {
    pub const fn new() -> Self {
        Self {
            attrs: Vec::new(),
            inclusive: true,
        }
    }

    #[must_use]
    pub fn attr(mut self, name: &'static str, default: Option<Value>) -> Self {
        self.attrs.retain(|a| a.name != name);
        self.attrs.push(AttrSpec { name, default });
        self
    }

    #[must_use]
    pub const fn exclusive(mut self) -> Self {
        self.inclusive = false;
        self
    }
}

impl Default for MarkSpec {
    fn default() -> Self {
        Self::new()
    }
}

/// Ordered node and mark declarations that extensions fold over.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaSpec {
    nodes: Vec<(NodeKind, NodeSpec)>,
    marks: Vec<(MarkKind, MarkSpec)>,
}

impl SchemaSpec {
    pub const fn new() -> Self {
        Self {
            nodes: Vec::new(),
            marks: Vec::new(),
        }
    }

    /// Replace the spec for `kind` in place, or append it when new.
    #[must_use]
    pub fn update_node(mut self, kind: NodeKind, spec: NodeSpec) -> Self {
        if let Some(slot) = self.nodes.iter_mut().find(|(k, _)| *k == kind) {
            slot.1 = spec;
        } else {
            self.nodes.push((kind, spec));
        }
        self
    }

    /// Append node specs at the end; an existing entry for the same kind
    /// moves to the end with the new spec.
    #[must_use]
    pub fn append_nodes(mut self, nodes: impl IntoIterator<Item = (NodeKind, NodeSpec)>) -> Self {
        for (kind, spec) in nodes {
            self.nodes.retain(|(k, _)| *k != kind);
            self.nodes.push((kind, spec));
        }
        self
    }

    /// Append a mark. Marks already present keep their rank and only have
    /// their spec replaced.
    #[must_use]
    pub fn append_mark(mut self, kind: MarkKind, spec: MarkSpec) -> Self {
        if let Some(slot) = self.marks.iter_mut().find(|(k, _)| *k == kind) {
            slot.1 = spec;
        } else {
            self.marks.push((kind, spec));
        }
        self
    }

    pub fn node(&self, kind: NodeKind) -> Option<&NodeSpec> {
        self.nodes.iter().find(|(k, _)| *k == kind).map(|(_, s)| s)
    }

    pub fn mark(&self, kind: MarkKind) -> Option<&MarkSpec> {
        self.marks.iter().find(|(k, _)| *k == kind).map(|(_, s)| s)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &(NodeKind, NodeSpec)> {
        self.nodes.iter()
    }

    pub fn marks(&self) -> impl Iterator<Item = &(MarkKind, MarkSpec)> {
        self.marks.iter()
    }
}

/// A compiled schema. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    spec: SchemaSpec,
    content: HashMap<NodeKind, ContentExpr>,
}

impl Schema {
    pub fn new(spec: SchemaSpec) -> Result<Self, SchemaError> {
        for required in [NodeKind::Doc, NodeKind::Text] {
            if spec.node(required).is_none() {
                return Err(SchemaError::MissingRequiredNode(required));
            }
        }
        let mut content = HashMap::new();
        for (kind, node_spec) in spec.nodes() {
            let expr = ContentExpr::parse(&node_spec.content)?;
            if let Some(missing) = expr.named_kinds().find(|k| spec.node(*k).is_none()) {
                return Err(SchemaError::NodeNotInSchema(missing));
            }
            content.insert(*kind, expr);
        }
        Ok(Self { spec, content })
    }

    pub const fn spec(&self) -> &SchemaSpec {
        &self.spec
    }

    pub fn has_node(&self, kind: NodeKind) -> bool {
        self.spec.node(kind).is_some()
    }

    pub fn has_mark(&self, kind: MarkKind) -> bool {
        self.spec.mark(kind).is_some()
    }

    pub fn node_spec(&self, kind: NodeKind) -> Option<&NodeSpec> {
        self.spec.node(kind)
    }

    pub fn group_of(&self, kind: NodeKind) -> Option<Group> {
        self.spec.node(kind).and_then(|s| s.group)
    }

    /// Whether inline content of `parent` may carry marks.
    pub fn allows_marks(&self, parent: NodeKind) -> bool {
        self.spec
            .node(parent)
            .is_some_and(|s| s.marks == MarkRule::All)
    }

    /// Fill defaults and reject unknown or missing attributes.
    pub fn node_attrs(&self, kind: NodeKind, attrs: Attrs) -> Result<Attrs, SchemaError> {
        let spec = self
            .spec
            .node(kind)
            .ok_or(SchemaError::NodeNotInSchema(kind))?;
        fill_attrs(kind.name(), &spec.attrs, attrs)
    }

    pub fn mark_attrs(&self, kind: MarkKind, attrs: Attrs) -> Result<Attrs, SchemaError> {
        let spec = self
            .spec
            .mark(kind)
            .ok_or(SchemaError::MarkNotInSchema(kind))?;
        fill_attrs(kind.name(), &spec.attrs, attrs)
    }

    /// Build and check a non-text node.
    pub fn node(&self, kind: NodeKind, attrs: Attrs, content: Vec<Node>) -> Result<Node, SchemaError> {
        let attrs = self.node_attrs(kind, attrs)?;
        let content = if kind.is_textblock() {
            normalize_inline(content)
        } else {
            content
        };
        self.check_content(kind, &content)?;
        Ok(Node::branch(kind, attrs, content))
    }

    /// Build a text node with marks that must all be enabled.
    pub fn text(&self, text: impl Into<String>, marks: Vec<Mark>) -> Result<Node, SchemaError> {
        let text = text.into();
        if text.is_empty() {
            return Err(SchemaError::EmptyText);
        }
        for mark in &marks {
            if !self.has_mark(mark.kind()) {
                return Err(SchemaError::MarkNotInSchema(mark.kind()));
            }
        }
        Ok(Node::text(text, marks))
    }

    pub fn mark(&self, kind: MarkKind, attrs: Attrs) -> Result<Mark, SchemaError> {
        let attrs = self.mark_attrs(kind, attrs)?;
        Ok(Mark::with_attrs(kind, attrs))
    }

    /// Build a node and fill its required content with default children.
    pub fn create_and_fill(&self, kind: NodeKind, attrs: Attrs) -> Result<Node, SchemaError> {
        let expr = self
            .content
            .get(&kind)
            .ok_or(SchemaError::NodeNotInSchema(kind))?;
        let children = expr
            .required(|group| self.default_of(group))
            .into_iter()
            .map(|child| self.create_and_fill(child, Attrs::new()))
            .collect::<Result<Vec<_>, _>>()?;
        self.node(kind, attrs, children)
    }

    fn default_of(&self, group: Group) -> Option<NodeKind> {
        if group == Group::Block && self.has_node(NodeKind::Paragraph) {
            return Some(NodeKind::Paragraph);
        }
        self.spec
            .nodes()
            .find(|(kind, spec)| spec.group == Some(group) && *kind != NodeKind::Text)
            .map(|(kind, _)| *kind)
    }

    /// A document holding one empty paragraph.
    pub fn empty_doc(&self) -> Result<Node, SchemaError> {
        self.create_and_fill(NodeKind::Doc, Attrs::new())
    }

    /// Check one level: content expression, child membership, and marks.
    pub fn check_content(&self, kind: NodeKind, content: &[Node]) -> Result<(), SchemaError> {
        let expr = self
            .content
            .get(&kind)
            .ok_or(SchemaError::NodeNotInSchema(kind))?;
        for child in content {
            if !self.has_node(child.kind()) {
                return Err(SchemaError::NodeNotInSchema(child.kind()));
            }
            for mark in child.marks() {
                if !self.has_mark(mark.kind()) {
                    return Err(SchemaError::MarkNotInSchema(mark.kind()));
                }
                if !self.allows_marks(kind) {
                    return Err(SchemaError::MarkNotAllowed {
                        mark: mark.kind(),
                        parent: kind,
                    });
                }
            }
        }
        if expr.matches(content, |k| self.group_of(k)) {
            Ok(())
        } else {
            Err(SchemaError::InvalidContent(kind))
        }
    }

    /// Validate a whole subtree.
    pub fn check(&self, node: &Node) -> Result<(), SchemaError> {
        if node.is_text() {
            if node.text_str().is_none_or(str::is_empty) {
                return Err(SchemaError::EmptyText);
            }
            return Ok(());
        }
        let spec = self
            .spec
            .node(node.kind())
            .ok_or(SchemaError::NodeNotInSchema(node.kind()))?;
        for attr in &spec.attrs {
            if attr.default.is_none() && !node.attrs().contains_key(attr.name) {
                return Err(SchemaError::MissingAttr {
                    owner: node.kind().name().to_string(),
                    attr: attr.name.to_string(),
                });
            }
        }
        if let Some(unknown) = node
            .attrs()
            .keys()
            .find(|key| !spec.attrs.iter().any(|a| a.name == key.as_str()))
        {
            return Err(SchemaError::UnknownAttr {
                owner: node.kind().name().to_string(),
                attr: unknown.clone(),
            });
        }
        self.check_content(node.kind(), node.content())?;
        node.content().iter().try_for_each(|child| self.check(child))
    }
}

fn fill_attrs(owner: &str, specs: &[AttrSpec], mut attrs: Attrs) -> Result<Attrs, SchemaError> {
    if let Some(unknown) = attrs
        .keys()
        .find(|key| !specs.iter().any(|a| a.name == key.as_str()))
    {
        return Err(SchemaError::UnknownAttr {
            owner: owner.to_string(),
            attr: unknown.clone(),
        });
    }
    for spec in specs {
        if attrs.contains_key(spec.name) {
            continue;
        }
        match &spec.default {
            Some(default) => {
                attrs.insert(spec.name.to_string(), default.clone());
            }
            None => {
                return Err(SchemaError::MissingAttr {
                    owner: owner.to_string(),
                    attr: spec.name.to_string(),
                });
            }
        }
    }
    Ok(attrs)
}

/// Shorthand for building attribute maps.
#[macro_export]
macro_rules! attrs {
    () => { $crate::document::Attrs::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut attrs = $crate::document::Attrs::new();
        $( attrs.insert(($key).to_string(), ::serde_json::json!($value)); )+
        attrs
    }};
}
