//! Document tree nodes and inline marks.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

/// Attribute map carried by nodes and marks.
pub type Attrs = BTreeMap<String, Value>;

/// Every node type the engine knows about.
///
/// The set is closed: a schema enables a subset of these, and every
/// dispatch table (serializer, parser, views) is keyed by this enum so a
/// missing handler is caught when the table is built rather than at lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeKind {
    Doc,
    Paragraph,
    Blockquote,
    HorizontalRule,
    Heading,
    CodeBlock,
    OrderedList,
    BulletList,
    ListItem,
    TodoItem,
    Table,
    TableHead,
    TableBody,
    TableRow,
    TableCell,
    TableHeader,
    Image,
    HardBreak,
    Text,
}

impl NodeKind {
    pub const ALL: [Self; 19] = [
        Self::Doc,
        Self::Paragraph,
        Self::Blockquote,
        Self::HorizontalRule,
        Self::Heading,
        Self::CodeBlock,
        Self::OrderedList,
        Self::BulletList,
        Self::ListItem,
        Self::TodoItem,
        Self::Table,
        Self::TableHead,
        Self::TableBody,
        Self::TableRow,
        Self::TableCell,
        Self::TableHeader,
        Self::Image,
        Self::HardBreak,
        Self::Text,
    ];

    /// The serialized type name (`"bullet_list"`, `"table_cell"`, ...).
    pub const fn name(self) -> &'static str {
        match self {
            Self::Doc => "doc",
            Self::Paragraph => "paragraph",
            Self::Blockquote => "blockquote",
            Self::HorizontalRule => "horizontal_rule",
            Self::Heading => "heading",
            Self::CodeBlock => "code_block",
            Self::OrderedList => "ordered_list",
            Self::BulletList => "bullet_list",
            Self::ListItem => "list_item",
            Self::TodoItem => "todo_item",
            Self::Table => "table",
            Self::TableHead => "table_head",
            Self::TableBody => "table_body",
            Self::TableRow => "table_row",
            Self::TableCell => "table_cell",
            Self::TableHeader => "table_header",
            Self::Image => "image",
            Self::HardBreak => "hard_break",
            Self::Text => "text",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.name() == name)
    }

    /// Leaf nodes occupy exactly one position and never have content.
    pub const fn is_leaf(self) -> bool {
        matches!(self, Self::HorizontalRule | Self::Image | Self::HardBreak)
    }

    pub const fn is_inline(self) -> bool {
        matches!(self, Self::Text | Self::Image | Self::HardBreak)
    }

    /// Block nodes whose content is inline.
    pub const fn is_textblock(self) -> bool {
        matches!(
            self,
            Self::Paragraph | Self::Heading | Self::CodeBlock | Self::TableCell | Self::TableHeader
        )
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Inline formatting kinds. Declaration order is the mark rank used to keep
/// mark sets sorted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MarkKind {
    Em,
    Strong,
    Link,
    Code,
    Strikethrough,
}

impl MarkKind {
    pub const ALL: [Self; 5] = [
        Self::Em,
        Self::Strong,
        Self::Link,
        Self::Code,
        Self::Strikethrough,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Em => "em",
            Self::Strong => "strong",
            Self::Link => "link",
            Self::Code => "code",
            Self::Strikethrough => "strikethrough",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.name() == name)
    }

    /// Whether typing at the end of a marked run continues the mark.
    pub const fn is_inclusive(self) -> bool {
        !matches!(self, Self::Link)
    }
}

impl fmt::Display for MarkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A mark attached to an inline node.
#[derive(Debug, Clone, PartialEq)]
pub struct Mark {
    kind: MarkKind,
    attrs: Attrs,
}

impl Mark {
    pub fn new(kind: MarkKind) -> Self {
        Self {
            kind,
            attrs: Attrs::new(),
        }
    }

    pub const fn with_attrs(kind: MarkKind, attrs: Attrs) -> Self {
        Self { kind, attrs }
    }

    /// A link mark pointing at `href`.
    pub fn link(href: impl Into<String>) -> Self {
        let mut attrs = Attrs::new();
        attrs.insert("href".to_string(), Value::String(href.into()));
        attrs.insert("title".to_string(), Value::Null);
        Self::with_attrs(MarkKind::Link, attrs)
    }

    pub const fn kind(&self) -> MarkKind {
        self.kind
    }

    pub const fn attrs(&self) -> &Attrs {
        &self.attrs
    }

    pub fn attr_str(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).and_then(Value::as_str)
    }

    /// Add this mark to a sorted set, replacing a mark of the same kind.
    pub fn add_to_set(&self, set: &[Self]) -> Vec<Self> {
        let mut out: Vec<Self> = set.iter().filter(|m| m.kind != self.kind).cloned().collect();
        let at = out
            .iter()
            .position(|m| m.kind > self.kind)
            .unwrap_or(out.len());
        out.insert(at, self.clone());
        out
    }

    pub fn remove_from_set(kind: MarkKind, set: &[Self]) -> Vec<Self> {
        set.iter().filter(|m| m.kind != kind).cloned().collect()
    }

    pub fn is_in_set(&self, set: &[Self]) -> bool {
        set.iter().any(|m| m == self)
    }
}

/// Find a mark of the given kind in a set.
pub fn find_mark(set: &[Mark], kind: MarkKind) -> Option<&Mark> {
    set.iter().find(|m| m.kind == kind)
}

/// An immutable document node.
///
/// Children are shared behind an `Arc`, so cloning a node (or a whole
/// document) is cheap and edits only rebuild the path from the root to the
/// changed node.
#[derive(Clone, PartialEq)]
pub struct Node {
    kind: NodeKind,
    attrs: Attrs,
    content: Arc<Vec<Node>>,
    marks: Vec<Mark>,
    text: Option<Arc<str>>,
    size: usize,
}

impl Node {
    /// Build a non-text node without schema validation.
    ///
    /// Prefer [`crate::document::Schema::node`], which fills default
    /// attributes and checks the content expression.
    pub fn branch(kind: NodeKind, attrs: Attrs, content: Vec<Self>) -> Self {
        let size = if kind.is_leaf() {
            1
        } else {
            content.iter().map(Self::node_size).sum::<usize>() + 2
        };
        Self {
            kind,
            attrs,
            content: Arc::new(content),
            marks: Vec::new(),
            text: None,
            size,
        }
    }

    /// Build a text node. Empty text is allowed here but dropped by
    /// [`normalize_inline`].
    pub fn text(text: impl Into<String>, marks: Vec<Mark>) -> Self {
        let text: String = text.into();
        let size = text.chars().count();
        Self {
            kind: NodeKind::Text,
            attrs: Attrs::new(),
            content: Arc::new(Vec::new()),
            marks,
            text: Some(Arc::from(text)),
            size,
        }
    }

    pub const fn kind(&self) -> NodeKind {
        self.kind
    }

    pub const fn attrs(&self) -> &Attrs {
        &self.attrs
    }

    pub fn attr(&self, name: &str) -> Option<&Value> {
        self.attrs.get(name).filter(|v| !v.is_null())
    }

    pub fn attr_str(&self, name: &str) -> Option<&str> {
        self.attr(name).and_then(Value::as_str)
    }

    pub fn attr_u64(&self, name: &str) -> Option<u64> {
        self.attr(name).and_then(Value::as_u64)
    }

    pub fn attr_bool(&self, name: &str) -> Option<bool> {
        self.attr(name).and_then(Value::as_bool)
    }

    pub fn content(&self) -> &[Self] {
        &self.content
    }

    pub fn child(&self, index: usize) -> Option<&Self> {
        self.content.get(index)
    }

    pub fn child_count(&self) -> usize {
        self.content.len()
    }

    pub fn first_child(&self) -> Option<&Self> {
        self.content.first()
    }

    pub fn last_child(&self) -> Option<&Self> {
        self.content.last()
    }

    pub fn marks(&self) -> &[Mark] {
        &self.marks
    }

    pub fn text_str(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub const fn is_text(&self) -> bool {
        matches!(self.kind, NodeKind::Text)
    }

    pub const fn is_leaf(&self) -> bool {
        self.kind.is_leaf() || matches!(self.kind, NodeKind::Text)
    }

    pub const fn is_inline(&self) -> bool {
        self.kind.is_inline()
    }

    pub const fn is_textblock(&self) -> bool {
        self.kind.is_textblock()
    }

    pub const fn is_block(&self) -> bool {
        !self.kind.is_inline()
    }

    /// Number of positions this node occupies in its parent.
    pub const fn node_size(&self) -> usize {
        self.size
    }

    /// Number of positions inside this node.
    pub const fn content_size(&self) -> usize {
        if self.is_leaf() { 0 } else { self.size - 2 }
    }

    /// Concatenated text of all descendants.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        if let Some(text) = &self.text {
            out.push_str(text);
        }
        for child in self.content.iter() {
            child.collect_text(out);
        }
    }

    /// True for a textblock without any content, or a doc holding only one.
    pub fn is_empty_doc(&self) -> bool {
        match self.kind {
            NodeKind::Doc => {
                self.content.is_empty()
                    || (self.content.len() == 1
                        && self.content[0].is_textblock()
                        && self.content[0].content.is_empty())
            }
            _ => self.content.is_empty() && self.text.as_deref().is_none_or(str::is_empty),
        }
    }

    /// Same type, attributes, and marks.
    pub fn same_markup(&self, other: &Self) -> bool {
        self.kind == other.kind && self.attrs == other.attrs && self.marks == other.marks
    }

    /// Copy with new content, keeping type and attributes.
    #[must_use]
    pub fn copy(&self, content: Vec<Self>) -> Self {
        let mut node = Self::branch(self.kind, self.attrs.clone(), content);
        node.marks = self.marks.clone();
        node
    }

    /// Copy with a different type and attributes, keeping content.
    #[must_use]
    pub fn with_markup(&self, kind: NodeKind, attrs: Attrs) -> Self {
        let mut node = Self::branch(kind, attrs, self.content.to_vec());
        node.marks = self.marks.clone();
        node
    }

    /// Copy with a different mark set. Only meaningful for inline nodes.
    #[must_use]
    pub fn with_marks(&self, marks: Vec<Mark>) -> Self {
        let mut node = self.clone();
        node.marks = marks;
        node
    }

    /// Copy with the child at `index` replaced.
    #[must_use]
    pub fn replace_child(&self, index: usize, child: Self) -> Self {
        let mut content = self.content.to_vec();
        content[index] = child;
        self.copy(content)
    }

    /// Slice a text node by character offsets.
    #[must_use]
    pub fn cut_text(&self, from: usize, to: usize) -> Self {
        let text = self.text.as_deref().unwrap_or_default();
        let sliced: String = text.chars().skip(from).take(to.saturating_sub(from)).collect();
        Self::text(sliced, self.marks.clone())
    }

    /// Visit every child with its offset from the start of this node's content.
    pub fn for_each_child(&self, mut f: impl FnMut(&Self, usize, usize)) {
        let mut offset = 0;
        for (index, child) in self.content.iter().enumerate() {
            f(child, offset, index);
            offset += child.node_size();
        }
    }

    /// Visit descendants depth-first with their absolute positions (relative
    /// to the start of this node's content). Returning `false` skips the
    /// node's children.
    pub fn descendants(&self, f: &mut impl FnMut(&Self, usize, &Self) -> bool) {
        self.descendants_from(0, f);
    }

    fn descendants_from(&self, base: usize, f: &mut impl FnMut(&Self, usize, &Self) -> bool) {
        let mut pos = base;
        for child in self.content.iter() {
            if f(child, pos, self) && !child.is_leaf() {
                child.descendants_from(pos + 1, f);
            }
            pos += child.node_size();
        }
    }

    /// Visit nodes overlapping `from..to` (positions relative to this
    /// node's content).
    pub fn nodes_between(
        &self,
        from: usize,
        to: usize,
        f: &mut impl FnMut(&Self, usize, &Self) -> bool,
    ) {
        self.nodes_between_from(from, to, 0, f);
    }

    fn nodes_between_from(
        &self,
        from: usize,
        to: usize,
        base: usize,
        f: &mut impl FnMut(&Self, usize, &Self) -> bool,
    ) {
        let mut pos = 0;
        for child in self.content.iter() {
            let end = pos + child.node_size();
            if end > from && pos < to || (from == to && pos == from) {
                if f(child, base + pos, self) && !child.is_leaf() {
                    let start = pos + 1;
                    child.nodes_between_from(
                        from.saturating_sub(start),
                        to.saturating_sub(start).min(child.content_size()),
                        base + start,
                        f,
                    );
                }
            }
            pos = end;
            if pos >= to && from != to {
                break;
            }
        }
    }

    /// Text between two positions, with `block_separator` between blocks
    /// and `leaf_text` standing in for inline leaves.
    pub fn text_between(&self, from: usize, to: usize, block_separator: &str, leaf_text: &str) -> String {
        let mut out = String::new();
        let mut separated = true;
        self.nodes_between(from, to, &mut |node, pos, _| {
            if let Some(text) = node.text_str() {
                let start = from.saturating_sub(pos);
                let end = to.saturating_sub(pos).min(node.node_size());
                out.extend(text.chars().skip(start).take(end.saturating_sub(start)));
                separated = block_separator.is_empty();
            } else if node.is_leaf() && node.is_inline() {
                out.push_str(leaf_text);
                separated = block_separator.is_empty();
            } else if !separated && node.is_block() {
                out.push_str(block_separator);
                separated = true;
            }
            true
        });
        out
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(text) = &self.text {
            if self.marks.is_empty() {
                return write!(f, "{text:?}");
            }
            let marks: Vec<&str> = self.marks.iter().map(|m| m.kind.name()).collect();
            return write!(f, "{}({text:?})", marks.join(","));
        }
        write!(f, "{}", self.kind)?;
        if !self.attrs.is_empty() {
            write!(f, "{:?}", self.attrs)?;
        }
        if !self.content.is_empty() {
            f.debug_list().entries(self.content.iter()).finish()?;
        }
        Ok(())
    }
}

/// Merge adjacent text nodes with equal marks and drop empty ones.
pub fn normalize_inline(nodes: Vec<Node>) -> Vec<Node> {
    let mut out: Vec<Node> = Vec::with_capacity(nodes.len());
    for node in nodes {
        if node.is_text() && node.text_str().is_none_or(str::is_empty) {
            continue;
        }
        if let Some(last) = out.last_mut()
            && last.is_text()
            && node.is_text()
            && last.marks == node.marks
        {
            let mut joined = last.text_str().unwrap_or_default().to_string();
            joined.push_str(node.text_str().unwrap_or_default());
            *last = Node::text(joined, node.marks.clone());
            continue;
        }
        out.push(node);
    }
    out
}
