//! Markdown text to document tree, via comrak.
//!
//! Every construct is built against the target schema. Whatever the schema
//! cannot hold (a missing node kind, a disabled mark, raw HTML) degrades to
//! paragraph text, so parsing never fails.

use comrak::nodes::{AstNode, ListType, NodeList, NodeValue, TableAlignment};
use comrak::{Arena, Options, parse_document};

use crate::attrs;
use crate::document::{Attrs, Mark, MarkKind, Node, NodeKind, Schema};

#[derive(Debug, Clone, Copy)]
pub struct MarkdownParser<'s> {
    schema: &'s Schema,
}

/// Plain text of a subtree, blocks separated by newlines.
fn text_of<'a>(node: &'a AstNode<'a>) -> String {
    let mut text = String::new();
    collect_text(node, &mut text);
    text
}

fn collect_text<'a>(node: &'a AstNode<'a>, out: &mut String) {
    match &node.data.borrow().value {
        NodeValue::Text(t) | NodeValue::HtmlInline(t) => out.push_str(t),
        NodeValue::Code(code) => out.push_str(&code.literal),
        NodeValue::CodeBlock(block) => out.push_str(block.literal.trim_end_matches('\n')),
        NodeValue::HtmlBlock(html) => out.push_str(html.literal.trim_end_matches('\n')),
        NodeValue::SoftBreak | NodeValue::LineBreak => out.push(' '),
        value => {
            let block = value.block();
            for child in node.children() {
                if block && !out.is_empty() && !out.ends_with('\n') && child.data.borrow().value.block() {
                    out.push('\n');
                }
                collect_text(child, out);
            }
        }
    }
}

fn alignment_style(alignment: Option<&TableAlignment>) -> Option<&'static str> {
    match alignment {
        Some(TableAlignment::Left) => Some("text-align: left"),
        Some(TableAlignment::Center) => Some("text-align: center"),
        Some(TableAlignment::Right) => Some("text-align: right"),
        Some(TableAlignment::None) | None => None,
    }
}

impl<'s> MarkdownParser<'s> {
    pub const fn new(schema: &'s Schema) -> Self {
        Self { schema }
    }

    pub fn parse(&self, source: &str) -> Node {
        let arena = Arena::new();
        let mut options = Options::default();
        options.extension.strikethrough = true;
        options.extension.table = true;
        options.extension.tasklist = true;
        options.extension.autolink = true;
        let root = parse_document(&arena, source, &options);

        let mut blocks = self.blocks(root);
        if blocks.is_empty() {
            blocks.extend(self.paragraph(""));
        }
        self.build(NodeKind::Doc, Attrs::new(), blocks)
            .unwrap_or_else(|| {
                tracing::warn!("parsed markdown did not fit the schema, keeping plain text");
                self.plain(source)
            })
    }

    /// Last resort: one unmarked paragraph per line.
    fn plain(&self, source: &str) -> Node {
        let mut paragraphs: Vec<Node> = source
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| Node::branch(NodeKind::Paragraph, Attrs::new(), vec![Node::text(line, Vec::new())]))
            .collect();
        if paragraphs.is_empty() {
            paragraphs.push(Node::branch(NodeKind::Paragraph, Attrs::new(), Vec::new()));
        }
        Node::branch(NodeKind::Doc, Attrs::new(), paragraphs)
    }

    /// Build a checked node, dropping attrs the schema does not declare.
    fn build(&self, kind: NodeKind, attrs: Attrs, content: Vec<Node>) -> Option<Node> {
        let spec = self.schema.node_spec(kind)?;
        let attrs = attrs
            .into_iter()
            .filter(|(name, _)| spec.attrs.iter().any(|a| a.name == name.as_str()))
            .collect();
        self.schema.node(kind, attrs, content).ok()
    }

    fn paragraph(&self, text: &str) -> Option<Node> {
        let content = if text.is_empty() {
            Vec::new()
        } else {
            vec![Node::text(text, Vec::new())]
        };
        self.build(NodeKind::Paragraph, Attrs::new(), content)
    }

    fn degrade(&self, text: &str) -> Vec<Node> {
        text.split('\n')
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| self.paragraph(line))
            .collect()
    }

    fn blocks<'a>(&self, node: &'a AstNode<'a>) -> Vec<Node> {
        node.children().flat_map(|child| self.block(child)).collect()
    }

    fn block<'a>(&self, node: &'a AstNode<'a>) -> Vec<Node> {
        let value = node.data.borrow().value.clone();
        let built = match value {
            NodeValue::Paragraph => self.textblock(NodeKind::Paragraph, Attrs::new(), node, true),
            NodeValue::Heading(heading) => {
                self.textblock(NodeKind::Heading, attrs! { "level" => heading.level }, node, false)
            }
            NodeValue::BlockQuote => {
                let mut content = self.blocks(node);
                if content.is_empty() {
                    content.extend(self.paragraph(""));
                }
                self.build(NodeKind::Blockquote, Attrs::new(), content)
            }
            NodeValue::CodeBlock(block) => {
                let lang = block.info.split_whitespace().next().filter(|lang| !lang.is_empty());
                let text = block.literal.strip_suffix('\n').unwrap_or(&block.literal);
                let content = if text.is_empty() {
                    Vec::new()
                } else {
                    vec![Node::text(text, Vec::new())]
                };
                self.build(NodeKind::CodeBlock, attrs! { "lang" => lang }, content)
            }
            NodeValue::ThematicBreak => self.build(NodeKind::HorizontalRule, Attrs::new(), Vec::new()),
            NodeValue::List(list) => return self.list(node, &list),
            NodeValue::Table(table) => self.table(node, &table.alignments),
            NodeValue::Document | NodeValue::Item(_) | NodeValue::TaskItem(_) => {
                return self.blocks(node);
            }
            _ => None,
        };
        built.map_or_else(|| self.degrade(&text_of(node)), |node| vec![node])
    }

    /// A textblock from inline children. Without `breaks`, hard breaks
    /// become spaces.
    fn textblock<'a>(&self, kind: NodeKind, attrs: Attrs, node: &'a AstNode<'a>, breaks: bool) -> Option<Node> {
        let mut inline = self.inlines(node, &[]);
        if !breaks {
            inline = inline
                .into_iter()
                .map(|n| {
                    if n.kind() == NodeKind::HardBreak {
                        Node::text(" ", Vec::new())
                    } else {
                        n
                    }
                })
                .collect();
        }
        self.build(kind, attrs.clone(), inline).or_else(|| {
            let text = text_of(node);
            let content = if text.is_empty() {
                Vec::new()
            } else {
                vec![Node::text(text, Vec::new())]
            };
            self.build(kind, attrs, content)
        })
    }

    fn with_mark(&self, marks: &[Mark], kind: MarkKind, attrs: Attrs) -> Vec<Mark> {
        match self.schema.mark(kind, attrs) {
            Ok(mark) => mark.add_to_set(marks),
            Err(_) => marks.to_vec(),
        }
    }

    fn inlines<'a>(&self, node: &'a AstNode<'a>, marks: &[Mark]) -> Vec<Node> {
        let mut out = Vec::new();
        for child in node.children() {
            let value = child.data.borrow().value.clone();
            match value {
                NodeValue::Text(text) | NodeValue::HtmlInline(text) => {
                    out.push(Node::text(text, marks.to_vec()));
                }
                NodeValue::SoftBreak => out.push(Node::text(" ", marks.to_vec())),
                NodeValue::LineBreak => match self.build(NodeKind::HardBreak, Attrs::new(), Vec::new()) {
                    Some(hard_break) => out.push(hard_break),
                    None => out.push(Node::text(" ", marks.to_vec())),
                },
                NodeValue::Code(code) => {
                    let marks = self.with_mark(marks, MarkKind::Code, Attrs::new());
                    out.push(Node::text(code.literal, marks));
                }
                NodeValue::Emph => out.extend(self.inlines(child, &self.with_mark(marks, MarkKind::Em, Attrs::new()))),
                NodeValue::Strong => {
                    out.extend(self.inlines(child, &self.with_mark(marks, MarkKind::Strong, Attrs::new())));
                }
                NodeValue::Strikethrough => {
                    let marks = self.with_mark(marks, MarkKind::Strikethrough, Attrs::new());
                    out.extend(self.inlines(child, &marks));
                }
                NodeValue::Link(link) => {
                    let title = Some(link.title).filter(|title| !title.is_empty());
                    let attrs = attrs! { "href" => link.url, "title" => title };
                    out.extend(self.inlines(child, &self.with_mark(marks, MarkKind::Link, attrs)));
                }
                NodeValue::Image(image) => {
                    let alt = text_of(child);
                    let title = Some(image.title).filter(|title| !title.is_empty());
                    let attrs = attrs! {
                        "src" => image.url,
                        "alt" => Some(alt.clone()).filter(|alt| !alt.is_empty()),
                        "title" => title,
                    };
                    match self.build(NodeKind::Image, attrs, Vec::new()) {
                        Some(node) => out.push(node.with_marks(marks.to_vec())),
                        None => out.push(Node::text(alt, marks.to_vec())),
                    }
                }
                _ => out.extend(self.inlines(child, marks)),
            }
        }
        out
    }

    /// A list. Task items are lifted out as todo items, splitting the list
    /// around them.
    fn list<'a>(&self, node: &'a AstNode<'a>, list: &NodeList) -> Vec<Node> {
        let kind = match list.list_type {
            ListType::Bullet => NodeKind::BulletList,
            ListType::Ordered => NodeKind::OrderedList,
        };
        let mut out = Vec::new();
        let mut items = Vec::new();
        let mut order = list.start;
        for child in node.children() {
            let task = match child.data.borrow().value {
                NodeValue::TaskItem(checked) => Some(checked.is_some()),
                _ => None,
            };
            match task {
                Some(done) if self.schema.has_node(NodeKind::TodoItem) => {
                    let count = items.len();
                    out.extend(self.finish_list(kind, list.tight, order, std::mem::take(&mut items)));
                    out.extend(self.todo(child, done));
                    order += count + 1;
                }
                _ => items.push(child),
            }
        }
        out.extend(self.finish_list(kind, list.tight, order, items));
        out
    }

    fn finish_list<'a>(&self, kind: NodeKind, tight: bool, order: usize, items: Vec<&'a AstNode<'a>>) -> Vec<Node> {
        if items.is_empty() {
            return Vec::new();
        }
        let built: Option<Vec<Node>> = items.iter().map(|item| self.list_item(item)).collect();
        let attrs = if kind == NodeKind::OrderedList {
            attrs! { "order" => order, "tight" => tight }
        } else {
            attrs! { "tight" => tight }
        };
        built
            .and_then(|content| self.build(kind, attrs, content))
            .map_or_else(
                || items.iter().flat_map(|item| self.degrade(&text_of(item))).collect(),
                |list| vec![list],
            )
    }

    fn list_item<'a>(&self, item: &'a AstNode<'a>) -> Option<Node> {
        let mut content = self.blocks(item);
        if content.first().is_none_or(|first| first.kind() != NodeKind::Paragraph) {
            content.insert(0, self.paragraph("")?);
        }
        self.build(NodeKind::ListItem, Attrs::new(), content)
    }

    /// A todo item from a task list entry. Nested blocks other than
    /// paragraphs follow it as siblings.
    fn todo<'a>(&self, item: &'a AstNode<'a>, done: bool) -> Vec<Node> {
        let (mut paragraphs, rest): (Vec<Node>, Vec<Node>) = self
            .blocks(item)
            .into_iter()
            .partition(|block| block.kind() == NodeKind::Paragraph);
        if paragraphs.is_empty() {
            paragraphs.extend(self.paragraph(""));
        }
        let Some(todo) = self.build(NodeKind::TodoItem, attrs! { "done" => done }, paragraphs) else {
            return self.degrade(&text_of(item));
        };
        std::iter::once(todo).chain(rest).collect()
    }

    fn table<'a>(&self, node: &'a AstNode<'a>, alignments: &[TableAlignment]) -> Option<Node> {
        let mut head = Vec::new();
        let mut body = Vec::new();
        for row in node.children() {
            let header = matches!(row.data.borrow().value, NodeValue::TableRow(true));
            let cell_kind = if header {
                NodeKind::TableHeader
            } else {
                NodeKind::TableCell
            };
            let cells = row
                .children()
                .enumerate()
                .map(|(i, cell)| {
                    let style = alignment_style(alignments.get(i));
                    self.textblock(cell_kind, attrs! { "style" => style }, cell, true)
                })
                .collect::<Option<Vec<_>>>()?;
            let row = self.build(NodeKind::TableRow, Attrs::new(), cells)?;
            if header && head.is_empty() {
                head.push(row);
            } else {
                body.push(row);
            }
        }
        let mut sections = Vec::new();
        if !head.is_empty() {
            sections.push(self.build(NodeKind::TableHead, Attrs::new(), head)?);
        }
        if !body.is_empty() {
            sections.push(self.build(NodeKind::TableBody, Attrs::new(), body)?);
        }
        self.build(NodeKind::Table, Attrs::new(), sections)
    }
}
