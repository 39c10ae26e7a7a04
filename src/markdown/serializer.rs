//! Document tree to markdown text.

use std::collections::BTreeMap;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::document::{Mark, MarkKind, Node, NodeKind, Schema};

static ALIGNMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"text-align:\s?(left|right|center)").unwrap());

static ORDERED_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)([.)])(\s|$)").unwrap());

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MissingHandler {
    #[error("no markdown writer for node `{}`", .0.name())]
    Node(NodeKind),

    #[error("no markdown syntax for mark `{}`", .0.name())]
    Mark(MarkKind),
}

type BlockWriter = fn(&MarkdownSerializer, &Node) -> String;
type InlineWriter = fn(&Node) -> String;

#[derive(Clone, Copy)]
enum Writer {
    Block(BlockWriter),
    Inline(InlineWriter),
}

#[derive(Clone, Copy)]
struct MarkSyntax {
    open: fn(&Mark) -> String,
    close: fn(&Mark) -> String,
}

/// Markdown writer with one handler per node and mark kind.
#[derive(Clone)]
pub struct MarkdownSerializer {
    nodes: BTreeMap<NodeKind, Writer>,
    marks: BTreeMap<MarkKind, MarkSyntax>,
}

impl fmt::Debug for MarkdownSerializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarkdownSerializer")
            .field("nodes", &self.nodes.keys().collect::<Vec<_>>())
            .field("marks", &self.marks.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for MarkdownSerializer {
    fn default() -> Self {
        let nodes = [
            (NodeKind::Doc, Writer::Block(|s, n| s.blocks(n.content(), false))),
            (NodeKind::Paragraph, Writer::Block(paragraph)),
            (NodeKind::Heading, Writer::Block(heading)),
            (NodeKind::Blockquote, Writer::Block(blockquote)),
            (NodeKind::CodeBlock, Writer::Block(code_block)),
            (NodeKind::HorizontalRule, Writer::Block(|_, _| "---".to_string())),
            (NodeKind::BulletList, Writer::Block(bullet_list)),
            (NodeKind::OrderedList, Writer::Block(ordered_list)),
            (NodeKind::ListItem, Writer::Block(|s, n| s.blocks(n.content(), false))),
            (NodeKind::TodoItem, Writer::Block(todo_item)),
            (NodeKind::Table, Writer::Block(table)),
            (NodeKind::TableHead, Writer::Block(table)),
            (NodeKind::TableBody, Writer::Block(table)),
            (NodeKind::TableRow, Writer::Block(|s, n| s.row(n))),
            (NodeKind::TableHeader, Writer::Block(|s, n| s.inline(n.content()))),
            (NodeKind::TableCell, Writer::Block(|s, n| s.inline(n.content()))),
            (NodeKind::Text, Writer::Inline(|n| escape(n.text_str().unwrap_or_default()))),
            (NodeKind::Image, Writer::Inline(image)),
            (NodeKind::HardBreak, Writer::Inline(|_| "\\\n".to_string())),
        ];
        let marks = [
            (MarkKind::Em, MarkSyntax { open: |_| "*".into(), close: |_| "*".into() }),
            (MarkKind::Strong, MarkSyntax { open: |_| "**".into(), close: |_| "**".into() }),
            (MarkKind::Code, MarkSyntax { open: |_| "`".into(), close: |_| "`".into() }),
            (MarkKind::Strikethrough, MarkSyntax { open: |_| "~~".into(), close: |_| "~~".into() }),
            (MarkKind::Link, MarkSyntax { open: |_| "[".into(), close: link_close }),
        ];
        Self {
            nodes: nodes.into_iter().collect(),
            marks: marks.into_iter().collect(),
        }
    }
}

impl MarkdownSerializer {
    /// A serializer covering every node and mark `schema` can produce.
    pub fn for_schema(schema: &Schema) -> Result<Self, MissingHandler> {
        Self::default().check(schema)
    }

    /// Drop the handler for `kind`. Mostly useful to exercise [`Self::check`].
    #[must_use]
    pub fn without_node(mut self, kind: NodeKind) -> Self {
        self.nodes.remove(&kind);
        self
    }

    /// Fail unless every kind in `schema` has a handler.
    pub fn check(self, schema: &Schema) -> Result<Self, MissingHandler> {
        if let Some((kind, _)) = schema.spec().nodes().find(|(kind, _)| !self.nodes.contains_key(kind)) {
            return Err(MissingHandler::Node(*kind));
        }
        if let Some((kind, _)) = schema.spec().marks().find(|(kind, _)| !self.marks.contains_key(kind)) {
            return Err(MissingHandler::Mark(*kind));
        }
        Ok(self)
    }

    pub fn serialize(&self, doc: &Node) -> String {
        let mut out = self.block(doc).trim_end_matches('\n').to_string();
        out.push('\n');
        out
    }

    fn block(&self, node: &Node) -> String {
        match self.nodes.get(&node.kind()) {
            Some(Writer::Block(write)) => write(self, node),
            Some(Writer::Inline(_)) => self.inline(std::slice::from_ref(node)),
            None => node.text_content(),
        }
    }

    /// Sibling blocks. Adjacent todo items always sit on consecutive lines.
    fn blocks(&self, nodes: &[Node], tight: bool) -> String {
        let mut out = String::new();
        for (i, node) in nodes.iter().enumerate() {
            if i > 0 {
                let todo_run = node.kind() == NodeKind::TodoItem && nodes[i - 1].kind() == NodeKind::TodoItem;
                out.push_str(if tight || todo_run { "\n" } else { "\n\n" });
            }
            out.push_str(&self.block(node));
        }
        out
    }

    fn open(&self, mark: &Mark) -> String {
        self.marks.get(&mark.kind()).map(|syntax| (syntax.open)(mark)).unwrap_or_default()
    }

    fn close(&self, mark: &Mark) -> String {
        self.marks.get(&mark.kind()).map(|syntax| (syntax.close)(mark)).unwrap_or_default()
    }

    /// Close open marks from the innermost outwards until every remaining
    /// one satisfies `keep`.
    fn close_marks(&self, out: &mut String, open: &mut Vec<Mark>, keep: impl Fn(&Mark) -> bool) {
        let Some(first) = open.iter().position(|mark| !keep(mark)) else {
            return;
        };
        while open.len() > first {
            if let Some(mark) = open.pop() {
                out.push_str(&self.close(&mark));
            }
        }
    }

    /// Inline content. Whitespace at the edges of a marked run is moved
    /// outside the delimiters.
    fn inline(&self, nodes: &[Node]) -> String {
        let mut out = String::new();
        let mut open: Vec<Mark> = Vec::new();
        for (i, node) in nodes.iter().enumerate() {
            let marks = node.marks();
            let next: &[Mark] = nodes.get(i + 1).map_or(&[][..], Node::marks);
            let code = marks.iter().any(|m| m.kind() == MarkKind::Code);

            let (lead, body, trail) = match node.text_str() {
                Some(text) if code => (String::new(), text.to_string(), String::new()),
                Some(text) if !marks.is_empty() => {
                    let core = text.trim();
                    if core.is_empty() {
                        (String::new(), escape(text), String::new())
                    } else {
                        let start = text.len() - text.trim_start().len();
                        let end = text.trim_end().len();
                        (text[..start].to_string(), escape(core), text[end..].to_string())
                    }
                }
                _ => (String::new(), self.inline_node(node), String::new()),
            };

            self.close_marks(&mut out, &mut open, |m| m.is_in_set(marks));
            out.push_str(&lead);
            let mut opening: Vec<&Mark> = marks.iter().filter(|m| !m.is_in_set(&open)).collect();
            opening.sort_by_key(|m| (m.kind() == MarkKind::Code, m.kind()));
            for mark in opening {
                out.push_str(&self.open(mark));
                open.push(mark.clone());
            }
            out.push_str(&body);
            if !trail.is_empty() {
                self.close_marks(&mut out, &mut open, |m| m.is_in_set(next));
                out.push_str(&trail);
            }
        }
        self.close_marks(&mut out, &mut open, |_| false);
        out
    }

    fn inline_node(&self, node: &Node) -> String {
        match self.nodes.get(&node.kind()) {
            Some(Writer::Inline(write)) => write(node),
            Some(Writer::Block(write)) => write(self, node),
            None => node.text_content(),
        }
    }

    fn list(&self, node: &Node, marker: impl Fn(usize) -> String) -> String {
        let tight = node.attr_bool("tight").unwrap_or(false);
        let items: Vec<String> = node
            .content()
            .iter()
            .enumerate()
            .map(|(i, item)| {
                let marker = marker(i);
                let indent = " ".repeat(marker.chars().count());
                let body = if item.kind() == NodeKind::ListItem {
                    self.blocks(item.content(), tight)
                } else {
                    self.block(item)
                };
                prefix_item(&marker, &indent, &body)
            })
            .collect();
        items.join(if tight { "\n" } else { "\n\n" })
    }

    fn row(&self, row: &Node) -> String {
        let mut line = String::new();
        for cell in row.content() {
            line.push_str("| ");
            line.push_str(&self.inline(cell.content()).replace('|', "\\|"));
            line.push(' ');
        }
        line.push('|');
        line
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        let reference = ch == '&' && chars.peek().is_some_and(|next| *next == '#' || next.is_ascii_alphanumeric());
        if reference || matches!(ch, '\\' | '*' | '_' | '`' | '[' | ']' | '~') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Character reference for whitespace a parser would strip.
fn whitespace_ref(ch: char) -> &'static str {
    if ch == '\t' { "&#9;" } else { "&#32;" }
}

/// Keep one line of paragraph text from being read as block syntax.
fn escape_line_start(line: &str) -> String {
    if let Some(first @ (' ' | '\t')) = line.chars().next() {
        return format!("{}{}", whitespace_ref(first), &line[1..]);
    }
    let heading = line.trim_start_matches('#');
    let hashes = line.len() - heading.len();
    if (1..=6).contains(&hashes) && (heading.is_empty() || heading.starts_with(' ')) {
        return format!("\\{line}");
    }
    // Rules and setext underlines.
    let bare: Vec<char> = line.chars().filter(|ch| !matches!(ch, ' ' | '\t')).collect();
    if !bare.is_empty() && (bare.iter().all(|ch| *ch == '-') || bare.iter().all(|ch| *ch == '=')) {
        return format!("\\{line}");
    }
    let mut chars = line.chars();
    match (chars.next(), chars.next()) {
        (Some('>'), _) | (Some('-' | '+'), None | Some(' ' | '\t')) => return format!("\\{line}"),
        (Some('<'), Some(next)) if next.is_ascii_alphabetic() || matches!(next, '/' | '!' | '?') => {
            return format!("\\{line}");
        }
        _ => {}
    }
    if let Some(caps) = ORDERED_MARKER.captures(line) {
        let digits = caps[1].len();
        return format!("{}\\{}", &line[..digits], &line[digits..]);
    }
    line.to_string()
}

/// Escape every line of a paragraph; lines after the first follow hard
/// breaks. Trailing whitespace is kept as a character reference.
fn escape_paragraph(text: &str) -> String {
    let mut out = text.split('\n').map(escape_line_start).collect::<Vec<_>>().join("\n");
    if let Some(last @ (' ' | '\t')) = out.chars().last() {
        out.pop();
        out.push_str(whitespace_ref(last));
    }
    out
}

fn prefix_item(first: &str, indent: &str, body: &str) -> String {
    body.split('\n')
        .enumerate()
        .map(|(i, line)| match (i, line.is_empty()) {
            (0, _) => format!("{first}{line}"),
            (_, true) => String::new(),
            (_, false) => format!("{indent}{line}"),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn paragraph(s: &MarkdownSerializer, node: &Node) -> String {
    escape_paragraph(&s.inline(node.content()))
}

fn heading(s: &MarkdownSerializer, node: &Node) -> String {
    let level = node.attr_u64("level").unwrap_or(1).clamp(1, 6);
    let hashes = "#".repeat(usize::try_from(level).unwrap_or(1));
    format!("{hashes} {}", s.inline(node.content()))
}

fn blockquote(s: &MarkdownSerializer, node: &Node) -> String {
    s.blocks(node.content(), false)
        .split('\n')
        .map(|line| if line.is_empty() { ">".to_string() } else { format!("> {line}") })
        .collect::<Vec<_>>()
        .join("\n")
}

fn code_block(_: &MarkdownSerializer, node: &Node) -> String {
    if let Some(src) = node.attr_str("src") {
        let title = escape(node.attr_str("title").unwrap_or_default());
        return format!("![{title}]({src})");
    }
    let text = node.text_content();
    let longest = text
        .split(|c: char| c != '`')
        .map(str::len)
        .max()
        .unwrap_or(0);
    let fence = "`".repeat((longest + 1).max(3));
    let lang = node.attr_str("lang").unwrap_or_default();
    if text.is_empty() {
        format!("{fence}{lang}\n{fence}")
    } else {
        format!("{fence}{lang}\n{text}\n{fence}")
    }
}

fn bullet_list(s: &MarkdownSerializer, node: &Node) -> String {
    s.list(node, |_| "* ".to_string())
}

fn ordered_list(s: &MarkdownSerializer, node: &Node) -> String {
    let start = usize::try_from(node.attr_u64("order").unwrap_or(1)).unwrap_or(1);
    let width = (start + node.child_count().saturating_sub(1)).to_string().len();
    s.list(node, |i| format!("{:>width$}. ", start + i))
}

fn todo_item(s: &MarkdownSerializer, node: &Node) -> String {
    let marker = if node.attr_bool("done").unwrap_or(false) {
        "- [x] "
    } else {
        "- [ ] "
    };
    prefix_item(marker, "  ", &s.blocks(node.content(), false))
}

fn alignment(cell: &Node) -> Option<&str> {
    let style = cell.attr_str("style")?;
    ALIGNMENT
        .captures(style)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Pipe table. The first row is the header and carries the alignments.
fn table(s: &MarkdownSerializer, node: &Node) -> String {
    let mut rows: Vec<&Node> = Vec::new();
    for child in node.content() {
        if child.kind() == NodeKind::TableRow {
            rows.push(child);
        } else {
            rows.extend(child.content().iter().filter(|row| row.kind() == NodeKind::TableRow));
        }
    }
    let Some((head, body)) = rows.split_first() else {
        return String::new();
    };
    let mut delimiter = String::new();
    for cell in head.content() {
        let align = alignment(cell);
        delimiter.push('|');
        delimiter.push(if matches!(align, Some("left" | "center")) { ':' } else { ' ' });
        delimiter.push_str("---");
        delimiter.push(if matches!(align, Some("right" | "center")) { ':' } else { ' ' });
    }
    delimiter.push('|');

    let mut lines = vec![s.row(head), delimiter];
    lines.extend(body.iter().map(|row| s.row(row)));
    lines.join("\n")
}

fn image(node: &Node) -> String {
    let alt = escape(node.attr_str("alt").unwrap_or_default());
    let src = node.attr_str("src").unwrap_or_default();
    match node.attr_str("title") {
        Some(title) => format!("![{alt}]({src} \"{}\")", title.replace('"', "\\\"")),
        None => format!("![{alt}]({src})"),
    }
}

fn link_close(mark: &Mark) -> String {
    let href = mark.attr_str("href").unwrap_or_default();
    match mark.attr_str("title") {
        Some(title) => format!("]({href} \"{}\")", title.replace('"', "\\\"")),
        None => format!("]({href})"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Attrs;
    use crate::extension::base::plain_schema_spec;
    use crate::extension::tests::rich_composition;

    fn text(s: &str, marks: Vec<Mark>) -> Node {
        Node::text(s, marks)
    }

    fn para(content: Vec<Node>) -> Node {
        Node::branch(NodeKind::Paragraph, Attrs::new(), content)
    }

    fn doc(content: Vec<Node>) -> Node {
        Node::branch(NodeKind::Doc, Attrs::new(), content)
    }

    fn ser(node: &Node) -> String {
        MarkdownSerializer::default().serialize(node)
    }

    #[test]
    fn test_every_rich_kind_has_a_handler() {
        let schema = rich_composition().schema;
        assert!(MarkdownSerializer::for_schema(&schema).is_ok());
        let plain = Schema::new(plain_schema_spec()).unwrap();
        assert!(MarkdownSerializer::for_schema(&plain).is_ok());
    }

    #[test]
    fn test_missing_handler_is_reported() {
        let schema = rich_composition().schema;
        let err = MarkdownSerializer::default()
            .without_node(NodeKind::Table)
            .check(&schema)
            .unwrap_err();
        assert_eq!(err, MissingHandler::Node(NodeKind::Table));
        assert_eq!(err.to_string(), "no markdown writer for node `table`");
    }

    #[test]
    fn test_whitespace_moves_outside_marks() {
        let strong = Mark::new(MarkKind::Strong);
        let d = doc(vec![para(vec![
            text("a", Vec::new()),
            text(" b ", vec![strong]),
            text("c", Vec::new()),
        ])]);
        assert_eq!(ser(&d), "a **b** c\n");
    }

    #[test]
    fn test_nested_marks_share_delimiters() {
        let em = Mark::new(MarkKind::Em);
        let strong = Mark::new(MarkKind::Strong);
        let d = doc(vec![para(vec![
            text("a", vec![em.clone()]),
            text("b", vec![em, strong]),
        ])]);
        assert_eq!(ser(&d), "*a**b***\n");
    }

    #[test]
    fn test_link_with_title() {
        let link = Mark::with_attrs(
            MarkKind::Link,
            crate::attrs! { "href" => "http://x.io", "title" => "T" },
        );
        let d = doc(vec![para(vec![text("x", vec![link])])]);
        assert_eq!(ser(&d), "[x](http://x.io \"T\")\n");
    }

    #[test]
    fn test_special_characters_are_escaped() {
        let d = doc(vec![para(vec![text("# a_b *c*", Vec::new())])]);
        assert_eq!(ser(&d), "\\# a\\_b \\*c\\*\n");
        let d = doc(vec![para(vec![text("1. one", Vec::new())])]);
        assert_eq!(ser(&d), "1\\. one\n");
    }

    #[test]
    fn test_block_syntax_at_line_start_is_escaped() {
        let one = |s: &str| ser(&doc(vec![para(vec![text(s, Vec::new())])]));
        assert_eq!(one("---"), "\\---\n");
        assert_eq!(one("- - -"), "\\- - -\n");
        assert_eq!(one("___"), "\\_\\_\\_\n");
        assert_eq!(one("    indented"), "&#32;   indented\n");
        assert_eq!(one("trailing "), "trailing&#32;\n");
        assert_eq!(one("<div>"), "\\<div>\n");
        assert_eq!(one("a & b &amp;"), "a & b \\&amp;\n");
    }

    #[test]
    fn test_lines_after_hard_break_are_escaped() {
        let hard_break = Node::branch(NodeKind::HardBreak, Attrs::new(), Vec::new());
        let d = doc(vec![para(vec![
            text("title", Vec::new()),
            hard_break,
            text("===", Vec::new()),
        ])]);
        assert_eq!(ser(&d), "title\\\n\\===\n");
    }

    #[test]
    fn test_code_text_is_not_escaped() {
        let code = Mark::new(MarkKind::Code);
        let d = doc(vec![para(vec![text("a_b*", vec![code])])]);
        assert_eq!(ser(&d), "`a_b*`\n");
    }

    #[test]
    fn test_code_block_fence_grows_past_backticks() {
        let block = Node::branch(
            NodeKind::CodeBlock,
            crate::attrs! { "lang" => "md" },
            vec![text("```\nx\n```", Vec::new())],
        );
        assert_eq!(ser(&doc(vec![block])), "````md\n```\nx\n```\n````\n");
    }

    #[test]
    fn test_code_block_with_src_is_image_reference() {
        let block = Node::branch(
            NodeKind::CodeBlock,
            crate::attrs! { "src" => "diagram.mmd", "title" => "flow" },
            Vec::new(),
        );
        assert_eq!(ser(&doc(vec![block])), "![flow](diagram.mmd)\n");
    }

    #[test]
    fn test_ordered_markers_are_padded() {
        let items: Vec<Node> = (0..10)
            .map(|i| {
                Node::branch(
                    NodeKind::ListItem,
                    Attrs::new(),
                    vec![para(vec![text(&format!("i{i}"), Vec::new())])],
                )
            })
            .collect();
        let list = Node::branch(
            NodeKind::OrderedList,
            crate::attrs! { "order" => 1, "tight" => true },
            items,
        );
        let out = ser(&doc(vec![list]));
        assert!(out.starts_with(" 1. i0\n 2. i1\n"));
        assert!(out.ends_with("10. i9\n"));
    }

    #[test]
    fn test_blockquote_prefixes_every_line() {
        let quote = Node::branch(
            NodeKind::Blockquote,
            Attrs::new(),
            vec![para(vec![text("a", Vec::new())]), para(vec![text("b", Vec::new())])],
        );
        assert_eq!(ser(&doc(vec![quote])), "> a\n>\n> b\n");
    }

    #[test]
    fn test_table_alignment_row() {
        let cell = |kind, s: &str, style: Option<&str>| {
            Node::branch(kind, crate::attrs! { "style" => style }, vec![text(s, Vec::new())])
        };
        let row = |cells| Node::branch(NodeKind::TableRow, Attrs::new(), cells);
        let head = Node::branch(
            NodeKind::TableHead,
            Attrs::new(),
            vec![row(vec![
                cell(NodeKind::TableHeader, "a", None),
                cell(NodeKind::TableHeader, "b", Some("text-align:right")),
                cell(NodeKind::TableHeader, "c", Some("text-align: center")),
            ])],
        );
        let body = Node::branch(
            NodeKind::TableBody,
            Attrs::new(),
            vec![row(vec![
                cell(NodeKind::TableCell, "1", None),
                cell(NodeKind::TableCell, "x|y", None),
                cell(NodeKind::TableCell, "3", None),
            ])],
        );
        let table = Node::branch(NodeKind::Table, Attrs::new(), vec![head, body]);
        assert_eq!(
            ser(&doc(vec![table])),
            "| a | b | c |\n| --- | ---:|:---:|\n| 1 | x\\|y | 3 |\n"
        );
    }

    #[test]
    fn test_empty_doc_is_single_newline() {
        assert_eq!(ser(&doc(vec![para(Vec::new())])), "\n");
    }
}
