//! Markdown interop: comrak-backed parsing into document trees and a
//! table-driven serializer back to markdown text.
//!
//! Only the markup the supported node and mark set can express survives a
//! round trip. Anything else degrades to paragraph text.

mod parser;
mod serializer;

pub use parser::MarkdownParser;
pub use serializer::{MarkdownSerializer, MissingHandler};

use crate::document::{Attrs, Node, NodeKind, Schema, SchemaError};
use crate::perf;

/// Parse markdown `source` into a document valid under `schema`. Never fails.
pub fn parse(schema: &Schema, source: &str) -> Node {
    let _scope = perf::scope(perf::PARSE);
    MarkdownParser::new(schema).parse(source)
}

/// Serialize `doc` to markdown. The result ends with exactly one newline.
pub fn serialize(doc: &Node) -> String {
    let _scope = perf::scope(perf::SERIALIZE);
    MarkdownSerializer::default().serialize(doc)
}

/// Markdown text held by a source-mode document: one line per top-level
/// paragraph.
pub fn source_text(doc: &Node) -> String {
    let mut text = String::new();
    doc.for_each_child(|block, _, _| {
        text.push_str(&block.text_content());
        text.push('\n');
    });
    text
}

/// Lay `markdown` out as a source-mode document, one paragraph per line.
pub fn source_doc(schema: &Schema, markdown: &str) -> Result<Node, SchemaError> {
    let body = markdown.strip_suffix('\n').unwrap_or(markdown);
    let paragraphs = body
        .split('\n')
        .map(|line| {
            let content = if line.is_empty() {
                Vec::new()
            } else {
                vec![schema.text(line, Vec::new())?]
            };
            schema.node(NodeKind::Paragraph, Attrs::new(), content)
        })
        .collect::<Result<Vec<_>, _>>()?;
    schema.node(NodeKind::Doc, Attrs::new(), paragraphs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extension::base::plain_schema_spec;
    use crate::extension::tests::rich_composition;

    fn plain() -> Schema {
        Schema::new(plain_schema_spec()).unwrap()
    }

    #[test]
    fn test_source_doc_is_one_paragraph_per_line() {
        let doc = source_doc(&plain(), "# Title\n\nbody\n").unwrap();
        assert_eq!(doc.child_count(), 3);
        assert_eq!(doc.content()[0].text_content(), "# Title");
        assert_eq!(doc.content()[1].child_count(), 0);
        assert_eq!(source_text(&doc), "# Title\n\nbody\n");
    }

    #[test]
    fn test_rich_to_source_and_back() {
        let schema = rich_composition().schema;
        let rich = parse(&schema, "# Title\n\n* a\n* b\n");
        let source = source_doc(&plain(), &serialize(&rich)).unwrap();
        let back = parse(&schema, &source_text(&source));
        assert_eq!(back, rich);
    }

    #[test]
    fn test_empty_source_is_empty_paragraph() {
        let doc = source_doc(&plain(), "").unwrap();
        assert!(doc.is_empty_doc());
    }
}
