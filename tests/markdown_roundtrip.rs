use draftsmith::document::{Attrs, MarkKind, Node, NodeKind, Schema};
use draftsmith::extension::{Composition, ExtensionProps, create_extensions};
use draftsmith::markdown::{parse, serialize};
use proptest::prelude::*;

fn rich_schema() -> std::rc::Rc<Schema> {
    Composition::new(&create_extensions(&ExtensionProps::default()))
        .unwrap()
        .schema
}

/// Parse `source`, then check the serialized form parses back to the same tree.
fn assert_round_trip(source: &str) -> Node {
    let schema = rich_schema();
    let doc = parse(&schema, source);
    let text = serialize(&doc);
    assert!(text.ends_with('\n') && !text.ends_with("\n\n"), "{text:?}");
    assert_eq!(parse(&schema, &text), doc, "source {source:?} serialized as {text:?}");
    doc
}

/// A document holding one paragraph of unmarked `text`.
fn paragraph_doc(schema: &Schema, text: &str) -> Node {
    let para = schema
        .node(NodeKind::Paragraph, Attrs::new(), vec![schema.text(text, Vec::new()).unwrap()])
        .unwrap();
    schema.node(NodeKind::Doc, Attrs::new(), vec![para]).unwrap()
}

fn find(doc: &Node, kind: NodeKind) -> Option<Node> {
    let mut found = None;
    doc.descendants(&mut |node, _, _| {
        if found.is_none() && node.kind() == kind {
            found = Some(node.clone());
        }
        found.is_none()
    });
    found
}

#[test]
fn test_formatted_paragraph() {
    let doc = assert_round_trip("plain **bold** *italic* ~~struck~~ end\n");
    let para = &doc.content()[0];
    let marks: Vec<MarkKind> = para
        .content()
        .iter()
        .flat_map(|text| text.marks().iter().map(|mark| mark.kind()))
        .collect();
    assert!(marks.contains(&MarkKind::Strong));
    assert!(marks.contains(&MarkKind::Em));
    assert!(marks.contains(&MarkKind::Strikethrough));
}

#[test]
fn test_bullet_lists_tight_and_loose() {
    let tight = assert_round_trip("* one\n* two\n");
    assert_eq!(tight.content()[0].kind(), NodeKind::BulletList);
    assert_eq!(tight.content()[0].attr_bool("tight"), Some(true));

    let loose = assert_round_trip("* one\n\n* two\n");
    assert_eq!(loose.content()[0].attr_bool("tight"), Some(false));
}

#[test]
fn test_ordered_lists_tight_and_loose() {
    let tight = assert_round_trip("1. one\n2. two\n");
    assert_eq!(tight.content()[0].kind(), NodeKind::OrderedList);
    assert_eq!(tight.content()[0].attr_bool("tight"), Some(true));

    let loose = assert_round_trip("4. four\n\n5. five\n");
    assert_eq!(loose.content()[0].attr_u64("order"), Some(4));
    assert_eq!(loose.content()[0].attr_bool("tight"), Some(false));
}

#[test]
fn test_table_with_right_aligned_column() {
    let doc = assert_round_trip("| name | count |\n| --- | ---: |\n| apples | 3 |\n");
    let header = find(&doc, NodeKind::TableHeader).unwrap();
    assert_eq!(header.text_content(), "name");
    let row = find(&doc, NodeKind::TableHead).unwrap();
    let aligned = &row.content()[0].content()[1];
    assert_eq!(aligned.attr_str("style"), Some("text-align: right"));
}

#[test]
fn test_done_todo_item() {
    let doc = assert_round_trip("- [x] ship it\n");
    let todo = find(&doc, NodeKind::TodoItem).unwrap();
    assert_eq!(todo.attr_bool("done"), Some(true));
    assert_eq!(todo.text_content(), "ship it");
}

#[test]
fn test_image_with_alt_text() {
    let doc = assert_round_trip("![a small cat](cat.png)\n");
    let image = find(&doc, NodeKind::Image).unwrap();
    assert_eq!(image.attr_str("src"), Some("cat.png"));
    assert_eq!(image.attr_str("alt"), Some("a small cat"));
}

#[test]
fn test_fenced_code_with_language() {
    let doc = assert_round_trip("```rust\nfn main() {}\n```\n");
    let block = &doc.content()[0];
    assert_eq!(block.kind(), NodeKind::CodeBlock);
    assert_eq!(block.attr_str("lang"), Some("rust"));
    assert_eq!(block.text_content(), "fn main() {}");
}

#[test]
fn test_mixed_document() {
    assert_round_trip(
        "# Notes\n\nSee [docs](https://example.com) for `details`.\n\n> quoted\n\n---\n\n* a\n* b\n",
    );
}

#[test]
fn test_fixture_document() {
    let doc = assert_round_trip(include_str!("fixtures/sample.md"));
    assert!(find(&doc, NodeKind::Table).is_some());
    assert!(find(&doc, NodeKind::HardBreak).is_some());
    assert_eq!(doc.content()[0].text_content(), "Release notes");
}

#[test]
fn test_paragraph_text_that_looks_like_block_syntax() {
    let schema = rich_schema();
    for text in [
        "---", "___", "***", "- - -", "===", "    indented", "\tindented", "  two", "trailing ", "<div>",
        "# not a heading", "+ plus", "> not quoted", "1. one", "a &amp; b",
    ] {
        let doc = paragraph_doc(&schema, text);
        let markdown = serialize(&doc);
        assert_eq!(parse(&schema, &markdown), doc, "{text:?} serialized as {markdown:?}");
    }
}

mod property_tests {
    use super::*;

    fn word() -> impl Strategy<Value = String> {
        "[a-z]{1,8}"
    }

    fn inline() -> impl Strategy<Value = String> {
        (word(), 0..3u8).prop_map(|(word, style)| match style {
            0 => word,
            1 => format!("**{word}**"),
            _ => format!("*{word}*"),
        })
    }

    fn paragraph() -> impl Strategy<Value = String> {
        prop::collection::vec(inline(), 1..6).prop_map(|words| words.join(" "))
    }

    fn block() -> impl Strategy<Value = String> {
        prop_oneof![
            paragraph(),
            (1..4u8, paragraph()).prop_map(|(level, text)| format!("{} {text}", "#".repeat(level as usize))),
            prop::collection::vec(paragraph(), 1..4)
                .prop_map(|items| items.iter().map(|item| format!("* {item}")).collect::<Vec<_>>().join("\n")),
        ]
    }

    proptest! {
        #[test]
        fn test_generated_paragraph_text_round_trips(text in "[ a-z#>=_*+<&-]{1,12}") {
            let schema = rich_schema();
            let doc = paragraph_doc(&schema, &text);
            prop_assert_eq!(parse(&schema, &serialize(&doc)), doc);
        }

        #[test]
        fn test_generated_documents_round_trip(blocks in prop::collection::vec(block(), 1..6)) {
            let schema = rich_schema();
            let source = format!("{}\n", blocks.join("\n\n"));
            let doc = parse(&schema, &source);
            let text = serialize(&doc);
            prop_assert_eq!(parse(&schema, &text), doc);
            prop_assert_eq!(serialize(&parse(&schema, &text)), text);
        }
    }
}
