//! Which extensions make up each editing mode.

use super::{
    Extension, ExtensionProps, appearance, base, code, collab, custom_keymap, drag_handle, image,
    link, markdown_rules, paste_markdown, placeholder, scroll, strikethrough, table, todo_list,
};

/// The ordered extension list for `props`. Same props, same list.
pub fn create_extensions(props: &ExtensionProps) -> Vec<Extension> {
    let mut extensions = vec![
        placeholder::extension(placeholder::DEFAULT_TEXT),
        custom_keymap::extension(props),
        base::extension(props),
        appearance::extension(&props.config),
        scroll::extension(props.config.typewriter_mode),
    ];
    if !props.markdown {
        extensions.extend([
            markdown_rules::extension(),
            todo_list::extension(),
            drag_handle::extension(),
            code::extension(),
            strikethrough::extension(),
            link::extension(),
            table::extension(),
            image::extension(props.path.clone()),
            paste_markdown::extension(),
        ]);
    }
    if let Some(handle) = &props.collab {
        extensions.push(collab::extension(handle.clone()));
    }
    tracing::debug!(
        markdown = props.markdown,
        collab = props.collab.is_some(),
        count = extensions.len(),
        "extensions created"
    );
    extensions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::CollabHandle;
    use crate::config::Config;
    use crate::document::{MarkKind, NodeKind};
    use crate::extension::Composition;
    use crate::state::view::{Decoration, Widget};

    fn names(props: &ExtensionProps) -> Vec<&'static str> {
        create_extensions(props).iter().map(Extension::name).collect()
    }

    #[test]
    fn test_rich_mode_order() {
        assert_eq!(
            names(&ExtensionProps::default()),
            vec![
                "placeholder",
                "custom-keymap",
                "base",
                "appearance",
                "scroll",
                "markdown-rules",
                "todo-list",
                "drag-handle",
                "code",
                "strikethrough",
                "link",
                "table",
                "image",
                "paste-markdown",
            ]
        );
    }

    #[test]
    fn test_markdown_mode_is_plain() {
        let props = ExtensionProps {
            markdown: true,
            ..ExtensionProps::default()
        };
        assert_eq!(
            names(&props),
            vec!["placeholder", "custom-keymap", "base", "appearance", "scroll"]
        );
        let composition = Composition::new(&create_extensions(&props)).unwrap();
        assert!(!composition.schema.has_node(NodeKind::Table));
        assert!(!composition.schema.has_mark(MarkKind::Strikethrough));
    }

    #[test]
    fn test_collab_comes_last() {
        let props = ExtensionProps {
            collab: Some(CollabHandle::default()),
            ..ExtensionProps::default()
        };
        assert_eq!(names(&props).last(), Some(&"collab"));
        let composition = Composition::new(&create_extensions(&props)).unwrap();
        assert_eq!(composition.plugin_keys().last(), Some(&"collab"));
    }

    #[test]
    fn test_typewriter_mode_reaches_the_scroll_plugin() {
        let props = ExtensionProps {
            config: Config {
                typewriter_mode: true,
                ..Config::default()
            },
            ..ExtensionProps::default()
        };
        let composition = Composition::new(&create_extensions(&props)).unwrap();
        let state = composition.state(None).unwrap();
        assert!(composition.view.decorations(&state).contains(&Decoration::Widget {
            pos: 1,
            widget: Widget::ScrollAnchor { center: true },
        }));
    }

    #[test]
    fn test_rich_schema_has_every_contribution() {
        let schema = Composition::new(&create_extensions(&ExtensionProps::default()))
            .unwrap()
            .schema;
        for kind in [NodeKind::Table, NodeKind::TodoItem, NodeKind::Image, NodeKind::CodeBlock] {
            assert!(schema.has_node(kind), "{kind:?}");
        }
        assert!(schema.has_mark(MarkKind::Strikethrough));
        assert!(schema.has_mark(MarkKind::Link));
    }
}
