//! Images: markdown input rule, resize view, and pasting image URLs.

use std::path::Path;
use std::rc::Rc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Value, json};

use super::Extension;
use crate::document::{Attrs, Node, NodeKind};
use crate::state::input::{InputRule, InputRules, PasteEvent};
use crate::state::view::{NodeView, NodeViewEvent};
use crate::state::{EditorState, Plugin, Transaction, meta};

static IMAGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^!\[([^\[\]]*?)\]\((.+?)\)\s$").unwrap());

const IMAGE_EXTENSIONS: [&str; 7] = ["png", "jpg", "jpeg", "gif", "webp", "svg", "avif"];

fn is_url(src: &str) -> bool {
    src.starts_with("http://") || src.starts_with("https://")
}

fn looks_like_image(src: &str) -> bool {
    let path = src.split(['?', '#']).next().unwrap_or(src);
    Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

/// Local file path for a relative `src`, resolved against the directory of
/// the document at `doc_path`.
pub fn resolve_path(doc_path: Option<&str>, src: &str) -> Option<String> {
    if is_url(src) || src.starts_with("data:") {
        return None;
    }
    let base = Path::new(doc_path?).parent()?;
    Some(base.join(src).to_string_lossy().into_owned())
}

fn image_node(state: &EditorState, src: &str, alt: Option<&str>, doc_path: Option<&str>) -> Option<Node> {
    let attrs = crate::attrs! {
        "src" => src,
        "alt" => alt.filter(|alt| !alt.is_empty()),
        "path" => resolve_path(doc_path, src),
    };
    state.schema().node(NodeKind::Image, attrs, Vec::new()).ok()
}

fn image_rule(doc_path: Option<String>) -> InputRule {
    InputRule::new(IMAGE.clone(), move |state, caps, from, to| {
        let src = &caps[2];
        if !is_url(src) && doc_path.is_none() {
            return None;
        }
        let node = image_node(state, src, Some(&caps[1]), doc_path.as_deref())?;
        let mut tr = state.tr();
        tr.replace(from, to, vec![node]).ok()?;
        tr.set_selection(crate::state::Selection::cursor(from + 1));
        Some(tr)
    })
}

/// Drag handle on the image reports the new width.
#[derive(Debug, Default)]
pub struct ImageResize;

impl NodeView for ImageResize {
    fn handle(&self, state: &EditorState, pos: usize, node: &Node, event: &NodeViewEvent) -> Option<Transaction> {
        let NodeViewEvent::Resize { width } = *event else {
            return None;
        };
        if node.attr_u64("width") == Some(u64::from(width)) {
            return None;
        }
        let mut attrs: Attrs = node.attrs().clone();
        attrs.insert("width".to_string(), json!(width));
        let mut tr = state.tr();
        tr.set_node_markup(pos, None, attrs).ok()?;
        Some(tr)
    }
}

/// Pasting or dropping a lone image URL inserts the image inline.
#[derive(Debug, Default)]
pub struct ImagePaste {
    doc_path: Option<String>,
}

impl ImagePaste {
    fn insert(&self, state: &EditorState, text: &str, at: Option<usize>) -> Option<Transaction> {
        let src = text.trim();
        if src.contains(char::is_whitespace) || !is_url(src) || !looks_like_image(src) {
            return None;
        }
        let node = image_node(state, src, None, self.doc_path.as_deref())?;
        let mut tr = state.tr();
        match at {
            Some(pos) => {
                let pos = crate::state::Selection::near(state.doc(), pos, crate::state::Assoc::After).from();
                tr.replace(pos, pos, vec![node]).ok()?;
            }
            None => {
                tr.replace_selection_with(node).ok()?;
                tr.set_meta(meta::PASTE, true);
            }
        }
        Some(tr)
    }
}

impl Plugin for ImagePaste {
    fn key(&self) -> &'static str {
        "image-paste"
    }

    fn handle_paste(&self, state: &EditorState, event: &PasteEvent) -> Option<Transaction> {
        self.insert(state, event.text.as_deref()?, None)
    }

    fn handle_drop(&self, state: &EditorState, pos: usize, text: &str) -> Option<Transaction> {
        self.insert(state, text, Some(pos))
    }
}

pub fn extension(doc_path: Option<String>) -> Extension {
    let rule_path = doc_path.clone();
    Extension::new("image")
        .with_schema(|spec| {
            let Some(image) = spec.node(NodeKind::Image).cloned() else {
                return spec;
            };
            spec.update_node(
                NodeKind::Image,
                image
                    .attr("path", Some(Value::Null))
                    .attr("width", Some(Value::Null)),
            )
        })
        .with_plugins(move |mut plugins, _schema| {
            plugins.push(Rc::new(InputRules::new("image", vec![image_rule(rule_path.clone())])));
            plugins.push(Rc::new(ImagePaste {
                doc_path: doc_path.clone(),
            }));
            plugins
        })
        .with_node_view(NodeKind::Image, Rc::new(ImageResize))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extension::tests::{rich_composition, rich_props, rich_state, state_from_markdown};
    use crate::extension::{Composition, ExtensionProps, create_extensions};
    use crate::markdown::serialize;
    use crate::state::input::InputEvent;

    fn type_text(view: &crate::state::view::EditorView, state: &EditorState, text: &str) -> EditorState {
        text.chars().fold(state.clone(), |state, ch| {
            state.apply(&view.handle_input(&state, &InputEvent::Text(ch.to_string())).unwrap())
        })
    }

    #[test]
    fn test_markdown_image_syntax_inserts_image() {
        let view = rich_composition().view;
        let state = type_text(&view, &rich_state(""), "![cat](https://x.io/c.png) ");
        let para = &state.doc().content()[0];
        assert_eq!(para.content()[0].kind(), NodeKind::Image);
        assert_eq!(para.content()[0].attr_str("alt"), Some("cat"));
        assert_eq!(serialize(state.doc()), "![cat](https://x.io/c.png)\n");
    }

    #[test]
    fn test_relative_image_needs_document_path() {
        let view = rich_composition().view;
        let state = type_text(&view, &rich_state(""), "![a](img/a.png) ");
        assert_eq!(state.doc().content()[0].content()[0].kind(), NodeKind::Text);

        let composition = Composition::new(&create_extensions(&ExtensionProps {
            path: Some("/notes/today.md".to_string()),
            ..rich_props()
        }))
        .unwrap();
        let state = composition.state(None).unwrap();
        let state = type_text(&composition.view, &state, "![a](img/a.png) ");
        let image = &state.doc().content()[0].content()[0];
        assert_eq!(image.kind(), NodeKind::Image);
        assert_eq!(image.attr_str("path"), Some("/notes/img/a.png"));
    }

    #[test]
    fn test_resize_sets_width() {
        let state = state_from_markdown("![x](https://x.io/a.png)\n");
        let view = rich_composition().view;
        let resize = InputEvent::NodeView {
            pos: 1,
            event: NodeViewEvent::Resize { width: 320 },
        };
        let next = state.apply(&view.handle_input(&state, &resize).unwrap());
        let image = &next.doc().content()[0].content()[0];
        assert_eq!(image.attr_u64("width"), Some(320));
        assert_eq!(image.attr_str("src"), Some("https://x.io/a.png"));
        assert!(view.handle_input(&next, &resize).is_none());
    }

    #[test]
    fn test_pasting_image_url_inserts_image() {
        let state = rich_state("");
        let view = rich_composition().view;
        let paste = InputEvent::Paste(PasteEvent {
            text: Some("https://x.io/a.PNG".to_string()),
            ..PasteEvent::default()
        });
        let next = state.apply(&view.handle_input(&state, &paste).unwrap());
        assert_eq!(next.doc().content()[0].content()[0].kind(), NodeKind::Image);
    }

    #[test]
    fn test_non_image_url_is_not_an_image() {
        assert!(!looks_like_image("https://x.io/page"));
        assert!(looks_like_image("https://x.io/a.jpg?size=2"));
        assert_eq!(resolve_path(Some("/a/b.md"), "https://x.io/a.png"), None);
    }
}
