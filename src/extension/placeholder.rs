//! Hint text for an empty document.

use std::rc::Rc;

use super::Extension;
use crate::state::view::{Decoration, Widget};
use crate::state::{EditorState, Plugin};

pub const DEFAULT_TEXT: &str = "Just start typing...";

#[derive(Debug)]
pub struct Placeholder {
    text: String,
}

impl Placeholder {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl Plugin for Placeholder {
    fn key(&self) -> &'static str {
        "placeholder"
    }

    fn decorations(&self, state: &EditorState) -> Vec<Decoration> {
        let doc = state.doc();
        let empty = match doc.content() {
            [only] => only.is_textblock() && only.content_size() == 0,
            _ => false,
        };
        if !empty {
            return Vec::new();
        }
        vec![
            Decoration::Node {
                from: 0,
                to: doc.content_size(),
                class: "empty".to_string(),
            },
            Decoration::Widget {
                pos: 1,
                widget: Widget::Placeholder {
                    text: self.text.clone(),
                },
            },
        ]
    }
}

pub fn extension(text: &str) -> Extension {
    let text = text.to_string();
    Extension::new("placeholder").with_plugins(move |mut plugins, _schema| {
        plugins.push(Rc::new(Placeholder::new(text.clone())));
        plugins
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extension::tests::{rich_composition, rich_state, state_from_markdown};

    fn placeholder_text(state: &EditorState) -> Option<String> {
        rich_composition()
            .view
            .decorations(state)
            .into_iter()
            .find_map(|decoration| match decoration {
                Decoration::Widget {
                    widget: Widget::Placeholder { text },
                    ..
                } => Some(text),
                _ => None,
            })
    }

    #[test]
    fn test_empty_document_shows_placeholder() {
        let state = rich_state("");
        assert_eq!(placeholder_text(&state).as_deref(), Some(DEFAULT_TEXT));
        assert!(rich_composition().view.decorations(&state).contains(&Decoration::Node {
            from: 0,
            to: 2,
            class: "empty".to_string(),
        }));
    }

    #[test]
    fn test_placeholder_goes_away_with_content() {
        assert_eq!(placeholder_text(&rich_state("a")), None);
        assert_eq!(placeholder_text(&state_from_markdown("a\n\nb\n")), None);
    }
}
