//! Keeps the cursor in view. In typewriter mode the cursor line stays
//! centered and its block is highlighted.

use std::rc::Rc;

use super::Extension;
use crate::state::view::{Decoration, Widget};
use crate::state::{EditorState, Plugin};

#[derive(Debug, Default)]
pub struct Scroll {
    typewriter: bool,
}

impl Scroll {
    pub const fn new(typewriter: bool) -> Self {
        Self { typewriter }
    }
}

impl Plugin for Scroll {
    fn key(&self) -> &'static str {
        "scroll"
    }

    fn decorations(&self, state: &EditorState) -> Vec<Decoration> {
        let Some(head) = state.selection().head() else {
            return Vec::new();
        };
        let mut out = vec![Decoration::Widget {
            pos: head,
            widget: Widget::ScrollAnchor {
                center: self.typewriter,
            },
        }];
        if self.typewriter {
            let mut offset = 0;
            for block in state.doc().content() {
                let end = offset + block.node_size();
                if offset < head && head < end {
                    out.push(Decoration::Node {
                        from: offset,
                        to: end,
                        class: "typewriter-line".to_string(),
                    });
                    break;
                }
                offset = end;
            }
        }
        out
    }
}

pub fn extension(typewriter: bool) -> Extension {
    Extension::new("scroll").with_plugins(move |mut plugins, _schema| {
        plugins.push(Rc::new(Scroll::new(typewriter)));
        plugins
    })
}
