//! Remote cursors for the peers of a collaboration session.

use std::rc::Rc;

use super::Extension;
use crate::collab::CollabHandle;
use crate::state::view::{Decoration, Widget};
use crate::state::{Assoc, EditorState, Plugin, Selection};

#[derive(Debug)]
pub struct RemoteCursors {
    handle: CollabHandle,
}

impl Plugin for RemoteCursors {
    fn key(&self) -> &'static str {
        "collab"
    }

    fn decorations(&self, state: &EditorState) -> Vec<Decoration> {
        let doc = state.doc();
        self.handle
            .peers()
            .into_iter()
            .filter_map(|peer| {
                let cursor = peer.state.cursor?.min(doc.content_size());
                Some(Decoration::Widget {
                    pos: Selection::near(doc, cursor, Assoc::After).from(),
                    widget: Widget::RemoteCursor {
                        client: peer.client,
                        name: peer.state.name,
                        color: peer.state.color,
                    },
                })
            })
            .collect()
    }
}

pub fn extension(handle: CollabHandle) -> Extension {
    Extension::new("collab").with_plugins(move |mut plugins, _schema| {
        plugins.push(Rc::new(RemoteCursors {
            handle: handle.clone(),
        }));
        plugins
    })
}
