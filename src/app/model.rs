use std::rc::Rc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::collab::{CollabError, CollabHandle};
use crate::config::Config;
use crate::error::ServiceError;
use crate::extension::{Composition, ExtensionProps, KeyBindings, create_extensions};
use crate::state::EditorState;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Phase {
    #[default]
    Loading,
    Initialized,
}

/// The current document. Persisted payloads stay raw JSON until they are
/// expressed under a schema.
#[derive(Debug, Clone)]
pub enum Text {
    Json(Value),
    State(EditorState),
}

/// A document set aside in the file list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct File {
    /// Serialized editor state (`{doc, selection}`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<Value>,
    /// Markdown body, for files that arrive as plain text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default)]
    pub markdown: bool,
}

impl File {
    /// A file must hold content or point at some.
    pub const fn is_valid(&self) -> bool {
        self.text.is_some() || self.body.is_some() || self.path.is_some()
    }
}

/// Collaboration as the model sees it. The session itself lives on the
/// controller; the model only keeps a weak handle for the cursor plugin.
#[derive(Debug, Clone)]
pub struct Collab {
    pub room: String,
    pub started: bool,
    pub handle: CollabHandle,
    pub error: Option<CollabError>,
}

impl Collab {
    pub fn new(room: impl Into<String>) -> Self {
        Self {
            room: room.into(),
            started: false,
            handle: CollabHandle::default(),
            error: None,
        }
    }
}

/// Launch arguments: a room to join or a state payload to open.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args {
    pub room: Option<String>,
    pub text: Option<Value>,
}

/// The complete controller state.
#[derive(Debug, Clone, Default)]
pub struct Model {
    pub phase: Phase,
    pub text: Option<Text>,
    /// Schema, plugins, and node views for the current mode.
    pub composition: Option<Composition>,
    pub markdown: bool,
    pub files: Vec<File>,
    pub config: Config,
    pub path: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
    pub collab: Option<Collab>,
    pub error: Option<ServiceError>,
    pub args: Args,
    pub keys: KeyBindings,
}

/// True for a serialized state whose document holds nothing.
fn json_is_empty(value: &Value) -> bool {
    value
        .pointer("/doc/content")
        .and_then(Value::as_array)
        .is_none_or(|blocks| {
            blocks.is_empty()
                || (blocks.len() == 1
                    && blocks[0]
                        .get("content")
                        .and_then(Value::as_array)
                        .is_none_or(Vec::is_empty))
        })
}

impl Model {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn editor_state(&self) -> Option<&EditorState> {
        match &self.text {
            Some(Text::State(state)) => Some(state),
            _ => None,
        }
    }

    pub fn is_initialized(&self) -> bool {
        matches!(self.phase, Phase::Initialized) && self.editor_state().is_some()
    }

    pub fn collab_started(&self) -> bool {
        self.collab.as_ref().is_some_and(|collab| collab.started)
    }

    pub fn is_empty(&self) -> bool {
        match &self.text {
            None => true,
            Some(Text::State(state)) => state.doc().is_empty_doc(),
            Some(Text::Json(value)) => json_is_empty(value),
        }
    }

    /// The current document in its persisted form.
    pub fn text_json(&self) -> Option<Value> {
        match &self.text {
            None => None,
            Some(Text::State(state)) => Some(state.to_json()),
            Some(Text::Json(value)) => Some(value.clone()),
        }
    }

    /// The current document as a file entry.
    pub fn current_file(&self) -> File {
        File {
            text: self.text_json(),
            body: None,
            last_modified: self.last_modified,
            path: self.path.clone(),
            markdown: self.markdown,
        }
    }

    pub fn props(&self, markdown: bool) -> ExtensionProps {
        ExtensionProps {
            config: self.config.clone(),
            markdown,
            path: self.path.clone(),
            keys: self.keys.clone(),
            collab: self
                .collab
                .as_ref()
                .filter(|collab| collab.started)
                .map(|collab| collab.handle.clone()),
        }
    }

    /// Build the composition for `markdown` mode.
    pub fn compose(&self, markdown: bool) -> Result<Composition, ServiceError> {
        let composition = Composition::new(&create_extensions(&self.props(markdown)))?;
        Ok(composition)
    }

    /// Express the current text under a fresh composition for the current
    /// mode. A payload the schema rejects stays raw and sets the error.
    #[must_use]
    pub fn recompose(mut self) -> Self {
        let composition = match self.compose(self.markdown) {
            Ok(composition) => composition,
            Err(err) => {
                self.error = Some(err);
                return self;
            }
        };
        let schema = Rc::clone(&composition.schema);
        let plugins = composition.plugins.clone();
        let next = match self.text.take() {
            None => composition.state(None),
            Some(Text::State(state)) => state.reconfigure(schema, plugins).inspect_err(|_| {
                self.text = Some(Text::State(state.clone()));
            }),
            Some(Text::Json(value)) => match composition.state_from_json(&value) {
                Ok(state) => Ok(state),
                Err(err) => {
                    self.text = Some(Text::Json(value));
                    Err(err)
                }
            },
        };
        match next {
            Ok(state) => self.text = Some(Text::State(state)),
            Err(err) => {
                let err = ServiceError::from(err);
                tracing::warn!(error = %err, "document does not fit the schema");
                self.error = Some(match self.text_json() {
                    Some(payload) => err.with_props(payload),
                    None => err,
                });
            }
        }
        self.composition = Some(composition);
        self
    }
}
