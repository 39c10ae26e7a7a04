use chrono::{DateTime, Utc};

use crate::app::Model;
use crate::app::model::{Args, Collab, File, Phase, Text};
use crate::app::persistence::PersistedState;
use crate::collab::{CollabError, CollabHandle};
use crate::config::{Config, ConfigPatch};
use crate::error::ServiceError;
use crate::markdown;
use crate::state::{Transaction, commands};

/// Everything that can happen to the controller state.
///
/// IO happens around [`update`]: the controller loads and stores, connects
/// transports, and reads the clock, then hands the results in as messages.
#[derive(Debug, Clone)]
pub enum Msg {
    /// Persisted state (or why it could not be loaded) plus launch args
    Loaded {
        persisted: Result<Option<PersistedState>, ServiceError>,
        args: Args,
        at: DateTime<Utc>,
    },
    /// Apply an editor transaction
    Apply { tr: Transaction, at: DateTime<Utc> },
    /// Rotate to the previous file, or clear the document in place
    Discard,
    /// Set the current document aside and start an empty one
    NewFile,
    /// Open a file, backing up the current document
    OpenFile(File),
    /// Switch between rich text and markdown source
    ToggleMarkdown,
    /// About to connect to `room`; `join` is false when the room is new
    CollabStarting { room: String, join: bool },
    CollabStarted(CollabHandle),
    /// The session error changed; `None` clears it
    CollabError(Option<CollabError>),
    CollabStopped,
    UpdateConfig { patch: ConfigPatch, at: DateTime<Utc> },
    UpdatePath { path: Option<String>, at: DateTime<Utc> },
    /// Reset to a fresh state, dropping whatever was loaded
    Clean { at: DateTime<Utc> },
}

/// Pure state transition.
pub fn update(model: Model, msg: Msg) -> Model {
    match msg {
        Msg::Loaded { persisted, args, at } => loaded(model, persisted, args, at),
        Msg::Apply { tr, at } => apply(model, &tr, at),
        Msg::Discard => discard(model),
        Msg::NewFile => new_file(model),
        Msg::OpenFile(file) => {
            let mut model = open_file(model, file);
            model.collab = None;
            model
        }
        Msg::ToggleMarkdown => toggle_markdown(model),
        Msg::CollabStarting { room, join } => collab_starting(model, room, join),
        Msg::CollabStarted(handle) => {
            let mut model = model;
            if let Some(collab) = model.collab.as_mut() {
                collab.started = true;
                collab.handle = handle;
                collab.error = None;
            }
            model.recompose()
        }
        Msg::CollabError(error) => {
            let mut model = model;
            if let Some(collab) = model.collab.as_mut() {
                collab.error = error;
            }
            model
        }
        Msg::CollabStopped => {
            let mut model = model;
            let started = model.collab_started();
            model.collab = None;
            if started { model.recompose() } else { model }
        }
        Msg::UpdateConfig { patch, at } => update_config(model, &patch, at),
        Msg::UpdatePath { path, at } => Model {
            path,
            last_modified: Some(at),
            ..model
        },
        Msg::Clean { at } => clean(model, at),
    }
}

fn loaded(model: Model, persisted: Result<Option<PersistedState>, ServiceError>, args: Args, at: DateTime<Utc>) -> Model {
    let mut model = match persisted {
        Ok(Some(state)) => restore(model, state),
        Ok(None) => model,
        Err(err) => {
            tracing::warn!(error = %err, "stored state rejected");
            Model {
                error: Some(err),
                ..model
            }
        }
    };
    model.args = args.clone();
    model.phase = Phase::Initialized;

    if args.room.is_some() {
        // The controller connects; the document is whatever was restored.
        return model.recompose();
    }
    if let Some(text) = args.text {
        return open_file(
            model,
            File {
                text: Some(text),
                last_modified: Some(at),
                ..File::default()
            },
        );
    }
    let model = model.recompose();
    tracing::debug!(
        files = model.files.len(),
        markdown = model.markdown,
        error = model.error.is_some(),
        "initialized"
    );
    model
}

fn restore(model: Model, state: PersistedState) -> Model {
    let text = state.text().cloned().map(Text::Json);
    Model {
        text,
        markdown: state.markdown,
        files: state.files,
        config: state.config,
        path: state.path,
        last_modified: state.last_modified,
        collab: state.collab.room.map(Collab::new),
        ..model
    }
}

fn apply(model: Model, tr: &Transaction, at: DateTime<Utc>) -> Model {
    let Some(Text::State(state)) = &model.text else {
        return model;
    };
    let next = state.apply(tr);
    let last_modified = if tr.doc_changed() {
        Some(at)
    } else {
        model.last_modified
    };
    Model {
        text: Some(Text::State(next)),
        last_modified,
        ..model
    }
}

/// Load `file` as the current document.
fn load_file(model: Model, file: File) -> Model {
    let mut model = Model {
        text: file.text.map(Text::Json),
        markdown: file.markdown,
        path: file.path,
        last_modified: file.last_modified,
        error: None,
        ..model
    };
    let Some(body) = file.body.filter(|_| model.text.is_none()) else {
        return model.recompose();
    };
    match model.compose(model.markdown) {
        Ok(composition) => {
            let doc = if model.markdown {
                markdown::source_doc(&composition.schema, &body).map_err(ServiceError::from)
            } else {
                Ok(markdown::parse(&composition.schema, &body))
            };
            match doc.and_then(|doc| composition.state(Some(doc)).map_err(ServiceError::from)) {
                Ok(state) => {
                    model.text = Some(Text::State(state));
                    model.composition = Some(composition);
                    model
                }
                Err(err) => Model {
                    error: Some(err),
                    ..model.recompose()
                },
            }
        }
        Err(err) => Model {
            error: Some(err),
            ..model
        },
    }
}

fn discard(model: Model) -> Model {
    let rotate = model.path.is_some() || (!model.files.is_empty() && model.is_empty());
    if rotate {
        return discard_text(model);
    }
    // Unpathed content is cleared in place and never becomes a file.
    let Some(state) = model.editor_state() else {
        return model;
    };
    let Some(select) = commands::select_all()(state) else {
        return model;
    };
    let selected = state.apply(&select);
    let cleared = commands::delete_selection()(&selected).map_or_else(|| selected.clone(), |tr| selected.apply(&tr));
    tracing::debug!("discarded content in place");
    Model {
        text: Some(Text::State(cleared)),
        ..model
    }
}

fn discard_text(mut model: Model) -> Model {
    let previous = model.files.pop();
    if model.path.is_some() {
        let current = model.current_file();
        model.files.retain(|file| file.path != current.path);
        model.files.push(current);
    }
    let Some(file) = previous else {
        tracing::debug!("discarded to an empty document");
        return Model {
            text: None,
            last_modified: None,
            path: None,
            error: None,
            ..model
        }
        .recompose();
    };
    tracing::debug!(path = ?file.path, "discarded to previous file");
    let mut model = load_file(model, file);
    model.collab = None;
    model
}

fn new_file(mut model: Model) -> Model {
    if model.is_empty() && model.path.is_none() {
        return model;
    }
    let file = model.current_file();
    model.files.push(file);
    Model {
        text: None,
        path: None,
        last_modified: None,
        collab: None,
        error: None,
        ..model
    }
    .recompose()
}

fn open_file(mut model: Model, mut file: File) -> Model {
    let index = model
        .files
        .iter()
        .position(|f| *f == file || (file.path.is_some() && f.path == file.path));
    if let Some(index) = index {
        let item = model.files.remove(index);
        file.last_modified = item.last_modified;
    }
    if !model.is_empty() {
        let current = model.current_file();
        model.files.push(current);
    }
    tracing::debug!(path = ?file.path, files = model.files.len(), "opened file");
    load_file(model, file)
}

fn toggle_markdown(model: Model) -> Model {
    let Some(state) = model.editor_state() else {
        return model;
    };
    let markdown = !model.markdown;
    let composition = match model.compose(markdown) {
        Ok(composition) => composition,
        Err(err) => {
            return Model {
                error: Some(err),
                ..model
            };
        }
    };
    let doc = if markdown {
        markdown::source_doc(&composition.schema, &markdown::serialize(state.doc())).map_err(ServiceError::from)
    } else {
        Ok(markdown::parse(
            &composition.schema,
            &markdown::source_text(state.doc()),
        ))
    };
    match doc.and_then(|doc| composition.state(Some(doc)).map_err(ServiceError::from)) {
        Ok(state) => {
            tracing::debug!(markdown, "toggled markdown mode");
            Model {
                text: Some(Text::State(state)),
                composition: Some(composition),
                markdown,
                ..model
            }
        }
        Err(err) => Model {
            error: Some(err),
            ..model
        },
    }
}

fn collab_starting(mut model: Model, room: String, join: bool) -> Model {
    let backup = join && model.collab.as_ref().is_none_or(|collab| collab.room != room);
    if (backup && !model.is_empty()) || model.path.is_some() {
        if model.error.is_none() {
            let file = model.current_file();
            model.files.push(file);
        }
        model.last_modified = None;
        model.path = None;
        model.error = None;
        if backup {
            // The room's content replaces the local document.
            model.text = None;
        }
    }
    model.collab = Some(Collab::new(room));
    model.recompose()
}

/// Apply a config patch. A patch that fails validation leaves the model
/// untouched; callers check it first with [`Config::validate`].
fn update_config(model: Model, patch: &ConfigPatch, at: DateTime<Utc>) -> Model {
    let config: Config = model.config.merge(patch);
    if let Err(err) = config.validate() {
        tracing::warn!(error = %err, "config patch rejected");
        return model;
    }
    Model {
        config,
        last_modified: Some(at),
        ..model
    }
    .recompose()
}

fn clean(model: Model, at: DateTime<Utc>) -> Model {
    tracing::info!("state cleaned");
    Model {
        phase: Phase::Initialized,
        last_modified: Some(at),
        keys: model.keys,
        ..Model::default()
    }
    .recompose()
}
