//! The editor controller.
//!
//! This module implements The Elm Architecture (TEA):
//! - [`Model`]: the complete controller state
//! - [`Msg`]: everything that can happen to it
//! - [`update`]: pure function for state transitions
//! - [`Controller`]: owns the model and performs the IO around `update`

mod effects;
mod model;
mod persistence;
mod update;

pub use effects::{Clock, ManualClock, SAVE_DEBOUNCE_MS, SystemClock};
pub use model::{Args, Collab, File, Model, Phase, Text};
pub use persistence::{
    FileStorage, MemoryStorage, PersistedCollab, PersistedState, STATE_KEY, Storage, StorageError, body_key,
    load_state, parse_state, save_state,
};
pub use update::{Msg, update};

use std::fmt;

use uuid::Uuid;

use crate::collab::{CollabSession, Provider};
use crate::config::{ConfigError, ConfigPatch};
use crate::error::ServiceError;
use crate::extension::KeyAction;
use crate::state::history;
use crate::state::input::InputEvent;
use crate::state::view::Decoration;
use crate::state::{EditorState, Transaction, meta};

use effects::SaveDebouncer;

/// Owns the model, the storage it persists to, and the collaboration
/// session. Driven by explicit calls from the host.
pub struct Controller {
    model: Model,
    storage: Box<dyn Storage>,
    provider: Box<dyn Provider>,
    clock: Box<dyn Clock>,
    saver: SaveDebouncer,
    session: Option<CollabSession>,
    user: Option<String>,
}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("model", &self.model)
            .field("session", &self.session)
            .field("save_pending", &self.saver.is_pending())
            .finish_non_exhaustive()
    }
}

impl Controller {
    pub fn new(
        storage: impl Storage + 'static,
        provider: impl Provider + 'static,
        clock: impl Clock + 'static,
    ) -> Self {
        Self {
            model: Model::default(),
            storage: Box::new(storage),
            provider: Box::new(provider),
            clock: Box::new(clock),
            saver: SaveDebouncer::new(SAVE_DEBOUNCE_MS),
            session: None,
            user: None,
        }
    }

    /// Name published to peers. Without one a name is generated.
    #[must_use]
    pub fn with_user(mut self, name: impl Into<String>) -> Self {
        self.user = Some(name.into());
        self
    }

    pub const fn model(&self) -> &Model {
        &self.model
    }

    pub fn state(&self) -> Option<&EditorState> {
        self.model.editor_state()
    }

    pub const fn session(&self) -> Option<&CollabSession> {
        self.session.as_ref()
    }

    pub const fn save_pending(&self) -> bool {
        self.saver.is_pending()
    }

    /// Run a message through [`update`] and then its side effects.
    pub fn dispatch(&mut self, msg: Msg) {
        let before = self.model.editor_state().map(|state| state.doc().clone());
        let remote = matches!(&msg, Msg::Apply { tr, .. } if tr.get_meta(meta::REMOTE).is_some());
        let model = std::mem::take(&mut self.model);
        self.model = update(model, msg);
        self.after_update(before.as_ref(), remote);
    }

    /// Load persisted state, then open whatever the launch args ask for.
    pub fn init(&mut self, args: Args) {
        let persisted = load_state(&*self.storage);
        let room = args.room.clone();
        let at = self.clock.now();
        self.dispatch(Msg::Loaded { persisted, args, at });
        if room.is_some() && self.model.error.is_none() {
            self.start_collab(room);
        }
    }

    pub fn apply(&mut self, tr: Transaction) {
        let at = self.clock.now();
        self.dispatch(Msg::Apply { tr, at });
    }

    /// Route one input event. Controller shortcuts run their action;
    /// everything else becomes an editor transaction.
    pub fn handle_input(&mut self, event: &InputEvent) -> bool {
        let tr = match (self.model.composition.as_ref(), self.model.editor_state()) {
            (Some(composition), Some(state)) => composition.view.handle_input(state, event),
            _ => None,
        };
        let Some(tr) = tr else {
            return false;
        };
        match KeyAction::from_transaction(&tr) {
            Some(action) => self.run_action(action),
            None => self.apply(tr),
        }
        true
    }

    pub fn run_action(&mut self, action: KeyAction) {
        tracing::debug!(action = action.name(), "key action");
        match action {
            KeyAction::New => self.new_file(),
            KeyAction::Discard => self.discard(),
            KeyAction::Undo => {
                self.undo();
            }
            KeyAction::Redo => {
                self.redo();
            }
            KeyAction::ToggleMarkdown => self.toggle_markdown(),
        }
    }

    pub fn decorations(&self) -> Vec<Decoration> {
        match (self.model.composition.as_ref(), self.model.editor_state()) {
            (Some(composition), Some(state)) => composition.view.decorations(state),
            _ => Vec::new(),
        }
    }

    pub fn discard(&mut self) {
        self.flush_body();
        let rotating = self.model.path.is_some() || (!self.model.files.is_empty() && self.model.is_empty());
        if rotating {
            if let Some(last) = self.model.files.pop() {
                let last = self.hydrate(last);
                self.model.files.push(last);
            }
        }
        self.dispatch(Msg::Discard);
    }

    pub fn new_file(&mut self) {
        self.flush_body();
        self.dispatch(Msg::NewFile);
    }

    pub fn open_file(&mut self, file: File) {
        self.flush_body();
        let file = self.hydrate(file);
        self.dispatch(Msg::OpenFile(file));
    }

    pub fn toggle_markdown(&mut self) {
        self.dispatch(Msg::ToggleMarkdown);
    }

    /// Join `room`, or create a new room when none is given.
    pub fn start_collab(&mut self, room: Option<String>) {
        self.flush_body();
        if let Some(session) = self.session.take() {
            session.stop();
        }
        let join = room.is_some();
        let room = room.unwrap_or_else(|| Uuid::new_v4().to_string());
        self.dispatch(Msg::CollabStarting {
            room: room.clone(),
            join,
        });
        let seed = if join {
            None
        } else {
            self.model.editor_state().map(|state| state.doc().clone())
        };
        let started = CollabSession::start(
            &*self.provider,
            &room,
            &self.model.config.signaling,
            effects::client_id(),
            self.user.as_deref(),
            seed.as_ref(),
        );
        match started {
            Ok(session) => {
                let handle = session.handle();
                self.session = Some(session);
                self.dispatch(Msg::CollabStarted(handle));
            }
            Err(err) => {
                tracing::warn!(room = %room, error = %err, "failed to start collaboration");
                self.dispatch(Msg::CollabError(Some(err)));
            }
        }
    }

    pub fn stop_collab(&mut self) {
        if let Some(session) = self.session.take() {
            session.stop();
        }
        self.dispatch(Msg::CollabStopped);
    }

    /// Retry a failed session without touching the document.
    pub fn restart_collab(&mut self) {
        let Some(room) = self.model.collab.as_ref().map(|collab| collab.room.clone()) else {
            return;
        };
        let Some(session) = self.session.as_mut() else {
            self.start_collab(Some(room));
            return;
        };
        let result = session.reconnect(&*self.provider, &self.model.config.signaling);
        self.dispatch(Msg::CollabError(result.err()));
    }

    /// Merge `patch` into the config. A rejected patch changes nothing and
    /// does not hold up saving.
    pub fn update_config(&mut self, patch: ConfigPatch) -> Result<(), ConfigError> {
        self.model.config.merge(&patch).validate()?;
        let at = self.clock.now();
        self.dispatch(Msg::UpdateConfig { patch, at });
        Ok(())
    }

    pub fn update_path(&mut self, path: Option<String>) {
        let at = self.clock.now();
        self.dispatch(Msg::UpdatePath { path, at });
    }

    /// Recovery: reset to a fresh state and persist it over whatever was
    /// stored.
    pub fn clean(&mut self) -> Result<(), ServiceError> {
        let at = self.clock.now();
        self.dispatch(Msg::Clean { at });
        self.save()
    }

    /// Undo through the shared document while collaborating, otherwise
    /// through the local history.
    pub fn undo(&mut self) -> bool {
        self.history_step(true)
    }

    pub fn redo(&mut self) -> bool {
        self.history_step(false)
    }

    fn history_step(&mut self, undo: bool) -> bool {
        if !self.model.is_initialized() {
            return false;
        }
        if self.model.collab_started() {
            let Some(session) = self.session.as_mut() else {
                return false;
            };
            let done = if undo { session.undo() } else { session.redo() };
            if done {
                self.pull_shared();
            }
            return done;
        }
        let command = if undo { history::undo() } else { history::redo() };
        let Some(tr) = self.model.editor_state().and_then(|state| command(state)) else {
            return false;
        };
        self.apply(tr);
        true
    }

    /// Poll the transport and flush a due save.
    pub fn tick(&mut self) {
        if let Some(session) = self.session.as_mut() {
            let changed = session.poll();
            let error = session.error().cloned();
            let known = self.model.collab.as_ref().and_then(|collab| collab.error.clone());
            if error != known {
                self.dispatch(Msg::CollabError(error));
            }
            if changed {
                self.pull_shared();
            }
        }
        if self.saver.take_ready(self.clock.now_ms()) {
            if let Err(err) = self.save_now() {
                tracing::warn!(error = %err, "failed to save state");
            }
        }
    }

    /// Persist immediately, dropping any pending debounced save.
    pub fn save(&mut self) -> Result<(), ServiceError> {
        self.saver.cancel();
        self.save_now()
    }

    /// Cancel the pending save and leave any session.
    pub fn close(&mut self) {
        self.saver.cancel();
        if let Some(session) = self.session.take() {
            session.stop();
        }
        tracing::debug!("controller closed");
    }
}
