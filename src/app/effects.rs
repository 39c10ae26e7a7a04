use std::cell::Cell;
use std::rc::Rc;

use chrono::{DateTime, TimeDelta, Utc};
use uuid::Uuid;

use crate::app::persistence::{self, PersistedState, body_key};
use crate::app::{Controller, File, Msg};
use crate::document::Node;
use crate::error::ServiceError;
use crate::markdown;
use crate::state::meta;

/// Quiescence window for persisting state.
pub const SAVE_DEBOUNCE_MS: u64 = 200;

pub trait Clock {
    fn now(&self) -> DateTime<Utc>;

    fn now_ms(&self) -> u64 {
        u64::try_from(self.now().timestamp_millis()).unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock(Rc<Cell<DateTime<Utc>>>);

impl Default for ManualClock {
    fn default() -> Self {
        Self(Rc::new(Cell::new(DateTime::<Utc>::UNIX_EPOCH)))
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, ms: i64) {
        self.0.set(self.0.get() + TimeDelta::milliseconds(ms));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.0.get()
    }
}

/// Trailing-edge debounce: each `queue` restarts the window.
#[derive(Debug)]
pub(super) struct SaveDebouncer {
    delay_ms: u64,
    pending: Option<u64>,
}

impl SaveDebouncer {
    pub(super) const fn new(delay_ms: u64) -> Self {
        Self {
            delay_ms,
            pending: None,
        }
    }

    pub(super) const fn queue(&mut self, now_ms: u64) {
        self.pending = Some(now_ms);
    }

    pub(super) fn take_ready(&mut self, now_ms: u64) -> bool {
        let Some(queued_at) = self.pending else {
            return false;
        };
        if now_ms.saturating_sub(queued_at) >= self.delay_ms {
            self.pending = None;
            true
        } else {
            false
        }
    }

    pub(super) const fn cancel(&mut self) {
        self.pending = None;
    }

    pub(super) const fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

/// A fresh collaboration client id.
pub(super) fn client_id() -> u64 {
    let bytes = *Uuid::new_v4().as_bytes();
    u64::from(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

impl Controller {
    /// Side effects of a transition: mirror local edits into the session,
    /// tear the session down when the model dropped collaboration, and
    /// schedule a save.
    pub(super) fn after_update(&mut self, before: Option<&Node>, remote: bool) {
        if self.model.collab.is_none() {
            if let Some(session) = self.session.take() {
                session.stop();
            }
        }
        let started = self.model.collab_started();
        if let (true, Some(session), Some(state)) = (started, self.session.as_mut(), self.model.editor_state()) {
            if !remote && before.is_some_and(|doc| doc != state.doc()) {
                session.local_change(state.doc());
            }
            session.set_cursor(state.selection().head());
        }
        if self.model.is_initialized() {
            self.saver.queue(self.clock.now_ms());
        }
    }

    /// Write the markdown body of a path-backed document.
    pub(super) fn flush_body(&self) {
        let (Some(path), Some(state)) = (self.model.path.as_deref(), self.model.editor_state()) else {
            return;
        };
        let body = if self.model.markdown {
            markdown::source_text(state.doc())
        } else {
            markdown::serialize(state.doc())
        };
        if let Err(err) = self.storage.set(&body_key(path), &body) {
            tracing::warn!(path, error = %err, "failed to write file body");
        }
    }

    /// Fill in the stored body of a path-backed file that arrives without
    /// content.
    pub(super) fn hydrate(&self, mut file: File) -> File {
        if file.text.is_some() || file.body.is_some() {
            return file;
        }
        if let Some(path) = file.path.as_deref() {
            match self.storage.get(&body_key(path)) {
                Ok(body) => file.body = body,
                Err(err) => tracing::warn!(path, error = %err, "failed to read file body"),
            }
        }
        file
    }

    /// Bring the editor in line with the shared document.
    pub(super) fn pull_shared(&mut self) {
        let tr = {
            let (Some(session), Some(state)) = (self.session.as_ref(), self.model.editor_state()) else {
                return;
            };
            match session.doc(state.schema()) {
                Ok(doc) if doc != *state.doc() => {
                    let mut tr = state.tr();
                    if tr.replace_doc(&doc).is_ok() {
                        tr.set_meta(meta::REMOTE, true);
                        tr.set_meta(meta::ADD_TO_HISTORY, false);
                        Some(tr)
                    } else {
                        None
                    }
                }
                Ok(_) => None,
                Err(err) => {
                    tracing::warn!(error = %err, "shared document does not fit the schema");
                    None
                }
            }
        };
        if let Some(tr) = tr {
            tracing::debug!("applying remote change");
            let at = self.clock.now();
            self.dispatch(Msg::Apply { tr, at });
        }
    }

    /// Persist now, unless the model is not in a state worth keeping.
    pub(super) fn save_now(&mut self) -> Result<(), ServiceError> {
        if !self.model.is_initialized() || self.model.error.is_some() {
            tracing::debug!("save skipped");
            return Ok(());
        }
        let _scope = crate::perf::scope(crate::perf::SAVE);
        let state = PersistedState::from_model(&self.model);
        persistence::save_state(&*self.storage, &state)?;
        self.flush_body();
        tracing::debug!(files = state.files.len(), "state saved");
        Ok(())
    }
}
