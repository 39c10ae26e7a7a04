//! Key-value storage for the controller state and path-backed bodies.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

use super::model::{File, Model};
use crate::config::Config;
use crate::error::{ErrorKind, ServiceError};

/// Key holding the serialized controller state.
pub const STATE_KEY: &str = "state";

/// Storage key for the markdown body of a path-backed document.
pub fn body_key(path: &str) -> String {
    format!("file:{path}")
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("permission denied: {}", .0.display())]
    PermissionDenied(PathBuf),
    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode state: {0}")]
    Encode(#[from] serde_json::Error),
}

impl StorageError {
    fn io(path: &Path, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::PermissionDenied {
            Self::PermissionDenied(path.to_path_buf())
        } else {
            Self::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::PermissionDenied(path) => Self::new(ErrorKind::FilePermissionDenied)
                .with_props(json!({ "path": path.display().to_string() })),
            other => Self::new(ErrorKind::InvalidState).with_props(json!({ "message": other.to_string() })),
        }
    }
}

pub trait Storage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// In-memory storage. Clones share entries, so a test can keep one and
/// hand the other to a controller.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: Rc<RefCell<BTreeMap<String, String>>>,
    writes: Rc<Cell<usize>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `set` calls so far.
    pub fn writes(&self) -> usize {
        self.writes.get()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries.borrow_mut().insert(key.to_string(), value.to_string());
        self.writes.set(self.writes.get() + 1);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.borrow_mut().remove(key);
        Ok(())
    }
}

/// One file per key under a directory. Key names are base64 encoded so any
/// path can serve as a key.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn entry(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", URL_SAFE_NO_PAD.encode(key)))
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let path = self.entry(key);
        match fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StorageError::io(&path, err)),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        fs::create_dir_all(&self.dir).map_err(|err| StorageError::io(&self.dir, err))?;
        let path = self.entry(key);
        fs::write(&path, value).map_err(|err| StorageError::io(&path, err))
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let path = self.entry(key);
        match fs::remove_file(&path) {
            Err(err) if err.kind() != io::ErrorKind::NotFound => Err(StorageError::io(&path, err)),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedCollab {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
}

/// The persisted controller state. `text` is either a serialized editor
/// state or an empty string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedState {
    #[serde(default)]
    pub last_modified: Option<DateTime<Utc>>,
    pub files: Vec<File>,
    #[serde(default)]
    pub config: Config,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub markdown: bool,
    #[serde(default)]
    pub collab: PersistedCollab,
    #[serde(default)]
    pub text: Value,
}

impl PersistedState {
    pub fn from_model(model: &Model) -> Self {
        Self {
            last_modified: model.last_modified,
            files: model.files.clone(),
            config: model.config.clone(),
            path: model.path.clone(),
            markdown: model.markdown,
            collab: PersistedCollab {
                room: model.collab.as_ref().map(|collab| collab.room.clone()),
            },
            text: model.text_json().unwrap_or_else(|| Value::String(String::new())),
        }
    }

    /// The stored editor state, if there is one.
    pub fn text(&self) -> Option<&Value> {
        self.text.is_object().then_some(&self.text)
    }
}

fn is_text(value: &Value) -> bool {
    value.get("doc").is_some() && value.get("selection").is_some()
}

fn invalid_state(payload: impl Into<Value>) -> ServiceError {
    ServiceError::new(ErrorKind::InvalidState).with_props(payload)
}

/// Parse and validate a stored state blob.
pub fn parse_state(data: &str) -> Result<PersistedState, ServiceError> {
    let value: Value = serde_json::from_str(data).map_err(|_| invalid_state(data))?;
    let Some(object) = value.as_object() else {
        return Err(invalid_state(value));
    };
    match object.get("text") {
        None | Some(Value::Null) => {}
        Some(Value::String(text)) if text.is_empty() => {}
        Some(text) if is_text(text) => {}
        Some(text) => return Err(invalid_state(text.clone())),
    }
    let Some(files) = object.get("files").and_then(Value::as_array) else {
        return Err(invalid_state(value));
    };
    for file in files {
        let valid = serde_json::from_value::<File>(file.clone()).is_ok_and(|f| f.is_valid());
        if !valid {
            return Err(ServiceError::new(ErrorKind::InvalidFile).with_props(file.clone()));
        }
    }
    let state: PersistedState = serde_json::from_value(value.clone()).map_err(|_| invalid_state(value))?;
    state.config.validate()?;
    Ok(state)
}

/// Load the stored state. `Ok(None)` when nothing was stored yet.
pub fn load_state(storage: &dyn Storage) -> Result<Option<PersistedState>, ServiceError> {
    match storage.get(STATE_KEY)? {
        None => Ok(None),
        Some(data) => parse_state(&data).map(Some),
    }
}

pub fn save_state(storage: &dyn Storage, state: &PersistedState) -> Result<(), StorageError> {
    let data = serde_json::to_string(state)?;
    storage.set(STATE_KEY, &data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_memory_storage_clones_share_entries() {
        let storage = MemoryStorage::new();
        let other = storage.clone();
        other.set("a", "1").unwrap();
        assert_eq!(storage.get("a").unwrap().as_deref(), Some("1"));
        assert_eq!(storage.writes(), 1);
        storage.remove("a").unwrap();
        assert!(other.get("a").unwrap().is_none());
    }

    #[test]
    fn test_file_storage_round_trip() {
        let dir = tempdir().unwrap();
        let storage = FileStorage::new(dir.path().join("state"));
        assert!(storage.get(&body_key("notes/a.md")).unwrap().is_none());
        storage.set(&body_key("notes/a.md"), "# A\n").unwrap();
        assert_eq!(storage.get(&body_key("notes/a.md")).unwrap().as_deref(), Some("# A\n"));
        storage.remove(&body_key("notes/a.md")).unwrap();
        storage.remove(&body_key("notes/a.md")).unwrap();
        assert!(storage.get(&body_key("notes/a.md")).unwrap().is_none());
    }

    #[test]
    fn test_garbage_is_invalid_state() {
        let err = parse_state("{not json").unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidState);
        assert_eq!(err.props, Some(Value::String("{not json".into())));
    }

    #[test]
    fn test_missing_files_is_invalid_state() {
        let err = parse_state(r#"{"text":""}"#).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidState);
    }

    #[test]
    fn test_text_without_selection_is_invalid_state() {
        let err = parse_state(r#"{"files":[],"text":{"doc":{}}}"#).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidState);
        assert_eq!(err.props, Some(json!({ "doc": {} })));
    }

    #[test]
    fn test_empty_file_entry_is_invalid_file() {
        let err = parse_state(r#"{"files":[{"markdown":true}]}"#).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidFile);
        assert_eq!(err.props, Some(json!({ "markdown": true })));
    }

    #[test]
    fn test_bad_config_is_invalid_config() {
        let err = parse_state(r#"{"files":[],"config":{"fontSize":1}}"#).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidConfig);
    }

    #[test]
    fn test_state_round_trip() {
        let state = PersistedState {
            last_modified: None,
            files: vec![File {
                path: Some("a.md".into()),
                ..File::default()
            }],
            config: Config::default(),
            path: None,
            markdown: true,
            collab: PersistedCollab {
                room: Some("r".into()),
            },
            text: Value::String(String::new()),
        };
        let storage = MemoryStorage::new();
        save_state(&storage, &state).unwrap();
        let raw: Value = serde_json::from_str(&storage.get(STATE_KEY).unwrap().unwrap()).unwrap();
        assert_eq!(raw["collab"], json!({ "room": "r" }));
        assert!(raw.get("lastModified").is_some());
        assert_eq!(load_state(&storage).unwrap(), Some(state));
    }

    #[test]
    fn test_permission_denied_maps_to_service_error() {
        let err: ServiceError = StorageError::PermissionDenied(PathBuf::from("/x")).into();
        assert_eq!(err.kind, ErrorKind::FilePermissionDenied);
        assert_eq!(err.props, Some(json!({ "path": "/x" })));
    }
}
