//! Controller-level errors.
//!
//! These travel as data on the model so the host can route the user to a
//! recovery view instead of failing outright.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

use crate::config::ConfigError;
use crate::document::SchemaError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The persisted blob failed structural validation.
    InvalidState,
    InvalidConfig,
    /// A file entry with neither text nor path.
    InvalidFile,
    FilePermissionDenied,
}

impl ErrorKind {
    pub const fn id(self) -> &'static str {
        match self {
            Self::InvalidState => "invalid_state",
            Self::InvalidConfig => "invalid_config",
            Self::InvalidFile => "invalid_file",
            Self::FilePermissionDenied => "file_permission_denied",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// An error kind plus the offending payload, if there is one.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("{kind}")]
pub struct ServiceError {
    pub kind: ErrorKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub props: Option<Value>,
}

impl ServiceError {
    pub const fn new(kind: ErrorKind) -> Self {
        Self { kind, props: None }
    }

    #[must_use]
    pub fn with_props(mut self, props: impl Into<Value>) -> Self {
        self.props = Some(props.into());
        self
    }
}

impl From<SchemaError> for ServiceError {
    fn from(err: SchemaError) -> Self {
        Self::new(ErrorKind::InvalidState).with_props(json!({ "message": err.to_string() }))
    }
}

impl From<ConfigError> for ServiceError {
    fn from(err: ConfigError) -> Self {
        Self::new(ErrorKind::InvalidConfig).with_props(json!({ "message": err.to_string() }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_serializes_by_id() {
        let err = ServiceError::new(ErrorKind::FilePermissionDenied);
        assert_eq!(
            serde_json::to_value(&err).unwrap(),
            json!({ "kind": "file_permission_denied" })
        );
        assert_eq!(err.to_string(), "file_permission_denied");
    }

    #[test]
    fn test_props_carry_payload() {
        let err = ServiceError::new(ErrorKind::InvalidFile).with_props(json!({ "markdown": true }));
        let back: ServiceError = serde_json::from_value(serde_json::to_value(&err).unwrap()).unwrap();
        assert_eq!(back, err);
    }

    #[test]
    fn test_config_error_maps_to_invalid_config() {
        let err: ServiceError = ConfigError::FontSize(2).into();
        assert_eq!(err.kind, ErrorKind::InvalidConfig);
        assert!(err.props.unwrap()["message"].as_str().unwrap().contains("font size"));
    }
}
