//! Classified errors surfaced by the setlist services.

use crate::store::StoreError;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Permission,
    SchemaMismatch,
    CatalogProtected,
    Transient,
}

#[derive(Debug, Error)]
pub enum SetlistError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    Permission(String),

    #[error("Store schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("The catalog cannot be {0}")]
    CatalogProtected(&'static str),

    #[error("Temporary failure: {0}")]
    Transient(String),
}

impl SetlistError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SetlistError::Validation(_) => ErrorKind::Validation,
            SetlistError::NotFound(_) => ErrorKind::NotFound,
            SetlistError::Permission(_) => ErrorKind::Permission,
            SetlistError::SchemaMismatch(_) => ErrorKind::SchemaMismatch,
            SetlistError::CatalogProtected(_) => ErrorKind::CatalogProtected,
            SetlistError::Transient(_) => ErrorKind::Transient,
        }
    }

    /// Whether repeating the same call later may succeed.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    /// Human-readable text to show in place of the technical message.
    pub fn user_message(&self) -> String {
        match self {
            SetlistError::Validation(detail) => format!("Please check your input: {}", detail),
            SetlistError::NotFound(_) => {
                "That list or song no longer exists. Refresh and try again.".to_string()
            }
            SetlistError::Permission(_) => {
                "You don't have access to that list or song.".to_string()
            }
            SetlistError::SchemaMismatch(_) => {
                "The song database needs an update before this can be done.".to_string()
            }
            SetlistError::CatalogProtected(action) => format!(
                "The catalog holds every song of the band and cannot be {}.",
                action
            ),
            SetlistError::Transient(_) => {
                "Something went wrong while saving. Please try again.".to_string()
            }
        }
    }

    pub(crate) fn missing_band() -> Self {
        SetlistError::Validation("a band identifier is required".to_string())
    }
}

impl From<StoreError> for SetlistError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(detail) => SetlistError::Transient(detail),
            StoreError::NotFound(detail) => SetlistError::NotFound(detail),
            StoreError::Unsupported(operation) => SetlistError::SchemaMismatch(format!(
                "store does not support {}",
                operation
            )),
            StoreError::Backend(err) => SetlistError::Transient(format!("{:#}", err)),
        }
    }
}

pub type SetlistResult<T> = Result<T, SetlistError>;

/// Rejects empty band identifiers before any store access.
pub(crate) fn require_band(band_id: &str) -> SetlistResult<()> {
    if band_id.trim().is_empty() {
        return Err(SetlistError::missing_band());
    }
    Ok(())
}
