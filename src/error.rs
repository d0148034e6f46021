// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use serde::Serialize;
use thiserror::Error;

pub type SyncResult<T> = std::result::Result<T, SyncError>;

const FALLBACK_MESSAGE: &str = "An unexpected error occurred";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Validation,
    DataIntegrity,
    Network,
    Auth,
    JobTimeout,
    Api,
    Store,
    Decode,
    Io,
    Config,
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("{0}")]
    Validation(String),

    #[error("record {index}: {message}")]
    DataIntegrity { index: usize, message: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("authorization failed: {0}")]
    Auth(String),

    #[error("job {job_id} did not finish within {elapsed_secs}s")]
    JobTimeout { job_id: String, elapsed_secs: u64 },

    #[error("server returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("server rejected the request: {0}")]
    Rejected(String),

    #[error(transparent)]
    Store(#[from] rusqlite::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl SyncError {
    pub fn integrity(index: usize, message: impl Into<String>) -> Self {
        SyncError::DataIntegrity {
            index,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Validation(_) => ErrorKind::Validation,
            SyncError::DataIntegrity { .. } => ErrorKind::DataIntegrity,
            SyncError::Network(_) => ErrorKind::Network,
            SyncError::Auth(_) => ErrorKind::Auth,
            SyncError::JobTimeout { .. } => ErrorKind::JobTimeout,
            SyncError::Api { .. } | SyncError::Rejected(_) => ErrorKind::Api,
            SyncError::Store(_) => ErrorKind::Store,
            SyncError::Json(_) => ErrorKind::Decode,
            SyncError::Io(_) => ErrorKind::Io,
            SyncError::Config(_) => ErrorKind::Config,
        }
    }

    /// Human readable text for the UI layer; never empty.
    pub fn user_message(&self) -> String {
        let msg = match self {
            SyncError::Network(_) => {
                "Could not reach the sync server. Check your connection and try again.".to_string()
            }
            SyncError::Auth(_) => "Your session has expired. Please log in again.".to_string(),
            other => other.to_string(),
        };
        if msg.trim().is_empty() {
            FALLBACK_MESSAGE.to_string()
        } else {
            msg
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            return SyncError::Network(err.to_string());
        }
        if let Some(status) = err.status() {
            return SyncError::Api {
                status: status.as_u16(),
                message: err.to_string(),
            };
        }
        if err.is_decode() {
            return SyncError::Validation(format!("malformed server response: {}", err));
        }
        SyncError::Network(err.to_string())
    }
}

/// Fallback used when an upstream error carries no message of its own.
pub fn message_or_fallback(msg: Option<&str>) -> String {
    match msg.map(str::trim) {
        Some(m) if !m.is_empty() => m.to_string(),
        _ => FALLBACK_MESSAGE.to_string(),
    }
}
