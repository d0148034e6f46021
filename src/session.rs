// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use log::{debug, warn};

use crate::error::SyncResult;
use crate::models::AuthSession;

const SESSION_FILE: &str = "session.json";
const LAST_EMAIL_FILE: &str = "last_email";

/// Persisted auth session plus the "last used email" convenience value.
/// Without a directory everything stays in memory.
#[derive(Debug)]
pub struct SessionStore {
    dir: Option<PathBuf>,
    current: Mutex<Option<AuthSession>>,
}

impl SessionStore {
    pub fn in_memory() -> Self {
        Self {
            dir: None,
            current: Mutex::new(None),
        }
    }

    pub fn with_session(session: AuthSession) -> Self {
        Self {
            dir: None,
            current: Mutex::new(Some(session)),
        }
    }

    pub fn open(dir: &Path) -> SyncResult<Self> {
        fs::create_dir_all(dir)?;
        let path = dir.join(SESSION_FILE);
        let current = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            match serde_json::from_str::<AuthSession>(&raw) {
                Ok(s) => Some(s),
                Err(e) => {
                    warn!("ignoring unreadable session file {}: {}", path.display(), e);
                    None
                }
            }
        } else {
            None
        };
        Ok(Self {
            dir: Some(dir.to_path_buf()),
            current: Mutex::new(current),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Option<AuthSession>> {
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self) -> Option<AuthSession> {
        self.lock().clone()
    }

    pub fn token(&self) -> Option<String> {
        self.lock().as_ref().map(|s| s.token.clone())
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.lock()
            .as_ref()
            .map(|s| s.refresh_token.clone())
            .filter(|t| !t.is_empty())
    }

    pub fn save(&self, session: AuthSession) -> SyncResult<()> {
        if let Some(dir) = &self.dir {
            let raw = serde_json::to_string_pretty(&session)?;
            fs::write(dir.join(SESSION_FILE), raw)?;
        }
        debug!("session stored for {}", session.email);
        *self.lock() = Some(session);
        Ok(())
    }

    /// Swaps in a refreshed token pair, keeping the user fields.
    pub fn update_tokens(
        &self,
        token: String,
        refresh_token: String,
        expires_at: Option<i64>,
    ) -> SyncResult<()> {
        let Some(mut session) = self.get() else {
            return Ok(());
        };
        session.token = token;
        session.refresh_token = refresh_token;
        session.expires_at = expires_at;
        self.save(session)
    }

    pub fn clear(&self) -> SyncResult<()> {
        *self.lock() = None;
        if let Some(dir) = &self.dir {
            let path = dir.join(SESSION_FILE);
            if path.exists() {
                fs::remove_file(path)?;
            }
        }
        Ok(())
    }

    pub fn last_email(&self) -> Option<String> {
        let dir = self.dir.as_ref()?;
        fs::read_to_string(dir.join(LAST_EMAIL_FILE))
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    pub fn set_last_email(&self, email: &str) -> SyncResult<()> {
        if let Some(dir) = &self.dir {
            fs::write(dir.join(LAST_EMAIL_FILE), email.trim())?;
        }
        Ok(())
    }
}
