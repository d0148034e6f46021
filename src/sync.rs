// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::{DateTime, Utc};
use log::{error, info};
use serde::Serialize;

use crate::api::RemoteApi;
use crate::config::Limits;
use crate::error::{ErrorKind, SyncError, SyncResult, message_or_fallback};
use crate::models::{CloudStatus, LocalStats, UploadPayload, UploadResults};
use crate::state::{SyncStateReport, determine_sync_state};
use crate::store::{LocalStore, ReplaceSummary};
use crate::transform::{parse_downloaded_data, prepare_local_data_for_sync};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncPhase {
    Starting,
    Preparing,
    Uploading,
    Processing,
    Downloading,
    Completed,
    Failed,
}

impl SyncPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncPhase::Completed | SyncPhase::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncProgress {
    pub progress: u8,
    pub status: SyncPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SyncProgress {
    fn new(progress: u8, status: SyncPhase, message: impl Into<String>) -> Self {
        Self {
            progress,
            status,
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncResults {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload: Option<UploadResults>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download: Option<ReplaceSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// What every sync operation hands back to the caller. Errors never escape
/// as `Err`; they land in `error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncOutcome {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<SyncResults>,
}

impl SyncOutcome {
    fn ok(message: impl Into<String>, results: SyncResults) -> Self {
        Self {
            success: true,
            message: message.into(),
            error: None,
            error_kind: None,
            results: Some(results),
        }
    }

    fn failed(operation: &str, err: &SyncError) -> Self {
        error!("{} failed: {}", operation, err);
        Self {
            success: false,
            message: format!("{} failed", operation),
            error: Some(err.user_message()),
            error_kind: Some(err.kind()),
            results: None,
        }
    }
}

pub struct SyncService<S, R> {
    store: S,
    api: R,
    limits: Limits,
}

impl<S: LocalStore, R: RemoteApi> SyncService<S, R> {
    pub fn new(store: S, api: R, limits: Limits) -> Self {
        Self { store, api, limits }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn api(&self) -> &R {
        &self.api
    }

    pub fn local_stats(&self) -> SyncResult<LocalStats> {
        self.store.local_stats()
    }

    /// Remote snapshot; `None` when the server has nothing recorded yet.
    pub fn sync_status(&self) -> SyncResult<Option<CloudStatus>> {
        let resp = self.api.status()?;
        if !resp.success {
            return Err(SyncError::Rejected(message_or_fallback(resp.message.as_deref())));
        }
        Ok(resp.status)
    }

    pub fn sync_state(&self) -> SyncResult<SyncStateReport> {
        let local = self.local_stats()?;
        let cloud = self.sync_status()?;
        Ok(determine_sync_state(&local, cloud.as_ref(), Utc::now()))
    }

    fn build_payload(&self) -> SyncResult<UploadPayload> {
        let snapshot = self.store.snapshot()?;
        prepare_local_data_for_sync(&snapshot, &self.limits)
    }

    pub fn upload_data(&mut self) -> SyncOutcome {
        match self.try_upload() {
            Ok(results) => SyncOutcome::ok("Data uploaded", results),
            Err(e) => SyncOutcome::failed("Upload", &e),
        }
    }

    fn try_upload(&mut self) -> SyncResult<SyncResults> {
        let payload = self.build_payload()?;
        info!(
            "uploading {} categories and {} transactions",
            payload.categories.len(),
            payload.transactions.len()
        );
        let resp = self.api.upload(&payload)?;
        if !resp.success {
            return Err(SyncError::Rejected(message_or_fallback(resp.message.as_deref())));
        }
        Ok(SyncResults {
            upload: Some(resp.results.unwrap_or_default()),
            ..Default::default()
        })
    }

    pub fn download_data(&mut self) -> SyncOutcome {
        match self.try_download() {
            Ok(results) => SyncOutcome::ok("Data downloaded", results),
            Err(e) => SyncOutcome::failed("Download", &e),
        }
    }

    fn try_download(&mut self) -> SyncResult<SyncResults> {
        let resp = self.api.download()?;
        if !resp.success {
            return Err(SyncError::Rejected(message_or_fallback(resp.message.as_deref())));
        }
        let data = resp
            .data
            .ok_or_else(|| SyncError::Validation("download response carried no data".into()))?;
        // validate before the destructive replace
        let data = parse_downloaded_data(data)?;
        let at = resp.timestamp.unwrap_or_else(Utc::now);
        let summary = self.store.replace_all(&data, at)?;
        Ok(SyncResults {
            download: Some(summary),
            timestamp: Some(at),
            ..Default::default()
        })
    }

    /// Upload then apply the server's merged result. `progress` receives
    /// exactly one terminal event (`completed` or `failed`).
    pub fn full_sync(&mut self, progress: Option<&mut dyn FnMut(&SyncProgress)>) -> SyncOutcome {
        let mut noop = |_: &SyncProgress| {};
        let report: &mut dyn FnMut(&SyncProgress) = match progress {
            Some(p) => p,
            None => &mut noop,
        };

        report(&SyncProgress::new(0, SyncPhase::Starting, "Starting sync"));
        match self.try_full_sync(&mut *report) {
            Ok(results) => {
                report(&SyncProgress::new(100, SyncPhase::Completed, "Sync completed"));
                SyncOutcome::ok("Sync completed", results)
            }
            Err(e) => {
                let outcome = SyncOutcome::failed("Sync", &e);
                report(&SyncProgress {
                    progress: 100,
                    status: SyncPhase::Failed,
                    message: outcome.error.clone(),
                });
                outcome
            }
        }
    }

    fn try_full_sync(&mut self, report: &mut dyn FnMut(&SyncProgress)) -> SyncResult<SyncResults> {
        report(&SyncProgress::new(10, SyncPhase::Preparing, "Reading local data"));
        let payload = self.build_payload()?;

        report(&SyncProgress::new(30, SyncPhase::Uploading, "Uploading local data"));
        let resp = self.api.full_sync(&payload)?;
        if !resp.success {
            return Err(SyncError::Rejected(message_or_fallback(resp.message.as_deref())));
        }

        report(&SyncProgress::new(60, SyncPhase::Processing, "Processing server response"));
        let results = resp
            .results
            .ok_or_else(|| SyncError::Validation("sync response carried no results".into()))?;
        let download = results.download.map(parse_downloaded_data).transpose()?;
        let at = results.timestamp.unwrap_or_else(Utc::now);

        let summary = match download {
            Some(data) => {
                report(&SyncProgress::new(80, SyncPhase::Downloading, "Applying cloud data"));
                Some(self.store.replace_all(&data, at)?)
            }
            None => {
                self.store.set_last_sync(at)?;
                None
            }
        };

        Ok(SyncResults {
            upload: results.upload,
            download: summary,
            timestamp: Some(at),
        })
    }
}
