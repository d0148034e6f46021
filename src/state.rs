// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::models::{CloudStatus, LocalStats};

pub const RECENT_SYNC_WINDOW_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    Synced,
    Pending,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDetail {
    /// No remote status yet.
    NeverSynced { has_local_data: bool },
    InSync { recent: bool },
    Diverged,
    LocalOnly,
    CloudOnly,
    /// Counts match but the remote never recorded a sync.
    Indeterminate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStateReport {
    pub state: SyncState,
    pub detail: SyncDetail,
    pub message: String,
    pub local_count: u64,
    pub cloud_count: u64,
    pub last_sync: Option<DateTime<Utc>>,
}

pub fn determine_sync_state(
    local: &LocalStats,
    cloud: Option<&CloudStatus>,
    now: DateTime<Utc>,
) -> SyncStateReport {
    let local_count = local.total();

    let Some(cloud) = cloud else {
        let has_local_data = local_count > 0;
        let message = if has_local_data {
            format!("Ready to sync: {} local items have never been backed up", local_count)
        } else {
            "Nothing to sync yet".to_string()
        };
        return SyncStateReport {
            state: SyncState::Pending,
            detail: SyncDetail::NeverSynced { has_local_data },
            message,
            local_count,
            cloud_count: 0,
            last_sync: None,
        };
    };

    let cloud_count = cloud.total();
    let report = |state, detail, message: String| SyncStateReport {
        state,
        detail,
        message,
        local_count,
        cloud_count,
        last_sync: cloud.last_sync,
    };

    match (local_count == cloud_count, cloud.last_sync) {
        (true, Some(last)) => {
            let recent = now.signed_duration_since(last) < Duration::hours(RECENT_SYNC_WINDOW_HOURS);
            let message = if recent {
                "All data is synced".to_string()
            } else {
                format!("Synced, last sync on {}", last.format("%Y-%m-%d %H:%M"))
            };
            report(SyncState::Synced, SyncDetail::InSync { recent }, message)
        }
        (false, _) => {
            let (detail, message) = match (local_count > 0, cloud_count > 0) {
                (true, true) => (
                    SyncDetail::Diverged,
                    format!(
                        "Local ({}) and cloud ({}) data differ",
                        local_count, cloud_count
                    ),
                ),
                (true, false) => (
                    SyncDetail::LocalOnly,
                    format!("Ready to back up {} local items", local_count),
                ),
                // counts differ so at least one side is non-zero
                _ => (
                    SyncDetail::CloudOnly,
                    format!("Ready to download {} cloud items", cloud_count),
                ),
            };
            report(SyncState::Pending, detail, message)
        }
        (true, None) => report(
            SyncState::Unknown,
            SyncDetail::Indeterminate,
            "Sync status unknown".to_string(),
        ),
    }
}
