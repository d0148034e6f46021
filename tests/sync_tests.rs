// Copyright (c) AlphaVelocity.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use std::cell::{Cell, RefCell};
use std::str::FromStr;

use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::{Value, json};
use spendsync::api::{
    DownloadResponse, FullSyncResponse, FullSyncResults, RemoteApi, StatusResponse, UploadResponse,
};
use spendsync::config::Limits;
use spendsync::db;
use spendsync::error::{ErrorKind, SyncError, SyncResult};
use spendsync::models::{
    CloudStatus, EntityResults, TransactionKind, UploadPayload, UploadResults,
};
use spendsync::state::{SyncDetail, SyncState};
use spendsync::store::{LocalStore, SqliteStore};
use spendsync::sync::{SyncPhase, SyncProgress, SyncService};

#[derive(Default)]
struct FakeApi {
    offline: bool,
    reject: bool,
    download: Option<Value>,
    status: Option<CloudStatus>,
    calls: Cell<usize>,
    sent: RefCell<Option<UploadPayload>>,
}

fn stamp() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
}

impl FakeApi {
    fn enter(&self) -> SyncResult<()> {
        self.calls.set(self.calls.get() + 1);
        if self.offline {
            return Err(SyncError::Network("connection refused".into()));
        }
        Ok(())
    }

    fn results(payload: &UploadPayload) -> UploadResults {
        UploadResults {
            categories: EntityResults {
                created: payload.categories.len() as u64,
                ..Default::default()
            },
            transactions: EntityResults {
                created: payload.transactions.len() as u64,
                ..Default::default()
            },
        }
    }
}

impl RemoteApi for FakeApi {
    fn upload(&self, payload: &UploadPayload) -> SyncResult<UploadResponse> {
        self.enter()?;
        *self.sent.borrow_mut() = Some(payload.clone());
        Ok(UploadResponse {
            success: !self.reject,
            results: Some(Self::results(payload)),
            message: self.reject.then(|| "quota exceeded".to_string()),
        })
    }

    fn download(&self) -> SyncResult<DownloadResponse> {
        self.enter()?;
        Ok(DownloadResponse {
            success: true,
            data: self.download.clone(),
            timestamp: Some(stamp()),
            message: None,
        })
    }

    fn full_sync(&self, payload: &UploadPayload) -> SyncResult<FullSyncResponse> {
        self.enter()?;
        *self.sent.borrow_mut() = Some(payload.clone());
        Ok(FullSyncResponse {
            success: true,
            results: Some(FullSyncResults {
                upload: Some(Self::results(payload)),
                download: self.download.clone(),
                timestamp: Some(stamp()),
            }),
            message: None,
        })
    }

    fn status(&self) -> SyncResult<StatusResponse> {
        self.enter()?;
        Ok(StatusResponse {
            success: true,
            status: self.status.clone(),
            message: None,
        })
    }
}

fn seeded_store() -> SqliteStore {
    let mut store = SqliteStore::new(db::open_in_memory().unwrap());
    let food = store.add_category("Food", Some("#22C55E")).unwrap();
    store
        .add_transaction(
            TransactionKind::Expense,
            Decimal::from_str("12.34").unwrap(),
            "lunch",
            "2025-05-01",
            &[food],
        )
        .unwrap();
    store
        .add_transaction(
            TransactionKind::Income,
            Decimal::from_str("2000").unwrap(),
            "salary",
            "2025-05-02",
            &[],
        )
        .unwrap();
    store
}

fn cloud_data() -> Value {
    json!({
        "categories": [
            {"name": "Rent", "color": "#EF4444"},
            {"name": "Travel"}
        ],
        "transactions": [
            {"type": "expense", "amount": 950.5, "description": "june rent",
             "date": "2025-06-01", "categories": ["Rent", "Gone"]},
            {"type": "income", "amount": 3100, "description": "pay",
             "date": "2025-06-02T09:00:00Z", "categories": ["Travel"]},
            {"type": "expense", "amount": 40, "description": "train",
             "date": "2025-06-03", "categories": ["Travel"]}
        ]
    })
}

fn service(api: FakeApi) -> SyncService<SqliteStore, FakeApi> {
    SyncService::new(seeded_store(), api, Limits::default())
}

#[test]
fn upload_sends_transformed_local_data() {
    let mut svc = service(FakeApi::default());
    let outcome = svc.upload_data();
    assert!(outcome.success, "{:?}", outcome);
    assert!(outcome.error.is_none());

    let results = outcome.results.unwrap().upload.unwrap();
    assert_eq!(results.categories.created, 1);
    assert_eq!(results.transactions.created, 2);

    let sent = svc.api().sent.borrow().clone().unwrap();
    assert_eq!(sent.categories[0].name, "Food");
    assert_eq!(sent.categories[0].color.as_deref(), Some("#22C55E"));
    let lunch = sent
        .transactions
        .iter()
        .find(|t| t.kind == TransactionKind::Expense)
        .unwrap();
    assert_eq!(lunch.amount, Decimal::from_str("12.34").unwrap());
    assert_eq!(lunch.categories, vec!["Food".to_string()]);
    let salary = sent
        .transactions
        .iter()
        .find(|t| t.kind == TransactionKind::Income)
        .unwrap();
    assert!(salary.categories.is_empty());
}

#[test]
fn upload_network_failure_becomes_outcome() {
    let mut svc = service(FakeApi {
        offline: true,
        ..Default::default()
    });
    let outcome = svc.upload_data();
    assert!(!outcome.success);
    assert_eq!(outcome.error_kind, Some(ErrorKind::Network));
    assert!(!outcome.error.unwrap().trim().is_empty());
    assert!(outcome.results.is_none());
}

#[test]
fn rejected_upload_surfaces_server_message() {
    let mut svc = service(FakeApi {
        reject: true,
        ..Default::default()
    });
    let outcome = svc.upload_data();
    assert!(!outcome.success);
    assert!(outcome.error.unwrap().contains("quota exceeded"));
}

#[test]
fn limits_are_enforced_before_any_request() {
    let limits = Limits {
        max_transactions: 1,
        ..Limits::default()
    };
    let mut svc = SyncService::new(seeded_store(), FakeApi::default(), limits);
    let outcome = svc.upload_data();
    assert!(!outcome.success);
    assert_eq!(outcome.error_kind, Some(ErrorKind::Validation));
    assert_eq!(svc.api().calls.get(), 0);
}

#[test]
fn malformed_download_leaves_local_data_untouched() {
    let mut svc = service(FakeApi {
        download: Some(json!({
            "categories": [{"name": "Rent"}],
            "transactions": [{"type": "transfer", "amount": 1, "date": "2025-01-01", "categories": []}]
        })),
        ..Default::default()
    });
    let before = svc.local_stats().unwrap();
    let outcome = svc.download_data();
    assert!(!outcome.success);
    assert_eq!(outcome.error_kind, Some(ErrorKind::Validation));
    assert_eq!(svc.local_stats().unwrap(), before);
    assert_eq!(svc.store().last_sync().unwrap(), None);
}

#[test]
fn download_breaking_local_rules_keeps_existing_rows() {
    let mut svc = service(FakeApi {
        download: Some(json!({
            "categories": [{"name": "   "}],
            "transactions": [{"type": "expense", "amount": -5, "description": "",
                              "date": "not-a-date", "categories": []}]
        })),
        ..Default::default()
    });
    let outcome = svc.download_data();
    assert!(!outcome.success);
    assert_eq!(outcome.error_kind, Some(ErrorKind::DataIntegrity));

    let store = svc.store();
    let names: Vec<String> = store
        .list_categories()
        .unwrap()
        .into_iter()
        .map(|c| c.name)
        .collect();
    assert_eq!(names, vec!["Food".to_string()]);
    let rows = store.list_transactions(None).unwrap();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().any(|r| r.description == "lunch" && r.amount == "12.34"));
    assert_eq!(store.last_sync().unwrap(), None);

    // local data still uploads cleanly afterwards
    assert!(svc.upload_data().success);
}

#[test]
fn download_without_data_is_an_error() {
    let mut svc = service(FakeApi::default());
    let outcome = svc.download_data();
    assert!(!outcome.success);
    assert_eq!(svc.local_stats().unwrap().transactions_count, 2);
}

#[test]
fn download_replaces_local_data() {
    let mut svc = service(FakeApi {
        download: Some(cloud_data()),
        ..Default::default()
    });
    let outcome = svc.download_data();
    assert!(outcome.success, "{:?}", outcome);
    let results = outcome.results.unwrap();
    let summary = results.download.unwrap();
    assert_eq!(summary.categories, 2);
    assert_eq!(summary.transactions, 3);
    assert_eq!(results.timestamp, Some(stamp()));

    let store = svc.store();
    let names: Vec<String> = store
        .list_categories()
        .unwrap()
        .into_iter()
        .map(|c| c.name)
        .collect();
    assert_eq!(names, vec!["Rent".to_string(), "Travel".to_string()]);

    let rows = store.list_transactions(None).unwrap();
    let rent = rows.iter().find(|r| r.description == "june rent").unwrap();
    assert_eq!(rent.amount, "950.5");
    assert_eq!(rent.categories, vec!["Rent".to_string()]);
    let pay = rows.iter().find(|r| r.kind == "income").unwrap();
    assert!(pay.categories.is_empty());
    assert_eq!(store.last_sync().unwrap(), Some(stamp()));
}

fn collect_progress(svc: &mut SyncService<SqliteStore, FakeApi>) -> (bool, Vec<SyncProgress>) {
    let mut events = Vec::new();
    let mut record = |p: &SyncProgress| events.push(p.clone());
    let callback: &mut dyn FnMut(&SyncProgress) = &mut record;
    let outcome = svc.full_sync(Some(callback));
    (outcome.success, events)
}

#[test]
fn full_sync_reports_every_phase_once() {
    let mut svc = service(FakeApi {
        download: Some(cloud_data()),
        ..Default::default()
    });
    let (ok, events) = collect_progress(&mut svc);
    assert!(ok);

    let phases: Vec<SyncPhase> = events.iter().map(|e| e.status).collect();
    assert_eq!(
        phases,
        vec![
            SyncPhase::Starting,
            SyncPhase::Preparing,
            SyncPhase::Uploading,
            SyncPhase::Processing,
            SyncPhase::Downloading,
            SyncPhase::Completed,
        ]
    );
    let progress: Vec<u8> = events.iter().map(|e| e.progress).collect();
    assert_eq!(progress, vec![0, 10, 30, 60, 80, 100]);
    assert_eq!(events.iter().filter(|e| e.status.is_terminal()).count(), 1);

    assert_eq!(svc.local_stats().unwrap().transactions_count, 3);
    assert_eq!(svc.store().last_sync().unwrap(), Some(stamp()));
}

#[test]
fn full_sync_failure_emits_one_failed_event() {
    let mut svc = service(FakeApi {
        offline: true,
        ..Default::default()
    });
    let (ok, events) = collect_progress(&mut svc);
    assert!(!ok);
    let terminal: Vec<&SyncProgress> = events.iter().filter(|e| e.status.is_terminal()).collect();
    assert_eq!(terminal.len(), 1);
    assert_eq!(terminal[0].status, SyncPhase::Failed);
    assert!(terminal[0].message.as_deref().is_some_and(|m| !m.is_empty()));
    assert_eq!(events.last().map(|e| e.status), Some(SyncPhase::Failed));
    assert_eq!(svc.local_stats().unwrap().transactions_count, 2);
}

#[test]
fn full_sync_without_download_keeps_local_rows() {
    let mut svc = service(FakeApi::default());
    let outcome = svc.full_sync(None);
    assert!(outcome.success);
    assert!(outcome.results.unwrap().download.is_none());
    assert_eq!(svc.local_stats().unwrap().transactions_count, 2);
    assert_eq!(svc.store().last_sync().unwrap(), Some(stamp()));
}

#[test]
fn sync_state_compares_local_and_cloud_counts() {
    let mut svc = service(FakeApi {
        status: Some(CloudStatus {
            categories_count: 1,
            transactions_count: 2,
            last_sync: Some(Utc::now() - Duration::hours(2)),
            server_time: None,
        }),
        ..Default::default()
    });
    let report = svc.sync_state().unwrap();
    assert_eq!(report.state, SyncState::Synced);
    assert_eq!(report.detail, SyncDetail::InSync { recent: true });

    svc.store_mut().add_category("Extra", None).unwrap();
    let report = svc.sync_state().unwrap();
    assert_eq!(report.state, SyncState::Pending);
    assert_eq!(report.detail, SyncDetail::Diverged);
    assert_eq!(report.local_count, 4);
    assert_eq!(report.cloud_count, 3);
}

#[test]
fn sync_state_without_cloud_status_is_never_synced() {
    let svc = service(FakeApi::default());
    assert_eq!(svc.sync_status().unwrap(), None);
    let report = svc.sync_state().unwrap();
    assert_eq!(report.state, SyncState::Pending);
    assert_eq!(
        report.detail,
        SyncDetail::NeverSynced {
            has_local_data: true
        }
    );
}
