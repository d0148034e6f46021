// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Conversion between local rows and the cloud wire schema.
//!
//! Everything here is pure: no I/O, no retries. Validation failures are
//! returned as `SyncError::Validation` (whole-payload problems) or
//! `SyncError::DataIntegrity` (a specific record, carrying its index).

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use serde_json::Value;

use crate::config::Limits;
use crate::error::{SyncError, SyncResult};
use crate::models::{
    Category, CloudCategory, CloudTransaction, DownloadedData, NewTransaction,
    TransactionCategoryLink, TransactionKind, TransactionRow, UploadPayload,
};

static DATE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap());
static DATETIME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}(:\d{2}(\.\d{1,9})?)?(Z|[+-]\d{2}:\d{2})?$")
        .unwrap()
});

/// Everything the upload path reads from the local store.
#[derive(Debug, Clone, Default)]
pub struct LocalSnapshot {
    pub categories: Vec<Category>,
    pub transactions: Vec<TransactionRow>,
    pub links: Vec<TransactionCategoryLink>,
    /// transaction_types.id -> name
    pub type_names: HashMap<i64, String>,
}

/// Accepts `YYYY-MM-DD` or an ISO date-time with an optional offset.
pub fn is_valid_date(s: &str) -> bool {
    if !(DATE_RE.is_match(s) || DATETIME_RE.is_match(s)) {
        return false;
    }
    NaiveDate::parse_from_str(&s[..10], "%Y-%m-%d").is_ok()
}

pub fn categories_to_cloud(categories: &[Category], limits: &Limits) -> SyncResult<Vec<CloudCategory>> {
    categories_to_cloud_at(categories, limits, Utc::now())
}

pub fn categories_to_cloud_at(
    categories: &[Category],
    limits: &Limits,
    now: DateTime<Utc>,
) -> SyncResult<Vec<CloudCategory>> {
    categories
        .iter()
        .enumerate()
        .map(|(i, c)| category_to_cloud(i, &c.name, Some(c.color.as_str()), limits, now))
        .collect()
}

/// Variant for untyped input (e.g. a decoded request body).
pub fn categories_to_cloud_value(input: &Value, limits: &Limits) -> SyncResult<Vec<CloudCategory>> {
    let items = input
        .as_array()
        .ok_or_else(|| SyncError::Validation("categories must be a list".to_string()))?;
    let now = Utc::now();
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let name = item
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| SyncError::integrity(i, "category name must be a string"))?;
            let color = item.get("color").and_then(Value::as_str);
            category_to_cloud(i, name, color, limits, now)
        })
        .collect()
}

/// Trims `name` and enforces the non-empty and length rules shared by
/// uploads and downloads.
pub fn check_category_name<'a>(index: usize, name: &'a str, limits: &Limits) -> SyncResult<&'a str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(SyncError::integrity(index, "category name must not be empty"));
    }
    if name.chars().count() > limits.max_category_name_len {
        return Err(SyncError::integrity(
            index,
            format!(
                "category name '{}' exceeds {} characters",
                name, limits.max_category_name_len
            ),
        ));
    }
    Ok(name)
}

fn category_to_cloud(
    index: usize,
    name: &str,
    color: Option<&str>,
    limits: &Limits,
    now: DateTime<Utc>,
) -> SyncResult<CloudCategory> {
    let name = check_category_name(index, name, limits)?;
    let color = color
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or(&limits.default_color);
    Ok(CloudCategory {
        name: name.to_string(),
        color: Some(color.to_string()),
        created_at: Some(now),
        updated_at: Some(now),
    })
}

pub fn parse_amount(index: usize, raw: &str, limits: &Limits) -> SyncResult<Decimal> {
    let amount = Decimal::from_str(raw.trim())
        .map_err(|_| SyncError::integrity(index, format!("invalid amount '{}'", raw)))?;
    check_amount(index, amount, limits)
}

fn check_amount(index: usize, amount: Decimal, limits: &Limits) -> SyncResult<Decimal> {
    if amount < Decimal::ZERO {
        return Err(SyncError::integrity(
            index,
            format!("amount {} must not be negative", amount),
        ));
    }
    if amount > limits.max_amount {
        return Err(SyncError::integrity(
            index,
            format!("amount {} exceeds maximum {}", amount, limits.max_amount),
        ));
    }
    Ok(amount)
}

pub fn transactions_to_cloud(
    transactions: &[TransactionRow],
    links: &[TransactionCategoryLink],
    category_names: &HashMap<i64, String>,
    type_names: &HashMap<i64, String>,
    limits: &Limits,
) -> SyncResult<Vec<CloudTransaction>> {
    let mut by_txn: HashMap<i64, Vec<i64>> = HashMap::new();
    for link in links {
        by_txn
            .entry(link.transaction_id)
            .or_default()
            .push(link.category_id);
    }

    let mut out = Vec::with_capacity(transactions.len());
    for (i, t) in transactions.iter().enumerate() {
        let amount = parse_amount(i, &t.amount, limits)?;

        let type_name = type_names.get(&t.type_id).ok_or_else(|| {
            SyncError::integrity(
                i,
                format!("transaction {} has unknown type id {}", t.id, t.type_id),
            )
        })?;
        let kind = TransactionKind::from_str(type_name)
            .map_err(|e| SyncError::integrity(i, format!("transaction {}: {}", t.id, e)))?;

        if t.description.chars().count() > limits.max_description_len {
            return Err(SyncError::integrity(
                i,
                format!(
                    "transaction {} description exceeds {} characters",
                    t.id, limits.max_description_len
                ),
            ));
        }
        if !is_valid_date(&t.date) {
            return Err(SyncError::integrity(
                i,
                format!("transaction {} has invalid date '{}'", t.id, t.date),
            ));
        }

        let categories = match kind {
            TransactionKind::Income => Vec::new(),
            TransactionKind::Expense => by_txn
                .get(&t.id)
                .map(|ids| {
                    ids.iter()
                        .filter_map(|id| category_names.get(id).cloned())
                        .collect()
                })
                .unwrap_or_default(),
        };

        out.push(CloudTransaction {
            kind,
            amount,
            description: t.description.clone(),
            date: t.date.clone(),
            categories,
        });
    }
    Ok(out)
}

/// Builds the upload body, failing before any network call when the
/// snapshot breaks a global bound.
pub fn prepare_local_data_for_sync(snapshot: &LocalSnapshot, limits: &Limits) -> SyncResult<UploadPayload> {
    if snapshot.categories.len() > limits.max_categories {
        return Err(SyncError::Validation(format!(
            "too many categories: {} (max {})",
            snapshot.categories.len(),
            limits.max_categories
        )));
    }
    if snapshot.transactions.len() > limits.max_transactions {
        return Err(SyncError::Validation(format!(
            "too many transactions: {} (max {})",
            snapshot.transactions.len(),
            limits.max_transactions
        )));
    }

    let category_names: HashMap<i64, String> = snapshot
        .categories
        .iter()
        .map(|c| (c.id, c.name.trim().to_string()))
        .collect();

    let payload = UploadPayload {
        categories: categories_to_cloud(&snapshot.categories, limits)?,
        transactions: transactions_to_cloud(
            &snapshot.transactions,
            &snapshot.links,
            &category_names,
            &snapshot.type_names,
            limits,
        )?,
    };

    let size = serde_json::to_vec(&payload)?.len();
    if size > limits.max_payload_bytes {
        return Err(SyncError::Validation(format!(
            "payload of {} bytes exceeds limit of {} bytes",
            size, limits.max_payload_bytes
        )));
    }
    Ok(payload)
}

/// Structural guard for a download body. A `false` means discard the
/// whole payload.
pub fn validate_downloaded_data(data: &Value) -> bool {
    let (Some(categories), Some(transactions)) = (
        data.get("categories").and_then(Value::as_array),
        data.get("transactions").and_then(Value::as_array),
    ) else {
        return false;
    };

    if !categories
        .iter()
        .all(|c| c.get("name").is_some_and(Value::is_string))
    {
        return false;
    }

    transactions.iter().all(|t| {
        let amount_ok = t.get("amount").is_some_and(Value::is_number);
        let type_ok = matches!(
            t.get("type").and_then(Value::as_str),
            Some("income") | Some("expense")
        );
        let cats_ok = t.get("categories").is_some_and(Value::is_array);
        amount_ok && type_ok && cats_ok
    })
}

pub fn parse_downloaded_data(data: Value) -> SyncResult<DownloadedData> {
    if !validate_downloaded_data(&data) {
        return Err(SyncError::Validation(
            "downloaded data failed validation; local data left untouched".to_string(),
        ));
    }
    Ok(serde_json::from_value(data)?)
}

/// Maps cloud transactions onto local ids. `type_ids` must already hold both
/// kinds; unknown category names are dropped per transaction. Records that
/// would break the local rules (amount range, description length, date
/// format) fail with `DataIntegrity` so nothing partial is written.
pub fn prepare_downloaded_data_for_local(
    transactions: &[CloudTransaction],
    type_ids: &HashMap<TransactionKind, i64>,
    category_ids: &HashMap<String, i64>,
    limits: &Limits,
) -> SyncResult<Vec<NewTransaction>> {
    transactions
        .iter()
        .enumerate()
        .map(|(i, t)| {
            let type_id = *type_ids.get(&t.kind).ok_or_else(|| {
                SyncError::integrity(i, format!("no local id for transaction type '{}'", t.kind))
            })?;
            let amount = check_amount(i, t.amount, limits)?;
            if t.description.chars().count() > limits.max_description_len {
                return Err(SyncError::integrity(
                    i,
                    format!("description exceeds {} characters", limits.max_description_len),
                ));
            }
            let date = t.date.trim();
            if !is_valid_date(date) {
                return Err(SyncError::integrity(i, format!("invalid date '{}'", t.date)));
            }

            let mut category_ids_for_txn: Vec<i64> = match t.kind {
                TransactionKind::Income => Vec::new(),
                TransactionKind::Expense => t
                    .categories
                    .iter()
                    .filter_map(|name| category_ids.get(name.trim()).copied())
                    .collect(),
            };
            category_ids_for_txn.sort_unstable();
            category_ids_for_txn.dedup();
            Ok(NewTransaction {
                type_id,
                amount,
                description: t.description.clone(),
                date: date.to_string(),
                category_ids: category_ids_for_txn,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cat(id: i64, name: &str) -> Category {
        Category {
            id,
            name: name.to_string(),
            color: String::new(),
        }
    }

    fn row(id: i64, type_id: i64, amount: &str) -> TransactionRow {
        TransactionRow {
            id,
            type_id,
            amount: amount.to_string(),
            description: "lunch".to_string(),
            date: "2025-03-01".to_string(),
        }
    }

    fn types() -> HashMap<i64, String> {
        HashMap::from([(1, "Income".to_string()), (2, "expense".to_string())])
    }

    #[test]
    fn categories_to_cloud_is_idempotent_apart_from_timestamps() {
        let limits = Limits::default();
        let input = vec![cat(1, "  Food "), cat(2, "Rent")];
        let strip = |v: Vec<CloudCategory>| {
            v.into_iter()
                .map(|c| (c.name, c.color))
                .collect::<Vec<_>>()
        };
        let a = strip(categories_to_cloud(&input, &limits).unwrap());
        let b = strip(categories_to_cloud(&input, &limits).unwrap());
        assert_eq!(a, b);
        assert_eq!(a[0], ("Food".to_string(), Some("#6B7280".to_string())));
    }

    #[test]
    fn blank_or_long_category_names_are_rejected() {
        let limits = Limits::default();
        let err = categories_to_cloud(&[cat(1, "ok"), cat(2, "   ")], &limits).unwrap_err();
        assert!(matches!(err, SyncError::DataIntegrity { index: 1, .. }));

        let long = "x".repeat(limits.max_category_name_len + 1);
        let err = categories_to_cloud(&[cat(1, &long)], &limits).unwrap_err();
        assert!(matches!(err, SyncError::DataIntegrity { index: 0, .. }));
    }

    #[test]
    fn untyped_categories_must_be_a_list() {
        let limits = Limits::default();
        let err = categories_to_cloud_value(&json!({"name": "Food"}), &limits).unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));

        let ok = categories_to_cloud_value(&json!([{"name": "Food", "color": "#fff"}]), &limits)
            .unwrap();
        assert_eq!(ok[0].color.as_deref(), Some("#fff"));
    }

    #[test]
    fn valid_transactions_are_never_dropped() {
        let limits = Limits::default();
        let rows = vec![row(1, 1, "0"), row(2, 2, "12.50"), row(3, 2, "999999999.99")];
        let out = transactions_to_cloud(&rows, &[], &HashMap::new(), &types(), &limits).unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].kind, TransactionKind::Income);
        assert_eq!(out[1].amount, Decimal::new(1250, 2));
    }

    #[test]
    fn negative_or_nan_amounts_fail() {
        let limits = Limits::default();
        for bad in ["-1", "-0.01", "NaN", "abc", "", "1000000000"] {
            let err = transactions_to_cloud(&[row(7, 2, bad)], &[], &HashMap::new(), &types(), &limits)
                .unwrap_err();
            assert!(
                matches!(err, SyncError::DataIntegrity { index: 0, .. }),
                "{} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn unresolved_type_fails_and_unknown_categories_drop() {
        let limits = Limits::default();
        let err = transactions_to_cloud(&[row(1, 9, "5")], &[], &HashMap::new(), &types(), &limits)
            .unwrap_err();
        assert!(err.to_string().contains("unknown type id 9"));

        let links = vec![
            TransactionCategoryLink { transaction_id: 1, category_id: 10 },
            TransactionCategoryLink { transaction_id: 1, category_id: 99 },
        ];
        let names = HashMap::from([(10, "Food".to_string())]);
        let out = transactions_to_cloud(&[row(1, 2, "5")], &links, &names, &types(), &limits).unwrap();
        assert_eq!(out[0].categories, vec!["Food".to_string()]);
    }

    #[test]
    fn description_and_date_are_checked() {
        let limits = Limits::default();
        let mut r = row(1, 2, "5");
        r.description = "d".repeat(limits.max_description_len + 1);
        assert!(transactions_to_cloud(&[r], &[], &HashMap::new(), &types(), &limits).is_err());

        let mut r = row(1, 2, "5");
        r.date = "03/01/2025".to_string();
        assert!(transactions_to_cloud(&[r], &[], &HashMap::new(), &types(), &limits).is_err());
    }

    #[test]
    fn date_formats() {
        assert!(is_valid_date("2025-01-31"));
        assert!(is_valid_date("2025-01-31T10:15:00Z"));
        assert!(is_valid_date("2025-01-31T10:15:00.123+02:00"));
        assert!(!is_valid_date("2025-02-30"));
        assert!(!is_valid_date("2025-1-3"));
        assert!(!is_valid_date("yesterday"));
    }

    #[test]
    fn global_limits_fail_fast() {
        let limits = Limits {
            max_categories: 1,
            ..Limits::default()
        };
        let snapshot = LocalSnapshot {
            categories: vec![cat(1, "a"), cat(2, "b")],
            ..Default::default()
        };
        let err = prepare_local_data_for_sync(&snapshot, &limits).unwrap_err();
        assert!(matches!(err, SyncError::Validation(_)));

        let limits = Limits {
            max_payload_bytes: 10,
            ..Limits::default()
        };
        let snapshot = LocalSnapshot {
            categories: vec![cat(1, "Groceries")],
            ..Default::default()
        };
        let err = prepare_local_data_for_sync(&snapshot, &limits).unwrap_err();
        assert!(err.to_string().contains("exceeds limit"));
    }

    #[test]
    fn download_guard() {
        assert!(validate_downloaded_data(&json!({
            "categories": [{"name": "Food"}],
            "transactions": [{"amount": 5, "type": "expense", "categories": []}]
        })));
        assert!(!validate_downloaded_data(&json!({
            "categories": [{}],
            "transactions": []
        })));
        assert!(!validate_downloaded_data(&json!({
            "categories": [],
            "transactions": [{"amount": "5", "type": "expense", "categories": []}]
        })));
        assert!(!validate_downloaded_data(&json!({
            "categories": [],
            "transactions": [{"amount": 5, "type": "transfer", "categories": []}]
        })));
        assert!(!validate_downloaded_data(&json!({
            "categories": [],
            "transactions": [{"amount": 5, "type": "income", "categories": null}]
        })));
        assert!(!validate_downloaded_data(&json!({"categories": []})));
    }

    #[test]
    fn round_trip_preserves_names_and_amounts() {
        let limits = Limits::default();
        let snapshot = LocalSnapshot {
            categories: vec![cat(10, "Food"), cat(11, "Travel")],
            transactions: vec![row(1, 2, "12.34"), row(2, 1, "1500.05"), row(3, 2, "0.1")],
            links: vec![
                TransactionCategoryLink { transaction_id: 1, category_id: 10 },
                TransactionCategoryLink { transaction_id: 1, category_id: 11 },
            ],
            type_names: types(),
        };
        let payload = prepare_local_data_for_sync(&snapshot, &limits).unwrap();
        let wire = serde_json::to_value(&payload).unwrap();
        let back = parse_downloaded_data(wire).unwrap();

        let names: Vec<&str> = back.categories.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Food", "Travel"]);

        let type_ids = HashMap::from([(TransactionKind::Income, 1), (TransactionKind::Expense, 2)]);
        let cat_ids = HashMap::from([("Food".to_string(), 100), ("Travel".to_string(), 101)]);
        let local = prepare_downloaded_data_for_local(&back.transactions, &type_ids, &cat_ids, &limits).unwrap();
        let amounts: Vec<String> = local.iter().map(|t| t.amount.to_string()).collect();
        assert_eq!(amounts, vec!["12.34", "1500.05", "0.1"]);
        assert_eq!(local[0].category_ids, vec![100, 101]);
        assert_eq!(local[1].type_id, 1);
    }

    #[test]
    fn missing_type_id_is_an_error() {
        let t = CloudTransaction {
            kind: TransactionKind::Income,
            amount: Decimal::ONE,
            description: String::new(),
            date: "2025-01-01".to_string(),
            categories: vec!["Nope".to_string()],
        };
        let type_ids = HashMap::from([(TransactionKind::Expense, 2)]);
        let err = prepare_downloaded_data_for_local(&[t], &type_ids, &HashMap::new(), &Limits::default())
            .unwrap_err();
        assert!(matches!(err, SyncError::DataIntegrity { index: 0, .. }));
    }

    fn cloud_expense(amount: &str, date: &str) -> CloudTransaction {
        CloudTransaction {
            kind: TransactionKind::Expense,
            amount: Decimal::from_str(amount).unwrap(),
            description: String::new(),
            date: date.to_string(),
            categories: vec!["Food".to_string()],
        }
    }

    #[test]
    fn downloaded_records_must_satisfy_local_rules() {
        let limits = Limits::default();
        let type_ids = HashMap::from([(TransactionKind::Income, 1), (TransactionKind::Expense, 2)]);
        let cat_ids = HashMap::from([("Food".to_string(), 7)]);
        let prepare = |t: CloudTransaction| {
            prepare_downloaded_data_for_local(&[cloud_expense("1", "2025-01-01"), t], &type_ids, &cat_ids, &limits)
        };

        for bad in [
            cloud_expense("-5", "2025-01-01"),
            cloud_expense("1000000000", "2025-01-01"),
            cloud_expense("5", "not-a-date"),
            cloud_expense("5", "2025-02-30"),
        ] {
            let err = prepare(bad).unwrap_err();
            assert!(matches!(err, SyncError::DataIntegrity { index: 1, .. }), "{:?}", err);
        }

        let mut long = cloud_expense("5", "2025-01-01");
        long.description = "x".repeat(501);
        assert!(prepare(long).is_err());

        let ok = prepare(cloud_expense("5", " 2025-01-02 ")).unwrap();
        assert_eq!(ok[1].date, "2025-01-02");
        assert_eq!(ok[1].category_ids, vec![7]);
    }

    #[test]
    fn downloaded_income_carries_no_categories() {
        let type_ids = HashMap::from([(TransactionKind::Income, 1), (TransactionKind::Expense, 2)]);
        let cat_ids = HashMap::from([("Food".to_string(), 7)]);
        let mut pay = cloud_expense("2500", "2025-01-31");
        pay.kind = TransactionKind::Income;
        let local = prepare_downloaded_data_for_local(&[pay], &type_ids, &cat_ids, &Limits::default()).unwrap();
        assert_eq!(local[0].type_id, 1);
        assert!(local[0].category_ids.is_empty());
    }
}
