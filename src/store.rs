// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use log::{debug, info};
use rusqlite::{Connection, OptionalExtension, params};
use rust_decimal::Decimal;

use crate::config::{DEFAULT_CATEGORY_COLOR, Limits};
use crate::error::{SyncError, SyncResult};
use crate::models::{
    Category, DownloadedData, LocalStats, NewTransaction, TransactionCategoryLink,
    TransactionKind, TransactionRow, TransactionView,
};
use crate::transform::{LocalSnapshot, check_category_name, prepare_downloaded_data_for_local};

/// What the sync orchestrator needs from on-device storage.
pub trait LocalStore {
    fn snapshot(&self) -> SyncResult<LocalSnapshot>;

    fn local_stats(&self) -> SyncResult<LocalStats>;

    /// Destructive replace: wipe links, transactions and categories, insert
    /// `data` and record `synced_at` as the last sync. All or nothing.
    fn replace_all(
        &mut self,
        data: &DownloadedData,
        synced_at: DateTime<Utc>,
    ) -> SyncResult<ReplaceSummary>;

    fn last_sync(&self) -> SyncResult<Option<DateTime<Utc>>>;

    fn set_last_sync(&self, at: DateTime<Utc>) -> SyncResult<()>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct ReplaceSummary {
    pub categories: usize,
    pub transactions: usize,
}

pub struct SqliteStore {
    conn: Connection,
    limits: Limits,
}

impl SqliteStore {
    pub fn new(conn: Connection) -> Self {
        Self::with_limits(conn, Limits::default())
    }

    pub fn with_limits(conn: Connection, limits: Limits) -> Self {
        Self { conn, limits }
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn add_category(&self, name: &str, color: Option<&str>) -> SyncResult<i64> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SyncError::Validation("category name must not be empty".into()));
        }
        let color = color
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_CATEGORY_COLOR);
        self.conn.execute(
            "INSERT INTO categories(name, color) VALUES (?1, ?2)",
            params![name, color],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn list_categories(&self) -> SyncResult<Vec<Category>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, color FROM categories ORDER BY name")?;
        let rows = stmt.query_map([], |r| {
            Ok(Category {
                id: r.get(0)?,
                name: r.get(1)?,
                color: r.get(2)?,
            })
        })?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn category_id(&self, name: &str) -> SyncResult<i64> {
        self.conn
            .query_row(
                "SELECT id FROM categories WHERE name=?1",
                params![name.trim()],
                |r| r.get(0),
            )
            .optional()?
            .ok_or_else(|| SyncError::Validation(format!("Category '{}' not found", name.trim())))
    }

    /// Removes the category and its transaction links in one transaction.
    pub fn delete_category(&mut self, name: &str) -> SyncResult<bool> {
        let tx = self.conn.transaction()?;
        let id: Option<i64> = tx
            .query_row(
                "SELECT id FROM categories WHERE name=?1",
                params![name.trim()],
                |r| r.get(0),
            )
            .optional()?;
        let Some(id) = id else {
            return Ok(false);
        };
        tx.execute(
            "DELETE FROM transaction_categories WHERE category_id=?1",
            params![id],
        )?;
        tx.execute("DELETE FROM categories WHERE id=?1", params![id])?;
        tx.commit()?;
        Ok(true)
    }

    /// Idempotent: returns the existing id when the type is already present.
    pub fn ensure_transaction_type(&self, kind: TransactionKind) -> SyncResult<i64> {
        ensure_type(&self.conn, kind)
    }

    pub fn add_transaction(
        &mut self,
        kind: TransactionKind,
        amount: Decimal,
        description: &str,
        date: &str,
        category_ids: &[i64],
    ) -> SyncResult<i64> {
        if amount < Decimal::ZERO {
            return Err(SyncError::Validation(format!(
                "amount {} must not be negative",
                amount
            )));
        }
        if kind == TransactionKind::Income && !category_ids.is_empty() {
            return Err(SyncError::Validation(
                "income transactions do not take categories".into(),
            ));
        }
        let tx = self.conn.transaction()?;
        let type_id = ensure_type(&tx, kind)?;
        let mut ids = category_ids.to_vec();
        ids.sort_unstable();
        ids.dedup();
        let id = insert_transaction(
            &tx,
            &NewTransaction {
                type_id,
                amount,
                description: description.trim().to_string(),
                date: date.trim().to_string(),
                category_ids: ids,
            },
        )?;
        tx.commit()?;
        Ok(id)
    }

    /// Deletes the category links and the transaction row atomically.
    pub fn delete_transaction(&mut self, id: i64) -> SyncResult<bool> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM transaction_categories WHERE transaction_id=?1",
            params![id],
        )?;
        let n = tx.execute("DELETE FROM transactions WHERE id=?1", params![id])?;
        tx.commit()?;
        Ok(n > 0)
    }

    pub fn list_transactions(&self, limit: Option<usize>) -> SyncResult<Vec<TransactionView>> {
        let mut sql = String::from(
            "SELECT t.id, tt.name, t.amount, t.description, t.date,
                    COALESCE((SELECT group_concat(c.name, char(31)) FROM transaction_categories tc
                              JOIN categories c ON c.id = tc.category_id
                              WHERE tc.transaction_id = t.id), '')
             FROM transactions t JOIN transaction_types tt ON tt.id = t.type_id
             ORDER BY t.date DESC, t.id DESC",
        );
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(r) = rows.next()? {
            let cats: String = r.get(5)?;
            out.push(TransactionView {
                id: r.get(0)?,
                kind: r.get(1)?,
                amount: r.get(2)?,
                description: r.get(3)?,
                date: r.get(4)?,
                categories: cats
                    .split('\u{1f}')
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect(),
            });
        }
        Ok(out)
    }
}

fn write_last_sync(conn: &Connection, at: DateTime<Utc>) -> SyncResult<()> {
    conn.execute(
        "INSERT INTO settings(key, value) VALUES('last_sync', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        params![at.to_rfc3339()],
    )?;
    Ok(())
}

fn ensure_type(conn: &Connection, kind: TransactionKind) -> SyncResult<i64> {
    conn.execute(
        "INSERT OR IGNORE INTO transaction_types(name) VALUES (?1)",
        params![kind.as_str()],
    )?;
    let id = conn.query_row(
        "SELECT id FROM transaction_types WHERE name=?1",
        params![kind.as_str()],
        |r| r.get(0),
    )?;
    Ok(id)
}

fn insert_transaction(conn: &Connection, t: &NewTransaction) -> SyncResult<i64> {
    conn.execute(
        "INSERT INTO transactions(type_id, amount, description, date) VALUES (?1, ?2, ?3, ?4)",
        params![t.type_id, t.amount.to_string(), t.description, t.date],
    )?;
    let id = conn.last_insert_rowid();
    let mut link = conn.prepare_cached(
        "INSERT INTO transaction_categories(transaction_id, category_id) VALUES (?1, ?2)",
    )?;
    for cat in &t.category_ids {
        link.execute(params![id, cat])?;
    }
    Ok(id)
}

fn collect<T, F>(conn: &Connection, sql: &str, f: F) -> SyncResult<Vec<T>>
where
    F: FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
{
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([], f)?;
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

impl LocalStore for SqliteStore {
    fn snapshot(&self) -> SyncResult<LocalSnapshot> {
        let categories = collect(
            &self.conn,
            "SELECT id, name, color FROM categories ORDER BY id",
            |r| {
                Ok(Category {
                    id: r.get(0)?,
                    name: r.get(1)?,
                    color: r.get(2)?,
                })
            },
        )?;
        let transactions = collect(
            &self.conn,
            "SELECT id, type_id, amount, description, date FROM transactions ORDER BY id",
            |r| {
                Ok(TransactionRow {
                    id: r.get(0)?,
                    type_id: r.get(1)?,
                    amount: r.get(2)?,
                    description: r.get(3)?,
                    date: r.get(4)?,
                })
            },
        )?;
        let links = collect(
            &self.conn,
            "SELECT transaction_id, category_id FROM transaction_categories ORDER BY rowid",
            |r| {
                Ok(TransactionCategoryLink {
                    transaction_id: r.get(0)?,
                    category_id: r.get(1)?,
                })
            },
        )?;
        let type_names: HashMap<i64, String> = collect(
            &self.conn,
            "SELECT id, name FROM transaction_types",
            |r| Ok((r.get::<_, i64>(0)?, r.get::<_, String>(1)?)),
        )?
        .into_iter()
        .collect();

        debug!(
            "snapshot: {} categories, {} transactions, {} links",
            categories.len(),
            transactions.len(),
            links.len()
        );
        Ok(LocalSnapshot {
            categories,
            transactions,
            links,
            type_names,
        })
    }

    fn local_stats(&self) -> SyncResult<LocalStats> {
        let (categories_count, transactions_count): (i64, i64) = self.conn.query_row(
            "SELECT (SELECT COUNT(*) FROM categories), (SELECT COUNT(*) FROM transactions)",
            [],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )?;
        Ok(LocalStats {
            categories_count: categories_count as u64,
            transactions_count: transactions_count as u64,
        })
    }

    fn replace_all(
        &mut self,
        data: &DownloadedData,
        synced_at: DateTime<Utc>,
    ) -> SyncResult<ReplaceSummary> {
        let tx = self.conn.transaction()?;
        tx.execute_batch(
            "DELETE FROM transaction_categories;
             DELETE FROM transactions;
             DELETE FROM categories;",
        )?;

        let mut type_ids = HashMap::new();
        for kind in TransactionKind::ALL {
            type_ids.insert(kind, ensure_type(&tx, kind)?);
        }

        {
            let mut insert = tx.prepare_cached(
                "INSERT OR IGNORE INTO categories(name, color) VALUES (?1, ?2)",
            )?;
            for (i, c) in data.categories.iter().enumerate() {
                let name = check_category_name(i, &c.name, &self.limits)?;
                let color = c
                    .color
                    .as_deref()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .unwrap_or(DEFAULT_CATEGORY_COLOR);
                insert.execute(params![name, color])?;
            }
        }
        let category_ids: HashMap<String, i64> = collect(&tx, "SELECT name, id FROM categories", |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?))
        })?
        .into_iter()
        .collect();

        let rows = prepare_downloaded_data_for_local(
            &data.transactions,
            &type_ids,
            &category_ids,
            &self.limits,
        )?;
        for row in &rows {
            insert_transaction(&tx, row)?;
        }
        write_last_sync(&tx, synced_at)?;
        tx.commit()?;

        let summary = ReplaceSummary {
            categories: category_ids.len(),
            transactions: rows.len(),
        };
        info!(
            "replaced local data with {} categories and {} transactions",
            summary.categories, summary.transactions
        );
        Ok(summary)
    }

    fn last_sync(&self) -> SyncResult<Option<DateTime<Utc>>> {
        let v: Option<String> = self
            .conn
            .query_row("SELECT value FROM settings WHERE key='last_sync'", [], |r| {
                r.get(0)
            })
            .optional()?;
        Ok(v.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|d| d.with_timezone(&Utc)))
    }

    fn set_last_sync(&self, at: DateTime<Utc>) -> SyncResult<()> {
        write_last_sync(&self.conn, at)
    }
}
