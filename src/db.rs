// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use directories::ProjectDirs;
use log::debug;
use once_cell::sync::Lazy;
use rusqlite::Connection;
use std::fs;
use std::path::PathBuf;

use crate::config::AppConfig;
use crate::error::{SyncError, SyncResult};

static APP: Lazy<(&str, &str, &str)> =
    Lazy::new(|| ("com.alphavelocity", "Spendsync", "spendsync"));

pub fn project_dirs() -> SyncResult<ProjectDirs> {
    ProjectDirs::from(APP.0, APP.1, APP.2).ok_or_else(|| {
        SyncError::Config("Could not determine platform-specific data dir".to_string())
    })
}

pub fn data_dir() -> SyncResult<PathBuf> {
    let proj = project_dirs()?;
    let dir = proj.data_dir();
    fs::create_dir_all(dir)?;
    Ok(dir.to_path_buf())
}

pub fn db_path(cfg: &AppConfig) -> SyncResult<PathBuf> {
    if let Some(p) = &cfg.database_path {
        return Ok(p.clone());
    }
    Ok(data_dir()?.join("spendsync.sqlite"))
}

pub fn open_or_init(cfg: &AppConfig) -> SyncResult<Connection> {
    let path = db_path(cfg)?;
    debug!("opening database at {}", path.display());
    let conn = Connection::open(&path)?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn open_in_memory() -> SyncResult<Connection> {
    let conn = Connection::open_in_memory()?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> SyncResult<()> {
    conn.execute_batch(
        r#"
    PRAGMA foreign_keys = ON;

    CREATE TABLE IF NOT EXISTS settings(
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS categories(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        color TEXT NOT NULL DEFAULT '#6B7280',
        created_at TEXT NOT NULL DEFAULT (datetime('now'))
    );

    CREATE TABLE IF NOT EXISTS transaction_types(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE
    );

    CREATE TABLE IF NOT EXISTS transactions(
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        type_id INTEGER NOT NULL,
        amount TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        date TEXT NOT NULL,
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        FOREIGN KEY(type_id) REFERENCES transaction_types(id)
    );
    CREATE INDEX IF NOT EXISTS idx_transactions_date ON transactions(date);

    -- many-to-many: an expense may carry several categories
    CREATE TABLE IF NOT EXISTS transaction_categories(
        transaction_id INTEGER NOT NULL,
        category_id INTEGER NOT NULL,
        PRIMARY KEY(transaction_id, category_id),
        FOREIGN KEY(transaction_id) REFERENCES transactions(id),
        FOREIGN KEY(category_id) REFERENCES categories(id)
    );
    "#,
    )?;
    Ok(())
}
