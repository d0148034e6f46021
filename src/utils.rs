// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use comfy_table::{Cell, Table, presets::UTF8_FULL};
use rust_decimal::Decimal;

use crate::error::SyncResult;
use crate::transform::is_valid_date;

const UA: &str = concat!(
    "spendsync/",
    env!("CARGO_PKG_VERSION"),
    " (+https://github.com/alphavelocity/spendsync)"
);

pub fn http_client(timeout: Duration) -> SyncResult<reqwest::blocking::Client> {
    let c = reqwest::blocking::Client::builder()
        .timeout(timeout)
        .user_agent(UA)
        .build()?;
    Ok(c)
}

/// Accepts `YYYY-MM-DD` or an ISO date-time; returns the trimmed input.
pub fn parse_date(s: &str) -> Result<String> {
    let s = s.trim();
    if is_valid_date(s) {
        Ok(s.to_string())
    } else {
        Err(anyhow!(
            "Invalid date '{}', expected YYYY-MM-DD or YYYY-MM-DDTHH:MM:SS",
            s
        ))
    }
}

pub fn parse_decimal(s: &str) -> Result<Decimal> {
    s.trim()
        .parse::<Decimal>()
        .with_context(|| format!("Invalid decimal '{}'", s))
}

pub fn pretty_table(headers: &[&str], rows: Vec<Vec<String>>) -> Table {
    let mut t = Table::new();
    t.load_preset(UTF8_FULL);
    t.set_header(headers.iter().map(|h| Cell::new(*h)));
    for r in rows {
        t.add_row(r.into_iter().map(Cell::new));
    }
    t
}

pub fn maybe_print_json<T: serde::Serialize>(json_flag: bool, v: &T) -> Result<bool> {
    if json_flag {
        println!("{}", serde_json::to_string_pretty(v)?);
        return Ok(true);
    }
    Ok(false)
}
