// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::api::RemoteApi;
use crate::store::LocalStore;
use crate::sync::{SyncOutcome, SyncProgress, SyncService};
use crate::utils::{maybe_print_json, pretty_table};
use anyhow::{Result, bail};

pub fn handle<S: LocalStore, R: RemoteApi>(
    service: &mut SyncService<S, R>,
    m: &clap::ArgMatches,
) -> Result<()> {
    match m.subcommand() {
        Some(("upload", sub)) => finish(service.upload_data(), sub.get_flag("json")),
        Some(("download", sub)) => finish(service.download_data(), sub.get_flag("json")),
        Some(("full", sub)) => {
            let json = sub.get_flag("json");
            let mut print = |p: &SyncProgress| {
                if !json {
                    eprintln!(
                        "[{:>3}%] {:?} {}",
                        p.progress,
                        p.status,
                        p.message.as_deref().unwrap_or("")
                    );
                }
            };
            let outcome = service.full_sync(Some(&mut print));
            finish(outcome, json)
        }
        Some(("status", sub)) => status(service, sub.get_flag("json")),
        _ => Ok(()),
    }
}

fn finish(outcome: SyncOutcome, json: bool) -> Result<()> {
    if !maybe_print_json(json, &outcome)? {
        println!("{}", outcome.message);
        if let Some(results) = &outcome.results {
            if let Some(up) = &results.upload {
                println!(
                    "  categories: {} created, {} updated; transactions: {} created, {} updated",
                    up.categories.created,
                    up.categories.updated,
                    up.transactions.created,
                    up.transactions.updated
                );
            }
            if let Some(down) = &results.download {
                println!(
                    "  local data replaced: {} categories, {} transactions",
                    down.categories, down.transactions
                );
            }
        }
    }
    if !outcome.success {
        bail!(
            "{}",
            outcome
                .error
                .unwrap_or_else(|| crate::error::message_or_fallback(None))
        );
    }
    Ok(())
}

fn status<S: LocalStore, R: RemoteApi>(service: &SyncService<S, R>, json: bool) -> Result<()> {
    let report = service.sync_state()?;
    if !maybe_print_json(json, &report)? {
        let last = report
            .last_sync
            .map(|d| d.to_rfc3339())
            .unwrap_or_else(|| "never".to_string());
        let rows = vec![
            vec!["State".to_string(), format!("{:?}", report.state)],
            vec!["Detail".to_string(), report.message.clone()],
            vec!["Local items".to_string(), report.local_count.to_string()],
            vec!["Cloud items".to_string(), report.cloud_count.to_string()],
            vec!["Last sync".to_string(), last],
        ];
        println!("{}", pretty_table(&["Field", "Value"], rows));
    }
    Ok(())
}
