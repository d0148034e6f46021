// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use std::sync::Arc;

use anyhow::{Context, Result};

use spendsync::api::ApiClient;
use spendsync::config::AppConfig;
use spendsync::poller::JobPoller;
use spendsync::session::SessionStore;
use spendsync::store::SqliteStore;
use spendsync::sync::SyncService;
use spendsync::{cli, commands, db};

fn init_logging(verbosity: u8) {
    let default = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp(None)
        .init();
}

fn main() -> Result<()> {
    let cli = cli::build_cli();
    let matches = cli.get_matches();
    init_logging(matches.get_count("verbose"));

    let cfg = AppConfig::load().context("Failed to load configuration")?;
    let conn = db::open_or_init(&cfg).context("Failed to open local database")?;
    let mut store = SqliteStore::with_limits(conn, cfg.limits.clone());

    let api = || -> Result<Arc<ApiClient>> {
        let session = SessionStore::open(&db::data_dir()?)?;
        Ok(Arc::new(ApiClient::new(&cfg.api, Arc::new(session))?))
    };

    match matches.subcommand() {
        Some(("init", _)) => {
            println!("Database initialized at {}", db::db_path(&cfg)?.display());
        }
        Some(("category", sub)) => commands::categories::handle(&mut store, sub)?,
        Some(("tx", sub)) => commands::transactions::handle(&mut store, sub)?,
        Some(("auth", sub)) => commands::auth::handle(&*api()?, sub)?,
        Some(("sync", sub)) => {
            let mut service = SyncService::new(store, api()?, cfg.limits.clone());
            commands::sync::handle(&mut service, sub)?
        }
        Some(("job", sub)) => {
            let poller = JobPoller::new(api()?, &cfg.polling);
            commands::jobs::handle(&poller, sub)?
        }
        _ => {
            cli::build_cli().print_help()?;
            println!();
        }
    }
    Ok(())
}
