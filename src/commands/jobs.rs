// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use std::sync::mpsc;
use std::time::Duration;

use crate::error::SyncError;
use crate::models::{JobStatus, SyncJob};
use crate::poller::JobPoller;
use anyhow::{Result, bail};

enum Event {
    Update(SyncJob),
    Error(String, bool),
}

pub fn handle(poller: &JobPoller, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("watch", sub)) => {
            let id = sub.get_one::<String>("id").unwrap().trim().to_string();
            if let Some(ms) = sub.get_one::<u64>("interval_ms") {
                poller.set_poll_interval(Duration::from_millis(*ms));
            }
            watch(poller, &id)
        }
        _ => Ok(()),
    }
}

/// Blocks until the job reaches a terminal state or polling gives up.
pub fn watch(poller: &JobPoller, job_id: &str) -> Result<()> {
    let (tx, rx) = mpsc::channel();
    let err_tx = tx.clone();
    poller.start_polling(
        job_id,
        move |job| {
            let _ = tx.send(Event::Update(job.clone()));
        },
        move |e| {
            let fatal = matches!(e, SyncError::JobTimeout { .. });
            let _ = err_tx.send(Event::Error(e.user_message(), fatal));
        },
    );

    // the worker drops both senders when it stops, which ends this loop
    for event in rx {
        match event {
            Event::Update(job) => {
                println!(
                    "[{:>3}%] {:?} {}/{}",
                    job.progress, job.status, job.processed_items, job.total_items
                );
                match job.status {
                    JobStatus::Completed => return Ok(()),
                    JobStatus::Failed => bail!(
                        "Job {} failed: {}",
                        job.id,
                        crate::error::message_or_fallback(job.error_message.as_deref())
                    ),
                    _ => {}
                }
            }
            Event::Error(msg, fatal) => {
                eprintln!("warning: {}", msg);
                if fatal {
                    bail!("{}", msg);
                }
            }
        }
    }
    bail!("Stopped polling job {} before it finished", job_id)
}
