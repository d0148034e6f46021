// Copyright (c) 2025 Soumyadip Sarkar.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Polls server-side sync jobs until they reach a terminal state.
//!
//! Each job id gets one worker thread. Stopping a poll drops the worker's
//! stop channel, which wakes it from its interval wait.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::config::PollingConfig;
use crate::error::{SyncError, SyncResult};
use crate::models::SyncJob;

pub trait JobStatusSource: Send + Sync {
    fn job_status(&self, job_id: &str) -> SyncResult<SyncJob>;
}

impl<T: JobStatusSource + ?Sized> JobStatusSource for Arc<T> {
    fn job_status(&self, job_id: &str) -> SyncResult<SyncJob> {
        (**self).job_status(job_id)
    }
}

struct ActivePoll {
    generation: u64,
    _stop: Sender<()>,
}

type ActiveMap = Arc<Mutex<HashMap<String, ActivePoll>>>;

fn lock(active: &ActiveMap) -> MutexGuard<'_, HashMap<String, ActivePoll>> {
    active.lock().unwrap_or_else(|e| e.into_inner())
}

pub struct JobPoller {
    source: Arc<dyn JobStatusSource>,
    interval_ms: Arc<AtomicU64>,
    min_interval: Duration,
    timeout: Duration,
    max_errors: u32,
    active: ActiveMap,
    generation: AtomicU64,
}

impl JobPoller {
    pub fn new(source: Arc<dyn JobStatusSource>, cfg: &PollingConfig) -> Self {
        Self {
            source,
            interval_ms: Arc::new(AtomicU64::new(cfg.interval().as_millis() as u64)),
            min_interval: cfg.min_interval(),
            timeout: cfg.timeout(),
            max_errors: cfg.max_errors.max(1),
            active: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.load(Ordering::Relaxed))
    }

    /// Clamped to the configured minimum; applies from the next wait on.
    pub fn set_poll_interval(&self, interval: Duration) {
        let clamped = interval.max(self.min_interval);
        self.interval_ms
            .store(clamped.as_millis() as u64, Ordering::Relaxed);
    }

    /// Starts polling `job_id`, replacing any poll already running for it.
    /// The first poll happens immediately on the worker thread.
    pub fn start_polling<U, E>(&self, job_id: &str, on_update: U, on_error: E)
    where
        U: FnMut(&SyncJob) + Send + 'static,
        E: FnMut(&SyncError) + Send + 'static,
    {
        let (stop_tx, stop_rx) = mpsc::channel();
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        {
            let mut active = lock(&self.active);
            if active.remove(job_id).is_some() {
                debug!("restarting poll for job {}", job_id);
            }
            active.insert(
                job_id.to_string(),
                ActivePoll {
                    generation,
                    _stop: stop_tx,
                },
            );
        }

        let worker = Worker {
            job_id: job_id.to_string(),
            generation,
            source: Arc::clone(&self.source),
            interval_ms: Arc::clone(&self.interval_ms),
            timeout: self.timeout,
            max_errors: self.max_errors,
            active: Arc::clone(&self.active),
            stop: stop_rx,
            on_update: Box::new(on_update),
            on_error: Box::new(on_error),
        };
        info!("polling job {}", job_id);
        thread::spawn(move || worker.run());
    }

    /// Returns whether a poll was running.
    pub fn stop_polling(&self, job_id: &str) -> bool {
        let stopped = lock(&self.active).remove(job_id).is_some();
        if stopped {
            debug!("stopped polling job {}", job_id);
        }
        stopped
    }

    pub fn stop_all_polling(&self) {
        lock(&self.active).clear();
    }

    pub fn is_polling(&self, job_id: &str) -> bool {
        lock(&self.active).contains_key(job_id)
    }

    pub fn active_jobs(&self) -> Vec<String> {
        let mut ids: Vec<String> = lock(&self.active).keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl Drop for JobPoller {
    fn drop(&mut self) {
        self.stop_all_polling();
    }
}

struct Worker {
    job_id: String,
    generation: u64,
    source: Arc<dyn JobStatusSource>,
    interval_ms: Arc<AtomicU64>,
    timeout: Duration,
    max_errors: u32,
    active: ActiveMap,
    stop: Receiver<()>,
    on_update: Box<dyn FnMut(&SyncJob) + Send>,
    on_error: Box<dyn FnMut(&SyncError) + Send>,
}

impl Worker {
    fn cancelled(&self) -> bool {
        matches!(
            self.stop.try_recv(),
            Ok(()) | Err(TryRecvError::Disconnected)
        )
    }

    fn run(mut self) {
        let started = Instant::now();
        let mut errors = 0u32;

        loop {
            let elapsed = started.elapsed();
            if elapsed >= self.timeout {
                warn!("job {} timed out after {:?}", self.job_id, elapsed);
                let err = SyncError::JobTimeout {
                    job_id: self.job_id.clone(),
                    elapsed_secs: elapsed.as_secs(),
                };
                (self.on_error)(&err);
                break;
            }

            let result = self.source.job_status(&self.job_id);
            if self.cancelled() {
                return;
            }
            match result {
                Ok(job) => {
                    debug!(
                        "job {}: {:?} {}% ({}/{})",
                        job.id, job.status, job.progress, job.processed_items, job.total_items
                    );
                    (self.on_update)(&job);
                    if job.status.is_terminal() {
                        info!("job {} finished: {:?}", self.job_id, job.status);
                        break;
                    }
                }
                Err(e) => {
                    errors += 1;
                    warn!("polling job {} failed ({}/{}): {}", self.job_id, errors, self.max_errors, e);
                    (self.on_error)(&e);
                    if errors >= self.max_errors {
                        warn!("giving up on job {} after {} errors", self.job_id, errors);
                        break;
                    }
                }
            }

            let interval = Duration::from_millis(self.interval_ms.load(Ordering::Relaxed));
            let remaining = self.timeout.saturating_sub(started.elapsed());
            match self.stop.recv_timeout(interval.min(remaining)) {
                Err(RecvTimeoutError::Timeout) => continue,
                _ => return,
            }
        }

        let mut active = lock(&self.active);
        if active
            .get(&self.job_id)
            .is_some_and(|p| p.generation == self.generation)
        {
            active.remove(&self.job_id);
        }
    }
}
