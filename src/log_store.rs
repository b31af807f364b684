//! Shared per-job log and status table.
//!
//! Every job runner thread writes here and the viewers read from here. All
//! access is serialized through a single mutex, so a reader always observes
//! whole lines in arrival order.

use std::sync::{Mutex, MutexGuard, PoisonError};

use indexmap::IndexMap;

use crate::job::JobStatus;

#[derive(Debug)]
struct JobLog {
    lines: Vec<String>,
    status: JobStatus,
    detail: Option<String>,
}

impl JobLog {
    fn new() -> Self {
        Self {
            lines: Vec::new(),
            status: JobStatus::Running,
            detail: None,
        }
    }
}

#[derive(Debug, Default)]
pub struct LogStore {
    inner: Mutex<IndexMap<String, JobLog>>,
}

impl LogStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, IndexMap<String, JobLog>> {
        // A writer that panicked mid-append cannot leave a torn line behind,
        // so the data is still consistent.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates a `running` entry. Returns `false` when the name is taken.
    pub fn register(&self, job: &str) -> bool {
        let mut jobs = self.lock();
        if jobs.contains_key(job) {
            return false;
        }
        jobs.insert(job.to_owned(), JobLog::new());
        true
    }

    /// Appends one whole line. Rejected for unknown jobs and frozen logs.
    pub fn append(&self, job: &str, line: impl Into<String>) -> bool {
        let mut jobs = self.lock();
        match jobs.get_mut(job) {
            Some(log) if !log.status.is_terminal() => {
                log.lines.push(line.into());
                true
            }
            _ => false,
        }
    }

    pub fn snapshot(&self, job: &str) -> Vec<String> {
        self.lock()
            .get(job)
            .map(|log| log.lines.clone())
            .unwrap_or_default()
    }

    /// Copy of the newest `count` lines, oldest first.
    pub fn tail(&self, job: &str, count: usize) -> Vec<String> {
        self.lock()
            .get(job)
            .map(|log| {
                let start = log.lines.len().saturating_sub(count);
                log.lines[start..].to_vec()
            })
            .unwrap_or_default()
    }

    pub fn line_count(&self, job: &str) -> usize {
        self.lock().get(job).map_or(0, |log| log.lines.len())
    }

    /// Records a status change. Once a job is terminal its status, detail and
    /// log are frozen and further writes return `false`.
    pub fn set_status(&self, job: &str, status: JobStatus, detail: Option<String>) -> bool {
        let mut jobs = self.lock();
        let Some(log) = jobs.get_mut(job) else {
            return false;
        };
        if log.status.is_terminal() {
            return false;
        }
        log.status = status;
        log.detail = detail;
        true
    }

    pub fn status(&self, job: &str) -> Option<JobStatus> {
        self.lock().get(job).map(|log| log.status)
    }

    pub fn detail(&self, job: &str) -> Option<String> {
        self.lock().get(job).and_then(|log| log.detail.clone())
    }

    /// Every job with its status, in registration order.
    pub fn statuses(&self) -> Vec<(String, JobStatus)> {
        self.lock()
            .iter()
            .map(|(name, log)| (name.clone(), log.status))
            .collect()
    }

    pub fn all_terminal(&self) -> bool {
        self.lock().values().all(|log| log.status.is_terminal())
    }
}

#[cfg(test)]
#[path = "tests/log_store_tests.rs"]
mod tests;
