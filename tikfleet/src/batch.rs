//! Per-host outcomes of fleet-wide operations.

use log::error;

use crate::error::{ConfigError, Error, Result};

/// Results of running one operation over several hosts, in host order.
///
/// Hosts are processed one after another and a failure on one host never
/// stops the others.
#[derive(Debug)]
pub struct BatchReport<T> {
    entries: Vec<(String, Result<T>)>,
}

impl<T> Default for BatchReport<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T> BatchReport<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome for `host`.
    pub fn record(&mut self, host: &str, result: Result<T>) {
        if let Err(e) = &result {
            error!("{}: {}", host, e);
        }
        self.entries.push((host.to_string(), result));
    }

    pub fn entries(&self) -> &[(String, Result<T>)] {
        &self.entries
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &T> {
        self.entries.iter().filter_map(|(_, r)| r.as_ref().ok())
    }

    pub fn failed(&self) -> impl Iterator<Item = (&str, &Error)> {
        self.entries
            .iter()
            .filter_map(|(host, r)| r.as_ref().err().map(|e| (host.as_str(), e)))
    }

    pub fn failed_count(&self) -> usize {
        self.failed().count()
    }

    pub fn total(&self) -> usize {
        self.entries.len()
    }

    /// Fail if any host failed.
    pub fn require_all(self) -> Result<Vec<T>> {
        let failed = self.failed_count();
        if failed > 0 {
            return Err(self.aggregate_error(failed));
        }
        Ok(self.into_succeeded())
    }

    /// Fail only if every host failed.
    pub fn require_any(self) -> Result<Vec<T>> {
        let failed = self.failed_count();
        if failed > 0 && failed == self.total() {
            return Err(self.aggregate_error(failed));
        }
        Ok(self.into_succeeded())
    }

    fn into_succeeded(self) -> Vec<T> {
        self.entries.into_iter().filter_map(|(_, r)| r.ok()).collect()
    }

    fn aggregate_error(&self, failed: usize) -> Error {
        ConfigError::BatchFailed {
            failed,
            total: self.total(),
        }
        .into()
    }
}
