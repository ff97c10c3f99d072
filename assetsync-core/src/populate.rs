use crate::fetch::{FetchError, Fetcher};
use crate::hash::ObjectHash;
use crate::manifest::Manifest;
use crate::progress::Progress;
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PopulateReport {
    pub fetched: u64,
    /// Objects that could not be fetched. Logged and returned, never persisted.
    pub failed: Vec<ObjectHash>,
}

#[derive(Debug, thiserror::Error)]
pub enum PopulateError {
    #[error("building worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
    #[error("population cancelled after {} object(s)", .0.fetched)]
    Cancelled(Box<PopulateReport>),
}

/// Seeds the local store from a remote manifest, bypassing local lookups.
pub struct Populator {
    fetcher: Fetcher,
    jobs: usize,
    progress_interval: Duration,
}

impl Populator {
    pub fn new(fetcher: Fetcher, jobs: usize) -> Self {
        Self { fetcher, jobs: jobs.max(1), progress_interval: Duration::ZERO }
    }

    pub fn with_progress(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Fetch every distinct object in `manifest`, present locally or not.
    pub fn populate(&self, manifest: &Manifest) -> Result<PopulateReport, PopulateError> {
        let hashes: BTreeSet<&ObjectHash> = manifest.iter().map(|(_, r)| &r.hash).collect();
        info!(objects = hashes.len(), entries = manifest.len(), "populating local store");

        let pool = match self.jobs {
            1 => None,
            n => Some(rayon::ThreadPoolBuilder::new().num_threads(n).build()?),
        };
        let cancel = self.fetcher.cancel_token();
        let fetched = AtomicU64::new(0);
        let failed = Mutex::new(Vec::new());
        let progress = Progress::new("populate", self.progress_interval);
        progress.set_total(hashes.len() as u64);
        let reporter = progress.start();

        let visit = |hash: &ObjectHash| {
            if cancel.is_cancelled() {
                return;
            }
            match self.fetcher.fetch(hash) {
                Ok(_) => {
                    fetched.fetch_add(1, Ordering::Relaxed);
                }
                Err(FetchError::Cancelled { .. }) => return,
                Err(e) => {
                    warn!(%hash, error = %e, "object not populated");
                    failed.lock().unwrap_or_else(|e| e.into_inner()).push(hash.clone());
                }
            }
            progress.inc_entry();
        };

        match &pool {
            Some(pool) => {
                let list: Vec<&ObjectHash> = hashes.into_iter().collect();
                pool.install(|| list.into_par_iter().for_each(visit));
            }
            None => hashes.into_iter().for_each(visit),
        }
        drop(reporter);

        let mut failed = failed.into_inner().unwrap_or_else(|e| e.into_inner());
        failed.sort();
        let report = PopulateReport { fetched: fetched.into_inner(), failed };
        if cancel.is_cancelled() {
            return Err(PopulateError::Cancelled(Box::new(report)));
        }
        info!(fetched = report.fetched, failed = report.failed.len(), "population finished");
        Ok(report)
    }
}
