//! Materialise a manifest into a destination tree.
//!
//! For every entry the object is taken from the local store, fetched from the
//! remote store on a miss, and copied to `dest_root/<logical path>` through a
//! temp file in the target directory that is renamed into place without
//! clobbering. Entries that cannot be resolved go into a [`DeficiencyRecord`];
//! they never abort the run.

use crate::config::SyncConfig;
use crate::deficiency::DeficiencyRecord;
use crate::fetch::{FetchError, Fetcher};
use crate::filter::PathFilter;
use crate::hash::ObjectHash;
use crate::logical_path::LogicalPath;
use crate::manifest::{Manifest, ObjectRef};
use crate::path_safety::{validate_dest, PathPolicy};
use crate::progress::Progress;
use anyhow::{bail, Context};
use rayon::prelude::*;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Newly written destination files.
    pub placed: u64,
    /// Destination files that already existed and were left alone.
    pub existing: u64,
    /// Objects downloaded into the local store during the run.
    pub fetched: u64,
    /// Entries skipped by the include/exclude filter.
    pub filtered: u64,
    pub bytes_placed: u64,
    pub deficiency: DeficiencyRecord,
    /// Where the deficiency document was written, if it was.
    pub report_path: Option<PathBuf>,
}

impl ReconcileReport {
    pub fn processed(&self) -> u64 {
        self.placed + self.existing + self.filtered + self.deficiency.len() as u64
    }

    pub fn is_complete(&self) -> bool {
        self.deficiency.is_empty()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("destination root {path:?}: {source}")]
    DestRoot { path: PathBuf, source: io::Error },
    #[error("invalid path filter: {0}")]
    Filter(#[from] globset::Error),
    #[error("building worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
    #[error("reconciliation cancelled after {} entries", .0.processed())]
    Cancelled(Box<ReconcileReport>),
    #[error("writing deficiency report: {0}")]
    Report(#[source] io::Error),
}

enum Outcome {
    Placed { bytes: u64, fetched: bool },
    Existing { fetched: bool },
    Filtered,
    Unresolved,
    Cancelled,
}

#[derive(Default)]
struct Tally {
    placed: AtomicU64,
    existing: AtomicU64,
    fetched: AtomicU64,
    filtered: AtomicU64,
    bytes: AtomicU64,
}

pub struct Reconciler {
    fetcher: Fetcher,
    dest_root: PathBuf,
    report_dir: PathBuf,
    filter: PathFilter,
    policy: PathPolicy,
    verify_local: bool,
    jobs: usize,
    progress_interval: std::time::Duration,
}

impl Reconciler {
    pub fn new(cfg: &SyncConfig, fetcher: Fetcher) -> Result<Self, ReconcileError> {
        Ok(Self {
            fetcher,
            dest_root: cfg.dest_root.clone(),
            report_dir: cfg.report_dir.clone(),
            filter: PathFilter::new(&cfg.include, &cfg.exclude)?,
            policy: PathPolicy { follow_symlinks: cfg.follow_symlinks },
            verify_local: cfg.verify_hashes,
            jobs: cfg.jobs.max(1),
            progress_interval: cfg.progress_interval,
        })
    }

    pub fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    /// Reconcile and, if anything stayed unresolved, persist the deficiency document.
    pub fn run(&self, manifest: &Manifest, version: &str) -> Result<ReconcileReport, ReconcileError> {
        let mut report = self.reconcile(manifest, version)?;
        report.report_path = report.deficiency.persist(&self.report_dir).map_err(ReconcileError::Report)?;
        if let Some(p) = &report.report_path {
            warn!(path = %p.display(), unresolved = report.deficiency.len(), "wrote deficiency report");
        }
        Ok(report)
    }

    /// One pass over every manifest entry. Does not write the deficiency document.
    pub fn reconcile(&self, manifest: &Manifest, version: &str) -> Result<ReconcileReport, ReconcileError> {
        let cancel = self.fetcher.cancel_token();
        if cancel.is_cancelled() {
            return Err(ReconcileError::Cancelled(Box::default()));
        }
        std::fs::create_dir_all(&self.dest_root)
            .map_err(|source| ReconcileError::DestRoot { path: self.dest_root.clone(), source })?;

        info!(
            version,
            entries = manifest.len(),
            dest = %self.dest_root.display(),
            "reconciling manifest"
        );
        let pool = self.worker_pool()?;
        let deficiency = Mutex::new(DeficiencyRecord::new(version));
        let tally = Tally::default();
        let progress = Progress::new("reconcile", self.progress_interval);
        progress.set_total(manifest.len() as u64);
        let reporter = progress.start();

        let visit = |(path, oref): (&LogicalPath, &ObjectRef)| {
            if cancel.is_cancelled() {
                return;
            }
            let outcome = self.process_entry(path, oref);
            record(&tally, &deficiency, path, &oref.hash, &outcome);
            progress.inc_entry();
            if let Outcome::Placed { bytes, .. } = outcome {
                progress.add_bytes(bytes);
            }
        };

        match &pool {
            Some(pool) => {
                let entries: Vec<_> = manifest.iter().collect();
                pool.install(|| entries.into_par_iter().for_each(visit));
            }
            None => manifest.iter().for_each(visit),
        }
        drop(reporter);

        let report = ReconcileReport {
            placed: tally.placed.into_inner(),
            existing: tally.existing.into_inner(),
            fetched: tally.fetched.into_inner(),
            filtered: tally.filtered.into_inner(),
            bytes_placed: tally.bytes.into_inner(),
            deficiency: deficiency.into_inner().unwrap_or_else(|e| e.into_inner()),
            report_path: None,
        };
        if cancel.is_cancelled() {
            warn!(processed = report.processed(), "reconciliation cancelled");
            return Err(ReconcileError::Cancelled(Box::new(report)));
        }
        info!(
            placed = report.placed,
            existing = report.existing,
            fetched = report.fetched,
            filtered = report.filtered,
            unresolved = report.deficiency.len(),
            "reconciliation finished"
        );
        Ok(report)
    }

    /// `None` when `jobs == 1`: entries are then processed on the calling thread.
    fn worker_pool(&self) -> Result<Option<rayon::ThreadPool>, ReconcileError> {
        if self.jobs <= 1 {
            return Ok(None);
        }
        Ok(Some(rayon::ThreadPoolBuilder::new().num_threads(self.jobs).build()?))
    }

    fn process_entry(&self, path: &LogicalPath, oref: &ObjectRef) -> Outcome {
        if !self.filter.allows(path) {
            return Outcome::Filtered;
        }
        let dest = match validate_dest(&self.dest_root, path, self.policy) {
            Ok(d) => d,
            Err(e) => {
                warn!(%path, error = %format!("{e:#}"), "refusing destination");
                return Outcome::Unresolved;
            }
        };
        let (src, fetched) = match self.ensure_local(&oref.hash) {
            Ok(found) => found,
            Err(FetchError::Cancelled { .. }) => return Outcome::Cancelled,
            Err(e) => {
                warn!(%path, error = %e, "object unavailable");
                return Outcome::Unresolved;
            }
        };
        // an existing target is never rewritten, whatever its content
        if std::fs::symlink_metadata(&dest).is_ok() {
            debug!(%path, "already present");
            return Outcome::Existing { fetched };
        }

        match place(&src, &path.fs_parent(&self.dest_root), &dest) {
            Ok(Some(bytes)) => {
                debug!(%path, hash = %oref.hash, bytes, "placed");
                Outcome::Placed { bytes, fetched }
            }
            Ok(None) => Outcome::Existing { fetched },
            Err(e) => {
                warn!(%path, error = %format!("{e:#}"), "placing asset failed");
                Outcome::Unresolved
            }
        }
    }

    /// Local path of `hash`, fetching it first if missing (or corrupt when verifying).
    fn ensure_local(&self, hash: &ObjectHash) -> Result<(PathBuf, bool), FetchError> {
        let store = self.fetcher.store();
        let local = store.locate(hash);
        if local.is_file() {
            if !self.verify_local {
                return Ok((local, false));
            }
            match store.verify(hash) {
                Ok(true) => return Ok((local, false)),
                Ok(false) => warn!(%hash, "cached object is corrupt, fetching again"),
                Err(e) => warn!(%hash, error = %e, "cannot read cached object, fetching again"),
            }
        }
        Ok((self.fetcher.fetch(hash)?, true))
    }
}

fn record(
    tally: &Tally,
    deficiency: &Mutex<DeficiencyRecord>,
    path: &LogicalPath,
    hash: &ObjectHash,
    outcome: &Outcome,
) {
    let fetched = match outcome {
        Outcome::Placed { bytes, fetched } => {
            tally.placed.fetch_add(1, Ordering::Relaxed);
            tally.bytes.fetch_add(*bytes, Ordering::Relaxed);
            *fetched
        }
        Outcome::Existing { fetched } => {
            tally.existing.fetch_add(1, Ordering::Relaxed);
            *fetched
        }
        Outcome::Filtered => {
            tally.filtered.fetch_add(1, Ordering::Relaxed);
            false
        }
        Outcome::Unresolved => {
            let mut rec = deficiency.lock().unwrap_or_else(|e| e.into_inner());
            rec.insert(path, hash);
            false
        }
        Outcome::Cancelled => false,
    };
    if fetched {
        tally.fetched.fetch_add(1, Ordering::Relaxed);
    }
}

/// Copy `src` into `dir` under a temp name and rename it to `dest` without
/// clobbering. `Ok(None)` if `dest` appeared in the meantime.
fn place(src: &Path, dir: &Path, dest: &Path) -> anyhow::Result<Option<u64>> {
    std::fs::create_dir_all(dir).with_context(|| format!("create {:?}", dir))?;
    let mut input = File::open(src).with_context(|| format!("open {:?}", src))?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir).with_context(|| format!("temp file in {:?}", dir))?;
    let bytes = io::copy(&mut input, &mut tmp).with_context(|| format!("copy {:?}", src))?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;
    match tmp.persist_noclobber(dest) {
        Ok(_) => Ok(Some(bytes)),
        Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => Ok(None),
        Err(e) => bail!("rename into {:?}: {}", dest, e.error),
    }
}
