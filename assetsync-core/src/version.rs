//! Version-level entry points: pick the manifest for a version and drive the
//! reconciler, falling back to the catalog plus a bulk populate when the
//! version has never been installed locally.

use crate::catalog::{Catalog, CatalogError};
use crate::config::SyncConfig;
use crate::fetch::{Fetcher, SharedTransport};
use crate::manifest::{Manifest, ManifestError};
use crate::populate::{PopulateError, PopulateReport, Populator};
use crate::reconcile::{ReconcileError, ReconcileReport, Reconciler};
use crate::retry::CancelToken;
use crate::store::{write_atomic, IndexIdError, LocalStore};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error(transparent)]
    IndexId(#[from] IndexIdError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Populate(#[from] PopulateError),
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
    #[error("caching asset index {path:?}: {source}")]
    CacheIndex { path: String, source: std::io::Error },
}

/// Version -> index id table. Unreadable tables are treated as empty: it is
/// only a cache of catalog answers.
fn read_aliases(store: &LocalStore) -> BTreeMap<String, String> {
    let path = store.aliases_path();
    let Ok(bytes) = std::fs::read(&path) else {
        return BTreeMap::new();
    };
    serde_json::from_slice(&bytes).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "ignoring unreadable version aliases");
        BTreeMap::new()
    })
}

fn remember_alias(store: &LocalStore, version: &str, index_id: &str) -> std::io::Result<()> {
    let mut aliases = read_aliases(store);
    if aliases.get(version).map(String::as_str) == Some(index_id) {
        return Ok(());
    }
    aliases.insert(version.to_owned(), index_id.to_owned());
    let path = store.aliases_path();
    let dir = path.parent().unwrap_or(store.root());
    write_atomic(dir, &path, &serde_json::to_vec_pretty(&aliases)?)
}

/// Installed asset index for `version`, with the index id it was stored under.
///
/// `<local_root>/indexes/<version>.json` wins; otherwise a version previously
/// resolved through the catalog finds its shared index via the alias table.
pub fn load_local(store: &LocalStore, version: &str) -> Result<Option<(String, Manifest)>, SyncError> {
    let direct = store.index_path(version)?;
    if direct.is_file() {
        return Ok(Some((version.to_owned(), Manifest::load(&direct)?)));
    }
    let Some(id) = read_aliases(store).remove(version) else {
        return Ok(None);
    };
    let path = store.index_path(&id)?;
    if !path.is_file() {
        debug!(version, index = %id, "aliased index is gone");
        return Ok(None);
    }
    Ok(Some((id, Manifest::load(&path)?)))
}

fn cache_error(path: &Path) -> impl FnOnce(std::io::Error) -> SyncError + '_ {
    move |source| SyncError::CacheIndex { path: path.display().to_string(), source }
}

#[derive(Debug, Clone)]
pub struct SyncOutcome {
    /// Index id the tree was built from (the catalog may map a version to a shared index).
    pub index_id: String,
    /// Present when the local store had to be seeded from the catalog.
    pub populated: Option<PopulateReport>,
    pub report: ReconcileReport,
}

/// "Get me the asset tree for `version`".
pub fn sync_version(
    cfg: &SyncConfig,
    transport: SharedTransport,
    cancel: CancelToken,
    version: &str,
) -> Result<SyncOutcome, SyncError> {
    let fetcher = Fetcher::from_config(cfg, transport.clone()).with_cancel(cancel);
    let store = fetcher.store().clone();

    let (index_id, manifest, populated) = match load_local(&store, version)? {
        Some((id, m)) => {
            info!(version, index = %id, "using local asset index");
            (id, m, None)
        }
        None => {
            info!(version, "no local asset index, asking the catalog");
            let catalog = Catalog::new(cfg.catalog_url.clone(), transport);
            let index = catalog.resolve(version)?;
            let (manifest, raw) = catalog.fetch_manifest(&index)?;
            let path = store.index_path(&index.id)?;
            let dir = path.parent().unwrap_or(store.root());
            write_atomic(dir, &path, &raw).map_err(cache_error(&path))?;
            if index.id != version {
                remember_alias(&store, version, &index.id).map_err(cache_error(&store.aliases_path()))?;
            }
            let populated = Populator::new(fetcher.clone(), cfg.jobs)
                .with_progress(cfg.progress_interval)
                .populate(&manifest)?;
            (index.id, manifest, Some(populated))
        }
    };

    let report = Reconciler::new(cfg, fetcher)?.run(&manifest, &index_id)?;
    Ok(SyncOutcome { index_id, populated, report })
}
