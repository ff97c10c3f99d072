use crate::remote::default_remote_base;
use crate::retry::RetryPolicy;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

pub const DEFAULT_CATALOG_URL: &str =
    "https://piston-meta.mojang.com/mc/game/version_manifest_v2.json";

/// Everything the reconciler and populator need, passed in at construction.
///
/// Loadable from a JSON file; every field is optional there and falls back to
/// the defaults below. Durations are given in milliseconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    /// Root of the local object store (`<local_root>/objects`, `<local_root>/indexes`).
    pub local_root: PathBuf,
    /// Where logical paths are materialised.
    pub dest_root: PathBuf,
    #[serde(rename = "network_timeout_ms", with = "millis")]
    pub network_timeout: Duration,
    pub max_retries: u32,
    #[serde(rename = "retry_cooldown_ms", with = "millis")]
    pub retry_cooldown: Duration,
    #[serde(rename = "max_backoff_ms", with = "millis")]
    pub max_backoff: Duration,
    pub remote_base: Url,
    pub catalog_url: Url,
    /// Recompute SHA-1 of cached and downloaded objects.
    pub verify_hashes: bool,
    /// Worker threads; `1` keeps processing strictly sequential.
    pub jobs: usize,
    /// Directory receiving the deficiency document.
    pub report_dir: PathBuf,
    /// Globs over logical paths; empty include means everything.
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub follow_symlinks: bool,
    /// Log progress every this many milliseconds; `0` disables.
    #[serde(rename = "progress_interval_ms", with = "millis")]
    pub progress_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            local_root: PathBuf::from("assets"),
            dest_root: PathBuf::from("assets-out"),
            network_timeout: Duration::from_secs(10),
            max_retries: retry.max_retries,
            retry_cooldown: retry.cooldown,
            max_backoff: retry.max_backoff,
            remote_base: default_remote_base(),
            catalog_url: Url::parse(DEFAULT_CATALOG_URL).expect("default catalog URL is valid"),
            verify_hashes: true,
            jobs: 1,
            report_dir: PathBuf::from("."),
            include: Vec::new(),
            exclude: Vec::new(),
            follow_symlinks: false,
            progress_interval: Duration::ZERO,
        }
    }
}

impl SyncConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let f = File::open(path).with_context(|| format!("open config {:?}", path))?;
        serde_json::from_reader(f).with_context(|| format!("parse config {:?}", path))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            cooldown: self.retry_cooldown,
            max_backoff: self.max_backoff,
        }
    }
}

mod millis {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
