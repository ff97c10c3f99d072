use crate::hash::ObjectHash;
use crate::logical_path::LogicalPath;
use crate::store::write_atomic;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

/// File name of the persisted deficiency document.
pub const DEFICIENCY_FILE: &str = "missing_assets.json";

/// Entries of one reconciliation run that could not be resolved.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct DeficiencyRecord {
    pub version: String,
    pub files: BTreeMap<String, String>,
}

impl DeficiencyRecord {
    pub fn new(version: impl Into<String>) -> Self {
        Self { version: version.into(), files: BTreeMap::new() }
    }

    pub fn insert(&mut self, path: &LogicalPath, hash: &ObjectHash) {
        self.files.insert(path.to_string(), hash.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn path_in(dir: &Path) -> PathBuf {
        dir.join(DEFICIENCY_FILE)
    }

    /// Write the record to `dir/missing_assets.json`, replacing any earlier one.
    /// An empty record writes nothing and returns `None`.
    pub fn persist(&self, dir: &Path) -> io::Result<Option<PathBuf>> {
        if self.is_empty() {
            return Ok(None);
        }
        let path = Self::path_in(dir);
        let json = serde_json::to_vec_pretty(self)?;
        write_atomic(dir, &path, &json)?;
        Ok(Some(path))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let f = File::open(path).with_context(|| format!("open {:?}", path))?;
        serde_json::from_reader(f).context("read deficiency record")
    }
}
