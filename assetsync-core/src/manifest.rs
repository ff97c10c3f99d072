use crate::hash::ObjectHash;
use crate::logical_path::LogicalPath;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ObjectRef {
    pub hash: ObjectHash,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// Asset index for one version: logical path -> object.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Manifest {
    pub objects: BTreeMap<LogicalPath, ObjectRef>,
    #[serde(default, rename = "virtual", skip_serializing_if = "Option::is_none")]
    pub is_virtual: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map_to_resources: Option<bool>,
}

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("read manifest {path:?}: {source}")]
    Io { path: String, source: std::io::Error },
    #[error("parse manifest: {0}")]
    Parse(#[from] serde_json::Error),
}

impl Manifest {
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ManifestError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let f = File::open(path)
            .map_err(|source| ManifestError::Io { path: path.display().to_string(), source })?;
        Ok(serde_json::from_reader(BufReader::new(f))?)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&LogicalPath, &ObjectRef)> {
        self.objects.iter()
    }

    /// Sum of declared sizes; entries without a size count as zero.
    pub fn total_size(&self) -> u64 {
        self.objects.values().filter_map(|r| r.size).sum()
    }
}
