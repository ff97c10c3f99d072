//! Remote version catalog: version id -> asset index -> manifest.

use crate::fetch::SharedTransport;
use crate::hash::ObjectHash;
use crate::manifest::{Manifest, ManifestError};
use crate::remote::TransportError;
use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("parse {what}: {source}")]
    Parse { what: &'static str, source: serde_json::Error },
    #[error("no version in the catalog matches {0:?}")]
    NoMatch(String),
    #[error("asset index {id} hashes to {actual}, catalog says {expected}")]
    IndexDigest { id: String, expected: ObjectHash, actual: ObjectHash },
    #[error(transparent)]
    Manifest(#[from] ManifestError),
}

#[derive(Deserialize, Clone, Debug)]
pub struct VersionList {
    pub versions: Vec<VersionEntry>,
}

#[derive(Deserialize, Clone, Debug)]
pub struct VersionEntry {
    pub id: String,
    pub url: Url,
}

#[derive(Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
struct VersionDoc {
    asset_index: AssetIndexRef,
}

/// Pointer to a version's asset index, as published in its version document.
#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct AssetIndexRef {
    pub id: String,
    pub url: Url,
    #[serde(default)]
    pub sha1: Option<ObjectHash>,
}

impl VersionList {
    /// Exact id match first, then the first id containing `query`.
    pub fn find(&self, query: &str) -> Option<&VersionEntry> {
        self.versions
            .iter()
            .find(|v| v.id == query)
            .or_else(|| self.versions.iter().find(|v| v.id.contains(query)))
    }
}

pub struct Catalog {
    url: Url,
    transport: SharedTransport,
}

impl Catalog {
    pub fn new(url: Url, transport: SharedTransport) -> Self {
        Self { url, transport }
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, url: &Url, what: &'static str) -> Result<T, CatalogError> {
        let body = self.transport.get(url)?;
        serde_json::from_slice(&body).map_err(|source| CatalogError::Parse { what, source })
    }

    pub fn versions(&self) -> Result<VersionList, CatalogError> {
        self.get_json(&self.url, "version list")
    }

    /// Resolve `query` to the asset index of the matching version.
    pub fn resolve(&self, query: &str) -> Result<AssetIndexRef, CatalogError> {
        let list = self.versions()?;
        let entry = list.find(query).ok_or_else(|| CatalogError::NoMatch(query.to_owned()))?;
        debug!(query, version = %entry.id, "catalog match");
        let doc: VersionDoc = self.get_json(&entry.url, "version document")?;
        info!(version = %entry.id, index = %doc.asset_index.id, "resolved asset index");
        Ok(doc.asset_index)
    }

    /// Download and parse an asset index; returns raw bytes too so callers can cache them.
    pub fn fetch_manifest(&self, index: &AssetIndexRef) -> Result<(Manifest, Vec<u8>), CatalogError> {
        let body = self.transport.get(&index.url)?;
        if let Some(expected) = &index.sha1 {
            let actual = ObjectHash::of_bytes(&body);
            if actual != *expected {
                return Err(CatalogError::IndexDigest {
                    id: index.id.clone(),
                    expected: expected.clone(),
                    actual,
                });
            }
        }
        let manifest = Manifest::from_slice(&body)?;
        Ok((manifest, body))
    }
}
