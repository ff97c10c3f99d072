#![allow(dead_code)]

use assetsync_core::config::SyncConfig;
use assetsync_core::fetch::{Fetcher, SharedTransport};
use assetsync_core::hash::ObjectHash;
use assetsync_core::manifest::Manifest;
use assetsync_core::remote::{Transport, TransportError};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

pub const REMOTE: &str = "http://objects.test";

/// In-memory transport: serves registered bodies, 503s everything else.
#[derive(Default)]
pub struct FakeTransport {
    bodies: Mutex<HashMap<String, Vec<u8>>>,
    /// Remaining forced failures per URL before the body is served.
    flaky: Mutex<HashMap<String, u32>>,
    calls: Mutex<HashMap<String, u32>>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn serve(&self, url: &str, body: &[u8]) {
        self.bodies.lock().unwrap().insert(url.to_string(), body.to_vec());
    }

    /// Serve `body` as remote object `hash` (body need not match the hash).
    pub fn serve_object(&self, hash: &ObjectHash, body: &[u8]) {
        self.serve(&object_url(hash), body);
    }

    pub fn fail_first(&self, hash: &ObjectHash, n: u32) {
        self.flaky.lock().unwrap().insert(object_url(hash), n);
    }

    pub fn calls(&self, url: &str) -> u32 {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    pub fn object_calls(&self, hash: &ObjectHash) -> u32 {
        self.calls(&object_url(hash))
    }

    pub fn total_calls(&self) -> u32 {
        self.calls.lock().unwrap().values().sum()
    }
}

impl Transport for FakeTransport {
    fn get(&self, url: &Url) -> Result<Vec<u8>, TransportError> {
        let key = url.to_string();
        *self.calls.lock().unwrap().entry(key.clone()).or_default() += 1;
        if let Some(left) = self.flaky.lock().unwrap().get_mut(&key) {
            if *left > 0 {
                *left -= 1;
                return Err(TransportError::Connect { url: key, reason: "flaky".into() });
            }
        }
        match self.bodies.lock().unwrap().get(&key) {
            Some(b) => Ok(b.clone()),
            None => Err(TransportError::Status { url: key, status: 503 }),
        }
    }
}

pub fn object_url(hash: &ObjectHash) -> String {
    format!("{REMOTE}/{}/{}", hash.shard(), hash)
}

pub fn config(root: &Path) -> SyncConfig {
    SyncConfig {
        local_root: root.join("assets"),
        dest_root: root.join("out"),
        report_dir: root.to_path_buf(),
        remote_base: Url::parse(REMOTE).unwrap(),
        catalog_url: Url::parse("http://catalog.test/versions.json").unwrap(),
        max_retries: 2,
        retry_cooldown: Duration::from_millis(1),
        max_backoff: Duration::from_millis(5),
        ..SyncConfig::default()
    }
}

pub fn fetcher(cfg: &SyncConfig, transport: &Arc<FakeTransport>) -> Fetcher {
    let shared: SharedTransport = transport.clone();
    Fetcher::from_config(cfg, shared)
}

/// Put `body` into the local store of `cfg` and return its hash.
pub fn seed_local(cfg: &SyncConfig, body: &[u8]) -> ObjectHash {
    let h = ObjectHash::of_bytes(body);
    let p = cfg.local_root.join("objects").join(h.shard()).join(h.as_str());
    std::fs::create_dir_all(p.parent().unwrap()).unwrap();
    std::fs::write(p, body).unwrap();
    h
}

pub fn manifest(entries: &[(&str, &ObjectHash)]) -> Manifest {
    let objects: serde_json::Map<String, serde_json::Value> = entries
        .iter()
        .map(|(p, h)| (p.to_string(), serde_json::json!({ "hash": h.as_str() })))
        .collect();
    let doc = serde_json::json!({ "objects": objects });
    Manifest::from_slice(&serde_json::to_vec(&doc).unwrap()).unwrap()
}

/// Every file under `dir`, relative, '/'-joined, sorted.
pub fn tree(dir: &Path) -> Vec<String> {
    let mut out: Vec<String> = walkdir::WalkDir::new(dir)
        .min_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            e.path()
                .strip_prefix(dir)
                .unwrap()
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/")
        })
        .collect();
    out.sort();
    out
}
