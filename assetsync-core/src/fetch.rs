use crate::config::SyncConfig;
use crate::hash::ObjectHash;
use crate::remote::{RemoteStore, Transport, TransportError};
use crate::retry::{CancelToken, RetryPolicy};
use crate::store::LocalStore;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub type SharedTransport = Arc<dyn Transport>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AttemptError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("downloaded bytes hash to {actual}")]
    DigestMismatch { actual: ObjectHash },
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("fetching {hash} failed after {attempts} attempt(s): {last}")]
    Exhausted { hash: ObjectHash, attempts: u32, last: AttemptError },
    #[error("fetching {hash} cancelled")]
    Cancelled { hash: ObjectHash },
    #[error("storing {hash} locally: {source}")]
    Store { hash: ObjectHash, source: std::io::Error },
}

/// Pulls single objects from the remote store into the local one.
#[derive(Clone)]
pub struct Fetcher {
    store: LocalStore,
    remote: RemoteStore<SharedTransport>,
    policy: RetryPolicy,
    verify: bool,
    cancel: CancelToken,
}

impl Fetcher {
    pub fn new(store: LocalStore, remote: RemoteStore<SharedTransport>, policy: RetryPolicy) -> Self {
        Self { store, remote, policy, verify: true, cancel: CancelToken::new() }
    }

    /// Local store, remote base, retry bound and verification from `cfg`.
    pub fn from_config(cfg: &SyncConfig, transport: SharedTransport) -> Self {
        let remote = RemoteStore::new(cfg.remote_base.clone(), transport);
        Self::new(LocalStore::new(&cfg.local_root), remote, cfg.retry_policy())
            .verify_downloads(cfg.verify_hashes)
    }

    /// Check downloaded bytes against the requested hash (default on).
    pub fn verify_downloads(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    pub fn remote(&self) -> &RemoteStore<SharedTransport> {
        &self.remote
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Download `hash` into the local store, retrying transient failures up to
    /// the policy bound. Returns the local path on success.
    pub fn fetch(&self, hash: &ObjectHash) -> Result<PathBuf, FetchError> {
        let attempts = self.policy.attempts();
        let mut attempt = 0u32;
        loop {
            if self.cancel.is_cancelled() {
                return Err(FetchError::Cancelled { hash: hash.clone() });
            }
            attempt += 1;
            debug!(%hash, attempt, "fetching object");
            let err = match self.attempt(hash) {
                Ok(bytes) => {
                    let path = self
                        .store
                        .write_object(hash, &bytes)
                        .map_err(|source| FetchError::Store { hash: hash.clone(), source })?;
                    info!(%hash, bytes = bytes.len(), attempt, "fetched object");
                    return Ok(path);
                }
                Err(e) => e,
            };
            if attempt >= attempts {
                warn!(%hash, attempts, error = %err, "giving up on object");
                return Err(FetchError::Exhausted { hash: hash.clone(), attempts, last: err });
            }
            let delay = self.policy.delay_for(attempt - 1);
            warn!(%hash, attempt, max_attempts = attempts, error = %err, "fetch failed, retrying in {delay:?}");
            if !self.cancel.sleep(delay) {
                return Err(FetchError::Cancelled { hash: hash.clone() });
            }
        }
    }

    fn attempt(&self, hash: &ObjectHash) -> Result<Vec<u8>, AttemptError> {
        let bytes = self.remote.get_object(hash)?;
        if self.verify {
            let actual = ObjectHash::of_bytes(&bytes);
            if actual != *hash {
                return Err(AttemptError::DigestMismatch { actual });
            }
        }
        Ok(bytes)
    }
}
