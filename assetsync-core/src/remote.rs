//! Remote object store over HTTP.
//!
//! The [`Transport`] trait is the only network seam: the fetcher and the
//! catalog both go through it, so tests swap in an in-memory transport.

use crate::hash::ObjectHash;
use std::time::Duration;
use url::Url;

pub const DEFAULT_REMOTE_BASE: &str = "https://resources.download.minecraft.net";

const USER_AGENT: &str = concat!("assetsync/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("connection to {url} failed: {reason}")]
    Connect { url: String, reason: String },
    #[error("request to {url} timed out")]
    Timeout { url: String },
    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },
    #[error("reading body from {url} failed: {reason}")]
    Body { url: String, reason: String },
}

pub trait Transport: Send + Sync {
    /// GET `url` and return the full body. Non-2xx is an error.
    fn get(&self, url: &Url) -> Result<Vec<u8>, TransportError>;
}

impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    fn get(&self, url: &Url) -> Result<Vec<u8>, TransportError> {
        (**self).get(url)
    }
}

impl<T: Transport + ?Sized> Transport for &T {
    fn get(&self, url: &Url) -> Result<Vec<u8>, TransportError> {
        (**self).get(url)
    }
}

/// Blocking reqwest client with a per-request timeout.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> reqwest::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client })
    }
}

fn classify(url: &Url, e: reqwest::Error) -> TransportError {
    let url = url.to_string();
    if e.is_timeout() {
        TransportError::Timeout { url }
    } else if let Some(status) = e.status() {
        TransportError::Status { url, status: status.as_u16() }
    } else if e.is_body() || e.is_decode() {
        TransportError::Body { url, reason: e.to_string() }
    } else {
        TransportError::Connect { url, reason: e.to_string() }
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &Url) -> Result<Vec<u8>, TransportError> {
        let resp = self.client.get(url.clone()).send().map_err(|e| classify(url, e))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(TransportError::Status { url: url.to_string(), status: status.as_u16() });
        }
        let body = resp.bytes().map_err(|e| classify(url, e))?;
        Ok(body.to_vec())
    }
}

/// Remote content-addressed store: `<base>/<shard>/<hash>`.
#[derive(Clone)]
pub struct RemoteStore<T> {
    base: Url,
    transport: T,
}

impl<T: Transport> RemoteStore<T> {
    pub fn new(base: Url, transport: T) -> Self {
        Self { base, transport }
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    pub fn object_url(&self, hash: &ObjectHash) -> Url {
        object_url(&self.base, hash)
    }

    pub fn get_object(&self, hash: &ObjectHash) -> Result<Vec<u8>, TransportError> {
        self.transport.get(&self.object_url(hash))
    }
}

pub fn object_url(base: &Url, hash: &ObjectHash) -> Url {
    let mut url = base.clone();
    // path_segments_mut only fails for cannot-be-a-base URLs (mailto: etc)
    if let Ok(mut segs) = url.path_segments_mut() {
        segs.pop_if_empty().push(hash.shard()).push(hash.as_str());
    }
    url
}

pub fn default_remote_base() -> Url {
    Url::parse(DEFAULT_REMOTE_BASE).expect("default remote base is a valid URL")
}
