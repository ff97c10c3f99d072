//! HttpTransport against a wiremock server.
//!
//! The transport is blocking, so every call runs on `spawn_blocking` to stay
//! off the runtime threads.

use assetsync_core::fetch::{Fetcher, SharedTransport};
use assetsync_core::hash::ObjectHash;
use assetsync_core::remote::{HttpTransport, RemoteStore, Transport, TransportError};
use assetsync_core::retry::RetryPolicy;
use assetsync_core::store::LocalStore;
use std::sync::Arc;
use std::time::Duration;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn transport(timeout: Duration) -> SharedTransport {
    Arc::new(HttpTransport::new(timeout).expect("client build"))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn object_bytes_are_returned_verbatim() {
    let server = MockServer::start().await;
    let body = b"\x89PNG\r\n\x1a\n not really".to_vec();
    let h = ObjectHash::of_bytes(&body);
    Mock::given(method("GET"))
        .and(path(format!("/{}/{}", h.shard(), h)))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
        .expect(1)
        .mount(&server)
        .await;

    let base = Url::parse(&server.uri()).unwrap();
    let got = tokio::task::spawn_blocking(move || {
        RemoteStore::new(base, transport(Duration::from_secs(5))).get_object(&h)
    })
    .await
    .unwrap()
    .unwrap();
    assert_eq!(got, body);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn non_success_status_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let url = Url::parse(&format!("{}/ab/missing", server.uri())).unwrap();
    let res = tokio::task::spawn_blocking(move || transport(Duration::from_secs(5)).get(&url))
        .await
        .unwrap();
    assert!(matches!(res, Err(TransportError::Status { status: 404, .. })));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn slow_response_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let url = Url::parse(&format!("{}/ab/slow", server.uri())).unwrap();
    let res = tokio::task::spawn_blocking(move || transport(Duration::from_millis(200)).get(&url))
        .await
        .unwrap();
    assert!(matches!(res, Err(TransportError::Timeout { .. })));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fetcher_recovers_from_server_errors() {
    let server = MockServer::start().await;
    let body = b"ogg".to_vec();
    let h = ObjectHash::of_bytes(&body);
    let object_path = format!("/{}/{}", h.shard(), h);
    // two failures first, then the real object
    Mock::given(method("GET"))
        .and(path(object_path.clone()))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(object_path))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
        .mount(&server)
        .await;

    let td = tempfile::tempdir().unwrap();
    let root = td.path().to_path_buf();
    let base = Url::parse(&server.uri()).unwrap();
    let policy = RetryPolicy {
        max_retries: 3,
        cooldown: Duration::from_millis(10),
        max_backoff: Duration::from_millis(50),
    };
    let stored = tokio::task::spawn_blocking(move || {
        let remote = RemoteStore::new(base, transport(Duration::from_secs(5)));
        Fetcher::new(LocalStore::new(root), remote, policy).fetch(&h)
    })
    .await
    .unwrap()
    .unwrap();
    assert_eq!(std::fs::read(stored).unwrap(), body);
}
