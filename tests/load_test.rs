//! Concurrent load against a single rate limit key.

use std::sync::Arc;

use axum::http::StatusCode;
use futures_util::future::join_all;

mod common;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_burst_never_exceeds_limit() {
    let upstream = common::start_mock_upstream().await;
    let mut config = common::config(upstream);
    config.rate_limit.tiers.get_mut("terminal").unwrap().max_requests = 6;
    let (addr, _shutdown) = common::start_gatekeeper(config).await;

    let client = Arc::new(common::client());
    // MANAGER = 3 → floor(6 × 3) successes in the window.
    let cookie = Arc::new(common::session_cookie("MANAGER"));

    let requests = (0..100).map(|_| {
        let client = client.clone();
        let cookie = cookie.clone();
        tokio::spawn(async move {
            client
                .post(format!("http://{addr}/api/terminal/exec"))
                .header("cookie", cookie.as_str())
                .send()
                .await
                .map(|res| res.status())
        })
    });

    let statuses: Vec<StatusCode> = join_all(requests)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    let ok = statuses.iter().filter(|s| **s == StatusCode::OK).count();
    let limited = statuses
        .iter()
        .filter(|s| **s == StatusCode::TOO_MANY_REQUESTS)
        .count();

    assert_eq!(ok + limited, 100);
    assert!(ok <= 18, "{ok} requests passed a limit of 18");
    assert!(ok >= 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_distinct_callers_have_separate_buckets() {
    let upstream = common::start_mock_upstream().await;
    let mut config = common::config(upstream);
    config.rate_limit.tiers.get_mut("auth").unwrap().max_requests = 4;
    let (addr, _shutdown) = common::start_gatekeeper(config).await;

    let client = common::client();
    // Anonymous callers on the auth tier: floor(4 × 0.25) = 1 request per address.
    for ip in ["198.51.100.1", "198.51.100.2", "2001:db8::7"] {
        let first = client
            .post(format!("http://{addr}/api/auth/callback"))
            .header("x-forwarded-for", format!("{ip}, 10.0.0.1"))
            .send()
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK, "{ip}");

        let second = client
            .post(format!("http://{addr}/api/auth/callback"))
            .header("x-forwarded-for", ip)
            .send()
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS, "{ip}");
    }
}
