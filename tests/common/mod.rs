//! Shared utilities for integration tests.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use edge_gatekeeper::config::GatekeeperConfig;
use edge_gatekeeper::lifecycle::startup;
use edge_gatekeeper::{Gatekeeper, HttpServer, Shutdown};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

pub const SECRET: &str = "integration-secret";

/// Config pointing at `upstream`, with the test secret.
pub fn config(upstream: SocketAddr) -> GatekeeperConfig {
    let mut config = GatekeeperConfig::default();
    config.upstream.address = upstream.to_string();
    config.upstream.request_timeout_secs = 2;
    config.auth.secret = Some(SECRET.to_string());
    config
}

/// Signed session token for `role`.
pub fn token(role: &str) -> String {
    let exp = chrono::Utc::now().timestamp() + 3600;
    encode(
        &Header::default(),
        &json!({ "sub": format!("user-{role}"), "role": role, "exp": exp }),
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

pub fn session_cookie(role: &str) -> String {
    format!("session-token={}", token(role))
}

/// Client that reports redirects instead of following them.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}

/// Start an upstream that answers 200 with the request path as body.
pub async fn start_mock_upstream() -> SocketAddr {
    start_programmable_upstream(|path| async move { (200, path) }).await
}

/// Start an upstream whose status and body are computed per request path.
#[allow(dead_code)]
pub async fn start_programmable_upstream<F, Fut>(f: F) -> SocketAddr
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let f = f.clone();
            tokio::spawn(async move {
                let mut buf = vec![0u8; 8192];
                let n = socket.read(&mut buf).await.unwrap_or(0);
                let head = String::from_utf8_lossy(&buf[..n]);
                let path = head
                    .lines()
                    .next()
                    .and_then(|line| line.split_whitespace().nth(1))
                    .unwrap_or("/")
                    .to_string();

                let (status, body) = f(path).await;
                let status_text = match status {
                    200 => "200 OK",
                    404 => "404 Not Found",
                    500 => "500 Internal Server Error",
                    _ => "200 OK",
                };
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Length: {}\r\nX-Frame-Options: SAMEORIGIN\r\nX-Upstream: mock\r\nConnection: close\r\n\r\n{}",
                    status_text,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
                tokio::time::sleep(Duration::from_millis(10)).await;
            });
        }
    });

    addr
}

/// An address nothing listens on.
#[allow(dead_code)]
pub async fn dead_address() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Start the gatekeeper the way the binary does. Keep the returned
/// `Shutdown` alive for as long as the server should run.
#[allow(dead_code)]
pub async fn start_gatekeeper(config: GatekeeperConfig) -> (SocketAddr, Shutdown) {
    let server = startup::build_server(config).await;
    serve(server).await
}

/// Start the gatekeeper around a prepared gate.
#[allow(dead_code)]
pub async fn start_gatekeeper_with(
    config: GatekeeperConfig,
    gate: Gatekeeper,
) -> (SocketAddr, Shutdown) {
    serve(HttpServer::new(config, Arc::new(gate))).await
}

async fn serve(server: HttpServer) -> (SocketAddr, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let receiver = shutdown.subscribe();

    tokio::spawn(async move {
        server.run(listener, receiver).await.unwrap();
    });

    (addr, shutdown)
}
