//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router with the gate middleware and forwarding fallback
//! - Wire up middleware (tracing, request ID)
//! - Forward passed requests to the upstream application
//! - Sweep the in-process counter store until shutdown

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{uri::PathAndQuery, StatusCode, Uri, Version},
    middleware::{self, Next},
    response::Response,
    Router,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::config::GatekeeperConfig;
use crate::http::request::{propagate_request_id_layer, request_id, set_request_id_layer};
use crate::http::response;
use crate::observability::tracing::RequestSpan;
use crate::security::gate::{GateDecision, Gatekeeper};
use crate::security::rate_limit::{Clock, InMemoryStore, SystemClock};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub gate: Arc<Gatekeeper>,
    pub client: Client<HttpConnector, Body>,
    pub upstream: String,
    pub upstream_timeout: Duration,
}

/// HTTP server for the gatekeeper.
pub struct HttpServer {
    router: Router,
    config: GatekeeperConfig,
    sweep_store: Option<Arc<InMemoryStore>>,
}

impl HttpServer {
    /// Create a new HTTP server around a ready gate.
    pub fn new(config: GatekeeperConfig, gate: Arc<Gatekeeper>) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());

        let state = AppState {
            gate,
            client,
            upstream: config.upstream.address.clone(),
            upstream_timeout: Duration::from_secs(config.upstream.request_timeout_secs),
        };

        Self {
            router: Self::build_router(state),
            config,
            sweep_store: None,
        }
    }

    /// Periodically purge stale windows from this store while running.
    pub fn with_sweeper(mut self, store: Arc<InMemoryStore>) -> Self {
        self.sweep_store = Some(store);
        self
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        Router::new()
            .fallback(forward_handler)
            .layer(middleware::from_fn_with_state(state.clone(), gate_middleware))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(set_request_id_layer())
                    .layer(TraceLayer::new_for_http().make_span_with(RequestSpan))
                    .layer(propagate_request_id_layer()),
            )
    }

    /// Run the server until the shutdown signal fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            upstream = %self.config.upstream.address,
            environment = ?self.config.environment,
            "HTTP server starting"
        );

        if let Some(store) = self.sweep_store.clone() {
            let interval = Duration::from_secs(self.config.rate_limit.sweep_interval_secs.max(1));
            tokio::spawn(sweep(store, interval, shutdown.resubscribe()));
        }

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Run the gate in front of everything else.
async fn gate_middleware(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let (parts, body) = request.into_parts();

    match state.gate.decide(&parts).await {
        GateDecision::PassThrough { headers } => {
            let mut response = next.run(Request::from_parts(parts, body)).await;
            response::apply_headers(&mut response, &headers);
            response
        }
        decision => response::decision_response(decision),
    }
}

/// Relay a passed request to the upstream application.
async fn forward_handler(State(state): State<AppState>, request: Request) -> Response {
    let (mut parts, body) = request.into_parts();
    let request_id = request_id(&parts.headers).to_string();

    let path_and_query = parts
        .uri
        .path_and_query()
        .cloned()
        .unwrap_or_else(|| PathAndQuery::from_static("/"));
    let uri = match Uri::builder()
        .scheme("http")
        .authority(state.upstream.as_str())
        .path_and_query(path_and_query)
        .build()
    {
        Ok(uri) => uri,
        Err(e) => {
            tracing::error!(request_id = %request_id, upstream = %state.upstream, error = %e, "Invalid upstream address");
            return response::upstream_error(StatusCode::BAD_GATEWAY);
        }
    };

    tracing::debug!(request_id = %request_id, method = %parts.method, uri = %uri, "Forwarding request");
    parts.uri = uri;
    parts.version = Version::HTTP_11;
    let upstream_request = Request::from_parts(parts, body);

    match tokio::time::timeout(state.upstream_timeout, state.client.request(upstream_request)).await {
        Ok(Ok(upstream_response)) => {
            let (parts, body) = upstream_response.into_parts();
            Response::from_parts(parts, Body::new(body))
        }
        Ok(Err(e)) => {
            tracing::error!(request_id = %request_id, error = %e, "Upstream error");
            response::upstream_error(StatusCode::BAD_GATEWAY)
        }
        Err(_) => {
            tracing::warn!(request_id = %request_id, timeout = ?state.upstream_timeout, "Upstream timed out");
            response::upstream_error(StatusCode::GATEWAY_TIMEOUT)
        }
    }
}

/// Purge stale in-process windows every `interval` until shutdown.
async fn sweep(store: Arc<InMemoryStore>, interval: Duration, mut shutdown: broadcast::Receiver<()>) {
    let clock = SystemClock;
    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                store.purge_stale(clock.now_ms());
            }
            _ = shutdown.recv() => {
                tracing::debug!("Rate limit sweeper stopped");
                break;
            }
        }
    }
}
