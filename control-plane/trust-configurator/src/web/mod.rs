use axum::{Router, extract::State, http::StatusCode, routing::get};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::info;

pub mod tls;

pub use tls::run_https_server;

/// Flipped once the shoot cache has completed its initial list.
#[derive(Clone, Default)]
pub struct Readiness(Arc<AtomicBool>);

impl Readiness {
    pub fn mark_ready(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_ready(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

async fn readyz(State(ready): State<Readiness>) -> (StatusCode, &'static str) {
    if ready.is_ready() {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "cache not synced")
    }
}

/// Liveness and readiness endpoints. `/healthz` is kept next to `/health`
/// for kubelets configured that way.
pub fn health_router(ready: Readiness) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/healthz", get(|| async { "ok" }))
        .route("/readyz", get(readyz))
        .with_state(ready)
}

pub async fn run_http_server(
    name: &'static str,
    addr: SocketAddr,
    router: Router,
) -> anyhow::Result<()> {
    let app =
        router.layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()));

    info!("{} listening on {}", name, addr);
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app).await?;
    Ok(())
}
