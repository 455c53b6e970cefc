use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use kube::Client;
use tokio::{task::JoinHandle, try_join};

use crate::{
    config::TrustConfig,
    controller::{ControllerContext, GarbageCollector, run_shoot_controller},
    store::{KubeStore, TrustStore},
    web::{Readiness, health_router, run_http_server, run_https_server},
    webhook,
};

/// Compute the health endpoint bind address based on config.
pub fn compute_health_addr(cfg: &TrustConfig) -> SocketAddr {
    ([0, 0, 0, 0], cfg.health_port).into()
}

pub fn compute_webhook_addr(cfg: &TrustConfig) -> SocketAddr {
    ([0, 0, 0, 0], cfg.webhook_port).into()
}

/// Spawn the shoot controller loop.
pub fn spawn_controller(
    client: Client,
    ctx: Arc<ControllerContext>,
) -> JoinHandle<anyhow::Result<()>> {
    tokio::spawn(async move { run_shoot_controller(client, ctx).await })
}

/// Spawn the periodic OpenIDConnect garbage collector.
pub fn spawn_gc(gc: GarbageCollector) -> JoinHandle<anyhow::Result<()>> {
    tokio::spawn(async move {
        gc.run().await;
        Ok(())
    })
}

pub fn spawn_health(
    addr: SocketAddr,
    ready: Readiness,
) -> JoinHandle<anyhow::Result<()>> {
    tokio::spawn(async move { run_http_server("health", addr, health_router(ready)).await })
}

/// Spawn the admission webhook on HTTPS with the certificates in `cert_dir`.
pub fn spawn_webhook(
    addr: SocketAddr,
    cert_dir: PathBuf,
) -> JoinHandle<anyhow::Result<()>> {
    tokio::spawn(async move {
        run_https_server("webhook", addr, &cert_dir, webhook::router()).await
    })
}

/// Start the controller, the garbage collector and both HTTP listeners and
/// wait until any of them finishes.
pub async fn run_all(client: Client, cfg: TrustConfig) -> anyhow::Result<()> {
    let store: Arc<dyn TrustStore> = Arc::new(KubeStore::new(client.clone()));
    let ctx = Arc::new(ControllerContext::new(store.clone(), cfg.clone()));
    let gc = GarbageCollector::new(store, cfg.gc.clone());

    let ready = ctx.ready.clone();
    let controller = spawn_controller(client, ctx);
    let collector = spawn_gc(gc);
    let health = spawn_health(compute_health_addr(&cfg), ready);
    let hook = spawn_webhook(
        compute_webhook_addr(&cfg),
        PathBuf::from(&cfg.webhook_cert_dir),
    );

    let (c_res, g_res, h_res, w_res) =
        try_join!(controller, collector, health, hook)?;
    c_res?;
    g_res?;
    h_res?;
    w_res?;
    Ok(())
}
