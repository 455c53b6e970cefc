use std::sync::Arc;

use futures_util::{StreamExt, TryStreamExt, future};
use kube::{
    Api, Client, ResourceExt,
    runtime::{
        Controller, WatchStreamExt,
        controller::{self, Action},
        reflector, watcher,
    },
};
use tracing::{debug, info, warn};

use crate::config::TrustConfig;
use crate::crd::Shoot;
use crate::error::Error;
use crate::store::TrustStore;
use crate::web::Readiness;

pub mod gc;
pub mod predicate;
pub mod reconcile;
pub mod state;


pub use gc::{GarbageCollector, SweepReport};
pub use predicate::{EventFilter, is_relevant};
pub use reconcile::ShootReconciler;
pub use state::ShootState;

#[derive(Clone)]
pub struct ControllerContext {
    pub reconciler: ShootReconciler,
    pub cfg: TrustConfig,
    /// Set once the shoot cache is filled.
    pub ready: Readiness,
}

impl ControllerContext {
    pub fn new(store: Arc<dyn TrustStore>, cfg: TrustConfig) -> Self {
        let reconciler =
            ShootReconciler::new(store, cfg.shoot.clone(), cfg.oidc.clone());
        Self {
            reconciler,
            cfg,
            ready: Readiness::default(),
        }
    }
}

type RunError = controller::Error<Error, watcher::Error>;

/// Errors that are part of normal operation: failed reconciles are already
/// reported by `error_policy`, and a queued key whose shoot left the cache
/// (a relevant delete) has nothing left to reconcile.
fn is_expected(err: &RunError) -> bool {
    matches!(
        err,
        controller::Error::ReconcilerFailed(..) | controller::Error::ObjectNotFound(_)
    )
}

/// Watches shoots in all namespaces and reconciles the relevant ones.
pub async fn run_shoot_controller(
    client: Client,
    ctx: Arc<ControllerContext>,
) -> anyhow::Result<()> {
    let api: Api<Shoot> = Api::all(client);
    let (reader, writer) = reflector::store();

    let cache = reader.clone();
    let ready = ctx.ready.clone();
    tokio::spawn(async move {
        if cache.wait_until_ready().await.is_ok() {
            info!("shoot cache synced");
            ready.mark_ready();
        }
    });

    // Only relevant transitions reach the work queue; the reflector still
    // sees every event so requeues resolve against a complete cache.
    let mut filter = EventFilter::new();
    let shoots = watcher(api, watcher::Config::default())
        .default_backoff()
        .reflect(writer)
        .try_filter_map(move |event| future::ready(Ok(filter.filter(event))));

    let concurrency = ctx.cfg.shoot.concurrency;
    info!(concurrency, "starting shoot controller");

    Controller::for_stream(shoots, reader)
        .with_config(controller::Config::default().concurrency(concurrency))
        .run(reconcile, error_policy, ctx)
        .for_each(|res| async move {
            match res {
                Ok((obj, action)) => {
                    debug!(shoot = %obj, ?action, "reconciled")
                }
                Err(e) if is_expected(&e) => debug!(error = %e, "shoot not reconciled"),
                Err(e) => warn!(error = ?e, "shoot controller error"),
            }
        })
        .await;

    Ok(())
}

async fn reconcile(
    shoot: Arc<Shoot>,
    ctx: Arc<ControllerContext>,
) -> Result<Action, Error> {
    let ns = shoot.namespace().unwrap_or_default();
    ctx.reconciler.reconcile(&ns, &shoot.name_any()).await
}

fn error_policy(
    shoot: Arc<Shoot>,
    error: &Error,
    ctx: Arc<ControllerContext>,
) -> Action {
    let ns = shoot.namespace().unwrap_or_default();
    let name = shoot.name_any();
    match error {
        Error::MissingIssuer(_) => {
            info!(%ns, %name, "waiting for the shoot to advertise its issuer")
        }
        e if e.is_retryable() => {
            warn!(%ns, %name, error = %e, "reconcile failed, retrying")
        }
        e => tracing::error!(%ns, %name, error = %e, "reconcile failed"),
    }
    Action::requeue(error.requeue_after(ctx.cfg.shoot.retry()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::runtime::reflector::ObjectRef;

    #[test]
    fn vanished_and_failed_keys_are_expected() {
        let obj = ObjectRef::<Shoot>::new("my-shoot").within("garden-abc").erase();
        assert!(is_expected(&controller::Error::ObjectNotFound(obj.clone())));
        assert!(is_expected(&controller::Error::ReconcilerFailed(
            Error::Transport("boom".into()),
            obj,
        )));
    }
}
