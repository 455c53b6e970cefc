use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tracing::{debug, error, info, instrument, warn};

use crate::config::GarbageCollectorConfig;
use crate::controller::predicate::is_relevant;
use crate::error::Result;
use crate::names;
use crate::store::TrustStore;

/// Outcome counters of one sweep.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub deleted: usize,
    pub kept: usize,
    pub too_young: usize,
    pub malformed: usize,
    pub failed: usize,
    /// Orphans that disappeared between listing and deletion.
    pub already_gone: usize,
}

/// Periodically removes managed OpenIDConnect objects whose shoot is gone,
/// was recreated, or is no longer trusted.
#[derive(Clone)]
pub struct GarbageCollector {
    store: Arc<dyn TrustStore>,
    cfg: GarbageCollectorConfig,
}

impl GarbageCollector {
    pub fn new(store: Arc<dyn TrustStore>, cfg: GarbageCollectorConfig) -> Self {
        Self { store, cfg }
    }

    /// One pass over every managed OpenIDConnect. Per-object failures are
    /// logged and counted; only a failed listing aborts the sweep.
    #[instrument(skip_all)]
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport> {
        let mut objects = self.store.list_managed_oidcs().await?;
        objects.sort_by(|a, b| a.name.cmp(&b.name));

        let mut report = SweepReport::default();
        for meta in objects {
            self.visit(&meta, now, &mut report).await;
        }
        Ok(report)
    }

    async fn visit(
        &self,
        meta: &ObjectMeta,
        now: DateTime<Utc>,
        report: &mut SweepReport,
    ) {
        let Some(oidc_name) = meta.name.as_deref() else {
            return;
        };
        if !self.old_enough(meta, now) {
            debug!(oidc = %oidc_name, "gc: object too young, skipping");
            report.too_young += 1;
            return;
        }
        let id = match names::decode(oidc_name) {
            Ok(id) => id,
            Err(e) => {
                error!(oidc = %oidc_name, error = %e, "gc: skipping object with unexpected name");
                report.malformed += 1;
                return;
            }
        };

        let reason = match self.store.get_shoot(&id.namespace, &id.name).await {
            Err(e) => {
                error!(oidc = %oidc_name, shoot = %id, error = %e, "gc: failed to read shoot, keeping object");
                report.failed += 1;
                return;
            }
            Ok(None) => "shoot not found",
            Ok(Some(shoot)) if shoot.metadata.uid.as_deref() != Some(id.uid.as_str()) => {
                "shoot was recreated"
            }
            Ok(Some(shoot)) if !is_relevant(&shoot) => "shoot is not trusted",
            Ok(Some(_)) => {
                report.kept += 1;
                return;
            }
        };

        match self.store.delete_oidc(oidc_name, meta.uid.as_deref()).await {
            Ok(true) => {
                info!(oidc = %oidc_name, reason, "gc: deleted OpenIDConnect");
                report.deleted += 1;
            }
            Ok(false) => {
                debug!(oidc = %oidc_name, "gc: OpenIDConnect already gone");
                report.already_gone += 1;
            }
            Err(e) => {
                error!(oidc = %oidc_name, error = %e, "gc: failed to delete OpenIDConnect");
                report.failed += 1;
            }
        }
    }

    /// Objects without a creation timestamp, or whose minimum lifetime ends
    /// beyond the representable range, are treated as young.
    fn old_enough(&self, meta: &ObjectMeta, now: DateTime<Utc>) -> bool {
        let Some(created) = meta.creation_timestamp.as_ref() else {
            return false;
        };
        let Ok(min) = chrono::Duration::from_std(self.cfg.min_object_lifetime())
        else {
            return false;
        };
        created
            .0
            .checked_add_signed(min)
            .is_some_and(|expiry| expiry <= now)
    }

    /// Sweeps once and returns the delay until the next sweep.
    pub async fn reconcile(&self, now: DateTime<Utc>) -> Result<Duration> {
        let report = self.sweep(now).await?;
        info!(
            deleted = report.deleted,
            kept = report.kept,
            too_young = report.too_young,
            malformed = report.malformed,
            failed = report.failed,
            already_gone = report.already_gone,
            "gc: sweep finished"
        );
        Ok(self.cfg.sync_period())
    }

    /// Runs forever: sweep, then sleep for the sync period.
    pub async fn run(self) {
        info!(period = ?self.cfg.sync_period(), "gc: starting garbage collector");
        loop {
            let next = match self.reconcile(Utc::now()).await {
                Ok(next) => next,
                Err(e) => {
                    warn!(error = %e, "gc: failed to list OpenIDConnects");
                    self.cfg.sync_period()
                }
            };
            tokio::time::sleep(next).await;
        }
    }
}
