use std::collections::BTreeMap;
use std::sync::Arc;

use kube::runtime::controller::Action;
use tracing::{debug, info, instrument, warn};

use crate::config::{OidcConfig, ShootControllerConfig};
use crate::controller::state::ShootState;
use crate::crd::{OpenIDConnectSpec, Shoot};
use crate::error::{Error, Result};
use crate::names::ShootIdentity;
use crate::store::{ApplyOutcome, TrustStore};
use crate::{FINALIZER, LABEL_MANAGED_BY, LABEL_MANAGED_BY_VALUE};

pub const USERNAME_CLAIM: &str = "sub";
pub const GROUPS_CLAIM: &str = "groups";

/// Converges the OpenIDConnect resource of a single shoot.
#[derive(Clone)]
pub struct ShootReconciler {
    store: Arc<dyn TrustStore>,
    cfg: ShootControllerConfig,
    oidc: OidcConfig,
}

/// `ns:<namespace>:shoot:<name>:<uid>:`, unique per shoot across the fleet.
pub fn build_prefix(id: &ShootIdentity) -> String {
    format!("ns:{}:shoot:{}:{}:", id.namespace, id.name, id.uid)
}

pub fn desired_spec(
    id: &ShootIdentity,
    issuer_url: &str,
    oidc: &OidcConfig,
) -> OpenIDConnectSpec {
    let prefix = build_prefix(id);
    OpenIDConnectSpec {
        issuer_url: issuer_url.to_string(),
        client_id: oidc.client_id.clone(),
        username_claim: Some(USERNAME_CLAIM.to_string()),
        username_prefix: Some(prefix.clone()),
        groups_claim: Some(GROUPS_CLAIM.to_string()),
        groups_prefix: Some(prefix),
        max_token_expiration_seconds: i64::try_from(
            oidc.max_token_expiration_secs,
        )
        .ok(),
    }
}

impl ShootReconciler {
    pub fn new(
        store: Arc<dyn TrustStore>,
        cfg: ShootControllerConfig,
        oidc: OidcConfig,
    ) -> Self {
        Self { store, cfg, oidc }
    }

    /// Reconciles the shoot `namespace/name` within the configured deadline.
    #[instrument(skip_all, fields(ns = %namespace, name = %name))]
    pub async fn reconcile(&self, namespace: &str, name: &str) -> Result<Action> {
        let deadline = self.cfg.reconcile_timeout();
        match tokio::time::timeout(deadline, self.converge(namespace, name))
            .await
        {
            Ok(res) => res,
            Err(_) => Err(Error::Timeout(deadline)),
        }
    }

    async fn converge(&self, namespace: &str, name: &str) -> Result<Action> {
        let shoot = self.store.get_shoot(namespace, name).await?;
        let state = ShootState::observe(shoot.as_ref());
        debug!(?state, "reconcile: observed shoot state");
        match (state, shoot) {
            (ShootState::Trusted { issuer_url }, Some(shoot)) => {
                self.ensure_finalizer(&shoot).await?;
                self.apply_oidc(&shoot, &issuer_url).await?;
                Ok(Action::requeue(self.cfg.sync_period()))
            }
            (ShootState::PendingIssuer, Some(shoot)) => {
                self.ensure_finalizer(&shoot).await?;
                Err(Error::MissingIssuer(format!("{namespace}/{name}")))
            }
            (ShootState::Deleting, Some(shoot)) => {
                info!("reconcile: shoot is being deleted, cleaning up OpenIDConnect");
                self.cleanup(&shoot).await?;
                Ok(Action::await_change())
            }
            (ShootState::Irrelevant, Some(shoot)) => {
                info!("reconcile: shoot is not trusted, cleaning up OpenIDConnect");
                self.cleanup(&shoot).await?;
                Ok(Action::await_change())
            }
            _ => {
                // the shoot's uid is unknown here, so its child cannot be
                // named; the garbage collector takes care of it
                info!("reconcile: shoot is gone, stop reconciling");
                Ok(Action::await_change())
            }
        }
    }

    async fn ensure_finalizer(&self, shoot: &Shoot) -> Result<()> {
        if shoot.has_finalizer(FINALIZER) {
            return Ok(());
        }
        info!("reconcile: adding finalizer");
        self.store.add_shoot_finalizer(shoot, FINALIZER).await
    }

    async fn apply_oidc(&self, shoot: &Shoot, issuer_url: &str) -> Result<()> {
        let id = identity(shoot)?;
        let oidc_name = id.resource_name();
        let spec = desired_spec(&id, issuer_url, &self.oidc);
        let mutate = move |obj: &mut crate::crd::OpenIDConnect| {
            obj.metadata.annotations = None;
            obj.metadata.labels = Some(BTreeMap::from([(
                LABEL_MANAGED_BY.to_string(),
                LABEL_MANAGED_BY_VALUE.to_string(),
            )]));
            obj.spec = spec.clone();
        };
        match self.store.apply_oidc(&oidc_name, &mutate).await? {
            ApplyOutcome::Unchanged => {
                debug!(oidc = %oidc_name, "reconcile: OpenIDConnect up to date")
            }
            outcome => {
                info!(oidc = %oidc_name, ?outcome, "reconcile: applied OpenIDConnect")
            }
        }
        Ok(())
    }

    /// Deletes the child first; the finalizer goes only once it is gone.
    async fn cleanup(&self, shoot: &Shoot) -> Result<()> {
        match shoot.identity() {
            Some(id) => {
                let oidc_name = id.resource_name();
                if self.store.delete_oidc(&oidc_name, None).await? {
                    info!(oidc = %oidc_name, "reconcile: deleted OpenIDConnect");
                } else {
                    debug!(oidc = %oidc_name, "reconcile: OpenIDConnect not found, nothing to do");
                }
            }
            None => warn!("reconcile: shoot has no uid, skipping OpenIDConnect cleanup"),
        }
        if shoot.has_finalizer(FINALIZER) {
            info!("reconcile: removing finalizer");
            self.store.remove_shoot_finalizer(shoot, FINALIZER).await?;
        }
        Ok(())
    }
}

fn identity(shoot: &Shoot) -> Result<ShootIdentity> {
    shoot.identity().ok_or_else(|| {
        Error::NotFound(format!(
            "uid of shoot {}",
            kube::ResourceExt::name_any(shoot)
        ))
    })
}
