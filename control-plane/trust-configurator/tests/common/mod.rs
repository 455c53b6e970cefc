#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use trust_configurator::config::TrustConfig;
use trust_configurator::controller::{GarbageCollector, ShootReconciler};
use trust_configurator::crd::{
    OpenIDConnect, OpenIDConnectSpec, Shoot, ShootAdvertisedAddress,
    ShootSpec, ShootStatus,
};
use trust_configurator::store::{
    ApplyOutcome, MemoryStore, MutateFn, TrustStore,
};
use trust_configurator::{
    ANNOTATION_ISSUER, Result, ANNOTATION_TRUSTED, LABEL_MANAGED_BY,
    LABEL_MANAGED_BY_VALUE,
};

pub const NS: &str = "garden-abc";
pub const ISSUER: &str = "https://api.my-shoot.example/issuer";

// DNS-1123 safe numeric suffix for unique names
pub const DIGITS: [char; 10] =
    ['0', '1', '2', '3', '4', '5', '6', '7', '8', '9'];
pub fn uniq(prefix: &str) -> String {
    format!("{prefix}-{}", nanoid::nanoid!(6, &DIGITS))
}

/// A shoot with uid, trust markers (when `trusted` is given) and an
/// advertised issuer (when `issuer` is given).
pub fn shoot(
    name: &str,
    uid: &str,
    trusted: Option<&str>,
    issuer: Option<&str>,
) -> Shoot {
    let mut s = Shoot::new(name, ShootSpec::default());
    s.metadata.namespace = Some(NS.into());
    s.metadata.uid = Some(uid.into());
    if let Some(value) = trusted {
        s.metadata.annotations = Some(BTreeMap::from([
            (ANNOTATION_ISSUER.to_string(), "managed".to_string()),
            (ANNOTATION_TRUSTED.to_string(), value.to_string()),
        ]));
    }
    s.status = issuer.map(|url| ShootStatus {
        advertised_addresses: Some(vec![ShootAdvertisedAddress {
            name: "service-account-issuer".into(),
            url: url.into(),
        }]),
    });
    s
}

pub fn trusted_shoot(name: &str, uid: &str) -> Shoot {
    shoot(name, uid, Some("true"), Some(ISSUER))
}

/// A managed OpenIDConnect as this controller would have created it.
pub fn managed_oidc(name: &str) -> OpenIDConnect {
    let mut o = OpenIDConnect::new(
        name,
        OpenIDConnectSpec {
            issuer_url: ISSUER.into(),
            client_id: "garden".into(),
            ..Default::default()
        },
    );
    o.metadata.labels = Some(BTreeMap::from([(
        LABEL_MANAGED_BY.to_string(),
        LABEL_MANAGED_BY_VALUE.to_string(),
    )]));
    o
}

pub fn ago(minutes: i64) -> DateTime<Utc> {
    Utc::now() - Duration::minutes(minutes)
}

pub struct Harness {
    pub store: MemoryStore,
    pub cfg: TrustConfig,
    pub reconciler: ShootReconciler,
    pub gc: GarbageCollector,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(TrustConfig::default())
    }

    pub fn with_config(cfg: TrustConfig) -> Self {
        let store = MemoryStore::new();
        let dyn_store: Arc<dyn TrustStore> = Arc::new(store.clone());
        let reconciler = ShootReconciler::new(
            dyn_store.clone(),
            cfg.shoot.clone(),
            cfg.oidc.clone(),
        );
        let gc = GarbageCollector::new(dyn_store, cfg.gc.clone());
        Self {
            store,
            cfg,
            reconciler,
            gc,
        }
    }
}

/// `MemoryStore` with scripted misbehavior layered on top.
#[derive(Clone, Default)]
pub struct ScriptedStore {
    pub inner: MemoryStore,
    /// Shoot reads never complete.
    pub stall_shoot_reads: bool,
    /// Extra entries returned by listings without being stored, as if
    /// deleted right after the list call.
    pub listed_but_gone: Vec<String>,
}

impl ScriptedStore {
    pub fn stalled() -> Self {
        Self {
            stall_shoot_reads: true,
            ..Default::default()
        }
    }

    pub fn listing_gone(names: &[&str]) -> Self {
        Self {
            listed_but_gone: names.iter().map(|n| n.to_string()).collect(),
            ..Default::default()
        }
    }
}

#[async_trait]
impl TrustStore for ScriptedStore {
    async fn get_shoot(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Shoot>> {
        if self.stall_shoot_reads {
            std::future::pending::<()>().await;
        }
        self.inner.get_shoot(namespace, name).await
    }

    async fn add_shoot_finalizer(&self, shoot: &Shoot, token: &str) -> Result<()> {
        self.inner.add_shoot_finalizer(shoot, token).await
    }

    async fn remove_shoot_finalizer(
        &self,
        shoot: &Shoot,
        token: &str,
    ) -> Result<()> {
        self.inner.remove_shoot_finalizer(shoot, token).await
    }

    async fn apply_oidc(
        &self,
        name: &str,
        mutate: MutateFn<'_>,
    ) -> Result<ApplyOutcome> {
        self.inner.apply_oidc(name, mutate).await
    }

    async fn delete_oidc(
        &self,
        name: &str,
        precondition_uid: Option<&str>,
    ) -> Result<bool> {
        self.inner.delete_oidc(name, precondition_uid).await
    }

    async fn list_managed_oidcs(&self) -> Result<Vec<ObjectMeta>> {
        let mut listed = self.inner.list_managed_oidcs().await?;
        listed.extend(self.listed_but_gone.iter().map(|name| ObjectMeta {
            name: Some(name.clone()),
            uid: Some(format!("uid-{name}")),
            creation_timestamp: Some(Time(ago(20))),
            ..Default::default()
        }));
        Ok(listed)
    }
}
