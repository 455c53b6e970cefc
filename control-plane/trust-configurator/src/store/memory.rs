use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use kube::ResourceExt;
use kube::api::{ApiResource, DynamicObject};
use serde_json::{Value, json};
use tokio::sync::RwLock;

use super::{
    ApplyOutcome, MutateFn, TrustStore, owned_fields_differ, typed_oidc,
    with_finalizer, without_finalizer,
};
use crate::crd::{OpenIDConnect, OpenIDConnectSpec, Shoot};
use crate::error::{Error, Result};
use crate::{LABEL_MANAGED_BY, LABEL_MANAGED_BY_VALUE};

type ShootKey = (String, String);

#[derive(Default)]
struct Inner {
    shoots: HashMap<ShootKey, Shoot>,
    oidcs: HashMap<String, DynamicObject>,
    failing_shoot_reads: HashSet<ShootKey>,
    next_version: u64,
    writes: u64,
}

impl Inner {
    fn bump(&mut self) -> String {
        self.next_version += 1;
        self.next_version.to_string()
    }

    fn stamp(&mut self, meta: &mut ObjectMeta, created_at: DateTime<Utc>) {
        let version = self.bump();
        if meta.uid.is_none() {
            meta.uid = Some(format!("uid-{version}"));
        }
        if meta.creation_timestamp.is_none() {
            meta.creation_timestamp = Some(Time(created_at));
        }
        meta.resource_version = Some(version);
    }

    fn set_shoot_finalizers(
        &mut self,
        shoot: &Shoot,
        finals: Vec<String>,
    ) -> Result<()> {
        let key = key_of(shoot);
        let stored = self
            .shoots
            .get(&key)
            .ok_or_else(|| Error::NotFound(format!("shoot {}/{}", key.0, key.1)))?;
        if shoot.resource_version().is_some()
            && stored.resource_version() != shoot.resource_version()
        {
            return Err(Error::Conflict(format!("shoot {}/{}", key.0, key.1)));
        }
        let mut updated = stored.clone();
        updated.metadata.finalizers = Some(finals);
        updated.metadata.resource_version = Some(self.bump());
        self.writes += 1;
        if updated.is_deleting() && updated.finalizers().is_empty() {
            self.shoots.remove(&key);
        } else {
            self.shoots.insert(key, updated);
        }
        Ok(())
    }
}

/// In-process `TrustStore`. Cloning shares the underlying state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates or overwrites a shoot as an outside actor would. Assigns uid,
    /// resourceVersion and creation timestamp where missing.
    pub async fn put_shoot(&self, mut shoot: Shoot) -> Shoot {
        let mut inner = self.inner.write().await;
        inner.stamp(&mut shoot.metadata, Utc::now());
        inner.shoots.insert(key_of(&shoot), shoot.clone());
        shoot
    }

    /// Deletes a shoot the way the API server does: objects with finalizers
    /// only get a deletion timestamp.
    pub async fn delete_shoot(&self, namespace: &str, name: &str) {
        let mut inner = self.inner.write().await;
        let key = (namespace.to_string(), name.to_string());
        let Some(mut shoot) = inner.shoots.remove(&key) else {
            return;
        };
        if shoot.finalizers().is_empty() {
            return;
        }
        shoot.metadata.deletion_timestamp = Some(Time(Utc::now()));
        shoot.metadata.resource_version = Some(inner.bump());
        inner.shoots.insert(key, shoot);
    }

    pub async fn shoot(&self, namespace: &str, name: &str) -> Option<Shoot> {
        let inner = self.inner.read().await;
        inner
            .shoots
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Makes every read of the given shoot fail with a transport error.
    pub async fn fail_shoot_reads(&self, namespace: &str, name: &str) {
        let mut inner = self.inner.write().await;
        inner
            .failing_shoot_reads
            .insert((namespace.to_string(), name.to_string()));
    }

    pub async fn put_oidc(
        &self,
        oidc: OpenIDConnect,
        created_at: DateTime<Utc>,
    ) -> OpenIDConnect {
        let raw = self.put_raw_oidc(to_dynamic(&oidc), created_at).await;
        typed_oidc(&raw)
    }

    /// Stores an OpenIDConnect as untyped JSON, e.g. with spec fields
    /// written by another client.
    pub async fn put_raw_oidc(
        &self,
        mut oidc: DynamicObject,
        created_at: DateTime<Utc>,
    ) -> DynamicObject {
        let mut inner = self.inner.write().await;
        inner.stamp(&mut oidc.metadata, created_at);
        inner.oidcs.insert(oidc.name_any(), oidc.clone());
        oidc
    }

    pub async fn oidc(&self, name: &str) -> Option<OpenIDConnect> {
        self.raw_oidc(name).await.as_ref().map(typed_oidc)
    }

    pub async fn raw_oidc(&self, name: &str) -> Option<DynamicObject> {
        self.inner.read().await.oidcs.get(name).cloned()
    }

    pub async fn oidc_names(&self) -> Vec<String> {
        let mut names: Vec<String> =
            self.inner.read().await.oidcs.keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of successful writes made through the `TrustStore` interface.
    pub async fn writes(&self) -> u64 {
        self.inner.read().await.writes
    }
}

fn key_of(shoot: &Shoot) -> ShootKey {
    (shoot.namespace().unwrap_or_default(), shoot.name_any())
}

/// What a typed write looks like once it has gone through the API server.
fn to_dynamic(oidc: &OpenIDConnect) -> DynamicObject {
    let spec = serde_json::to_value(&oidc.spec).unwrap_or(Value::Null);
    let mut obj = DynamicObject::new(
        &oidc.name_any(),
        &ApiResource::erase::<OpenIDConnect>(&()),
    )
    .data(json!({ "spec": spec }));
    obj.metadata = oidc.metadata.clone();
    obj
}

#[async_trait]
impl TrustStore for MemoryStore {
    async fn get_shoot(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Shoot>> {
        let inner = self.inner.read().await;
        let key = (namespace.to_string(), name.to_string());
        if inner.failing_shoot_reads.contains(&key) {
            return Err(Error::Transport(format!(
                "injected read failure for shoot {namespace}/{name}"
            )));
        }
        Ok(inner.shoots.get(&key).cloned())
    }

    async fn add_shoot_finalizer(
        &self,
        shoot: &Shoot,
        token: &str,
    ) -> Result<()> {
        let Some(finals) = with_finalizer(shoot, token) else {
            return Ok(());
        };
        self.inner.write().await.set_shoot_finalizers(shoot, finals)
    }

    async fn remove_shoot_finalizer(
        &self,
        shoot: &Shoot,
        token: &str,
    ) -> Result<()> {
        let Some(finals) = without_finalizer(shoot, token) else {
            return Ok(());
        };
        self.inner.write().await.set_shoot_finalizers(shoot, finals)
    }

    async fn apply_oidc(
        &self,
        name: &str,
        mutate: MutateFn<'_>,
    ) -> Result<ApplyOutcome> {
        let mut inner = self.inner.write().await;
        match inner.oidcs.get(name).cloned() {
            None => {
                let mut obj =
                    OpenIDConnect::new(name, OpenIDConnectSpec::default());
                mutate(&mut obj);
                inner.stamp(&mut obj.metadata, Utc::now());
                inner.oidcs.insert(name.to_string(), to_dynamic(&obj));
                inner.writes += 1;
                Ok(ApplyOutcome::Created)
            }
            Some(current) => {
                let mut desired = typed_oidc(&current);
                mutate(&mut desired);
                if !owned_fields_differ(&current, &desired)? {
                    return Ok(ApplyOutcome::Unchanged);
                }
                desired.metadata.resource_version = Some(inner.bump());
                inner.oidcs.insert(name.to_string(), to_dynamic(&desired));
                inner.writes += 1;
                Ok(ApplyOutcome::Updated)
            }
        }
    }

    async fn delete_oidc(
        &self,
        name: &str,
        precondition_uid: Option<&str>,
    ) -> Result<bool> {
        let mut inner = self.inner.write().await;
        let Some(current) = inner.oidcs.get(name) else {
            return Ok(false);
        };
        if let Some(uid) = precondition_uid {
            if current.metadata.uid.as_deref() != Some(uid) {
                return Err(Error::Conflict(format!(
                    "OpenIDConnect {name}: uid precondition failed"
                )));
            }
        }
        inner.oidcs.remove(name);
        inner.writes += 1;
        Ok(true)
    }

    async fn list_managed_oidcs(&self) -> Result<Vec<ObjectMeta>> {
        let inner = self.inner.read().await;
        Ok(inner
            .oidcs
            .values()
            .filter(|o| {
                o.labels().get(LABEL_MANAGED_BY).map(String::as_str)
                    == Some(LABEL_MANAGED_BY_VALUE)
            })
            .map(|o| o.metadata.clone())
            .collect())
    }
}
