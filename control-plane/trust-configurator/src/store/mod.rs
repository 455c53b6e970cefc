//! Object store seam used by the reconcilers.
//!
//! `KubeStore` talks to the API server; `MemoryStore` keeps everything in
//! process and mimics the API server semantics the controllers depend on
//! (resourceVersion conflicts, finalizer-gated deletion, uid preconditions).

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;
use kube::core::DynamicObject;

use crate::crd::{OpenIDConnect, Shoot};
use crate::error::Result;

pub mod kubernetes;
#[cfg(feature = "memory")]
pub mod memory;

pub use self::kubernetes::KubeStore;
#[cfg(feature = "memory")]
pub use self::memory::MemoryStore;

/// Mutation applied to the current (or an empty) OpenIDConnect object.
pub type MutateFn<'a> = &'a (dyn Fn(&mut OpenIDConnect) + Send + Sync);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Created,
    Updated,
    Unchanged,
}

#[async_trait]
pub trait TrustStore: Send + Sync {
    async fn get_shoot(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Shoot>>;

    /// Adds `token` to the shoot's finalizers. No-op when already present.
    async fn add_shoot_finalizer(&self, shoot: &Shoot, token: &str)
    -> Result<()>;

    /// Removes `token` from the shoot's finalizers. No-op when absent.
    async fn remove_shoot_finalizer(
        &self,
        shoot: &Shoot,
        token: &str,
    ) -> Result<()>;

    /// Create-or-update by name. Writes only when `mutate` changed labels,
    /// annotations or spec.
    async fn apply_oidc(
        &self,
        name: &str,
        mutate: MutateFn<'_>,
    ) -> Result<ApplyOutcome>;

    /// Deletes by name, optionally only if the stored object has `uid`.
    /// Returns `false` when there was nothing to delete.
    async fn delete_oidc(
        &self,
        name: &str,
        precondition_uid: Option<&str>,
    ) -> Result<bool>;

    /// Metadata of every OpenIDConnect carrying the managed-by label.
    async fn list_managed_oidcs(&self) -> Result<Vec<ObjectMeta>>;
}

/// Typed view of a stored OpenIDConnect, the starting point for a mutation.
/// Spec fields the type does not model are not carried over.
pub(crate) fn typed_oidc(raw: &DynamicObject) -> OpenIDConnect {
    let spec = raw
        .data
        .get("spec")
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default();
    let mut obj = OpenIDConnect::new(&raw.name_any(), spec);
    obj.metadata = raw.metadata.clone();
    obj
}

/// Whether the stored object differs from `desired` in the parts this
/// controller owns. The stored spec is compared as raw JSON, so fields
/// unknown to `OpenIDConnectSpec` count as drift.
pub(crate) fn owned_fields_differ(
    current: &DynamicObject,
    desired: &OpenIDConnect,
) -> Result<bool> {
    let spec = serde_json::to_value(&desired.spec)?;
    Ok(current.metadata.labels != desired.metadata.labels
        || current.metadata.annotations != desired.metadata.annotations
        || current.data.get("spec") != Some(&spec))
}

pub(crate) fn with_finalizer(shoot: &Shoot, token: &str) -> Option<Vec<String>> {
    let current = shoot.metadata.finalizers.clone().unwrap_or_default();
    if current.iter().any(|f| f == token) {
        return None;
    }
    let mut finals = current;
    finals.push(token.to_string());
    Some(finals)
}

pub(crate) fn without_finalizer(
    shoot: &Shoot,
    token: &str,
) -> Option<Vec<String>> {
    let current = shoot.metadata.finalizers.clone().unwrap_or_default();
    if !current.iter().any(|f| f == token) {
        return None;
    }
    Some(current.into_iter().filter(|f| f != token).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::ShootSpec;

    fn shoot_with(finals: &[&str]) -> Shoot {
        let mut s = Shoot::new("s", ShootSpec::default());
        s.metadata.finalizers =
            Some(finals.iter().map(|f| f.to_string()).collect());
        s
    }

    fn raw(spec: serde_json::Value) -> DynamicObject {
        serde_json::from_value(serde_json::json!({
            "apiVersion": "authentication.gardener.cloud/v1alpha1",
            "kind": "OpenIDConnect",
            "metadata": {"name": "a--b--c"},
            "spec": spec,
        }))
        .expect("dynamic object")
    }

    #[test]
    fn unmodelled_spec_fields_count_as_drift() {
        let current = raw(serde_json::json!({
            "issuerURL": "https://i",
            "clientID": "garden",
            "requiredClaims": {"aud": "x"},
        }));
        let desired = typed_oidc(&current);
        assert_eq!(desired.spec.issuer_url, "https://i");
        assert!(owned_fields_differ(&current, &desired).expect("compare"));

        let clean = raw(serde_json::json!({
            "issuerURL": "https://i",
            "clientID": "garden",
        }));
        assert!(!owned_fields_differ(&clean, &typed_oidc(&clean)).expect("compare"));
    }

    #[test]
    fn finalizer_add_is_idempotent() {
        assert_eq!(
            with_finalizer(&shoot_with(&["other"]), "mine"),
            Some(vec!["other".to_string(), "mine".to_string()])
        );
        assert_eq!(with_finalizer(&shoot_with(&["mine"]), "mine"), None);
    }

    #[test]
    fn finalizer_remove_keeps_others() {
        assert_eq!(
            without_finalizer(&shoot_with(&["a", "mine", "b"]), "mine"),
            Some(vec!["a".to_string(), "b".to_string()])
        );
        assert_eq!(without_finalizer(&shoot_with(&["a"]), "mine"), None);
    }
}
