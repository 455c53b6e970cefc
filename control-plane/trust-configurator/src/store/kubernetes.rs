use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{
    Api, ApiResource, DeleteParams, DynamicObject, ListParams, Patch,
    PatchParams, PostParams, Preconditions,
};
use kube::{Client, ResourceExt};
use serde_json::json;
use tracing::{debug, trace};

use super::{
    ApplyOutcome, MutateFn, TrustStore, owned_fields_differ, typed_oidc,
    with_finalizer, without_finalizer,
};
use crate::crd::{OpenIDConnect, OpenIDConnectSpec, Shoot};
use crate::error::Result;
use crate::{LABEL_MANAGED_BY, LABEL_MANAGED_BY_VALUE};

/// `TrustStore` backed by the Kubernetes API server.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn shoots(&self, namespace: &str) -> Api<Shoot> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn oidcs(&self) -> Api<OpenIDConnect> {
        Api::all(self.client.clone())
    }

    /// Untyped view of the same resource, so reads keep spec fields the
    /// typed struct does not model.
    fn raw_oidcs(&self) -> Api<DynamicObject> {
        let ar = ApiResource::erase::<OpenIDConnect>(&());
        Api::all_with(self.client.clone(), &ar)
    }

    async fn patch_finalizers(
        &self,
        shoot: &Shoot,
        finals: Vec<String>,
    ) -> Result<()> {
        let ns = shoot.namespace().unwrap_or_default();
        let name = shoot.name_any();
        // resourceVersion turns the merge patch into an optimistic lock
        let patch = json!({
            "metadata": {
                "finalizers": finals,
                "resourceVersion": shoot.resource_version(),
            }
        });
        self.shoots(&ns)
            .patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        trace!(%ns, %name, "store: patched shoot finalizers");
        Ok(())
    }
}

#[async_trait]
impl TrustStore for KubeStore {
    async fn get_shoot(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Shoot>> {
        Ok(self.shoots(namespace).get_opt(name).await?)
    }

    async fn add_shoot_finalizer(
        &self,
        shoot: &Shoot,
        token: &str,
    ) -> Result<()> {
        match with_finalizer(shoot, token) {
            Some(finals) => self.patch_finalizers(shoot, finals).await,
            None => Ok(()),
        }
    }

    async fn remove_shoot_finalizer(
        &self,
        shoot: &Shoot,
        token: &str,
    ) -> Result<()> {
        match without_finalizer(shoot, token) {
            Some(finals) => self.patch_finalizers(shoot, finals).await,
            None => Ok(()),
        }
    }

    async fn apply_oidc(
        &self,
        name: &str,
        mutate: MutateFn<'_>,
    ) -> Result<ApplyOutcome> {
        let api = self.oidcs();
        match self.raw_oidcs().get_opt(name).await? {
            None => {
                let mut obj =
                    OpenIDConnect::new(name, OpenIDConnectSpec::default());
                mutate(&mut obj);
                api.create(&PostParams::default(), &obj).await?;
                debug!(oidc = %name, "store: created OpenIDConnect");
                Ok(ApplyOutcome::Created)
            }
            Some(current) => {
                let mut desired = typed_oidc(&current);
                mutate(&mut desired);
                if !owned_fields_differ(&current, &desired)? {
                    return Ok(ApplyOutcome::Unchanged);
                }
                // full replace drops foreign spec fields; the observed
                // resourceVersion makes stale writes fail with 409
                api.replace(name, &PostParams::default(), &desired).await?;
                debug!(oidc = %name, "store: updated OpenIDConnect");
                Ok(ApplyOutcome::Updated)
            }
        }
    }

    async fn delete_oidc(
        &self,
        name: &str,
        precondition_uid: Option<&str>,
    ) -> Result<bool> {
        let dp = DeleteParams {
            preconditions: precondition_uid.map(|uid| Preconditions {
                uid: Some(uid.to_string()),
                resource_version: None,
            }),
            ..Default::default()
        };
        match self.oidcs().delete(name, &dp).await {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_managed_oidcs(&self) -> Result<Vec<ObjectMeta>> {
        let lp = ListParams::default()
            .labels(&format!("{LABEL_MANAGED_BY}={LABEL_MANAGED_BY_VALUE}"));
        let list = self.oidcs().list_metadata(&lp).await?;
        Ok(list.items.into_iter().map(|o| o.metadata).collect())
    }
}
