use kube::{CustomResource, Resource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::names::ShootIdentity;

/// Name of the advertised address carrying the service account issuer.
pub const ADVERTISED_ADDRESS_SERVICE_ACCOUNT_ISSUER: &str =
    "service-account-issuer";

/// Read-only projection of a Gardener shoot. Only the fields this controller
/// looks at are modelled; everything else in the object is ignored.
#[derive(
    CustomResource, Deserialize, Serialize, Clone, Debug, Default, JsonSchema,
)]
#[kube(
    group = "core.gardener.cloud",
    version = "v1beta1",
    kind = "Shoot",
    plural = "shoots",
    namespaced,
    status = "ShootStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct ShootSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ShootStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advertised_addresses: Option<Vec<ShootAdvertisedAddress>>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq)]
pub struct ShootAdvertisedAddress {
    pub name: String,
    pub url: String,
}

impl Shoot {
    /// URL of the service account issuer, if the shoot advertises a non-empty one.
    pub fn issuer_url(&self) -> Option<&str> {
        self.status
            .as_ref()
            .and_then(|s| s.advertised_addresses.as_ref())
            .and_then(|addrs| {
                addrs.iter().find(|a| {
                    a.name == ADVERTISED_ADDRESS_SERVICE_ACCOUNT_ISSUER
                })
            })
            .map(|a| a.url.as_str())
            .filter(|url| !url.is_empty())
    }

    /// (namespace, name, uid) of a persisted shoot. `None` for objects that
    /// were never stored and therefore have no uid.
    pub fn identity(&self) -> Option<ShootIdentity> {
        let ns = self.namespace()?;
        let uid = self.meta().uid.clone()?;
        Some(ShootIdentity::new(ns, self.name_any(), uid))
    }

    pub fn is_deleting(&self) -> bool {
        self.meta().deletion_timestamp.is_some()
    }

    pub fn has_finalizer(&self, token: &str) -> bool {
        self.finalizers().iter().any(|f| f == token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_addresses(addrs: Vec<(&str, &str)>) -> Shoot {
        let mut shoot = Shoot::new("my-shoot", ShootSpec::default());
        shoot.status = Some(ShootStatus {
            advertised_addresses: Some(
                addrs
                    .into_iter()
                    .map(|(name, url)| ShootAdvertisedAddress {
                        name: name.into(),
                        url: url.into(),
                    })
                    .collect(),
            ),
        });
        shoot
    }

    #[test]
    fn issuer_url_picks_service_account_issuer() {
        let shoot = with_addresses(vec![
            ("external", "https://api.shoot"),
            ("service-account-issuer", "https://shoot/issuer"),
        ]);
        assert_eq!(shoot.issuer_url(), Some("https://shoot/issuer"));
    }

    #[test]
    fn issuer_url_absent_or_empty() {
        assert_eq!(Shoot::new("s", ShootSpec::default()).issuer_url(), None);
        assert_eq!(with_addresses(vec![("foo", "https://foo")]).issuer_url(), None);
        assert_eq!(
            with_addresses(vec![("service-account-issuer", "")]).issuer_url(),
            None
        );
    }

    #[test]
    fn status_uses_api_field_names() {
        let shoot: Shoot = serde_json::from_value(serde_json::json!({
            "apiVersion": "core.gardener.cloud/v1beta1",
            "kind": "Shoot",
            "metadata": {"name": "s", "namespace": "garden-a", "uid": "U1"},
            "spec": {"region": "eu-1", "provider": {"type": "aws"}},
            "status": {"advertisedAddresses": [
                {"name": "service-account-issuer", "url": "https://issuer"}
            ]}
        }))
        .expect("deserialize shoot");
        assert_eq!(shoot.issuer_url(), Some("https://issuer"));
        assert_eq!(
            shoot.identity(),
            Some(ShootIdentity::new("garden-a", "s", "U1"))
        );
    }
}
