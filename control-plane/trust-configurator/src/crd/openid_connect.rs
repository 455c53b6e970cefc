use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Trust configuration consumed by the OIDC webhook authenticator of the
/// garden cluster. Cluster scoped; one object per trusted shoot.
#[derive(
    CustomResource,
    Deserialize,
    Serialize,
    Clone,
    Debug,
    Default,
    PartialEq,
    JsonSchema,
)]
#[kube(
    group = "authentication.gardener.cloud",
    version = "v1alpha1",
    kind = "OpenIDConnect",
    plural = "openidconnects"
)]
pub struct OpenIDConnectSpec {
    #[serde(rename = "issuerURL")]
    pub issuer_url: String,
    #[serde(rename = "clientID", default)]
    pub client_id: String,
    #[serde(
        rename = "usernameClaim",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub username_claim: Option<String>,
    #[serde(
        rename = "usernamePrefix",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub username_prefix: Option<String>,
    #[serde(
        rename = "groupsClaim",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub groups_claim: Option<String>,
    #[serde(
        rename = "groupsPrefix",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub groups_prefix: Option<String>,
    /// Tokens valid for longer than this are rejected by the authenticator.
    #[serde(
        rename = "maxTokenExpirationSeconds",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub max_token_expiration_seconds: Option<i64>,
}
