//! Naming scheme that ties an OpenIDConnect resource to the shoot it was
//! created for: `<namespace>--<name>--<uid>`.

use std::fmt;

/// Separator between namespace, name and uid. Never occurs inside a field.
pub const SEPARATOR: &str = "--";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NameError {
    #[error("invalid OpenIDConnect resource name {0:?}: expected <namespace>--<name>--<uid>")]
    Malformed(String),
}

/// Identity triple of a shoot as encoded in a child resource name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShootIdentity {
    pub namespace: String,
    pub name: String,
    pub uid: String,
}

impl ShootIdentity {
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        uid: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            uid: uid.into(),
        }
    }

    pub fn resource_name(&self) -> String {
        encode(&self.namespace, &self.name, &self.uid)
    }
}

impl fmt::Display for ShootIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} ({})", self.namespace, self.name, self.uid)
    }
}

pub fn encode(namespace: &str, name: &str, uid: &str) -> String {
    format!("{namespace}{SEPARATOR}{name}{SEPARATOR}{uid}")
}

pub fn decode(resource_name: &str) -> Result<ShootIdentity, NameError> {
    let parts: Vec<&str> = resource_name.split(SEPARATOR).collect();
    match parts.as_slice() {
        [ns, name, uid]
            if !ns.is_empty() && !name.is_empty() && !uid.is_empty() =>
        {
            Ok(ShootIdentity::new(*ns, *name, *uid))
        }
        _ => Err(NameError::Malformed(resource_name.to_string())),
    }
}
