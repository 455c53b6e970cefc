use crate::controller::predicate::TrustMarkers;
use crate::crd::Shoot;

/// Where a shoot stands with respect to its OpenIDConnect resource.
/// Derived from the stored object at the start of every reconcile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShootState {
    /// The shoot does not exist (anymore).
    Absent,
    /// Deletion timestamp set; takes precedence over the trust markers.
    Deleting,
    /// Not marked as trusted: no OpenIDConnect should exist.
    Irrelevant,
    /// Trusted, but the issuer has not been advertised yet.
    PendingIssuer,
    Trusted { issuer_url: String },
}

impl ShootState {
    pub fn observe(shoot: Option<&Shoot>) -> Self {
        let Some(shoot) = shoot else {
            return ShootState::Absent;
        };
        if shoot.is_deleting() {
            return ShootState::Deleting;
        }
        if !TrustMarkers::from_shoot(shoot).is_relevant() {
            return ShootState::Irrelevant;
        }
        match shoot.issuer_url() {
            Some(url) => ShootState::Trusted {
                issuer_url: url.to_string(),
            },
            None => ShootState::PendingIssuer,
        }
    }
}
