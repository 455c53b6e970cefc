use std::time::Duration;

use crate::names::NameError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    MalformedName(#[from] NameError),

    #[error(
        "shoot {0} does not have service-account-issuer in its status.advertisedAddresses"
    )]
    MissingIssuer(String),

    #[error("conflicting update of {0}")]
    Conflict(String),

    #[error("store transport error: {0}")]
    Transport(String),

    #[error("reconcile did not finish within {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    ValidationDenied(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Whether a later attempt can succeed without outside intervention.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::MissingIssuer(_)
                | Error::Conflict(_)
                | Error::Transport(_)
                | Error::Timeout(_)
        )
    }

    /// Delay before the controller retries the failed key.
    pub fn requeue_after(&self, retry: Duration) -> Duration {
        match self {
            // a fresh read usually resolves version mismatches right away
            Error::Conflict(_) => Duration::from_secs(1),
            _ => retry,
        }
    }
}

impl From<kube::Error> for Error {
    fn from(e: kube::Error) -> Self {
        match &e {
            kube::Error::Api(ae) if ae.code == 404 => {
                Error::NotFound(ae.message.clone())
            }
            kube::Error::Api(ae) if ae.code == 409 => {
                Error::Conflict(ae.message.clone())
            }
            _ => Error::Transport(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;

    fn api_err(code: u16) -> kube::Error {
        kube::Error::Api(ErrorResponse {
            status: "Failure".into(),
            message: format!("code {code}"),
            reason: "Test".into(),
            code,
        })
    }

    #[test]
    fn kube_errors_map_by_status_code() {
        assert!(matches!(Error::from(api_err(404)), Error::NotFound(_)));
        assert!(matches!(Error::from(api_err(409)), Error::Conflict(_)));
        assert!(matches!(Error::from(api_err(500)), Error::Transport(_)));
    }

    #[test]
    fn conflicts_retry_quickly() {
        let retry = Duration::from_secs(5);
        assert_eq!(
            Error::Conflict("x".into()).requeue_after(retry),
            Duration::from_secs(1)
        );
        assert_eq!(Error::MissingIssuer("x".into()).requeue_after(retry), retry);
    }

    #[test]
    fn logical_failures_are_not_retryable() {
        assert!(!Error::ValidationDenied("no".into()).is_retryable());
        assert!(!Error::NotFound("x".into()).is_retryable());
        assert!(Error::MissingIssuer("x".into()).is_retryable());
        assert!(Error::Timeout(Duration::from_secs(1)).is_retryable());
    }
}
