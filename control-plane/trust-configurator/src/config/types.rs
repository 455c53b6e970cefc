use std::time::Duration;

use envconfig::Envconfig;

pub const LOG_LEVELS: [&str; 3] = ["debug", "info", "error"];
pub const LOG_FORMATS: [&str; 2] = ["json", "text"];

const MIN_TOKEN_EXPIRATION_SECS: u64 = 5 * 60;
const MAX_TOKEN_EXPIRATION_SECS: u64 = 24 * 60 * 60;
/// Upper bound for every configured period or lifetime.
pub const MAX_DURATION_SECS: u64 = 30 * 24 * 60 * 60;

#[derive(Envconfig, Clone, Debug)]
pub struct TrustConfig {
    /// One of debug, info, error. `RUST_LOG` takes precedence when set.
    #[envconfig(from = "GSTC_LOG_LEVEL", default = "info")]
    pub log_level: String,

    /// json or text
    #[envconfig(from = "GSTC_LOG_FORMAT", default = "json")]
    pub log_format: String,

    #[envconfig(from = "GSTC_HEALTH_PORT", default = "8081")]
    pub health_port: u16,

    /// Port of the admission webhook listener.
    #[envconfig(from = "GSTC_WEBHOOK_PORT", default = "10443")]
    pub webhook_port: u16,

    /// Directory holding the webhook serving certificate as `tls.crt` and
    /// `tls.key`.
    #[envconfig(
        from = "GSTC_WEBHOOK_CERT_DIR",
        default = "/tmp/k8s-webhook-server/serving-certs"
    )]
    pub webhook_cert_dir: String,

    #[envconfig(nested)]
    pub shoot: ShootControllerConfig,

    #[envconfig(nested)]
    pub oidc: OidcConfig,

    #[envconfig(nested)]
    pub gc: GarbageCollectorConfig,
}

#[derive(Envconfig, Clone, Debug)]
pub struct ShootControllerConfig {
    /// Requeue interval after a successful apply.
    #[envconfig(from = "GSTC_SHOOT_SYNC_PERIOD_SECS", default = "3600")]
    pub sync_period_secs: u64,

    /// Maximum number of shoots reconciled in parallel.
    #[envconfig(from = "GSTC_SHOOT_CONCURRENCY", default = "50")]
    pub concurrency: u16,

    #[envconfig(from = "GSTC_SHOOT_RECONCILE_TIMEOUT_SECS", default = "180")]
    pub reconcile_timeout_secs: u64,

    /// Requeue delay after a failed reconcile.
    #[envconfig(from = "GSTC_SHOOT_RETRY_SECS", default = "5")]
    pub retry_secs: u64,
}

#[derive(Envconfig, Clone, Debug)]
pub struct OidcConfig {
    #[envconfig(from = "GSTC_OIDC_CLIENT_ID", default = "garden")]
    pub client_id: String,

    /// Upper bound for the validity of accepted tokens, 5 minutes to 24 hours.
    #[envconfig(from = "GSTC_OIDC_MAX_TOKEN_EXPIRATION_SECS", default = "7200")]
    pub max_token_expiration_secs: u64,
}

#[derive(Envconfig, Clone, Debug)]
pub struct GarbageCollectorConfig {
    #[envconfig(from = "GSTC_GC_SYNC_PERIOD_SECS", default = "3600")]
    pub sync_period_secs: u64,

    /// Objects younger than this are never collected.
    #[envconfig(from = "GSTC_GC_MIN_OBJECT_LIFETIME_SECS", default = "600")]
    pub min_object_lifetime_secs: u64,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unsupported value {value:?} for {field}, supported: {supported:?}")]
    NotSupported {
        field: &'static str,
        value: String,
        supported: &'static [&'static str],
    },
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },
    #[error("{field} must be between {min} and {max} seconds, got {value}")]
    OutOfRange {
        field: &'static str,
        value: u64,
        min: u64,
        max: u64,
    },
}

impl TrustConfig {
    /// Collects every problem instead of stopping at the first one.
    pub fn validate(&self) -> Result<(), Vec<ConfigError>> {
        let mut errs = Vec::new();
        if !LOG_LEVELS.contains(&self.log_level.as_str()) {
            errs.push(ConfigError::NotSupported {
                field: "logLevel",
                value: self.log_level.clone(),
                supported: &LOG_LEVELS,
            });
        }
        if !LOG_FORMATS.contains(&self.log_format.as_str()) {
            errs.push(ConfigError::NotSupported {
                field: "logFormat",
                value: self.log_format.clone(),
                supported: &LOG_FORMATS,
            });
        }
        // (field, seconds, minimum)
        let durations = [
            ("shoot.syncPeriod", self.shoot.sync_period_secs, 1),
            ("shoot.reconcileTimeout", self.shoot.reconcile_timeout_secs, 1),
            ("shoot.retry", self.shoot.retry_secs, 1),
            ("garbageCollector.syncPeriod", self.gc.sync_period_secs, 1),
            (
                "garbageCollector.minObjectLifetime",
                self.gc.min_object_lifetime_secs,
                0,
            ),
        ];
        for (field, value, min) in durations {
            if value < min {
                errs.push(ConfigError::Zero { field });
            } else if value > MAX_DURATION_SECS {
                errs.push(ConfigError::OutOfRange {
                    field,
                    value,
                    min,
                    max: MAX_DURATION_SECS,
                });
            }
        }
        if self.shoot.concurrency == 0 {
            errs.push(ConfigError::Zero {
                field: "shoot.concurrency",
            });
        }
        let exp = self.oidc.max_token_expiration_secs;
        if !(MIN_TOKEN_EXPIRATION_SECS..=MAX_TOKEN_EXPIRATION_SECS).contains(&exp)
        {
            errs.push(ConfigError::OutOfRange {
                field: "oidc.maxTokenExpiration",
                value: exp,
                min: MIN_TOKEN_EXPIRATION_SECS,
                max: MAX_TOKEN_EXPIRATION_SECS,
            });
        }
        if errs.is_empty() { Ok(()) } else { Err(errs) }
    }
}

impl ShootControllerConfig {
    pub fn sync_period(&self) -> Duration {
        Duration::from_secs(self.sync_period_secs)
    }

    pub fn reconcile_timeout(&self) -> Duration {
        Duration::from_secs(self.reconcile_timeout_secs)
    }

    pub fn retry(&self) -> Duration {
        Duration::from_secs(self.retry_secs)
    }
}

impl GarbageCollectorConfig {
    pub fn sync_period(&self) -> Duration {
        Duration::from_secs(self.sync_period_secs)
    }

    pub fn min_object_lifetime(&self) -> Duration {
        Duration::from_secs(self.min_object_lifetime_secs)
    }
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            log_format: "json".into(),
            health_port: 8081,
            webhook_port: 10443,
            webhook_cert_dir: "/tmp/k8s-webhook-server/serving-certs".into(),
            shoot: ShootControllerConfig::default(),
            oidc: OidcConfig::default(),
            gc: GarbageCollectorConfig::default(),
        }
    }
}

impl Default for ShootControllerConfig {
    fn default() -> Self {
        Self {
            sync_period_secs: 3600,
            concurrency: 50,
            reconcile_timeout_secs: 180,
            retry_secs: 5,
        }
    }
}

impl Default for OidcConfig {
    fn default() -> Self {
        Self {
            client_id: "garden".into(),
            max_token_expiration_secs: 7200,
        }
    }
}

impl Default for GarbageCollectorConfig {
    fn default() -> Self {
        Self {
            sync_period_secs: 3600,
            min_object_lifetime_secs: 600,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn env_defaults_match_default_impl() {
        let cfg = TrustConfig::init_from_hashmap(&HashMap::new())
            .expect("defaults parse");
        let def = TrustConfig::default();
        assert_eq!(cfg.log_level, def.log_level);
        assert_eq!(cfg.log_format, def.log_format);
        assert_eq!(cfg.webhook_cert_dir, def.webhook_cert_dir);
        assert_eq!(cfg.shoot.sync_period(), def.shoot.sync_period());
        assert_eq!(cfg.shoot.concurrency, 50);
        assert_eq!(cfg.oidc.client_id, "garden");
        assert_eq!(cfg.gc.min_object_lifetime(), Duration::from_secs(600));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn env_overrides_apply() {
        let env = HashMap::from([
            ("GSTC_GC_MIN_OBJECT_LIFETIME_SECS".to_string(), "60".to_string()),
            ("GSTC_OIDC_CLIENT_ID".to_string(), "audience".to_string()),
        ]);
        let cfg = TrustConfig::init_from_hashmap(&env).expect("parse");
        assert_eq!(cfg.gc.min_object_lifetime(), Duration::from_secs(60));
        assert_eq!(cfg.oidc.client_id, "audience");
    }

    #[test]
    fn validate_reports_every_problem() {
        let mut cfg = TrustConfig::default();
        cfg.log_level = "trace".into();
        cfg.log_format = "xml".into();
        cfg.shoot.concurrency = 0;
        cfg.oidc.max_token_expiration_secs = 60;
        let errs = cfg.validate().expect_err("invalid");
        assert_eq!(errs.len(), 4);
        assert!(errs.contains(&ConfigError::Zero {
            field: "shoot.concurrency"
        }));
        assert!(matches!(
            errs[0],
            ConfigError::NotSupported {
                field: "logLevel",
                ..
            }
        ));
    }

    #[test]
    fn periods_and_lifetime_are_bounded() {
        let mut cfg = TrustConfig::default();
        cfg.gc.min_object_lifetime_secs = 1_000_000_000_000_000;
        cfg.shoot.sync_period_secs = MAX_DURATION_SECS + 1;
        let errs = cfg.validate().expect_err("too large");
        assert_eq!(errs.len(), 2);
        assert!(errs.iter().all(|e| matches!(
            e,
            ConfigError::OutOfRange {
                max: MAX_DURATION_SECS,
                ..
            }
        )));

        cfg.gc.min_object_lifetime_secs = 0;
        cfg.shoot.sync_period_secs = MAX_DURATION_SECS;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn token_expiration_bounds_are_inclusive() {
        let mut cfg = TrustConfig::default();
        cfg.oidc.max_token_expiration_secs = 300;
        assert!(cfg.validate().is_ok());
        cfg.oidc.max_token_expiration_secs = 86400;
        assert!(cfg.validate().is_ok());
        cfg.oidc.max_token_expiration_secs = 86401;
        assert!(cfg.validate().is_err());
    }
}
