pub mod config;
pub mod controller;
pub mod crd;
pub mod error;
pub mod names;
pub mod runtime;
pub mod store;
pub mod web;
pub mod webhook;

pub use error::{Error, Result};

use tracing_subscriber::{
    EnvFilter, Layer, filter::LevelFilter, layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Name under which this controller manages OpenIDConnect resources.
pub const APP_NAME: &str = "garden-shoot-trust-configurator";

/// Marks a shoot whose service account issuer is managed by Gardener.
pub const ANNOTATION_ISSUER: &str = "authentication.gardener.cloud/issuer";
pub const ANNOTATION_ISSUER_MANAGED: &str = "managed";
/// Marks a shoot to be trusted in the garden cluster.
pub const ANNOTATION_TRUSTED: &str = "authentication.gardener.cloud/trusted";

pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";
pub const LABEL_MANAGED_BY_VALUE: &str = APP_NAME;

/// Finalizer keeping a shoot around until its OpenIDConnect is gone.
pub const FINALIZER: &str =
    "authentication.gardener.cloud/shoot-trust-configurator";

/// Sets up the global subscriber. `RUST_LOG` wins over `default_level`;
/// `format` is either `json` or `text`.
pub fn init_tracing(default_level: &str, format: &str) {
    let filter = EnvFilter::builder()
        .with_env_var("RUST_LOG")
        .from_env_lossy()
        .add_directive(
            default_level
                .parse()
                .unwrap_or_else(|_| LevelFilter::INFO.into()),
        );

    let fmt_layer = match format {
        "text" => tracing_subscriber::fmt::layer().boxed(),
        _ => tracing_subscriber::fmt::layer().json().boxed(),
    };

    let _ = tracing_subscriber::registry()
        .with(fmt_layer)
        .with(filter)
        .try_init();
}
