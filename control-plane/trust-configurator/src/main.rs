use envconfig::Envconfig;
use kube::Client;
use trust_configurator::{config::TrustConfig, init_tracing, runtime};
use tracing::{error, info};

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let cfg = TrustConfig::init_from_env()?;
    init_tracing(&cfg.log_level, &cfg.log_format);

    // Ensure rustls uses the aws-lc-rs provider explicitly.
    if let Err(e) = rustls::crypto::CryptoProvider::install_default(
        rustls::crypto::aws_lc_rs::default_provider(),
    ) {
        tracing::debug!(
            ?e,
            "CryptoProvider already installed or incompatible; proceeding"
        );
    }

    if let Err(errs) = cfg.validate() {
        for e in &errs {
            error!(error = %e, "invalid configuration");
        }
        anyhow::bail!("invalid configuration: {} problem(s)", errs.len());
    }
    info!(?cfg, "Starting garden shoot trust configurator");

    let client = Client::try_default().await?;
    runtime::run_all(client, cfg).await
}
