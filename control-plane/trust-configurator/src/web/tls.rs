//! TLS termination for the admission webhook. The API server only calls
//! webhooks over HTTPS; certificates are read from a mounted directory
//! holding `tls.crt` and `tls.key`.

use std::io;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, anyhow};
use axum::Router;
use axum::serve::Listener;
use rustls::ServerConfig;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;
use tokio_rustls::server::TlsStream;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

pub const CERT_FILE: &str = "tls.crt";
pub const KEY_FILE: &str = "tls.key";

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Server config from the PEM chain and key in `cert_dir`.
pub fn load_server_config(cert_dir: &Path) -> anyhow::Result<Arc<ServerConfig>> {
    let cert_path = cert_dir.join(CERT_FILE);
    let key_path = cert_dir.join(KEY_FILE);
    let cert_pem = std::fs::read(&cert_path)
        .with_context(|| format!("reading {}", cert_path.display()))?;
    let key_pem = std::fs::read(&key_path)
        .with_context(|| format!("reading {}", key_path.display()))?;

    let certs = CertificateDer::pem_slice_iter(&cert_pem)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| anyhow!("parsing {}: {e}", cert_path.display()))?;
    if certs.is_empty() {
        anyhow::bail!("no certificates in {}", cert_path.display());
    }
    let key = PrivateKeyDer::from_pem_slice(&key_pem)
        .map_err(|e| anyhow!("parsing {}: {e}", key_path.display()))?;

    let mut config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .context("building TLS server config")?;
    config.alpn_protocols = vec![b"http/1.1".to_vec()];
    Ok(Arc::new(config))
}

/// TCP listener that only yields connections after a completed handshake.
/// Failed or stalled handshakes are dropped.
pub struct TlsListener {
    tcp: TcpListener,
    acceptor: TlsAcceptor,
}

impl TlsListener {
    pub fn new(tcp: TcpListener, config: Arc<ServerConfig>) -> Self {
        Self {
            tcp,
            acceptor: TlsAcceptor::from(config),
        }
    }
}

impl Listener for TlsListener {
    type Io = TlsStream<TcpStream>;
    type Addr = SocketAddr;

    async fn accept(&mut self) -> (Self::Io, Self::Addr) {
        loop {
            let (stream, peer) = match self.tcp.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    warn!(error = %e, "tls: accept failed");
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    continue;
                }
            };
            match tokio::time::timeout(HANDSHAKE_TIMEOUT, self.acceptor.accept(stream)).await
            {
                Ok(Ok(tls)) => return (tls, peer),
                Ok(Err(e)) => debug!(%peer, error = %e, "tls: handshake failed"),
                Err(_) => debug!(%peer, "tls: handshake timed out"),
            }
        }
    }

    fn local_addr(&self) -> io::Result<Self::Addr> {
        self.tcp.local_addr()
    }
}

/// Serves `router` over TLS on an already bound listener.
pub async fn serve_https(
    name: &'static str,
    tcp: TcpListener,
    cert_dir: &Path,
    router: Router,
) -> anyhow::Result<()> {
    let config = load_server_config(cert_dir)?;
    let app =
        router.layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()));

    info!("{} listening on {} (tls)", name, tcp.local_addr()?);
    axum::serve(TlsListener::new(tcp, config), app).await?;
    Ok(())
}

pub async fn run_https_server(
    name: &'static str,
    addr: SocketAddr,
    cert_dir: &Path,
    router: Router,
) -> anyhow::Result<()> {
    serve_https(name, TcpListener::bind(addr).await?, cert_dir, router).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_certificates_are_reported() {
        let dir = std::env::temp_dir().join("trust-configurator-no-certs");
        let err = load_server_config(&dir).expect_err("no files");
        assert!(err.to_string().contains(CERT_FILE), "{err}");
    }
}
