//! TLS configuration: a certificate + key file pair served through
//! `axum-server`'s rustls acceptor, or a PKCS12 bundle with passphrase
//! served through a `native-tls`-backed custom acceptor.
//!
//! `axum-server` only ships a rustls acceptor, and none of this
//! workspace's dependencies can re-encode a PKCS12 bundle into the PEM
//! rustls wants, so a PKCS12 bundle is served with its own
//! `native-tls`/`tokio-native-tls` acceptor instead of being converted
//! up front (see DESIGN.md for the tradeoff).

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use axum_server::accept::Accept;
use axum_server::tls_rustls::RustlsConfig;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::{HttpError, HttpResult};

/// Where to load server TLS material from, per §6.2.
#[derive(Debug, Clone)]
pub enum TlsSource {
    /// A PEM certificate chain + private key pair.
    CertKey { cert_path: PathBuf, key_path: PathBuf },
    /// A PKCS12 bundle, password-protected.
    Pkcs12 { path: PathBuf, passphrase: String },
}

/// The acceptor an [`crate::listener::HttpListener`] serves with: either
/// axum-server's native rustls acceptor, or our native-tls one.
pub enum TlsAcceptor {
    Rustls(RustlsConfig),
    NativeTls(NativeTlsAcceptor),
}

impl TlsAcceptor {
    pub async fn load(source: &TlsSource) -> HttpResult<Self> {
        match source {
            TlsSource::CertKey { cert_path, key_path } => {
                let config = RustlsConfig::from_pem_file(cert_path, key_path)
                    .await
                    .map_err(|e| HttpError::Tls(format!("failed to load cert/key pair: {e}")))?;
                Ok(TlsAcceptor::Rustls(config))
            }
            TlsSource::Pkcs12 { path, passphrase } => {
                let acceptor = build_native_tls_acceptor(path, passphrase).await?;
                Ok(TlsAcceptor::NativeTls(NativeTlsAcceptor::new(acceptor)))
            }
        }
    }
}

async fn build_native_tls_acceptor(path: &Path, passphrase: &str) -> HttpResult<tokio_native_tls::TlsAcceptor> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| HttpError::Tls(format!("failed to read PKCS12 bundle {}: {e}", path.display())))?;
    let identity = native_tls::Identity::from_pkcs12(&bytes, passphrase)
        .map_err(|e| HttpError::Tls(format!("invalid PKCS12 bundle or passphrase: {e}")))?;
    let acceptor = native_tls::TlsAcceptor::new(identity)
        .map_err(|e| HttpError::Tls(format!("failed to build TLS acceptor: {e}")))?;
    Ok(tokio_native_tls::TlsAcceptor::from(acceptor))
}

/// A custom `axum-server` acceptor wrapping a `native-tls` handshake,
/// for the PKCS12 TLS path.
#[derive(Clone)]
pub struct NativeTlsAcceptor(tokio_native_tls::TlsAcceptor);

impl NativeTlsAcceptor {
    fn new(acceptor: tokio_native_tls::TlsAcceptor) -> Self {
        Self(acceptor)
    }
}

impl<I, S> Accept<I, S> for NativeTlsAcceptor
where
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    S: Send + 'static,
{
    type Stream = tokio_native_tls::TlsStream<I>;
    type Service = S;
    type Future = Pin<Box<dyn Future<Output = io::Result<(Self::Stream, Self::Service)>> + Send>>;

    fn accept(&self, stream: I, service: S) -> Self::Future {
        let acceptor = self.0.clone();
        Box::pin(async move {
            let stream = acceptor
                .accept(stream)
                .await
                .map_err(|e| io::Error::other(e.to_string()))?;
            Ok((stream, service))
        })
    }
}
