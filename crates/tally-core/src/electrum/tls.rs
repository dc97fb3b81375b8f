//! TLS transport to Electrum peers.
//!
//! [`Dialer`] is the seam between the connector and the network: the
//! production [`TlsDialer`] opens TCP + TLS, tests substitute in-memory
//! streams.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tracing::debug;

use crate::error::CoreError;
use crate::peers::{Peer, TlsPolicy};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// A duplex byte stream a session can run over.
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Transport for T {}

/// Opens one transport to one peer.
///
/// A failed dial must not leave anything open: whatever was partially
/// established is dropped before the error is returned.
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(&self, peer: &Peer) -> io::Result<Box<dyn Transport>>;
}

// ==============================================================================
// TLS Dialer
// ==============================================================================

pub struct TlsDialer {
    verifying: TlsConnector,
    accept_invalid: TlsConnector,
    connect_timeout: Duration,
}

impl TlsDialer {
    pub fn new() -> Result<Self, CoreError> {
        Self::with_connect_timeout(DEFAULT_CONNECT_TIMEOUT)
    }

    /// `connect_timeout` bounds TCP connect and TLS handshake together.
    pub fn with_connect_timeout(connect_timeout: Duration) -> Result<Self, CoreError> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());

        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let verifying = ClientConfig::builder_with_provider(provider.clone())
            .with_safe_default_protocol_versions()
            .map_err(|e| CoreError::Config(format!("tls protocol versions: {e}")))?
            .with_root_certificates(roots)
            .with_no_client_auth();

        let accept_invalid = ClientConfig::builder_with_provider(provider.clone())
            .with_safe_default_protocol_versions()
            .map_err(|e| CoreError::Config(format!("tls protocol versions: {e}")))?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate(provider)))
            .with_no_client_auth();

        Ok(Self {
            verifying: TlsConnector::from(Arc::new(verifying)),
            accept_invalid: TlsConnector::from(Arc::new(accept_invalid)),
            connect_timeout,
        })
    }

    async fn open(&self, peer: &Peer) -> io::Result<Box<dyn Transport>> {
        let server_name = ServerName::try_from(peer.host.clone())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let connector = match peer.tls {
            TlsPolicy::Verify => &self.verifying,
            TlsPolicy::AcceptInvalidCerts => &self.accept_invalid,
        };

        let tcp = TcpStream::connect((peer.host.as_str(), peer.port)).await?;
        tcp.set_nodelay(true)?;
        debug!(%peer, "tcp connected, starting tls handshake");
        // On handshake failure the TCP stream is dropped inside `connect`.
        let tls = connector.connect(server_name, tcp).await?;
        Ok(Box::new(tls))
    }
}

#[async_trait]
impl Dialer for TlsDialer {
    async fn dial(&self, peer: &Peer) -> io::Result<Box<dyn Transport>> {
        match tokio::time::timeout(self.connect_timeout, self.open(peer)).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("connect to {peer} timed out after {:?}", self.connect_timeout),
            )),
        }
    }
}

// ==============================================================================
// Certificate Verification Bypass
// ==============================================================================

/// Accepts any certificate chain while still checking handshake signatures,
/// so the session is encrypted to whoever holds the presented key.
#[derive(Debug)]
struct AcceptAnyCertificate(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}
