//! Transport underneath the SMTP client: plain TCP or TLS over TCP.

use std::{fmt, sync::Arc};

use courier_common::tracing;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};
use tokio_rustls::{
    TlsConnector,
    client::TlsStream,
    rustls::{
        self, ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme,
        client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
        pki_types::{CertificateDer, ServerName, UnixTime},
    },
};

use super::error::{ClientError, Result};

/// TLS client settings, built once and shared by every connection.
///
/// Loading the platform trust store is comparatively expensive, so callers
/// should keep one context around rather than creating one per delivery.
#[derive(Clone)]
pub struct TlsContext {
    connector: TlsConnector,
    accept_invalid_certs: bool,
}

impl fmt::Debug for TlsContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsContext")
            .field("accept_invalid_certs", &self.accept_invalid_certs)
            .finish_non_exhaustive()
    }
}

impl TlsContext {
    /// Builds a context trusting the platform's root certificates.
    ///
    /// With `accept_invalid_certs` set, certificate verification is turned
    /// off entirely. Only useful against test relays with self-signed
    /// certificates.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::TlsError` if a native certificate is rejected by
    /// the root store.
    pub fn new(accept_invalid_certs: bool) -> Result<Self> {
        let mut root_store = RootCertStore::empty();

        let native = rustls_native_certs::load_native_certs();
        for cert in native.certs {
            root_store
                .add(cert)
                .map_err(|e| ClientError::TlsError(format!("Failed to add certificate: {e}")))?;
        }
        if !native.errors.is_empty() {
            tracing::warn!(errors = ?native.errors, "Some native certificates could not be loaded");
        }

        let mut config = ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth();

        if accept_invalid_certs {
            tracing::warn!("TLS certificate verification is disabled");
            config
                .dangerous()
                .set_certificate_verifier(Arc::new(NoVerifier));
        }

        Ok(Self {
            connector: TlsConnector::from(Arc::new(config)),
            accept_invalid_certs,
        })
    }

    pub const fn accepts_invalid_certs(&self) -> bool {
        self.accept_invalid_certs
    }

    async fn handshake(&self, host: &str, stream: TcpStream) -> Result<TlsStream<TcpStream>> {
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|e| ClientError::InvalidServerName(format!("{host}: {e}")))?;

        self.connector
            .connect(server_name, stream)
            .await
            .map_err(|e| ClientError::TlsError(e.to_string()))
    }
}

/// A connection that is either plain TCP or TLS-wrapped.
pub(super) enum ClientConnection {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl ClientConnection {
    pub(super) async fn plain(host: &str, port: u16) -> Result<Self> {
        Ok(Self::Plain(TcpStream::connect((host, port)).await?))
    }

    /// Connects and performs the TLS handshake before any SMTP traffic.
    pub(super) async fn tls(host: &str, port: u16, tls: &TlsContext) -> Result<Self> {
        let stream = TcpStream::connect((host, port)).await?;
        Ok(Self::Tls(Box::new(tls.handshake(host, stream).await?)))
    }

    pub(super) const fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }

    pub(super) async fn send(&mut self, data: &[u8]) -> Result<()> {
        match self {
            Self::Plain(stream) => stream.write_all(data).await?,
            Self::Tls(stream) => stream.write_all(data).await?,
        }
        Ok(())
    }

    pub(super) async fn flush(&mut self) -> Result<()> {
        match self {
            Self::Plain(stream) => stream.flush().await?,
            Self::Tls(stream) => stream.flush().await?,
        }
        Ok(())
    }

    /// Reads whatever is available. A zero-length read means the peer hung up.
    pub(super) async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = match self {
            Self::Plain(stream) => stream.read(buf).await?,
            Self::Tls(stream) => stream.read(buf).await?,
        };
        if n == 0 {
            return Err(ClientError::ConnectionClosed);
        }
        Ok(n)
    }

    /// Upgrades a plain connection in place (STARTTLS).
    pub(super) async fn upgrade(self, host: &str, tls: &TlsContext) -> Result<Self> {
        match self {
            Self::Plain(stream) => Ok(Self::Tls(Box::new(tls.handshake(host, stream).await?))),
            Self::Tls(_) => Err(ClientError::TlsError(
                "Connection is already TLS".to_string(),
            )),
        }
    }
}

/// Accepts any server certificate.
#[derive(Debug)]
struct NoVerifier;

impl ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::ED25519,
        ]
    }
}
