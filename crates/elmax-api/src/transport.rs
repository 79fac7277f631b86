// Shared transport configuration for the REST client and the push channel.
//
// Both sides honour the same TLS settings; the HTTP side goes through
// reqwest, the WebSocket side through a rustls connector handed to
// tokio-tungstenite.

use std::net::TcpStream;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, verify_tls12_signature, verify_tls13_signature};
use rustls::{CertificateError, DigitallySignedStruct, SignatureScheme};
use rustls_pki_types::pem::PemObject;
use rustls_pki_types::{CertificateDer, ServerName, UnixTime};
use tokio_tungstenite::Connector;
use tracing::debug;

use crate::error::Error;

/// `User-Agent` sent on every request.
pub const USER_AGENT: &str = concat!("elmax-api/", env!("CARGO_PKG_VERSION"));

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// TLS verification mode.
#[derive(Debug, Clone, Default)]
pub enum TlsMode {
    /// Use the bundled web PKI roots.
    #[default]
    System,
    /// Trust only the CA certificate(s) in the given PEM file.
    CustomCa(PathBuf),
    /// Trust exactly this server certificate (PEM), whatever host name it
    /// was issued for. Meant for local panels with self-signed certificates,
    /// see [`retrieve_server_certificate`].
    PinnedCertificate(String),
    /// Accept any certificate.
    DangerAcceptInvalid,
}

/// Shared transport configuration for building HTTP and WebSocket clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub tls: TlsMode,
    pub timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            tls: TlsMode::System,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        let mut builder = reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(USER_AGENT);

        match &self.tls {
            TlsMode::System => {}
            TlsMode::CustomCa(path) => {
                let cert_pem = std::fs::read(path)
                    .map_err(|e| Error::Tls(format!("failed to read CA cert: {e}")))?;
                let cert = reqwest::Certificate::from_pem(&cert_pem)
                    .map_err(|e| Error::Tls(format!("invalid CA cert: {e}")))?;
                builder = builder.add_root_certificate(cert);
            }
            TlsMode::PinnedCertificate(pem) => {
                builder = builder.use_preconfigured_tls(pinned_tls_config(pem)?);
            }
            TlsMode::DangerAcceptInvalid => {
                builder = builder.danger_accept_invalid_certs(true);
            }
        }

        builder
            .build()
            .map_err(|e| Error::Tls(format!("failed to build HTTP client: {e}")))
    }

    /// Build the TLS connector for the push WebSocket.
    ///
    /// `None` means tokio-tungstenite's default connector (web PKI roots).
    pub fn websocket_connector(&self) -> Result<Option<Connector>, Error> {
        match &self.tls {
            TlsMode::System => Ok(None),
            TlsMode::CustomCa(path) => {
                let certs = CertificateDer::pem_file_iter(path)
                    .map_err(|e| Error::Tls(format!("failed to read CA cert: {e}")))?
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|e| Error::Tls(format!("invalid CA cert: {e}")))?;

                let mut roots = rustls::RootCertStore::empty();
                let (added, _ignored) = roots.add_parsable_certificates(certs);
                if added == 0 {
                    return Err(Error::Tls(format!(
                        "no usable CA certificate in {}",
                        path.display()
                    )));
                }

                let config = rustls::ClientConfig::builder_with_provider(crypto_provider())
                    .with_safe_default_protocol_versions()
                    .map_err(|e| Error::Tls(format!("unsupported TLS setup: {e}")))?
                    .with_root_certificates(roots)
                    .with_no_client_auth();
                Ok(Some(Connector::Rustls(Arc::new(config))))
            }
            TlsMode::PinnedCertificate(pem) => {
                Ok(Some(Connector::Rustls(Arc::new(pinned_tls_config(pem)?))))
            }
            TlsMode::DangerAcceptInvalid => Ok(Some(Connector::Rustls(Arc::new(
                custom_verifier_config(AcceptServer::Any)?,
            )))),
        }
    }
}

// ── Custom certificate checks ───────────────────────────────────────

fn crypto_provider() -> Arc<CryptoProvider> {
    CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::ring::default_provider()))
}

#[derive(Debug)]
enum AcceptServer {
    Any,
    Exactly(CertificateDer<'static>),
}

/// Server certificate check that skips chain and host name validation.
/// Handshake signatures are still verified.
#[derive(Debug)]
struct FixedServerVerifier {
    accept: AcceptServer,
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for FixedServerVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        match &self.accept {
            AcceptServer::Exactly(pinned) if pinned[..] != end_entity[..] => Err(
                rustls::Error::InvalidCertificate(CertificateError::UnknownIssuer),
            ),
            _ => Ok(ServerCertVerified::assertion()),
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

fn custom_verifier_config(accept: AcceptServer) -> Result<rustls::ClientConfig, Error> {
    let provider = crypto_provider();
    let verifier = Arc::new(FixedServerVerifier {
        accept,
        provider: Arc::clone(&provider),
    });
    Ok(rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::Tls(format!("unsupported TLS setup: {e}")))?
        .dangerous()
        .with_custom_certificate_verifier(verifier)
        .with_no_client_auth())
}

fn pinned_tls_config(pem: &str) -> Result<rustls::ClientConfig, Error> {
    let cert = CertificateDer::from_pem_slice(pem.as_bytes())
        .map_err(|e| Error::Tls(format!("invalid pinned certificate: {e}")))?;
    custom_verifier_config(AcceptServer::Exactly(cert))
}

// ── Certificate retrieval ───────────────────────────────────────────

/// Fetch the certificate a server presents, as PEM, without validating it.
///
/// Local panels use self-signed certificates; pass the result to
/// [`TlsMode::PinnedCertificate`] to trust that panel and nothing else.
pub async fn retrieve_server_certificate(host: &str, port: u16) -> Result<String, Error> {
    let host = host.to_owned();
    tokio::task::spawn_blocking(move || fetch_leaf_certificate(&host, port, DEFAULT_TIMEOUT))
        .await
        .map_err(|e| Error::Tls(format!("certificate retrieval task failed: {e}")))?
}

fn fetch_leaf_certificate(host: &str, port: u16, timeout: Duration) -> Result<String, Error> {
    debug!(host, port, "retrieving server certificate");

    let server_name = ServerName::try_from(host.to_owned())
        .map_err(|e| Error::Tls(format!("invalid host name '{host}': {e}")))?;
    let config = Arc::new(custom_verifier_config(AcceptServer::Any)?);
    let mut conn = rustls::ClientConnection::new(config, server_name)
        .map_err(|e| Error::Tls(format!("TLS setup failed: {e}")))?;

    let mut sock = TcpStream::connect((host, port))
        .map_err(|e| Error::Tls(format!("cannot reach {host}:{port}: {e}")))?;
    sock.set_read_timeout(Some(timeout))
        .and_then(|()| sock.set_write_timeout(Some(timeout)))
        .map_err(|e| Error::Tls(format!("socket setup failed: {e}")))?;

    while conn.is_handshaking() {
        conn.complete_io(&mut sock)
            .map_err(|e| Error::Tls(format!("TLS handshake with {host}:{port} failed: {e}")))?;
    }

    let leaf = conn
        .peer_certificates()
        .and_then(|certs| certs.first())
        .ok_or_else(|| Error::Tls(format!("{host}:{port} presented no certificate")))?;
    let pem = pem_encode(leaf);

    conn.send_close_notify();
    let _ = conn.complete_io(&mut sock);
    Ok(pem)
}

fn pem_encode(der: &[u8]) -> String {
    let body = STANDARD.encode(der);
    let mut pem = String::from("-----BEGIN CERTIFICATE-----\n");
    for line in body.as_bytes().chunks(64) {
        pem.push_str(&String::from_utf8_lossy(line));
        pem.push('\n');
    }
    pem.push_str("-----END CERTIFICATE-----\n");
    pem
}
