//! Client TLS material for the ADS channel.
//!
//! The client always presents a certificate (mutual TLS). Server certificate
//! verification is controlled by [`TlsConfig::with_insecure_skip_verify`]
//! and is skipped by default: the client is a diagnostic tool pointed at
//! control planes whose serving certificates rarely match the dialed name.

use std::fmt;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use tokio_rustls::TlsConnector;
use tokio_rustls::rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use tokio_rustls::rustls::crypto::{
    CryptoProvider, ring, verify_tls12_signature, verify_tls13_signature,
};
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use tokio_rustls::rustls::{
    self, ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme,
};

use crate::error::{Error, Result};

/// File holding the client certificate chain inside a certificate directory.
pub const CERT_CHAIN_FILE: &str = "cert-chain.pem";
/// File holding the client private key inside a certificate directory.
pub const KEY_FILE: &str = "key.pem";
/// File holding the trust anchors inside a certificate directory.
pub const ROOT_CERT_FILE: &str = "root-cert.pem";

const ALPN_H2: &[u8] = b"h2";

/// Client certificate, private key and trust anchors for the ADS channel.
#[derive(Clone)]
pub struct TlsConfig {
    certs: Vec<CertificateDer<'static>>,
    key: Arc<PrivateKeyDer<'static>>,
    roots: RootCertStore,
    insecure_skip_verify: bool,
    server_name: Option<String>,
}

impl TlsConfig {
    /// Load `cert-chain.pem`, `key.pem` and `root-cert.pem` from `dir`.
    ///
    /// This is the layout istio mounts into sidecars.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let read = |name: &str| {
            let path = dir.join(name);
            std::fs::read(&path).map_err(|source| Error::ReadFile { path, source })
        };

        Self::from_pem(read(CERT_CHAIN_FILE)?, read(KEY_FILE)?, read(ROOT_CERT_FILE)?)
    }

    /// Parse PEM encoded material.
    ///
    /// `cert` must hold at least one certificate, `key` a PKCS#1, PKCS#8 or
    /// SEC1 private key, and `ca` at least one trust anchor.
    pub fn from_pem(
        cert: impl AsRef<[u8]>,
        key: impl AsRef<[u8]>,
        ca: impl AsRef<[u8]>,
    ) -> Result<Self> {
        let certs = parse_certs(cert.as_ref())?;
        if certs.is_empty() {
            return Err(Error::Tls("no client certificate found".to_string()));
        }
        let key = parse_key(key.as_ref())?;

        let mut roots = RootCertStore::empty();
        let (added, _ignored) = roots.add_parsable_certificates(parse_certs(ca.as_ref())?);
        if added == 0 {
            return Err(Error::Tls("no trust anchors found".to_string()));
        }

        Ok(Self {
            certs,
            key: Arc::new(key),
            roots,
            insecure_skip_verify: true,
            server_name: None,
        })
    }

    /// Whether to accept any server certificate. Defaults to `true`.
    ///
    /// When `false` the server chain is verified against the loaded trust
    /// anchors and the server name.
    pub fn with_insecure_skip_verify(mut self, skip: bool) -> Self {
        self.insecure_skip_verify = skip;
        self
    }

    /// Override the server name used for SNI and verification. Defaults to
    /// the host of the server URI.
    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = Some(name.into());
        self
    }

    /// Returns true if server certificates are not verified.
    pub fn insecure_skip_verify(&self) -> bool {
        self.insecure_skip_verify
    }

    /// Resolve the name to present for a connection to `host`.
    pub(crate) fn server_name(&self, host: &str) -> Result<ServerName<'static>> {
        let name = self
            .server_name
            .as_deref()
            .unwrap_or(host)
            .trim_start_matches('[')
            .trim_end_matches(']');
        ServerName::try_from(name.to_string())
            .map_err(|e| Error::Tls(format!("invalid server name {name:?}: {e}")))
    }

    /// Build the rustls client configuration.
    pub fn client_config(&self) -> Result<ClientConfig> {
        let provider = Arc::new(ring::default_provider());
        let builder = ClientConfig::builder_with_provider(provider.clone())
            .with_safe_default_protocol_versions()
            .map_err(|e| Error::Tls(e.to_string()))?;

        let builder = if self.insecure_skip_verify {
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(SkipServerVerification { provider }))
        } else {
            builder.with_root_certificates(self.roots.clone())
        };

        let mut config = builder
            .with_client_auth_cert(self.certs.clone(), self.key.clone_key())
            .map_err(|e| Error::Tls(e.to_string()))?;
        config.alpn_protocols = vec![ALPN_H2.to_vec()];
        Ok(config)
    }

    pub(crate) fn connector(&self) -> Result<TlsConnector> {
        Ok(TlsConnector::from(Arc::new(self.client_config()?)))
    }
}

impl fmt::Debug for TlsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsConfig")
            .field("certs", &self.certs.len())
            .field("roots", &self.roots.len())
            .field("insecure_skip_verify", &self.insecure_skip_verify)
            .field("server_name", &self.server_name)
            .finish_non_exhaustive()
    }
}

fn parse_certs(pem: &[u8]) -> Result<Vec<CertificateDer<'static>>> {
    let mut reader = BufReader::new(pem);
    rustls_pemfile::certs(&mut reader)
        .map(|result| result.map_err(|e| Error::Tls(e.to_string())))
        .collect()
}

fn parse_key(pem: &[u8]) -> Result<PrivateKeyDer<'static>> {
    let mut reader = BufReader::new(pem);
    loop {
        match rustls_pemfile::read_one(&mut reader).map_err(|e| Error::Tls(e.to_string()))? {
            Some(rustls_pemfile::Item::Pkcs1Key(key)) => return Ok(key.into()),
            Some(rustls_pemfile::Item::Pkcs8Key(key)) => return Ok(key.into()),
            Some(rustls_pemfile::Item::Sec1Key(key)) => return Ok(key.into()),
            None => return Err(Error::Tls("no private key found".to_string())),
            _ => continue,
        }
    }
}

/// Accepts any server certificate while still checking handshake signatures.
#[derive(Debug)]
struct SkipServerVerification {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for SkipServerVerification {
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
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
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
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
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
