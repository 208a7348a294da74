//! TLS certificate inspection.
//!
//! Performs a handshake that accepts any server certificate and reads the
//! leaf certificate's fields. This is inspection, not validation: a
//! self-signed or expired certificate is still extracted and classified.

use chrono::{DateTime, Utc};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{self, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use x509_parser::prelude::*;
use x509_parser::public_key::PublicKey;

use crate::db::{Certificate, CertificateStatus};

/// Certificate inspection failures. All of them classify the certificate as `Invalid`.
#[derive(Error, Debug)]
pub enum InspectionError {
    #[error("certificate inspection timed out after {0:?}")]
    Timeout(Duration),
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("invalid server name: {0}")]
    ServerName(String),
    #[error("TLS handshake failed: {0}")]
    Handshake(String),
    #[error("server presented no certificate")]
    NoCertificate,
    #[error("certificate parse failed: {0}")]
    Parse(String),
    #[error("TLS configuration error: {0}")]
    Config(String),
}

/// Fields read from a peer certificate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CertificateInfo {
    pub common_name: String,
    pub issuer: String,
    pub thumbprint: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub algorithm: String,
    pub key_size: u32,
    pub status: CertificateStatus,
}

impl CertificateInfo {
    /// A new, unsaved certificate record observed at `now`.
    pub fn to_certificate(&self, now: DateTime<Utc>) -> Certificate {
        Certificate {
            id: 0,
            common_name: self.common_name.clone(),
            issuer: self.issuer.clone(),
            thumbprint: self.thumbprint.clone(),
            issued_at: self.issued_at,
            expires_at: self.expires_at,
            algorithm: self.algorithm.clone(),
            key_size: self.key_size,
            status: self.status,
            last_checked: Some(now),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Accepts every certificate; signatures on the handshake itself are still checked.
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
        crypto::verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        crypto::verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

/// Reads certificates from TLS endpoints.
#[derive(Clone)]
pub struct CertificateInspector {
    connector: TlsConnector,
}

impl CertificateInspector {
    pub fn new() -> Result<Self, InspectionError> {
        let provider = Arc::new(crypto::ring::default_provider());
        let config = ClientConfig::builder_with_provider(provider.clone())
            .with_safe_default_protocol_versions()
            .map_err(|e| InspectionError::Config(e.to_string()))?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate(provider)))
            .with_no_client_auth();

        Ok(Self {
            connector: TlsConnector::from(Arc::new(config)),
        })
    }

    /// Handshake with `host:port` and extract the leaf certificate.
    ///
    /// The whole exchange (connect and handshake) is bounded by `timeout`.
    pub async fn inspect(
        &self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<CertificateInfo, InspectionError> {
        tokio::time::timeout(timeout, self.handshake(host, port))
            .await
            .map_err(|_| InspectionError::Timeout(timeout))?
    }

    async fn handshake(&self, host: &str, port: u16) -> Result<CertificateInfo, InspectionError> {
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|e| InspectionError::ServerName(format!("{}: {}", host, e)))?;

        let tcp = TcpStream::connect((host, port))
            .await
            .map_err(|e| InspectionError::Connect(format!("{}:{}: {}", host, port, e)))?;

        let tls = self
            .connector
            .connect(server_name, tcp)
            .await
            .map_err(|e| InspectionError::Handshake(e.to_string()))?;

        let (_, session) = tls.get_ref();
        let leaf = session
            .peer_certificates()
            .and_then(|chain| chain.first())
            .ok_or(InspectionError::NoCertificate)?;

        parse_certificate(leaf.as_ref(), Utc::now())
    }
}

/// Extract fields from a DER certificate and classify it against `now`.
pub fn parse_certificate(der: &[u8], now: DateTime<Utc>) -> Result<CertificateInfo, InspectionError> {
    let (_, cert) = parse_x509_certificate(der).map_err(|e| InspectionError::Parse(e.to_string()))?;

    let common_name = cert
        .subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| cert.subject().to_string());

    let validity = cert.validity();
    let issued_at = timestamp(validity.not_before.timestamp())?;
    let expires_at = timestamp(validity.not_after.timestamp())?;

    let key_size = match cert.public_key().parsed() {
        Ok(PublicKey::RSA(rsa)) => rsa.key_size() as u32,
        Ok(PublicKey::EC(ec)) => ec.key_size() as u32,
        _ => 0,
    };

    Ok(CertificateInfo {
        common_name,
        issuer: cert.issuer().to_string(),
        thumbprint: hex::encode_upper(Sha256::digest(der)),
        issued_at,
        expires_at,
        algorithm: signature_algorithm_name(&cert.signature_algorithm.algorithm.to_id_string()),
        key_size,
        status: CertificateStatus::classify(expires_at, now),
    })
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>, InspectionError> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| InspectionError::Parse(format!("timestamp out of range: {}", secs)))
}

fn signature_algorithm_name(oid: &str) -> String {
    let name = match oid {
        "1.2.840.113549.1.1.5" => "sha1WithRSAEncryption",
        "1.2.840.113549.1.1.11" => "sha256WithRSAEncryption",
        "1.2.840.113549.1.1.12" => "sha384WithRSAEncryption",
        "1.2.840.113549.1.1.13" => "sha512WithRSAEncryption",
        "1.2.840.113549.1.1.10" => "rsassa-pss",
        "1.2.840.10045.4.3.2" => "ecdsa-with-SHA256",
        "1.2.840.10045.4.3.3" => "ecdsa-with-SHA384",
        "1.2.840.10045.4.3.4" => "ecdsa-with-SHA512",
        "1.3.101.112" => "ed25519",
        "1.3.101.113" => "ed448",
        other => other,
    };
    name.to_string()
}
