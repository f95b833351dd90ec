//! Compiling `HostConfig` material into a `rustls` server certificate
//! (spec.md §4.3, §6 "TLS"). Two sources: caller-supplied PEM chain+key,
//! or a freshly minted self-signed RSA-4096 pair.

use std::sync::Arc;

use rsa::pkcs8::EncodePrivateKey;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::sign::CertifiedKey;
use time::{Duration, OffsetDateTime};

use crate::error::ResourceError;

/// Validity window for a self-signed pair (spec.md §4.3: "~100 days").
const SELF_SIGNED_VALIDITY_DAYS: i64 = 100;
const SELF_SIGNED_KEY_BITS: usize = 4096;

/// Structural validation for a certificate chain: one or more
/// `-----BEGIN CERTIFICATE-----` PEM blocks (spec.md §6).
pub fn parse_certificate_chain(pem: &str) -> Result<Vec<CertificateDer<'static>>, ResourceError> {
    let certs: Vec<_> = rustls_pemfile::certs(&mut pem.as_bytes())
        .collect::<Result<_, _>>()
        .map_err(|e| ResourceError::InvalidCertificate(e.to_string()))?;
    if certs.is_empty() {
        return Err(ResourceError::InvalidCertificate("no PEM certificate blocks found".to_string()));
    }
    Ok(certs)
}

/// Structural validation for a private key: PKCS#8, PKCS#1 (RSA), or SEC1
/// (EC), per spec.md §6.
pub fn parse_private_key(pem: &str) -> Result<PrivateKeyDer<'static>, ResourceError> {
    rustls_pemfile::private_key(&mut pem.as_bytes())
        .map_err(|e| ResourceError::InvalidPrivateKey(e.to_string()))?
        .ok_or_else(|| ResourceError::InvalidPrivateKey("no private key PEM block found".to_string()))
}

/// Builds a `rustls` `CertifiedKey` from caller-supplied PEM material.
pub fn build_certified_key(cert_pem: &str, key_pem: &str) -> Result<Arc<CertifiedKey>, ResourceError> {
    let chain = parse_certificate_chain(cert_pem)?;
    let key = parse_private_key(key_pem)?;
    let signing_key = rustls::crypto::ring::sign::any_supported_type(&key)
        .map_err(|e| ResourceError::InvalidPrivateKey(e.to_string()))?;
    Ok(Arc::new(CertifiedKey::new(chain, signing_key)))
}

/// Generates a single RSA-4096 self-signed certificate valid for ~100
/// days, with `subjectAltName` entries covering every configured hostname
/// or IP literal (spec.md §4.3, §6). Runs on a blocking thread: RSA-4096
/// key generation takes tens to hundreds of milliseconds, too long for a
/// cooperative executor's turn (spec.md §5 "Suspension points" lists
/// `HostItem.getSecureContext` as one of the few operations allowed to
/// suspend for exactly this reason).
pub async fn generate_self_signed(hostnames: Vec<String>) -> Result<Arc<CertifiedKey>, ResourceError> {
    tokio::task::spawn_blocking(move || generate_self_signed_blocking(&hostnames))
        .await
        .map_err(|e| ResourceError::CertGeneration(e.to_string()))?
}

fn generate_self_signed_blocking(hostnames: &[String]) -> Result<Arc<CertifiedKey>, ResourceError> {
    let mut rng = rand::rngs::OsRng;
    let rsa_key = rsa::RsaPrivateKey::new(&mut rng, SELF_SIGNED_KEY_BITS)
        .map_err(|e| ResourceError::CertGeneration(e.to_string()))?;
    let pkcs8_der =
        rsa_key.to_pkcs8_der().map_err(|e| ResourceError::CertGeneration(e.to_string()))?;
    let key_pair = rcgen::KeyPair::from_der_and_sign_algo(&pkcs8_der.as_bytes().into(), &rcgen::PKCS_RSA_SHA256)
        .map_err(|e| ResourceError::CertGeneration(e.to_string()))?;

    let mut params = rcgen::CertificateParams::new(Vec::new())
        .map_err(|e| ResourceError::CertGeneration(e.to_string()))?;
    params.not_before = OffsetDateTime::now_utc();
    params.not_after = params.not_before + Duration::days(SELF_SIGNED_VALIDITY_DAYS);
    params.distinguished_name = {
        let mut dn = rcgen::DistinguishedName::new();
        dn.push(rcgen::DnType::CommonName, hostnames.first().map_or("localhost", String::as_str));
        dn
    };
    params.subject_alt_names = hostnames
        .iter()
        .map(|name| {
            if let Ok(ip) = name.parse::<std::net::IpAddr>() {
                rcgen::SanType::IpAddress(ip)
            } else {
                rcgen::SanType::DnsName(name.clone().try_into().unwrap_or_else(|_| {
                    "localhost".to_string().try_into().expect("literal is a valid Ia5String")
                }))
            }
        })
        .collect();

    let cert = params
        .self_signed(&key_pair)
        .map_err(|e| ResourceError::CertGeneration(e.to_string()))?;

    let cert_der = CertificateDer::from(cert.der().to_vec());
    let key_der = PrivateKeyDer::try_from(pkcs8_der.as_bytes().to_vec())
        .map_err(|e| ResourceError::CertGeneration(e.to_string()))?;
    let signing_key = rustls::crypto::ring::sign::any_supported_type(&key_der)
        .map_err(|e| ResourceError::InvalidPrivateKey(e.to_string()))?;
    Ok(Arc::new(CertifiedKey::new(vec![cert_der], signing_key)))
}
