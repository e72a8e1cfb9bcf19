//! Self-signed server certificates and the rustls config that serves them.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use chrono::{Datelike, Duration, NaiveDate};
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair, date_time_ymd};
use rustls::ServerConfig;
use rustls::crypto::ring::default_provider;
use rustls_pki_types::{CertificateDer, PrivateKeyDer};

/// PEM encoded certificate and its private key.
pub struct CertPem {
    pub cert: String,
    pub key: String,
}

fn ymd(date: NaiveDate) -> Result<(i32, u8, u8)> {
    let month = u8::try_from(date.month()).context("month out of range")?;
    let day = u8::try_from(date.day()).context("day out of range")?;
    Ok((date.year(), month, day))
}

/// Generates a self-signed server certificate for `hosts` (DNS names or IP
/// addresses), valid from `today` for `valid_days`.
pub fn generate_self_signed(hosts: &[String], today: NaiveDate, valid_days: i64) -> Result<CertPem> {
    if hosts.is_empty() {
        bail!("at least one host name is required");
    }
    if valid_days < 1 {
        bail!("validity must be at least one day");
    }

    let mut params = CertificateParams::new(hosts.to_vec())?;
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, hosts[0].as_str());
    dn.push(DnType::OrganizationName, "Absensi");
    params.distinguished_name = dn;
    let (y, m, d) = ymd(today)?;
    params.not_before = date_time_ymd(y, m, d);
    let (y, m, d) = ymd(today + Duration::days(valid_days))?;
    params.not_after = date_time_ymd(y, m, d);

    let key_pair = KeyPair::generate()?;
    let cert = params.self_signed(&key_pair)?;

    Ok(CertPem {
        cert: cert.pem(),
        key: key_pair.serialize_pem(),
    })
}

fn parse_certs(pem: &[u8]) -> Result<Vec<CertificateDer<'static>>> {
    let certs = rustls_pemfile::certs(&mut &pem[..])
        .collect::<Result<Vec<_>, _>>()
        .context("invalid certificate PEM")?;
    if certs.is_empty() {
        bail!("no certificate found");
    }
    Ok(certs)
}

fn parse_key(pem: &[u8]) -> Result<PrivateKeyDer<'static>> {
    rustls_pemfile::private_key(&mut &pem[..])
        .context("invalid private key PEM")?
        .ok_or_else(|| anyhow!("no private key found"))
}

/// Builds the HTTPS server config from PEM strings.
pub fn server_config_from_pem(cert_pem: &[u8], key_pem: &[u8]) -> Result<ServerConfig> {
    let certs = parse_certs(cert_pem)?;
    let key = parse_key(key_pem)?;

    ServerConfig::builder_with_provider(Arc::new(default_provider()))
        .with_safe_default_protocol_versions()
        .context("unsupported TLS protocol versions")?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .context("certificate and key do not match")
}

pub fn load_server_config(cert_path: &Path, key_path: &Path) -> Result<ServerConfig> {
    let cert_pem = std::fs::read(cert_path)
        .with_context(|| format!("cannot read {}", cert_path.display()))?;
    let key_pem =
        std::fs::read(key_path).with_context(|| format!("cannot read {}", key_path.display()))?;
    server_config_from_pem(&cert_pem, &key_pem)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
    }

    fn hosts() -> Vec<String> {
        vec!["absensi.local".to_string(), "127.0.0.1".to_string()]
    }

    #[test]
    fn generated_pair_loads_into_rustls() {
        let pem = generate_self_signed(&hosts(), today(), 825).unwrap();
        assert!(pem.cert.starts_with("-----BEGIN CERTIFICATE-----"));
        assert!(pem.key.contains("PRIVATE KEY"));
        server_config_from_pem(pem.cert.as_bytes(), pem.key.as_bytes()).unwrap();
    }

    #[test]
    fn mismatched_key_is_rejected() {
        let first = generate_self_signed(&hosts(), today(), 30).unwrap();
        let second = generate_self_signed(&hosts(), today(), 30).unwrap();
        assert!(server_config_from_pem(first.cert.as_bytes(), second.key.as_bytes()).is_err());
    }

    #[test]
    fn needs_hosts_and_validity() {
        assert!(generate_self_signed(&[], today(), 30).is_err());
        assert!(generate_self_signed(&hosts(), today(), 0).is_err());
        assert!(server_config_from_pem(b"", b"").is_err());
    }

    #[test]
    fn loads_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let pem = generate_self_signed(&hosts(), today(), 30).unwrap();
        let cert = dir.path().join("server.crt");
        let key = dir.path().join("server.key");
        std::fs::write(&cert, pem.cert).unwrap();
        std::fs::write(&key, pem.key).unwrap();

        load_server_config(&cert, &key).unwrap();
        assert!(load_server_config(&dir.path().join("missing.crt"), &key).is_err());
    }
}
