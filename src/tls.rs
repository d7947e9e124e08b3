//! Self-signed TLS certificate management
//!
//! The certificate and private key live in two PEM files next to the
//! working directory. `kubaru gen-cert` writes them, the server only checks
//! that they exist and loads them once when the listener starts. There is
//! no renewal: run `gen-cert` again when the year is up.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use axum_server::tls_rustls::RustlsConfig;
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose,
    Ia5String, IsCa, KeyPair, KeyUsagePurpose, SanType, SerialNumber, PKCS_ECDSA_P256_SHA256,
};
use time::{Duration, OffsetDateTime};

use crate::error::{KubaruError, Result};

/// Default certificate file.
pub const CERT_FILE: &str = "cert.pem";

/// Default private key file.
pub const KEY_FILE: &str = "key.pem";

/// Hosts put in the certificate when none are given.
pub const DEFAULT_HOSTS: &str = "localhost,127.0.0.1,::1";

/// Organization in the certificate subject.
pub const ORGANIZATION: &str = "Kubaru";

/// Certificate lifetime.
pub const VALIDITY_DAYS: i64 = 365;

/// A generated certificate and its private key, PEM encoded.
#[derive(Debug, Clone)]
pub struct CertificateBundle {
    pub certificate_pem: String,
    /// PKCS#8, unencrypted.
    pub private_key_pem: String,
}

/// Location of the certificate/key pair on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateStore {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

impl Default for CertificateStore {
    fn default() -> Self {
        Self::new(CERT_FILE, KEY_FILE)
    }
}

impl CertificateStore {
    pub fn new(cert_path: impl Into<PathBuf>, key_path: impl Into<PathBuf>) -> Self {
        Self {
            cert_path: cert_path.into(),
            key_path: key_path.into(),
        }
    }

    /// Store with the default file names inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(CERT_FILE), dir.join(KEY_FILE))
    }

    /// Generate a new self-signed certificate for the comma separated
    /// `hosts` and write it to disk, overwriting any existing pair.
    ///
    /// If writing the key fails after the certificate was written, the
    /// certificate file is left behind.
    pub fn generate(&self, hosts: &str) -> Result<CertificateBundle> {
        let bundle = generate_certificate(hosts)?;

        write_pem(&self.cert_path, &bundle.certificate_pem, false)?;
        tracing::info!("Wrote {}", self.cert_path.display());

        write_pem(&self.key_path, &bundle.private_key_pem, true)?;
        tracing::info!("Wrote {}", self.key_path.display());

        Ok(bundle)
    }

    /// Check that both files are present. Does not look at their contents.
    ///
    /// Only a file that does not exist counts as missing; any other error
    /// while checking is returned as is.
    pub fn check_exists(&self) -> Result<()> {
        if self.cert_path.try_exists()? && self.key_path.try_exists()? {
            Ok(())
        } else {
            Err(KubaruError::CertificateMissing {
                cert: self.cert_path.clone(),
                key: self.key_path.clone(),
            })
        }
    }

    /// Load the pair into a rustls server configuration.
    pub async fn load(&self) -> Result<RustlsConfig> {
        install_crypto_provider();
        tracing::info!("Loading TLS certificate from {}", self.cert_path.display());
        tracing::info!("Loading TLS key from {}", self.key_path.display());
        let config = RustlsConfig::from_pem_file(&self.cert_path, &self.key_path).await?;
        Ok(config)
    }
}

/// Install the process-wide rustls crypto provider. Calling it again is a no-op.
pub fn install_crypto_provider() {
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
}

/// Build a self-signed ECDSA P-256 certificate for the given hosts.
pub fn generate_certificate(hosts: &str) -> Result<CertificateBundle> {
    let key_pair = KeyPair::generate_for(&PKCS_ECDSA_P256_SHA256)?;

    let mut params = CertificateParams::default();

    let serial: [u8; 16] = rand::random();
    params.serial_number = Some(SerialNumber::from_slice(&serial));

    let mut subject = DistinguishedName::new();
    subject.push(DnType::OrganizationName, ORGANIZATION);
    params.distinguished_name = subject;

    let not_before = OffsetDateTime::now_utc();
    params.not_before = not_before;
    params.not_after = not_before + Duration::days(VALIDITY_DAYS);

    params.key_usages = vec![
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::KeyCertSign,
    ];
    params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.subject_alt_names = parse_hosts(hosts)?;

    let cert = params.self_signed(&key_pair)?;

    Ok(CertificateBundle {
        certificate_pem: cert.pem(),
        private_key_pem: key_pair.serialize_pem(),
    })
}

/// Turn a comma separated host list into SAN entries. IP literals become
/// IP SANs, everything else a DNS name.
pub fn parse_hosts(hosts: &str) -> Result<Vec<SanType>> {
    let mut names = Vec::new();
    for host in hosts.split(',').map(str::trim).filter(|h| !h.is_empty()) {
        match host.parse::<IpAddr>() {
            Ok(ip) => names.push(SanType::IpAddress(ip)),
            Err(_) => names.push(SanType::DnsName(Ia5String::try_from(host)?)),
        }
    }

    if names.is_empty() {
        return Err(KubaruError::validation("no hosts given for the certificate"));
    }
    Ok(names)
}

fn write_pem(path: &Path, contents: &str, private: bool) -> io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);

    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        if private {
            options.mode(0o600);
        }
    }
    #[cfg(not(unix))]
    let _ = private;

    let mut file = options.open(path).map_err(|e| {
        io::Error::new(
            e.kind(),
            format!("Failed to open {} for writing: {}", path.display(), e),
        )
    })?;
    file.write_all(contents.as_bytes()).map_err(|e| {
        io::Error::new(
            e.kind(),
            format!("Failed to write {}: {}", path.display(), e),
        )
    })?;
    file.sync_all()
}
