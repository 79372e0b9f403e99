//! CA & Leaf Certificate Mint (component C5).
//!
//! Structurally grounded on `other_examples`' MITM proxy (`..._mitm.rs.rs`),
//! which loads-or-creates a CA and mints one leaf certificate per
//! intercepted host via an `Issuer`. That example is built on `rama`'s
//! `rcgen_rama` fork; Currier stays on the teacher's plain `rustls` stack,
//! so the same load-or-create-CA / mint-per-host shape is reimplemented
//! against stock `rcgen` 0.13 instead.

use crate::error::CaError;
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair, SanType};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use time::{Duration as TimeDuration, OffsetDateTime};

const CA_CERT_FILE: &str = "ca-cert.pem";
const CA_KEY_FILE: &str = "ca-key.pem";
const DEFAULT_LEAF_CACHE_CAPACITY: usize = 1024;

pub struct MintedLeaf {
    pub chain: Vec<CertificateDer<'static>>,
    pub key: PrivateKeyDer<'static>,
}

/// Loads (or creates, on first run) a self-signed root CA under `data_dir`,
/// and mints / caches per-host leaf certificates signed by it.
pub struct CaMint {
    ca_key_pair: KeyPair,
    ca_cert_pem: String,
    cache: Mutex<lru::LruCache<String, (Vec<CertificateDer<'static>>, Vec<u8>)>>,
}

impl CaMint {
    pub fn load_or_create(data_dir: impl AsRef<Path>) -> Result<Self, CaError> {
        let data_dir = data_dir.as_ref();
        fs::create_dir_all(data_dir)?;
        let cert_path = data_dir.join(CA_CERT_FILE);
        let key_path = data_dir.join(CA_KEY_FILE);

        if cert_path.exists() && key_path.exists() {
            let cert_pem = fs::read_to_string(&cert_path)?;
            let key_pem = fs::read_to_string(&key_path)?;
            if is_expired(&cert_pem)? {
                return Self::generate(data_dir, &cert_path, &key_path);
            }
            let key_pair = KeyPair::from_pem(&key_pem)
                .map_err(|e| CaError::InvalidPem(e.to_string()))?;
            return Ok(Self {
                ca_key_pair: key_pair,
                ca_cert_pem: cert_pem,
                cache: Mutex::new(lru::LruCache::new(
                    std::num::NonZeroUsize::new(DEFAULT_LEAF_CACHE_CAPACITY).unwrap(),
                )),
            });
        }

        Self::generate(data_dir, &cert_path, &key_path)
    }

    fn generate(
        _data_dir: &Path,
        cert_path: &Path,
        key_path: &Path,
    ) -> Result<Self, CaError> {

        let key_pair = KeyPair::generate()?;
        let mut params = CertificateParams::new(Vec::new())?;
        params.is_ca = rcgen::IsCa::Ca(rcgen::BasicConstraints::Unconstrained);
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, "Currier Local CA");
        dn.push(DnType::OrganizationName, "Currier");
        params.distinguished_name = dn;
        params.not_before = OffsetDateTime::now_utc() - TimeDuration::hours(1);
        params.not_after = OffsetDateTime::now_utc() + TimeDuration::days(3650);

        let cert = params.self_signed(&key_pair)?;
        let cert_pem = cert.pem();

        write_secret(&cert_path, cert_pem.as_bytes())?;
        write_secret(&key_path, key_pair.serialize_pem().as_bytes())?;

        Ok(Self {
            ca_key_pair: key_pair,
            ca_cert_pem: cert_pem,
            cache: Mutex::new(lru::LruCache::new(
                std::num::NonZeroUsize::new(DEFAULT_LEAF_CACHE_CAPACITY).unwrap(),
            )),
        })
    }

    /// PEM of the root CA certificate, for install into a client trust store.
    pub fn root_cert_pem(&self) -> &str {
        &self.ca_cert_pem
    }

    /// Mint (or fetch from cache) a leaf certificate + chain + key for `host`.
    pub fn leaf_for_host(&self, host: &str) -> Result<MintedLeaf, CaError> {
        if let Some((chain, key_der)) = self.cache.lock().unwrap().get(host).cloned() {
            return Ok(MintedLeaf {
                chain,
                key: PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_der)),
            });
        }

        let leaf_key = KeyPair::generate()?;
        let mut params = CertificateParams::new(vec![host.to_string()])?;
        params.subject_alt_names = vec![SanType::DnsName(host.try_into().map_err(|_| {
            CaError::InvalidPem(format!("invalid DNS name in host: {host}"))
        })?)];
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, host);
        params.distinguished_name = dn;
        params.not_before = OffsetDateTime::now_utc() - TimeDuration::hours(1);
        params.not_after = OffsetDateTime::now_utc() + TimeDuration::days(365);

        let ca_params = CertificateParams::from_ca_cert_pem(&self.ca_cert_pem)
            .map_err(|e| CaError::InvalidPem(e.to_string()))?;
        let ca_cert = ca_params.self_signed(&self.ca_key_pair)?;
        let leaf_cert = params.signed_by(&leaf_key, &ca_cert, &self.ca_key_pair)?;

        let leaf_der = leaf_cert.der().clone();
        let ca_der = ca_cert.der().clone();
        let chain = vec![leaf_der, ca_der];
        let key_der = leaf_key.serialize_der();

        self.cache
            .lock()
            .unwrap()
            .put(host.to_string(), (chain.clone(), key_der.clone()));

        Ok(MintedLeaf {
            chain,
            key: PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_der)),
        })
    }
}

fn write_secret(path: &Path, contents: &[u8]) -> Result<(), CaError> {
    fs::write(path, contents)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let permissions = fs::Permissions::from_mode(0o600);
        fs::set_permissions(path, permissions)?;
    }
    Ok(())
}

/// Parses the stored CA PEM with `x509-parser` and reports whether it has
/// already passed its `not_after` bound, so a stale CA gets regenerated
/// instead of minting leaves that chain up to an expired root.
fn is_expired(cert_pem: &str) -> Result<bool, CaError> {
    let (_, pem) = x509_parser::pem::parse_x509_pem(cert_pem.as_bytes())
        .map_err(|e| CaError::InvalidPem(e.to_string()))?;
    let cert = pem
        .parse_x509()
        .map_err(|e| CaError::InvalidPem(e.to_string()))?;
    Ok(!cert.validity().is_valid())
}
