//! Leaf certificate minting and the certificate cache.

use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use lru::LruCache;
use rand::RngCore;
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair, SerialNumber};
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use rsa::RsaPrivateKey;
use std::sync::Arc;
use tracing::info;

/// One issued certificate: what the SDS response carries, plus the serial for
/// cache-identity checks.
#[derive(Debug, Clone)]
pub struct IssuedCert {
    /// Leaf PEM followed by the intermediate PEM.
    pub chain_pem: String,
    pub key_pem: String,
    pub serial_hex: String,
}

struct CacheEntry {
    cert: Arc<IssuedCert>,
    issued_at: Instant,
}

/// Intermediate CA plus the per-SNI certificate cache.
///
/// The cache mutex is held only for lookup and insert; RSA key generation is
/// slow and runs outside it. Two concurrent misses for the same name race,
/// last write wins; both certificates verify, the cache just keeps one.
pub struct CertAuthority {
    ca_cert_pem: String,
    ca_cert: rcgen::Certificate,
    ca_key: KeyPair,
    cache: Mutex<LruCache<String, CacheEntry>>,
    cache_ttl: Duration,
}

impl CertAuthority {
    /// Load the intermediate CA material from disk. Missing or unparsable
    /// material is fatal: an SDS endpoint without a CA is misconfigured.
    pub fn load(
        cert_path: &str,
        key_path: &str,
        cache_capacity: usize,
        cache_ttl: Duration,
    ) -> Result<Self> {
        let ca_cert_pem = std::fs::read_to_string(cert_path)
            .with_context(|| format!("failed to read CA certificate {cert_path}"))?;
        let ca_key_pem = std::fs::read_to_string(key_path)
            .with_context(|| format!("failed to read CA key {key_path}"))?;
        let ca_key = KeyPair::from_pem(&ca_key_pem).context("failed to parse CA key")?;
        let ca_params = CertificateParams::from_ca_cert_pem(&ca_cert_pem)
            .context("failed to parse CA certificate")?;
        // rcgen only signs with a Certificate handle; re-issuing the CA params
        // over its own key preserves the issuer DN and key identifiers.
        let ca_cert = ca_params
            .self_signed(&ca_key)
            .context("failed to rebuild CA certificate")?;
        info!("loaded intermediate CA from {cert_path}");
        Ok(Self {
            ca_cert_pem,
            ca_cert,
            ca_key,
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(cache_capacity.max(1)).expect("non-zero cache capacity"),
            )),
            cache_ttl,
        })
    }

    /// Certificate for one SNI name: cached within the TTL window, freshly
    /// minted otherwise.
    pub fn certificate_for(&self, name: &str) -> Result<Arc<IssuedCert>> {
        if let Some(cached) = self.cache_get(name) {
            return Ok(cached);
        }
        let minted = Arc::new(self.mint(name)?);
        self.cache_put(name, Arc::clone(&minted));
        info!("minted certificate for {name} (serial {})", minted.serial_hex);
        Ok(minted)
    }

    fn cache_get(&self, name: &str) -> Option<Arc<IssuedCert>> {
        let mut cache = self.cache.lock().expect("cert cache lock poisoned");
        match cache.get(name) {
            Some(entry) if entry.issued_at.elapsed() < self.cache_ttl => {
                Some(Arc::clone(&entry.cert))
            }
            Some(_) => {
                cache.pop(name);
                None
            }
            None => None,
        }
    }

    fn cache_put(&self, name: &str, cert: Arc<IssuedCert>) {
        let mut cache = self.cache.lock().expect("cert cache lock poisoned");
        cache.put(
            name.to_string(),
            CacheEntry {
                cert,
                issued_at: Instant::now(),
            },
        );
    }

    /// Build a short-lived leaf: 2048-bit RSA key, CN and DNS SAN set to the
    /// requested name, validity [now − 5 min, now + 1 day], random serial.
    fn mint(&self, name: &str) -> Result<IssuedCert> {
        let mut rng = rand::thread_rng();
        let rsa_key =
            RsaPrivateKey::new(&mut rng, 2048).context("failed to generate leaf key")?;
        let key_pem = rsa_key
            .to_pkcs8_pem(LineEnding::LF)
            .context("failed to encode leaf key")?
            .to_string();
        let key_pair = KeyPair::from_pem(&key_pem).context("failed to load leaf key")?;

        let mut serial = [0u8; 16];
        rng.fill_bytes(&mut serial);
        // Positive serial regardless of DER sign interpretation.
        serial[0] &= 0x7f;
        let serial_hex = hex_string(&serial);

        let mut params = CertificateParams::new(vec![name.to_string()])
            .context("failed to build certificate params")?;
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, name);
        params.distinguished_name = dn;
        params.serial_number = Some(SerialNumber::from(serial.to_vec()));
        let now = time::OffsetDateTime::now_utc();
        params.not_before = now - time::Duration::minutes(5);
        params.not_after = now + time::Duration::days(1);

        let cert = params
            .signed_by(&key_pair, &self.ca_cert, &self.ca_key)
            .with_context(|| format!("failed to sign certificate for {name}"))?;

        let mut chain_pem = cert.pem();
        if !chain_pem.ends_with('\n') {
            chain_pem.push('\n');
        }
        chain_pem.push_str(&self.ca_cert_pem);

        Ok(IssuedCert {
            chain_pem,
            key_pem,
            serial_hex,
        })
    }
}

fn hex_string(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}
