//! Discovers certificate/container pairs on disk.
//!
//! Certificates (`*.cer`) and folder containers (directories holding
//! `header.key`) are matched by their short public-key fingerprint, so file
//! names play no part. Any directory named `root` is skipped: it holds
//! trust anchors, not personal certificates.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::cert::CERTIFICATE_EXTENSION;
use crate::error::Result;
use crate::store::{CONTAINER_HEADER_FILE, CertificateStore};

/// Directory name reserved for trust-anchor certificates.
pub const ROOT_CERTIFICATES_DIR: &str = "root";

/// A certificate and the container holding its private key.
///
/// Both paths are relative to the directory that was searched.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct SignaturePair {
    pub certificate: PathBuf,
    pub container: PathBuf,
}

/// Walks `root` and pairs certificates with containers.
///
/// Best effort: unreadable entries, CA certificates, standard-algorithm keys
/// and items without a counterpart are logged at debug level and skipped.
/// When two items share a fingerprint the first one in path order is kept.
///
/// # Arguments
/// * `root` - The directory to search.
/// * `store` - Supplies certificate parsing and fingerprint derivation.
///
/// # Returns
/// Pairs sorted by certificate path.
pub fn find_pairs<S: CertificateStore + ?Sized>(root: &Path, store: &S) -> Result<Vec<SignaturePair>> {
    let mut certificates = Vec::new();
    let mut containers = Vec::new();
    collect(root, &mut certificates, &mut containers)?;
    certificates.sort();
    containers.sort();

    let certificate_keys = certificate_fingerprints(&certificates, store);
    let container_keys = container_fingerprints(&containers, store);
    debug!("Certificate count: {}", certificate_keys.len());
    debug!("Container count: {}", container_keys.len());

    let mut pairs = Vec::new();
    for (fingerprint, certificate) in &certificate_keys {
        let Some(container) = container_keys.get(fingerprint) else {
            debug!("Pair not found for {fingerprint}, {}", certificate.display());
            continue;
        };
        let (Ok(certificate), Ok(container)) = (certificate.strip_prefix(root), container.strip_prefix(root)) else {
            debug!("Pair {fingerprint} lies outside {}", root.display());
            continue;
        };
        pairs.push(SignaturePair {
            certificate: certificate.to_path_buf(),
            container: container.to_path_buf(),
        });
    }
    for (fingerprint, container) in &container_keys {
        if !certificate_keys.contains_key(fingerprint) {
            debug!("Pair not found for {fingerprint}, {}", container.display());
        }
    }

    pairs.sort();
    debug!("Found {} pair", pairs.len());
    Ok(pairs)
}

fn collect(dir: &Path, certificates: &mut Vec<PathBuf>, containers: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!("Cant read entry in {}: {e}", dir.display());
                continue;
            }
        };
        let path = entry.path();
        let Ok(file_type) = entry.file_type() else {
            debug!("Cant stat {}", path.display());
            continue;
        };

        if file_type.is_dir() {
            if entry.file_name() == ROOT_CERTIFICATES_DIR {
                continue;
            }
            if let Err(e) = collect(&path, certificates, containers) {
                debug!("Cant walk {}: {e}", path.display());
            }
            continue;
        }

        if entry.file_name() == CONTAINER_HEADER_FILE {
            containers.push(dir.to_path_buf());
        } else if path.extension().is_some_and(|ext| ext == CERTIFICATE_EXTENSION) {
            certificates.push(path);
        }
    }
    Ok(())
}

fn certificate_fingerprints<S: CertificateStore + ?Sized>(
    paths: &[PathBuf],
    store: &S,
) -> BTreeMap<String, PathBuf> {
    let mut keys = BTreeMap::new();
    for path in paths {
        let data = match fs::read(path) {
            Ok(data) => data,
            Err(e) => {
                debug!("Cant read file {}: {e}", path.display());
                continue;
            }
        };
        let certificate = match store.parse_certificate(&data) {
            Ok(certificate) => certificate,
            Err(e) => {
                debug!("Cant parse certificate {}: {e}", path.display());
                continue;
            }
        };
        if certificate.is_ca || certificate.standard_key {
            continue;
        }
        let Some(fingerprint) = store.short_public_key_fingerprint(&certificate) else {
            continue;
        };
        insert_first(&mut keys, fingerprint, path);
    }
    keys
}

fn container_fingerprints<S: CertificateStore + ?Sized>(
    paths: &[PathBuf],
    store: &S,
) -> BTreeMap<String, PathBuf> {
    let mut keys = BTreeMap::new();
    for path in paths {
        let header_path = path.join(CONTAINER_HEADER_FILE);
        let header = match fs::read(&header_path) {
            Ok(header) => header,
            Err(e) => {
                debug!("Cant read container header file {}: {e}", header_path.display());
                continue;
            }
        };
        match store.short_public_key_from_container_header(&header) {
            Ok(fingerprint) => insert_first(&mut keys, fingerprint, path),
            Err(e) => debug!("Cant read public key from {}: {e}", header_path.display()),
        }
    }
    keys
}

fn insert_first(keys: &mut BTreeMap<String, PathBuf>, fingerprint: String, path: &Path) {
    match keys.get(&fingerprint) {
        Some(kept) => warn!(
            "Public key {fingerprint} appears in both {} and {}; keeping the first",
            kept.display(),
            path.display()
        ),
        None => {
            keys.insert(fingerprint, path.to_path_buf());
        }
    }
}
