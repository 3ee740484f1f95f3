//! Trust-anchor installation from `<certs>/root`.

use std::fs;
use std::path::Path;

use tracing::{debug, info};

use crate::cert::CERTIFICATE_EXTENSION;
use crate::pairing::ROOT_CERTIFICATES_DIR;
use crate::store::{CertificateStore, StoreName};

/// Extension of certificate bundles, installed without a presence check.
pub const BUNDLE_EXTENSION: &str = "p7b";

/// Counts from one trust-anchor pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RootsReport {
    pub installed: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Installs the trust anchors found directly under `<certs_dir>/root`.
///
/// Bundles are always installed. Single certificates are skipped only when
/// the trusted-roots store is known to hold them; a failed presence check
/// still installs. Nothing here aborts the run.
pub fn install_root_certificates<S: CertificateStore + ?Sized>(store: &S, certs_dir: &Path) -> RootsReport {
    let mut report = RootsReport::default();
    let root_dir = certs_dir.join(ROOT_CERTIFICATES_DIR);
    let entries = match fs::read_dir(&root_dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("No root certificates folder [{}]: {e}", root_dir.display());
            return report;
        }
    };

    let mut files: Vec<_> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_ok_and(|t| t.is_file()))
        .map(|entry| entry.path())
        .collect();
    files.sort();

    for path in files {
        let Some(ext) = path.extension().and_then(|ext| ext.to_str()) else {
            continue;
        };
        if ext == CERTIFICATE_EXTENSION {
            match store
                .thumbprint_of(&path)
                .and_then(|thumbprint| store.is_certificate_in_store(&thumbprint, StoreName::Root))
            {
                Ok(true) => {
                    debug!("Root certificate [{}] already installed", path.display());
                    report.skipped += 1;
                    continue;
                }
                Ok(false) => {}
                Err(e) => debug!("Cant check root certificate [{}], installing anyway: {e}", path.display()),
            }
        } else if ext != BUNDLE_EXTENSION {
            continue;
        }

        match store.install_root_certificate(&path) {
            Ok(()) => {
                debug!("Root certificate [{}] installed", path.display());
                report.installed += 1;
            }
            Err(e) => {
                debug!("Cant install root certificate [{}]: {e}", path.display());
                report.failed += 1;
            }
        }
    }

    if report.installed > 0 {
        info!("Root certificates installed: {}", report.installed);
    }
    report
}
