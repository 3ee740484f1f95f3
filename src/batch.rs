//! Batch provisioning.
//!
//! The batch installs every entry of a manifest and keeps going past
//! failures. The manifest comes from the first available source:
//!
//! 1. `items` in `settings.json`,
//! 2. the CSV manifest (`data.csv`),
//! 3. certificate/container pairs discovered under the certificates directory.
//!
//! The CSV manifest is `;`-separated with a header row; lines starting with
//! `#` are comments:
//!
//! ```text
//! container;cert;name;password;exportable
//! # folder container, default name pattern
//! ivanov.000;ivanov.cer;;;
//! petrov.pfx;petrov.cer;#subject.surname;1234;false
//! ```

use std::fs::File;
use std::io::Read;
use std::path::Path;

use tracing::{debug, error, info};

use crate::error::{CertMassError, Result};
use crate::install::{InstallOutcome, InstallParams, Installer, is_archive};
use crate::pairing::find_pairs;
use crate::paths::resolve_file_path;
use crate::settings::{DefaultBlock, InstallEntry, Settings};
use crate::store::CertificateStore;

/// Tally of one batch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub installed: usize,
    pub already_installed: usize,
    pub failed: usize,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.installed + self.already_installed + self.failed
    }
}

/// Parses a CSV manifest.
pub fn read_manifest<R: Read>(reader: R) -> Result<Vec<InstallEntry>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut entries = Vec::new();
    for record in reader.deserialize() {
        entries.push(record?);
    }
    Ok(entries)
}

/// Opens and parses the CSV manifest at `path`.
pub fn read_manifest_file(path: &Path) -> Result<Vec<InstallEntry>> {
    let file = File::open(path).map_err(|e| CertMassError::Manifest(format!("{}: {e}", path.display())))?;
    read_manifest(file)
}

/// Picks the manifest according to source precedence.
///
/// # Arguments
/// * `settings` - Loaded settings; non-empty `items` win.
/// * `manifest` - The CSV manifest path, used when it exists.
/// * `certs_dir` - Searched for pairs when neither manifest is present.
/// * `store` - Supplies fingerprints for pair discovery.
pub fn collect_entries<S: CertificateStore + ?Sized>(
    settings: &Settings,
    manifest: &Path,
    certs_dir: &Path,
    store: &S,
) -> Result<Vec<InstallEntry>> {
    if let Some(items) = settings.items() {
        debug!("Using {} entries from settings", items.len());
        return Ok(items.to_vec());
    }
    if manifest.exists() {
        debug!("Using manifest [{}]", manifest.display());
        return read_manifest_file(manifest);
    }
    debug!("No manifest, searching pairs in [{}]", certs_dir.display());
    let pairs = find_pairs(certs_dir, store)?;
    Ok(pairs
        .into_iter()
        .map(|pair| InstallEntry {
            container_path: pair.container.to_string_lossy().into_owned(),
            certificate_path: pair.certificate.to_string_lossy().into_owned(),
            ..InstallEntry::default()
        })
        .collect())
}

/// Turns a manifest entry into install parameters.
///
/// Paths are joined onto `certs_dir`; unset values take the configured defaults.
pub fn apply_defaults(entry: &InstallEntry, defaults: &DefaultBlock, certs_dir: &Path) -> InstallParams {
    let container_path = certs_dir.join(&entry.container_path);
    let certificate_path = certs_dir.join(&entry.certificate_path);

    let container_name = entry
        .name
        .clone()
        .filter(|name| !name.is_empty())
        .or_else(|| defaults.name_pattern.clone());
    let pfx_password = match &entry.pfx_password {
        None if is_archive(&container_path) => defaults.pfx_password.clone(),
        password => password.clone(),
    };

    InstallParams {
        container_path,
        certificate_path,
        container_name,
        pfx_password,
        exportable: entry.exportable.or(defaults.exportable),
    }
}

/// Installs every manifest entry, then absorbs certificates from containers.
///
/// A failing entry is logged and counted; the remaining entries still run.
pub fn run_batch<S: CertificateStore + ?Sized>(
    installer: &Installer<'_, S>,
    store: &S,
    entries: &[InstallEntry],
    defaults: &DefaultBlock,
    certs_dir: &Path,
) -> BatchReport {
    let mut report = BatchReport::default();
    for entry in entries {
        let params = apply_defaults(entry, defaults, certs_dir);
        match installer.install(&params) {
            Ok(InstallOutcome::Installed(_)) => report.installed += 1,
            Ok(InstallOutcome::AlreadyInstalled { .. }) => report.already_installed += 1,
            Err(e) => {
                debug!("Install of [{}] failed: {e}", params.container_path.display());
                report.failed += 1;
            }
        }
    }

    absorb(store);
    info!(
        "Installed: {}, already installed: {}, failed: {}",
        report.installed, report.already_installed, report.failed
    );
    report
}

/// Installs one pair given on the command line.
///
/// Both paths are required and resolved against `certs_dir`. Unlike a batch,
/// any error is returned to the caller.
pub fn install_single<S: CertificateStore + ?Sized>(
    installer: &Installer<'_, S>,
    store: &S,
    certs_dir: &Path,
    params: &InstallParams,
) -> Result<InstallOutcome> {
    let certificate_path = required(&params.certificate_path, "certificate", "--cert")?;
    let container_path = required(&params.container_path, "container", "--cont")?;

    let resolved = InstallParams {
        container_path: resolve_file_path(container_path, certs_dir).inspect_err(|e| error!("{e}"))?,
        certificate_path: resolve_file_path(certificate_path, certs_dir).inspect_err(|e| error!("{e}"))?,
        ..params.clone()
    };
    let outcome = installer.install(&resolved)?;
    absorb(store);
    Ok(outcome)
}

fn required<'p>(path: &'p Path, what: &str, flag: &str) -> Result<&'p Path> {
    if path.as_os_str().is_empty() {
        error!("The {what} path is not set, use {flag}");
        return Err(CertMassError::MissingParameter(what.to_string()));
    }
    Ok(path)
}

fn absorb<S: CertificateStore + ?Sized>(store: &S) {
    if let Err(e) = store.absorb_certificates() {
        debug!("Cant absorb certificates from containers: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_read_manifest_with_aliases_and_comments() {
        let data = "\
pfx;cert;name;password;exportable
# comment line
petrov.pfx;petrov.cer;#subject.surname;1234;false
";
        let entries = read_manifest(data.as_bytes()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].container_path, "petrov.pfx");
        assert_eq!(entries[0].certificate_path, "petrov.cer");
        assert_eq!(entries[0].name.as_deref(), Some("#subject.surname"));
        assert_eq!(entries[0].pfx_password.as_deref(), Some("1234"));
        assert_eq!(entries[0].exportable, Some(false));
    }

    #[test]
    fn test_read_manifest_empty_optional_columns() {
        let data = "container;cert;name;pfx_password;exportable\nivanov.000;ivanov.cer;;;\n";
        let entries = read_manifest(data.as_bytes()).unwrap();
        assert_eq!(entries[0].container_path, "ivanov.000");
        assert_eq!(entries[0].name, None);
        assert_eq!(entries[0].pfx_password, None);
        assert_eq!(entries[0].exportable, None);
    }

    #[test]
    fn test_read_manifest_minimal_columns() {
        let entries = read_manifest("container;cert\na.000;a.cer\nb.pfx;b.cer\n".as_bytes()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].container_path, "b.pfx");
    }

    #[test]
    fn test_read_manifest_missing_column() {
        let result = read_manifest("container;name\na.000;x\n".as_bytes());
        assert!(matches!(result, Err(CertMassError::Manifest(_))));
    }

    #[test]
    fn test_apply_defaults() {
        let defaults = DefaultBlock {
            name_pattern: Some("#subject.surname".into()),
            pfx_password: Some("0000".into()),
            exportable: Some(true),
        };
        let certs = Path::new("/data/certs");

        let archive = InstallEntry {
            container_path: "a.pfx".into(),
            certificate_path: "a.cer".into(),
            ..InstallEntry::default()
        };
        let params = apply_defaults(&archive, &defaults, certs);
        assert_eq!(params.container_path, PathBuf::from("/data/certs/a.pfx"));
        assert_eq!(params.certificate_path, PathBuf::from("/data/certs/a.cer"));
        assert_eq!(params.container_name.as_deref(), Some("#subject.surname"));
        assert_eq!(params.pfx_password.as_deref(), Some("0000"));
        assert_eq!(params.exportable, Some(true));

        let folder = InstallEntry {
            container_path: "b.000".into(),
            certificate_path: "b.cer".into(),
            name: Some("own".into()),
            exportable: Some(false),
            ..InstallEntry::default()
        };
        let params = apply_defaults(&folder, &defaults, certs);
        assert_eq!(params.container_name.as_deref(), Some("own"));
        assert_eq!(params.pfx_password, None);
        assert_eq!(params.exportable, Some(false));
    }

    #[test]
    fn test_report_total() {
        let report = BatchReport {
            installed: 2,
            already_installed: 1,
            failed: 3,
        };
        assert_eq!(report.total(), 6);
    }
}
