#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use certmass::cert::{Certificate, DistinguishedName, NameField};
use certmass::error::{CertMassError, Result};
use certmass::store::{
    ArchiveInstall, CONTAINER_KEY_FILES, CertificateEntry, CertificateStore, Container, StoreName,
};
use time::macros::datetime;

/// Mutable state behind [`MockStore`].
#[derive(Default)]
pub struct MockState {
    /// Certificate file contents to parsed certificates.
    pub certificates: HashMap<Vec<u8>, Certificate>,
    /// Container header contents to short public-key fingerprints.
    pub headers: HashMap<Vec<u8>, String>,
    /// The personal store.
    pub entries: Vec<CertificateEntry>,
    /// Thumbprints in the trusted-roots store.
    pub roots: HashSet<String>,
    /// Installed containers by logical name.
    pub containers: BTreeMap<String, Container>,
    /// Exportability of installed containers by logical name.
    pub exportable: HashMap<String, bool>,
    /// Every provider call, by method name.
    pub calls: Vec<String>,
    /// Archives written by `export_to_archive`.
    pub exported: Vec<PathBuf>,
    /// Reader used for containers installed from folders or archives.
    pub reader: String,
    pub sid: Option<String>,
    pub fail_link: bool,
    pub fail_registry_rename: bool,
    pub fail_image_rename: bool,
    pub generic_not_exportable: bool,
    pub empty_archive: bool,
    next_id: usize,
}

/// In-memory certificate store recording every call.
pub struct MockStore {
    state: Mutex<MockState>,
}

impl Default for MockStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MockStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                reader: "HDIMAGE".to_string(),
                sid: Some("S-1-5-21-1000".to_string()),
                ..MockState::default()
            }),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    /// Number of recorded calls to `method`.
    pub fn calls(&self, method: &str) -> usize {
        self.state().calls.iter().filter(|call| *call == method).count()
    }

    /// Adds a container directly, as if installed earlier.
    pub fn add_container(&self, container: Container, exportable: bool) {
        let mut state = self.state();
        state.exportable.insert(container.name.clone(), exportable);
        state.containers.insert(container.name.clone(), container);
    }

    pub fn container_names(&self) -> Vec<String> {
        self.state().containers.keys().cloned().collect()
    }

    fn record(&self, method: &str) -> MutexGuard<'_, MockState> {
        let mut state = self.state();
        state.calls.push(method.to_string());
        state
    }
}

fn unique_name(reader: &str, name: &str, id: usize) -> String {
    format!(r"\\.\{reader}\{reader}\\{name}\{id:04X}")
}

fn decode_legacy(bytes: &[u8]) -> String {
    encoding_rs::WINDOWS_1251.decode(bytes).0.into_owned()
}

fn not_found(what: &str) -> CertMassError {
    CertMassError::provider("lookup", format!("{what} not found"))
}

impl CertificateStore for MockStore {
    fn is_certificate_in_store(&self, thumbprint: &str, store: StoreName) -> Result<bool> {
        let state = self.record("is_certificate_in_store");
        Ok(match store {
            StoreName::Personal => state.entries.iter().any(|e| e.thumbprint == thumbprint),
            StoreName::Root => state.roots.contains(thumbprint),
        })
    }

    fn find_certificate_entries(&self, thumbprint: &str, _store: StoreName) -> Result<Vec<CertificateEntry>> {
        let state = self.record("find_certificate_entries");
        let entries: Vec<_> = state
            .entries
            .iter()
            .filter(|e| e.thumbprint == thumbprint)
            .cloned()
            .collect();
        if entries.is_empty() {
            return Err(CertMassError::NotFound(PathBuf::from(thumbprint)));
        }
        Ok(entries)
    }

    fn install_from_folder(&self, path: &Path, _root_folder: &Path, desired_name: &str) -> Result<Container> {
        let mut state = self.record("install_from_folder");
        let stem = path.file_stem().unwrap().to_string_lossy().into_owned();
        let short = if desired_name.is_empty() { stem.clone() } else { desired_name.to_string() };
        let name = format!(r"\\.\{}\{short}", state.reader);
        if state.containers.contains_key(&name) {
            return Err(CertMassError::AlreadyExists(name));
        }
        state.next_id += 1;
        let container = Container::new(name.clone(), unique_name(&state.reader, &format!("{stem}.000"), state.next_id));
        state.exportable.insert(name.clone(), true);
        state.containers.insert(name, container.clone());
        Ok(container)
    }

    fn install_from_archive(&self, path: &Path, _password: &str, exportable: bool) -> Result<ArchiveInstall> {
        let mut state = self.record("install_from_archive");
        if state.empty_archive {
            return Ok(ArchiveInstall {
                container: Container::default(),
                output: "no private key".to_string(),
            });
        }
        state.next_id += 1;
        let short = format!("pfx-{}", state.next_id);
        let name = format!(r"\\.\{}\{short}", state.reader);
        let container = Container::new(name.clone(), unique_name(&state.reader, &short, state.next_id));
        state.exportable.insert(name.clone(), exportable);
        state.containers.insert(name, container.clone());
        Ok(ArchiveInstall {
            container,
            output: format!("installed from {}", path.display()),
        })
    }

    fn export_to_archive(
        &self,
        container: &Container,
        _thumbprint: Option<&str>,
        dest: &Path,
        _password: &str,
    ) -> Result<PathBuf> {
        let mut state = self.record("export_to_archive");
        if state.exportable.get(&container.name) == Some(&false) {
            return Err(CertMassError::NotExportable(container.name.clone()));
        }
        if !state.containers.contains_key(&container.name) {
            return Err(not_found(&container.name));
        }
        fs::write(dest, b"pfx")?;
        state.exported.push(dest.to_path_buf());
        Ok(dest.to_path_buf())
    }

    fn link_certificate(&self, certificate_path: &Path, container_name: &str) -> Result<bool> {
        let bytes = fs::read(certificate_path)?;
        let mut state = self.record("link_certificate");
        if state.fail_link {
            return Ok(false);
        }
        let thumbprint = state
            .certificates
            .get(&bytes)
            .map(|c| c.thumbprint.clone())
            .ok_or_else(|| not_found("certificate"))?;
        state.entries.push(CertificateEntry {
            thumbprint,
            container: container_name.to_string(),
            container_linked: true,
        });
        Ok(true)
    }

    fn delete_container(&self, container: &Container) -> Result<bool> {
        let mut state = self.record("delete_container");
        state.exportable.remove(&container.name);
        Ok(state.containers.remove(&container.name).is_some())
    }

    fn delete_certificate(&self, thumbprint: &str) -> Result<bool> {
        let mut state = self.record("delete_certificate");
        let before = state.entries.len();
        state.entries.retain(|e| e.thumbprint != thumbprint);
        Ok(state.entries.len() != before)
    }

    fn get_container(&self, name: &str) -> Result<Container> {
        let state = self.record("get_container");
        state.containers.get(name).cloned().ok_or_else(|| not_found(name))
    }

    fn copy_container(&self, container: &Container, location: &str) -> Result<Container> {
        let mut state = self.record("copy_container");
        if state.exportable.get(&container.name) == Some(&false) {
            return Err(CertMassError::NotExportable(container.name.clone()));
        }
        state.next_id += 1;
        let copy = Container::new(
            location,
            unique_name(container.reader(), location.rsplit('\\').next().unwrap(), state.next_id),
        );
        state.exportable.insert(copy.name.clone(), true);
        state.containers.insert(copy.name.clone(), copy.clone());
        Ok(copy)
    }

    fn direct_rename_registry_backed(&self, _user_sid: &str, current_name: &str, new_name: &[u8]) -> Result<bool> {
        let mut state = self.record("direct_rename_registry_backed");
        if state.fail_registry_rename {
            return Err(CertMassError::provider("registry", "access denied"));
        }
        let old = format!(r"\\.\REGISTRY\{current_name}");
        let Some(container) = state.containers.remove(&old) else {
            return Ok(false);
        };
        let exportable = state.exportable.remove(&container.name).unwrap_or(true);
        let short = decode_legacy(new_name);
        let renamed = Container::new(format!(r"\\.\REGISTRY\{short}"), format!(r"\\.\REGISTRY\REGISTRY\\{short}"));
        state.exportable.insert(renamed.name.clone(), exportable);
        state.containers.insert(renamed.name.clone(), renamed);
        Ok(true)
    }

    fn direct_rename_image_backed(&self, _username: &str, unique_name: &str, new_name: &[u8]) -> Result<bool> {
        let mut state = self.record("direct_rename_image_backed");
        if state.fail_image_rename {
            return Ok(false);
        }
        let Some(old) = state
            .containers
            .values()
            .find(|c| c.unique_name == unique_name)
            .cloned()
        else {
            return Ok(false);
        };
        state.containers.remove(&old.name);
        let exportable = state.exportable.remove(&old.name).unwrap_or(true);
        let renamed = Container::new(format!(r"\\.\HDIMAGE\{}", decode_legacy(new_name)), old.unique_name);
        state.exportable.insert(renamed.name.clone(), exportable);
        state.containers.insert(renamed.name.clone(), renamed);
        Ok(true)
    }

    fn resolve_user_sid(&self, username: &str) -> Result<String> {
        let state = self.record("resolve_user_sid");
        state.sid.clone().ok_or_else(|| not_found(username))
    }

    fn generic_rename(&self, container: &Container, new_name: &str) -> Result<Container> {
        let mut state = self.record("generic_rename");
        if state.generic_not_exportable {
            return Err(CertMassError::NotExportable(container.name.clone()));
        }
        let old = state.containers.remove(&container.name).ok_or_else(|| not_found(&container.name))?;
        let exportable = state.exportable.remove(&old.name).unwrap_or(true);
        let reader = container.reader().to_string();
        let renamed = Container::new(format!(r"\\.\{reader}\{new_name}"), old.unique_name);
        state.exportable.insert(renamed.name.clone(), exportable);
        state.containers.insert(renamed.name.clone(), renamed.clone());
        Ok(renamed)
    }

    fn install_root_certificate(&self, path: &Path) -> Result<()> {
        let bytes = fs::read(path)?;
        let mut state = self.record("install_root_certificate");
        let key = match state.certificates.get(&bytes) {
            Some(certificate) => certificate.thumbprint.clone(),
            None => path.display().to_string(),
        };
        state.roots.insert(key);
        Ok(())
    }

    fn absorb_certificates(&self) -> Result<()> {
        self.record("absorb_certificates");
        Ok(())
    }

    fn parse_certificate(&self, bytes: &[u8]) -> Result<Certificate> {
        let state = self.state();
        match state.certificates.get(bytes) {
            Some(certificate) => Ok(certificate.clone()),
            None => Certificate::from_bytes(bytes),
        }
    }

    fn short_public_key_from_container_header(&self, header: &[u8]) -> Result<String> {
        self.state()
            .headers
            .get(header)
            .cloned()
            .ok_or_else(|| CertMassError::DecodingError("unknown container header".to_string()))
    }
}

/// A personal certificate for a named owner.
pub fn personal_certificate(thumbprint: &str, surname: &str, given_name: &str, fingerprint: &str) -> Certificate {
    Certificate {
        thumbprint: thumbprint.to_string(),
        subject: DistinguishedName::new()
            .with(NameField::Surname, surname)
            .with(NameField::GivenName, given_name)
            .with(NameField::Title, "Director"),
        issuer: DistinguishedName::new().with(NameField::CommonName, "Test CA"),
        not_before: datetime!(2024-01-01 0:00 UTC),
        not_after: datetime!(2099-01-01 0:00 UTC),
        is_ca: false,
        standard_key: false,
        short_public_key: Some(fingerprint.to_string()),
    }
}

/// Writes a certificate file the store recognises.
pub fn write_certificate(store: &MockStore, path: &Path, certificate: &Certificate) -> PathBuf {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let bytes = format!("certificate:{}", certificate.thumbprint).into_bytes();
    fs::write(path, &bytes).unwrap();
    store.state().certificates.insert(bytes, certificate.clone());
    path.to_path_buf()
}

/// Writes a complete folder container whose header maps to `fingerprint`.
pub fn write_folder_container(store: &MockStore, path: &Path, fingerprint: &str) -> PathBuf {
    fs::create_dir_all(path).unwrap();
    for file in CONTAINER_KEY_FILES {
        fs::write(path.join(file), format!("{file}:{fingerprint}")).unwrap();
    }
    let header = fs::read(path.join(CONTAINER_KEY_FILES[0])).unwrap();
    store.state().headers.insert(header, fingerprint.to_string());
    path.to_path_buf()
}

/// Writes an archive bundle placeholder.
pub fn write_archive(path: &Path) -> PathBuf {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, b"pfx").unwrap();
    path.to_path_buf()
}
