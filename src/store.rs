//! The certificate store capability the provisioning flow drives.
//!
//! Everything cryptographic happens behind [`CertificateStore`]: installing
//! containers from folders or archive bundles, exporting, linking certificates,
//! deleting, renaming and user lookup. Implementations bind these calls to a
//! concrete provider; this crate only decides which calls to make and in what
//! order.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::cert::Certificate;
use crate::error::{CertMassError, Result};

/// Marker inside a unique container name for registry-backed containers.
pub const REGISTRY_MARKER: &str = "REGISTRY";

/// Marker inside a unique container name for disk-image-backed containers.
pub const DISK_IMAGE_MARKER: &str = "HDIMAGE";

/// Header file that marks a directory as a folder container.
pub const CONTAINER_HEADER_FILE: &str = "header.key";

/// Key component files every folder container must carry, all non-empty.
pub const CONTAINER_KEY_FILES: [&str; 5] = [
    CONTAINER_HEADER_FILE,
    "masks.key",
    "masks2.key",
    "primary.key",
    "primary2.key",
];

/// Named certificate stores of the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreName {
    /// Personal store of the current user.
    Personal,
    /// Trusted roots of the current user.
    Root,
}

impl StoreName {
    pub fn as_str(self) -> &'static str {
        match self {
            StoreName::Personal => "uMy",
            StoreName::Root => "uRoot",
        }
    }
}

impl fmt::Display for StoreName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backing medium of a container, decided solely by its unique-name marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Medium {
    Registry,
    DiskImage,
    Other,
}

/// A private-key container held by the provider.
///
/// A rename may hand back a new `Container` for the same key material; the
/// previous value no longer identifies anything afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Container {
    /// Logical name, e.g. `\\.\HDIMAGE\ivanov`.
    pub name: String,
    /// Fully-qualified unique name; encodes the backing medium.
    pub unique_name: String,
}

impl Container {
    pub fn new(name: impl Into<String>, unique_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            unique_name: unique_name.into(),
        }
    }

    /// Determines the backing medium from the unique-name marker.
    pub fn medium(&self) -> Medium {
        if self.unique_name.contains(REGISTRY_MARKER) {
            Medium::Registry
        } else if self.unique_name.contains(DISK_IMAGE_MARKER) {
            Medium::DiskImage
        } else {
            Medium::Other
        }
    }

    /// True when the provider returned no identity at all.
    pub fn is_empty(&self) -> bool {
        self.name.is_empty() && self.unique_name.is_empty()
    }

    /// The last path segment of the logical name.
    pub fn short_name(&self) -> &str {
        self.name.rsplit('\\').next().unwrap_or(&self.name)
    }

    /// The reader segment of the logical name (`HDIMAGE` in `\\.\HDIMAGE\x`).
    pub fn reader(&self) -> &str {
        let trimmed = self.name.trim_start_matches("\\\\.\\");
        trimmed.split('\\').next().unwrap_or(trimmed)
    }
}

impl fmt::Display for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A certificate found in a store, with its container reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateEntry {
    pub thumbprint: String,
    /// Logical name of the linked container, if any.
    pub container: String,
    pub container_linked: bool,
}

/// Result of installing an archive bundle.
#[derive(Debug, Clone, Default)]
pub struct ArchiveInstall {
    /// Empty when the bundle carried no private key.
    pub container: Container,
    /// Raw provider output, kept for diagnostics.
    pub output: String,
}

/// The provider operations the provisioning flow consumes.
///
/// Implementations must report a refusal caused by non-exportability as
/// [`CertMassError::NotExportable`] and a name clash as
/// [`CertMassError::AlreadyExists`]; everything else may surface as
/// [`CertMassError::Provider`].
///
/// Certificate reading has default implementations backed by
/// [`Certificate::from_bytes`]; providers with their own parser override them.
pub trait CertificateStore: Send + Sync {
    /// Checks whether a certificate with this thumbprint is in `store`.
    fn is_certificate_in_store(&self, thumbprint: &str, store: StoreName) -> Result<bool>;

    /// Lists the store entries for a thumbprint with their container links.
    fn find_certificate_entries(
        &self,
        thumbprint: &str,
        store: StoreName,
    ) -> Result<Vec<CertificateEntry>>;

    /// Installs a folder container under `root_folder`.
    ///
    /// # Arguments
    /// * `path` - The container directory.
    /// * `root_folder` - The provider's root containers folder.
    /// * `desired_name` - Name for the new container; empty lets the provider choose.
    fn install_from_folder(
        &self,
        path: &Path,
        root_folder: &Path,
        desired_name: &str,
    ) -> Result<Container>;

    /// Installs a container from an archive bundle.
    fn install_from_archive(
        &self,
        path: &Path,
        password: &str,
        exportable: bool,
    ) -> Result<ArchiveInstall>;

    /// Exports a container to an archive bundle at `dest`.
    ///
    /// # Returns
    /// The path of the written bundle.
    fn export_to_archive(
        &self,
        container: &Container,
        thumbprint: Option<&str>,
        dest: &Path,
        password: &str,
    ) -> Result<PathBuf>;

    /// Links a certificate file with a container.
    ///
    /// # Returns
    /// `false` when the provider rejected the link.
    fn link_certificate(&self, certificate_path: &Path, container_name: &str) -> Result<bool>;

    fn delete_container(&self, container: &Container) -> Result<bool>;

    fn delete_certificate(&self, thumbprint: &str) -> Result<bool>;

    /// Looks a container up by logical name.
    fn get_container(&self, name: &str) -> Result<Container>;

    /// Copies a container to a new logical location.
    fn copy_container(&self, container: &Container, location: &str) -> Result<Container>;

    /// Renames a registry-backed container in place.
    ///
    /// # Arguments
    /// * `user_sid` - Security identifier of the owning user.
    /// * `current_name` - Short name of the container.
    /// * `new_name` - Target name in the provider's legacy code page.
    fn direct_rename_registry_backed(
        &self,
        user_sid: &str,
        current_name: &str,
        new_name: &[u8],
    ) -> Result<bool>;

    /// Renames a disk-image-backed container in place.
    fn direct_rename_image_backed(
        &self,
        username: &str,
        unique_name: &str,
        new_name: &[u8],
    ) -> Result<bool>;

    /// Resolves the security identifier of a user.
    fn resolve_user_sid(&self, username: &str) -> Result<String>;

    /// Renames through the provider's generic utility.
    fn generic_rename(&self, container: &Container, new_name: &str) -> Result<Container>;

    /// Installs a trust-anchor certificate or bundle into the roots store.
    fn install_root_certificate(&self, path: &Path) -> Result<()>;

    /// Copies certificates held inside installed containers into the personal store.
    fn absorb_certificates(&self) -> Result<()> {
        Ok(())
    }

    /// Parses certificate bytes.
    fn parse_certificate(&self, bytes: &[u8]) -> Result<Certificate> {
        Certificate::from_bytes(bytes)
    }

    /// Reads a certificate file and returns its thumbprint.
    fn thumbprint_of(&self, path: &Path) -> Result<String> {
        let bytes = std::fs::read(path)?;
        Ok(self.parse_certificate(&bytes)?.thumbprint)
    }

    /// The short public-key fingerprint of a certificate.
    fn short_public_key_fingerprint(&self, certificate: &Certificate) -> Option<String> {
        certificate.short_public_key.clone()
    }

    /// Derives the short public-key fingerprint from raw container header bytes.
    fn short_public_key_from_container_header(&self, header: &[u8]) -> Result<String>;
}

/// Checks for a certificate that is linked to a reachable container.
///
/// A certificate present without a reachable container does not count.
pub fn is_installed_with_container<S: CertificateStore + ?Sized>(
    store: &S,
    thumbprint: &str,
    location: StoreName,
) -> Result<bool> {
    let entries = match store.find_certificate_entries(thumbprint, location) {
        Ok(entries) => entries,
        Err(CertMassError::NotFound(_)) => return Ok(false),
        Err(e) => {
            tracing::debug!("Certificate with thumbprint[{thumbprint}] not found: {e}");
            return Err(e);
        }
    };
    tracing::debug!(
        "Certificate with thumbprint[{thumbprint}] has {} store entries",
        entries.len()
    );

    for entry in entries.iter().filter(|entry| entry.container_linked) {
        match store.get_container(&entry.container) {
            Ok(container) if !container.is_empty() => {
                tracing::debug!("Thumbprint[{}] container[{}] exists", entry.thumbprint, entry.container);
                return Ok(true);
            }
            _ => {
                tracing::debug!(
                    "Thumbprint[{}] container[{}] not reachable",
                    entry.thumbprint,
                    entry.container
                );
            }
        }
    }
    Ok(false)
}
