//! Provisioning of one certificate/container pair.
//!
//! [`Installer::install`] runs the whole sequence for a pair: validation,
//! duplicate detection, installation from a folder or an archive bundle, the
//! optional non-exportable round-trip, renaming and linking. Every container
//! or temporary file created along the way is removed again on any early exit.

use std::fs;
use std::path::{Path, PathBuf};

use bon::Builder;
use time::macros::format_description;
use time::{Duration, OffsetDateTime};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::cert::Certificate;
use crate::error::{CertMassError, Result};
use crate::naming::format_container_name;
use crate::rename::{UserContext, rename_container};
use crate::store::{CONTAINER_KEY_FILES, CertificateStore, Container, StoreName, is_installed_with_container};

/// File extension of archive bundles.
pub const ARCHIVE_EXTENSION: &str = "pfx";

/// Certificates expiring within this many days trigger an advisory.
pub const EXPIRY_WARNING_DAYS: i64 = 30;

/// Pattern used to name the owner of a container in log lines.
const OWNER_PATTERN: &str = "#subject.surname #subject.initials - #subject.title";

/// Parameters for provisioning one pair.
///
/// # Fields
/// * `container_path` - Folder container or archive bundle.
/// * `certificate_path` - The certificate file.
/// * `container_name` - Naming pattern for the installed container.
/// * `pfx_password` - Archive password; empty when absent.
/// * `exportable` - Exportability of the installed key. `Some(false)` on a
///   folder container triggers the archive round-trip.
#[derive(Clone, Debug, Builder, PartialEq, Eq)]
pub struct InstallParams {
    #[builder(into)]
    pub container_path: PathBuf,
    #[builder(into)]
    pub certificate_path: PathBuf,
    #[builder(into)]
    pub container_name: Option<String>,
    #[builder(into)]
    pub pfx_password: Option<String>,
    pub exportable: Option<bool>,
}

/// How a successful provisioning run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    /// The container was installed and linked.
    Installed(Container),
    /// The certificate was already linked to a reachable container; nothing changed.
    AlreadyInstalled { thumbprint: String },
}

/// Non-blocking expiry notice for a certificate about to be installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryAdvisory {
    Expired { not_after: OffsetDateTime },
    ExpiresSoon { days: i64, not_after: OffsetDateTime },
}

/// Decides whether a certificate deserves an expiry warning at `now`.
///
/// # Returns
/// `Expired` once `not_after` has passed, `ExpiresSoon` within
/// [`EXPIRY_WARNING_DAYS`], `None` otherwise.
pub fn expiry_advisory(certificate: &Certificate, now: OffsetDateTime) -> Option<ExpiryAdvisory> {
    let not_after = certificate.not_after;
    if now > not_after {
        return Some(ExpiryAdvisory::Expired { not_after });
    }
    let remaining: Duration = not_after - now;
    if remaining.is_positive() && remaining.whole_days() <= EXPIRY_WARNING_DAYS {
        return Some(ExpiryAdvisory::ExpiresSoon {
            days: remaining.whole_days(),
            not_after,
        });
    }
    None
}

/// Checks that a folder container carries every key file, none of them empty.
pub fn check_container_files(path: &Path) -> Result<()> {
    for file in CONTAINER_KEY_FILES {
        let file_path = path.join(file);
        let reason = match fs::metadata(&file_path) {
            Ok(meta) if meta.len() > 0 => continue,
            Ok(_) => format!("file [{file}] is empty"),
            Err(_) => format!("file [{file}] does not exist"),
        };
        debug!("Container[{}] is malformed: {reason}", path.display());
        return Err(CertMassError::MalformedContainer {
            path: path.to_path_buf(),
            reason,
        });
    }
    Ok(())
}

/// True for archive bundle paths.
pub fn is_archive(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == ARCHIVE_EXTENSION)
}

/// Drives provisioning runs against one store.
///
/// An `Installer` holds no per-run state; runs for independent pairs may
/// share it across threads.
pub struct Installer<'a, S: CertificateStore + ?Sized> {
    store: &'a S,
    user: &'a UserContext,
    root_containers_folder: PathBuf,
}

impl<'a, S: CertificateStore + ?Sized> Installer<'a, S> {
    /// Creates an installer.
    ///
    /// # Arguments
    /// * `store` - The certificate store.
    /// * `user` - Identity used for in-place container renames.
    /// * `root_containers_folder` - The provider's root containers folder.
    pub fn new(store: &'a S, user: &'a UserContext, root_containers_folder: impl Into<PathBuf>) -> Self {
        Self {
            store,
            user,
            root_containers_folder: root_containers_folder.into(),
        }
    }

    pub fn root_containers_folder(&self) -> &Path {
        &self.root_containers_folder
    }

    /// Provisions one certificate/container pair.
    ///
    /// # Arguments
    /// * `params` - Source paths, naming pattern, password and exportability.
    ///
    /// # Returns
    /// `Installed` with the final container, or `AlreadyInstalled` when the
    /// certificate is already linked to a reachable container. The error is
    /// the first terminal condition met; partial progress is undone first.
    pub fn install(&self, params: &InstallParams) -> Result<InstallOutcome> {
        debug!(
            "rootContainersFolder: {}, installParams: {params:?}",
            self.root_containers_folder.display()
        );
        let certificate_file = file_name(&params.certificate_path);

        if !params.container_path.exists() {
            error!("Container file/directory not found: {}", params.container_path.display());
            return Err(CertMassError::NotFound(params.container_path.clone()));
        }
        if !params.certificate_path.exists() {
            error!("Certificate file not found: {}", params.certificate_path.display());
            return Err(CertMassError::NotFound(params.certificate_path.clone()));
        }

        let thumbprint = self
            .store
            .thumbprint_of(&params.certificate_path)
            .inspect_err(|_| error!("Failed to get thumbprint of certificate[{certificate_file}]"))?;

        match is_installed_with_container(self.store, &thumbprint, StoreName::Personal) {
            Ok(true) => {
                warn!("Container with certificate[{certificate_file}] already exists in the store");
                return Ok(InstallOutcome::AlreadyInstalled { thumbprint });
            }
            Ok(false) => {}
            Err(e) => debug!("Duplicate check for [{thumbprint}] failed: {e}"),
        }

        let certificate = self.read_certificate(&params.certificate_path)?;
        let owner = format_container_name(OWNER_PATTERN, &certificate).normal;
        warn_on_expiry(&certificate, &certificate_file);

        let mut provisional = Provisional::new(self.store);
        let (container, from_archive) =
            self.install_container(params, &thumbprint, &owner, &mut provisional)?;

        let container = self.rename(params, &certificate, container, from_archive)?;

        match self.store.link_certificate(&params.certificate_path, &container.name) {
            Ok(true) => {
                info!("Container [{}] installed", container.name);
                Ok(InstallOutcome::Installed(container))
            }
            result => {
                if let Err(e) = &result {
                    debug!("Link certificate with container failed: {e}");
                }
                self.discard(&container);
                error!(
                    "Failed to link certificate[{certificate_file}] with container[{}], changes reverted",
                    container.unique_name
                );
                Err(CertMassError::LinkFailed {
                    certificate: params.certificate_path.clone(),
                    container: container.name,
                })
            }
        }
    }

    fn read_certificate(&self, path: &Path) -> Result<Certificate> {
        let bytes = fs::read(path).inspect_err(|e| {
            error!("Failed to read certificate[{}]", path.display());
            debug!("Cant read[{}]: {e}", path.display());
        })?;
        self.store.parse_certificate(&bytes).inspect_err(|e| {
            error!("Failed to read certificate[{}]", path.display());
            debug!("Cant parse[{}]: {e}", path.display());
        })
    }

    /// Installs the container and reports whether it came from an archive.
    fn install_container(
        &self,
        params: &InstallParams,
        thumbprint: &str,
        owner: &str,
        provisional: &mut Provisional<'_, S>,
    ) -> Result<(Container, bool)> {
        let source = &params.container_path;
        if is_archive(source) {
            let password = params.pfx_password.as_deref().unwrap_or_default();
            let exportable = params.exportable.unwrap_or(false);
            let container = self.install_archive(source, password, exportable, owner)?;
            return Ok((container, true));
        }

        let container_file = file_name(source);
        check_container_files(source)
            .inspect_err(|_| error!("Container[{container_file}] is malformed (Owner: {owner})"))?;

        let installed = self
            .store
            .install_from_folder(source, &self.root_containers_folder, "")
            .inspect_err(|_| error!("Failed to install container[{container_file}] (Owner: {owner})"))?;
        debug!("Container[{container_file}] installed, name[{}]", installed.name);

        if params.exportable != Some(false) {
            return Ok((installed, false));
        }

        let Some(archive) = self.export_round_trip(&installed, &params.certificate_path, thumbprint) else {
            warn!("Container[{}] could not be made non-exportable", installed.name);
            return Ok((installed, false));
        };
        provisional.track(archive.clone(), installed);
        let container = self.install_archive(&archive, "", false, owner)?;
        Ok((container, true))
    }

    fn install_archive(&self, path: &Path, password: &str, exportable: bool, owner: &str) -> Result<Container> {
        let archive_file = file_name(path);
        let result = self
            .store
            .install_from_archive(path, password, exportable)
            .inspect_err(|e| {
                error!("Failed to install container from pfx file[{archive_file}] (Owner: {owner})");
                if e.to_string().contains("unrecognized option `-pfx") {
                    warn!("Installing containers from pfx files requires a newer provider version");
                }
            })?;
        debug!("Install Pfx result: {}", result.output);

        if result.container.is_empty() {
            error!("Failed to install container from pfx file[{archive_file}], private key missing (Owner: {owner})");
            return Err(CertMassError::EmptyArchive(path.to_path_buf()));
        }
        debug!("Container installed from Pfx[{archive_file}], name:'{}'", result.container.name);
        Ok(result.container)
    }

    /// Links, then exports a freshly installed folder container to a temporary
    /// archive with an empty password.
    fn export_round_trip(&self, container: &Container, certificate: &Path, thumbprint: &str) -> Option<PathBuf> {
        let archive = self
            .root_containers_folder
            .join(format!("{}-temp.{ARCHIVE_EXTENSION}", Uuid::new_v4()));

        match self.store.link_certificate(certificate, &container.name) {
            Ok(true) => {}
            Ok(false) => {
                debug!("[Folder to pfx] Link rejected for container[{}]", container.name);
                return None;
            }
            Err(e) => {
                debug!("[Folder to pfx] Link failed for container[{}]: {e}", container.name);
                return None;
            }
        }

        match self.store.export_to_archive(container, Some(thumbprint), &archive, "") {
            Ok(path) => {
                debug!("[Folder to pfx] Container[{}] exported to [{}]", container.name, path.display());
                Some(path)
            }
            Err(e) => {
                debug!(
                    "[Folder to pfx] Failed to export container[{}] to [{}]: {e}",
                    container.name,
                    archive.display()
                );
                None
            }
        }
    }

    /// Applies the naming pattern, if any.
    ///
    /// # Returns
    /// The container to link. Only non-exportability aborts; archive-sourced
    /// containers are deleted before that error is returned.
    fn rename(
        &self,
        params: &InstallParams,
        certificate: &Certificate,
        container: Container,
        from_archive: bool,
    ) -> Result<Container> {
        let Some(pattern) = params.container_name.as_deref().filter(|p| !p.is_empty()) else {
            return Ok(container);
        };

        let name = format_container_name(pattern, certificate);
        if name.is_empty() {
            warn!("Container name pattern [{pattern}] cannot be rendered, keeping [{}]", container.name);
            return Ok(container);
        }

        match rename_container(self.store, self.user, &container, &name.normal) {
            Ok(renamed) => {
                debug!("Container [{}] renamed to [{}]", container.name, renamed.name);
                Ok(renamed)
            }
            Err(CertMassError::NotExportable(_)) => {
                warn!("Container[{}] is not exportable", container.name);
                if from_archive {
                    self.discard(&container);
                }
                Err(CertMassError::NotExportable(container.name))
            }
            Err(e) => {
                error!("Failed to rename container [{}] -> [{}]: {e}", container.name, name.normal);
                Ok(container)
            }
        }
    }

    fn discard(&self, container: &Container) {
        discard(self.store, container);
    }
}

/// Deletes a container as a compensating action; failures are only logged.
pub(crate) fn discard<S: CertificateStore + ?Sized>(store: &S, container: &Container) {
    match store.delete_container(container) {
        Ok(true) => debug!("Container[{}] deleted", container.name),
        Ok(false) => warn!("Failed to delete container[{}]", container.name),
        Err(e) => warn!("Failed to delete container[{}]: {e}", container.name),
    }
}

/// Temporary archive and the container it was exported from, removed on drop.
struct Provisional<'a, S: CertificateStore + ?Sized> {
    store: &'a S,
    archive: Option<PathBuf>,
    container: Option<Container>,
}

impl<'a, S: CertificateStore + ?Sized> Provisional<'a, S> {
    fn new(store: &'a S) -> Self {
        Self {
            store,
            archive: None,
            container: None,
        }
    }

    fn track(&mut self, archive: PathBuf, container: Container) {
        self.archive = Some(archive);
        self.container = Some(container);
    }
}

impl<S: CertificateStore + ?Sized> Drop for Provisional<'_, S> {
    fn drop(&mut self) {
        if let Some(container) = self.container.take() {
            discard(self.store, &container);
        }
        if let Some(archive) = self.archive.take() {
            if let Err(e) = fs::remove_file(&archive) {
                warn!("Failed to remove temporary archive [{}]: {e}", archive.display());
            }
        }
    }
}

fn warn_on_expiry(certificate: &Certificate, certificate_file: &str) {
    let format = format_description!("[day].[month].[year] [hour]:[minute]:[second]");
    match expiry_advisory(certificate, OffsetDateTime::now_utc()) {
        Some(ExpiryAdvisory::Expired { not_after }) => warn!(
            "Certificate[{certificate_file}] has expired (valid until {})",
            not_after.format(&format).unwrap_or_default()
        ),
        Some(ExpiryAdvisory::ExpiresSoon { days, not_after }) => warn!(
            "Certificate[{certificate_file}] expires in {days} {} (valid until {})",
            if days == 1 { "day" } else { "days" },
            not_after.format(&format).unwrap_or_default()
        ),
        None => {}
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
