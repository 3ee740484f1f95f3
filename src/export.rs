//! Export of an installed or folder container to an archive bundle.

use std::path::{Path, PathBuf};

use bon::Builder;
use tracing::{debug, error, info, warn};

use crate::error::{CertMassError, Result};
use crate::install::{ARCHIVE_EXTENSION, discard};
use crate::paths::{collapse_double_backslashes, is_container_name, resolve_file_path};
use crate::rename::{UserContext, rename_container};
use crate::store::{CertificateStore, Container};

/// Parameters for one export.
///
/// # Fields
/// * `container` - Folder container path or provider container name.
/// * `certificate_path` - Certificate to link before exporting; required for folders.
/// * `container_name` - New name for the exported container.
/// * `pfx_password` - Password protecting the bundle.
/// * `output` - Destination file or directory hint.
#[derive(Clone, Debug, Default, Builder, PartialEq, Eq)]
pub struct ExportParams {
    #[builder(into)]
    pub container: Option<String>,
    #[builder(into)]
    pub certificate_path: Option<PathBuf>,
    #[builder(into)]
    pub container_name: Option<String>,
    #[builder(into, default)]
    pub pfx_password: String,
    #[builder(into)]
    pub output: Option<PathBuf>,
}

/// Where the exported container came from.
struct Source {
    container: Container,
    pre_existing: bool,
}

/// Exports a container to an archive bundle.
///
/// # Arguments
/// * `store` - The certificate store.
/// * `user` - Identity used when renaming a freshly installed container.
/// * `certs_dir` - The certificates directory; relative paths resolve against it.
/// * `root_folder` - The provider's root containers folder.
/// * `params` - What to export and where.
///
/// # Returns
/// The path of the written bundle.
pub fn export_container<S: CertificateStore + ?Sized>(
    store: &S,
    user: &UserContext,
    certs_dir: &Path,
    root_folder: &Path,
    params: &ExportParams,
) -> Result<PathBuf> {
    let requested = params.container.as_deref().filter(|c| !c.is_empty()).ok_or_else(|| {
        error!("Container name or path not set, use --cont");
        CertMassError::MissingParameter("container".to_string())
    })?;
    let new_name = params.container_name.as_deref().filter(|n| !n.is_empty());

    let Source {
        mut container,
        pre_existing,
    } = open_source(store, certs_dir, root_folder, requested, params, new_name)?;

    let destination = archive_destination(&container, certs_dir, params.output.as_deref());

    let mut copy = None;
    if let Some(new_name) = new_name {
        if pre_existing {
            let location = format!(r"\\.\{}\{new_name}", container.reader());
            if location == container.name || location == container.unique_name {
                debug!("New container name matches the old one [{location}]");
            }
            match store.copy_container(&container, &location) {
                Ok(copied) => {
                    container = copied.clone();
                    copy = Some(CopyGuard { store, container: copied });
                }
                Err(CertMassError::NotExportable(name)) => {
                    debug!("Container[{name}] is not exportable");
                    return Err(CertMassError::NotExportable(name));
                }
                Err(e) => debug!("Failed to copy container [{}] -> [{location}]: {e}", container.name),
            }
        } else {
            match rename_container(store, user, &container, new_name) {
                Ok(renamed) => container = renamed,
                Err(CertMassError::NotExportable(name)) => {
                    debug!("Container[{name}] is not exportable");
                    return Err(CertMassError::NotExportable(name));
                }
                Err(e) => debug!("Failed to rename container [{}] -> [{new_name}]: {e}", container.name),
            }
        }
    }

    if let Some(certificate) = &params.certificate_path {
        match store.link_certificate(certificate, &container.name) {
            Ok(true) => {}
            Ok(false) => debug!("Link rejected for container[{}]", container.unique_name),
            Err(e) => debug!(
                "Failed to link certificate[{}] with container[{}]: {e}",
                certificate.display(),
                container.unique_name
            ),
        }
    }

    let written = store
        .export_to_archive(&container, None, &destination, &params.pfx_password)
        .inspect_err(|e| {
            warn!("Failed to export container: {}", container.name);
            warn!("Error: {e}");
        })?;
    info!("Container[{}] exported to file: {}", container.name, written.display());
    drop(copy);
    Ok(written)
}

fn open_source<S: CertificateStore + ?Sized>(
    store: &S,
    certs_dir: &Path,
    root_folder: &Path,
    requested: &str,
    params: &ExportParams,
    new_name: Option<&str>,
) -> Result<Source> {
    if is_container_name(requested) {
        return existing(store, requested);
    }
    let path = match resolve_file_path(Path::new(requested), certs_dir) {
        Ok(path) => path,
        Err(not_found) => {
            return existing(store, requested).inspect_err(|_| error!("{not_found}"));
        }
    };

    if params.certificate_path.is_none() {
        warn!("Certificate path not set, use --cert <path>");
        return Err(CertMassError::MissingParameter("certificate".to_string()));
    }

    let folder = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    match store.install_from_folder(&path, root_folder, new_name.unwrap_or_default()) {
        Ok(container) => {
            debug!("Container installed from folder[{folder}], name:'{}'", container.name);
            Ok(Source {
                container,
                pre_existing: false,
            })
        }
        Err(CertMassError::AlreadyExists(name)) => {
            debug!("Container from folder[{folder}] already installed as [{name}]");
            Ok(Source {
                container: store.get_container(&name)?,
                pre_existing: true,
            })
        }
        Err(e) => {
            warn!("Failed to install container from folder: {folder}");
            Err(e)
        }
    }
}

fn existing<S: CertificateStore + ?Sized>(store: &S, requested: &str) -> Result<Source> {
    let name = collapse_double_backslashes(requested);
    let container = store.get_container(&name).inspect_err(|e| error!("{e}"))?;
    Ok(Source {
        container,
        pre_existing: true,
    })
}

/// Picks the bundle path from the output hint and the container name.
fn archive_destination(container: &Container, certs_dir: &Path, output: Option<&Path>) -> PathBuf {
    let hinted = output
        .and_then(Path::file_name)
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| name.contains(&format!(".{ARCHIVE_EXTENSION}")));
    let file_name = hinted.unwrap_or_else(|| format!("{}.{ARCHIVE_EXTENSION}", container.short_name()));

    let dir = match output {
        Some(output) => output.parent().map(Path::to_path_buf).unwrap_or_default(),
        None => certs_dir.parent().map(Path::to_path_buf).unwrap_or_default(),
    };
    dir.join(file_name)
}

/// Deletes a temporary container copy once the export is done.
struct CopyGuard<'a, S: CertificateStore + ?Sized> {
    store: &'a S,
    container: Container,
}

impl<S: CertificateStore + ?Sized> Drop for CopyGuard<'_, S> {
    fn drop(&mut self) {
        discard(self.store, &self.container);
    }
}
