use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{CertMassError, Result};

static CONTAINER_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\\\\\.\\.*\\.*$").expect("container name pattern is valid"));

/// Resolves a user-supplied path against the certificates directory.
///
/// Tries the path as given, then under `certs_dir`, then under its parent.
pub fn resolve_file_path(path: &Path, certs_dir: &Path) -> Result<PathBuf> {
    if path.exists() {
        return Ok(path.to_path_buf());
    }
    let candidate = certs_dir.join(path);
    if candidate.exists() {
        return Ok(candidate);
    }
    if let Some(parent) = certs_dir.parent() {
        let candidate = parent.join(path);
        if candidate.exists() {
            return Ok(candidate);
        }
    }
    Err(CertMassError::NotFound(path.to_path_buf()))
}

/// True for provider container names such as `\\.\HDIMAGE\ivanov`.
pub fn is_container_name(text: &str) -> bool {
    CONTAINER_NAME.is_match(text)
}

/// Collapses doubled backslashes, as produced by shells that escape them.
pub fn collapse_double_backslashes(text: &str) -> String {
    text.replace(r"\\", r"\")
}

/// The provider's root containers folder for `username`.
///
/// On Windows the folder is a mounted path the caller must supply.
pub fn default_root_containers_folder(username: &str) -> Result<PathBuf> {
    if cfg!(windows) {
        return Err(CertMassError::MissingParameter(
            "root containers folder must be given on Windows".to_string(),
        ));
    }
    Ok(PathBuf::from("/var/opt/cprocsp/keys").join(username))
}
