//! Error types shared by every provisioning step.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using [`CertMassError`].
pub type Result<T> = std::result::Result<T, CertMassError>;

/// Represents errors that can occur while provisioning signature material.
///
/// Every terminal condition of a provisioning run maps onto exactly one variant,
/// so callers match on the variant instead of inspecting message text.
#[derive(Debug, Error)]
pub enum CertMassError {
    /// A required parameter was not supplied.
    #[error("Missing parameter: {0}")]
    MissingParameter(String),

    /// A certificate, container or manifest path does not exist.
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error during data decoding.
    #[error("Failed to decode data: {0}")]
    DecodingError(String),

    /// Error related to certificate contents.
    #[error("Certificate error: {0}")]
    CertificateError(String),

    /// A folder container is missing one of its key files, or one is empty.
    #[error("Container {} is malformed: {reason}", .path.display())]
    MalformedContainer { path: PathBuf, reason: String },

    /// An archive bundle installed without yielding a private key container.
    #[error("Archive {} holds no private key", .0.display())]
    EmptyArchive(PathBuf),

    /// The provider refused the operation because the container is non-exportable.
    #[error("Container {0} is not exportable")]
    NotExportable(String),

    /// The provider already holds a container under the requested name.
    #[error("Container {0} already exists")]
    AlreadyExists(String),

    /// The certificate could not be linked to its container.
    #[error("Failed to link certificate {} with container {container}", .certificate.display())]
    LinkFailed {
        certificate: PathBuf,
        container: String,
    },

    /// Any other failure reported by the certificate store.
    #[error("Provider operation `{operation}` failed: {message}")]
    Provider {
        operation: &'static str,
        message: String,
    },

    /// The settings file could not be read or parsed.
    #[error("Settings error: {0}")]
    Settings(String),

    /// The install manifest could not be read or parsed.
    #[error("Manifest error: {0}")]
    Manifest(String),

    /// The log sinks could not be installed.
    #[error("Logging error: {0}")]
    Logging(String),
}

impl CertMassError {
    /// Shorthand for a [`CertMassError::Provider`] failure.
    pub fn provider(operation: &'static str, message: impl Into<String>) -> Self {
        CertMassError::Provider {
            operation,
            message: message.into(),
        }
    }
}

impl From<der::Error> for CertMassError {
    /// Converts a `der::Error` into a `CertMassError`.
    fn from(err: der::Error) -> Self {
        CertMassError::DecodingError(err.to_string())
    }
}

impl From<pem::PemError> for CertMassError {
    fn from(err: pem::PemError) -> Self {
        CertMassError::DecodingError(err.to_string())
    }
}

impl From<serde_json::Error> for CertMassError {
    fn from(err: serde_json::Error) -> Self {
        CertMassError::Settings(err.to_string())
    }
}

impl From<csv::Error> for CertMassError {
    fn from(err: csv::Error) -> Self {
        CertMassError::Manifest(err.to_string())
    }
}
