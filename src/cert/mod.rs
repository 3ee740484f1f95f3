pub mod extensions;
pub mod name;

use std::path::Path;

use der::{Decode, Encode};
use sha1::{Digest, Sha1};
use time::OffsetDateTime;
use x509_cert::certificate::CertificateInner;

use crate::error::CertMassError;
use extensions::{BasicConstraints, FromX509Extension};
pub use name::{DistinguishedName, NameField};

pub type Result<T> = std::result::Result<T, CertMassError>;

/// File extension of end-entity certificates picked up by discovery.
pub const CERTIFICATE_EXTENSION: &str = "cer";

/// Number of leading public-key bytes that make up the short fingerprint.
const SHORT_PUBLIC_KEY_LEN: usize = 8;

/// A certificate as the provisioning flow sees it.
///
/// Immutable once loaded: every field is derived from the encoded certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    /// Upper-case hex SHA-1 over the DER encoding; the store identifier.
    pub thumbprint: String,
    pub subject: DistinguishedName,
    pub issuer: DistinguishedName,
    pub not_before: OffsetDateTime,
    pub not_after: OffsetDateTime,
    /// Basic constraints mark the certificate as an authority.
    pub is_ca: bool,
    /// The key uses an algorithm a generic X.509 stack resolves (RSA, EC, Ed25519).
    /// Such keys are never held in provider containers.
    pub standard_key: bool,
    /// Condensed public-key identifier used to pair certificates with containers.
    pub short_public_key: Option<String>,
}

impl Certificate {
    /// Reads a certificate from PEM or DER bytes.
    ///
    /// # Arguments
    /// * `bytes` - The file contents; PEM is detected by its armour line.
    ///
    /// # Returns
    /// The parsed `Certificate`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.starts_with(b"-----BEGIN") {
            let block = pem::parse(bytes)?;
            return Self::from_der(block.contents());
        }
        Self::from_der(bytes)
    }

    /// Reads a DER-encoded certificate.
    pub fn from_der(der_bytes: &[u8]) -> Result<Self> {
        let inner = x509_cert::Certificate::from_der(der_bytes)?;
        Self::from_x509(&inner)
    }

    /// Reads and parses a certificate file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    /// Extracts the provisioning view of a parsed X.509 certificate.
    ///
    /// # Arguments
    /// * `inner` - The decoded certificate.
    ///
    /// # Returns
    /// A `Certificate` carrying the thumbprint, names, validity and key fingerprint.
    pub fn from_x509(inner: &CertificateInner) -> Result<Self> {
        let tbs = &inner.tbs_certificate;
        let der_bytes = inner.to_der()?;

        let is_ca = BasicConstraints::find(tbs.extensions.as_ref())?
            .map(|bc| bc.is_ca)
            .unwrap_or(false);

        let algorithm = tbs.subject_public_key_info.algorithm.oid;
        let standard_key = algorithm == const_oid::db::rfc5912::RSA_ENCRYPTION
            || algorithm == const_oid::db::rfc5912::ID_EC_PUBLIC_KEY
            || algorithm == const_oid::db::rfc8410::ID_ED_25519;

        let key_bytes = tbs.subject_public_key_info.subject_public_key.raw_bytes();

        Ok(Self {
            thumbprint: thumbprint(&der_bytes),
            subject: DistinguishedName::from_x509_name(&tbs.subject),
            issuer: DistinguishedName::from_x509_name(&tbs.issuer),
            not_before: to_offset_date_time(&tbs.validity.not_before)?,
            not_after: to_offset_date_time(&tbs.validity.not_after)?,
            is_ca,
            standard_key,
            short_public_key: short_public_key(key_bytes),
        })
    }
}

/// Computes the store thumbprint of a DER-encoded certificate.
pub fn thumbprint(der_bytes: &[u8]) -> String {
    to_upper_hex(&Sha1::digest(der_bytes))
}

/// Derives the short fingerprint from a subject public key.
///
/// Provider keys wrap the point in an OCTET STRING inside the BIT STRING;
/// the wrapper is skipped when present.
pub fn short_public_key(key_bytes: &[u8]) -> Option<String> {
    let point = match der::asn1::OctetStringRef::from_der(key_bytes) {
        Ok(octets) => octets.as_bytes(),
        Err(_) => key_bytes,
    };
    if point.len() < SHORT_PUBLIC_KEY_LEN {
        return None;
    }
    Some(to_upper_hex(&point[..SHORT_PUBLIC_KEY_LEN]))
}

fn to_offset_date_time(time: &x509_cert::time::Time) -> Result<OffsetDateTime> {
    let seconds = time.to_unix_duration().as_secs();
    let seconds = i64::try_from(seconds)
        .map_err(|e| CertMassError::CertificateError(format!("validity out of range: {e}")))?;
    OffsetDateTime::from_unix_timestamp(seconds)
        .map_err(|e| CertMassError::CertificateError(format!("validity out of range: {e}")))
}

pub(crate) fn to_upper_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02X}")).collect()
}
