use const_oid::AssociatedOid;
use der::{Decode, oid::ObjectIdentifier};
use x509_cert::ext::Extensions;

use crate::error::CertMassError;

/// Trait for decoding X.509 extensions.
///
/// # Example
/// ```
/// use certmass::cert::extensions::{BasicConstraints, FromX509Extension};
/// // SEQUENCE { BOOLEAN TRUE }
/// let encoded = [0x30, 0x03, 0x01, 0x01, 0xff];
/// let decoded = BasicConstraints::from_x509_extension_value(&encoded).unwrap();
/// assert!(decoded.is_ca);
/// ```
pub trait FromX509Extension {
    /// The Object Identifier (OID) for the extension.
    const OID: ObjectIdentifier;

    /// Decodes the extension from a DER-encoded byte slice.
    fn from_x509_extension_value(extension: &[u8]) -> Result<Self, CertMassError>
    where
        Self: Sized;

    /// Finds and decodes this extension in a certificate's extension list.
    ///
    /// # Returns
    /// `Ok(None)` when the extension is absent.
    fn find(extensions: Option<&Extensions>) -> Result<Option<Self>, CertMassError>
    where
        Self: Sized,
    {
        extensions
            .into_iter()
            .flatten()
            .find(|ext| ext.extn_id == Self::OID)
            .map(|ext| Self::from_x509_extension_value(ext.extn_value.as_bytes()))
            .transpose()
    }
}

/// Represents the Basic Constraints extension.
///
/// Certificate-authority certificates are trust anchors or intermediates and
/// never pair with a personal key container.
///
/// # Fields
/// * `is_ca` - Indicates if the certificate is a CA.
/// * `max_path_length` - The maximum number of intermediate CAs allowed.
#[derive(Debug, Default)]
pub struct BasicConstraints {
    pub is_ca: bool,
    pub max_path_length: Option<u32>,
}

impl FromX509Extension for BasicConstraints {
    const OID: ObjectIdentifier = x509_cert::ext::pkix::BasicConstraints::OID;

    fn from_x509_extension_value(der_bytes: &[u8]) -> Result<Self, CertMassError> {
        let bc = x509_cert::ext::pkix::BasicConstraints::from_der(der_bytes)?;
        Ok(Self {
            is_ca: bc.ca,
            max_path_length: bc.path_len_constraint.map(|v| v as u32),
        })
    }
}
