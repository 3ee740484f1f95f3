use std::collections::BTreeMap;

use const_oid::ObjectIdentifier;
use const_oid::db::{rfc3280, rfc4519};
use der::Tagged;
use der::asn1::Any;
use der::Tag;

/// The closed set of subject/issuer attributes a naming pattern may reference.
///
/// Each field maps onto one attribute type OID and one pattern token
/// (`#subject.<token>` / `#issuer.<token>`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NameField {
    CommonName,
    Surname,
    CountryName,
    LocalityName,
    StateOrProvinceName,
    StreetAddress,
    OrganizationName,
    OrganizationalUnitName,
    Title,
    TelephoneNumber,
    Name,
    GivenName,
    Initials,
    Pseudonym,
    EmailAddress,
}

impl NameField {
    /// Every field, in pattern-token order.
    pub const ALL: [NameField; 15] = [
        NameField::CommonName,
        NameField::Surname,
        NameField::CountryName,
        NameField::LocalityName,
        NameField::StateOrProvinceName,
        NameField::StreetAddress,
        NameField::OrganizationName,
        NameField::OrganizationalUnitName,
        NameField::Title,
        NameField::TelephoneNumber,
        NameField::Name,
        NameField::GivenName,
        NameField::Initials,
        NameField::Pseudonym,
        NameField::EmailAddress,
    ];

    /// The token spelling used in naming patterns.
    pub fn token(self) -> &'static str {
        match self {
            NameField::CommonName => "common_name",
            NameField::Surname => "surname",
            NameField::CountryName => "country_name",
            NameField::LocalityName => "locality_name",
            NameField::StateOrProvinceName => "state_or_province_name",
            NameField::StreetAddress => "street_address",
            NameField::OrganizationName => "organization_name",
            NameField::OrganizationalUnitName => "organizational_unit_name",
            NameField::Title => "title",
            NameField::TelephoneNumber => "telephone_number",
            NameField::Name => "name",
            NameField::GivenName => "given_name",
            NameField::Initials => "initials",
            NameField::Pseudonym => "pseudonym",
            NameField::EmailAddress => "email_address",
        }
    }

    /// Looks up a field by its token spelling.
    pub fn from_token(token: &str) -> Option<Self> {
        NameField::ALL.into_iter().find(|field| field.token() == token)
    }

    /// The X.520 / PKCS#9 attribute type for this field.
    pub fn oid(self) -> ObjectIdentifier {
        match self {
            NameField::CommonName => rfc4519::CN,
            NameField::Surname => rfc4519::SN,
            NameField::CountryName => rfc4519::C,
            NameField::LocalityName => rfc4519::L,
            NameField::StateOrProvinceName => rfc4519::ST,
            NameField::StreetAddress => rfc4519::STREET,
            NameField::OrganizationName => rfc4519::O,
            NameField::OrganizationalUnitName => rfc4519::OU,
            NameField::Title => rfc4519::TITLE,
            NameField::TelephoneNumber => rfc4519::TELEPHONE_NUMBER,
            NameField::Name => rfc4519::NAME,
            NameField::GivenName => rfc4519::GIVEN_NAME,
            NameField::Initials => rfc4519::INITIALS,
            NameField::Pseudonym => rfc3280::PSEUDONYM,
            NameField::EmailAddress => rfc3280::EMAIL_ADDRESS,
        }
    }

    fn from_oid(oid: &ObjectIdentifier) -> Option<Self> {
        NameField::ALL.into_iter().find(|field| field.oid() == *oid)
    }
}

/// Subject or issuer attributes of a certificate, keyed by [`NameField`].
///
/// Attributes outside the closed field set are dropped while reading.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DistinguishedName(BTreeMap<NameField, String>);

impl DistinguishedName {
    /// Creates an empty name.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an attribute, replacing any previous value.
    pub fn with(mut self, field: NameField, value: impl Into<String>) -> Self {
        self.0.insert(field, value.into());
        self
    }

    /// Returns the attribute value, if present.
    pub fn get(&self, field: NameField) -> Option<&str> {
        self.0.get(&field).map(String::as_str)
    }

    /// Iterates over the present attributes.
    pub fn iter(&self) -> impl Iterator<Item = (NameField, &str)> {
        self.0.iter().map(|(field, value)| (*field, value.as_str()))
    }

    /// Creates a `DistinguishedName` from an X.509-compatible format.
    ///
    /// # Arguments
    /// * `x509dn` - An `x509_cert::name::DistinguishedName` object.
    ///
    /// # Returns
    /// A `DistinguishedName` holding every recognised attribute that decodes as text.
    /// When an attribute repeats, the last occurrence wins.
    pub fn from_x509_name(x509dn: &x509_cert::name::DistinguishedName) -> Self {
        let mut name = DistinguishedName::new();
        for rdn in x509dn.0.iter() {
            for attr in rdn.0.iter() {
                let Some(field) = NameField::from_oid(&attr.oid) else {
                    continue;
                };
                if let Some(text) = attribute_text(&attr.value) {
                    name.0.insert(field, text);
                }
            }
        }
        name
    }
}

/// Decodes a directory string into text.
///
/// UTF8String and the ASCII string types share a byte representation;
/// BMPString is UTF-16BE.
fn attribute_text(value: &Any) -> Option<String> {
    match value.tag() {
        Tag::BmpString => {
            let bytes = value.value();
            if bytes.len() % 2 != 0 {
                return None;
            }
            let units = bytes
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]));
            char::decode_utf16(units).collect::<Result<String, _>>().ok()
        }
        _ => String::from_utf8(value.value().to_vec()).ok(),
    }
}
