//! Container-name templates.
//!
//! A pattern mixes free text with tokens:
//!
//! - `#subject.<field>` / `#issuer.<field>` for any [`NameField`] token,
//! - `#expire_after` / `#expire_before` for the validity bounds as `dd.mm.yyyy`.
//!
//! ```
//! use certmass::cert::{Certificate, DistinguishedName, NameField};
//! use certmass::naming::format_container_name;
//! # use time::macros::datetime;
//! # let certificate = Certificate {
//! #     thumbprint: String::new(),
//! #     subject: DistinguishedName::new()
//! #         .with(NameField::Surname, "Петров")
//! #         .with(NameField::GivenName, "Иван Сергеевич"),
//! #     issuer: DistinguishedName::new(),
//! #     not_before: datetime!(2024-01-01 0:00 UTC),
//! #     not_after: datetime!(2025-03-15 0:00 UTC),
//! #     is_ca: false,
//! #     standard_key: false,
//! #     short_public_key: None,
//! # };
//! let name = format_container_name("#subject.surname #subject.initials #expire_after", &certificate);
//! assert_eq!(name.normal, "Петров И.С. 15.03.2025");
//! ```

use std::sync::LazyLock;

use regex::{Captures, Regex};
use time::OffsetDateTime;
use time::macros::format_description;

use crate::cert::{Certificate, DistinguishedName, NameField};

/// Substituted for attributes the certificate does not carry.
pub const MISSING_ATTRIBUTE: &str = "None";

/// Known tokens only, longest field first, so a token followed by `_` or
/// letters still matches.
static TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    let mut fields: Vec<&str> = NameField::ALL.iter().map(|field| field.token()).collect();
    fields.sort_by_key(|token| std::cmp::Reverse(token.len()));
    let pattern = format!(
        r"#(?:(subject|issuer)\.({})|(expire_after|expire_before))",
        fields.join("|")
    );
    Regex::new(&pattern).expect("token pattern is valid")
});

/// A container name in the two representations the provider needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerName {
    /// Normalised form used for logs and identifiers.
    pub normal: String,
    /// Windows-1251 bytes expected by the provider's rename entry points.
    pub legacy: Vec<u8>,
}

impl ContainerName {
    /// True when formatting failed.
    pub fn is_empty(&self) -> bool {
        self.normal.is_empty()
    }
}

/// Renders a naming pattern against a certificate.
///
/// # Arguments
/// * `pattern` - The template, e.g. `#subject.surname #subject.initials - #subject.title`.
/// * `certificate` - Supplies subject/issuer attributes and validity.
///
/// # Returns
/// The rendered name, or an empty `ContainerName` when the result cannot be
/// represented in the legacy code page. Unknown tokens are kept verbatim.
pub fn format_container_name(pattern: &str, certificate: &Certificate) -> ContainerName {
    let normal = substitute(pattern, certificate);
    match encode_legacy(&normal) {
        Some(legacy) => ContainerName { normal, legacy },
        None => {
            tracing::debug!("Container name [{normal}] is not representable in windows-1251");
            ContainerName::default()
        }
    }
}

/// Transcodes text into the provider's legacy single-byte code page.
///
/// # Returns
/// `None` when a character has no Windows-1251 representation.
pub fn encode_legacy(text: &str) -> Option<Vec<u8>> {
    let (bytes, _, unmappable) = encoding_rs::WINDOWS_1251.encode(text);
    if unmappable {
        return None;
    }
    Some(bytes.into_owned())
}

fn substitute(pattern: &str, certificate: &Certificate) -> String {
    TOKEN
        .replace_all(pattern, |caps: &Captures<'_>| {
            if let Some(bound) = caps.get(3) {
                let date = match bound.as_str() {
                    "expire_after" => certificate.not_after,
                    _ => certificate.not_before,
                };
                return format_date(date);
            }

            let Some(field) = NameField::from_token(&caps[2]) else {
                return caps[0].to_string();
            };
            let name = match &caps[1] {
                "subject" => &certificate.subject,
                _ => &certificate.issuer,
            };
            attribute_or_missing(name, field)
        })
        .into_owned()
}

fn attribute_or_missing(name: &DistinguishedName, field: NameField) -> String {
    if let Some(value) = name.get(field) {
        return value.to_string();
    }
    if field == NameField::Initials {
        if let Some(given_name) = name.get(NameField::GivenName) {
            return initials(given_name);
        }
    }
    MISSING_ATTRIBUTE.to_string()
}

/// First letter of every word, each followed by a period.
fn initials(given_name: &str) -> String {
    given_name
        .split_whitespace()
        .filter_map(|word| word.chars().next())
        .flat_map(|letter| [letter, '.'])
        .collect()
}

fn format_date(date: OffsetDateTime) -> String {
    let format = format_description!("[day].[month].[year]");
    date.format(&format).unwrap_or_default()
}
