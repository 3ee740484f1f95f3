//! # certmass - Bulk Installation of Signature Certificates
//!
//! certmass provisions signature certificates together with their private-key
//! containers onto a cryptographic service provider's store. It decides what
//! to install, in which order and under which name; the provider itself is
//! reached through the [`store::CertificateStore`] trait, so any provider
//! binding can drive it.
//!
//! ## Key Features
//!
//! - **Pair discovery**: match certificates with folder containers by public key
//! - **Idempotent installs**: already linked certificates are skipped
//! - **Container naming**: patterns such as `#subject.surname #subject.initials`
//! - **Non-exportable keys**: folder containers are re-imported through a temporary pfx
//! - **Fast renames**: registry and disk-image containers are renamed in place
//! - **Batch runs**: from `settings.json`, a CSV manifest or discovery
//!
//! ## Supported Container Formats
//!
//! - **Folder containers**: a directory with `header.key`, `masks.key`,
//!   `masks2.key`, `primary.key` and `primary2.key`
//! - **PFX**: PKCS #12 archives carrying the key and the certificate
//!
//! ## Quick Start
//!
//! ### Installing One Pair
//!
//! ```rust,ignore
//! use certmass::install::{InstallOutcome, InstallParams, Installer};
//! use certmass::rename::UserContext;
//!
//! # fn main() -> certmass::error::Result<()> {
//! let store = MyProviderStore::new();
//! let user = UserContext::current();
//! let installer = Installer::new(&store, &user, "/var/opt/cprocsp/keys/ivanov");
//!
//! let params = InstallParams::builder()
//!     .container_path("certs/ivanov.000")
//!     .certificate_path("certs/ivanov.cer")
//!     .container_name("#subject.surname #subject.initials")
//!     .exportable(false)
//!     .build();
//!
//! match installer.install(&params)? {
//!     InstallOutcome::Installed(container) => println!("Installed {container}"),
//!     InstallOutcome::AlreadyInstalled { thumbprint } => println!("{thumbprint} already present"),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ### Naming a Container
//!
//! ```rust
//! use certmass::cert::{Certificate, DistinguishedName, NameField};
//! use certmass::naming::format_container_name;
//! # use time::macros::datetime;
//!
//! # let certificate = Certificate {
//! #     thumbprint: String::new(),
//! #     subject: DistinguishedName::new()
//! #         .with(NameField::Surname, "Иванов")
//! #         .with(NameField::GivenName, "Иван Петрович"),
//! #     issuer: DistinguishedName::new(),
//! #     not_before: datetime!(2024-01-01 0:00 UTC),
//! #     not_after: datetime!(2025-01-01 0:00 UTC),
//! #     is_ca: false,
//! #     standard_key: false,
//! #     short_public_key: None,
//! # };
//! let name = format_container_name("#subject.surname #subject.initials", &certificate);
//! assert_eq!(name.normal, "Иванов И.П.");
//! ```
//!
//! ## Error Handling
//!
//! Every terminal condition is a [`error::CertMassError`] variant:
//!
//! ```rust
//! use certmass::error::CertMassError;
//! use certmass::install::check_container_files;
//!
//! match check_container_files(std::path::Path::new("missing.000")) {
//!     Ok(()) => println!("Container looks complete"),
//!     Err(CertMassError::MalformedContainer { reason, .. }) => println!("Malformed: {reason}"),
//!     Err(e) => println!("Other error: {e}"),
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`store`]: The provider capability trait and container model
//! - [`cert`]: Certificate reading, subject attributes and thumbprints
//! - [`naming`]: Container name patterns
//! - [`pairing`]: Certificate/container discovery
//! - [`rename`]: Rename strategies and the user identity cache
//! - [`install`]: Provisioning of one pair
//! - [`batch`]: Manifest sources and batch runs
//! - [`export`]: Export to pfx
//! - [`roots`]: Trust-anchor installation
//! - [`settings`], [`paths`], [`logging`], [`cli`]: Configuration and the command line
//! - [`error`]: Error types

pub mod batch;
pub mod cert;
pub mod cli;
pub mod error;
pub mod export;
pub mod install;
pub mod logging;
pub mod naming;
pub mod pairing;
pub mod paths;
pub mod rename;
pub mod roots;
pub mod settings;
pub mod store;
