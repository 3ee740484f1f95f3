//! `settings.json` configuration.
//!
//! ```json
//! {
//!   "default": { "namePattern": "#subject.surname #subject.initials", "pfxPassword": "", "exportable": false },
//!   "args": { "skipRoot": true, "skipWait": true, "debug": false },
//!   "items": [ { "containerPath": "ivanov.000", "certificatePath": "ivanov.cer" } ]
//! }
//! ```
//!
//! Every key is optional.

use std::path::Path;

use serde::Deserialize;

use crate::error::{CertMassError, Result};

/// Defaults applied to manifest entries that leave a value unset.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DefaultBlock {
    pub name_pattern: Option<String>,
    pub pfx_password: Option<String>,
    pub exportable: Option<bool>,
}

/// Overrides for command-line flags.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ArgsBlock {
    pub exportable: Option<bool>,
    pub skip_root: Option<bool>,
    pub skip_wait: Option<bool>,
    pub debug: Option<bool>,
}

/// One manifest line, from `settings.items` or the CSV manifest.
///
/// Paths are relative to the certificates directory.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InstallEntry {
    #[serde(alias = "pfx", alias = "container")]
    pub container_path: String,
    #[serde(alias = "cert")]
    pub certificate_path: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, alias = "password", alias = "pfx_password")]
    pub pfx_password: Option<String>,
    #[serde(default)]
    pub exportable: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct Settings {
    #[serde(default, alias = "Default")]
    pub default: DefaultBlock,
    #[serde(default, alias = "Args")]
    pub args: ArgsBlock,
    #[serde(default, alias = "Items")]
    pub items: Option<Vec<InstallEntry>>,
}

/// Run-wide switches after settings overrides are applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunFlags {
    pub debug: bool,
    pub skip_wait: bool,
    pub skip_root: bool,
    pub exportable: bool,
}

impl Settings {
    /// Loads settings from `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| CertMassError::Settings(format!("cannot read {}: {e}", path.display())))?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Applies `args` overrides to command-line flags.
    ///
    /// `default.exportable` takes precedence over `args.exportable`; when
    /// neither is set, the command-line value becomes the default for entries.
    pub fn merge_flags(&mut self, flags: &mut RunFlags) {
        if let Some(debug) = self.args.debug {
            flags.debug = debug;
        }
        if let Some(skip_wait) = self.args.skip_wait {
            flags.skip_wait = skip_wait;
        }
        if let Some(skip_root) = self.args.skip_root {
            flags.skip_root = skip_root;
        }
        if self.default.exportable.is_some() {
            self.args.exportable = self.default.exportable;
        }
        match self.args.exportable {
            Some(exportable) => flags.exportable = exportable,
            None => self.default.exportable = Some(flags.exportable),
        }
    }

    /// The explicit manifest, if one was configured.
    pub fn items(&self) -> Option<&[InstallEntry]> {
        self.items.as_deref().filter(|items| !items.is_empty())
    }
}
