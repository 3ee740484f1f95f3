//! Log sinks: the console and a per-run log file.

use std::fs::{self, File};
use std::path::PathBuf;
use std::sync::Mutex;

use bon::Builder;
use time::OffsetDateTime;
use time::macros::format_description;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

use crate::error::{CertMassError, Result};

/// Logging setup.
///
/// # Fields
/// * `debug` - Show debug records on the console.
/// * `log_dir` - Directory for the per-run log file; no file is written when unset.
#[derive(Clone, Debug, Default, Builder)]
pub struct LogOptions {
    #[builder(default)]
    pub debug: bool,
    #[builder(into)]
    pub log_dir: Option<PathBuf>,
}

/// Installs the global subscriber.
///
/// The console shows INFO (DEBUG with `debug`) without timestamps or targets.
/// The log file always records DEBUG and is named after the start time,
/// `logger-<dd-mm-yyyy HH-MM-SS>.log`.
///
/// # Returns
/// The path of the log file, if one was opened.
pub fn init(options: &LogOptions) -> Result<Option<PathBuf>> {
    let console_level = if options.debug {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let console = fmt::layer()
        .without_time()
        .with_target(false)
        .with_filter(console_level);

    let (file_layer, log_path) = match &options.log_dir {
        Some(dir) => {
            let path = dir.join(log_file_name(now()));
            let file = open_log_file(&path)?;
            let layer = fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .with_filter(LevelFilter::DEBUG);
            (Some(layer), Some(path))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file_layer)
        .try_init()
        .map_err(|e| CertMassError::Logging(e.to_string()))?;
    Ok(log_path)
}

fn open_log_file(path: &std::path::Path) -> Result<File> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .map_err(|e| CertMassError::Logging(format!("cannot create {}: {e}", dir.display())))?;
    }
    File::create(path).map_err(|e| CertMassError::Logging(format!("cannot create {}: {e}", path.display())))
}

fn now() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

fn log_file_name(at: OffsetDateTime) -> String {
    let format = format_description!("[day]-[month]-[year] [hour]-[minute]-[second]");
    let stamp = at.format(&format).unwrap_or_else(|_| at.unix_timestamp().to_string());
    format!("logger-{stamp}.log")
}
