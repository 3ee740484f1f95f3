//! Command-line surface.
//!
//! The crate ships no provider binding, so there is no binary here. A binary
//! that owns a [`CertificateStore`] implementation parses [`Cli`] and hands
//! both to [`run`]:
//!
//! ```rust,ignore
//! use clap::Parser;
//!
//! fn main() -> std::process::ExitCode {
//!     let cli = certmass::cli::Cli::parse();
//!     let result = certmass::cli::run(&cli, &MyProviderStore::new());
//!     std::process::ExitCode::from(certmass::cli::exit_code(&result))
//! }
//! ```

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing::{debug, error, info};

use crate::batch::{collect_entries, install_single, run_batch};
use crate::error::{CertMassError, Result};
use crate::export::{ExportParams, export_container};
use crate::install::{InstallParams, Installer};
use crate::logging::{self, LogOptions};
use crate::paths::default_root_containers_folder;
use crate::rename::UserContext;
use crate::roots::install_root_certificates;
use crate::settings::{RunFlags, Settings};
use crate::store::CertificateStore;

#[derive(Debug, Parser)]
#[command(name = "certmass", version, about = "Bulk installation of signature certificates and key containers")]
pub struct Cli {
    /// Show debug records on the console
    #[arg(long, global = true)]
    pub debug: bool,

    /// Exit without waiting for Enter
    #[arg(long, global = true)]
    pub skip_wait: bool,

    /// Do not install trust anchors from <certs>/root
    #[arg(long, global = true)]
    pub skip_root: bool,

    /// Allow private keys to be exported after installation
    #[arg(long, global = true)]
    pub exportable: bool,

    /// Directory holding certificates and containers
    #[arg(long, global = true, default_value = "certs")]
    pub certs: PathBuf,

    /// The provider's root containers folder
    #[arg(long, global = true)]
    pub root_folder: Option<PathBuf>,

    /// Settings file
    #[arg(long, global = true, default_value = "settings.json")]
    pub settings: PathBuf,

    /// CSV install manifest
    #[arg(long, global = true, default_value = "data.csv")]
    pub manifest: PathBuf,

    /// Directory for per-run log files
    #[arg(long, global = true, default_value = "logs")]
    pub log_dir: PathBuf,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Install one certificate with its container
    Install(InstallArgs),
    /// Export a container to a pfx file
    Export(ExportArgs),
}

#[derive(Debug, Args)]
pub struct InstallArgs {
    /// Path to the pfx file or container folder
    #[arg(long)]
    pub cont: Option<PathBuf>,

    /// Path to the certificate file
    #[arg(long)]
    pub cert: Option<PathBuf>,

    /// Container name pattern
    #[arg(long)]
    pub name: Option<String>,

    /// Password of the pfx file
    #[arg(long = "pfx-pass", alias = "pfx_pass")]
    pub pfx_pass: Option<String>,
}

#[derive(Debug, Args)]
pub struct ExportArgs {
    /// Container folder path or provider container name
    #[arg(long)]
    pub cont: Option<String>,

    /// Certificate to link before exporting
    #[arg(long)]
    pub cert: Option<PathBuf>,

    /// New container name
    #[arg(long)]
    pub name: Option<String>,

    /// Password of the produced pfx file
    #[arg(long = "pfx-pass", alias = "pfx_pass")]
    pub pfx_pass: Option<String>,

    /// Output pfx file or directory
    #[arg(long)]
    pub out: Option<PathBuf>,
}

impl Cli {
    fn flags(&self) -> RunFlags {
        RunFlags {
            debug: self.debug,
            skip_wait: self.skip_wait,
            skip_root: self.skip_root,
            exportable: self.exportable,
        }
    }
}

/// Loads settings, installs logging and runs the selected command.
pub fn run<S: CertificateStore + ?Sized>(cli: &Cli, store: &S) -> Result<()> {
    let mut settings = Settings::load(&cli.settings)?;
    let mut flags = cli.flags();
    settings.merge_flags(&mut flags);

    let options = LogOptions::builder()
        .debug(flags.debug)
        .log_dir(cli.log_dir.clone())
        .build();
    if let Some(path) = logging::init(&options)? {
        debug!("Log file: {}", path.display());
    }
    debug!("certmass version {}", env!("CARGO_PKG_VERSION"));

    execute(cli, &settings, flags, store).inspect_err(|e| error!("{e}"))
}

/// Runs the selected command with already merged settings.
///
/// Does not touch the global subscriber.
pub fn execute<S: CertificateStore + ?Sized>(
    cli: &Cli,
    settings: &Settings,
    flags: RunFlags,
    store: &S,
) -> Result<()> {
    std::fs::create_dir_all(&cli.certs)?;
    let user = UserContext::current();
    let root_folder = match &cli.root_folder {
        Some(folder) => folder.clone(),
        None => {
            let username = user
                .username()
                .ok_or_else(|| CertMassError::MissingParameter("current user name".to_string()))?;
            default_root_containers_folder(username)?
        }
    };
    let installer = Installer::new(store, &user, root_folder);

    match &cli.command {
        Some(Command::Install(args)) => {
            let params = InstallParams {
                container_path: args.cont.clone().unwrap_or_default(),
                certificate_path: args.cert.clone().unwrap_or_default(),
                container_name: args.name.clone(),
                pfx_password: args.pfx_pass.clone(),
                exportable: Some(flags.exportable),
            };
            install_single(&installer, store, &cli.certs, &params)?;
        }
        Some(Command::Export(args)) => {
            let params = ExportParams {
                container: args.cont.clone(),
                certificate_path: args.cert.clone(),
                container_name: args.name.clone(),
                pfx_password: args.pfx_pass.clone().unwrap_or_default(),
                output: args.out.clone(),
            };
            export_container(store, &user, &cli.certs, installer.root_containers_folder(), &params)?;
        }
        None => {
            if !flags.skip_root {
                install_root_certificates(store, &cli.certs);
            }
            let entries = collect_entries(settings, &cli.manifest, &cli.certs, store)?;
            run_batch(&installer, store, &entries, &settings.default, &cli.certs);
            if !flags.skip_wait {
                wait_for_enter();
            }
        }
    }
    Ok(())
}

/// Process exit status for a run result.
///
/// `0` on success, `1` when configuration or logging could not be set up,
/// `2` when an install or export failed.
pub fn exit_code(result: &Result<()>) -> u8 {
    match result {
        Ok(()) => 0,
        Err(CertMassError::Settings(_) | CertMassError::Logging(_) | CertMassError::Manifest(_)) => 1,
        Err(_) => 2,
    }
}

fn wait_for_enter() {
    info!("Installation finished");
    print!("\n\n\nInstallation finished, press Enter:");
    let _ = io::stdout().flush();
    let mut line = String::new();
    let _ = io::stdin().lock().read_line(&mut line);
}
