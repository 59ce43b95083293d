//! Command line argument parsing and validation.
//!
//! This module provides CLI argument parsing using clap derive,
//! with path validation before any command runs.

use crate::{config::ConfigFile, error::CliError};
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::{Path, PathBuf};

/// macOS application bundler
#[derive(Parser, Debug)]
#[command(
    name = "kodegen_bundler_macos",
    version,
    about = "Bundle dylibs, codesign and notarize macOS applications",
    long_about = "Makes macOS applications self-contained and distributable.

Copies non-system dynamic libraries into the bundle and rewrites load commands,
signs bundle trees inside-out, and builds signed, notarized disk images.

Usage:
  kodegen_bundler_macos create target/release/myapp -v 1.2.0 -i com.example
  kodegen_bundler_macos fix MyApp.app/Contents/MacOS/myapp -d MyApp.app/Contents/libs
  kodegen_bundler_macos sign MyApp.app -i \"Jane Appleseed (ABCDE12345)\"
  kodegen_bundler_macos package MyApp.app -k notary-profile

Environment: DEV_ID (signing identity), KEYCHAIN_PROFILE (notarytool profile)."
)]
pub struct Args {
    /// Show debug output, including every external command
    #[arg(long, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Configuration file (default: .macbundler.toml or macbundler.toml)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a .app bundle around an executable and bundle its libraries
    Create(CreateArgs),
    /// Copy the libraries of existing binaries into a directory and rewrite their references
    Fix(FixArgs),
    /// Sign a bundle and everything inside it
    Sign(SignArgs),
    /// Build, sign, notarize and staple a disk image
    Package(PackageArgs),
}

#[derive(ClapArgs, Debug)]
pub struct CreateArgs {
    /// Executable to wrap
    #[arg(value_name = "EXECUTABLE")]
    pub executable: PathBuf,

    /// Directory to create the bundle in (default: the executable's directory)
    #[arg(short = 'o', long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Bundle version
    #[arg(short = 'v', long, value_name = "VERSION")]
    pub version: Option<String>,

    /// Bundle identifier prefix (the identifier is <ID>.<name>)
    #[arg(short = 'i', long, value_name = "ID")]
    pub id: Option<String>,

    /// Bundle extension
    #[arg(short = 'e', long, value_name = "EXT")]
    pub extension: Option<String>,

    /// File or directory to copy into Contents/Resources (repeatable)
    #[arg(short = 'r', long = "resource", value_name = "PATH")]
    pub resources: Vec<PathBuf>,

    /// .icns icon file
    #[arg(long, value_name = "FILE")]
    pub icon: Option<PathBuf>,

    /// LSMinimumSystemVersion
    #[arg(long, value_name = "VERSION")]
    pub min_system_version: Option<String>,

    /// Do not ad-hoc sign modified binaries
    #[arg(long)]
    pub no_sign: bool,

    /// Log every step without touching the filesystem
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(ClapArgs, Debug)]
pub struct FixArgs {
    /// Binaries whose dependencies are bundled
    #[arg(value_name = "FILES", required = true)]
    pub files: Vec<PathBuf>,

    /// Directory the libraries are copied into
    #[arg(short = 'd', long, value_name = "DIR")]
    pub dest_dir: PathBuf,

    /// Install name prefix written into the binaries
    #[arg(short = 'p', long, value_name = "PREFIX")]
    pub install_path: Option<String>,

    /// Extra directory to search for libraries, globs allowed (repeatable)
    #[arg(short = 's', long = "search-path", value_name = "DIR")]
    pub search_paths: Vec<String>,

    /// Library prefix never bundled, added to the system defaults (repeatable)
    #[arg(short = 'x', long = "ignore", value_name = "DIR")]
    pub ignore: Vec<PathBuf>,

    /// Overwrite libraries already present in the destination
    #[arg(short = 'f', long)]
    pub force: bool,

    /// Stop at the first failing library
    #[arg(long)]
    pub strict: bool,

    /// Also search DYLD_LIBRARY_PATH and the DYLD fallback paths
    #[arg(long)]
    pub env_search_paths: bool,

    /// Do not ad-hoc sign modified binaries
    #[arg(long)]
    pub no_sign: bool,

    /// Print the copy plan without touching the filesystem
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(ClapArgs, Debug)]
pub struct SignArgs {
    /// Bundle or directory to sign
    #[arg(value_name = "BUNDLE")]
    pub bundle: PathBuf,

    /// Developer ID ("Name" or "Name (TEAMID)"); "-" for ad-hoc
    #[arg(short = 'i', long = "dev-id", value_name = "ID")]
    pub dev_id: Option<String>,

    /// Entitlements property list for apps
    #[arg(short = 'e', long, value_name = "FILE")]
    pub entitlements: Option<PathBuf>,

    /// Skip the final signature verification
    #[arg(long)]
    pub no_verify: bool,

    /// Stop at the first unit that fails to sign
    #[arg(long)]
    pub strict: bool,

    /// Print the signing plan without signing
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(ClapArgs, Debug)]
pub struct PackageArgs {
    /// Bundle or folder to put in the image
    #[arg(value_name = "SOURCE")]
    pub source: PathBuf,

    /// Disk image path (default: <source dir>/<source name>.dmg)
    #[arg(short = 'o', long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Volume name (default: the source name)
    #[arg(short = 'n', long, value_name = "NAME")]
    pub volume_name: Option<String>,

    /// Developer ID ("Name" or "Name (TEAMID)")
    #[arg(short = 'i', long = "dev-id", value_name = "ID")]
    pub dev_id: Option<String>,

    /// notarytool keychain profile
    #[arg(short = 'k', long, value_name = "PROFILE")]
    pub keychain_profile: Option<String>,

    /// Entitlements property list for apps
    #[arg(short = 'e', long, value_name = "FILE")]
    pub entitlements: Option<PathBuf>,

    /// Do not sign the bundle contents before imaging
    #[arg(long)]
    pub no_sign: bool,

    /// Skip notarization
    #[arg(long)]
    pub no_notarize: bool,

    /// Skip stapling
    #[arg(long)]
    pub no_staple: bool,

    /// Log every command without running it
    #[arg(long)]
    pub dry_run: bool,
}

fn require_exists(path: &Path) -> Result<(), CliError> {
    if path.exists() {
        Ok(())
    } else {
        Err(CliError::MissingInput {
            path: path.to_path_buf(),
        })
    }
}

impl Args {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate arguments for consistency
    pub fn validate(&self) -> Result<(), CliError> {
        match &self.command {
            Command::Create(args) => {
                require_exists(&args.executable)?;
                args.resources.iter().try_for_each(|r| require_exists(r))?;
            }
            Command::Fix(args) => {
                args.files.iter().try_for_each(|f| require_exists(f))?;
                if args.dest_dir.as_os_str().is_empty() {
                    return Err(CliError::InvalidArguments {
                        reason: "--dest-dir cannot be empty".to_string(),
                    });
                }
            }
            Command::Sign(args) => require_exists(&args.bundle)?,
            Command::Package(args) => {
                require_exists(&args.source)?;
                if let Some(entitlements) = &args.entitlements {
                    require_exists(entitlements)?;
                }
            }
        }
        Ok(())
    }

    /// Whether the command only plans and logs.
    pub fn is_dry_run(&self) -> bool {
        match &self.command {
            Command::Create(args) => args.dry_run,
            Command::Fix(args) => args.dry_run,
            Command::Sign(args) => args.dry_run,
            Command::Package(args) => args.dry_run,
        }
    }
}

/// Configuration derived from command line arguments and the config file
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Output manager for colored terminal output
    output: super::OutputManager,
    /// Parsed configuration file, empty when none was found
    file: ConfigFile,
}

impl RuntimeConfig {
    pub fn new(args: &Args, file: ConfigFile) -> Self {
        Self {
            output: super::OutputManager::new(args.verbose, !args.no_color),
            file,
        }
    }

    /// Get a reference to the output manager
    pub fn output(&self) -> &super::OutputManager {
        &self.output
    }

    pub fn file(&self) -> &ConfigFile {
        &self.file
    }
}
