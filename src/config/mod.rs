//! Optional project configuration file.
//!
//! Looked up as `--config <file>`, else `.macbundler.toml`, else
//! `macbundler.toml` in the current directory:
//!
//! ```toml
//! [create]
//! version = "2.1"
//! id = "com.example"
//!
//! [sign]
//! dev_id = "Jane Appleseed (ABCDE12345)"
//! entitlements = "entitlements.plist"
//!
//! [package]
//! keychain_profile = "notary"
//! ```
//!
//! Values here sit between command-line flags and the environment:
//! a flag always wins, and `DEV_ID` / `KEYCHAIN_PROFILE` are only
//! consulted when neither is set.

use crate::bundler::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable holding the signing identity.
pub const DEV_ID_ENV: &str = "DEV_ID";

/// Environment variable holding the notarytool keychain profile.
pub const KEYCHAIN_PROFILE_ENV: &str = "KEYCHAIN_PROFILE";

/// File names probed in the current directory, in order.
pub const CONFIG_FILE_NAMES: &[&str] = &[".macbundler.toml", "macbundler.toml"];

/// Parsed configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub create: CreateConfig,
    pub sign: SignConfig,
    pub package: PackageConfig,
}

/// `[create]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CreateConfig {
    pub version: Option<String>,
    /// Bundle identifier prefix.
    pub id: Option<String>,
    pub extension: Option<String>,
    pub icon: Option<PathBuf>,
    pub min_system_version: Option<String>,
}

/// `[sign]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SignConfig {
    pub dev_id: Option<String>,
    pub entitlements: Option<PathBuf>,
}

/// `[package]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PackageConfig {
    pub dev_id: Option<String>,
    pub keychain_profile: Option<String>,
    pub entitlements: Option<PathBuf>,
}

impl ConfigFile {
    /// Reads and parses `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::parse(&text)
            .map_err(|e| Error::Configuration(format!("{}: {}", path.display(), e)))
    }

    pub fn parse(text: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Loads the explicit file, or the first default file found in `dir`.
    ///
    /// Absent any file the configuration is empty. An explicit path that
    /// does not exist is an error.
    pub fn discover(explicit: Option<&Path>, dir: &Path) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        for name in CONFIG_FILE_NAMES {
            let candidate = dir.join(name);
            if candidate.is_file() {
                log::debug!("Using configuration {}", candidate.display());
                return Self::load(&candidate);
            }
        }
        Ok(Self::default())
    }
}

/// Reads a non-empty environment variable.
pub fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// First value present: flag, then configuration file, then environment.
pub fn layered(flag: Option<String>, file: Option<String>, env: &str) -> Option<String> {
    flag.or(file).or_else(|| env_value(env))
}
