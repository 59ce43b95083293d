//! Codesigning settings.

use crate::bundler::platform::macos::sign::SigningIdentity;
use std::path::PathBuf;

/// Settings for signing one bundle tree.
#[derive(Debug, Clone)]
pub struct SignSettings {
    /// Root of the bundle to sign (`.app`, `.framework`, ...).
    pub path: PathBuf,

    /// Identity for every signature. Parse it with
    /// [`SigningIdentity::resolve`] so malformed IDs fail before any work.
    pub identity: SigningIdentity,

    /// Entitlements applied to runtime bundles (the top level and nested `.app`s).
    ///
    /// Default: None
    pub entitlements: Option<PathBuf>,

    /// Re-check every signature after signing.
    ///
    /// Default: true
    pub verify: bool,

    /// Abort on the first failed unit instead of signing the rest.
    pub strict: bool,

    /// Report the plan without signing.
    pub dry_run: bool,
}

impl SignSettings {
    pub fn new(path: impl Into<PathBuf>, identity: SigningIdentity) -> Self {
        Self {
            path: path.into(),
            identity,
            entitlements: None,
            verify: true,
            strict: false,
            dry_run: false,
        }
    }
}
