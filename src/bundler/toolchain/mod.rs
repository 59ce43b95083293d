//! OS toolchain capability.
//!
//! Every interaction with the host's binary tools (`otool`, `lipo`,
//! `install_name_tool`, `codesign`, `hdiutil`, `notarytool`, `stapler`)
//! goes through the [`Toolchain`] trait. The dependency graph, codesigner
//! and packager are generic over it, so the whole pipeline can run against
//! [`SystemToolchain`] in production and a recording fake in tests.

pub mod system;
pub mod tool_detection;

#[cfg(test)]
pub(crate) mod fake;

pub use system::SystemToolchain;

use crate::bundler::{error::Result, platform::macos::sign::SigningIdentity};
use serde::Deserialize;
use std::{
    future::Future,
    path::{Path, PathBuf},
};

/// Structured view of a binary's dylib-related load commands.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadCommands {
    /// The binary's own install name (`LC_ID_DYLIB`), libraries only.
    pub install_id: Option<String>,
    /// Library references in load-command order.
    pub references: Vec<String>,
    /// Run-path entries in declaration order.
    pub rpaths: Vec<String>,
}

/// One `codesign` invocation.
#[derive(Debug, Clone)]
pub struct SignRequest<'a> {
    pub path: &'a Path,
    pub identity: &'a SigningIdentity,
    pub entitlements: Option<&'a Path>,
    pub hardened_runtime: bool,
    /// Keep identifier, entitlements and flags of an existing signature.
    /// Used when re-signing after link editing.
    pub preserve_metadata: bool,
}

impl<'a> SignRequest<'a> {
    pub fn new(path: &'a Path, identity: &'a SigningIdentity) -> Self {
        Self {
            path,
            identity,
            entitlements: None,
            hardened_runtime: false,
            preserve_metadata: false,
        }
    }

    pub fn with_runtime(mut self, entitlements: Option<&'a Path>) -> Self {
        self.hardened_runtime = true;
        self.entitlements = entitlements;
        self
    }

    pub fn preserving_metadata(mut self) -> Self {
        self.preserve_metadata = true;
        self
    }
}

/// Remote notarization job state as reported by `notarytool`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum NotarizationState {
    #[serde(rename = "In Progress")]
    InProgress,
    Accepted,
    Invalid,
    Rejected,
}

impl NotarizationState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, NotarizationState::InProgress)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NotarizationState::InProgress => "In Progress",
            NotarizationState::Accepted => "Accepted",
            NotarizationState::Invalid => "Invalid",
            NotarizationState::Rejected => "Rejected",
        }
    }
}

/// Result of one notarization status check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotarizationStatus {
    pub state: NotarizationState,
    /// Where the service's log for this submission can be fetched.
    pub log_ref: Option<String>,
}

/// Capabilities the bundling pipeline needs from the host OS.
pub trait Toolchain {
    /// Library references, rpaths and install id of a binary.
    fn inspect_binary(&self, path: &Path) -> impl Future<Output = Result<LoadCommands>> + Send;

    /// Architecture names contained in a binary.
    fn architectures(&self, path: &Path) -> impl Future<Output = Result<Vec<String>>> + Send;

    /// Replaces one library reference inside `binary`.
    fn rewrite_reference(
        &self,
        binary: &Path,
        old: &str,
        new: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Sets the install name of a library.
    fn set_identity(&self, binary: &Path, id: &str) -> impl Future<Output = Result<()>> + Send;

    /// Removes one run-path entry from `binary`.
    fn delete_rpath(&self, binary: &Path, rpath: &str) -> impl Future<Output = Result<()>> + Send;

    /// Replaces the run-path entry `old` of `binary` with `new`.
    fn change_rpath(
        &self,
        binary: &Path,
        old: &str,
        new: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    fn sign(&self, request: &SignRequest<'_>) -> impl Future<Output = Result<()>> + Send;

    /// `Ok(false)` when the signature check ran and rejected the file.
    fn verify_signature(&self, path: &Path) -> impl Future<Output = Result<bool>> + Send;

    /// Builds a compressed read-only disk image of `source` at `output`.
    fn create_disk_image(
        &self,
        source: &Path,
        output: &Path,
        volume_name: &str,
    ) -> impl Future<Output = Result<PathBuf>> + Send;

    /// Uploads `path` and returns the submission id. Does not wait.
    fn submit_for_notarization(
        &self,
        path: &Path,
        profile: &str,
    ) -> impl Future<Output = Result<String>> + Send;

    fn poll_notarization(
        &self,
        submission_id: &str,
        profile: &str,
    ) -> impl Future<Output = Result<NotarizationStatus>> + Send;

    /// Attaches the notarization ticket to `path`.
    fn staple(&self, path: &Path) -> impl Future<Output = Result<()>> + Send;
}
