//! Dependency relocation settings.

use std::path::{Path, PathBuf};

/// Install-name prefix used for relocated libraries unless overridden.
pub const DEFAULT_INSIDE_LIB_PATH: &str = "@executable_path/../libs/";

/// Prefixes whose libraries are never bundled.
pub const DEFAULT_IGNORE_PREFIXES: &[&str] = &["/usr/lib/", "/System/Library/"];

/// Environment variables consulted by `with_env_search_paths`.
pub const DYLD_SEARCH_VARIABLES: &[&str] = &[
    "DYLD_LIBRARY_PATH",
    "DYLD_FALLBACK_FRAMEWORK_PATH",
    "DYLD_FALLBACK_LIBRARY_PATH",
];

/// Settings for one dependency discovery and relocation run.
///
/// Constructed via [`DylibSettingsBuilder`](super::DylibSettingsBuilder),
/// which validates and normalizes every path.
#[derive(Clone, Debug)]
pub struct DylibSettings {
    pub(super) files_to_fix: Vec<PathBuf>,
    pub(super) dest_dir: PathBuf,
    pub(super) inside_lib_path: String,
    pub(super) executable_dir: PathBuf,
    pub(super) search_paths: Vec<PathBuf>,
    pub(super) ignore_prefixes: Vec<PathBuf>,
    pub(super) overwrite_files: bool,
    pub(super) create_dir: bool,
    pub(super) codesign: bool,
    pub(super) scrub_rpaths: bool,
    pub(super) strict: bool,
    pub(super) dry_run: bool,
}

impl DylibSettings {
    /// Binaries whose references are rewritten (executables, plugins).
    pub fn files_to_fix(&self) -> &[PathBuf] {
        &self.files_to_fix
    }

    /// Directory receiving the relocated libraries.
    pub fn dest_dir(&self) -> &Path {
        &self.dest_dir
    }

    /// Install-name prefix of relocated libraries, always ending in `/`.
    pub fn inside_lib_path(&self) -> &str {
        &self.inside_lib_path
    }

    /// Directory substituted for `@executable_path`.
    pub fn executable_dir(&self) -> &Path {
        &self.executable_dir
    }

    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    pub fn ignore_prefixes(&self) -> &[PathBuf] {
        &self.ignore_prefixes
    }

    pub fn overwrite_files(&self) -> bool {
        self.overwrite_files
    }

    pub fn create_dir(&self) -> bool {
        self.create_dir
    }

    /// Ad-hoc re-sign every modified binary.
    pub fn codesign(&self) -> bool {
        self.codesign
    }

    /// Delete absolute rpaths that point outside the bundle from relocated libraries.
    pub fn scrub_rpaths(&self) -> bool {
        self.scrub_rpaths
    }

    /// Abort on the first per-library failure instead of recording it.
    pub fn strict(&self) -> bool {
        self.strict
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    /// Install name given to a relocated library.
    pub fn inner_path(&self, file_name: &str) -> String {
        format!("{}{}", self.inside_lib_path, file_name)
    }
}
