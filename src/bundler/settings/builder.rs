//! Builder for constructing [`DylibSettings`].

use super::dylib::{
    DEFAULT_IGNORE_PREFIXES, DEFAULT_INSIDE_LIB_PATH, DYLD_SEARCH_VARIABLES, DylibSettings,
};
use crate::bundler::error::{Error, ErrorExt, Result};
use path_absolutize::Absolutize;
use std::path::{Path, PathBuf};

/// Builder for [`DylibSettings`].
///
/// ```no_run
/// use kodegen_bundler_macos::bundler::DylibSettingsBuilder;
///
/// # fn example() -> kodegen_bundler_macos::bundler::Result<()> {
/// let settings = DylibSettingsBuilder::new()
///     .file_to_fix("MyApp.app/Contents/MacOS/MyApp")
///     .dest_dir("MyApp.app/Contents/libs")
///     .search_path("/opt/homebrew/Cellar/*/lib")
///     .create_dir(true)
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct DylibSettingsBuilder {
    files_to_fix: Vec<PathBuf>,
    dest_dir: Option<PathBuf>,
    inside_lib_path: Option<String>,
    executable_dir: Option<PathBuf>,
    search_paths: Vec<String>,
    ignore_prefixes: Vec<PathBuf>,
    overwrite_files: bool,
    create_dir: bool,
    codesign: bool,
    scrub_rpaths: bool,
    strict: bool,
    dry_run: bool,
}

impl Default for DylibSettingsBuilder {
    fn default() -> Self {
        Self {
            files_to_fix: Vec::new(),
            dest_dir: None,
            inside_lib_path: None,
            executable_dir: None,
            search_paths: Vec::new(),
            ignore_prefixes: DEFAULT_IGNORE_PREFIXES.iter().map(PathBuf::from).collect(),
            overwrite_files: false,
            create_dir: false,
            codesign: true,
            scrub_rpaths: true,
            strict: false,
            dry_run: false,
        }
    }
}

impl DylibSettingsBuilder {
    pub fn new() -> Self {
        Default::default()
    }

    /// Adds a binary whose references should be rewritten.
    ///
    /// # Required
    ///
    /// At least one file is required for building.
    pub fn file_to_fix<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.files_to_fix.push(path.as_ref().to_path_buf());
        self
    }

    pub fn files_to_fix<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        self.files_to_fix
            .extend(paths.into_iter().map(|p| p.as_ref().to_path_buf()));
        self
    }

    /// Sets the directory receiving relocated libraries.
    ///
    /// # Required
    ///
    /// This field is required for building.
    pub fn dest_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.dest_dir = Some(path.as_ref().to_path_buf());
        self
    }

    /// Install-name prefix of relocated libraries.
    ///
    /// Default: `@executable_path/../libs/`
    pub fn inside_lib_path(mut self, prefix: impl Into<String>) -> Self {
        self.inside_lib_path = Some(prefix.into());
        self
    }

    /// Directory substituted for `@executable_path`.
    ///
    /// Default: parent directory of the first file to fix.
    pub fn executable_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.executable_dir = Some(path.as_ref().to_path_buf());
        self
    }

    /// Adds an extra library search directory. Glob patterns are expanded
    /// when building.
    pub fn search_path(mut self, path: impl Into<String>) -> Self {
        self.search_paths.push(path.into());
        self
    }

    /// Appends the directories listed in the dyld search variables.
    pub fn with_env_search_paths(mut self) -> Self {
        for var in DYLD_SEARCH_VARIABLES {
            if let Ok(value) = std::env::var(var) {
                self.search_paths.extend(
                    value
                        .split(':')
                        .filter(|entry| !entry.is_empty())
                        .map(str::to_string),
                );
            }
        }
        self
    }

    /// Adds a prefix whose libraries are left in place.
    pub fn ignore_prefix<P: AsRef<Path>>(mut self, prefix: P) -> Self {
        self.ignore_prefixes.push(prefix.as_ref().to_path_buf());
        self
    }

    /// Replaces the ignore list, dropping the defaults.
    pub fn ignore_prefixes<I, P>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        self.ignore_prefixes = prefixes
            .into_iter()
            .map(|p| p.as_ref().to_path_buf())
            .collect();
        self
    }

    pub fn overwrite_files(mut self, overwrite: bool) -> Self {
        self.overwrite_files = overwrite;
        self
    }

    /// Create the destination directory when missing.
    pub fn create_dir(mut self, create: bool) -> Self {
        self.create_dir = create;
        self
    }

    pub fn codesign(mut self, codesign: bool) -> Self {
        self.codesign = codesign;
        self
    }

    pub fn scrub_rpaths(mut self, scrub: bool) -> Self {
        self.scrub_rpaths = scrub;
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Validates and builds the settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] when no file to fix or no destination
    /// was given, or when the install-name prefix is empty.
    pub fn build(self) -> Result<DylibSettings> {
        if self.files_to_fix.is_empty() {
            return Err(Error::Configuration(
                "at least one file to fix is required".into(),
            ));
        }
        let dest_dir = self.dest_dir.ok_or_else(|| {
            Error::Configuration("a destination directory is required".into())
        })?;

        let mut inside_lib_path = self
            .inside_lib_path
            .unwrap_or_else(|| DEFAULT_INSIDE_LIB_PATH.to_string());
        if inside_lib_path.is_empty() {
            return Err(Error::Configuration(
                "the install-name prefix cannot be empty".into(),
            ));
        }
        if !inside_lib_path.ends_with('/') {
            inside_lib_path.push('/');
        }

        let files_to_fix = self
            .files_to_fix
            .iter()
            .map(|p| absolute(p))
            .collect::<Result<Vec<_>>>()?;
        let dest_dir = absolute(&dest_dir)?;
        let executable_dir = match self.executable_dir {
            Some(dir) => absolute(&dir)?,
            None => files_to_fix[0]
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("/")),
        };

        let mut search_paths = Vec::new();
        for entry in &self.search_paths {
            search_paths.extend(expand_search_path(entry)?);
        }

        Ok(DylibSettings {
            files_to_fix,
            dest_dir,
            inside_lib_path,
            executable_dir,
            search_paths,
            ignore_prefixes: self.ignore_prefixes,
            overwrite_files: self.overwrite_files,
            create_dir: self.create_dir,
            codesign: self.codesign,
            scrub_rpaths: self.scrub_rpaths,
            strict: self.strict,
            dry_run: self.dry_run,
        })
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    Ok(path
        .absolutize()
        .fs_context("resolving absolute path", path)?
        .into_owned())
}

/// Expands glob patterns; plain entries are kept even when missing.
fn expand_search_path(entry: &str) -> Result<Vec<PathBuf>> {
    if !entry.contains(['*', '?', '[']) {
        return Ok(vec![absolute(Path::new(entry))?]);
    }

    let mut matches: Vec<PathBuf> = glob::glob(entry)?
        .flatten()
        .filter(|path| path.is_dir())
        .collect();
    matches.sort();
    if matches.is_empty() {
        log::warn!("Search path pattern {} matched no directories", entry);
    }
    Ok(matches)
}
