//! Copy-and-rewrite phase of dependency bundling.
//!
//! Runs in three passes so that every library exists at its destination
//! before any binary is pointed at it:
//!
//! 1. copy each dependency once, give the copy its new install name, and
//!    point rpaths that leak build-machine paths at the bundle
//! 2. rewrite every recorded reference, in the copies and in the files to fix,
//!    and fix the rpaths of the files to fix the same way
//! 3. ad-hoc re-sign everything that was modified, retrying once on a fresh
//!    copy of the file

use super::{DependencyId, DylibBundler};
use crate::bundler::{
    error::{Error, ErrorExt, Result},
    platform::macos::{
        resolver::{LOADER_PATH, RPATH},
        sign::SigningIdentity,
    },
    toolchain::{SignRequest, Toolchain},
    utils::fs,
};
use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

/// A unit (library or binary) whose processing failed.
#[derive(Debug)]
pub struct UnitFailure {
    pub unit: PathBuf,
    pub error: Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewrittenReference {
    pub binary: PathBuf,
    pub old: String,
    pub new: String,
}

/// Outcome of [`DylibBundler::process_collected_deps`].
#[derive(Debug, Default)]
pub struct ProcessReport {
    /// Destination paths of the copied libraries.
    pub copied: Vec<PathBuf>,
    pub rewritten: Vec<RewrittenReference>,
    /// Dry run only: `(source, destination)` pairs that would be copied.
    pub planned: Vec<(PathBuf, PathBuf)>,
    pub skipped: Vec<super::SkippedReference>,
    pub failures: Vec<UnitFailure>,
}

impl ProcessReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

impl<T: Toolchain> DylibBundler<'_, T> {
    /// Copies every collected dependency into the destination directory
    /// and rewrites all references to it.
    ///
    /// Per-unit failures are collected in the report unless strict mode is
    /// set, in which case the first one is returned.
    pub async fn process_collected_deps(&mut self) -> Result<ProcessReport> {
        let mut report = ProcessReport {
            skipped: self.graph.skipped().to_vec(),
            failures: std::mem::take(&mut self.failures),
            ..Default::default()
        };

        if self.graph.is_empty() {
            log::info!("No libraries to bundle");
            return Ok(report);
        }

        if self.settings.dry_run() {
            self.report_plan(&mut report);
            return Ok(report);
        }

        self.prepare_dest_dir().await?;
        log::info!(
            "Bundling {} libraries into {}",
            self.graph.dependencies().len(),
            self.settings.dest_dir().display()
        );

        let mut failed: HashSet<DependencyId> = HashSet::new();
        for id in self.graph.ids() {
            if let Err(e) = self.install_dependency(id).await {
                let unit = self.graph.dependency(id).source.clone();
                self.fail(unit, e, &mut report)?;
                failed.insert(id);
            } else {
                report.copied.push(self.graph.dependency(id).install_path.clone());
            }
        }

        let mut modified = Vec::new();
        for id in self.graph.ids().filter(|id| !failed.contains(id)) {
            let dependency = self.graph.dependency(id);
            let (source, target) = (dependency.source.clone(), dependency.install_path.clone());
            match self.rewrite_edges(&source, &target, &failed, &mut report).await {
                Ok(_) => modified.push(target),
                Err(e) => self.fail(target, e, &mut report)?,
            }
        }
        for file in self.settings.files_to_fix().to_vec() {
            let binary = file.canonicalize().unwrap_or(file);
            let changed = match self.rewrite_edges(&binary, &binary, &failed, &mut report).await {
                Ok(edges) => self
                    .fix_rpaths(&binary, &binary)
                    .await
                    .map(|rpaths| edges + rpaths),
                Err(e) => Err(e),
            };
            match changed {
                Ok(0) => {}
                Ok(_) => modified.push(binary),
                Err(e) => self.fail(binary, e, &mut report)?,
            }
        }

        if self.settings.codesign() {
            for path in modified {
                if let Err(e) = self.adhoc_sign(&path).await {
                    if self.is_arm64(&path).await {
                        return Err(e);
                    }
                    self.fail(path, e, &mut report)?;
                }
            }
        }

        log::info!(
            "✓ Bundled {} libraries, rewrote {} references",
            report.copied.len(),
            report.rewritten.len()
        );
        Ok(report)
    }

    fn report_plan(&self, report: &mut ProcessReport) {
        for dependency in self.graph.dependencies() {
            log::info!(
                "[DRY RUN] copy {} -> {} (id {})",
                dependency.source.display(),
                dependency.install_path.display(),
                dependency.inner_path
            );
            report
                .planned
                .push((dependency.source.clone(), dependency.install_path.clone()));
        }
        for edge in self.graph.edges() {
            let new = &self.graph.dependency(edge.dependency).inner_path;
            if &edge.reference != new {
                log::info!(
                    "[DRY RUN] {}: {} -> {}",
                    edge.binary.display(),
                    edge.reference,
                    new
                );
            }
        }
    }

    async fn prepare_dest_dir(&self) -> Result<()> {
        let dest = self.settings.dest_dir();
        if dest.is_dir() {
            return Ok(());
        }
        if dest.exists() {
            return Err(Error::Configuration(format!(
                "{} exists and is not a directory",
                dest.display()
            )));
        }
        if !self.settings.create_dir() {
            return Err(Error::Configuration(format!(
                "destination directory {} does not exist",
                dest.display()
            )));
        }
        fs::create_dir_all(dest).await
    }

    async fn install_dependency(&self, id: DependencyId) -> Result<()> {
        let dependency = self.graph.dependency(id);
        let target = &dependency.install_path;

        if target.exists() {
            let same_file = target.canonicalize().ok();
            if same_file.as_deref() == Some(dependency.source.as_path()) {
                return Ok(());
            }
            if !self.settings.overwrite_files() {
                return Err(Error::DestinationExists(target.clone()));
            }
        }

        log::debug!(
            "Copying {} -> {}",
            dependency.source.display(),
            target.display()
        );
        fs::copy_file(&dependency.source, target).await?;
        fs::set_mode(target, 0o755).await?;

        self.toolchain
            .set_identity(target, &dependency.inner_path)
            .await?;
        self.fix_rpaths(&dependency.source, target).await?;
        Ok(())
    }

    fn leaks_build_path(&self, rpath: &str) -> bool {
        let path = Path::new(rpath);
        path.is_absolute() && !path.starts_with(self.settings.dest_dir())
    }

    /// Run-path entry under which `binary` finds the relocated libraries.
    ///
    /// The install-name prefix itself, unless the prefix is `@rpath`-based,
    /// in which case the destination directory relative to `binary`.
    fn bundle_rpath(&self, binary: &Path) -> String {
        let prefix = self.settings.inside_lib_path().trim_end_matches('/');
        if !prefix.starts_with(RPATH) {
            return prefix.to_string();
        }

        let dest = self.settings.dest_dir();
        let dest = dest.canonicalize().unwrap_or_else(|_| dest.to_path_buf());
        let dir = binary.parent().unwrap_or(Path::new("/"));
        let dir = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
        match pathdiff::diff_paths(&dest, &dir) {
            Some(relative) if relative.as_os_str().is_empty() => LOADER_PATH.to_string(),
            Some(relative) => format!("{}/{}", LOADER_PATH, relative.display()),
            None => dest.display().to_string(),
        }
    }

    /// Points the build-machine rpaths that `source` declared at the bundle,
    /// editing `target`. The first leaking entry is replaced, later ones are
    /// deleted. Returns how many entries changed.
    async fn fix_rpaths(&self, source: &Path, target: &Path) -> Result<usize> {
        if !self.settings.scrub_rpaths() {
            return Ok(0);
        }

        let rpaths = self.graph.rpaths(source);
        let replacement = self.bundle_rpath(target);
        let mut replaced = rpaths.iter().any(|r| *r == replacement);
        let mut changed = 0;
        for rpath in rpaths.iter().filter(|r| self.leaks_build_path(r)) {
            if replaced {
                log::debug!("Removing rpath {} from {}", rpath, target.display());
                self.toolchain.delete_rpath(target, rpath).await?;
            } else {
                log::debug!("  {}: rpath {} -> {}", target.display(), rpath, replacement);
                self.toolchain.change_rpath(target, rpath, &replacement).await?;
                replaced = true;
            }
            changed += 1;
        }
        Ok(changed)
    }

    /// Ad-hoc signs `path`. A failed attempt is retried once after moving
    /// the file through a temporary directory, which gives it a new inode.
    async fn adhoc_sign(&self, path: &Path) -> Result<()> {
        let identity = SigningIdentity::AdHoc;
        let request = SignRequest::new(path, &identity).preserving_metadata();
        let Err(e) = self.toolchain.sign(&request).await else {
            return Ok(());
        };

        log::warn!(
            "Ad-hoc signing {} failed, retrying on a fresh copy: {}",
            path.display(),
            e
        );
        refresh_inode(path).await?;
        self.toolchain.sign(&request).await
    }

    /// Whether `path` carries an arm64 slice.
    async fn is_arm64(&self, path: &Path) -> bool {
        self.toolchain
            .architectures(path)
            .await
            .is_ok_and(|archs| archs.iter().any(|a| a.starts_with("arm64")))
    }

    /// Rewrites the references recorded for `binary` inside `target`.
    /// Returns how many references changed.
    async fn rewrite_edges(
        &self,
        binary: &Path,
        target: &Path,
        failed: &HashSet<DependencyId>,
        report: &mut ProcessReport,
    ) -> Result<usize> {
        let mut changed = 0;
        for edge in self.graph.edges_from(binary) {
            if failed.contains(&edge.dependency) {
                continue;
            }
            let new = &self.graph.dependency(edge.dependency).inner_path;
            if &edge.reference == new {
                continue;
            }
            log::debug!("  {}: {} -> {}", target.display(), edge.reference, new);
            self.toolchain
                .rewrite_reference(target, &edge.reference, new)
                .await?;
            report.rewritten.push(RewrittenReference {
                binary: target.to_path_buf(),
                old: edge.reference.clone(),
                new: new.clone(),
            });
            changed += 1;
        }
        Ok(changed)
    }

    fn fail(&self, unit: PathBuf, error: Error, report: &mut ProcessReport) -> Result<()> {
        if self.settings.strict() {
            return Err(error);
        }
        log::warn!("Failed to process {}: {}", unit.display(), error);
        report.failures.push(UnitFailure { unit, error });
        Ok(())
    }
}

/// Replaces `path` with a copy of itself made through a temporary directory.
async fn refresh_inode(path: &Path) -> Result<()> {
    let name = path
        .file_name()
        .ok_or_else(|| Error::GenericError(format!("{} has no file name", path.display())))?;
    let temp_dir = tempfile::Builder::new()
        .prefix("macbundler.")
        .tempdir()
        .fs_context("creating temporary directory", std::env::temp_dir())?;
    let copy = temp_dir.path().join(name);

    fs::copy_file(path, &copy).await?;
    fs::remove_file(path).await?;
    fs::copy_file(&copy, path).await
}
