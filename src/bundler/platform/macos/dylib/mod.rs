//! Dynamic library dependency discovery and bundling.
//!
//! [`DylibBundler`] inspects the files to fix, resolves every library
//! reference, and follows newly found libraries until no unvisited library
//! remains. The resulting [`DependencyGraph`] drives the relocation phase in
//! [`relocate`], which copies each library once and rewrites every
//! reference to its in-bundle install name.
//!
//! Running the whole process twice is a no-op: references that name a file
//! already present in the destination directory, through the install-name
//! prefix or by resolving into it, are classified as already bundled.

pub mod graph;
pub mod relocate;

pub use graph::{
    Dependency, DependencyGraph, DependencyId, ReferenceEdge, SkipKind, SkippedReference,
};
pub use relocate::{ProcessReport, RewrittenReference, UnitFailure};

use crate::bundler::{
    error::{Error, Result},
    platform::macos::{
        inspector::{FileChecks, validate_binary_file},
        resolver::{Resolution, ResolveContext, resolve},
    },
    settings::DylibSettings,
    toolchain::Toolchain,
};
use std::path::{Path, PathBuf};

/// Discovers and relocates the non-system libraries of a set of binaries.
pub struct DylibBundler<'a, T: Toolchain> {
    settings: DylibSettings,
    toolchain: &'a T,
    graph: DependencyGraph,
    /// Canonical destination, when it exists.
    dest_canonical: Option<PathBuf>,
    failures: Vec<UnitFailure>,
}

impl<'a, T: Toolchain> DylibBundler<'a, T> {
    pub fn new(settings: DylibSettings, toolchain: &'a T) -> Self {
        let dest_canonical = settings.dest_dir().canonicalize().ok();
        Self {
            settings,
            toolchain,
            graph: DependencyGraph::new(),
            dest_canonical,
            failures: Vec::new(),
        }
    }

    pub fn settings(&self) -> &DylibSettings {
        &self.settings
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Inspects one binary and resolves all of its references.
    ///
    /// Unresolved and skipped references are recorded on the graph rather
    /// than returned as errors. A binary is inspected at most once.
    pub async fn collect_dependencies(&mut self, file: &Path) -> Result<()> {
        let binary = file.canonicalize().map_err(|e| {
            Error::Validation(format!("cannot inspect {}: {}", file.display(), e))
        })?;
        if !self.graph.mark_inspected(&binary) {
            return Ok(());
        }

        log::debug!("Collecting dependencies of {}", binary.display());
        let commands = self.toolchain.inspect_binary(&binary).await?;
        let loader_dir = binary.parent().unwrap_or(Path::new("/")).to_path_buf();

        for reference in &commands.references {
            if commands.install_id.as_ref() == Some(reference) {
                continue;
            }

            let ctx = ResolveContext {
                loader_dir: &loader_dir,
                executable_dir: self.settings.executable_dir(),
                rpaths: &commands.rpaths,
                search_paths: self.settings.search_paths(),
                ignore_prefixes: self.settings.ignore_prefixes(),
                inside_lib_path: self.settings.inside_lib_path(),
                dest_dir: self.dest_canonical.as_deref(),
            };

            match resolve(reference, &ctx) {
                Resolution::Resolved(source) if source == binary => {}
                Resolution::Resolved(source) => {
                    self.add_resolved(&binary, reference, source)?;
                }
                Resolution::Skip(reason) => {
                    log::debug!("  skipping {} ({:?})", reference, reason);
                    self.graph.skip(&binary, reference, SkipKind::Skipped(reason));
                }
                Resolution::Unresolved => {
                    self.graph.skip(&binary, reference, SkipKind::Unresolved);
                }
            }
        }

        self.graph.set_rpaths(&binary, commands.rpaths);
        Ok(())
    }

    fn add_resolved(&mut self, binary: &Path, reference: &str, source: PathBuf) -> Result<()> {
        match self.try_add(binary, reference, source) {
            Ok(()) => Ok(()),
            Err(e) if self.settings.strict() => Err(e),
            Err(e) => {
                log::warn!("Not bundling {} referenced by {}: {}", reference, binary.display(), e);
                self.graph
                    .skip(binary, reference, SkipKind::Rejected(e.to_string()));
                Ok(())
            }
        }
    }

    fn try_add(&mut self, binary: &Path, reference: &str, source: PathBuf) -> Result<()> {
        if !self.graph.contains(&source) {
            validate_binary_file(&source, FileChecks::library())?;
        }
        let settings = &self.settings;
        self.graph
            .add_dependency(binary, reference, source, settings.dest_dir(), |name| {
                settings.inner_path(name)
            })?;
        Ok(())
    }

    /// Inspects every discovered library that has not been inspected yet,
    /// until the graph stops growing.
    pub async fn collect_sub_dependencies(&mut self) -> Result<()> {
        while let Some(id) = self.graph.next_pending() {
            let source = self.graph.dependency(id).source.clone();
            if self.graph.is_inspected(&source) {
                continue;
            }
            if let Err(e) = self.collect_dependencies(&source).await {
                self.record_failure(source, e)?;
            }
        }
        Ok(())
    }

    /// Collects the files to fix and their transitive dependencies.
    pub async fn collect_all(&mut self) -> Result<()> {
        for file in self.settings.files_to_fix().to_vec() {
            validate_binary_file(&file, FileChecks::library())?;
            self.collect_dependencies(&file).await?;
        }
        self.collect_sub_dependencies().await?;

        log::info!(
            "Found {} libraries to bundle ({} references skipped)",
            self.graph.dependencies().len(),
            self.graph.skipped().len()
        );
        Ok(())
    }

    /// Collects and relocates in one call.
    pub async fn fix(&mut self) -> Result<ProcessReport> {
        self.collect_all().await?;
        self.process_collected_deps().await
    }

    /// Records a per-unit failure, or returns it in strict mode.
    fn record_failure(&mut self, unit: PathBuf, error: Error) -> Result<()> {
        if self.settings.strict() {
            return Err(error);
        }
        log::warn!("{}: {}", unit.display(), error);
        self.failures.push(UnitFailure { unit, error });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundler::{
        settings::DylibSettingsBuilder,
        toolchain::fake::{Call, FakeBinary, FakeToolchain, read_binary, write_binary},
    };

    struct Layout {
        root: tempfile::TempDir,
    }

    impl Layout {
        fn new() -> Self {
            Self {
                root: tempfile::tempdir().unwrap(),
            }
        }

        fn path(&self, relative: &str) -> PathBuf {
            self.root.path().canonicalize().unwrap().join(relative)
        }

        fn binary(&self, relative: &str, binary: FakeBinary) -> PathBuf {
            let path = self.path(relative);
            write_binary(&path, &binary);
            path
        }

        fn settings(&self, files: &[&PathBuf]) -> DylibSettingsBuilder {
            DylibSettingsBuilder::new()
                .files_to_fix(files.iter().map(|p| p.as_path()))
                .dest_dir(self.path("App.app/Contents/libs"))
                .executable_dir(self.path("App.app/Contents/MacOS"))
                .create_dir(true)
        }
    }

    #[tokio::test]
    async fn test_rpath_dependency_is_relocated() {
        let layout = Layout::new();
        let foo = layout.binary(
            "vendor/lib/libfoo.dylib",
            FakeBinary::new(&["/usr/lib/libSystem.B.dylib"]).with_id("/vendor/lib/libfoo.dylib"),
        );
        let rpath = foo.parent().unwrap().display().to_string();
        let exe = layout.binary(
            "App.app/Contents/MacOS/App",
            FakeBinary::new(&["@rpath/libfoo.dylib", "/usr/lib/libSystem.B.dylib"])
                .with_rpaths(&[&rpath]),
        );

        let toolchain = FakeToolchain::new();
        let settings = layout.settings(&[&exe]).build().unwrap();
        let mut bundler = DylibBundler::new(settings, &toolchain);
        let report = bundler.fix().await.unwrap();

        let copied = layout.path("App.app/Contents/libs/libfoo.dylib");
        assert_eq!(report.copied, vec![copied.clone()]);
        assert!(report.failures.is_empty());

        let exe_after = read_binary(&exe).unwrap();
        assert_eq!(
            exe_after.references,
            vec!["@executable_path/../libs/libfoo.dylib", "/usr/lib/libSystem.B.dylib"]
        );
        let lib_after = read_binary(&copied).unwrap();
        assert_eq!(lib_after.id.as_deref(), Some("@executable_path/../libs/libfoo.dylib"));
        assert!(toolchain.signed_paths().contains(&copied));
        assert!(toolchain.signed_paths().contains(&exe));
    }

    #[tokio::test]
    async fn test_second_run_is_noop() {
        let layout = Layout::new();
        let foo = layout.binary("vendor/libfoo.dylib", FakeBinary::new(&[]));
        let exe = layout.binary(
            "App.app/Contents/MacOS/App",
            FakeBinary::new(&[&foo.display().to_string()]),
        );

        let first = FakeToolchain::new();
        DylibBundler::new(layout.settings(&[&exe]).build().unwrap(), &first)
            .fix()
            .await
            .unwrap();
        let snapshot = std::fs::read(&exe).unwrap();

        let second = FakeToolchain::new();
        let mut bundler = DylibBundler::new(layout.settings(&[&exe]).build().unwrap(), &second);
        let report = bundler.fix().await.unwrap();

        assert!(bundler.graph().is_empty());
        assert!(report.copied.is_empty());
        assert_eq!(second.mutating_calls(), 0);
        assert_eq!(std::fs::read(&exe).unwrap(), snapshot);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_aliases_share_one_copy() {
        let layout = Layout::new();
        let real = layout.binary("vendor/libfoo.1.dylib", FakeBinary::new(&[]));
        std::os::unix::fs::symlink(&real, layout.path("vendor/libfoo.dylib")).unwrap();

        let exe = layout.binary(
            "App.app/Contents/MacOS/App",
            FakeBinary::new(&[&real.display().to_string()]),
        );
        let plugin = layout.binary(
            "App.app/Contents/MacOS/plugin.so",
            FakeBinary::new(&[&layout.path("vendor/libfoo.dylib").display().to_string()]),
        );

        let toolchain = FakeToolchain::new();
        let settings = layout.settings(&[&exe, &plugin]).build().unwrap();
        let mut bundler = DylibBundler::new(settings, &toolchain);
        let report = bundler.fix().await.unwrap();

        assert_eq!(bundler.graph().dependencies().len(), 1);
        assert_eq!(report.copied.len(), 1);
        let entries = std::fs::read_dir(layout.path("App.app/Contents/libs")).unwrap().count();
        assert_eq!(entries, 1);
        for binary in [&exe, &plugin] {
            assert_eq!(
                read_binary(binary).unwrap().references,
                vec!["@executable_path/../libs/libfoo.1.dylib"]
            );
        }
    }

    #[tokio::test]
    async fn test_cycle_terminates() {
        let layout = Layout::new();
        let liba = layout.path("vendor/liba.dylib");
        let libb = layout.path("vendor/libb.dylib");
        write_binary(&liba, &FakeBinary::new(&["@loader_path/libb.dylib"]));
        write_binary(&libb, &FakeBinary::new(&["@loader_path/liba.dylib"]));
        let exe = layout.binary(
            "App.app/Contents/MacOS/App",
            FakeBinary::new(&[&liba.display().to_string()]),
        );

        let toolchain = FakeToolchain::new();
        let mut bundler = DylibBundler::new(layout.settings(&[&exe]).build().unwrap(), &toolchain);
        let report = bundler.fix().await.unwrap();

        let sources: Vec<_> = bundler
            .graph()
            .dependencies()
            .iter()
            .map(|d| d.source.clone())
            .collect();
        assert_eq!(sources, vec![liba, libb]);
        assert_eq!(report.copied.len(), 2);

        let copied_b = read_binary(&layout.path("App.app/Contents/libs/libb.dylib")).unwrap();
        assert_eq!(copied_b.references, vec!["@executable_path/../libs/liba.dylib"]);
    }

    #[tokio::test]
    async fn test_unresolved_reference_does_not_stop_others() {
        let layout = Layout::new();
        let foo = layout.binary("vendor/libfoo.dylib", FakeBinary::new(&[]));
        let exe = layout.binary(
            "App.app/Contents/MacOS/App",
            FakeBinary::new(&["@rpath/libmissing.dylib", &foo.display().to_string()]),
        );

        let toolchain = FakeToolchain::new();
        let mut bundler = DylibBundler::new(layout.settings(&[&exe]).build().unwrap(), &toolchain);
        let report = bundler.fix().await.unwrap();

        assert_eq!(report.copied.len(), 1);
        assert!(report
            .skipped
            .iter()
            .any(|s| s.reference == "@rpath/libmissing.dylib" && s.kind == SkipKind::Unresolved));
        assert_eq!(
            read_binary(&exe).unwrap().references,
            vec!["@rpath/libmissing.dylib", "@executable_path/../libs/libfoo.dylib"]
        );
    }

    #[tokio::test]
    async fn test_invalid_library_is_rejected_unless_strict() {
        let layout = Layout::new();
        let empty = layout.path("vendor/libempty.dylib");
        std::fs::create_dir_all(empty.parent().unwrap()).unwrap();
        std::fs::write(&empty, b"").unwrap();
        let good = layout.binary("vendor/libgood.dylib", FakeBinary::new(&[]));
        let exe = layout.binary(
            "App.app/Contents/MacOS/App",
            FakeBinary::new(&[&empty.display().to_string(), &good.display().to_string()]),
        );

        let toolchain = FakeToolchain::new();
        let mut bundler = DylibBundler::new(layout.settings(&[&exe]).build().unwrap(), &toolchain);
        let report = bundler.fix().await.unwrap();
        assert_eq!(report.copied.len(), 1);
        assert!(report.skipped.iter().any(|s| matches!(s.kind, SkipKind::Rejected(_))));

        let strict = FakeToolchain::new();
        let settings = layout.settings(&[&exe]).strict(true).build().unwrap();
        let err = DylibBundler::new(settings, &strict).fix().await.unwrap_err();
        assert!(err.is_validation());
        assert_eq!(strict.mutating_calls(), 0);
    }

    #[tokio::test]
    async fn test_existing_destination_requires_overwrite() {
        let layout = Layout::new();
        let foo = layout.binary("vendor/libfoo.dylib", FakeBinary::new(&[]));
        layout.binary("App.app/Contents/libs/libfoo.dylib", FakeBinary::new(&["stale"]));
        let exe = layout.binary(
            "App.app/Contents/MacOS/App",
            FakeBinary::new(&[&foo.display().to_string()]),
        );

        let toolchain = FakeToolchain::new();
        let settings = layout.settings(&[&exe]).strict(true).build().unwrap();
        let err = DylibBundler::new(settings, &toolchain).fix().await.unwrap_err();
        assert!(matches!(err, Error::DestinationExists(_)));

        let toolchain = FakeToolchain::new();
        let settings = layout.settings(&[&exe]).overwrite_files(true).build().unwrap();
        let report = DylibBundler::new(settings, &toolchain).fix().await.unwrap();
        assert_eq!(report.copied.len(), 1);
        assert!(read_binary(&layout.path("App.app/Contents/libs/libfoo.dylib"))
            .unwrap()
            .references
            .is_empty());
    }

    #[tokio::test]
    async fn test_missing_destination_without_create_dir() {
        let layout = Layout::new();
        let foo = layout.binary("vendor/libfoo.dylib", FakeBinary::new(&[]));
        let exe = layout.binary("bin/app", FakeBinary::new(&[&foo.display().to_string()]));

        let toolchain = FakeToolchain::new();
        let settings = layout.settings(&[&exe]).create_dir(false).build().unwrap();
        let err = DylibBundler::new(settings, &toolchain).fix().await.unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[tokio::test]
    async fn test_dry_run_plans_without_changes() {
        let layout = Layout::new();
        let foo = layout.binary("vendor/libfoo.dylib", FakeBinary::new(&[]));
        let exe = layout.binary(
            "App.app/Contents/MacOS/App",
            FakeBinary::new(&[&foo.display().to_string()]),
        );

        let toolchain = FakeToolchain::new();
        let settings = layout.settings(&[&exe]).dry_run(true).build().unwrap();
        let report = DylibBundler::new(settings, &toolchain).fix().await.unwrap();

        assert_eq!(report.planned.len(), 1);
        assert!(report.copied.is_empty());
        assert!(!layout.path("App.app/Contents/libs").exists());
        assert_eq!(toolchain.mutating_calls(), 0);
    }

    #[tokio::test]
    async fn test_absolute_rpaths_scrubbed_from_copies() {
        let layout = Layout::new();
        let foo = layout.binary(
            "vendor/libfoo.dylib",
            FakeBinary::new(&[]).with_rpaths(&["/build/machine/lib", "@loader_path"]),
        );
        let exe = layout.binary(
            "App.app/Contents/MacOS/App",
            FakeBinary::new(&[&foo.display().to_string()]),
        );

        let toolchain = FakeToolchain::new();
        DylibBundler::new(layout.settings(&[&exe]).build().unwrap(), &toolchain)
            .fix()
            .await
            .unwrap();

        let copied = layout.path("App.app/Contents/libs/libfoo.dylib");
        assert!(toolchain.calls().contains(&Call::ChangeRpath {
            binary: copied.clone(),
            old: "/build/machine/lib".into(),
            new: "@executable_path/../libs".into(),
        }));
        assert_eq!(
            read_binary(&copied).unwrap().rpaths,
            vec!["@executable_path/../libs", "@loader_path"]
        );
    }

    #[tokio::test]
    async fn test_leaking_rpaths_of_fixed_files_point_into_bundle() {
        let layout = Layout::new();
        let foo = layout.binary("vendor/libfoo.dylib", FakeBinary::new(&[]));
        let exe = layout.binary(
            "App.app/Contents/MacOS/App",
            FakeBinary::new(&[&foo.display().to_string()]).with_rpaths(&[
                "/build/machine/a",
                "/build/machine/b",
                "@loader_path/../Frameworks",
            ]),
        );

        let toolchain = FakeToolchain::new();
        DylibBundler::new(layout.settings(&[&exe]).build().unwrap(), &toolchain)
            .fix()
            .await
            .unwrap();

        let calls = toolchain.calls();
        assert!(calls.contains(&Call::ChangeRpath {
            binary: exe.clone(),
            old: "/build/machine/a".into(),
            new: "@executable_path/../libs".into(),
        }));
        assert!(calls.contains(&Call::DeleteRpath {
            binary: exe.clone(),
            rpath: "/build/machine/b".into(),
        }));
        assert_eq!(
            read_binary(&exe).unwrap().rpaths,
            vec!["@executable_path/../libs", "@loader_path/../Frameworks"]
        );
        assert!(toolchain.signed_paths().contains(&exe));
    }

    #[tokio::test]
    async fn test_rpaths_kept_when_scrubbing_disabled() {
        let layout = Layout::new();
        let foo = layout.binary("vendor/libfoo.dylib", FakeBinary::new(&[]));
        let exe = layout.binary(
            "App.app/Contents/MacOS/App",
            FakeBinary::new(&[&foo.display().to_string()]).with_rpaths(&["/build/machine/a"]),
        );

        let toolchain = FakeToolchain::new();
        let settings = layout.settings(&[&exe]).scrub_rpaths(false).build().unwrap();
        DylibBundler::new(settings, &toolchain).fix().await.unwrap();

        assert_eq!(read_binary(&exe).unwrap().rpaths, vec!["/build/machine/a"]);
    }

    #[tokio::test]
    async fn test_rpath_install_prefix_is_bundled() {
        let layout = Layout::new();
        let foo = layout.binary(
            "vendor/lib/libfoo.dylib",
            FakeBinary::new(&[]).with_id("@rpath/libfoo.dylib"),
        );
        let rpath = foo.parent().unwrap().display().to_string();
        let exe = layout.binary(
            "App.app/Contents/MacOS/App",
            FakeBinary::new(&["@rpath/libfoo.dylib"]).with_rpaths(&[&rpath]),
        );

        let toolchain = FakeToolchain::new();
        let settings = layout.settings(&[&exe]).inside_lib_path("@rpath/").build().unwrap();
        let report = DylibBundler::new(settings, &toolchain).fix().await.unwrap();

        let copied = layout.path("App.app/Contents/libs/libfoo.dylib");
        assert_eq!(report.copied, vec![copied.clone()]);
        assert!(report.skipped.is_empty());
        assert!(report.failures.is_empty());

        let exe_after = read_binary(&exe).unwrap();
        assert_eq!(exe_after.references, vec!["@rpath/libfoo.dylib"]);
        assert_eq!(exe_after.rpaths, vec!["@loader_path/../libs"]);
        assert_eq!(read_binary(&copied).unwrap().id.as_deref(), Some("@rpath/libfoo.dylib"));
        assert!(toolchain.signed_paths().contains(&exe));

        let second = FakeToolchain::new();
        let settings = layout.settings(&[&exe]).inside_lib_path("@rpath/").build().unwrap();
        let report = DylibBundler::new(settings, &second).fix().await.unwrap();
        assert!(report.copied.is_empty());
        assert_eq!(second.mutating_calls(), 0);
    }

    #[tokio::test]
    async fn test_link_edit_failure_is_recorded_unless_strict() {
        let layout = Layout::new();
        let foo = layout.binary("vendor/libfoo.dylib", FakeBinary::new(&[]));
        let exe = layout.binary(
            "App.app/Contents/MacOS/App",
            FakeBinary::new(&[&foo.display().to_string()]),
        );
        let copied = layout.path("App.app/Contents/libs/libfoo.dylib");

        let toolchain = FakeToolchain::new().failing_edit(&exe);
        let report = DylibBundler::new(layout.settings(&[&exe]).build().unwrap(), &toolchain)
            .fix()
            .await
            .unwrap();
        assert_eq!(report.copied, vec![copied.clone()]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].unit, exe);
        assert!(toolchain.signed_paths().contains(&copied));
        assert!(!toolchain.signed_paths().contains(&exe));

        let toolchain = FakeToolchain::new().failing_edit(&exe);
        let settings = layout
            .settings(&[&exe])
            .overwrite_files(true)
            .strict(true)
            .build()
            .unwrap();
        let err = DylibBundler::new(settings, &toolchain).fix().await.unwrap_err();
        assert!(matches!(err, Error::ToolExecution { .. }));
        assert!(toolchain.signed_paths().is_empty());
    }

    #[tokio::test]
    async fn test_identity_failure_leaves_references_alone() {
        let layout = Layout::new();
        let foo = layout.binary("vendor/libfoo.dylib", FakeBinary::new(&[]));
        let reference = foo.display().to_string();
        let exe = layout.binary("App.app/Contents/MacOS/App", FakeBinary::new(&[&reference]));
        let copied = layout.path("App.app/Contents/libs/libfoo.dylib");

        let toolchain = FakeToolchain::new().failing_edit(&copied);
        let report = DylibBundler::new(layout.settings(&[&exe]).build().unwrap(), &toolchain)
            .fix()
            .await
            .unwrap();
        assert!(report.copied.is_empty());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].unit, foo);
        assert_eq!(read_binary(&exe).unwrap().references, vec![reference]);

        let toolchain = FakeToolchain::new().failing_edit(&copied);
        let settings = layout
            .settings(&[&exe])
            .overwrite_files(true)
            .strict(true)
            .build()
            .unwrap();
        let err = DylibBundler::new(settings, &toolchain).fix().await.unwrap_err();
        assert!(matches!(err, Error::ToolExecution { .. }));
        assert!(!toolchain
            .calls()
            .iter()
            .any(|call| matches!(call, Call::Rewrite { .. } | Call::Sign { .. })));
    }

    #[tokio::test]
    async fn test_adhoc_sign_retried_on_fresh_copy() {
        let layout = Layout::new();
        let foo = layout.binary("vendor/libfoo.dylib", FakeBinary::new(&[]));
        let exe = layout.binary(
            "App.app/Contents/MacOS/App",
            FakeBinary::new(&[&foo.display().to_string()]),
        );

        let toolchain = FakeToolchain::new().failing_sign_once(&exe);
        let report = DylibBundler::new(layout.settings(&[&exe]).build().unwrap(), &toolchain)
            .fix()
            .await
            .unwrap();

        assert!(report.failures.is_empty());
        let attempts = toolchain.signed_paths().iter().filter(|p| **p == exe).count();
        assert_eq!(attempts, 2);
        assert_eq!(
            read_binary(&exe).unwrap().references,
            vec!["@executable_path/../libs/libfoo.dylib"]
        );
    }

    #[tokio::test]
    async fn test_persistent_sign_failure_fatal_only_for_arm64() {
        let layout = Layout::new();
        let foo = layout.binary("vendor/libfoo.dylib", FakeBinary::new(&[]));
        let reference = foo.display().to_string();
        let exe = layout.binary(
            "App.app/Contents/MacOS/App",
            FakeBinary::new(&[&reference]).with_architectures(&["x86_64"]),
        );

        let toolchain = FakeToolchain::new().failing_sign(&exe);
        let report = DylibBundler::new(layout.settings(&[&exe]).build().unwrap(), &toolchain)
            .fix()
            .await
            .unwrap();
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].unit, exe);
        let attempts = toolchain.signed_paths().iter().filter(|p| **p == exe).count();
        assert_eq!(attempts, 2);

        let arm = layout.binary(
            "Arm.app/Contents/MacOS/Arm",
            FakeBinary::new(&[&reference]).with_architectures(&["x86_64", "arm64"]),
        );
        let toolchain = FakeToolchain::new().failing_sign(&arm);
        let settings = DylibSettingsBuilder::new()
            .file_to_fix(&arm)
            .dest_dir(layout.path("Arm.app/Contents/libs"))
            .executable_dir(layout.path("Arm.app/Contents/MacOS"))
            .create_dir(true)
            .build()
            .unwrap();
        let err = DylibBundler::new(settings, &toolchain).fix().await.unwrap_err();
        assert!(matches!(err, Error::ToolExecution { .. }));
    }
}
