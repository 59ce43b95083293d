//! macOS application bundle (.app) creation.

use crate::bundler::{
    error::{Context, Error, ErrorExt, Result},
    platform::macos::{
        dylib::{DylibBundler, ProcessReport},
        inspector::{BinaryFile, FileChecks, validate_binary_file},
    },
    settings::{AppSettings, DylibSettingsBuilder},
    toolchain::Toolchain,
    utils::fs,
};
use std::path::{Path, PathBuf};

/// Bundle package type (`APPL`) followed by the creator code.
const PKG_INFO: &str = "APPL????";

/// Icon file name referenced when no icon is supplied.
const DEFAULT_ICON_FILE: &str = "app.icns";

/// Result of [`create_bundle`].
#[derive(Debug)]
pub struct CreatedBundle {
    pub path: PathBuf,
    /// Library relocation outcome, a plan when dry-running.
    pub report: ProcessReport,
}

/// Directory layout of one bundle.
struct Layout {
    bundle: PathBuf,
    contents: PathBuf,
    macos: PathBuf,
    resources: PathBuf,
    libs: PathBuf,
    executable: PathBuf,
}

impl Layout {
    fn new(settings: &AppSettings) -> Result<Self> {
        let target = &settings.executable;
        let name = target
            .file_name()
            .context(format!("{} has no file name", target.display()))?;
        let stem = target
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        let extension = if settings.extension.starts_with('.') {
            settings.extension.clone()
        } else {
            format!(".{}", settings.extension)
        };
        let output_dir = settings
            .output_dir
            .clone()
            .or_else(|| target.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."));

        let bundle = output_dir.join(format!("{stem}{extension}"));
        let contents = bundle.join("Contents");
        Ok(Self {
            macos: contents.join("MacOS"),
            resources: contents.join("Resources"),
            libs: contents.join("libs"),
            executable: contents.join("MacOS").join(name),
            contents,
            bundle,
        })
    }
}

/// Assembles a `.app` around `settings.executable` and bundles its
/// non-system libraries into `Contents/libs`.
///
/// An existing bundle at the target location is replaced.
pub async fn create_bundle<T: Toolchain>(
    settings: &AppSettings,
    toolchain: &T,
) -> Result<CreatedBundle> {
    validate_binary_file(&settings.executable, FileChecks::executable())?;
    if let Some(icon) = &settings.icon {
        validate_icon(icon)?;
    }
    for resource in &settings.resources {
        if !resource.exists() {
            return Err(Error::Validation(format!(
                "Resource does not exist: {}",
                resource.display()
            )));
        }
    }

    let layout = Layout::new(settings)?;
    let binary = BinaryFile::inspect(&settings.executable, toolchain).await?;
    match binary.architectures.as_slice() {
        [] => {}
        [arch] => log::info!("Target architecture: {}", arch),
        archs => log::info!("Target is universal binary: {}", archs.join(", ")),
    }

    if settings.dry_run {
        log::info!("[DRY RUN] Would create bundle at {}", layout.bundle.display());
        log::info!(
            "[DRY RUN] Would copy {} to {}",
            settings.executable.display(),
            layout.executable.display()
        );
        for resource in settings.resources.iter().chain(&settings.icon) {
            log::info!("[DRY RUN] Would copy {} to Resources", resource.display());
        }

        let report = bundle_libraries(settings, &layout, &settings.executable, toolchain).await?;
        return Ok(CreatedBundle {
            path: layout.bundle,
            report,
        });
    }

    log::info!("Creating bundle at {}", layout.bundle.display());
    fs::remove_dir_all(&layout.bundle).await?;
    fs::create_dir_all(&layout.macos).await?;

    fs::copy_file(&settings.executable, &layout.executable)
        .await
        .with_context(|| format!("copying executable to {}", layout.executable.display()))?;
    fs::set_mode(&layout.executable, 0o755).await?;

    create_info_plist(settings, &layout)?;
    tokio::fs::write(layout.contents.join("PkgInfo"), PKG_INFO)
        .await
        .fs_context("writing PkgInfo", layout.contents.join("PkgInfo"))?;
    copy_resources(settings, &layout).await?;

    let report = bundle_libraries(settings, &layout, &layout.executable, toolchain).await?;
    log::info!("✓ Bundle created: {}", layout.bundle.display());
    Ok(CreatedBundle {
        path: layout.bundle,
        report,
    })
}

fn validate_icon(icon: &Path) -> Result<()> {
    if !icon.is_file() {
        return Err(Error::Validation(format!(
            "Icon file does not exist: {}",
            icon.display()
        )));
    }
    if icon.extension().and_then(|e| e.to_str()) != Some("icns") {
        log::warn!("Icon {} is not an .icns file", icon.display());
    }
    Ok(())
}

fn create_info_plist(settings: &AppSettings, layout: &Layout) -> Result<()> {
    let stem = settings
        .executable
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let executable = settings
        .executable
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let icon_file = settings
        .icon
        .as_ref()
        .and_then(|icon| icon.file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| DEFAULT_ICON_FILE.to_string());

    let mut dict = plist::Dictionary::new();
    dict.insert("CFBundleDevelopmentRegion".into(), "English".into());
    dict.insert("CFBundleExecutable".into(), executable.into());
    dict.insert(
        "CFBundleGetInfoString".into(),
        format!("{} {}", stem, settings.version).into(),
    );
    dict.insert("CFBundleIconFile".into(), icon_file.into());
    dict.insert(
        "CFBundleIdentifier".into(),
        format!("{}.{}", settings.bundle_id_prefix, stem).into(),
    );
    dict.insert("CFBundleInfoDictionaryVersion".into(), "6.0".into());
    dict.insert("CFBundleName".into(), stem.into());
    dict.insert("CFBundlePackageType".into(), "APPL".into());
    dict.insert(
        "CFBundleShortVersionString".into(),
        settings.version.clone().into(),
    );
    dict.insert("CFBundleSignature".into(), "????".into());
    dict.insert("CFBundleVersion".into(), settings.version.clone().into());
    dict.insert(
        "LSMinimumSystemVersion".into(),
        settings.min_system_version.clone().into(),
    );
    dict.insert("NSHighResolutionCapable".into(), true.into());
    dict.insert("NSPrincipalClass".into(), "NSApplication".into());

    plist::Value::Dictionary(dict).to_file_xml(layout.contents.join("Info.plist"))?;
    Ok(())
}

async fn copy_resources(settings: &AppSettings, layout: &Layout) -> Result<()> {
    if settings.resources.is_empty() && settings.icon.is_none() {
        return Ok(());
    }
    fs::create_dir_all(&layout.resources).await?;

    for resource in settings.resources.iter().chain(&settings.icon) {
        let name = resource
            .file_name()
            .context(format!("{} has no file name", resource.display()))?;
        let dest = layout.resources.join(name);
        if resource.is_dir() {
            fs::copy_dir(resource, &dest).await?;
        } else {
            fs::copy_file(resource, &dest).await?;
        }
        log::debug!("Added resource {}", dest.display());
    }
    Ok(())
}

async fn bundle_libraries<T: Toolchain>(
    settings: &AppSettings,
    layout: &Layout,
    executable: &Path,
    toolchain: &T,
) -> Result<ProcessReport> {
    log::info!("Bundling dynamic libraries for {}", executable.display());
    let dylib_settings = DylibSettingsBuilder::new()
        .file_to_fix(executable)
        .dest_dir(&layout.libs)
        .executable_dir(&layout.macos)
        .overwrite_files(true)
        .create_dir(true)
        .codesign(settings.codesign)
        .dry_run(settings.dry_run)
        .build()?;

    DylibBundler::new(dylib_settings, toolchain).fix().await
}
