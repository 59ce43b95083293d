//! Disk image naming and output preparation.
//!
//! Handles the bookkeeping around `hdiutil create`:
//! - default image path and volume name derived from the source
//! - removing a stale image and creating the output directory
//! - finding the bundles to sign when the source is a plain folder

use crate::bundler::{
    error::{Error, Result},
    platform::macos::sign::bundle_kind,
    utils::fs,
};
use std::path::{Path, PathBuf};

fn source_stem(source: &Path) -> Result<String> {
    source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::Validation(format!("{} has no file name", source.display())))
}

/// `<source parent>/<source stem>.dmg`
pub fn default_output(source: &Path) -> Result<PathBuf> {
    let stem = source_stem(source)?;
    let parent = source.parent().unwrap_or(Path::new("."));
    Ok(parent.join(format!("{stem}.dmg")))
}

/// Volume name shown in Finder: the source stem.
pub fn default_volume_name(source: &Path) -> Result<String> {
    source_stem(source)
}

/// Removes an existing image at `output` and creates its directory.
pub async fn prepare_output(output: &Path) -> Result<()> {
    if output.exists() {
        log::debug!("Removing existing image {}", output.display());
        fs::remove_file(output).await?;
    }
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }
    Ok(())
}

/// Bundles whose signatures must be in place before imaging.
///
/// A bundle source is signed as a whole; for a plain folder every signable
/// bundle directly inside it is signed.
pub fn bundles_to_sign(source: &Path) -> Result<Vec<PathBuf>> {
    if bundle_kind(source).is_some() {
        return Ok(vec![source.to_path_buf()]);
    }
    if !source.is_dir() {
        return Ok(Vec::new());
    }

    let mut bundles = Vec::new();
    for entry in std::fs::read_dir(source)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() && bundle_kind(&path).is_some() {
            bundles.push(path);
        }
    }
    bundles.sort();
    Ok(bundles)
}
