//! External tool detection and availability checking.
//!
//! Each tool is looked up on `PATH` once per process; the result is cached
//! so repeated inspections during a bundling run never re-probe.

use std::{path::PathBuf, sync::LazyLock};

fn locate(tool: &str) -> Option<PathBuf> {
    match which::which(tool) {
        Ok(path) => {
            log::debug!("Found {} at: {}", tool, path.display());
            Some(path)
        }
        Err(e) => {
            log::debug!("{} not found in PATH: {}", tool, e);
            None
        }
    }
}

/// `otool`, for load command listing. Falls back to native parsing when absent.
pub static OTOOL: LazyLock<Option<PathBuf>> = LazyLock::new(|| locate("otool"));

/// `lipo`, for architecture listing. Falls back to native parsing when absent.
pub static LIPO: LazyLock<Option<PathBuf>> = LazyLock::new(|| locate("lipo"));

pub static INSTALL_NAME_TOOL: LazyLock<Option<PathBuf>> =
    LazyLock::new(|| locate("install_name_tool"));

pub static CODESIGN: LazyLock<Option<PathBuf>> = LazyLock::new(|| locate("codesign"));

pub static HDIUTIL: LazyLock<Option<PathBuf>> = LazyLock::new(|| locate("hdiutil"));

/// `xcrun`, which dispatches to `notarytool` and `stapler`.
pub static XCRUN: LazyLock<Option<PathBuf>> = LazyLock::new(|| locate("xcrun"));

/// Whether `otool` is available for load command extraction.
pub fn has_otool() -> bool {
    OTOOL.is_some()
}

/// Whether `lipo` is available for architecture listing.
pub fn has_lipo() -> bool {
    LIPO.is_some()
}

/// Resolved path of a mutating tool, or the bare name so the spawn error
/// reports what was missing.
pub fn program(detected: &LazyLock<Option<PathBuf>>, name: &str) -> PathBuf {
    LazyLock::force(detected)
        .clone()
        .unwrap_or_else(|| PathBuf::from(name))
}
