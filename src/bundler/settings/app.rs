//! Application bundle assembly settings.

use std::path::PathBuf;

/// Settings for assembling a `.app` around an executable.
///
/// # Configuration
///
/// The `[create]` section of `.macbundler.toml` maps onto these fields:
///
/// ```toml
/// [create]
/// version = "2.1"
/// id = "com.example"
/// extension = ".app"
/// icon = "assets/App.icns"
/// min_system_version = "11.0"
/// ```
#[derive(Debug, Clone)]
pub struct AppSettings {
    /// Executable placed in `Contents/MacOS`.
    pub executable: PathBuf,

    /// Directory the bundle is created in.
    ///
    /// Default: the executable's directory
    pub output_dir: Option<PathBuf>,

    /// `CFBundleShortVersionString` and `CFBundleVersion`.
    ///
    /// Default: "1.0"
    pub version: String,

    /// Reverse-DNS prefix; the bundle id is `<prefix>.<name>`.
    ///
    /// Default: "org.me"
    pub bundle_id_prefix: String,

    /// Bundle directory extension.
    ///
    /// Default: ".app"
    pub extension: String,

    /// Files and directories copied into `Contents/Resources`.
    pub resources: Vec<PathBuf>,

    /// `.icns` file copied into `Contents/Resources`.
    pub icon: Option<PathBuf>,

    /// `LSMinimumSystemVersion`.
    ///
    /// Default: "10.13"
    pub min_system_version: String,

    /// Ad-hoc sign relocated libraries and the executable.
    pub codesign: bool,

    pub dry_run: bool,
}

impl AppSettings {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            output_dir: None,
            version: "1.0".to_string(),
            bundle_id_prefix: "org.me".to_string(),
            extension: ".app".to_string(),
            resources: Vec::new(),
            icon: None,
            min_system_version: "10.13".to_string(),
            codesign: true,
            dry_run: false,
        }
    }
}
