//! Core bundling library.
//!
//! The pipeline components each take an explicit settings value and a
//! [`Toolchain`] implementation, so they can be driven against the real
//! Xcode command line tools or against a test double.

pub mod error;
pub mod platform;
pub mod settings;
pub mod toolchain;
pub mod utils;

pub use error::{Context, Error, ErrorExt, Result};
pub use platform::macos::{
    app::{CreatedBundle, create_bundle},
    dmg::{PackageJob, PackageStage, Packager},
    dylib::{DylibBundler, ProcessReport},
    sign::{Codesigner, SignReport, SignState, SigningIdentity, SigningUnit, SigningUnitKind},
};
pub use settings::{
    AppSettings, DylibSettings, DylibSettingsBuilder, PackageSettings, PollPolicy, SignSettings,
};
pub use toolchain::{SystemToolchain, Toolchain};
