//! Recursive bundle codesigning.
//!
//! [`Codesigner`] signs a bundle tree bottom-up: contained binaries, then
//! nested bundles, then frameworks, then the top-level bundle with hardened
//! runtime and optional entitlements. Progress is tracked as a
//! [`SignState`].
//!
//! # Example
//!
//! ```no_run
//! use kodegen_bundler_macos::bundler::{
//!     Codesigner, SignSettings, SigningIdentity, SystemToolchain,
//! };
//!
//! # async fn example() -> kodegen_bundler_macos::bundler::Result<()> {
//! let identity = SigningIdentity::resolve(Some("Jane Appleseed (ABCDE12345)"), None)?;
//! let toolchain = SystemToolchain::new(false);
//! let mut signer = Codesigner::new(SignSettings::new("MyApp.app", identity), &toolchain)?;
//! let report = signer.process().await?;
//! println!("signed {} units", report.signed.len());
//! # Ok(())
//! # }
//! ```

pub mod identity;
pub mod plan;

pub use identity::{DEVELOPER_ID_PREFIX, SigningIdentity, validate_developer_id};
pub use plan::{SigningUnit, SigningUnitKind, bundle_kind, collect_units, signing_order};

use crate::bundler::{
    error::{Error, Result},
    platform::macos::dylib::UnitFailure,
    settings::SignSettings,
    toolchain::{SignRequest, Toolchain},
};
use std::path::{Path, PathBuf};

/// Codesigning progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SignState {
    Unsigned,
    InternalSigned,
    NestedBundlesSigned,
    FrameworksSigned,
    TopLevelSigned,
    Verified,
    Failed,
}

impl SignState {
    /// State reached once a unit of `kind` is signed.
    fn after(kind: SigningUnitKind) -> Self {
        match kind {
            SigningUnitKind::Binary => SignState::InternalSigned,
            SigningUnitKind::Plugin | SigningUnitKind::App => SignState::NestedBundlesSigned,
            SigningUnitKind::Framework => SignState::FrameworksSigned,
            SigningUnitKind::TopLevel => SignState::TopLevelSigned,
        }
    }
}

/// Outcome of [`Codesigner::process`].
#[derive(Debug)]
pub struct SignReport {
    pub state: SignState,
    /// Paths signed, in signing order.
    pub signed: Vec<PathBuf>,
    pub failures: Vec<UnitFailure>,
    /// `None` when verification was disabled or not reached.
    pub verified: Option<bool>,
}

/// Entitlements must exist and be a readable property list.
pub(crate) fn check_entitlements(path: &Path) -> Result<()> {
    if !path.is_file() {
        return Err(Error::Configuration(format!(
            "Entitlements file not found: {}",
            path.display()
        )));
    }
    plist::Value::from_file(path).map_err(|e| {
        Error::Configuration(format!(
            "Entitlements file {} is not a valid property list: {}",
            path.display(),
            e
        ))
    })?;
    Ok(())
}

pub struct Codesigner<'a, T: Toolchain> {
    settings: SignSettings,
    toolchain: &'a T,
    units: Vec<SigningUnit>,
    state: SignState,
}

impl<'a, T: Toolchain> Codesigner<'a, T> {
    /// Validates the target and entitlements. No signing happens here.
    pub fn new(settings: SignSettings, toolchain: &'a T) -> Result<Self> {
        if !settings.path.exists() {
            return Err(Error::Validation(format!(
                "{} does not exist",
                settings.path.display()
            )));
        }
        if let Some(entitlements) = &settings.entitlements {
            check_entitlements(entitlements)?;
        }
        Ok(Self {
            settings,
            toolchain,
            units: Vec::new(),
            state: SignState::Unsigned,
        })
    }

    pub fn state(&self) -> SignState {
        self.state
    }

    /// Walks the bundle and records every signable unit.
    pub fn collect(&mut self) -> Result<&[SigningUnit]> {
        if self.units.is_empty() {
            self.units = collect_units(&self.settings.path)?;
        }
        Ok(&self.units)
    }

    /// Units in signing order.
    pub fn plan(&mut self) -> Result<Vec<SigningUnit>> {
        self.collect()?;
        Ok(signing_order(&self.units))
    }

    /// Resolves the full plan and logs it without signing anything.
    pub fn process_dry_run(&mut self) -> Result<Vec<SigningUnit>> {
        let plan = self.plan()?;
        for unit in &plan {
            let mode = if unit.kind.is_runtime() {
                " (hardened runtime)"
            } else {
                ""
            };
            log::info!(
                "[DRY RUN] sign {}: {}{}",
                unit.kind.label(),
                unit.path.display(),
                mode
            );
        }
        Ok(plan)
    }

    /// Signs every unit in containment order, then verifies the root.
    ///
    /// A failed unit is recorded and the rest are still signed; in strict
    /// mode the first failure is returned. Verification failure is reported
    /// as [`SignState::Failed`], nothing is rolled back.
    pub async fn process(&mut self) -> Result<SignReport> {
        log::info!(
            "Signing {} as {}",
            self.settings.path.display(),
            self.settings.identity
        );

        let plan = if self.settings.dry_run {
            self.process_dry_run()?
        } else {
            self.plan()?
        };
        let mut report = SignReport {
            state: SignState::Unsigned,
            signed: Vec::new(),
            failures: Vec::new(),
            verified: None,
        };
        if self.settings.dry_run {
            return Ok(report);
        }

        for unit in &plan {
            match self.sign_unit(unit).await {
                Ok(()) => {
                    report.signed.push(unit.path.clone());
                    self.state = self.state.max(SignState::after(unit.kind));
                }
                Err(e) if self.settings.strict => {
                    self.state = SignState::Failed;
                    return Err(e);
                }
                Err(e) => {
                    log::warn!("Failed to sign {}: {}", unit.path.display(), e);
                    report.failures.push(UnitFailure {
                        unit: unit.path.clone(),
                        error: e,
                    });
                }
            }
        }

        if !report.failures.is_empty() {
            self.state = SignState::Failed;
        } else if self.settings.verify {
            let verified = self.toolchain.verify_signature(&self.settings.path).await?;
            report.verified = Some(verified);
            if verified {
                log::info!("✓ Verified {}", self.settings.path.display());
                self.state = SignState::Verified;
            } else {
                log::error!(
                    "Signature verification failed: {}",
                    self.settings.path.display()
                );
                self.state = SignState::Failed;
            }
        }

        report.state = self.state;
        Ok(report)
    }

    async fn sign_unit(&self, unit: &SigningUnit) -> Result<()> {
        let request = SignRequest::new(&unit.path, &self.settings.identity);
        let request = if unit.kind.is_runtime() {
            request.with_runtime(self.settings.entitlements.as_deref())
        } else {
            request
        };
        log::debug!("signing {}: {}", unit.kind.label(), unit.path.display());
        self.toolchain.sign(&request).await
    }
}
