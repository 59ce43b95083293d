//! Disk image packaging and notarization settings.

use crate::bundler::platform::macos::sign::SigningIdentity;
use std::{path::PathBuf, time::Duration};

const DEFAULT_MAX_ATTEMPTS: u32 = 60;
const DEFAULT_INITIAL_DELAY_SECS: u64 = 10;
const DEFAULT_MAX_DELAY_SECS: u64 = 60;
const BACKOFF_MULTIPLIER: f64 = 1.5;

/// Bounded backoff for notarization status checks.
///
/// Only the status check is retried; the submission never is.
#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    /// Maximum number of status checks.
    pub max_attempts: u32,
    /// Delay before the second check.
    pub initial_delay: Duration,
    /// Cap on the delay between checks.
    pub max_delay: Duration,
    /// Growth factor applied after every check.
    pub multiplier: f64,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay: Duration::from_secs(DEFAULT_INITIAL_DELAY_SECS),
            max_delay: Duration::from_secs(DEFAULT_MAX_DELAY_SECS),
            multiplier: BACKOFF_MULTIPLIER,
        }
    }
}

impl PollPolicy {
    /// No waiting between checks.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
        }
    }

    /// Delay to wait after check number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let scaled = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        Duration::from_secs_f64(scaled.min(self.max_delay.as_secs_f64()))
    }
}

/// Settings for one packaging run.
#[derive(Debug, Clone)]
pub struct PackageSettings {
    /// Bundle or folder placed on the image.
    pub source: PathBuf,

    /// Disk image path.
    ///
    /// Default: `<source parent>/<source stem>.dmg`
    pub output: Option<PathBuf>,

    /// Volume name shown when the image is mounted.
    ///
    /// Default: source stem
    pub volume_name: Option<String>,

    /// Identity for content and image signing. Without a Developer ID both
    /// are skipped.
    pub identity: SigningIdentity,

    /// `notarytool` keychain profile. Without one notarization is skipped.
    pub keychain_profile: Option<String>,

    pub entitlements: Option<PathBuf>,

    /// Sign the bundle contents before building the image.
    ///
    /// Default: true
    pub sign_contents: bool,

    pub poll: PollPolicy,

    pub dry_run: bool,
}

impl PackageSettings {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            output: None,
            volume_name: None,
            identity: SigningIdentity::AdHoc,
            keychain_profile: None,
            entitlements: None,
            sign_contents: true,
            poll: PollPolicy::default(),
            dry_run: false,
        }
    }
}
