//! Top-level error types for the command line binary.
//!
//! Library failures arrive as [`crate::bundler::Error`] and are wrapped here
//! together with argument and I/O problems that only the CLI can hit.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, BundlerError>;

/// Main error type for all CLI operations
#[derive(Error, Debug)]
pub enum BundlerError {
    /// CLI argument errors
    #[error("CLI error: {0}")]
    Cli(#[from] CliError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Bundler errors
    #[error("{0}")]
    Bundler(#[from] crate::bundler::Error),
}

/// CLI-specific errors
#[derive(Error, Debug)]
pub enum CliError {
    /// Invalid command line arguments
    #[error("Invalid arguments: {reason}")]
    InvalidArguments {
        /// Reason for the error
        reason: String,
    },

    /// Input path does not exist
    #[error("No such file or directory: {}", .path.display())]
    MissingInput {
        /// Path given on the command line
        path: PathBuf,
    },

    /// Library relocation finished with failed units
    #[error("{failed} of {total} units failed")]
    UnitsFailed {
        /// Number of failed units
        failed: usize,
        /// Number of units attempted
        total: usize,
    },
}

impl BundlerError {
    /// Remote log reference of a rejected notarization, if that is what failed.
    pub fn notarization_log(&self) -> Option<&str> {
        match self {
            BundlerError::Bundler(crate::bundler::Error::NotarizationRejected {
                log_ref, ..
            }) => log_ref.as_deref(),
            _ => None,
        }
    }

    /// Captured tool output worth showing beneath the error line.
    pub fn diagnostic(&self) -> Option<&str> {
        match self {
            BundlerError::Bundler(e) => e.diagnostic(),
            _ => None,
        }
    }
}
