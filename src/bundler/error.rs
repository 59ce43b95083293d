//! Error types for bundler operations.
//!
//! Provides contextual error chaining, filesystem-specific errors, and
//! the typed failures of the bundling pipeline (validation, tool execution,
//! notarization, configuration).
//!
//! # Features
//!
//! - **Context trait**: Add context to errors similar to anyhow
//! - **ErrorExt trait**: Filesystem operations with automatic path context
//! - **bail! macro**: Early return with formatted error messages
//! - **Stage wrapping**: Packaging failures carry the name of the failing stage

use std::{
    fmt::Display,
    io,
    path::{self, PathBuf},
};
use thiserror::Error as DeriveError;

/// Errors returned by the bundler.
#[derive(Debug, DeriveError)]
#[non_exhaustive]
pub enum Error {
    /// Error with context. Created by the [`Context`] trait.
    #[error("{0}: {1}")]
    Context(String, Box<Self>),

    /// File system error with path context.
    ///
    /// Created by the [`ErrorExt`] trait's `fs_context` method.
    #[error("{context} {path}: {error}")]
    Fs {
        /// Context describing the operation (e.g., "copying library")
        context: &'static str,
        /// Path that was being accessed
        path: PathBuf,
        /// The underlying I/O error
        error: io::Error,
    },

    /// An external tool could not be spawned at all.
    #[error("failed to run command {command}: {error}")]
    CommandFailed {
        /// Command that failed to execute
        command: String,
        /// The underlying error
        error: io::Error,
    },

    /// An external tool ran and exited non-zero.
    #[error("{command} exited with {}: {diagnostic}", .code.map_or_else(|| "signal".to_string(), |c| format!("status {c}")))]
    ToolExecution {
        /// Command line that was run
        command: String,
        /// Exit code, `None` when terminated by a signal
        code: Option<i32>,
        /// Captured stderr (or stdout when stderr was empty)
        diagnostic: String,
    },

    /// Malformed or non-binary input, or an invalid identity string.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Conflicting or missing required options.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A destination file exists and overwriting was not requested.
    #[error("destination {0} already exists (use --force to overwrite)")]
    DestinationExists(PathBuf),

    /// The notarization service rejected the submission.
    ///
    /// The disk image is left on disk at `image`.
    #[error(
        "notarization {status} for submission {submission_id} (image kept at {}){}",
        .image.display(),
        .log_ref.as_ref().map(|l| format!(", log: {l}")).unwrap_or_default()
    )]
    NotarizationRejected {
        /// Submission identifier returned by the service
        submission_id: String,
        /// Terminal status reported by the service
        status: String,
        /// Reference to the remote log, if available
        log_ref: Option<String>,
        /// Disk image that was submitted
        image: PathBuf,
    },

    /// Polling exhausted its attempts while the submission was still in progress.
    #[error("notarization of submission {submission_id} still pending after {attempts} status checks")]
    NotarizationTimedOut {
        /// Submission identifier returned by the service
        submission_id: String,
        /// Number of status checks performed
        attempts: u32,
    },

    /// A pipeline stage failed.
    #[error("{stage} failed: {source}")]
    Stage {
        /// Name of the stage that failed
        stage: &'static str,
        /// Underlying failure
        source: Box<Self>,
    },

    /// Generic I/O error.
    #[error("{0}")]
    IoError(#[from] io::Error),

    /// Error walking a directory tree.
    #[error("{0}")]
    WalkdirError(#[from] walkdir::Error),

    /// Path prefix stripping error.
    #[error("{0}")]
    StripError(#[from] path::StripPrefixError),

    /// JSON deserialization error (notarytool output).
    #[error("{0}")]
    JsonError(#[from] serde_json::error::Error),

    /// Configuration file parsing error.
    #[error("{0}")]
    TomlError(#[from] toml::de::Error),

    /// Regular expression error.
    #[error("{0}")]
    RegexError(#[from] regex::Error),

    /// Invalid glob pattern in a search path.
    #[error("{0}")]
    GlobPattern(#[from] glob::PatternError),

    /// Binary parsing error (Mach-O analysis).
    #[error("binary parse error: {0}")]
    BinaryParseError(#[from] goblin::error::Error),

    /// Property list parsing/writing error.
    #[error("{0}")]
    Plist(#[from] plist::Error),

    /// Generic error with custom message.
    #[error("{0}")]
    GenericError(String),
}

impl Error {
    /// Wraps this error with the name of the pipeline stage it occurred in.
    ///
    /// Already-staged errors and notarization outcomes are returned unchanged.
    pub fn in_stage(self, stage: &'static str) -> Self {
        match self {
            Error::Stage { .. }
            | Error::NotarizationRejected { .. }
            | Error::NotarizationTimedOut { .. } => self,
            other => Error::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// Name of the failing stage, if this error was raised inside one.
    pub fn stage(&self) -> Option<&'static str> {
        match self {
            Error::Stage { stage, .. } => Some(*stage),
            Error::Context(_, inner) => inner.stage(),
            _ => None,
        }
    }

    /// Diagnostic output captured from the failing tool, if any.
    pub fn diagnostic(&self) -> Option<&str> {
        match self {
            Error::ToolExecution { diagnostic, .. } => Some(diagnostic),
            Error::Stage { source, .. } | Error::Context(_, source) => source.diagnostic(),
            _ => None,
        }
    }

    /// Whether this is a validation failure (possibly wrapped).
    pub fn is_validation(&self) -> bool {
        match self {
            Error::Validation(_) => true,
            Error::Stage { source, .. } | Error::Context(_, source) => source.is_validation(),
            _ => false,
        }
    }
}

/// Convenient type alias for Result.
pub type Result<T> = std::result::Result<T, Error>;

/// Trait for adding context to errors.
///
/// Similar to `anyhow::Context` but integrated with bundler's Error type.
/// Works with both `Result<T, E>` and `Option<T>`.
pub trait Context<T> {
    /// Add context to an error.
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Display + Send + Sync + 'static;

    /// Add context to an error using a closure (lazy evaluation).
    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C;
}

impl<T> Context<T> for Result<T> {
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
    {
        self.map_err(|e| Error::Context(context.to_string(), Box::new(e)))
    }

    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        self.map_err(|e| Error::Context(f().to_string(), Box::new(e)))
    }
}

impl<T> Context<T> for Option<T> {
    fn context<C>(self, context: C) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
    {
        self.ok_or_else(|| Error::GenericError(context.to_string()))
    }

    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        self.ok_or_else(|| Error::GenericError(f().to_string()))
    }
}

/// Extension trait for filesystem operations with automatic path context.
pub trait ErrorExt<T> {
    /// Add filesystem context to an I/O error.
    ///
    /// The `context` should be a present-tense verb phrase describing the operation,
    /// e.g., "reading file", "creating directory", "copying library".
    fn fs_context(self, context: &'static str, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> ErrorExt<T> for std::result::Result<T, std::io::Error> {
    fn fs_context(self, context: &'static str, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|error| Error::Fs {
            context,
            path: path.into(),
            error,
        })
    }
}

/// Macro for early return with error.
///
/// Converts the message into a [`Error::GenericError`] and returns immediately.
///
/// ```ignore
/// bail!("operation failed");
/// bail!("invalid value: {}", value);
/// ```
#[macro_export]
macro_rules! bail {
    ($msg:literal $(,)?) => {
        return Err($crate::bundler::error::Error::GenericError(format!($msg)))
    };
    ($err:expr $(,)?) => {
        return Err($crate::bundler::error::Error::GenericError($err.to_string()))
    };
    ($fmt:expr, $($arg:tt)*) => {
        return Err($crate::bundler::error::Error::GenericError(format!($fmt, $($arg)*)))
    };
}
