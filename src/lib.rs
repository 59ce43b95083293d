//! macOS application bundler library
//!
//! Makes macOS applications self-contained and distributable:
//! - copies non-system dylibs into a bundle and rewrites load commands
//! - signs bundle trees in containment order
//! - builds, signs, notarizes and staples disk images
//!
//! It can be used both as a CLI tool and as a library dependency.

pub mod bundler;
pub mod cli;
pub mod config;
pub mod error;

// Re-export commonly used types
pub use error::{BundlerError, CliError, Result};
