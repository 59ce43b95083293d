//! Platform-specific bundling.

pub mod macos;
