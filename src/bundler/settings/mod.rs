//! Configuration structures for bundling operations.
//!
//! Every pipeline component receives one of these values in its
//! constructor; there is no process-wide state, so independent pipelines
//! can run side by side.

mod app;
mod builder;
mod dylib;
mod package;
mod sign;

pub use app::AppSettings;
pub use builder::DylibSettingsBuilder;
pub use dylib::{
    DEFAULT_IGNORE_PREFIXES, DEFAULT_INSIDE_LIB_PATH, DYLD_SEARCH_VARIABLES, DylibSettings,
};
pub use package::{PackageSettings, PollPolicy};
pub use sign::SignSettings;
