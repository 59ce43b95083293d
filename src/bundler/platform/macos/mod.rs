//! macOS bundling pipeline: inspect, relocate, sign, package.
//!
//! - [`inspector`] reads load commands and architectures of Mach-O files
//! - [`resolver`] maps `@rpath`/`@loader_path`/`@executable_path` references to files
//! - [`dylib`] builds the dependency graph and relocates libraries into the bundle
//! - [`sign`] signs a bundle tree in containment order
//! - [`dmg`] creates, signs, notarizes and staples disk images
//! - [`app`] assembles a `.app` around a bare executable

pub mod app;
pub mod dmg;
pub mod dylib;
pub mod inspector;
pub mod resolver;
pub mod sign;
