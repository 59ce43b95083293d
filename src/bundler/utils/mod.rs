//! Shared filesystem and hashing helpers.

pub mod checksum;
pub mod fs;
