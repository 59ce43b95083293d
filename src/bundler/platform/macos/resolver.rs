//! Resolution of raw library references to files on disk.
//!
//! `@loader_path`, `@executable_path` and `@rpath` are substituted the way
//! dyld does it: every rpath of the referencing binary is tried in
//! declaration order and the first existing candidate wins.

use std::path::{Path, PathBuf};

pub const LOADER_PATH: &str = "@loader_path";
pub const EXECUTABLE_PATH: &str = "@executable_path";
pub const RPATH: &str = "@rpath";

/// Why a reference is not bundled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Already points inside the bundle under construction.
    AlreadyBundled,
    /// Falls under an ignore prefix (system libraries).
    Ignored,
    /// Part of a `.framework`; frameworks are not relocated.
    Framework,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Canonical path of the library to bundle.
    Resolved(PathBuf),
    Skip(SkipReason),
    Unresolved,
}

/// Everything the resolver needs to know about the referencing binary and
/// the bundle being built.
#[derive(Debug, Clone, Copy)]
pub struct ResolveContext<'a> {
    /// Directory of the binary holding the reference.
    pub loader_dir: &'a Path,
    /// Directory of the top-level executable.
    pub executable_dir: &'a Path,
    /// Run-path entries of the referencing binary, in declaration order.
    pub rpaths: &'a [String],
    pub search_paths: &'a [PathBuf],
    pub ignore_prefixes: &'a [PathBuf],
    /// Install-name prefix of relocated libraries, e.g. `@executable_path/../libs/`.
    pub inside_lib_path: &'a str,
    /// Canonical destination directory, when it already exists.
    pub dest_dir: Option<&'a Path>,
}

/// Splits `@token/rest` into the token and the remainder.
fn split_token<'r>(reference: &'r str, token: &str) -> Option<&'r str> {
    let rest = reference.strip_prefix(token)?;
    if rest.is_empty() {
        Some("")
    } else {
        rest.strip_prefix('/')
    }
}

/// Substitutes `@loader_path` / `@executable_path` at the start of `value`.
/// Returns `None` for values that are still symbolic after substitution.
fn substitute(value: &str, ctx: &ResolveContext<'_>) -> Option<PathBuf> {
    if let Some(rest) = split_token(value, LOADER_PATH) {
        Some(ctx.loader_dir.join(rest))
    } else if let Some(rest) = split_token(value, EXECUTABLE_PATH) {
        Some(ctx.executable_dir.join(rest))
    } else if value.starts_with('@') {
        None
    } else if Path::new(value).is_absolute() {
        Some(PathBuf::from(value))
    } else {
        Some(ctx.loader_dir.join(value))
    }
}

pub fn is_ignored(path: &Path, prefixes: &[PathBuf]) -> bool {
    prefixes.iter().any(|prefix| path.starts_with(prefix))
}

/// Candidate locations for `reference`, in resolution order.
pub fn candidates(reference: &str, ctx: &ResolveContext<'_>) -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    let suffix = if let Some(rest) = split_token(reference, RPATH) {
        for rpath in ctx.rpaths {
            if let Some(base) = substitute(rpath, ctx) {
                candidates.push(base.join(rest));
            }
        }
        rest
    } else if reference.starts_with('@') {
        if let Some(path) = substitute(reference, ctx) {
            candidates.push(path);
        }
        reference.split_once('/').map_or("", |(_, rest)| rest)
    } else if Path::new(reference).is_absolute() {
        candidates.push(PathBuf::from(reference));
        reference
    } else {
        reference
    };

    let file_name = Path::new(suffix)
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_default();
    if !file_name.as_os_str().is_empty() {
        for search_path in ctx.search_paths {
            candidates.push(search_path.join(&file_name));
        }
    }

    candidates
}

/// Whether `reference` carries the install-name prefix and names a file
/// already present in the destination directory.
fn names_bundled_file(reference: &str, ctx: &ResolveContext<'_>) -> bool {
    let (Some(rest), Some(dest_dir)) = (reference.strip_prefix(ctx.inside_lib_path), ctx.dest_dir)
    else {
        return false;
    };
    !rest.is_empty() && dest_dir.join(rest).is_file()
}

/// Resolves one library reference.
pub fn resolve(reference: &str, ctx: &ResolveContext<'_>) -> Resolution {
    if names_bundled_file(reference, ctx) {
        return Resolution::Skip(SkipReason::AlreadyBundled);
    }
    if reference.contains(".framework/") {
        return Resolution::Skip(SkipReason::Framework);
    }
    if Path::new(reference).is_absolute() && is_ignored(Path::new(reference), ctx.ignore_prefixes) {
        return Resolution::Skip(SkipReason::Ignored);
    }

    let candidates = candidates(reference, ctx);
    for candidate in &candidates {
        if !candidate.is_file() {
            continue;
        }
        let Ok(canonical) = candidate.canonicalize() else {
            continue;
        };
        if let Some(dest_dir) = ctx.dest_dir
            && canonical.starts_with(dest_dir)
        {
            return Resolution::Skip(SkipReason::AlreadyBundled);
        }
        if is_ignored(&canonical, ctx.ignore_prefixes) || is_ignored(candidate, ctx.ignore_prefixes)
        {
            return Resolution::Skip(SkipReason::Ignored);
        }
        return Resolution::Resolved(canonical);
    }

    // System libraries live in the shared cache, not on disk.
    if candidates.iter().any(|c| is_ignored(c, ctx.ignore_prefixes)) {
        return Resolution::Skip(SkipReason::Ignored);
    }

    log::warn!("Could not resolve library reference {}", reference);
    Resolution::Unresolved
}
