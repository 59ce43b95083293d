//! Signing unit discovery and containment ordering.
//!
//! A bundle tree is flattened into [`SigningUnit`]s, then ordered by an
//! explicit post-order walk over the containment tree: every unit is signed
//! after everything it contains. Among siblings, plain binaries come first,
//! then plugins and nested apps, then frameworks.

use crate::bundler::{error::Result, platform::macos::inspector::is_macho};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

/// File extensions always treated as signable binaries.
pub const SIGNABLE_FILE_EXTENSIONS: &[&str] = &["so", "dylib"];

/// Folder extensions signed with a plain signature.
pub const PLUGIN_EXTENSIONS: &[&str] = &["bundle", "mxo", "plugin"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SigningUnitKind {
    /// Dylib, shared object or executable Mach-O file.
    Binary,
    /// `.bundle`, `.mxo` or `.plugin` folder.
    Plugin,
    /// Nested `.app`.
    App,
    Framework,
    /// The root of the tree being signed.
    TopLevel,
}

impl SigningUnitKind {
    /// Signed with hardened runtime and entitlements.
    pub fn is_runtime(self) -> bool {
        matches!(self, SigningUnitKind::App | SigningUnitKind::TopLevel)
    }

    pub fn is_container(self) -> bool {
        !matches!(self, SigningUnitKind::Binary)
    }

    pub fn label(self) -> &'static str {
        match self {
            SigningUnitKind::Binary => "internal",
            SigningUnitKind::Plugin => "plugin",
            SigningUnitKind::App => "app",
            SigningUnitKind::Framework => "framework",
            SigningUnitKind::TopLevel => "main.runtime",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigningUnit {
    pub path: PathBuf,
    pub kind: SigningUnitKind,
    /// Path components below the root.
    pub depth: usize,
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| extensions.contains(&e))
}

/// Kind of a signable folder, from its extension.
pub fn bundle_kind(path: &Path) -> Option<SigningUnitKind> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("app") => Some(SigningUnitKind::App),
        Some("framework") => Some(SigningUnitKind::Framework),
        _ if has_extension(path, PLUGIN_EXTENSIONS) => Some(SigningUnitKind::Plugin),
        _ => None,
    }
}

#[cfg(unix)]
fn is_executable(metadata: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &std::fs::Metadata) -> bool {
    false
}

/// Walks `root` and returns every signable unit, the root last.
///
/// Symlinks are never followed or signed.
pub fn collect_units(root: &Path) -> Result<Vec<SigningUnit>> {
    let mut units = Vec::new();

    for entry in walkdir::WalkDir::new(root).follow_links(false).min_depth(1) {
        let entry = entry?;
        let file_type = entry.file_type();
        if file_type.is_symlink() {
            continue;
        }

        let path = entry.path();
        let kind = if file_type.is_dir() {
            bundle_kind(path)
        } else if has_extension(path, SIGNABLE_FILE_EXTENSIONS)
            || (is_executable(&entry.metadata()?) && is_macho(path))
        {
            Some(SigningUnitKind::Binary)
        } else {
            None
        };

        if let Some(kind) = kind {
            log::debug!("added {}: {}", kind.label(), path.display());
            units.push(SigningUnit {
                path: path.to_path_buf(),
                kind,
                depth: entry.depth(),
            });
        }
    }

    units.push(SigningUnit {
        path: root.to_path_buf(),
        kind: SigningUnitKind::TopLevel,
        depth: 0,
    });
    Ok(units)
}

/// Orders units so that every unit follows everything it contains.
///
/// The containment tree is built from path prefixes (each unit's parent is
/// its deepest containing folder unit) and walked in post-order with an
/// explicit stack.
pub fn signing_order(units: &[SigningUnit]) -> Vec<SigningUnit> {
    let parent_of = |i: usize| -> Option<usize> {
        units
            .iter()
            .enumerate()
            .filter(|&(j, candidate)| {
                j != i
                    && candidate.kind.is_container()
                    && candidate.depth < units[i].depth
                    && units[i].path.starts_with(&candidate.path)
            })
            .max_by_key(|(_, candidate)| candidate.depth)
            .map(|(j, _)| j)
    };

    let mut children: HashMap<Option<usize>, Vec<usize>> = HashMap::new();
    for i in 0..units.len() {
        children.entry(parent_of(i)).or_default().push(i);
    }
    for siblings in children.values_mut() {
        siblings.sort_by(|&a, &b| {
            (units[a].kind, &units[a].path).cmp(&(units[b].kind, &units[b].path))
        });
    }

    let mut order = Vec::with_capacity(units.len());
    let mut stack: Vec<(usize, bool)> = children
        .get(&None)
        .map(|roots| roots.iter().rev().map(|&i| (i, false)).collect())
        .unwrap_or_default();

    while let Some((node, expanded)) = stack.pop() {
        if expanded {
            order.push(units[node].clone());
            continue;
        }
        stack.push((node, true));
        if let Some(kids) = children.get(&Some(node)) {
            stack.extend(kids.iter().rev().map(|&i| (i, false)));
        }
    }
    order
}
