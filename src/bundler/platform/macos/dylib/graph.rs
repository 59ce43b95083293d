//! Deduplicated dependency graph.
//!
//! Libraries live in an arena indexed by [`DependencyId`] and keyed by their
//! canonical source path, so two raw references reaching the same file
//! collapse to one entry. Edges record which binary held which raw string,
//! so the relocator can rewrite exactly what was found.

use crate::bundler::{
    error::{Error, Result},
    platform::macos::resolver::SkipReason,
};
use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DependencyId(usize);

impl DependencyId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// A library that will be copied into the bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    /// Canonical path of the original library.
    pub source: PathBuf,
    pub file_name: String,
    /// Every raw string that resolved to `source`.
    pub aliases: Vec<String>,
    /// Where the copy is placed.
    pub install_path: PathBuf,
    /// Install name given to the copy.
    pub inner_path: String,
}

/// One (binary, raw reference) pair resolving to a dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceEdge {
    /// Original path of the referencing binary.
    pub binary: PathBuf,
    pub reference: String,
    pub dependency: DependencyId,
}

/// Why a reference was left untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipKind {
    Skipped(SkipReason),
    Unresolved,
    /// Resolved, but the library failed validation or inspection.
    Rejected(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedReference {
    pub binary: PathBuf,
    pub reference: String,
    pub kind: SkipKind,
}

#[derive(Debug, Default)]
pub struct DependencyGraph {
    dependencies: Vec<Dependency>,
    by_source: HashMap<PathBuf, DependencyId>,
    by_file_name: HashMap<String, DependencyId>,
    edges: Vec<ReferenceEdge>,
    edge_keys: HashSet<(PathBuf, String)>,
    inspected: HashSet<PathBuf>,
    rpaths: HashMap<PathBuf, Vec<String>>,
    skipped: Vec<SkippedReference>,
    next_pending: usize,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `binary` was inspected. Returns false if it already was.
    pub fn mark_inspected(&mut self, binary: &Path) -> bool {
        self.inspected.insert(binary.to_path_buf())
    }

    pub fn is_inspected(&self, binary: &Path) -> bool {
        self.inspected.contains(binary)
    }

    pub fn set_rpaths(&mut self, binary: &Path, rpaths: Vec<String>) {
        self.rpaths.insert(binary.to_path_buf(), rpaths);
    }

    /// Run-path entries declared by `binary`.
    pub fn rpaths(&self, binary: &Path) -> &[String] {
        self.rpaths.get(binary).map(Vec::as_slice).unwrap_or_default()
    }

    /// Adds (or finds) the dependency for `source` and records the edge
    /// from `binary`.
    ///
    /// # Errors
    ///
    /// A different library with the same file name is already in the graph.
    /// Both would be copied to the same destination.
    pub fn add_dependency(
        &mut self,
        binary: &Path,
        reference: &str,
        source: PathBuf,
        dest_dir: &Path,
        inner_path: impl FnOnce(&str) -> String,
    ) -> Result<DependencyId> {
        let id = match self.by_source.get(&source) {
            Some(&id) => id,
            None => {
                let file_name = source
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .ok_or_else(|| {
                        Error::Validation(format!("{} has no file name", source.display()))
                    })?;

                if let Some(&other) = self.by_file_name.get(&file_name) {
                    return Err(Error::Validation(format!(
                        "{} and {} would both be installed as {}",
                        self.dependencies[other.0].source.display(),
                        source.display(),
                        file_name
                    )));
                }

                let id = DependencyId(self.dependencies.len());
                self.dependencies.push(Dependency {
                    install_path: dest_dir.join(&file_name),
                    inner_path: inner_path(&file_name),
                    file_name: file_name.clone(),
                    source: source.clone(),
                    aliases: Vec::new(),
                });
                self.by_source.insert(source, id);
                self.by_file_name.insert(file_name, id);
                id
            }
        };

        let dependency = &mut self.dependencies[id.0];
        if !dependency.aliases.iter().any(|a| a == reference) {
            dependency.aliases.push(reference.to_string());
        }
        if self
            .edge_keys
            .insert((binary.to_path_buf(), reference.to_string()))
        {
            self.edges.push(ReferenceEdge {
                binary: binary.to_path_buf(),
                reference: reference.to_string(),
                dependency: id,
            });
        }
        Ok(id)
    }

    pub fn skip(&mut self, binary: &Path, reference: &str, kind: SkipKind) {
        self.skipped.push(SkippedReference {
            binary: binary.to_path_buf(),
            reference: reference.to_string(),
            kind,
        });
    }

    /// Next dependency not yet handed out for sub-dependency collection.
    ///
    /// Each dependency is returned exactly once, in discovery order.
    pub fn next_pending(&mut self) -> Option<DependencyId> {
        (self.next_pending < self.dependencies.len()).then(|| {
            let id = DependencyId(self.next_pending);
            self.next_pending += 1;
            id
        })
    }

    /// Whether `source` (a canonical path) is already a dependency.
    pub fn contains(&self, source: &Path) -> bool {
        self.by_source.contains_key(source)
    }

    pub fn dependency(&self, id: DependencyId) -> &Dependency {
        &self.dependencies[id.0]
    }

    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    pub fn ids(&self) -> impl Iterator<Item = DependencyId> + use<> {
        (0..self.dependencies.len()).map(DependencyId)
    }

    pub fn edges(&self) -> &[ReferenceEdge] {
        &self.edges
    }

    /// Edges whose referencing binary is `binary`.
    pub fn edges_from<'a>(&'a self, binary: &'a Path) -> impl Iterator<Item = &'a ReferenceEdge> {
        self.edges.iter().filter(move |edge| edge.binary == binary)
    }

    pub fn skipped(&self) -> &[SkippedReference] {
        &self.skipped
    }

    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }
}
