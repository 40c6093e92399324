/*!
 * File nodes and build ordering.
 *
 * Nodes are keyed by output path and reference each other only by path.
 */

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::errors::BuildError;
use crate::file_utils::FileManager;

/// Kind of artifact a node stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    Tex,
    Pdf,
    Dvi,
    Ps,
    Bbl,
    Ind,
    Gls,
    Idx,
    Glo,
    Aux,
    Bst,
    Bib,
    Cls,
    Sty,
    /// Generated figure
    Figure,
}

impl FileKind {
    /// Whether a tool of the build produces this kind of node
    pub fn is_derived(&self) -> bool {
        matches!(self, Self::Pdf | Self::Dvi | Self::Ps | Self::Bbl | Self::Ind | Self::Gls)
    }

    /// Kind of a source file from its extension
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()).map(str::to_lowercase).as_deref() {
            Some("bib") => Self::Bib,
            Some("bst") | Some("bbx") | Some("cbx") => Self::Bst,
            Some("cls") => Self::Cls,
            Some("sty") => Self::Sty,
            Some("idx") => Self::Idx,
            Some("glo") => Self::Glo,
            Some("aux") | Some("bcf") => Self::Aux,
            _ => Self::Tex,
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// One artifact of the build
#[derive(Debug, Clone)]
pub struct FileNode {
    pub output_path: PathBuf,
    pub kind: FileKind,
    /// Main input of the producing tool (the aux/idx/glo trigger for secondary tools)
    pub producing_input: Option<PathBuf>,
    pub root_document: PathBuf,
    pub dependencies: BTreeSet<PathBuf>,
    /// Modification time observed when the table was built
    pub last_known_change: Option<SystemTime>,
    pub uses_biber: bool,
    /// Bibliography database of a `.bbl` node
    pub database: Option<String>,
}

impl FileNode {
    fn new(output_path: PathBuf, kind: FileKind, root_document: &Path) -> Self {
        let last_known_change = FileManager::modified_time(&output_path);
        Self {
            output_path,
            kind,
            producing_input: None,
            root_document: root_document.to_path_buf(),
            dependencies: BTreeSet::new(),
            last_known_change,
            uses_biber: false,
            database: None,
        }
    }

    /// Refresh the recorded change time from disk
    pub fn touch(&mut self) {
        self.last_known_change = FileManager::modified_time(&self.output_path);
    }
}

/// All nodes of one build, keyed by output path
#[derive(Debug, Clone, Default)]
pub struct NodeTable {
    root_document: PathBuf,
    nodes: BTreeMap<PathBuf, FileNode>,
}

impl NodeTable {
    pub fn new(root_document: impl Into<PathBuf>) -> Self {
        Self {
            root_document: root_document.into(),
            nodes: BTreeMap::new(),
        }
    }

    /// Node for `path`, created with `kind` if absent. Idempotent.
    pub fn node(&mut self, path: &Path, kind: FileKind) -> &mut FileNode {
        let root = self.root_document.clone();
        self.nodes
            .entry(path.to_path_buf())
            .or_insert_with(|| FileNode::new(path.to_path_buf(), kind, &root))
    }

    /// Add `dependency` to `node`, creating a source node for it if needed
    pub fn depend(&mut self, node: &Path, dependency: &Path) {
        if !self.nodes.contains_key(dependency) {
            self.node(dependency, FileKind::from_path(dependency));
        }
        if let Some(n) = self.nodes.get_mut(node) {
            n.dependencies.insert(dependency.to_path_buf());
        }
    }

    pub fn get(&self, path: &Path) -> Option<&FileNode> {
        self.nodes.get(path)
    }

    pub fn get_mut(&mut self, path: &Path) -> Option<&mut FileNode> {
        self.nodes.get_mut(path)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &FileNode> {
        self.nodes.values()
    }

    /// Nodes reachable from `target`, dependencies before dependents.
    ///
    /// Iterative depth-first walk; a back edge is reported as a cycle.
    pub fn build_order(&self, target: &Path) -> Result<Vec<PathBuf>, BuildError> {
        let mut order = Vec::new();
        let mut done: HashSet<&Path> = HashSet::new();
        let mut on_stack: HashSet<&Path> = HashSet::new();
        let Some((root_key, _)) = self.nodes.get_key_value(target) else {
            return Ok(order);
        };
        // (node, expanded)
        let mut stack: Vec<(&Path, bool)> = vec![(root_key.as_path(), false)];

        while let Some((path, expanded)) = stack.pop() {
            if expanded {
                on_stack.remove(path);
                if done.insert(path) {
                    order.push(path.to_path_buf());
                }
                continue;
            }
            if done.contains(path) {
                continue;
            }
            if !on_stack.insert(path) {
                return Err(BuildError::DependencyCycle(path.to_path_buf()));
            }
            stack.push((path, true));
            if let Some(node) = self.nodes.get(path) {
                for dep in node.dependencies.iter().rev() {
                    let dep = dep.as_path();
                    if on_stack.contains(dep) {
                        return Err(BuildError::DependencyCycle(dep.to_path_buf()));
                    }
                    if !done.contains(dep) {
                        stack.push((dep, false));
                    }
                }
            }
        }
        Ok(order)
    }

    /// Whether any dependency of `path` changed after its output was written
    pub fn has_newer_dependency(&self, path: &Path) -> bool {
        let Some(node) = self.nodes.get(path) else {
            return false;
        };
        let Some(output_time) = node.last_known_change else {
            return true;
        };
        node.dependencies.iter().any(|dep| {
            self.nodes
                .get(dep)
                .and_then(|d| d.last_known_change)
                .or_else(|| FileManager::modified_time(dep))
                .is_some_and(|t| t > output_time)
        })
    }
}
