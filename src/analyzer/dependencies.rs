/*!
 * Typed dependency sets produced by the analyzer.
 */

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

/// Kind of resource a document refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DependencyKind {
    Tex,
    Style,
    Class,
    /// `.bst` or biblatex `.bbx`
    BibStyle,
    /// biblatex `.cbx`
    BibCitationStyle,
    Bib,
    IndexTrigger,
    GlossaryTrigger,
}

impl fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Tex => "tex",
            Self::Style => "sty",
            Self::Class => "cls",
            Self::BibStyle => "bst",
            Self::BibCitationStyle => "cbx",
            Self::Bib => "bib",
            Self::IndexTrigger => "idx",
            Self::GlossaryTrigger => "glo",
        };
        f.write_str(name)
    }
}

/// One referenced resource
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct DependencyEntry {
    pub kind: DependencyKind,
    pub path: PathBuf,
}

/// Files attached to one logical bibliography database
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BibDatabase {
    pub bib: BTreeSet<PathBuf>,
    pub bst: BTreeSet<PathBuf>,
    pub bbx: BTreeSet<PathBuf>,
    pub cbx: BTreeSet<PathBuf>,
}

impl BibDatabase {
    /// Every file of the database
    pub fn files(&self) -> impl Iterator<Item = &PathBuf> {
        self.bib
            .iter()
            .chain(self.bst.iter())
            .chain(self.bbx.iter())
            .chain(self.cbx.iter())
    }
}

/// Dependencies of a root document, transitively over its included files
#[derive(Debug, Clone, Default)]
pub struct DependencySet {
    entries: BTreeMap<DependencyKind, BTreeSet<PathBuf>>,
    bibliographies: BTreeMap<String, BibDatabase>,
    default_database: String,
    /// biblatex was loaded with `backend=biber`
    pub uses_biber: bool,
    /// multibib is loaded; bibliography macro suffixes name separate databases
    pub is_multibib: bool,
    /// `\makeindex` was seen, so the compiler writes the index trigger
    pub writes_index: bool,
    /// `\makeglossaries` was seen, so the compiler writes the glossary trigger
    pub writes_glossary: bool,
}

impl DependencySet {
    /// Empty set whose unsuffixed bibliography database is `default_database`
    pub fn new(default_database: impl Into<String>) -> Self {
        Self {
            default_database: default_database.into(),
            ..Default::default()
        }
    }

    /// Name of the database used by unsuffixed bibliography macros
    pub fn default_database(&self) -> &str {
        &self.default_database
    }

    /// Record a non-bibliography dependency
    pub fn add(&mut self, kind: DependencyKind, path: impl Into<PathBuf>) {
        self.entries.entry(kind).or_default().insert(path.into());
    }

    /// Record a bibliography file under a database
    pub fn add_bibliography_file(&mut self, database: &str, kind: DependencyKind, path: impl Into<PathBuf>) {
        let path = path.into();
        if !matches!(
            kind,
            DependencyKind::Bib | DependencyKind::BibStyle | DependencyKind::BibCitationStyle
        ) {
            self.add(kind, path);
            return;
        }
        let db = self.bibliographies.entry(database.to_string()).or_default();
        let set = match kind {
            DependencyKind::Bib => &mut db.bib,
            DependencyKind::BibCitationStyle => &mut db.cbx,
            _ if path.extension().is_some_and(|e| e == "bbx") => &mut db.bbx,
            _ => &mut db.bst,
        };
        set.insert(path);
    }

    /// Files of a kind. Bibliography kinds are aggregated over all databases.
    pub fn dependencies(&self, kind: DependencyKind) -> BTreeSet<&Path> {
        match kind {
            DependencyKind::Bib => self.bibliographies.values().flat_map(|d| d.bib.iter()).map(PathBuf::as_path).collect(),
            DependencyKind::BibStyle => self
                .bibliographies
                .values()
                .flat_map(|d| d.bst.iter().chain(d.bbx.iter()))
                .map(PathBuf::as_path)
                .collect(),
            DependencyKind::BibCitationStyle => self
                .bibliographies
                .values()
                .flat_map(|d| d.cbx.iter())
                .map(PathBuf::as_path)
                .collect(),
            other => self
                .entries
                .get(&other)
                .map(|s| s.iter().map(PathBuf::as_path).collect())
                .unwrap_or_default(),
        }
    }

    /// Files of a bibliography database
    pub fn bibliography(&self, database: &str) -> Option<&BibDatabase> {
        self.bibliographies.get(database)
    }

    /// All bibliography databases by name
    pub fn bibliographies(&self) -> &BTreeMap<String, BibDatabase> {
        &self.bibliographies
    }

    /// Whether the document triggers an index
    pub fn has_index(&self) -> bool {
        self.entries.contains_key(&DependencyKind::IndexTrigger)
    }

    /// Whether the document triggers a glossary
    pub fn has_glossary(&self) -> bool {
        self.entries.contains_key(&DependencyKind::GlossaryTrigger)
    }

    /// Flat, sorted list of every entry
    pub fn entries(&self) -> Vec<DependencyEntry> {
        let mut out: Vec<DependencyEntry> = self
            .entries
            .iter()
            .flat_map(|(kind, paths)| {
                paths.iter().map(move |p| DependencyEntry {
                    kind: *kind,
                    path: p.clone(),
                })
            })
            .collect();
        for db in self.bibliographies.values() {
            out.extend(db.bib.iter().map(|p| DependencyEntry { kind: DependencyKind::Bib, path: p.clone() }));
            out.extend(
                db.bst
                    .iter()
                    .chain(db.bbx.iter())
                    .map(|p| DependencyEntry { kind: DependencyKind::BibStyle, path: p.clone() }),
            );
            out.extend(db.cbx.iter().map(|p| DependencyEntry {
                kind: DependencyKind::BibCitationStyle,
                path: p.clone(),
            }));
        }
        out.sort();
        out.dedup();
        out
    }

    /// Whether no dependency was found
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.bibliographies.is_empty()
    }
}
