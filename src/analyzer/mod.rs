/*!
 * Dependency discovery for a root document.
 *
 * The analyzer runs the macro parser over the root file with a fixed table of
 * file-referencing macros and follows every included TeX file through a
 * worklist. A dependency is recorded only when the referenced file exists
 * relative to the document directory; missing files are silently ignored.
 *
 * - `dependencies`: typed dependency sets and bibliography databases
 * - `aux_file`: bibliography lines of the compiler's aux file
 */

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, warn};

use crate::errors::ParseDiagnostic;
use crate::file_utils::FileManager;
use crate::parser::{MacroInvocation, MacroParser, MacroPrototype, MacroTable, MathMode, ParseHandler};

pub use self::aux_file::AuxData;
pub use self::dependencies::{BibDatabase, DependencyEntry, DependencyKind, DependencySet};

pub mod aux_file;
pub mod dependencies;

/// Macros whose arguments name files, with their prototypes
const FILE_MACROS: &[(&str, &str)] = &[
    ("input", "{}"),
    ("include", "{}"),
    ("subfile", "{}"),
    ("usepackage", "[]{}"),
    ("RequirePackage", "[]{}"),
    ("documentclass", "[]{}"),
    ("LoadClass", "[]{}"),
    ("bibliography", "{}"),
    ("bibliographystyle", "{}"),
    ("addbibresource", "[]{}"),
    ("makeindex", "[]"),
    ("printindex", "[]"),
    ("makeglossaries", ""),
    ("printglossaries", ""),
    ("printglossary", "[]"),
    ("newglossaryentry", "{}{}"),
    ("newcommand", "\\[][]{}"),
    ("renewcommand", "\\[][]{}"),
    ("providecommand", "\\[][]{}"),
    ("def", "\\{}"),
    // Bodies are not scanned for dependencies
    ("verb", "!{}"),
    ("url", "!{}"),
];

/// Finds the files a root document depends on
#[derive(Debug, Clone)]
pub struct DependencyAnalyzer {
    table: MacroTable,
}

impl Default for DependencyAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl DependencyAnalyzer {
    pub fn new() -> Self {
        let mut table = MacroTable::new();
        for (name, notation) in FILE_MACROS {
            // Notations above are all well-formed
            if let Ok(proto) = notation.parse::<MacroPrototype>() {
                table.insert(name, MathMode::None, proto);
            }
        }
        Self { table }
    }

    /// Dependencies of `root_file`, transitively over the TeX files it includes.
    ///
    /// Paths in the result are `root_dir` joined with the referenced name.
    /// Fails only when the root file itself cannot be read.
    pub fn analyze(&self, root_file: &Path, root_dir: &Path) -> Result<DependencySet> {
        let root_stem = FileManager::file_stem_string(root_file);
        let root_key = FileManager::canonical(root_file);
        let mut set = DependencySet::new(root_stem.clone());
        let mut user_macros = HashMap::new();
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([root_file.to_path_buf()]);

        while let Some(file) = queue.pop_front() {
            if !seen.insert(FileManager::canonical(&file)) {
                continue;
            }

            let content = if file == root_file {
                FileManager::read_to_string(&file)
                    .with_context(|| format!("Cannot analyze root document {:?}", file))?
            } else {
                match FileManager::read_to_string(&file) {
                    Ok(content) => content,
                    Err(e) => {
                        warn!("Skipping unreadable dependency {:?}: {}", file, e);
                        continue;
                    }
                }
            };

            debug!("Scanning {:?} for dependencies", file);
            let mut collector = DependencyCollector {
                root_dir,
                root_stem: &root_stem,
                root_key: &root_key,
                set: &mut set,
                user_macros: &mut user_macros,
                discovered: Vec::new(),
            };
            MacroParser::new(&self.table, content).parse(&mut collector);
            queue.extend(collector.discovered);
        }

        Ok(set)
    }
}

/// Parse handler that records dependencies as macros are seen
struct DependencyCollector<'a> {
    root_dir: &'a Path,
    root_stem: &'a str,
    root_key: &'a Path,
    set: &'a mut DependencySet,
    /// Argument-less macros defined by the document, name to body
    user_macros: &'a mut HashMap<String, String>,
    discovered: Vec<PathBuf>,
}

impl DependencyCollector<'_> {
    /// Path of `name` relative to the document directory if it exists,
    /// trying `name` with `ext` appended first
    fn existing(&self, name: &str, ext: &str) -> Option<PathBuf> {
        let name = self.expand_name(name);
        let name = name.as_str();
        if name.is_empty() {
            return None;
        }
        let dotted = format!(".{}", ext);
        let mut candidates = Vec::with_capacity(2);
        if !name.ends_with(&dotted) {
            candidates.push(self.root_dir.join(format!("{}{}", name, dotted)));
        }
        candidates.push(self.root_dir.join(name));
        candidates.into_iter().find(|p| FileManager::file_exists(p))
    }

    /// Replace a file name given as a document macro by the macro's body
    fn expand_name(&self, name: &str) -> String {
        let mut value = name.trim().to_string();
        for _ in 0..16 {
            let Some(body) = value.strip_prefix('\\').and_then(|m| self.user_macros.get(m)) else {
                break;
            };
            value = body.trim().to_string();
        }
        value
    }

    fn names(arg: &str) -> impl Iterator<Item = &str> {
        arg.split(',').map(str::trim).filter(|s| !s.is_empty())
    }

    fn add_tex(&mut self, name: &str) {
        if let Some(path) = self.existing(name, "tex") {
            if FileManager::canonical(&path) == self.root_key {
                return;
            }
            self.set.add(DependencyKind::Tex, path.clone());
            self.discovered.push(path);
        }
    }

    fn add_file(&mut self, kind: DependencyKind, name: &str, ext: &str) {
        if let Some(path) = self.existing(name, ext) {
            self.set.add(kind, path);
        }
    }

    fn add_bib_file(&mut self, database: &str, kind: DependencyKind, name: &str, ext: &str) {
        if let Some(path) = self.existing(name, ext) {
            self.set.add_bibliography_file(database, kind, path);
        }
    }

    /// Database named by the suffix of a `\bibliography…` macro
    fn database_for(&self, suffix: &str) -> String {
        if suffix.is_empty() || !self.set.is_multibib {
            self.set.default_database().to_string()
        } else {
            suffix.to_string()
        }
    }

    fn packages(&mut self, options: &str, packages: &str) {
        for package in Self::names(packages) {
            match package {
                "biblatex" => self.biblatex_options(options),
                "multibib" => self.set.is_multibib = true,
                _ => {}
            }
            self.add_file(DependencyKind::Style, package, "sty");
        }
    }

    fn biblatex_options(&mut self, options: &str) {
        let database = self.set.default_database().to_string();
        for option in Self::names(options) {
            let Some((key, value)) = option.split_once('=') else {
                continue;
            };
            let value = value.trim();
            match key.trim() {
                "backend" => self.set.uses_biber = value == "biber",
                "style" => {
                    self.add_bib_file(&database, DependencyKind::BibStyle, value, "bbx");
                    self.add_bib_file(&database, DependencyKind::BibCitationStyle, value, "cbx");
                }
                "bibstyle" => self.add_bib_file(&database, DependencyKind::BibStyle, value, "bbx"),
                "citestyle" => {
                    self.add_bib_file(&database, DependencyKind::BibCitationStyle, value, "cbx")
                }
                _ => {}
            }
        }
    }

    fn define(&mut self, name: &str, body: &str) {
        let name = name.trim().trim_start_matches('\\');
        if !name.is_empty() {
            debug!("Recording document macro \\{}", name);
            self.user_macros.insert(name.to_string(), body.to_string());
        }
    }
}

impl ParseHandler for DependencyCollector<'_> {
    fn expand(&mut self, inv: &MacroInvocation) -> Option<String> {
        match inv.name.as_str() {
            "input" | "include" | "subfile" => self.add_tex(inv.arg(0)),
            "usepackage" | "RequirePackage" => self.packages(inv.arg(0), inv.arg(1)),
            "documentclass" | "LoadClass" => self.add_file(DependencyKind::Class, inv.arg(1), "cls"),
            "addbibresource" => {
                let database = self.set.default_database().to_string();
                self.add_bib_file(&database, DependencyKind::Bib, inv.arg(1), "bib");
            }
            "makeindex" | "printindex" => {
                self.set.writes_index |= inv.name == "makeindex";
                let trigger = self.root_dir.join(format!("{}.idx", self.root_stem));
                self.set.add(DependencyKind::IndexTrigger, trigger);
            }
            "makeglossaries" | "printglossaries" | "printglossary" | "newglossaryentry" => {
                self.set.writes_glossary |= inv.name == "makeglossaries";
                let trigger = self.root_dir.join(format!("{}.glo", self.root_stem));
                self.set.add(DependencyKind::GlossaryTrigger, trigger);
            }
            "newcommand" | "renewcommand" | "providecommand" => {
                let arity = inv.arg(1).trim();
                if arity.is_empty() || arity == "0" {
                    self.define(inv.arg(0), inv.arg(3));
                }
            }
            "def" => self.define(inv.arg(0), inv.arg(1)),
            name => {
                if let Some(body) = self.user_macros.get(name) {
                    return Some(body.clone());
                }
                if let Some(suffix) = name.strip_prefix("bibliographystyle") {
                    let database = self.database_for(suffix);
                    for style in Self::names(inv.arg(0)) {
                        self.add_bib_file(&database, DependencyKind::BibStyle, style, "bst");
                    }
                } else if let Some(suffix) = name.strip_prefix("bibliography") {
                    let database = self.database_for(suffix);
                    for bib in Self::names(inv.arg(0)) {
                        self.add_bib_file(&database, DependencyKind::Bib, bib, "bib");
                    }
                }
            }
        }
        None
    }

    fn resolve(&mut self, name: &str, _mode: MathMode) -> Option<MacroPrototype> {
        if self.user_macros.contains_key(name) {
            return Some(MacroPrototype::none());
        }
        if self.set.is_multibib && name.starts_with("bibliography") {
            return "{}".parse().ok();
        }
        None
    }

    fn diagnostic(&mut self, diagnostic: ParseDiagnostic) {
        debug!("Dependency scan: {}", diagnostic);
    }
}
