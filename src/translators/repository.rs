/*!
 * Translator repository: three levels of definitions, inclusion and conflicts.
 */

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::errors::{TranslatorConflict, TranslatorError};
use crate::translators::definition::{DEFINITION_EXTENSION, Translator, TranslatorLevel, normalize_extension};

/// Per-level inclusion overrides, `name -> included`
pub type InclusionOverrides = BTreeMap<TranslatorLevel, BTreeMap<String, bool>>;

/// Where each level's definitions live
#[derive(Debug, Clone, Default)]
pub struct TranslatorDirectories {
    pub system: Option<PathBuf>,
    pub user: Option<PathBuf>,
    pub document: Option<PathBuf>,
}

impl TranslatorDirectories {
    fn get(&self, level: TranslatorLevel) -> Option<&Path> {
        match level {
            TranslatorLevel::System => self.system.as_deref(),
            TranslatorLevel::User => self.user.as_deref(),
            TranslatorLevel::Document => self.document.as_deref(),
        }
    }
}

/// Loaded translators with their resolved inclusion and conflict state
#[derive(Debug, Clone, Default)]
pub struct TranslatorRepository {
    directories: TranslatorDirectories,
    overrides: InclusionOverrides,
    levels: BTreeMap<TranslatorLevel, BTreeMap<String, Translator>>,
    /// Effective level of each known name; `None` when excluded
    inclusion: BTreeMap<String, Option<TranslatorLevel>>,
    conflicts: Vec<TranslatorConflict>,
}

impl TranslatorRepository {
    pub fn new(directories: TranslatorDirectories, overrides: InclusionOverrides) -> Self {
        Self {
            directories,
            overrides,
            ..Default::default()
        }
    }

    /// Reload every level from disk and resolve inclusion and conflicts.
    ///
    /// Conflicts are returned as an error, but the repository keeps its
    /// freshly loaded state so non-conflicting translators stay usable.
    pub fn sync(&mut self) -> Result<(), TranslatorError> {
        self.levels.clear();
        for level in TranslatorLevel::ALL {
            let Some(dir) = self.directories.get(level).map(Path::to_path_buf) else {
                continue;
            };
            self.load_directory(&dir, level);
        }
        self.resolve()
    }

    fn load_directory(&mut self, dir: &Path, level: TranslatorLevel) {
        let Ok(entries) = fs::read_dir(dir) else {
            debug!("No {} translator directory at {:?}", level, dir);
            return;
        };
        let mut files: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file() && p.extension().is_some_and(|e| e == DEFINITION_EXTENSION))
            .collect();
        files.sort();

        for file in files {
            match Translator::load(&file, level) {
                Ok(translator) => {
                    debug!("Loaded {} translator {}", level, translator.name);
                    self.insert(translator);
                }
                Err(e) => warn!("Ignoring translator definition: {}", e),
            }
        }
    }

    /// Register a translator at its declared level, replacing one of the same name
    pub fn insert(&mut self, translator: Translator) {
        self.levels
            .entry(translator.level)
            .or_default()
            .insert(translator.name.clone(), translator);
    }

    /// Replace the inclusion overrides; call [`resolve`](Self::resolve) afterwards
    pub fn set_overrides(&mut self, overrides: InclusionOverrides) {
        self.overrides = overrides;
    }

    /// Recompute inclusion and conflicts from the loaded tables
    pub fn resolve(&mut self) -> Result<(), TranslatorError> {
        self.inclusion.clear();
        let names: BTreeSet<String> = self.levels.values().flat_map(|m| m.keys().cloned()).collect();

        for name in names {
            let explicit = TranslatorLevel::ALL
                .iter()
                .rev()
                .find_map(|level| self.overrides.get(level).and_then(|o| o.get(&name)).map(|inc| (*level, *inc)));
            let effective = match explicit {
                Some((level, true)) => Some(level),
                Some((_, false)) => None,
                None => self.translator(&name).map(|t| t.level),
            };
            self.inclusion.insert(name, effective);
        }

        self.conflicts = self.conflicts_at(TranslatorLevel::Document);

        info!(
            "{} translators known, {} included",
            self.inclusion.len(),
            self.inclusion.values().filter(|l| l.is_some()).count()
        );

        if self.conflicts.is_empty() {
            Ok(())
        } else {
            Err(TranslatorError::Conflict(self.conflicts.clone()))
        }
    }

    /// Definition of `name` from the highest level that declares it
    pub fn translator(&self, name: &str) -> Option<&Translator> {
        self.levels.values().rev().find_map(|m| m.get(name))
    }

    /// Effective definitions of every known translator, by name
    pub fn translators(&self) -> Vec<&Translator> {
        self.inclusion.keys().filter_map(|name| self.translator(name)).collect()
    }

    /// Effective level of a translator, `None` when excluded or unknown
    pub fn effective_level(&self, name: &str) -> Option<TranslatorLevel> {
        self.inclusion.get(name).copied().flatten()
    }

    pub fn is_included(&self, name: &str) -> bool {
        self.effective_level(name).is_some()
    }

    /// Effective definitions of the included translators
    pub fn included(&self) -> Vec<&Translator> {
        self.inclusion
            .iter()
            .filter(|(_, level)| level.is_some())
            .filter_map(|(name, _)| self.translator(name))
            .collect()
    }

    /// Conflicts found by the last resolve
    pub fn conflicts(&self) -> &[TranslatorConflict] {
        &self.conflicts
    }

    /// Conflicts among the translators included at `level` or below.
    ///
    /// Translators are grouped by source family: `svg2pdf`, `svg2pdf+tex` and
    /// `svg2png_rsvg` all read `svg`. Names outside the `src2dst` convention
    /// are grouped by each of their input extensions.
    pub fn conflicts_at(&self, level: TranslatorLevel) -> Vec<TranslatorConflict> {
        let mut groups: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let visible = self
            .inclusion
            .iter()
            .filter(|(_, effective)| matches!(effective, Some(l) if *l <= level))
            .filter_map(|(name, _)| self.translator(name));
        for translator in visible {
            for source_type in Self::source_types(translator) {
                groups.entry(source_type).or_default().insert(translator.name.clone());
            }
        }
        groups
            .into_iter()
            .filter(|(_, names)| names.len() > 1)
            .map(|(source_type, names)| TranslatorConflict {
                source_type,
                translators: names.into_iter().collect(),
            })
            .collect()
    }

    fn source_types(translator: &Translator) -> Vec<String> {
        match translator.parsed_name() {
            Some(name) => vec![name.source.to_lowercase()],
            None => translator
                .input_extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_string())
                .collect(),
        }
    }

    /// Every input extension handled by an included translator
    pub fn input_extensions(&self) -> Vec<String> {
        let set: BTreeSet<String> = self
            .included()
            .iter()
            .flat_map(|t| t.input_extensions.iter().cloned())
            .collect();
        set.into_iter().collect()
    }

    /// The single included translator for `source`.
    ///
    /// Translators matching the longest extension compete; a requested
    /// output name breaks ties by its extension. Remaining ties are a conflict.
    pub fn find(&self, source: &Path, requested_output: Option<&Path>) -> Result<&Translator, TranslatorError> {
        let candidates: Vec<(&Translator, usize)> = self
            .included()
            .into_iter()
            .filter_map(|t| t.matching_extension(source).map(|ext| (t, ext.len())))
            .collect();
        let Some(longest) = candidates.iter().map(|(_, len)| *len).max() else {
            return Err(TranslatorError::NotFound(source.to_path_buf()));
        };
        let mut best: Vec<&Translator> = candidates
            .into_iter()
            .filter(|(_, len)| *len == longest)
            .map(|(t, _)| t)
            .collect();

        if best.len() > 1 {
            if let Some(ext) = requested_output.and_then(|p| p.extension()) {
                let ext = normalize_extension(&ext.to_string_lossy());
                let producing: Vec<&Translator> = best.iter().copied().filter(|t| t.produces(&ext)).collect();
                if !producing.is_empty() {
                    best = producing;
                }
            }
        }

        match best.as_slice() {
            [single] => Ok(*single),
            _ => {
                let source_type = best[0]
                    .matching_extension(source)
                    .unwrap_or_default()
                    .trim_start_matches('.')
                    .to_string();
                let mut translators: Vec<String> = best.iter().map(|t| t.name.clone()).collect();
                translators.sort();
                Err(TranslatorError::Conflict(vec![TranslatorConflict {
                    source_type,
                    translators,
                }]))
            }
        }
    }
}
