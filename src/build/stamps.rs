/*!
 * Persisted content fingerprints of bibliography, index and glossary triggers.
 *
 * The stamp file holds one entry per line, `BIB(<fingerprint>):<key>`,
 * `IDX(<fingerprint>):<key>` or `GLO(<fingerprint>):<key>`. Unknown lines are ignored.
 */

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::BuildError;
use crate::file_utils::FileManager;

/// Name of the stamp file in the document directory
pub const STAMP_FILE_NAME: &str = ".autolatex_stamp";

static STAMP_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(BIB|IDX|GLO)\(([^)]*)\):(.+)$").unwrap());

/// Trigger family of a stamp entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StampKind {
    Bib,
    Idx,
    Glo,
}

impl fmt::Display for StampKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Bib => "BIB",
            Self::Idx => "IDX",
            Self::Glo => "GLO",
        })
    }
}

/// Stamp map loaded at build start and written at build end
#[derive(Debug, Clone, Default)]
pub struct BuildStamps {
    path: PathBuf,
    entries: BTreeMap<(StampKind, String), String>,
    modified: bool,
}

impl BuildStamps {
    /// Read the stamp file; a missing file gives an empty map
    pub fn load(path: &Path) -> Result<Self, BuildError> {
        let mut stamps = Self {
            path: path.to_path_buf(),
            ..Default::default()
        };
        if !path.exists() {
            return Ok(stamps);
        }
        let content = std::fs::read_to_string(path).map_err(|e| BuildError::io(path, e))?;
        for line in content.lines() {
            let Some(caps) = STAMP_LINE.captures(line.trim_end()) else {
                debug!("Ignoring stamp line {:?}", line);
                continue;
            };
            let kind = match &caps[1] {
                "BIB" => StampKind::Bib,
                "IDX" => StampKind::Idx,
                _ => StampKind::Glo,
            };
            stamps.entries.insert((kind, caps[3].to_string()), caps[2].to_string());
        }
        Ok(stamps)
    }

    pub fn get(&self, kind: StampKind, key: &str) -> Option<&str> {
        self.entries.get(&(kind, key.to_string())).map(String::as_str)
    }

    pub fn set(&mut self, kind: StampKind, key: &str, fingerprint: &str) {
        let previous = self.entries.insert((kind, key.to_string()), fingerprint.to_string());
        if previous.as_deref() != Some(fingerprint) {
            self.modified = true;
        }
    }

    /// Whether `fingerprint` differs from the stored one (or none is stored)
    pub fn differs(&self, kind: StampKind, key: &str, fingerprint: &str) -> bool {
        self.get(kind, key) != Some(fingerprint)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stamp file content
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .map(|((kind, key), fp)| format!("{}({}):{}\n", kind, fp, key))
            .collect()
    }

    /// Write the stamp file if anything changed since load
    pub fn save(&mut self) -> Result<(), BuildError> {
        if !self.modified {
            return Ok(());
        }
        FileManager::write_to_file(&self.path, &self.render()).map_err(|e| BuildError::Io {
            path: self.path.clone(),
            message: e.to_string(),
        })?;
        self.modified = false;
        Ok(())
    }
}
