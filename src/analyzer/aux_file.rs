/*!
 * Scanning of the auxiliary file written by the compiler.
 *
 * Only the lines that matter for the bibliography are kept: citations, the
 * databases and style requested through `\bibdata` / `\bibstyle`, and nested
 * `\@input` aux files of included chapters.
 */

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::file_utils::FileManager;

static AUX_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\\(citation|bibdata|bibstyle|@input)\{([^}]*)\}").unwrap()
});

/// Bibliography-related content of an aux file and its nested inputs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuxData {
    /// Citation keys in order of appearance
    pub citations: Vec<String>,
    /// Database names from `\bibdata`
    pub bibdata: Vec<String>,
    /// Style names from `\bibstyle`
    pub bibstyle: Vec<String>,
    /// Nested aux files that were read
    pub inputs: Vec<PathBuf>,
}

impl AuxData {
    /// Read `path` and every aux file it pulls in with `\@input`.
    /// A missing top-level file yields empty data.
    pub fn read(path: &Path) -> Result<Self> {
        let mut data = Self::default();
        let mut seen = HashSet::new();
        let mut queue = vec![path.to_path_buf()];
        let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();

        while let Some(file) = queue.pop() {
            if !seen.insert(FileManager::canonical(&file)) || !FileManager::file_exists(&file) {
                continue;
            }
            let content = FileManager::read_to_string(&file)?;
            for nested in data.scan(&content) {
                let nested = dir.join(nested);
                data.inputs.push(nested.clone());
                queue.push(nested);
            }
        }
        Ok(data)
    }

    /// Parse aux content, returning the nested inputs it names
    pub fn scan(&mut self, content: &str) -> Vec<String> {
        let mut nested = Vec::new();
        for line in content.lines() {
            let Some(caps) = AUX_LINE.captures(line.trim_start()) else {
                continue;
            };
            let values = caps[2]
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string);
            match &caps[1] {
                "citation" => self.citations.extend(values),
                "bibdata" => self.bibdata.extend(values),
                "bibstyle" => self.bibstyle.extend(values),
                _ => nested.extend(values),
            }
        }
        nested
    }

    /// Whether bibtex has anything to do
    pub fn needs_bibliography(&self) -> bool {
        !self.citations.is_empty() && !self.bibdata.is_empty()
    }

    /// Digest of the bibliography-relevant lines
    pub fn fingerprint(&self) -> String {
        let lines = self
            .citations
            .iter()
            .map(|c| format!("citation:{}", c))
            .chain(self.bibdata.iter().map(|d| format!("bibdata:{}", d)))
            .chain(self.bibstyle.iter().map(|s| format!("bibstyle:{}", s)));
        FileManager::fingerprint_lines(lines)
    }
}
