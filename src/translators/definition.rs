/*!
 * Translator definitions and their on-disk format.
 *
 * A definition file is named `<name>.transdef` and holds `KEY = value` lines.
 * Keys may be qualified (`OUTPUT_EXTENSIONS for pdf`, `TRANSLATOR_FUNCTION with perl`)
 * and values may be heredoc blocks:
 *
 * ```text
 * INPUT_EXTENSIONS = .svg
 * OUTPUT_EXTENSIONS for pdf = .pdf
 * OUTPUT_EXTENSIONS for eps = .eps
 * TRANSLATOR_FUNCTION with sh = <<EOL
 * inkscape --export-filename="$out" "$in"
 * EOL
 * FILES_TO_CLEAN = $outbasename.pdf_tex
 * ```
 */

use std::cmp::Reverse;
use std::fmt;
use std::path::{Path, PathBuf};

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::TranslatorError;
use crate::file_utils::FileManager;

/// File extension of translator definitions
pub const DEFINITION_EXTENSION: &str = "transdef";

/// Interpreter used by `TRANSLATOR_FUNCTION` without a `with` qualifier
pub const DEFAULT_INTERPRETER: &str = "sh";

static KEY_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([A-Za-z_]+)(?:\s+(for|with)\s+(\S+))?\s*=\s*(.*?)\s*$").unwrap()
});

static HEREDOC: Lazy<Regex> = Lazy::new(|| Regex::new(r"^<<\s*([A-Za-z_][A-Za-z0-9_]*)$").unwrap());

static NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([^2+_]+)2([^+_]+)((?:\+[^+_]+)*)(?:_(.+))?$").unwrap()
});

/// Configuration precedence tier, lowest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranslatorLevel {
    System,
    User,
    Document,
}

impl TranslatorLevel {
    /// All levels from lowest to highest precedence
    pub const ALL: [TranslatorLevel; 3] = [Self::System, Self::User, Self::Document];
}

impl fmt::Display for TranslatorLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Document => write!(f, "document"),
        }
    }
}

/// How a translator is run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Execution {
    /// Command template, one command per non-empty line
    CommandLine(String),
    /// Script source run by an interpreter
    EmbeddedScript { interpreter: String, source: String },
}

/// A loaded translator; immutable after load
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translator {
    pub name: String,
    /// Input extensions with a leading dot, lowercased, longest first
    pub input_extensions: Vec<String>,
    /// Output extensions by target format (`None` for unqualified)
    pub output_extensions: Vec<(Option<String>, Vec<String>)>,
    pub execution: Execution,
    /// Extra files to delete on clean-all, as templates
    pub files_to_clean: Vec<String>,
    pub level: TranslatorLevel,
    pub path: PathBuf,
}

/// Parts of a translator name such as `svg2pdf+layers_inkscape`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslatorName {
    pub source: String,
    pub target: String,
    pub markers: Vec<String>,
    pub variant: Option<String>,
}

impl TranslatorName {
    pub fn parse(name: &str) -> Option<Self> {
        let caps = NAME.captures(name)?;
        Some(Self {
            source: caps[1].to_string(),
            target: caps[2].to_string(),
            markers: caps
                .get(3)
                .map(|m| m.as_str().split('+').filter(|s| !s.is_empty()).map(str::to_string).collect())
                .unwrap_or_default(),
            variant: caps.get(4).map(|m| m.as_str().to_string()),
        })
    }
}

/// Lowercase an extension and give it exactly one leading dot
pub fn normalize_extension(ext: &str) -> String {
    format!(".{}", ext.trim().trim_start_matches('.').to_lowercase())
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl Translator {
    /// Load a definition file, naming the translator after the file stem
    pub fn load(path: &Path, level: TranslatorLevel) -> Result<Self, TranslatorError> {
        let content = FileManager::read_to_string(path).map_err(|e| TranslatorError::InvalidDefinition {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::parse(&FileManager::file_stem_string(path), &content, level, path)
    }

    /// Parse definition text
    pub fn parse(name: &str, content: &str, level: TranslatorLevel, path: &Path) -> Result<Self, TranslatorError> {
        let invalid = |message: String| TranslatorError::InvalidDefinition {
            path: path.to_path_buf(),
            message,
        };

        let mut input_extensions = Vec::new();
        let mut output_extensions: Vec<(Option<String>, Vec<String>)> = Vec::new();
        let mut command_line = None;
        let mut function = None;
        let mut files_to_clean = Vec::new();

        let mut lines = content.lines().enumerate();
        while let Some((index, line)) = lines.next() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let caps = KEY_LINE
                .captures(line)
                .ok_or_else(|| invalid(format!("line {}: expected KEY = value", index + 1)))?;
            let key = caps[1].to_uppercase();
            let qualifier = caps.get(2).map(|m| m.as_str());
            let argument = caps.get(3).map(|m| m.as_str().to_string());
            let mut value = caps[4].to_string();

            if let Some(marker) = HEREDOC.captures(&value).map(|c| c[1].to_string()) {
                let mut block = Vec::new();
                let mut closed = false;
                for (_, body) in lines.by_ref() {
                    if body.trim() == marker {
                        closed = true;
                        break;
                    }
                    block.push(body);
                }
                if !closed {
                    return Err(invalid(format!("line {}: unterminated block <<{}", index + 1, marker)));
                }
                value = block.join("\n");
            }

            match (key.as_str(), qualifier) {
                ("INPUT_EXTENSIONS", None) => {
                    input_extensions.extend(split_list(&value).iter().map(|e| normalize_extension(e)))
                }
                ("OUTPUT_EXTENSIONS", None) | ("OUTPUT_EXTENSIONS", Some("for")) => {
                    let exts = split_list(&value).iter().map(|e| normalize_extension(e)).collect();
                    output_extensions.push((argument.map(|a| a.to_lowercase()), exts));
                }
                ("COMMAND_LINE", None) => command_line = Some(value),
                ("TRANSLATOR_FUNCTION", None) | ("TRANSLATOR_FUNCTION", Some("with")) => {
                    let interpreter = argument.unwrap_or_else(|| DEFAULT_INTERPRETER.to_string());
                    function = Some((interpreter, value));
                }
                ("FILES_TO_CLEAN", None) => files_to_clean.extend(split_list(&value)),
                _ => debug!("{:?}: ignoring key {}", path, key),
            }
        }

        if input_extensions.is_empty() {
            return Err(invalid("no INPUT_EXTENSIONS".to_string()));
        }
        input_extensions.sort_by(|a, b| Reverse(a.len()).cmp(&Reverse(b.len())).then_with(|| a.cmp(b)));
        input_extensions.dedup();

        let execution = match (command_line, function) {
            (Some(cmd), _) if !cmd.trim().is_empty() => Execution::CommandLine(cmd),
            (_, Some((interpreter, source))) => Execution::EmbeddedScript { interpreter, source },
            _ => return Err(invalid("neither COMMAND_LINE nor TRANSLATOR_FUNCTION".to_string())),
        };

        Ok(Self {
            name: name.to_string(),
            input_extensions,
            output_extensions,
            execution,
            files_to_clean,
            level,
            path: path.to_path_buf(),
        })
    }

    /// Longest input extension matching the file name, if any
    pub fn matching_extension(&self, file: &Path) -> Option<&str> {
        let name = file.file_name()?.to_string_lossy().to_lowercase();
        self.input_extensions
            .iter()
            .find(|ext| name.len() > ext.len() && name.ends_with(ext.as_str()))
            .map(String::as_str)
    }

    /// Output extensions for a target format (`pdf` or `eps`), falling back to
    /// the unqualified list
    pub fn output_extensions_for(&self, target: &str) -> &[String] {
        self.output_extensions
            .iter()
            .find(|(q, _)| q.as_deref() == Some(target))
            .or_else(|| self.output_extensions.iter().find(|(q, _)| q.is_none()))
            .map(|(_, exts)| exts.as_slice())
            .unwrap_or(&[])
    }

    /// Whether any declared output list contains `ext` (with dot)
    pub fn produces(&self, ext: &str) -> bool {
        let ext = normalize_extension(ext);
        self.output_extensions.iter().any(|(_, exts)| exts.contains(&ext))
    }

    /// Parsed parts of the name, when it follows the `src2dst` convention
    pub fn parsed_name(&self) -> Option<TranslatorName> {
        TranslatorName::parse(&self.name)
    }
}
