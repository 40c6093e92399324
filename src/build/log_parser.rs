/*!
 * Compiler log analysis.
 *
 * Extracts the three standard warning categories, the structured warning
 * blocks written by the diagnostics wrapper, and the first TeX error.
 */

use std::collections::BTreeSet;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

/// Marker opening a structured warning block
pub const BEGIN_WARNING: &str = "!!!![BeginWarning]";
/// Marker closing a structured warning block
pub const END_WARNING: &str = "!!!![EndWarning]";
/// File tag of a warning whose file could not be named
pub const UNKNOWN_FILE: &str = "?";

static MULTIPLY_DEFINED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(there were multiply[- ]defined labels|label .+ multiply defined)\.\s*$").unwrap()
});

static UNDEFINED_REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(there were undefined references|reference .+ undefined( on input line \d+)?|rerun to get cross-references right)\.\s*$",
    )
    .unwrap()
});

static UNDEFINED_CITATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(there were undefined citations|citation .+ undefined( on input line \d+)?)\.\s*$").unwrap()
});

static MARKER_HEAD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([^:]+):([^:]*):(\d+):\s?(.*)$").unwrap()
});

static FILE_LINE_ERROR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\S+?\.[A-Za-z]+):(\d+):\s*(.+)$").unwrap()
});

static TEX_ERROR_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^l\.(\d+)").unwrap());

/// Warning categories that make another compiler pass worthwhile
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StandardWarning {
    UndefinedCitation,
    UndefinedReference,
    MultiplyDefinedLabel,
}

impl StandardWarning {
    /// Category of one warning text, if any
    pub fn classify(text: &str) -> Option<Self> {
        let text = text.trim_end();
        if UNDEFINED_CITATION.is_match(text) {
            Some(Self::UndefinedCitation)
        } else if MULTIPLY_DEFINED.is_match(text) {
            Some(Self::MultiplyDefinedLabel)
        } else if UNDEFINED_REFERENCE.is_match(text) {
            Some(Self::UndefinedReference)
        } else {
            None
        }
    }
}

impl fmt::Display for StandardWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::UndefinedCitation => "undefined_citation",
            Self::UndefinedReference => "undefined_reference",
            Self::MultiplyDefinedLabel => "multiply_defined_label",
        })
    }
}

/// A warning with its real source position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedWarning {
    /// `base.ext` of the file the warning belongs to, empty when unknown
    pub file: String,
    pub line: usize,
    pub message: String,
}

impl fmt::Display for LocatedWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.file.is_empty() {
            write!(f, "line {}: {}", self.line, self.message)
        } else {
            write!(f, "{}:{}: {}", self.file, self.line, self.message)
        }
    }
}

/// A TeX error found in a failed run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedError {
    pub file: Option<String>,
    pub line: Option<usize>,
    pub message: String,
}

impl fmt::Display for LocatedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.file, self.line) {
            (Some(file), Some(line)) => write!(f, "{}:{}: {}", file, line, self.message),
            (None, Some(line)) => write!(f, "line {}: {}", line, self.message),
            _ => f.write_str(&self.message),
        }
    }
}

/// How warnings from the generated wrapper map back to the document
#[derive(Debug, Clone, Default)]
pub struct WrapperMapping {
    /// Base names (without extension) that denote the wrapper
    pub wrapper_names: Vec<String>,
    /// `base.ext` reported instead
    pub document: String,
    /// Lines the wrapper adds before the document text
    pub line_offset: usize,
}

/// Everything extracted from one compiler log
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogAnalysis {
    pub warnings: BTreeSet<StandardWarning>,
    pub located: Vec<LocatedWarning>,
}

/// Parse a compiler log. With `mapping`, structured warning blocks are read and
/// positions inside the wrapper are shifted back to the document.
pub fn parse_log(text: &str, mapping: Option<&WrapperMapping>) -> LogAnalysis {
    let mut analysis = LogAnalysis::default();
    let mut block: Option<Vec<&str>> = None;

    for line in text.lines() {
        if let Some(lines) = block.as_mut() {
            if let Some(before) = line.strip_suffix(END_WARNING).or_else(|| line.find(END_WARNING).map(|i| &line[..i])) {
                if !before.is_empty() {
                    lines.push(before);
                }
                let finished = block.take().unwrap_or_default();
                finish_block(&finished, mapping, &mut analysis);
            } else {
                lines.push(line);
            }
            continue;
        }

        if let Some(start) = line.find(BEGIN_WARNING).filter(|_| mapping.is_some()) {
            let rest = &line[start + BEGIN_WARNING.len()..];
            match rest.find(END_WARNING) {
                Some(end) => finish_block(&[&rest[..end]], mapping, &mut analysis),
                None => block = Some(vec![rest]),
            }
            continue;
        }

        if let Some(warning) = StandardWarning::classify(line) {
            analysis.warnings.insert(warning);
        }
    }

    if let Some(unfinished) = block {
        finish_block(&unfinished, mapping, &mut analysis);
    }
    analysis
}

fn finish_block(lines: &[&str], mapping: Option<&WrapperMapping>, analysis: &mut LogAnalysis) {
    let joined = lines.iter().map(|l| l.trim_end()).collect::<Vec<_>>().join(" ");
    let joined = joined.trim();
    let Some(caps) = MARKER_HEAD.captures(joined) else {
        if let Some(warning) = StandardWarning::classify(joined) {
            analysis.warnings.insert(warning);
        }
        return;
    };

    let base = caps[1].trim().to_string();
    let ext = caps[2].trim().to_string();
    let mut line: usize = caps[3].parse().unwrap_or(0);
    let message = caps[4].trim().to_string();
    let mut file = match (base.as_str(), ext.is_empty()) {
        (UNKNOWN_FILE, _) => String::new(),
        (_, true) => base.clone(),
        (_, false) => format!("{}.{}", base, ext),
    };

    if let Some(mapping) = mapping {
        if mapping.wrapper_names.iter().any(|n| *n == base) && line > mapping.line_offset {
            line -= mapping.line_offset;
            file = mapping.document.clone();
        }
    }

    if let Some(warning) = StandardWarning::classify(&message) {
        analysis.warnings.insert(warning);
    }
    analysis.located.push(LocatedWarning { file, line, message });
}

/// First TeX error of a failed run: `! message` followed by `l.<n>`, or a
/// `file:line: message` line in file-line-error mode
pub fn locate_error(text: &str) -> Option<LocatedError> {
    let lines: Vec<&str> = text.lines().collect();
    for (index, line) in lines.iter().enumerate() {
        if let Some(caps) = FILE_LINE_ERROR.captures(line) {
            return Some(LocatedError {
                file: Some(caps[1].to_string()),
                line: caps[2].parse().ok(),
                message: caps[3].trim().to_string(),
            });
        }
        if let Some(message) = line.strip_prefix("! ") {
            let line_number = lines[index + 1..]
                .iter()
                .take(30)
                .find_map(|l| TEX_ERROR_LINE.captures(l).and_then(|c| c[1].parse().ok()));
            return Some(LocatedError {
                file: None,
                line: line_number,
                message: message.trim().to_string(),
            });
        }
    }
    None
}
