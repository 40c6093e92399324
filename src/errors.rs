/*!
 * Error types for the autolatex build engine.
 *
 * This module contains custom error types for the different parts of the engine,
 * using the thiserror crate for ergonomic error definitions.
 */

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Recoverable problem found while scanning markup.
///
/// Diagnostics are never returned as `Err`: the parser reports them to its
/// handler and keeps going.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseDiagnostic {
    /// Line of the underlying input (1-based) where the problem was seen
    pub line: usize,
    /// What went wrong
    pub kind: DiagnosticKind,
}

/// Kinds of recoverable parser problems
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// Input ended while a macro argument was still open
    UnexpectedEndOfInput { macro_name: String },
    /// A closing character without a matching opening one
    UnmatchedClosing(char),
    /// A macro was found only in the table of the other mode
    WrongMode { macro_name: String, math: bool },
    /// A math delimiter disagrees with the current math state
    MathModeMismatch { found: String },
    /// A `\` at the very end of the input
    DanglingEscape,
    /// Too many macro expansions were pushed back in one parse
    ExpansionLimit { macro_name: String },
}

impl fmt::Display for ParseDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            DiagnosticKind::UnexpectedEndOfInput { macro_name } => write!(
                f,
                "line {}: unexpected end of input in the arguments of \\{}",
                self.line, macro_name
            ),
            DiagnosticKind::UnmatchedClosing(c) => {
                write!(f, "line {}: unmatched closing character '{}'", self.line, c)
            }
            DiagnosticKind::WrongMode { macro_name, math } => write!(
                f,
                "line {}: \\{} is only defined in {} mode",
                self.line,
                macro_name,
                if *math { "text" } else { "math" }
            ),
            DiagnosticKind::MathModeMismatch { found } => write!(
                f,
                "line {}: math delimiter '{}' does not match the current math mode",
                self.line, found
            ),
            DiagnosticKind::DanglingEscape => {
                write!(f, "line {}: escape character at end of input", self.line)
            }
            DiagnosticKind::ExpansionLimit { macro_name } => write!(
                f,
                "line {}: expansion limit reached while expanding \\{}",
                self.line, macro_name
            ),
        }
    }
}

/// Errors that can occur while building a document
#[derive(Error, Debug)]
pub enum BuildError {
    /// The external tool binary could not be started
    #[error("Tool not found: {tool}")]
    ToolNotFound {
        /// Binary name that failed to spawn
        tool: String,
    },

    /// The external tool terminated with a failure status
    #[error("{tool} exited with code {code:?}: {output}")]
    ToolExited {
        /// Binary name
        tool: String,
        /// Exit code, absent when killed by a signal
        code: Option<i32>,
        /// Located error message, or captured output
        output: String,
    },

    /// The tool failed but no structured error could be located in its output
    #[error("{tool} failed and no error could be located in its output:\n{output}")]
    LogParseAmbiguous {
        /// Binary name
        tool: String,
        /// Raw captured output
        output: String,
    },

    /// The node graph contains a cycle through the given path
    #[error("Dependency cycle detected at {0:?}")]
    DependencyCycle(PathBuf),

    /// The build was cancelled by the caller
    #[error("Build cancelled")]
    Cancelled,

    /// Figure generation failed
    #[error("Translator error: {0}")]
    Translator(#[from] TranslatorError),

    /// File-system failure with context
    #[error("I/O error on {path:?}: {message}")]
    Io {
        /// Path involved
        path: PathBuf,
        /// Error text
        message: String,
    },
}

impl BuildError {
    /// Wrap an I/O error with the path it concerns
    pub fn io(path: impl Into<PathBuf>, error: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            message: error.to_string(),
        }
    }
}

/// Two or more includable translators for the same source type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslatorConflict {
    /// Normalised source type (input extension without the dot)
    pub source_type: String,
    /// Names of the competing translators, sorted
    pub translators: Vec<String>,
}

impl TranslatorConflict {
    /// Configuration snippet that keeps the first translator and excludes the others
    pub fn remediation_hint(&self) -> String {
        let entries: Vec<String> = self
            .translators
            .iter()
            .enumerate()
            .map(|(i, name)| format!("\"{}\": {}", name, i == 0))
            .collect();
        format!(
            "\"translators\": {{ \"document\": {{ {} }} }}",
            entries.join(", ")
        )
    }
}

impl fmt::Display for TranslatorConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "translators {} can all convert '{}' files; choose one, e.g. {}",
            self.translators.join(", "),
            self.source_type,
            self.remediation_hint()
        )
    }
}

/// Errors that can occur in the translator registry
#[derive(Error, Debug)]
pub enum TranslatorError {
    /// Several translators apply to the same source type
    #[error("{}", format_conflicts(.0))]
    Conflict(Vec<TranslatorConflict>),

    /// No translator handles the given source file
    #[error("No translator found for {0:?}")]
    NotFound(PathBuf),

    /// A translator definition file could not be understood
    #[error("Invalid translator definition {path:?}: {message}")]
    InvalidDefinition {
        /// Definition file
        path: PathBuf,
        /// What was wrong
        message: String,
    },

    /// The translator ran and failed
    #[error("Translator {name} failed on {source_file:?} (exit code {code:?}): {output}")]
    ExecutionFailed {
        /// Translator name
        name: String,
        /// Source image
        source_file: PathBuf,
        /// Exit code if any
        code: Option<i32>,
        /// Captured stderr/stdout
        output: String,
    },

    /// The translator program could not be spawned
    #[error("Translator {name} could not start {program}: {message}")]
    Spawn {
        /// Translator name
        name: String,
        /// Program that failed to start
        program: String,
        /// Error text
        message: String,
    },
}

fn format_conflicts(conflicts: &[TranslatorConflict]) -> String {
    conflicts
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Main application error type that wraps all other errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from a file operation
    #[error("File error: {0}")]
    File(String),

    /// Error from the build engine
    #[error("Build error: {0}")]
    Build(#[from] BuildError),

    /// Error from the translator registry
    #[error("Translator error: {0}")]
    Translator(#[from] TranslatorError),

    /// Configuration problem
    #[error("Configuration error: {0}")]
    Config(String),

    /// Any other error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

// Utility functions for error conversion
impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::Unknown(error.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::File(error.to_string())
    }
}
