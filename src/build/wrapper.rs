/*!
 * Temporary document wrapper for extended diagnostics.
 *
 * The wrapper is the document text preceded by a preamble that redefines
 * `\GenericWarning` so every warning is also written to the log between
 * `!!!![BeginWarning]` and `!!!![EndWarning]` markers, tagged with the current
 * file and input line. The wrapper is compiled with `-jobname=<stem>` so all
 * outputs keep the document's name, and it is deleted when dropped.
 *
 * Without `currfile.sty` the current file cannot be named, so warnings are
 * tagged with `?` (see `log_parser::UNKNOWN_FILE`) and keep their raw
 * input line.
 */

use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::build::log_parser::WrapperMapping;
use crate::errors::BuildError;
use crate::file_utils::FileManager;

/// Suffix appended to the document stem for the wrapper file name
pub const WRAPPER_SUFFIX: &str = "_autolatex_wrapper";

const PREAMBLE: &str = r"\makeatletter
\IfFileExists{currfile.sty}{\RequirePackage{currfile}\def\autolatex@file{\currfilebase:\currfileext}}{\def\autolatex@file{?:}}
\let\autolatex@GenericWarning\GenericWarning
\def\GenericWarning#1#2{%
\immediate\write-1{!!!![BeginWarning]\autolatex@file:\the\inputlineno: #2}%
\immediate\write-1{!!!![EndWarning]}%
\autolatex@GenericWarning{#1}{#2}}
\makeatother
";

/// Generated wrapper file, removed on drop
#[derive(Debug)]
pub struct WrapperFile {
    path: PathBuf,
    document: String,
    document_stem: String,
}

impl WrapperFile {
    /// Write the wrapper next to `root_file`
    pub fn create(root_file: &Path) -> Result<Self, BuildError> {
        // Bytes are copied as-is; latin1 documents must not be re-encoded
        let content = std::fs::read(root_file).map_err(|e| BuildError::io(root_file, e))?;
        let document_stem = FileManager::file_stem_string(root_file);
        let document = root_file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let path = root_file.with_file_name(format!("{}{}.tex", document_stem, WRAPPER_SUFFIX));

        let mut text = Vec::with_capacity(PREAMBLE.len() + content.len());
        text.extend_from_slice(PREAMBLE.as_bytes());
        text.extend_from_slice(&content);
        std::fs::write(&path, text).map_err(|e| BuildError::io(&path, e))?;
        debug!("Created diagnostics wrapper {:?}", path);

        Ok(Self {
            path,
            document,
            document_stem,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name to hand to the compiler
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    /// Number of lines the wrapper adds before the document
    pub fn line_offset() -> usize {
        PREAMBLE.lines().count()
    }

    /// Mapping of wrapper positions back to the document
    pub fn mapping(&self) -> WrapperMapping {
        WrapperMapping {
            wrapper_names: vec![
                format!("{}{}", self.document_stem, WRAPPER_SUFFIX),
                self.document_stem.clone(),
            ],
            document: self.document.clone(),
            line_offset: Self::line_offset(),
        }
    }
}

impl Drop for WrapperFile {
    fn drop(&mut self) {
        if let Err(e) = FileManager::remove_if_exists(&self.path) {
            warn!("Could not remove diagnostics wrapper: {}", e);
        }
    }
}
