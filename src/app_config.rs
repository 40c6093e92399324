use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::default::Default;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::translators::{InclusionOverrides, TranslatorDirectories, TranslatorLevel};

/// Application configuration module
/// This module handles the build configuration: compiler choice, output
/// format, tool command lines, figure generation and translator inclusion.
/// Represents the application configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Config {
    /// LaTeX engine
    #[serde(default)]
    pub compiler: Compiler,

    /// Final document format
    #[serde(default)]
    pub generation_type: GenerationType,

    /// Pass `-synctex=1` to the compiler
    #[serde(default)]
    pub synctex: bool,

    /// Wrap the document to get file/line-tagged warnings
    #[serde(default)]
    pub extended_warnings: bool,

    /// Rerun the compiler while new reference warnings appear
    #[serde(default = "default_true")]
    pub rerun_on_warnings: bool,

    /// Upper bound on compiler passes per build
    #[serde(default = "default_max_compilations")]
    pub max_compilations: usize,

    /// Citation tool selection
    #[serde(default)]
    pub bibliography_backend: BibliographyBackend,

    /// External tool binaries and flags
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Figure generation
    #[serde(default)]
    pub images: ImagesConfig,

    /// Translator locations and inclusion overrides
    #[serde(default)]
    pub translators: TranslatorsConfig,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// LaTeX engine
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Compiler {
    #[default]
    Pdflatex,
    Xelatex,
    Lualatex,
    Latex,
}

impl Compiler {
    // @returns: Default binary name
    pub fn binary(&self) -> &'static str {
        match self {
            Self::Pdflatex => "pdflatex",
            Self::Xelatex => "xelatex",
            Self::Lualatex => "lualatex",
            Self::Latex => "latex",
        }
    }
}

impl std::fmt::Display for Compiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.binary())
    }
}

impl std::str::FromStr for Compiler {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "pdflatex" => Ok(Self::Pdflatex),
            "xelatex" => Ok(Self::Xelatex),
            "lualatex" => Ok(Self::Lualatex),
            "latex" => Ok(Self::Latex),
            _ => Err(anyhow!("Invalid compiler: {}", s)),
        }
    }
}

/// Final document format
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum GenerationType {
    #[default]
    Pdf,
    Dvi,
    Ps,
}

impl GenerationType {
    // @returns: Extension of the compiler's direct output
    pub fn compiler_output_extension(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Dvi | Self::Ps => "dvi",
        }
    }

    // @returns: Extension of the final document
    pub fn final_extension(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Dvi => "dvi",
            Self::Ps => "ps",
        }
    }

    // @returns: Translator output target (`pdf` or `eps`)
    pub fn figure_target(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Dvi | Self::Ps => "eps",
        }
    }
}

impl std::str::FromStr for GenerationType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "pdf" => Ok(Self::Pdf),
            "dvi" => Ok(Self::Dvi),
            "ps" => Ok(Self::Ps),
            _ => Err(anyhow!("Invalid generation type: {}", s)),
        }
    }
}

/// Citation tool selection
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BibliographyBackend {
    /// Follow the document (`biblatex` with `backend=biber` selects biber)
    #[default]
    Auto,
    Bibtex,
    Biber,
}

/// External tool configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ToolsConfig {
    // @field: Compiler binary override (defaults to the compiler's name)
    #[serde(default)]
    pub latex: Option<String>,

    // @field: Extra compiler flags
    #[serde(default)]
    pub latex_flags: Vec<String>,

    #[serde(default = "default_bibtex")]
    pub bibtex: String,

    #[serde(default)]
    pub bibtex_flags: Vec<String>,

    #[serde(default = "default_biber")]
    pub biber: String,

    #[serde(default)]
    pub biber_flags: Vec<String>,

    #[serde(default = "default_makeindex")]
    pub makeindex: String,

    #[serde(default)]
    pub makeindex_flags: Vec<String>,

    // @field: Index style file passed with `-s`
    #[serde(default)]
    pub makeindex_style: Option<String>,

    #[serde(default = "default_makeglossaries")]
    pub makeglossaries: String,

    #[serde(default)]
    pub makeglossaries_flags: Vec<String>,

    #[serde(default = "default_dvips")]
    pub dvips: String,

    #[serde(default)]
    pub dvips_flags: Vec<String>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            latex: None,
            latex_flags: Vec::new(),
            bibtex: default_bibtex(),
            bibtex_flags: Vec::new(),
            biber: default_biber(),
            biber_flags: Vec::new(),
            makeindex: default_makeindex(),
            makeindex_flags: Vec::new(),
            makeindex_style: None,
            makeglossaries: default_makeglossaries(),
            makeglossaries_flags: Vec::new(),
            dvips: default_dvips(),
            dvips_flags: Vec::new(),
        }
    }
}

/// Figure generation configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ImagesConfig {
    /// Generate figures before compiling
    #[serde(default = "default_true")]
    pub generate: bool,

    /// Directories searched for figure sources, relative to the document
    #[serde(default = "default_image_directories")]
    pub directories: Vec<PathBuf>,

    /// Maximum translators running at once
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            generate: true,
            directories: default_image_directories(),
            concurrency: default_concurrency(),
        }
    }
}

/// Translator locations and per-level inclusion overrides
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct TranslatorsConfig {
    #[serde(default)]
    pub system_dir: Option<PathBuf>,

    // @field: Defaults to `<config dir>/autolatex/translators`
    #[serde(default)]
    pub user_dir: Option<PathBuf>,

    // @field: Defaults to `<document dir>/.autolatex/translators`
    #[serde(default)]
    pub document_dir: Option<PathBuf>,

    #[serde(default)]
    pub system: BTreeMap<String, bool>,

    #[serde(default)]
    pub user: BTreeMap<String, bool>,

    #[serde(default)]
    pub document: BTreeMap<String, bool>,
}

impl TranslatorsConfig {
    // @returns: Definition directories for a document directory
    pub fn directories(&self, document_dir: &Path) -> TranslatorDirectories {
        TranslatorDirectories {
            system: self.system_dir.clone(),
            user: self
                .user_dir
                .clone()
                .or_else(|| dirs::config_dir().map(|d| d.join("autolatex").join("translators"))),
            document: Some(
                self.document_dir
                    .as_ref()
                    .map(|d| document_dir.join(d))
                    .unwrap_or_else(|| document_dir.join(".autolatex").join("translators")),
            ),
        }
    }

    // @returns: Inclusion overrides keyed by level
    pub fn overrides(&self) -> InclusionOverrides {
        let mut overrides = InclusionOverrides::new();
        for (level, map) in [
            (TranslatorLevel::System, &self.system),
            (TranslatorLevel::User, &self.user),
            (TranslatorLevel::Document, &self.document),
        ] {
            if !map.is_empty() {
                overrides.insert(level, map.clone());
            }
        }
        overrides
    }
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_level_filter(&self) -> log::LevelFilter {
        match self {
            Self::Error => log::LevelFilter::Error,
            Self::Warn => log::LevelFilter::Warn,
            Self::Info => log::LevelFilter::Info,
            Self::Debug => log::LevelFilter::Debug,
            Self::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Name of the per-document configuration file
pub const CONFIG_FILE_NAME: &str = ".autolatex.json";

fn default_true() -> bool {
    true
}

fn default_max_compilations() -> usize {
    5
}

fn default_concurrency() -> usize {
    4
}

fn default_image_directories() -> Vec<PathBuf> {
    vec![PathBuf::from(".")]
}

fn default_bibtex() -> String {
    "bibtex".to_string()
}

fn default_biber() -> String {
    "biber".to_string()
}

fn default_makeindex() -> String {
    "makeindex".to_string()
}

fn default_makeglossaries() -> String {
    "makeglossaries".to_string()
}

fn default_dvips() -> String {
    "dvips".to_string()
}

impl Config {
    /// Load a configuration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open config file: {:?}", path))?;
        let reader = BufReader::new(file);
        let config: Config = serde_json::from_reader(reader)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        Ok(config)
    }

    /// Load `path` if it exists, defaults otherwise
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::from_file(path)
        } else {
            log::info!("No configuration at {:?}, using defaults", path);
            Ok(Self::default())
        }
    }

    /// Write the configuration as pretty JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize config to JSON")?;
        std::fs::write(path.as_ref(), json)
            .with_context(|| format!("Failed to write config file: {:?}", path.as_ref()))?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_compilations == 0 {
            return Err(anyhow!("max_compilations must be at least 1"));
        }
        if self.images.concurrency == 0 {
            return Err(anyhow!("images.concurrency must be at least 1"));
        }
        if self.compiler == Compiler::Xelatex && self.generation_type == GenerationType::Ps {
            return Err(anyhow!("xelatex writes .xdv files, which dvips cannot convert; use pdf or dvi output"));
        }
        if self.compiler == Compiler::Latex && self.generation_type == GenerationType::Pdf {
            log::debug!("latex will be asked for PDF output with -output-format=pdf");
        }
        Ok(())
    }

    // @returns: Compiler binary, honouring the tool override
    pub fn compiler_binary(&self) -> String {
        self.tools
            .latex
            .clone()
            .unwrap_or_else(|| self.compiler.binary().to_string())
    }

    // @returns: Extension of the compiler's direct output (`xdv` for xelatex without PDF)
    pub fn compiler_output_extension(&self) -> &'static str {
        match (self.compiler, self.generation_type) {
            (Compiler::Xelatex, GenerationType::Dvi | GenerationType::Ps) => "xdv",
            (_, generation) => generation.compiler_output_extension(),
        }
    }

    // @returns: Extension of the final document for this compiler
    pub fn final_extension(&self) -> &'static str {
        match (self.compiler, self.generation_type) {
            (Compiler::Xelatex, GenerationType::Dvi) => "xdv",
            (_, generation) => generation.final_extension(),
        }
    }

    // @returns: Whether biber should be used for a document
    pub fn use_biber(&self, document_uses_biber: bool) -> bool {
        match self.bibliography_backend {
            BibliographyBackend::Auto => document_uses_biber,
            BibliographyBackend::Bibtex => false,
            BibliographyBackend::Biber => true,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            compiler: Compiler::default(),
            generation_type: GenerationType::default(),
            synctex: false,
            extended_warnings: false,
            rerun_on_warnings: true,
            max_compilations: default_max_compilations(),
            bibliography_backend: BibliographyBackend::default(),
            tools: ToolsConfig::default(),
            images: ImagesConfig::default(),
            translators: TranslatorsConfig::default(),
            log_level: LogLevel::default(),
        }
    }
}
