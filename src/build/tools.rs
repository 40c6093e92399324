/*!
 * External tool invocations.
 *
 * `ToolInvocation` builds the argument vector of each tool from the
 * configuration; a `ToolRunner` executes it. The process runner races the
 * child against the cancellation token and kills it when cancelled.
 */

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use log::debug;
use parking_lot::Mutex;
use tokio::process::Command;
use tokio::sync::watch;

use crate::app_config::{Compiler, Config, GenerationType};
use crate::errors::BuildError;

/// External tools the build drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    Latex,
    Bibtex,
    Biber,
    Makeindex,
    Makeglossaries,
    Dvips,
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Latex => "latex",
            Self::Bibtex => "bibtex",
            Self::Biber => "biber",
            Self::Makeindex => "makeindex",
            Self::Makeglossaries => "makeglossaries",
            Self::Dvips => "dvips",
        })
    }
}

/// One tool command, ready to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub kind: ToolKind,
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    /// File the tool is expected to produce
    pub output: Option<PathBuf>,
}

impl ToolInvocation {
    /// Primary compiler on `input` (a file name in `dir`)
    pub fn latex(config: &Config, dir: &Path, input: &str, jobname: Option<&str>, output: PathBuf) -> Self {
        let mut args = config.tools.latex_flags.clone();
        args.push("-interaction=nonstopmode".to_string());
        args.push("-file-line-error".to_string());
        if config.synctex {
            args.push("-synctex=1".to_string());
        }
        match (config.compiler, config.generation_type) {
            (Compiler::Xelatex, GenerationType::Dvi | GenerationType::Ps) => args.push("-no-pdf".to_string()),
            (Compiler::Xelatex, GenerationType::Pdf) => {}
            (_, GenerationType::Pdf) => args.push("-output-format=pdf".to_string()),
            (_, GenerationType::Dvi | GenerationType::Ps) => args.push("-output-format=dvi".to_string()),
        }
        if let Some(jobname) = jobname {
            args.push(format!("-jobname={}", jobname));
        }
        args.push(input.to_string());
        Self {
            kind: ToolKind::Latex,
            program: config.compiler_binary(),
            args,
            working_dir: dir.to_path_buf(),
            output: Some(output),
        }
    }

    /// BibTeX on `<aux_stem>.aux`
    pub fn bibtex(config: &Config, dir: &Path, aux_stem: &str) -> Self {
        let mut args = config.tools.bibtex_flags.clone();
        args.push(aux_stem.to_string());
        Self {
            kind: ToolKind::Bibtex,
            program: config.tools.bibtex.clone(),
            args,
            working_dir: dir.to_path_buf(),
            output: Some(dir.join(format!("{}.bbl", aux_stem))),
        }
    }

    /// Biber on `<stem>.bcf`
    pub fn biber(config: &Config, dir: &Path, stem: &str) -> Self {
        let mut args = config.tools.biber_flags.clone();
        args.push(stem.to_string());
        Self {
            kind: ToolKind::Biber,
            program: config.tools.biber.clone(),
            args,
            working_dir: dir.to_path_buf(),
            output: Some(dir.join(format!("{}.bbl", stem))),
        }
    }

    /// MakeIndex from `<stem>.idx` to `<stem>.ind`
    pub fn makeindex(config: &Config, dir: &Path, stem: &str) -> Self {
        let mut args = config.tools.makeindex_flags.clone();
        if let Some(style) = &config.tools.makeindex_style {
            args.push("-s".to_string());
            args.push(style.clone());
        }
        args.push("-o".to_string());
        args.push(format!("{}.ind", stem));
        args.push(format!("{}.idx", stem));
        Self {
            kind: ToolKind::Makeindex,
            program: config.tools.makeindex.clone(),
            args,
            working_dir: dir.to_path_buf(),
            output: Some(dir.join(format!("{}.ind", stem))),
        }
    }

    /// MakeGlossaries for `<stem>`
    pub fn makeglossaries(config: &Config, dir: &Path, stem: &str) -> Self {
        let mut args = config.tools.makeglossaries_flags.clone();
        args.push(stem.to_string());
        Self {
            kind: ToolKind::Makeglossaries,
            program: config.tools.makeglossaries.clone(),
            args,
            working_dir: dir.to_path_buf(),
            output: Some(dir.join(format!("{}.gls", stem))),
        }
    }

    /// Dvips from the compiler output of `<stem>` to `<stem>.ps`
    pub fn dvips(config: &Config, dir: &Path, stem: &str) -> Self {
        let mut args = config.tools.dvips_flags.clone();
        args.push("-o".to_string());
        args.push(format!("{}.ps", stem));
        args.push(format!("{}.{}", stem, config.compiler_output_extension()));
        Self {
            kind: ToolKind::Dvips,
            program: config.tools.dvips.clone(),
            args,
            working_dir: dir.to_path_buf(),
            output: Some(dir.join(format!("{}.ps", stem))),
        }
    }

    /// Printable command line
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// What a finished tool reported
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    /// stdout followed by stderr
    pub fn combined(&self) -> String {
        if self.stderr.trim().is_empty() {
            self.stdout.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// Caller side of build cancellation
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// Observed by the build between steps and while a tool runs
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

/// Linked handle and token
pub fn cancellation() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelToken { rx })
}

impl CancelToken {
    /// Token that is never cancelled
    pub fn never() -> Self {
        let (_, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancelled; pends forever if the handle is gone
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Executes tool invocations
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Run to completion. A non-zero exit is reported in the output, not as `Err`.
    async fn run(&self, invocation: &ToolInvocation, cancel: &CancelToken) -> Result<ToolOutput, BuildError>;
}

/// Runs tools as child processes
#[derive(Debug, Default)]
pub struct ProcessRunner {
    /// Commands currently running
    active: Mutex<Vec<(Option<u32>, String)>>,
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Command lines of the tools currently running
    pub fn active(&self) -> Vec<String> {
        self.active.lock().iter().map(|(_, c)| c.clone()).collect()
    }
}

#[async_trait]
impl ToolRunner for ProcessRunner {
    async fn run(&self, invocation: &ToolInvocation, cancel: &CancelToken) -> Result<ToolOutput, BuildError> {
        if cancel.is_cancelled() {
            return Err(BuildError::Cancelled);
        }
        let child = Command::new(&invocation.program)
            .args(&invocation.args)
            .current_dir(&invocation.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => BuildError::ToolNotFound {
                    tool: invocation.program.clone(),
                },
                _ => BuildError::io(&invocation.working_dir, e),
            })?;

        let pid = child.id();
        let command_line = invocation.command_line();
        debug!("Started {} (pid {:?})", command_line, pid);
        self.active.lock().push((pid, command_line));

        let mut cancel = cancel.clone();
        let result = tokio::select! {
            output = child.wait_with_output() => Some(output),
            _ = cancel.cancelled() => None,
        };
        self.active.lock().retain(|(p, _)| *p != pid);

        match result {
            None => Err(BuildError::Cancelled),
            Some(Err(e)) => Err(BuildError::io(&invocation.working_dir, e)),
            Some(Ok(output)) => Ok(ToolOutput {
                success: output.status.success(),
                code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            }),
        }
    }
}
