/*!
 * Figure generation: running a translator on a source image.
 */

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Output;

use futures::stream::{self, StreamExt};
use log::{debug, info, warn};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use tokio::process::Command;

use crate::errors::TranslatorError;
use crate::file_utils::FileManager;
use crate::translators::definition::{Execution, Translator};
use crate::translators::repository::TranslatorRepository;

static VARIABLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$(?:\{([A-Za-z_]+)\}|([A-Za-z_]+))").unwrap()
});

/// Result of one generation request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutcome {
    /// The translator ran and produced this output
    Generated(PathBuf),
    /// The output was newer than the source; nothing ran
    UpToDate(PathBuf),
}

impl GenerationOutcome {
    pub fn output(&self) -> &Path {
        match self {
            Self::Generated(p) | Self::UpToDate(p) => p,
        }
    }
}

/// Variables available to command templates and scripts
#[derive(Debug, Clone)]
struct Invocation {
    vars: BTreeMap<&'static str, String>,
    dir: PathBuf,
    output: PathBuf,
}

impl Invocation {
    fn new(translator: &Translator, source: &Path, output: &Path) -> Self {
        // The child runs in the output directory, so relative paths would not resolve
        let source = FileManager::absolute(source);
        let output = FileManager::absolute(output);
        let (source, output) = (source.as_path(), output.as_path());
        let in_ext = translator.matching_extension(source).unwrap_or_default().to_string();
        let in_name = source.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
        let in_base = in_name
            .get(..in_name.len().saturating_sub(in_ext.len()))
            .unwrap_or(in_name.as_str())
            .to_string();
        let out_ext = output
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        let dir = output
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let mut vars = BTreeMap::new();
        vars.insert("in", source.to_string_lossy().to_string());
        vars.insert("out", output.to_string_lossy().to_string());
        vars.insert("inbasename", in_base);
        vars.insert("outbasename", FileManager::file_stem_string(output));
        vars.insert("indir", source.parent().map(|p| p.to_string_lossy().to_string()).unwrap_or_default());
        vars.insert("outdir", dir.to_string_lossy().to_string());
        vars.insert("inext", in_ext);
        vars.insert("outext", out_ext);
        Self {
            vars,
            dir,
            output: output.to_path_buf(),
        }
    }

    /// Replace `$name` / `${name}` with known variables, leaving others as-is
    fn substitute(&self, template: &str) -> String {
        VARIABLE
            .replace_all(template, |caps: &Captures| {
                let name = caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str()).unwrap_or_default();
                self.vars
                    .get(name)
                    .cloned()
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }
}

/// Split a command line into words, honouring quotes and backslash escapes
pub fn split_words(line: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some('"'), '\\') | (None, '\\') => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
                in_word = true;
            }
            (Some(_), c) => current.push(c),
            (None, '\'' | '"') => {
                quote = Some(c);
                in_word = true;
            }
            (None, c) if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            (None, c) => {
                current.push(c);
                in_word = true;
            }
        }
    }
    if in_word {
        words.push(current);
    }
    words
}

fn combined_output(output: &Output) -> String {
    let mut text = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.trim().is_empty() {
        if !text.is_empty() {
            text.push('\n');
        }
        text.push_str(&stderr);
    }
    text
}

/// Runs translators from a repository for a target format (`pdf` or `eps`)
pub struct ImageGenerator<'r> {
    repository: &'r TranslatorRepository,
    target: String,
}

impl<'r> ImageGenerator<'r> {
    pub fn new(repository: &'r TranslatorRepository, target: impl Into<String>) -> Self {
        Self {
            repository,
            target: target.into(),
        }
    }

    /// Default output path of `source` for `translator`
    pub fn output_for(&self, translator: &Translator, source: &Path) -> PathBuf {
        let ext = translator.matching_extension(source).unwrap_or_default();
        let name = source.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
        let base = name.get(..name.len().saturating_sub(ext.len())).unwrap_or(name.as_str());
        let out_ext = translator
            .output_extensions_for(&self.target)
            .first()
            .cloned()
            .unwrap_or_else(|| format!(".{}", self.target));
        source.with_file_name(format!("{}{}", base, out_ext))
    }

    /// Whether `output`, or a side file named after it, is at least as new as `source`
    pub fn is_up_to_date(source: &Path, output: &Path) -> bool {
        let Some(source_time) = FileManager::modified_time(source) else {
            return false;
        };
        let Some(output_time) = FileManager::modified_time(output) else {
            return false;
        };
        let prefix = output.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
        let dir = output.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
        let siblings = FileManager::find_siblings_with_prefix(dir, &prefix);
        let newest = FileManager::newest_modified_time(siblings.iter().map(PathBuf::as_path))
            .map_or(output_time, |t| t.max(output_time));
        newest >= source_time
    }

    /// Convert `source` with its translator unless the output is up to date
    pub async fn generate_image(
        &self,
        source: &Path,
        requested_output: Option<&Path>,
    ) -> Result<GenerationOutcome, TranslatorError> {
        let translator = self.repository.find(source, requested_output)?;
        let output = requested_output
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.output_for(translator, source));

        if Self::is_up_to_date(source, &output) {
            debug!("{:?} is up to date", output);
            return Ok(GenerationOutcome::UpToDate(output));
        }

        info!("Translating {:?} with {}", source, translator.name);
        let invocation = Invocation::new(translator, source, &output);
        let result = match &translator.execution {
            Execution::CommandLine(template) => self.run_command_lines(translator, source, template, &invocation).await,
            Execution::EmbeddedScript { interpreter, source: script } => {
                self.run_script(translator, source, interpreter, script, &invocation).await
            }
        };

        if let Err(e) = result {
            if let Err(rm) = FileManager::remove_if_exists(&invocation.output) {
                warn!("Could not remove partial output: {}", rm);
            }
            return Err(e);
        }
        Ok(GenerationOutcome::Generated(output))
    }

    async fn run_command_lines(
        &self,
        translator: &Translator,
        source: &Path,
        template: &str,
        invocation: &Invocation,
    ) -> Result<(), TranslatorError> {
        for line in template.lines().map(str::trim).filter(|l| !l.is_empty() && !l.starts_with('#')) {
            let words: Vec<String> = split_words(line).iter().map(|w| invocation.substitute(w)).collect();
            let Some((program, args)) = words.split_first() else {
                continue;
            };
            debug!("{}: {} {}", translator.name, program, args.join(" "));
            let mut command = Command::new(program);
            command.args(args).current_dir(&invocation.dir).kill_on_drop(true);
            Self::check(translator, source, program, command.output().await)?;
        }
        Ok(())
    }

    async fn run_script(
        &self,
        translator: &Translator,
        source: &Path,
        interpreter: &str,
        script: &str,
        invocation: &Invocation,
    ) -> Result<(), TranslatorError> {
        let spawn_error = |message: String| TranslatorError::Spawn {
            name: translator.name.clone(),
            program: interpreter.to_string(),
            message,
        };
        let mut file = tempfile::Builder::new()
            .prefix("autolatex-translator-")
            .tempfile()
            .map_err(|e| spawn_error(e.to_string()))?;
        file.write_all(script.as_bytes())
            .and_then(|_| file.flush())
            .map_err(|e| spawn_error(e.to_string()))?;

        let mut command = Command::new(interpreter);
        command
            .arg(file.path())
            .envs(invocation.vars.iter().map(|(k, v)| (*k, v.as_str())))
            .current_dir(&invocation.dir)
            .kill_on_drop(true);
        Self::check(translator, source, interpreter, command.output().await)
    }

    fn check(
        translator: &Translator,
        source: &Path,
        program: &str,
        result: std::io::Result<Output>,
    ) -> Result<(), TranslatorError> {
        let output = result.map_err(|e| TranslatorError::Spawn {
            name: translator.name.clone(),
            program: program.to_string(),
            message: e.to_string(),
        })?;
        if output.status.success() {
            Ok(())
        } else {
            Err(TranslatorError::ExecutionFailed {
                name: translator.name.clone(),
                source_file: source.to_path_buf(),
                code: output.status.code(),
                output: combined_output(&output),
            })
        }
    }

    /// Generate every source, at most `concurrency` translators at a time.
    /// `on_done` is called as each source finishes.
    pub async fn generate_all<F>(
        &self,
        sources: &[PathBuf],
        concurrency: usize,
        on_done: F,
    ) -> Vec<(PathBuf, Result<GenerationOutcome, TranslatorError>)>
    where
        F: Fn(&Path, &Result<GenerationOutcome, TranslatorError>),
    {
        let mut results: Vec<(PathBuf, Result<GenerationOutcome, TranslatorError>)> = stream::iter(sources)
            .map(|source| async move { (source.clone(), self.generate_image(source, None).await) })
            .buffer_unordered(concurrency.max(1))
            .inspect(|(source, result)| on_done(source.as_path(), result))
            .collect()
            .await;
        results.sort_by(|a, b| a.0.cmp(&b.0));
        results
    }

    /// Files `source`'s translator produces, for cleaning
    pub fn generated_files(&self, source: &Path) -> Vec<PathBuf> {
        let Ok(translator) = self.repository.find(source, None) else {
            return Vec::new();
        };
        let output = self.output_for(translator, source);
        let invocation = Invocation::new(translator, source, &output);
        let prefix = output.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();

        let mut files = vec![output.clone()];
        files.extend(FileManager::find_siblings_with_prefix(&invocation.dir, &prefix));
        files.extend(
            translator
                .files_to_clean
                .iter()
                .map(|pattern| invocation.dir.join(invocation.substitute(pattern))),
        );
        files.retain(|f| f != source);
        files.sort();
        files.dedup();
        files
    }
}
