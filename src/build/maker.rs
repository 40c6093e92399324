/*!
 * Build orchestration for one root document.
 *
 * A build discovers the dependencies, refreshes generated figures, lays out
 * the node table and walks it in dependency order. Bibliography, index and
 * glossary nodes are refreshed when their output is missing, a source is
 * newer, or the content fingerprint of their trigger changed. The primary
 * compiler is rerun while its log reports warnings not seen before, up to
 * `max_compilations` passes.
 */

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, error, info, warn};
use parking_lot::Mutex;

use crate::analyzer::{AuxData, DependencyAnalyzer, DependencyKind, DependencySet};
use crate::app_config::{Config, GenerationType};
use crate::build::graph::{FileKind, NodeTable};
use crate::build::log_parser::{locate_error, parse_log, LocatedWarning, LogAnalysis, StandardWarning};
use crate::build::stamps::{BuildStamps, StampKind, STAMP_FILE_NAME};
use crate::build::tools::{CancelToken, ProcessRunner, ToolInvocation, ToolKind, ToolOutput, ToolRunner};
use crate::build::wrapper::{WrapperFile, WRAPPER_SUFFIX};
use crate::errors::{BuildError, TranslatorConflict, TranslatorError};
use crate::file_utils::FileManager;
use crate::translators::{GenerationOutcome, ImageGenerator, TranslatorRepository};

/// Auxiliary files removed by `clean`, as suffixes of the document stem
const CLEAN_EXTENSIONS: &[&str] = &[
    "aux", "log", "bbl", "blg", "idx", "ind", "ilg", "glo", "gls", "glg", "ist", "toc", "lof", "lot", "out", "nav",
    "snm", "synctex.gz", "bcf", "run.xml",
];

/// Per-database files of a multibib document
const DATABASE_EXTENSIONS: &[&str] = &["aux", "bbl", "blg"];

/// What one build did
#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    /// Final document
    pub output: PathBuf,
    /// Every tool run, in order
    pub invocations: Vec<ToolInvocation>,
    /// Primary compiler passes
    pub passes: usize,
    /// Standard warnings of the last pass
    pub warnings: BTreeSet<StandardWarning>,
    /// Located warnings of the last pass (extended warnings only)
    pub located_warnings: Vec<LocatedWarning>,
    /// The pass bound stopped the compiler loop
    pub pass_limit_reached: bool,
    /// Bibliography, index and glossary failures
    pub secondary_failures: Vec<String>,
    /// Figure generation results
    pub figures: Vec<GenerationOutcome>,
}

impl BuildReport {
    /// Number of runs of one tool
    pub fn invocations_of(&self, kind: ToolKind) -> usize {
        self.invocations.iter().filter(|i| i.kind == kind).count()
    }
}

/// Builds one root document
pub struct Maker {
    config: Config,
    root_file: PathBuf,
    root_dir: PathBuf,
    stem: String,
    runner: Arc<dyn ToolRunner>,
    cancel: CancelToken,
    repository: Option<TranslatorRepository>,
}

impl Maker {
    pub fn new(root_file: impl Into<PathBuf>, config: Config) -> Self {
        let root_file = FileManager::absolute(root_file.into());
        let root_dir = root_file
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let stem = FileManager::file_stem_string(&root_file);
        Self {
            config,
            root_file,
            root_dir,
            stem,
            runner: Arc::new(ProcessRunner::new()),
            cancel: CancelToken::never(),
            repository: None,
        }
    }

    /// Use another tool runner
    pub fn with_runner(mut self, runner: Arc<dyn ToolRunner>) -> Self {
        self.runner = runner;
        self
    }

    /// Observe a cancellation token
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Use a prepared translator repository instead of loading one
    pub fn with_repository(mut self, repository: TranslatorRepository) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn root_file(&self) -> &Path {
        &self.root_file
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Output of the compiler (`.pdf`, `.dvi` or `.xdv`)
    pub fn compiler_output(&self) -> PathBuf {
        self.stem_file(self.config.compiler_output_extension())
    }

    /// Final document
    pub fn final_output(&self) -> PathBuf {
        self.stem_file(self.config.final_extension())
    }

    fn stem_file(&self, ext: &str) -> PathBuf {
        self.root_dir.join(format!("{}.{}", self.stem, ext))
    }

    fn check_cancelled(&self) -> Result<(), BuildError> {
        if self.cancel.is_cancelled() {
            Err(BuildError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Dependencies of the document, including bibliography files named only in its aux file
    pub fn discover(&self) -> Result<DependencySet, BuildError> {
        let mut deps = DependencyAnalyzer::new()
            .analyze(&self.root_file, &self.root_dir)
            .map_err(|e| BuildError::Io {
                path: self.root_file.clone(),
                message: format!("{:#}", e),
            })?;

        let aux = self.read_aux(&self.stem_file("aux"));
        let known: BTreeSet<PathBuf> = deps
            .entries()
            .into_iter()
            .map(|entry| entry.path)
            .collect();
        let database = deps.default_database().to_string();
        let from_aux = aux
            .bibdata
            .iter()
            .map(|name| (DependencyKind::Bib, self.named_file(name, "bib")))
            .chain(
                aux.bibstyle
                    .iter()
                    .map(|name| (DependencyKind::BibStyle, self.named_file(name, "bst"))),
            );
        for (kind, path) in from_aux {
            if FileManager::file_exists(&path) && !known.contains(&path) {
                debug!("{:?} found through the aux file", path);
                deps.add_bibliography_file(&database, kind, path);
            }
        }
        Ok(deps)
    }

    fn named_file(&self, name: &str, ext: &str) -> PathBuf {
        if Path::new(name).extension().is_some_and(|e| e == ext) {
            self.root_dir.join(name)
        } else {
            self.root_dir.join(format!("{}.{}", name, ext))
        }
    }

    fn read_aux(&self, path: &Path) -> AuxData {
        AuxData::read(path).unwrap_or_else(|e| {
            warn!("Could not read {:?}: {:#}", path, e);
            AuxData::default()
        })
    }

    /// Translator repository from the configured directories.
    ///
    /// Conflicts are only logged here; they fail the sources they concern.
    pub fn load_translators(&self) -> Result<TranslatorRepository, BuildError> {
        let mut repository = TranslatorRepository::new(
            self.config.translators.directories(&self.root_dir),
            self.config.translators.overrides(),
        );
        match repository.sync() {
            Ok(()) => {}
            Err(TranslatorError::Conflict(conflicts)) => {
                for conflict in conflicts {
                    warn!("{}", conflict);
                }
            }
            Err(e) => return Err(e.into()),
        }
        Ok(repository)
    }

    /// Figure sources under the configured image directories
    pub fn image_sources(&self, repository: &TranslatorRepository) -> Result<Vec<PathBuf>, BuildError> {
        let extensions = repository.input_extensions();
        if extensions.is_empty() {
            return Ok(Vec::new());
        }
        let mut sources = Vec::new();
        for dir in &self.config.images.directories {
            let dir = self.root_dir.join(dir);
            if !FileManager::dir_exists(&dir) {
                debug!("Image directory {:?} does not exist", dir);
                continue;
            }
            let found = FileManager::find_files_with_suffixes(&dir, &extensions).map_err(|e| BuildError::Io {
                path: dir.clone(),
                message: format!("{:#}", e),
            })?;
            sources.extend(found);
        }
        sources.sort();
        sources.dedup();
        Ok(sources)
    }

    /// Generate every source. All sources are attempted; conflicts are then
    /// reported together, before any other failure.
    pub async fn generate_images_with<F>(
        &self,
        repository: &TranslatorRepository,
        sources: &[PathBuf],
        on_done: F,
    ) -> Result<Vec<GenerationOutcome>, BuildError>
    where
        F: Fn(&Path, &Result<GenerationOutcome, TranslatorError>),
    {
        self.check_cancelled()?;
        let generator = ImageGenerator::new(repository, self.config.generation_type.figure_target());
        let stale: Vec<(PathBuf, PathBuf)> = sources
            .iter()
            .filter_map(|source| {
                let translator = repository.find(source, None).ok()?;
                let output = generator.output_for(translator, source);
                (!ImageGenerator::is_up_to_date(source, &output)).then(|| (source.clone(), output))
            })
            .collect();
        let finished = Mutex::new(BTreeSet::new());

        let mut cancel = self.cancel.clone();
        let completed = tokio::select! {
            results = generator.generate_all(sources, self.config.images.concurrency, |source, result| {
                finished.lock().insert(source.to_path_buf());
                on_done(source, result);
            }) => Some(results),
            _ = cancel.cancelled() => None,
        };
        // Dropping the generation future above killed the running translators
        let Some(results) = completed else {
            let finished = finished.lock();
            for (_, output) in stale.iter().filter(|(source, _)| !finished.contains(source)) {
                if let Err(e) = FileManager::remove_if_exists(output) {
                    warn!("Could not remove partial output {:?}: {:#}", output, e);
                }
            }
            warn!("Figure generation cancelled");
            return Err(BuildError::Cancelled);
        };

        let mut outcomes = Vec::new();
        let mut conflicts: Vec<TranslatorConflict> = Vec::new();
        let mut failure = None;
        for (source, result) in results {
            match result {
                Ok(outcome) => outcomes.push(outcome),
                Err(TranslatorError::Conflict(found)) => {
                    for conflict in found {
                        if !conflicts.contains(&conflict) {
                            conflicts.push(conflict);
                        }
                    }
                }
                Err(e) => {
                    error!("Figure {:?} failed: {}", source, e);
                    failure.get_or_insert(e);
                }
            }
        }
        if !conflicts.is_empty() {
            return Err(TranslatorError::Conflict(conflicts).into());
        }
        if let Some(e) = failure {
            return Err(e.into());
        }
        Ok(outcomes)
    }

    /// Generate the figures of the document
    pub async fn generate_images(&self) -> Result<Vec<GenerationOutcome>, BuildError> {
        let loaded;
        let repository = match &self.repository {
            Some(repository) => repository,
            None => {
                loaded = self.load_translators()?;
                &loaded
            }
        };
        let sources = self.image_sources(repository)?;
        if sources.is_empty() {
            return Ok(Vec::new());
        }
        info!("Generating {} figure(s)", sources.len());
        self.generate_images_with(repository, &sources, |_, _| {}).await
    }

    /// Node table of the document
    pub fn build_graph(&self, deps: &DependencySet, figures: &[PathBuf]) -> NodeTable {
        let mut table = NodeTable::new(&self.root_file);
        let main = self.compiler_output();
        let main_kind = match self.config.generation_type {
            GenerationType::Pdf => FileKind::Pdf,
            GenerationType::Dvi | GenerationType::Ps => FileKind::Dvi,
        };
        table.node(&main, main_kind).producing_input = Some(self.root_file.clone());
        table.depend(&main, &self.root_file);
        for kind in [DependencyKind::Tex, DependencyKind::Style, DependencyKind::Class] {
            for dep in deps.dependencies(kind) {
                table.depend(&main, dep);
            }
        }
        for figure in figures {
            table.node(figure, FileKind::Figure);
            table.depend(&main, figure);
        }

        let uses_biber = self.config.use_biber(deps.uses_biber);
        let mut databases: Vec<(&str, Vec<&PathBuf>)> = deps
            .bibliographies()
            .iter()
            .map(|(name, db)| (name.as_str(), db.files().collect()))
            .collect();
        if databases.is_empty() && self.read_aux(&self.stem_file("aux")).needs_bibliography() {
            databases.push((deps.default_database(), Vec::new()));
        }
        for (database, files) in databases {
            let (bbl, trigger) = if uses_biber {
                (self.stem_file("bbl"), self.stem_file("bcf"))
            } else {
                (
                    self.root_dir.join(format!("{}.bbl", database)),
                    self.root_dir.join(format!("{}.aux", database)),
                )
            };
            let node = table.node(&bbl, FileKind::Bbl);
            node.producing_input = Some(trigger);
            node.uses_biber = uses_biber;
            node.database = Some(database.to_string());
            for file in files {
                table.depend(&bbl, file);
            }
            table.depend(&main, &bbl);
        }

        for (present, written, output_ext, trigger_ext, kind) in [
            (deps.has_index(), deps.writes_index, "ind", "idx", FileKind::Ind),
            (deps.has_glossary(), deps.writes_glossary, "gls", "glo", FileKind::Gls),
        ] {
            let trigger = self.stem_file(trigger_ext);
            // Printing macros alone never get a trigger written
            if present && (written || FileManager::file_exists(&trigger)) {
                let output = self.stem_file(output_ext);
                table.node(&output, kind).producing_input = Some(trigger);
                table.depend(&main, &output);
            }
        }

        if self.config.generation_type == GenerationType::Ps {
            let ps = self.final_output();
            table.node(&ps, FileKind::Ps).producing_input = Some(main.clone());
            table.depend(&ps, &main);
        }
        table
    }

    /// Bring the final document up to date
    pub async fn build(&self) -> Result<BuildReport, BuildError> {
        self.check_cancelled()?;
        info!("Building {:?}", self.root_file);
        let deps = self.discover()?;

        let figures = if self.config.images.generate {
            self.generate_images().await?
        } else {
            Vec::new()
        };
        self.check_cancelled()?;

        let figure_paths: Vec<PathBuf> = figures.iter().map(|f| f.output().to_path_buf()).collect();
        let table = self.build_graph(&deps, &figure_paths);
        let target = self.final_output();
        let order = table.build_order(&target)?;
        let stamps = BuildStamps::load(&self.root_dir.join(STAMP_FILE_NAME))?;

        let mut session = Session {
            maker: self,
            table,
            stamps,
            report: BuildReport {
                output: target,
                figures,
                ..Default::default()
            },
            seen: BTreeSet::new(),
            dirty: false,
            failed: BTreeMap::new(),
        };
        session.execute(&order).await?;
        session.stamps.save()?;

        let report = session.report;
        info!(
            "{:?} is up to date ({} tool run(s), {} compiler pass(es))",
            report.output,
            report.invocations.len(),
            report.passes
        );
        Ok(report)
    }

    /// Remove auxiliary files; with `all`, also the outputs, the stamps and generated figures.
    /// Returns the removed files.
    pub fn clean(&self, all: bool) -> Result<Vec<PathBuf>, BuildError> {
        let mut candidates: Vec<PathBuf> = CLEAN_EXTENSIONS.iter().map(|ext| self.stem_file(ext)).collect();
        candidates.push(self.root_dir.join(format!("{}{}.tex", self.stem, WRAPPER_SUFFIX)));

        match self.discover() {
            Ok(deps) => {
                for database in deps.bibliographies().keys().filter(|db| **db != self.stem) {
                    candidates.extend(
                        DATABASE_EXTENSIONS
                            .iter()
                            .map(|ext| self.root_dir.join(format!("{}.{}", database, ext))),
                    );
                }
            }
            Err(e) => debug!("Cleaning without dependency information: {}", e),
        }

        if all {
            for generation in [GenerationType::Pdf, GenerationType::Dvi, GenerationType::Ps] {
                candidates.push(self.stem_file(generation.final_extension()));
            }
            candidates.push(self.stem_file("xdv"));
            candidates.push(self.root_dir.join(STAMP_FILE_NAME));

            let loaded;
            let repository = match &self.repository {
                Some(repository) => repository,
                None => {
                    loaded = self.load_translators()?;
                    &loaded
                }
            };
            let generator = ImageGenerator::new(repository, self.config.generation_type.figure_target());
            for source in self.image_sources(repository)? {
                candidates.extend(generator.generated_files(&source));
            }
        }

        candidates.sort();
        candidates.dedup();
        let mut removed = Vec::new();
        for path in candidates {
            if path == self.root_file {
                continue;
            }
            let gone = FileManager::remove_if_exists(&path).map_err(|e| BuildError::Io {
                path: path.clone(),
                message: format!("{:#}", e),
            })?;
            if gone {
                debug!("Removed {:?}", path);
                removed.push(path);
            }
        }
        info!("Removed {} file(s)", removed.len());
        Ok(removed)
    }
}

/// State of one running build
struct Session<'m> {
    maker: &'m Maker,
    table: NodeTable,
    stamps: BuildStamps,
    report: BuildReport,
    /// Warnings already answered by a compiler pass
    seen: BTreeSet<StandardWarning>,
    /// A secondary output changed since the last compiler pass
    dirty: bool,
    /// Trigger fingerprints whose tool already failed in this build
    failed: BTreeMap<PathBuf, String>,
}

impl Session<'_> {
    async fn execute(&mut self, order: &[PathBuf]) -> Result<(), BuildError> {
        let main = self.maker.compiler_output();
        let mut secondary = Vec::new();

        for path in order {
            self.maker.check_cancelled()?;
            let Some(kind) = self.table.get(path).map(|n| n.kind) else {
                continue;
            };
            match kind {
                FileKind::Bbl | FileKind::Ind | FileKind::Gls => {
                    secondary.push(path.clone());
                    self.refresh_secondary(path).await?;
                }
                FileKind::Pdf | FileKind::Dvi => {
                    if self.dirty || self.table.has_newer_dependency(path) {
                        self.compile_loop().await?;
                    } else {
                        debug!("{:?} is up to date", path);
                    }
                }
                FileKind::Ps => {
                    if self.report.passes > 0 || self.table.has_newer_dependency(path) {
                        self.recheck_secondary(&secondary).await?;
                        self.convert_to_ps(path).await?;
                    }
                }
                _ => {}
            }
        }

        if order.last() == Some(&main) {
            self.recheck_secondary(&secondary).await?;
        }
        Ok(())
    }

    /// Triggers change during compilation; refresh their tools and compile again
    async fn recheck_secondary(&mut self, secondary: &[PathBuf]) -> Result<(), BuildError> {
        while self.report.passes > 0 && !self.report.pass_limit_reached {
            let mut reran = false;
            for path in secondary {
                reran |= self.refresh_secondary(path).await?;
            }
            if !reran {
                break;
            }
            self.compile_loop().await?;
        }
        Ok(())
    }

    /// Fingerprint of a secondary node's trigger, None when the trigger is missing
    fn trigger_fingerprint(&self, path: &Path) -> Result<Option<(StampKind, String, String, bool)>, BuildError> {
        let Some(node) = self.table.get(path) else {
            return Ok(None);
        };
        let Some(trigger) = node.producing_input.clone() else {
            return Ok(None);
        };
        let key = trigger
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let as_io = |e: anyhow::Error| BuildError::Io {
            path: trigger.clone(),
            message: format!("{:#}", e),
        };

        match node.kind {
            FileKind::Bbl if !node.uses_biber => {
                if !FileManager::file_exists(&trigger) {
                    return Ok(None);
                }
                let aux = AuxData::read(&trigger).map_err(as_io)?;
                Ok(Some((StampKind::Bib, key, aux.fingerprint(), aux.needs_bibliography())))
            }
            kind => {
                let stamp = match kind {
                    FileKind::Ind => StampKind::Idx,
                    FileKind::Gls => StampKind::Glo,
                    _ => StampKind::Bib,
                };
                Ok(FileManager::fingerprint_file(&trigger)
                    .map_err(as_io)?
                    .map(|fp| (stamp, key, fp, true)))
            }
        }
    }

    /// Run the tool of a bibliography, index or glossary node if needed.
    /// Returns whether the tool ran successfully.
    async fn refresh_secondary(&mut self, path: &Path) -> Result<bool, BuildError> {
        let mut fingerprint = self.trigger_fingerprint(path)?;
        if fingerprint.is_none() && self.report.passes == 0 {
            debug!("No trigger for {:?} yet, compiling first", path);
            let analysis = self.compile_once().await?;
            if self.maker.config.rerun_on_warnings && !analysis.warnings.is_empty() {
                self.dirty = true;
            }
            self.seen.extend(analysis.warnings);
            fingerprint = self.trigger_fingerprint(path)?;
        }
        let Some((stamp, key, fp, needed)) = fingerprint else {
            debug!("Trigger of {:?} was not produced", path);
            return Ok(false);
        };

        let stale = !FileManager::file_exists(path)
            || self.table.has_newer_dependency(path)
            || self.stamps.differs(stamp, &key, &fp);
        if !stale {
            debug!("{:?} is up to date", path);
            return Ok(false);
        }
        if self.failed.get(path) == Some(&fp) {
            debug!("{:?} already failed on this input", path);
            return Ok(false);
        }
        if !needed {
            debug!("{} has no citations", key);
            self.stamps.set(stamp, &key, &fp);
            return Ok(false);
        }

        let Some(invocation) = self.secondary_invocation(path) else {
            return Ok(false);
        };
        let failure = match self.run(&invocation).await {
            Ok(output) if output.success => None,
            Ok(output) => Some(format!(
                "{} exited with code {:?}: {}",
                invocation.program,
                output.code,
                output.combined().trim()
            )),
            Err(BuildError::Cancelled) => return Err(BuildError::Cancelled),
            Err(e) => Some(e.to_string()),
        };

        if let Some(message) = failure {
            warn!("{}", message);
            if let Err(e) = FileManager::remove_if_exists(path) {
                warn!("Could not remove partial output {:?}: {:#}", path, e);
            }
            self.report.secondary_failures.push(message);
            self.failed.insert(path.to_path_buf(), fp);
            return Ok(false);
        }

        self.stamps.set(stamp, &key, &fp);
        if let Some(node) = self.table.get_mut(path) {
            node.touch();
        }
        self.dirty = true;
        self.seen.clear();
        Ok(true)
    }

    fn secondary_invocation(&self, path: &Path) -> Option<ToolInvocation> {
        let node = self.table.get(path)?;
        let config = &self.maker.config;
        let dir = &self.maker.root_dir;
        let stem = &self.maker.stem;
        Some(match node.kind {
            FileKind::Bbl if node.uses_biber => ToolInvocation::biber(config, dir, stem),
            FileKind::Bbl => ToolInvocation::bibtex(config, dir, node.database.as_deref().unwrap_or(stem)),
            FileKind::Ind => ToolInvocation::makeindex(config, dir, stem),
            FileKind::Gls => ToolInvocation::makeglossaries(config, dir, stem),
            _ => return None,
        })
    }

    /// Compile until no new warning appears or the pass bound is hit
    async fn compile_loop(&mut self) -> Result<(), BuildError> {
        let max = self.maker.config.max_compilations;
        loop {
            if self.report.passes >= max {
                warn!("Stopping after {} compiler passes; warnings may remain", self.report.passes);
                self.report.pass_limit_reached = true;
                break;
            }
            let analysis = self.compile_once().await?;
            let new: Vec<StandardWarning> = analysis.warnings.difference(&self.seen).copied().collect();
            self.seen.extend(analysis.warnings);
            if !self.maker.config.rerun_on_warnings || new.is_empty() {
                break;
            }
            info!(
                "New warnings ({}), compiling again",
                new.iter().map(|w| w.to_string()).collect::<Vec<_>>().join(", ")
            );
        }
        self.dirty = false;
        Ok(())
    }

    /// One compiler pass, through the diagnostics wrapper when enabled
    async fn compile_once(&mut self) -> Result<LogAnalysis, BuildError> {
        self.maker.check_cancelled()?;
        let maker = self.maker;
        let wrapper = if maker.config.extended_warnings {
            Some(WrapperFile::create(&maker.root_file)?)
        } else {
            None
        };
        let input = match &wrapper {
            Some(wrapper) => wrapper.file_name(),
            None => maker
                .root_file
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
        };
        let jobname = wrapper.as_ref().map(|_| maker.stem.as_str());
        let output_path = maker.compiler_output();
        let log_path = maker.stem_file("log");
        FileManager::remove_if_exists(&log_path).map_err(|e| BuildError::Io {
            path: log_path.clone(),
            message: format!("{:#}", e),
        })?;

        let invocation = ToolInvocation::latex(&maker.config, &maker.root_dir, &input, jobname, output_path.clone());
        let output = self.run(&invocation).await?;
        self.report.passes += 1;

        let log_text = match FileManager::read_to_string(&log_path) {
            Ok(text) => text,
            Err(_) => output.combined(),
        };

        if !output.success {
            if let Err(e) = FileManager::remove_if_exists(&output_path) {
                warn!("Could not remove partial output {:?}: {:#}", output_path, e);
            }
            let error = match locate_error(&log_text) {
                Some(located) => BuildError::ToolExited {
                    tool: invocation.program.clone(),
                    code: output.code,
                    output: located.to_string(),
                },
                None => BuildError::LogParseAmbiguous {
                    tool: invocation.program.clone(),
                    output: output.combined(),
                },
            };
            error!("{}", error);
            return Err(error);
        }

        if let Some(node) = self.table.get_mut(&output_path) {
            node.touch();
        }
        let mapping = wrapper.as_ref().map(WrapperFile::mapping);
        let analysis = parse_log(&log_text, mapping.as_ref());
        for warning in &analysis.located {
            warn!("{}", warning);
        }
        self.report.warnings = analysis.warnings.clone();
        self.report.located_warnings = analysis.located.clone();
        Ok(analysis)
    }

    async fn convert_to_ps(&mut self, path: &Path) -> Result<(), BuildError> {
        let invocation = ToolInvocation::dvips(&self.maker.config, &self.maker.root_dir, &self.maker.stem);
        let output = self.run(&invocation).await?;
        if !output.success {
            if let Err(e) = FileManager::remove_if_exists(path) {
                warn!("Could not remove partial output {:?}: {:#}", path, e);
            }
            return Err(BuildError::ToolExited {
                tool: invocation.program.clone(),
                code: output.code,
                output: output.combined(),
            });
        }
        if let Some(node) = self.table.get_mut(path) {
            node.touch();
        }
        Ok(())
    }

    /// Run a tool; its output is removed when it cannot complete
    async fn run(&mut self, invocation: &ToolInvocation) -> Result<ToolOutput, BuildError> {
        info!("Running {}", invocation.command_line());
        self.report.invocations.push(invocation.clone());
        let result = self.maker.runner.run(invocation, &self.maker.cancel).await;
        if result.is_err() {
            if let Some(output) = &invocation.output {
                if let Err(e) = FileManager::remove_if_exists(output) {
                    warn!("Could not remove partial output {:?}: {:#}", output, e);
                }
            }
        }
        result
    }
}
