// Module-specific lints configuration
#![allow(clippy::uninlined_format_args)]
// Add other lints specific to this module that you want to allow but not auto-fix

use anyhow::{anyhow, Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn, Level, LevelFilter, Log, Metadata, Record, SetLoggerError};
use std::io::Write;
use std::path::{Path, PathBuf};

use autolatex::app_config::{self, Compiler, GenerationType, CONFIG_FILE_NAME};
use autolatex::build::cancellation;
use autolatex::translators::ImageGenerator;
use autolatex::{Config, Maker};

/// CLI Wrapper for LogLevel to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliLogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<CliLogLevel> for app_config::LogLevel {
    fn from(cli_level: CliLogLevel) -> Self {
        match cli_level {
            CliLogLevel::Error => app_config::LogLevel::Error,
            CliLogLevel::Warn => app_config::LogLevel::Warn,
            CliLogLevel::Info => app_config::LogLevel::Info,
            CliLogLevel::Debug => app_config::LogLevel::Debug,
            CliLogLevel::Trace => app_config::LogLevel::Trace,
        }
    }
}

/// CLI Wrapper for Compiler to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliCompiler {
    Pdflatex,
    Xelatex,
    Lualatex,
    Latex,
}

impl From<CliCompiler> for Compiler {
    fn from(cli_compiler: CliCompiler) -> Self {
        match cli_compiler {
            CliCompiler::Pdflatex => Compiler::Pdflatex,
            CliCompiler::Xelatex => Compiler::Xelatex,
            CliCompiler::Lualatex => Compiler::Lualatex,
            CliCompiler::Latex => Compiler::Latex,
        }
    }
}

/// CLI Wrapper for GenerationType to implement ValueEnum
#[derive(Debug, Clone, ValueEnum)]
enum CliOutput {
    Pdf,
    Dvi,
    Ps,
}

impl From<CliOutput> for GenerationType {
    fn from(cli_output: CliOutput) -> Self {
        match cli_output {
            CliOutput::Pdf => GenerationType::Pdf,
            CliOutput::Dvi => GenerationType::Dvi,
            CliOutput::Ps => GenerationType::Ps,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build the document (default command)
    Build(DocumentArgs),

    /// Remove auxiliary files
    Clean {
        #[command(flatten)]
        document: DocumentArgs,

        /// Also remove the final document, the build stamps and generated figures
        #[arg(short, long)]
        all: bool,
    },

    /// Print the dependencies of the document
    Deps(DocumentArgs),

    /// Generate the figures only
    Images(DocumentArgs),

    /// List translators, their inclusion and conflicts
    Translators(DocumentArgs),

    /// Generate shell completions for autolatex
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args, Debug, Clone, Default)]
struct DocumentArgs {
    /// Root LaTeX document
    #[arg(value_name = "ROOT")]
    root: Option<PathBuf>,

    /// Configuration file path (defaults to .autolatex.json next to the document)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Set logging level
    #[arg(short, long, value_enum)]
    log_level: Option<CliLogLevel>,

    /// LaTeX engine
    #[arg(long, value_enum)]
    compiler: Option<CliCompiler>,

    /// Final document format
    #[arg(short, long, value_enum)]
    output: Option<CliOutput>,

    /// Tag warnings with their source file and line
    #[arg(short = 'w', long)]
    extended_warnings: bool,

    /// Enable SyncTeX
    #[arg(long)]
    synctex: bool,
}

/// AutoLaTeX - incremental LaTeX document builds
///
/// Builds a LaTeX document with the minimal sequence of compiler,
/// bibliography, index and glossary runs, and converts figures on the way.
#[derive(Parser, Debug)]
#[command(name = "autolatex")]
#[command(version)]
#[command(about = "Incremental LaTeX document builder")]
#[command(args_conflicts_with_subcommands = true)]
#[command(long_about = "AutoLaTeX finds everything a LaTeX document depends on and runs only the tools needed to bring it up to date.

EXAMPLES:
    autolatex thesis.tex                        # Build with the document's configuration
    autolatex build -w thesis.tex               # Build with located warnings
    autolatex build -o ps thesis.tex            # Produce PostScript through dvips
    autolatex clean --all thesis.tex            # Remove everything the build produced
    autolatex deps thesis.tex                   # Show the dependencies
    autolatex completions bash > autolatex.bash # Generate bash completions

CONFIGURATION:
    Configuration is read from .autolatex.json next to the document by default.
    You can specify a different file with --config. A missing file means defaults.")]
struct CommandLineOptions {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    document: DocumentArgs,
}

// @struct: Custom logger implementation
struct CustomLogger {
    level: LevelFilter,
}

impl CustomLogger {
    // @creates: New logger with specified level
    fn new(level: LevelFilter) -> Self {
        CustomLogger { level }
    }

    // @initializes: Global logger
    fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        let logger = Box::new(CustomLogger::new(level));
        log::set_boxed_logger(logger)?;
        log::set_max_level(level);
        Ok(())
    }

    // @returns: ANSI colour for log level
    fn color_for_level(level: Level) -> &'static str {
        match level {
            Level::Error => "1;31",
            Level::Warn => "1;33",
            Level::Info => "1;32",
            Level::Debug => "1;36",
            Level::Trace => "1;35",
        }
    }
}

impl Log for CustomLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = chrono::Local::now().format("%H:%M:%S.%3f");
            let mut stderr = std::io::stderr();
            let _ = writeln!(
                stderr,
                "\x1B[{}m{} {:<5} {}\x1B[0m",
                Self::color_for_level(record.level()),
                now,
                record.level(),
                record.args()
            );
        }
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

#[tokio::main]
async fn main() {
    // Initialize the logger with the most verbose level; the effective
    // level is set once the configuration is known
    if let Err(e) = CustomLogger::init(LevelFilter::Trace) {
        eprintln!("Failed to initialize logger: {}", e);
    }
    log::set_max_level(LevelFilter::Info);

    if let Err(e) = run(CommandLineOptions::parse()).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: CommandLineOptions) -> Result<()> {
    match cli.command {
        Some(Commands::Completions { shell }) => {
            let mut cmd = CommandLineOptions::command();
            generate(shell, &mut cmd, "autolatex", &mut std::io::stdout());
            Ok(())
        }
        Some(Commands::Build(args)) => run_build(args).await,
        Some(Commands::Clean { document, all }) => run_clean(document, all),
        Some(Commands::Deps(args)) => run_deps(args),
        Some(Commands::Images(args)) => run_images(args).await,
        Some(Commands::Translators(args)) => run_translators(args),
        None => run_build(cli.document).await,
    }
}

// @returns: Maker for the document, with configuration and CLI overrides applied
fn prepare(args: DocumentArgs) -> Result<Maker> {
    let root = args
        .root
        .ok_or_else(|| anyhow!("ROOT is required: name the LaTeX document to build"))?;
    if !root.is_file() {
        return Err(anyhow!("Document does not exist: {:?}", root));
    }
    let document_dir = root.parent().unwrap_or(Path::new("."));
    let config_path = args
        .config
        .unwrap_or_else(|| document_dir.join(CONFIG_FILE_NAME));
    let mut config = Config::load_or_default(&config_path)?;

    if let Some(level) = args.log_level {
        config.log_level = level.into();
    }
    if let Some(compiler) = args.compiler {
        config.compiler = compiler.into();
    }
    if let Some(output) = args.output {
        config.generation_type = output.into();
    }
    config.extended_warnings |= args.extended_warnings;
    config.synctex |= args.synctex;

    config.validate().context("Configuration validation failed")?;
    log::set_max_level(config.log_level.to_level_filter());

    Ok(Maker::new(root, config))
}

async fn run_build(args: DocumentArgs) -> Result<()> {
    let (handle, token) = cancellation();
    let maker = prepare(args)?.with_cancel(token);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping the build");
            handle.cancel();
        }
    });

    let report = maker.build().await?;
    for failure in &report.secondary_failures {
        warn!("{}", failure);
    }
    if !report.warnings.is_empty() {
        let names: Vec<String> = report.warnings.iter().map(|w| w.to_string()).collect();
        warn!("Remaining warnings: {}", names.join(", "));
    }
    if report.pass_limit_reached {
        warn!("The compiler pass limit was reached before references settled");
    }
    info!("Success: {:?}", report.output);
    Ok(())
}

fn run_clean(args: DocumentArgs, all: bool) -> Result<()> {
    let maker = prepare(args)?;
    for path in maker.clean(all)? {
        println!("{}", path.display());
    }
    Ok(())
}

fn run_deps(args: DocumentArgs) -> Result<()> {
    let maker = prepare(args)?;
    let deps = maker.discover()?;
    for entry in deps.entries() {
        println!("{:<18} {}", entry.kind.to_string(), entry.path.display());
    }
    for (name, database) in deps.bibliographies() {
        let files: Vec<String> = database.files().map(|p| p.display().to_string()).collect();
        println!("{:<18} {} -> {}", "database", name, files.join(", "));
    }
    if deps.uses_biber {
        println!("backend            biber");
    }
    Ok(())
}

async fn run_images(args: DocumentArgs) -> Result<()> {
    let maker = prepare(args)?;
    let repository = maker.load_translators()?;
    let sources = maker.image_sources(&repository)?;
    if sources.is_empty() {
        info!("No figure to generate");
        return Ok(());
    }

    let progress_bar = ProgressBar::new(sources.len() as u64);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} figures ({percent}%) {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    progress_bar.set_style(style.progress_chars("=> "));

    let result = maker
        .generate_images_with(&repository, &sources, |source, _| {
            progress_bar.set_message(
                source
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default(),
            );
            progress_bar.inc(1);
        })
        .await;
    progress_bar.finish_and_clear();

    let outcomes = result?;
    info!("{} figure(s) up to date", outcomes.len());
    Ok(())
}

fn run_translators(args: DocumentArgs) -> Result<()> {
    let maker = prepare(args)?;
    let repository = maker.load_translators()?;
    let generator = ImageGenerator::new(&repository, maker.config().generation_type.figure_target());

    for translator in repository.translators() {
        let inclusion = match repository.effective_level(&translator.name) {
            Some(level) => format!("included at {}", level),
            None => "excluded".to_string(),
        };
        println!(
            "{:<32} {:<8} {:<20} {}",
            translator.name,
            translator.level.to_string(),
            translator.input_extensions.join(" "),
            inclusion
        );
    }
    for conflict in repository.conflicts() {
        warn!("{}", conflict);
    }

    let sources = maker.image_sources(&repository)?;
    for source in &sources {
        if let Ok(translator) = repository.find(source, None) {
            println!("{} -> {}", source.display(), generator.output_for(translator, source).display());
        }
    }
    Ok(())
}
