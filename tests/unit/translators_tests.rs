/*!
 * Tests for the translator registry loaded from configuration
 */

use std::path::{Path, PathBuf};

use anyhow::Result;
use autolatex::app_config::Config;
use autolatex::errors::TranslatorError;
use autolatex::translators::{ImageGenerator, TranslatorLevel, TranslatorRepository};

use crate::common;

const SVG_INKSCAPE: &str = "INPUT_EXTENSIONS = .svg\n\
OUTPUT_EXTENSIONS for pdf = .pdf\n\
OUTPUT_EXTENSIONS for eps = .eps\n\
COMMAND_LINE = inkscape --export-filename=$out $in\n\
FILES_TO_CLEAN = $outbasename.pdf_tex\n";

const SVG_RSVG: &str = "INPUT_EXTENSIONS = .svg\n\
OUTPUT_EXTENSIONS = .pdf\n\
COMMAND_LINE = rsvg-convert -f pdf -o $out $in\n";

const DOT: &str = "INPUT_EXTENSIONS = .dot .gv\n\
OUTPUT_EXTENSIONS = .pdf\n\
TRANSLATOR_FUNCTION = <<EOF\n\
dot -Tpdf -o \"$out\" \"$in\"\n\
EOF\n";

/// Builds a document directory with user and document-level definitions
fn setup(dir: &Path) -> Result<Config> {
    common::create_test_file(dir, "user/svg2pdf_inkscape.transdef", SVG_INKSCAPE)?;
    common::create_test_file(dir, "user/dot2pdf.transdef", DOT)?;
    common::create_test_file(dir, "doc/.autolatex/translators/svg2pdf_rsvg.transdef", SVG_RSVG)?;
    let mut config = common::test_config(dir);
    config.translators.user_dir = Some(dir.join("user"));
    Ok(config)
}

fn repository(config: &Config, doc_dir: &Path) -> TranslatorRepository {
    TranslatorRepository::new(
        config.translators.directories(doc_dir),
        config.translators.overrides(),
    )
}

#[test]
fn test_sync_withCompetingLevels_shouldReportConflict() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let config = setup(temp_dir.path())?;
    let mut repo = repository(&config, &temp_dir.path().join("doc"));

    let conflicts = match repo.sync() {
        Err(TranslatorError::Conflict(conflicts)) => conflicts,
        other => panic!("expected a conflict, got {:?}", other),
    };
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].translators, vec!["svg2pdf_inkscape", "svg2pdf_rsvg"]);

    // The unrelated translator stays usable
    assert_eq!(repo.find(Path::new("g.gv"), None)?.name, "dot2pdf");
    assert_eq!(repo.effective_level("svg2pdf_rsvg"), Some(TranslatorLevel::Document));
    Ok(())
}

#[test]
fn test_sync_withDocumentExclusion_shouldResolveConflict() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let mut config = setup(temp_dir.path())?;
    config.translators.document.insert("svg2pdf_rsvg".to_string(), false);
    let mut repo = repository(&config, &temp_dir.path().join("doc"));

    repo.sync()?;
    assert!(repo.conflicts().is_empty());
    assert!(!repo.is_included("svg2pdf_rsvg"));
    assert_eq!(repo.find(Path::new("a.svg"), None)?.name, "svg2pdf_inkscape");
    assert_eq!(repo.input_extensions(), vec![".dot", ".gv", ".svg"]);
    // Excluded translators are still known
    assert_eq!(repo.translators().len(), 3);
    Ok(())
}

#[test]
fn test_imageGenerator_shouldPickOutputForTarget() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let mut config = setup(temp_dir.path())?;
    config.translators.document.insert("svg2pdf_rsvg".to_string(), false);
    let mut repo = repository(&config, &temp_dir.path().join("doc"));
    repo.sync()?;

    let inkscape = repo.find(Path::new("figs/a.svg"), None)?;
    let pdf = ImageGenerator::new(&repo, "pdf");
    let eps = ImageGenerator::new(&repo, "eps");
    assert_eq!(pdf.output_for(inkscape, Path::new("figs/a.svg")), PathBuf::from("figs/a.pdf"));
    assert_eq!(eps.output_for(inkscape, Path::new("figs/a.svg")), PathBuf::from("figs/a.eps"));

    // No eps list: falls back to the unqualified one
    let dot = repo.find(Path::new("figs/g.gv"), None)?;
    assert_eq!(eps.output_for(dot, Path::new("figs/g.gv")), PathBuf::from("figs/g.pdf"));
    Ok(())
}

#[test]
fn test_generatedFiles_shouldIncludeCleanPatternsAndSideFiles() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let mut config = setup(temp_dir.path())?;
    config.translators.document.insert("svg2pdf_rsvg".to_string(), false);
    let mut repo = repository(&config, &temp_dir.path().join("doc"));
    repo.sync()?;

    let figs = temp_dir.path().join("doc/figs");
    let source = common::create_test_file(&figs, "plot.svg", "<svg/>")?;
    common::create_test_file(&figs, "plot.pdf.tmp", "")?;

    let generator = ImageGenerator::new(&repo, "pdf");
    let files = generator.generated_files(&source);
    assert_eq!(
        files,
        vec![figs.join("plot.pdf"), figs.join("plot.pdf.tmp"), figs.join("plot.pdf_tex")]
    );
    assert!(!files.contains(&source));
    Ok(())
}
