/*!
 * Figure generation during builds, with translators that run `touch`
 */

#![cfg(unix)]

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use autolatex::app_config::Config;
use autolatex::build::{cancellation, ToolKind};
use autolatex::errors::{BuildError, TranslatorError};
use autolatex::translators::GenerationOutcome;
use autolatex::Maker;

use crate::common;
use crate::common::mock_tools::MockToolRunner;

const TOUCH_SVG: &str = "INPUT_EXTENSIONS = .svg\nOUTPUT_EXTENSIONS = .pdf\nCOMMAND_LINE = touch $out\n";
const TOUCH_DOT: &str = "INPUT_EXTENSIONS = .dot\nOUTPUT_EXTENSIONS = .pdf\nCOMMAND_LINE = touch $out\n";

fn document_with_figures(dir: &Path) -> Result<Config> {
    let root = common::create_test_document(dir, "main.tex", "\\includegraphics{figs/graph}")?;
    let source = common::create_test_file(dir, "figs/graph.dot", "digraph { a -> b }\n")?;
    common::age_file(&root, 100)?;
    common::age_file(&source, 100)?;
    common::create_test_file(dir, ".autolatex/translators/dot2pdf.transdef", TOUCH_DOT)?;

    let mut config = common::test_config(dir);
    config.images.generate = true;
    Ok(config)
}

fn add_competing_svg_translators(dir: &Path) -> Result<()> {
    common::create_test_file(dir, "figs/plot.svg", "<svg/>")?;
    common::create_test_file(dir, ".autolatex/translators/svg2pdf_a.transdef", TOUCH_SVG)?;
    common::create_test_file(dir, ".autolatex/translators/svg2pdf_b.transdef", TOUCH_SVG)?;
    Ok(())
}

/// Test that a conflict fails the build after the other figures were generated
#[tokio::test]
async fn test_build_withConflictingTranslators_shouldFailNamingBoth() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let dir = temp_dir.path();
    let config = document_with_figures(dir)?;
    add_competing_svg_translators(dir)?;
    let runner = Arc::new(MockToolRunner::new());

    let result = Maker::new(dir.join("main.tex"), config)
        .with_runner(runner.clone())
        .build()
        .await;
    match result {
        Err(BuildError::Translator(TranslatorError::Conflict(conflicts))) => {
            assert_eq!(conflicts.len(), 1);
            assert_eq!(conflicts[0].source_type, "svg");
            assert_eq!(conflicts[0].translators, vec!["svg2pdf_a", "svg2pdf_b"]);
        }
        other => panic!("unexpected result {:?}", other),
    }
    assert!(dir.join("figs/graph.pdf").exists());
    assert!(!dir.join("figs/plot.pdf").exists());
    assert_eq!(runner.count(ToolKind::Latex), 0);
    Ok(())
}

#[tokio::test]
async fn test_build_withDocumentExclusion_shouldGenerateEveryFigure() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let dir = temp_dir.path();
    let mut config = document_with_figures(dir)?;
    add_competing_svg_translators(dir)?;
    config.translators.document.insert("svg2pdf_b".to_string(), false);
    let runner = Arc::new(MockToolRunner::new());

    let report = Maker::new(dir.join("main.tex"), config)
        .with_runner(runner.clone())
        .build()
        .await?;
    assert_eq!(report.figures.len(), 2);
    assert!(report
        .figures
        .iter()
        .all(|f| matches!(f, GenerationOutcome::Generated(_))));
    assert!(dir.join("figs/plot.pdf").exists());
    assert_eq!(report.passes, 1);
    Ok(())
}

/// Test that figures are translated once and rebuilt when their source changes
#[tokio::test]
async fn test_build_withUnchangedFigure_shouldNotTranslateAgain() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let dir = temp_dir.path();
    let config = document_with_figures(dir)?;
    let runner = Arc::new(MockToolRunner::new());
    let build = || {
        Maker::new(dir.join("main.tex"), config.clone()).with_runner(runner.clone())
    };

    let report = build().build().await?;
    assert_eq!(report.figures, vec![GenerationOutcome::Generated(dir.join("figs/graph.pdf"))]);
    assert_eq!(report.passes, 1);

    let report = build().build().await?;
    assert_eq!(report.figures, vec![GenerationOutcome::UpToDate(dir.join("figs/graph.pdf"))]);
    assert!(report.invocations.is_empty());

    // A newer source regenerates the figure and the document
    common::age_file(&dir.join("figs/graph.pdf"), 50)?;
    common::age_file(&dir.join("main.pdf"), 50)?;
    fs::write(dir.join("figs/graph.dot"), "digraph { a -> c }\n")?;
    let report = build().build().await?;
    assert!(matches!(report.figures[0], GenerationOutcome::Generated(_)));
    assert_eq!(report.invocations_of(ToolKind::Latex), 1);
    Ok(())
}

#[tokio::test]
async fn test_cleanAll_shouldRemoveGeneratedFigures() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let dir = temp_dir.path();
    let config = document_with_figures(dir)?;
    let runner = Arc::new(MockToolRunner::new());
    let maker = Maker::new(dir.join("main.tex"), config).with_runner(runner.clone());
    maker.build().await?;
    assert!(dir.join("figs/graph.pdf").exists());

    maker.clean(false)?;
    assert!(dir.join("figs/graph.pdf").exists());
    maker.clean(true)?;
    assert!(!dir.join("figs/graph.pdf").exists());
    assert!(dir.join("figs/graph.dot").exists());
    Ok(())
}

/// Cancelling during figure generation stops the running translator
#[tokio::test]
async fn test_build_whenCancelledDuringFigures_shouldStopTranslator() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let dir = temp_dir.path();
    let config = document_with_figures(dir)?;
    common::create_test_file(
        dir,
        ".autolatex/translators/dot2pdf.transdef",
        "INPUT_EXTENSIONS = .dot\nOUTPUT_EXTENSIONS = .pdf\nTRANSLATOR_FUNCTION = <<EOL\ntouch \"$out\"\nsleep 30\nEOL\n",
    )?;
    let runner = Arc::new(MockToolRunner::new());
    let (handle, token) = cancellation();
    let maker = Maker::new(dir.join("main.tex"), config)
        .with_runner(runner.clone())
        .with_cancel(token);

    let started = Instant::now();
    let (result, _) = tokio::join!(maker.build(), async {
        tokio::time::sleep(Duration::from_millis(500)).await;
        handle.cancel();
    });
    assert!(matches!(result, Err(BuildError::Cancelled)));
    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(!dir.join("figs/graph.pdf").exists());
    assert!(runner.invocations().is_empty());
    Ok(())
}
