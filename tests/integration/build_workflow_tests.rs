/*!
 * Build scenarios driven through a mock tool runner
 */

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use autolatex::app_config::{Compiler, Config, GenerationType};
use autolatex::build::{cancellation, StandardWarning, ToolKind};
use autolatex::errors::BuildError;
use autolatex::Maker;

use crate::common;
use crate::common::mock_tools::MockToolRunner;

fn maker(root: &Path, config: Config, runner: &Arc<MockToolRunner>) -> Maker {
    Maker::new(root, config).with_runner(runner.clone())
}

/// Test that an unchanged document is not rebuilt
#[tokio::test]
async fn test_build_twice_withNoChanges_shouldRunNothingTheSecondTime() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let dir = temp_dir.path();
    let root = common::create_test_document(dir, "main.tex", "Hello")?;
    common::age_file(&root, 10)?;
    let runner = Arc::new(MockToolRunner::new());

    let report = maker(&root, common::test_config(dir), &runner).build().await?;
    assert_eq!(report.passes, 1);
    assert_eq!(report.output, dir.join("main.pdf"));
    assert!(dir.join("main.pdf").exists());

    runner.clear();
    let report = maker(&root, common::test_config(dir), &runner).build().await?;
    assert!(report.invocations.is_empty());
    assert!(runner.invocations().is_empty());

    // Editing the document compiles it again
    common::age_file(&dir.join("main.pdf"), 5)?;
    fs::write(&root, "\\documentclass{article}\\begin{document}Changed\\end{document}")?;
    let report = maker(&root, common::test_config(dir), &runner).build().await?;
    assert_eq!(report.invocations_of(ToolKind::Latex), 1);
    Ok(())
}

#[tokio::test]
async fn test_build_withCompilerFlags_shouldPassThemToLatex() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let dir = temp_dir.path();
    let root = common::create_test_document(dir, "main.tex", "x")?;
    let runner = Arc::new(MockToolRunner::new());
    let mut config = common::test_config(dir);
    config.synctex = true;
    config.tools.latex_flags = vec!["-shell-escape".to_string()];

    maker(&root, config, &runner).build().await?;
    let invocations = runner.invocations();
    assert_eq!(invocations.len(), 1);
    assert_eq!(invocations[0].program, "pdflatex");
    assert_eq!(
        invocations[0].args,
        vec![
            "-shell-escape",
            "-interaction=nonstopmode",
            "-file-line-error",
            "-synctex=1",
            "-output-format=pdf",
            "main.tex"
        ]
    );
    assert_eq!(invocations[0].working_dir, dir);
    Ok(())
}

/// A warning that disappears after one more pass stops the loop
#[tokio::test]
async fn test_build_withExtendedWarnings_shouldRerunOnceForNewWarning() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let dir = temp_dir.path();
    let root = common::create_test_document(dir, "main.tex", "See \\ref{x}.")?;
    let runner = Arc::new(MockToolRunner::new());
    runner.push_log(
        "!!!![BeginWarning]main_autolatex_wrapper:tex:12: Reference `x' on page 1 undefined on input line 12.\n!!!![EndWarning]\n",
    );
    let mut config = common::test_config(dir);
    config.extended_warnings = true;

    let report = maker(&root, config, &runner).build().await?;
    assert_eq!(report.passes, 2);
    assert!(report.warnings.is_empty());
    assert!(!report.pass_limit_reached);

    let invocations = runner.invocations();
    assert!(invocations[0].args.contains(&"-jobname=main".to_string()));
    assert_eq!(invocations[0].args.last().map(String::as_str), Some("main_autolatex_wrapper.tex"));
    // The wrapper is gone once the build is over
    assert!(!dir.join("main_autolatex_wrapper.tex").exists());
    Ok(())
}

/// Positions inside the wrapper are reported against the document
#[tokio::test]
async fn test_build_withPersistentWarning_shouldLocateItInDocument() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let dir = temp_dir.path();
    let root = common::create_test_document(dir, "main.tex", "See \\ref{x}.")?;
    let runner = Arc::new(MockToolRunner::new());
    runner.set_default_log(
        "!!!![BeginWarning]main_autolatex_wrapper:tex:12: Reference `x' on page 1 undefined on input line 12.\n!!!![EndWarning]\n",
    );
    let mut config = common::test_config(dir);
    config.extended_warnings = true;

    let report = maker(&root, config, &runner).build().await?;
    assert_eq!(report.passes, 2);
    assert!(report.warnings.contains(&StandardWarning::UndefinedReference));
    assert_eq!(report.located_warnings.len(), 1);
    assert_eq!(report.located_warnings[0].file, "main.tex");
    assert_eq!(report.located_warnings[0].line, 4);
    Ok(())
}

#[tokio::test]
async fn test_build_withAlwaysNewWarnings_shouldStopAtPassLimit() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let dir = temp_dir.path();
    let root = common::create_test_document(dir, "main.tex", "x")?;
    let runner = Arc::new(MockToolRunner::new());
    runner
        .push_log("LaTeX Warning: Citation `a' on page 1 undefined on input line 1.\n")
        .push_log("LaTeX Warning: Reference `b' on page 1 undefined on input line 2.\n")
        .push_log("LaTeX Warning: Label `c' multiply defined.\n")
        .push_log("LaTeX Warning: There were undefined references.\n");
    let mut config = common::test_config(dir);
    config.max_compilations = 3;

    let report = maker(&root, config, &runner).build().await?;
    assert_eq!(report.passes, 3);
    assert!(report.pass_limit_reached);
    assert_eq!(runner.count(ToolKind::Latex), 3);
    Ok(())
}

#[tokio::test]
async fn test_build_withRerunDisabled_shouldCompileOnce() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let dir = temp_dir.path();
    let root = common::create_test_document(dir, "main.tex", "x")?;
    let runner = Arc::new(MockToolRunner::new());
    runner.set_default_log("LaTeX Warning: There were undefined references.\n");
    let mut config = common::test_config(dir);
    config.rerun_on_warnings = false;

    let report = maker(&root, config, &runner).build().await?;
    assert_eq!(report.passes, 1);
    assert!(!report.pass_limit_reached);
    Ok(())
}

/// Citation flow: compile, bibtex, compile; later builds follow the aux content
#[tokio::test]
async fn test_build_withBibliography_shouldRunBibtexBetweenPasses() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let dir = temp_dir.path();
    let root = common::create_test_document(dir, "main.tex", "\\cite{knuth}\n\\bibliography{refs}")?;
    let bib = common::create_test_file(dir, "refs.bib", "@book{knuth, title={TAOCP}}\n")?;
    common::age_file(&root, 200)?;
    common::age_file(&bib, 200)?;
    let runner = Arc::new(MockToolRunner::new());
    runner.with_latex_file("aux", "\\citation{knuth}\n\\bibdata{refs}\n");

    let report = maker(&root, common::test_config(dir), &runner).build().await?;
    let kinds: Vec<ToolKind> = report.invocations.iter().map(|i| i.kind).collect();
    assert_eq!(kinds, vec![ToolKind::Latex, ToolKind::Bibtex, ToolKind::Latex]);
    assert_eq!(report.invocations[1].args, vec!["main"]);
    assert!(dir.join("main.bbl").exists());
    let stamps = fs::read_to_string(dir.join(".autolatex_stamp"))?;
    assert!(stamps.starts_with("BIB("));
    assert!(stamps.trim_end().ends_with(":main.aux"));

    // Rewriting the aux file with the same content changes nothing
    fs::write(dir.join("main.aux"), "\\citation{knuth}\n\\bibdata{refs}\n")?;
    let report = maker(&root, common::test_config(dir), &runner).build().await?;
    assert!(report.invocations.is_empty());

    // A newer database reruns bibtex and the compiler
    common::age_file(&dir.join("main.bbl"), 100)?;
    common::age_file(&dir.join("main.pdf"), 100)?;
    common::age_file(&bib, 50)?;
    let report = maker(&root, common::test_config(dir), &runner).build().await?;
    assert_eq!(report.invocations_of(ToolKind::Bibtex), 1);
    assert_eq!(report.invocations_of(ToolKind::Latex), 1);
    Ok(())
}

#[tokio::test]
async fn test_build_withAuxWithoutCitations_shouldSkipBibtex() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let dir = temp_dir.path();
    let root = common::create_test_document(dir, "main.tex", "\\bibliography{refs}")?;
    common::create_test_file(dir, "refs.bib", "")?;
    let runner = Arc::new(MockToolRunner::new());
    runner.with_latex_file("aux", "\\relax\n\\bibdata{refs}\n");

    let report = maker(&root, common::test_config(dir), &runner).build().await?;
    assert_eq!(report.invocations_of(ToolKind::Bibtex), 0);
    assert_eq!(report.passes, 1);
    // The fingerprint is still recorded
    let stamps = fs::read_to_string(dir.join(".autolatex_stamp"))?;
    assert!(stamps.contains(":main.aux"));
    Ok(())
}

#[tokio::test]
async fn test_build_withBiblatexBiber_shouldRunBiberOnBcf() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let dir = temp_dir.path();
    let root = common::create_test_document(
        dir,
        "main.tex",
        "\\usepackage[backend=biber]{biblatex}\n\\addbibresource{refs.bib}\n\\cite{k}",
    )?;
    common::create_test_file(dir, "refs.bib", "@misc{k}\n")?;
    let runner = Arc::new(MockToolRunner::new());
    runner.with_latex_file("bcf", "<bcf:controlfile/>\n");

    let report = maker(&root, common::test_config(dir), &runner).build().await?;
    let kinds: Vec<ToolKind> = report.invocations.iter().map(|i| i.kind).collect();
    assert_eq!(kinds, vec![ToolKind::Latex, ToolKind::Biber, ToolKind::Latex]);
    assert_eq!(report.invocations[1].output, Some(dir.join("main.bbl")));
    Ok(())
}

/// Test that compiler errors are located in the log
#[tokio::test]
async fn test_build_withCompilerError_shouldReportLocatedError() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let dir = temp_dir.path();
    let root = common::create_test_document(dir, "main.tex", "\\foo")?;
    let runner = Arc::new(MockToolRunner::new());
    runner
        .push_log("This is pdfTeX\n! Undefined control sequence.\nl.3 \\foo\n")
        .fail(ToolKind::Latex, "pdflatex failed");

    let result = maker(&root, common::test_config(dir), &runner).build().await;
    match result {
        Err(BuildError::ToolExited { tool, code, output }) => {
            assert_eq!(tool, "pdflatex");
            assert_eq!(code, Some(1));
            assert!(output.contains("line 3"));
            assert!(output.contains("Undefined control sequence"));
        }
        other => panic!("unexpected result {:?}", other),
    }
    assert!(!dir.join("main.pdf").exists());
    assert!(!dir.join(".autolatex_stamp").exists());
    Ok(())
}

#[tokio::test]
async fn test_build_withUnreadableFailure_shouldReportAmbiguousLog() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let dir = temp_dir.path();
    let root = common::create_test_document(dir, "main.tex", "x")?;
    let runner = Arc::new(MockToolRunner::new());
    runner
        .push_log("This is pdfTeX\nEmergency stop\n")
        .fail(ToolKind::Latex, "fatal: out of memory");

    let result = maker(&root, common::test_config(dir), &runner).build().await;
    match result {
        Err(BuildError::LogParseAmbiguous { output, .. }) => assert!(output.contains("out of memory")),
        other => panic!("unexpected result {:?}", other),
    }
    assert!(!dir.join("main.pdf").exists());
    Ok(())
}

/// A failing index tool does not fail the build
#[tokio::test]
async fn test_build_withMakeindexFailure_shouldContinue() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let dir = temp_dir.path();
    let root = common::create_test_document(dir, "main.tex", "\\makeindex\nword\\index{word}\n\\printindex")?;
    let runner = Arc::new(MockToolRunner::new());
    runner
        .with_latex_file("idx", "\\indexentry{word}{1}\n")
        .fail(ToolKind::Makeindex, "Input index file main.idx not found.");

    let report = maker(&root, common::test_config(dir), &runner).build().await?;
    assert_eq!(runner.count(ToolKind::Makeindex), 1);
    assert_eq!(report.secondary_failures.len(), 1);
    assert!(report.secondary_failures[0].contains("makeindex"));
    assert!(!dir.join("main.ind").exists());
    assert!(dir.join("main.pdf").exists());

    let makeindex = runner
        .invocations()
        .into_iter()
        .find(|i| i.kind == ToolKind::Makeindex)
        .map(|i| i.args);
    assert_eq!(
        makeindex,
        Some(vec!["-o".to_string(), "main.ind".to_string(), "main.idx".to_string()])
    );
    Ok(())
}

#[tokio::test]
async fn test_build_withPostScript_shouldConvertDvi() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let dir = temp_dir.path();
    let root = common::create_test_document(dir, "main.tex", "x")?;
    common::age_file(&root, 10)?;
    let runner = Arc::new(MockToolRunner::new());
    let mut config = common::test_config(dir);
    config.generation_type = GenerationType::Ps;

    let report = maker(&root, config.clone(), &runner).build().await?;
    let kinds: Vec<ToolKind> = report.invocations.iter().map(|i| i.kind).collect();
    assert_eq!(kinds, vec![ToolKind::Latex, ToolKind::Dvips]);
    assert!(report.invocations[0].args.contains(&"-output-format=dvi".to_string()));
    assert_eq!(report.invocations[0].output, Some(dir.join("main.dvi")));
    assert_eq!(report.output, dir.join("main.ps"));
    assert!(dir.join("main.ps").exists());

    let report = maker(&root, config, &runner).build().await?;
    assert!(report.invocations.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_build_withFailingDvips_shouldRemovePostScript() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let dir = temp_dir.path();
    let root = common::create_test_document(dir, "main.tex", "x")?;
    let runner = Arc::new(MockToolRunner::new());
    runner.fail(ToolKind::Dvips, "dvips: ! DVI file can't be opened.");
    let mut config = common::test_config(dir);
    config.generation_type = GenerationType::Ps;

    let result = maker(&root, config, &runner).build().await;
    match result {
        Err(BuildError::ToolExited { tool, output, .. }) => {
            assert_eq!(tool, "dvips");
            assert!(output.contains("can't be opened"));
        }
        other => panic!("unexpected result {:?}", other),
    }
    assert!(dir.join("main.dvi").exists());
    assert!(!dir.join("main.ps").exists());
    Ok(())
}

/// xelatex without PDF output writes an `.xdv` file
#[tokio::test]
async fn test_build_withXelatexDvi_shouldTrackXdvOutput() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let dir = temp_dir.path();
    let root = common::create_test_document(dir, "main.tex", "x")?;
    common::age_file(&root, 10)?;
    let runner = Arc::new(MockToolRunner::new());
    let mut config = common::test_config(dir);
    config.compiler = Compiler::Xelatex;
    config.generation_type = GenerationType::Dvi;

    let report = maker(&root, config.clone(), &runner).build().await?;
    assert_eq!(report.invocations.len(), 1);
    assert_eq!(report.invocations[0].program, "xelatex");
    assert!(report.invocations[0].args.contains(&"-no-pdf".to_string()));
    assert_eq!(report.invocations[0].output, Some(dir.join("main.xdv")));
    assert_eq!(report.output, dir.join("main.xdv"));

    let report = maker(&root, config, &runner).build().await?;
    assert!(report.invocations.is_empty());
    Ok(())
}

/// `\printindex` without `\makeindex` never gets an index file to sort
#[tokio::test]
async fn test_build_twice_withPrintindexOnly_shouldRunNothingTheSecondTime() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let dir = temp_dir.path();
    let root = common::create_test_document(dir, "main.tex", "\\printindex")?;
    common::age_file(&root, 10)?;
    let runner = Arc::new(MockToolRunner::new());

    let report = maker(&root, common::test_config(dir), &runner).build().await?;
    assert_eq!(report.invocations_of(ToolKind::Latex), 1);
    assert_eq!(report.invocations_of(ToolKind::Makeindex), 0);

    let report = maker(&root, common::test_config(dir), &runner).build().await?;
    assert!(report.invocations.is_empty());
    Ok(())
}

/// The diagnostics wrapper copies a latin1 document without re-encoding it
#[tokio::test]
async fn test_build_withExtendedWarningsOnLatin1Document_shouldCompile() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let dir = temp_dir.path();
    let root = dir.join("main.tex");
    fs::write(
        &root,
        b"\\documentclass{article}\n\\usepackage[latin1]{inputenc}\n\\begin{document}\nCaf\xe9\n\\end{document}\n",
    )?;
    let runner = Arc::new(MockToolRunner::new());
    let mut config = common::test_config(dir);
    config.extended_warnings = true;

    let report = maker(&root, config, &runner).build().await?;
    assert_eq!(report.passes, 1);
    assert_eq!(runner.invocations()[0].args.last().map(String::as_str), Some("main_autolatex_wrapper.tex"));
    assert!(!dir.join("main_autolatex_wrapper.tex").exists());
    Ok(())
}

#[tokio::test]
async fn test_clean_shouldKeepOutputsUnlessAll() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let dir = temp_dir.path();
    let root = common::create_test_document(dir, "main.tex", "\\cite{knuth}\n\\bibliography{refs}")?;
    common::create_test_file(dir, "refs.bib", "@book{knuth}\n")?;
    let runner = Arc::new(MockToolRunner::new());
    runner.with_latex_file("aux", "\\citation{knuth}\n\\bibdata{refs}\n");
    maker(&root, common::test_config(dir), &runner).build().await?;

    let removed = maker(&root, common::test_config(dir), &runner).clean(false)?;
    assert!(removed.contains(&dir.join("main.aux")));
    assert!(removed.contains(&dir.join("main.log")));
    assert!(removed.contains(&dir.join("main.bbl")));
    assert!(dir.join("main.pdf").exists());
    assert!(dir.join(".autolatex_stamp").exists());

    let removed = maker(&root, common::test_config(dir), &runner).clean(true)?;
    assert_eq!(removed, vec![dir.join(".autolatex_stamp"), dir.join("main.pdf")]);
    assert!(root.exists());
    assert!(dir.join("refs.bib").exists());
    Ok(())
}

/// Cancellation stops the running tool and removes its partial output
#[tokio::test]
async fn test_build_whenCancelled_shouldRemovePartialOutput() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let dir = temp_dir.path();
    let root = common::create_test_document(dir, "main.tex", "x")?;
    let runner = Arc::new(MockToolRunner::new());
    runner.set_delay(Duration::from_secs(30));
    let (handle, token) = cancellation();
    let maker = maker(&root, common::test_config(dir), &runner).with_cancel(token);

    let (result, _) = tokio::join!(maker.build(), async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.cancel();
    });
    assert!(matches!(result, Err(BuildError::Cancelled)));
    assert_eq!(runner.count(ToolKind::Latex), 1);
    assert!(!dir.join("main.pdf").exists());
    assert!(!dir.join(".autolatex_stamp").exists());

    // A cancelled token stops later builds before any tool runs
    runner.clear();
    assert!(matches!(maker.build().await, Err(BuildError::Cancelled)));
    assert!(runner.invocations().is_empty());
    Ok(())
}
