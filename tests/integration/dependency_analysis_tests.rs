/*!
 * Dependency discovery over multi-file document trees
 */

use anyhow::Result;
use autolatex::analyzer::{DependencyEntry, DependencyKind};
use autolatex::DependencyAnalyzer;

use crate::common;

/// Files included from subdirectories resolve against the document directory
#[test]
fn test_analyze_withChapterTree_shouldCollectEveryKind() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let dir = temp_dir.path();
    let root = common::create_test_document(
        dir,
        "thesis.tex",
        "\\usepackage{local/macros}\n\\include{chapters/intro}\n\\bibliographystyle{custom}\n\\bibliography{refs,extra}\n\\printindex",
    )?;
    common::create_test_file(dir, "local/macros.sty", "\\RequirePackage{helpers}\n")?;
    common::create_test_file(dir, "helpers.sty", "")?;
    common::create_test_file(dir, "chapters/intro.tex", "\\input{chapters/details}\n")?;
    common::create_test_file(dir, "chapters/details.tex", "\\input{chapters/intro}\n")?;
    common::create_test_file(dir, "refs.bib", "")?;
    common::create_test_file(dir, "custom.bst", "")?;

    let set = DependencyAnalyzer::new().analyze(&root, dir)?;
    let entries = set.entries();
    let expected = vec![
        DependencyEntry { kind: DependencyKind::Tex, path: dir.join("chapters/details.tex") },
        DependencyEntry { kind: DependencyKind::Tex, path: dir.join("chapters/intro.tex") },
        DependencyEntry { kind: DependencyKind::Style, path: dir.join("local/macros.sty") },
        DependencyEntry { kind: DependencyKind::BibStyle, path: dir.join("custom.bst") },
        DependencyEntry { kind: DependencyKind::Bib, path: dir.join("refs.bib") },
        DependencyEntry { kind: DependencyKind::IndexTrigger, path: dir.join("thesis.idx") },
    ];
    assert_eq!(entries, expected);
    Ok(())
}

/// `\bibliography{mybib}` in a document named main.tex
#[test]
fn test_analyze_withSingleBibliography_shouldUseDocumentDatabase() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let dir = temp_dir.path();
    let root = common::create_test_document(dir, "main.tex", "\\cite{x}\n\\bibliography{mybib}")?;
    common::create_test_file(dir, "mybib.bib", "@misc{x}\n")?;

    let set = DependencyAnalyzer::new().analyze(&root, dir)?;
    assert_eq!(set.default_database(), "main");
    assert_eq!(set.bibliographies().len(), 1);
    let files: Vec<_> = set.bibliography("main").map(|db| db.files().cloned().collect()).unwrap_or_default();
    assert_eq!(files, vec![dir.join("mybib.bib")]);
    assert!(!set.uses_biber);
    Ok(())
}

/// Bibliography macros in included files feed the root document's database
#[test]
fn test_analyze_withBibliographyInIncludedFile_shouldAttachToRoot() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let dir = temp_dir.path();
    let root = common::create_test_document(dir, "paper.tex", "\\input{back}")?;
    common::create_test_file(dir, "back.tex", "\\bibliography{more}\n")?;
    common::create_test_file(dir, "more.bib", "")?;

    let set = DependencyAnalyzer::new().analyze(&root, dir)?;
    assert!(set.bibliography("paper").is_some());
    assert!(set.bibliography("back").is_none());
    Ok(())
}

/// Analysis does not depend on anything but the files on disk
#[test]
fn test_analyze_twice_shouldGiveSameResult() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let dir = temp_dir.path();
    let root = common::create_test_document(dir, "main.tex", "\\input{a}\\input{missing}")?;
    common::create_test_file(dir, "a.tex", "\\usepackage{nosuchpackage}")?;

    let analyzer = DependencyAnalyzer::new();
    let first = analyzer.analyze(&root, dir)?.entries();
    let second = analyzer.analyze(&root, dir)?.entries();
    assert_eq!(first, second);
    assert_eq!(first.len(), 1);
    Ok(())
}
