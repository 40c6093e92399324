/*!
 * Tests for error types
 */

use std::path::PathBuf;

use autolatex::errors::{
    AppError, BuildError, DiagnosticKind, ParseDiagnostic, TranslatorConflict, TranslatorError,
};

#[test]
fn test_parseDiagnostic_display_shouldNameLineAndMacro() {
    let diagnostic = ParseDiagnostic {
        line: 7,
        kind: DiagnosticKind::WrongMode {
            macro_name: "frac".to_string(),
            math: false,
        },
    };
    assert_eq!(diagnostic.to_string(), "line 7: \\frac is only defined in math mode");

    let diagnostic = ParseDiagnostic {
        line: 2,
        kind: DiagnosticKind::UnmatchedClosing('}'),
    };
    assert_eq!(diagnostic.to_string(), "line 2: unmatched closing character '}'");
}

#[test]
fn test_remediationHint_shouldKeepFirstTranslatorOnly() {
    let conflict = TranslatorConflict {
        source_type: "svg".to_string(),
        translators: vec!["svg2pdf_a".to_string(), "svg2pdf_b".to_string()],
    };
    assert_eq!(
        conflict.remediation_hint(),
        r#""translators": { "document": { "svg2pdf_a": true, "svg2pdf_b": false } }"#
    );

    let message = TranslatorError::Conflict(vec![conflict]).to_string();
    assert!(message.contains("svg2pdf_a, svg2pdf_b"));
    assert!(message.contains("'svg'"));
}

#[test]
fn test_buildError_display_shouldIncludeToolAndOutput() {
    let error = BuildError::ToolExited {
        tool: "pdflatex".to_string(),
        code: Some(1),
        output: "main.tex:3: Undefined control sequence".to_string(),
    };
    let message = error.to_string();
    assert!(message.starts_with("pdflatex exited with code Some(1)"));
    assert!(message.contains("main.tex:3"));

    let io = BuildError::io(
        "missing.aux",
        std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
    );
    assert!(matches!(io, BuildError::Io { ref path, .. } if path == &PathBuf::from("missing.aux")));
}

#[test]
fn test_appError_from_shouldWrapEachSource() {
    let app: AppError = BuildError::Cancelled.into();
    assert_eq!(app.to_string(), "Build error: Build cancelled");

    let app: AppError = TranslatorError::NotFound(PathBuf::from("a.svg")).into();
    assert!(matches!(app, AppError::Translator(TranslatorError::NotFound(_))));

    let app: AppError = std::io::Error::other("disk").into();
    assert!(matches!(app, AppError::File(ref m) if m == "disk"));

    let app: AppError = anyhow::anyhow!("odd").into();
    assert!(matches!(app, AppError::Unknown(ref m) if m == "odd"));

    let build: BuildError = TranslatorError::NotFound(PathBuf::from("b.dot")).into();
    assert!(matches!(build, BuildError::Translator(_)));
}
