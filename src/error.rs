//! Error types for the latex2edx library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Latex2EdxError`]: **Fatal**: the conversion cannot produce a
//!   trustworthy document (unreadable source, engine crash, a filter rule
//!   whose transform raised). Returned as `Err(Latex2EdxError)` from the
//!   top-level `convert*` functions.
//!
//! * [`ImageDiagnostic`]: **Non-fatal**: an image could not be found, or a
//!   PDF page count could not be read. The document still converts; the
//!   defect is visible in the output (a `NOTFOUND-` reference) and recorded
//!   in [`crate::output::ConversionOutput::diagnostics`].
//!
//! Component errors ([`ImageError`], [`ToolError`]) are boxed into
//! [`Latex2EdxError::FilterFailed`] when they escape a filter rule.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Boxed error returned by filter transforms and external collaborators.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// All fatal errors returned by the latex2edx library.
#[derive(Debug, Error)]
pub enum Latex2EdxError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Source file was not found at the given path.
    #[error("LaTeX source not found: '{path}'\nCheck the path exists and is readable.")]
    SourceNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The source exists but could not be read as UTF-8 text.
    #[error("Failed to read LaTeX source '{path}': {source}")]
    SourceReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Engine errors ─────────────────────────────────────────────────────
    /// No TeX engine was configured but the pipeline needed one.
    #[error("No TeX engine configured.\nSet one with ConversionConfig::builder().engine(..) or --engine.")]
    EngineNotConfigured,

    /// The external TeX engine failed to parse or render the document.
    #[error("TeX engine failed on '{path}': {source}")]
    EngineFailed {
        path: PathBuf,
        #[source]
        source: BoxError,
    },

    // ── Filter errors ─────────────────────────────────────────────────────
    /// A filter rule's transform raised; the conversion is aborted.
    #[error("Error in rendering filter '{rule}': {source}")]
    FilterFailed {
        rule: String,
        #[source]
        source: BoxError,
    },

    /// A caller-supplied filter pattern is not a valid regular expression.
    #[error("Invalid filter pattern '{pattern}': {source}")]
    InvalidFilterPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// The rendered markup has no `<body>` … `</body>` section to extract.
    #[error("Rendered markup has no '{tag}' tag; cannot extract document body")]
    MissingBody { tag: &'static str },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output XML file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// `convert` was called a second time on the same pipeline.
    #[error("This pipeline has already run; create a new DocumentPipeline per conversion")]
    AlreadyConverted,
}

/// A non-fatal problem found while materialising images.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ImageDiagnostic {
    /// No file matched the base path under any of the known suffixes.
    #[error("Cannot find image file {base}")]
    NotFound { base: String },

    /// `pdfinfo` failed; the PDF was treated as a single page.
    #[error("Page count for '{pdf}' unavailable ({detail}); assuming 1 page")]
    PageCountFallback { pdf: PathBuf, detail: String },
}

/// Failure while copying, permissioning, or rasterising an image asset.
#[derive(Debug, Error)]
pub enum ImageError {
    /// The output asset directory could not be created.
    #[error("Failed to create image directory '{path}': {source}")]
    CreateDirFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Copying a source asset into the asset directory failed.
    #[error("Failed to copy '{from}' to '{to}': {source}")]
    CopyFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Making a copied asset world-readable failed.
    #[error("Failed to set permissions on '{path}': {source}")]
    PermissionFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The raster-conversion tool failed on a PDF.
    #[error("Failed to rasterise '{pdf}': {source}")]
    RasterizeFailed {
        pdf: PathBuf,
        #[source]
        source: ToolError,
    },
}

/// Failure invoking an external command-line tool.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The program could not be started (not installed, not executable).
    #[error("Failed to run '{program}': {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The program ran but exited unsuccessfully.
    #[error("'{program}' exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },

    /// The program succeeded but its output could not be interpreted.
    #[error("Unexpected output from '{program}': {detail}")]
    BadOutput { program: String, detail: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_failed_names_rule() {
        let e = Latex2EdxError::FilterFailed {
            rule: "answer-box".into(),
            source: "unbalanced quote".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("answer-box"), "got: {msg}");
        assert!(msg.contains("unbalanced quote"), "got: {msg}");
    }

    #[test]
    fn filter_failed_exposes_source() {
        use std::error::Error as _;
        let e = Latex2EdxError::FilterFailed {
            rule: "image".into(),
            source: Box::new(ImageError::RasterizeFailed {
                pdf: PathBuf::from("fig.pdf"),
                source: ToolError::Failed {
                    program: "convert".into(),
                    status: "exit status: 1".into(),
                    stderr: "no decode delegate".into(),
                },
            }),
        };
        let source = e.source().expect("source should be set");
        assert!(source.to_string().contains("fig.pdf"));
    }

    #[test]
    fn missing_body_display() {
        let e = Latex2EdxError::MissingBody { tag: "</body>" };
        assert!(e.to_string().contains("</body>"));
    }

    #[test]
    fn not_found_diagnostic_display() {
        let d = ImageDiagnostic::NotFound {
            base: "figs/plot".into(),
        };
        assert_eq!(d.to_string(), "Cannot find image file figs/plot");
    }

    #[test]
    fn diagnostic_serialises() {
        let d = ImageDiagnostic::PageCountFallback {
            pdf: PathBuf::from("a.pdf"),
            detail: "pdfinfo missing".into(),
        };
        let json = serde_json::to_string(&d).expect("serialise");
        assert!(json.contains("PageCountFallback"));
    }
}
