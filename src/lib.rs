//! # latex2edx
//!
//! Convert LaTeX course material into the XML dialect read by the edX
//! course platform.
//!
//! ## Why this crate?
//!
//! A general TeX engine can turn LaTeX into XHTML, but its output is only an
//! approximation of what edX accepts: math arrives wrapped in engine markup,
//! typographic Unicode leaks through, graphics point at files that may be
//! PDFs, PNGs or JPEGs under inconsistent names, and answer boxes need their
//! own grammar. This crate is the post-rendering half: an ordered chain of
//! regex rules that rewrites the engine's markup into `[mathjax]` tokens,
//! `<img>` references to published assets, and problem XML.
//!
//! ## Pipeline Overview
//!
//! ```text
//! LaTeX
//!  │
//!  ├─ 1. Input    literal, reader, or file (optionally wrapped as a fragment)
//!  ├─ 2. Engine   external TeX engine renders XHTML-like markup
//!  ├─ 3. Filters  unicode fix-up, then ordered rules:
//!  │              inline math → display math → answer box → image → raw XML
//!  ├─ 4. Cleanup  <p>/<li> newlines, &nbsp; → &#160;, <body> extraction
//!  └─ 5. Output   <document>…</document> + published images + stats
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use latex2edx::{convert, CommandAnswerBox, CommandEngine, ConversionConfig, DocumentSource};
//! use std::sync::Arc;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConversionConfig::builder()
//!         .engine(Arc::new(CommandEngine::new("plastex-xhtml")))
//!         .answer_box(Arc::new(CommandAnswerBox::new("abox-xml")))
//!         .imdir("course/static/images")
//!         .imurl("images")
//!         .build()?;
//!     let output = convert(DocumentSource::new("lecture1.tex"), &config)?;
//!     println!("{}", output.xml);
//!     for diag in &output.diagnostics {
//!         eprintln!("warning: {diag}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! Already have the engine's markup? [`filter_markup`] runs the filter chain
//! on its own, with no engine and no file output.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `latex2edx` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! latex2edx = { version = "0.5", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConversionConfig, ConversionConfigBuilder};
pub use convert::{
    convert, convert_to_file, filter_markup, write_atomic, DocumentPipeline, PipelineState,
};
pub use error::{BoxError, ImageDiagnostic, ImageError, Latex2EdxError, ToolError};
pub use output::{ConversionOutput, ConversionStats, PublishedImage, RuleMatches};
pub use pipeline::abox::{AnswerBoxParser, CommandAnswerBox};
pub use pipeline::engine::{CommandEngine, EngineOptions, TexEngine};
pub use pipeline::filters::{ExtraFilter, FilterChain, FilterRule, RuleOrigin};
pub use pipeline::input::DocumentSource;
pub use pipeline::math::{normalize, MathMode};
pub use pipeline::tools::{ExternalTools, ImageTools};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, ProgressCallback};
