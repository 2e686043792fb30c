//! Result types returned by a conversion.

use crate::error::ImageDiagnostic;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// The final document plus everything the run produced on the side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionOutput {
    /// `<document>…</document>` XML.
    pub xml: String,
    /// Where the XML was written, if it was.
    pub output_path: Option<PathBuf>,
    /// Image assets copied into the asset directory, in emission order.
    pub images: Vec<PublishedImage>,
    /// Non-fatal image problems (missing files, page-count fallbacks).
    pub diagnostics: Vec<ImageDiagnostic>,
    pub stats: ConversionStats,
}

impl ConversionOutput {
    /// True when every image directive resolved to a real file.
    pub fn is_clean(&self) -> bool {
        self.diagnostics
            .iter()
            .all(|d| !matches!(d, ImageDiagnostic::NotFound { .. }))
    }
}

/// One image copied into the asset directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedImage {
    /// File the asset was copied from.
    pub source: PathBuf,
    /// Copy inside the asset directory.
    pub dest: PathBuf,
    /// URL used in the `<img>` reference.
    pub url: String,
    /// Width in pixels written on the reference.
    pub width: u32,
}

/// Per-run counters and timings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversionStats {
    /// Bytes of LaTeX handed to the engine (after wrapping).
    pub source_bytes: usize,
    /// Bytes of markup the engine returned.
    pub markup_bytes: usize,
    /// Lines in the final XML.
    pub xml_lines: usize,
    /// Spans rewritten per rule, in chain order.
    pub rule_matches: Vec<RuleMatches>,
    pub images_published: usize,
    pub images_missing: usize,
    pub engine_duration_ms: u64,
    pub filter_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Match count for one filter rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleMatches {
    pub rule: String,
    pub matches: usize,
}
