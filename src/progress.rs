//! Progress-callback trait for conversion events.
//!
//! Inject an [`Arc<dyn ConversionProgressCallback>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] to receive
//! events as the pipeline renders, filters, and materialises images.
//!
//! # Example
//!
//! ```rust
//! use latex2edx::{ConversionProgressCallback, ConversionConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct ImageCounter {
//!     images: Arc<AtomicUsize>,
//! }
//!
//! impl ConversionProgressCallback for ImageCounter {
//!     fn on_image_resolved(&self, base: &str, fragments: usize) {
//!         self.images.fetch_add(fragments, Ordering::SeqCst);
//!         eprintln!("{base}: {fragments} image(s)");
//!     }
//! }
//!
//! let counter = Arc::new(ImageCounter {
//!     images: Arc::new(AtomicUsize::new(0)),
//! });
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(counter as Arc<dyn ConversionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the conversion pipeline at each stage.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Conversion is single-threaded, but the trait is
/// `Send + Sync` so a config can be shared across threads.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once after the source is acquired, before the engine runs.
    ///
    /// # Arguments
    /// * `source`: display name of the input (usually its path)
    fn on_conversion_start(&self, source: &str) {
        let _ = source;
    }

    /// Called after a filter rule has run over the whole document.
    ///
    /// # Arguments
    /// * `rule`   : rule name (built-in name or caller pattern)
    /// * `matches`: number of spans the rule rewrote
    fn on_rule_applied(&self, rule: &str, matches: usize) {
        let _ = (rule, matches);
    }

    /// Called once per image directive.
    ///
    /// # Arguments
    /// * `base`     : base path from the directive
    /// * `fragments`: image references emitted (0 when not found,
    ///   one per page for multi-page PDFs)
    fn on_image_resolved(&self, base: &str, fragments: usize) {
        let _ = (base, fragments);
    }

    /// Called once after the final document is assembled.
    ///
    /// # Arguments
    /// * `lines`: line count of the final XML
    fn on_conversion_complete(&self, lines: usize) {
        let _ = lines;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ConversionConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;
