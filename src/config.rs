//! Configuration types for LaTeX-to-edX-XML conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`]. External collaborators (the TeX
//! engine, the answer-box grammar, the PDF/raster tools) are injected here
//! as trait objects rather than discovered from process-wide state.

use crate::error::Latex2EdxError;
use crate::pipeline::abox::AnswerBoxParser;
use crate::pipeline::engine::TexEngine;
use crate::pipeline::filters::ExtraFilter;
use crate::pipeline::tools::{ExternalTools, ImageTools};
use crate::progress::ProgressCallback;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Configuration for a LaTeX-to-XML conversion.
///
/// Built via [`ConversionConfig::builder()`] or using
/// [`ConversionConfig::default()`].
///
/// # Example
/// ```rust
/// use latex2edx::ConversionConfig;
///
/// let config = ConversionConfig::builder()
///     .imdir("course/static/images")
///     .imurl("images")
///     .add_wrap(true)
///     .build()
///     .unwrap();
/// assert!(config.add_wrap);
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Directory that published image assets are copied into. Default: `static/images`.
    pub imdir: PathBuf,

    /// URL segment placed after `/static/` in emitted `<img>` references. Default: empty.
    pub imurl: String,

    /// Caller rules appended after the built-in filter chain.
    ///
    /// A rule whose pattern is textually identical to a built-in pattern
    /// replaces that built-in's transform in place.
    pub extra_filters: Vec<ExtraFilter>,

    /// Treat the input as a body fragment and wrap it in a minimal preamble
    /// and postamble before handing it to the engine. Default: false.
    pub add_wrap: bool,

    /// Emit progress diagnostics and let the engine log. Default: false.
    pub verbose: bool,

    /// Directory that relative image base paths are resolved against.
    /// If None, the process working directory is used.
    pub graphics_root: Option<PathBuf>,

    /// Density passed to the raster-conversion tool for PDF figures. Default: 800.
    pub raster_density: u32,

    /// Width in pixels used when a directive has no usable width. Default: 400.
    pub default_image_width: u32,

    /// Write the final XML next to the input (`.tex` → `.xhtml`). Default: true.
    pub write_output: bool,

    /// Template directory handed to the engine.
    pub template_dir: Option<PathBuf>,

    /// Plugin/macro directory handed to the engine.
    pub plugin_dir: Option<PathBuf>,

    /// TeX engine used for parsing and structural rendering.
    /// Required by [`crate::convert::convert`]; not needed for markup-only runs.
    pub engine: Option<Arc<dyn TexEngine>>,

    /// Parser for answer-box bodies. If None, any `<abox>` span is fatal.
    pub answer_box: Option<Arc<dyn AnswerBoxParser>>,

    /// PDF page-count and rasterisation tools. Default: [`ExternalTools`].
    pub image_tools: Arc<dyn ImageTools>,

    /// Optional progress event sink.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            imdir: PathBuf::from("static/images"),
            imurl: String::new(),
            extra_filters: Vec::new(),
            add_wrap: false,
            verbose: false,
            graphics_root: None,
            raster_density: 800,
            default_image_width: 400,
            write_output: true,
            template_dir: None,
            plugin_dir: None,
            engine: None,
            answer_box: None,
            image_tools: Arc::new(ExternalTools::default()),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("imdir", &self.imdir)
            .field("imurl", &self.imurl)
            .field("extra_filters", &self.extra_filters)
            .field("add_wrap", &self.add_wrap)
            .field("verbose", &self.verbose)
            .field("graphics_root", &self.graphics_root)
            .field("raster_density", &self.raster_density)
            .field("default_image_width", &self.default_image_width)
            .field("write_output", &self.write_output)
            .field("template_dir", &self.template_dir)
            .field("plugin_dir", &self.plugin_dir)
            .field("engine", &self.engine.as_ref().map(|_| "<dyn TexEngine>"))
            .field(
                "answer_box",
                &self.answer_box.as_ref().map(|_| "<dyn AnswerBoxParser>"),
            )
            .field("image_tools", &"<dyn ImageTools>")
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn imdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.imdir = dir.into();
        self
    }

    pub fn imurl(mut self, url: impl Into<String>) -> Self {
        self.config.imurl = url.into();
        self
    }

    /// Append one caller rule. Rules keep the order they are added in.
    pub fn extra_filter(mut self, filter: ExtraFilter) -> Self {
        self.config.extra_filters.push(filter);
        self
    }

    pub fn extra_filters(mut self, filters: impl IntoIterator<Item = ExtraFilter>) -> Self {
        self.config.extra_filters.extend(filters);
        self
    }

    pub fn add_wrap(mut self, v: bool) -> Self {
        self.config.add_wrap = v;
        self
    }

    pub fn verbose(mut self, v: bool) -> Self {
        self.config.verbose = v;
        self
    }

    pub fn graphics_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.graphics_root = Some(dir.into());
        self
    }

    pub fn raster_density(mut self, density: u32) -> Self {
        self.config.raster_density = density;
        self
    }

    pub fn default_image_width(mut self, px: u32) -> Self {
        self.config.default_image_width = px;
        self
    }

    pub fn write_output(mut self, v: bool) -> Self {
        self.config.write_output = v;
        self
    }

    pub fn template_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.template_dir = Some(dir.into());
        self
    }

    pub fn plugin_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.plugin_dir = Some(dir.into());
        self
    }

    pub fn engine(mut self, engine: Arc<dyn TexEngine>) -> Self {
        self.config.engine = Some(engine);
        self
    }

    pub fn answer_box(mut self, parser: Arc<dyn AnswerBoxParser>) -> Self {
        self.config.answer_box = Some(parser);
        self
    }

    pub fn image_tools(mut self, tools: Arc<dyn ImageTools>) -> Self {
        self.config.image_tools = tools;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, Latex2EdxError> {
        let c = &self.config;
        if c.imdir.as_os_str().is_empty() {
            return Err(Latex2EdxError::InvalidConfig(
                "Image directory must not be empty".into(),
            ));
        }
        if c.raster_density == 0 {
            return Err(Latex2EdxError::InvalidConfig(
                "Raster density must be ≥ 1".into(),
            ));
        }
        if c.default_image_width == 0 {
            return Err(Latex2EdxError::InvalidConfig(
                "Default image width must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_course_layout() {
        let c = ConversionConfig::default();
        assert_eq!(c.imdir, PathBuf::from("static/images"));
        assert_eq!(c.imurl, "");
        assert_eq!(c.raster_density, 800);
        assert_eq!(c.default_image_width, 400);
        assert!(c.write_output);
        assert!(!c.add_wrap);
        assert!(c.engine.is_none());
    }

    #[test]
    fn builder_sets_fields() {
        let c = ConversionConfig::builder()
            .imdir("out/img")
            .imurl("img")
            .verbose(true)
            .graphics_root("/src/figs")
            .write_output(false)
            .build()
            .expect("valid config");
        assert_eq!(c.imdir, PathBuf::from("out/img"));
        assert_eq!(c.imurl, "img");
        assert!(c.verbose);
        assert_eq!(c.graphics_root, Some(PathBuf::from("/src/figs")));
        assert!(!c.write_output);
    }

    #[test]
    fn zero_density_rejected() {
        let err = ConversionConfig::builder()
            .raster_density(0)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("density"));
    }

    #[test]
    fn empty_imdir_rejected() {
        assert!(ConversionConfig::builder().imdir("").build().is_err());
    }

    #[test]
    fn debug_hides_trait_objects() {
        let dbg = format!("{:?}", ConversionConfig::default());
        assert!(dbg.contains("<dyn ImageTools>"));
        assert!(dbg.contains("imdir"));
    }
}
