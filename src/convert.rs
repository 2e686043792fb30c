//! Document Pipeline: source → engine → filter chain → final XML.
//!
//! The engine renders first and the filter chain runs afterwards as a
//! separate, directly callable phase ([`filter_markup`]). A
//! [`DocumentPipeline`] is single-use: once `convert` has been called it
//! refuses to run again.

use crate::config::ConversionConfig;
use crate::error::{ImageDiagnostic, Latex2EdxError};
use crate::output::{ConversionOutput, ConversionStats};
use crate::pipeline::engine::EngineOptions;
use crate::pipeline::filters::FilterChain;
use crate::pipeline::input::{self, DocumentSource};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

/// Where a [`DocumentPipeline`] is in its single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Uninitialized,
    SourceAcquired,
    /// Fragment wrapped in the minimal preamble/postamble.
    Wrapped,
    /// Engine output filtered; not yet persisted.
    Rendered,
    Final,
}

/// One conversion of one LaTeX source.
///
/// ```rust,no_run
/// use latex2edx::{CommandEngine, ConversionConfig, DocumentPipeline, DocumentSource};
/// use std::sync::Arc;
///
/// let config = ConversionConfig::builder()
///     .engine(Arc::new(CommandEngine::new("plastex-xhtml")))
///     .imurl("course_images")
///     .build()?;
/// let mut pipeline = DocumentPipeline::new(DocumentSource::new("lecture1.tex"), &config);
/// let output = pipeline.convert()?;
/// println!("{}", output.xml);
/// # Ok::<(), latex2edx::Latex2EdxError>(())
/// ```
#[derive(Debug)]
pub struct DocumentPipeline {
    source: DocumentSource,
    config: ConversionConfig,
    state: PipelineState,
    started: bool,
    output: Option<ConversionOutput>,
}

impl DocumentPipeline {
    pub fn new(source: impl Into<DocumentSource>, config: &ConversionConfig) -> Self {
        Self {
            source: source.into(),
            config: config.clone(),
            state: PipelineState::Uninitialized,
            started: false,
            output: None,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// The final document, once `convert` has succeeded.
    pub fn output(&self) -> Option<&ConversionOutput> {
        self.output.as_ref()
    }

    pub fn into_output(self) -> Option<ConversionOutput> {
        self.output
    }

    /// Run the conversion. Fails with [`Latex2EdxError::AlreadyConverted`]
    /// on any call after the first, including after a failed run.
    pub fn convert(&mut self) -> Result<&ConversionOutput, Latex2EdxError> {
        if self.started {
            return Err(Latex2EdxError::AlreadyConverted);
        }
        self.started = true;
        let output = self.execute()?;
        Ok(self.output.insert(output))
    }

    fn execute(&mut self) -> Result<ConversionOutput, Latex2EdxError> {
        let total_start = Instant::now();
        let config = &self.config;
        let source_name = self.source.path().display().to_string();
        info!("Converting LaTeX source: {}", source_name);

        // ── Step 1: Acquire source ───────────────────────────────────────
        let mut latex = self.source.acquire()?;
        self.state = PipelineState::SourceAcquired;
        if let Some(ref cb) = config.progress_callback {
            cb.on_conversion_start(&source_name);
        }

        // ── Step 2: Wrap fragment ────────────────────────────────────────
        if config.add_wrap {
            latex = input::wrap_fragment(&latex);
            self.state = PipelineState::Wrapped;
            debug!("Wrapped fragment in minimal preamble");
        }

        // ── Step 3: Engine parse + render ────────────────────────────────
        let engine = config
            .engine
            .as_ref()
            .ok_or(Latex2EdxError::EngineNotConfigured)?;
        let opts = EngineOptions {
            output_name: self.source.output_name(),
            verbose: config.verbose,
            template_dir: config.template_dir.clone(),
            plugin_dir: config.plugin_dir.clone(),
        };
        let engine_start = Instant::now();
        let markup = engine
            .render(&latex, &opts)
            .map_err(|e| Latex2EdxError::EngineFailed {
                path: self.source.path().to_path_buf(),
                source: e,
            })?;
        let engine_duration_ms = engine_start.elapsed().as_millis() as u64;
        debug!(
            "Engine returned {} bytes of markup in {}ms",
            markup.len(),
            engine_duration_ms
        );

        // ── Step 4: Filter chain ─────────────────────────────────────────
        let mut output = run_filters(&markup, config)?;
        self.state = PipelineState::Rendered;

        // ── Step 5: Persist ──────────────────────────────────────────────
        let output_path = input::output_path_for(self.source.path());
        if config.write_output {
            write_atomic(&output_path, &output.xml)?;
            output.output_path = Some(output_path.clone());
        }

        let lines = output.stats.xml_lines;
        info!("XHTML generated ({}): {} lines", output_path.display(), lines);

        output.stats.source_bytes = latex.len();
        output.stats.engine_duration_ms = engine_duration_ms;
        output.stats.total_duration_ms = total_start.elapsed().as_millis() as u64;

        if let Some(ref cb) = config.progress_callback {
            cb.on_conversion_complete(lines);
        }
        self.state = PipelineState::Final;
        Ok(output)
    }
}

/// Convert a LaTeX source to edX XML.
///
/// Requires [`ConversionConfig::engine`]. Writes the XML next to the source
/// (`.tex` → `.xhtml`) unless `write_output` is off.
///
/// # Errors
/// Fatal errors only: unreadable source, engine failure, a filter rule that
/// failed, missing `<body>`, or an output write failure. Missing images are
/// recorded in [`ConversionOutput::diagnostics`] instead.
pub fn convert(
    source: impl Into<DocumentSource>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Latex2EdxError> {
    DocumentPipeline::new(source, config).execute()
}

/// Convert and write the XML to `output_path` instead of the derived path.
///
/// Uses atomic write (temp file + rename) to prevent partial files.
pub fn convert_to_file(
    source: impl Into<DocumentSource>,
    output_path: impl AsRef<Path>,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Latex2EdxError> {
    let mut config = config.clone();
    config.write_output = false;
    let mut output = convert(source, &config)?;

    let path = output_path.as_ref();
    write_atomic(path, &output.xml)?;
    output.output_path = Some(path.to_path_buf());
    Ok(output)
}

/// Run only the filter chain over markup the engine already produced.
///
/// Never writes a file and needs no engine.
pub fn filter_markup(
    markup: &str,
    config: &ConversionConfig,
) -> Result<ConversionOutput, Latex2EdxError> {
    let total_start = Instant::now();
    if let Some(ref cb) = config.progress_callback {
        cb.on_conversion_start("<markup>");
    }
    let mut output = run_filters(markup, config)?;
    output.stats.total_duration_ms = total_start.elapsed().as_millis() as u64;
    if let Some(ref cb) = config.progress_callback {
        cb.on_conversion_complete(output.stats.xml_lines);
    }
    Ok(output)
}

// ── Internal helpers ─────────────────────────────────────────────────────

fn run_filters(markup: &str, config: &ConversionConfig) -> Result<ConversionOutput, Latex2EdxError> {
    let filter_start = Instant::now();
    let mut chain = FilterChain::from_config(config)?;
    let xml = chain.apply(markup)?;
    let (images, diagnostics) = chain.images_mut().take_results();

    let stats = ConversionStats {
        markup_bytes: markup.len(),
        xml_lines: xml.split('\n').count(),
        rule_matches: chain.take_rule_matches(),
        images_published: images.len(),
        images_missing: diagnostics
            .iter()
            .filter(|d| matches!(d, ImageDiagnostic::NotFound { .. }))
            .count(),
        filter_duration_ms: filter_start.elapsed().as_millis() as u64,
        ..Default::default()
    };

    Ok(ConversionOutput {
        xml,
        output_path: None,
        images,
        diagnostics,
        stats,
    })
}

/// Write `xml` to `path` through a temp file in the same directory and a
/// rename, creating parent directories as needed.
pub fn write_atomic(path: &Path, xml: &str) -> Result<(), Latex2EdxError> {
    let fail = |e: std::io::Error| Latex2EdxError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent).map_err(fail)?;

    let mut tmp = tempfile::NamedTempFile::new_in(&parent).map_err(fail)?;
    tmp.write_all(xml.as_bytes()).map_err(fail)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tmp.as_file()
            .set_permissions(std::fs::Permissions::from_mode(0o644))
            .map_err(fail)?;
    }
    tmp.persist(path).map_err(|e| fail(e.error))?;
    debug!("Wrote {} bytes to {}", xml.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoxError;
    use crate::pipeline::engine::TexEngine;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn echo_engine() -> Arc<dyn TexEngine> {
        Arc::new(|latex: &str, _: &EngineOptions| -> Result<String, BoxError> {
            Ok(format!("<html><body><p>{latex}</p></body></html>"))
        })
    }

    fn config(dir: &TempDir) -> ConversionConfig {
        ConversionConfig::builder()
            .imdir(dir.path().join("static"))
            .engine(echo_engine())
            .write_output(false)
            .build()
            .unwrap()
    }

    #[test]
    fn pipeline_walks_states() {
        let dir = TempDir::new().unwrap();
        let mut pipeline = DocumentPipeline::new(
            DocumentSource::from_literal(dir.path().join("a.tex"), "hello"),
            &config(&dir),
        );
        assert_eq!(pipeline.state(), PipelineState::Uninitialized);
        let xml = pipeline.convert().unwrap().xml.clone();
        assert_eq!(xml, "<document><p>\nhello</p></document>");
        assert_eq!(pipeline.state(), PipelineState::Final);
        assert!(pipeline.output().is_some());
    }

    #[test]
    fn second_convert_rejected() {
        let dir = TempDir::new().unwrap();
        let mut pipeline = DocumentPipeline::new(
            DocumentSource::from_literal(dir.path().join("a.tex"), "x"),
            &config(&dir),
        );
        pipeline.convert().unwrap();
        assert!(matches!(
            pipeline.convert().unwrap_err(),
            Latex2EdxError::AlreadyConverted
        ));
    }

    #[test]
    fn failed_run_is_not_retried() {
        let dir = TempDir::new().unwrap();
        let mut pipeline = DocumentPipeline::new(dir.path().join("missing.tex"), &config(&dir));
        assert!(matches!(
            pipeline.convert().unwrap_err(),
            Latex2EdxError::SourceNotFound { .. }
        ));
        assert!(matches!(
            pipeline.convert().unwrap_err(),
            Latex2EdxError::AlreadyConverted
        ));
    }

    #[test]
    fn failed_reader_is_not_retried_from_path() {
        struct BrokenReader;
        impl std::io::Read for BrokenReader {
            fn read(&mut self, _: &mut [u8]) -> std::io::Result<usize> {
                Err(std::io::Error::other("device gone"))
            }
        }

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.tex");
        std::fs::write(&path, "from path").unwrap();
        let source = DocumentSource::new(&path).with_reader(Box::new(BrokenReader));
        let mut pipeline = DocumentPipeline::new(source, &config(&dir));

        assert!(matches!(
            pipeline.convert().unwrap_err(),
            Latex2EdxError::SourceReadFailed { .. }
        ));
        assert_eq!(pipeline.state(), PipelineState::Uninitialized);
        assert!(matches!(
            pipeline.convert().unwrap_err(),
            Latex2EdxError::AlreadyConverted
        ));
        assert!(pipeline.output().is_none());
    }

    #[test]
    fn write_atomic_creates_parents() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("a/b/out.xhtml");
        write_atomic(&target, "<document/>").unwrap();
        assert_eq!(std::fs::read_to_string(&target).unwrap(), "<document/>");
        let leftovers: Vec<_> = std::fs::read_dir(target.parent().unwrap())
            .unwrap()
            .collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn missing_engine_is_reported() {
        let dir = TempDir::new().unwrap();
        let cfg = ConversionConfig::builder().write_output(false).build().unwrap();
        let err = convert(DocumentSource::from_literal(dir.path().join("a.tex"), "x"), &cfg)
            .unwrap_err();
        assert!(matches!(err, Latex2EdxError::EngineNotConfigured));
    }

    #[test]
    fn engine_failure_carries_path() {
        let dir = TempDir::new().unwrap();
        let failing: Arc<dyn TexEngine> =
            Arc::new(|_: &str, _: &EngineOptions| -> Result<String, BoxError> {
                Err("undefined control sequence".into())
            });
        let mut cfg = config(&dir);
        cfg.engine = Some(failing);
        let err = convert(DocumentSource::from_literal("lec.tex", "x"), &cfg).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("lec.tex"));
        assert!(msg.contains("undefined control sequence"));
    }

    #[test]
    fn writes_derived_output_path() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("lec.tex");
        std::fs::write(&src, "body").unwrap();
        let mut cfg = config(&dir);
        cfg.write_output = true;
        let out = convert(src.as_path(), &cfg).unwrap();
        let expected = dir.path().join("lec.xhtml");
        assert_eq!(out.output_path.as_deref(), Some(expected.as_path()));
        assert_eq!(std::fs::read_to_string(expected).unwrap(), out.xml);
    }

    #[test]
    fn convert_to_file_uses_given_path() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("out/nested.xml");
        let out = convert_to_file(
            DocumentSource::from_literal(dir.path().join("lec.tex"), "y"),
            &target,
            &config(&dir),
        )
        .unwrap();
        assert_eq!(std::fs::read_to_string(&target).unwrap(), out.xml);
        assert!(!dir.path().join("lec.xhtml").exists());
    }

    #[test]
    fn filter_markup_skips_engine() {
        let dir = TempDir::new().unwrap();
        let cfg = ConversionConfig::builder()
            .imdir(dir.path().join("static"))
            .build()
            .unwrap();
        let out = filter_markup("<body><math>$a$</math></body>", &cfg).unwrap();
        assert_eq!(out.xml, "<document>[mathjaxinline]a[/mathjaxinline]</document>");
        assert_eq!(out.stats.xml_lines, 1);
        assert!(out.output_path.is_none());
    }
}
