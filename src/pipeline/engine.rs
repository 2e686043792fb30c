//! TeX engine boundary.
//!
//! Parsing LaTeX and walking the document tree to emit XHTML happens outside
//! this crate. The engine is called once per conversion with the full LaTeX
//! text and returns the rendered markup as a string; the filter chain runs
//! afterwards as a separate phase.
//!
//! Template and plugin directories are handed to the engine explicitly
//! through [`EngineOptions`]. [`CommandEngine`] exposes them to its child
//! process only, never to the current process.

use crate::error::BoxError;
use crate::pipeline::command::run_capture;
use std::path::PathBuf;
use std::process::Command;
use tracing::debug;

/// Per-run settings forwarded to the engine.
#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    /// Stem used for the engine's own output naming (e.g. `lecture1`).
    pub output_name: String,
    /// Let the engine log on its own.
    pub verbose: bool,
    pub template_dir: Option<PathBuf>,
    pub plugin_dir: Option<PathBuf>,
}

/// Parses LaTeX and renders it to XHTML-like markup.
pub trait TexEngine: Send + Sync {
    fn render(&self, latex: &str, opts: &EngineOptions) -> Result<String, BoxError>;
}

impl<F> TexEngine for F
where
    F: Fn(&str, &EngineOptions) -> Result<String, BoxError> + Send + Sync,
{
    fn render(&self, latex: &str, opts: &EngineOptions) -> Result<String, BoxError> {
        self(latex, opts)
    }
}

/// [`TexEngine`] backed by an external program: LaTeX on stdin, markup on
/// stdout.
///
/// The child receives `XHTMLTEMPLATES` (template directory),
/// `PYTHONPATH` (plugin directory), `LATEX2EDX_OUTPUT_NAME` and, when
/// verbose, `LATEX2EDX_VERBOSE=1`.
#[derive(Debug, Clone)]
pub struct CommandEngine {
    program: String,
    args: Vec<String>,
}

impl CommandEngine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn command(&self, opts: &EngineOptions) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .env("LATEX2EDX_OUTPUT_NAME", &opts.output_name);
        if let Some(dir) = &opts.template_dir {
            cmd.env("XHTMLTEMPLATES", dir);
        }
        if let Some(dir) = &opts.plugin_dir {
            cmd.env("PYTHONPATH", dir);
        }
        if opts.verbose {
            cmd.env("LATEX2EDX_VERBOSE", "1");
        }
        cmd
    }
}

impl TexEngine for CommandEngine {
    fn render(&self, latex: &str, opts: &EngineOptions) -> Result<String, BoxError> {
        debug!(
            "Running engine '{}' on {} bytes of LaTeX",
            self.program,
            latex.len()
        );
        Ok(run_capture(&mut self.command(opts), Some(latex))?)
    }
}
