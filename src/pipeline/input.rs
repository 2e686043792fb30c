//! Source acquisition: obtain the LaTeX text from a literal, a reader, or a path.
//!
//! ## Precedence
//!
//! A literal string wins over a reader, which wins over the path. The path
//! is still kept when a literal or reader is used, since it names the
//! output file and the engine's output stem.
//!
//! Text read from a file or reader has every `\r` turned into `\n` so the
//! engine sees Unix line endings; a literal is used verbatim.

use crate::error::Latex2EdxError;
use std::fmt;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Preamble injected when the source is a body fragment.
pub const PREAMBLE: &str =
    "\\documentclass[12pt]{article}\n\\usepackage{edXpsl}\n\n\\begin{document}\n\n";
/// Postamble injected when the source is a body fragment.
pub const POSTAMBLE: &str = "\n\n\\end{document}";

/// Where the LaTeX source comes from.
pub struct DocumentSource {
    path: PathBuf,
    reader: Option<Box<dyn Read + Send>>,
    literal: Option<String>,
}

impl DocumentSource {
    /// Source read from `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            reader: None,
            literal: None,
        }
    }

    /// Literal LaTeX with no backing file. The path names the output only.
    pub fn from_literal(path: impl Into<PathBuf>, latex: impl Into<String>) -> Self {
        Self::new(path).with_literal(latex)
    }

    pub fn with_reader(mut self, reader: Box<dyn Read + Send>) -> Self {
        self.reader = Some(reader);
        self
    }

    pub fn with_literal(mut self, latex: impl Into<String>) -> Self {
        self.literal = Some(latex.into());
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File stem used as the engine's output name.
    pub fn output_name(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Read the LaTeX text, consuming any reader.
    pub fn acquire(&mut self) -> Result<String, Latex2EdxError> {
        if let Some(latex) = self.literal.take() {
            debug!("Using literal LaTeX source ({} bytes)", latex.len());
            return Ok(latex);
        }

        let text = if let Some(mut reader) = self.reader.take() {
            let mut buf = String::new();
            reader
                .read_to_string(&mut buf)
                .map_err(|e| Latex2EdxError::SourceReadFailed {
                    path: self.path.clone(),
                    source: e,
                })?;
            debug!("Read {} bytes from reader", buf.len());
            buf
        } else {
            read_path(&self.path)?
        };

        Ok(text.replace('\r', "\n"))
    }
}

impl From<PathBuf> for DocumentSource {
    fn from(path: PathBuf) -> Self {
        Self::new(path)
    }
}

impl From<&Path> for DocumentSource {
    fn from(path: &Path) -> Self {
        Self::new(path)
    }
}

impl fmt::Debug for DocumentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentSource")
            .field("path", &self.path)
            .field("reader", &self.reader.as_ref().map(|_| "<reader>"))
            .field("literal", &self.literal.as_ref().map(String::len))
            .finish()
    }
}

fn read_path(path: &Path) -> Result<String, Latex2EdxError> {
    match std::fs::read_to_string(path) {
        Ok(text) => {
            debug!("Read LaTeX source: {}", path.display());
            Ok(text)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Err(Latex2EdxError::SourceNotFound {
            path: path.to_path_buf(),
        }),
        Err(e) if e.kind() == ErrorKind::PermissionDenied => {
            Err(Latex2EdxError::PermissionDenied {
                path: path.to_path_buf(),
            })
        }
        Err(e) => Err(Latex2EdxError::SourceReadFailed {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Surround a body fragment with [`PREAMBLE`] and [`POSTAMBLE`].
pub fn wrap_fragment(latex: &str) -> String {
    format!("{PREAMBLE}{latex}{POSTAMBLE}")
}

/// `<name>.tex` → `<name>.xhtml`; anything else gets `.xhtml` appended.
pub fn output_path_for(path: &Path) -> PathBuf {
    if path.extension().is_some_and(|e| e == "tex") {
        path.with_extension("xhtml")
    } else {
        let mut name = path.as_os_str().to_os_string();
        name.push(".xhtml");
        PathBuf::from(name)
    }
}
