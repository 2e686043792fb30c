//! External image tools: PDF page-count introspection and rasterisation.
//!
//! The resolver talks to these through [`ImageTools`] so a run can swap in
//! different binaries, or a fake in tests. [`ExternalTools`] shells out to
//! poppler's `pdfinfo` and ImageMagick's `convert`.

use crate::error::ToolError;
use crate::pipeline::command::run_capture;
use std::path::Path;
use std::process::Command;

/// PDF introspection and raster conversion used by the image resolver.
pub trait ImageTools: Send + Sync {
    /// Number of pages in `pdf`.
    fn page_count(&self, pdf: &Path) -> Result<usize, ToolError>;

    /// Render every page of `pdf` to PNG at `density` DPI, scaled to fit
    /// `dim`×`dim` pixels.
    ///
    /// `output` is the single-page target (`<stem>.png`); for multi-page
    /// documents the tool writes `<stem>-0.png`, `<stem>-1.png`, ….
    fn rasterize(&self, pdf: &Path, density: u32, dim: u32, output: &Path)
        -> Result<(), ToolError>;
}

/// [`ImageTools`] backed by the `pdfinfo` and `convert` command-line tools.
#[derive(Debug, Clone)]
pub struct ExternalTools {
    /// Page-count program. Default: `pdfinfo`.
    pub pdfinfo: String,
    /// Raster-conversion program. Default: `convert`.
    pub convert: String,
}

impl Default for ExternalTools {
    fn default() -> Self {
        Self {
            pdfinfo: "pdfinfo".to_string(),
            convert: "convert".to_string(),
        }
    }
}

impl ImageTools for ExternalTools {
    fn page_count(&self, pdf: &Path) -> Result<usize, ToolError> {
        let stdout = run_capture(Command::new(&self.pdfinfo).arg(pdf), None)?;
        parse_page_count(&stdout).ok_or_else(|| ToolError::BadOutput {
            program: self.pdfinfo.clone(),
            detail: "no 'Pages:' line".to_string(),
        })
    }

    fn rasterize(
        &self,
        pdf: &Path,
        density: u32,
        dim: u32,
        output: &Path,
    ) -> Result<(), ToolError> {
        run_capture(
            Command::new(&self.convert)
                .arg("-density")
                .arg(density.to_string())
                .arg(pdf)
                .arg("-scale")
                .arg(format!("{dim}x{dim}"))
                .arg(output),
            None,
        )?;
        Ok(())
    }
}

/// Extract the page count from `pdfinfo` output.
pub fn parse_page_count(pdfinfo_output: &str) -> Option<usize> {
    pdfinfo_output
        .lines()
        .find_map(|line| line.strip_prefix("Pages:"))
        .and_then(|rest| rest.trim().parse().ok())
}
