//! Image materialisation: resolve `<includegraphics>` directives to assets.
//!
//! For each directive the resolver:
//!
//! 1. Derives a pixel width from the style attribute (`width=2in`,
//!    `width=3cm`, `width=0.5\textwidth`; 400 px when absent or zero).
//! 2. Looks for the base path on disk with the suffixes
//!    `""`, `.png`, `.pdf`, `.png`, `.jpg`, in that order.
//! 3. PDFs are rasterised to PNG (one file per page) unless every page
//!    render is already on disk; other formats are used as-is.
//! 4. Each resulting file is copied into the asset directory, made
//!    world-readable, and referenced as `/static/<imurl>/<file>`.
//!
//! A directive that matches no file yields `<img src="NOTFOUND-<base>" />`
//! and a diagnostic; it never aborts the document.

use crate::error::{ImageDiagnostic, ImageError};
use crate::output::PublishedImage;
use crate::pipeline::tools::ImageTools;
use once_cell::sync::Lazy;
use regex::Regex;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Pixels per inch in the target course layout.
const PX_PER_INCH: f64 = 110.0;
/// `\textwidth` measured in inches.
const TEXTWIDTH_INCHES: f64 = 6.0;
/// PDF renders are never scaled below this many pixels.
const MIN_RASTER_DIM: u32 = 400;
/// Candidate suffixes, tried in order. `.png` appears twice on purpose.
const SUFFIXES: [&str; 5] = ["", ".png", ".pdf", ".png", ".jpg"];

static RE_WIDTH: Lazy<Regex> = Lazy::new(|| Regex::new(r"width=([0-9.]+)(.*)").unwrap());

/// Compute the target pixel width for a directive's style attribute.
///
/// `in` multiplies by 110 and `cm` converts through inches; any unit
/// containing `extwidth` is additionally scaled by a six-inch text width.
/// Missing, unparsable, or zero widths fall back to `default_width`.
pub fn parse_width(style: &str, default_width: u32) -> u32 {
    let Some(caps) = RE_WIDTH.captures(style) else {
        return default_width;
    };
    let Ok(mut width) = caps[1].parse::<f64>() else {
        warn!("Unparsable image width '{}' in style '{}'", &caps[1], style);
        return default_width;
    };
    let unit = &caps[2];
    if unit.contains("in") {
        width *= PX_PER_INCH;
    } else if unit.contains("cm") {
        width = width / 2.54 * PX_PER_INCH;
    }
    if unit.contains("extwidth") {
        width *= PX_PER_INCH * TEXTWIDTH_INCHES;
    }
    match width.round() as u32 {
        0 => default_width,
        px => px,
    }
}

/// Resolves image directives for one conversion run.
pub struct ImageResolver {
    imdir: PathBuf,
    imurl: String,
    graphics_root: Option<PathBuf>,
    raster_density: u32,
    default_width: u32,
    tools: Arc<dyn ImageTools>,
    published: Vec<PublishedImage>,
    diagnostics: Vec<ImageDiagnostic>,
}

impl ImageResolver {
    pub fn new(imdir: impl Into<PathBuf>, imurl: impl Into<String>, tools: Arc<dyn ImageTools>) -> Self {
        Self {
            imdir: imdir.into(),
            imurl: imurl.into(),
            graphics_root: None,
            raster_density: 800,
            default_width: 400,
            tools,
            published: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Resolve relative base paths against `root` instead of the working directory.
    pub fn with_graphics_root(mut self, root: Option<PathBuf>) -> Self {
        self.graphics_root = root;
        self
    }

    pub fn with_raster_density(mut self, density: u32) -> Self {
        self.raster_density = density;
        self
    }

    pub fn with_default_width(mut self, px: u32) -> Self {
        self.default_width = px;
        self
    }

    /// Images copied so far, in emission order.
    pub fn published(&self) -> &[PublishedImage] {
        &self.published
    }

    /// Non-fatal problems found so far.
    pub fn diagnostics(&self) -> &[ImageDiagnostic] {
        &self.diagnostics
    }

    /// Hand over everything recorded so far, leaving the resolver empty.
    pub fn take_results(&mut self) -> (Vec<PublishedImage>, Vec<ImageDiagnostic>) {
        (
            std::mem::take(&mut self.published),
            std::mem::take(&mut self.diagnostics),
        )
    }

    /// Resolve one directive to `<img>` markup.
    ///
    /// Returns the concatenated references (one per PDF page), or a
    /// `NOTFOUND-` reference when no candidate file exists.
    pub fn resolve(&mut self, style: &str, base: &str) -> Result<String, ImageError> {
        debug!("[do_image] style={:?} base={:?}", style, base);
        let width = parse_width(style, self.default_width);
        let base_path = match &self.graphics_root {
            Some(root) => root.join(base),
            None => PathBuf::from(base),
        };

        for suffix in SUFFIXES {
            let candidate = with_suffix(&base_path, suffix);
            // directories and other non-files never count as a match
            if !candidate.is_file() {
                continue;
            }
            if is_pdf(&candidate) {
                return self.resolve_pdf(&candidate, width);
            }
            return self.publish(&candidate, width);
        }

        warn!("Cannot find image file {}", base);
        self.diagnostics.push(ImageDiagnostic::NotFound {
            base: base.to_string(),
        });
        Ok(format!(r#"<img src="NOTFOUND-{base}" />"#))
    }

    /// Rasterise a PDF (unless cached) and publish one PNG per page.
    fn resolve_pdf(&mut self, pdf: &Path, width: u32) -> Result<String, ImageError> {
        let stem = pdf.with_extension("");
        let pages = match self.tools.page_count(pdf) {
            Ok(n) => n.max(1),
            Err(e) => {
                warn!("Page count for {} failed ({}); assuming 1", pdf.display(), e);
                self.diagnostics.push(ImageDiagnostic::PageCountFallback {
                    pdf: pdf.to_path_buf(),
                    detail: e.to_string(),
                });
                1
            }
        };

        let page_pngs: Vec<PathBuf> = if pages > 1 {
            (0..pages)
                .map(|i| with_suffix(&stem, &format!("-{i}.png")))
                .collect()
        } else {
            vec![with_suffix(&stem, ".png")]
        };

        let cached = page_pngs.iter().filter(|p| p.exists()).count();
        debug!(
            "--> {} page PDF {} ({} of {} renders cached)",
            pages,
            pdf.display(),
            cached,
            pages
        );
        if cached != pages {
            let dim = width.max(MIN_RASTER_DIM);
            self.tools
                .rasterize(pdf, self.raster_density, dim, &with_suffix(&stem, ".png"))
                .map_err(|e| ImageError::RasterizeFailed {
                    pdf: pdf.to_path_buf(),
                    source: e,
                })?;
        }

        let mut html = String::new();
        for png in &page_pngs {
            html.push_str(&self.publish(png, width)?);
        }
        Ok(html)
    }

    /// Copy `src` into the asset directory and return its `<img>` reference.
    ///
    /// The copy is skipped when an identical file is already there.
    fn publish(&mut self, src: &Path, width: u32) -> Result<String, ImageError> {
        let file_name = src
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let dest = self.imdir.join(&file_name);

        fs::create_dir_all(&self.imdir).map_err(|e| ImageError::CreateDirFailed {
            path: self.imdir.clone(),
            source: e,
        })?;

        if same_contents(src, &dest) {
            debug!("{} already published", dest.display());
        } else {
            fs::copy(src, &dest).map_err(|e| ImageError::CopyFailed {
                from: src.to_path_buf(),
                to: dest.clone(),
                source: e,
            })?;
            info!("cp {} {}", src.display(), dest.display());
        }
        make_world_readable(&dest)?;

        let url = format!("/static/{}/{}", self.imurl, file_name);
        let html = format!(r#"<img src="{url}" width="{width}" />"#);
        self.published.push(PublishedImage {
            source: src.to_path_buf(),
            dest,
            url,
            width,
        });
        Ok(html)
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut s: OsString = path.as_os_str().to_owned();
    s.push(suffix);
    PathBuf::from(s)
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

fn same_contents(a: &Path, b: &Path) -> bool {
    match (fs::metadata(a), fs::metadata(b)) {
        (Ok(x), Ok(y)) if x.len() == y.len() => {}
        _ => return false,
    }
    match (fs::read(a), fs::read(b)) {
        (Ok(x), Ok(y)) => x == y,
        _ => false,
    }
}

#[cfg(unix)]
fn make_world_readable(path: &Path) -> Result<(), ImageError> {
    use std::os::unix::fs::PermissionsExt;

    let err = |e| ImageError::PermissionFailed {
        path: path.to_path_buf(),
        source: e,
    };
    let mut perms = fs::metadata(path).map_err(err)?.permissions();
    // og+r
    perms.set_mode(perms.mode() | 0o044);
    fs::set_permissions(path, perms).map_err(err)
}

#[cfg(not(unix))]
fn make_world_readable(_path: &Path) -> Result<(), ImageError> {
    Ok(())
}
