//! Post-processing: deterministic cleanup around the filter rules.
//!
//! ## Why is post-processing necessary?
//!
//! The TeX engine's XHTML is an approximation of what the course platform
//! accepts:
//!
//! - typographic quotes and dashes leak through from the source
//! - `&nbsp;` is an HTML entity that plain XML parsers reject
//! - the output is a full faux-HTML page when only the body matters
//!
//! These passes are plain string rewrites with no shared state, so each is
//! independently testable.
//!
//! ## Stage Order
//!
//! [`fix_unicode`] runs before any filter rule (so math spans never see the
//! typographic glyphs); [`normalize_structure`], [`extract_body`], and
//! [`wrap_document`] run after all rules, in that order.

use crate::error::Latex2EdxError;
use tracing::trace;

/// Root element opening the final document.
pub const XML_HEADER: &str = "<document>";
/// Root element closing the final document.
pub const XML_TRAILER: &str = "</document>";

/// Typographic glyphs the engine passes through, with their ASCII stand-ins.
const UNICODE_FIXES: [(char, &str); 4] = [
    ('\u{201D}', "\""),
    ('\u{2014}', "-"),
    ('\u{2013}', "-"),
    ('\u{2019}', "'"),
];

// ── Stage 1: Unicode cleanup ─────────────────────────────────────────────────

/// Replace right double quote, em/en dashes and right single quote with ASCII.
pub fn fix_unicode(input: &str) -> String {
    let mut s = input.to_string();
    for (glyph, ascii) in UNICODE_FIXES {
        if s.contains(glyph) {
            trace!("fix unicode: U+{:04X} -> {:?}", glyph as u32, ascii);
            s = s.replace(glyph, ascii);
        }
    }
    s
}

// ── Stage 3: Structural normalisation ────────────────────────────────────────

/// Newline after `<p>`, newline before `<li>`, `&nbsp;` → `&#160;`.
pub fn normalize_structure(input: &str) -> String {
    input
        .replace("<p>", "<p>\n")
        .replace("<li>", "\n<li>")
        .replace("&nbsp;", "&#160;")
}

// ── Stage 4: Body extraction ─────────────────────────────────────────────────

/// Slice between the first `<body>` and the first `</body>`.
pub fn extract_body(input: &str) -> Result<&str, Latex2EdxError> {
    const OPEN: &str = "<body>";
    const CLOSE: &str = "</body>";

    let start = input
        .find(OPEN)
        .ok_or(Latex2EdxError::MissingBody { tag: OPEN })?
        + OPEN.len();
    let end = input
        .find(CLOSE)
        .ok_or(Latex2EdxError::MissingBody { tag: CLOSE })?;
    // a close tag before the open one yields an empty body
    Ok(input.get(start..end).unwrap_or(""))
}

// ── Stage 5: Root wrapping ───────────────────────────────────────────────────

pub fn wrap_document(body: &str) -> String {
    let mut doc = String::with_capacity(body.len() + XML_HEADER.len() + XML_TRAILER.len());
    doc.push_str(XML_HEADER);
    doc.push_str(body);
    doc.push_str(XML_TRAILER);
    doc
}

// ── Tests ────────────────────────────────────────────────────────────────────
