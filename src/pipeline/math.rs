//! Math normalisation: turn an engine-rendered math span into a MathJax token.
//!
//! The engine leaves TeX source inside `<math>`/`<displaymath>` elements,
//! still carrying escaping artefacts and a few of its own markers. The edX
//! renderer wants a single line of plain TeX between `[mathjaxinline]` or
//! `[mathjax]` tags, XML-escaped so it survives inside the document.

use quick_xml::escape::partial_escape;

/// Output for a math span with no renderable content.
pub const NBSP: &str = "&nbsp;";

/// Inline (`$…$`) or display (equation-style) math.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathMode {
    Inline,
    Display,
}

impl MathMode {
    fn tags(self) -> (&'static str, &'static str) {
        match self {
            MathMode::Inline => ("[mathjaxinline]", "[/mathjaxinline]"),
            MathMode::Display => ("[mathjax]", "[/mathjax]"),
        }
    }
}

/// Normalise captured math text and wrap it for `mode`.
///
/// Empty spans and a lone `\displaystyle` become [`NBSP`] rather than an
/// empty MathJax invocation.
pub fn normalize(captured: &str, mode: MathMode) -> String {
    let body = clean_math(captured);
    if body.is_empty() || body == r"\displaystyle" {
        return NBSP.to_string();
    }
    let (open, close) = mode.tags();
    format!("{open}{body}{close}")
}

/// Strip engine artefacts and XML-escape the result.
fn clean_math(captured: &str) -> String {
    let x = captured.trim().replace('\u{2019}', "'");
    // MathJax input is ASCII TeX; anything else is engine residue.
    let x: String = x.chars().filter(char::is_ascii).collect();
    let x = x
        .replace(r"\ensuremath", "")
        // engine drops the empty group before a degree superscript
        .replace(r"{^\circ", r"{}^\circ")
        .replace('\n', "");
    partial_escape(x.as_str()).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_wraps() {
        assert_eq!(
            normalize("x^2", MathMode::Inline),
            "[mathjaxinline]x^2[/mathjaxinline]"
        );
    }

    #[test]
    fn display_wraps() {
        assert_eq!(
            normalize(" E = mc^2 ", MathMode::Display),
            "[mathjax]E = mc^2[/mathjax]"
        );
    }

    #[test]
    fn empty_and_whitespace_become_nbsp() {
        assert_eq!(normalize("", MathMode::Inline), NBSP);
        assert_eq!(normalize("  \n\t ", MathMode::Inline), NBSP);
        assert_eq!(normalize("", MathMode::Display), NBSP);
    }

    #[test]
    fn lone_displaystyle_becomes_nbsp() {
        assert_eq!(normalize(r"\displaystyle", MathMode::Inline), NBSP);
        assert_eq!(normalize(r" \displaystyle ", MathMode::Display), NBSP);
    }

    #[test]
    fn ensuremath_marker_removed() {
        assert_eq!(
            normalize(r"\ensuremath{\alpha}", MathMode::Inline),
            r"[mathjaxinline]{\alpha}[/mathjaxinline]"
        );
    }

    #[test]
    fn degree_workaround() {
        assert_eq!(
            normalize(r"90{^\circ}", MathMode::Inline),
            r"[mathjaxinline]90{}^\circ}[/mathjaxinline]"
        );
    }

    #[test]
    fn newlines_removed() {
        assert_eq!(
            normalize("a +\nb", MathMode::Display),
            "[mathjax]a +b[/mathjax]"
        );
    }

    #[test]
    fn xml_special_chars_escaped() {
        assert_eq!(
            normalize("a < b & c > d", MathMode::Inline),
            "[mathjaxinline]a &lt; b &amp; c &gt; d[/mathjaxinline]"
        );
    }

    #[test]
    fn quotes_not_escaped() {
        assert_eq!(
            normalize("f'(x) = \"g\"", MathMode::Inline),
            "[mathjaxinline]f'(x) = \"g\"[/mathjaxinline]"
        );
    }

    #[test]
    fn right_quote_becomes_apostrophe_and_other_unicode_dropped() {
        assert_eq!(
            normalize("f\u{2019}(x) \u{00d7} 2", MathMode::Inline),
            "[mathjaxinline]f'(x)  2[/mathjaxinline]"
        );
    }
}
