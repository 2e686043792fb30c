//! The filter chain: ordered (pattern, transform) rules over rendered markup.
//!
//! ## Rule Order
//!
//! Built-in rules run first, in this order, then caller rules in the order
//! they were supplied:
//!
//! | Rule | Matches |
//! |------|---------|
//! | `inline-math-dollar`     | `<math>$…$</math>` |
//! | `inline-math-ensuremath` | `<math>\ensuremath{…}</math>` |
//! | `display-math-equation`  | `<math>\begin{equation}…\end{equation}</math>` |
//! | `display-math-edxmath`   | `<displaymath>\begin{edXmath}…\end{edXmath}</displaymath>` |
//! | `display-math-bracket`   | `<math>\[…\]</math>` |
//! | `answer-box`             | `<abox>…</abox>` |
//! | `image`                  | `<includegraphics style="…">…</includegraphics>` |
//! | `raw-xml`                | `<edxxml>\edXxml{…}</edxxml>` |
//!
//! `raw-xml` must come after the math rules: it unescapes `\$`, and the
//! resulting `$` must not be picked up as an inline math delimiter.
//!
//! Each rule sees the whole document (patterns are dot-matches-newline where
//! spans can wrap), and each pattern matches only the engine's source shape,
//! never the rule's own output, so re-running the rules on filtered text
//! leaves it unchanged.
//!
//! A caller rule whose pattern is textually identical to a built-in pattern
//! replaces that built-in's transform but keeps its position.

use crate::config::ConversionConfig;
use crate::error::{BoxError, Latex2EdxError};
use crate::output::RuleMatches;
use crate::pipeline::abox::{self, AnswerBoxParser};
use crate::pipeline::images::ImageResolver;
use crate::pipeline::math::{self, MathMode};
use crate::pipeline::postprocess;
use crate::progress::ProgressCallback;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error};

/// A caller-supplied transform: receives the match, returns its replacement.
pub type Transform = Arc<dyn Fn(&Captures<'_>) -> Result<String, BoxError> + Send + Sync>;

// ── Built-in patterns ────────────────────────────────────────────────────────

static RE_INLINE_DOLLAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<math>\$(.*?)\$</math>").unwrap());
static RE_INLINE_ENSUREMATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<math>\\ensuremath\{(.*?)\}</math>").unwrap());
static RE_DISPLAY_EQUATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<math>\\begin\{equation\}(.*?)\\end\{equation\}</math>").unwrap()
});
static RE_DISPLAY_EDXMATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<displaymath>\\begin\{edXmath\}(.*?)\\end\{edXmath\}</displaymath>").unwrap()
});
static RE_DISPLAY_BRACKET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<math>\\\[(.*?)\\\]</math>").unwrap());
static RE_ABOX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<abox>(.*?)</abox>").unwrap());
static RE_IMAGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<includegraphics style="(.*?)">(.*?)</includegraphics>"#).unwrap()
});
static RE_EDXXML: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<edxxml>\\edXxml\{(.*?)\}</edxxml>").unwrap());

// ── Rule types ───────────────────────────────────────────────────────────────

/// Where a rule came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleOrigin {
    BuiltIn,
    Caller,
}

#[derive(Clone)]
enum RuleAction {
    Math(MathMode),
    AnswerBox,
    Image,
    RawXml,
    Custom(Transform),
}

/// One (pattern, transform) rule in the chain.
#[derive(Clone)]
pub struct FilterRule {
    name: String,
    pattern: Regex,
    action: RuleAction,
    origin: RuleOrigin,
}

impl FilterRule {
    fn builtin(name: &str, pattern: &Lazy<Regex>, action: RuleAction) -> Self {
        Self {
            name: name.to_string(),
            pattern: Regex::clone(pattern),
            action,
            origin: RuleOrigin::BuiltIn,
        }
    }

    /// Identity used in logs and errors.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn origin(&self) -> RuleOrigin {
        self.origin
    }
}

impl fmt::Debug for FilterRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterRule")
            .field("name", &self.name)
            .field("pattern", &self.pattern.as_str())
            .field("origin", &self.origin)
            .finish()
    }
}

/// A rule supplied by the caller through [`ConversionConfig::extra_filters`].
#[derive(Clone)]
pub struct ExtraFilter {
    pattern: String,
    transform: Transform,
}

impl ExtraFilter {
    /// Rule with an arbitrary transform.
    ///
    /// ```rust
    /// use latex2edx::ExtraFilter;
    ///
    /// let f = ExtraFilter::new(r"<hint>(.*?)</hint>", |caps| {
    ///     Ok(format!("<hint><p>{}</p></hint>", &caps[1]))
    /// });
    /// assert_eq!(f.pattern(), r"<hint>(.*?)</hint>");
    /// ```
    pub fn new<F>(pattern: impl Into<String>, transform: F) -> Self
    where
        F: Fn(&Captures<'_>) -> Result<String, BoxError> + Send + Sync + 'static,
    {
        Self {
            pattern: pattern.into(),
            transform: Arc::new(transform),
        }
    }

    /// Rule that replaces each match with `template`, expanding `$1`, `${name}`.
    pub fn replace(pattern: impl Into<String>, template: impl Into<String>) -> Self {
        let template = template.into();
        Self::new(pattern, move |caps| {
            let mut out = String::new();
            caps.expand(&template, &mut out);
            Ok(out)
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }
}

impl fmt::Debug for ExtraFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtraFilter")
            .field("pattern", &self.pattern)
            .finish_non_exhaustive()
    }
}

fn builtin_rules() -> Vec<FilterRule> {
    vec![
        FilterRule::builtin(
            "inline-math-dollar",
            &RE_INLINE_DOLLAR,
            RuleAction::Math(MathMode::Inline),
        ),
        FilterRule::builtin(
            "inline-math-ensuremath",
            &RE_INLINE_ENSUREMATH,
            RuleAction::Math(MathMode::Inline),
        ),
        FilterRule::builtin(
            "display-math-equation",
            &RE_DISPLAY_EQUATION,
            RuleAction::Math(MathMode::Display),
        ),
        FilterRule::builtin(
            "display-math-edxmath",
            &RE_DISPLAY_EDXMATH,
            RuleAction::Math(MathMode::Display),
        ),
        FilterRule::builtin(
            "display-math-bracket",
            &RE_DISPLAY_BRACKET,
            RuleAction::Math(MathMode::Display),
        ),
        FilterRule::builtin("answer-box", &RE_ABOX, RuleAction::AnswerBox),
        FilterRule::builtin("image", &RE_IMAGE, RuleAction::Image),
        FilterRule::builtin("raw-xml", &RE_EDXXML, RuleAction::RawXml),
    ]
}

// ── Chain ────────────────────────────────────────────────────────────────────

/// Ordered filter rules plus the collaborators their transforms call into.
pub struct FilterChain {
    rules: Vec<FilterRule>,
    images: ImageResolver,
    answer_box: Option<Arc<dyn AnswerBoxParser>>,
    progress: Option<ProgressCallback>,
    rule_matches: Vec<RuleMatches>,
}

impl FilterChain {
    /// Build the built-in chain and append `extra` rules.
    pub fn new(
        images: ImageResolver,
        answer_box: Option<Arc<dyn AnswerBoxParser>>,
        extra: &[ExtraFilter],
    ) -> Result<Self, Latex2EdxError> {
        let mut rules = builtin_rules();
        for filter in extra {
            let action = RuleAction::Custom(Arc::clone(&filter.transform));
            if let Some(existing) = rules
                .iter_mut()
                .find(|r| r.pattern.as_str() == filter.pattern)
            {
                debug!("Caller rule overrides '{}'", existing.name);
                existing.action = action;
                existing.origin = RuleOrigin::Caller;
                continue;
            }
            let pattern =
                Regex::new(&filter.pattern).map_err(|e| Latex2EdxError::InvalidFilterPattern {
                    pattern: filter.pattern.clone(),
                    source: e,
                })?;
            rules.push(FilterRule {
                name: filter.pattern.clone(),
                pattern,
                action,
                origin: RuleOrigin::Caller,
            });
        }

        Ok(Self {
            rules,
            images,
            answer_box,
            progress: None,
            rule_matches: Vec::new(),
        })
    }

    /// Build a chain from a conversion config.
    pub fn from_config(config: &ConversionConfig) -> Result<Self, Latex2EdxError> {
        let images = ImageResolver::new(
            config.imdir.clone(),
            config.imurl.clone(),
            Arc::clone(&config.image_tools),
        )
        .with_graphics_root(config.graphics_root.clone())
        .with_raster_density(config.raster_density)
        .with_default_width(config.default_image_width);

        Ok(Self::new(images, config.answer_box.clone(), &config.extra_filters)?
            .with_progress(config.progress_callback.clone()))
    }

    pub fn with_progress(mut self, cb: Option<ProgressCallback>) -> Self {
        self.progress = cb;
        self
    }

    /// Rules in execution order.
    pub fn rules(&self) -> &[FilterRule] {
        &self.rules
    }

    pub fn images(&self) -> &ImageResolver {
        &self.images
    }

    pub fn images_mut(&mut self) -> &mut ImageResolver {
        &mut self.images
    }

    /// Match counts recorded by [`Self::apply_rules`], leaving the record empty.
    pub fn take_rule_matches(&mut self) -> Vec<RuleMatches> {
        std::mem::take(&mut self.rule_matches)
    }

    /// Turn raw engine markup into the final `<document>` XML.
    ///
    /// Runs, in order: unicode cleanup, every rule, structural
    /// normalisation, body extraction, root wrapping.
    pub fn apply(&mut self, raw: &str) -> Result<String, Latex2EdxError> {
        let text = postprocess::fix_unicode(raw);
        let text = self.apply_rules(&text)?;
        let text = postprocess::normalize_structure(&text);
        let body = postprocess::extract_body(&text)?;
        Ok(postprocess::wrap_document(body))
    }

    /// Run every rule, in order, over the whole of `text`.
    ///
    /// The first transform that fails aborts the chain with
    /// [`Latex2EdxError::FilterFailed`] naming the rule.
    pub fn apply_rules(&mut self, text: &str) -> Result<String, Latex2EdxError> {
        let Self {
            rules,
            images,
            answer_box,
            progress,
            rule_matches,
        } = self;

        let mut text = text.to_string();
        for rule in rules.iter() {
            let result = try_replace_all(&rule.pattern, &text, |caps| match &rule.action {
                RuleAction::Math(mode) => Ok(math::normalize(group(caps, 1), *mode)),
                RuleAction::AnswerBox => {
                    let parser = answer_box
                        .as_deref()
                        .ok_or("no answer-box parser configured")?;
                    abox::adapt(parser, group(caps, 1))
                }
                RuleAction::Image => {
                    let base = group(caps, 2);
                    let before = images.published().len();
                    let html = images.resolve(group(caps, 1), base)?;
                    if let Some(cb) = progress.as_ref() {
                        cb.on_image_resolved(base, images.published().len() - before);
                    }
                    Ok(html)
                }
                RuleAction::RawXml => Ok(format!(
                    "<edxxml>{}</edxxml>",
                    group(caps, 1).replace(r"\$", "$")
                )),
                RuleAction::Custom(transform) => transform(caps),
            });

            match result {
                Ok((rewritten, matches)) => {
                    if matches > 0 {
                        debug!("Rule '{}' rewrote {} span(s)", rule.name, matches);
                    }
                    if let Some(cb) = progress.as_ref() {
                        cb.on_rule_applied(&rule.name, matches);
                    }
                    rule_matches.push(RuleMatches {
                        rule: rule.name.clone(),
                        matches,
                    });
                    text = rewritten;
                }
                Err(e) => {
                    error!("Error in rendering {}: {}", rule.name, e);
                    return Err(Latex2EdxError::FilterFailed {
                        rule: rule.name.clone(),
                        source: e,
                    });
                }
            }
        }
        Ok(text)
    }
}

impl fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FilterChain")
            .field("rules", &self.rules)
            .finish_non_exhaustive()
    }
}

fn group<'t>(caps: &Captures<'t>, i: usize) -> &'t str {
    caps.get(i).map_or("", |m| m.as_str())
}

/// `Regex::replace_all` with a fallible replacer. Returns the new text and
/// the number of matches replaced.
fn try_replace_all<F>(re: &Regex, text: &str, mut replace: F) -> Result<(String, usize), BoxError>
where
    F: FnMut(&Captures<'_>) -> Result<String, BoxError>,
{
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    let mut count = 0;
    for caps in re.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        out.push_str(&text[last..whole.start()]);
        out.push_str(&replace(&caps)?);
        last = whole.end();
        count += 1;
    }
    out.push_str(&text[last..]);
    Ok((out, count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ToolError;
    use crate::pipeline::tools::ImageTools;
    use std::path::Path;
    use tempfile::TempDir;

    struct NoTools;

    impl ImageTools for NoTools {
        fn page_count(&self, _pdf: &Path) -> Result<usize, ToolError> {
            Ok(1)
        }

        fn rasterize(&self, _: &Path, _: u32, _: u32, _: &Path) -> Result<(), ToolError> {
            Ok(())
        }
    }

    fn chain(dir: &TempDir, extra: &[ExtraFilter]) -> FilterChain {
        let images = ImageResolver::new(dir.path().join("img"), "c", Arc::new(NoTools))
            .with_graphics_root(Some(dir.path().to_path_buf()));
        let abox: Arc<dyn AnswerBoxParser> = Arc::new(|body: &str| -> Result<String, BoxError> {
            Ok(format!("<stringresponse answer=\"{}\"/>", body.trim()))
        });
        FilterChain::new(images, Some(abox), extra).expect("chain builds")
    }

    #[test]
    fn builtin_order_is_stable() {
        let dir = TempDir::new().unwrap();
        let c = chain(&dir, &[]);
        let names: Vec<&str> = c.rules().iter().map(|r| r.name()).collect();
        assert_eq!(
            names,
            [
                "inline-math-dollar",
                "inline-math-ensuremath",
                "display-math-equation",
                "display-math-edxmath",
                "display-math-bracket",
                "answer-box",
                "image",
                "raw-xml",
            ]
        );
    }

    #[test]
    fn inline_math_shapes() {
        let dir = TempDir::new().unwrap();
        let out = chain(&dir, &[])
            .apply_rules(r"<math>$x^2$</math> and <math>\ensuremath{y}</math>")
            .unwrap();
        assert_eq!(
            out,
            "[mathjaxinline]x^2[/mathjaxinline] and [mathjaxinline]y[/mathjaxinline]"
        );
    }

    #[test]
    fn display_math_shapes() {
        let dir = TempDir::new().unwrap();
        let input = concat!(
            r"<math>\begin{equation}a=b\end{equation}</math>",
            r"<displaymath>\begin{edXmath}c=d\end{edXmath}</displaymath>",
            r"<math>\[e=f\]</math>",
        );
        let out = chain(&dir, &[]).apply_rules(input).unwrap();
        assert_eq!(
            out,
            "[mathjax]a=b[/mathjax][mathjax]c=d[/mathjax][mathjax]e=f[/mathjax]"
        );
    }

    #[test]
    fn math_spans_across_lines() {
        let dir = TempDir::new().unwrap();
        let out = chain(&dir, &[])
            .apply_rules("<math>\\begin{equation}\na\n+b\n\\end{equation}</math>")
            .unwrap();
        assert_eq!(out, "[mathjax]a+b[/mathjax]");
    }

    #[test]
    fn non_greedy_spans() {
        let dir = TempDir::new().unwrap();
        let out = chain(&dir, &[])
            .apply_rules("<math>$a$</math> text <math>$b$</math>")
            .unwrap();
        assert_eq!(
            out,
            "[mathjaxinline]a[/mathjaxinline] text [mathjaxinline]b[/mathjaxinline]"
        );
    }

    #[test]
    fn answer_box_delegates() {
        let dir = TempDir::new().unwrap();
        let out = chain(&dir, &[])
            .apply_rules(r#"<p><abox> expect="42" </abox></p>"#)
            .unwrap();
        assert_eq!(out, r#"<p><stringresponse answer="expect="42""/></p>"#);
    }

    #[test]
    fn answer_box_without_parser_is_fatal() {
        let dir = TempDir::new().unwrap();
        let images = ImageResolver::new(dir.path().join("img"), "", Arc::new(NoTools));
        let mut chain = FilterChain::new(images, None, &[]).unwrap();
        let err = chain.apply_rules("<abox>x</abox>").unwrap_err();
        match err {
            Latex2EdxError::FilterFailed { rule, .. } => assert_eq!(rule, "answer-box"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn raw_xml_unescapes_dollar_without_math() {
        let dir = TempDir::new().unwrap();
        let out = chain(&dir, &[])
            .apply_rules(r#"<edxxml>\edXxml{<script>var a = \$x\$;</script>}</edxxml>"#)
            .unwrap();
        assert_eq!(out, "<edxxml><script>var a = $x$;</script></edxxml>");
        assert!(!out.contains("mathjax"));
    }

    #[test]
    fn image_directive_resolved() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("fig1.png"), b"png").unwrap();
        let mut c = chain(&dir, &[]);
        let out = c
            .apply_rules(r#"<p><includegraphics style="width=1in">fig1</includegraphics></p>"#)
            .unwrap();
        assert_eq!(out, r#"<p><img src="/static/c/fig1.png" width="110" /></p>"#);
        assert_eq!(c.images().published().len(), 1);
    }

    #[test]
    fn missing_image_does_not_abort() {
        let dir = TempDir::new().unwrap();
        let out = chain(&dir, &[])
            .apply_rules(r#"<includegraphics style="">gone</includegraphics><math>$z$</math>"#)
            .unwrap();
        assert_eq!(
            out,
            r#"<img src="NOTFOUND-gone" />[mathjaxinline]z[/mathjaxinline]"#
        );
    }

    #[test]
    fn filtered_output_is_a_fixed_point() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("fig1.png"), b"png").unwrap();
        let mut c = chain(&dir, &[]);
        let once = c
            .apply_rules(concat!(
                r#"<includegraphics style="width=1in">fig1</includegraphics>"#,
                r#"<abox>type="option"</abox>"#,
                r#"<edxxml>\edXxml{<b>\$5</b>}</edxxml>"#,
            ))
            .unwrap();
        let twice = c.apply_rules(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn caller_rules_run_last() {
        let dir = TempDir::new().unwrap();
        let extra = [ExtraFilter::replace(
            r"\[mathjaxinline\](.*?)\[/mathjaxinline\]",
            "<m>$1</m>",
        )];
        let mut c = chain(&dir, &extra);
        assert_eq!(c.rules().last().unwrap().origin(), RuleOrigin::Caller);
        let out = c.apply_rules("<math>$q$</math>").unwrap();
        assert_eq!(out, "<m>q</m>");
    }

    #[test]
    fn caller_rule_overrides_builtin_in_place() {
        let dir = TempDir::new().unwrap();
        let extra = [ExtraFilter::replace(RE_ABOX.as_str(), "<custom>$1</custom>")];
        let c = chain(&dir, &extra);
        assert_eq!(c.rules().len(), 8);
        let abox = &c.rules()[5];
        assert_eq!(abox.name(), "answer-box");
        assert_eq!(abox.origin(), RuleOrigin::Caller);

        let mut c = c;
        assert_eq!(
            c.apply_rules("<abox>x</abox>").unwrap(),
            "<custom>x</custom>"
        );
    }

    #[test]
    fn failing_caller_rule_is_fatal_and_named() {
        let dir = TempDir::new().unwrap();
        let extra = [ExtraFilter::new(r"<bad/>", |_| Err("boom".into()))];
        let err = chain(&dir, &extra).apply_rules("ok <bad/>").unwrap_err();
        match err {
            Latex2EdxError::FilterFailed { rule, source } => {
                assert_eq!(rule, "<bad/>");
                assert_eq!(source.to_string(), "boom");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn invalid_caller_pattern_rejected() {
        let dir = TempDir::new().unwrap();
        let images = ImageResolver::new(dir.path().join("img"), "", Arc::new(NoTools));
        let err = FilterChain::new(images, None, &[ExtraFilter::replace("(unclosed", "")])
            .unwrap_err();
        assert!(matches!(err, Latex2EdxError::InvalidFilterPattern { .. }));
    }

    #[test]
    fn rule_matches_recorded() {
        let dir = TempDir::new().unwrap();
        let mut c = chain(&dir, &[]);
        c.apply_rules("<math>$a$</math><math>$b$</math>").unwrap();
        let matches = c.take_rule_matches();
        assert_eq!(matches[0].rule, "inline-math-dollar");
        assert_eq!(matches[0].matches, 2);
        assert!(matches[1..].iter().all(|m| m.matches == 0));
    }

    #[test]
    fn full_apply_extracts_and_wraps() {
        let dir = TempDir::new().unwrap();
        let raw = "<html><head></head><body><p>It\u{2019}s <math>$x^2$</math></p><ul><li>a</li></ul><math>$$</math></body></html>";
        let out = chain(&dir, &[]).apply(raw).unwrap();
        assert_eq!(
            out,
            "<document><p>\nIt's [mathjaxinline]x^2[/mathjaxinline]</p><ul>\n<li>a</li></ul>&#160;</document>"
        );
    }

    #[test]
    fn full_apply_requires_body() {
        let dir = TempDir::new().unwrap();
        let err = chain(&dir, &[]).apply("<p>fragment</p>").unwrap_err();
        assert!(matches!(err, Latex2EdxError::MissingBody { .. }));
    }
}
