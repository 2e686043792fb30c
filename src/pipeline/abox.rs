//! Answer-box adapter.
//!
//! `\edXabox{...}` bodies carry a small grammar (type, expect, options,
//! tolerances, …) that a separate parser turns into a problem XML fragment.
//! This module only delegates: it hands the raw body over verbatim and
//! splices back whatever XML comes out. Parser failures propagate and abort
//! the conversion.

use crate::error::BoxError;
use crate::pipeline::command::run_capture;
use std::process::Command;

/// Turns the raw body of an answer box into serialised XML.
pub trait AnswerBoxParser: Send + Sync {
    fn parse(&self, body: &str) -> Result<String, BoxError>;
}

impl<F> AnswerBoxParser for F
where
    F: Fn(&str) -> Result<String, BoxError> + Send + Sync,
{
    fn parse(&self, body: &str) -> Result<String, BoxError> {
        self(body)
    }
}

/// [`AnswerBoxParser`] backed by an external program that reads the body on
/// stdin and writes the XML fragment to stdout.
#[derive(Debug, Clone)]
pub struct CommandAnswerBox {
    program: String,
    args: Vec<String>,
}

impl CommandAnswerBox {
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
}

impl AnswerBoxParser for CommandAnswerBox {
    fn parse(&self, body: &str) -> Result<String, BoxError> {
        let xml = run_capture(Command::new(&self.program).args(&self.args), Some(body))?;
        Ok(xml.trim_end().to_string())
    }
}

/// Delegate `captured` to `parser` and return its XML unchanged.
pub fn adapt(parser: &dyn AnswerBoxParser, captured: &str) -> Result<String, BoxError> {
    parser.parse(captured)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closure_parser_receives_body_verbatim() {
        let parser = |body: &str| -> Result<String, BoxError> {
            Ok(format!("<optionresponse raw=\"{body}\"/>"))
        };
        let xml = adapt(&parser, r#"type="option" expect="b""#).expect("parse");
        assert_eq!(xml, r#"<optionresponse raw="type="option" expect="b""/>"#);
    }

    #[test]
    fn parser_error_propagates() {
        let parser =
            |_: &str| -> Result<String, BoxError> { Err("unterminated quoted string".into()) };
        let err = adapt(&parser, "type=\"custom").unwrap_err();
        assert!(err.to_string().contains("unterminated"));
    }

    #[cfg(unix)]
    #[test]
    fn command_parser_pipes_body() {
        let parser = CommandAnswerBox::new("cat");
        let xml = parser.parse("<stringresponse answer=\"x\"/>\n").expect("cat");
        assert_eq!(xml, "<stringresponse answer=\"x\"/>");
    }
}
