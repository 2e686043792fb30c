//! Pipeline stages for LaTeX-to-edX-XML conversion.
//!
//! Each submodule implements one transformation step or one collaborator
//! boundary, so stages are independently testable and external tools can be
//! swapped for fakes.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ engine ──▶ filters ──────────────────────────▶ postprocess
//! (LaTeX)   (XHTML)     ├─ math    (mathjax tokens)        (body, root)
//!                       ├─ abox    (problem XML)
//!                       └─ images  (copy / rasterise, <img>)
//! ```
//!
//! 1. [`input`]: read the source (literal, reader, or file), optionally wrap
//!    a fragment in a minimal preamble
//! 2. [`engine`]: hand the LaTeX to the external TeX engine and get markup back
//! 3. [`filters`]: run the ordered rule chain over the whole markup string
//! 4. [`postprocess`]: unicode fix-up before the rules; structural cleanup,
//!    body extraction and root wrapping after them
//!
//! [`command`] and [`tools`] wrap the external processes the engine, the
//! answer-box parser and the image resolver shell out to.

pub mod abox;
pub mod command;
pub mod engine;
pub mod filters;
pub mod images;
pub mod input;
pub mod math;
pub mod postprocess;
pub mod tools;
