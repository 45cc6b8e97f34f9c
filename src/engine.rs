//! The XML engine capability: the compile and run primitives every operation is built from.
//!
//! Compiled artifacts are immutable and shared across threads through the artifact
//! caches. Every run must use a fresh execution context of its own.

use std::fmt;

use crate::error::EngineResult;
use crate::request::Params;
use crate::source::LoadedSource;

/// Severity of a parse or validation diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Error,
    Fatal,
}

impl Severity {
    pub fn tag(&self) -> &'static str {
        match self {
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
            Severity::Fatal => "FATAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// One message reported while parsing or validating a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    /// 1-based line, when the engine knows it
    pub line: Option<u32>,
}

impl Diagnostic {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            line: None,
        }
    }

    pub fn at_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "{} line {}: {}", self.severity, line, self.message),
            None => write!(f, "{} {}", self.severity, self.message),
        }
    }
}

/// Render diagnostics in the order they were reported, one per line.
pub fn render_diagnostics(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(Diagnostic::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

/// An XML processor able to validate documents and compile and run XSLT, XQuery
/// and XPath programs.
///
/// All methods are synchronous and CPU-bound; callers run them on the blocking pool.
pub trait XmlEngine: Send + Sync + 'static {
    type Stylesheet: Send + Sync + 'static;
    type Query: Send + Sync + 'static;
    type Path: Send + Sync + 'static;

    /// Parse `document`, validating it against its DTD when it declares one.
    ///
    /// Returns every diagnostic reported, in order. Fails with
    /// [`EngineError::FatalParse`](crate::error::EngineError::FatalParse) only when
    /// the document could not be parsed and nothing was reported.
    fn parse_and_validate(&self, document: &LoadedSource) -> EngineResult<Vec<Diagnostic>>;

    fn compile_stylesheet(&self, stylesheet: &LoadedSource) -> EngineResult<Self::Stylesheet>;

    fn compile_query(&self, query: &str) -> EngineResult<Self::Query>;

    fn compile_path(&self, expression: &str) -> EngineResult<Self::Path>;

    /// Run `document` through a stylesheet, binding every param as a string parameter.
    fn transform(
        &self,
        stylesheet: &Self::Stylesheet,
        document: &LoadedSource,
        params: &Params,
    ) -> EngineResult<String>;

    /// Evaluate a query with the document node as context, binding params as
    /// string external variables.
    fn query(
        &self,
        query: &Self::Query,
        document: &LoadedSource,
        params: &Params,
    ) -> EngineResult<String>;

    fn evaluate_path(&self, path: &Self::Path, document: &LoadedSource) -> EngineResult<String>;
}
