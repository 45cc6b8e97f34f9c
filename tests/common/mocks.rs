use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use mockall::mock;

use xml_worker::error::Result;
use xml_worker::{
    Diagnostic, EngineError, EngineResult, LoadedSource, Params, Severity, SourceFetcher,
    XmlEngine,
};

// Mock URL fetcher for testing remote sources without network calls
mock! {
    pub Fetcher {}

    #[async_trait]
    impl SourceFetcher for Fetcher {
        async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
    }
}

/// Program text that makes [`CountingEngine`] fail compilation.
pub const BROKEN_PROGRAM: &str = "BROKEN";

/// A compiled program of the counting engine: just its text and a build number.
#[derive(Debug)]
pub struct FakeProgram {
    pub text: String,
    pub build: usize,
}

/// Test double engine that counts compilations and echoes its inputs.
///
/// Runs render as `"<program>|<document>|<name>=<value>,..."` so tests can check
/// exactly which artifact, document and params went into each reply.
#[derive(Debug, Default)]
pub struct CountingEngine {
    pub validations: AtomicUsize,
    pub stylesheet_builds: AtomicUsize,
    pub query_builds: AtomicUsize,
    pub path_builds: AtomicUsize,
    pub runs: AtomicUsize,
    /// Compilations that fail before the engine starts succeeding again
    pub failures_remaining: AtomicUsize,
    pub compile_delay: Duration,
}

impl CountingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_compile_delay(delay: Duration) -> Self {
        Self {
            compile_delay: delay,
            ..Self::default()
        }
    }

    pub fn failing_first(count: usize) -> Self {
        let engine = Self::default();
        engine.failures_remaining.store(count, Ordering::SeqCst);
        engine
    }

    pub fn total_builds(&self) -> usize {
        self.stylesheet_builds.load(Ordering::SeqCst)
            + self.query_builds.load(Ordering::SeqCst)
            + self.path_builds.load(Ordering::SeqCst)
    }

    pub fn engine_calls(&self) -> usize {
        self.total_builds()
            + self.validations.load(Ordering::SeqCst)
            + self.runs.load(Ordering::SeqCst)
    }

    fn compile(&self, counter: &AtomicUsize, kind: &str, text: &str) -> EngineResult<FakeProgram> {
        let build = counter.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.compile_delay.is_zero() {
            std::thread::sleep(self.compile_delay);
        }

        let injected_failure = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected_failure || text.contains(BROKEN_PROGRAM) {
            return Err(EngineError::Compile(format!(
                "Failed to compile {}: unexpected token",
                kind
            )));
        }

        Ok(FakeProgram {
            text: text.to_string(),
            build,
        })
    }

    fn run(&self, program: &FakeProgram, document: &LoadedSource, params: &Params) -> String {
        self.runs.fetch_add(1, Ordering::SeqCst);
        let params: Vec<_> = params
            .iter()
            .map(|p| format!("{}={}", p.name, p.value))
            .collect();
        format!(
            "{}|{}|{}",
            program.text,
            String::from_utf8_lossy(&document.bytes),
            params.join(",")
        )
    }
}

impl XmlEngine for CountingEngine {
    type Stylesheet = FakeProgram;
    type Query = FakeProgram;
    type Path = FakeProgram;

    fn parse_and_validate(&self, document: &LoadedSource) -> EngineResult<Vec<Diagnostic>> {
        self.validations.fetch_add(1, Ordering::SeqCst);
        let text = String::from_utf8_lossy(&document.bytes);

        if text.trim().is_empty() {
            return Err(EngineError::FatalParse(
                "document could not be parsed".to_string(),
            ));
        }
        if text.contains("<bad") {
            return Ok(vec![
                Diagnostic::new(Severity::Warning, "suspicious element").at_line(1),
                Diagnostic::new(Severity::Error, "element bad is not declared"),
            ]);
        }
        Ok(Vec::new())
    }

    fn compile_stylesheet(&self, stylesheet: &LoadedSource) -> EngineResult<FakeProgram> {
        let text = String::from_utf8_lossy(&stylesheet.bytes);
        self.compile(&self.stylesheet_builds, "stylesheet", &text)
    }

    fn compile_query(&self, query: &str) -> EngineResult<FakeProgram> {
        self.compile(&self.query_builds, "query", query)
    }

    fn compile_path(&self, expression: &str) -> EngineResult<FakeProgram> {
        self.compile(&self.path_builds, "XPath expression", expression)
    }

    fn transform(
        &self,
        stylesheet: &FakeProgram,
        document: &LoadedSource,
        params: &Params,
    ) -> EngineResult<String> {
        Ok(self.run(stylesheet, document, params))
    }

    fn query(
        &self,
        query: &FakeProgram,
        document: &LoadedSource,
        params: &Params,
    ) -> EngineResult<String> {
        Ok(self.run(query, document, params))
    }

    fn evaluate_path(&self, path: &FakeProgram, document: &LoadedSource) -> EngineResult<String> {
        Ok(self.run(path, document, &Params::default()))
    }
}
