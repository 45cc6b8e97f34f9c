//! Operation executors
//!
//! One executor per operation. Each runs the same pipeline:
//!
//! 1. **Input validation**: resolve the document and program sources and parse
//!    params. The first violation short-circuits; nothing is fetched or compiled.
//! 2. **Loading** (async): open the resolved sources concurrently.
//! 3. **Compile or cache hit**: the program is compiled on the blocking pool at most
//!    once per distinct text, through the executor's own [`ArtifactCache`].
//! 4. **Execution** (blocking): a fresh engine context runs the document through the
//!    shared artifact.
//!
//! Every failure is turned into an error envelope here; nothing escapes to the transport.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::cache::{ArtifactCache, CacheConfig, CacheKey, CacheStats};
use crate::engine::{XmlEngine, render_diagnostics};
use crate::envelope::ResponseEnvelope;
use crate::error::{EngineResult, Result, WorkerError};
use crate::request::{self, Request};
use crate::source::{
    DOCUMENT_FIELDS, Role, STYLESHEET_FIELDS, Source, SourceLoader, resolve, resolve_inline,
};

/// Handles one kind of request end to end.
#[async_trait]
pub trait OperationExecutor: Send + Sync {
    /// Operation name used in logs.
    fn name(&self) -> &'static str;

    async fn execute(&self, request: &Request) -> ResponseEnvelope;
}

/// Run a synchronous engine call on the blocking pool.
async fn run_blocking<T, F>(call: F) -> Result<T>
where
    F: FnOnce() -> EngineResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(call)
        .await
        .map_err(|e| WorkerError::Concurrency {
            details: format!("Join error: {}", e),
        })?
        .map_err(WorkerError::from)
}

fn into_envelope(operation: &'static str, result: Result<ResponseEnvelope>) -> ResponseEnvelope {
    match result {
        Ok(envelope) => envelope,
        Err(e) => {
            if e.is_input_error() {
                debug!(operation, category = e.category(), error = %e, "rejected request");
            } else {
                warn!(operation, category = e.category(), error = %e, "request failed");
            }
            ResponseEnvelope::from_error(&e)
        }
    }
}

/// Checks well-formedness, and validity when the document declares a DTD.
pub struct ValidateExecutor<E: XmlEngine> {
    engine: Arc<E>,
    loader: SourceLoader,
}

impl<E: XmlEngine> ValidateExecutor<E> {
    pub fn new(engine: Arc<E>, loader: SourceLoader) -> Self {
        Self { engine, loader }
    }

    async fn run(&self, request: &Request) -> Result<ResponseEnvelope> {
        let source = match request {
            Request::Raw(bytes) => Source::Inline(bytes.clone()),
            Request::Fields(_) => resolve(request, Role::Document, &DOCUMENT_FIELDS)?,
        };
        let document = self.loader.open(source).await?;

        let engine = Arc::clone(&self.engine);
        let diagnostics = run_blocking(move || engine.parse_and_validate(&document)).await?;

        if diagnostics.is_empty() {
            Ok(ResponseEnvelope::ok(None))
        } else {
            Err(WorkerError::Diagnostics(render_diagnostics(&diagnostics)))
        }
    }
}

#[async_trait]
impl<E: XmlEngine> OperationExecutor for ValidateExecutor<E> {
    fn name(&self) -> &'static str {
        "validate"
    }

    async fn execute(&self, request: &Request) -> ResponseEnvelope {
        into_envelope(self.name(), self.run(request).await)
    }
}

/// Applies an XSLT stylesheet to a document.
pub struct TransformExecutor<E: XmlEngine> {
    engine: Arc<E>,
    loader: SourceLoader,
    cache: ArtifactCache<E::Stylesheet>,
}

impl<E: XmlEngine> TransformExecutor<E> {
    pub fn new(engine: Arc<E>, loader: SourceLoader, config: &CacheConfig) -> Self {
        Self {
            engine,
            loader,
            cache: ArtifactCache::new("stylesheets", config),
        }
    }

    pub fn cache(&self) -> &ArtifactCache<E::Stylesheet> {
        &self.cache
    }

    async fn run(&self, request: &Request) -> Result<ResponseEnvelope> {
        let document = resolve(request, Role::Document, &DOCUMENT_FIELDS)?;
        let stylesheet = resolve(request, Role::Program, &STYLESHEET_FIELDS)?;
        let params = request.params()?;

        let (document, stylesheet) = tokio::try_join!(
            self.loader.open(document),
            self.loader.open(stylesheet)
        )?;

        let key = CacheKey::digest(&stylesheet.bytes);
        let engine = Arc::clone(&self.engine);
        let compiled = self
            .cache
            .get_or_build(key, move || engine.compile_stylesheet(&stylesheet))
            .await?;

        let engine = Arc::clone(&self.engine);
        let output =
            run_blocking(move || engine.transform(&compiled, &document, &params)).await?;

        Ok(ResponseEnvelope::ok(Some(output)))
    }
}

#[async_trait]
impl<E: XmlEngine> OperationExecutor for TransformExecutor<E> {
    fn name(&self) -> &'static str {
        "transform"
    }

    async fn execute(&self, request: &Request) -> ResponseEnvelope {
        into_envelope(self.name(), self.run(request).await)
    }
}

/// Evaluates an inline query against a document, with params bound as external variables.
///
/// Only the XPath 1.0 subset of XQuery is accepted: FLWOR expressions, constructors
/// and prolog declarations fail to compile.
pub struct QueryExecutor<E: XmlEngine> {
    engine: Arc<E>,
    loader: SourceLoader,
    cache: ArtifactCache<E::Query>,
}

impl<E: XmlEngine> QueryExecutor<E> {
    pub fn new(engine: Arc<E>, loader: SourceLoader, config: &CacheConfig) -> Self {
        Self {
            engine,
            loader,
            cache: ArtifactCache::new("queries", config),
        }
    }

    pub fn cache(&self) -> &ArtifactCache<E::Query> {
        &self.cache
    }

    async fn run(&self, request: &Request) -> Result<ResponseEnvelope> {
        let document = resolve(request, Role::Document, &DOCUMENT_FIELDS)?;
        let query = resolve_inline(request, Role::Program, request::QUERY)?;
        let params = request.params()?;

        let document = self.loader.open(document).await?;

        let key = CacheKey::digest(query.as_bytes());
        let engine = Arc::clone(&self.engine);
        let compiled = self
            .cache
            .get_or_build(key, move || engine.compile_query(&query))
            .await?;

        let engine = Arc::clone(&self.engine);
        let output = run_blocking(move || engine.query(&compiled, &document, &params)).await?;

        Ok(ResponseEnvelope::ok(Some(output)))
    }
}

#[async_trait]
impl<E: XmlEngine> OperationExecutor for QueryExecutor<E> {
    fn name(&self) -> &'static str {
        "query"
    }

    async fn execute(&self, request: &Request) -> ResponseEnvelope {
        into_envelope(self.name(), self.run(request).await)
    }
}

/// Evaluates an inline XPath expression with the document node as context.
///
/// `params` are not supported and are ignored, even when malformed.
pub struct XPathExecutor<E: XmlEngine> {
    engine: Arc<E>,
    loader: SourceLoader,
    cache: ArtifactCache<E::Path>,
}

impl<E: XmlEngine> XPathExecutor<E> {
    pub fn new(engine: Arc<E>, loader: SourceLoader, config: &CacheConfig) -> Self {
        Self {
            engine,
            loader,
            cache: ArtifactCache::new("xpaths", config),
        }
    }

    pub fn cache(&self) -> &ArtifactCache<E::Path> {
        &self.cache
    }

    async fn run(&self, request: &Request) -> Result<ResponseEnvelope> {
        let document = resolve(request, Role::Document, &DOCUMENT_FIELDS)?;
        let expression = resolve_inline(request, Role::Program, request::XPATH)?;

        let document = self.loader.open(document).await?;

        let key = CacheKey::digest(expression.as_bytes());
        let engine = Arc::clone(&self.engine);
        let compiled = self
            .cache
            .get_or_build(key, move || engine.compile_path(&expression))
            .await?;

        let engine = Arc::clone(&self.engine);
        let output = run_blocking(move || engine.evaluate_path(&compiled, &document)).await?;

        Ok(ResponseEnvelope::ok(Some(output)))
    }
}

#[async_trait]
impl<E: XmlEngine> OperationExecutor for XPathExecutor<E> {
    fn name(&self) -> &'static str {
        "xpath"
    }

    async fn execute(&self, request: &Request) -> ResponseEnvelope {
        into_envelope(self.name(), self.run(request).await)
    }
}

/// Snapshot of the three artifact caches.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct ExecutorCacheStats {
    pub stylesheets: CacheStats,
    pub queries: CacheStats,
    pub xpaths: CacheStats,
}
