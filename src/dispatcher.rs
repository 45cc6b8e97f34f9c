use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tracing::{Instrument, debug, info_span};

use crate::cache::CacheConfig;
use crate::engine::XmlEngine;
use crate::envelope::ResponseEnvelope;
use crate::executor::{
    ExecutorCacheStats, OperationExecutor, QueryExecutor, TransformExecutor, ValidateExecutor,
    XPathExecutor,
};
use crate::request::Request;
use crate::source::SourceLoader;

/// The four operations, addressable by bus address or short name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Validate,
    Transform,
    Query,
    XPath,
}

impl Operation {
    pub const ALL: [Operation; 4] = [
        Operation::Validate,
        Operation::Transform,
        Operation::Query,
        Operation::XPath,
    ];

    pub fn address(&self) -> &'static str {
        match self {
            Operation::Validate => "xmlworker.validation",
            Operation::Transform => "xmlworker.transform",
            Operation::Query => "xmlworker.query",
            Operation::XPath => "xmlworker.xpath",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Operation::Validate => "validate",
            Operation::Transform => "transform",
            Operation::Query => "query",
            Operation::XPath => "xpath",
        }
    }

    /// Look up an operation by bus address or short name.
    pub fn from_address(address: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|op| op.address() == address || op.name() == address)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.address())
    }
}

/// Routes requests to the executor of their operation.
///
/// Each executor owns its own artifact cache, so keyspaces never mix across
/// operation kinds.
pub struct Dispatcher<E: XmlEngine> {
    validate: ValidateExecutor<E>,
    transform: TransformExecutor<E>,
    query: QueryExecutor<E>,
    xpath: XPathExecutor<E>,
}

impl<E: XmlEngine> Dispatcher<E> {
    pub fn new(engine: Arc<E>, loader: SourceLoader, cache_config: &CacheConfig) -> Self {
        Self {
            validate: ValidateExecutor::new(Arc::clone(&engine), loader.clone()),
            transform: TransformExecutor::new(Arc::clone(&engine), loader.clone(), cache_config),
            query: QueryExecutor::new(Arc::clone(&engine), loader.clone(), cache_config),
            xpath: XPathExecutor::new(engine, loader, cache_config),
        }
    }

    fn executor(&self, operation: Operation) -> &dyn OperationExecutor {
        match operation {
            Operation::Validate => &self.validate,
            Operation::Transform => &self.transform,
            Operation::Query => &self.query,
            Operation::XPath => &self.xpath,
        }
    }

    /// Run `request` through the executor of `operation` and return its reply.
    pub async fn dispatch(&self, operation: Operation, request: &Request) -> ResponseEnvelope {
        let span = info_span!("dispatch", operation = operation.name());

        async {
            let start = Instant::now();
            let envelope = self.executor(operation).execute(request).await;
            debug!(
                ok = envelope.is_ok(),
                elapsed_ms = start.elapsed().as_millis() as u64,
                "request completed"
            );
            envelope
        }
        .instrument(span)
        .await
    }

    pub async fn cache_stats(&self) -> ExecutorCacheStats {
        ExecutorCacheStats {
            stylesheets: self.transform.cache().stats().await,
            queries: self.query.cache().stats().await,
            xpaths: self.xpath.cache().stats().await,
        }
    }

    /// Drop every compiled artifact.
    pub fn clear_caches(&self) {
        self.transform.cache().invalidate_all();
        self.query.cache().invalidate_all();
        self.xpath.cache().invalidate_all();
    }
}
