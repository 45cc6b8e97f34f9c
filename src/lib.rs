//! # xml-worker Library
//!
//! XML validation, XSLT transformation, XQuery and XPath evaluation exposed as
//! request/reply operations, with a concurrent cache of compiled stylesheets and
//! expressions in front of the libxml2/libxslt engine.

pub mod cache;
pub mod cli;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod executor;
pub mod http_client;
pub mod libxml2;
pub mod logging;
pub mod request;
pub mod server;
pub mod source;

pub use cache::{ArtifactCache, CacheConfig, CacheKey, CacheStats};
pub use cli::Cli;
pub use config::{Config, ConfigError, ConfigManager, EnvProvider};
pub use dispatcher::{Dispatcher, Operation};
pub use engine::{Diagnostic, Severity, XmlEngine, render_diagnostics};
pub use envelope::{ResponseEnvelope, Status};
pub use error::{EngineError, EngineResult, Result, WorkerError};
pub use executor::{
    ExecutorCacheStats, OperationExecutor, QueryExecutor, TransformExecutor, ValidateExecutor,
    XPathExecutor,
};
pub use http_client::{AsyncHttpClient, HttpClientConfig};
pub use libxml2::{CompiledExpression, CompiledStylesheet, LibXml2Engine};
pub use request::{Param, Params, Request};
pub use server::{InboundMessage, OutboundMessage, ServeSummary, serve};
pub use source::{LoadedSource, Role, Source, SourceFetcher, SourceLoader, UrlFetcher};
