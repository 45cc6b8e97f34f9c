//! Input resolution: turning a request's `{text, url}` field pair into one
//! document or program source, and opening that source into bytes.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Url;
use tracing::debug;

use crate::error::{Result, WorkerError};
use crate::http_client::AsyncHttpClient;
use crate::request::{self, Request};

/// Which part of a request a source plays; named in input error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Document,
    Program,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Document => f.write_str("document"),
            Role::Program => f.write_str("program"),
        }
    }
}

/// A mutually exclusive pair of request fields: inline text and a URL reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldPair {
    pub text: &'static str,
    pub url: &'static str,
}

pub const DOCUMENT_FIELDS: FieldPair = FieldPair {
    text: request::XML,
    url: request::URL_XML,
};

pub const STYLESHEET_FIELDS: FieldPair = FieldPair {
    text: request::XSL,
    url: request::URL_XSL,
};

/// Where the bytes of a document or program come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Inline(Vec<u8>),
    Remote(String),
}

/// Resolve one field pair of `request` into a [`Source`].
///
/// Fails with `MissingInput` when neither field is set and `ConflictingInput`
/// when both are. Nothing is opened here.
pub fn resolve(request: &Request, role: Role, fields: &FieldPair) -> Result<Source> {
    match (request.field(fields.text), request.field(fields.url)) {
        (Some(_), Some(_)) => Err(WorkerError::ConflictingInput {
            role,
            fields: format!("{} and {}", fields.text, fields.url),
        }),
        (Some(text), None) => Ok(Source::Inline(text.as_bytes().to_vec())),
        (None, Some(url)) => Ok(Source::Remote(url.to_string())),
        (None, None) => Err(WorkerError::MissingInput {
            role,
            fields: format!("{} or {}", fields.text, fields.url),
        }),
    }
}

/// Resolve a field that only has an inline form, such as `query` or `xpath`.
pub fn resolve_inline(request: &Request, role: Role, field: &'static str) -> Result<String> {
    request
        .field(field)
        .map(str::to_string)
        .ok_or_else(|| WorkerError::MissingInput {
            role,
            fields: field.to_string(),
        })
}

/// Source bytes ready for the engine, with the URI relative references resolve against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedSource {
    pub bytes: Vec<u8>,
    pub base_uri: Option<String>,
}

impl LoadedSource {
    pub fn inline(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            base_uri: None,
        }
    }
}

/// Fetches the bytes behind a URL reference.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// Default fetcher: `http(s)` through reqwest, `file:` URLs and absolute paths from disk.
pub struct UrlFetcher {
    http: AsyncHttpClient,
}

impl UrlFetcher {
    pub fn new(http: AsyncHttpClient) -> Self {
        Self { http }
    }
}

#[async_trait]
impl SourceFetcher for UrlFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        match Url::parse(url) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {
                self.http.fetch(url).await
            }
            Ok(parsed) if parsed.scheme() == "file" => {
                let path = parsed
                    .to_file_path()
                    .map_err(|_| WorkerError::UnsupportedScheme {
                        url: url.to_string(),
                    })?;
                Ok(tokio::fs::read(path).await?)
            }
            Err(_) if Path::new(url).is_absolute() => Ok(tokio::fs::read(url).await?),
            _ => Err(WorkerError::UnsupportedScheme {
                url: url.to_string(),
            }),
        }
    }
}

/// Opens resolved sources into [`LoadedSource`]s.
#[derive(Clone)]
pub struct SourceLoader {
    fetcher: Arc<dyn SourceFetcher>,
}

impl SourceLoader {
    pub fn new(fetcher: Arc<dyn SourceFetcher>) -> Self {
        Self { fetcher }
    }

    pub async fn open(&self, source: Source) -> Result<LoadedSource> {
        match source {
            Source::Inline(bytes) => Ok(LoadedSource::inline(bytes)),
            Source::Remote(url) => {
                debug!(%url, "fetching source");
                let bytes = self.fetcher.fetch(&url).await?;
                Ok(LoadedSource {
                    bytes,
                    base_uri: Some(url),
                })
            }
        }
    }
}
