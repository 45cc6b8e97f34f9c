use std::path::PathBuf;
use std::sync::Arc;

use reqwest::Url;
use serde_json::Value;

use xml_worker::{
    AsyncHttpClient, CacheConfig, Dispatcher, HttpClientConfig, LibXml2Engine, Request,
    SourceFetcher, SourceLoader, UrlFetcher, XmlEngine,
};

/// Test fixture paths
pub struct TestFixtures {
    pub fixtures_dir: PathBuf,
}

impl TestFixtures {
    pub fn new() -> Self {
        let fixtures_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("tests")
            .join("fixtures");

        Self { fixtures_dir }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.fixtures_dir.join(name)
    }

    /// `file:` URL of a fixture, as a client would send it in `url_xml` / `url_xsl`
    pub fn url(&self, name: &str) -> String {
        Url::from_file_path(self.path(name))
            .map(|url| url.to_string())
            .unwrap_or_else(|_| panic!("fixture path is not absolute: {}", name))
    }

    pub fn read(&self, name: &str) -> String {
        std::fs::read_to_string(self.path(name))
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {}", name, e))
    }
}

pub fn test_cache_config() -> CacheConfig {
    CacheConfig {
        time_to_idle_seconds: 60,
        max_entries: 100,
    }
}

pub fn request(body: Value) -> Request {
    Request::from_json(body)
}

pub fn url_loader() -> SourceLoader {
    let http = AsyncHttpClient::new(HttpClientConfig {
        timeout_seconds: 5,
        ..Default::default()
    })
    .expect("failed to create HTTP client");
    SourceLoader::new(Arc::new(UrlFetcher::new(http)))
}

pub fn loader_with(fetcher: impl SourceFetcher + 'static) -> SourceLoader {
    SourceLoader::new(Arc::new(fetcher))
}

/// Dispatcher over the real libxml2 engine and the real URL fetcher
pub fn libxml2_dispatcher() -> Dispatcher<LibXml2Engine> {
    Dispatcher::new(
        Arc::new(LibXml2Engine::new()),
        url_loader(),
        &test_cache_config(),
    )
}

pub fn dispatcher_with<E: XmlEngine>(
    engine: Arc<E>,
    loader: SourceLoader,
    config: &CacheConfig,
) -> Dispatcher<E> {
    Dispatcher::new(engine, loader, config)
}
