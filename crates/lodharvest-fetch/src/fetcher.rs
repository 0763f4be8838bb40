//! HTTP dereferencing of linked-data resources.

use crate::extract::{Document, ExtractorRegistry};
use crate::jsonld::JSON_LD;
use crate::retry::RetryPolicy;
use lodharvest_core::{rdf_format_for_uri, Error, Fact, Result};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Response};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Media types asked for when the caller has no preference, best first.
pub const DEFAULT_ACCEPT: [&str; 8] = [
    "text/turtle",
    "application/n-triples",
    "application/n-quads",
    "application/trig",
    "application/rdf+xml",
    "text/n3",
    "application/ld+json",
    "text/html",
];

/// Outcome of a successful dereference. `facts` may be empty when the body
/// held nothing parseable.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub requested: String,
    /// Effective URI after redirects.
    pub source: String,
    pub media_type: String,
    pub facts: Vec<Fact>,
}

impl Fetched {
    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }
}

#[async_trait::async_trait]
pub trait ResourceFetcher: Send + Sync {
    /// Dereference `uri`. Ordinary failures (transport, non-2xx after retries)
    /// yield `None`, never an error.
    async fn fetch(&self, uri: &str, accept: &[String]) -> Option<Fetched>;
}

#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub retry: RetryPolicy,
    pub timeout: Duration,
    pub user_agent: String,
    /// Follow companion links found by extractors, one level deep.
    pub follow_companions: bool,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            timeout: Duration::from_secs(30),
            user_agent: format!("lodharvest/{}", env!("CARGO_PKG_VERSION")),
            follow_companions: true,
        }
    }
}

/// Build an Accept header, assigning descending q-values to entries that
/// carry none.
pub fn accept_header(accept: &[String]) -> String {
    let mut parts = Vec::with_capacity(accept.len());
    for (i, media) in accept.iter().enumerate() {
        let media = media.trim();
        if media.is_empty() {
            continue;
        }
        if i == 0 || media.contains(";q=") {
            parts.push(media.to_string());
        } else {
            let q = 10usize.saturating_sub(i).max(1);
            parts.push(format!("{media};q=0.{q}"));
        }
    }
    if parts.is_empty() {
        "*/*".to_string()
    } else {
        parts.join(", ")
    }
}

/// Media type implied by the path extension of `uri`, if any.
pub fn media_type_for_uri(uri: &str) -> Option<String> {
    if let Some(format) = rdf_format_for_uri(uri) {
        return Some(format.media_type().to_string());
    }
    let path = uri.split(['?', '#']).next().unwrap_or(uri);
    path.to_ascii_lowercase()
        .ends_with(".jsonld")
        .then(|| JSON_LD.to_string())
}

pub fn default_accept() -> Vec<String> {
    DEFAULT_ACCEPT.iter().map(|s| s.to_string()).collect()
}

pub struct HttpFetcher {
    client: Client,
    config: FetcherConfig,
    registry: Arc<ExtractorRegistry>,
}

impl HttpFetcher {
    pub fn new(config: FetcherConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| Error::fetch("<client>", e))?;
        Ok(Self {
            client,
            config,
            registry: Arc::new(ExtractorRegistry::with_defaults()),
        })
    }

    pub fn with_registry(mut self, registry: Arc<ExtractorRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }

    async fn get_with_retry(&self, uri: &str, accept: &str) -> Option<Response> {
        let policy = &self.config.retry;
        let mut delay = None;

        for attempt in 0..policy.max_attempts() {
            if let Some(d) = delay.take() {
                tokio::time::sleep(d).await;
            }
            debug!(uri, attempt, "fetching");

            match self.client.get(uri).header(ACCEPT, accept).send().await {
                Ok(resp) if resp.status().is_success() => return Some(resp),
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if !RetryPolicy::is_retryable(status) {
                        warn!(uri, status, "fetch failed");
                        return None;
                    }
                    debug!(uri, status, attempt, "retryable status");
                    delay = Some(
                        policy
                            .retry_after(resp.headers())
                            .unwrap_or_else(|| policy.delay_for_attempt(attempt)),
                    );
                }
                Err(e) if e.is_timeout() || e.is_connect() || e.is_request() => {
                    debug!(uri, attempt, error = %e, "transport error");
                    delay = Some(policy.delay_for_attempt(attempt));
                }
                Err(e) => {
                    warn!(uri, error = %e, "fetch failed");
                    return None;
                }
            }
        }

        warn!(uri, attempts = policy.max_attempts(), "fetch failed after retries");
        None
    }

    /// One document: GET, then extract. Returns companion links alongside.
    async fn fetch_document(&self, uri: &str, accept: &str) -> Option<(Fetched, Vec<String>)> {
        let resp = self.get_with_retry(uri, accept).await?;
        let source = resp.url().to_string();
        let mut media_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(';').next())
            .map(|v| v.trim().to_ascii_lowercase())
            .unwrap_or_default();

        let body = match resp.bytes().await {
            Ok(b) => b,
            Err(e) => {
                warn!(uri, error = %e, "reading body failed");
                return None;
            }
        };

        let mut extractor = self.registry.resolve(&media_type);
        if extractor.is_none() {
            // servers often send text/plain or octet-stream for dump files
            if let Some(guessed) = media_type_for_uri(&source) {
                media_type = guessed;
                extractor = self.registry.resolve(&media_type);
            }
        }

        let mut fetched = Fetched {
            requested: uri.to_string(),
            source,
            media_type,
            facts: Vec::new(),
        };
        let Some(extractor) = extractor else {
            debug!(uri, media_type = %fetched.media_type, "no extractor for media type");
            return Some((fetched, Vec::new()));
        };

        let doc = Document {
            uri: &fetched.source,
            media_type: &fetched.media_type,
            body: &body,
        };
        match extractor.extract(&doc) {
            Ok(extraction) => {
                fetched.facts = extraction.facts;
                Some((fetched, extraction.follow))
            }
            Err(e) => {
                warn!(uri, extractor = extractor.name(), error = %e, "parse failed");
                Some((fetched, Vec::new()))
            }
        }
    }
}

#[async_trait::async_trait]
impl ResourceFetcher for HttpFetcher {
    async fn fetch(&self, uri: &str, accept: &[String]) -> Option<Fetched> {
        let accept = accept_header(accept);
        let (mut fetched, follow) = self.fetch_document(uri, &accept).await?;

        if self.config.follow_companions {
            for companion in follow {
                if companion == fetched.source {
                    continue;
                }
                if let Some((more, _)) = self.fetch_document(&companion, &accept).await {
                    debug!(uri, companion = %companion, count = more.facts.len(), "companion facts");
                    fetched.facts.extend(more.facts);
                }
            }
        }

        debug!(uri, source = %fetched.source, count = fetched.facts.len(), "fetched");
        Some(fetched)
    }
}
