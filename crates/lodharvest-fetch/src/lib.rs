//! lodharvest fetch - dereferencing remote resources into facts

pub mod extract;
pub mod fetcher;
pub mod html;
pub mod jsonld;
pub mod retry;

pub use extract::{ContentExtractor, Document, Extraction, ExtractorRegistry, RdfExtractor};
pub use fetcher::{
    accept_header, default_accept, media_type_for_uri, FetcherConfig, Fetched, HttpFetcher, ResourceFetcher, DEFAULT_ACCEPT,
};
pub use html::HtmlExtractor;
pub use jsonld::{is_json_ld, parse_json_ld, JsonLdExtractor, JSON_LD};
pub use retry::{RetryPolicy, RETRYABLE_STATUSES};
