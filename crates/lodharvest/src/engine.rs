//! Drives path assertions against a store and a fetcher.

use crate::assertion::{PathAssertion, Step};
use crate::path::AssertPath;
use crate::report::{FetchReport, PathAssertionReport};
use chrono::Utc;
use lodharvest_core::{Error, NamedNode, Result, Term};
use lodharvest_fetch::{default_accept, ResourceFetcher};
use lodharvest_store::GraphStore;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct AssertionEngine {
    store: Arc<dyn GraphStore>,
    fetcher: Arc<dyn ResourceFetcher>,
    accept: Vec<String>,
    cancel: CancellationToken,
}

impl AssertionEngine {
    pub fn new(store: Arc<dyn GraphStore>, fetcher: Arc<dyn ResourceFetcher>) -> Self {
        Self {
            store,
            fetcher,
            accept: default_accept(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_accept(mut self, accept: Vec<String>) -> Self {
        self.accept = accept;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn store(&self) -> &Arc<dyn GraphStore> {
        &self.store
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Dereference `uri` and replace its partition with what came back.
    /// A fetch that yields nothing leaves the partition as it was.
    pub async fn harvest(&self, uri: &str) -> Result<FetchReport> {
        let Some(fetched) = self.fetcher.fetch(uri, &self.accept).await else {
            return Ok(FetchReport::failed(uri));
        };
        let report = FetchReport {
            uri: uri.to_string(),
            source: Some(fetched.source.clone()),
            media_type: Some(fetched.media_type.clone()).filter(|m| !m.is_empty()),
            triple_count: fetched.facts.len(),
            success: true,
            fetched_at: Utc::now(),
        };
        if fetched.facts.is_empty() {
            debug!(uri, "fetch returned no facts, partition kept");
            return Ok(report);
        }
        self.store.replace_partition(uri, fetched.facts).await?;
        Ok(report)
    }

    /// Run `assertion` to completion. Store errors and cancellation surface
    /// as `Err`; the assertion keeps whatever it recorded until then.
    pub async fn drive(&self, assertion: &mut PathAssertion) -> Result<()> {
        loop {
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            match assertion.next_step() {
                Step::Check { depth, query, variable } => {
                    let rs = self.store.select(&query, None).await?;
                    let objects: Vec<Term> = rs.column(&variable).cloned().collect();
                    debug!(subject = %assertion.subject(), depth, found = objects.len(), "checked prefix");
                    assertion.on_checked(&objects);
                }
                Step::Fetch { uris, reason } => {
                    debug!(
                        subject = %assertion.subject(),
                        ?reason,
                        count = uris.len(),
                        spent = assertion.fetch_calls(),
                        budget = assertion.budget(),
                        "fetch step"
                    );
                    for uri in uris {
                        if self.cancel.is_cancelled() {
                            return Err(Error::Cancelled);
                        }
                        let report = self.harvest(&uri).await?;
                        assertion.on_fetched(report);
                    }
                }
                Step::Done => return Ok(()),
            }
        }
    }

    /// Drive and log one assertion. Failures become a failed report.
    pub async fn run(&self, assertion: &mut PathAssertion) {
        if let Err(e) = self.drive(assertion).await {
            warn!(subject = %assertion.subject(), path = %assertion.path(), error = %e, "assertion aborted");
            assertion.abort(e.to_string());
            return;
        }
        let report = assertion.report();
        if report.success {
            info!(subject = %report.subject, path = %report.path, depth = report.asserted_depth, "path asserted");
        } else {
            warn!(subject = %report.subject, path = %report.path, bounced = report.bounced, "{}", report.message);
        }
    }

    pub async fn assert(&self, subject: NamedNode, path: AssertPath) -> PathAssertionReport {
        let mut assertion = PathAssertion::new(subject, path);
        self.run(&mut assertion).await;
        assertion.report()
    }
}
