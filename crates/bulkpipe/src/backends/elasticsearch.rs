//! # 📡 THE ELASTICSEARCH BACKEND
//!
//! *Previously, on bulkpipe...*
//!
//! 🎬 COLD OPEN — INT. SERVER ROOM — 3:47 AM
//!
//! The dashboard glows amber. A batch of exactly one mebibyte (and a little bit)
//! sits sealed on the loading dock. Somewhere, a cluster waits. Maybe it's in a
//! closet down the hall. Maybe it's in `us-east-1` and wants to see your papers.
//! Either way, this module drives the truck.
//!
//! 🧠 Knowledge graph:
//! - `Endpoint` → base URL + optional SigV4 region, sniffed from the host
//! - `ElasticsearchSink` → one per endpoint, owns its own `reqwest::Client`
//! - `send` → POST `<base>/_bulk`, sign if managed, 2xx or die trying
//! - on failure: the response gets dumped to the error log (status, headers,
//!   first 4 KiB of body) and the sink returns `PipelineError::Delivery`
//!
//! ⚠️ No retries. A non-2xx is fatal for this endpoint. Other endpoints carry on.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response, Url};
use tracing::{debug, error, info};

use crate::backends::Sink;
use crate::common::Batch;
use crate::error::PipelineError;
use crate::signing::{ElasticsearchSigner, managed_region};

/// 📏 How much of a failed response body makes it into the error log.
const MAX_DUMPED_BODY_BYTES: usize = 4 * 1024;
const TRUNCATION_MARKER: &str = "<==== Response Truncated Due to Length ====>";

/// 🎯 A cluster to deliver to: where it lives, and which region signs for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    base_url: Url,
    bulk_url: Url,
    region: Option<String>,
}

impl Endpoint {
    /// 🔧 Parse a base URL. Hosts like `*.us-east-1.es.amazonaws.com` get a region
    /// (and therefore signed requests); everything else goes out unsigned.
    pub fn parse(url: &str) -> crate::error::Result<Self> {
        let base_url = Url::parse(url).map_err(|e| {
            PipelineError::configuration(format!("'{url}' is not a valid endpoint URL: {e}"))
        })?;
        let host = base_url.host_str().ok_or_else(|| {
            PipelineError::configuration(format!("'{url}' has no host to deliver to"))
        })?;
        let region = managed_region(host);
        // 🔗 one slash of difference, infinite suffering of difference.
        // The path is set on its own so a `?query` or `#fragment` on the base can't swallow it.
        let mut bulk_url = base_url.clone();
        bulk_url.set_query(None);
        bulk_url.set_fragment(None);
        bulk_url.set_path(&format!("{}/_bulk", base_url.path().trim_end_matches('/')));
        Ok(Self {
            base_url,
            bulk_url,
            region,
        })
    }

    /// 🗺️ Force a signing region, for managed domains reached through a proxy or a
    /// VPC alias whose hostname doesn't give the region away.
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn bulk_url(&self) -> &Url {
        &self.bulk_url
    }

    pub fn region(&self) -> Option<&str> {
        self.region.as_deref()
    }
}

/// 📡 POSTs sealed batches to one cluster's `_bulk` API.
///
/// Holds its own `reqwest::Client`, dropped with the sink when the delivery
/// worker finishes, and shares the pipeline's one `ElasticsearchSigner`.
#[derive(Debug)]
pub struct ElasticsearchSink {
    client: Client,
    endpoint: Endpoint,
    signer: Arc<ElasticsearchSigner>,
}

impl ElasticsearchSink {
    pub fn new(endpoint: Endpoint, client: Client, signer: Arc<ElasticsearchSigner>) -> Self {
        Self {
            client,
            endpoint,
            signer,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn delivery_error(&self, reason: String, source: Option<reqwest::Error>) -> PipelineError {
        PipelineError::Delivery {
            url: self.endpoint.bulk_url().to_string(),
            reason,
            source,
        }
    }
}

#[async_trait]
impl Sink for ElasticsearchSink {
    /// 📡 One batch, one POST. Signed when the endpoint has a region.
    async fn send(&mut self, batch: Batch) -> Result<()> {
        let bytes_out = batch.len();
        let bulk_url = self.endpoint.bulk_url().clone();
        debug!("📡 Sending {bytes_out} bytes to {bulk_url}");

        let mut request = self
            .client
            .post(bulk_url.clone())
            // ⚠️ application/x-ndjson, not application/json. The cluster cares.
            .header(CONTENT_TYPE, "application/x-ndjson")
            .body(batch.into_bytes())
            .build()
            .map_err(|e| self.delivery_error("could not build the request".to_string(), Some(e)))?;

        if let Some(region) = self.endpoint.region() {
            self.signer
                .sign(&mut request, region)
                .await
                .with_context(|| format!("💀 Could not sign the bulk request for {bulk_url}"))?;
        }

        let response = self.client.execute(request).await.map_err(|e| {
            self.delivery_error("the request never got an answer".to_string(), Some(e))
        })?;

        let status = response.status();
        if !status.is_success() {
            let the_dump = dump_response(response).await;
            error!("💀 {bulk_url} rejected a {bytes_out} byte batch:\n{the_dump}");
            return Err(anyhow::Error::new(self.delivery_error(format!("HTTP {status}"), None))
                .context("💀 The bulk request arrived, and Elasticsearch said no. The dump above has the details."));
        }

        info!(bytes = bytes_out, url = %bulk_url, "✅ Wrote {bytes_out} bytes to /_bulk API");
        Ok(())
    }

    /// 🗑️ Nothing buffered, nothing to flush. The client drops with the sink.
    async fn close(&mut self) -> Result<()> {
        debug!("🗑️ Elasticsearch sink for {} closing", self.endpoint.bulk_url());
        Ok(())
    }
}

/// 🩻 Status line, headers, and the first 4 KiB of the body, for the error log.
async fn dump_response(mut response: Response) -> String {
    let mut the_dump = format!("HTTP {}\n", response.status());
    for (name, value) in response.headers() {
        the_dump.push_str(&format!("{name}: {}\n", String::from_utf8_lossy(value.as_bytes())));
    }
    the_dump.push('\n');

    let mut body = Vec::new();
    let mut truncated = false;
    loop {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                body.extend_from_slice(&chunk);
                if body.len() > MAX_DUMPED_BODY_BYTES {
                    body.truncate(MAX_DUMPED_BODY_BYTES);
                    truncated = true;
                    break;
                }
            }
            Ok(None) => break,
            Err(err) => {
                the_dump.push_str(&format!("<body unreadable: {err}>\n"));
                break;
            }
        }
    }

    the_dump.push_str(&String::from_utf8_lossy(&body));
    if truncated {
        the_dump.push('\n');
        the_dump.push_str(TRUNCATION_MARKER);
    }
    the_dump
}
