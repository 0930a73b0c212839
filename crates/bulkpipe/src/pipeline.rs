//! 🚚 The Pipeline — the front desk. Operations go in; batches go out to every endpoint.
//!
//! 🎬 COLD OPEN — INT. LOADING DOCK — DAWN
//!
//! Two clusters. One stream of writes. Every batch has to reach both of them,
//! in order, and if either one gets slow the whole dock slows down with it.
//! Nobody gets ahead. Nobody gets left behind. Unless they crash. Then they
//! get left behind, loudly.
//!
//! 🧠 Knowledge graph:
//! - `Pipeline::new(urls, options)` → one `ElasticsearchSink` per URL, one shared signer
//! - `Pipeline::with_sinks(sinks, options)` → bring your own final targets
//! - `send(op)` → waits when the pipeline is busy; fails once it has faulted
//! - `shutdown()` → flush the remainder, drain every endpoint, report the first fault
//!
//! ⚠️ Spawns tokio tasks on construction: build it inside a runtime.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, anyhow};
use async_channel::Sender;
use reqwest::Client;
use tracing::debug;

use crate::backends::{ElasticsearchSink, Endpoint, SinkBackend};
use crate::common::BulkOperation;
use crate::error::{PipelineError, Result};
use crate::serializer::BulkSerializer;
use crate::signing::{
    AwsSdkCredentialProvider, CredentialProvider, DEFAULT_CREDENTIAL_TTL, ElasticsearchSigner,
};
use crate::supervisors::Supervisor;
use crate::workers::{BatchWorker, DeliveryWorker, FanOutWorker, Outlet, Worker};

/// 📏 One mebibyte. Crossing it seals the batch.
pub const DEFAULT_TARGET_BULK_SIZE_IN_BYTES: usize = 1 << 20;

/// 🏭 Builds one `reqwest::Client` per endpoint.
pub type HttpClientFactory = Arc<dyn Fn() -> reqwest::Result<Client> + Send + Sync>;

/// 🔧 Knobs for a pipeline session.
#[derive(Clone)]
pub struct PipelineOptions {
    /// a batch is sealed once its size reaches this many bytes
    pub target_bulk_size_in_bytes: usize,
    /// drop `_type` from every header line, for typeless clusters
    pub omit_type_headers: bool,
    /// how many operations may wait between `send` and the batching stage
    pub queue_capacity: usize,
    /// `None` means `reqwest::Client::new()`-style defaults
    pub http_client_factory: Option<HttpClientFactory>,
    /// `None` means the AWS SDK default credential chain
    pub credential_provider: Option<Arc<dyn CredentialProvider>>,
    pub credential_ttl: Duration,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            target_bulk_size_in_bytes: DEFAULT_TARGET_BULK_SIZE_IN_BYTES,
            omit_type_headers: false,
            queue_capacity: 1,
            http_client_factory: None,
            credential_provider: None,
            credential_ttl: DEFAULT_CREDENTIAL_TTL,
        }
    }
}

impl fmt::Debug for PipelineOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineOptions")
            .field("target_bulk_size_in_bytes", &self.target_bulk_size_in_bytes)
            .field("omit_type_headers", &self.omit_type_headers)
            .field("queue_capacity", &self.queue_capacity)
            .field(
                "http_client_factory",
                &self.http_client_factory.as_ref().map(|_| "custom"),
            )
            .field("credential_provider", &self.credential_provider)
            .field("credential_ttl", &self.credential_ttl)
            .finish()
    }
}

/// 🚚 A running pipeline session.
#[derive(Debug)]
pub struct Pipeline {
    op_tx: Sender<BulkOperation>,
    supervisor: Supervisor,
}

impl Pipeline {
    /// 🚀 Deliver to every URL in `target_urls`. Managed (`*.<region>.es.amazonaws.com`)
    /// hosts get SigV4-signed requests; the rest go out unsigned.
    pub fn new<S: AsRef<str>>(target_urls: &[S], options: PipelineOptions) -> Result<Self> {
        if target_urls.is_empty() {
            return Err(PipelineError::configuration(
                "at least one target URL is required",
            ));
        }

        let provider = options
            .credential_provider
            .clone()
            .unwrap_or_else(|| Arc::new(AwsSdkCredentialProvider::new()));
        let signer = Arc::new(ElasticsearchSigner::new(provider, options.credential_ttl));

        let mut sinks = Vec::with_capacity(target_urls.len());
        for url in target_urls {
            let endpoint = Endpoint::parse(url.as_ref())?;
            let client = match &options.http_client_factory {
                Some(factory) => factory(),
                None => Client::builder().build(),
            }
            .map_err(|e| {
                PipelineError::configuration(format!(
                    "could not build an HTTP client for {}: {e}",
                    endpoint.base_url()
                ))
            })?;
            sinks.push(SinkBackend::Elasticsearch(ElasticsearchSink::new(
                endpoint,
                client,
                Arc::clone(&signer),
            )));
        }

        Self::with_sinks(sinks, options)
    }

    /// 🎭 Deliver to caller-supplied sinks: clusters, memory, channels, any mix.
    pub fn with_sinks(sinks: Vec<SinkBackend>, options: PipelineOptions) -> Result<Self> {
        if sinks.is_empty() {
            return Err(PipelineError::configuration("at least one sink is required"));
        }
        if options.target_bulk_size_in_bytes == 0 {
            return Err(PipelineError::configuration(
                "target_bulk_size_in_bytes must be greater than zero",
            ));
        }
        if options.queue_capacity == 0 {
            return Err(PipelineError::configuration(
                "queue_capacity must be greater than zero",
            ));
        }

        let (op_tx, op_rx) = async_channel::bounded(options.queue_capacity);
        let (batch_tx, batch_rx) = async_channel::bounded(1);
        let mut supervisor = Supervisor::new();

        // 📋 downstream first, so a delivery fault outranks the echoes it causes upstream
        let mut outlets = Vec::with_capacity(sinks.len());
        for (n, sink) in sinks.into_iter().enumerate() {
            let name = format!("delivery[{n}:{}]", sink.describe());
            let (tx, rx) = async_channel::bounded(1);
            outlets.push(Outlet::new(name.clone(), tx));
            supervisor.watch(name.clone(), DeliveryWorker::new(name, rx, sink).start());
        }
        debug!("🚚 Pipeline starting with {} outlets, {options:?}", outlets.len());

        supervisor.watch("fan-out", FanOutWorker::new(batch_rx, outlets).start());
        supervisor.watch(
            "batcher",
            BatchWorker::new(
                op_rx,
                batch_tx,
                BulkSerializer::new(options.omit_type_headers),
                options.target_bulk_size_in_bytes,
            )
            .start(),
        );

        Ok(Self { op_tx, supervisor })
    }

    /// 📥 Queue one operation. Waits while the pipeline is full.
    ///
    /// Fails once the pipeline has faulted; `shutdown` reports why.
    pub async fn send(&mut self, op: BulkOperation) -> anyhow::Result<()> {
        self.op_tx.send(op).await.map_err(|_| {
            anyhow!("💀 The pipeline has faulted and stopped accepting operations. Call shutdown() to find out why.")
        })
    }

    /// 🏁 No more operations. Flush the remainder, let every endpoint drain, and
    /// report how it went. Resolves with the first fault observed, if any.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        let Self { op_tx, supervisor } = self;
        drop(op_tx);
        supervisor
            .wait()
            .await
            .context("💀 The bulk pipeline did not complete cleanly")
    }
}
