//! 🔌 Backends — where sealed batches finally leave the building.
//!
//! 🚰 Upstream, operations get serialized and batched and fanned out. Down here, a
//! batch is just bytes, and a sink's only job is to put those bytes somewhere:
//! an Elasticsearch `_bulk` endpoint, a Vec in RAM, or a channel somebody else drains.
//!
//! 🦆 The duck is here because every file must have one. This is law.

use anyhow::Result;
use async_trait::async_trait;

use crate::common::Batch;

pub mod channel;
pub mod elasticsearch;
pub mod in_mem;

pub use channel::ChannelSink;
pub use elasticsearch::{ElasticsearchSink, Endpoint};
pub use in_mem::InMemorySink;

/// 🕳️ A sink that sends sealed batches. Pure I/O, zero logic.
///
/// Sinks do not buffer, serialize, or retry. They get a finished body and deliver it.
///
/// # Contract 📜
/// - `send` delivers one batch. An `Err` is fatal for this sink's delivery worker.
/// - `close` is called exactly once, after the last batch, when the upstream closes.
#[async_trait]
pub trait Sink: std::fmt::Debug + Send {
    /// 📡 Deliver one batch.
    async fn send(&mut self, batch: Batch) -> Result<()>;
    /// 🗑️ Flush, finalize, release.
    async fn close(&mut self) -> Result<()>;
}

/// 🎭 The many faces of a Sink. The delivery worker doesn't care which one it got.
#[derive(Debug)]
pub enum SinkBackend {
    Elasticsearch(ElasticsearchSink),
    InMemory(InMemorySink),
    Channel(ChannelSink),
}

impl SinkBackend {
    /// 🏷️ A short human label, used to name the worker that drives this sink.
    pub fn describe(&self) -> String {
        match self {
            SinkBackend::Elasticsearch(sink) => sink.endpoint().bulk_url().to_string(),
            SinkBackend::InMemory(_) => "in-memory".to_string(),
            SinkBackend::Channel(_) => "channel".to_string(),
        }
    }
}

#[async_trait]
impl Sink for SinkBackend {
    async fn send(&mut self, batch: Batch) -> Result<()> {
        match self {
            SinkBackend::Elasticsearch(sink) => sink.send(batch).await,
            SinkBackend::InMemory(sink) => sink.send(batch).await,
            SinkBackend::Channel(sink) => sink.send(batch).await,
        }
    }

    async fn close(&mut self) -> Result<()> {
        match self {
            SinkBackend::Elasticsearch(sink) => sink.close().await,
            SinkBackend::InMemory(sink) => sink.close().await,
            SinkBackend::Channel(sink) => sink.close().await,
        }
    }
}

impl From<ElasticsearchSink> for SinkBackend {
    fn from(sink: ElasticsearchSink) -> Self {
        SinkBackend::Elasticsearch(sink)
    }
}

impl From<InMemorySink> for SinkBackend {
    fn from(sink: InMemorySink) -> Self {
        SinkBackend::InMemory(sink)
    }
}

impl From<ChannelSink> for SinkBackend {
    fn from(sink: ChannelSink) -> Self {
        SinkBackend::Channel(sink)
    }
}
