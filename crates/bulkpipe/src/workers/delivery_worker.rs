//! 🎬 *[a channel fills with batches. somewhere, a sink waits.]*
//! *[the clock on the wall reads 2:47am.]*
//!
//! 🗑️ The DeliveryWorker — patient, tireless, strictly one batch at a time. It
//! receives a batch. It sends the batch. It waits for the sink to finish. Then,
//! and only then, the next one. When the channel closes, it closes the sink.
//!
//! ⚠️ If the sink fails, the worker fails, and its channel drops with it. The
//! fan-out notices the closed outlet and stops feeding it.

use anyhow::{Context, Result};
use async_channel::Receiver;
use tokio::task::JoinHandle;
use tracing::debug;

use super::Worker;
use crate::backends::{Sink, SinkBackend};
use crate::common::Batch;

#[derive(Debug)]
pub(crate) struct DeliveryWorker {
    name: String,
    rx: Receiver<Batch>,
    sink: SinkBackend,
}

impl DeliveryWorker {
    pub(crate) fn new(name: impl Into<String>, rx: Receiver<Batch>, sink: SinkBackend) -> Self {
        Self {
            name: name.into(),
            rx,
            sink,
        }
    }
}

impl Worker for DeliveryWorker {
    fn start(mut self) -> JoinHandle<Result<()>> {
        tokio::spawn(async move {
            debug!("📥 DeliveryWorker[{}] started draining its channel", self.name);
            let mut delivered = 0usize;
            while let Ok(batch) = self.rx.recv().await {
                let bytes = batch.len();
                self.sink.send(batch).await.with_context(|| {
                    format!(
                        "💀 DeliveryWorker[{}] failed to deliver batch #{} ({bytes} bytes)",
                        self.name,
                        delivered + 1
                    )
                })?;
                delivered += 1;
            }

            debug!("🏁 DeliveryWorker[{}]: channel closed after {delivered} batches", self.name);
            self.sink
                .close()
                .await
                .with_context(|| format!("💀 DeliveryWorker[{}] failed to close its sink", self.name))?;
            Ok(())
        })
    }
}
