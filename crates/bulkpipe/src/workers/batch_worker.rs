//! 🎬 *[operations trickle in, one by one, in the order they were sent.]*
//! *[the buffer grows. a mebibyte. a mebibyte and change.]*
//! *[SEALED. off to the fan-out. a fresh buffer, empty, hopeful.]*
//!
//! 📦 The BatchWorker: serializes operations into a buffer and seals the buffer
//! into a `Batch` the moment it reaches the threshold. Whatever is left when the
//! input closes gets sealed too. Nothing is left behind. Nobody is left behind.

use anyhow::{Context, Result};
use async_channel::{Receiver, Sender};
use tokio::task::JoinHandle;
use tracing::debug;

use super::Worker;
use crate::common::{Batch, BulkOperation};
use crate::serializer::BulkSerializer;

#[derive(Debug)]
pub(crate) struct BatchWorker {
    rx: Receiver<BulkOperation>,
    tx: Sender<Batch>,
    serializer: BulkSerializer,
    target_bulk_size_in_bytes: usize,
}

impl BatchWorker {
    pub(crate) fn new(
        rx: Receiver<BulkOperation>,
        tx: Sender<Batch>,
        serializer: BulkSerializer,
        target_bulk_size_in_bytes: usize,
    ) -> Self {
        Self {
            rx,
            tx,
            serializer,
            target_bulk_size_in_bytes,
        }
    }

    async fn seal(&self, buffer: &mut Vec<u8>, sealed_so_far: &mut usize) -> Result<()> {
        let the_batch = Batch::from(std::mem::take(buffer));
        *sealed_so_far += 1;
        debug!(
            batch = *sealed_so_far,
            bytes = the_batch.len(),
            "📦 BatchWorker sealed a batch"
        );
        self.tx
            .send(the_batch)
            .await
            .context("💀 BatchWorker sealed a batch but the fan-out stage has already hung up")
    }
}

impl Worker for BatchWorker {
    fn start(self) -> JoinHandle<Result<()>> {
        tokio::spawn(async move {
            debug!("📥 BatchWorker started, threshold {} bytes", self.target_bulk_size_in_bytes);
            let mut buffer = Vec::new();
            let mut sealed_so_far = 0usize;

            while let Ok(op) = self.rx.recv().await {
                self.serializer.write(&op, &mut buffer).with_context(|| {
                    format!(
                        "💀 BatchWorker could not serialize a {} for index '{}'; the batch in progress is discarded",
                        op.verb(),
                        op.target().index
                    )
                })?;
                if buffer.len() >= self.target_bulk_size_in_bytes {
                    self.seal(&mut buffer, &mut sealed_so_far).await?;
                }
            }

            // 🧹 input closed; the remainder ships before downstream hears about it
            if !buffer.is_empty() {
                self.seal(&mut buffer, &mut sealed_so_far).await?;
            }
            debug!("🏁 BatchWorker: input closed after {sealed_so_far} batches");
            Ok(())
        })
    }
}
