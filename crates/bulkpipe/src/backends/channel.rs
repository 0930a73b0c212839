//! 📬 ChannelSink — hand the batch to whoever is on the other end of a channel.
//!
//! For callers that want their own final target: give us the sending half of a
//! bounded `async_channel`, drain the receiving half at your own pace. If you
//! stop draining, the whole pipeline politely stops with you.

use anyhow::{Context, Result};
use async_channel::Sender;
use async_trait::async_trait;
use tracing::debug;

use crate::backends::Sink;
use crate::common::Batch;

#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: Sender<Batch>,
}

impl ChannelSink {
    pub fn new(tx: Sender<Batch>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl Sink for ChannelSink {
    async fn send(&mut self, batch: Batch) -> Result<()> {
        self.tx
            .send(batch)
            .await
            .context("💀 ChannelSink's receiver hung up. Nobody is listening on the other end.")
    }

    /// 🚪 Closes the channel so the consumer sees end-of-stream once it drains.
    async fn close(&mut self) -> Result<()> {
        debug!("🏁 ChannelSink closing its channel");
        self.tx.close();
        Ok(())
    }
}
