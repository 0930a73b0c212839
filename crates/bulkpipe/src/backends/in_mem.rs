//! # Previously, on bulkpipe...
//!
//! 🎬 The batches were sealed. The endpoints were... not invited. This is a test,
//! and tests don't get to talk to clusters. So the batches go here instead:
//! a Vec behind a Mutex behind an Arc. It's structs all the way down.
//!
//! ⚠️ This is NOT for production. If you're deploying this to prod, please also
//! deploy a therapist.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::trace;

use crate::backends::Sink;
use crate::common::Batch;

/// 📦 A sink that never forgets.
///
/// Clone it before handing it to the pipeline; every clone shares the same Vec, so
/// the copy you kept can peek at what arrived after `shutdown`.
#[derive(Debug, Default, Clone)]
pub struct InMemorySink {
    received: Arc<Mutex<Vec<Batch>>>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// 🔍 Everything received so far, in arrival order.
    pub async fn batches(&self) -> Vec<Batch> {
        self.received.lock().await.clone()
    }
}

#[async_trait]
impl Sink for InMemorySink {
    async fn send(&mut self, batch: Batch) -> Result<()> {
        trace!("📥 InMemorySink stashing {} bytes", batch.len());
        self.received.lock().await.push(batch);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        // 🗑️ nothing to release; we live in RAM
        Ok(())
    }
}
