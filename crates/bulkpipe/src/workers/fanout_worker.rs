//! 🎬 *[one batch walks in. N identical batches walk out.]*
//! *[the FanOutWorker waits until every last one of them has a seat.]*
//! *[only then does it go back for the next batch.]*
//!
//! 📣 Each outlet is a capacity-1 channel into one delivery worker. The next batch
//! isn't pulled until every outlet has accepted the current one, so the slowest
//! endpoint sets the pace for everybody upstream.
//!
//! 🧠 A closed outlet means its delivery worker has faulted. We log it, stop
//! feeding it, and keep going for the others. If they're ALL gone, we give up too.

use anyhow::{Result, bail};
use async_channel::{Receiver, Sender};
use futures::future::join_all;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::Worker;
use crate::common::Batch;

/// 🚪 One way out of the fan-out, named after the sink behind it.
#[derive(Debug)]
pub(crate) struct Outlet {
    name: String,
    tx: Sender<Batch>,
}

impl Outlet {
    pub(crate) fn new(name: impl Into<String>, tx: Sender<Batch>) -> Self {
        Self {
            name: name.into(),
            tx,
        }
    }
}

#[derive(Debug)]
pub(crate) struct FanOutWorker {
    rx: Receiver<Batch>,
    outlets: Vec<Outlet>,
}

impl FanOutWorker {
    pub(crate) fn new(rx: Receiver<Batch>, outlets: Vec<Outlet>) -> Self {
        Self { rx, outlets }
    }
}

impl Worker for FanOutWorker {
    fn start(mut self) -> JoinHandle<Result<()>> {
        tokio::spawn(async move {
            debug!("📣 FanOutWorker started with {} outlets", self.outlets.len());
            while let Ok(batch) = self.rx.recv().await {
                let the_handoffs = self.outlets.iter().map(|outlet| outlet.tx.send(batch.clone()));
                let mut the_outcomes = join_all(the_handoffs).await.into_iter();

                // 🪦 outcomes line up with outlets, so retain walks them in lockstep
                self.outlets.retain(|outlet| match the_outcomes.next() {
                    Some(Err(_)) => {
                        warn!("⚠️ Outlet '{}' has closed; its delivery worker faulted. Carrying on without it.", outlet.name);
                        false
                    }
                    _ => true,
                });

                if self.outlets.is_empty() {
                    bail!("💀 Every delivery outlet has closed. There is nobody left to deliver to.");
                }
            }

            // 🏁 dropping the outlets closes them; each delivery worker drains and finishes
            debug!("🏁 FanOutWorker: upstream closed, releasing {} outlets", self.outlets.len());
            Ok(())
        })
    }
}
