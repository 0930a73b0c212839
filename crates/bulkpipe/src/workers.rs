//! 🧵 Workers: the ones who actually do the work while the Supervisor takes all the
//! credit in the sprint retro.
//!
//! Three kinds, wired in a line by `Pipeline`:
//!
//! ```text
//! ops ──▶ BatchWorker ──(cap 1)──▶ FanOutWorker ──(cap 1 each)──▶ DeliveryWorker × N ──▶ Sink
//! ```
//!
//! Every arrow is a bounded `async_channel`. When the last arrow is full, everything
//! to its left waits. That's the backpressure. There is no other backpressure.
//!
//! ⚠️ Workers are private. The outside world talks to the `Pipeline`, not to us. 🦆

use anyhow::Result;
use tokio::task::JoinHandle;

mod batch_worker;
mod delivery_worker;
mod fanout_worker;

pub(crate) use batch_worker::BatchWorker;
pub(crate) use delivery_worker::DeliveryWorker;
pub(crate) use fanout_worker::{FanOutWorker, Outlet};

/// 🏗️ A background worker, that does work. duh.
///
/// Consumes itself, spawns onto the runtime, and hands back the handle so a
/// supervisor can find out how it went.
pub(crate) trait Worker {
    fn start(self) -> JoinHandle<Result<()>>;
}
