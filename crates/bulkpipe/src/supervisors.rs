//! 🎬 *[camera pans across a dimly lit server room]*
//! 🎬 "In a world where workers toil endlessly..."
//! 🎬 "One supervisor dared to wait for them all."
//! 🎬 *[record scratch]* 🦆
//!
//! 📦 The Supervisor holds every worker's `JoinHandle` and turns N completions into
//! one. All Ok → Ok. A fault → that fault, with the worker's name on it. When the
//! first fault shows up and other workers have already finished badly too, the one
//! watched earliest wins, whatever order the completions happened to be polled in.
//!
//! ⚠️ On a fault the other workers are NOT cancelled. Dropping a `JoinHandle`
//! detaches the task; whatever the healthy delivery workers already have in hand,
//! they finish delivering. No rollback, no take-backs.

use anyhow::{Context, Result};
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use tokio::task::{JoinError, JoinHandle};
use tracing::debug;

/// 👀 Watches named workers until they're all done, or one of them isn't fine.
#[derive(Debug, Default)]
pub(crate) struct Supervisor {
    workers: Vec<(String, JoinHandle<Result<()>>)>,
}

impl Supervisor {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// 📋 Add a worker to the watch list. When several watched workers have already
    /// faulted, the one watched first is reported, so register the most downstream
    /// ones first: their faults are usually the root cause.
    pub(crate) fn watch(&mut self, name: impl Into<String>, handle: JoinHandle<Result<()>>) {
        self.workers.push((name.into(), handle));
    }

    /// ⏳ Resolve once every worker is Ok, or as soon as any one of them faults.
    pub(crate) async fn wait(self) -> Result<()> {
        let mut the_running: FuturesUnordered<_> = self
            .workers
            .into_iter()
            .enumerate()
            .map(|(index, (name, handle))| async move { (index, name, handle.await) })
            .collect();

        while let Some((index, name, outcome)) = the_running.next().await {
            let Some(fault) = fault_of(&name, outcome) else {
                continue;
            };

            // 🧹 whoever else is already done gets a say. lowest watch index wins.
            let mut the_root_cause = (index, fault);
            while let Some(Some((index, name, outcome))) = the_running.next().now_or_never() {
                let Some(fault) = fault_of(&name, outcome) else {
                    continue;
                };
                if index < the_root_cause.0 {
                    debug!("⚠️ also faulted, but watched later: {:#}", the_root_cause.1);
                    the_root_cause = (index, fault);
                } else {
                    debug!("⚠️ also faulted, but watched later: {fault:#}");
                }
            }
            return Err(the_root_cause.1);
        }
        Ok(())
    }
}

/// 🩺 `None` for a clean exit, the named fault otherwise.
fn fault_of(
    name: &str,
    outcome: std::result::Result<Result<()>, JoinError>,
) -> Option<anyhow::Error> {
    match outcome {
        Ok(Ok(())) => {
            debug!("✅ {name} finished cleanly");
            None
        }
        Ok(Err(fault)) => Some(fault.context(format!("💀 {name} faulted"))),
        Err(join_error) => Some(
            anyhow::Error::new(join_error).context(format!("💀 {name} panicked or was cancelled")),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn the_one_where_everyone_clocks_out_on_time() -> Result<()> {
        let mut the_supervisor = Supervisor::new();
        for n in 0..3u64 {
            the_supervisor.watch(
                format!("worker-{n}"),
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(n * 5)).await;
                    Ok(())
                }),
            );
        }
        the_supervisor.wait().await
    }

    #[tokio::test]
    async fn the_one_where_one_bad_apple_is_named_and_shamed() {
        let mut the_supervisor = Supervisor::new();
        the_supervisor.watch("the-good-one", tokio::spawn(async { Ok(()) }));
        the_supervisor.watch(
            "the-bad-apple",
            tokio::spawn(async { Err(anyhow::anyhow!("🍎 rotten")) }),
        );

        let the_fault = the_supervisor.wait().await.expect_err("💀 a fault must surface");
        let the_story = format!("{the_fault:#}");
        assert!(the_story.contains("the-bad-apple"), "got {the_story}");
        assert!(the_story.contains("rotten"), "got {the_story}");
    }

    #[tokio::test]
    async fn the_one_where_a_fault_does_not_wait_for_the_slowpoke() {
        let mut the_supervisor = Supervisor::new();
        the_supervisor.watch(
            "the-slowpoke",
            tokio::spawn(async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            }),
        );
        the_supervisor.watch("the-quitter", tokio::spawn(async { anyhow::bail!("done") }));

        let the_outcome =
            tokio::time::timeout(Duration::from_secs(5), the_supervisor.wait()).await;
        assert!(matches!(the_outcome, Ok(Err(_))), "the fault should win the race");
    }

    #[tokio::test]
    async fn the_one_where_the_earliest_watched_fault_takes_the_blame() {
        // 🎬 both are done before anyone waits. watch order decides, finish order doesn't.
        for the_echo_goes_first in [true, false] {
            let the_echo = tokio::spawn(async { Err::<(), _>(anyhow::anyhow!("outlet closed")) });
            let the_root = tokio::spawn(async { Err::<(), _>(anyhow::anyhow!("connection reset")) });
            while !(the_echo.is_finished() && the_root.is_finished()) {
                tokio::task::yield_now().await;
            }

            let mut the_supervisor = Supervisor::new();
            if the_echo_goes_first {
                the_supervisor.watch("the-echo", the_echo);
                the_supervisor.watch("the-root", the_root);
            } else {
                the_supervisor.watch("the-root", the_root);
                the_supervisor.watch("the-echo", the_echo);
            }
            the_supervisor.watch(
                "the-slowpoke",
                tokio::spawn(async {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(())
                }),
            );

            let the_fault = the_supervisor.wait().await.expect_err("💀 a fault must surface");
            let the_story = format!("{the_fault:#}");
            let the_expected = if the_echo_goes_first { "outlet closed" } else { "connection reset" };
            assert!(the_story.contains(the_expected), "got {the_story}");
        }
    }
}
