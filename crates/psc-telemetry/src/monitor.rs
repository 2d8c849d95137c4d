//! Periodic sensor push with a stop signal.
//!
//! Each tick awaits its submission before the next tick is taken, so two
//! submissions never overlap. Ticks that fall behind are skipped rather than
//! burst. Stopping prevents further ticks; already-submitted readings stay.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::info;

pub struct MonitorHandle {
    stop_tx: watch::Sender<bool>,
    join: JoinHandle<u64>,
}

impl MonitorHandle {
    /// Signal stop and wait for the loop to exit. Returns the number of
    /// ticks that ran. An in-flight tick is allowed to finish.
    pub async fn stop(self) -> u64 {
        let _ = self.stop_tx.send(true);
        self.join.await.unwrap_or(0)
    }

    /// Wait for a bounded monitor to run out of ticks.
    pub async fn finished(self) -> u64 {
        self.join.await.unwrap_or(0)
    }

    /// Wait for the monitor to run out of ticks, or stop it as soon as
    /// `interrupt` resolves. Returns the ticks that ran and the interrupt's
    /// output if it fired first.
    pub async fn finished_or<F: Future>(mut self, interrupt: F) -> (u64, Option<F::Output>) {
        tokio::select! {
            n = &mut self.join => (n.unwrap_or(0), None),
            out = interrupt => (self.stop().await, Some(out)),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

/// Spawn a loop calling `tick(n)` every `interval`, first call immediately.
///
/// `max_ticks` bounds the run; `None` runs until stopped.
pub fn spawn_monitor<F, Fut>(
    name: impl Into<String>,
    interval: Duration,
    max_ticks: Option<u64>,
    mut tick: F,
) -> MonitorHandle
where
    F: FnMut(u64) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let name = name.into();
    let (stop_tx, mut stop_rx) = watch::channel(false);

    let join = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut n = 0u64;
        loop {
            if max_ticks.is_some_and(|max| n >= max) {
                break;
            }
            tokio::select! {
                biased;
                _ = stop_rx.changed() => break,
                _ = ticker.tick() => {}
            }
            if *stop_rx.borrow() {
                break;
            }
            tick(n).await;
            n += 1;
        }
        info!(monitor = %name, ticks = n, "monitor stopped");
        n
    });

    MonitorHandle { stop_tx, join }
}
