//! Timer ticks as channel messages.
//!
//! Each periodic component owns one receiver and one dispatcher loop. A tick
//! that arrives while the previous one is still being handled is dropped, so
//! a slow cycle never queues a backlog.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info};

/// One firing of a component's timer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    pub seq: u64,
    pub at: DateTime<Utc>,
}

/// Spawn a timer feeding ticks into a single-slot channel
pub fn ticker(period: Duration, mut shutdown: watch::Receiver<bool>) -> (mpsc::Receiver<Tick>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(1);

    let handle = tokio::spawn(async move {
        let mut interval = time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut seq = 0u64;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    seq += 1;
                    if tx.try_send(Tick { seq, at: Utc::now() }).is_err() {
                        if tx.is_closed() {
                            break;
                        }
                        debug!(seq, "Previous tick still in progress, skipping");
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
    });

    (rx, handle)
}

/// Run `handler` for every tick until the ticker stops or shutdown is signalled
pub async fn drive<F, Fut>(name: &'static str, mut ticks: mpsc::Receiver<Tick>, mut shutdown: watch::Receiver<bool>, mut handler: F)
where
    F: FnMut(Tick) -> Fut,
    Fut: Future<Output = ()>,
{
    info!("{} started", name);

    loop {
        tokio::select! {
            tick = ticks.recv() => match tick {
                Some(tick) => handler(tick).await,
                None => break,
            },
            _ = shutdown.changed() => break,
        }
    }

    info!("{} stopped", name);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_ticks_reach_handler_until_shutdown() {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (ticks, ticker_handle) = ticker(Duration::from_millis(10), shutdown_rx.clone());

        let seen = Arc::new(AtomicU64::new(0));
        let counter = seen.clone();
        let driver = tokio::spawn(drive("test", ticks, shutdown_rx, move |tick| {
            let counter = counter.clone();
            async move {
                counter.store(tick.seq, Ordering::SeqCst);
            }
        }));

        tokio::time::sleep(Duration::from_millis(80)).await;
        shutdown_tx.send(true).unwrap();

        driver.await.unwrap();
        ticker_handle.await.unwrap();
        assert!(seen.load(Ordering::SeqCst) >= 1);
    }
}
