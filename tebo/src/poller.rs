//! Poll loop: fetches updates after the high-water mark, persists them and fans them out
//! to the dispatcher as bounded concurrent tasks.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tebo_core::{BotApi, Result, Update};
use tebo_storage::HistoryStore;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::dispatcher::Dispatcher;

/// Polling cadence and concurrency limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollConfig {
    /// Pause between polls while updates keep arriving.
    pub short_interval: Duration,
    /// Pause between polls once the bot has been idle for `idle_threshold`.
    pub long_interval: Duration,
    pub idle_threshold: Duration,
    /// Maximum number of updates dispatched concurrently.
    pub max_in_flight: usize,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            short_interval: Duration::from_secs(5),
            long_interval: Duration::from_secs(20),
            idle_threshold: Duration::from_secs(60),
            max_in_flight: 64,
        }
    }
}

impl PollConfig {
    /// Pause before the next poll after `idle` without updates.
    pub fn interval(&self, idle: Duration) -> Duration {
        if idle > self.idle_threshold {
            self.long_interval
        } else {
            self.short_interval
        }
    }
}

pub(crate) struct Poller {
    api: Arc<dyn BotApi>,
    dispatcher: Arc<Dispatcher>,
    history: Arc<dyn HistoryStore>,
    config: PollConfig,
    high_water_mark: Arc<AtomicI64>,
    in_flight: Arc<Semaphore>,
}

impl Poller {
    pub(crate) fn new(
        api: Arc<dyn BotApi>,
        dispatcher: Arc<Dispatcher>,
        history: Arc<dyn HistoryStore>,
        config: PollConfig,
        high_water_mark: Arc<AtomicI64>,
    ) -> Self {
        let in_flight = Arc::new(Semaphore::new(config.max_in_flight.max(1)));
        Self {
            api,
            dispatcher,
            history,
            config,
            high_water_mark,
            in_flight,
        }
    }

    /// Polls until `token` is cancelled. Fetch errors are logged and retried after the
    /// normal pause.
    pub(crate) async fn run(&self, token: CancellationToken) {
        info!(
            high_water_mark = self.high_water_mark.load(Ordering::SeqCst),
            "step: poll loop started"
        );
        let mut last_activity = Instant::now();

        while !token.is_cancelled() {
            match self.poll_once(&token).await {
                Ok(Some(0)) => {}
                Ok(Some(count)) => {
                    debug!(count, "step: updates dispatched");
                    last_activity = Instant::now();
                }
                Ok(None) => break,
                Err(e) => warn!(error = %e, "fetching updates failed"),
            }

            let pause = self.config.interval(last_activity.elapsed());
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(pause) => {}
            }
        }

        info!("step: poll loop stopped");
    }

    /// One fetch-persist-dispatch round. Returns the number of dispatched updates, or
    /// `None` when cancelled while fetching or waiting for a dispatch slot.
    async fn poll_once(&self, token: &CancellationToken) -> Result<Option<usize>> {
        let mark = self.high_water_mark.load(Ordering::SeqCst);
        let updates = tokio::select! {
            _ = token.cancelled() => return Ok(None),
            updates = self.api.get_updates(mark + 1) => updates?,
        };

        let fresh = fresh_updates(updates, mark);
        if fresh.is_empty() {
            return Ok(Some(0));
        }

        if let Err(e) = self.history.append(&fresh).await {
            error!(error = %e, count = fresh.len(), "persisting updates failed");
        }

        let count = fresh.len();
        for (dispatched, update) in fresh.into_iter().enumerate() {
            let permit = tokio::select! {
                _ = token.cancelled() => {
                    info!(
                        skipped = count - dispatched,
                        "step: closed while waiting for a dispatch slot"
                    );
                    return Ok(None);
                }
                permit = self.in_flight.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(e) => {
                        error!(error = %e, "dispatch pool closed");
                        break;
                    }
                },
            };
            self.high_water_mark
                .fetch_max(update.update_id, Ordering::SeqCst);

            let dispatcher = self.dispatcher.clone();
            tokio::spawn(async move {
                dispatcher.dispatch_with_permit(update, Some(permit)).await;
            });
        }

        Ok(Some(count))
    }
}

/// Updates strictly after `mark`, ascending and without duplicate ids.
fn fresh_updates(updates: Vec<Update>, mark: i64) -> Vec<Update> {
    let mut fresh: Vec<Update> = updates
        .into_iter()
        .filter(|u| u.update_id > mark)
        .collect();
    fresh.sort_by_key(|u| u.update_id);
    fresh.dedup_by_key(|u| u.update_id);
    fresh
}
