//! Periodic account-count poll.

use std::time::Duration;
use tokio::{
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};

use crate::{
    context::{cancelled, CancellationSignal, OperationContext},
    service::AccountService,
};

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);
/// Shorter intervals, zero included, are raised to this.
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorSettings {
    pub interval: Duration,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
        }
    }
}

/// Log the account count every `every` until `cancel` fires.
///
/// Each poll is bounded by one interval and by the same signal. `every` is
/// clamped to [`MIN_INTERVAL`].
pub fn spawn_count_monitor(
    service: AccountService,
    every: Duration,
    cancel: &CancellationSignal,
) -> JoinHandle<()> {
    if every < MIN_INTERVAL {
        warn!(?every, "monitor interval too short, using {MIN_INTERVAL:?}");
    }
    let every = every.max(MIN_INTERVAL);
    let mut stop = cancel.subscribe();
    let poll_cancel = cancel.subscribe();

    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = cancelled(&mut stop) => {
                    debug!("account count monitor stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let ctx = OperationContext::new()
                        .with_timeout(every)
                        .with_cancellation(poll_cancel.clone());
                    match service.count(&ctx).await {
                        Ok(count) => info!(count, "account count"),
                        Err(err) => {
                            error!(trace_id = %ctx.trace_id(), "failed to count accounts: {err}");
                        }
                    }
                }
            }
        }
    })
}
