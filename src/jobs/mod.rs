//! Background reconciliation jobs.
//!
//! Each job runs on its own timer and talks to the rest of the system only
//! through the store and the order service. One iteration never aborts the
//! loop; failures are logged and retried on the next tick.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::info;

pub mod event_completion;
pub mod imap_source;
pub mod order_expiry;
pub mod payment_checker;

/// Runs `task` every `every`, first after one full period. A slow iteration
/// delays the next tick instead of bunching ticks up.
pub fn spawn_periodic<F, Fut>(name: &'static str, every: Duration, task: F) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let every = every.max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(job = name, every_secs = every.as_secs(), "Background job started");
        loop {
            ticker.tick().await;
            task().await;
        }
    })
}
