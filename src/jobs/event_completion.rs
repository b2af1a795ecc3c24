use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::clock::Clock;
use crate::jobs::spawn_periodic;
use crate::store::Store;
use crate::utils::error::AppError;

/// Marks published events whose date has passed as completed.
pub async fn sweep(store: &dyn Store, clock: &dyn Clock) -> Result<usize, AppError> {
    let mut tx = store.begin().await?;
    let completed = tx.complete_past_events(clock.now()).await?;
    tx.commit().await?;

    for event in &completed {
        info!(event_id = event.id, title = %event.title, "Event completed");
    }
    Ok(completed.len())
}

pub fn spawn(store: Arc<dyn Store>, clock: Arc<dyn Clock>, every: Duration) -> JoinHandle<()> {
    spawn_periodic("event-completion", every, move || {
        let store = Arc::clone(&store);
        let clock = Arc::clone(&clock);
        async move {
            if let Err(e) = sweep(store.as_ref(), clock.as_ref()).await {
                error!(error = %e, "Event completion sweep failed");
            }
        }
    })
}
