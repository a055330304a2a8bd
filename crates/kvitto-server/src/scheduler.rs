//! Background maintenance scheduler.
//!
//! Registers a recurring job at server startup: cache eviction, webhook
//! dedupe pruning, and directory refresh. Correctness never depends on
//! the sweep — reads re-check freshness themselves — so a missed tick
//! only delays memory reclamation.

use chrono::Utc;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

use crate::state::{sync_directory, AppState};

/// Builds and starts the background job scheduler.
///
/// Returns the running [`JobScheduler`] handle, which must be kept alive
/// for the lifetime of the process — dropping it shuts down all jobs.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised,
/// the job cannot be registered, or the scheduler fails to start.
pub async fn build_scheduler(state: AppState) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;
    register_maintenance_job(&scheduler, state).await?;
    scheduler.start().await?;
    Ok(scheduler)
}

/// Register the once-a-minute maintenance job.
async fn register_maintenance_job(
    scheduler: &JobScheduler,
    state: AppState,
) -> Result<(), JobSchedulerError> {
    let job = Job::new_async("0 * * * * *", move |_uuid, _lock| {
        let state = state.clone();
        Box::pin(async move {
            run_maintenance(&state).await;
        })
    })?;

    scheduler.add(job).await?;
    Ok(())
}

async fn run_maintenance(state: &AppState) {
    let now = Utc::now();
    let evicted = state.cache.sweep(now).await;
    let pruned = state.gateway.sweep(now).await;

    if state.directory.needs_refresh(now).await {
        sync_directory(state, now).await;
    }

    tracing::debug!(evicted, pruned, "maintenance sweep complete");
}
