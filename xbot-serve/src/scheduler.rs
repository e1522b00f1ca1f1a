//! Periodic workflow runs using tokio-cron-scheduler.
//!
//! The job only triggers `XbotService::run`; overlapping triggers (a slow
//! run still going when the next tick fires, or an API call landing during a
//! scheduled run) queue behind the engine's run lock.

use std::sync::Arc;

use anyhow::Result;
use libxbot::{RunParams, XbotService};
use tokio_cron_scheduler::{Job, JobScheduler};

/// Start the scheduler with a single workflow job on `schedule`
/// (six-field cron, seconds first).
pub async fn start_scheduler(service: Arc<XbotService>, schedule: &str) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;
    scheduler.add(workflow_job(service, schedule)?).await?;
    scheduler.start().await?;

    tracing::info!(schedule, "scheduled workflow runs enabled");
    Ok(scheduler)
}

fn workflow_job(service: Arc<XbotService>, schedule: &str) -> Result<Job> {
    let job = Job::new_async(schedule, move |_uuid, _lock| {
        let service = service.clone();
        Box::pin(async move {
            tracing::info!("scheduled workflow run starting");
            match service.run(RunParams::default()).await {
                Ok(report) => tracing::info!(
                    accounts = report.total_accounts,
                    posts = report.total_posts,
                    relevant = report.relevant_posts,
                    replied = report.successful_replies,
                    failed = report.failed_replies,
                    skipped = report.skipped_posts,
                    "scheduled workflow run finished"
                ),
                Err(e) => tracing::error!("Scheduled workflow run failed: {}", e),
            }
        })
    })?;
    Ok(job)
}
