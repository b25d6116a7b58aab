//! The background task that drains one job's file list.
//!
//! The worker's view of job status is advisory: it reloads the job at every
//! checkpoint and reacts to pause or cancellation within one file's
//! latency. Per-file errors are recorded on the job and never abort the
//! batch; only worker-level failures (the caption set vanishing mid-run)
//! terminate the job as failed.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use capstudio_core::error::CoreError;
use capstudio_core::job::{GeneratedCaption, Job};
use capstudio_core::status::JobStatus;
use capstudio_core::store::Store;
use capstudio_core::types::Id;

use crate::pipeline::{CaptionPipeline, ResizeCache};

/// Run one job to a terminal status (or until superseded).
///
/// `token` identifies this worker instance: resume spawns a fresh worker,
/// cancels the previous instance's token, and has the replacement wait for
/// the previous instance to exit before it recomputes the file list.
pub(crate) async fn run<S>(
    store: Arc<S>,
    pipeline: Arc<CaptionPipeline>,
    job_id: Id,
    poll_interval: Duration,
    token: CancellationToken,
) where
    S: Store + ?Sized,
{
    if let Err(error) = execute(&*store, &pipeline, job_id, poll_interval, &token).await {
        tracing::error!(%job_id, %error, "Caption job failed");
        if let Err(error) = store.fail_job(job_id, &error.to_string()).await {
            tracing::error!(%job_id, %error, "Failed to record job failure");
        }
    }
}

async fn execute<S>(
    store: &S,
    pipeline: &CaptionPipeline,
    job_id: Id,
    poll_interval: Duration,
    token: &CancellationToken,
) -> Result<(), CoreError>
where
    S: Store + ?Sized,
{
    store.mark_job_started(job_id).await?;
    let Some(job) = store.find_job(job_id).await? else {
        tracing::warn!(%job_id, "Job vanished before the worker started");
        return Ok(());
    };
    if job.status != JobStatus::Running {
        // Cancelled (or otherwise finished) before the worker got scheduled.
        tracing::info!(%job_id, status = %job.status, "Job not runnable, worker exiting");
        return Ok(());
    }

    let set = store
        .find_caption_set(job.caption_set_id)
        .await?
        .ok_or_else(|| CoreError::not_found("caption set", job.caption_set_id))?;

    // Deterministic order, identically recomputed on resume.
    let eligible = store.eligible_members(set.dataset_id).await?;

    let (remaining, mut completed, mut failed) = if job.overwrite_existing {
        // Resume skips the already-processed prefix of the same ordering.
        let skip = (job.completed_files + job.failed_files).max(0) as usize;
        let remaining: Vec<Id> = eligible
            .iter()
            .skip(skip)
            .map(|m| m.file_id)
            .collect();
        (remaining, job.completed_files, job.failed_files)
    } else {
        // Files captioned in earlier runs count as completed; previously
        // failed files have no caption, so they re-enter the list and the
        // failed counter restarts.
        let captioned: HashSet<Id> = store
            .captioned_file_ids(set.id)
            .await?
            .into_iter()
            .collect();
        let remaining: Vec<Id> = eligible
            .iter()
            .map(|m| m.file_id)
            .filter(|id| !captioned.contains(id))
            .collect();
        let completed = (job.total_files as usize).saturating_sub(remaining.len()) as i32;
        (remaining, completed, 0)
    };

    let mut last_error = job.last_error.clone();
    store
        .update_job_counters(job_id, completed, failed, last_error.as_deref())
        .await?;

    tracing::info!(
        %job_id,
        total = job.total_files,
        remaining = remaining.len(),
        overwrite = job.overwrite_existing,
        "Caption worker started",
    );

    let mut cache = ResizeCache::new();

    for file_id in remaining {
        let Some(job) = wait_until_runnable(store, job_id, poll_interval, token).await? else {
            // A superseded worker leaves the pointer to its replacement.
            if !token.is_cancelled() {
                store.set_current_file(job_id, None).await?;
            }
            return Ok(());
        };

        store.set_current_file(job_id, Some(file_id)).await?;

        match pipeline.caption_file(store, &job, file_id, &mut cache).await {
            Ok(outcome) => {
                store
                    .upsert_caption(&GeneratedCaption {
                        caption_set_id: set.id,
                        file_id,
                        text: outcome.caption,
                        caption_ru: outcome.caption_ru,
                        source: "generated".into(),
                        model: outcome.model,
                        quality_score: outcome.quality_score,
                        quality_flags: outcome.quality_flags.clone(),
                    })
                    .await?;
                if let Some(score) = outcome.quality_score {
                    store
                        .set_member_quality(
                            set.dataset_id,
                            file_id,
                            score,
                            outcome.quality_flags.as_deref(),
                        )
                        .await?;
                }
                completed += 1;
            }
            Err(error) => {
                tracing::warn!(%job_id, %file_id, %error, "Captioning failed for file");
                failed += 1;
                last_error = Some(error.to_string());
            }
        }

        // Durability checkpoint after every file.
        store
            .update_job_counters(job_id, completed, failed, last_error.as_deref())
            .await?;
    }

    store.set_current_file(job_id, None).await?;
    let finished = store
        .transition_job(
            job_id,
            &[JobStatus::Running, JobStatus::Paused],
            JobStatus::Completed,
        )
        .await?;

    if let Some(job) = finished {
        tracing::info!(
            %job_id,
            status = %job.status,
            completed = job.completed_files,
            failed = job.failed_files,
            "Caption worker finished",
        );
    }
    Ok(())
}

/// Block until the job may process its next file.
///
/// Returns the fresh job when it is running, `None` when it was cancelled,
/// vanished, reached a terminal status, or this worker was superseded.
/// While paused, polls at `poll_interval` doing nothing.
async fn wait_until_runnable<S>(
    store: &S,
    job_id: Id,
    poll_interval: Duration,
    token: &CancellationToken,
) -> Result<Option<Job>, CoreError>
where
    S: Store + ?Sized,
{
    loop {
        if token.is_cancelled() {
            tracing::debug!(%job_id, "Worker superseded, stopping");
            return Ok(None);
        }
        let Some(job) = store.find_job(job_id).await? else {
            tracing::warn!(%job_id, "Job vanished mid-run");
            return Ok(None);
        };
        match job.status {
            JobStatus::Running => return Ok(Some(job)),
            JobStatus::Paused => {
                tokio::time::sleep(poll_interval).await;
            }
            JobStatus::Cancelled => {
                tracing::info!(%job_id, "Job cancelled, stopping");
                return Ok(None);
            }
            other => {
                tracing::warn!(%job_id, status = %other, "Unexpected status mid-run, stopping");
                return Ok(None);
            }
        }
    }
}
