//! Read-only polling feed over persisted job state.

use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use serde::Serialize;

use capstudio_core::job::Job;
use capstudio_core::status::JobStatus;
use capstudio_core::store::Store;
use capstudio_core::types::Id;

/// One observation of a job's progress.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProgressSnapshot {
    pub job_id: Id,
    pub status: JobStatus,
    pub completed_files: i32,
    pub failed_files: i32,
    pub total_files: i32,
    /// Percentage rounded to one decimal place.
    pub percent_complete: f64,
    pub current_file_id: Option<Id>,
    pub last_error: Option<String>,
}

impl ProgressSnapshot {
    fn of(job: &Job) -> Self {
        Self {
            job_id: job.id,
            status: job.status,
            completed_files: job.completed_files,
            failed_files: job.failed_files,
            total_files: job.total_files,
            percent_complete: job.percent_complete(),
            current_file_id: job.current_file_id,
            last_error: job.last_error.clone(),
        }
    }
}

/// Feed item: a snapshot, or a terminal error when the job disappears.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    Snapshot(ProgressSnapshot),
    Error { message: String },
}

/// Emit a snapshot immediately and then once per `interval`, ending after
/// the first terminal snapshot. A missing job yields one error event and
/// ends the stream. Strictly read-only.
pub fn stream<S>(
    store: Arc<S>,
    job_id: Id,
    interval: Duration,
) -> impl Stream<Item = ProgressEvent>
where
    S: Store + ?Sized + 'static,
{
    futures::stream::unfold(StreamState::First, move |state| {
        let store = store.clone();
        async move {
            match state {
                StreamState::Done => return None,
                StreamState::Polling => tokio::time::sleep(interval).await,
                StreamState::First => {}
            }

            let job = match store.find_job(job_id).await {
                Ok(job) => job,
                Err(error) => {
                    return Some((
                        ProgressEvent::Error {
                            message: error.to_string(),
                        },
                        StreamState::Done,
                    ));
                }
            };

            match job {
                Some(job) => {
                    let next = if job.status.is_terminal() {
                        StreamState::Done
                    } else {
                        StreamState::Polling
                    };
                    Some((ProgressEvent::Snapshot(ProgressSnapshot::of(&job)), next))
                }
                None => Some((
                    ProgressEvent::Error {
                        message: format!("Job not found: {job_id}"),
                    },
                    StreamState::Done,
                )),
            }
        }
    })
}

enum StreamState {
    First,
    Polling,
    Done,
}
