//! Custom test assertions for integration tests

use romfetch::{DownloadManager, Event, Job, JobId, JobStatus};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::broadcast::Receiver;

/// Result of waiting for a job to finish
#[derive(Debug)]
pub enum WaitResult {
    /// Job completed, file at the given path
    Completed(PathBuf),
    /// Job failed with error
    Failed(String),
    /// Timeout waiting for an outcome
    Timeout,
    /// Channel closed unexpectedly
    ChannelClosed,
}

/// Wait on `events` for the completion or failure of job `id`
///
/// Subscribe before triggering the transfer, or the event may be missed.
pub async fn wait_for_outcome(events: &mut Receiver<Event>, id: JobId, timeout: Duration) -> WaitResult {
    let result = tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(Event::Completed { id: event_id, path }) if event_id == id => {
                    return WaitResult::Completed(path);
                }
                Ok(Event::Failed { id: event_id, error }) if event_id == id => {
                    return WaitResult::Failed(error);
                }
                Ok(_) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(_) => return WaitResult::ChannelClosed,
            }
        }
    })
    .await;

    result.unwrap_or(WaitResult::Timeout)
}

/// Collect events until timeout or until `stop_predicate` matches
pub async fn collect_events_until<F>(
    events: &mut Receiver<Event>,
    timeout: Duration,
    stop_predicate: F,
) -> Vec<Event>
where
    F: Fn(&Event) -> bool,
{
    let mut collected = Vec::new();
    let _ = tokio::time::timeout(timeout, async {
        while let Ok(event) = events.recv().await {
            let should_stop = stop_predicate(&event);
            collected.push(event);
            if should_stop {
                break;
            }
        }
    })
    .await;
    collected
}

/// Poll the job list until `predicate` holds for job `id`
pub async fn wait_for_job<F>(manager: &DownloadManager, id: JobId, timeout: Duration, predicate: F) -> Job
where
    F: Fn(&Job) -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let job = manager.get_job(id).await;
        if let Some(job) = &job
            && predicate(job)
        {
            return job.clone();
        }
        if tokio::time::Instant::now() > deadline {
            panic!("Timeout waiting for job {id}, last state: {job:?}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Assert that a job completed successfully and return where its file is
pub async fn assert_job_completed(events: &mut Receiver<Event>, id: JobId, timeout: Duration) -> PathBuf {
    match wait_for_outcome(events, id, timeout).await {
        WaitResult::Completed(path) => path,
        WaitResult::Failed(error) => panic!("Job {} failed with error: {}", id, error),
        WaitResult::Timeout => panic!("Timeout waiting for job {} to complete", id),
        WaitResult::ChannelClosed => panic!("Event channel closed while waiting for job {}", id),
    }
}

/// Assert the status of every job, by name
pub async fn assert_statuses(manager: &DownloadManager, expected: &[(&str, JobStatus)]) {
    let jobs = manager.list_jobs().await;
    for (name, status) in expected {
        let job = jobs
            .iter()
            .find(|j| j.name == *name)
            .unwrap_or_else(|| panic!("no job named {name}"));
        assert_eq!(job.status, *status, "status of {name}");
    }
}
