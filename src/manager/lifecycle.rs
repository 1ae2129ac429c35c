//! Shutdown coordination.

use super::DownloadManager;
use crate::types::Event;
use std::sync::atomic::Ordering;

impl DownloadManager {
    /// Stop all background work
    ///
    /// This method performs the shutdown sequence:
    /// 1. Stops accepting new jobs ([`add_job`](Self::add_job) returns
    ///    [`Error::ShuttingDown`](crate::Error::ShuttingDown))
    /// 2. Cancels every HTTP fetch task and archive monitor
    /// 3. Persists the job list
    /// 4. Emits [`Event::Shutdown`]
    ///
    /// Job statuses are left as they are, so a manager created later over
    /// the same job list resumes the interrupted jobs.
    pub async fn shutdown(&self) {
        tracing::info!("Initiating shutdown");
        self.accepting_new.store(false, Ordering::SeqCst);

        let mut state = self.state.lock().await;
        let fetches = state.http_tasks.len();
        for (id, token) in state.http_tasks.drain() {
            tracing::debug!(job_id = id.0, "Cancelling fetch task");
            token.cancel();
        }
        for binding in state.bindings.values_mut() {
            binding.cancel_monitor();
        }
        tracing::info!(
            fetches,
            bindings = state.bindings.len(),
            "Cancelled background tasks"
        );

        self.save_jobs(&state.jobs).await;
        drop(state);

        self.emit_event(Event::Shutdown);
        tracing::info!("Shutdown complete");
    }

    /// Whether [`shutdown`](Self::shutdown) has been called
    pub fn is_shutting_down(&self) -> bool {
        !self.accepting_new.load(Ordering::SeqCst)
    }
}
