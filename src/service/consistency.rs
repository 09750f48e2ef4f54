//! Best-effort wait for a dispatched job to become queryable

use crate::backend::JobStatusStore;
use crate::config::ConsistencyConfig;
use metrics::counter;
use std::sync::Arc;
use tokio::time::{sleep, Duration};

/// Polls the job-status store a bounded number of times with a fixed delay.
/// Exhaustion never fails the request.
pub struct ConsistencyWaiter {
    store: Arc<dyn JobStatusStore>,
    attempts: u32,
    delay: Duration,
}

impl ConsistencyWaiter {
    pub fn new(store: Arc<dyn JobStatusStore>, config: &ConsistencyConfig) -> Self {
        Self {
            store,
            attempts: config.attempts,
            delay: Duration::from_millis(config.delay_ms),
        }
    }

    /// Returns whether the job became visible within the attempts.
    /// `user` is the submitter, for the log.
    pub async fn wait_for(&self, job_id: &str, user: &str) -> bool {
        for attempt in 1..=self.attempts {
            match self.store.get_job(job_id).await {
                Ok(_) => {
                    counter!("jobgate_consistency_wait_total", "result" => "visible").increment(1);
                    return true;
                }
                Err(e) => {
                    tracing::debug!(job_id = %job_id, attempt, error = %e, "Job not visible yet");
                }
            }

            if attempt < self.attempts {
                sleep(self.delay).await;
            }
        }

        counter!("jobgate_consistency_wait_total", "result" => "exhausted").increment(1);
        tracing::warn!(
            user = %user,
            action = "consistency-wait",
            job_id = %job_id,
            attempts = self.attempts,
            "Job id returned before it was confirmed queryable"
        );
        false
    }
}
