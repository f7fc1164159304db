use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{DispatchError, NotificationError};
use crate::models::{
    ConditionalUpdate, DeliveryChannel, ExecutionSummary, JobStatus, JobUpdate, NotificationJob,
    ReminderPolicy,
};
use crate::services::dispatch::{NotificationChannel, PreferenceResolver};
use crate::store::JobStore;

enum JobOutcome {
    Dispatched,
    Retried,
    Failed,
    Skipped,
    Error,
}

/// Runs due notification jobs. Invoked by an external trigger; one call
/// drains the batch that is due at `now` and returns. Overlapping runs are
/// safe because every job is claimed with a conditional status write before
/// anything is sent.
pub struct NotificationExecutorService {
    store: Arc<dyn JobStore>,
    channel: Arc<dyn NotificationChannel>,
    preferences: Arc<dyn PreferenceResolver>,
    policy: ReminderPolicy,
}

impl NotificationExecutorService {
    pub fn new(
        store: Arc<dyn JobStore>,
        channel: Arc<dyn NotificationChannel>,
        preferences: Arc<dyn PreferenceResolver>,
    ) -> Self {
        Self::with_policy(store, channel, preferences, ReminderPolicy::default())
    }

    pub fn with_policy(
        store: Arc<dyn JobStore>,
        channel: Arc<dyn NotificationChannel>,
        preferences: Arc<dyn PreferenceResolver>,
        policy: ReminderPolicy,
    ) -> Self {
        Self {
            store,
            channel,
            preferences,
            policy,
        }
    }

    #[instrument(skip(self))]
    pub async fn execute_pending(
        &self,
        now: DateTime<Utc>,
    ) -> Result<ExecutionSummary, NotificationError> {
        let mut summary = ExecutionSummary {
            recovered: self.recover_stalled_jobs(now).await?,
            ..ExecutionSummary::default()
        };

        let due = self.store.query_due(now).await?;
        summary.due_jobs = due.len();
        if due.is_empty() {
            debug!("No notification jobs due");
            return Ok(summary);
        }
        info!("Executing {} due notification job(s)", due.len());

        let outcomes: Vec<JobOutcome> = stream::iter(due)
            .map(|job| self.process_job(job, now))
            .buffer_unordered(self.policy.max_concurrent_dispatches)
            .collect()
            .await;

        for outcome in outcomes {
            match outcome {
                JobOutcome::Dispatched => summary.dispatched += 1,
                JobOutcome::Retried => summary.retried += 1,
                JobOutcome::Failed => summary.failed += 1,
                JobOutcome::Skipped => summary.skipped += 1,
                JobOutcome::Error => summary.errors += 1,
            }
        }

        info!(
            "Notification run finished: {} dispatched, {} retried, {} failed, {} skipped, {} errors",
            summary.dispatched, summary.retried, summary.failed, summary.skipped, summary.errors
        );
        Ok(summary)
    }

    /// Returns jobs stuck in `processing` to the pending pool when their
    /// claim is older than the staleness cutoff. Covers the run that died
    /// between claiming and recording an outcome.
    async fn recover_stalled_jobs(&self, now: DateTime<Utc>) -> Result<usize, NotificationError> {
        let cutoff = now - chrono::Duration::seconds(self.policy.claim_stale_after_secs as i64);
        let stalled = self.store.query_stalled(cutoff).await?;
        let mut recovered = 0;

        for job in stalled {
            match self
                .store
                .conditional_update(job.id, JobStatus::Processing, JobUpdate::release(now))
                .await
            {
                Ok(ConditionalUpdate::Applied(_)) => {
                    warn!(
                        "Released stalled claim on job {} (untouched since {})",
                        job.id, job.updated_at
                    );
                    recovered += 1;
                }
                Ok(ConditionalUpdate::Conflict) => {}
                Err(e) => {
                    error!("Failed to release stalled job {}: {}", job.id, e);
                }
            }
        }

        Ok(recovered)
    }

    async fn process_job(&self, job: NotificationJob, now: DateTime<Utc>) -> JobOutcome {
        // Claim first. A conflict means another run (or a cancellation) got
        // there, so this run must not touch the job.
        let claimed = match self
            .store
            .conditional_update(job.id, JobStatus::Pending, JobUpdate::claim(now))
            .await
        {
            Ok(ConditionalUpdate::Applied(job)) => job,
            Ok(ConditionalUpdate::Conflict) => {
                debug!("Job {} no longer pending, skipping", job.id);
                return JobOutcome::Skipped;
            }
            Err(e) => {
                error!("Failed to claim job {}: {}", job.id, e);
                return JobOutcome::Error;
            }
        };

        let channel = self.resolve_channel(&claimed.recipient).await;
        let message = claimed.render_message();
        let attempts = claimed.attempts + 1;

        let sent = match timeout(
            Duration::from_millis(self.policy.dispatch_timeout_ms),
            self.channel.send(&claimed.recipient, channel, &message),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(DispatchError::Transient(format!(
                "dispatch timed out after {}ms",
                self.policy.dispatch_timeout_ms
            ))),
        };

        let (update, outcome) = match sent {
            Ok(()) => (
                JobUpdate::dispatched(now, attempts, channel),
                JobOutcome::Dispatched,
            ),
            Err(DispatchError::Transient(reason)) if attempts < self.policy.retry_limit => {
                warn!(
                    "Transient failure on job {} (attempt {}/{}): {}",
                    claimed.id, attempts, self.policy.retry_limit, reason
                );
                (
                    JobUpdate::retry(now, attempts, reason, channel),
                    JobOutcome::Retried,
                )
            }
            Err(DispatchError::Transient(reason)) => {
                error!(
                    "Job {} failed after {} attempt(s): {}",
                    claimed.id, attempts, reason
                );
                (
                    JobUpdate::failed(now, attempts, reason, channel),
                    JobOutcome::Failed,
                )
            }
            Err(DispatchError::Permanent(reason)) => {
                error!("Permanent failure on job {}: {}", claimed.id, reason);
                (
                    JobUpdate::failed(now, attempts, reason, channel),
                    JobOutcome::Failed,
                )
            }
        };

        // The outcome write only applies while the claim still stands. If a
        // cancellation won the race in the meantime, the cancelled state wins
        // and this result is discarded.
        match self
            .store
            .conditional_update(claimed.id, JobStatus::Processing, update)
            .await
        {
            Ok(ConditionalUpdate::Applied(_)) => outcome,
            Ok(ConditionalUpdate::Conflict) => {
                debug!("Job {} left processing during dispatch, outcome dropped", claimed.id);
                JobOutcome::Skipped
            }
            Err(e) => {
                error!("Failed to record outcome for job {}: {}", claimed.id, e);
                JobOutcome::Error
            }
        }
    }

    async fn resolve_channel(&self, recipient: &str) -> DeliveryChannel {
        match self.preferences.preferences_for(recipient).await {
            Ok(Some(prefs)) => prefs.effective_channel(),
            Ok(None) => DeliveryChannel::InApp,
            Err(e) => {
                warn!(
                    "Preference lookup failed for {}: {}; delivering in-app",
                    recipient, e
                );
                DeliveryChannel::InApp
            }
        }
    }
}
