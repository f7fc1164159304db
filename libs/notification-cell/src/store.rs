use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Method;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::DocStoreClient;
use shared_utils::retry_with_backoff;

use crate::error::NotificationError;
use crate::models::{ConditionalUpdate, JobStatus, JobUpdate, NotificationJob};

const JOBS_PATH: &str = "/rest/v1/notification_jobs";
const STORE_READ_ATTEMPTS: u32 = 3;
const STORE_READ_DELAY: Duration = Duration::from_millis(100);

/// Persistence port for notification jobs. All mutation goes through
/// `conditional_update`, which applies the change only while the job's status
/// still matches `expected` - the claim primitive the executor relies on.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create(&self, job: &NotificationJob) -> Result<Uuid, NotificationError>;

    async fn get(&self, id: Uuid) -> Result<Option<NotificationJob>, NotificationError>;

    /// Pending jobs whose dispatch time has passed, ascending by dispatch
    /// time.
    async fn query_due(
        &self,
        due_before: DateTime<Utc>,
    ) -> Result<Vec<NotificationJob>, NotificationError>;

    async fn jobs_for_appointment(
        &self,
        appointment_id: Uuid,
    ) -> Result<Vec<NotificationJob>, NotificationError>;

    /// Processing jobs whose claim has not been touched since `claimed_before`
    /// (the run that claimed them presumably died).
    async fn query_stalled(
        &self,
        claimed_before: DateTime<Utc>,
    ) -> Result<Vec<NotificationJob>, NotificationError>;

    async fn conditional_update(
        &self,
        id: Uuid,
        expected: JobStatus,
        update: JobUpdate,
    ) -> Result<ConditionalUpdate, NotificationError>;
}

// ============================================================================
// IN-MEMORY STORE
// ============================================================================

/// Job store backed by a process-local map. Used by tests and single-instance
/// deployments; the write lock makes each conditional update atomic.
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<Uuid, NotificationJob>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, job: &NotificationJob) -> Result<Uuid, NotificationError> {
        let mut jobs = self.jobs.write().await;
        jobs.insert(job.id, job.clone());
        Ok(job.id)
    }

    async fn get(&self, id: Uuid) -> Result<Option<NotificationJob>, NotificationError> {
        let jobs = self.jobs.read().await;
        Ok(jobs.get(&id).cloned())
    }

    async fn query_due(
        &self,
        due_before: DateTime<Utc>,
    ) -> Result<Vec<NotificationJob>, NotificationError> {
        let jobs = self.jobs.read().await;
        let mut due: Vec<NotificationJob> = jobs
            .values()
            .filter(|job| job.status == JobStatus::Pending && job.dispatch_at <= due_before)
            .cloned()
            .collect();
        due.sort_by(|a, b| a.dispatch_at.cmp(&b.dispatch_at));
        Ok(due)
    }

    async fn jobs_for_appointment(
        &self,
        appointment_id: Uuid,
    ) -> Result<Vec<NotificationJob>, NotificationError> {
        let jobs = self.jobs.read().await;
        let mut matching: Vec<NotificationJob> = jobs
            .values()
            .filter(|job| job.appointment_id == appointment_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.dispatch_at.cmp(&b.dispatch_at));
        Ok(matching)
    }

    async fn query_stalled(
        &self,
        claimed_before: DateTime<Utc>,
    ) -> Result<Vec<NotificationJob>, NotificationError> {
        let jobs = self.jobs.read().await;
        Ok(jobs
            .values()
            .filter(|job| job.status == JobStatus::Processing && job.updated_at < claimed_before)
            .cloned()
            .collect())
    }

    async fn conditional_update(
        &self,
        id: Uuid,
        expected: JobStatus,
        update: JobUpdate,
    ) -> Result<ConditionalUpdate, NotificationError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(&id)
            .ok_or(NotificationError::JobNotFound(id))?;

        if job.status != expected {
            return Ok(ConditionalUpdate::Conflict);
        }
        if !job.status.can_transition_to(&update.status) {
            return Err(NotificationError::InvalidStatusTransition {
                from: job.status.to_string(),
                to: update.status.to_string(),
            });
        }

        job.status = update.status;
        job.updated_at = update.updated_at;
        if let Some(channel) = update.channel {
            job.channel = channel;
        }
        if let Some(attempts) = update.attempts {
            job.attempts = attempts;
        }
        if let Some(error) = update.last_error {
            job.last_error = Some(error);
        }
        if let Some(dispatched_at) = update.dispatched_at {
            job.dispatched_at = Some(dispatched_at);
        }

        Ok(ConditionalUpdate::Applied(job.clone()))
    }
}

// ============================================================================
// REST STORE
// ============================================================================

/// Job store on the document store's REST interface. The conditional update
/// is a PATCH filtered on both id and expected status with
/// `Prefer: return=representation`; an empty result set means the filter
/// matched nothing, which reads as a conflict.
pub struct RestJobStore {
    client: DocStoreClient,
}

impl RestJobStore {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: DocStoreClient::new(config),
        }
    }

    fn returning_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));
        headers
    }

    fn timestamp(value: DateTime<Utc>) -> String {
        value.to_rfc3339_opts(SecondsFormat::Secs, true)
    }

    async fn read_rows(&self, path: &str) -> Result<Vec<NotificationJob>, NotificationError> {
        retry_with_backoff(STORE_READ_ATTEMPTS, STORE_READ_DELAY, || {
            self.client
                .request::<Vec<NotificationJob>>(Method::GET, path, None)
        })
        .await
        .map_err(|e| NotificationError::Persistence(e.to_string()))
    }
}

#[async_trait]
impl JobStore for RestJobStore {
    async fn create(&self, job: &NotificationJob) -> Result<Uuid, NotificationError> {
        let body = serde_json::to_value(job)?;
        let rows: Vec<NotificationJob> = self
            .client
            .request_with_headers(
                Method::POST,
                JOBS_PATH,
                Some(body),
                Some(Self::returning_headers()),
            )
            .await
            .map_err(|e| NotificationError::Persistence(e.to_string()))?;

        rows.into_iter().next().map(|row| row.id).ok_or_else(|| {
            NotificationError::Persistence("store returned no row for created job".to_string())
        })
    }

    async fn get(&self, id: Uuid) -> Result<Option<NotificationJob>, NotificationError> {
        let path = format!("{}?id=eq.{}", JOBS_PATH, id);
        let rows = self.read_rows(&path).await?;
        Ok(rows.into_iter().next())
    }

    async fn query_due(
        &self,
        due_before: DateTime<Utc>,
    ) -> Result<Vec<NotificationJob>, NotificationError> {
        let path = format!(
            "{}?status=eq.pending&dispatch_at=lte.{}&order=dispatch_at.asc",
            JOBS_PATH,
            Self::timestamp(due_before)
        );
        self.read_rows(&path).await
    }

    async fn jobs_for_appointment(
        &self,
        appointment_id: Uuid,
    ) -> Result<Vec<NotificationJob>, NotificationError> {
        let path = format!(
            "{}?appointment_id=eq.{}&order=dispatch_at.asc",
            JOBS_PATH, appointment_id
        );
        self.read_rows(&path).await
    }

    async fn query_stalled(
        &self,
        claimed_before: DateTime<Utc>,
    ) -> Result<Vec<NotificationJob>, NotificationError> {
        let path = format!(
            "{}?status=eq.processing&updated_at=lt.{}",
            JOBS_PATH,
            Self::timestamp(claimed_before)
        );
        self.read_rows(&path).await
    }

    async fn conditional_update(
        &self,
        id: Uuid,
        expected: JobStatus,
        update: JobUpdate,
    ) -> Result<ConditionalUpdate, NotificationError> {
        let path = format!("{}?id=eq.{}&status=eq.{}", JOBS_PATH, id, expected);
        let body = serde_json::to_value(&update)?;

        let rows: Vec<NotificationJob> = self
            .client
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(body),
                Some(Self::returning_headers()),
            )
            .await
            .map_err(|e| NotificationError::Persistence(e.to_string()))?;

        // An unknown id and a status mismatch both come back as zero rows.
        match rows.into_iter().next() {
            Some(job) => Ok(ConditionalUpdate::Applied(job)),
            None => {
                debug!("Conditional update on job {} matched no row", id);
                Ok(ConditionalUpdate::Conflict)
            }
        }
    }
}
