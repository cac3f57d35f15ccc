use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::workflows::applications::domain::{JobId, JobStatus};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSummary {
    pub id: JobId,
    pub title: String,
    pub status: JobStatus,
}

/// Source of truth for job listings (the job CRUD/approval API).
pub trait JobCatalog: Send + Sync {
    fn fetch_job(&self, job_id: &JobId) -> Result<Option<JobSummary>, CatalogError>;
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("job catalog unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone)]
struct CachedJob {
    summary: Option<JobSummary>,
    last_fetched: DateTime<Utc>,
}

/// Read-through cache over a [`JobCatalog`] with a fixed freshness window.
///
/// Meant for browsing and display. Notification and evaluation gates read the application
/// store directly and never consult this cache.
pub struct JobCatalogCache<C> {
    catalog: Arc<C>,
    ttl: Duration,
    entries: Mutex<HashMap<JobId, CachedJob>>,
}

impl<C> JobCatalogCache<C>
where
    C: JobCatalog + 'static,
{
    pub fn new(catalog: Arc<C>, ttl: Duration) -> Self {
        Self {
            catalog,
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<JobId, CachedJob>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached summary when it is younger than the freshness window, otherwise a refresh.
    pub fn get(
        &self,
        job_id: &JobId,
        now: DateTime<Utc>,
    ) -> Result<Option<JobSummary>, CatalogError> {
        if let Some(entry) = self.entries().get(job_id) {
            if now - entry.last_fetched < self.ttl {
                debug!(job_id = %job_id, "job catalog cache hit");
                return Ok(entry.summary.clone());
            }
        }

        self.refresh(job_id, now)
    }

    /// Fetch from the catalog unconditionally and store the result.
    pub fn refresh(
        &self,
        job_id: &JobId,
        now: DateTime<Utc>,
    ) -> Result<Option<JobSummary>, CatalogError> {
        let summary = self.catalog.fetch_job(job_id)?;
        self.entries().insert(
            job_id.clone(),
            CachedJob {
                summary: summary.clone(),
                last_fetched: now,
            },
        );
        debug!(job_id = %job_id, "job catalog entry refreshed");
        Ok(summary)
    }

    pub fn invalidate(&self, job_id: &JobId) -> bool {
        self.entries().remove(job_id).is_some()
    }

    pub fn invalidate_all(&self) {
        self.entries().clear();
    }

    pub fn last_fetched(&self, job_id: &JobId) -> Option<DateTime<Utc>> {
        self.entries().get(job_id).map(|entry| entry.last_fetched)
    }
}
