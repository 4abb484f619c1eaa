//! In-memory job registry for long-running generation work.
//!
//! A job is created, then started with a future that runs to completion
//! on the runtime; its terminal status and result (or error detail) are
//! recorded for later polling. Jobs are not persisted and there is no
//! cancellation; a restart forgets all jobs.

use crate::error::ServiceError;
use crate::project::unix_now;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tracing::info;
use uuid::Uuid;

/// Unique identifier for jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Created,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

/// A tracked unit of background work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// Free-form kind label, e.g. "generate_chapter".
    pub kind: String,
    pub status: JobStatus,
    pub metadata: serde_json::Value,
    /// Result payload once the job succeeds.
    pub result: Option<serde_json::Value>,
    /// Error detail once the job fails.
    pub error: Option<String>,
    pub created_at: u64,
    pub updated_at: u64,
}

/// Shared registry of jobs. Cloning shares the underlying map.
#[derive(Clone, Default)]
pub struct JobRegistry {
    jobs: Arc<Mutex<HashMap<JobId, Job>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new job in the `Created` state.
    pub fn create(&self, kind: impl Into<String>, metadata: serde_json::Value) -> JobId {
        let now = unix_now();
        let job = Job {
            id: JobId::new(),
            kind: kind.into(),
            status: JobStatus::Created,
            metadata,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        };
        let id = job.id;
        self.jobs.lock().unwrap().insert(id, job);
        id
    }

    /// Start a created job. The future runs on the current runtime; its
    /// outcome is recorded when it finishes.
    pub fn start<F>(&self, id: JobId, work: F) -> Result<(), ServiceError>
    where
        F: Future<Output = Result<serde_json::Value, ServiceError>> + Send + 'static,
    {
        {
            let mut jobs = self.jobs.lock().unwrap();
            let job = jobs
                .get_mut(&id)
                .ok_or_else(|| ServiceError::NotFound(format!("job {id}")))?;
            if job.status != JobStatus::Created {
                return Err(ServiceError::Validation(format!(
                    "job {id} already started"
                )));
            }
            job.status = JobStatus::Running;
            job.updated_at = unix_now();
        }

        let registry = self.clone();
        tokio::spawn(async move {
            let outcome = work.await;
            let mut jobs = registry.jobs.lock().unwrap();
            if let Some(job) = jobs.get_mut(&id) {
                job.updated_at = unix_now();
                match outcome {
                    Ok(result) => {
                        job.status = JobStatus::Succeeded;
                        job.result = Some(result);
                        info!(job = %id, kind = %job.kind, "job succeeded");
                    }
                    Err(e) => {
                        job.status = JobStatus::Failed;
                        job.error = Some(e.to_string());
                        info!(job = %id, kind = %job.kind, error = %e, "job failed");
                    }
                }
            }
        });
        Ok(())
    }

    /// Current snapshot of a job.
    pub fn get(&self, id: JobId) -> Option<Job> {
        self.jobs.lock().unwrap().get(&id).cloned()
    }

    /// All jobs, newest first.
    pub fn list(&self) -> Vec<Job> {
        let mut jobs: Vec<_> = self.jobs.lock().unwrap().values().cloned().collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.0.cmp(&a.id.0)));
        jobs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn wait_terminal(registry: &JobRegistry, id: JobId) -> Job {
        for _ in 0..100 {
            let job = registry.get(id).expect("job");
            if job.status.is_terminal() {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job never finished");
    }

    #[tokio::test]
    async fn test_job_lifecycle_success() {
        let registry = JobRegistry::new();
        let id = registry.create("generate_chapter", serde_json::json!({"beat": 1}));
        assert_eq!(registry.get(id).unwrap().status, JobStatus::Created);

        registry
            .start(id, async { Ok(serde_json::json!({"title": "The Beginning"})) })
            .expect("start");

        let job = wait_terminal(&registry, id).await;
        assert_eq!(job.status, JobStatus::Succeeded);
        assert_eq!(job.result.unwrap()["title"], "The Beginning");
        assert!(job.error.is_none());
    }

    #[tokio::test]
    async fn test_job_lifecycle_failure() {
        let registry = JobRegistry::new();
        let id = registry.create("generate_panels", serde_json::json!({}));
        registry
            .start(id, async {
                Err(ServiceError::Backend("model unavailable".to_string()))
            })
            .expect("start");

        let job = wait_terminal(&registry, id).await;
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.unwrap().contains("model unavailable"));
    }

    #[tokio::test]
    async fn test_start_twice_rejected() {
        let registry = JobRegistry::new();
        let id = registry.create("x", serde_json::json!({}));
        registry
            .start(id, async { Ok(serde_json::Value::Null) })
            .expect("start");
        let err = registry
            .start(id, async { Ok(serde_json::Value::Null) })
            .expect_err("double start");
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn test_start_unknown_job() {
        let registry = JobRegistry::new();
        let err = registry
            .start(JobId::new(), async { Ok(serde_json::Value::Null) })
            .expect_err("unknown");
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let registry = JobRegistry::new();
        let first = registry.create("a", serde_json::json!({}));
        let second = registry.create("b", serde_json::json!({}));

        let listed = registry.list();
        assert_eq!(listed.len(), 2);
        let ids: Vec<_> = listed.iter().map(|j| j.id).collect();
        assert!(ids.contains(&first));
        assert!(ids.contains(&second));
    }
}
