//! Guest workload orchestration.
//!
//! Guests are ephemeral workloads the park creates and garbage-collects but
//! never tracks: the orchestrator is the only source of truth for which
//! guests exist. Cleanup is idempotent; deleting an already-deleted
//! workload is not an error.

use crate::{
    cluster::{ClusterClient, JobSummary},
    error::ParkResult,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde_json::json;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

pub const GUEST_NAMESPACE: &str = "guests";
pub const GUEST_NAME_PREFIX: &str = "guest-";
pub const GUEST_BACKOFF_LIMIT: i32 = 4;

#[async_trait]
pub trait WorkloadOrchestrator: Send + Sync {
    /// Launch one guest pointed at `park_url`. Returns the workload name.
    async fn create_guest(&self, park_url: &str) -> ParkResult<String>;

    /// Delete every guest workload. Returns how many were deleted.
    async fn cleanup_all(&self) -> ParkResult<usize>;

    /// Delete finished guest workloads whose completion is at least
    /// `retention` in the past.
    async fn cleanup_finished(&self, retention: Duration) -> ParkResult<usize>;
}

/// Finished jobs whose completion is at least `retention` before `now`.
/// Jobs with no recorded completion time are kept.
pub fn expired_jobs(jobs: &[JobSummary], now: DateTime<Utc>, retention: Duration) -> Vec<&JobSummary> {
    jobs.iter()
        .filter(|j| j.finished)
        .filter(|j| {
            j.finished_at
                .and_then(|at| (now - at).to_std().ok())
                .is_some_and(|age| age >= retention)
        })
        .collect()
}

// ── Kubernetes batch jobs ───────────────────────────────────────

pub struct KubeJobOrchestrator {
    client:        Arc<ClusterClient>,
    namespace:     String,
    image:         String,
    guest_command: Vec<String>,
}

impl KubeJobOrchestrator {
    pub fn new(client: Arc<ClusterClient>, image: impl Into<String>) -> Self {
        Self {
            client,
            namespace:     GUEST_NAMESPACE.to_string(),
            image:         image.into(),
            guest_command: vec!["/usr/local/bin/kubepark".into(), "guest".into()],
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_guest_command(mut self, command: Vec<String>) -> Self {
        self.guest_command = command;
        self
    }

    /// The batch/v1 Job manifest for one guest.
    pub fn job_manifest(&self, park_url: &str) -> serde_json::Value {
        json!({
            "apiVersion": "batch/v1",
            "kind": "Job",
            "metadata": { "generateName": GUEST_NAME_PREFIX },
            "spec": {
                "backoffLimit": GUEST_BACKOFF_LIMIT,
                "template": {
                    "spec": {
                        "restartPolicy": "Never",
                        "containers": [{
                            "name": "guest",
                            "image": self.image,
                            "command": self.guest_command,
                            "args": ["--park-url", park_url],
                        }]
                    }
                }
            }
        })
    }

    async fn delete_all(&self, jobs: Vec<&JobSummary>) -> usize {
        let mut deleted = 0;
        for job in jobs {
            match self.client.delete_job(&self.namespace, &job.name).await {
                Ok(()) => deleted += 1,
                Err(e) => log::warn!("Failed to delete guest job {}: {e}", job.name),
            }
        }
        deleted
    }
}

#[async_trait]
impl WorkloadOrchestrator for KubeJobOrchestrator {
    async fn create_guest(&self, park_url: &str) -> ParkResult<String> {
        let name = self
            .client
            .create_job(&self.namespace, &self.job_manifest(park_url))
            .await?;
        log::debug!("Created guest job {name}");
        Ok(name)
    }

    async fn cleanup_all(&self) -> ParkResult<usize> {
        let jobs = self.client.list_jobs(&self.namespace).await?;
        Ok(self.delete_all(jobs.iter().collect()).await)
    }

    async fn cleanup_finished(&self, retention: Duration) -> ParkResult<usize> {
        let jobs = self.client.list_jobs(&self.namespace).await?;
        let expired = expired_jobs(&jobs, Utc::now(), retention);
        Ok(self.delete_all(expired).await)
    }
}

// ── In-process guests ───────────────────────────────────────────

/// Runs one guest visit against a park URL.
pub type GuestLauncher = Arc<dyn Fn(String) -> BoxFuture<'static, ()> + Send + Sync>;

struct LocalGuest {
    handle:      tokio::task::JoinHandle<()>,
    finished_at: Arc<Mutex<Option<DateTime<Utc>>>>,
}

/// Guests as tokio tasks inside the park process. Used when the park runs
/// outside a cluster, and in tests.
pub struct InProcessOrchestrator {
    launcher: GuestLauncher,
    guests:   Mutex<HashMap<String, LocalGuest>>,
}

impl InProcessOrchestrator {
    pub fn new(launcher: GuestLauncher) -> Self {
        Self {
            launcher,
            guests: Mutex::new(HashMap::new()),
        }
    }

    /// Guests spawned and not yet cleaned up.
    pub fn tracked(&self) -> usize {
        self.guests.lock().map(|g| g.len()).unwrap_or(0)
    }

    fn remove_where(&self, pred: impl Fn(&LocalGuest) -> bool) -> usize {
        let Ok(mut guests) = self.guests.lock() else {
            return 0;
        };
        let before = guests.len();
        guests.retain(|name, guest| {
            let remove = pred(guest);
            if remove {
                guest.handle.abort();
                log::debug!("Cleaned up local guest {name}");
            }
            !remove
        });
        before - guests.len()
    }
}

#[async_trait]
impl WorkloadOrchestrator for InProcessOrchestrator {
    async fn create_guest(&self, park_url: &str) -> ParkResult<String> {
        let name = format!("{GUEST_NAME_PREFIX}{}", uuid::Uuid::new_v4().simple());
        let finished_at = Arc::new(Mutex::new(None));
        let visit = (self.launcher)(park_url.to_string());
        let marker = Arc::clone(&finished_at);
        let handle = tokio::spawn(async move {
            visit.await;
            if let Ok(mut at) = marker.lock() {
                *at = Some(Utc::now());
            }
        });
        self.guests
            .lock()
            .map_err(|_| crate::error::ParkError::LockPoisoned)?
            .insert(name.clone(), LocalGuest { handle, finished_at });
        Ok(name)
    }

    async fn cleanup_all(&self) -> ParkResult<usize> {
        Ok(self.remove_where(|_| true))
    }

    async fn cleanup_finished(&self, retention: Duration) -> ParkResult<usize> {
        let now = Utc::now();
        Ok(self.remove_where(|guest| {
            guest
                .finished_at
                .lock()
                .ok()
                .and_then(|at| *at)
                .and_then(|at| (now - at).to_std().ok())
                .is_some_and(|age| age >= retention)
        }))
    }
}
