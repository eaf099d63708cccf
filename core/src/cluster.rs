//! Minimal Kubernetes REST client.
//!
//! Only the calls the park needs: list running pods (peer discovery) and
//! create/list/delete batch jobs (guest workloads). Talks to the API server
//! with the pod's service-account credentials.

use crate::error::{ParkError, ParkResult};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::{fs, time::Duration};

const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";
const API_TIMEOUT: Duration = Duration::from_secs(5);

pub struct ClusterClient {
    http:     reqwest::Client,
    base_url: String,
    token:    Option<String>,
}

impl ClusterClient {
    pub fn new(base_url: impl Into<String>, token: Option<String>, http: reqwest::Client) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    /// Build from the in-cluster environment: service host/port variables,
    /// the mounted service-account token, and the cluster CA.
    pub fn in_cluster() -> ParkResult<Self> {
        let host = std::env::var("KUBERNETES_SERVICE_HOST")
            .map_err(|_| ParkError::Config("KUBERNETES_SERVICE_HOST is not set".into()))?;
        let port = std::env::var("KUBERNETES_SERVICE_PORT").unwrap_or_else(|_| "443".into());
        let token = fs::read_to_string(format!("{SERVICE_ACCOUNT_DIR}/token"))?;
        let ca = fs::read(format!("{SERVICE_ACCOUNT_DIR}/ca.crt"))?;

        let http = reqwest::Client::builder()
            .add_root_certificate(reqwest::Certificate::from_pem(&ca)?)
            .timeout(API_TIMEOUT)
            .build()?;
        Ok(Self::new(
            format!("https://{host}:{port}"),
            Some(token.trim().to_string()),
            http,
        ))
    }

    /// IPs of running pods in every namespace, skipping the pod named
    /// `exclude` (this process).
    pub async fn running_pod_ips(&self, exclude: Option<&str>) -> ParkResult<Vec<String>> {
        let pods: PodList = self.get_json("/api/v1/pods").await?;
        Ok(pods
            .items
            .into_iter()
            .filter(|p| Some(p.metadata.name.as_str()) != exclude)
            .filter_map(|p| p.status)
            .filter(|s| s.phase.as_deref() == Some("Running"))
            .filter_map(|s| s.pod_ip)
            .filter(|ip| !ip.is_empty())
            .collect())
    }

    /// Create a job and return the name the API server assigned.
    pub async fn create_job(&self, namespace: &str, job: &serde_json::Value) -> ParkResult<String> {
        let url = format!("{}/apis/batch/v1/namespaces/{namespace}/jobs", self.base_url);
        let resp = self.authorized(self.http.post(&url)).json(job).send().await?;
        let created: Job = check(resp).await?.json().await?;
        Ok(created.metadata.name)
    }

    pub async fn list_jobs(&self, namespace: &str) -> ParkResult<Vec<JobSummary>> {
        let list: JobList = self
            .get_json(&format!("/apis/batch/v1/namespaces/{namespace}/jobs"))
            .await?;
        Ok(list.items.into_iter().map(JobSummary::from).collect())
    }

    /// Delete a job and, in the background, its pods.
    pub async fn delete_job(&self, namespace: &str, name: &str) -> ParkResult<()> {
        let url = format!(
            "{}/apis/batch/v1/namespaces/{namespace}/jobs/{name}?propagationPolicy=Background",
            self.base_url
        );
        let resp = self.authorized(self.http.delete(&url)).send().await?;
        check(resp).await?;
        Ok(())
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> ParkResult<T> {
        let url = format!("{}{path}", self.base_url);
        let resp = self.authorized(self.http.get(&url)).send().await?;
        Ok(check(resp).await?.json().await?)
    }

    fn authorized(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }
}

async fn check(resp: reqwest::Response) -> ParkResult<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ParkError::Orchestrator(format!("API server returned {status}: {body}")))
}

// ── Wire types (subset of the Kubernetes schema) ─────────────────

#[derive(Debug, Deserialize)]
struct ObjectMeta {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct PodList {
    items: Vec<Pod>,
}

#[derive(Debug, Deserialize)]
struct Pod {
    metadata: ObjectMeta,
    status:   Option<PodStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PodStatus {
    phase:  Option<String>,
    #[serde(rename = "podIP")]
    pod_ip: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JobList {
    items: Vec<Job>,
}

#[derive(Debug, Deserialize)]
struct Job {
    metadata: ObjectMeta,
    #[serde(default)]
    status:   Option<JobStatus>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobStatus {
    #[serde(default)]
    active:          Option<i32>,
    #[serde(default)]
    succeeded:       Option<i32>,
    #[serde(default)]
    failed:          Option<i32>,
    #[serde(default)]
    completion_time: Option<DateTime<Utc>>,
    #[serde(default)]
    conditions:      Vec<JobCondition>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobCondition {
    #[serde(default)]
    last_transition_time: Option<DateTime<Utc>>,
}

/// The parts of a job the park cares about.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSummary {
    pub name:        String,
    pub active:      bool,
    pub finished:    bool,
    /// Completion time, or the last condition change for failed jobs.
    pub finished_at: Option<DateTime<Utc>>,
}

impl From<Job> for JobSummary {
    fn from(job: Job) -> Self {
        let status = job.status.unwrap_or_default();
        let succeeded = status.succeeded.unwrap_or(0) > 0;
        let failed = status.failed.unwrap_or(0) > 0;
        let finished_at = status.completion_time.or_else(|| {
            status
                .conditions
                .iter()
                .filter_map(|c| c.last_transition_time)
                .max()
        });
        Self {
            name:     job.metadata.name,
            active:   status.active.unwrap_or(0) > 0,
            finished: succeeded || failed,
            finished_at,
        }
    }
}
