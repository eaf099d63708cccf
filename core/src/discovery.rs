//! Polling-based peer discovery.
//!
//! There is no registry. To find a capability, enumerate every sibling
//! endpoint and GET a well-known path on each. A peer that times out, refuses
//! the connection, answers non-200, or sends an undecodable body is simply
//! absent: "unreachable" and "does not implement this" look the same.
//!
//! Probes run concurrently (bounded) under one aggregate deadline. Each probe
//! also has its own timeout. Results collected before the deadline are kept.

use crate::{
    cluster::ClusterClient,
    error::{ParkError, ParkResult},
    wire::{AttractionListing, AttractionStatus, CatalogEntry},
};
use async_trait::async_trait;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use std::{sync::Arc, time::Duration};

pub const PARK_STATUS_PATH: &str = "/park-status";
pub const ATTRACTION_STATUS_PATH: &str = "/attraction-status";

/// Enumerates sibling endpoints as base URLs (`http://host[:port]`).
#[async_trait]
pub trait PeerSource: Send + Sync {
    async fn endpoints(&self) -> ParkResult<Vec<String>>;
}

/// A fixed list of base URLs. Used outside a cluster and in tests.
pub struct StaticPeers {
    endpoints: Vec<String>,
}

impl StaticPeers {
    pub fn new(endpoints: Vec<String>) -> Self {
        Self { endpoints }
    }
}

#[async_trait]
impl PeerSource for StaticPeers {
    async fn endpoints(&self) -> ParkResult<Vec<String>> {
        Ok(self.endpoints.clone())
    }
}

/// Every running pod in the cluster except this one.
pub struct ClusterPeers {
    client:    Arc<ClusterClient>,
    self_name: Option<String>,
    port:      u16,
}

impl ClusterPeers {
    /// `self_name` is this pod's name (`$HOSTNAME` in a pod).
    pub fn new(client: Arc<ClusterClient>, self_name: Option<String>, port: u16) -> Self {
        Self { client, self_name, port }
    }
}

#[async_trait]
impl PeerSource for ClusterPeers {
    async fn endpoints(&self) -> ParkResult<Vec<String>> {
        let ips = self.client.running_pod_ips(self.self_name.as_deref()).await?;
        Ok(ips
            .into_iter()
            .map(|ip| match self.port {
                80 => format!("http://{ip}"),
                port => format!("http://{ip}:{port}"),
            })
            .collect())
    }
}

/// The park's own list of operational attractions.
pub struct ParkListedPeers {
    http:     reqwest::Client,
    park_url: String,
}

impl ParkListedPeers {
    pub fn new(http: reqwest::Client, park_url: impl Into<String>) -> Self {
        Self { http, park_url: park_url.into() }
    }
}

#[async_trait]
impl PeerSource for ParkListedPeers {
    async fn endpoints(&self) -> ParkResult<Vec<String>> {
        let url = format!("{}/attractions", self.park_url.trim_end_matches('/'));
        let resp = self.http.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(ParkError::PeerRejected {
                peer:   self.park_url.clone(),
                status: resp.status().as_u16(),
            });
        }
        let listings: Vec<AttractionListing> = resp.json().await?;
        Ok(listings.into_iter().map(|a| a.url).collect())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DiscoveryConfig {
    pub probe_timeout: Duration,
    pub deadline:      Duration,
    pub concurrency:   usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            probe_timeout: Duration::from_secs(2),
            deadline:      Duration::from_secs(10),
            concurrency:   16,
        }
    }
}

/// A `200 OK` answer and its decoded body.
#[derive(Debug, Clone, PartialEq)]
pub struct Probe<T> {
    pub endpoint: String,
    pub body:     T,
}

pub struct Discovery {
    source: Arc<dyn PeerSource>,
    http:   reqwest::Client,
    config: DiscoveryConfig,
}

impl Discovery {
    pub fn new(source: Arc<dyn PeerSource>, config: DiscoveryConfig) -> ParkResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.probe_timeout)
            .build()?;
        Ok(Self { source, http, config })
    }

    /// Probe `path` on every sibling endpoint. Fails only when the
    /// endpoints cannot be enumerated.
    pub async fn probe_all<T: DeserializeOwned + Send>(&self, path: &str) -> ParkResult<Vec<Probe<T>>> {
        let endpoints = self.source.endpoints().await?;
        Ok(self.probe_endpoints(endpoints, path).await)
    }

    pub async fn probe_endpoints<T: DeserializeOwned + Send>(
        &self,
        endpoints: Vec<String>,
        path: &str,
    ) -> Vec<Probe<T>> {
        self.probe_endpoints_with(endpoints, path, decode_json::<T>).await
    }

    /// `Some(body)` only for a timely `200 OK` with a decodable body.
    pub async fn probe_one<T: DeserializeOwned>(&self, endpoint: &str, path: &str) -> Option<T> {
        self.probe_one_with(endpoint, path, decode_json::<T>).await
    }

    /// Endpoints answering `path` with `200 OK`, whatever the body.
    pub async fn answering_peers(&self, path: &str) -> ParkResult<Vec<String>> {
        let endpoints = self.source.endpoints().await?;
        let probes = self.probe_endpoints_with(endpoints, path, |_| Some(())).await;
        Ok(probes.into_iter().map(|p| p.endpoint).collect())
    }

    async fn probe_endpoints_with<T: Send>(
        &self,
        endpoints: Vec<String>,
        path: &str,
        decode: fn(&[u8]) -> Option<T>,
    ) -> Vec<Probe<T>> {
        let total = endpoints.len();
        let deadline = tokio::time::Instant::now() + self.config.deadline;
        let pending: Vec<_> = endpoints
            .into_iter()
            .map(|endpoint| self.probe_labeled(endpoint, path, decode))
            .collect();
        let mut probes = futures::stream::iter(pending).buffer_unordered(self.config.concurrency.max(1));

        let mut found = Vec::new();
        loop {
            match tokio::time::timeout_at(deadline, probes.next()).await {
                Ok(Some(Some(probe))) => found.push(probe),
                Ok(Some(None)) => {}
                Ok(None) => break,
                Err(_) => {
                    log::warn!(
                        "Discovery deadline hit probing {path}: {} of {total} peers answered",
                        found.len()
                    );
                    break;
                }
            }
        }
        log::debug!("Probed {path} on {total} peers, {} answered", found.len());
        found
    }

    async fn probe_labeled<T>(
        &self,
        endpoint: String,
        path: &str,
        decode: fn(&[u8]) -> Option<T>,
    ) -> Option<Probe<T>> {
        let body = self.probe_one_with(&endpoint, path, decode).await?;
        Some(Probe { endpoint, body })
    }

    async fn probe_one_with<T>(&self, endpoint: &str, path: &str, decode: fn(&[u8]) -> Option<T>) -> Option<T> {
        let url = format!("{}{path}", endpoint.trim_end_matches('/'));
        let attempt = async {
            let resp = self.http.get(&url).send().await.ok()?;
            if resp.status() != reqwest::StatusCode::OK {
                return None;
            }
            let body = resp.bytes().await.ok()?;
            decode(&body)
        };
        match tokio::time::timeout(self.config.probe_timeout, attempt).await {
            Ok(body) => body,
            Err(_) => {
                log::debug!("Probe of {url} timed out");
                None
            }
        }
    }

    /// Attractions that answered and are not broken.
    pub async fn attraction_catalog(&self) -> ParkResult<Vec<CatalogEntry>> {
        let probes = self.probe_all::<AttractionStatus>(ATTRACTION_STATUS_PATH).await?;
        Ok(probes
            .into_iter()
            .filter(|p| !p.body.is_broken)
            .map(|p| CatalogEntry {
                url:  p.endpoint,
                fee:  p.body.fee,
                size: p.body.size,
            })
            .collect())
    }

    /// Fail with `DuplicateInstance` when any peer answers `path` with 200,
    /// whatever the body.
    ///
    /// Best effort: two instances starting inside the same probe window can
    /// both pass. Failure to enumerate peers counts as "no peer".
    pub async fn ensure_singleton(&self, path: &str) -> ParkResult<()> {
        let answering = match self.answering_peers(path).await {
            Ok(answering) => answering,
            Err(e) => {
                log::warn!("Could not enumerate peers for singleton check, proceeding: {e}");
                return Ok(());
            }
        };
        match answering.into_iter().next() {
            Some(peer) => Err(ParkError::DuplicateInstance { peer }),
            None => Ok(()),
        }
    }
}

fn decode_json<T: DeserializeOwned>(body: &[u8]) -> Option<T> {
    serde_json::from_slice(body).ok()
}
