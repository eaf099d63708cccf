//! One guest's visit.
//!
//! Pay at the gate, then repeatedly pick an affordable attraction from the
//! live catalog, ride it, and maybe go home. Leaves when the park closes, the
//! guest gets bored, or the visit cap is hit, and always says goodbye.

use crate::{
    config::GuestConfig,
    discovery::{Discovery, DiscoveryConfig, ParkListedPeers, PeerSource, StaticPeers},
    error::{ParkError, ParkResult},
    rng::{RngStream, SimRng},
    types::Money,
    wire::{CatalogEntry, ParkStatus, UseRequest},
};
use std::{sync::Arc, time::Duration};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GuestReport {
    pub entered:       bool,
    pub visits:        u32,
    pub failed_visits: u32,
    pub spent:         Money,
}

pub struct Guest {
    config:    GuestConfig,
    http:      reqwest::Client,
    discovery: Discovery,
    rng:       SimRng,
    money:     Money,
}

impl Guest {
    pub fn new(config: GuestConfig) -> ParkResult<Self> {
        config.validate()?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.rpc_timeout_ms))
            .build()?;
        let source: Arc<dyn PeerSource> = if config.peers.is_empty() {
            Arc::new(ParkListedPeers::new(http.clone(), config.park_url.clone()))
        } else {
            Arc::new(StaticPeers::new(config.peers.clone()))
        };
        let discovery = Discovery::new(source, DiscoveryConfig {
            probe_timeout: Duration::from_millis(config.probe_timeout_ms),
            ..DiscoveryConfig::default()
        })?;
        let rng = match config.seed {
            Some(seed) => SimRng::new(seed, RngStream::Visit),
            None => SimRng::from_entropy(RngStream::Visit),
        };
        Ok(Self {
            money: config.money,
            config,
            http,
            discovery,
            rng,
        })
    }

    pub async fn run(mut self) -> ParkResult<GuestReport> {
        let mut report = GuestReport::default();
        if let Err(e) = self.enter().await {
            log::info!("Could not enter the park: {e}");
            return Ok(report);
        }
        report.entered = true;
        log::info!("Entered the park with ${:.2}", self.money);

        loop {
            if self.config.max_visits.is_some_and(|cap| report.visits + report.failed_visits >= cap) {
                break;
            }
            if self.park_closed().await {
                log::info!("Park is closed, heading home");
                break;
            }
            match self.visit().await {
                Ok(Some(entry)) => {
                    report.visits += 1;
                    report.spent += entry.fee;
                    log::info!("Rode {} for ${:.2}", entry.url, entry.fee);
                }
                Ok(None) => {
                    report.failed_visits += 1;
                    log::debug!("Nothing affordable to ride");
                }
                Err(e) => {
                    report.failed_visits += 1;
                    log::warn!("Visit failed: {e}");
                }
            }
            if self.rng.chance(self.config.leave_chance) {
                log::info!("Decided to leave early");
                break;
            }
            tokio::time::sleep(self.pause()).await;
        }

        self.leave().await;
        log::info!(
            "Visit over: {} rides, ${:.2} spent, ${:.2} left",
            report.visits,
            report.spent,
            self.money
        );
        Ok(report)
    }

    async fn enter(&self) -> ParkResult<()> {
        let url = self.park_path("/enter");
        let resp = self.http.post(&url).send().await?;
        if !resp.status().is_success() {
            return Err(ParkError::PeerRejected {
                peer:   self.config.park_url.clone(),
                status: resp.status().as_u16(),
            });
        }
        Ok(())
    }

    /// An unreachable park counts as closed.
    async fn park_closed(&self) -> bool {
        let url = self.park_path("/park-status");
        let status = async {
            let resp = self.http.get(&url).send().await.ok()?;
            resp.json::<ParkStatus>().await.ok()
        };
        status.await.map_or(true, |s| s.is_closed)
    }

    /// Ride one random affordable attraction. `Ok(None)` when there is none.
    async fn visit(&mut self) -> ParkResult<Option<CatalogEntry>> {
        let money = self.money;
        let affordable: Vec<CatalogEntry> = self
            .discovery
            .attraction_catalog()
            .await?
            .into_iter()
            .filter(|a| a.fee <= money)
            .collect();
        if affordable.is_empty() {
            return Ok(None);
        }
        let pick = self.rng.next_u64_below(affordable.len() as u64) as usize;
        let entry = affordable[pick].clone();

        let url = format!("{}/use", entry.url.trim_end_matches('/'));
        let resp = self
            .http
            .post(&url)
            .json(&UseRequest { guest_money: Some(money) })
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(ParkError::PeerRejected {
                peer:   entry.url,
                status: resp.status().as_u16(),
            });
        }
        self.money -= entry.fee;
        Ok(Some(entry))
    }

    async fn leave(&self) {
        let url = self.park_path("/leave");
        match self.http.post(&url).send().await {
            Ok(resp) if resp.status().is_success() => {}
            Ok(resp) => log::warn!("Park refused our exit: {}", resp.status()),
            Err(e) => log::warn!("Could not reach the park to leave: {e}"),
        }
    }

    fn pause(&mut self) -> Duration {
        let min = self.config.min_pause_ms;
        let spread = self.config.max_pause_ms.saturating_sub(min);
        let jitter = if spread == 0 { 0 } else { self.rng.next_u64_below(spread + 1) };
        Duration::from_millis(min + jitter)
    }

    fn park_path(&self, path: &str) -> String {
        format!("{}{path}", self.config.park_url.trim_end_matches('/'))
    }
}
