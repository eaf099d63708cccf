//! Attraction service.
//!
//! A ride the park pays for once and guests pay per use. On startup it
//! registers with the park (build, or repair if it went down broken), then
//! serves `/attraction-status` and `/use` and occasionally breaks.
//!
//! RULE: the broken flag is persisted before it is reported, so a restart
//! always knows whether a repair is owed.

use crate::{
    config::AttractionConfig,
    error::{ParkError, ParkResult},
    rng::{RngStream, SimRng},
    snapshot::SnapshotFile,
    wire::{
        AttractionRef, AttractionStatus, RegisterBody, RegisterOutcome, RegisterRequest,
        TransactionRequest, UseRequest,
    },
};
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::{future::Future, sync::Arc, sync::RwLock, time::Duration};
use tokio::{net::TcpListener, sync::watch, time::MissedTickBehavior};

pub const ATTRACTION_SNAPSHOT_FILE: &str = "state.json";

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AttractionState {
    pub is_broken: bool,
}

pub struct Attraction {
    config:   AttractionConfig,
    state:    RwLock<AttractionState>,
    snapshot: SnapshotFile,
    http:     reqwest::Client,
}

impl Attraction {
    pub fn load(config: AttractionConfig) -> ParkResult<Arc<Self>> {
        config.validate()?;
        let snapshot = SnapshotFile::new(config.volume.as_deref(), ATTRACTION_SNAPSHOT_FILE);
        let state = snapshot.load::<AttractionState>()?.unwrap_or_default();
        if state.is_broken {
            log::info!("{} starts up broken, a repair is owed", config.name);
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.rpc_timeout_ms))
            .build()?;
        Ok(Arc::new(Self {
            config,
            state: RwLock::new(state),
            snapshot,
            http,
        }))
    }

    pub fn config(&self) -> &AttractionConfig {
        &self.config
    }

    pub fn is_broken(&self) -> bool {
        self.state.read().map(|s| s.is_broken).unwrap_or(true)
    }

    pub fn set_broken(&self, broken: bool) -> ParkResult<()> {
        let mut state = self.state.write().map_err(|_| ParkError::LockPoisoned)?;
        let next = AttractionState { is_broken: broken };
        self.snapshot.save(&next)?;
        *state = next;
        Ok(())
    }

    pub fn status(&self) -> AttractionStatus {
        AttractionStatus {
            fee:       self.config.fee,
            size:      self.config.size,
            is_broken: self.is_broken(),
        }
    }

    /// Register with the park. A broken attraction is repaired, paying the
    /// repair cost; the broken flag is cleared only once the park accepted.
    pub async fn register(&self) -> ParkResult<RegisterOutcome> {
        let mut outcome = self.post_register().await?;
        if self.is_broken() && outcome == RegisterOutcome::AlreadyRegistered {
            // The park missed the breakdown. Report it, then pay for the repair.
            self.report_broken().await?;
            outcome = self.post_register().await?;
        }
        if self.is_broken() {
            self.set_broken(false)?;
        }
        match outcome {
            RegisterOutcome::Built => log::info!("Built {} for ${:.2}", self.config.name, self.config.build_cost),
            RegisterOutcome::Repaired => {
                log::info!("Repaired {} for ${:.2}", self.config.name, self.config.repair_cost)
            }
            RegisterOutcome::AlreadyRegistered => log::info!("{} was already registered", self.config.name),
        }
        Ok(outcome)
    }

    /// One ride. Checks availability and the guest's wallet, collects the
    /// fee through the park, then takes the ride's duration. No refunds.
    pub async fn ride(&self, req: UseRequest) -> ParkResult<()> {
        if self.is_broken() {
            return Err(ParkError::Unavailable(format!("{} is broken", self.config.name)));
        }
        if self.config.closed {
            return Err(ParkError::Unavailable(format!("{} is closed", self.config.name)));
        }
        if let Some(money) = req.guest_money {
            if money < self.config.fee {
                return Err(ParkError::InsufficientFunds {
                    needed:    self.config.fee,
                    available: money,
                });
            }
        }
        self.pay(self.config.fee).await?;
        tokio::time::sleep(self.config.duration()).await;
        Ok(())
    }

    /// Tell the park this attraction is broken.
    pub async fn report_broken(&self) -> ParkResult<()> {
        let url = self.park_path("/break");
        let resp = self
            .http
            .post(&url)
            .json(&AttractionRef { url: self.config.self_url.clone() })
            .send()
            .await?;
        self.expect_success(resp).await?;
        Ok(())
    }

    /// One breakage trial. Returns true when the attraction just broke.
    pub async fn breakage_tick(&self, rng: &mut SimRng) -> ParkResult<bool> {
        if self.is_broken() || !rng.chance(self.config.break_chance) {
            return Ok(false);
        }
        self.set_broken(true)?;
        log::info!("{} has broken down", self.config.name);
        if let Err(e) = self.report_broken().await {
            log::warn!("Could not report breakdown to the park: {e}");
        }
        Ok(true)
    }

    pub async fn run_breakage(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut rng = match self.config.seed {
            Some(seed) => SimRng::new(seed, RngStream::Breakage),
            None => SimRng::from_entropy(RngStream::Breakage),
        };
        let mut interval = tokio::time::interval(Duration::from_millis(self.config.break_tick_ms.max(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.breakage_tick(&mut rng).await {
                        log::warn!("Breakage tick failed: {e}");
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
    }

    pub fn router(self: Arc<Self>) -> Router {
        Router::new()
            .route("/attraction-status", get(attraction_status))
            .route("/use", post(use_attraction))
            .with_state(self)
    }

    /// Register, then serve and run the breakage loop until `shutdown`.
    pub async fn serve(
        self: Arc<Self>,
        listener: TcpListener,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> ParkResult<()> {
        self.register().await?;

        let (stop_tx, stop_rx) = watch::channel(false);
        let breakage = tokio::spawn(Arc::clone(&self).run_breakage(stop_rx));

        log::info!("{} listening on {}", self.config.name, listener.local_addr()?);
        axum::serve(listener, Arc::clone(&self).router())
            .with_graceful_shutdown(shutdown)
            .await?;

        let _ = stop_tx.send(true);
        if let Err(e) = breakage.await {
            log::warn!("Breakage task ended abnormally: {e}");
        }
        Ok(())
    }

    async fn post_register(&self) -> ParkResult<RegisterOutcome> {
        let url = self.park_path("/register");
        let req = RegisterRequest {
            url:         self.config.self_url.clone(),
            build_cost:  self.config.build_cost,
            repair_cost: self.config.repair_cost,
            size:        self.config.size,
        };
        let resp = self.http.post(&url).json(&req).send().await?;
        let body: RegisterBody = self.expect_success(resp).await?.json().await?;
        Ok(body.outcome)
    }

    async fn pay(&self, amount: f64) -> ParkResult<()> {
        let url = self.park_path("/transaction");
        let sent = self
            .http
            .post(&url)
            .json(&TransactionRequest { amount })
            .send()
            .await;
        match sent {
            Ok(resp) if resp.status().is_success() => Ok(()),
            Ok(resp) => Err(ParkError::PaymentFailed(format!("park answered {}", resp.status()))),
            Err(e) => Err(ParkError::PaymentFailed(e.to_string())),
        }
    }

    async fn expect_success(&self, resp: reqwest::Response) -> ParkResult<reqwest::Response> {
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        log::debug!("Park rejected request with {status}: {body}");
        Err(ParkError::PeerRejected {
            peer: self.config.park_url.clone(),
            status,
        })
    }

    fn park_path(&self, path: &str) -> String {
        format!("{}{path}", self.config.park_url.trim_end_matches('/'))
    }
}

async fn attraction_status(State(attraction): State<Arc<Attraction>>) -> Json<AttractionStatus> {
    Json(attraction.status())
}

/// The body is optional; an empty body skips the wallet check.
async fn use_attraction(State(attraction): State<Arc<Attraction>>, body: Bytes) -> ParkResult<StatusCode> {
    let req = if body.is_empty() {
        UseRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| ParkError::BadRequest(e.to_string()))?
    };
    attraction.ride(req).await?;
    Ok(StatusCode::OK)
}
