//! Guest reconciliation loop.
//!
//! EXECUTION ORDER (every tick, never reordered):
//!   1. Advance the simulated clock
//!   2. Closed: delete every guest workload, skip admission
//!   3. Open:   Bernoulli admission trial, create one guest if there is room
//!   4. Open:   delete finished guests past the retention window
//!   5. Probe pending attractions and promote the ones that answer healthy
//!   6. Save the snapshot on the save interval
//!
//! RULES:
//!   - The ledger lock is never held across an outbound call.
//!   - Orchestrator and probe failures are logged; the loop keeps ticking.
//!   - Only ledger failures abort a tick.

use crate::{
    clock::SimClock,
    discovery::{Discovery, ATTRACTION_STATUS_PATH},
    economy::Economy,
    error::ParkResult,
    event::ParkEvent,
    orchestrator::WorkloadOrchestrator,
    rng::{RngStream, SimRng},
    types::{AttractionId, Tick},
    wire::AttractionStatus,
};
use chrono::{DateTime, Utc};
use std::{sync::Arc, time::Duration};
use tokio::{sync::watch, time::MissedTickBehavior};

pub const DEFAULT_ADMISSION_CHANCE: f64 = 0.1;
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(3600);
pub const DEFAULT_SAVE_EVERY: Tick = 10;

#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    pub tick_interval:    Duration,
    pub speed:            u32,
    pub admission_chance: f64,
    pub retention:        Duration,
    pub save_every:       Tick,
    /// Address guests use to reach the park.
    pub self_url:         String,
    pub seed:             Option<u64>,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            tick_interval:    Duration::from_secs(1),
            speed:            crate::clock::DEFAULT_SPEED,
            admission_chance: DEFAULT_ADMISSION_CHANCE,
            retention:        DEFAULT_RETENTION,
            save_every:       DEFAULT_SAVE_EVERY,
            self_url:         String::new(),
            seed:             None,
        }
    }
}

/// What one tick did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub tick:          Tick,
    pub now:           Option<DateTime<Utc>>,
    pub open:          bool,
    pub guest_created: Option<String>,
    pub cleaned_up:    usize,
    pub promoted:      Vec<AttractionId>,
    pub saved:         bool,
}

pub struct Reconciler {
    economy:      Arc<Economy>,
    orchestrator: Arc<dyn WorkloadOrchestrator>,
    discovery:    Arc<Discovery>,
    clock:        SimClock,
    rng:          SimRng,
    config:       ReconcileConfig,
    tick_count:   Tick,
    was_open:     Option<bool>,
}

impl Reconciler {
    pub fn new(
        economy: Arc<Economy>,
        orchestrator: Arc<dyn WorkloadOrchestrator>,
        discovery: Arc<Discovery>,
        config: ReconcileConfig,
    ) -> Self {
        let rng = match config.seed {
            Some(seed) => SimRng::new(seed, RngStream::Admission),
            None => SimRng::from_entropy(RngStream::Admission),
        };
        Self {
            economy,
            orchestrator,
            discovery,
            clock: SimClock::new(config.speed),
            rng,
            config,
            tick_count: 0,
            was_open: None,
        }
    }

    pub async fn tick(&mut self) -> ParkResult<TickReport> {
        self.tick_count += 1;
        let mut report = TickReport { tick: self.tick_count, ..TickReport::default() };

        // 1. Clock
        let clock = self.clock;
        let wall = self.config.tick_interval;
        let (now, open) = self.economy.ledger().mutate(|s| {
            s.simulated_clock = clock.advance(s.simulated_clock, wall);
            Ok((s.simulated_clock, s.is_open()))
        })?;
        report.now = Some(now);
        report.open = open;
        self.note_opening(now, open);

        if open {
            // 3. Admission
            if self.rng.chance(self.config.admission_chance) {
                report.guest_created = self.admit_guest().await?;
            }
            // 4. Retention cleanup
            match self.orchestrator.cleanup_finished(self.config.retention).await {
                Ok(n) => report.cleaned_up = n,
                Err(e) => log::warn!("Cleanup of finished guests failed: {e}"),
            }
        } else {
            // 2. Closed
            match self.orchestrator.cleanup_all().await {
                Ok(n) => report.cleaned_up = n,
                Err(e) => log::warn!("Cleanup of guests failed: {e}"),
            }
        }

        // 5. Health checks
        report.promoted = self.promote_pending().await?;

        // 6. Save
        if self.config.save_every > 0 && self.tick_count % self.config.save_every == 0 {
            match self.economy.ledger().save() {
                Ok(()) => report.saved = true,
                Err(e) => log::warn!("Interval save failed: {e}"),
            }
        }

        self.log_gauges()?;
        Ok(report)
    }

    /// Tick on the configured interval until `shutdown` flips.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.config.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        log::info!(
            "Reconciler started: every {:?}, speed x{}, admission p={}",
            self.config.tick_interval,
            self.config.speed,
            self.config.admission_chance
        );
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        log::error!("Reconcile tick {} failed: {e}", self.tick_count);
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
        log::info!("Reconciler stopped after {} ticks", self.tick_count);
    }

    async fn admit_guest(&mut self) -> ParkResult<Option<String>> {
        let has_room = self.economy.ledger().view(|s| s.can_admit_guest())?;
        if !has_room {
            log::debug!("Park is full, no guest this tick");
            return Ok(None);
        }
        match self.orchestrator.create_guest(&self.config.self_url).await {
            Ok(name) => {
                log::info!("Guest {name} is on the way");
                Ok(Some(name))
            }
            Err(e) => {
                log::warn!("Failed to create guest: {e}");
                Ok(None)
            }
        }
    }

    async fn promote_pending(&self) -> ParkResult<Vec<AttractionId>> {
        let pending = self.economy.ledger().view(|s| s.pending_attractions())?;
        if pending.is_empty() {
            return Ok(Vec::new());
        }
        let answered = self
            .discovery
            .probe_endpoints::<AttractionStatus>(pending, ATTRACTION_STATUS_PATH)
            .await;

        let mut promoted = Vec::new();
        for probe in answered {
            if probe.body.is_broken {
                log::debug!("{} answered but reports itself broken, not promoting", probe.endpoint);
                continue;
            }
            match self.economy.mark_operational(&probe.endpoint) {
                Ok(true) => promoted.push(probe.endpoint),
                Ok(false) => {}
                // Removed between the probe and now.
                Err(e) if e.is_rejection() => log::debug!("Skipping {}: {e}", probe.endpoint),
                Err(e) => return Err(e),
            }
        }
        Ok(promoted)
    }

    fn note_opening(&mut self, now: DateTime<Utc>, open: bool) {
        match self.was_open {
            Some(prev) if prev == open => {}
            Some(_) => {
                let event = if open { ParkEvent::ParkOpened } else { ParkEvent::ParkClosed };
                log::info!("Park is now {} at {now}", if open { "open" } else { "closed" });
                self.economy.record(now, event);
            }
            None => log::info!("Park is {} at {now}", if open { "open" } else { "closed" }),
        }
        self.was_open = Some(open);
    }

    fn log_gauges(&self) -> ParkResult<()> {
        self.economy.ledger().view(|s| {
            log::debug!(
                "tick={} time={} open={} money={:.2} space={:.2}/{:.2} attractions={}",
                self.tick_count,
                s.simulated_clock,
                s.is_open(),
                s.money,
                s.used_space,
                s.total_space,
                s.attractions.len()
            );
        })
    }
}
