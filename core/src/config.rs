use crate::{
    clock::{OpeningHours, DEFAULT_SPEED},
    discovery::DiscoveryConfig,
    error::{ParkError, ParkResult},
    reconcile::{ReconcileConfig, DEFAULT_ADMISSION_CHANCE, DEFAULT_SAVE_EVERY},
    state::{Mode, ParkState, DEFAULT_ENTRANCE_FEE, DEFAULT_GUEST_FOOTPRINT},
    types::{Acres, Money, Tick},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

pub const DEFAULT_PARK_URL: &str = "http://kubepark:80";
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:80";

// ── Park ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParkConfig {
    pub mode: Mode,
    /// Directory for `state.json` and `journal.db`. None keeps everything
    /// in memory.
    pub volume: Option<PathBuf>,
    pub closed: bool,
    pub entrance_fee: Money,
    pub opens_at: u32,
    pub closes_at: u32,
    pub guest_footprint: Acres,
    /// Reserve guest space on `/enter` and release it on `/leave`.
    pub track_guest_space: bool,
    pub listen_addr: String,
    /// Address advertised to guests.
    pub self_url: String,
    /// Guest container image. Empty runs guests in-process.
    pub image: String,
    pub namespace: String,
    /// Static peer base URLs. Empty uses the in-cluster pod list.
    pub peers: Vec<String>,
    pub peer_port: u16,
    pub tick_interval_ms: u64,
    pub speed: u32,
    pub admission_chance: f64,
    pub retention_secs: u64,
    pub save_every: Tick,
    pub probe_timeout_ms: u64,
    pub discovery_deadline_ms: u64,
    pub probe_concurrency: usize,
    pub seed: Option<u64>,
}

impl Default for ParkConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Easy,
            volume: None,
            closed: false,
            entrance_fee: DEFAULT_ENTRANCE_FEE,
            opens_at: 8,
            closes_at: 20,
            guest_footprint: DEFAULT_GUEST_FOOTPRINT,
            track_guest_space: false,
            listen_addr: DEFAULT_LISTEN_ADDR.into(),
            self_url: DEFAULT_PARK_URL.into(),
            image: String::new(),
            namespace: crate::orchestrator::GUEST_NAMESPACE.into(),
            peers: Vec::new(),
            peer_port: 80,
            tick_interval_ms: 1_000,
            speed: DEFAULT_SPEED,
            admission_chance: DEFAULT_ADMISSION_CHANCE,
            retention_secs: 3_600,
            save_every: DEFAULT_SAVE_EVERY,
            probe_timeout_ms: 2_000,
            discovery_deadline_ms: 10_000,
            probe_concurrency: 16,
            seed: None,
        }
    }
}

impl ParkConfig {
    /// Load from a JSON file. Missing keys take their defaults.
    /// In tests, use ParkConfig::default_test().
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        Ok(config)
    }

    /// Fast, seeded, in-memory, always open.
    pub fn default_test() -> Self {
        Self {
            opens_at: 0,
            closes_at: 24,
            listen_addr: "127.0.0.1:0".into(),
            self_url: "http://127.0.0.1".into(),
            tick_interval_ms: 10,
            probe_timeout_ms: 500,
            discovery_deadline_ms: 1_000,
            seed: Some(42),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> ParkResult<()> {
        if self.opens_at > 23 || self.closes_at > 24 {
            return Err(ParkError::Config(format!(
                "opening hours {}..{} out of range",
                self.opens_at, self.closes_at
            )));
        }
        if !self.entrance_fee.is_finite() || self.entrance_fee < 0.0 {
            return Err(ParkError::Config(format!("invalid entrance fee {}", self.entrance_fee)));
        }
        if !self.guest_footprint.is_finite() || self.guest_footprint < 0.0 {
            return Err(ParkError::Config(format!("invalid guest footprint {}", self.guest_footprint)));
        }
        if !(0.0..=1.0).contains(&self.admission_chance) {
            return Err(ParkError::Config(format!(
                "admission chance {} not in [0, 1]",
                self.admission_chance
            )));
        }
        if self.speed == 0 || self.tick_interval_ms == 0 {
            return Err(ParkError::Config("speed and tick interval must be positive".into()));
        }
        Ok(())
    }

    pub fn hours(&self) -> OpeningHours {
        OpeningHours::new(self.opens_at, self.closes_at)
    }

    /// A fresh park for this configuration.
    pub fn initial_state(&self, now: DateTime<Utc>) -> ParkState {
        let mut state = ParkState::new(self.mode, now);
        state.guest_footprint = self.guest_footprint;
        self.apply_operator_settings(&mut state);
        state
    }

    /// Operator settings always come from configuration, also over a
    /// loaded snapshot. Money and capacity stay as persisted.
    pub fn apply_operator_settings(&self, state: &mut ParkState) {
        state.closed = self.closed;
        state.hours = self.hours();
        state.entrance_fee = self.entrance_fee;
    }

    pub fn reconcile(&self) -> ReconcileConfig {
        ReconcileConfig {
            tick_interval: Duration::from_millis(self.tick_interval_ms),
            speed: self.speed,
            admission_chance: self.admission_chance,
            retention: Duration::from_secs(self.retention_secs),
            save_every: self.save_every,
            self_url: self.self_url.clone(),
            seed: self.seed,
        }
    }

    pub fn discovery(&self) -> DiscoveryConfig {
        DiscoveryConfig {
            probe_timeout: Duration::from_millis(self.probe_timeout_ms),
            deadline: Duration::from_millis(self.discovery_deadline_ms),
            concurrency: self.probe_concurrency,
        }
    }
}

// ── Attraction ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum AttractionKind {
    Carousel,
    Restroom,
    WoodenRollercoaster,
}

impl std::str::FromStr for AttractionKind {
    type Err = ParkError;

    fn from_str(s: &str) -> ParkResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "carousel" => Ok(Self::Carousel),
            "restroom" => Ok(Self::Restroom),
            "wooden-rollercoaster" => Ok(Self::WoodenRollercoaster),
            other => Err(ParkError::Config(format!("unknown attraction kind '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AttractionConfig {
    pub name: String,
    pub fee: Money,
    /// How long one ride takes.
    pub duration_ms: u64,
    pub build_cost: Money,
    pub repair_cost: Money,
    pub size: Acres,
    pub park_url: String,
    /// Address the park and guests use to reach this attraction. It is also
    /// the attraction's id in the park.
    pub self_url: String,
    pub volume: Option<PathBuf>,
    pub closed: bool,
    /// Chance per breakage tick of breaking down.
    pub break_chance: f64,
    pub break_tick_ms: u64,
    pub listen_addr: String,
    pub rpc_timeout_ms: u64,
    pub seed: Option<u64>,
}

impl Default for AttractionConfig {
    fn default() -> Self {
        Self::preset(AttractionKind::Carousel)
    }
}

impl AttractionConfig {
    pub fn preset(kind: AttractionKind) -> Self {
        let (name, fee, duration_ms, build_cost, repair_cost, size) = match kind {
            AttractionKind::Carousel => ("carousel", 5.0, 3_000, 20_000.0, 1_000.0, 10.0),
            AttractionKind::Restroom => ("restroom", 2.0, 2_000, 10_000.0, 500.0, 1.0),
            AttractionKind::WoodenRollercoaster => {
                ("wooden-rollercoaster", 15.0, 45_000, 150_000.0, 5_000.0, 25.0)
            }
        };
        Self {
            name: name.into(),
            fee,
            duration_ms,
            build_cost,
            repair_cost,
            size,
            park_url: DEFAULT_PARK_URL.into(),
            self_url: format!("http://{name}"),
            volume: None,
            closed: false,
            break_chance: 0.001,
            break_tick_ms: 1_000,
            listen_addr: DEFAULT_LISTEN_ADDR.into(),
            rpc_timeout_ms: 5_000,
            seed: None,
        }
    }

    /// Instant rides, never breaks, local addresses.
    pub fn default_test() -> Self {
        Self {
            name: "test-ride".into(),
            duration_ms: 0,
            break_chance: 0.0,
            listen_addr: "127.0.0.1:0".into(),
            rpc_timeout_ms: 1_000,
            seed: Some(7),
            ..Self::preset(AttractionKind::Carousel)
        }
    }

    pub fn validate(&self) -> ParkResult<()> {
        let amounts = [self.fee, self.build_cost, self.repair_cost, self.size];
        if amounts.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(ParkError::Config(
                "fee, build cost, repair cost and size must be finite and non-negative".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.break_chance) {
            return Err(ParkError::Config(format!("break chance {} not in [0, 1]", self.break_chance)));
        }
        if self.self_url.is_empty() {
            return Err(ParkError::Config("self url must be set".into()));
        }
        Ok(())
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

// ── Guest ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GuestConfig {
    pub park_url: String,
    /// Static attraction base URLs. Empty asks the park for its
    /// operational attractions and probes those.
    pub peers: Vec<String>,
    pub money: Money,
    /// Chance of leaving after each visit.
    pub leave_chance: f64,
    pub min_pause_ms: u64,
    pub max_pause_ms: u64,
    /// Hard cap on visits, for tests.
    pub max_visits: Option<u32>,
    pub rpc_timeout_ms: u64,
    pub probe_timeout_ms: u64,
    pub seed: Option<u64>,
}

impl Default for GuestConfig {
    fn default() -> Self {
        Self {
            park_url: DEFAULT_PARK_URL.into(),
            peers: Vec::new(),
            money: 100.0,
            leave_chance: 0.3,
            min_pause_ms: 30_000,
            max_pause_ms: 60_000,
            max_visits: None,
            rpc_timeout_ms: 5_000,
            probe_timeout_ms: 2_000,
            seed: None,
        }
    }
}

impl GuestConfig {
    /// No pauses, bounded visits, seeded.
    pub fn default_test() -> Self {
        Self {
            min_pause_ms: 0,
            max_pause_ms: 0,
            max_visits: Some(3),
            rpc_timeout_ms: 1_000,
            probe_timeout_ms: 500,
            seed: Some(11),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> ParkResult<()> {
        if !self.money.is_finite() || self.money < 0.0 {
            return Err(ParkError::Config(format!("invalid guest money {}", self.money)));
        }
        if !(0.0..=1.0).contains(&self.leave_chance) {
            return Err(ParkError::Config(format!("leave chance {} not in [0, 1]", self.leave_chance)));
        }
        if self.min_pause_ms > self.max_pause_ms {
            return Err(ParkError::Config("min pause exceeds max pause".into()));
        }
        Ok(())
    }
}
