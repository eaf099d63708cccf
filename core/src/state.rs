//! The park snapshot and the capacity allocator embedded in it.
//!
//! RULE: `ParkState` is only ever mutated inside `Ledger::mutate`.
//! Every method here either succeeds completely or returns an error
//! before touching a field.

use crate::{
    clock::{self, OpeningHours},
    error::{ParkError, ParkResult},
    types::{Acres, AttractionId, Money},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const STARTING_MONEY: Money = 100_000.0;
pub const DEFAULT_GUEST_FOOTPRINT: Acres = 0.05;
pub const DEFAULT_ENTRANCE_FEE: Money = 10.0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    Easy,
    Medium,
    Hard,
}

impl Mode {
    pub fn total_space(&self) -> Acres {
        match self {
            Self::Easy   => 300.0,
            Self::Medium => 100.0,
            Self::Hard   => 10.0,
        }
    }
}

impl std::str::FromStr for Mode {
    type Err = ParkError;

    fn from_str(s: &str) -> ParkResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "easy"   => Ok(Self::Easy),
            "medium" => Ok(Self::Medium),
            "hard"   => Ok(Self::Hard),
            other    => Err(ParkError::Config(format!("unknown mode '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    PendingDeployment,
    Operational,
    Broken,
}

impl LifecycleState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::PendingDeployment => "pending_deployment",
            Self::Operational       => "operational",
            Self::Broken            => "broken",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AttractionRecord {
    pub id:          AttractionId,
    pub build_cost:  Money,
    pub repair_cost: Money,
    pub footprint:   Acres,
    pub state:       LifecycleState,
}

impl AttractionRecord {
    pub fn is_pending_health_check(&self) -> bool {
        self.state == LifecycleState::PendingDeployment
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ParkState {
    pub money:           Money,
    pub simulated_clock: DateTime<Utc>,
    pub closed:          bool,
    pub hours:           OpeningHours,
    pub mode:            Mode,
    pub entrance_fee:    Money,
    pub total_space:     Acres,
    pub used_space:      Acres,
    pub guest_footprint: Acres,
    pub attractions:     BTreeMap<AttractionId, AttractionRecord>,
}

impl ParkState {
    /// A fresh park: starting money, empty grounds, mode-sized capacity.
    pub fn new(mode: Mode, now: DateTime<Utc>) -> Self {
        Self {
            money:           STARTING_MONEY,
            simulated_clock: now,
            closed:          false,
            hours:           OpeningHours::default(),
            mode,
            entrance_fee:    DEFAULT_ENTRANCE_FEE,
            total_space:     mode.total_space(),
            used_space:      0.0,
            guest_footprint: DEFAULT_GUEST_FOOTPRINT,
            attractions:     BTreeMap::new(),
        }
    }

    pub fn is_open(&self) -> bool {
        clock::is_open(self.closed, self.hours, self.simulated_clock)
    }

    pub fn available_space(&self) -> Acres {
        self.total_space - self.used_space
    }

    // ── Capacity allocator ─────────────────────────────────────

    /// Slack for float drift in the running total, relative to capacity.
    pub fn space_tolerance(&self) -> Acres {
        1e-9 * self.total_space.max(1.0)
    }

    pub fn has_space_for(&self, footprint: Acres) -> bool {
        self.used_space + footprint <= self.total_space + self.space_tolerance()
    }

    /// Reserve `footprint` acres or fail with `InsufficientSpace`.
    pub fn reserve(&mut self, footprint: Acres) -> ParkResult<()> {
        if footprint < 0.0 || !footprint.is_finite() {
            return Err(ParkError::BadRequest(format!("invalid footprint {footprint}")));
        }
        if !self.has_space_for(footprint) {
            return Err(ParkError::InsufficientSpace {
                needed:    footprint,
                available: self.available_space(),
            });
        }
        self.used_space += footprint;
        Ok(())
    }

    /// Give back `footprint` acres. Releasing more than is reserved is a
    /// logic error and leaves the counter untouched.
    pub fn release(&mut self, footprint: Acres) -> ParkResult<()> {
        let tolerance = self.space_tolerance();
        if footprint - self.used_space > tolerance {
            return Err(ParkError::SpaceUnderflow {
                requested: footprint,
                reserved:  self.used_space,
            });
        }
        let remaining = self.used_space - footprint;
        self.used_space = if remaining < tolerance { 0.0 } else { remaining };
        Ok(())
    }

    pub fn can_admit_guest(&self) -> bool {
        self.has_space_for(self.guest_footprint)
    }

    pub fn admit_guest(&mut self) -> ParkResult<()> {
        if !self.can_admit_guest() {
            return Err(ParkError::CapacityExceeded);
        }
        self.used_space += self.guest_footprint;
        Ok(())
    }

    pub fn release_guest(&mut self) -> ParkResult<()> {
        self.release(self.guest_footprint)
    }

    // ── Money ──────────────────────────────────────────────────

    /// Apply a signed amount. A debit larger than the balance is rejected.
    pub fn apply_transaction(&mut self, amount: Money) -> ParkResult<()> {
        if !amount.is_finite() {
            return Err(ParkError::BadRequest(format!("invalid amount {amount}")));
        }
        if amount < 0.0 {
            self.charge(-amount)?;
        } else {
            self.money += amount;
        }
        Ok(())
    }

    /// Deduct `cost` or fail with `InsufficientFunds`.
    pub fn charge(&mut self, cost: Money) -> ParkResult<()> {
        if self.money < cost {
            return Err(ParkError::InsufficientFunds {
                needed:    cost,
                available: self.money,
            });
        }
        self.money -= cost;
        Ok(())
    }

    pub fn attraction(&self, id: &str) -> ParkResult<&AttractionRecord> {
        self.attractions
            .get(id)
            .ok_or_else(|| ParkError::AttractionNotFound { id: id.to_string() })
    }

    pub fn attraction_mut(&mut self, id: &str) -> ParkResult<&mut AttractionRecord> {
        self.attractions
            .get_mut(id)
            .ok_or_else(|| ParkError::AttractionNotFound { id: id.to_string() })
    }

    pub fn pending_attractions(&self) -> Vec<AttractionId> {
        self.attractions
            .values()
            .filter(|a| a.is_pending_health_check())
            .map(|a| a.id.clone())
            .collect()
    }
}
