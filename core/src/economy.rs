//! Attraction registry and park economy.
//!
//! Validates and applies every money- or space-moving request against the
//! ledger, and owns the attraction lifecycle:
//!
//!   register        Unregistered      -> PendingDeployment  (-buildCost, +footprint)
//!   health check    PendingDeployment -> Operational
//!   break           Operational       -> Broken
//!   re-register     Broken            -> Operational        (-repairCost)
//!   remove          any               -> Unregistered       (-footprint)
//!
//! Each operation is one `Ledger::mutate` call, so the checks and the
//! change happen under the same lock. Journal writes happen afterwards.

use crate::{
    error::{ParkError, ParkResult},
    event::ParkEvent,
    ledger::Ledger,
    state::{AttractionRecord, LifecycleState, ParkState},
    store::ParkStore,
    types::Money,
    wire::{ParkStatus, RegisterRequest},
};
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub use crate::wire::RegisterOutcome;

pub struct Economy {
    ledger:            Arc<Ledger>,
    journal:           Arc<ParkStore>,
    track_guest_space: bool,
}

impl Economy {
    pub fn new(ledger: Arc<Ledger>, journal: Arc<ParkStore>) -> Self {
        Self { ledger, journal, track_guest_space: false }
    }

    /// Reserve the guest footprint on `/enter` and release it on `/leave`.
    /// Off by default: guests are then checked against capacity but hold
    /// no space.
    pub fn with_guest_space_tracking(mut self, enabled: bool) -> Self {
        self.track_guest_space = enabled;
        self
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    pub fn journal(&self) -> &Arc<ParkStore> {
        &self.journal
    }

    pub fn status(&self) -> ParkResult<ParkStatus> {
        self.ledger.view(|s| ParkStatus {
            is_closed:   !s.is_open(),
            total_space: s.total_space,
            used_space:  s.used_space,
            money:       s.money,
            time:        Some(s.simulated_clock),
        })
    }

    /// Signed payment from an attraction (positive) or a charge (negative).
    pub fn apply_transaction(&self, amount: Money) -> ParkResult<Money> {
        let (balance, time) = self.ledger.mutate(|s| {
            s.apply_transaction(amount)?;
            Ok((s.money, s.simulated_clock))
        })?;
        self.record(time, ParkEvent::TransactionApplied { amount });
        Ok(balance)
    }

    /// Collect the entrance fee from one guest.
    pub fn enter(&self) -> ParkResult<Money> {
        let track = self.track_guest_space;
        let (fee, reserved, time) = self.ledger.mutate(|s| {
            if !s.is_open() {
                return Err(ParkError::ParkClosed);
            }
            let reserved = if track {
                s.admit_guest()?;
                s.guest_footprint
            } else if s.can_admit_guest() {
                0.0
            } else {
                return Err(ParkError::CapacityExceeded);
            };
            s.money += s.entrance_fee;
            Ok((s.entrance_fee, reserved, s.simulated_clock))
        })?;
        log::info!("Accepted guest, fee=${fee:.2}");
        self.record(time, ParkEvent::GuestAdmitted { fee, reserved });
        Ok(fee)
    }

    /// A guest is done. Releases its footprint when guest space is tracked.
    pub fn leave(&self) -> ParkResult<()> {
        if !self.track_guest_space {
            return Ok(());
        }
        let (released, time) = self.ledger.mutate(|s| {
            s.release_guest()?;
            Ok((s.guest_footprint, s.simulated_clock))
        })?;
        self.record(time, ParkEvent::GuestLeft { released });
        Ok(())
    }

    /// Onboard a new attraction, or repair a broken one re-registering.
    pub fn register(&self, req: &RegisterRequest) -> ParkResult<RegisterOutcome> {
        validate_register(req)?;
        let (outcome, charged, time) = self.ledger.mutate(|s| {
            let (outcome, charged) = match s.attractions.get(&req.url).map(|a| a.state) {
                None => (RegisterOutcome::Built, build(s, req)?),
                Some(LifecycleState::Broken) => (RegisterOutcome::Repaired, repair(s, &req.url)?),
                Some(_) => (RegisterOutcome::AlreadyRegistered, 0.0),
            };
            Ok((outcome, charged, s.simulated_clock))
        })?;

        match outcome {
            RegisterOutcome::Built => {
                log::info!("Built attraction {} for ${charged:.2}", req.url);
                self.record(time, ParkEvent::AttractionRegistered {
                    id:         req.url.clone(),
                    build_cost: charged,
                    footprint:  req.size,
                });
            }
            RegisterOutcome::Repaired => {
                log::info!("Repaired attraction {} for ${charged:.2}", req.url);
                self.record(time, ParkEvent::AttractionRepaired {
                    id:          req.url.clone(),
                    repair_cost: charged,
                });
            }
            RegisterOutcome::AlreadyRegistered => {
                log::debug!("Attraction {} re-registered, nothing to do", req.url);
            }
        }
        Ok(outcome)
    }

    /// Health check succeeded. Returns true when the record flipped.
    pub fn mark_operational(&self, id: &str) -> ParkResult<bool> {
        let (flipped, time) = self.ledger.mutate(|s| {
            let record = s.attraction_mut(id)?;
            let flipped = record.state == LifecycleState::PendingDeployment;
            if flipped {
                record.state = LifecycleState::Operational;
            }
            Ok((flipped, s.simulated_clock))
        })?;
        if flipped {
            log::info!("Attraction {id} is operational");
            self.record(time, ParkEvent::AttractionOperational { id: id.to_string() });
        }
        Ok(flipped)
    }

    /// The attraction reported itself broken.
    pub fn mark_broken(&self, id: &str) -> ParkResult<()> {
        let (changed, time) = self.ledger.mutate(|s| {
            let record = s.attraction_mut(id)?;
            let changed = match record.state {
                LifecycleState::Operational => {
                    record.state = LifecycleState::Broken;
                    true
                }
                LifecycleState::Broken => false,
                LifecycleState::PendingDeployment => {
                    return Err(ParkError::InvalidTransition {
                        id:   id.to_string(),
                        from: record.state.name(),
                        to:   LifecycleState::Broken.name(),
                    });
                }
            };
            Ok((changed, s.simulated_clock))
        })?;
        if changed {
            log::info!("Attraction {id} has broken down");
            self.record(time, ParkEvent::AttractionBroken { id: id.to_string() });
        }
        Ok(())
    }

    /// Remove an attraction and release its footprint.
    pub fn remove(&self, id: &str) -> ParkResult<AttractionRecord> {
        let (record, time) = self.ledger.mutate(|s| {
            let record = s
                .attractions
                .remove(id)
                .ok_or_else(|| ParkError::AttractionNotFound { id: id.to_string() })?;
            s.release(record.footprint)?;
            Ok((record, s.simulated_clock))
        })?;
        log::info!("Removed attraction {id}, released {:.2} acres", record.footprint);
        self.record(time, ParkEvent::AttractionRemoved {
            id:        id.to_string(),
            footprint: record.footprint,
        });
        Ok(record)
    }

    pub fn operational_attractions(&self) -> ParkResult<Vec<AttractionRecord>> {
        self.ledger.view(|s| {
            s.attractions
                .values()
                .filter(|a| a.state == LifecycleState::Operational)
                .cloned()
                .collect()
        })
    }

    /// Append to the journal. Failures are logged, never propagated: the
    /// ledger change has already been accepted.
    pub fn record(&self, time: DateTime<Utc>, event: ParkEvent) {
        if let Err(e) = self.journal.append_event(time, &event) {
            log::warn!("Failed to journal {}: {e}", event.type_name());
        }
    }
}

fn validate_register(req: &RegisterRequest) -> ParkResult<()> {
    if req.url.trim().is_empty() {
        return Err(ParkError::BadRequest("url must not be empty".into()));
    }
    let amounts = [req.build_cost, req.repair_cost, req.size];
    if amounts.iter().any(|v| !v.is_finite() || *v < 0.0) {
        return Err(ParkError::BadRequest(
            "buildCost, repairCost and size must be finite and non-negative".into(),
        ));
    }
    Ok(())
}

/// Funds are checked before space; both before anything moves.
/// Returns the amount charged.
fn build(s: &mut ParkState, req: &RegisterRequest) -> ParkResult<Money> {
    if s.money < req.build_cost {
        return Err(ParkError::InsufficientFunds {
            needed:    req.build_cost,
            available: s.money,
        });
    }
    s.reserve(req.size)?;
    s.charge(req.build_cost)?;
    s.attractions.insert(req.url.clone(), AttractionRecord {
        id:          req.url.clone(),
        build_cost:  req.build_cost,
        repair_cost: req.repair_cost,
        footprint:   req.size,
        state:       LifecycleState::PendingDeployment,
    });
    Ok(req.build_cost)
}

/// Uses the repair cost recorded at build time.
fn repair(s: &mut ParkState, id: &str) -> ParkResult<Money> {
    let repair_cost = s.attraction(id)?.repair_cost;
    s.charge(repair_cost)?;
    s.attraction_mut(id)?.state = LifecycleState::Operational;
    Ok(repair_cost)
}
