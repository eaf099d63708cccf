//! Ledger events, one per accepted change to the park.
//!
//! Events are written to the journal after the ledger lock is released.
//! Variants are append-only; the journal stores the tag as `event_type`.

use crate::types::{Acres, AttractionId, Money};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParkEvent {
    // ── Guests ─────────────────────────────────────────────
    GuestAdmitted {
        fee: Money,
        reserved: Acres,
    },
    GuestLeft {
        released: Acres,
    },

    // ── Money ──────────────────────────────────────────────
    TransactionApplied {
        amount: Money,
    },

    // ── Attraction lifecycle ───────────────────────────────
    AttractionRegistered {
        id: AttractionId,
        build_cost: Money,
        footprint: Acres,
    },
    AttractionOperational {
        id: AttractionId,
    },
    AttractionBroken {
        id: AttractionId,
    },
    AttractionRepaired {
        id: AttractionId,
        repair_cost: Money,
    },
    AttractionRemoved {
        id: AttractionId,
        footprint: Acres,
    },

    // ── Opening hours ──────────────────────────────────────
    ParkOpened,
    ParkClosed,
}

impl ParkEvent {
    /// Stable name for the `event_type` column.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::GuestAdmitted { .. }         => "guest_admitted",
            Self::GuestLeft { .. }             => "guest_left",
            Self::TransactionApplied { .. }    => "transaction_applied",
            Self::AttractionRegistered { .. }  => "attraction_registered",
            Self::AttractionOperational { .. } => "attraction_operational",
            Self::AttractionBroken { .. }      => "attraction_broken",
            Self::AttractionRepaired { .. }    => "attraction_repaired",
            Self::AttractionRemoved { .. }     => "attraction_removed",
            Self::ParkOpened                   => "park_opened",
            Self::ParkClosed                   => "park_closed",
        }
    }
}

/// The journal row as persisted to SQLite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogEntry {
    pub id:         Option<i64>,
    pub sim_time:   DateTime<Utc>,
    pub event_type: String,
    pub payload:    String, // JSON-serialized ParkEvent
}

impl EventLogEntry {
    pub fn decode(&self) -> serde_json::Result<ParkEvent> {
        serde_json::from_str(&self.payload)
    }
}
