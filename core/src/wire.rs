//! JSON bodies exchanged between park, attractions, and guests.

use crate::types::{Acres, AttractionId, Money};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `GET /park-status`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ParkStatus {
    pub is_closed:   bool,
    pub total_space: Acres,
    #[serde(default)]
    pub used_space:  Acres,
    pub money:       Money,
    #[serde(default)]
    pub time:        Option<DateTime<Utc>>,
}

/// `POST /transaction`. Positive is revenue, negative is a cost.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRequest {
    pub amount: Money,
}

/// `POST /register`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub url:         AttractionId,
    pub build_cost:  Money,
    pub repair_cost: Money,
    pub size:        Acres,
}

/// `POST /break` and `POST /remove`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AttractionRef {
    pub url: AttractionId,
}

/// `GET /attraction-status`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AttractionStatus {
    pub fee:       Money,
    pub size:      Acres,
    #[serde(default)]
    pub is_broken: bool,
}

/// `POST /use`. The body is optional; without it no fee check is made.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UseRequest {
    #[serde(default)]
    pub guest_money: Option<Money>,
}

/// One attraction a guest may visit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub url:  String,
    pub fee:  Money,
    pub size: Acres,
}

/// `POST /transaction` reply: the balance after the change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BalanceBody {
    pub money: Money,
}

/// `POST /enter` reply.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionBody {
    pub fee: Money,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum RegisterOutcome {
    /// New attraction, now pending its first health check.
    Built,
    /// Broken attraction paid for and back in service.
    Repaired,
    /// Already pending or operational; nothing charged.
    AlreadyRegistered,
}

/// `POST /register` reply.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RegisterBody {
    pub outcome: RegisterOutcome,
}

/// One entry of `GET /attractions`: an operational attraction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AttractionListing {
    pub url:  AttractionId,
    pub size: Acres,
}

/// Error body returned by every endpoint on failure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorBody {
    pub error: String,
}
