use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::{
    types::{Acres, Money},
    wire::ErrorBody,
};

#[derive(Error, Debug)]
pub enum ParkError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Insufficient funds: need ${needed:.2}, have ${available:.2}")]
    InsufficientFunds { needed: Money, available: Money },

    #[error("Not enough space in park: need {needed:.2} acres, only {available:.2} available")]
    InsufficientSpace { needed: Acres, available: Acres },

    #[error("Park is at capacity")]
    CapacityExceeded,

    #[error("Released {requested:.2} acres but only {reserved:.2} are reserved")]
    SpaceUnderflow { requested: Acres, reserved: Acres },

    #[error("Park is closed")]
    ParkClosed,

    #[error("Attraction '{id}' not found")]
    AttractionNotFound { id: String },

    #[error("Attraction '{id}' cannot go from {from} to {to}")]
    InvalidTransition { id: String, from: &'static str, to: &'static str },

    #[error("Another park is already answering at {peer}")]
    DuplicateInstance { peer: String },

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Peer {peer} answered with status {status}")]
    PeerRejected { peer: String, status: u16 },

    #[error("Unavailable: {0}")]
    Unavailable(String),

    #[error("Payment failed: {0}")]
    PaymentFailed(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Orchestrator error: {0}")]
    Orchestrator(String),

    #[error("Ledger lock poisoned")]
    LockPoisoned,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ParkError {
    /// True for rejections caused by the caller's request rather than by
    /// this process or its collaborators.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::InsufficientFunds { .. }
                | Self::InsufficientSpace { .. }
                | Self::CapacityExceeded
                | Self::ParkClosed
                | Self::AttractionNotFound { .. }
                | Self::InvalidTransition { .. }
                | Self::BadRequest(_)
        )
    }
}

impl ParkError {
    /// HTTP status for this error when it ends a request.
    ///
    /// - Not enough money: 402
    /// - Park closed: 403
    /// - Unknown attraction: 404
    /// - No room, illegal lifecycle move, second park: 409
    /// - Malformed request: 400
    /// - A peer refused an outbound call: 502
    /// - Attraction broken or closed: 503
    /// - Everything else: 500
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InsufficientFunds { .. } => StatusCode::PAYMENT_REQUIRED,
            Self::ParkClosed => StatusCode::FORBIDDEN,
            Self::AttractionNotFound { .. } => StatusCode::NOT_FOUND,
            Self::InsufficientSpace { .. }
            | Self::CapacityExceeded
            | Self::InvalidTransition { .. }
            | Self::DuplicateInstance { .. } => StatusCode::CONFLICT,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::PeerRejected { .. } => StatusCode::BAD_GATEWAY,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::PaymentFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ParkError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        // Internal failures are logged here and not echoed to the caller.
        let error = if status == StatusCode::INTERNAL_SERVER_ERROR
            && !matches!(self, Self::PaymentFailed(_))
        {
            log::error!("Request failed: {self}");
            "internal error".to_string()
        } else {
            self.to_string()
        };
        (status, Json(ErrorBody { error })).into_response()
    }
}

pub type ParkResult<T> = Result<T, ParkError>;
