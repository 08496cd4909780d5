use thiserror::Error;

use crate::types::RedemptionStatus;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DrawError {
    /// Prize list empty, or a weight that cannot be drawn from.
    #[error("configuration error: {0}")]
    Configuration(String),
}

#[derive(Error, Debug)]
pub enum SpinError {
    #[error(transparent)]
    Configuration(#[from] DrawError),
    #[error("insufficient balance: {required} credits required, {available} available")]
    InsufficientBalance { required: i64, available: i64 },
    #[error("unknown user: {0}")]
    UnknownUser(String),
    #[error("invalid credit amount: {0}")]
    InvalidAmount(i64),
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

#[derive(Error, Debug)]
pub enum RedemptionError {
    #[error("prize ticket not found: {0}")]
    TicketNotFound(String),
    #[error("prize ticket {0} belongs to another user")]
    NotOwner(String),
    #[error("prize ticket {0} was already redeemed")]
    AlreadyClaimed(String),
    #[error("missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<String>),
    #[error("redemption not found: {0}")]
    NotFound(i64),
    #[error("cannot move redemption from {from} to {to}")]
    InvalidTransition {
        from: RedemptionStatus,
        to: RedemptionStatus,
    },
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("invalid payment request: {0}")]
    InvalidRequest(String),
    #[error("payment relay unreachable: {0}")]
    Http(#[from] reqwest::Error),
    #[error("payment rejected: {0}")]
    Rejected(String),
    #[error(transparent)]
    Account(#[from] SpinError),
}
