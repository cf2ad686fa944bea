//! Auction engine error types.

use thiserror::Error;

/// Broad classification of an [`AuctionError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected input; nothing was mutated and the run continues.
    Validation,
    /// The request does not fit the current engine state; nothing was mutated.
    State,
    /// The ledger or another collaborator failed.
    External,
}

/// Errors that can occur in the auction engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuctionError {
    // === Validation ===
    #[error("Not eligible: only attendees of {event} may bid on this item")]
    NotEligible { event: String },

    #[error("Rate limited: wait {retry_after_secs}s before bidding again")]
    RateLimited { retry_after_secs: u64 },

    #[error("Invalid bid {0:?}: positive integers only")]
    InvalidAmount(String),

    #[error("Bid too low: must be at least {minimum}pts (current {current}pts)")]
    BidTooLow { current: u64, minimum: u64 },

    #[error("Point ledger not loaded")]
    NoLedgerData,

    #[error(
        "Insufficient points: total {total}, locked {locked}, available {available}, need {needed}"
    )]
    InsufficientPoints {
        total: u64,
        locked: u64,
        available: u64,
        needed: u64,
    },

    #[error("Invalid queue item: {0}")]
    InvalidQueueItem(String),

    // === State ===
    #[error("No auction run in progress")]
    NotRunning,

    #[error("An auction run is already in progress")]
    AlreadyRunning,

    #[error("No item is currently being auctioned")]
    NoActiveItem,

    #[error("Bidding is not open on the current item")]
    ItemNotActive,

    #[error("The current item is paused")]
    ItemPaused,

    #[error("The current item is already paused")]
    AlreadyPaused,

    #[error("The current item is not paused")]
    NotPaused,

    #[error("You already have a bid awaiting confirmation ({expires_in_secs}s left)")]
    ConfirmationPending { expires_in_secs: u64 },

    #[error("Confirmation {0} not found")]
    ConfirmationNotFound(u64),

    #[error("Confirmation {0} belongs to another member")]
    NotYourConfirmation(u64),

    #[error("Confirmation {0} expired")]
    ConfirmationExpired(u64),

    #[error("Bid no longer valid: {proposed}pts does not beat current {current}pts")]
    StaleConfirmation { proposed: u64, current: u64 },

    #[error("Queue item not found: {0}")]
    QueueItemNotFound(String),

    // === External ===
    #[error("Ledger unavailable: {0}")]
    LedgerUnavailable(String),

    #[error("Attendance for {event} could not be loaded: {reason}")]
    AttendanceLoadFailed { event: String, reason: String },

    #[error("No items to auction")]
    NoItemsToAuction,

    #[error("Auction engine stopped")]
    EngineUnavailable,
}

impl AuctionError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        use AuctionError::*;
        match self {
            NotEligible { .. }
            | RateLimited { .. }
            | InvalidAmount(_)
            | BidTooLow { .. }
            | NoLedgerData
            | InsufficientPoints { .. }
            | InvalidQueueItem(_) => ErrorKind::Validation,

            NotRunning
            | AlreadyRunning
            | NoActiveItem
            | ItemNotActive
            | ItemPaused
            | AlreadyPaused
            | NotPaused
            | ConfirmationPending { .. }
            | ConfirmationNotFound(_)
            | NotYourConfirmation(_)
            | ConfirmationExpired(_)
            | StaleConfirmation { .. }
            | QueueItemNotFound(_) => ErrorKind::State,

            LedgerUnavailable(_)
            | AttendanceLoadFailed { .. }
            | NoItemsToAuction
            | EngineUnavailable => ErrorKind::External,
        }
    }
}
