//! The external ledger seam.
//!
//! The ledger is the system of record for points, the catalog and attendance
//! rosters. Every call may be slow or fail; the engine never assumes otherwise.

use async_trait::async_trait;
use auction_types::{
    AttendanceRoster, CatalogRow, PointsSnapshot, ResultLogEntry, SettlementPayload,
};
use thiserror::Error;

/// Errors returned by a [`LedgerService`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("ledger returned non-success status: {0}")]
    Status(String),

    #[error("malformed ledger response: {0}")]
    Malformed(String),

    #[error("ledger request timed out")]
    Timeout,
}

/// Request/response contract of the external ledger.
#[async_trait]
pub trait LedgerService: Send + Sync {
    /// Current point totals of all members.
    async fn get_points(&self) -> Result<PointsSnapshot, LedgerError>;

    /// All catalog rows, including already committed ones.
    async fn get_catalog_items(&self) -> Result<Vec<CatalogRow>, LedgerError>;

    /// Attendees of one event.
    async fn get_attendance(
        &self,
        week_key: &str,
        event_key: &str,
    ) -> Result<AttendanceRoster, LedgerError>;

    /// Append the result of a sold item.
    async fn log_result(&self, entry: ResultLogEntry) -> Result<(), LedgerError>;

    /// Submit the final settlement of a run.
    async fn submit_settlement(&self, payload: SettlementPayload) -> Result<(), LedgerError>;

    /// Whether an attendance column already exists for an event.
    async fn column_exists(&self, boss: &str, timestamp: &str) -> Result<bool, LedgerError>;
}
