//! Gateway API: how chat gateways and operators drive the auctioneer.

use auction_module::{
    AuctionError, BidPrompt, BidReceipt, EngineStatus, ErrorKind, Notification, QueueEntry,
    RunOverview,
};
use chrono::{DateTime, Utc};
use jsonrpsee::proc_macros::rpc;
use jsonrpsee::types::ErrorObjectOwned;
use serde::{Deserialize, Serialize};

/// Ledger or other collaborator failure.
pub const EXTERNAL_ERROR_CODE: i32 = -32000;
/// Rejected input.
pub const VALIDATION_ERROR_CODE: i32 = -32001;
/// Request does not fit the engine state.
pub const STATE_ERROR_CODE: i32 = -32002;

/// RPC API exposed by the auctioneer.
#[rpc(server, client)]
pub trait GatewayApi {
    // ============ Run Methods ============

    /// Build sessions and start auctioning.
    #[method(name = "gateway_startRun")]
    async fn start_run(&self) -> Result<RunOverview, ErrorObjectOwned>;

    // ============ Bid Methods ============

    /// Propose a bid on the current item.
    #[method(name = "gateway_submitBid")]
    async fn submit_bid(
        &self,
        member_id: String,
        display_name: String,
        amount: String,
    ) -> Result<BidPrompt, ErrorObjectOwned>;

    /// Confirm a proposed bid.
    #[method(name = "gateway_confirmBid")]
    async fn confirm_bid(
        &self,
        member_id: String,
        confirmation_id: u64,
    ) -> Result<BidReceipt, ErrorObjectOwned>;

    /// Withdraw a proposed bid.
    #[method(name = "gateway_cancelBid")]
    async fn cancel_bid(
        &self,
        member_id: String,
        confirmation_id: u64,
    ) -> Result<bool, ErrorObjectOwned>;

    // ============ Operator Methods ============

    #[method(name = "gateway_pause")]
    async fn pause(&self) -> Result<bool, ErrorObjectOwned>;

    #[method(name = "gateway_resume")]
    async fn resume(&self) -> Result<bool, ErrorObjectOwned>;

    /// End the current item now.
    #[method(name = "gateway_stop")]
    async fn stop(&self) -> Result<bool, ErrorObjectOwned>;

    #[method(name = "gateway_extend")]
    async fn extend(&self, minutes: u64) -> Result<bool, ErrorObjectOwned>;

    #[method(name = "gateway_status")]
    async fn status(&self) -> Result<EngineStatus, ErrorObjectOwned>;

    // ============ Manual Queue Methods ============

    #[method(name = "gateway_queueAdd")]
    async fn queue_add(
        &self,
        name: String,
        start_price: u64,
        duration_minutes: u64,
        quantity: u32,
    ) -> Result<QueueEntry, ErrorObjectOwned>;

    #[method(name = "gateway_queueRemove")]
    async fn queue_remove(&self, name: String) -> Result<QueueEntry, ErrorObjectOwned>;

    /// Returns how many entries were removed.
    #[method(name = "gateway_queueClear")]
    async fn queue_clear(&self) -> Result<usize, ErrorObjectOwned>;

    #[method(name = "gateway_queueList")]
    async fn queue_list(&self) -> Result<Vec<QueueEntry>, ErrorObjectOwned>;

    // ============ Notification Methods ============

    /// Notifications with a sequence number greater than `since`.
    #[method(name = "gateway_notifications")]
    async fn notifications(&self, since: u64) -> Result<Vec<NotificationRecord>, ErrorObjectOwned>;
}

/// A notification as kept in the auctioneer's log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    pub seq: u64,
    pub at: DateTime<Utc>,
    pub notification: Notification,
}

/// Map an engine error onto a JSON-RPC error object.
pub fn rpc_error(err: &AuctionError) -> ErrorObjectOwned {
    let code = match err.kind() {
        ErrorKind::External => EXTERNAL_ERROR_CODE,
        ErrorKind::Validation => VALIDATION_ERROR_CODE,
        ErrorKind::State => STATE_ERROR_CODE,
    };
    ErrorObjectOwned::owned(code, err.to_string(), None::<()>)
}
