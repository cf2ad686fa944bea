//! Gateway API served by the auctioneer.

use std::sync::Arc;

use auction_module::{
    AuctionError, BidPrompt, BidReceipt, EngineStatus, QueueEntry, RunOverview, SchedulerHandle,
};
use auction_rpc::{rpc_error, GatewayApiServer, NotificationRecord};
use auction_types::Member;
use jsonrpsee::core::async_trait;
use jsonrpsee::types::ErrorObjectOwned;
use tracing::info;

use crate::notifications::NotificationLog;

/// Forwards gateway requests to the scheduler.
pub struct GatewayServer {
    engine: SchedulerHandle,
    log: Arc<NotificationLog>,
}

impl GatewayServer {
    pub fn new(engine: SchedulerHandle, log: Arc<NotificationLog>) -> Self {
        Self { engine, log }
    }
}

fn to_rpc<T>(result: Result<T, AuctionError>) -> Result<T, ErrorObjectOwned> {
    result.map_err(|e| rpc_error(&e))
}

#[async_trait]
impl GatewayApiServer for GatewayServer {
    async fn start_run(&self) -> Result<RunOverview, ErrorObjectOwned> {
        let overview = to_rpc(self.engine.start_run().await)?;
        info!(
            "Run started: {} sessions, {} items",
            overview.sessions.len(),
            overview.total_items
        );
        Ok(overview)
    }

    async fn submit_bid(
        &self,
        member_id: String,
        display_name: String,
        amount: String,
    ) -> Result<BidPrompt, ErrorObjectOwned> {
        let member = Member::new(member_id, display_name);
        to_rpc(self.engine.submit_bid(member, amount).await)
    }

    async fn confirm_bid(
        &self,
        member_id: String,
        confirmation_id: u64,
    ) -> Result<BidReceipt, ErrorObjectOwned> {
        to_rpc(self.engine.confirm_bid(member_id, confirmation_id).await)
    }

    async fn cancel_bid(
        &self,
        member_id: String,
        confirmation_id: u64,
    ) -> Result<bool, ErrorObjectOwned> {
        to_rpc(self.engine.cancel_bid(member_id, confirmation_id).await)?;
        Ok(true)
    }

    async fn pause(&self) -> Result<bool, ErrorObjectOwned> {
        to_rpc(self.engine.pause().await)?;
        Ok(true)
    }

    async fn resume(&self) -> Result<bool, ErrorObjectOwned> {
        to_rpc(self.engine.resume().await)?;
        Ok(true)
    }

    async fn stop(&self) -> Result<bool, ErrorObjectOwned> {
        to_rpc(self.engine.stop().await)?;
        Ok(true)
    }

    async fn extend(&self, minutes: u64) -> Result<bool, ErrorObjectOwned> {
        to_rpc(self.engine.extend(minutes).await)?;
        Ok(true)
    }

    async fn status(&self) -> Result<EngineStatus, ErrorObjectOwned> {
        to_rpc(self.engine.status().await)
    }

    async fn queue_add(
        &self,
        name: String,
        start_price: u64,
        duration_minutes: u64,
        quantity: u32,
    ) -> Result<QueueEntry, ErrorObjectOwned> {
        to_rpc(
            self.engine
                .queue_add(name, start_price, duration_minutes, quantity)
                .await,
        )
    }

    async fn queue_remove(&self, name: String) -> Result<QueueEntry, ErrorObjectOwned> {
        to_rpc(self.engine.queue_remove(name).await)
    }

    async fn queue_clear(&self) -> Result<usize, ErrorObjectOwned> {
        to_rpc(self.engine.queue_clear().await)
    }

    async fn queue_list(&self) -> Result<Vec<QueueEntry>, ErrorObjectOwned> {
        to_rpc(self.engine.queue_list().await)
    }

    async fn notifications(&self, since: u64) -> Result<Vec<NotificationRecord>, ErrorObjectOwned> {
        Ok(self.log.since(since))
    }
}
