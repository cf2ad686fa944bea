//! Mock ledger server for local testing of the auction system.
//!
//! This provides a JSON-RPC server that stands in for the spreadsheet ledger:
//! point balances, the item catalog, attendance rosters, the result log and
//! settlements, all kept in memory.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use auction_rpc::{LedgerAdminApiServer, LedgerApiServer, LedgerStateView};
use auction_types::{
    normalize_name, AttendanceRoster, CatalogRow, PointsSnapshot, ResultLogEntry,
    SettlementPayload,
};
use jsonrpsee::core::async_trait;
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::types::ErrorObjectOwned;
use jsonrpsee::RpcModule;
use parking_lot::RwLock;
use tracing::{info, warn};

/// In-memory ledger shared by all RPC handlers.
#[derive(Clone, Default)]
pub struct MockLedger {
    state: Arc<RwLock<LedgerStateView>>,
}

impl MockLedger {
    pub fn new(seed: LedgerStateView) -> Self {
        Self {
            state: Arc::new(RwLock::new(seed)),
        }
    }

    /// Copy of the current contents.
    pub fn snapshot(&self) -> LedgerStateView {
        self.state.read().clone()
    }

    /// Ledger and admin methods in one module.
    pub fn into_module(self) -> Result<RpcModule<MockLedger>> {
        let mut module = LedgerApiServer::into_rpc(self.clone());
        module.merge(LedgerAdminApiServer::into_rpc(self))?;
        Ok(module)
    }

    fn rpc_error(msg: &str) -> ErrorObjectOwned {
        ErrorObjectOwned::owned(-32000, msg.to_string(), None::<()>)
    }
}

/// Bind `addr` and serve the ledger until the handle is stopped.
pub async fn serve(ledger: MockLedger, addr: SocketAddr) -> Result<(SocketAddr, ServerHandle)> {
    let server = Server::builder().build(addr).await?;
    let local = server.local_addr()?;
    let handle = server.start(ledger.into_module()?);
    info!("Mock ledger listening on {}", local);
    Ok((local, handle))
}

fn find_member<'a>(points: &'a mut PointsSnapshot, name: &str) -> Option<&'a mut i64> {
    let key = normalize_name(name);
    points
        .iter_mut()
        .find(|(member, _)| normalize_name(member) == key)
        .map(|(_, balance)| balance)
}

#[async_trait]
impl LedgerApiServer for MockLedger {
    async fn get_points(&self) -> Result<PointsSnapshot, ErrorObjectOwned> {
        Ok(self.state.read().points.clone())
    }

    async fn get_catalog_items(&self) -> Result<Vec<CatalogRow>, ErrorObjectOwned> {
        Ok(self.state.read().catalog.clone())
    }

    async fn get_attendance(
        &self,
        week_key: String,
        event_key: String,
    ) -> Result<AttendanceRoster, ErrorObjectOwned> {
        let state = self.state.read();
        let wanted = normalize_name(&event_key);
        state
            .attendance
            .get(&week_key)
            .and_then(|events| {
                events
                    .iter()
                    .find(|(event, _)| normalize_name(event) == wanted)
                    .map(|(_, attendees)| attendees.clone())
            })
            .map(|attendees| AttendanceRoster { attendees })
            .ok_or_else(|| {
                Self::rpc_error(&format!(
                    "No attendance recorded for {} in {}",
                    event_key, week_key
                ))
            })
    }

    async fn log_result(&self, entry: ResultLogEntry) -> Result<bool, ErrorObjectOwned> {
        let mut state = self.state.write();

        if let Some(index) = entry.item_index {
            let row = state
                .catalog
                .get_mut(index)
                .ok_or_else(|| Self::rpc_error(&format!("Catalog row {} not found", index)))?;
            if row.quantity > 1 {
                row.quantity -= 1;
            } else {
                row.winner = Some(entry.winner.clone());
            }
        }

        info!(
            "Result logged: {} -> {} for {}",
            entry.item_name, entry.winner, entry.winning_bid
        );
        state.results.push(entry);
        Ok(true)
    }

    async fn submit_settlement(&self, payload: SettlementPayload) -> Result<bool, ErrorObjectOwned> {
        let mut state = self.state.write();

        for result in &payload.results {
            if result.total_spent == 0 {
                continue;
            }
            match find_member(&mut state.points, &result.member) {
                Some(balance) => *balance -= result.total_spent as i64,
                None => warn!("Settlement for unknown member {}", result.member),
            }
        }

        // Manual items come back as catalog rows: unsold ones open, sold ones committed.
        for outcome in &payload.manual_outcomes {
            state.catalog.push(CatalogRow {
                item: outcome.item.clone(),
                start_price: outcome.start_price,
                duration: Some(outcome.duration),
                quantity: 1,
                winner: (!outcome.winner.is_empty()).then(|| outcome.winner.clone()),
                boss_key: None,
            });
        }

        info!(
            "Settlement received for session {}: {} members, {} manual outcomes",
            payload.session_timestamp,
            payload.results.len(),
            payload.manual_outcomes.len()
        );
        state.settlements.push(payload);
        Ok(true)
    }

    async fn column_exists(&self, boss: String, timestamp: String) -> Result<bool, ErrorObjectOwned> {
        let wanted = normalize_name(&format!("{} {}", boss, timestamp));
        let state = self.state.read();
        Ok(state
            .attendance
            .values()
            .flat_map(|events| events.keys())
            .any(|event| normalize_name(event) == wanted))
    }
}

#[async_trait]
impl LedgerAdminApiServer for MockLedger {
    async fn set_points(&self, member: String, points: i64) -> Result<bool, ErrorObjectOwned> {
        let mut state = self.state.write();
        match find_member(&mut state.points, &member) {
            Some(balance) => *balance = points,
            None => {
                state.points.insert(member.clone(), points);
            }
        }
        info!("Points of {} set to {}", member, points);
        Ok(true)
    }

    async fn add_catalog_item(&self, row: CatalogRow) -> Result<usize, ErrorObjectOwned> {
        if row.item.trim().is_empty() {
            return Err(Self::rpc_error("Catalog item needs a name"));
        }
        let mut state = self.state.write();
        state.catalog.push(row);
        Ok(state.catalog.len() - 1)
    }

    async fn set_attendance(
        &self,
        week_key: String,
        event_key: String,
        attendees: Vec<String>,
    ) -> Result<bool, ErrorObjectOwned> {
        let mut state = self.state.write();
        info!(
            "Attendance for {} in {}: {} members",
            event_key,
            week_key,
            attendees.len()
        );
        state
            .attendance
            .entry(week_key)
            .or_default()
            .insert(event_key, attendees);
        Ok(true)
    }

    async fn get_state(&self) -> Result<LedgerStateView, ErrorObjectOwned> {
        Ok(self.snapshot())
    }
}
