//! Ledger service API and its RPC-backed client.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use auction_module::{LedgerError, LedgerService};
use auction_types::{
    AttendanceRoster, CatalogRow, PointsSnapshot, ResultLogEntry, SettlementPayload,
};
use jsonrpsee::core::ClientError;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::proc_macros::rpc;
use jsonrpsee::types::ErrorObjectOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default request timeout towards the ledger.
pub const DEFAULT_LEDGER_TIMEOUT: Duration = Duration::from_secs(30);

/// RPC API of the external ledger.
#[rpc(server, client)]
pub trait LedgerApi {
    /// Point totals of every member.
    #[method(name = "ledger_getPoints")]
    async fn get_points(&self) -> Result<PointsSnapshot, ErrorObjectOwned>;

    /// Every catalog row, committed or not.
    #[method(name = "ledger_getCatalogItems")]
    async fn get_catalog_items(&self) -> Result<Vec<CatalogRow>, ErrorObjectOwned>;

    /// Attendees of one event.
    #[method(name = "ledger_getAttendance")]
    async fn get_attendance(
        &self,
        week_key: String,
        event_key: String,
    ) -> Result<AttendanceRoster, ErrorObjectOwned>;

    /// Append the result of a sold item.
    #[method(name = "ledger_logResult")]
    async fn log_result(&self, entry: ResultLogEntry) -> Result<bool, ErrorObjectOwned>;

    /// Submit the settlement of a run.
    #[method(name = "ledger_submitSettlement")]
    async fn submit_settlement(&self, payload: SettlementPayload) -> Result<bool, ErrorObjectOwned>;

    /// Whether an attendance column exists for an event.
    #[method(name = "ledger_columnExists")]
    async fn column_exists(&self, boss: String, timestamp: String) -> Result<bool, ErrorObjectOwned>;
}

/// Administrative API of the mock ledger.
#[rpc(server, client)]
pub trait LedgerAdminApi {
    #[method(name = "admin_setPoints")]
    async fn set_points(&self, member: String, points: i64) -> Result<bool, ErrorObjectOwned>;

    /// Append a catalog row, returning its index.
    #[method(name = "admin_addCatalogItem")]
    async fn add_catalog_item(&self, row: CatalogRow) -> Result<usize, ErrorObjectOwned>;

    #[method(name = "admin_setAttendance")]
    async fn set_attendance(
        &self,
        week_key: String,
        event_key: String,
        attendees: Vec<String>,
    ) -> Result<bool, ErrorObjectOwned>;

    #[method(name = "admin_getState")]
    async fn get_state(&self) -> Result<LedgerStateView, ErrorObjectOwned>;
}

/// Full contents of the mock ledger.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerStateView {
    pub points: PointsSnapshot,
    pub catalog: Vec<CatalogRow>,
    /// week key -> event key -> attendees
    pub attendance: BTreeMap<String, BTreeMap<String, Vec<String>>>,
    pub results: Vec<ResultLogEntry>,
    pub settlements: Vec<SettlementPayload>,
}

/// [`LedgerService`] over JSON-RPC.
#[derive(Clone)]
pub struct RpcLedgerClient {
    client: HttpClient,
}

impl RpcLedgerClient {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, LedgerError> {
        let client = HttpClientBuilder::default()
            .request_timeout(timeout)
            .build(url)
            .map_err(|e| LedgerError::Transport(e.to_string()))?;
        Ok(Self { client })
    }
}

fn ledger_error(err: ClientError) -> LedgerError {
    match err {
        ClientError::RequestTimeout => LedgerError::Timeout,
        ClientError::Call(obj) => LedgerError::Status(obj.message().to_string()),
        ClientError::ParseError(e) => LedgerError::Malformed(e.to_string()),
        other => LedgerError::Transport(other.to_string()),
    }
}

fn acknowledged(ok: bool, method: &str) -> Result<(), LedgerError> {
    if ok {
        Ok(())
    } else {
        Err(LedgerError::Status(format!("{} was not acknowledged", method)))
    }
}

#[async_trait]
impl LedgerService for RpcLedgerClient {
    async fn get_points(&self) -> Result<PointsSnapshot, LedgerError> {
        LedgerApiClient::get_points(&self.client)
            .await
            .map_err(ledger_error)
    }

    async fn get_catalog_items(&self) -> Result<Vec<CatalogRow>, LedgerError> {
        LedgerApiClient::get_catalog_items(&self.client)
            .await
            .map_err(ledger_error)
    }

    async fn get_attendance(
        &self,
        week_key: &str,
        event_key: &str,
    ) -> Result<AttendanceRoster, LedgerError> {
        debug!(week_key, event_key, "Fetching attendance");
        LedgerApiClient::get_attendance(&self.client, week_key.to_string(), event_key.to_string())
            .await
            .map_err(ledger_error)
    }

    async fn log_result(&self, entry: ResultLogEntry) -> Result<(), LedgerError> {
        let ok = LedgerApiClient::log_result(&self.client, entry)
            .await
            .map_err(ledger_error)?;
        acknowledged(ok, "logResult")
    }

    async fn submit_settlement(&self, payload: SettlementPayload) -> Result<(), LedgerError> {
        let ok = LedgerApiClient::submit_settlement(&self.client, payload)
            .await
            .map_err(ledger_error)?;
        acknowledged(ok, "submitSettlement")
    }

    async fn column_exists(&self, boss: &str, timestamp: &str) -> Result<bool, LedgerError> {
        LedgerApiClient::column_exists(&self.client, boss.to_string(), timestamp.to_string())
            .await
            .map_err(ledger_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_error_mapping() {
        assert_eq!(ledger_error(ClientError::RequestTimeout), LedgerError::Timeout);

        let call = ErrorObjectOwned::owned(-32000, "sheet locked", None::<()>);
        assert_eq!(
            ledger_error(ClientError::Call(call)),
            LedgerError::Status("sheet locked".into())
        );

        let parse = serde_json::from_str::<u64>("x").unwrap_err();
        assert!(matches!(
            ledger_error(ClientError::ParseError(parse)),
            LedgerError::Malformed(_)
        ));
    }

    #[test]
    fn test_unacknowledged_write_is_an_error() {
        assert!(acknowledged(true, "logResult").is_ok());
        assert!(matches!(
            acknowledged(false, "logResult"),
            Err(LedgerError::Status(_))
        ));
    }

    #[tokio::test]
    async fn test_client_builds_for_valid_url() {
        assert!(RpcLedgerClient::new("http://127.0.0.1:9955", DEFAULT_LEDGER_TIMEOUT).is_ok());
        assert!(matches!(
            RpcLedgerClient::new("not a url", DEFAULT_LEDGER_TIMEOUT),
            Err(LedgerError::Transport(_))
        ));
    }
}
