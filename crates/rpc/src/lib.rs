//! JSON-RPC surfaces of the auction system.
//!
//! - [`ledger`]: the external ledger API, its admin extension and an RPC-backed
//!   `LedgerService`
//! - [`gateway`]: the API the auctioneer exposes to chat gateways and operators

pub mod gateway;
pub mod ledger;

pub use gateway::{
    rpc_error, GatewayApiClient, GatewayApiServer, NotificationRecord, EXTERNAL_ERROR_CODE,
    STATE_ERROR_CODE, VALIDATION_ERROR_CODE,
};
pub use ledger::{
    LedgerAdminApiClient, LedgerAdminApiServer, LedgerApiClient, LedgerApiServer, LedgerStateView,
    RpcLedgerClient, DEFAULT_LEDGER_TIMEOUT,
};
