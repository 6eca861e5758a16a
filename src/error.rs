//! Error taxonomy for market actions, the document store and state snapshots.

use thiserror::Error;

/// Assertion message for actions not signed with the active key.
pub const MSG_ACTIVE_KEY: &str = "you must use a custom_json signed with your active key";
/// Assertion message for malformed or out-of-range payloads.
pub const MSG_INVALID_PARAMS: &str = "invalid params";
/// Assertion message for orders whose settlement value is below the dust threshold.
pub const MSG_CANNOT_BE_PLACED: &str = "order cannot be placed as it cannot be filled";
/// Assertion message for a fill whose computed amount is not positive.
pub const MSG_CANNOT_BE_FILLED: &str = "the order cannot be filled";
/// Assertion message for cancels that reference no order.
pub const MSG_ORDER_NOT_FOUND: &str = "order does not exist or invalid params";

/// Repository errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("table not found: {0}")]
    TableNotFound(String),

    #[error("table already exists: {0}")]
    TableExists(String),

    #[error("row {id} not found in {table}")]
    RowNotFound { table: String, id: u64 },

    #[error("row has no _id; insert it before updating or removing")]
    MissingId,

    #[error("row encoding failed: {0}")]
    Encoding(String),
}

/// Why a market action was rejected.
///
/// Failures raised before escrow leave no trace. Failures raised afterwards do not undo
/// transfers or book mutations already applied by the same action.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MarketError {
    #[error("{0}")]
    InvalidParams(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unfillable(String),

    #[error("escrow transfer rejected: {0}")]
    EscrowRejected(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl MarketError {
    pub(crate) fn invalid_params() -> Self {
        MarketError::InvalidParams(MSG_INVALID_PARAMS.into())
    }

    /// Short label used in audit records.
    pub fn kind(&self) -> &'static str {
        match self {
            MarketError::InvalidParams(_) => "invalid_params",
            MarketError::Unauthorized(_) => "unauthorized",
            MarketError::NotFound(_) => "not_found",
            MarketError::Unfillable(_) => "unfillable",
            MarketError::EscrowRejected(_) => "escrow_rejected",
            MarketError::Store(_) => "store",
        }
    }
}

/// Snapshot load/save errors.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid snapshot: {0}")]
    Json(#[from] serde_json::Error),
}
