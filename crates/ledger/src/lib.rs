//! Pincraft Ledger
//!
//! Talks to the Stellar-like ledger's JSON-RPC endpoint: polls contract
//! events, runs read-only contract queries via simulation, and builds,
//! signs, and submits `collect_pin` / `flag_pinner` transactions.

pub mod poller;
pub mod queries;
pub mod rpc;
pub mod submitter;
pub mod tx;

pub use poller::ContractEventPoller;
pub use queries::ContractQueries;
pub use rpc::LedgerRpcClient;
pub use submitter::CollectPinSubmitter;
pub use tx::{ContractInvoker, InvokeOutcome, TransactionEnvelope};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("malformed response: {0}")]
    Protocol(String),
}

impl From<reqwest::Error> for LedgerError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
