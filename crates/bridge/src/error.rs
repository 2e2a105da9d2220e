use stakeguard_chain::{LedgerError, QueryError};
use thiserror::Error;

/// Error type untuk relay pipeline.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Ledger menolak transaksi
    #[error("ledger rejected transaction: {0}")]
    Rejected(#[from] LedgerError),

    #[error("ledger query failed: {0}")]
    Query(#[from] QueryError),

    /// Gagal berkomunikasi dengan root chain
    #[error("root chain error: {0}")]
    RootChain(String),

    #[error("transport error: {0}")]
    Transport(String),

    /// Response tidak bisa di-decode
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<serde_json::Error> for BridgeError {
    fn from(e: serde_json::Error) -> Self {
        BridgeError::Decode(e.to_string())
    }
}
