//! Ledger error type.
//!
//! Recoverable variants roll back the transaction that produced them.
//! `Codec` means stored bytes no longer decode and is unrecoverable.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// Entitas yang diminta tidak ada
    #[error("{what} not found: {key}")]
    NotFound { what: &'static str, key: String },

    /// Input ditolak sebelum ada perubahan state
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Gagal decode bytes dari storage (storage korup)
    #[error("codec failure: {0}")]
    Codec(String),

    /// Gagal di storage engine
    #[error("storage failure: {0}")]
    Storage(String),
}

impl LedgerError {
    pub fn not_found(what: &'static str, key: impl ToString) -> Self {
        LedgerError::NotFound {
            what,
            key: key.to_string(),
        }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        LedgerError::InvalidInput(msg.into())
    }

    /// True when the node must stop instead of rolling back.
    pub fn is_fatal(&self) -> bool {
        matches!(self, LedgerError::Codec(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, LedgerError::NotFound { .. })
    }
}

impl From<lmdb::Error> for LedgerError {
    fn from(e: lmdb::Error) -> Self {
        LedgerError::Storage(e.to_string())
    }
}

impl From<bincode::Error> for LedgerError {
    fn from(e: bincode::Error) -> Self {
        LedgerError::Codec(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
