//! # StakeGuard Chain Core
//!
//! Validator registry, proposer rotation, buffered slashing, dividend ledger
//! and the root-chain dedup index of a proof-of-stake sidechain.
//!
//! ## Module Overview
//!
//! | Module | Role |
//! |--------|------|
//! | `types` | Address, Hash, ValidatorId, PubKey, sequence ids |
//! | `amount` | Arbitrary-precision `Amount` and fixed-point `Dec` |
//! | `store` | `KvStore` trait, `MemStore`, `CacheStore` overlay, batches |
//! | `db` | LMDB-backed `LmdbStore` |
//! | `keys` | Persisted key layout |
//! | `params` | Ledger parameters |
//! | `staking` | Validator registry, validator set, proposer rotation, dividends |
//! | `slashing` | Liveness tracking, buffer/tick slashing engine |
//! | `checkpoint` | Checkpoint ack counter |
//! | `sequence` | Root-chain event dedup index |
//! | `msgs` | Inbound transactions |
//! | `handler` | Message router and block hooks |
//! | `events` | Emitted ledger events |
//! | `query` | JSON query surface |
//! | `app` | Block lifecycle and atomic transaction execution |
//!
//! ## Slashing lifecycle
//!
//! ```text
//! slash_interim ──> buffer ──(Tick)──> tick ──(TickAck)──> power reduced
//!                     │                                    jailed flag set
//!                     └── SlashLimitExceeded signal        buffer total reset
//! ```

pub mod amount;
pub mod app;
pub mod checkpoint;
pub mod context;
pub mod db;
pub mod error;
pub mod events;
pub mod handler;
pub mod keys;
pub mod msgs;
pub mod params;
pub mod query;
pub mod sequence;
pub mod slashing;
pub mod staking;
pub mod store;
pub mod types;

pub use amount::{Amount, Dec};
pub use app::App;
pub use db::LmdbStore;
pub use error::{LedgerError, Result};
pub use events::{HeightEvent, LedgerEvent, SlashReason};
pub use handler::{Evidence, TxOutcome, VoteInfo};
pub use msgs::Msg;
pub use params::LedgerParams;
pub use query::{Query, QueryError};
pub use store::{KvStore, MemStore};
pub use types::{Address, Hash, PubKey, ValidatorId};
