//! Transport boundaries of the relay: the ledger and the root chain.

use crate::error::BridgeError;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use stakeguard_chain::{Amount, App, Hash, HeightEvent, KvStore, Msg, PubKey, Query, TxOutcome, ValidatorId};
use std::sync::Arc;
use tracing::debug;

/// Staking contract events observed on the root chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RootChainEvent {
    Staked {
        id: ValidatorId,
        activation_epoch: u64,
        amount: Amount,
        signer_pub_key: PubKey,
    },
    SignerChange {
        id: ValidatorId,
        new_signer_pub_key: PubKey,
        new_amount: Amount,
    },
    UnstakeInit {
        id: ValidatorId,
        deactivation_epoch: u64,
    },
    TopUpFee {
        validator_id: ValidatorId,
        fee: Amount,
    },
    TickAck {
        tick_id: u64,
        amount: Amount,
    },
    CheckpointAck {
        number: u64,
    },
}

/// A root-chain event with the log position that identifies it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootChainLog {
    pub block: u64,
    pub tx_hash: Hash,
    pub log_index: u64,
    pub event: RootChainEvent,
}

#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn latest_height(&self) -> Result<u64, BridgeError>;

    async fn events(&self, from: u64, to: u64) -> Result<Vec<HeightEvent>, BridgeError>;

    async fn broadcast(&self, msg: Msg) -> Result<TxOutcome, BridgeError>;

    /// JSON body of a query at the latest height.
    async fn query(&self, query: Query) -> Result<Vec<u8>, BridgeError>;
}

#[async_trait]
pub trait RootChainClient: Send + Sync {
    async fn latest_block(&self) -> Result<u64, BridgeError>;

    async fn logs(&self, from: u64, to: u64) -> Result<Vec<RootChainLog>, BridgeError>;

    /// Push a confirmed tick to the root chain; returns the transaction hash.
    async fn submit_tick(&self, tick_id: u64, slashing_info_hash: Hash) -> Result<Hash, BridgeError>;
}

/// In-process ledger client over a shared [`App`].
///
/// Messages are delivered into whatever block is open; block boundaries are
/// driven by the owner of the app.
pub struct LocalLedger<S: KvStore> {
    app: Arc<Mutex<App<S>>>,
}

impl<S: KvStore> LocalLedger<S> {
    pub fn new(app: Arc<Mutex<App<S>>>) -> Self {
        LocalLedger { app }
    }

    pub fn app(&self) -> &Arc<Mutex<App<S>>> {
        &self.app
    }
}

#[async_trait]
impl<S: KvStore + 'static> LedgerClient for LocalLedger<S> {
    async fn latest_height(&self) -> Result<u64, BridgeError> {
        Ok(self.app.lock().latest_height())
    }

    async fn events(&self, from: u64, to: u64) -> Result<Vec<HeightEvent>, BridgeError> {
        Ok(self.app.lock().events(from, to))
    }

    async fn broadcast(&self, msg: Msg) -> Result<TxOutcome, BridgeError> {
        let outcome = self.app.lock().deliver(&msg)?;
        debug!("local ledger accepted {}: {:?}", msg.kind(), outcome);
        Ok(outcome)
    }

    async fn query(&self, query: Query) -> Result<Vec<u8>, BridgeError> {
        Ok(self.app.lock().query(None, &query)?)
    }
}
