//! Staking: validator registry, validator set snapshot and dividend ledger.

pub mod dividend;
pub mod registry;
pub mod validator;
pub mod validator_set;

pub use dividend::{AccountRootHasher, DividendAccount, DividendKeeper, KeccakMerkleHasher};
pub use registry::{SigningInfoWriter, StakingKeeper};
pub use validator::Validator;
pub use validator_set::ValidatorSet;
