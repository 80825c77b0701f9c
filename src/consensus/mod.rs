//! Consensus: block/transaction validation, fork choice, and issuance.

pub mod engine;
pub mod monetary;
pub mod validation;

pub use engine::{ConsensusEngine, MiningContext};
pub use monetary::{EconomicsInfo, MonetaryPolicy};
pub use validation::{BlockValidator, TxValidator};
