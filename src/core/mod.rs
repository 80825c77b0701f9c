//! Core blockchain components

pub mod block;
pub mod chain;
pub mod transaction;
pub mod utxo;

pub use block::{Block, BlockHeader};
pub use chain::{AcceptOutcome, BlockStatus, ChainState, TipEvent};
pub use transaction::{OutPoint, Transaction, TxInput, TxOutput};
pub use utxo::{BlockUndo, UtxoEntry, UtxoSet, UtxoView};
