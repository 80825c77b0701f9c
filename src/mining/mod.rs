//! Proof of work: compact targets, retargeting, and the miner.

pub mod difficulty;
pub mod miner;

pub use difficulty::DifficultyCalculator;
pub use miner::{Miner, MiningStats};
