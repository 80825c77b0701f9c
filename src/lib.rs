//! QuantumCoin (QTC) - a proof-of-work cryptocurrency node
//!
//! This library implements a complete single-node blockchain:
//! - UTXO-based transaction model with Dilithium2 signatures
//! - SHA-256d proof of work with compact-bits retargeting
//! - Cumulative-work fork choice with automatic reorgs
//! - Fee-prioritized mempool with replace-by-fee
//! - Halving issuance capped at 22,000,000 QTC, zero premine
//! - Crash-recoverable sled-backed chain store

pub mod cli;
pub mod config;
pub mod consensus;
pub mod core;
pub mod crypto;
pub mod error;
pub mod mempool;
pub mod mining;
pub mod node;
pub mod storage;

pub use error::{QtcError, Result};
