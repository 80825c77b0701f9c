#![allow(dead_code)]

use quantumcoin::config::ChainParams;
use quantumcoin::consensus::ConsensusEngine;
use quantumcoin::core::chain::BlockStatus;
use quantumcoin::core::{Block, Transaction, TxOutput};
use quantumcoin::crypto::hash::{Hash256, Hashable};
use quantumcoin::crypto::KeyPair;
use quantumcoin::mining::difficulty;
use quantumcoin::storage::Database;
use std::sync::Arc;
use tempfile::TempDir;

pub const SUBSIDY: u64 = 5_000_000_000;

pub fn open_engine(dir: &TempDir) -> ConsensusEngine {
    let db = Arc::new(Database::open(dir.path()).unwrap());
    ConsensusEngine::new(db, ChainParams::regtest()).unwrap()
}

/// Regtest block timestamps march at the target spacing from genesis,
/// which keeps the median-time-past rule satisfied without clock games.
pub fn timestamp_for(height: u64) -> u64 {
    let params = ChainParams::regtest();
    params.genesis_timestamp + height * params.target_spacing
}

/// Grind a block on `prev` paying `reward` to `to`, plus extra
/// transactions carried as-is.
pub fn mine_block(
    prev: Hash256,
    height: u64,
    bits: u32,
    timestamp: u64,
    reward: u64,
    to: &KeyPair,
    tag: &[u8],
    extra: Vec<Transaction>,
) -> Block {
    let outputs = if reward > 0 {
        vec![TxOutput::new(reward, to.pubkey_hash())]
    } else {
        Vec::new()
    };
    let coinbase = Transaction::new_coinbase(height, tag, outputs);
    let mut txs = vec![coinbase];
    txs.extend(extra);
    let mut block = Block::new(prev, txs, timestamp, bits, height);
    while !difficulty::meets_target(&block.hash(), bits) {
        block.header.nonce += 1;
    }
    block
}

/// Mine and submit a block on the current tip, claiming the scheduled
/// subsidy plus `extra_fees`. Panics unless it is accepted.
pub fn extend_tip_with(
    engine: &mut ConsensusEngine,
    miner: &KeyPair,
    tag: &[u8],
    extra: Vec<Transaction>,
    extra_fees: u64,
) -> Block {
    let ctx = engine.mining_context().unwrap();
    let block = mine_block(
        ctx.tip,
        ctx.next_height,
        ctx.bits,
        timestamp_for(ctx.next_height),
        ctx.subsidy + extra_fees,
        miner,
        tag,
        extra,
    );
    match engine.process_block(block.clone()).unwrap() {
        BlockStatus::Accepted(_) => block,
        other => panic!("block at height {} not accepted: {:?}", ctx.next_height, other),
    }
}

pub fn extend_tip(engine: &mut ConsensusEngine, miner: &KeyPair, tag: &[u8]) -> Block {
    extend_tip_with(engine, miner, tag, Vec::new(), 0)
}
