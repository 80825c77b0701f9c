//! Difficulty retargeting over a full regtest window.

mod common;

use common::*;
use quantumcoin::config::ChainParams;
use quantumcoin::core::chain::BlockStatus;
use quantumcoin::crypto::hash::Hashable;
use quantumcoin::crypto::KeyPair;
use quantumcoin::error::{BlockRejectReason, QtcError};
use quantumcoin::mining::difficulty::{self, DifficultyCalculator};
use tempfile::TempDir;

/// Mine one regtest window (8 blocks) at one-second spacing, far faster
/// than the 600-second target.
fn mine_fast_window(
    engine: &mut quantumcoin::consensus::ConsensusEngine,
    miner: &KeyPair,
) -> u64 {
    let genesis_ts = ChainParams::regtest().genesis_timestamp;
    for height in 1..=8u64 {
        let ctx = engine.mining_context().unwrap();
        assert_eq!(ctx.next_height, height);
        let block = mine_block(
            ctx.tip,
            height,
            ctx.bits,
            genesis_ts + height,
            ctx.subsidy,
            miner,
            b"fast",
            vec![],
        );
        match engine.process_block(block).unwrap() {
            BlockStatus::Accepted(_) => {}
            other => panic!("height {} not accepted: {:?}", height, other),
        }
    }
    genesis_ts
}

#[test]
fn fast_window_tightens_the_target() {
    let dir = TempDir::new().unwrap();
    let mut engine = open_engine(&dir);
    let miner = KeyPair::generate();
    let params = ChainParams::regtest();

    let genesis_ts = mine_fast_window(&mut engine, &miner);

    // The window spans genesis through block 7, so block 8 already mines
    // at the rescaled target and the tip schedules the same bits onward.
    let calc = DifficultyCalculator::from_params(&params);
    let expected = calc.next_bits(params.pow_limit_bits, genesis_ts, genesis_ts + 7);
    assert_eq!(engine.state().next_bits, expected);
    assert_ne!(engine.state().next_bits, params.pow_limit_bits);

    // Harder, but clamped to at most four times the work.
    let old_work = difficulty::work_for_bits(params.pow_limit_bits);
    let new_work = difficulty::work_for_bits(expected);
    assert!(new_work > old_work);
    assert!(new_work <= old_work.saturating_mul(4) + old_work);
}

#[test]
fn stale_bits_are_rejected_after_the_retarget() {
    let dir = TempDir::new().unwrap();
    let mut engine = open_engine(&dir);
    let miner = KeyPair::generate();
    let params = ChainParams::regtest();

    let genesis_ts = mine_fast_window(&mut engine, &miner);
    let tip = engine.state().tip;

    // A block still carrying the launch difficulty is off schedule.
    let stale = mine_block(
        tip,
        9,
        params.pow_limit_bits,
        genesis_ts + 9,
        SUBSIDY,
        &miner,
        b"stale",
        vec![],
    );
    let err = engine.process_block(stale).unwrap_err();
    assert!(matches!(
        err,
        QtcError::BlockRejected(BlockRejectReason::BadProofOfWork)
    ));

    // The scheduled bits are accepted.
    let scheduled = mine_block(
        tip,
        9,
        engine.state().next_bits,
        genesis_ts + 9,
        SUBSIDY,
        &miner,
        b"scheduled",
        vec![],
    );
    match engine.process_block(scheduled.clone()).unwrap() {
        BlockStatus::Accepted(_) => {}
        other => panic!("scheduled block not accepted: {:?}", other),
    }
    assert_eq!(engine.state().tip, scheduled.hash());
    assert_eq!(engine.state().height, 9);
}

#[test]
fn retarget_survives_a_restart() {
    let dir = TempDir::new().unwrap();
    let miner = KeyPair::generate();

    let next_bits = {
        let mut engine = open_engine(&dir);
        mine_fast_window(&mut engine, &miner);
        engine.state().next_bits
    };

    let engine = open_engine(&dir);
    assert_eq!(engine.state().next_bits, next_bits);
}
