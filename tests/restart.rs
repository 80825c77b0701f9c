//! Crash recovery: a reopened store must present the identical chain.

mod common;

use common::*;
use quantumcoin::crypto::hash::Hashable;
use quantumcoin::crypto::KeyPair;
use tempfile::TempDir;

#[test]
fn reopen_restores_tip_and_balances() {
    let dir = TempDir::new().unwrap();
    let miner = KeyPair::generate();

    let (tip, supply) = {
        let mut engine = open_engine(&dir);
        for n in 1..=5u64 {
            extend_tip(&mut engine, &miner, format!("block {}", n).as_bytes());
        }
        (engine.state().tip, engine.state().total_supply)
    };

    let engine = open_engine(&dir);
    assert_eq!(engine.state().tip, tip);
    assert_eq!(engine.state().height, 5);
    assert_eq!(engine.state().total_supply, supply);
    assert_eq!(engine.utxo().balance(&miner.pubkey_hash()).unwrap(), supply);
    assert_eq!(engine.utxo().total_value().unwrap(), supply);
    assert_eq!(
        engine.store().get_block_by_height(5).unwrap().unwrap().hash(),
        tip
    );
}

#[test]
fn chain_keeps_growing_after_reopen() {
    let dir = TempDir::new().unwrap();
    let miner = KeyPair::generate();

    {
        let mut engine = open_engine(&dir);
        extend_tip(&mut engine, &miner, b"before");
    }

    let mut engine = open_engine(&dir);
    let block = extend_tip(&mut engine, &miner, b"after");

    assert_eq!(engine.state().height, 2);
    assert_eq!(engine.state().tip, block.hash());
    assert_eq!(engine.state().total_supply, 2 * SUBSIDY);
}

#[test]
fn reopen_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let miner = KeyPair::generate();

    let tip = {
        let mut engine = open_engine(&dir);
        extend_tip(&mut engine, &miner, b"only").hash()
    };

    // Several open/close cycles with no writes in between.
    for _ in 0..3 {
        let engine = open_engine(&dir);
        assert_eq!(engine.state().tip, tip);
        assert_eq!(engine.state().height, 1);
    }
}
