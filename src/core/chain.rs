use crate::crypto::hash::Hash256;
use serde::{Deserialize, Serialize};

/// The canonical-chain summary record. Owned by the consensus engine,
/// mutated only when a block commit succeeds, persisted as one small
/// record alongside each commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainState {
    pub tip: Hash256,
    pub height: u64,
    pub total_work: u128,
    /// Compact target the next block must meet.
    pub next_bits: u32,
    /// Sats minted by all coinbases on the canonical chain.
    pub total_supply: u64,
}

impl ChainState {
    /// Height at which the target is recomputed next.
    pub fn next_retarget_height(&self, retarget_interval: u64) -> u64 {
        (self.height / retarget_interval + 1) * retarget_interval
    }
}

/// Per-block metadata kept for every stored block, canonical or not.
/// Fork choice compares `total_work`; reorgs walk `parent` links; the
/// timestamp and bits are here so branch validation never has to load
/// full ancestor blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockIndexEntry {
    pub hash: Hash256,
    pub parent: Hash256,
    pub height: u64,
    pub timestamp: u64,
    /// The block's own compact target.
    pub bits: u32,
    /// Work of this block alone, from its compact target.
    pub work: u128,
    /// Work of the chain ending at this block.
    pub total_work: u128,
    /// Sats minted by the chain ending at this block. Meaningful once the
    /// block has been connected; zero while it sits unvalidated on a side
    /// branch.
    pub total_supply: u64,
    /// Target in effect for the block after this one on its branch.
    pub next_bits: u32,
    /// Whether the block is currently part of the canonical chain.
    pub on_main_chain: bool,
    /// Cleared when the block fails full validation during a reorg; an
    /// invalid block and its descendants are never chosen as tip again.
    pub valid: bool,
}

/// Where an accepted block landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcceptOutcome {
    /// Extended the canonical tip.
    ExtendMain,
    /// Stored on a side branch with less work than the canonical tip.
    ExtendFork,
    /// A side branch overtook the canonical chain; `disconnected` blocks
    /// were reverted and `connected` blocks applied, in order.
    Reorganized {
        disconnected: Vec<Hash256>,
        connected: Vec<Hash256>,
    },
}

/// One canonical-chain transition, in the order it was applied. Covers
/// every block the engine connects or disconnects while processing a
/// submission, including adopted orphans and reorg legs that the
/// submission's own outcome does not mention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TipEvent {
    Connected(Hash256),
    Disconnected(Hash256),
}

/// Outcome of offering a block to the consensus engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockStatus {
    Accepted(AcceptOutcome),
    /// Parent unknown; the block is buffered and reconsidered when the
    /// parent arrives.
    Orphaned,
    /// Already known, nothing to do.
    Duplicate,
}
