//! The consensus engine: exclusive owner of chain state.
//!
//! Every mutation of the UTXO set and the canonical tip goes through
//! [`ConsensusEngine::process_block`]. A candidate block moves through
//! orphan buffering, context-free and contextual validation, and fork
//! choice by cumulative work; side branches are stored unconnected and a
//! branch that overtakes the tip triggers a reorganization. Each state
//! transition is committed to the store as one atomic record, so a crash
//! at any point leaves the chain at a block boundary.

use crate::config::ChainParams;
use crate::consensus::monetary::{EconomicsInfo, MonetaryPolicy};
use crate::consensus::validation::{self, BlockValidator};
use crate::core::block::BlockHeader;
use crate::core::chain::{AcceptOutcome, BlockIndexEntry, BlockStatus, ChainState, TipEvent};
use crate::core::utxo::UtxoSet;
use crate::core::{Block, Transaction};
use crate::crypto::hash::{Hash256, Hashable};
use crate::error::BlockRejectReason;
use crate::mining::difficulty::{self, DifficultyCalculator};
use crate::storage::{CommitRecord, Database};
use crate::{QtcError, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// Everything a miner needs to assemble the next block template.
#[derive(Debug, Clone, Copy)]
pub struct MiningContext {
    pub tip: Hash256,
    pub next_height: u64,
    /// Compact target the next block must carry.
    pub bits: u32,
    /// The template timestamp must exceed this.
    pub median_time_past: u64,
    /// Subsidy mintable at `next_height`, already capped by remaining supply.
    pub subsidy: u64,
}

struct OrphanBlock {
    block: Block,
    received: u64,
}

pub struct ConsensusEngine {
    params: ChainParams,
    policy: MonetaryPolicy,
    difficulty: DifficultyCalculator,
    validator: BlockValidator,
    db: Arc<Database>,
    utxo: UtxoSet,
    state: ChainState,
    index: HashMap<Hash256, BlockIndexEntry>,
    orphans: HashMap<Hash256, OrphanBlock>,
    /// Connect/disconnect log of the current `process_block` call, in
    /// application order. Drained by the node to keep the mempool in step
    /// with every block the call touched, adopted orphans included.
    tip_events: Vec<TipEvent>,
}

impl ConsensusEngine {
    /// Open the engine over a store, bootstrapping genesis on first run
    /// and verifying the last committed state otherwise.
    pub fn new(db: Arc<Database>, params: ChainParams) -> Result<Self> {
        let mut engine = Self {
            policy: MonetaryPolicy::from_params(&params),
            difficulty: DifficultyCalculator::from_params(&params),
            validator: BlockValidator::from_params(&params),
            utxo: UtxoSet::new(db.clone()),
            db,
            state: ChainState {
                tip: Hash256::zero(),
                height: 0,
                total_work: 0,
                next_bits: params.pow_limit_bits,
                total_supply: 0,
            },
            index: HashMap::new(),
            orphans: HashMap::new(),
            tip_events: Vec::new(),
            params,
        };

        match engine.db.get_chain_state()? {
            Some(state) => {
                engine.state = state;
                for entry in engine.db.load_block_index()? {
                    engine.index.insert(entry.hash, entry);
                }
                engine.verify_committed_state()?;
                log::info!(
                    "⛓️  Chain loaded: height {}, tip {}, {} known blocks",
                    engine.state.height,
                    engine.state.tip,
                    engine.index.len()
                );
            }
            None => engine.bootstrap_genesis()?,
        }

        Ok(engine)
    }

    /// The deterministic genesis block: a zero-output coinbase, so the
    /// supply starts at exactly zero and a premine is structurally
    /// impossible.
    pub fn genesis_block(params: &ChainParams) -> Block {
        let coinbase = Transaction::new_coinbase(0, params.genesis_message.as_bytes(), Vec::new());
        Block::new(
            Hash256::zero(),
            vec![coinbase],
            params.genesis_timestamp,
            params.pow_limit_bits,
            0,
        )
    }

    fn bootstrap_genesis(&mut self) -> Result<()> {
        let genesis = Self::genesis_block(&self.params);
        let hash = genesis.hash();
        let delta = self.utxo.apply_block(&genesis)?;
        let work = difficulty::work_for_bits(genesis.header.bits);

        let entry = BlockIndexEntry {
            hash,
            parent: Hash256::zero(),
            height: 0,
            timestamp: genesis.header.timestamp,
            bits: genesis.header.bits,
            work,
            total_work: work,
            total_supply: 0,
            next_bits: genesis.header.bits,
            on_main_chain: true,
            valid: true,
        };
        let state = ChainState {
            tip: hash,
            height: 0,
            total_work: work,
            next_bits: entry.next_bits,
            total_supply: 0,
        };

        self.db.commit(&CommitRecord {
            block_hash: hash,
            block: Some(genesis),
            index_updates: vec![entry.clone()],
            height_updates: vec![(0, Some(hash))],
            undo: Some(delta.undo),
            utxo_removes: delta.removes,
            utxo_inserts: delta.inserts,
            new_state: state,
        })?;

        self.index.insert(hash, entry);
        self.state = state;
        log::info!(
            "🌱 Genesis {} committed ({}, zero premine)",
            hash,
            self.params.network.name()
        );
        Ok(())
    }

    /// Crash-recovery check: the tip must resolve to a stored block and
    /// the unspent total must match the minted supply exactly. Fees round
    /// trip through coinbases, so the two figures are equal on every
    /// consistent chain.
    fn verify_committed_state(&self) -> Result<()> {
        let tip = self.state.tip;
        if !self.index.contains_key(&tip) {
            return Err(QtcError::Storage(format!("tip {} missing from block index", tip)));
        }
        if self.db.get_block(&tip)?.is_none() {
            return Err(QtcError::Storage(format!("tip block {} not stored", tip)));
        }
        if self.db.get_block_hash_at_height(self.state.height)? != Some(tip) {
            return Err(QtcError::Storage("height index does not point at the tip".into()));
        }

        let unspent = self.utxo.total_value()?;
        if unspent != self.state.total_supply {
            return Err(QtcError::Storage(format!(
                "UTXO total {} does not match minted supply {}",
                unspent, self.state.total_supply
            )));
        }
        Ok(())
    }

    /// Offer a block to the engine.
    ///
    /// Rejections surface as `Err(QtcError::BlockRejected(..))` carrying
    /// the specific reason; orphans and duplicates are not errors. After
    /// an acceptance, buffered orphans waiting on the new block are
    /// reconsidered.
    pub fn process_block(&mut self, block: Block) -> Result<BlockStatus> {
        let hash = block.hash();
        let now = chrono::Utc::now().timestamp() as u64;
        self.tip_events.clear();
        self.expire_orphans(now);

        if self.index.contains_key(&hash) || self.orphans.contains_key(&hash) {
            return Ok(BlockStatus::Duplicate);
        }

        self.validator.check_block(&block)?;

        if !self.index.contains_key(&block.header.previous_hash) {
            self.buffer_orphan(hash, block, now);
            return Ok(BlockStatus::Orphaned);
        }

        let outcome = self.accept_block(&block, now)?;
        self.adopt_orphans(hash, now);
        Ok(BlockStatus::Accepted(outcome))
    }

    fn accept_block(&mut self, block: &Block, now: u64) -> Result<AcceptOutcome> {
        let hash = block.hash();
        let parent = self
            .index
            .get(&block.header.previous_hash)
            .cloned()
            .ok_or(QtcError::BlockRejected(BlockRejectReason::OrphanParent))?;
        if !parent.valid {
            return Err(
                BlockRejectReason::BadStructure("extends a known-invalid block".into()).into(),
            );
        }

        let mtp = self.median_time_past_before(&parent);
        self.validator.check_header_contextual(
            &block.header,
            parent.hash,
            parent.height,
            parent.next_bits,
            mtp,
            now,
        )?;

        let work = difficulty::work_for_bits(block.header.bits);
        let entry = BlockIndexEntry {
            hash,
            parent: parent.hash,
            height: block.header.height,
            timestamp: block.header.timestamp,
            bits: block.header.bits,
            work,
            total_work: parent.total_work.saturating_add(work),
            total_supply: 0,
            next_bits: self.child_bits(&block.header, &parent)?,
            on_main_chain: false,
            valid: true,
        };

        if entry.total_work <= self.state.total_work {
            // Not enough work to displace the tip: keep the block on its
            // branch, full validation deferred until a reorg needs it.
            self.db.put_side_block(block, &entry)?;
            self.index.insert(hash, entry);
            log::info!(
                "🔱 Block {} stored on a side branch at height {}",
                hash,
                block.header.height
            );
            return Ok(AcceptOutcome::ExtendFork);
        }

        if block.header.previous_hash == self.state.tip {
            self.index.insert(hash, entry);
            if let Err(err) = self.connect(block) {
                // Nothing was committed; the block is neither applied nor
                // stored as valid.
                self.index.remove(&hash);
                return Err(err);
            }
            Ok(AcceptOutcome::ExtendMain)
        } else {
            self.reorganize(block, entry)
        }
    }

    /// Fully validate and commit the block whose parent is the current
    /// tip. The index entry must already be present.
    fn connect(&mut self, block: &Block) -> Result<()> {
        let hash = block.hash();
        let mut entry = self
            .index
            .get(&hash)
            .cloned()
            .ok_or_else(|| QtcError::Consensus(format!("no index entry for {}", hash)))?;

        let fees = self
            .validator
            .connect_block(block, &self.utxo, self.state.total_supply)?;
        let delta = self.utxo.apply_block(block)?;

        // Fees are recycled value; only the excess over them is new money.
        let paid = block.transactions[0].total_output_value();
        let minted = paid.saturating_sub(fees);
        entry.total_supply = self.state.total_supply.saturating_add(minted);
        entry.on_main_chain = true;

        let new_state = ChainState {
            tip: hash,
            height: entry.height,
            total_work: entry.total_work,
            next_bits: entry.next_bits,
            total_supply: entry.total_supply,
        };

        self.db.commit(&CommitRecord {
            block_hash: hash,
            block: Some(block.clone()),
            index_updates: vec![entry.clone()],
            height_updates: vec![(entry.height, Some(hash))],
            undo: Some(delta.undo),
            utxo_removes: delta.removes,
            utxo_inserts: delta.inserts,
            new_state,
        })?;

        self.index.insert(hash, entry);
        self.state = new_state;
        self.tip_events.push(TipEvent::Connected(hash));
        log::info!(
            "⛓️  Connected block {} at height {} ({} txs, {} fee sats)",
            hash,
            new_state.height,
            block.transaction_count(),
            fees
        );
        Ok(())
    }

    /// Revert the tip block and move the chain state back to its parent.
    fn disconnect_tip(&mut self) -> Result<Hash256> {
        let tip = self.state.tip;
        let entry = self
            .index
            .get(&tip)
            .cloned()
            .ok_or_else(|| QtcError::Consensus(format!("tip {} missing from index", tip)))?;
        let block = self
            .db
            .get_block(&tip)?
            .ok_or_else(|| QtcError::Storage(format!("missing block {} for disconnect", tip)))?;
        let undo = self
            .db
            .get_undo(&tip)?
            .ok_or_else(|| QtcError::Storage(format!("missing undo data for {}", tip)))?;
        let delta = self.utxo.revert_block(&block, &undo)?;
        let parent = self
            .index
            .get(&entry.parent)
            .cloned()
            .ok_or_else(|| QtcError::Consensus(format!("parent of {} missing from index", tip)))?;

        let mut off = entry.clone();
        off.on_main_chain = false;

        let new_state = ChainState {
            tip: parent.hash,
            height: parent.height,
            total_work: parent.total_work,
            next_bits: parent.next_bits,
            total_supply: parent.total_supply,
        };

        self.db.commit(&CommitRecord {
            block_hash: tip,
            block: None,
            index_updates: vec![off.clone()],
            height_updates: vec![(entry.height, None)],
            undo: None,
            utxo_removes: delta.removes,
            utxo_inserts: delta.inserts,
            new_state,
        })?;

        self.index.insert(tip, off);
        self.state = new_state;
        self.tip_events.push(TipEvent::Disconnected(tip));
        log::info!("↩️  Disconnected block {} at height {}", tip, entry.height);
        Ok(tip)
    }

    /// Switch the canonical chain to the heavier branch ending at
    /// `new_block`. Each disconnect and connect is its own atomic commit,
    /// so a crash mid-reorg restarts at a block boundary. If a branch
    /// block fails full validation the old chain is restored and the
    /// offender is marked invalid.
    fn reorganize(
        &mut self,
        new_block: &Block,
        new_entry: BlockIndexEntry,
    ) -> Result<AcceptOutcome> {
        // Store the incoming block first; if the switch aborts, the chain
        // keeps its old tip and the block stays on record as a side block.
        self.db.put_side_block(new_block, &new_entry)?;
        self.index.insert(new_entry.hash, new_entry.clone());

        let branch = self.branch_path(new_entry.hash)?;
        let fork_point = self
            .index
            .get(&branch[0])
            .map(|entry| entry.parent)
            .ok_or_else(|| QtcError::Consensus("branch start missing from index".into()))?;

        log::info!(
            "🔀 Branch ending at {} overtakes the tip; rewinding to fork point {}",
            new_entry.hash,
            fork_point
        );

        let mut disconnected = Vec::new();
        while self.state.tip != fork_point {
            disconnected.push(self.disconnect_tip()?);
        }

        let mut connected: Vec<Hash256> = Vec::new();
        for hash in &branch {
            let block = self
                .db
                .get_block(hash)?
                .ok_or_else(|| QtcError::Storage(format!("missing branch block {}", hash)))?;
            match self.connect(&block) {
                Ok(()) => connected.push(*hash),
                Err(err) if !err.is_fatal() => {
                    log::warn!("🚫 Reorg aborted, branch block {} invalid: {}", hash, err);
                    self.mark_invalid(*hash)?;
                    while connected.pop().is_some() {
                        self.disconnect_tip()?;
                    }
                    for old in disconnected.iter().rev() {
                        let block = self.db.get_block(old)?.ok_or_else(|| {
                            QtcError::Storage(format!("missing block {} for rollback", old))
                        })?;
                        self.connect(&block)?;
                    }
                    return Err(err);
                }
                Err(err) => return Err(err),
            }
        }

        log::info!(
            "🔀 Reorganized: {} block(s) disconnected, {} connected, new tip {} at height {}",
            disconnected.len(),
            connected.len(),
            self.state.tip,
            self.state.height
        );
        Ok(AcceptOutcome::Reorganized {
            disconnected,
            connected,
        })
    }

    /// Side-branch blocks from the fork point up to `tip`, ascending.
    fn branch_path(&self, tip: Hash256) -> Result<Vec<Hash256>> {
        let mut path = Vec::new();
        let mut cursor = tip;
        loop {
            let entry = self
                .index
                .get(&cursor)
                .ok_or_else(|| QtcError::Consensus(format!("{} missing from index", cursor)))?;
            if entry.on_main_chain {
                break;
            }
            path.push(cursor);
            cursor = entry.parent;
        }
        path.reverse();
        Ok(path)
    }

    /// Persist a validity flag so the block and its descendants are never
    /// chosen as tip again.
    fn mark_invalid(&mut self, hash: Hash256) -> Result<()> {
        if let Some(entry) = self.index.get_mut(&hash) {
            entry.valid = false;
            let entry = entry.clone();
            self.db.put_index_entry(&entry)?;
        }
        Ok(())
    }

    /// Median of the timestamps of `parent` and its ancestors, over the
    /// configured window. This is the floor for a child's timestamp.
    fn median_time_past_before(&self, parent: &BlockIndexEntry) -> u64 {
        let mut timestamps = Vec::with_capacity(self.params.mtp_window);
        let mut cursor = Some(parent.clone());
        while let Some(entry) = cursor {
            timestamps.push(entry.timestamp);
            if timestamps.len() == self.params.mtp_window {
                break;
            }
            cursor = self.index.get(&entry.parent).cloned();
        }
        validation::median_time_past(&timestamps)
    }

    /// Compact target the child of this header must carry: unchanged off
    /// retarget heights, rescaled over the completed window otherwise.
    fn child_bits(&self, header: &BlockHeader, parent: &BlockIndexEntry) -> Result<u32> {
        let child_height = header.height + 1;
        if !self.difficulty.is_retarget_height(child_height) {
            return Ok(header.bits);
        }

        let first_height = child_height - self.params.retarget_interval;
        let first_timestamp = if first_height == header.height {
            header.timestamp
        } else {
            self.ancestor_timestamp(parent, parent.height - first_height)?
        };
        Ok(self
            .difficulty
            .next_bits(header.bits, first_timestamp, header.timestamp))
    }

    fn ancestor_timestamp(&self, from: &BlockIndexEntry, steps: u64) -> Result<u64> {
        let mut entry = from.clone();
        for _ in 0..steps {
            entry = self
                .index
                .get(&entry.parent)
                .cloned()
                .ok_or_else(|| QtcError::Consensus(format!("broken parent link at {}", entry.hash)))?;
        }
        Ok(entry.timestamp)
    }

    // Orphan buffer

    fn buffer_orphan(&mut self, hash: Hash256, block: Block, now: u64) {
        if self.orphans.len() >= self.params.orphan_limit {
            if let Some(oldest) = self
                .orphans
                .iter()
                .min_by_key(|(_, orphan)| orphan.received)
                .map(|(hash, _)| *hash)
            {
                self.orphans.remove(&oldest);
                log::debug!("🗑️  Orphan buffer full, dropped {}", oldest);
            }
        }
        log::info!(
            "👻 Buffered orphan {} awaiting parent {}",
            hash,
            block.header.previous_hash
        );
        self.orphans.insert(hash, OrphanBlock { block, received: now });
    }

    fn expire_orphans(&mut self, now: u64) {
        let ttl = self.params.orphan_ttl;
        self.orphans.retain(|hash, orphan| {
            let keep = orphan.received.saturating_add(ttl) > now;
            if !keep {
                log::debug!("🗑️  Orphan {} expired unresolved", hash);
            }
            keep
        });
    }

    /// Reconsider buffered orphans whose parent chain just materialized.
    fn adopt_orphans(&mut self, accepted: Hash256, now: u64) {
        let mut parents = vec![accepted];
        while let Some(parent) = parents.pop() {
            let children: Vec<Hash256> = self
                .orphans
                .iter()
                .filter(|(_, orphan)| orphan.block.header.previous_hash == parent)
                .map(|(hash, _)| *hash)
                .collect();
            for hash in children {
                let Some(orphan) = self.orphans.remove(&hash) else {
                    continue;
                };
                match self.accept_block(&orphan.block, now) {
                    Ok(_) => {
                        log::info!("👻 Orphan {} adopted after its parent arrived", hash);
                        parents.push(hash);
                    }
                    Err(err) => {
                        log::warn!("🚫 Orphan {} rejected once its parent arrived: {}", hash, err)
                    }
                }
            }
        }
    }

    // Queries

    pub fn state(&self) -> &ChainState {
        &self.state
    }

    pub fn params(&self) -> &ChainParams {
        &self.params
    }

    pub fn utxo(&self) -> &UtxoSet {
        &self.utxo
    }

    pub fn store(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn index_entry(&self, hash: &Hash256) -> Option<&BlockIndexEntry> {
        self.index.get(hash)
    }

    pub fn orphan_count(&self) -> usize {
        self.orphans.len()
    }

    /// Drain the connect/disconnect log of the last `process_block` call.
    /// Events come back in application order; a call that changed nothing
    /// yields an empty list.
    pub fn take_tip_events(&mut self) -> Vec<TipEvent> {
        std::mem::take(&mut self.tip_events)
    }

    /// Issuance figures derived from the one policy the engine enforces.
    pub fn economics(&self) -> EconomicsInfo {
        let next_height = self.state.height + 1;
        EconomicsInfo {
            height: self.state.height,
            current_subsidy: self
                .policy
                .allowed_subsidy(next_height, self.state.total_supply),
            total_supply: self.state.total_supply,
            max_supply: self.policy.max_supply,
            remaining_supply: self.policy.max_supply.saturating_sub(self.state.total_supply),
            era: self.policy.era(next_height),
            next_halving_height: self.policy.next_halving_height(next_height),
            halving_interval: self.policy.halving_interval,
            target_block_interval: self.params.target_spacing,
        }
    }

    pub fn mining_context(&self) -> Result<MiningContext> {
        let tip = self
            .index
            .get(&self.state.tip)
            .ok_or_else(|| QtcError::Consensus("tip missing from index".into()))?;
        let next_height = self.state.height + 1;
        Ok(MiningContext {
            tip: self.state.tip,
            next_height,
            bits: self.state.next_bits,
            median_time_past: self.median_time_past_before(tip),
            subsidy: self
                .policy
                .allowed_subsidy(next_height, self.state.total_supply),
        })
    }
}
