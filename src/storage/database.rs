use crate::core::chain::{BlockIndexEntry, ChainState};
use crate::core::transaction::OutPoint;
use crate::core::utxo::{BlockUndo, UtxoEntry};
use crate::core::Block;
use crate::crypto::hash::{Hash160, Hash256, Hashable};
use crate::{QtcError, Result};
use serde::{Deserialize, Serialize};
use sled::{Db, Tree};
use std::path::Path;

// Database tree names (equivalent to column families)
const TREE_BLOCKS: &str = "blocks";
const TREE_BLOCK_INDEX: &str = "block_index";
const TREE_HEIGHT_INDEX: &str = "height_index";
const TREE_UTXOS: &str = "utxos";
const TREE_UNDO: &str = "undo";
const TREE_CHAIN_STATE: &str = "chain_state";
const TREE_WAL: &str = "wal";

const CHAIN_STATE_KEY: &[u8] = b"current";
const WAL_KEY: &[u8] = b"commit";

/// One durable state transition: every tree write needed to move the chain
/// to its next block boundary. The record is written to the WAL tree and
/// flushed before any other tree is touched, so an interrupted commit is
/// replayed completely on reopen and no partial block application survives
/// a crash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitRecord {
    pub block_hash: Hash256,
    /// Set when the block is not yet stored (first connect).
    pub block: Option<Block>,
    pub index_updates: Vec<BlockIndexEntry>,
    /// `Some(hash)` maps the height to a canonical block, `None` clears it.
    pub height_updates: Vec<(u64, Option<Hash256>)>,
    pub undo: Option<BlockUndo>,
    pub utxo_removes: Vec<OutPoint>,
    pub utxo_inserts: Vec<(OutPoint, UtxoEntry)>,
    pub new_state: ChainState,
}

#[derive(Debug, Clone)]
pub struct Database {
    db: Db,
    blocks: Tree,
    block_index: Tree,
    height_index: Tree,
    utxos: Tree,
    undo: Tree,
    chain_state: Tree,
    wal: Tree,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct StorageStats {
    pub block_count: usize,
    pub utxo_count: usize,
    pub undo_count: usize,
}

impl Database {
    /// Open (or create) the store and finish any commit a crash interrupted.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path)
            .map_err(|e| QtcError::Storage(format!("Failed to open database: {}", e)))?;

        let database = Self {
            blocks: open_tree(&db, TREE_BLOCKS)?,
            block_index: open_tree(&db, TREE_BLOCK_INDEX)?,
            height_index: open_tree(&db, TREE_HEIGHT_INDEX)?,
            utxos: open_tree(&db, TREE_UTXOS)?,
            undo: open_tree(&db, TREE_UNDO)?,
            chain_state: open_tree(&db, TREE_CHAIN_STATE)?,
            wal: open_tree(&db, TREE_WAL)?,
            db,
        };

        database.recover()?;
        Ok(database)
    }

    /// Replay an interrupted commit, if one is pending.
    fn recover(&self) -> Result<bool> {
        let Some(data) = self.wal.get(WAL_KEY)? else {
            return Ok(false);
        };

        let record: CommitRecord = bincode::deserialize(&data)
            .map_err(|e| QtcError::Storage(format!("Corrupt WAL record: {}", e)))?;

        log::warn!(
            "🔄 Replaying interrupted commit of block {} at height {}",
            record.block_hash,
            record.new_state.height
        );

        self.apply_record(&record)?;
        self.wal.remove(WAL_KEY)?;
        self.db.flush()?;
        Ok(true)
    }

    /// Durably apply one state transition. The WAL record is flushed before
    /// the trees are written; the caller sees `Ok` only after everything is
    /// on disk and the WAL is cleared.
    pub fn commit(&self, record: &CommitRecord) -> Result<()> {
        let data = bincode::serialize(record)?;
        self.wal.insert(WAL_KEY, data)?;
        self.db.flush()?;

        self.apply_record(record)?;

        self.wal.remove(WAL_KEY)?;
        self.db.flush()?;

        log::debug!(
            "💾 Committed block {} at height {} ({} spent, {} created)",
            record.block_hash,
            record.new_state.height,
            record.utxo_removes.len(),
            record.utxo_inserts.len()
        );
        Ok(())
    }

    /// Tree writes for a commit. Every write is idempotent, so replaying a
    /// partially applied record converges on the same state.
    fn apply_record(&self, record: &CommitRecord) -> Result<()> {
        if let Some(block) = &record.block {
            self.blocks
                .insert(record.block_hash.as_bytes(), bincode::serialize(block)?)?;
        }

        for entry in &record.index_updates {
            self.block_index
                .insert(entry.hash.as_bytes(), bincode::serialize(entry)?)?;
        }

        for (height, hash) in &record.height_updates {
            match hash {
                Some(hash) => {
                    self.height_index
                        .insert(height.to_be_bytes(), hash.as_bytes().as_slice())?;
                }
                None => {
                    self.height_index.remove(height.to_be_bytes())?;
                }
            }
        }

        if let Some(undo) = &record.undo {
            self.undo
                .insert(record.block_hash.as_bytes(), bincode::serialize(undo)?)?;
        }

        // Batch keys must be sliced: sled only converts arrays up to 32
        // bytes into IVec, and outpoint keys are 36.
        let mut batch = sled::Batch::default();
        for outpoint in &record.utxo_removes {
            let key = outpoint_to_key(outpoint);
            batch.remove(&key[..]);
        }
        for (outpoint, entry) in &record.utxo_inserts {
            let key = outpoint_to_key(outpoint);
            batch.insert(&key[..], bincode::serialize(entry)?);
        }
        self.utxos.apply_batch(batch)?;

        self.chain_state
            .insert(CHAIN_STATE_KEY, bincode::serialize(&record.new_state)?)?;

        Ok(())
    }

    /// Rewrite one index entry outside a commit, used to flag side-branch
    /// blocks invalid. Idempotent like every other write.
    pub fn put_index_entry(&self, entry: &BlockIndexEntry) -> Result<()> {
        self.block_index
            .insert(entry.hash.as_bytes(), bincode::serialize(entry)?)?;
        self.db.flush()?;
        Ok(())
    }

    /// Store a block that does not change chain state (a side-branch block).
    /// No WAL round: partial writes here are overwritten harmlessly on retry.
    pub fn put_side_block(&self, block: &Block, entry: &BlockIndexEntry) -> Result<()> {
        let hash = block.hash();
        self.blocks.insert(hash.as_bytes(), bincode::serialize(block)?)?;
        self.block_index
            .insert(hash.as_bytes(), bincode::serialize(entry)?)?;
        self.db.flush()?;

        log::debug!("💾 Stored side-branch block {} at height {}", hash, block.header.height);
        Ok(())
    }

    // Block reads

    pub fn get_block(&self, hash: &Hash256) -> Result<Option<Block>> {
        match self.blocks.get(hash.as_bytes())? {
            Some(data) => {
                let block: Block = bincode::deserialize(&data)
                    .map_err(|e| QtcError::Storage(format!("Corrupt block record: {}", e)))?;
                Ok(Some(block))
            }
            None => Ok(None),
        }
    }

    pub fn has_block(&self, hash: &Hash256) -> Result<bool> {
        Ok(self.blocks.contains_key(hash.as_bytes())?)
    }

    pub fn get_block_hash_at_height(&self, height: u64) -> Result<Option<Hash256>> {
        match self.height_index.get(height.to_be_bytes())? {
            Some(bytes) => Hash256::from_slice(&bytes)
                .map(Some)
                .ok_or_else(|| QtcError::Storage("Invalid hash length in height index".into())),
            None => Ok(None),
        }
    }

    pub fn get_block_by_height(&self, height: u64) -> Result<Option<Block>> {
        match self.get_block_hash_at_height(height)? {
            Some(hash) => self.get_block(&hash),
            None => Ok(None),
        }
    }

    pub fn get_index_entry(&self, hash: &Hash256) -> Result<Option<BlockIndexEntry>> {
        match self.block_index.get(hash.as_bytes())? {
            Some(data) => {
                let entry: BlockIndexEntry = bincode::deserialize(&data)
                    .map_err(|e| QtcError::Storage(format!("Corrupt index record: {}", e)))?;
                Ok(Some(entry))
            }
            None => Ok(None),
        }
    }

    /// The whole block index; the consensus engine keeps it in memory for
    /// fork choice.
    pub fn load_block_index(&self) -> Result<Vec<BlockIndexEntry>> {
        let mut entries = Vec::new();
        for item in self.block_index.iter() {
            let (_, value) = item?;
            let entry: BlockIndexEntry = bincode::deserialize(&value)
                .map_err(|e| QtcError::Storage(format!("Corrupt index record: {}", e)))?;
            entries.push(entry);
        }
        Ok(entries)
    }

    pub fn get_undo(&self, hash: &Hash256) -> Result<Option<BlockUndo>> {
        match self.undo.get(hash.as_bytes())? {
            Some(data) => {
                let undo: BlockUndo = bincode::deserialize(&data)
                    .map_err(|e| QtcError::Storage(format!("Corrupt undo record: {}", e)))?;
                Ok(Some(undo))
            }
            None => Ok(None),
        }
    }

    // Chain state

    pub fn get_chain_state(&self) -> Result<Option<ChainState>> {
        match self.chain_state.get(CHAIN_STATE_KEY)? {
            Some(data) => {
                let state: ChainState = bincode::deserialize(&data)
                    .map_err(|e| QtcError::Storage(format!("Corrupt chain state: {}", e)))?;
                Ok(Some(state))
            }
            None => Ok(None),
        }
    }

    // UTXO reads

    pub fn get_utxo(&self, outpoint: &OutPoint) -> Result<Option<UtxoEntry>> {
        match self.utxos.get(outpoint_to_key(outpoint))? {
            Some(data) => {
                let entry: UtxoEntry = bincode::deserialize(&data)
                    .map_err(|e| QtcError::Storage(format!("Corrupt UTXO record: {}", e)))?;
                Ok(Some(entry))
            }
            None => Ok(None),
        }
    }

    pub fn has_utxo(&self, outpoint: &OutPoint) -> Result<bool> {
        Ok(self.utxos.contains_key(outpoint_to_key(outpoint))?)
    }

    pub fn get_utxos_for_pubkey_hash(
        &self,
        pubkey_hash: &Hash160,
    ) -> Result<Vec<(OutPoint, UtxoEntry)>> {
        let mut matches = Vec::new();
        for item in self.utxos.iter() {
            let (key, value) = item?;
            let entry: UtxoEntry = bincode::deserialize(&value)
                .map_err(|e| QtcError::Storage(format!("Corrupt UTXO record: {}", e)))?;
            if entry.pubkey_hash == *pubkey_hash {
                matches.push((key_to_outpoint(&key)?, entry));
            }
        }
        Ok(matches)
    }

    pub fn all_utxos(&self) -> Result<Vec<(OutPoint, UtxoEntry)>> {
        let mut entries = Vec::new();
        for item in self.utxos.iter() {
            let (key, value) = item?;
            let entry: UtxoEntry = bincode::deserialize(&value)
                .map_err(|e| QtcError::Storage(format!("Corrupt UTXO record: {}", e)))?;
            entries.push((key_to_outpoint(&key)?, entry));
        }
        Ok(entries)
    }

    pub fn stats(&self) -> StorageStats {
        StorageStats {
            block_count: self.blocks.len(),
            utxo_count: self.utxos.len(),
            undo_count: self.undo.len(),
        }
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}

fn open_tree(db: &Db, name: &str) -> Result<Tree> {
    db.open_tree(name)
        .map_err(|e| QtcError::Storage(format!("Failed to open tree {}: {}", name, e)))
}

// 36-byte key: txid followed by the little-endian output index.
fn outpoint_to_key(outpoint: &OutPoint) -> [u8; 36] {
    let mut key = [0u8; 36];
    key[0..32].copy_from_slice(outpoint.txid.as_bytes());
    key[32..36].copy_from_slice(&outpoint.vout.to_le_bytes());
    key
}

fn key_to_outpoint(key: &[u8]) -> Result<OutPoint> {
    if key.len() != 36 {
        return Err(QtcError::Storage("Invalid outpoint key length".to_string()));
    }

    let txid = Hash256::from_slice(&key[0..32])
        .ok_or_else(|| QtcError::Storage("Invalid txid in outpoint key".to_string()))?;
    let mut vout_bytes = [0u8; 4];
    vout_bytes.copy_from_slice(&key[32..36]);

    Ok(OutPoint {
        txid,
        vout: u32::from_le_bytes(vout_bytes),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Transaction;
    use tempfile::TempDir;

    fn test_block(height: u64) -> Block {
        let tx = Transaction::new_coinbase(height, b"storage test", Vec::new());
        Block::new(Hash256::zero(), vec![tx], 1_700_000_000 + height, 0x207fffff, height)
    }

    fn test_entry(block: &Block) -> BlockIndexEntry {
        BlockIndexEntry {
            hash: block.hash(),
            parent: block.header.previous_hash,
            height: block.header.height,
            timestamp: block.header.timestamp,
            bits: block.header.bits,
            work: 1,
            total_work: block.header.height as u128 + 1,
            total_supply: 0,
            next_bits: block.header.bits,
            on_main_chain: true,
            valid: true,
        }
    }

    fn test_record(block: &Block) -> CommitRecord {
        let hash = block.hash();
        let outpoint = OutPoint::new(hash, 0);
        let entry = UtxoEntry {
            value: 50_00000000,
            pubkey_hash: Hash160::zero(),
            height: block.header.height,
            is_coinbase: true,
        };

        CommitRecord {
            block_hash: hash,
            block: Some(block.clone()),
            index_updates: vec![test_entry(block)],
            height_updates: vec![(block.header.height, Some(hash))],
            undo: Some(BlockUndo { spent: Vec::new() }),
            utxo_removes: Vec::new(),
            utxo_inserts: vec![(outpoint, entry)],
            new_state: ChainState {
                tip: hash,
                height: block.header.height,
                total_work: block.header.height as u128 + 1,
                next_bits: 0x207fffff,
                total_supply: 0,
            },
        }
    }

    #[test]
    fn test_commit_round_trip() {
        let dir = TempDir::new().unwrap();
        let db = Database::open(dir.path()).unwrap();

        let block = test_block(0);
        let record = test_record(&block);
        db.commit(&record).unwrap();

        let hash = block.hash();
        assert_eq!(db.get_block(&hash).unwrap().unwrap(), block);
        assert_eq!(db.get_block_by_height(0).unwrap().unwrap(), block);
        assert_eq!(db.get_chain_state().unwrap().unwrap().tip, hash);
        assert!(db.has_utxo(&OutPoint::new(hash, 0)).unwrap());
        assert!(db.get_undo(&hash).unwrap().is_some());
    }

    #[test]
    fn test_reopen_preserves_state() {
        let dir = TempDir::new().unwrap();
        let block = test_block(0);
        let hash = block.hash();

        {
            let db = Database::open(dir.path()).unwrap();
            db.commit(&test_record(&block)).unwrap();
        }

        let db = Database::open(dir.path()).unwrap();
        assert_eq!(db.get_chain_state().unwrap().unwrap().tip, hash);
        assert_eq!(db.get_block(&hash).unwrap().unwrap(), block);
        assert!(db.has_utxo(&OutPoint::new(hash, 0)).unwrap());
    }

    #[test]
    fn test_pending_wal_record_is_replayed_on_open() {
        let dir = TempDir::new().unwrap();
        let block = test_block(0);
        let hash = block.hash();
        let record = test_record(&block);

        {
            // Write only the WAL record, simulating a crash before any tree
            // write landed.
            let db = Database::open(dir.path()).unwrap();
            db.wal
                .insert(WAL_KEY, bincode::serialize(&record).unwrap())
                .unwrap();
            db.db.flush().unwrap();
        }

        let db = Database::open(dir.path()).unwrap();
        assert_eq!(db.get_chain_state().unwrap().unwrap().tip, hash);
        assert_eq!(db.get_block(&hash).unwrap().unwrap(), block);
        assert!(db.has_utxo(&OutPoint::new(hash, 0)).unwrap());
        assert!(db.wal.get(WAL_KEY).unwrap().is_none());
    }

    #[test]
    fn test_replay_converges_after_partial_apply() {
        let dir = TempDir::new().unwrap();
        let block = test_block(0);
        let hash = block.hash();
        let record = test_record(&block);

        {
            // Crash window: WAL written and some tree writes applied, but
            // the WAL record not yet cleared.
            let db = Database::open(dir.path()).unwrap();
            db.wal
                .insert(WAL_KEY, bincode::serialize(&record).unwrap())
                .unwrap();
            db.blocks
                .insert(hash.as_bytes(), bincode::serialize(&block).unwrap())
                .unwrap();
            db.db.flush().unwrap();
        }

        let db = Database::open(dir.path()).unwrap();
        assert_eq!(db.get_chain_state().unwrap().unwrap().tip, hash);
        assert!(db.has_utxo(&OutPoint::new(hash, 0)).unwrap());
    }

    #[test]
    fn test_commit_applies_utxo_removals() {
        let dir = TempDir::new().unwrap();
        let db = Database::open(dir.path()).unwrap();

        let block = test_block(0);
        db.commit(&test_record(&block)).unwrap();
        let outpoint = OutPoint::new(block.hash(), 0);
        assert!(db.has_utxo(&outpoint).unwrap());

        let mut spend = test_record(&block);
        spend.block = None;
        spend.undo = None;
        spend.utxo_inserts.clear();
        spend.utxo_removes = vec![outpoint];
        db.commit(&spend).unwrap();

        assert!(!db.has_utxo(&outpoint).unwrap());
        assert!(db.get_utxo(&outpoint).unwrap().is_none());
    }

    #[test]
    fn test_height_index_updates_and_clears() {
        let dir = TempDir::new().unwrap();
        let db = Database::open(dir.path()).unwrap();

        let block = test_block(5);
        let mut record = test_record(&block);
        record.height_updates = vec![(5, Some(block.hash()))];
        db.commit(&record).unwrap();
        assert_eq!(db.get_block_hash_at_height(5).unwrap(), Some(block.hash()));

        let mut clear = test_record(&block);
        clear.block = None;
        clear.height_updates = vec![(5, None)];
        clear.utxo_inserts.clear();
        db.commit(&clear).unwrap();
        assert_eq!(db.get_block_hash_at_height(5).unwrap(), None);
    }

    #[test]
    fn test_utxo_scan_by_pubkey_hash() {
        let dir = TempDir::new().unwrap();
        let db = Database::open(dir.path()).unwrap();

        let block = test_block(0);
        let mut record = test_record(&block);
        let owner = Hash160::hash_sha256(b"owner");
        record.utxo_inserts = vec![
            (
                OutPoint::new(block.hash(), 0),
                UtxoEntry {
                    value: 100,
                    pubkey_hash: owner,
                    height: 0,
                    is_coinbase: false,
                },
            ),
            (
                OutPoint::new(block.hash(), 1),
                UtxoEntry {
                    value: 200,
                    pubkey_hash: Hash160::hash_sha256(b"someone else"),
                    height: 0,
                    is_coinbase: false,
                },
            ),
        ];
        db.commit(&record).unwrap();

        let owned = db.get_utxos_for_pubkey_hash(&owner).unwrap();
        assert_eq!(owned.len(), 1);
        assert_eq!(owned[0].1.value, 100);
        assert_eq!(db.all_utxos().unwrap().len(), 2);
    }
}
