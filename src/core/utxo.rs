use crate::core::transaction::OutPoint;
use crate::core::Block;
use crate::crypto::hash::{Hash160, Hashable};
use crate::error::{BlockRejectReason, TxRejectReason};
use crate::storage::Database;
use crate::{QtcError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

/// One unspent output: the value, who may spend it, and enough context to
/// enforce coinbase maturity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoEntry {
    pub value: u64,
    pub pubkey_hash: Hash160,
    /// Height of the block that created the output.
    pub height: u64,
    pub is_coinbase: bool,
}

/// Undo data retained per connected block: every pre-existing output the
/// block spent, in spend order. Outputs created and consumed within the
/// same block never reach the store and are not recorded here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockUndo {
    pub spent: Vec<(OutPoint, UtxoEntry)>,
}

/// Staged UTXO mutation for one block transition. Nothing is written until
/// the store commits the whole record, so a failed block leaves the set
/// untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UtxoDelta {
    pub removes: Vec<OutPoint>,
    pub inserts: Vec<(OutPoint, UtxoEntry)>,
    pub undo: BlockUndo,
}

/// Read access to unspent outputs. The validator works against this trait
/// so it can run over the committed set, an in-flight block overlay, or a
/// test fixture alike.
pub trait UtxoView {
    fn get_utxo(&self, outpoint: &OutPoint) -> Result<Option<UtxoEntry>>;
}

/// The materialized UTXO set over the chain store.
#[derive(Debug, Clone)]
pub struct UtxoSet {
    db: Arc<Database>,
}

impl UtxoSet {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn lookup(&self, outpoint: &OutPoint) -> Result<Option<UtxoEntry>> {
        self.db.get_utxo(outpoint)
    }

    pub fn contains(&self, outpoint: &OutPoint) -> Result<bool> {
        self.db.has_utxo(outpoint)
    }

    /// Stage the mutation for connecting `block`: spends every input's
    /// referenced output and creates every output, tracking in-block
    /// chaining. Fails without staging anything if an input is unknown,
    /// already consumed, or referenced twice.
    pub fn apply_block(&self, block: &Block) -> Result<UtxoDelta> {
        let height = block.header.height;
        let mut fresh: BTreeMap<OutPoint, UtxoEntry> = BTreeMap::new();
        let mut spent_prior: Vec<(OutPoint, UtxoEntry)> = Vec::new();
        let mut seen: HashSet<OutPoint> = HashSet::new();

        for (tx_index, tx) in block.transactions.iter().enumerate() {
            let txid = tx.txid();

            if !tx.is_coinbase() {
                for input in &tx.inputs {
                    let outpoint = input.previous_output;

                    if !seen.insert(outpoint) {
                        return Err(QtcError::BlockRejected(
                            BlockRejectReason::InvalidTransaction(
                                tx_index,
                                TxRejectReason::DuplicateInput(outpoint.to_string()),
                            ),
                        ));
                    }

                    if let Some(entry) = fresh.remove(&outpoint) {
                        // Created earlier in this block and consumed here;
                        // it never reaches the store.
                        drop(entry);
                    } else if let Some(entry) = self.lookup(&outpoint)? {
                        spent_prior.push((outpoint, entry));
                    } else {
                        return Err(QtcError::BlockRejected(
                            BlockRejectReason::InvalidTransaction(
                                tx_index,
                                TxRejectReason::UnknownInput(outpoint.to_string()),
                            ),
                        ));
                    }
                }
            }

            for (vout, output) in tx.outputs.iter().enumerate() {
                let outpoint = OutPoint::new(txid, vout as u32);
                fresh.insert(
                    outpoint,
                    UtxoEntry {
                        value: output.value,
                        pubkey_hash: output.pubkey_hash,
                        height,
                        is_coinbase: tx_index == 0,
                    },
                );
            }
        }

        let undo = BlockUndo {
            spent: spent_prior.clone(),
        };

        Ok(UtxoDelta {
            removes: spent_prior.into_iter().map(|(op, _)| op).collect(),
            inserts: fresh.into_iter().collect(),
            undo,
        })
    }

    /// Stage the exact inverse of `apply_block`: delete the block's
    /// outputs and restore what it spent.
    pub fn revert_block(&self, block: &Block, undo: &BlockUndo) -> Result<UtxoDelta> {
        let mut removes = Vec::new();
        for tx in &block.transactions {
            let txid = tx.txid();
            for vout in 0..tx.outputs.len() {
                removes.push(OutPoint::new(txid, vout as u32));
            }
        }

        Ok(UtxoDelta {
            removes,
            inserts: undo.spent.clone(),
            undo: BlockUndo { spent: Vec::new() },
        })
    }

    /// Confirmed balance: sum of unspent outputs locked to `pubkey_hash`.
    pub fn balance(&self, pubkey_hash: &Hash160) -> Result<u64> {
        let utxos = self.db.get_utxos_for_pubkey_hash(pubkey_hash)?;
        Ok(utxos.iter().map(|(_, entry)| entry.value).sum())
    }

    pub fn utxos_for(&self, pubkey_hash: &Hash160) -> Result<Vec<(OutPoint, UtxoEntry)>> {
        self.db.get_utxos_for_pubkey_hash(pubkey_hash)
    }

    /// Sum of every unspent output; equals minted subsidy plus fees not
    /// yet burned, and is audited against chain state in tests.
    pub fn total_value(&self) -> Result<u64> {
        let mut total: u64 = 0;
        for (_, entry) in self.db.all_utxos()? {
            total = total
                .checked_add(entry.value)
                .ok_or_else(|| QtcError::Consensus("UTXO total overflows".to_string()))?;
        }
        Ok(total)
    }

    pub fn len(&self) -> usize {
        self.db.stats().utxo_count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl UtxoView for UtxoSet {
    fn get_utxo(&self, outpoint: &OutPoint) -> Result<Option<UtxoEntry>> {
        self.lookup(outpoint)
    }
}

/// View of the UTXO set as it will look part-way through a block:
/// outputs created by earlier transactions are visible, outputs they
/// spent are not.
pub struct OverlayView<'a, V: UtxoView + ?Sized> {
    base: &'a V,
    created: HashMap<OutPoint, UtxoEntry>,
    consumed: HashSet<OutPoint>,
}

impl<'a, V: UtxoView + ?Sized> OverlayView<'a, V> {
    pub fn new(base: &'a V) -> Self {
        Self {
            base,
            created: HashMap::new(),
            consumed: HashSet::new(),
        }
    }

    /// Fold a validated transaction into the overlay.
    pub fn connect_transaction(
        &mut self,
        tx: &crate::core::Transaction,
        height: u64,
        is_coinbase: bool,
    ) {
        if !is_coinbase {
            for input in &tx.inputs {
                let outpoint = input.previous_output;
                if self.created.remove(&outpoint).is_none() {
                    self.consumed.insert(outpoint);
                }
            }
        }

        let txid = tx.txid();
        for (vout, output) in tx.outputs.iter().enumerate() {
            self.created.insert(
                OutPoint::new(txid, vout as u32),
                UtxoEntry {
                    value: output.value,
                    pubkey_hash: output.pubkey_hash,
                    height,
                    is_coinbase,
                },
            );
        }
    }
}

impl<'a, V: UtxoView + ?Sized> UtxoView for OverlayView<'a, V> {
    fn get_utxo(&self, outpoint: &OutPoint) -> Result<Option<UtxoEntry>> {
        if self.consumed.contains(outpoint) {
            return Ok(None);
        }
        if let Some(entry) = self.created.get(outpoint) {
            return Ok(Some(entry.clone()));
        }
        self.base.get_utxo(outpoint)
    }
}

/// In-memory view for tests and validator fixtures.
#[derive(Debug, Default, Clone)]
pub struct MemoryUtxoView {
    pub entries: HashMap<OutPoint, UtxoEntry>,
}

impl MemoryUtxoView {
    pub fn insert(&mut self, outpoint: OutPoint, entry: UtxoEntry) {
        self.entries.insert(outpoint, entry);
    }

    pub fn remove(&mut self, outpoint: &OutPoint) {
        self.entries.remove(outpoint);
    }
}

impl UtxoView for MemoryUtxoView {
    fn get_utxo(&self, outpoint: &OutPoint) -> Result<Option<UtxoEntry>> {
        Ok(self.entries.get(outpoint).cloned())
    }
}
