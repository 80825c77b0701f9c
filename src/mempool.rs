//! Fee-prioritized memory pool of unconfirmed transactions.
//!
//! Admission fully validates against the confirmed UTXO set, so anything
//! in the pool is spendable at the next height barring conflicts. Ordering
//! and eviction both run on fee rate (sats per kilobyte): block templates
//! drain from the top, capacity pressure evicts from the bottom, and a
//! conflicting replacement must beat every transaction it displaces.

use crate::config::ChainParams;
use crate::consensus::validation::TxValidator;
use crate::core::transaction::OutPoint;
use crate::core::utxo::UtxoView;
use crate::core::{Block, Transaction};
use crate::crypto::hash::Hash256;
use crate::error::TxRejectReason;
use crate::{QtcError, Result};
use std::collections::{BTreeSet, HashMap, HashSet};

#[derive(Debug, Clone)]
pub struct MempoolEntry {
    pub tx: Transaction,
    pub txid: Hash256,
    pub fee: u64,
    pub size: usize,
    /// Sats per kilobyte, the pool's only priority key.
    pub fee_rate: u64,
    pub added: u64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MempoolStats {
    pub count: usize,
    pub bytes: usize,
    pub min_fee_rate: u64,
    pub max_fee_rate: u64,
}

pub struct Mempool {
    validator: TxValidator,
    max_bytes: usize,
    max_count: usize,
    expiry: u64,
    min_fee_per_kb: u64,
    entries: HashMap<Hash256, MempoolEntry>,
    /// (fee_rate, txid) so iteration is priority order with a stable tiebreak.
    by_fee_rate: BTreeSet<(u64, Hash256)>,
    /// Outpoint to the pooled transaction spending it.
    spends: HashMap<OutPoint, Hash256>,
    bytes: usize,
}

impl Mempool {
    pub fn from_params(params: &ChainParams) -> Self {
        Self {
            validator: TxValidator::from_params(params),
            max_bytes: params.mempool_max_bytes,
            max_count: params.mempool_max_count,
            expiry: params.mempool_expiry,
            min_fee_per_kb: params.min_relay_fee_per_kb,
            entries: HashMap::new(),
            by_fee_rate: BTreeSet::new(),
            spends: HashMap::new(),
            bytes: 0,
        }
    }

    /// Validate and admit a transaction for inclusion at `height`.
    ///
    /// Conflicting pool transactions are replaced only when this one's fee
    /// rate strictly beats all of theirs. Returns the txid on success.
    pub fn admit(
        &mut self,
        tx: Transaction,
        view: &dyn UtxoView,
        height: u64,
        now: u64,
    ) -> Result<Hash256> {
        let txid = tx.txid();
        if self.entries.contains_key(&txid) {
            return Err(TxRejectReason::AlreadyPresent.into());
        }
        if tx.is_coinbase() {
            return Err(TxRejectReason::Empty.into());
        }

        let fee = self.validator.validate(&tx, view, height)?;
        let size = tx.size();
        let fee_rate = fee.saturating_mul(1_000) / size.max(1) as u64;

        let minimum = self.min_fee_per_kb.saturating_mul(size as u64) / 1_000;
        if fee < minimum {
            return Err(TxRejectReason::FeeTooLow { fee, minimum }.into());
        }

        // Replace-by-fee: every displaced transaction must lose outright.
        let mut conflicts: HashSet<Hash256> = HashSet::new();
        for input in &tx.inputs {
            if let Some(existing) = self.spends.get(&input.previous_output) {
                conflicts.insert(*existing);
            }
        }
        for conflict in &conflicts {
            let existing = &self.entries[conflict];
            if existing.fee_rate >= fee_rate {
                return Err(TxRejectReason::ConflictsWithPool.into());
            }
        }
        for conflict in conflicts {
            log::debug!("♻️  Replacing {} with higher fee-rate {}", conflict, txid);
            self.remove(&conflict);
        }

        // Capacity: shed the cheapest until this one fits, unless it is
        // itself the cheapest.
        while self.entries.len() >= self.max_count || self.bytes + size > self.max_bytes {
            let lowest = match self.by_fee_rate.iter().next() {
                Some(&(rate, lowest)) if rate < fee_rate => lowest,
                _ => return Err(QtcError::MempoolFull),
            };
            log::debug!("🗑️  Evicting {} to make room", lowest);
            self.remove(&lowest);
        }

        for input in &tx.inputs {
            self.spends.insert(input.previous_output, txid);
        }
        self.by_fee_rate.insert((fee_rate, txid));
        self.bytes += size;
        self.entries.insert(
            txid,
            MempoolEntry {
                tx,
                txid,
                fee,
                size,
                fee_rate,
                added: now,
            },
        );
        log::debug!(
            "📥 Admitted {} ({} bytes, {} sat/kB, pool now {})",
            txid,
            size,
            fee_rate,
            self.entries.len()
        );
        Ok(txid)
    }

    /// Highest-fee-rate transactions fitting in `max_bytes`, skipping any
    /// that spend an outpoint already consumed by an earlier selection.
    pub fn select_for_block(&self, max_bytes: usize) -> Vec<(Transaction, u64)> {
        let mut selected = Vec::new();
        let mut used: HashSet<OutPoint> = HashSet::new();
        let mut budget = max_bytes;

        for &(_, txid) in self.by_fee_rate.iter().rev() {
            let entry = &self.entries[&txid];
            if entry.size > budget {
                continue;
            }
            if entry
                .tx
                .inputs
                .iter()
                .any(|input| used.contains(&input.previous_output))
            {
                continue;
            }
            used.extend(entry.tx.inputs.iter().map(|input| input.previous_output));
            budget -= entry.size;
            selected.push((entry.tx.clone(), entry.fee));
        }
        selected
    }

    /// Drop transactions confirmed by `block`, and any pooled transaction
    /// left spending an outpoint the block consumed.
    pub fn remove_confirmed(&mut self, block: &Block) {
        for tx in &block.transactions {
            self.remove(&tx.txid());
        }
        for tx in block.transactions.iter().skip(1) {
            for input in &tx.inputs {
                if let Some(conflicted) = self.spends.get(&input.previous_output).copied() {
                    log::debug!("🗑️  Dropping {} spending a confirmed outpoint", conflicted);
                    self.remove(&conflicted);
                }
            }
        }
    }

    /// Re-check every entry against a fresh UTXO view, dropping what no
    /// longer validates. Used after a reorganization moves the tip.
    pub fn revalidate(&mut self, view: &dyn UtxoView, height: u64) {
        let txids: Vec<Hash256> = self.entries.keys().copied().collect();
        for txid in txids {
            let valid = {
                let entry = &self.entries[&txid];
                self.validator.validate(&entry.tx, view, height).is_ok()
            };
            if !valid {
                log::debug!("🗑️  {} no longer valid after tip change", txid);
                self.remove(&txid);
            }
        }
    }

    /// Drop entries older than the configured expiry.
    pub fn expire(&mut self, now: u64) {
        let expiry = self.expiry;
        let stale: Vec<Hash256> = self
            .entries
            .values()
            .filter(|entry| entry.added.saturating_add(expiry) <= now)
            .map(|entry| entry.txid)
            .collect();
        for txid in stale {
            log::debug!("⌛ {} expired unconfirmed", txid);
            self.remove(&txid);
        }
    }

    pub fn contains(&self, txid: &Hash256) -> bool {
        self.entries.contains_key(txid)
    }

    pub fn get(&self, txid: &Hash256) -> Option<&MempoolEntry> {
        self.entries.get(txid)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> MempoolStats {
        MempoolStats {
            count: self.entries.len(),
            bytes: self.bytes,
            min_fee_rate: self
                .by_fee_rate
                .iter()
                .next()
                .map(|&(rate, _)| rate)
                .unwrap_or(0),
            max_fee_rate: self
                .by_fee_rate
                .iter()
                .next_back()
                .map(|&(rate, _)| rate)
                .unwrap_or(0),
        }
    }

    fn remove(&mut self, txid: &Hash256) {
        let Some(entry) = self.entries.remove(txid) else {
            return;
        };
        self.by_fee_rate.remove(&(entry.fee_rate, entry.txid));
        self.bytes -= entry.size;
        for input in &entry.tx.inputs {
            if self.spends.get(&input.previous_output) == Some(txid) {
                self.spends.remove(&input.previous_output);
            }
        }
    }
}
