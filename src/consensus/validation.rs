use crate::config::ChainParams;
use crate::consensus::monetary::MonetaryPolicy;
use crate::core::block::BlockHeader;
use crate::core::utxo::{OverlayView, UtxoView};
use crate::core::{Block, Transaction};
use crate::crypto::hash::{Hash160, Hash256, Hashable};
use crate::crypto::dilithium;
use crate::error::{BlockRejectReason, TxRejectReason};
use crate::mining::difficulty;
use crate::{QtcError, Result};
use std::collections::HashSet;

/// Stateless plus stateful transaction checks. Side-effect free: works
/// against any [`UtxoView`] and never mutates it.
#[derive(Debug, Clone)]
pub struct TxValidator {
    max_tx_size: usize,
    max_inputs: usize,
    max_outputs: usize,
    dust_threshold: u64,
    coinbase_maturity: u64,
}

impl TxValidator {
    pub fn from_params(params: &ChainParams) -> Self {
        Self {
            max_tx_size: params.max_tx_size,
            max_inputs: params.max_tx_inputs,
            max_outputs: params.max_tx_outputs,
            dust_threshold: params.dust_threshold,
            coinbase_maturity: params.coinbase_maturity,
        }
    }

    /// Checks that need no chain context: shape, bounds, dust, duplicate
    /// inputs within the transaction.
    pub fn check_structure(&self, tx: &Transaction) -> Result<()> {
        if tx.inputs.is_empty() || tx.outputs.is_empty() {
            return Err(TxRejectReason::Empty.into());
        }
        if tx.inputs.len() > self.max_inputs {
            return Err(TxRejectReason::TooManyInputs(tx.inputs.len()).into());
        }
        if tx.outputs.len() > self.max_outputs {
            return Err(TxRejectReason::TooManyOutputs(tx.outputs.len()).into());
        }

        let size = tx.size();
        if size > self.max_tx_size {
            return Err(TxRejectReason::Oversized {
                size,
                limit: self.max_tx_size,
            }
            .into());
        }

        for (index, output) in tx.outputs.iter().enumerate() {
            if output.value < self.dust_threshold {
                return Err(TxRejectReason::DustOutput {
                    index,
                    value: output.value,
                }
                .into());
            }
        }

        let mut seen = HashSet::with_capacity(tx.inputs.len());
        for input in &tx.inputs {
            if !seen.insert(input.previous_output) {
                return Err(
                    TxRejectReason::DuplicateInput(input.previous_output.to_string()).into(),
                );
            }
        }

        Ok(())
    }

    /// Full validation of a non-coinbase transaction spending at `height`.
    /// Returns the fee it pays.
    ///
    /// A coinbase offered here fails naturally: its null outpoint resolves
    /// to no unspent output.
    pub fn validate(&self, tx: &Transaction, view: &dyn UtxoView, height: u64) -> Result<u64> {
        self.check_structure(tx)?;

        let mut input_total: u64 = 0;
        for (index, input) in tx.inputs.iter().enumerate() {
            let outpoint = input.previous_output;
            let entry = view
                .get_utxo(&outpoint)?
                .ok_or_else(|| TxRejectReason::UnknownInput(outpoint.to_string()))?;

            if entry.is_coinbase && height < entry.height + self.coinbase_maturity {
                return Err(TxRejectReason::ImmatureCoinbase {
                    created: entry.height,
                    spend: height,
                }
                .into());
            }

            // The revealed key must hash to the output's lock and the
            // detached signature must cover this input's digest.
            if Hash160::hash_sha256(&input.public_key) != entry.pubkey_hash {
                return Err(TxRejectReason::BadSignature(index).into());
            }
            let digest = tx.signature_hash(index)?;
            let signed = dilithium::verify(&digest, &input.signature, &input.public_key)
                .unwrap_or(false);
            if !signed {
                return Err(TxRejectReason::BadSignature(index).into());
            }

            input_total = input_total
                .checked_add(entry.value)
                .ok_or(TxRejectReason::ValueOverflow)?;
        }

        let mut output_total: u64 = 0;
        for output in &tx.outputs {
            output_total = output_total
                .checked_add(output.value)
                .ok_or(TxRejectReason::ValueOverflow)?;
        }

        if input_total < output_total {
            return Err(TxRejectReason::NegativeFee.into());
        }

        Ok(input_total - output_total)
    }
}

/// Block-level validation in the order contextual information becomes
/// available: shape and proof of work first, header context against the
/// parent next, full transaction replay last.
#[derive(Debug, Clone)]
pub struct BlockValidator {
    max_block_size: usize,
    max_coinbase_payload: usize,
    max_future_skew: u64,
    tx_validator: TxValidator,
    policy: MonetaryPolicy,
}

impl BlockValidator {
    pub fn from_params(params: &ChainParams) -> Self {
        Self {
            max_block_size: params.max_block_size,
            max_coinbase_payload: params.max_coinbase_payload,
            max_future_skew: params.max_future_skew,
            tx_validator: TxValidator::from_params(params),
            policy: MonetaryPolicy::from_params(params),
        }
    }

    pub fn tx_validator(&self) -> &TxValidator {
        &self.tx_validator
    }

    /// Context-free checks: structure, size, proof of work, merkle root.
    /// Valid for a block from any branch, connected or not.
    pub fn check_block(&self, block: &Block) -> Result<()> {
        let txs = &block.transactions;

        if txs.is_empty() {
            return Err(BlockRejectReason::BadStructure("no transactions".into()).into());
        }
        if !txs[0].is_coinbase() {
            return Err(
                BlockRejectReason::BadStructure("first transaction is not coinbase".into()).into(),
            );
        }
        for (index, tx) in txs.iter().enumerate().skip(1) {
            if tx.is_coinbase() {
                return Err(BlockRejectReason::BadStructure(format!(
                    "transaction {} is a second coinbase",
                    index
                ))
                .into());
            }
        }

        self.check_coinbase_shape(block)?;

        let mut seen = HashSet::with_capacity(txs.len());
        for tx in txs {
            if !seen.insert(tx.txid()) {
                return Err(BlockRejectReason::BadStructure(format!(
                    "duplicate transaction {}",
                    tx.txid()
                ))
                .into());
            }
        }

        let size = block.size();
        if size > self.max_block_size {
            return Err(BlockRejectReason::BadStructure(format!(
                "block size {} exceeds limit {}",
                size, self.max_block_size
            ))
            .into());
        }

        if !difficulty::meets_target(&block.hash(), block.header.bits) {
            return Err(BlockRejectReason::BadProofOfWork.into());
        }

        if Block::calculate_merkle_root(txs) != block.header.merkle_root {
            return Err(BlockRejectReason::BadMerkleRoot.into());
        }

        Ok(())
    }

    fn check_coinbase_shape(&self, block: &Block) -> Result<()> {
        let coinbase = &block.transactions[0];
        let data = &coinbase.inputs[0].signature;

        // 8-byte height commitment, then the miner's payload.
        if data.len() < 8 || data.len() > 8 + self.max_coinbase_payload {
            return Err(BlockRejectReason::BadStructure(format!(
                "coinbase payload {} bytes outside 8..={}",
                data.len(),
                8 + self.max_coinbase_payload
            ))
            .into());
        }

        let mut height_bytes = [0u8; 8];
        height_bytes.copy_from_slice(&data[0..8]);
        let committed = u64::from_le_bytes(height_bytes);
        if committed != block.header.height {
            return Err(BlockRejectReason::BadStructure(format!(
                "coinbase commits to height {} in block at height {}",
                committed, block.header.height
            ))
            .into());
        }

        for output in &coinbase.outputs {
            if output.value == 0 {
                return Err(
                    BlockRejectReason::BadStructure("zero-value coinbase output".into()).into(),
                );
            }
        }

        Ok(())
    }

    /// Header checks against the parent: linkage, height, expected
    /// difficulty, and the timestamp window.
    pub fn check_header_contextual(
        &self,
        header: &BlockHeader,
        parent_hash: Hash256,
        parent_height: u64,
        expected_bits: u32,
        median_time_past: u64,
        now: u64,
    ) -> Result<()> {
        if header.previous_hash != parent_hash {
            return Err(
                BlockRejectReason::BadStructure("previous hash does not match parent".into())
                    .into(),
            );
        }
        if header.height != parent_height + 1 {
            return Err(BlockRejectReason::BadStructure(format!(
                "height {} directly after parent at {}",
                header.height, parent_height
            ))
            .into());
        }
        if header.bits != expected_bits {
            return Err(BlockRejectReason::BadProofOfWork.into());
        }
        if header.timestamp > now + self.max_future_skew {
            return Err(BlockRejectReason::BadTimestamp.into());
        }
        if header.timestamp <= median_time_past {
            return Err(BlockRejectReason::BadTimestamp.into());
        }
        Ok(())
    }

    /// Replay every transaction against the UTXO view at the parent,
    /// in-block outputs visible to later transactions, and bound the
    /// coinbase payout by subsidy plus collected fees. Returns the fees.
    ///
    /// `minted_before` is the supply already issued on this branch, which
    /// caps the subsidy at the tail of emission.
    pub fn connect_block(
        &self,
        block: &Block,
        view: &dyn UtxoView,
        minted_before: u64,
    ) -> Result<u64> {
        let height = block.header.height;
        let mut overlay = OverlayView::new(view);
        let mut total_fees: u64 = 0;

        for (index, tx) in block.transactions.iter().enumerate() {
            if index == 0 {
                overlay.connect_transaction(tx, height, true);
                continue;
            }

            let fee = self
                .tx_validator
                .validate(tx, &overlay, height)
                .map_err(|err| match err {
                    QtcError::TxRejected(reason) => QtcError::BlockRejected(
                        BlockRejectReason::InvalidTransaction(index, reason),
                    ),
                    other => other,
                })?;
            total_fees = total_fees.checked_add(fee).ok_or_else(|| {
                QtcError::BlockRejected(BlockRejectReason::InvalidTransaction(
                    index,
                    TxRejectReason::ValueOverflow,
                ))
            })?;

            overlay.connect_transaction(tx, height, false);
        }

        let allowed = self.policy.max_coinbase_value(height, minted_before, total_fees);
        let mut paid: u64 = 0;
        for output in &block.transactions[0].outputs {
            paid = match paid.checked_add(output.value) {
                Some(v) => v,
                None => {
                    return Err(BlockRejectReason::OversizedCoinbase {
                        paid: u64::MAX,
                        allowed,
                    }
                    .into())
                }
            };
        }
        if paid > allowed {
            return Err(BlockRejectReason::OversizedCoinbase { paid, allowed }.into());
        }

        log::debug!(
            "✅ Block {} connect checks passed ({} txs, {} fee sats)",
            height,
            block.transaction_count(),
            total_fees
        );
        Ok(total_fees)
    }
}

/// Median of the given ancestor timestamps. Callers pass the last
/// `mtp_window` timestamps, newest or oldest first; order does not matter.
pub fn median_time_past(timestamps: &[u64]) -> u64 {
    if timestamps.is_empty() {
        return 0;
    }
    let mut sorted = timestamps.to_vec();
    sorted.sort_unstable();
    sorted[sorted.len() / 2]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::utxo::{MemoryUtxoView, UtxoEntry};
    use crate::core::transaction::OutPoint;
    use crate::core::TxOutput;
    use crate::crypto::KeyPair;

    fn regtest_validators() -> (TxValidator, BlockValidator) {
        let params = ChainParams::regtest();
        (
            TxValidator::from_params(&params),
            BlockValidator::from_params(&params),
        )
    }

    fn funded_view(value: u64, keypair: &KeyPair) -> (MemoryUtxoView, OutPoint) {
        let mut view = MemoryUtxoView::default();
        let outpoint = OutPoint::new(Hash256::hash(b"funding tx"), 0);
        view.insert(
            outpoint,
            UtxoEntry {
                value,
                pubkey_hash: keypair.pubkey_hash(),
                height: 1,
                is_coinbase: false,
            },
        );
        (view, outpoint)
    }

    fn mine(block: &mut Block) {
        while !difficulty::meets_target(&block.hash(), block.header.bits) {
            block.header.nonce += 1;
        }
    }

    #[test]
    fn test_valid_spend_returns_fee() {
        let (validator, _) = regtest_validators();
        let keypair = KeyPair::generate();
        let (view, outpoint) = funded_view(10_000, &keypair);

        let mut tx = Transaction::new();
        tx.add_input(outpoint);
        tx.add_output(8_900, KeyPair::generate().pubkey_hash());
        tx.sign_input(0, &keypair).unwrap();

        assert_eq!(validator.validate(&tx, &view, 20).unwrap(), 1_100);
    }

    #[test]
    fn test_rejects_unknown_input() {
        let (validator, _) = regtest_validators();
        let keypair = KeyPair::generate();
        let (view, _) = funded_view(10_000, &keypair);

        let mut tx = Transaction::new();
        tx.add_input(OutPoint::new(Hash256::hash(b"never existed"), 3));
        tx.add_output(1_000, keypair.pubkey_hash());
        tx.sign_input(0, &keypair).unwrap();

        let err = validator.validate(&tx, &view, 20).unwrap_err();
        assert!(matches!(
            err,
            QtcError::TxRejected(TxRejectReason::UnknownInput(_))
        ));
    }

    #[test]
    fn test_rejects_tampered_output() {
        let (validator, _) = regtest_validators();
        let keypair = KeyPair::generate();
        let (view, outpoint) = funded_view(10_000, &keypair);

        let mut tx = Transaction::new();
        tx.add_input(outpoint);
        tx.add_output(8_000, KeyPair::generate().pubkey_hash());
        tx.sign_input(0, &keypair).unwrap();
        // Pay more after signing; the digest no longer matches.
        tx.outputs[0].value = 9_000;

        let err = validator.validate(&tx, &view, 20).unwrap_err();
        assert!(matches!(
            err,
            QtcError::TxRejected(TxRejectReason::BadSignature(0))
        ));
    }

    #[test]
    fn test_rejects_wrong_key() {
        let (validator, _) = regtest_validators();
        let owner = KeyPair::generate();
        let thief = KeyPair::generate();
        let (view, outpoint) = funded_view(10_000, &owner);

        let mut tx = Transaction::new();
        tx.add_input(outpoint);
        tx.add_output(8_000, thief.pubkey_hash());
        tx.sign_input(0, &thief).unwrap();

        let err = validator.validate(&tx, &view, 20).unwrap_err();
        assert!(matches!(
            err,
            QtcError::TxRejected(TxRejectReason::BadSignature(0))
        ));
    }

    #[test]
    fn test_rejects_negative_fee() {
        let (validator, _) = regtest_validators();
        let keypair = KeyPair::generate();
        let (view, outpoint) = funded_view(10_000, &keypair);

        let mut tx = Transaction::new();
        tx.add_input(outpoint);
        tx.add_output(12_000, keypair.pubkey_hash());
        tx.sign_input(0, &keypair).unwrap();

        let err = validator.validate(&tx, &view, 20).unwrap_err();
        assert!(matches!(
            err,
            QtcError::TxRejected(TxRejectReason::NegativeFee)
        ));
    }

    #[test]
    fn test_rejects_duplicate_input() {
        let (validator, _) = regtest_validators();
        let keypair = KeyPair::generate();
        let (view, outpoint) = funded_view(10_000, &keypair);

        let mut tx = Transaction::new();
        tx.add_input(outpoint);
        tx.add_input(outpoint);
        tx.add_output(8_000, keypair.pubkey_hash());

        let err = validator.validate(&tx, &view, 20).unwrap_err();
        assert!(matches!(
            err,
            QtcError::TxRejected(TxRejectReason::DuplicateInput(_))
        ));
    }

    #[test]
    fn test_coinbase_maturity_window() {
        // Regtest maturity is 10 blocks.
        let (validator, _) = regtest_validators();
        let keypair = KeyPair::generate();
        let mut view = MemoryUtxoView::default();
        let outpoint = OutPoint::new(Hash256::hash(b"coinbase"), 0);
        view.insert(
            outpoint,
            UtxoEntry {
                value: 10_000,
                pubkey_hash: keypair.pubkey_hash(),
                height: 5,
                is_coinbase: true,
            },
        );

        let mut tx = Transaction::new();
        tx.add_input(outpoint);
        tx.add_output(8_000, keypair.pubkey_hash());
        tx.sign_input(0, &keypair).unwrap();

        let err = validator.validate(&tx, &view, 14).unwrap_err();
        assert!(matches!(
            err,
            QtcError::TxRejected(TxRejectReason::ImmatureCoinbase {
                created: 5,
                spend: 14
            })
        ));

        assert!(validator.validate(&tx, &view, 15).is_ok());
    }

    #[test]
    fn test_rejects_dust_output() {
        let (validator, _) = regtest_validators();
        let keypair = KeyPair::generate();
        let (view, outpoint) = funded_view(10_000, &keypair);

        let mut tx = Transaction::new();
        tx.add_input(outpoint);
        tx.add_output(100, keypair.pubkey_hash());

        let err = validator.validate(&tx, &view, 20).unwrap_err();
        assert!(matches!(
            err,
            QtcError::TxRejected(TxRejectReason::DustOutput { index: 0, value: 100 })
        ));
    }

    #[test]
    fn test_rejects_empty_transaction() {
        let (validator, _) = regtest_validators();
        let view = MemoryUtxoView::default();

        let err = validator
            .validate(&Transaction::new(), &view, 20)
            .unwrap_err();
        assert!(matches!(err, QtcError::TxRejected(TxRejectReason::Empty)));
    }

    #[test]
    fn test_rejects_too_many_inputs() {
        let (validator, _) = regtest_validators();
        let keypair = KeyPair::generate();
        let view = MemoryUtxoView::default();

        let mut tx = Transaction::new();
        for i in 0..1_001u32 {
            tx.add_input(OutPoint::new(Hash256::hash(&i.to_le_bytes()), 0));
        }
        tx.add_output(1_000, keypair.pubkey_hash());

        let err = validator.validate(&tx, &view, 20).unwrap_err();
        assert!(matches!(
            err,
            QtcError::TxRejected(TxRejectReason::TooManyInputs(1_001))
        ));
    }

    fn build_block(
        height: u64,
        prev: Hash256,
        coinbase_value: u64,
        miner: &KeyPair,
        extra: Vec<Transaction>,
    ) -> Block {
        let outputs = if coinbase_value > 0 {
            vec![TxOutput::new(coinbase_value, miner.pubkey_hash())]
        } else {
            Vec::new()
        };
        let coinbase = Transaction::new_coinbase(height, b"validation test", outputs);
        let mut txs = vec![coinbase];
        txs.extend(extra);
        let mut block = Block::new(prev, txs, 1_751_330_000 + height, 0x207fffff, height);
        mine(&mut block);
        block
    }

    #[test]
    fn test_connect_block_with_spend_and_fee() {
        let (_, validator) = regtest_validators();
        let keypair = KeyPair::generate();
        let (view, outpoint) = funded_view(10_000, &keypair);

        let mut spend = Transaction::new();
        spend.add_input(outpoint);
        spend.add_output(9_000, KeyPair::generate().pubkey_hash());
        spend.sign_input(0, &keypair).unwrap();

        // 50 QTC subsidy plus the 1000 sat fee.
        let miner = KeyPair::generate();
        let block = build_block(
            20,
            Hash256::hash(b"parent"),
            5_000_000_000 + 1_000,
            &miner,
            vec![spend],
        );

        validator.check_block(&block).unwrap();
        let fees = validator.connect_block(&block, &view, 1_000_000).unwrap();
        assert_eq!(fees, 1_000);
    }

    #[test]
    fn test_connect_rejects_overpaying_coinbase() {
        let (_, validator) = regtest_validators();
        let miner = KeyPair::generate();
        let view = MemoryUtxoView::default();

        let block = build_block(20, Hash256::hash(b"parent"), 5_000_000_001, &miner, vec![]);

        let err = validator.connect_block(&block, &view, 0).unwrap_err();
        assert!(matches!(
            err,
            QtcError::BlockRejected(BlockRejectReason::OversizedCoinbase {
                paid: 5_000_000_001,
                allowed: 5_000_000_000
            })
        ));
    }

    #[test]
    fn test_connect_caps_subsidy_near_max_supply() {
        let (_, validator) = regtest_validators();
        let miner = KeyPair::generate();
        let view = MemoryUtxoView::default();
        let params = ChainParams::regtest();

        // Ten sats left under the cap: a full-subsidy coinbase overpays.
        let minted = params.max_supply - 10;
        let block = build_block(20, Hash256::hash(b"parent"), 5_000_000_000, &miner, vec![]);

        let err = validator.connect_block(&block, &view, minted).unwrap_err();
        assert!(matches!(
            err,
            QtcError::BlockRejected(BlockRejectReason::OversizedCoinbase { allowed: 10, .. })
        ));

        let trimmed = build_block(21, Hash256::hash(b"parent"), 10, &miner, vec![]);
        assert!(validator.connect_block(&trimmed, &view, minted).is_ok());
    }

    #[test]
    fn test_check_block_rejects_second_coinbase() {
        let (_, validator) = regtest_validators();
        let miner = KeyPair::generate();

        let rogue = Transaction::new_coinbase(20, b"rogue", Vec::new());
        let block = build_block(20, Hash256::hash(b"parent"), 5_000_000_000, &miner, vec![rogue]);

        let err = validator.check_block(&block).unwrap_err();
        assert!(matches!(
            err,
            QtcError::BlockRejected(BlockRejectReason::BadStructure(_))
        ));
    }

    #[test]
    fn test_check_block_rejects_bad_merkle_root() {
        let (_, validator) = regtest_validators();
        let miner = KeyPair::generate();

        let mut block = build_block(20, Hash256::hash(b"parent"), 5_000_000_000, &miner, vec![]);
        block.header.merkle_root = Hash256::hash(b"somewhere else");
        mine(&mut block);

        let err = validator.check_block(&block).unwrap_err();
        assert!(matches!(
            err,
            QtcError::BlockRejected(BlockRejectReason::BadMerkleRoot)
        ));
    }

    #[test]
    fn test_check_block_rejects_unmet_target() {
        let (_, validator) = regtest_validators();
        let miner = KeyPair::generate();

        let mut block = build_block(20, Hash256::hash(b"parent"), 5_000_000_000, &miner, vec![]);
        // Target of 1: no hash satisfies it.
        block.header.bits = 0x03000001;

        let err = validator.check_block(&block).unwrap_err();
        assert!(matches!(
            err,
            QtcError::BlockRejected(BlockRejectReason::BadProofOfWork)
        ));
    }

    #[test]
    fn test_check_block_rejects_wrong_height_commitment() {
        let (_, validator) = regtest_validators();

        // Coinbase built for height 2 inside a block at height 3.
        let coinbase = Transaction::new_coinbase(2, b"stale", Vec::new());
        let mut block = Block::new(
            Hash256::hash(b"parent"),
            vec![coinbase],
            1_751_330_003,
            0x207fffff,
            3,
        );
        mine(&mut block);

        let err = validator.check_block(&block).unwrap_err();
        assert!(matches!(
            err,
            QtcError::BlockRejected(BlockRejectReason::BadStructure(_))
        ));
    }

    #[test]
    fn test_contextual_header_checks() {
        let (_, validator) = regtest_validators();
        let miner = KeyPair::generate();
        let parent_hash = Hash256::hash(b"parent");
        let block = build_block(5, parent_hash, 5_000_000_000, &miner, vec![]);
        let header = block.header;
        let now = header.timestamp;

        assert!(validator
            .check_header_contextual(&header, parent_hash, 4, 0x207fffff, header.timestamp - 10, now)
            .is_ok());

        // Wrong parent height.
        let err = validator
            .check_header_contextual(&header, parent_hash, 7, 0x207fffff, 0, now)
            .unwrap_err();
        assert!(matches!(
            err,
            QtcError::BlockRejected(BlockRejectReason::BadStructure(_))
        ));

        // Bits not matching the scheduled difficulty.
        let err = validator
            .check_header_contextual(&header, parent_hash, 4, 0x1d00ffff, 0, now)
            .unwrap_err();
        assert!(matches!(
            err,
            QtcError::BlockRejected(BlockRejectReason::BadProofOfWork)
        ));

        // Timestamp at or before the median of recent ancestors.
        let err = validator
            .check_header_contextual(&header, parent_hash, 4, 0x207fffff, header.timestamp, now)
            .unwrap_err();
        assert!(matches!(
            err,
            QtcError::BlockRejected(BlockRejectReason::BadTimestamp)
        ));

        // Timestamp too far past local time.
        let err = validator
            .check_header_contextual(&header, parent_hash, 4, 0x207fffff, 0, header.timestamp - 7_300)
            .unwrap_err();
        assert!(matches!(
            err,
            QtcError::BlockRejected(BlockRejectReason::BadTimestamp)
        ));
    }

    #[test]
    fn test_median_time_past() {
        assert_eq!(median_time_past(&[]), 0);
        assert_eq!(median_time_past(&[5]), 5);
        assert_eq!(median_time_past(&[3, 1, 2]), 2);
        let window: Vec<u64> = (100..111).collect();
        assert_eq!(median_time_past(&window), 105);
    }
}
