use crate::core::Transaction;
use crate::crypto::hash::{Hash256, Hashable};
use serde::{Deserialize, Serialize};

/// Size of the canonical header encoding in bytes.
pub const HEADER_SIZE: usize = 96;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub version: u32,
    pub previous_hash: Hash256,
    pub merkle_root: Hash256,
    pub timestamp: u64,
    /// Difficulty target in compact form.
    pub bits: u32,
    pub nonce: u64,
    pub height: u64,
}

impl BlockHeader {
    /// Fixed-layout encoding the header hash is computed over: every field
    /// in declaration order, integers little-endian, 96 bytes total. Every
    /// node derives byte-identical hashes from this layout; the serde
    /// encoding is never used for hashing.
    pub fn canonical_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut data = [0u8; HEADER_SIZE];
        data[0..4].copy_from_slice(&self.version.to_le_bytes());
        data[4..36].copy_from_slice(self.previous_hash.as_bytes());
        data[36..68].copy_from_slice(self.merkle_root.as_bytes());
        data[68..76].copy_from_slice(&self.timestamp.to_le_bytes());
        data[76..80].copy_from_slice(&self.bits.to_le_bytes());
        data[80..88].copy_from_slice(&self.nonce.to_le_bytes());
        data[88..96].copy_from_slice(&self.height.to_le_bytes());
        data
    }
}

impl Hashable for BlockHeader {
    fn hash(&self) -> Hash256 {
        Hash256::double_hash(&self.canonical_bytes())
    }
}

impl Block {
    pub fn new(
        previous_hash: Hash256,
        transactions: Vec<Transaction>,
        timestamp: u64,
        bits: u32,
        height: u64,
    ) -> Self {
        let merkle_root = Self::calculate_merkle_root(&transactions);

        Self {
            header: BlockHeader {
                version: 1,
                previous_hash,
                merkle_root,
                timestamp,
                bits,
                nonce: 0,
                height,
            },
            transactions,
        }
    }

    /// Merkle root over the txids, pairwise SHA-256d, odd leaf duplicated.
    pub fn calculate_merkle_root(transactions: &[Transaction]) -> Hash256 {
        if transactions.is_empty() {
            return Hash256::zero();
        }

        let mut hashes: Vec<Hash256> = transactions.iter().map(|tx| tx.txid()).collect();

        while hashes.len() > 1 {
            let mut next_level = Vec::with_capacity((hashes.len() + 1) / 2);

            for chunk in hashes.chunks(2) {
                let mut bytes = Vec::with_capacity(64);
                bytes.extend_from_slice(chunk[0].as_bytes());
                bytes.extend_from_slice(chunk.get(1).unwrap_or(&chunk[0]).as_bytes());
                next_level.push(Hash256::double_hash(&bytes));
            }

            hashes = next_level;
        }

        hashes[0]
    }

    pub fn coinbase(&self) -> Option<&Transaction> {
        self.transactions.first()
    }

    pub fn txids(&self) -> Vec<Hash256> {
        self.transactions.iter().map(|tx| tx.txid()).collect()
    }

    /// Serialized size as stored, the size the block limit applies to.
    pub fn size(&self) -> usize {
        bincode::serialize(self).map(|data| data.len()).unwrap_or(0)
    }

    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }
}

impl Hashable for Block {
    fn hash(&self) -> Hash256 {
        self.header.hash()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coinbase_only_block(height: u64) -> Block {
        let tx = Transaction::new_coinbase(height, b"test", Vec::new());
        Block::new(Hash256::zero(), vec![tx], 1_700_000_000, 0x207fffff, height)
    }

    #[test]
    fn test_block_creation() {
        let block = coinbase_only_block(0);

        assert_eq!(block.header.height, 0);
        assert_eq!(block.header.bits, 0x207fffff);
        assert_eq!(block.header.previous_hash, Hash256::zero());
        assert_eq!(block.transaction_count(), 1);
        assert_eq!(
            block.header.merkle_root,
            block.transactions[0].txid(),
            "single-transaction merkle root is the txid"
        );
    }

    #[test]
    fn test_canonical_header_layout() {
        let block = coinbase_only_block(7);
        let bytes = block.header.canonical_bytes();

        assert_eq!(bytes.len(), HEADER_SIZE);
        assert_eq!(&bytes[0..4], &1u32.to_le_bytes());
        assert_eq!(&bytes[4..36], block.header.previous_hash.as_bytes());
        assert_eq!(&bytes[88..96], &7u64.to_le_bytes());
    }

    #[test]
    fn test_header_hash_depends_on_nonce() {
        let mut block = coinbase_only_block(1);
        let before = block.hash();
        block.header.nonce = 42;

        assert_ne!(before, block.hash());
        assert_eq!(block.hash(), Hash256::double_hash(&block.header.canonical_bytes()));
    }

    #[test]
    fn test_merkle_root_odd_count_duplicates_last() {
        let txs: Vec<Transaction> = (0..3)
            .map(|i| Transaction::new_coinbase(i, b"m", Vec::new()))
            .collect();
        let padded: Vec<Transaction> = vec![
            txs[0].clone(),
            txs[1].clone(),
            txs[2].clone(),
            txs[2].clone(),
        ];

        assert_eq!(
            Block::calculate_merkle_root(&txs),
            Block::calculate_merkle_root(&padded)
        );
    }

    #[test]
    fn test_merkle_root_changes_with_transactions() {
        let a = vec![Transaction::new_coinbase(1, b"a", Vec::new())];
        let b = vec![Transaction::new_coinbase(1, b"b", Vec::new())];

        assert_ne!(
            Block::calculate_merkle_root(&a),
            Block::calculate_merkle_root(&b)
        );
    }
}
