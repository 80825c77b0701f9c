use crate::crypto::dilithium::KeyPair;
use crate::crypto::hash::{Hash160, Hash256, Hashable};
use crate::{QtcError, Result};
use serde::{Deserialize, Serialize};

/// Sequence value marking the synthetic coinbase input.
pub const COINBASE_SEQUENCE: u32 = 0xFFFFFFFF;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub version: u32,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    pub lock_time: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    pub previous_output: OutPoint,
    /// Detached Dilithium2 signature over the input's signature hash.
    /// Carries the coinbase payload for the synthetic coinbase input.
    pub signature: Vec<u8>,
    /// Public key whose hash160 must match the spent output's lock.
    pub public_key: Vec<u8>,
    pub sequence: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub value: u64,
    /// Locking condition: hash160 of the Dilithium2 public key allowed to
    /// spend this output.
    pub pubkey_hash: Hash160,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutPoint {
    pub txid: Hash256,
    pub vout: u32,
}

impl OutPoint {
    pub fn new(txid: Hash256, vout: u32) -> Self {
        Self { txid, vout }
    }

    pub fn null() -> Self {
        Self {
            txid: Hash256::zero(),
            vout: COINBASE_SEQUENCE,
        }
    }

    pub fn is_null(&self) -> bool {
        self.txid.is_zero() && self.vout == COINBASE_SEQUENCE
    }
}

impl std::fmt::Display for OutPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.txid, self.vout)
    }
}

impl TxOutput {
    pub fn new(value: u64, pubkey_hash: Hash160) -> Self {
        Self { value, pubkey_hash }
    }
}

impl Transaction {
    pub fn new() -> Self {
        Self {
            version: 1,
            inputs: Vec::new(),
            outputs: Vec::new(),
            lock_time: 0,
        }
    }

    /// Build the reward transaction for a block at `height`.
    ///
    /// The single input is synthetic: a null outpoint whose signature field
    /// carries the block height followed by the miner's payload, so two
    /// coinbases at different heights never share a txid. `outputs` may be
    /// empty (the genesis coinbase mints nothing).
    pub fn new_coinbase(height: u64, payload: &[u8], outputs: Vec<TxOutput>) -> Self {
        let mut coinbase_data = Vec::with_capacity(8 + payload.len());
        coinbase_data.extend_from_slice(&height.to_le_bytes());
        coinbase_data.extend_from_slice(payload);

        let coinbase_input = TxInput {
            previous_output: OutPoint::null(),
            signature: coinbase_data,
            public_key: Vec::new(),
            sequence: COINBASE_SEQUENCE,
        };

        Self {
            version: 1,
            inputs: vec![coinbase_input],
            outputs,
            lock_time: 0,
        }
    }

    pub fn add_input(&mut self, outpoint: OutPoint) {
        self.inputs.push(TxInput {
            previous_output: outpoint,
            signature: Vec::new(),
            public_key: Vec::new(),
            sequence: 0xFFFFFFFE,
        });
    }

    pub fn add_output(&mut self, value: u64, pubkey_hash: Hash160) {
        self.outputs.push(TxOutput { value, pubkey_hash });
    }

    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].previous_output.is_null()
    }

    pub fn txid(&self) -> Hash256 {
        self.hash()
    }

    pub fn total_output_value(&self) -> u64 {
        self.outputs.iter().map(|output| output.value).sum()
    }

    /// Serialized size as stored and relayed.
    pub fn size(&self) -> usize {
        bincode::serialize(self).map(|data| data.len()).unwrap_or(0)
    }

    /// Digest each input signs: the transaction with all unlocking data
    /// cleared, plus the index of the input being signed.
    pub fn signature_hash(&self, input_index: usize) -> Result<Hash256> {
        if input_index >= self.inputs.len() {
            return Err(QtcError::InvalidInput(format!(
                "signature hash for input {} of {}",
                input_index,
                self.inputs.len()
            )));
        }

        let mut data = self.canonical_bytes(false);
        data.extend_from_slice(&(input_index as u32).to_le_bytes());
        Ok(Hash256::double_hash(&data))
    }

    /// Sign input `input_index`, filling in its signature and public key.
    pub fn sign_input(&mut self, input_index: usize, keypair: &KeyPair) -> Result<()> {
        let digest = self.signature_hash(input_index)?;
        let sig = keypair.sign(&digest);
        let input = &mut self.inputs[input_index];
        input.signature = sig.signature;
        input.public_key = sig.public_key;
        Ok(())
    }

    /// Fixed-layout little-endian encoding. With `with_unlock_data` the
    /// signature and public key of every input are included (txid); without,
    /// they are omitted (signature hash).
    fn canonical_bytes(&self, with_unlock_data: bool) -> Vec<u8> {
        let mut data = Vec::new();

        data.extend_from_slice(&self.version.to_le_bytes());

        data.extend_from_slice(&(self.inputs.len() as u32).to_le_bytes());
        for input in &self.inputs {
            data.extend_from_slice(input.previous_output.txid.as_bytes());
            data.extend_from_slice(&input.previous_output.vout.to_le_bytes());
            if with_unlock_data {
                data.extend_from_slice(&(input.signature.len() as u32).to_le_bytes());
                data.extend_from_slice(&input.signature);
                data.extend_from_slice(&(input.public_key.len() as u32).to_le_bytes());
                data.extend_from_slice(&input.public_key);
            }
            data.extend_from_slice(&input.sequence.to_le_bytes());
        }

        data.extend_from_slice(&(self.outputs.len() as u32).to_le_bytes());
        for output in &self.outputs {
            data.extend_from_slice(&output.value.to_le_bytes());
            data.extend_from_slice(output.pubkey_hash.as_bytes());
        }

        data.extend_from_slice(&self.lock_time.to_le_bytes());
        data
    }
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new()
    }
}

impl Hashable for Transaction {
    fn hash(&self) -> Hash256 {
        Hash256::double_hash(&self.canonical_bytes(true))
    }
}
