//! Dilithium2 signing and the QTC address format.
//!
//! Every output is locked to the RIPEMD160(SHA256(pubkey)) of a Dilithium2
//! public key; spending reveals the public key and a detached signature over
//! the transaction's signature hash.

use crate::crypto::hash::{Hash160, Hash256};
use crate::{QtcError, Result};
use pqcrypto_dilithium::dilithium2;
use pqcrypto_traits::sign::{
    DetachedSignature as _, PublicKey as _, SecretKey as _,
};
use serde::{Deserialize, Serialize};

/// Dilithium2 parameter sizes, fixed by the scheme.
pub const PUBLIC_KEY_BYTES: usize = 1312;
pub const SECRET_KEY_BYTES: usize = 2528;
pub const SIGNATURE_BYTES: usize = 2420;

/// Version byte prepended to the pubkey hash in addresses.
pub const ADDRESS_VERSION: u8 = 0x51;

const ADDRESS_PREFIX: &str = "qtc";

#[derive(Clone)]
pub struct KeyPair {
    public_key: dilithium2::PublicKey,
    secret_key: dilithium2::SecretKey,
}

/// Unlocking data carried by a transaction input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PqSignature {
    pub signature: Vec<u8>,
    pub public_key: Vec<u8>,
}

impl KeyPair {
    pub fn generate() -> Self {
        let (public_key, secret_key) = dilithium2::keypair();
        Self {
            public_key,
            secret_key,
        }
    }

    pub fn from_bytes(public_key: &[u8], secret_key: &[u8]) -> Result<Self> {
        let public_key = dilithium2::PublicKey::from_bytes(public_key)
            .map_err(|e| QtcError::Crypto(format!("invalid Dilithium2 public key: {:?}", e)))?;
        let secret_key = dilithium2::SecretKey::from_bytes(secret_key)
            .map_err(|e| QtcError::Crypto(format!("invalid Dilithium2 secret key: {:?}", e)))?;
        Ok(Self {
            public_key,
            secret_key,
        })
    }

    pub fn public_key_bytes(&self) -> Vec<u8> {
        self.public_key.as_bytes().to_vec()
    }

    pub fn secret_key_bytes(&self) -> Vec<u8> {
        self.secret_key.as_bytes().to_vec()
    }

    /// The locking condition outputs paid to this key carry.
    pub fn pubkey_hash(&self) -> Hash160 {
        Hash160::hash_sha256(self.public_key.as_bytes())
    }

    pub fn address(&self) -> String {
        address_from_pubkey_hash(&self.pubkey_hash())
    }

    /// Detached signature over a 32-byte digest.
    pub fn sign(&self, digest: &Hash256) -> PqSignature {
        let signature = dilithium2::detached_sign(digest.as_bytes(), &self.secret_key);
        PqSignature {
            signature: signature.as_bytes().to_vec(),
            public_key: self.public_key.as_bytes().to_vec(),
        }
    }
}

/// Verify a detached Dilithium2 signature over a digest.
///
/// Returns `Ok(false)` on a well-formed but wrong signature; `Err` only when
/// the key or signature bytes are not parseable at all.
pub fn verify(digest: &Hash256, signature: &[u8], public_key: &[u8]) -> Result<bool> {
    let public_key = dilithium2::PublicKey::from_bytes(public_key)
        .map_err(|e| QtcError::Crypto(format!("invalid Dilithium2 public key: {:?}", e)))?;
    let signature = dilithium2::DetachedSignature::from_bytes(signature)
        .map_err(|e| QtcError::Crypto(format!("invalid Dilithium2 signature: {:?}", e)))?;

    Ok(dilithium2::verify_detached_signature(&signature, digest.as_bytes(), &public_key).is_ok())
}

/// Base58 address: prefix + base58(version || hash160 || 4-byte checksum).
pub fn address_from_pubkey_hash(pubkey_hash: &Hash160) -> String {
    let mut data = Vec::with_capacity(25);
    data.push(ADDRESS_VERSION);
    data.extend_from_slice(pubkey_hash.as_bytes());

    let checksum = Hash256::double_hash(&data);
    data.extend_from_slice(&checksum.as_bytes()[0..4]);

    format!("{}{}", ADDRESS_PREFIX, bs58::encode(data).into_string())
}

pub fn address_from_pubkey(public_key: &[u8]) -> String {
    address_from_pubkey_hash(&Hash160::hash_sha256(public_key))
}

/// Decode an address back to the pubkey hash it commits to.
pub fn address_to_pubkey_hash(address: &str) -> Result<Hash160> {
    let encoded = address
        .strip_prefix(ADDRESS_PREFIX)
        .ok_or_else(|| QtcError::InvalidAddress(format!("missing {} prefix", ADDRESS_PREFIX)))?;

    let decoded = bs58::decode(encoded)
        .into_vec()
        .map_err(|e| QtcError::InvalidAddress(format!("bad base58: {}", e)))?;

    if decoded.len() != 25 {
        return Err(QtcError::InvalidAddress(format!(
            "decoded length {} instead of 25",
            decoded.len()
        )));
    }
    if decoded[0] != ADDRESS_VERSION {
        return Err(QtcError::InvalidAddress(format!(
            "unknown version byte 0x{:02x}",
            decoded[0]
        )));
    }

    let checksum = Hash256::double_hash(&decoded[0..21]);
    if checksum.as_bytes()[0..4] != decoded[21..25] {
        return Err(QtcError::InvalidAddress("checksum mismatch".into()));
    }

    // Length checked above, 21 - 1 = 20 bytes remain.
    Ok(Hash160::from_slice(&decoded[1..21]).unwrap())
}

pub fn is_valid_address(address: &str) -> bool {
    address_to_pubkey_hash(address).is_ok()
}
