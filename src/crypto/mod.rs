//! Cryptographic primitives for QTC

pub mod dilithium;
pub mod hash;

pub use dilithium::{KeyPair, PqSignature};
pub use hash::{Hash160, Hash256, Hashable};
