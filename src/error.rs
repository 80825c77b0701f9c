use thiserror::Error;

pub type Result<T> = std::result::Result<T, QtcError>;

/// Reason a transaction was refused by validation.
///
/// These are recoverable from the sender's point of view: a corrected
/// transaction may be resubmitted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TxRejectReason {
    #[error("input {0} does not refer to an unspent output")]
    UnknownInput(String),

    #[error("input {0} is referenced twice in the same transaction")]
    DuplicateInput(String),

    #[error("signature on input {0} does not authorize the spend")]
    BadSignature(usize),

    #[error("outputs exceed inputs")]
    NegativeFee,

    #[error("fee {fee} below required minimum {minimum}")]
    FeeTooLow { fee: u64, minimum: u64 },

    #[error("output {index} value {value} below dust threshold")]
    DustOutput { index: usize, value: u64 },

    #[error("coinbase output created at height {created} spent at height {spend} before maturity")]
    ImmatureCoinbase { created: u64, spend: u64 },

    #[error("transaction size {size} exceeds limit {limit}")]
    Oversized { size: usize, limit: usize },

    #[error("transaction has {0} inputs, more than allowed")]
    TooManyInputs(usize),

    #[error("transaction has {0} outputs, more than allowed")]
    TooManyOutputs(usize),

    #[error("transaction has no inputs or no outputs")]
    Empty,

    #[error("input or output values overflow")]
    ValueOverflow,

    #[error("conflicts with a pooled transaction without paying a higher fee rate")]
    ConflictsWithPool,

    #[error("transaction already in the mempool")]
    AlreadyPresent,
}

/// Reason a block was permanently rejected.
///
/// Consensus rejections are terminal: the same block will never become
/// valid and is not retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlockRejectReason {
    #[error("malformed block: {0}")]
    BadStructure(String),

    #[error("header hash does not satisfy the required target")]
    BadProofOfWork,

    #[error("merkle root does not match the transaction list")]
    BadMerkleRoot,

    #[error("timestamp outside the accepted window")]
    BadTimestamp,

    #[error("coinbase pays {paid} but at most {allowed} is allowed")]
    OversizedCoinbase { paid: u64, allowed: u64 },

    #[error("transaction {0} invalid: {1}")]
    InvalidTransaction(usize, TxRejectReason),

    #[error("parent block unknown")]
    OrphanParent,
}

#[derive(Error, Debug)]
pub enum QtcError {
    #[error("block rejected: {0}")]
    BlockRejected(#[from] BlockRejectReason),

    #[error("transaction rejected: {0}")]
    TxRejected(#[from] TxRejectReason),

    #[error("mempool full, resubmit with a higher fee or retry later")]
    MempoolFull,

    #[error("Consensus error: {0}")]
    Consensus(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Mining error: {0}")]
    Mining(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("Database error: {0}")]
    Database(#[from] sled::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl QtcError {
    /// True for failures that must stop the node rather than be reported
    /// to the caller. A storage failure mid-commit would otherwise leave
    /// applied-but-unpersisted state behind.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            QtcError::Database(_) | QtcError::Io(_) | QtcError::Encoding(_) | QtcError::Storage(_)
        )
    }

    /// True for failures the caller may retry, such as a full mempool.
    pub fn is_transient(&self) -> bool {
        matches!(self, QtcError::MempoolFull)
    }
}

impl<T> From<sled::transaction::TransactionError<T>> for QtcError
where
    T: Into<QtcError>,
{
    fn from(err: sled::transaction::TransactionError<T>) -> Self {
        match err {
            sled::transaction::TransactionError::Abort(inner) => inner.into(),
            sled::transaction::TransactionError::Storage(e) => QtcError::Database(e),
        }
    }
}
