//! Error types for consensus validation.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConsensusError {
    /// The block's parent has not been observed. The block is held for
    /// re-evaluation, not marked bad.
    #[error("block's parent is not known")]
    OrphanBlock,

    /// The block's timestamp is beyond the future threshold. The block is
    /// held for re-evaluation, not marked bad.
    #[error("block timestamp is too far in the future")]
    FutureBlock,

    /// Permanent block rejection; the id is recorded in the bad-blocks set.
    #[error("invalid block: {0}")]
    InvalidBlock(String),

    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),

    /// An input of the transaction is already reserved by the pool.
    #[error("conflicting transaction exists in the transaction pool")]
    MempoolConflict,

    /// The id is already in the block map or the bad-blocks set.
    #[error("block is already known")]
    AlreadyKnown,

    /// A once-applied block failed to re-apply while restoring a branch.
    /// The engine state can no longer be trusted; callers must treat this
    /// as a crash.
    #[error("consensus invariant violated: {0}")]
    InternalInvariant(String),
}

pub type Result<T> = std::result::Result<T, ConsensusError>;
