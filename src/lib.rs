//! # storagecoin-consensus
//!
//! Core consensus engine of a proof-of-work currency that extends the UTXO
//! model with on-chain file contracts and storage proofs.
//!
//! The engine maintains a tree of all observed blocks, selects the heaviest
//! valid branch, and keeps a derived consensus state (unspent outputs, open
//! storage contracts, transaction pool) consistent with that selection. It
//! accepts new blocks and transactions, rewinds and replays blocks during
//! reorganizations, and enforces all validity rules.
//!
//! ## Architecture
//!
//! - [`types`]: the data model, with serde derives for snapshotting
//! - [`constants`]: build-time consensus parameters
//! - [`crypto`] and [`encoding`]: hashing, signatures, storage proofs, and
//!   the canonical byte encoding every identifier derives from
//! - [`State`]: the engine itself, a single actor behind one exclusive lock
//!
//! Targets and cumulative chain weights use exact rational arithmetic;
//! floating point never touches a consensus path.
//!
//! ## Usage
//!
//! ```rust
//! use storagecoin_consensus::{Block, State};
//!
//! let genesis = Block {
//!     parent_block: [0; 32],
//!     timestamp: 1_400_000_000,
//!     nonce: 0,
//!     miner_address: [0; 32],
//!     merkle_root: [0; 32],
//!     transactions: vec![],
//! };
//! let state = State::new(genesis);
//! assert_eq!(state.height(), 0);
//! ```
//!
//! Blocks and transactions arrive through [`State::accept_block`] and
//! [`State::accept_transaction`]; a timer should drive
//! [`State::retry_future_blocks`] so that blocks held for clock skew are
//! reconsidered.

pub mod constants;
pub mod crypto;
pub mod encoding;
pub mod error;
pub mod types;

mod block;
mod fork;
mod mempool;
mod state;
mod transaction;
mod tree;

#[cfg(test)]
mod test_helpers;

pub use constants::*;
pub use error::{ConsensusError, Result};
pub use state::{ConsensusState, State};
pub use types::*;
