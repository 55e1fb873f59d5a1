//! Transaction pool bookkeeping.
//!
//! The pool is two indices over the same pending set: `transaction_pool`
//! reserves every consumed output id, and `transaction_list` holds the
//! canonical transactions keyed by content hash. Transactions with no
//! inputs (storage proofs pay out of contract funds, not inputs) live only
//! in the list.

use crate::state::ConsensusState;
use crate::types::Transaction;

/// Returns true if any input of the transaction is already reserved by a
/// pending transaction.
pub(crate) fn pool_conflict(consensus: &ConsensusState, transaction: &Transaction) -> bool {
    transaction
        .inputs
        .iter()
        .any(|input| consensus.transaction_pool.contains_key(&input.output_id))
}

/// Indexes a transaction into the pool without validating it.
pub(crate) fn add_transaction_to_pool(consensus: &mut ConsensusState, transaction: &Transaction) {
    let transaction_id = transaction.id();
    for input in &transaction.inputs {
        consensus
            .transaction_pool
            .insert(input.output_id, transaction_id);
    }
    consensus
        .transaction_list
        .insert(transaction_id, transaction.clone());
}

/// Takes a transaction out of the pool. Exact inverse of
/// [`add_transaction_to_pool`].
pub(crate) fn remove_transaction_from_pool(
    consensus: &mut ConsensusState,
    transaction: &Transaction,
) {
    for input in &transaction.inputs {
        consensus.transaction_pool.remove(&input.output_id);
    }
    consensus.transaction_list.remove(&transaction.id());
}
