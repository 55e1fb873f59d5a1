//! Block-header validation and the forward/inverse application of blocks to
//! the consensus state.
//!
//! Applying then reversing a block restores every derived index exactly;
//! fork switching depends on this invariant.

use tracing::{debug, info};

use crate::constants::{COIN_INFLATION, FUTURE_THRESHOLD, RECENT_TIMESTAMPS_DEPTH};
use crate::encoding::{contract_termination_output_id, storage_proof_output_id, subsidy_id};
use crate::error::{ConsensusError, Result};
use crate::mempool;
use crate::state::StateInner;
use crate::transaction::{apply_transaction, reverse_transaction, valid_transaction};
use crate::tree::BlockNode;
use crate::types::{
    Block, BlockID, ContractID, Currency, MissedStorageProof, OpenContract, Output, OutputID,
    Timestamp, Transaction,
};

/// Validates everything in a block except its transactions, given the parent
/// node it claims.
///
/// Failure modes differ: a timestamp too far ahead of the clock is a
/// temporary condition, a timestamp at or below the median of the last
/// eleven applied timestamps is permanent, and so are a mismatched Merkle
/// root and insufficient work.
pub(crate) fn validate_header(parent: &BlockNode, block: &Block, now: Timestamp) -> Result<()> {
    if block.timestamp.saturating_sub(now) > FUTURE_THRESHOLD {
        return Err(ConsensusError::FutureBlock);
    }

    let mut timestamps = parent.recent_timestamps;
    timestamps.sort_unstable();
    if block.timestamp <= timestamps[RECENT_TIMESTAMPS_DEPTH / 2] {
        return Err(ConsensusError::InvalidBlock(
            "timestamp is at or below the median of recent blocks".to_string(),
        ));
    }

    if block.merkle_root != block.expected_transaction_merkle_root() {
        return Err(ConsensusError::InvalidBlock(
            "merkle root does not match the block's transactions".to_string(),
        ));
    }

    if !parent.target.met_by(&block.id()) {
        return Err(ConsensusError::InvalidBlock(
            "block id does not meet the target".to_string(),
        ));
    }

    Ok(())
}

/// Applies the block of an existing tree node to the consensus state.
///
/// Transactions are validated and applied in block order; if one fails, the
/// ones already applied are reversed in reverse order and re-admitted to the
/// pool, leaving the state untouched. After the transactions, open contracts
/// go through window maintenance, the miner subsidy is issued, and the
/// current block and path advance.
pub(crate) fn integrate_block(state: &mut StateInner, block_id: BlockID) -> Result<()> {
    let (block, height) = {
        let node = &state.block_map[&block_id];
        (node.block.clone(), node.height)
    };

    let mut applied: Vec<&Transaction> = Vec::new();
    let mut miner_subsidy: Currency = 0;
    let mut failure = None;
    for txn in &block.transactions {
        if let Err(err) = valid_transaction(&state.consensus, txn, height) {
            failure = Some(err);
            break;
        }

        apply_transaction(&mut state.consensus, txn, height);
        applied.push(txn);

        // The block supersedes the pool's reservation of these inputs.
        mempool::remove_transaction_from_pool(&mut state.consensus, txn);

        for fee in &txn.miner_fees {
            miner_subsidy = miner_subsidy.saturating_add(*fee);
        }
    }

    if let Some(err) = failure {
        for txn in applied.into_iter().rev() {
            reverse_transaction(&mut state.consensus, txn, height);
            mempool::add_transaction_to_pool(&mut state.consensus, txn);
        }
        debug!(height, error = %err, "block failed to integrate");
        return Err(err);
    }

    // Window maintenance over all open contracts. Effects are buffered and
    // the map is never mutated structurally while it is being iterated.
    let mut new_outputs: Vec<(OutputID, Output)> = Vec::new();
    let mut missed_proofs: Vec<MissedStorageProof> = Vec::new();
    let mut terminations: Vec<OpenContract> = Vec::new();
    let mut terminated_ids: Vec<ContractID> = Vec::new();
    for open_contract in state.consensus.open_contracts.values_mut() {
        let contract = &open_contract.file_contract;

        // A window boundary: pay out a missed proof if the closing window
        // went unsatisfied, then open the next window.
        if height > contract.start && (height - contract.start) % contract.challenge_frequency == 0
        {
            if !open_contract.window_satisfied {
                let payout = contract
                    .missed_proof_payout
                    .min(open_contract.funds_remaining);
                let output_id =
                    storage_proof_output_id(&open_contract.contract_id, height, false);
                new_outputs.push((
                    output_id,
                    Output {
                        value: payout,
                        spend_hash: contract.missed_proof_address,
                    },
                ));
                missed_proofs.push(MissedStorageProof {
                    output_id,
                    contract_id: open_contract.contract_id,
                });

                open_contract.funds_remaining -= payout;
                open_contract.failures += 1;
            }
            open_contract.window_satisfied = false;
        }

        // Termination: the funds ran dry, the contract reached its end, or
        // the host failed one window too many. Any remaining funds are
        // released to whichever party the outcome favors.
        let contract = &open_contract.file_contract;
        if open_contract.funds_remaining == 0
            || contract.end == height
            || contract.tolerance == open_contract.failures
        {
            if open_contract.funds_remaining != 0 {
                let spend_hash = if contract.tolerance == open_contract.failures {
                    contract.missed_proof_address
                } else {
                    contract.valid_proof_address
                };
                new_outputs.push((
                    contract_termination_output_id(&open_contract.contract_id),
                    Output {
                        value: open_contract.funds_remaining,
                        spend_hash,
                    },
                ));
            }

            terminations.push(open_contract.clone());
            terminated_ids.push(open_contract.contract_id);
        }
    }
    for (output_id, output) in new_outputs {
        state.consensus.unspent_outputs.insert(output_id, output);
    }
    for contract_id in &terminated_ids {
        state.consensus.open_contracts.remove(contract_id);
        debug!(height, "contract terminated");
    }

    // The per-block inflation joins the collected fees in the subsidy.
    miner_subsidy = miner_subsidy.saturating_add(COIN_INFLATION);
    state.consensus.unspent_outputs.insert(
        subsidy_id(&block_id),
        Output {
            value: miner_subsidy,
            spend_hash: block.miner_address,
        },
    );

    // Record the contract events on the node so the block can be reversed.
    if let Some(node) = state.block_map.get_mut(&block_id) {
        node.contract_terminations.extend(terminations);
        node.missed_storage_proofs.extend(missed_proofs);
    }

    state.consensus.current_block = block_id;
    state.consensus.current_path.insert(height, block_id);
    info!(height, "applied block");
    Ok(())
}

/// Removes the most recent block from the consensus state, making the state
/// as though the block had never been integrated. The inverse runs in the
/// opposite order of integration: contract terminations are reopened first,
/// then missed-proof payouts are taken back, then the transactions are
/// reversed newest-first and re-admitted to the pool, and finally the
/// subsidy is deleted and the current block and path step back.
pub(crate) fn rewind_a_block(state: &mut StateInner) {
    let block_id = state.consensus.current_block;
    let (block, height, terminations, missed_proofs) = {
        let node = &state.block_map[&block_id];
        (
            node.block.clone(),
            node.height,
            node.contract_terminations.clone(),
            node.missed_storage_proofs.clone(),
        )
    };
    // The node's event lists are rebuilt if the block is ever re-applied.
    if let Some(node) = state.block_map.get_mut(&block_id) {
        node.contract_terminations.clear();
        node.missed_storage_proofs.clear();
    }

    for open_contract in terminations {
        state
            .consensus
            .unspent_outputs
            .remove(&contract_termination_output_id(&open_contract.contract_id));
        state
            .consensus
            .open_contracts
            .insert(open_contract.contract_id, open_contract);
    }

    for missed_proof in missed_proofs {
        if let Some(output) = state.consensus.unspent_outputs.remove(&missed_proof.output_id) {
            if let Some(open_contract) = state
                .consensus
                .open_contracts
                .get_mut(&missed_proof.contract_id)
            {
                open_contract.funds_remaining += output.value;
                open_contract.failures -= 1;
            }
        }
    }

    for txn in block.transactions.iter().rev() {
        reverse_transaction(&mut state.consensus, txn, height);
        mempool::add_transaction_to_pool(&mut state.consensus, txn);
    }

    state.consensus.unspent_outputs.remove(&subsidy_id(&block_id));

    state.consensus.current_block = block.parent_block;
    state.consensus.current_path.remove(&height);
    debug!(height, "rewound block");
}
