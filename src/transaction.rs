//! Transaction validation, application, and reversal.

use std::collections::{HashMap, HashSet};

use crate::crypto;
use crate::encoding::{file_contract_id, output_id, sig_hash, storage_proof_output_id};
use crate::error::{ConsensusError, Result};
use crate::state::ConsensusState;
use crate::types::{Currency, Height, OpenContract, Output, OutputID, PublicKey, Transaction};

/// Each input carries a list of public keys and a required number of
/// signatures. This tracks which keys have been used and how many more
/// signatures are needed while the transaction's signatures are processed.
struct InputSignatures {
    remaining_signatures: u64,
    possible_keys: Vec<PublicKey>,
    used_keys: HashSet<u64>,
}

fn invalid(reason: &str) -> ConsensusError {
    ConsensusError::InvalidTransaction(reason.to_string())
}

/// Returns Ok if the transaction is acceptable at the given height, and an
/// error explaining the first failed check otherwise.
///
/// Checks run in a fixed order: inputs resolve and authorize, contracts are
/// well formed, storage proofs are eligible and verify, value is conserved,
/// and finally every input gathers its full complement of signatures.
pub(crate) fn valid_transaction(
    consensus: &ConsensusState,
    transaction: &Transaction,
    height: Height,
) -> Result<()> {
    // 1. Every input must consume an existing output, reveal the preimage
    // of its spend hash, and be past its time lock. Sum the input value.
    let mut input_sum: Currency = 0;
    let mut input_signatures: HashMap<OutputID, InputSignatures> = HashMap::new();
    for input in &transaction.inputs {
        let utxo = consensus
            .unspent_outputs
            .get(&input.output_id)
            .ok_or_else(|| invalid("transaction spends a nonexisting output"))?;

        if input.spend_conditions.coin_address() != utxo.spend_hash {
            return Err(invalid("spend conditions do not match the output's address"));
        }
        if input.spend_conditions.time_lock > height {
            return Err(invalid("output spent before its time lock expired"));
        }
        if input_signatures.contains_key(&input.output_id) {
            return Err(invalid("output spent twice in the same transaction"));
        }

        input_signatures.insert(
            input.output_id,
            InputSignatures {
                remaining_signatures: input.spend_conditions.num_signatures,
                possible_keys: input.spend_conditions.public_keys.clone(),
                used_keys: HashSet::new(),
            },
        );

        input_sum = input_sum
            .checked_add(utxo.value)
            .ok_or_else(|| invalid("input value overflows"))?;
    }

    // 2. Contracts must start no earlier than the current height and run for
    // at least one block.
    for contract in &transaction.file_contracts {
        if contract.start < height {
            return Err(invalid("contract must not start in the past"));
        }
        if contract.end <= contract.start {
            return Err(invalid("contract duration must be at least one block"));
        }
        if contract.challenge_frequency == 0 {
            return Err(invalid("contract challenge frequency must be nonzero"));
        }
    }

    // 3. Storage proofs must reference an open contract whose current window
    // is not yet satisfied, and the proof body must verify against the
    // contract's file commitment.
    for proof in &transaction.storage_proofs {
        let open_contract = consensus
            .open_contracts
            .get(&proof.contract_id)
            .ok_or_else(|| invalid("storage proof references an unknown contract"))?;

        if open_contract.window_satisfied {
            return Err(invalid("storage proof already submitted for this window"));
        }

        let window_start = open_contract.file_contract.window_start(height);
        if !crypto::verify_storage_proof(
            &open_contract.file_contract,
            &open_contract.contract_id,
            window_start,
            proof,
        ) {
            return Err(invalid("storage proof does not match the file commitment"));
        }
    }

    // 4. Value conservation: inputs fund the fees, the outputs, and the new
    // contracts. Storage-proof payouts come from already locked contract
    // funds and do not appear here.
    let mut output_sum: Currency = 0;
    for fee in &transaction.miner_fees {
        output_sum = output_sum
            .checked_add(*fee)
            .ok_or_else(|| invalid("output value overflows"))?;
    }
    for output in &transaction.outputs {
        output_sum = output_sum
            .checked_add(output.value)
            .ok_or_else(|| invalid("output value overflows"))?;
    }
    for contract in &transaction.file_contracts {
        output_sum = output_sum
            .checked_add(contract.contract_fund)
            .ok_or_else(|| invalid("output value overflows"))?;
    }
    if input_sum != output_sum {
        return Err(invalid("inputs do not equal outputs"));
    }

    // 5. Each signature must sign with an unused key of an input that still
    // needs signatures, and at the end no input may be undersigned.
    for (index, signature) in transaction.signatures.iter().enumerate() {
        let entry = input_signatures
            .get_mut(&signature.input_id)
            .ok_or_else(|| invalid("signature references an unknown input"))?;

        if entry.remaining_signatures == 0 {
            return Err(invalid("redundant signature detected"));
        }
        if entry.used_keys.contains(&signature.public_key_index) {
            return Err(invalid("public key used twice while signing"));
        }
        if signature.time_lock > height {
            return Err(invalid("signature time lock has not expired"));
        }

        let key = entry
            .possible_keys
            .get(signature.public_key_index as usize)
            .ok_or_else(|| invalid("signature public key index out of range"))?;
        if !crypto::verify_bytes(&sig_hash(transaction, index), key, &signature.signature) {
            return Err(invalid("invalid signature in transaction"));
        }

        entry.remaining_signatures -= 1;
        entry.used_keys.insert(signature.public_key_index);
    }
    if input_signatures
        .values()
        .any(|entry| entry.remaining_signatures != 0)
    {
        return Err(invalid("input is missing signatures"));
    }

    Ok(())
}

/// Applies a transaction to the consensus state at the given height.
///
/// Inputs move into the spent-output shadow map, new outputs and contracts
/// are inserted under their derived ids, and storage proofs pay out of their
/// contract's remaining funds. The caller has already validated the
/// transaction.
pub(crate) fn apply_transaction(
    consensus: &mut ConsensusState,
    transaction: &Transaction,
    height: Height,
) {
    // Move every consumed output into the shadow map under the same key.
    for input in &transaction.inputs {
        if let Some(output) = consensus.unspent_outputs.remove(&input.output_id) {
            consensus.spent_outputs.insert(input.output_id, output);
        }
    }

    // Insert the new outputs.
    for (index, output) in transaction.outputs.iter().enumerate() {
        consensus
            .unspent_outputs
            .insert(output_id(transaction, index), output.clone());
    }

    // Open the new contracts. The first window is recorded as satisfied:
    // the start height has no boundary before it, so there is nothing to
    // prove yet.
    for (index, contract) in transaction.file_contracts.iter().enumerate() {
        let contract_id = file_contract_id(transaction, index);
        consensus.open_contracts.insert(
            contract_id,
            OpenContract {
                file_contract: contract.clone(),
                contract_id,
                funds_remaining: contract.contract_fund,
                failures: 0,
                window_satisfied: true,
            },
        );
    }

    // Pay out storage proofs from the contracts' locked funds.
    for proof in &transaction.storage_proofs {
        if let Some(open_contract) = consensus.open_contracts.get_mut(&proof.contract_id) {
            let payout = open_contract
                .file_contract
                .valid_proof_payout
                .min(open_contract.funds_remaining);

            consensus.unspent_outputs.insert(
                storage_proof_output_id(&proof.contract_id, height, true),
                Output {
                    value: payout,
                    spend_hash: open_contract.file_contract.valid_proof_address,
                },
            );
            open_contract.funds_remaining -= payout;
            open_contract.window_satisfied = true;
        }
    }
}

/// Removes a transaction from the consensus state, making it as though the
/// transaction had never been applied. Exact inverse of [`apply_transaction`]
/// at the same height.
pub(crate) fn reverse_transaction(
    consensus: &mut ConsensusState,
    transaction: &Transaction,
    height: Height,
) {
    // Remove the created outputs.
    for index in 0..transaction.outputs.len() {
        consensus.unspent_outputs.remove(&output_id(transaction, index));
    }

    // Restore the consumed outputs from the shadow map.
    for input in &transaction.inputs {
        if let Some(output) = consensus.spent_outputs.remove(&input.output_id) {
            consensus.unspent_outputs.insert(input.output_id, output);
        }
    }

    // Take back the storage-proof payouts and reopen their windows.
    for proof in &transaction.storage_proofs {
        let proof_output_id = storage_proof_output_id(&proof.contract_id, height, true);
        if let Some(output) = consensus.unspent_outputs.remove(&proof_output_id) {
            if let Some(open_contract) = consensus.open_contracts.get_mut(&proof.contract_id) {
                open_contract.funds_remaining += output.value;
                open_contract.window_satisfied = false;
            }
        }
    }

    // Delete the contracts the transaction opened.
    for index in 0..transaction.file_contracts.len() {
        consensus
            .open_contracts
            .remove(&file_contract_id(transaction, index));
    }
}
