//! Canonical byte encoding of consensus entities and the identifiers derived
//! from it.
//!
//! Every identifier in the system (block ids, output ids, contract ids,
//! Merkle leaves, sighashes) is a digest over this encoding, so any change to
//! it is a hard fork. Integers are fixed-width little-endian; variable-length
//! fields carry a length prefix; derived ids are domain-separated with a tag.

use crate::crypto::hash_bytes;
use crate::types::{
    Block, BlockID, ContractID, FileContract, Hash, Height, Input, Output, OutputID,
    SpendConditions, StorageProof, Transaction, TransactionID, TransactionSignature,
};

fn append_u64(bytes: &mut Vec<u8>, value: u64) {
    bytes.extend_from_slice(&value.to_le_bytes());
}

fn append_bytes(bytes: &mut Vec<u8>, field: &[u8]) {
    append_u64(bytes, field.len() as u64);
    bytes.extend_from_slice(field);
}

pub fn encode_spend_conditions(conditions: &SpendConditions) -> Vec<u8> {
    let mut bytes = Vec::new();
    append_u64(&mut bytes, conditions.time_lock);
    append_u64(&mut bytes, conditions.num_signatures);
    append_u64(&mut bytes, conditions.public_keys.len() as u64);
    for key in &conditions.public_keys {
        append_bytes(&mut bytes, key);
    }
    bytes
}

fn encode_output(bytes: &mut Vec<u8>, output: &Output) {
    append_u64(bytes, output.value);
    bytes.extend_from_slice(&output.spend_hash);
}

fn encode_input(bytes: &mut Vec<u8>, input: &Input) {
    bytes.extend_from_slice(&input.output_id);
    append_bytes(bytes, &encode_spend_conditions(&input.spend_conditions));
}

fn encode_file_contract(bytes: &mut Vec<u8>, contract: &FileContract) {
    append_u64(bytes, contract.contract_fund);
    bytes.extend_from_slice(&contract.file_merkle_root);
    append_u64(bytes, contract.file_size);
    append_u64(bytes, contract.start);
    append_u64(bytes, contract.end);
    append_u64(bytes, contract.challenge_frequency);
    append_u64(bytes, contract.tolerance);
    append_u64(bytes, contract.valid_proof_payout);
    bytes.extend_from_slice(&contract.valid_proof_address);
    append_u64(bytes, contract.missed_proof_payout);
    bytes.extend_from_slice(&contract.missed_proof_address);
}

fn encode_storage_proof(bytes: &mut Vec<u8>, proof: &StorageProof) {
    bytes.extend_from_slice(&proof.contract_id);
    append_bytes(bytes, &proof.segment);
    append_u64(bytes, proof.hash_set.len() as u64);
    for hash in &proof.hash_set {
        bytes.extend_from_slice(hash);
    }
}

fn encode_signature(bytes: &mut Vec<u8>, signature: &TransactionSignature) {
    bytes.extend_from_slice(&signature.input_id);
    append_u64(bytes, signature.public_key_index);
    append_u64(bytes, signature.time_lock);
    append_bytes(bytes, &signature.signature);
}

/// The transaction body: every field except the signatures. This is the
/// message that transaction signatures commit to.
fn encode_transaction_body(transaction: &Transaction) -> Vec<u8> {
    let mut bytes = Vec::new();
    append_u64(&mut bytes, transaction.inputs.len() as u64);
    for input in &transaction.inputs {
        encode_input(&mut bytes, input);
    }
    append_u64(&mut bytes, transaction.miner_fees.len() as u64);
    for fee in &transaction.miner_fees {
        append_u64(&mut bytes, *fee);
    }
    append_u64(&mut bytes, transaction.outputs.len() as u64);
    for output in &transaction.outputs {
        encode_output(&mut bytes, output);
    }
    append_u64(&mut bytes, transaction.file_contracts.len() as u64);
    for contract in &transaction.file_contracts {
        encode_file_contract(&mut bytes, contract);
    }
    append_u64(&mut bytes, transaction.storage_proofs.len() as u64);
    for proof in &transaction.storage_proofs {
        encode_storage_proof(&mut bytes, proof);
    }
    bytes
}

pub fn encode_transaction(transaction: &Transaction) -> Vec<u8> {
    let mut bytes = encode_transaction_body(transaction);
    append_u64(&mut bytes, transaction.signatures.len() as u64);
    for signature in &transaction.signatures {
        encode_signature(&mut bytes, signature);
    }
    bytes
}

pub fn encode_block(block: &Block) -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&block.parent_block);
    append_u64(&mut bytes, block.timestamp);
    append_u64(&mut bytes, block.nonce);
    bytes.extend_from_slice(&block.miner_address);
    bytes.extend_from_slice(&block.merkle_root);
    append_u64(&mut bytes, block.transactions.len() as u64);
    for transaction in &block.transactions {
        bytes.extend_from_slice(&encode_transaction(transaction));
    }
    bytes
}

fn tagged_hash(tag: &[u8], bytes: &[u8]) -> Hash {
    let mut preimage = Vec::with_capacity(tag.len() + bytes.len());
    preimage.extend_from_slice(tag);
    preimage.extend_from_slice(bytes);
    hash_bytes(&preimage)
}

pub fn block_id(block: &Block) -> BlockID {
    hash_bytes(&encode_block(block))
}

pub fn transaction_id(transaction: &Transaction) -> TransactionID {
    hash_bytes(&encode_transaction(transaction))
}

/// Id of the i'th output created by a transaction.
pub fn output_id(transaction: &Transaction, index: usize) -> OutputID {
    let mut bytes = encode_transaction(transaction);
    append_u64(&mut bytes, index as u64);
    tagged_hash(b"coin output", &bytes)
}

/// Id of the i'th file contract created by a transaction.
pub fn file_contract_id(transaction: &Transaction, index: usize) -> ContractID {
    let mut bytes = encode_transaction(transaction);
    append_u64(&mut bytes, index as u64);
    tagged_hash(b"file contract", &bytes)
}

/// Id of the output paying out a proof window, valid or missed.
pub fn storage_proof_output_id(
    contract_id: &ContractID,
    height: Height,
    proof_valid: bool,
) -> OutputID {
    let mut bytes = Vec::with_capacity(41);
    bytes.extend_from_slice(contract_id);
    append_u64(&mut bytes, height);
    bytes.push(proof_valid as u8);
    tagged_hash(b"storage proof output", &bytes)
}

/// Id of the output releasing a terminated contract's remaining funds.
pub fn contract_termination_output_id(contract_id: &ContractID) -> OutputID {
    tagged_hash(b"contract termination", contract_id)
}

/// Id of a block's miner-subsidy output.
pub fn subsidy_id(block_id: &BlockID) -> OutputID {
    tagged_hash(b"miner subsidy", block_id)
}

/// The digest signed by the i'th signature of a transaction: the transaction
/// body plus the signature's own covered fields. Signature bytes themselves
/// are never part of the digest.
pub fn sig_hash(transaction: &Transaction, index: usize) -> Hash {
    let mut bytes = encode_transaction_body(transaction);
    if let Some(signature) = transaction.signatures.get(index) {
        bytes.extend_from_slice(&signature.input_id);
        append_u64(&mut bytes, signature.public_key_index);
        append_u64(&mut bytes, signature.time_lock);
    }
    hash_bytes(&bytes)
}
