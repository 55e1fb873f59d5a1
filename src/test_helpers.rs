//! Shared fixtures for unit tests: deterministic keys, signing, and block
//! construction against a live state.

use std::time::{SystemTime, UNIX_EPOCH};

use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};

use crate::crypto;
use crate::encoding::sig_hash;
use crate::state::State;
use crate::types::{
    Block, BlockID, Currency, Hash, Input, Output, OutputID, SpendConditions, Timestamp,
    Transaction, TransactionSignature,
};

/// A deterministic keypair; `seed` must be nonzero.
pub(crate) fn keypair(seed: u8) -> (SecretKey, Vec<u8>) {
    let secp = Secp256k1::new();
    let secret_key = SecretKey::from_slice(&[seed; 32]).expect("static test key");
    let public_key = PublicKey::from_secret_key(&secp, &secret_key);
    (secret_key, public_key.serialize().to_vec())
}

pub(crate) fn single_sig_conditions(public_key: &[u8]) -> SpendConditions {
    SpendConditions {
        time_lock: 0,
        num_signatures: 1,
        public_keys: vec![public_key.to_vec()],
    }
}

/// Appends a signature authorizing the given input, signing the transaction
/// body as it currently stands.
pub(crate) fn sign_input(
    transaction: &mut Transaction,
    input_id: OutputID,
    public_key_index: u64,
    secret_key: &SecretKey,
) {
    let secp = Secp256k1::new();
    transaction.signatures.push(TransactionSignature {
        input_id,
        public_key_index,
        time_lock: 0,
        signature: Vec::new(),
    });
    let index = transaction.signatures.len() - 1;

    let digest = sig_hash(transaction, index);
    let message = Message::from_digest_slice(&digest).expect("32-byte digest");
    transaction.signatures[index].signature =
        secp.sign_ecdsa(&message, secret_key).serialize_compact().to_vec();
}

/// A transaction spending one output entirely to a single address.
pub(crate) fn signed_spend(
    secret_key: &SecretKey,
    conditions: &SpendConditions,
    output_id: OutputID,
    value: Currency,
    to: Hash,
) -> Transaction {
    let mut transaction = Transaction {
        inputs: vec![Input {
            output_id,
            spend_conditions: conditions.clone(),
        }],
        outputs: vec![Output {
            value,
            spend_hash: to,
        }],
        ..Default::default()
    };
    sign_input(&mut transaction, output_id, 0, secret_key);
    transaction
}

/// A genesis block timestamped slightly in the past so that descendants
/// never trip the future-skew check.
pub(crate) fn genesis_block(miner_address: Hash) -> Block {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
        - 600;
    Block {
        parent_block: [0; 32],
        timestamp,
        nonce: 0,
        miner_address,
        merkle_root: crypto::merkle_root(&[]),
        transactions: vec![],
    }
}

/// A child block with a correct Merkle root but no work behind it.
pub(crate) fn unchecked_child(
    parent_id: BlockID,
    timestamp: Timestamp,
    miner_address: Hash,
    transactions: Vec<Transaction>,
) -> Block {
    let mut block = Block {
        parent_block: parent_id,
        timestamp,
        nonce: 0,
        miner_address,
        merkle_root: [0; 32],
        transactions,
    };
    block.merkle_root = block.expected_transaction_merkle_root();
    block
}

/// Mines a child of the given block, grinding the nonce until the id meets
/// the parent's target.
pub(crate) fn mine_child(
    state: &State,
    parent_id: &BlockID,
    timestamp: Timestamp,
    miner_address: Hash,
    transactions: Vec<Transaction>,
) -> Block {
    let target = state.block_target(parent_id).expect("parent is in the tree");
    let mut block = unchecked_child(*parent_id, timestamp, miner_address, transactions);
    while !target.met_by(&block.id()) {
        block.nonce += 1;
    }
    block
}
