//! Helpers shared by the integration tests: deterministic keys, signing,
//! and mining against a live state.
#![allow(dead_code)]

use std::time::{SystemTime, UNIX_EPOCH};

use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};

use storagecoin_consensus::encoding::sig_hash;
use storagecoin_consensus::{
    crypto, Block, BlockID, Currency, Hash, Input, Output, OutputID, SpendConditions, State,
    Timestamp, Transaction, TransactionSignature,
};

/// A deterministic keypair; `seed` must be nonzero.
pub fn keypair(seed: u8) -> (SecretKey, Vec<u8>) {
    let secp = Secp256k1::new();
    let secret_key = SecretKey::from_slice(&[seed; 32]).expect("static test key");
    let public_key = PublicKey::from_secret_key(&secp, &secret_key);
    (secret_key, public_key.serialize().to_vec())
}

pub fn single_sig_conditions(public_key: &[u8]) -> SpendConditions {
    SpendConditions {
        time_lock: 0,
        num_signatures: 1,
        public_keys: vec![public_key.to_vec()],
    }
}

/// Appends a signature authorizing the given input, signing the transaction
/// body as it currently stands.
pub fn sign_input(
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

/// A transaction spending one output to the given (value, address) pairs.
pub fn signed_spend(
    secret_key: &SecretKey,
    conditions: &SpendConditions,
    output_id: OutputID,
    outputs: &[(Currency, Hash)],
) -> Transaction {
    let mut transaction = Transaction {
        inputs: vec![Input {
            output_id,
            spend_conditions: conditions.clone(),
        }],
        outputs: outputs
            .iter()
            .map(|(value, spend_hash)| Output {
                value: *value,
                spend_hash: *spend_hash,
            })
            .collect(),
        ..Default::default()
    };
    sign_input(&mut transaction, output_id, 0, secret_key);
    transaction
}

/// A genesis block timestamped slightly in the past so that descendants
/// never trip the future-skew check.
pub fn genesis_block(miner_address: Hash) -> Block {
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

/// Mines a child of the given block, grinding the nonce until the id meets
/// the parent's target.
pub fn mine_child(
    state: &State,
    parent_id: &BlockID,
    timestamp: Timestamp,
    miner_address: Hash,
    transactions: Vec<Transaction>,
) -> Block {
    let target = state.block_target(parent_id).expect("parent is in the tree");
    let mut block = Block {
        parent_block: *parent_id,
        timestamp,
        nonce: 0,
        miner_address,
        merkle_root: [0; 32],
        transactions,
    };
    block.merkle_root = block.expected_transaction_merkle_root();
    while !target.met_by(&block.id()) {
        block.nonce += 1;
    }
    block
}

/// Mines and accepts empty blocks on the current tip until the state reaches
/// the given height.
pub fn mine_to_height(state: &State, genesis_timestamp: Timestamp, height: u64) {
    while state.height() < height {
        let next_height = state.height() + 1;
        let block = mine_child(
            state,
            &state.current_block(),
            genesis_timestamp + next_height,
            [0xee; 32],
            vec![],
        );
        state.accept_block(block).expect("empty block extends the tip");
    }
}
