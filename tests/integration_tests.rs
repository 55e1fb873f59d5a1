//! End-to-end scenarios driving the engine through its public surface:
//! spending, mempool conflicts, fork choice, and mid-block failure recovery.

mod common;

use common::*;
use storagecoin_consensus::{
    encoding, ConsensusError, Input, Output, SpendConditions, State, Transaction, COIN_INFLATION,
};

#[test]
fn test_single_valid_spend() {
    let (secret_key, public_key) = keypair(1);
    let conditions = single_sig_conditions(&public_key);
    let address_a = conditions.coin_address();
    let address_b = [0xbb; 32];

    let genesis = genesis_block(address_a);
    let state = State::new(genesis.clone());
    let subsidy_id = encoding::subsidy_id(&genesis.id());

    // Send 600 to B and 400 back to A, no fee.
    let spend = signed_spend(
        &secret_key,
        &conditions,
        subsidy_id,
        &[(600, address_b), (400, address_a)],
    );
    state.accept_transaction(spend.clone()).unwrap();

    let block = mine_child(
        &state,
        &genesis.id(),
        genesis.timestamp + 1,
        [0xee; 32],
        vec![spend.clone()],
    );
    state.accept_block(block).unwrap();

    let to_b = state.utxo(&encoding::output_id(&spend, 0)).unwrap();
    assert_eq!(to_b.value, 600);
    assert_eq!(to_b.spend_hash, address_b);

    let to_a = state.utxo(&encoding::output_id(&spend, 1)).unwrap();
    assert_eq!(to_a.value, 400);
    assert_eq!(to_a.spend_hash, address_a);

    // The consumed output sits in the spent-output shadow map.
    let snapshot = state.snapshot();
    assert!(state.utxo(&subsidy_id).is_none());
    assert!(snapshot.spent_outputs.contains_key(&subsidy_id));

    // The transaction left the pool when its block was applied.
    assert!(state.pending_transactions().is_empty());
}

#[test]
fn test_double_spend_rejected_by_mempool() {
    let (secret_key, public_key) = keypair(1);
    let conditions = single_sig_conditions(&public_key);
    let genesis = genesis_block(conditions.coin_address());
    let state = State::new(genesis.clone());
    let subsidy_id = encoding::subsidy_id(&genesis.id());

    let first = signed_spend(&secret_key, &conditions, subsidy_id, &[(COIN_INFLATION, [0xaa; 32])]);
    let second = signed_spend(&secret_key, &conditions, subsidy_id, &[(COIN_INFLATION, [0xbb; 32])]);

    state.accept_transaction(first).unwrap();
    assert!(matches!(
        state.accept_transaction(second),
        Err(ConsensusError::MempoolConflict)
    ));
    assert_eq!(state.pending_transactions().len(), 1);
}

#[test]
fn test_reorg_waits_for_surpass_threshold() {
    let (secret_key, public_key) = keypair(1);
    let conditions = single_sig_conditions(&public_key);
    let genesis = genesis_block(conditions.coin_address());
    let state = State::new(genesis.clone());
    let subsidy_id = encoding::subsidy_id(&genesis.id());

    // The current branch carries a transaction.
    let spend = signed_spend(&secret_key, &conditions, subsidy_id, &[(COIN_INFLATION, [0xaa; 32])]);
    state.accept_transaction(spend.clone()).unwrap();
    let tip = mine_child(
        &state,
        &genesis.id(),
        genesis.timestamp + 1,
        [0x01; 32],
        vec![spend.clone()],
    );
    state.accept_block(tip.clone()).unwrap();
    assert!(state.pending_transactions().is_empty());

    // A rival branch of equal depth does not displace the tip.
    let rival_one = mine_child(&state, &genesis.id(), genesis.timestamp + 1, [0x02; 32], vec![]);
    state.accept_block(rival_one.clone()).unwrap();
    assert_eq!(state.current_block(), tip.id());

    // One more block puts the rival past the surpass threshold.
    let rival_two = mine_child(
        &state,
        &rival_one.id(),
        genesis.timestamp + 2,
        [0x02; 32],
        vec![],
    );
    state.accept_block(rival_two.clone()).unwrap();

    assert_eq!(state.current_block(), rival_two.id());
    assert_eq!(state.height(), 2);

    let snapshot = state.snapshot();
    assert_eq!(snapshot.current_path[&1], rival_one.id());
    assert_eq!(snapshot.current_path[&2], rival_two.id());

    // The losing branch's transaction went back to the pool, and the output
    // it spent is unspent again.
    let pending = state.pending_transactions();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0], spend);
    assert!(state.utxo(&subsidy_id).is_some());
    assert!(state.utxo(&encoding::output_id(&spend, 0)).is_none());

    // The displaced block is still a valid part of the tree.
    assert!(state.contains_block(&tip.id()));
    assert!(!state.is_known_invalid(&tip.id()));
}

#[test]
fn test_invalid_block_rewinds_cleanly() {
    let (secret_key, public_key) = keypair(1);
    let conditions = single_sig_conditions(&public_key);
    let genesis = genesis_block(conditions.coin_address());
    let state = State::new(genesis.clone());
    let subsidy_id = encoding::subsidy_id(&genesis.id());

    let good = signed_spend(&secret_key, &conditions, subsidy_id, &[(COIN_INFLATION, [0xaa; 32])]);
    state.accept_transaction(good.clone()).unwrap();

    // The final transaction spends an output that does not exist.
    let bad = Transaction {
        inputs: vec![Input {
            output_id: [0xdd; 32],
            spend_conditions: SpendConditions::default(),
        }],
        ..Default::default()
    };

    let before = state.snapshot();
    let block = mine_child(
        &state,
        &genesis.id(),
        genesis.timestamp + 1,
        [0x01; 32],
        vec![good, bad],
    );
    let block_id = block.id();

    assert!(matches!(
        state.accept_block(block),
        Err(ConsensusError::InvalidTransaction(_))
    ));

    // The consensus state, including the pool, matches the pre-acceptance
    // snapshot, and the block is remembered as bad.
    assert_eq!(state.snapshot(), before);
    assert!(state.is_known_invalid(&block_id));
    assert!(!state.contains_block(&block_id));
    assert_eq!(state.height(), 0);
}

#[test]
fn test_block_subsidy_collects_fees() {
    let (secret_key, public_key) = keypair(1);
    let conditions = single_sig_conditions(&public_key);
    let genesis = genesis_block(conditions.coin_address());
    let state = State::new(genesis.clone());
    let subsidy_id = encoding::subsidy_id(&genesis.id());

    // Spend 1000: 990 to an address, 10 as a miner fee.
    let mut spend = Transaction {
        inputs: vec![Input {
            output_id: subsidy_id,
            spend_conditions: conditions,
        }],
        miner_fees: vec![10],
        outputs: vec![Output {
            value: COIN_INFLATION - 10,
            spend_hash: [0xaa; 32],
        }],
        ..Default::default()
    };
    sign_input(&mut spend, subsidy_id, 0, &secret_key);

    let block = mine_child(
        &state,
        &genesis.id(),
        genesis.timestamp + 1,
        [0x01; 32],
        vec![spend],
    );
    let block_id = block.id();
    state.accept_block(block).unwrap();

    let subsidy = state.utxo(&encoding::subsidy_id(&block_id)).unwrap();
    assert_eq!(subsidy.value, COIN_INFLATION + 10);
    assert_eq!(subsidy.spend_hash, [0x01; 32]);
}
