//! The engine state: the block tree, the derived consensus indices, and the
//! two externally visible operations.
//!
//! The engine is a single logical actor. One exclusive lock guards all of it;
//! every public operation takes the lock for its entire body and nothing
//! inside the critical section suspends on I/O.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::{SystemTime, UNIX_EPOCH};

use num_traits::Zero;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::block;
use crate::constants::{COIN_INFLATION, FUTURE_THRESHOLD, RECENT_TIMESTAMPS_DEPTH, ROOT_TARGET};
use crate::encoding;
use crate::error::{ConsensusError, Result};
use crate::fork;
use crate::mempool;
use crate::transaction;
use crate::tree::{self, BlockNode};
use crate::types::{
    Block, BlockID, BlockWeight, ContractID, Height, OpenContract, Output, OutputID, Target,
    Timestamp, Transaction, TransactionID,
};

/// The derived view of the currently applied branch. Everything in here is
/// recomputable by replaying blocks from genesis; the engine keeps it
/// incrementally consistent instead.
///
/// `spent_outputs` shadows every output consumed on the current branch so
/// that block application can be reversed exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusState {
    pub unspent_outputs: HashMap<OutputID, Output>,
    pub spent_outputs: HashMap<OutputID, Output>,
    pub open_contracts: HashMap<ContractID, OpenContract>,
    pub current_block: BlockID,
    pub current_path: HashMap<Height, BlockID>,
    /// Reserved inputs: each consumed output id maps to the pending
    /// transaction reserving it.
    pub transaction_pool: HashMap<OutputID, TransactionID>,
    /// Canonical pending transactions, keyed by content hash.
    pub transaction_list: HashMap<TransactionID, Transaction>,
}

pub(crate) struct StateInner {
    pub block_root: BlockID,
    pub block_map: HashMap<BlockID, BlockNode>,
    pub bad_blocks: HashSet<BlockID>,
    /// Blocks whose parent has not been observed, keyed by the missing
    /// parent id. Re-evaluated whenever a new block enters the tree.
    pub orphan_pool: HashMap<BlockID, Vec<Block>>,
    /// Blocks rejected for excessive future skew, keyed by timestamp.
    /// Re-evaluated from `retry_future_blocks`.
    pub future_pool: BTreeMap<Timestamp, Vec<Block>>,
    pub consensus: ConsensusState,
}

impl StateInner {
    pub(crate) fn height(&self) -> Height {
        self.block_map[&self.consensus.current_block].height
    }

    pub(crate) fn current_block_node(&self) -> &BlockNode {
        &self.block_map[&self.consensus.current_block]
    }

    fn accept_transaction(&mut self, transaction: Transaction) -> Result<()> {
        // Check for a conflict with the transaction pool before validating.
        if mempool::pool_conflict(&self.consensus, &transaction) {
            return Err(ConsensusError::MempoolConflict);
        }

        transaction::valid_transaction(&self.consensus, &transaction, self.height())?;

        mempool::add_transaction_to_pool(&mut self.consensus, &transaction);
        debug!("accepted transaction into the pool");
        Ok(())
    }

    fn accept_block(&mut self, block: Block, now: Timestamp) -> Result<()> {
        let id = block.id();

        // 1. Reject anything already cached in the state's maps.
        if self.bad_blocks.contains(&id) || self.block_map.contains_key(&id) {
            return Err(ConsensusError::AlreadyKnown);
        }

        // 2. Hold orphans until their parent shows up.
        let parent_id = block.parent_block;
        if !self.block_map.contains_key(&parent_id) {
            let pending = self.orphan_pool.entry(parent_id).or_default();
            if !pending.iter().any(|held| held.id() == id) {
                pending.push(block);
            }
            debug!("holding orphan block until its parent is seen");
            return Err(ConsensusError::OrphanBlock);
        }

        // 3. Validate the header against the parent node.
        let header_check = block::validate_header(&self.block_map[&parent_id], &block, now);
        match header_check {
            Err(ConsensusError::FutureBlock) => {
                let pending = self.future_pool.entry(block.timestamp).or_default();
                if !pending.iter().any(|held| held.id() == id) {
                    pending.push(block);
                }
                debug!("holding block with a future timestamp");
                return Err(ConsensusError::FutureBlock);
            }
            Err(err) => {
                self.bad_blocks.insert(id);
                return Err(err);
            }
            Ok(()) => {}
        }

        // 4. Insert the node, then 5. switch forks if it is heavy enough.
        let node_id = tree::add_block_to_tree(self, parent_id, block);
        let result = if fork::heavier_fork(self, &node_id) {
            fork::fork_blockchain(self, node_id)
        } else {
            Ok(())
        };

        // Adopt any orphans that were waiting on this block.
        if self.block_map.contains_key(&node_id) {
            if let Some(orphans) = self.orphan_pool.remove(&node_id) {
                for orphan in orphans {
                    if let Err(err) = self.accept_block(orphan, now) {
                        debug!(error = %err, "held orphan block was not accepted");
                    }
                }
            }
        }

        result
    }

    fn retry_future_blocks(&mut self, now: Timestamp) -> usize {
        let horizon = now.saturating_add(FUTURE_THRESHOLD);
        let ready: Vec<Timestamp> = self
            .future_pool
            .range(..=horizon)
            .map(|(timestamp, _)| *timestamp)
            .collect();

        let mut accepted = 0;
        for timestamp in ready {
            for block in self.future_pool.remove(&timestamp).unwrap_or_default() {
                match self.accept_block(block, now) {
                    Ok(()) => accepted += 1,
                    Err(err) => debug!(error = %err, "held future block was not accepted"),
                }
            }
        }
        accepted
    }
}

/// The consensus engine. All public operations are thread safe and may be
/// called concurrently.
pub struct State {
    inner: Mutex<StateInner>,
}

impl State {
    /// Creates the engine around a genesis block. The root node receives the
    /// build-time root target, zero depth, and a timestamp window filled with
    /// the genesis timestamp. The genesis subsidy is issued to the genesis
    /// block's miner address.
    pub fn new(genesis: Block) -> State {
        let genesis_id = genesis.id();

        let mut block_map = HashMap::new();
        block_map.insert(
            genesis_id,
            BlockNode {
                height: 0,
                target: ROOT_TARGET,
                depth: BlockWeight::zero(),
                recent_timestamps: [genesis.timestamp; RECENT_TIMESTAMPS_DEPTH],
                children: Vec::new(),
                contract_terminations: Vec::new(),
                missed_storage_proofs: Vec::new(),
                block: genesis.clone(),
            },
        );

        let mut unspent_outputs = HashMap::new();
        unspent_outputs.insert(
            encoding::subsidy_id(&genesis_id),
            Output {
                value: COIN_INFLATION,
                spend_hash: genesis.miner_address,
            },
        );

        let mut current_path = HashMap::new();
        current_path.insert(0, genesis_id);

        State {
            inner: Mutex::new(StateInner {
                block_root: genesis_id,
                block_map,
                bad_blocks: HashSet::new(),
                orphan_pool: HashMap::new(),
                future_pool: BTreeMap::new(),
                consensus: ConsensusState {
                    unspent_outputs,
                    spent_outputs: HashMap::new(),
                    open_contracts: HashMap::new(),
                    current_block: genesis_id,
                    current_path,
                    transaction_pool: HashMap::new(),
                    transaction_list: HashMap::new(),
                },
            }),
        }
    }

    /// Validates a transaction against the current state and admits it to
    /// the transaction pool.
    pub fn accept_transaction(&self, transaction: Transaction) -> Result<()> {
        self.inner.lock().accept_transaction(transaction)
    }

    /// Adds a block to the block tree, switching forks if the block's branch
    /// is heavy enough. Orphans and future-dated blocks are held for later
    /// reconsideration.
    pub fn accept_block(&self, block: Block) -> Result<()> {
        self.inner.lock().accept_block(block, unix_now())
    }

    /// Re-evaluates blocks that were previously held for excessive future
    /// skew. Callers drive this from a timer. Returns the number of held
    /// blocks that entered the tree.
    pub fn retry_future_blocks(&self) -> usize {
        self.inner.lock().retry_future_blocks(unix_now())
    }

    pub fn height(&self) -> Height {
        self.inner.lock().height()
    }

    pub fn current_block(&self) -> BlockID {
        self.inner.lock().consensus.current_block
    }

    /// The target a child of the given block must meet.
    pub fn block_target(&self, id: &BlockID) -> Option<Target> {
        self.inner.lock().block_map.get(id).map(|node| node.target)
    }

    pub fn contains_block(&self, id: &BlockID) -> bool {
        self.inner.lock().block_map.contains_key(id)
    }

    pub fn is_known_invalid(&self, id: &BlockID) -> bool {
        self.inner.lock().bad_blocks.contains(id)
    }

    pub fn utxo(&self, id: &OutputID) -> Option<Output> {
        self.inner.lock().consensus.unspent_outputs.get(id).cloned()
    }

    pub fn open_contract(&self, id: &ContractID) -> Option<OpenContract> {
        self.inner.lock().consensus.open_contracts.get(id).cloned()
    }

    pub fn pending_transactions(&self) -> Vec<Transaction> {
        self.inner
            .lock()
            .consensus
            .transaction_list
            .values()
            .cloned()
            .collect()
    }

    /// A consistent copy of the derived consensus indices, suitable for
    /// persistence or external inspection.
    pub fn snapshot(&self) -> ConsensusState {
        self.inner.lock().consensus.clone()
    }
}

#[cfg(test)]
impl State {
    pub(crate) fn inner_for_tests(&self) -> parking_lot::MutexGuard<'_, StateInner> {
        self.inner.lock()
    }
}

fn unix_now() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}
