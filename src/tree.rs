//! The block tree: node bookkeeping, difficulty retargeting, and cumulative
//! depth.
//!
//! Targets and depths are exact rationals so that fork choice is
//! deterministic across platforms.

use num_bigint::BigInt;
use num_rational::BigRational;

use crate::constants::{
    max_adjustment_down, max_adjustment_up, RECENT_TIMESTAMPS_DEPTH, TARGET_SECONDS_PER_BLOCK,
    TARGET_WINDOW,
};
use crate::state::StateInner;
use crate::types::{
    Block, BlockID, BlockWeight, Height, MissedStorageProof, OpenContract, Target, Timestamp,
};

/// A node of the block tree. Created on admission, destroyed only when its
/// subtree is invalidated. The per-node contract-event lists record what
/// happened while the block was applied so that it can be reversed.
#[derive(Debug, Clone)]
pub struct BlockNode {
    pub block: Block,
    pub children: Vec<BlockID>,
    pub height: Height,
    pub target: Target,
    pub depth: BlockWeight,
    pub recent_timestamps: [Timestamp; RECENT_TIMESTAMPS_DEPTH],
    pub contract_terminations: Vec<OpenContract>,
    pub missed_storage_proofs: Vec<MissedStorageProof>,
}

/// The applied block at the given height.
///
/// During retargeting this is also used to find the adjustment ancestor of a
/// side-fork node. That conflates the fork's history with the current path,
/// but the retarget window is vastly longer than any plausible
/// reorganization, so the ancestor is the same block either way.
pub(crate) fn block_at_height(state: &StateInner, height: Height) -> &BlockNode {
    match state
        .consensus
        .current_path
        .get(&height)
        .and_then(|id| state.block_map.get(id))
    {
        Some(node) => node,
        None => &state.block_map[&state.block_root],
    }
}

/// The target a child at `height` with the given timestamp must assign its
/// own children: the parent's target scaled by how fast the last
/// `TARGET_WINDOW` blocks arrived relative to the desired pace, clamped so
/// that timestamp games cannot slew difficulty arbitrarily.
pub(crate) fn child_target(
    state: &StateInner,
    parent: &BlockNode,
    height: Height,
    timestamp: Timestamp,
) -> Target {
    let window = TARGET_WINDOW.min(height);
    let (ancestor_timestamp, expected_time_passed) = if height < TARGET_WINDOW {
        let root = &state.block_map[&state.block_root];
        (root.block.timestamp, TARGET_SECONDS_PER_BLOCK * height)
    } else {
        let ancestor = block_at_height(state, height - TARGET_WINDOW);
        (
            ancestor.block.timestamp,
            TARGET_SECONDS_PER_BLOCK * TARGET_WINDOW,
        )
    };

    // Adjustment = timePassed / (expectedTimePassed * window), exact. A
    // timestamp regression makes this negative; the clamp below handles it.
    let time_passed = timestamp as i128 - ancestor_timestamp as i128;
    let mut adjustment = BigRational::new(
        BigInt::from(time_passed),
        BigInt::from(expected_time_passed as i128 * window as i128),
    );

    if adjustment > max_adjustment_up() {
        adjustment = max_adjustment_up();
    } else if adjustment < max_adjustment_down() {
        adjustment = max_adjustment_down();
    }

    let old_target = BigRational::from_integer(BigInt::from(parent.target.to_biguint()));
    let new_target = (adjustment * old_target).to_integer();
    Target::from_biguint(&new_target.to_biguint().unwrap_or_default())
}

/// The cumulative weight of all blocks up to and including a child of the
/// given parent: the parent's depth plus one inverse parent-target.
pub(crate) fn child_depth(parent: &BlockNode) -> BlockWeight {
    &parent.depth + parent.target.block_weight()
}

/// Creates a child node for the block under the given parent and links it
/// into the tree. No validation is done here.
pub(crate) fn add_block_to_tree(
    state: &mut StateInner,
    parent_id: BlockID,
    block: Block,
) -> BlockID {
    let block_id = block.id();
    let node = {
        let parent = &state.block_map[&parent_id];
        let height = parent.height + 1;

        // Shift the timestamp ring over by one.
        let mut recent_timestamps = [0; RECENT_TIMESTAMPS_DEPTH];
        recent_timestamps[..RECENT_TIMESTAMPS_DEPTH - 1]
            .copy_from_slice(&parent.recent_timestamps[1..]);
        recent_timestamps[RECENT_TIMESTAMPS_DEPTH - 1] = block.timestamp;

        BlockNode {
            height,
            target: child_target(state, parent, height, block.timestamp),
            depth: child_depth(parent),
            recent_timestamps,
            children: Vec::new(),
            contract_terminations: Vec::new(),
            missed_storage_proofs: Vec::new(),
            block,
        }
    };

    state.block_map.insert(block_id, node);
    if let Some(parent) = state.block_map.get_mut(&parent_id) {
        parent.children.push(block_id);
    }
    block_id
}

/// Recursively moves a node and its whole subtree from the block map to the
/// bad-blocks set.
pub(crate) fn invalidate_node(state: &mut StateInner, block_id: BlockID) {
    if let Some(node) = state.block_map.remove(&block_id) {
        state.bad_blocks.insert(block_id);
        for child in node.children {
            invalidate_node(state, child);
        }
    }
}
