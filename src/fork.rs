//! Heaviest-branch selection and the reorganization procedure.

use tracing::{info, warn};

use crate::block::{integrate_block, rewind_a_block};
use crate::constants::surpass_threshold;
use crate::error::{ConsensusError, Result};
use crate::state::StateInner;
use crate::tree::invalidate_node;
use crate::types::BlockID;

/// Returns true if the node's branch is heavy enough to reorganize to:
/// its depth must exceed the current depth by at least the surpass
/// threshold's worth of current block weight. Ties and smaller leads stay
/// on the current branch, preventing thrash between near-equal forks.
pub(crate) fn heavier_fork(state: &StateInner, new_node_id: &BlockID) -> bool {
    let current = state.current_block_node();
    let threshold = surpass_threshold() * current.target.block_weight();
    let required_depth = &current.depth + threshold;
    state.block_map[new_node_id].depth >= required_depth
}

/// Switches the consensus state from the current branch to the branch ending
/// in the given node, rewinding and integrating blocks as needed.
///
/// If a block of the new branch fails to integrate, its subtree is
/// invalidated and the original branch is restored; a failure while
/// restoring contradicts the apply/reverse invariant and poisons the engine.
pub(crate) fn fork_blockchain(state: &mut StateInner, new_node_id: BlockID) -> Result<()> {
    // Walk from the new node back to the first ancestor that sits on the
    // current path, recording the branch above it, newest first.
    let mut parent_history: Vec<BlockID> = Vec::new();
    let mut ancestor_id = new_node_id;
    loop {
        let node = &state.block_map[&ancestor_id];
        if state.consensus.current_path.get(&node.height) == Some(&ancestor_id) {
            break;
        }
        parent_history.push(ancestor_id);
        ancestor_id = node.block.parent_block;
    }

    // Rewind the current branch down to that ancestor.
    let mut rewound_blocks: Vec<BlockID> = Vec::new();
    while state.consensus.current_block != ancestor_id {
        rewound_blocks.push(state.consensus.current_block);
        rewind_a_block(state);
    }

    // Integrate the new branch, oldest first.
    let mut integrated = 0;
    for index in (0..parent_history.len()).rev() {
        let block_id = parent_history[index];
        if let Err(err) = integrate_block(state, block_id) {
            warn!(error = %err, "fork contains an invalid block; restoring the original branch");
            invalidate_node(state, block_id);

            for _ in 0..integrated {
                rewind_a_block(state);
            }
            for rewound_id in rewound_blocks.iter().rev() {
                if integrate_block(state, *rewound_id).is_err() {
                    return Err(ConsensusError::InternalInvariant(
                        "a previously applied block failed to re-apply".to_string(),
                    ));
                }
            }
            return Err(err);
        }
        integrated += 1;
    }

    info!(
        height = state.height(),
        blocks_rewound = rewound_blocks.len(),
        blocks_applied = parent_history.len(),
        "switched to a heavier fork"
    );
    Ok(())
}
