//! Consensus constants. All of these are fixed at build time; changing any
//! of them is a hard fork.

use num_bigint::BigInt;
use num_rational::BigRational;

use crate::types::{Currency, Height, Target, Timestamp};

/// Maximum allowed clock skew into the future. Blocks further ahead are held
/// for later reconsideration rather than rejected permanently.
pub const FUTURE_THRESHOLD: Timestamp = 3 * 60 * 60;

/// Number of blocks the difficulty retarget looks back over.
pub const TARGET_WINDOW: Height = 5_000;

/// Desired block interval: 10 minutes.
pub const TARGET_SECONDS_PER_BLOCK: Timestamp = 600;

/// Fixed per-block issuance added to the miner subsidy.
pub const COIN_INFLATION: Currency = 1_000;

/// Size of the rolling window of applied timestamps used for the
/// past-median check.
pub const RECENT_TIMESTAMPS_DEPTH: usize = 11;

/// Storage-proof leaf size in bytes. The final segment of a file may be
/// shorter.
pub const SEGMENT_SIZE: usize = 64;

/// Target assigned to the genesis block.
pub const ROOT_TARGET: Target = Target(root_target_bytes());

const fn root_target_bytes() -> [u8; 32] {
    let mut bytes = [0u8; 32];
    bytes[0] = 0x20;
    bytes
}

/// Upper clamp on the retarget adjustment factor.
pub fn max_adjustment_up() -> BigRational {
    BigRational::new(BigInt::from(1_001), BigInt::from(1_000))
}

/// Lower clamp on the retarget adjustment factor.
pub fn max_adjustment_down() -> BigRational {
    BigRational::new(BigInt::from(999), BigInt::from(1_000))
}

/// Multiplicative margin by which a competing fork must exceed the current
/// depth before the engine reorganizes to it.
pub fn surpass_threshold() -> BigRational {
    BigRational::new(BigInt::from(1), BigInt::from(20))
}
