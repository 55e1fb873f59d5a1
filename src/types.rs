//! Core types of the consensus engine.

use num_bigint::{BigInt, BigUint};
use num_rational::BigRational;
use num_traits::One;
use serde::{Deserialize, Serialize};

use crate::crypto;
use crate::encoding;

/// Hash type: 256-bit digest.
pub type Hash = [u8; 32];

/// Block identifier: the hash of the block's canonical encoding.
pub type BlockID = Hash;

/// Output identifier, derived from the creating transaction or contract event.
pub type OutputID = Hash;

/// Contract identifier, derived from the creating transaction.
pub type ContractID = Hash;

/// Transaction identifier: the hash of the transaction's canonical encoding.
pub type TransactionID = Hash;

/// Coin amount. Summation is always checked; overflow is a validation error.
pub type Currency = u64;

/// Seconds since the Unix epoch.
pub type Timestamp = u64;

/// Block height.
pub type Height = u64;

/// Opaque public key bytes (33-byte compressed secp256k1 on the wire).
pub type PublicKey = Vec<u8>;

/// Opaque signature bytes (64-byte compact ECDSA on the wire).
pub type SignatureBytes = Vec<u8>;

/// Cumulative work metric: an exact rational, the summed inverse targets from
/// genesis to a node. Floating point is prohibited on this path.
pub type BlockWeight = BigRational;

/// PoW difficulty: an upper bound on a block id, interpreted as a big-endian
/// 256-bit integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target(pub Hash);

impl Target {
    /// Returns true if the block id meets the target, i.e. `id <= target`
    /// as big-endian integers.
    pub fn met_by(&self, id: &BlockID) -> bool {
        *id <= self.0
    }

    pub fn to_biguint(&self) -> BigUint {
        BigUint::from_bytes_be(&self.0)
    }

    /// Re-encodes an integer as a fixed-width target with left-zero padding.
    /// Values wider than 32 bytes saturate to the maximum target; zero is
    /// floored to one so that inverse-target weights stay defined.
    pub fn from_biguint(value: &BigUint) -> Target {
        let bytes = value.to_bytes_be();
        if bytes.len() > 32 {
            return Target([0xff; 32]);
        }
        let mut target = [0u8; 32];
        target[32 - bytes.len()..].copy_from_slice(&bytes);
        if target == [0u8; 32] {
            target[31] = 1;
        }
        Target(target)
    }

    /// The weight a child of a node with this target contributes: 1/target.
    pub fn block_weight(&self) -> BlockWeight {
        BigRational::new(BigInt::one(), BigInt::from(self.to_biguint()))
    }
}

/// Unlock policy for an output. The hash of the canonical encoding of these
/// conditions is the coin address an output is locked to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpendConditions {
    pub time_lock: Height,
    pub num_signatures: u64,
    pub public_keys: Vec<PublicKey>,
}

impl SpendConditions {
    /// The coin address these conditions hash to.
    pub fn coin_address(&self) -> Hash {
        crypto::hash_bytes(&encoding::encode_spend_conditions(self))
    }
}

/// A coin: a value locked to a spend-conditions hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    pub value: Currency,
    pub spend_hash: Hash,
}

/// Consumes an unspent output by revealing the preimage of its spend hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Input {
    pub output_id: OutputID,
    pub spend_conditions: SpendConditions,
}

/// A storage agreement. Funds are locked up front and paid out window by
/// window as proofs succeed or fail, with the remainder released when the
/// contract terminates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileContract {
    pub contract_fund: Currency,
    pub file_merkle_root: Hash,
    pub file_size: u64,
    pub start: Height,
    pub end: Height,
    pub challenge_frequency: Height,
    pub tolerance: u64,
    pub valid_proof_payout: Currency,
    pub valid_proof_address: Hash,
    pub missed_proof_payout: Currency,
    pub missed_proof_address: Hash,
}

impl FileContract {
    /// The start height of the proof window containing `height`.
    ///
    /// Windows are the intervals `[start + k*frequency, start + (k+1)*frequency)`.
    pub fn window_start(&self, height: Height) -> Height {
        let elapsed = height.saturating_sub(self.start);
        self.start + (elapsed / self.challenge_frequency) * self.challenge_frequency
    }
}

/// A claim of storage for the current proof window: the challenged segment
/// and its Merkle path up to the contract's file commitment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageProof {
    pub contract_id: ContractID,
    pub segment: Vec<u8>,
    pub hash_set: Vec<Hash>,
}

/// One contribution to the authorization of an input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSignature {
    pub input_id: OutputID,
    pub public_key_index: u64,
    pub time_lock: Height,
    pub signature: SignatureBytes,
}

/// An atomic state transition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub inputs: Vec<Input>,
    pub miner_fees: Vec<Currency>,
    pub outputs: Vec<Output>,
    pub file_contracts: Vec<FileContract>,
    pub storage_proofs: Vec<StorageProof>,
    pub signatures: Vec<TransactionSignature>,
}

impl Transaction {
    pub fn id(&self) -> TransactionID {
        encoding::transaction_id(self)
    }
}

/// The unit of consensus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub parent_block: BlockID,
    pub timestamp: Timestamp,
    pub nonce: u64,
    pub miner_address: Hash,
    pub merkle_root: Hash,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn id(&self) -> BlockID {
        encoding::block_id(self)
    }

    /// The Merkle root over the hashes of the canonical transaction
    /// encodings, in block order.
    pub fn expected_transaction_merkle_root(&self) -> Hash {
        let hashes: Vec<Hash> = self
            .transactions
            .iter()
            .map(|t| crypto::hash_bytes(&encoding::encode_transaction(t)))
            .collect();
        crypto::merkle_root(&hashes)
    }
}

/// A live contract tracked by the consensus state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenContract {
    pub file_contract: FileContract,
    pub contract_id: ContractID,
    pub funds_remaining: Currency,
    pub failures: u64,
    pub window_satisfied: bool,
}

/// Record of a missed proof window, kept on the block node that observed it
/// so that the payout can be reversed during a reorganization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissedStorageProof {
    pub output_id: OutputID,
    pub contract_id: ContractID,
}
