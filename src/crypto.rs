//! Cryptographic primitives consumed by the engine: hashing, Merkle roots,
//! ECDSA verification, and storage-proof verification. Everything here is a
//! pure function.

use secp256k1::ecdsa::Signature;
use secp256k1::{Message, PublicKey, Secp256k1};
use sha2::{Digest, Sha256};

use crate::constants::SEGMENT_SIZE;
use crate::types::{ContractID, FileContract, Hash, Height, StorageProof};

/// SHA-256 digest of arbitrary bytes.
pub fn hash_bytes(bytes: &[u8]) -> Hash {
    Sha256::digest(bytes).into()
}

/// Merkle root over a list of leaf hashes.
///
/// Pairs are combined as `hash(left || right)`; an odd element at the end of
/// a level is promoted unchanged. An empty list hashes to all zeroes.
pub fn merkle_root(hashes: &[Hash]) -> Hash {
    if hashes.is_empty() {
        return [0u8; 32];
    }

    let mut level: Vec<Hash> = hashes.to_vec();
    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len() / 2 + 1);
        for pair in level.chunks(2) {
            if pair.len() == 2 {
                next.push(join(&pair[0], &pair[1]));
            } else {
                next.push(pair[0]);
            }
        }
        level = next;
    }
    level[0]
}

fn join(left: &Hash, right: &Hash) -> Hash {
    let mut bytes = [0u8; 64];
    bytes[..32].copy_from_slice(left);
    bytes[32..].copy_from_slice(right);
    hash_bytes(&bytes)
}

/// Verify a compact ECDSA signature over a 32-byte digest. Malformed keys or
/// signatures verify as false rather than erroring.
pub fn verify_bytes(digest: &Hash, public_key: &[u8], signature: &[u8]) -> bool {
    let secp = Secp256k1::verification_only();

    let public_key = match PublicKey::from_slice(public_key) {
        Ok(key) => key,
        Err(_) => return false,
    };
    let signature = match Signature::from_compact(signature) {
        Ok(sig) => sig,
        Err(_) => return false,
    };
    let message = match Message::from_digest_slice(digest) {
        Ok(message) => message,
        Err(_) => return false,
    };

    secp.verify_ecdsa(&message, &signature, &public_key).is_ok()
}

/// Number of storage-proof segments a file of the given size divides into.
pub fn segment_count(file_size: u64) -> u64 {
    file_size.div_ceil(SEGMENT_SIZE as u64)
}

/// The segment index challenged for a proof window. Derived from the
/// contract id and the window's start height so the prover cannot choose it.
pub fn challenge_index(contract_id: &ContractID, window_start: Height, count: u64) -> u64 {
    let mut bytes = Vec::with_capacity(40);
    bytes.extend_from_slice(contract_id);
    bytes.extend_from_slice(&window_start.to_le_bytes());
    let digest = hash_bytes(&bytes);

    let mut word = [0u8; 8];
    word.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(word) % count
}

/// Verify a storage proof against a contract's file commitment.
///
/// The leaf hash of the supplied segment is folded with the sibling path
/// according to the bits of the challenged index and compared against the
/// contract's Merkle root.
pub fn verify_storage_proof(
    contract: &FileContract,
    contract_id: &ContractID,
    window_start: Height,
    proof: &StorageProof,
) -> bool {
    let count = segment_count(contract.file_size);
    if count == 0 {
        return false;
    }
    if proof.segment.is_empty() || proof.segment.len() > SEGMENT_SIZE {
        return false;
    }

    let mut index = challenge_index(contract_id, window_start, count);
    let mut digest = hash_bytes(&proof.segment);
    for sibling in &proof.hash_set {
        if index & 1 == 1 {
            digest = join(sibling, &digest);
        } else {
            digest = join(&digest, sibling);
        }
        index >>= 1;
    }

    digest == contract.file_merkle_root
}
