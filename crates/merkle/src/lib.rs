//! Deterministic, OpenZeppelin-compatible Merkle tree over a batch's sorted
//! IPFS CIDs. Pure and synchronous: no tokio, no database, so tree/proof
//! correctness is a property test away from the rest of the pipeline.

use std::collections::HashMap;

use alloy::primitives::{keccak256, B256};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MerkleError {
    #[error("cannot build a merkle tree from zero leaves")]
    InvalidArgument,
}

/// A built tree: sorted leaves, root, and the sibling proof for every leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleTree {
    pub root: B256,
    pub sorted_leaves: Vec<String>,
    pub proofs: HashMap<String, Vec<B256>>,
    pub depth: usize,
}

impl MerkleTree {
    /// `root`, rendered `"0x" + lowercase hex`, exactly as an EVM caller
    /// would supply `merkleRoot` to `anchorBatch`.
    pub fn root_hex(&self) -> String {
        to_hex(self.root.as_slice())
    }

    pub fn proof_hex(&self, leaf: &str) -> Option<Vec<String>> {
        self.proofs
            .get(leaf)
            .map(|siblings| siblings.iter().map(|s| to_hex(s.as_slice())).collect())
    }
}

/// Builds a tree from raw leaf strings (IPFS CIDs). Leaves are sorted
/// lexicographically first, so the result is independent of input order
/// (P4).
pub fn build_tree(leaves: &[String]) -> Result<MerkleTree, MerkleError> {
    if leaves.is_empty() {
        return Err(MerkleError::InvalidArgument);
    }

    let mut sorted_leaves = leaves.to_vec();
    sorted_leaves.sort();

    let mut level: Vec<B256> = sorted_leaves
        .iter()
        .map(|leaf| keccak256(leaf.as_bytes()))
        .collect();

    // Per-level node arrays, bottom (leaves) first, so `proof` can walk
    // upward and pick the sibling at each level directly.
    let mut levels: Vec<Vec<B256>> = vec![level.clone()];
    let mut depth = 0;
    while level.len() > 1 {
        level = next_level(&level);
        levels.push(level.clone());
        depth += 1;
    }

    let root = levels.last().unwrap()[0];

    let mut proofs = HashMap::with_capacity(sorted_leaves.len());
    for (i, leaf) in sorted_leaves.iter().enumerate() {
        proofs.insert(leaf.clone(), proof_for_index(&levels, i));
    }

    Ok(MerkleTree {
        root,
        sorted_leaves,
        proofs,
        depth,
    })
}

fn next_level(level: &[B256]) -> Vec<B256> {
    let mut out = Vec::with_capacity(level.len().div_ceil(2));
    let mut i = 0;
    while i < level.len() {
        let a = level[i];
        let b = if i + 1 < level.len() {
            level[i + 1]
        } else {
            level[i]
        };
        out.push(hash_pair(a, b));
        i += 2;
    }
    out
}

/// Order the two 32-byte values by unsigned byte-wise compare (smaller
/// first) before concatenating, matching OpenZeppelin's `MerkleProof`.
fn hash_pair(a: B256, b: B256) -> B256 {
    let (lo, hi) = if a.as_slice() <= b.as_slice() { (a, b) } else { (b, a) };
    let mut buf = [0u8; 64];
    buf[..32].copy_from_slice(lo.as_slice());
    buf[32..].copy_from_slice(hi.as_slice());
    keccak256(buf)
}

fn proof_for_index(levels: &[Vec<B256>], leaf_index: usize) -> Vec<B256> {
    let mut proof = Vec::new();
    let mut index = leaf_index;
    for level in &levels[..levels.len() - 1] {
        let sibling_index = index ^ 1;
        if sibling_index < level.len() {
            proof.push(level[sibling_index]);
        }
        index /= 2;
    }
    proof
}

/// Recomputes the root from `leaf` and `proof` and compares to `root`.
pub fn verify(leaf: &str, proof: &[B256], root: B256) -> bool {
    let mut node = keccak256(leaf.as_bytes());
    for sibling in proof {
        node = hash_pair(node, *sibling);
    }
    node == root
}

fn to_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn leaves(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("Qm{i:04}")).collect()
    }

    #[test]
    fn empty_input_is_invalid_argument() {
        assert_eq!(build_tree(&[]), Err(MerkleError::InvalidArgument));
    }

    #[test]
    fn single_leaf_root_is_its_own_hash_with_empty_proof() {
        let tree = build_tree(&["QmA".to_string()]).unwrap();
        assert_eq!(tree.root, keccak256(b"QmA"));
        assert!(tree.proofs["QmA"].is_empty());
        assert!(verify("QmA", &tree.proofs["QmA"], tree.root));
    }

    #[test_case(2; "two leaves")]
    #[test_case(3; "three leaves, odd count duplicates last")]
    #[test_case(7; "seven leaves")]
    #[test_case(33; "thirty three leaves")]
    fn every_leaf_proof_verifies_against_the_root(n: usize) {
        let tree = build_tree(&leaves(n)).unwrap();
        for leaf in &tree.sorted_leaves {
            assert!(verify(leaf, &tree.proofs[leaf], tree.root));
        }
    }

    #[test]
    fn a_foreign_leaf_does_not_verify_with_an_existing_proof() {
        let tree = build_tree(&leaves(4)).unwrap();
        let proof = &tree.proofs[&tree.sorted_leaves[0]];
        assert!(!verify("not-a-member", proof, tree.root));
    }

    #[test]
    fn tree_is_independent_of_leaf_insertion_order() {
        let mut shuffled = leaves(10);
        shuffled.reverse();
        let a = build_tree(&leaves(10)).unwrap();
        let b = build_tree(&shuffled).unwrap();
        assert_eq!(a.root, b.root);
        assert_eq!(a.proofs, b.proofs);
    }

    #[test]
    fn swapped_proof_between_two_leaves_fails_to_verify() {
        let tree = build_tree(&["QmA".to_string(), "QmB".to_string(), "QmC".to_string()]).unwrap();
        let proof_a = tree.proofs["QmA"].clone();
        assert!(verify("QmA", &proof_a, tree.root));
        assert!(!verify("QmB", &proof_a, tree.root));
    }
}
