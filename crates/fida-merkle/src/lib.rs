//! Pairwise SHA-256 Merkle tree used to bind a checkpoint's event range.
//!
//! Leaves are event-hash hex strings. Internal nodes are hex strings of
//! `sha256(left_hex || right_hex)`, where the concatenation is over the
//! **ASCII text** of the two hex strings, not their byte decoding — this
//! keeps the tree trivially reproducible by any verifier that only has the
//! hex strings from a receipt, without needing to agree on a binary
//! encoding first.
#![deny(missing_docs)]

use fida_crypto::sha256_hex;
use serde::{Deserialize, Serialize};

/// Root hash of an empty leaf set, per the empty-leaves rule. No checkpoint
/// is ever issued with zero leaves (see the checkpoint engine), so this
/// value only ever appears in isolated tests of the tree primitive.
pub fn empty_root() -> String {
    sha256_hex(b"")
}

/// Integrity digest over an ordered page of event hashes:
/// `sha256_hex(hashes.join("|"))`. Distinct from the Merkle tree's own node
/// hashing (no separator) — this is the checkpoint/export page digest, not
/// a tree node.
pub fn page_hash(hashes: &[String]) -> String {
    sha256_hex(hashes.join("|").as_bytes())
}

/// Hash two sibling nodes into their parent.
fn parent(left: &str, right: &str) -> String {
    let mut buf = String::with_capacity(left.len() + right.len());
    buf.push_str(left);
    buf.push_str(right);
    sha256_hex(buf.as_bytes())
}

/// Build a full Merkle tree from an ordered list of leaf hex hashes.
///
/// Returns the root and every layer (`layers[0]` is the leaves themselves,
/// each subsequent layer half the length of the last, rounding up via the
/// odd-node self-duplication rule) so callers can persist the layers for
/// later proof reconstruction.
pub fn build(leaves: &[String]) -> (String, Vec<Vec<String>>) {
    assert!(!leaves.is_empty(), "merkle tree requires at least one leaf");
    let mut layers = vec![leaves.to_vec()];
    while layers.last().unwrap().len() > 1 {
        let current = layers.last().unwrap();
        let mut next = Vec::with_capacity((current.len() + 1) / 2);
        for pair in current.chunks(2) {
            let node = match pair {
                [left, right] => parent(left, right),
                [solo] => parent(solo, solo),
                _ => unreachable!(),
            };
            next.push(node);
        }
        layers.push(next);
    }
    let root = layers.last().unwrap()[0].clone();
    (root, layers)
}

/// Which side of the proven node a sibling hash sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    /// Sibling is to the left of the path node (path node is the right child).
    L,
    /// Sibling is to the right of the path node (path node is the left child).
    R,
}

/// One step of a Merkle inclusion proof.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofStep {
    /// Which side the sibling sits on.
    pub side: Side,
    /// The sibling's hash at this level.
    pub hash: String,
}

/// An inclusion proof for a single leaf against a Merkle root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proof {
    /// The leaf hash being proven.
    pub leaf: String,
    /// The leaf's index within the tree.
    pub index: usize,
    /// Sibling path from leaf to root.
    pub siblings: Vec<ProofStep>,
    /// The root this proof resolves to.
    pub root: String,
}

/// Reconstruct the inclusion proof for `index` from the tree's persisted
/// layers (as produced by [`build`]).
pub fn prove(layers: &[Vec<String>], index: usize) -> Option<Proof> {
    let leaves = layers.first()?;
    if index >= leaves.len() {
        return None;
    }
    let mut siblings = Vec::new();
    let mut idx = index;
    for level in &layers[..layers.len() - 1] {
        let is_right_child = idx % 2 == 1;
        let sibling_idx = if is_right_child { idx - 1 } else { idx + 1 };
        let sibling_hash = level
            .get(sibling_idx)
            .cloned()
            .unwrap_or_else(|| level[idx].clone());
        let side = if is_right_child { Side::L } else { Side::R };
        siblings.push(ProofStep { side, hash: sibling_hash });
        idx /= 2;
    }
    let root = layers.last()?.first()?.clone();
    Some(Proof {
        leaf: leaves[index].clone(),
        index,
        siblings,
        root,
    })
}

/// Verify a proof by folding its sibling path and comparing to `proof.root`.
pub fn verify(proof: &Proof) -> bool {
    let mut hash = proof.leaf.clone();
    for step in &proof.siblings {
        hash = match step.side {
            Side::L => parent(&step.hash, &hash),
            Side::R => parent(&hash, &step.hash),
        };
    }
    hash == proof.root
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaves(n: usize) -> Vec<String> {
        (0..n).map(|i| sha256_hex(format!("leaf-{i}").as_bytes())).collect()
    }

    #[test]
    fn single_leaf_tree_has_trivial_root() {
        let ls = leaves(1);
        let (root, layers) = build(&ls);
        assert_eq!(root, ls[0]);
        assert_eq!(layers.len(), 1);
    }

    #[test]
    fn odd_count_duplicates_final_node() {
        let ls = leaves(3);
        let (root, layers) = build(&ls);
        let expected_level1_2 = parent(&ls[2], &ls[2]);
        assert_eq!(layers[1][1], expected_level1_2);
        let expected_root = parent(&layers[1][0], &layers[1][1]);
        assert_eq!(root, expected_root);
    }

    #[test]
    fn every_leaf_proves_inclusion() {
        let ls = leaves(7);
        let (root, layers) = build(&ls);
        for i in 0..ls.len() {
            let proof = prove(&layers, i).expect("proof exists");
            assert_eq!(proof.root, root);
            assert!(verify(&proof));
        }
    }

    #[test]
    fn tampered_leaf_fails_verification() {
        let ls = leaves(4);
        let (_, layers) = build(&ls);
        let mut proof = prove(&layers, 2).unwrap();
        proof.leaf = sha256_hex(b"not the real leaf");
        assert!(!verify(&proof));
    }

    #[test]
    fn tampered_sibling_fails_verification() {
        let ls = leaves(4);
        let (_, layers) = build(&ls);
        let mut proof = prove(&layers, 1).unwrap();
        proof.siblings[0].hash = sha256_hex(b"not a real sibling");
        assert!(!verify(&proof));
    }

    #[test]
    fn empty_root_matches_sha256_of_empty_string() {
        assert_eq!(empty_root(), sha256_hex(b""));
    }

    #[test]
    fn page_hash_joins_with_pipe_separator() {
        let hashes = leaves(3);
        let expected = sha256_hex(format!("{}|{}|{}", hashes[0], hashes[1], hashes[2]).as_bytes());
        assert_eq!(page_hash(&hashes), expected);
    }
}
