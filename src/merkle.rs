//! SHA-256 Merkle tree backing stream-window commitments.
//!
//! Leaves are `SHA-256(record)`. Each parent is `SHA-256(left || right)`. A
//! level with an odd number of nodes pairs its last node with itself. The
//! root of a window's records is what a stream-window predicate commits to
//! in `integrity.merkleTree.root`.

use crate::error::{AttestError, Result};
use crate::predicate::StreamWindowPredicate;
use sha2::{Digest, Sha256};

/// A node hash.
pub type NodeHash = [u8; 32];

/// Tree algorithm id as it appears in `merkleTree.algorithm`.
pub const MERKLE_ALGORITHM: &str = "sha256";

pub fn leaf_hash(record: &[u8]) -> NodeHash {
    Sha256::digest(record).into()
}

fn hash_pair(left: &NodeHash, right: &NodeHash) -> NodeHash {
    let mut h = Sha256::new();
    h.update(left);
    h.update(right);
    h.finalize().into()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleTree {
    /// `levels[0]` holds the leaves; the last level holds only the root.
    levels: Vec<Vec<NodeHash>>,
}

impl MerkleTree {
    /// Builds a tree over `records`, hashing each into a leaf.
    pub fn from_records<R: AsRef<[u8]>>(records: &[R]) -> Self {
        Self::from_leaf_hashes(records.iter().map(|r| leaf_hash(r.as_ref())).collect())
    }

    pub fn from_leaf_hashes(leaves: Vec<NodeHash>) -> Self {
        if leaves.is_empty() {
            return Self { levels: Vec::new() };
        }
        let mut levels = vec![leaves];
        while let Some(level) = levels.last().filter(|l| l.len() > 1) {
            let next = level
                .chunks(2)
                .map(|pair| {
                    let left = &pair[0];
                    hash_pair(left, pair.get(1).unwrap_or(left))
                })
                .collect();
            levels.push(next);
        }
        Self { levels }
    }

    /// `None` for an empty tree.
    pub fn root(&self) -> Option<NodeHash> {
        self.levels.last().and_then(|l| l.first().copied())
    }

    pub fn root_hex(&self) -> Option<String> {
        self.root().map(hex::encode)
    }

    pub fn leaf_count(&self) -> usize {
        self.levels.first().map_or(0, Vec::len)
    }

    /// Number of levels, leaves and root included.
    pub fn height(&self) -> usize {
        self.levels.len()
    }

    /// Inclusion proof for the leaf at `index`.
    pub fn proof(&self, index: usize) -> Result<MerkleProof> {
        let leaf = self
            .levels
            .first()
            .and_then(|leaves| leaves.get(index))
            .copied()
            .ok_or_else(|| {
                AttestError::Merkle(format!(
                    "leaf index {index} out of bounds (tree has {} leaves)",
                    self.leaf_count()
                ))
            })?;

        let mut path = Vec::with_capacity(self.height().saturating_sub(1));
        let mut i = index;
        for level in self.levels.iter().take(self.height().saturating_sub(1)) {
            let (sibling, position) = if i % 2 == 0 {
                // Missing right sibling: the node was paired with itself.
                (level.get(i + 1).or_else(|| level.get(i)), SiblingPosition::Right)
            } else {
                (level.get(i - 1), SiblingPosition::Left)
            };
            let sibling = sibling.copied().ok_or_else(|| {
                AttestError::Merkle(format!("no sibling for node {i} while building proof"))
            })?;
            path.push(ProofStep { sibling, position });
            i /= 2;
        }

        Ok(MerkleProof {
            leaf_index: index,
            leaf_hash: leaf,
            path,
        })
    }
}

/// Side the sibling sits on when recombining.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiblingPosition {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProofStep {
    pub sibling: NodeHash,
    pub position: SiblingPosition,
}

/// Path from one leaf to the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleProof {
    pub leaf_index: usize,
    pub leaf_hash: NodeHash,
    pub path: Vec<ProofStep>,
}

impl MerkleProof {
    pub fn compute_root(&self) -> NodeHash {
        self.path.iter().fold(self.leaf_hash, |acc, step| match step.position {
            SiblingPosition::Left => hash_pair(&step.sibling, &acc),
            SiblingPosition::Right => hash_pair(&acc, &step.sibling),
        })
    }

    pub fn verify(&self, root: &NodeHash) -> bool {
        &self.compute_root() == root
    }
}

/// Recomputes a stream window's Merkle commitment from its records and
/// compares it with what the predicate declares. Returns the discrepancies;
/// empty means the records match.
///
/// A window with no records matches only a declared `leafCount` of 0; its
/// root is not compared, since an empty tree has none.
pub fn verify_window_records<R: AsRef<[u8]>>(
    window: &StreamWindowPredicate,
    records: &[R],
) -> Vec<String> {
    let declared = &window.integrity.merkle_tree;
    if declared.algorithm != MERKLE_ALGORITHM {
        return vec![format!(
            "Unsupported Merkle tree algorithm: {}",
            declared.algorithm
        )];
    }

    let mut errors = Vec::new();
    let tree = MerkleTree::from_records(records);
    if declared.leaf_count != tree.leaf_count() as u64 {
        errors.push(format!(
            "Leaf count mismatch: declared {}, computed {}",
            declared.leaf_count,
            tree.leaf_count()
        ));
    }
    if let Some(computed) = tree.root_hex() {
        if computed != declared.root {
            errors.push(format!(
                "Merkle root mismatch: declared {}, computed {computed}",
                declared.root
            ));
        }
    }
    errors
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::predicate::PredicateBody;
    use serde_json::json;

    fn records(n: usize) -> Vec<Vec<u8>> {
        (0..n).map(|i| format!("record-{i}").into_bytes()).collect()
    }

    #[test]
    fn single_leaf_root_is_leaf_hash() {
        let tree = MerkleTree::from_records(&[b"only"]);
        assert_eq!(tree.root(), Some(leaf_hash(b"only")));
        assert_eq!(tree.height(), 1);
    }

    #[test]
    fn two_leaves() {
        let tree = MerkleTree::from_records(&[b"a", b"b"]);
        assert_eq!(
            tree.root().unwrap(),
            hash_pair(&leaf_hash(b"a"), &leaf_hash(b"b"))
        );
    }

    #[test]
    fn odd_level_duplicates_last_node() {
        let tree = MerkleTree::from_records(&[b"a", b"b", b"c"]);
        let ab = hash_pair(&leaf_hash(b"a"), &leaf_hash(b"b"));
        let cc = hash_pair(&leaf_hash(b"c"), &leaf_hash(b"c"));
        assert_eq!(tree.root().unwrap(), hash_pair(&ab, &cc));
        assert_eq!(tree.leaf_count(), 3);
    }

    #[test]
    fn empty_tree_has_no_root() {
        let tree = MerkleTree::from_records::<Vec<u8>>(&[]);
        assert_eq!(tree.root(), None);
        assert!(tree.proof(0).is_err());
    }

    #[test]
    fn proofs_verify_for_every_leaf() {
        for n in [1, 2, 3, 5, 8, 13] {
            let tree = MerkleTree::from_records(&records(n));
            let root = tree.root().unwrap();
            for i in 0..n {
                assert!(tree.proof(i).unwrap().verify(&root), "n={n} i={i}");
            }
        }
    }

    #[test]
    fn tampered_proof_fails() {
        let tree = MerkleTree::from_records(&records(4));
        let mut proof = tree.proof(2).unwrap();
        proof.leaf_hash = leaf_hash(b"forged");
        assert!(!proof.verify(&tree.root().unwrap()));
    }

    #[test]
    fn out_of_bounds_proof() {
        let tree = MerkleTree::from_records(&records(3));
        let err = tree.proof(3).unwrap_err();
        assert!(err.to_string().contains("out of bounds"));
    }

    fn window(leaf_count: u64, root: &str) -> StreamWindowPredicate {
        let map = json!({
            "stream": {"id": "s", "source": "mqtt://b/t"},
            "window": {"type": "tumbling", "duration": "PT1M"},
            "integrity": {"merkleTree": {"algorithm": "sha256", "leafCount": leaf_count, "root": root}},
            "collector": {"id": "c"}
        });
        StreamWindowPredicate::from_map(map.as_object().unwrap()).unwrap()
    }

    #[test]
    fn window_records_match_declared_commitment() {
        let recs = records(5);
        let root = MerkleTree::from_records(&recs).root_hex().unwrap();
        assert!(verify_window_records(&window(5, &root), &recs).is_empty());
    }

    #[test]
    fn window_records_detect_dropped_record() {
        let recs = records(5);
        let root = MerkleTree::from_records(&recs).root_hex().unwrap();
        let errors = verify_window_records(&window(5, &root), &recs[..4]);
        assert_eq!(errors.len(), 2);
        assert!(errors[0].starts_with("Leaf count mismatch"));
        assert!(errors[1].starts_with("Merkle root mismatch"));
    }

    #[test]
    fn empty_window_matches_zero_leaf_count() {
        let none: Vec<Vec<u8>> = Vec::new();
        assert!(verify_window_records(&window(0, &"0".repeat(64)), &none).is_empty());
        assert_eq!(verify_window_records(&window(1, &"0".repeat(64)), &none).len(), 1);
    }

    #[test]
    fn unsupported_algorithm_is_reported() {
        let mut w = window(1, "x");
        w.integrity.merkle_tree.algorithm = "blake3".into();
        let errors = verify_window_records(&w, &records(1));
        assert_eq!(errors, vec!["Unsupported Merkle tree algorithm: blake3"]);
    }
}
