use std::collections::HashMap;

use halo2_proofs::halo2curves::bn256::Fr as Fp;

use crate::error::VeilError;
use crate::primitives::poseidon_hash;
use crate::state_tree::{TreeWitness, TREE_DEPTH};

/// Leaf position of a key: its `TREE_DEPTH` least-significant bits, LSB
/// first, so bit 0 picks the child of the root.
pub fn leaf_index(key: Fp) -> u32 {
    use halo2_proofs::halo2curves::group::ff::PrimeField;
    let repr = key.to_repr();
    let bytes = repr.as_ref();
    let low = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    low & ((1 << TREE_DEPTH) - 1)
}

/// Right-pads a (possibly trimmed) sibling list to exactly `TREE_DEPTH`
/// entries with the zero field element, the uniform-array form the circuit
/// expects. Zero stands for "empty subtree at this level".
pub fn pad(siblings: &[Fp]) -> Vec<Fp> {
    let mut out = siblings.to_vec();
    out.resize(TREE_DEPTH, Fp::zero());
    out
}

/// Sparse Merkle accumulator of fixed depth [`TREE_DEPTH`] over field-element
/// keys.
///
/// An occupied leaf hashes as `H(key, value, 1)`, an empty leaf is the zero
/// field element, and every internal node is `H(left, right)`. Per-depth
/// default hashes for empty subtrees are computed once at construction, which
/// is what makes non-membership witnesses for never-inserted keys possible.
///
/// The tree is append-only: a key, once inserted, is never removed or
/// overwritten with a different value. Re-inserting an identical
/// `(key, value)` pair is idempotent; inserting a different value under an
/// occupied key is a [`VeilError::Conflict`]; the entire double-spend and
/// replay defense rests on this rule.
///
/// All mutation goes through `&mut self`: a single logical writer. Callers
/// that share a tree across tasks must serialize the whole
/// read-siblings/recompute/write sequence (the backend's local tree service
/// holds an async mutex around it).
#[derive(Clone, Debug)]
pub struct StateTree {
    /// Default (empty subtree) hash per level, leaf level first; the last
    /// entry is the root of an empty tree.
    defaults: Vec<Fp>,
    /// Occupied leaf slots: position -> (key, value).
    leaves: HashMap<u32, (Fp, Fp)>,
    /// Computed node hashes per level, leaf level first.
    nodes: Vec<HashMap<u32, Fp>>,
    root: Fp,
}

fn leaf_hash(key: Fp, value: Fp) -> Fp {
    poseidon_hash([key, value, Fp::one()])
}

impl Default for StateTree {
    fn default() -> Self {
        Self::new()
    }
}

impl StateTree {
    pub fn new() -> Self {
        let mut defaults = Vec::with_capacity(TREE_DEPTH + 1);
        defaults.push(Fp::zero());
        for level in 0..TREE_DEPTH {
            let child = defaults[level];
            defaults.push(poseidon_hash([child, child]));
        }
        let root = defaults[TREE_DEPTH];
        StateTree {
            defaults,
            leaves: HashMap::new(),
            nodes: vec![HashMap::new(); TREE_DEPTH],
            root,
        }
    }

    pub fn root(&self) -> Fp {
        self.root
    }

    pub fn contains(&self, key: Fp) -> bool {
        matches!(self.leaves.get(&leaf_index(key)), Some((k, _)) if *k == key)
    }

    /// Checks whether `insert(key, value)` would succeed, without mutating.
    pub fn can_insert(&self, key: Fp, value: Fp) -> Result<(), VeilError> {
        match self.leaves.get(&leaf_index(key)) {
            None => Ok(()),
            Some((k, _)) if *k != key => Err(VeilError::Conflict("leaf slot occupied by another key")),
            Some((_, v)) if *v != value => Err(VeilError::Conflict("key already bound to a different value")),
            Some(_) => Ok(()),
        }
    }

    /// Inserts a key/value leaf and returns the fresh witness.
    ///
    /// Identical re-insertion succeeds without changing the root; a value
    /// conflict (or a foreign key occupying the slot) is rejected before any
    /// node is touched.
    pub fn insert(&mut self, key: Fp, value: Fp) -> Result<TreeWitness, VeilError> {
        self.can_insert(key, value)?;
        let index = leaf_index(key);
        if !self.leaves.contains_key(&index) {
            self.leaves.insert(index, (key, value));
            self.recompute_path(index, leaf_hash(key, value));
            tracing::debug!(index, "state tree leaf inserted");
        }
        Ok(TreeWitness {
            value,
            root: self.root,
            siblings: self.path_siblings(index),
        })
    }

    /// Looks a key up, returning its stored value (zero when absent) and a
    /// sibling path valid for the current root.
    pub fn find(&self, key: Fp) -> TreeWitness {
        let index = leaf_index(key);
        let value = match self.leaves.get(&index) {
            Some((k, v)) if *k == key => *v,
            _ => Fp::zero(),
        };
        TreeWitness {
            value,
            root: self.root,
            siblings: self.path_siblings(index),
        }
    }

    /// Drops the trailing run of per-level default hashes from a sibling
    /// list, the compact form consumed by the on-chain SMT verifier.
    pub fn trim(&self, siblings: &[Fp]) -> Vec<Fp> {
        let mut len = siblings.len();
        while len > 0 && siblings[len - 1] == self.defaults[len - 1] {
            len -= 1;
        }
        siblings[..len].to_vec()
    }

    fn node_at(&self, level: usize, index: u32) -> Fp {
        self.nodes[level]
            .get(&index)
            .copied()
            .unwrap_or(self.defaults[level])
    }

    fn recompute_path(&mut self, index: u32, leaf: Fp) {
        let mut hash = leaf;
        let mut i = index;
        for level in 0..TREE_DEPTH {
            self.nodes[level].insert(i, hash);
            let sibling = self.node_at(level, i ^ 1);
            hash = if i & 1 == 0 {
                poseidon_hash([hash, sibling])
            } else {
                poseidon_hash([sibling, hash])
            };
            i >>= 1;
        }
        self.root = hash;
    }

    fn path_siblings(&self, index: u32) -> Vec<Fp> {
        (0..TREE_DEPTH)
            .map(|level| self.node_at(level, (index >> level) ^ 1))
            .collect()
    }
}

/// Re-derives the root from a witness by iterated hashing up to
/// [`TREE_DEPTH`]. Accepts both full and zero-padded sibling lists: a zero
/// sibling is interpreted as the empty subtree at its level.
pub fn verify_witness(root: Fp, key: Fp, value: Fp, siblings: &[Fp]) -> bool {
    if siblings.len() > TREE_DEPTH {
        return false;
    }
    let mut defaults = Vec::with_capacity(TREE_DEPTH);
    defaults.push(Fp::zero());
    for level in 0..TREE_DEPTH - 1 {
        let child = defaults[level];
        defaults.push(poseidon_hash([child, child]));
    }

    let mut hash = if value == Fp::zero() {
        Fp::zero()
    } else {
        leaf_hash(key, value)
    };
    let mut index = leaf_index(key);
    for level in 0..TREE_DEPTH {
        let raw = siblings.get(level).copied().unwrap_or(Fp::zero());
        let sibling = if raw == Fp::zero() { defaults[level] } else { raw };
        hash = if index & 1 == 0 {
            poseidon_hash([hash, sibling])
        } else {
            poseidon_hash([sibling, hash])
        };
        index >>= 1;
    }
    hash == root
}
