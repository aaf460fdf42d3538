mod tests;
mod tree;

use halo2_proofs::halo2curves::bn256::Fr as Fp;
use serde::{Deserialize, Serialize};

use crate::utils::{fr_mat_serde, fr_serde, fr_vec_serde};

/// Fixed, public depth of the state accumulator.
pub const TREE_DEPTH: usize = 20;

/// Membership (or non-membership) witness for one key: the stored value
/// (zero when absent), the root it verifies against and the `TREE_DEPTH`
/// sibling hashes collected leaf to root.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TreeWitness {
    #[serde(with = "fr_serde")]
    pub value: Fp,
    #[serde(with = "fr_serde")]
    pub root: Fp,
    #[serde(with = "fr_vec_serde")]
    pub siblings: Vec<Fp>,
}

/// One batched mutation of the authoritative accumulator: the two output
/// commitments of a step (or an account commitment in slot 1) and the input
/// nullifiers revealed by it. Zero slots are skipped.
///
/// Commitment leaves store the value 1. Nullifier leaves store `binding`,
/// the step digest (or the account commitment for lifecycle operations).
/// A retried step re-inserts identical pairs and is idempotent; any
/// semantically different spend of the same note carries a different
/// binding and trips the tree's conflict rule.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StateTreeUpdate {
    #[serde(with = "fr_serde")]
    pub output_nc1: Fp,
    #[serde(with = "fr_serde")]
    pub nullifier1: Fp,
    #[serde(with = "fr_serde")]
    pub output_nc2: Fp,
    #[serde(with = "fr_serde")]
    pub nullifier2: Fp,
    #[serde(with = "fr_serde")]
    pub ac_state_key: Fp,
    /// Value stored under both nullifier leaves.
    #[serde(with = "fr_serde")]
    pub binding: Fp,
    /// When false, sibling lists come back trimmed for the on-chain verifier.
    pub padding: bool,
}

/// The accumulator's response to a [`StateTreeUpdate`]: the new root, the
/// witnesses for both registered commitments, the account-commitment witness
/// and an echo of the registered keys for the caller's consistency check.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TreePatch {
    #[serde(with = "fr_serde")]
    pub data_tree_root: Fp,
    #[serde(with = "fr_vec_serde")]
    pub keys: Vec<Fp>,
    #[serde(with = "fr_mat_serde")]
    pub siblings: Vec<Vec<Fp>>,
    #[serde(with = "fr_vec_serde")]
    pub siblings_ac: Vec<Fp>,
}

pub use tree::{leaf_index, pad, verify_witness, StateTree};
