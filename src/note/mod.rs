//! The value-bearing note model.
//!
//! A note's public identity is its commitment
//! `H(val, secret, asset_id, owner.x, owner.y, account_required)`; consuming
//! it reveals the nullifier `H(commitment, nk)`, computable only by the
//! holder of the owning account key.

mod encryption;

use halo2_proofs::halo2curves::{bn256::Fr as Fp, group::ff::Field};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::primitives::{poseidon_hash, Point, SigningKey};
use crate::state_tree::leaf_index;
use crate::utils::u128_to_fp;

pub use encryption::{
    decrypt_note, decrypt_notes, encrypt_note, DecryptedNote, EncryptedNoteRecord, DEFAULT_ALIAS,
};

/// Lifecycle of a note record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoteState {
    /// Created locally, not yet registered in the tree.
    Pending,
    /// Registered and spendable.
    Proved,
    /// Consumed as an input; kept for history.
    Spent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Note {
    pub val: u128,
    pub asset_id: u32,
    /// Blinding field element.
    pub secret: Fp,
    pub owner: Point,
    pub account_required: bool,
    /// Tree position once committed.
    pub index: u64,
    pub state: NoteState,
}

impl Note {
    /// A fresh note with a random blinding secret. The index is the leaf
    /// slot its commitment will occupy.
    pub fn new<R: RngCore>(
        val: u128,
        asset_id: u32,
        owner: Point,
        account_required: bool,
        rng: &mut R,
    ) -> Self {
        let mut note = Note {
            val,
            asset_id,
            secret: Fp::random(rng),
            owner,
            account_required,
            index: 0,
            state: NoteState::Pending,
        };
        note.index = u64::from(leaf_index(note.commitment()));
        note
    }

    /// The canonical zero-value note used to fill unused step slots. Fully
    /// deterministic (zero secret) so every padding slot commits identically.
    pub fn zero(asset_id: u32, owner: Point, account_required: bool) -> Self {
        let mut note = Note {
            val: 0,
            asset_id,
            secret: Fp::zero(),
            owner,
            account_required,
            index: 0,
            state: NoteState::Pending,
        };
        note.index = u64::from(leaf_index(note.commitment()));
        note
    }

    pub fn is_zero(&self) -> bool {
        self.val == 0
    }

    /// `H(val, secret, asset_id, owner.x, owner.y, account_required)`.
    pub fn commitment(&self) -> Fp {
        poseidon_hash([
            u128_to_fp(self.val),
            self.secret,
            Fp::from(u64::from(self.asset_id)),
            self.owner.x,
            self.owner.y,
            Fp::from(u64::from(self.account_required)),
        ])
    }

    /// `H(commitment, nk)`: the one-time spend marker, derivable only by
    /// the owner of `account_key`.
    pub fn nullifier(&self, account_key: &SigningKey) -> Fp {
        poseidon_hash([self.commitment(), account_key.nullifier_key()])
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_commitment_binds_every_field() {
        let mut rng = StdRng::seed_from_u64(21);
        let owner = SigningKey::random(&mut rng).public();
        let note = Note::new(100, 2, owner, false, &mut rng);

        let mut changed = note.clone();
        changed.val = 101;
        assert_ne!(changed.commitment(), note.commitment());

        let mut changed = note.clone();
        changed.asset_id = 3;
        assert_ne!(changed.commitment(), note.commitment());

        let mut changed = note.clone();
        changed.account_required = true;
        assert_ne!(changed.commitment(), note.commitment());
    }

    #[test]
    fn test_nullifier_deterministic_and_owner_bound() {
        let mut rng = StdRng::seed_from_u64(22);
        let owner_key = SigningKey::random(&mut rng);
        let other_key = SigningKey::random(&mut rng);
        let note = Note::new(5, 1, owner_key.public(), false, &mut rng);

        assert_eq!(note.nullifier(&owner_key), note.nullifier(&owner_key));
        assert_ne!(note.nullifier(&owner_key), note.nullifier(&other_key));
    }

    #[test]
    fn test_nullifiers_collision_free_over_secrets() {
        let mut rng = StdRng::seed_from_u64(23);
        let owner_key = SigningKey::random(&mut rng);
        let owner = owner_key.public();

        let mut seen = std::collections::HashSet::new();
        for _ in 0..64 {
            let note = Note::new(7, 2, owner, false, &mut rng);
            let nf = note.nullifier(&owner_key);
            assert!(seen.insert(crate::utils::fp_to_dec_string(&nf)));
        }
    }

    #[test]
    fn test_zero_note_is_canonical() {
        let mut rng = StdRng::seed_from_u64(24);
        let owner = SigningKey::random(&mut rng).public();
        let a = Note::zero(2, owner, false);
        let b = Note::zero(2, owner, false);
        assert_eq!(a.commitment(), b.commitment());
        assert!(a.is_zero());
    }
}
