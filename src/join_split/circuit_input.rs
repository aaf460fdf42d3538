//! Assembly of the normalized record handed to the external prover.
//!
//! Field elements travel as decimal strings, the prover's native encoding.
//! This is the single place where empty note slots become canonical
//! zero-value notes and sibling paths are padded to the uniform depth.

use halo2_proofs::halo2curves::bn256::Fr as Fp;
use serde::{Deserialize, Serialize};

use crate::account::{AccountOperation, SecretAccount, SignerMode};
use crate::error::VeilError;
use crate::join_split::JoinSplitStep;
use crate::note::Note;
use crate::primitives::Point;
use crate::state_tree::{pad, TreePatch, TREE_DEPTH};
use crate::utils::{fp_to_dec_string, u128_to_fp};

fn dec(f: Fp) -> String {
    fp_to_dec_string(&f)
}

fn dec_point(p: &Point) -> [String; 2] {
    [dec(p.x), dec(p.y)]
}

fn dec_siblings(siblings: &[Fp]) -> Vec<String> {
    pad(siblings).iter().map(fp_to_dec_string).collect()
}

fn zero_point() -> [String; 2] {
    [dec(Fp::zero()), dec(Fp::zero())]
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct NoteSlots {
    val: [String; 2],
    secret: [String; 2],
    asset_id: [String; 2],
    owner: [[String; 2]; 2],
    nullifier: [String; 2],
    account_required: [String; 2],
}

/// The circuit input of one state-update step (join-split or account
/// lifecycle), normalized the way the external circuit expects it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CircuitInput {
    pub proof_id: u64,
    pub public_value: String,
    pub public_owner: String,
    pub num_input_notes: u64,
    pub output_nc_1: String,
    pub output_nc_2: String,
    pub data_tree_root: String,
    pub asset_id: u64,
    pub public_asset_id: u64,
    pub alias_hash: String,
    pub input_note_val: [String; 2],
    pub input_note_secret: [String; 2],
    pub input_note_asset_id: [String; 2],
    pub input_note_owner: [[String; 2]; 2],
    pub input_note_nullifier: [String; 2],
    pub input_note_account_required: [String; 2],
    pub output_note_val: [String; 2],
    pub output_note_secret: [String; 2],
    pub output_note_asset_id: [String; 2],
    pub output_note_owner: [[String; 2]; 2],
    pub output_note_nullifier: [String; 2],
    pub output_note_account_required: [String; 2],
    pub siblings: [Vec<String>; 2],
    pub account_required: u64,
    pub account_note_nk: String,
    pub account_note_npk: [String; 2],
    pub account_note_spk: [String; 2],
    pub siblings_ac: Vec<String>,
    #[serde(rename = "signatureR8")]
    pub signature_r8: [String; 2],
    #[serde(rename = "signatureS")]
    pub signature_s: String,
    pub new_account_note_npk: [String; 2],
    pub new_account_note_spk1: [String; 2],
    pub new_account_note_spk2: [String; 2],
}

fn note_slots(notes: [&Note; 2], nullifiers: [Fp; 2]) -> NoteSlots {
    let mut slots = NoteSlots::default();
    for (i, note) in notes.iter().enumerate() {
        slots.val[i] = dec(u128_to_fp(note.val));
        slots.secret[i] = dec(note.secret);
        slots.asset_id[i] = dec(Fp::from(u64::from(note.asset_id)));
        slots.owner[i] = dec_point(&note.owner);
        slots.nullifier[i] = dec(nullifiers[i]);
        slots.account_required[i] = dec(Fp::from(u64::from(note.account_required)));
    }
    slots
}

impl CircuitInput {
    /// Assembles the record for one join-split step, combining the locally
    /// derived step with the accumulator's witness patch.
    pub fn from_step(
        step: &JoinSplitStep,
        account: &SecretAccount,
        patch: &TreePatch,
    ) -> Result<Self, VeilError> {
        if patch.siblings.len() != 2 {
            return Err(VeilError::Remote(format!(
                "tree service returned {} sibling paths, expected 2",
                patch.siblings.len()
            )));
        }
        let mode = if step.account_required {
            SignerMode::AccountKey
        } else {
            SignerMode::SigningKey
        };
        let zero = Note::zero(
            step.asset_id,
            account.account_key.public(),
            step.account_required,
        );
        let inputs = [
            step.inputs[0].as_ref().unwrap_or(&zero),
            step.inputs[1].as_ref().unwrap_or(&zero),
        ];
        let outputs = [
            step.outputs[0].as_ref().unwrap_or(&zero),
            step.outputs[1].as_ref().unwrap_or(&zero),
        ];
        let input_slots = note_slots(inputs, step.nullifiers);
        // Output notes have not been spent; their nullifier fields are zero.
        let output_slots = note_slots(outputs, [Fp::zero(), Fp::zero()]);

        Ok(CircuitInput {
            proof_id: step.proof_id.id(),
            public_value: dec(u128_to_fp(step.public_value)),
            public_owner: dec(step.public_owner.map_or(Fp::zero(), |p| p.x)),
            num_input_notes: step.num_input_notes(),
            output_nc_1: dec(step.output_ncs[0]),
            output_nc_2: dec(step.output_ncs[1]),
            data_tree_root: dec(patch.data_tree_root),
            asset_id: u64::from(step.asset_id),
            public_asset_id: u64::from(step.public_asset_id),
            alias_hash: dec(step.alias_hash),
            input_note_val: input_slots.val,
            input_note_secret: input_slots.secret,
            input_note_asset_id: input_slots.asset_id,
            input_note_owner: input_slots.owner,
            input_note_nullifier: input_slots.nullifier,
            input_note_account_required: input_slots.account_required,
            output_note_val: output_slots.val,
            output_note_secret: output_slots.secret,
            output_note_asset_id: output_slots.asset_id,
            output_note_owner: output_slots.owner,
            output_note_nullifier: output_slots.nullifier,
            output_note_account_required: output_slots.account_required,
            siblings: [dec_siblings(&patch.siblings[0]), dec_siblings(&patch.siblings[1])],
            account_required: u64::from(step.account_required),
            account_note_nk: dec(account.account_key.nullifier_key()),
            account_note_npk: dec_point(&account.account_key.public()),
            account_note_spk: dec_point(&account.signer(mode).public()),
            siblings_ac: dec_siblings(&patch.siblings_ac),
            signature_r8: dec_point(&step.signature.r8),
            signature_s: step.signature.s.to_str_radix(10),
            new_account_note_npk: zero_point(),
            new_account_note_spk1: zero_point(),
            new_account_note_spk2: zero_point(),
        })
    }

    /// Assembles the record for an account lifecycle operation; note slots
    /// stay empty and the new key material is carried instead.
    pub fn from_account_op(op: &AccountOperation, patch: &TreePatch) -> Self {
        let empty_note = NoteSlots {
            val: [dec(Fp::zero()), dec(Fp::zero())],
            secret: [dec(Fp::zero()), dec(Fp::zero())],
            asset_id: [dec(Fp::zero()), dec(Fp::zero())],
            owner: [zero_point(), zero_point()],
            nullifier: [dec(Fp::zero()), dec(Fp::zero())],
            account_required: [dec(Fp::zero()), dec(Fp::zero())],
        };
        let zero_siblings = vec![dec(Fp::zero()); TREE_DEPTH];

        CircuitInput {
            proof_id: op.action.id(),
            public_value: dec(Fp::zero()),
            public_owner: dec(Fp::zero()),
            num_input_notes: 0,
            output_nc_1: dec(op.output_ncs[0]),
            output_nc_2: dec(op.output_ncs[1]),
            data_tree_root: dec(patch.data_tree_root),
            asset_id: 0,
            public_asset_id: 0,
            alias_hash: dec(op.alias_hash),
            input_note_val: empty_note.val.clone(),
            input_note_secret: empty_note.secret.clone(),
            input_note_asset_id: empty_note.asset_id.clone(),
            input_note_owner: empty_note.owner.clone(),
            input_note_nullifier: empty_note.nullifier.clone(),
            input_note_account_required: empty_note.account_required.clone(),
            output_note_val: empty_note.val,
            output_note_secret: empty_note.secret,
            output_note_asset_id: empty_note.asset_id,
            output_note_owner: empty_note.owner,
            output_note_nullifier: empty_note.nullifier,
            output_note_account_required: empty_note.account_required,
            siblings: [zero_siblings.clone(), zero_siblings],
            account_required: 0,
            account_note_nk: dec(Fp::zero()),
            account_note_npk: dec_point(&op.account_pk),
            account_note_spk: dec_point(&op.signing_pk),
            siblings_ac: dec_siblings(&patch.siblings_ac),
            signature_r8: dec_point(&op.signature.r8),
            signature_s: op.signature.s.to_str_radix(10),
            new_account_note_npk: dec_point(&op.new_account_pk),
            new_account_note_spk1: dec_point(&op.new_signing_pk1),
            new_account_note_spk2: dec_point(&op.new_signing_pk2),
        }
    }

    /// The JSON form submitted to the prover.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap()
    }
}
