//! The join-split transaction builder.
//!
//! Every step consumes up to 2 notes and produces up to 2 notes, conserving
//! value per asset against the public input/output legs. Requests that no
//! pair of notes can satisfy are compiled into a chain of consolidation
//! steps whose outputs feed the next step.

mod circuit_input;

use halo2_proofs::halo2curves::bn256::Fr as Fp;
use itertools::Itertools;
use rand::RngCore;

use crate::account::{SecretAccount, SignerMode};
use crate::error::VeilError;
use crate::note::{Note, NoteState};
use crate::primitives::{poseidon_sponge, Point, Signature, SigningKey};
use crate::utils::u128_to_fp;

pub use circuit_input::CircuitInput;

/// Step discriminants shared with the external circuit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProofId {
    Deposit = 1,
    Send = 2,
    Withdraw = 3,
}

impl ProofId {
    pub fn id(&self) -> u64 {
        *self as u64
    }
}

/// One balanced join-split step, fully derived and signed.
#[derive(Clone, Debug)]
pub struct JoinSplitStep {
    pub proof_id: ProofId,
    /// Value entering (DEPOSIT) or leaving (WITHDRAW) the shielded pool.
    pub public_value: u128,
    /// L1-visible owner of the public leg, when there is one.
    pub public_owner: Option<Point>,
    pub asset_id: u32,
    pub public_asset_id: u32,
    pub alias_hash: Fp,
    /// Input slots; `None` is padded with the canonical zero note at
    /// circuit-input assembly.
    pub inputs: [Option<Note>; 2],
    pub outputs: [Option<Note>; 2],
    /// Commitments registered for both output slots (zero-note commitment
    /// for an unused slot).
    pub output_ncs: [Fp; 2],
    /// Input nullifiers; zero for an unused input slot.
    pub nullifiers: [Fp; 2],
    pub account_required: bool,
    pub signature: Signature,
}

impl JoinSplitStep {
    pub fn num_input_notes(&self) -> u64 {
        self.inputs.iter().flatten().count() as u64
    }

    fn public_legs(&self) -> (u128, u128) {
        match self.proof_id {
            ProofId::Deposit => (self.public_value, 0),
            ProofId::Send => (0, 0),
            ProofId::Withdraw => (0, self.public_value),
        }
    }

    /// Per-asset value conservation: `Σin + public_in == Σout + public_out`.
    pub fn check_conservation(&self) -> Result<(), VeilError> {
        let inputs: u128 = self.inputs.iter().flatten().map(|n| n.val).sum();
        let outputs: u128 = self.outputs.iter().flatten().map(|n| n.val).sum();
        let (public_in, public_out) = self.public_legs();
        if inputs + public_in != outputs + public_out {
            return Err(VeilError::Validation(format!(
                "join-split step does not conserve asset {}: {} + {} != {} + {}",
                self.asset_id, inputs, public_in, outputs, public_out
            )));
        }
        for note in self.inputs.iter().flatten().chain(self.outputs.iter().flatten()) {
            if note.asset_id != self.asset_id {
                return Err(VeilError::Validation(format!(
                    "note asset {} does not match step asset {}",
                    note.asset_id, self.asset_id
                )));
            }
        }
        Ok(())
    }

    /// The digest the step signature covers.
    pub fn digest(&self) -> Fp {
        let owner_x = self.public_owner.map_or(Fp::zero(), |p| p.x);
        poseidon_sponge(&[
            u128_to_fp(self.public_value),
            owner_x,
            self.output_ncs[0],
            self.output_ncs[1],
            self.nullifiers[0],
            self.nullifiers[1],
            Fp::from(u64::from(self.asset_id)),
        ])
    }
}

/// Builds balanced step chains for one account.
pub struct JoinSplitBuilder<'a> {
    account: &'a SecretAccount,
    mode: SignerMode,
}

impl<'a> JoinSplitBuilder<'a> {
    pub fn new(account: &'a SecretAccount, mode: SignerMode) -> Self {
        JoinSplitBuilder { account, mode }
    }

    fn self_owner(&self) -> Point {
        self.account.account_key.public()
    }

    /// A deposit mints its full value from the public leg; existing notes
    /// are left alone, so both input slots stay empty.
    pub fn deposit<R: RngCore>(
        &self,
        value: u128,
        asset_id: u32,
        recipient: Point,
        rng: &mut R,
    ) -> Result<Vec<JoinSplitStep>, VeilError> {
        check_value(value)?;
        let out = Note::new(value, asset_id, recipient, self.mode.account_required(), rng);
        let step = self.finish_step(
            ProofId::Deposit,
            value,
            Some(self.self_owner()),
            asset_id,
            asset_id,
            [None, None],
            [Some(out), None],
        )?;
        Ok(vec![step])
    }

    /// A private transfer: `value` to `recipient`, change back to the
    /// sender, consolidating beforehand if no two notes cover the request.
    pub fn send<R: RngCore>(
        &self,
        value: u128,
        asset_id: u32,
        recipient: Point,
        spendable: &[Note],
        rng: &mut R,
    ) -> Result<Vec<JoinSplitStep>, VeilError> {
        check_value(value)?;
        let (mut steps, inputs) = self.consolidate(value, asset_id, spendable, rng)?;
        let input_total: u128 = inputs.iter().flatten().map(|n| n.val).sum();
        let change = input_total - value;

        let delivered = Note::new(value, asset_id, recipient, self.mode.account_required(), rng);
        let change_note = (change > 0).then(|| {
            Note::new(change, asset_id, self.self_owner(), self.mode.account_required(), rng)
        });

        steps.push(self.finish_step(
            ProofId::Send,
            0,
            None,
            asset_id,
            0,
            inputs,
            [Some(delivered), change_note],
        )?);
        Ok(steps)
    }

    /// A withdrawal: `value` exits through the public leg, change returns to
    /// the sender, consolidating beforehand when needed.
    pub fn withdraw<R: RngCore>(
        &self,
        value: u128,
        asset_id: u32,
        public_owner: Point,
        spendable: &[Note],
        rng: &mut R,
    ) -> Result<Vec<JoinSplitStep>, VeilError> {
        check_value(value)?;
        let (mut steps, inputs) = self.consolidate(value, asset_id, spendable, rng)?;
        let input_total: u128 = inputs.iter().flatten().map(|n| n.val).sum();
        let change = input_total - value;
        let change_note = (change > 0).then(|| {
            Note::new(change, asset_id, self.self_owner(), self.mode.account_required(), rng)
        });

        steps.push(self.finish_step(
            ProofId::Withdraw,
            value,
            Some(public_owner),
            asset_id,
            asset_id,
            inputs,
            [None, change_note],
        )?);
        Ok(steps)
    }

    /// Picks the inputs for the final step, emitting consolidation steps
    /// until at most two notes cover `value`.
    fn consolidate<R: RngCore>(
        &self,
        value: u128,
        asset_id: u32,
        spendable: &[Note],
        rng: &mut R,
    ) -> Result<(Vec<JoinSplitStep>, [Option<Note>; 2]), VeilError> {
        let mut pool: Vec<Note> = spendable
            .iter()
            .filter(|n| n.asset_id == asset_id && n.state == NoteState::Proved && n.val > 0)
            .cloned()
            .collect();
        pool.sort_by_key(|n| n.val);

        let total: u128 = pool.iter().map(|n| n.val).sum();
        if total < value {
            return Err(VeilError::InsufficientFunds { asset_id });
        }

        let mut steps = Vec::new();
        loop {
            // Smallest single note that covers the request.
            if let Some(pos) = pool.iter().position(|n| n.val >= value) {
                return Ok((steps, [Some(pool.swap_remove(pos)), None]));
            }
            // Cheapest pair that covers it.
            let best_pair = (0..pool.len())
                .tuple_combinations::<(usize, usize)>()
                .filter(|(i, j)| pool[*i].val + pool[*j].val >= value)
                .min_by_key(|(i, j)| pool[*i].val + pool[*j].val);
            if let Some((i, j)) = best_pair {
                let second = pool.remove(j);
                let first = pool.remove(i);
                return Ok((steps, [Some(first), Some(second)]));
            }

            // No pair suffices: merge the two smallest into a self-owned
            // note and keep going. Terminates because the pool shrinks by
            // one each round and its total already covers the request.
            let a = pool.remove(0);
            let b = pool.remove(0);
            let merged = Note::new(
                a.val + b.val,
                asset_id,
                self.self_owner(),
                self.mode.account_required(),
                rng,
            );
            steps.push(self.finish_step(
                ProofId::Send,
                0,
                None,
                asset_id,
                0,
                [Some(a), Some(b)],
                [Some(merged.clone()), None],
            )?);
            let at = pool.partition_point(|n| n.val < merged.val);
            pool.insert(at, merged);
        }
    }

    fn finish_step(
        &self,
        proof_id: ProofId,
        public_value: u128,
        public_owner: Option<Point>,
        asset_id: u32,
        public_asset_id: u32,
        inputs: [Option<Note>; 2],
        outputs: [Option<Note>; 2],
    ) -> Result<JoinSplitStep, VeilError> {
        let account_required = self.mode.account_required();
        let zero = Note::zero(asset_id, self.self_owner(), account_required);
        let output_ncs = [
            outputs[0].as_ref().unwrap_or(&zero).commitment(),
            outputs[1].as_ref().unwrap_or(&zero).commitment(),
        ];
        let nullifiers = [
            inputs[0]
                .as_ref()
                .map_or(Fp::zero(), |n| n.nullifier(&self.account.account_key)),
            inputs[1]
                .as_ref()
                .map_or(Fp::zero(), |n| n.nullifier(&self.account.account_key)),
        ];

        let mut step = JoinSplitStep {
            proof_id,
            public_value,
            public_owner,
            asset_id,
            public_asset_id,
            alias_hash: self.account.alias_hash(),
            inputs,
            outputs,
            output_ncs,
            nullifiers,
            account_required,
            // Placeholder until the digest below is signed.
            signature: Signature {
                r8: Point::identity(),
                s: num_bigint::BigUint::from(0u8),
            },
        };
        step.check_conservation()?;
        step.signature = self.account.signer(self.mode).sign(step.digest());
        Ok(step)
    }
}

/// The withdraw authorization digest: one signature over every intermediate
/// root of a consolidation chain (in step order) plus the final public leg.
pub fn withdraw_digest(
    public_value: u128,
    public_owner: &Point,
    output_nc1: Fp,
    output_nc2: Fp,
    public_asset_id: u32,
    roots: &[Fp],
) -> Fp {
    let mut input = vec![
        u128_to_fp(public_value),
        public_owner.x,
        public_owner.y,
        output_nc1,
        output_nc2,
        Fp::from(u64::from(public_asset_id)),
    ];
    input.extend_from_slice(roots);
    poseidon_sponge(&input)
}

fn check_value(value: u128) -> Result<(), VeilError> {
    if value == 0 {
        return Err(VeilError::Validation("operation value must be positive".to_string()));
    }
    Ok(())
}

/// Verifies a step signature against the signer's public key.
pub fn verify_step_signature(step: &JoinSplitStep, signer_pk: &Point) -> bool {
    SigningKey::verify(signer_pk, step.digest(), &step.signature)
}

#[cfg(test)]
mod tests;
