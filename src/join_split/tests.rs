use halo2_proofs::halo2curves::bn256::Fr as Fp;
use rand::{rngs::StdRng, SeedableRng};

use crate::account::{SecretAccount, SignerMode};
use crate::error::VeilError;
use crate::join_split::{verify_step_signature, JoinSplitBuilder, ProofId};
use crate::note::{Note, NoteState};
use crate::primitives::SigningKey;

fn account(seed: u64) -> (SecretAccount, StdRng) {
    let mut rng = StdRng::seed_from_u64(seed);
    let account = SecretAccount::new("Alice", &mut rng);
    (account, rng)
}

fn proved(mut note: Note) -> Note {
    note.state = NoteState::Proved;
    note
}

#[test]
fn test_deposit_with_no_notes_mints_single_output() {
    let (account, mut rng) = account(41);
    let builder = JoinSplitBuilder::new(&account, SignerMode::SigningKey);
    let steps = builder
        .deposit(100, 2, account.account_key.public(), &mut rng)
        .unwrap();

    assert_eq!(steps.len(), 1);
    let step = &steps[0];
    assert_eq!(step.proof_id, ProofId::Deposit);
    assert_eq!(step.num_input_notes(), 0);
    assert!(step.inputs.iter().all(Option::is_none));
    assert_eq!(step.outputs[0].as_ref().unwrap().val, 100);
    assert!(step.outputs[1].is_none(), "no change note on a plain deposit");
    assert_eq!(step.nullifiers, [Fp::zero(), Fp::zero()]);
    step.check_conservation().unwrap();
}

#[test]
fn test_send_produces_delivery_and_change() {
    let (account, mut rng) = account(42);
    let receiver = SigningKey::random(&mut rng);
    let funding = proved(Note::new(100, 2, account.account_key.public(), false, &mut rng));
    let funding_nc = funding.commitment();

    let builder = JoinSplitBuilder::new(&account, SignerMode::SigningKey);
    let steps = builder
        .send(30, 2, receiver.public(), &[funding.clone()], &mut rng)
        .unwrap();

    assert_eq!(steps.len(), 1);
    let step = &steps[0];
    assert_eq!(step.proof_id, ProofId::Send);
    assert_eq!(step.num_input_notes(), 1);
    assert_eq!(step.outputs[0].as_ref().unwrap().val, 30);
    assert_eq!(step.outputs[0].as_ref().unwrap().owner, receiver.public());
    assert_eq!(step.outputs[1].as_ref().unwrap().val, 70);
    assert_eq!(step.outputs[1].as_ref().unwrap().owner, account.account_key.public());

    // Output commitments differ from the consumed input's commitment.
    assert_ne!(step.output_ncs[0], funding_nc);
    assert_ne!(step.output_ncs[1], funding_nc);
    // Exactly one nullifier is revealed.
    assert_eq!(step.nullifiers[0], funding.nullifier(&account.account_key));
    assert_eq!(step.nullifiers[1], Fp::zero());
    step.check_conservation().unwrap();
}

#[test]
fn test_send_exact_amount_has_no_change_note() {
    let (account, mut rng) = account(43);
    let receiver = SigningKey::random(&mut rng);
    let funding = proved(Note::new(50, 2, account.account_key.public(), false, &mut rng));

    let builder = JoinSplitBuilder::new(&account, SignerMode::SigningKey);
    let steps = builder
        .send(50, 2, receiver.public(), &[funding], &mut rng)
        .unwrap();
    assert!(steps[0].outputs[1].is_none());
    steps[0].check_conservation().unwrap();
}

#[test]
fn test_withdraw_chains_consolidation_steps() {
    let (account, mut rng) = account(44);
    let owner = account.account_key.public();
    let notes: Vec<Note> = (0..3)
        .map(|_| proved(Note::new(40, 2, owner, false, &mut rng)))
        .collect();

    let builder = JoinSplitBuilder::new(&account, SignerMode::SigningKey);
    let steps = builder
        .withdraw(100, 2, account.signing_key.public(), &notes, &mut rng)
        .unwrap();

    assert_eq!(steps.len(), 2, "two chained join-split steps");

    // Step 1 consolidates two 40s into a self-owned 80.
    let first = &steps[0];
    assert_eq!(first.proof_id, ProofId::Send);
    assert_eq!(first.num_input_notes(), 2);
    let merged = first.outputs[0].as_ref().unwrap();
    assert_eq!(merged.val, 80);
    assert_eq!(merged.owner, owner);

    // The final step spends the merged note plus the remaining 40.
    let last = &steps[1];
    assert_eq!(last.proof_id, ProofId::Withdraw);
    assert_eq!(last.public_value, 100);
    assert_eq!(last.num_input_notes(), 2);
    let input_total: u128 = last.inputs.iter().flatten().map(|n| n.val).sum();
    assert_eq!(input_total, 120);
    assert!(last.outputs[0].is_none(), "withdrawn value leaves via the public leg");
    assert_eq!(last.outputs[1].as_ref().unwrap().val, 20);
    for step in &steps {
        step.check_conservation().unwrap();
    }
}

#[test]
fn test_insufficient_funds_is_reported() {
    let (account, mut rng) = account(45);
    let receiver = SigningKey::random(&mut rng);
    let funding = proved(Note::new(10, 2, account.account_key.public(), false, &mut rng));

    let builder = JoinSplitBuilder::new(&account, SignerMode::SigningKey);
    let err = builder
        .send(30, 2, receiver.public(), &[funding], &mut rng)
        .unwrap_err();
    assert!(matches!(err, VeilError::InsufficientFunds { asset_id: 2 }));
}

#[test]
fn test_other_assets_are_not_spent() {
    let (account, mut rng) = account(46);
    let receiver = SigningKey::random(&mut rng);
    let wrong_asset = proved(Note::new(100, 7, account.account_key.public(), false, &mut rng));

    let builder = JoinSplitBuilder::new(&account, SignerMode::SigningKey);
    let err = builder
        .send(30, 2, receiver.public(), &[wrong_asset], &mut rng)
        .unwrap_err();
    assert!(matches!(err, VeilError::InsufficientFunds { asset_id: 2 }));
}

#[test]
fn test_step_signatures_verify_under_mode_signer() {
    let (account, mut rng) = account(47);
    let receiver = SigningKey::random(&mut rng);
    let funding = proved(Note::new(100, 2, account.account_key.public(), false, &mut rng));

    let steps = JoinSplitBuilder::new(&account, SignerMode::SigningKey)
        .send(30, 2, receiver.public(), &[funding.clone()], &mut rng)
        .unwrap();
    assert!(verify_step_signature(&steps[0], &account.signing_key.public()));
    assert!(!verify_step_signature(&steps[0], &account.account_key.public()));

    let steps = JoinSplitBuilder::new(&account, SignerMode::AccountKey)
        .send(30, 2, receiver.public(), &[funding], &mut rng)
        .unwrap();
    assert!(verify_step_signature(&steps[0], &account.account_key.public()));
}

#[test]
fn test_minimal_pair_selection() {
    let (account, mut rng) = account(48);
    let receiver = SigningKey::random(&mut rng);
    let owner = account.account_key.public();
    let notes = vec![
        proved(Note::new(5, 2, owner, false, &mut rng)),
        proved(Note::new(60, 2, owner, false, &mut rng)),
        proved(Note::new(45, 2, owner, false, &mut rng)),
    ];

    let steps = JoinSplitBuilder::new(&account, SignerMode::SigningKey)
        .send(100, 2, receiver.public(), &notes, &mut rng)
        .unwrap();

    // 60 + 45 covers the request without a consolidation round.
    assert_eq!(steps.len(), 1);
    let spent: u128 = steps[0].inputs.iter().flatten().map(|n| n.val).sum();
    assert_eq!(spent, 105);
    assert_eq!(steps[0].outputs[1].as_ref().unwrap().val, 5);
}
