//! Note encryption.
//!
//! The transport key is a Diffie-Hellman secret between the sender's signing
//! key and the recipient's account key, so both ends (and only they) can
//! decrypt. The plaintext is the note's six-field tuple; each field is
//! blinded with a Poseidon keystream and the whole ciphertext carries a
//! sponge tag, so decryption under an unrelated key can never produce a
//! structurally valid note.

use halo2_proofs::halo2curves::{bn256::Fr as Fp, group::ff::PrimeField};
use serde::{Deserialize, Serialize};

use crate::account::EigenAddress;
use crate::error::VeilError;
use crate::note::{Note, NoteState};
use crate::primitives::{poseidon_hash, poseidon_sponge, shared_secret, Point, SigningKey};
use crate::utils::{fp_to_u128, u128_to_fp};

/// Alias carried by notes received before the recipient registered.
pub const DEFAULT_ALIAS: &str = "__DEFAULT_ALIAS__";

const PLAINTEXT_FIELDS: usize = 6;

/// The stored/transmitted form of a note: the sender's signing address (the
/// recipient's DH counterpart) plus the hex ciphertext. Persistence of these
/// records is the storage collaborator's concern; the encoding here is not.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EncryptedNoteRecord {
    pub alias: String,
    pub index: u64,
    pub pub_key: EigenAddress,
    pub content: String,
    pub state: NoteState,
}

/// A decrypted note together with its alias-binding status.
#[derive(Clone, Debug)]
pub struct DecryptedNote {
    pub note: Note,
    /// True when the record was already bound to the caller's alias; wild
    /// notes (received under [`DEFAULT_ALIAS`]) need an adoption pass.
    pub adopted: bool,
}

fn keystream(key: Fp, index: u64) -> Fp {
    poseidon_hash([key, Fp::from(index)])
}

fn note_fields(note: &Note) -> [Fp; PLAINTEXT_FIELDS] {
    [
        u128_to_fp(note.val),
        note.secret,
        Fp::from(u64::from(note.asset_id)),
        note.owner.x,
        note.owner.y,
        Fp::from(u64::from(note.account_required)),
    ]
}

/// Encrypts `note` from `sender` (signing key) to `recipient` (account
/// public key), binding the record to `alias`.
pub fn encrypt_note(
    note: &Note,
    sender: &SigningKey,
    recipient: &Point,
    alias: &str,
) -> EncryptedNoteRecord {
    let key = shared_secret(sender.scalar(), recipient);
    let fields = note_fields(note);

    let mut blob = Vec::with_capacity(PLAINTEXT_FIELDS + 1);
    for (i, field) in fields.iter().enumerate() {
        blob.push(*field + keystream(key, i as u64));
    }
    let mut tag_input = vec![key];
    tag_input.extend_from_slice(&blob);
    blob.push(poseidon_sponge(&tag_input));

    let mut bytes = Vec::with_capacity(blob.len() * 32);
    for field in &blob {
        bytes.extend_from_slice(field.to_repr().as_ref());
    }

    EncryptedNoteRecord {
        alias: alias.to_string(),
        index: note.index,
        pub_key: EigenAddress::from_point(&sender.public()),
        content: hex::encode(bytes),
        state: note.state,
    }
}

/// Decrypts one record with the recipient's account key. Fails with a
/// crypto error when the record was not encrypted to this key.
pub fn decrypt_note(
    record: &EncryptedNoteRecord,
    account_key: &SigningKey,
) -> Result<Note, VeilError> {
    let sender_pk = record.pub_key.point()?;
    let key = shared_secret(account_key.scalar(), &sender_pk);

    let bytes = hex::decode(&record.content)
        .map_err(|e| VeilError::Validation(format!("bad note ciphertext hex: {e}")))?;
    if bytes.len() != (PLAINTEXT_FIELDS + 1) * 32 {
        return Err(VeilError::Validation("note ciphertext has wrong length".to_string()));
    }

    let mut blob = Vec::with_capacity(PLAINTEXT_FIELDS + 1);
    for chunk in bytes.chunks(32) {
        let mut repr = [0u8; 32];
        repr.copy_from_slice(chunk);
        let field = Option::<Fp>::from(Fp::from_repr(repr))
            .ok_or_else(|| VeilError::Validation("note ciphertext is not a field element".to_string()))?;
        blob.push(field);
    }

    let stored_tag = blob.pop().unwrap();
    let mut tag_input = vec![key];
    tag_input.extend_from_slice(&blob);
    if poseidon_sponge(&tag_input) != stored_tag {
        return Err(VeilError::Crypto("note decryption tag mismatch"));
    }

    let mut fields = [Fp::zero(); PLAINTEXT_FIELDS];
    for (i, cipher) in blob.iter().enumerate() {
        fields[i] = *cipher - keystream(key, i as u64);
    }

    let owner = Point { x: fields[3], y: fields[4] };
    if !owner.is_on_curve() {
        return Err(VeilError::Crypto("decrypted owner is not on the curve"));
    }
    Ok(Note {
        val: fp_to_u128(&fields[0])?,
        asset_id: u32::try_from(fp_to_u128(&fields[2])?)
            .map_err(|_| VeilError::Validation("asset id out of range".to_string()))?,
        secret: fields[1],
        owner,
        account_required: fields[5] != Fp::zero(),
        index: record.index,
        state: record.state,
    })
}

/// Decrypts every record visible to `account_key`, skipping records
/// addressed to other keys. `skip_zero_note` elides zero-value padding
/// notes from the result.
pub fn decrypt_notes(
    account_key: &SigningKey,
    records: &[EncryptedNoteRecord],
    skip_zero_note: bool,
) -> Vec<DecryptedNote> {
    let mut out = Vec::new();
    for record in records {
        match decrypt_note(record, account_key) {
            Ok(note) => {
                if skip_zero_note && note.is_zero() {
                    continue;
                }
                out.push(DecryptedNote {
                    note,
                    adopted: record.alias != DEFAULT_ALIAS,
                });
            }
            Err(_) => {
                tracing::debug!(index = record.index, "skipping note not addressed to this key");
            }
        }
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_encrypt_decrypt_round_trip() {
        let mut rng = StdRng::seed_from_u64(31);
        let sender = SigningKey::random(&mut rng);
        let recipient = SigningKey::random(&mut rng);
        let note = Note::new(100, 2, recipient.public(), false, &mut rng);

        let record = encrypt_note(&note, &sender, &recipient.public(), "Alice");
        let decrypted = decrypt_note(&record, &recipient).unwrap();
        assert_eq!(decrypted, note);
    }

    #[test]
    fn test_decrypt_with_unrelated_key_fails() {
        let mut rng = StdRng::seed_from_u64(32);
        let sender = SigningKey::random(&mut rng);
        let recipient = SigningKey::random(&mut rng);
        let outsider = SigningKey::random(&mut rng);
        let note = Note::new(100, 2, recipient.public(), false, &mut rng);

        let record = encrypt_note(&note, &sender, &recipient.public(), "Alice");
        assert!(decrypt_note(&record, &outsider).is_err());
    }

    #[test]
    fn test_sender_can_reread_change_note() {
        // Change notes go back to the sender's own account key; the sender
        // decrypts them with the account key against the signing pubkey.
        let mut rng = StdRng::seed_from_u64(33);
        let account = SigningKey::random(&mut rng);
        let signing = SigningKey::random(&mut rng);
        let note = Note::new(70, 2, account.public(), false, &mut rng);

        let record = encrypt_note(&note, &signing, &account.public(), "Alice");
        assert_eq!(decrypt_note(&record, &account).unwrap(), note);
    }

    #[test]
    fn test_decrypt_notes_flags_wild_records() {
        let mut rng = StdRng::seed_from_u64(34);
        let sender = SigningKey::random(&mut rng);
        let recipient = SigningKey::random(&mut rng);
        let note = Note::new(10, 1, recipient.public(), false, &mut rng);

        let adopted = encrypt_note(&note, &sender, &recipient.public(), "Alice");
        let wild = encrypt_note(&note, &sender, &recipient.public(), DEFAULT_ALIAS);

        let decrypted = decrypt_notes(&recipient, &[adopted, wild], true);
        assert_eq!(decrypted.len(), 2);
        assert!(decrypted[0].adopted);
        assert!(!decrypted[1].adopted);
    }

    #[test]
    fn test_decrypt_notes_skips_foreign_and_zero_notes() {
        let mut rng = StdRng::seed_from_u64(35);
        let sender = SigningKey::random(&mut rng);
        let recipient = SigningKey::random(&mut rng);
        let stranger = SigningKey::random(&mut rng);

        let mine = Note::new(10, 1, recipient.public(), false, &mut rng);
        let zero = Note::zero(1, recipient.public(), false);
        let theirs = Note::new(10, 1, stranger.public(), false, &mut rng);

        let records = vec![
            encrypt_note(&mine, &sender, &recipient.public(), "Alice"),
            encrypt_note(&zero, &sender, &recipient.public(), "Alice"),
            encrypt_note(&theirs, &sender, &stranger.public(), "Bob"),
        ];

        let decrypted = decrypt_notes(&recipient, &records, true);
        assert_eq!(decrypted.len(), 1);
        assert_eq!(decrypted[0].note.val, 10);
    }
}
