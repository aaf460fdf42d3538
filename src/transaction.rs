//! Encrypted transaction history records.
//!
//! A record stores what the owner needs to reconstruct their history: the
//! operation kind, a self-encrypted payload (amount, asset, counterparty)
//! and the proof material it settled with. Payloads are sealed under the
//! signing key's self-DH secret, so a signing-key rotation re-encrypts the
//! whole history (two-phase, see the account module).

use blake2b_simd::blake2b;
use halo2_proofs::halo2curves::group::ff::PrimeField;
use serde::{Deserialize, Serialize};

use crate::error::VeilError;
use crate::primitives::{seal_bytes, shared_secret, unseal_bytes, SigningKey};

/// The confidential payload of one transaction record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxData {
    pub from: String,
    pub to: String,
    pub amount: u128,
    pub asset_id: u32,
}

/// A stored transaction record; `tx_data` is ciphertext.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub operation: String,
    pub tx_data: String,
    pub proof: String,
    pub public_input: String,
}

fn self_key(signing_key: &SigningKey) -> [u8; 32] {
    let secret = shared_secret(signing_key.scalar(), &signing_key.public());
    let mut key = [0u8; 32];
    key.copy_from_slice(secret.to_repr().as_ref());
    key
}

/// Seals a payload under the signing key's self-DH secret.
pub fn encrypt_tx(data: &TxData, signing_key: &SigningKey) -> String {
    let plain = serde_json::to_vec(data).unwrap();
    hex::encode(seal_bytes(&self_key(signing_key), &plain))
}

/// Opens a sealed payload; fails for records sealed under another key.
pub fn decrypt_tx(blob: &str, signing_key: &SigningKey) -> Result<TxData, VeilError> {
    let bytes = hex::decode(blob)
        .map_err(|e| VeilError::Validation(format!("bad transaction ciphertext hex: {e}")))?;
    let plain = unseal_bytes(&self_key(signing_key), &bytes)?;
    serde_json::from_slice(&plain).map_err(|_| VeilError::Crypto("transaction payload did not decrypt"))
}

/// Re-seals every payload from `old_key` to `new_key`. Any record that does
/// not open under the old key aborts the whole pass, which is what lets the
/// caller keep a staged rotation all-or-nothing.
pub fn re_encrypt_txs(
    new_key: &SigningKey,
    old_key: &SigningKey,
    blobs: &[String],
) -> Result<Vec<String>, VeilError> {
    blobs
        .iter()
        .map(|blob| Ok(encrypt_tx(&decrypt_tx(blob, old_key)?, new_key)))
        .collect()
}

/// Short display hash of a settled transaction.
pub fn tx_hash(proof: &str, public_input: &str) -> String {
    let mut input = Vec::with_capacity(proof.len() + public_input.len());
    input.extend_from_slice(proof.as_bytes());
    input.extend_from_slice(public_input.as_bytes());
    let digest = blake2b(&input);
    hex::encode(&digest.as_bytes()[..20])
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn sample() -> TxData {
        TxData {
            from: "eig:aa".to_string(),
            to: "eig:bb".to_string(),
            amount: 30,
            asset_id: 2,
        }
    }

    #[test]
    fn test_tx_round_trip() {
        let mut rng = StdRng::seed_from_u64(51);
        let key = SigningKey::random(&mut rng);
        let blob = encrypt_tx(&sample(), &key);
        assert_eq!(decrypt_tx(&blob, &key).unwrap(), sample());
    }

    #[test]
    fn test_tx_rejects_foreign_key() {
        let mut rng = StdRng::seed_from_u64(52);
        let key = SigningKey::random(&mut rng);
        let other = SigningKey::random(&mut rng);
        let blob = encrypt_tx(&sample(), &key);
        assert!(decrypt_tx(&blob, &other).is_err());
    }

    #[test]
    fn test_re_encrypt_moves_records_to_new_key() {
        let mut rng = StdRng::seed_from_u64(53);
        let old_key = SigningKey::random(&mut rng);
        let new_key = SigningKey::random(&mut rng);
        let blobs = vec![encrypt_tx(&sample(), &old_key)];

        let moved = re_encrypt_txs(&new_key, &old_key, &blobs).unwrap();
        assert_eq!(decrypt_tx(&moved[0], &new_key).unwrap(), sample());
        assert!(decrypt_tx(&moved[0], &old_key).is_err());
    }

    #[test]
    fn test_re_encrypt_aborts_on_undecryptable_record() {
        let mut rng = StdRng::seed_from_u64(54);
        let old_key = SigningKey::random(&mut rng);
        let new_key = SigningKey::random(&mut rng);
        let stranger = SigningKey::random(&mut rng);
        let blobs = vec![
            encrypt_tx(&sample(), &old_key),
            encrypt_tx(&sample(), &stranger),
        ];
        assert!(re_encrypt_txs(&new_key, &old_key, &blobs).is_err());
    }

    #[test]
    fn test_tx_hash_is_stable() {
        assert_eq!(tx_hash("p", "i"), tx_hash("p", "i"));
        assert_ne!(tx_hash("p", "i"), tx_hash("p", "j"));
        assert_eq!(tx_hash("p", "i").len(), 40);
    }
}
