//! Account key material and lifecycle operations.
//!
//! An account binds a human-readable alias to four Baby Jubjub key pairs:
//! the account key (note ownership), the active signing key and two
//! pre-staged rotation keys. The account commitment
//! `H(npk.x, npk.y, spk.x, spk.y, alias_hash)` sits in the state tree with
//! value 1 and marks the alias's signing authority as active; exactly one
//! must be active per alias at a time.

mod address;

use blake2b_simd::blake2b;
use halo2_proofs::halo2curves::bn256::Fr as Fp;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::VeilError;
use crate::primitives::{poseidon_hash, seal_bytes, unseal_bytes, Point, Signature, SigningKey};
use crate::utils::fp_from_le_bytes_mod;

pub use address::{EigenAddress, EthAddress, EIG_PREFIX, ETH_PREFIX};

/// Which key authorizes an operation. Resolved once per operation context
/// instead of threading a boolean through every call site.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignerMode {
    /// The rotating signing key signs; the normal mode.
    SigningKey,
    /// The account key itself signs ("account required" operations).
    AccountKey,
}

impl SignerMode {
    pub fn account_required(&self) -> bool {
        matches!(self, SignerMode::AccountKey)
    }
}

/// Circuit-friendly identifier of an account handle: BLAKE2b-512 of the
/// alias, first 32 bytes pruned the way the signing-scalar derivation does,
/// reduced into the field.
pub fn alias_hash(alias: &str) -> Fp {
    let digest = blake2b(alias.as_bytes());
    let mut half = [0u8; 32];
    half.copy_from_slice(&digest.as_bytes()[..32]);
    half[0] &= 0xf8;
    half[31] &= 0x7f;
    half[31] |= 0x40;
    fp_from_le_bytes_mod(&half)
}

/// The account commitment: `H(npk.x, npk.y, spk.x, spk.y, alias_hash)`.
pub fn account_compress(npk: &Point, spk: &Point, alias_hash: Fp) -> Fp {
    poseidon_hash([npk.x, npk.y, spk.x, spk.y, alias_hash])
}

/// Nullifier marking an alias's account-creation intent. Its leaf stores the
/// created commitment, so a second CREATE for the same alias conflicts while
/// a retried CREATE stays idempotent.
pub fn alias_nullifier(alias_hash: Fp) -> Fp {
    poseidon_hash([alias_hash])
}

/// Nullifier committing a fresh account key.
pub fn account_key_nullifier(pk: &Point) -> Fp {
    poseidon_hash([pk.x, pk.y])
}

/// Nullifier consuming a prior account commitment on UPDATE/MIGRATE.
pub fn rotation_nullifier(commitment: Fp) -> Fp {
    poseidon_hash([commitment])
}

/// Digest every lifecycle operation signs, binding the alias, the old and
/// new key material and both nullifiers.
pub fn account_digest(
    alias_hash: Fp,
    account_pk_x: Fp,
    new_account_pk_x: Fp,
    new_signing_pk1_x: Fp,
    new_signing_pk2_x: Fp,
    nullifier1: Fp,
    nullifier2: Fp,
) -> Fp {
    poseidon_hash([
        alias_hash,
        account_pk_x,
        new_account_pk_x,
        new_signing_pk1_x,
        new_signing_pk2_x,
        nullifier1,
        nullifier2,
    ])
}

/// The full private key material for one alias.
#[derive(Clone, Debug)]
pub struct SecretAccount {
    pub alias: String,
    pub account_key: SigningKey,
    pub signing_key: SigningKey,
    /// Pre-staged rotation keys; an UPDATE promotes the first.
    pub new_signing_key1: SigningKey,
    pub new_signing_key2: SigningKey,
}

#[derive(Serialize, Deserialize)]
struct AccountSeeds {
    alias: String,
    account: String,
    signing: String,
    staged1: String,
    staged2: String,
}

#[derive(Serialize, Deserialize)]
struct SealedAccount {
    data: String,
}

fn password_key(password: &str) -> [u8; 32] {
    let digest = blake2b(password.as_bytes());
    let mut key = [0u8; 32];
    key.copy_from_slice(&digest.as_bytes()[..32]);
    key
}

impl SecretAccount {
    /// Generates four fresh key pairs for a new alias.
    pub fn new<R: RngCore>(alias: &str, rng: &mut R) -> Self {
        SecretAccount {
            alias: alias.to_string(),
            account_key: SigningKey::random(rng),
            signing_key: SigningKey::random(rng),
            new_signing_key1: SigningKey::random(rng),
            new_signing_key2: SigningKey::random(rng),
        }
    }

    pub fn alias_hash(&self) -> Fp {
        alias_hash(&self.alias)
    }

    /// The key that signs under the given mode.
    pub fn signer(&self, mode: SignerMode) -> &SigningKey {
        match mode {
            SignerMode::SigningKey => &self.signing_key,
            SignerMode::AccountKey => &self.account_key,
        }
    }

    /// The currently active account commitment under the given mode.
    pub fn commitment(&self, mode: SignerMode) -> Fp {
        account_compress(
            &self.account_key.public(),
            &self.signer(mode).public(),
            self.alias_hash(),
        )
    }

    pub fn address(&self) -> EigenAddress {
        EigenAddress::from_point(&self.account_key.public())
    }

    /// Seals the key seeds under a password for storage by the external
    /// persistence collaborator.
    pub fn serialize(&self, password: &str) -> String {
        let seeds = AccountSeeds {
            alias: self.alias.clone(),
            account: hex::encode(self.account_key.seed()),
            signing: hex::encode(self.signing_key.seed()),
            staged1: hex::encode(self.new_signing_key1.seed()),
            staged2: hex::encode(self.new_signing_key2.seed()),
        };
        let plain = serde_json::to_vec(&seeds).unwrap();
        let sealed = SealedAccount {
            data: hex::encode(seal_bytes(&password_key(password), &plain)),
        };
        serde_json::to_string(&sealed).unwrap()
    }

    /// Reverses [`SecretAccount::serialize`]; a wrong password surfaces as a
    /// crypto error, never as garbage keys.
    pub fn deserialize(password: &str, blob: &str) -> Result<Self, VeilError> {
        let sealed: SealedAccount = serde_json::from_str(blob)
            .map_err(|e| VeilError::Validation(format!("malformed account blob: {e}")))?;
        let bytes = hex::decode(&sealed.data)
            .map_err(|e| VeilError::Validation(format!("malformed account blob: {e}")))?;
        let plain = unseal_bytes(&password_key(password), &bytes)?;
        let seeds: AccountSeeds = serde_json::from_slice(&plain)
            .map_err(|_| VeilError::Crypto("account blob did not decrypt"))?;

        let seed = |s: &str| -> Result<[u8; 32], VeilError> {
            hex::decode(s)
                .map_err(|_| VeilError::Crypto("account blob did not decrypt"))?
                .try_into()
                .map_err(|_| VeilError::Crypto("account blob did not decrypt"))
        };
        Ok(SecretAccount {
            alias: seeds.alias,
            account_key: SigningKey::from_seed(seed(&seeds.account)?),
            signing_key: SigningKey::from_seed(seed(&seeds.signing)?),
            new_signing_key1: SigningKey::from_seed(seed(&seeds.staged1)?),
            new_signing_key2: SigningKey::from_seed(seed(&seeds.staged2)?),
        })
    }
}

/// Discriminants shared with the external circuit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccountAction {
    Create = 11,
    Migrate = 12,
    Update = 13,
}

impl AccountAction {
    pub fn id(&self) -> u64 {
        *self as u64
    }
}

/// A fully derived lifecycle state transition, ready for tree registration
/// and circuit-input assembly.
#[derive(Clone, Debug)]
pub struct AccountOperation {
    pub action: AccountAction,
    pub alias_hash: Fp,
    pub account_pk: Point,
    pub signing_pk: Point,
    pub new_account_pk: Point,
    pub new_signing_pk1: Point,
    pub new_signing_pk2: Point,
    /// The commitment this operation activates.
    pub commitment: Fp,
    /// Commitments over both staged signing keys.
    pub output_ncs: [Fp; 2],
    pub nullifiers: [Fp; 2],
    pub signature: Signature,
}

impl AccountOperation {
    /// Derives commitments, nullifiers and the signed digest for one
    /// lifecycle transition of `account`.
    pub fn new(
        action: AccountAction,
        account: &SecretAccount,
        mode: SignerMode,
        new_account_pk: Point,
        new_signing_pk1: Point,
        new_signing_pk2: Point,
    ) -> Result<Self, VeilError> {
        let alias_hash = account.alias_hash();
        let account_pk = account.account_key.public();
        let signing_pk = account.signer(mode).public();
        let old_commitment = account_compress(&account_pk, &signing_pk, alias_hash);

        let commitment = account_compress(&new_account_pk, &new_signing_pk1, alias_hash);
        let output_ncs = [
            commitment,
            account_compress(&new_account_pk, &new_signing_pk2, alias_hash),
        ];

        let nullifiers = match action {
            AccountAction::Create => [
                alias_nullifier(alias_hash),
                account_key_nullifier(&new_account_pk),
            ],
            AccountAction::Update => [rotation_nullifier(old_commitment), Fp::zero()],
            AccountAction::Migrate => [
                rotation_nullifier(old_commitment),
                account_key_nullifier(&new_account_pk),
            ],
        };

        let digest = account_digest(
            alias_hash,
            account_pk.x,
            new_account_pk.x,
            new_signing_pk1.x,
            new_signing_pk2.x,
            nullifiers[0],
            nullifiers[1],
        );
        let signature = account.account_key.sign(digest);

        Ok(AccountOperation {
            action,
            alias_hash,
            account_pk,
            signing_pk,
            new_account_pk,
            new_signing_pk1,
            new_signing_pk2,
            commitment,
            output_ncs,
            nullifiers,
            signature,
        })
    }

    /// The digest the signature covers, recomputed for verification.
    pub fn digest(&self) -> Fp {
        account_digest(
            self.alias_hash,
            self.account_pk.x,
            self.new_account_pk.x,
            self.new_signing_pk1.x,
            self.new_signing_pk2.x,
            self.nullifiers[0],
            self.nullifiers[1],
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_alias_hash_is_deterministic() {
        assert_eq!(alias_hash("Alice"), alias_hash("Alice"));
        assert_ne!(alias_hash("Alice"), alias_hash("Bob"));
    }

    #[test]
    fn test_account_compress_binds_all_inputs() {
        let mut rng = StdRng::seed_from_u64(11);
        let a = SigningKey::random(&mut rng);
        let b = SigningKey::random(&mut rng);
        let h = alias_hash("Alice");
        let c = account_compress(&a.public(), &b.public(), h);
        assert_ne!(c, account_compress(&b.public(), &a.public(), h));
        assert_ne!(c, account_compress(&a.public(), &b.public(), alias_hash("Bob")));
    }

    #[test]
    fn test_sealed_account_round_trip() {
        let mut rng = StdRng::seed_from_u64(12);
        let account = SecretAccount::new("Alice", &mut rng);
        let blob = account.serialize("hunter2");
        let recovered = SecretAccount::deserialize("hunter2", &blob).unwrap();
        assert_eq!(recovered.alias, "Alice");
        assert_eq!(recovered.account_key.public(), account.account_key.public());
        assert_eq!(recovered.signing_key.public(), account.signing_key.public());
    }

    #[test]
    fn test_sealed_account_rejects_wrong_password() {
        let mut rng = StdRng::seed_from_u64(13);
        let account = SecretAccount::new("Alice", &mut rng);
        let blob = account.serialize("hunter2");
        assert!(SecretAccount::deserialize("*******", &blob).is_err());
    }

    #[test]
    fn test_create_operation_signature_verifies() {
        let mut rng = StdRng::seed_from_u64(14);
        let account = SecretAccount::new("Alice", &mut rng);
        let op = AccountOperation::new(
            AccountAction::Create,
            &account,
            SignerMode::SigningKey,
            account.account_key.public(),
            account.new_signing_key1.public(),
            account.new_signing_key2.public(),
        )
        .unwrap();

        assert!(SigningKey::verify(
            &account.account_key.public(),
            op.digest(),
            &op.signature
        ));
        assert_ne!(op.nullifiers[0], Fp::zero());
        assert_ne!(op.nullifiers[1], Fp::zero());
    }

    #[test]
    fn test_update_operation_consumes_prior_commitment() {
        let mut rng = StdRng::seed_from_u64(15);
        let account = SecretAccount::new("Alice", &mut rng);
        let op = AccountOperation::new(
            AccountAction::Update,
            &account,
            SignerMode::SigningKey,
            account.account_key.public(),
            account.new_signing_key1.public(),
            account.new_signing_key2.public(),
        )
        .unwrap();

        let old = account.commitment(SignerMode::SigningKey);
        assert_eq!(op.nullifiers[0], rotation_nullifier(old));
        assert_eq!(op.nullifiers[1], Fp::zero());
        assert_ne!(op.commitment, old);
    }
}
