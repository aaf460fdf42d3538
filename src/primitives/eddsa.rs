//! Poseidon-flavored Schnorr signatures over Baby Jubjub.
//!
//! Key derivation follows the classic EdDSA recipe: a 32-byte seed is hashed
//! with BLAKE2b-512, the first half is pruned and shifted into the signing
//! scalar, the second half keys the deterministic nonce. The challenge hash
//! is Poseidon over `(R8.x, R8.y, A.x, A.y, m)` so the external circuit can
//! recompute it on field elements directly.

use blake2b_simd::blake2b;
use halo2_proofs::halo2curves::{bn256::Fr as Fp, group::ff::PrimeField};
use num_bigint::BigUint;
use rand::RngCore;

use crate::error::VeilError;
use crate::primitives::babyjubjub::{scalar_from_le_bytes, suborder, Point};
use crate::primitives::hash::poseidon_hash;
use crate::utils::{big_uint_to_fp, field_modulus};

/// A Baby Jubjub signing key pair.
#[derive(Clone, Debug)]
pub struct SigningKey {
    seed: [u8; 32],
    scalar: BigUint,
    public: Point,
}

/// A Schnorr signature `(R8, S)` with `S` a subgroup scalar.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    pub r8: Point,
    pub s: BigUint,
}

/// Clears the cofactor bits the way the reference EdDSA implementation does.
fn prune(buf: &mut [u8; 32]) {
    buf[0] &= 0xf8;
    buf[31] &= 0x7f;
    buf[31] |= 0x40;
}

impl SigningKey {
    pub fn random<R: RngCore>(rng: &mut R) -> Self {
        let mut seed = [0u8; 32];
        rng.fill_bytes(&mut seed);
        Self::from_seed(seed)
    }

    pub fn from_seed(seed: [u8; 32]) -> Self {
        let digest = blake2b(&seed);
        let mut half = [0u8; 32];
        half.copy_from_slice(&digest.as_bytes()[..32]);
        prune(&mut half);
        let scalar = scalar_from_le_bytes(&half) >> 3u32;
        let public = Point::generator().mul(&scalar);
        SigningKey {
            seed,
            scalar,
            public,
        }
    }

    pub fn seed(&self) -> &[u8; 32] {
        &self.seed
    }

    pub fn public(&self) -> Point {
        self.public
    }

    pub fn scalar(&self) -> &BigUint {
        &self.scalar
    }

    /// The private scalar embedded into the field, the `nk` input of the
    /// nullifier derivation.
    pub fn nullifier_key(&self) -> Fp {
        big_uint_to_fp(&(&self.scalar % field_modulus()))
    }

    /// Signs a field-element message with a deterministic nonce.
    pub fn sign(&self, message: Fp) -> Signature {
        let digest = blake2b(&self.seed);
        let mut nonce_input = Vec::with_capacity(64);
        nonce_input.extend_from_slice(&digest.as_bytes()[32..]);
        nonce_input.extend_from_slice(message.to_repr().as_ref());
        let r = scalar_from_le_bytes(blake2b(&nonce_input).as_bytes());

        let r8 = Point::generator().mul(&r);
        let challenge = challenge_scalar(&r8, &self.public, message);
        let s = (r + challenge * &self.scalar) % suborder();
        Signature { r8, s }
    }

    /// Verifies `S * B8 == R8 + challenge * A`.
    pub fn verify(public: &Point, message: Fp, signature: &Signature) -> bool {
        if signature.s >= suborder() || !signature.r8.is_on_curve() {
            return false;
        }
        let challenge = challenge_scalar(&signature.r8, public, message);
        let left = Point::generator().mul(&signature.s);
        let right = signature.r8.add(&public.mul(&challenge));
        left == right
    }
}

fn challenge_scalar(r8: &Point, public: &Point, message: Fp) -> BigUint {
    let hm = poseidon_hash([r8.x, r8.y, public.x, public.y, message]);
    crate::utils::fp_to_big_uint(&hm) % suborder()
}

impl Signature {
    /// Wire form: compressed `R8` followed by the 32-byte little-endian `S`.
    pub fn to_bytes(&self) -> [u8; 64] {
        let mut out = [0u8; 64];
        out[..32].copy_from_slice(&self.r8.compress());
        let s_bytes = self.s.to_bytes_le();
        out[32..32 + s_bytes.len()].copy_from_slice(&s_bytes);
        out
    }

    pub fn from_bytes(bytes: &[u8; 64]) -> Result<Self, VeilError> {
        let mut r8_bytes = [0u8; 32];
        r8_bytes.copy_from_slice(&bytes[..32]);
        let r8 = Point::decompress(&r8_bytes)?;
        let s = BigUint::from_bytes_le(&bytes[32..]);
        if s >= suborder() {
            return Err(VeilError::Validation("signature scalar out of range".to_string()));
        }
        Ok(Signature { r8, s })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_sign_verify_round_trip() {
        let mut rng = StdRng::seed_from_u64(1);
        let key = SigningKey::random(&mut rng);
        let msg = Fp::from(77u64);
        let sig = key.sign(msg);
        assert!(SigningKey::verify(&key.public(), msg, &sig));
    }

    #[test]
    fn test_verify_rejects_tampered_message() {
        let mut rng = StdRng::seed_from_u64(2);
        let key = SigningKey::random(&mut rng);
        let sig = key.sign(Fp::from(1u64));
        assert!(!SigningKey::verify(&key.public(), Fp::from(2u64), &sig));
    }

    #[test]
    fn test_verify_rejects_wrong_key() {
        let mut rng = StdRng::seed_from_u64(3);
        let key = SigningKey::random(&mut rng);
        let other = SigningKey::random(&mut rng);
        let msg = Fp::from(9u64);
        let sig = key.sign(msg);
        assert!(!SigningKey::verify(&other.public(), msg, &sig));
    }

    #[test]
    fn test_signing_is_deterministic() {
        let key = SigningKey::from_seed([7u8; 32]);
        let msg = Fp::from(123u64);
        assert_eq!(key.sign(msg), key.sign(msg));
    }

    #[test]
    fn test_signature_bytes_round_trip() {
        let key = SigningKey::from_seed([9u8; 32]);
        let sig = key.sign(Fp::from(5u64));
        let recovered = Signature::from_bytes(&sig.to_bytes()).unwrap();
        assert_eq!(recovered, sig);
    }
}
