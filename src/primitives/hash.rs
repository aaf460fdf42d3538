use halo2_gadgets::poseidon::primitives::{self as poseidon, ConstantLength};
use halo2_proofs::halo2curves::bn256::Fr as Fp;

use crate::primitives::poseidon_spec::{PoseidonSpec, RATE, WIDTH};

/// Hashes a constant-length array of field elements with the circuit's
/// Poseidon parameterization.
pub fn poseidon_hash<const L: usize>(inputs: [Fp; L]) -> Fp {
    poseidon::Hash::<Fp, PoseidonSpec, ConstantLength<L>, WIDTH, RATE>::init().hash(inputs)
}

/// Sponge-style hash over a variable number of field elements.
///
/// Absorbs one element per 2-ary compression starting from the zero state, so
/// inputs of different lengths never collide with a fixed-arity digest. Used
/// for step digests and the withdraw authorization digest, where the number
/// of chained roots is only known at runtime.
pub fn poseidon_sponge(inputs: &[Fp]) -> Fp {
    let mut state = Fp::from(inputs.len() as u64);
    for input in inputs {
        state = poseidon_hash([state, *input]);
    }
    state
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_poseidon_hash_is_deterministic() {
        let a = poseidon_hash([Fp::from(1), Fp::from(2)]);
        let b = poseidon_hash([Fp::from(1), Fp::from(2)]);
        assert_eq!(a, b);
        assert_ne!(a, Fp::zero());
    }

    #[test]
    fn test_poseidon_hash_input_order_matters() {
        assert_ne!(
            poseidon_hash([Fp::from(1), Fp::from(2)]),
            poseidon_hash([Fp::from(2), Fp::from(1)])
        );
    }

    #[test]
    fn test_sponge_length_domain_separation() {
        // A trailing zero must not collide with the shorter input.
        let short = poseidon_sponge(&[Fp::from(7)]);
        let padded = poseidon_sponge(&[Fp::from(7), Fp::zero()]);
        assert_ne!(short, padded);
    }
}
