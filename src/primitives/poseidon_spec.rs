//! Specification for a rate 1 Poseidon over the BN256 scalar field.
//! Patterned after [halo2_gadgets::poseidon::primitives::P128Pow5T3].
//! The same parameterization is instantiated inside the external arithmetic
//! circuit; commitments and nullifiers must match it bit for bit.

use halo2_gadgets::poseidon::primitives::{generate_constants, Mds, Spec};
use halo2_proofs::arithmetic::Field;
use halo2_proofs::halo2curves::bn256::Fr as Fp;

pub(crate) const WIDTH: usize = 2;
pub(crate) const RATE: usize = 1;

#[derive(Debug, Clone, Copy)]
pub struct PoseidonSpec;

impl Spec<Fp, WIDTH, RATE> for PoseidonSpec {
    fn full_rounds() -> usize {
        8
    }

    fn partial_rounds() -> usize {
        56
    }

    fn sbox(val: Fp) -> Fp {
        val.pow_vartime([5])
    }

    fn secure_mds() -> usize {
        0
    }

    fn constants() -> (Vec<[Fp; WIDTH]>, Mds<Fp, WIDTH>, Mds<Fp, WIDTH>) {
        generate_constants::<_, Self, WIDTH, RATE>()
    }
}
