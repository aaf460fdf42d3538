use halo2_proofs::halo2curves::{bn256::Fr as Fp, group::ff::PrimeField};
use num_bigint::BigUint;

use crate::error::VeilError;

/// Converts a BigUint to a field element. The input must be reduced.
pub fn big_uint_to_fp(big_int: &BigUint) -> Fp {
    Fp::from_str_vartime(&big_int.to_str_radix(10)[..]).unwrap()
}

/// Converts a field element to its canonical BigUint representation.
pub fn fp_to_big_uint(f: &Fp) -> BigUint {
    BigUint::from_bytes_le(f.to_repr().as_ref())
}

/// Reduces an arbitrary little-endian byte string into the field.
pub fn fp_from_le_bytes_mod(bytes: &[u8]) -> Fp {
    let modulus = field_modulus();
    big_uint_to_fp(&(BigUint::from_bytes_le(bytes) % modulus))
}

/// The BN256 scalar field modulus.
pub fn field_modulus() -> BigUint {
    fp_to_big_uint(&-Fp::one()) + BigUint::from(1u8)
}

/// Decimal-string form of a field element, the external prover's native encoding.
pub fn fp_to_dec_string(f: &Fp) -> String {
    fp_to_big_uint(f).to_str_radix(10)
}

/// Parses a decimal string back into a field element.
pub fn fp_from_dec_string(s: &str) -> Result<Fp, VeilError> {
    let parsed = BigUint::parse_bytes(s.as_bytes(), 10)
        .ok_or_else(|| VeilError::Validation(format!("not a decimal field element: {s}")))?;
    if parsed >= field_modulus() {
        return Err(VeilError::Validation(format!("field element out of range: {s}")));
    }
    Ok(big_uint_to_fp(&parsed))
}

/// Embeds a note value into the field.
pub fn u128_to_fp(v: u128) -> Fp {
    big_uint_to_fp(&BigUint::from(v))
}

/// Recovers a note value from a field element, rejecting anything wider than 128 bits.
pub fn fp_to_u128(f: &Fp) -> Result<u128, VeilError> {
    let repr = f.to_repr();
    let (low, high) = repr.as_ref().split_at(16);
    if high.iter().any(|b| *b != 0) {
        return Err(VeilError::Validation("value exceeds 128 bits".to_string()));
    }
    let mut le = [0u8; 16];
    le.copy_from_slice(low);
    Ok(u128::from_le_bytes(le))
}

/// Serde adapters rendering field elements as decimal strings.
pub mod fr_serde {
    use super::*;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(f: &Fp, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&fp_to_dec_string(f))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Fp, D::Error> {
        let s = String::deserialize(deserializer)?;
        fp_from_dec_string(&s).map_err(serde::de::Error::custom)
    }
}

/// Serde adapters for vectors of field elements.
pub mod fr_vec_serde {
    use super::*;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &[Fp], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(v.iter().map(fp_to_dec_string))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Fp>, D::Error> {
        let strings = Vec::<String>::deserialize(deserializer)?;
        strings
            .iter()
            .map(|s| fp_from_dec_string(s).map_err(serde::de::Error::custom))
            .collect()
    }
}

/// Serde adapters for per-slot sibling matrices.
pub mod fr_mat_serde {
    use super::*;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(m: &[Vec<Fp>], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(
            m.iter()
                .map(|row| row.iter().map(fp_to_dec_string).collect::<Vec<_>>()),
        )
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<Vec<Fp>>, D::Error> {
        let rows = Vec::<Vec<String>>::deserialize(deserializer)?;
        rows.iter()
            .map(|row| {
                row.iter()
                    .map(|s| fp_from_dec_string(s).map_err(serde::de::Error::custom))
                    .collect()
            })
            .collect()
    }
}
