//! Baby Jubjub, the twisted Edwards curve whose base field is the BN256
//! scalar field, so that point coordinates are circuit field elements.
//! Curve equation: `a·x² + y² = 1 + d·x²·y²` with `a = 168700`, `d = 168696`.

use halo2_proofs::halo2curves::{
    bn256::Fr as Fp,
    group::ff::{Field, PrimeField},
};
use num_bigint::BigUint;

use crate::error::VeilError;
use crate::utils::fp_to_big_uint;

const EDWARDS_A: u64 = 168700;
const EDWARDS_D: u64 = 168696;

/// Order of the prime-order subgroup generated by [`Point::generator`].
pub fn suborder() -> BigUint {
    BigUint::parse_bytes(
        b"2736030358979909402780800718157159386076813972158567259200215660948447373041",
        10,
    )
    .unwrap()
}

/// A point on Baby Jubjub in affine coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Point {
    pub x: Fp,
    pub y: Fp,
}

impl Point {
    /// The additive identity `(0, 1)`.
    pub fn identity() -> Self {
        Point {
            x: Fp::zero(),
            y: Fp::one(),
        }
    }

    /// The subgroup generator `B8` (8 times the curve generator).
    pub fn generator() -> Self {
        Point {
            x: Fp::from_str_vartime(
                "5299619240641551281634865583518297030282874472190772894086521144482721001553",
            )
            .unwrap(),
            y: Fp::from_str_vartime(
                "16950150798460657717958625567821834550301663161624707787222815936182638968203",
            )
            .unwrap(),
        }
    }

    pub fn is_identity(&self) -> bool {
        self.x == Fp::zero() && self.y == Fp::one()
    }

    /// Checks the affine Edwards equation.
    pub fn is_on_curve(&self) -> bool {
        let a = Fp::from(EDWARDS_A);
        let d = Fp::from(EDWARDS_D);
        let x2 = self.x.square();
        let y2 = self.y.square();
        a * x2 + y2 == Fp::one() + d * x2 * y2
    }

    /// Complete twisted Edwards addition.
    pub fn add(&self, other: &Point) -> Point {
        let a = Fp::from(EDWARDS_A);
        let d = Fp::from(EDWARDS_D);
        let x1x2 = self.x * other.x;
        let y1y2 = self.y * other.y;
        let dxy = d * x1x2 * y1y2;
        let x3 = (self.x * other.y + self.y * other.x) * (Fp::one() + dxy).invert().unwrap();
        let y3 = (y1y2 - a * x1x2) * (Fp::one() - dxy).invert().unwrap();
        Point { x: x3, y: y3 }
    }

    pub fn double(&self) -> Point {
        self.add(self)
    }

    /// Double-and-add scalar multiplication. Scalars are taken mod the
    /// subgroup order.
    pub fn mul(&self, scalar: &BigUint) -> Point {
        let k = scalar % suborder();
        let mut acc = Point::identity();
        for i in (0..k.bits()).rev() {
            acc = acc.double();
            if k.bit(i) {
                acc = acc.add(self);
            }
        }
        acc
    }

    /// Compresses to 32 bytes: the y repr with the x sign in the top bit.
    pub fn compress(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        out.copy_from_slice(self.y.to_repr().as_ref());
        if is_negative(&self.x) {
            out[31] |= 0x80;
        }
        out
    }

    /// Decompresses a packed point, validating curve membership.
    pub fn decompress(bytes: &[u8; 32]) -> Result<Point, VeilError> {
        let x_sign = bytes[31] & 0x80 != 0;
        let mut y_repr = *bytes;
        y_repr[31] &= 0x7f;
        let y = Option::<Fp>::from(Fp::from_repr(y_repr))
            .ok_or_else(|| VeilError::Validation("point y is not a field element".to_string()))?;

        // x^2 = (1 - y^2) / (a - d * y^2)
        let a = Fp::from(EDWARDS_A);
        let d = Fp::from(EDWARDS_D);
        let y2 = y.square();
        let denominator = Option::<Fp>::from((a - d * y2).invert())
            .ok_or_else(|| VeilError::Validation("point has no x coordinate".to_string()))?;
        let x2 = (Fp::one() - y2) * denominator;
        let mut x = Option::<Fp>::from(x2.sqrt())
            .ok_or_else(|| VeilError::Validation("point is not on the curve".to_string()))?;
        if is_negative(&x) != x_sign {
            x = -x;
        }

        let point = Point { x, y };
        if !point.is_on_curve() {
            return Err(VeilError::Validation("point is not on the curve".to_string()));
        }
        Ok(point)
    }
}

/// A field element is "negative" when it exceeds `(p - 1) / 2`.
fn is_negative(f: &Fp) -> bool {
    let half = (crate::utils::field_modulus() - BigUint::from(1u8)) >> 1;
    fp_to_big_uint(f) > half
}

/// Derives the Diffie-Hellman shared secret between a private scalar and a
/// public point: the x coordinate of `scalar * point`.
pub fn shared_secret(scalar: &BigUint, point: &Point) -> Fp {
    point.mul(scalar).x
}

/// Reduces a little-endian integer into a subgroup scalar.
pub fn scalar_from_le_bytes(bytes: &[u8]) -> BigUint {
    BigUint::from_bytes_le(bytes) % suborder()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_generator_on_curve() {
        assert!(Point::generator().is_on_curve());
        assert!(Point::identity().is_on_curve());
    }

    #[test]
    fn test_generator_has_expected_order() {
        let full = Point::generator().mul(&suborder());
        assert!(full.is_identity());
    }

    #[test]
    fn test_add_identity() {
        let g = Point::generator();
        assert_eq!(g.add(&Point::identity()), g);
    }

    #[test]
    fn test_scalar_mul_distributes() {
        let g = Point::generator();
        let three = g.mul(&BigUint::from(3u8));
        assert_eq!(three, g.double().add(&g));
    }

    #[test]
    fn test_compress_round_trip() {
        let p = Point::generator().mul(&BigUint::from(12345u32));
        let unpacked = Point::decompress(&p.compress()).unwrap();
        assert_eq!(unpacked, p);
    }

    #[test]
    fn test_decompress_rejects_non_canonical_y() {
        let bytes = [0xffu8; 32];
        assert!(Point::decompress(&bytes).is_err());
    }

    #[test]
    fn test_dh_is_symmetric() {
        let a = BigUint::from(987654321u64);
        let b = BigUint::from(123456789u64);
        let pub_a = Point::generator().mul(&a);
        let pub_b = Point::generator().mul(&b);
        assert_eq!(shared_secret(&a, &pub_b), shared_secret(&b, &pub_a));
    }
}
