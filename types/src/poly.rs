use anyhow::{anyhow, Result};
use lambdaworks_math::{
    polynomial::Polynomial, traits::ByteConversion, unsigned_integer::element::UnsignedInteger,
};
use rand::random;

use crate::{LargeField, LargeFieldSer, Replica};

pub fn rand_field_element() -> LargeField {
    let rand_big = UnsignedInteger { limbs: random() };
    LargeField::new(rand_big)
}

pub fn field_from_id(id: Replica) -> LargeField {
    LargeField::from(id as u64)
}

pub fn field_to_bytes(el: &LargeField) -> LargeFieldSer {
    let bytes = el.to_bytes_be();
    let mut ser = [0u8; 32];
    ser.copy_from_slice(&bytes);
    ser
}

pub fn field_from_bytes(ser: &LargeFieldSer) -> Result<LargeField> {
    LargeField::from_bytes_be(ser).map_err(|e| anyhow!("invalid field element encoding: {:?}", e))
}

pub fn poly_to_bytes(poly: &Polynomial<LargeField>) -> Vec<LargeFieldSer> {
    poly.coefficients.iter().map(field_to_bytes).collect()
}

pub fn poly_from_bytes(coeffs: &[LargeFieldSer]) -> Result<Polynomial<LargeField>> {
    let coefficients: Vec<LargeField> = coeffs
        .iter()
        .map(field_from_bytes)
        .collect::<Result<Vec<LargeField>>>()?;
    Ok(Polynomial::new(&coefficients))
}

/// Lagrange interpolation of the polynomial through (points, values),
/// evaluated at zero. Used to recover F(0,0) from the constant terms of
/// revealed univariate slices.
pub fn interpolate_at_zero(points: &[LargeField], values: &[LargeField]) -> Result<LargeField> {
    let polynomial = Polynomial::interpolate(points, values)
        .map_err(|e| anyhow!("interpolation failed: {:?}", e))?;
    Ok(polynomial.evaluate(&LargeField::zero()))
}

/// Reduces the canonical representative of a field element modulo a small
/// modulus, limb-wise from the most significant limb down. The coin modulus
/// u fits in a u64, so the accumulator never overflows a u128.
pub fn reduce_mod_small(el: &LargeField, modulus: u64) -> u64 {
    let rep = el.representative();
    let mut acc: u128 = 0;
    for limb in rep.limbs.iter() {
        acc = ((acc << 64) + *limb as u128) % modulus as u128;
    }
    acc as u64
}
