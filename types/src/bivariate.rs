use lambdaworks_math::polynomial::Polynomial;

use crate::poly::{field_from_id, rand_field_element};
use crate::{LargeField, Replica};

/// Symmetric bivariate polynomial F(x,y) of degree t in each variable,
/// stored as a (t+1) x (t+1) coefficient matrix with C[i][j] = C[j][i].
/// The dealer's secret is F(0,0) = C[0][0].
#[derive(Debug, Clone)]
pub struct SymmetricBivariatePoly {
    coeffs: Vec<Vec<LargeField>>,
    degree: usize,
}

impl SymmetricBivariatePoly {
    /// Samples a uniformly random symmetric polynomial with F(0,0) = secret.
    pub fn random(degree: usize, secret: LargeField) -> SymmetricBivariatePoly {
        let mut coeffs = vec![vec![LargeField::zero(); degree + 1]; degree + 1];
        coeffs[0][0] = secret;
        for i in 0..=degree {
            for j in 0..=i {
                if i == 0 && j == 0 {
                    continue;
                }
                let val = rand_field_element();
                coeffs[i][j] = val.clone();
                coeffs[j][i] = val;
            }
        }
        SymmetricBivariatePoly { coeffs, degree }
    }

    pub fn degree(&self) -> usize {
        self.degree
    }

    pub fn secret(&self) -> &LargeField {
        &self.coeffs[0][0]
    }

    /// The univariate slice f_k(y) = F(k, y) sent to process k.
    /// Coefficient j of the slice is sum_i C[i][j] * k^i.
    pub fn univariate_slice(&self, k: Replica) -> Polynomial<LargeField> {
        let k_fe = field_from_id(k);
        let mut k_powers = Vec::with_capacity(self.degree + 1);
        let mut power = LargeField::one();
        for _ in 0..=self.degree {
            k_powers.push(power.clone());
            power = power * k_fe.clone();
        }

        let mut slice_coeffs = Vec::with_capacity(self.degree + 1);
        for j in 0..=self.degree {
            let mut coeff_j = LargeField::zero();
            for i in 0..=self.degree {
                coeff_j = coeff_j + self.coeffs[i][j].clone() * k_powers[i].clone();
            }
            slice_coeffs.push(coeff_j);
        }
        Polynomial::new(&slice_coeffs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poly::interpolate_at_zero;

    #[test]
    fn slices_are_pairwise_symmetric() {
        let poly = SymmetricBivariatePoly::random(2, LargeField::from(42u64));
        for i in 1..=5usize {
            for j in 1..=5usize {
                let f_i = poly.univariate_slice(i);
                let f_j = poly.univariate_slice(j);
                assert_eq!(
                    f_i.evaluate(&field_from_id(j)),
                    f_j.evaluate(&field_from_id(i)),
                    "F({},{}) != F({},{})",
                    i,
                    j,
                    j,
                    i
                );
            }
        }
    }

    #[test]
    fn constant_terms_interpolate_to_secret() {
        let secret = LargeField::from(42u64);
        let poly = SymmetricBivariatePoly::random(1, secret.clone());

        // f_k(0) = F(k, 0); interpolating those through k = 1..t+2 at zero
        // recovers F(0,0).
        let points: Vec<LargeField> = (1..=3).map(field_from_id).collect();
        let values: Vec<LargeField> = (1..=3)
            .map(|k| poly.univariate_slice(k).evaluate(&LargeField::zero()))
            .collect();
        assert_eq!(interpolate_at_zero(&points, &values).unwrap(), secret);
    }
}
