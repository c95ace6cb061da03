use std::fmt;

use lambdaworks_math::field::{
    element::FieldElement,
    fields::montgomery_backed_prime_fields::{IsModulus, MontgomeryBackendPrimeField},
};
use lambdaworks_math::unsigned_integer::element::U256;
use serde::{Deserialize, Serialize};

pub type Replica = usize;
pub type Round = usize;

/// Prime field modulus: the secp256k1 base field prime 2^256 - 2^32 - 977.
#[derive(Clone, Debug, Hash, Copy)]
pub struct MontgomeryConfigSecp256k1Field;
impl IsModulus<U256> for MontgomeryConfigSecp256k1Field {
    const MODULUS: U256 = U256::from_hex_unchecked(
        "FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFEFFFFFC2F",
    );
}

pub type Secp256k1Field = MontgomeryBackendPrimeField<MontgomeryConfigSecp256k1Field, 4>;
pub type LargeField = FieldElement<Secp256k1Field>;
pub type LargeFieldSer = [u8; 32];

/// Identifier of one IVSS invocation within an ICC round: the dealer and
/// which of the dealer's n secrets this instance shares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceId {
    pub round: Round,
    pub dealer: Replica,
    pub secret_idx: usize,
}

impl InstanceId {
    pub fn new(round: Round, dealer: Replica, secret_idx: usize) -> InstanceId {
        InstanceId {
            round,
            dealer,
            secret_idx,
        }
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ICC-{}-{}-{}", self.round, self.dealer, self.secret_idx)
    }
}
