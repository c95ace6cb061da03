pub mod types;
pub use types::*;

pub mod poly;

pub mod bivariate;
pub use bivariate::SymmetricBivariatePoly;

pub mod certification;
pub use certification::Certification;

pub mod service;
pub use service::{Effects, ServiceContext};
