//! Authentication infrastructure module
//!
//! Bearer tokens are issued by the Phenoflow frontend; this service only
//! verifies them.

mod jwt;

#[cfg(test)]
pub(crate) use jwt::test_keys;
pub use jwt::{RsaTokenVerifier, TokenClaims, TokenVerifier};
