//! Bearer token verification against an RSA public key

use std::fmt::Debug;

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::config::AuthConfig;
use crate::domain::DomainError;

/// Claims read from a verified token
///
/// Tokens are issued elsewhere; only the claims this service logs are kept.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject (user ID)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Expiration timestamp (Unix epoch), checked when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}

impl TokenClaims {
    /// Best available caller identity for logs
    pub fn subject(&self) -> &str {
        self.username
            .as_deref()
            .or(self.sub.as_deref())
            .unwrap_or("anonymous")
    }
}

/// Trait for verifying bearer tokens
pub trait TokenVerifier: Send + Sync + Debug {
    /// Verify a token and return its claims
    fn verify(&self, token: &str) -> Result<TokenClaims, DomainError>;
}

/// RS256 verifier built from a PEM-encoded public key
#[derive(Clone)]
pub struct RsaTokenVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl Debug for RsaTokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RsaTokenVerifier")
            .field("algorithm", &Algorithm::RS256)
            .field("decoding_key", &"[hidden]")
            .finish()
    }
}

impl RsaTokenVerifier {
    /// Build a verifier from a PKCS#1 or SPKI PEM public key
    pub fn from_pem(pem: &[u8]) -> Result<Self, DomainError> {
        let decoding_key = DecodingKey::from_rsa_pem(pem).map_err(|e| {
            DomainError::configuration(format!("Failed to load RSA public key: {}", e))
        })?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.required_spec_claims.clear();
        validation.validate_exp = true;

        Ok(Self {
            decoding_key,
            validation,
        })
    }

    /// Load the key named by the `auth` section; inline PEM wins over a path
    pub fn from_config(config: &AuthConfig) -> Result<Self, DomainError> {
        if let Some(pem) = &config.public_key_pem {
            return Self::from_pem(pem.as_bytes());
        }

        let Some(path) = &config.public_key_path else {
            return Err(DomainError::configuration(
                "auth.public_key_path or auth.public_key_pem must be set",
            ));
        };

        let pem = std::fs::read(path).map_err(|e| {
            DomainError::configuration(format!(
                "Failed to read public key {}: {}",
                path.display(),
                e
            ))
        })?;

        Self::from_pem(&pem)
    }
}

impl TokenVerifier for RsaTokenVerifier {
    fn verify(&self, token: &str) -> Result<TokenClaims, DomainError> {
        let token_data = decode::<TokenClaims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| DomainError::validation(format!("Invalid JWT: {}", e)))?;

        Ok(token_data.claims)
    }
}
