//! Token Verifier (C1): parses and verifies bearer credentials into a
//! [`Principal`], without I/O. Enrichment (team membership lookups, active
//! flag refresh) is a separate, injected step — see `PrincipalStore` in the
//! gateway crate.

use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::Deserialize;

use crate::config::SecurityConfig;
use crate::error::SecurityError;
use crate::identity::{Principal, Role};

/// The decoding key backing the verifier: either a shared HS256 secret or
/// a static RS256 public key. Never fetched over the network.
pub enum KeySource {
    Hmac(DecodingKey),
    Rsa(DecodingKey),
}

impl KeySource {
    pub fn hmac_secret(secret: &str) -> Self {
        KeySource::Hmac(DecodingKey::from_secret(secret.as_bytes()))
    }

    pub fn rsa_pem(public_key_pem: &[u8]) -> Result<Self, SecurityError> {
        DecodingKey::from_rsa_pem(public_key_pem)
            .map(KeySource::Rsa)
            .map_err(|e| SecurityError::ValidationFailed(format!("invalid RSA public key: {e}")))
    }

    fn decoding_key(&self) -> &DecodingKey {
        match self {
            KeySource::Hmac(k) | KeySource::Rsa(k) => k,
        }
    }
}

/// The raw claim shape embedded in gateway tokens.
#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    #[serde(default)]
    name: Option<String>,
    role: Role,
    #[serde(default)]
    team_ids: Vec<String>,
    #[serde(default = "default_active")]
    active: bool,
}

fn default_active() -> bool {
    true
}

/// Verifies a signed token using a shared secret or public key (spec §4.1).
pub struct TokenVerifier {
    key_source: KeySource,
    config: SecurityConfig,
}

impl TokenVerifier {
    pub fn new(key_source: KeySource, config: SecurityConfig) -> Self {
        Self { key_source, config }
    }

    /// Verify a bearer token string and return its [`Principal`].
    ///
    /// Returns `Err` for a malformed token, expired token, or invalid
    /// signature. A missing credential is handled by the caller via
    /// [`TokenVerifier::verify_optional`], which returns the anonymous
    /// principal instead of an error.
    pub fn verify(&self, token: &str) -> Result<Principal, SecurityError> {
        if self.config.allowed_algorithms.is_empty() {
            return Err(SecurityError::ValidationFailed(
                "no allowed JWT algorithms configured".into(),
            ));
        }

        let mut validation = Validation::new(self.config.allowed_algorithms[0]);
        validation.algorithms = self.config.allowed_algorithms.clone();
        validation.validate_exp = true;
        validation.validate_nbf = true;
        if let Some(issuer) = &self.config.issuer {
            validation.set_issuer(&[issuer]);
        }
        if let Some(audience) = &self.config.audience {
            validation.set_audience(&[audience]);
        } else {
            validation.validate_aud = false;
        }

        let token_data = decode::<Claims>(token, self.key_source.decoding_key(), &validation)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => SecurityError::TokenExpired,
                jsonwebtoken::errors::ErrorKind::InvalidIssuer => {
                    SecurityError::ValidationFailed("invalid issuer".into())
                }
                jsonwebtoken::errors::ErrorKind::InvalidAudience => {
                    SecurityError::ValidationFailed("invalid audience".into())
                }
                _ => SecurityError::InvalidToken(e.to_string()),
            })?;

        let claims = token_data.claims;
        Ok(Principal {
            display_name: claims.name.unwrap_or_else(|| claims.sub.clone()),
            user_id: claims.sub,
            role: claims.role,
            team_ids: claims.team_ids,
            active: claims.active,
        })
    }

    /// Verify an optional bearer token: `None` yields the anonymous
    /// principal, per spec §4.1's "missing credential" failure mode.
    pub fn verify_optional(&self, token: Option<&str>) -> Result<Principal, SecurityError> {
        match token {
            Some(token) => self.verify(token),
            None => Ok(Principal::anonymous()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    fn verifier(secret: &str) -> TokenVerifier {
        TokenVerifier::new(KeySource::hmac_secret(secret), SecurityConfig::hs256())
    }

    fn token_with_claims(secret: &str, claims: serde_json::Value) -> String {
        encode(
            &Header::new(jsonwebtoken::Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn valid_claims() -> serde_json::Value {
        let now = 2_000_000_000u64;
        json!({
            "sub": "user-1",
            "name": "Ada",
            "role": "manager",
            "team_ids": ["team-a"],
            "active": true,
            "exp": now + 3600,
            "iat": now,
        })
    }

    #[test]
    fn valid_token_yields_principal() {
        let secret = "test-secret";
        let token = token_with_claims(secret, valid_claims());
        let principal = verifier(secret).verify(&token).unwrap();
        assert_eq!(principal.user_id, "user-1");
        assert_eq!(principal.role, Role::Manager);
        assert_eq!(principal.team_ids, vec!["team-a".to_string()]);
    }

    #[test]
    fn expired_token_is_rejected() {
        let secret = "test-secret";
        let mut claims = valid_claims();
        claims["exp"] = json!(1_000_000_000u64);
        let token = token_with_claims(secret, claims);
        let err = verifier(secret).verify(&token).unwrap_err();
        assert!(matches!(err, SecurityError::TokenExpired));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = token_with_claims("secret-a", valid_claims());
        let err = verifier("secret-b").verify(&token).unwrap_err();
        assert!(matches!(err, SecurityError::InvalidToken(_)));
    }

    #[test]
    fn missing_credential_yields_anonymous_principal() {
        let principal = verifier("test-secret").verify_optional(None).unwrap();
        assert!(principal.is_anonymous());
        assert!(!principal.active);
    }

    #[test]
    fn malformed_token_is_rejected() {
        let err = verifier("test-secret").verify("not-a-jwt").unwrap_err();
        assert!(matches!(err, SecurityError::InvalidToken(_)));
    }
}
