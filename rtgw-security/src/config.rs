use jsonwebtoken::Algorithm;

/// Configuration for the token verifier (C1).
///
/// Supports a shared HS256 secret (the default, driven by `JWT_SECRET`) or
/// a static RS256 public key for deployments that prefer asymmetric
/// verification. No JWKS/OIDC discovery: the verifier never performs I/O.
#[derive(Clone, Debug)]
pub struct SecurityConfig {
    /// Expected issuer in the "iss" claim, if the deployment sets one.
    pub issuer: Option<String>,
    /// Expected audience in the "aud" claim, if the deployment sets one.
    pub audience: Option<String>,
    /// Algorithms accepted. Tokens signed with any other algorithm are rejected.
    pub allowed_algorithms: Vec<Algorithm>,
}

impl SecurityConfig {
    /// Default configuration for HS256 shared-secret verification.
    pub fn hs256() -> Self {
        Self {
            issuer: None,
            audience: None,
            allowed_algorithms: vec![Algorithm::HS256],
        }
    }

    /// Configuration for RS256 static-public-key verification.
    pub fn rs256() -> Self {
        Self {
            issuer: None,
            audience: None,
            allowed_algorithms: vec![Algorithm::RS256],
        }
    }

    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self::hs256()
    }
}
