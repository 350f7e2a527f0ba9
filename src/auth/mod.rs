use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::SecurityConfig;

pub mod tokens;

pub use tokens::OneTimeToken;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("token subject is not a user id")]
    WrongTokenKind,

    #[error("hashing failed: {0}")]
    Hashing(String),

    #[error("token generation failed: {0}")]
    TokenGeneration(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id, as a decimal string.
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
    pub iss: String,
    pub aud: String,
    /// Initials of the user, carried on access tokens only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init: Option<String>,
}

impl Claims {
    pub fn user_id(&self) -> Result<i64, AuthError> {
        self.sub.parse().map_err(|_| AuthError::WrongTokenKind)
    }
}

/// Access and refresh token issued together at login.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Credential hashing and bearer token handling.
pub trait AuthProvider: Send + Sync {
    fn hash(&self, secret: &str) -> Result<String, AuthError>;

    fn verify(&self, candidate: &str, digest: &str) -> Result<bool, AuthError>;

    fn issue(&self, kind: TokenKind, user_id: i64, initials: Option<&str>) -> Result<String, AuthError>;

    fn decode(&self, kind: TokenKind, token: &str) -> Result<Claims, AuthError>;

    fn issue_pair(&self, user_id: i64, initials: &str) -> Result<TokenPair, AuthError> {
        Ok(TokenPair {
            access_token: self.issue(TokenKind::Access, user_id, Some(initials))?,
            refresh_token: self.issue(TokenKind::Refresh, user_id, None)?,
        })
    }
}

/// HS256 tokens with separate access and refresh secrets, bcrypt digests.
pub struct JwtAuthProvider {
    security: SecurityConfig,
}

impl JwtAuthProvider {
    pub fn new(security: SecurityConfig) -> Self {
        Self { security }
    }

    fn secret(&self, kind: TokenKind) -> &str {
        match kind {
            TokenKind::Access => &self.security.access_secret,
            TokenKind::Refresh => &self.security.refresh_secret,
        }
    }
}

impl AuthProvider for JwtAuthProvider {
    fn hash(&self, secret: &str) -> Result<String, AuthError> {
        bcrypt::hash(secret, self.security.bcrypt_cost).map_err(|e| AuthError::Hashing(e.to_string()))
    }

    fn verify(&self, candidate: &str, digest: &str) -> Result<bool, AuthError> {
        match bcrypt::verify(candidate, digest) {
            Ok(matches) => Ok(matches),
            // A malformed stored digest can never match.
            Err(bcrypt::BcryptError::InvalidHash(_)) => Ok(false),
            Err(e) => Err(AuthError::Hashing(e.to_string())),
        }
    }

    fn issue(&self, kind: TokenKind, user_id: i64, initials: Option<&str>) -> Result<String, AuthError> {
        let secret = self.secret(kind);
        if secret.is_empty() {
            return Err(AuthError::TokenGeneration("token secret not configured".to_string()));
        }

        let now = Utc::now();
        let claims = match kind {
            TokenKind::Access => Claims {
                sub: user_id.to_string(),
                iat: now.timestamp(),
                exp: (now + Duration::seconds(self.security.access_ttl_secs)).timestamp(),
                nbf: None,
                iss: self.security.issuer.clone(),
                aud: self.security.audience.clone(),
                init: initials.map(str::to_string),
            },
            TokenKind::Refresh => Claims {
                sub: user_id.to_string(),
                iat: now.timestamp(),
                exp: (now + Duration::seconds(self.security.refresh_ttl_secs)).timestamp(),
                nbf: Some((now + Duration::seconds(self.security.refresh_not_before_secs)).timestamp()),
                iss: self.security.issuer.clone(),
                aud: self.security.audience.clone(),
                init: None,
            },
        };

        encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(secret.as_bytes()))
            .map_err(|e| AuthError::TokenGeneration(e.to_string()))
    }

    fn decode(&self, kind: TokenKind, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_nbf = kind == TokenKind::Refresh;
        validation.set_issuer(&[self.security.issuer.as_str()]);
        validation.set_audience(&[self.security.audience.as_str()]);

        let data = decode::<Claims>(token, &DecodingKey::from_secret(self.secret(kind).as_bytes()), &validation)
            .map_err(|e| AuthError::InvalidToken(e.to_string()))?;
        Ok(data.claims)
    }
}

/// Upper-cased first letters of the first and last name.
pub fn initials(first_name: &str, last_name: &str) -> String {
    first_name
        .chars()
        .take(1)
        .chain(last_name.chars().take(1))
        .flat_map(char::to_uppercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    fn provider() -> JwtAuthProvider {
        JwtAuthProvider::new(AppConfig::for_tests().security)
    }

    #[test]
    fn access_token_round_trip_carries_initials() {
        let auth = provider();
        let token = auth.issue(TokenKind::Access, 42, Some("JD")).unwrap();
        let claims = auth.decode(TokenKind::Access, &token).unwrap();
        assert_eq!(claims.user_id().unwrap(), 42);
        assert_eq!(claims.init.as_deref(), Some("JD"));
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn refresh_token_is_not_valid_before_delay() {
        let auth = provider();
        let token = auth.issue(TokenKind::Refresh, 7, None).unwrap();
        assert!(matches!(auth.decode(TokenKind::Refresh, &token), Err(AuthError::InvalidToken(_))));
    }

    #[test]
    fn tokens_are_bound_to_their_secret() {
        let auth = provider();
        let access = auth.issue(TokenKind::Access, 1, Some("AB")).unwrap();
        assert!(auth.decode(TokenKind::Refresh, &access).is_err());
    }

    #[test]
    fn foreign_audience_is_rejected() {
        let mut security = AppConfig::for_tests().security;
        let token = JwtAuthProvider::new(security.clone()).issue(TokenKind::Access, 1, None).unwrap();
        security.audience = "someone-else".to_string();
        assert!(JwtAuthProvider::new(security).decode(TokenKind::Access, &token).is_err());
    }

    #[test]
    fn password_digest_verifies() {
        let auth = provider();
        let digest = auth.hash("0712345678").unwrap();
        assert!(auth.verify("0712345678", &digest).unwrap());
        assert!(!auth.verify("0700000000", &digest).unwrap());
        assert!(!auth.verify("anything", "not-a-digest").unwrap());
    }

    #[test]
    fn initials_from_names() {
        assert_eq!(initials("jane", "doe"), "JD");
        assert_eq!(initials("", "doe"), "D");
    }
}
