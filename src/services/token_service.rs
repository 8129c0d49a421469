//! HS256 bearer tokens.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::auth::TOKEN_TTL_HOURS;
use crate::db::User;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Signing secret is not configured")]
    MissingSecret,

    #[error("Invalid token")]
    Invalid,

    #[error("Token expired")]
    Expired,

    #[error("Failed to sign token: {0}")]
    Signing(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub sub: String,
    pub username: String,
    pub is_admin: bool,
    pub iat: i64,
    pub exp: i64,
}

/// Stateless: a token is valid while its signature checks out and `exp` has
/// not passed. Nothing is stored server-side.
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenService {
    pub fn new(secret: &str) -> Result<Self, TokenError> {
        if secret.is_empty() {
            return Err(TokenError::MissingSecret);
        }

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "iat", "sub"]);

        Ok(Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl: Duration::hours(TOKEN_TTL_HOURS),
        })
    }

    pub fn issue(&self, user: &User) -> Result<String, TokenError> {
        self.issue_at(user, Utc::now())
    }

    pub fn issue_at(&self, user: &User, issued_at: DateTime<Utc>) -> Result<String, TokenError> {
        let claims = Claims {
            sub: user.id.clone(),
            username: user.username.clone(),
            is_admin: user.is_admin,
            iat: issued_at.timestamp(),
            exp: (issued_at + self.ttl).timestamp(),
        };

        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        jsonwebtoken::decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(is_admin: bool) -> User {
        let now = Utc::now();
        User {
            id: "0b6f1c1e-7d0c-4a55-9b0e-1d2f3a4b5c6d".to_string(),
            username: "alice".to_string(),
            email: None,
            password_hash: "$argon2id$placeholder".to_string(),
            is_admin,
            must_change_password: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_issue_and_verify() {
        let tokens = TokenService::new("test-jwt-secret").unwrap();
        let token = tokens.issue(&user(true)).unwrap();

        let claims = tokens.verify(&token).unwrap();
        assert_eq!(claims.sub, "0b6f1c1e-7d0c-4a55-9b0e-1d2f3a4b5c6d");
        assert_eq!(claims.username, "alice");
        assert!(claims.is_admin);
    }

    #[test]
    fn test_expiry_is_exactly_24_hours() {
        let tokens = TokenService::new("test-jwt-secret").unwrap();
        let token = tokens.issue(&user(false)).unwrap();

        let claims = tokens.verify(&token).unwrap();
        assert_eq!(claims.exp - claims.iat, 24 * 60 * 60);
    }

    #[test]
    fn test_wrong_secret_is_invalid() {
        let token = TokenService::new("secret-1")
            .unwrap()
            .issue(&user(false))
            .unwrap();

        let result = TokenService::new("secret-2").unwrap().verify(&token);
        assert!(matches!(result, Err(TokenError::Invalid)));
    }

    #[test]
    fn test_expired_token() {
        let tokens = TokenService::new("test-jwt-secret").unwrap();
        let issued_at = Utc::now() - Duration::hours(TOKEN_TTL_HOURS) - Duration::minutes(1);
        let token = tokens.issue_at(&user(false), issued_at).unwrap();

        assert!(matches!(tokens.verify(&token), Err(TokenError::Expired)));
    }

    #[test]
    fn test_garbage_is_invalid() {
        let tokens = TokenService::new("test-jwt-secret").unwrap();

        for token in ["", "abc", "a.b.c", "Bearer x"] {
            assert!(matches!(tokens.verify(token), Err(TokenError::Invalid)));
        }
    }

    #[test]
    fn test_tampered_payload_is_invalid() {
        let tokens = TokenService::new("test-jwt-secret").unwrap();
        let token = tokens.issue(&user(false)).unwrap();

        let forged = tokens.issue(&user(true)).unwrap();
        let forged_payload = forged.split('.').nth(1).unwrap();
        let mut parts: Vec<&str> = token.split('.').collect();
        parts[1] = forged_payload;
        let tampered = parts.join(".");

        // Same secret signed both, but the signature covers the first payload.
        assert_ne!(tampered, forged);
        assert!(matches!(tokens.verify(&tampered), Err(TokenError::Invalid)));
    }

    #[test]
    fn test_missing_secret_rejected() {
        assert!(matches!(
            TokenService::new(""),
            Err(TokenError::MissingSecret)
        ));
    }
}
