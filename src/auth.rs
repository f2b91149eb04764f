//! Identity & Session Check
//!
//! Stateless bearer-token authentication. Two issuance paths exist: user
//! sessions (signup/signin, 7 days) and admin sessions (static credential
//! pair, 24 hours, `isAdmin` claim asserted). Verification is a pure function
//! of (token, secret); expiry is enforced by `jsonwebtoken`'s validation, not
//! by application code. Every verification failure collapses into the same
//! `Unauthenticated` rejection.

use axum::http::HeaderMap;
use bcrypt::{DEFAULT_COST, hash, verify};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::database::UserRow;
use crate::error::ApiError;

/// Fixed subject for admin sessions; never collides with numeric user ids.
const ADMIN_SUBJECT: &str = "admin-1";

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, rename = "isAdmin")]
    pub is_admin: bool,
    pub exp: i64,
    pub iat: i64,
}

impl Claims {
    /// Numeric user id carried in the subject. Admin tokens have a
    /// non-numeric subject and fail this check by construction.
    pub fn user_id(&self) -> Result<i64, ApiError> {
        self.sub.parse().map_err(|_| ApiError::unauthenticated())
    }
}

pub fn issue_user_token(user: &UserRow, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let claims = Claims {
        sub: user.id.to_string(),
        username: user.username.clone(),
        email: Some(user.email.clone()),
        is_admin: false,
        exp: (now + Duration::days(7)).timestamp(),
        iat: now.timestamp(),
    };
    sign(&claims, secret)
}

pub fn issue_admin_token(username: &str, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let claims = Claims {
        sub: ADMIN_SUBJECT.to_string(),
        username: username.to_string(),
        email: None,
        is_admin: true,
        exp: (now + Duration::hours(24)).timestamp(),
        iat: now.timestamp(),
    };
    sign(&claims, secret)
}

fn sign(claims: &Claims, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(secret.as_ref()),
    )
}

/// Decode and verify a signed claim set. Any failure (bad signature, expired,
/// malformed) is `None`; callers treat this uniformly as rejection.
pub fn verify_token(token: &str, secret: &str) -> Option<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .ok()
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// Resolve the identity behind a request, or reject it.
pub fn authenticate(headers: &HeaderMap, secret: &str) -> Result<Claims, ApiError> {
    bearer_token(headers)
        .and_then(|token| verify_token(token, secret))
        .ok_or_else(ApiError::unauthenticated)
}

/// Like [`authenticate`], but additionally requires the `isAdmin` claim.
pub fn require_admin(headers: &HeaderMap, secret: &str) -> Result<Claims, ApiError> {
    let claims = authenticate(headers, secret)?;
    if !claims.is_admin {
        return Err(ApiError::Unauthorized);
    }
    Ok(claims)
}

pub fn hash_password(password: &str) -> Result<String, bcrypt::BcryptError> {
    hash(password, DEFAULT_COST)
}

pub fn verify_password(password: &str, password_hash: &str) -> bool {
    verify(password, password_hash).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const SECRET: &str = "test-secret";

    fn test_user() -> UserRow {
        UserRow {
            id: 42,
            username: "demo".to_string(),
            email: "demo@devit.com".to_string(),
            password_hash: String::new(),
            full_name: "Demo User".to_string(),
            status: "ACTIVE".to_string(),
            created_at: String::new(),
            updated_at: String::new(),
            last_active: String::new(),
        }
    }

    fn headers_with(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            "authorization",
            HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
        );
        headers
    }

    #[test]
    fn user_token_round_trip() {
        let token = issue_user_token(&test_user(), SECRET).unwrap();
        let claims = verify_token(&token, SECRET).expect("token should verify");
        assert_eq!(claims.user_id().unwrap(), 42);
        assert_eq!(claims.username, "demo");
        assert!(!claims.is_admin);
    }

    #[test]
    fn admin_token_carries_admin_flag() {
        let token = issue_admin_token("admin", SECRET).unwrap();
        let claims = verify_token(&token, SECRET).expect("token should verify");
        assert!(claims.is_admin);
        assert!(claims.user_id().is_err());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = issue_user_token(&test_user(), SECRET).unwrap();
        assert!(verify_token(&token, "other-secret").is_none());
    }

    #[test]
    fn expired_token_is_rejected() {
        let now = Utc::now();
        let claims = Claims {
            sub: "42".to_string(),
            username: "demo".to_string(),
            email: None,
            is_admin: false,
            exp: (now - Duration::hours(1)).timestamp(),
            iat: (now - Duration::hours(2)).timestamp(),
        };
        let token = sign(&claims, SECRET).unwrap();
        assert!(verify_token(&token, SECRET).is_none());
    }

    #[test]
    fn authenticate_requires_bearer_scheme() {
        let token = issue_user_token(&test_user(), SECRET).unwrap();
        assert!(authenticate(&headers_with(&token), SECRET).is_ok());

        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_str(&token).unwrap());
        assert!(authenticate(&headers, SECRET).is_err());

        assert!(authenticate(&HeaderMap::new(), SECRET).is_err());
    }

    #[test]
    fn require_admin_rejects_user_tokens() {
        let token = issue_user_token(&test_user(), SECRET).unwrap();
        let err = require_admin(&headers_with(&token), SECRET).unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized));

        let token = issue_admin_token("admin", SECRET).unwrap();
        assert!(require_admin(&headers_with(&token), SECRET).is_ok());
    }

    #[test]
    fn password_hash_round_trip() {
        let hashed = hash_password("password123").unwrap();
        assert!(verify_password("password123", &hashed));
        assert!(!verify_password("password124", &hashed));
        assert!(!verify_password("password123", "not-a-hash"));
    }
}
