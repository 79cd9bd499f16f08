// src/auth/jwt.rs

use anyhow::{Result, anyhow};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::env;

use crate::error::ApiError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user_id
    pub email: String,
    #[serde(default)]
    pub is_admin: bool,
    pub exp: usize, // expiration timestamp
    pub iat: usize, // issued at timestamp
}

fn get_jwt_secret() -> String {
    env::var("JWT_SECRET")
        .unwrap_or_else(|_| "tubetalk-jwt-secret-change-in-production".to_string())
}

/// Mint a token. The core only verifies; this exists for tooling and tests.
pub fn create_token(user_id: &str, email: &str, is_admin: bool) -> Result<String> {
    let expiration = chrono::Utc::now()
        .checked_add_signed(chrono::Duration::days(30))
        .ok_or_else(|| anyhow!("Failed to calculate expiration"))?
        .timestamp() as usize;

    let issued_at = chrono::Utc::now().timestamp() as usize;

    let claims = Claims {
        sub: user_id.to_string(),
        email: email.to_string(),
        is_admin,
        exp: expiration,
        iat: issued_at,
    };

    let header = Header::default();
    let key = EncodingKey::from_secret(get_jwt_secret().as_bytes());

    encode(&header, &claims, &key).map_err(|e| anyhow!("Failed to create token: {}", e))
}

pub fn verify_token(token: &str) -> Result<Claims, ApiError> {
    let key = DecodingKey::from_secret(get_jwt_secret().as_bytes());
    let validation = Validation::default();

    decode::<Claims>(token, &key, &validation)
        .map(|data| data.claims)
        .map_err(|e| ApiError::Unauthenticated(format!("invalid token: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let token = create_token("user-1", "a@b.c", false).unwrap();
        let claims = verify_token(&token).unwrap();
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.email, "a@b.c");
        assert!(!claims.is_admin);
    }

    #[test]
    fn garbage_token_rejected() {
        let err = verify_token("not-a-token").unwrap_err();
        assert_eq!(err.code(), "UNAUTHENTICATED");
    }
}
