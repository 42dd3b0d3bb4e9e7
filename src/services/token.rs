// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Signed session tokens (HS256 JWTs).

use crate::error::{AppError, Result};
use crate::models::Session;
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which half of a session a token is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Session,
    Refresh,
}

/// JWT claims structure.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user id)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: usize,
    /// Issued at (Unix timestamp)
    pub iat: usize,
    /// Unique token id, so two tokens minted in the same second differ
    pub jti: String,
    pub kind: TokenKind,
}

/// Mints and checks session credentials.
pub trait TokenSigner: Send + Sync {
    /// Mint a fresh session/refresh pair for `user_id`.
    fn sign(&self, user_id: &str) -> Result<Session>;

    /// Check signature, expiry, kind and subject of `token`.
    fn verify(&self, user_id: &str, token: &str, kind: TokenKind) -> Result<Claims>;
}

/// HMAC-SHA256 JWT signer.
pub struct JwtSigner {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    session_ttl: Duration,
    refresh_ttl: Duration,
}

impl JwtSigner {
    pub fn new(signing_key: &[u8], session_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(signing_key),
            decoding_key: DecodingKey::from_secret(signing_key),
            session_ttl,
            refresh_ttl,
        }
    }

    fn mint(&self, user_id: &str, kind: TokenKind, now: DateTime<Utc>) -> Result<String> {
        let ttl = match kind {
            TokenKind::Session => self.session_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        let iat = now.timestamp().max(0) as usize;

        let claims = Claims {
            sub: user_id.to_string(),
            iat,
            exp: iat + ttl.as_secs() as usize,
            jti: uuid::Uuid::new_v4().to_string(),
            kind,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("JWT creation failed: {}", e)))
    }
}

impl TokenSigner for JwtSigner {
    fn sign(&self, user_id: &str) -> Result<Session> {
        let now = Utc::now();
        Ok(Session {
            token: self.mint(user_id, TokenKind::Session, now)?,
            refresh_token: self.mint(user_id, TokenKind::Refresh, now)?,
            ttl: self.session_ttl.as_secs() as i64,
            issued_at: now,
        })
    }

    fn verify(&self, user_id: &str, token: &str, kind: TokenKind) -> Result<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "sub"]);
        validation.leeway = 0;

        let data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            tracing::debug!(error = %e, "Token validation failed");
            AppError::Unauthorized("invalid or expired token".to_string())
        })?;

        if data.claims.kind != kind {
            return Err(AppError::Unauthorized("wrong token kind".to_string()));
        }
        if data.claims.sub != user_id {
            return Err(AppError::Unauthorized("token belongs to another user".to_string()));
        }

        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> JwtSigner {
        JwtSigner::new(
            b"test_signing_key_32_bytes_long!!",
            Duration::from_secs(3600),
            Duration::from_secs(86400 * 30),
        )
    }

    #[test]
    fn test_sign_and_verify_roundtrip() {
        let signer = signer();
        let session = signer.sign("u1").unwrap();

        let claims = signer
            .verify("u1", &session.token, TokenKind::Session)
            .unwrap();
        assert_eq!(claims.sub, "u1");
        assert!(claims.exp > claims.iat);

        let refresh = signer
            .verify("u1", &session.refresh_token, TokenKind::Refresh)
            .unwrap();
        assert!(refresh.exp >= claims.exp);
    }

    #[test]
    fn test_two_sessions_differ() {
        let signer = signer();
        let a = signer.sign("u1").unwrap();
        let b = signer.sign("u1").unwrap();
        assert_ne!(a.token, b.token);
        assert_ne!(a.refresh_token, b.refresh_token);
    }

    #[test]
    fn test_kind_and_subject_are_enforced() {
        let signer = signer();
        let session = signer.sign("u1").unwrap();

        assert!(signer
            .verify("u1", &session.token, TokenKind::Refresh)
            .is_err());
        assert!(signer
            .verify("u2", &session.refresh_token, TokenKind::Refresh)
            .is_err());
    }

    #[test]
    fn test_foreign_key_is_rejected() {
        let other = JwtSigner::new(
            b"another_signing_key_32_bytes!!!!",
            Duration::from_secs(3600),
            Duration::from_secs(3600),
        );
        let session = other.sign("u1").unwrap();
        assert!(matches!(
            signer().verify("u1", &session.refresh_token, TokenKind::Refresh),
            Err(AppError::Unauthorized(_))
        ));
    }
}
