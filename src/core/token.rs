//! Bearer credentials minted after a successful session.
//!
//! Tokens are HS256 JWTs carrying the subject, issue/expiry times, a unique
//! `jti` and the granted scopes. Only a SHA-256 fingerprint of a token ever
//! reaches the logs.

use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::{thread_rng, Rng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::common::config::TokenConfig;
use crate::common::error::{AuthError, Result};

pub const AUTHENTICATED_SCOPE: &str = "authenticated";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
    pub scope: Vec<String>,
}

/// Immutable once issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    value: String,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    scope: BTreeSet<String>,
}

impl Token {
    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn scope(&self) -> &BTreeSet<String> {
        &self.scope
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn fingerprint(&self) -> String {
        fingerprint(&self.value)
    }
}

/// Short SHA-256 digest of a token value, safe to log.
pub fn fingerprint(value: &str) -> String {
    let digest = format!("{:x}", Sha256::digest(value.as_bytes()));
    digest[..16].to_string()
}

pub struct TokenIssuer {
    secret: Vec<u8>,
    ttl: Duration,
    scopes: Vec<String>,
}

impl TokenIssuer {
    pub fn new(config: &TokenConfig) -> Result<Self> {
        let secret = if config.secret.is_empty() {
            tracing::warn!("No token secret configured - using a random per-process secret");
            generate_secret()
        } else {
            config.secret.as_bytes().to_vec()
        };

        let ttl_secs = i64::try_from(config.ttl_secs)
            .map_err(|_| AuthError::Config(format!("Token TTL too large: {}", config.ttl_secs)))?;

        let mut scopes = config.scopes.clone();
        if !scopes.iter().any(|s| s == AUTHENTICATED_SCOPE) {
            scopes.push(AUTHENTICATED_SCOPE.to_string());
        }

        Ok(Self {
            secret,
            ttl: Duration::seconds(ttl_secs),
            scopes,
        })
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn issue(&self, user_id: &str, now: DateTime<Utc>) -> Result<Token> {
        // JWT timestamps are whole seconds
        let issued_at = Utc
            .timestamp_opt(now.timestamp(), 0)
            .single()
            .ok_or_else(|| AuthError::Other(anyhow::anyhow!("Invalid issue time: {}", now)))?;
        let expires_at = issued_at + self.ttl;

        let claims = Claims {
            sub: user_id.to_string(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::new_v4().to_string(),
            scope: self.scopes.clone(),
        };

        let value = encode(&Header::default(), &claims, &EncodingKey::from_secret(&self.secret))?;

        let token = Token {
            value,
            issued_at,
            expires_at,
            scope: self.scopes.iter().cloned().collect(),
        };

        tracing::info!(
            user_id,
            fingerprint = %token.fingerprint(),
            expires_at = %token.expires_at,
            "Token issued"
        );

        Ok(token)
    }

    /// Verifies signature and expiry against the wall clock.
    pub fn decode(&self, value: &str) -> Result<Claims> {
        let data = decode::<Claims>(
            value,
            &DecodingKey::from_secret(&self.secret),
            &Validation::default(),
        )?;
        Ok(data.claims)
    }
}

fn generate_secret() -> Vec<u8> {
    let mut rng = thread_rng();
    let mut secret = vec![0u8; 32];
    rng.fill(&mut secret[..]);
    secret
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issuer() -> TokenIssuer {
        TokenIssuer::new(&TokenConfig {
            ttl_secs: 600,
            scopes: vec!["authenticated".to_string(), "face:verify".to_string()],
            secret: "test-secret".to_string(),
        })
        .unwrap()
    }

    #[test]
    fn test_issue_sets_expiry_from_ttl() {
        let now = Utc::now();
        let token = issuer().issue("alice", now).unwrap();
        assert_eq!(token.expires_at() - token.issued_at(), Duration::seconds(600));
        assert_eq!(token.issued_at().timestamp(), now.timestamp());
        assert!(token.scope().contains("authenticated"));
    }

    #[test]
    fn test_decode_round_trip_claims() {
        let issuer = issuer();
        let token = issuer.issue("alice", Utc::now()).unwrap();
        let claims = issuer.decode(token.value()).unwrap();
        assert_eq!(claims.sub, "alice");
        assert_eq!(claims.exp - claims.iat, 600);
        assert_eq!(claims.scope, vec!["authenticated", "face:verify"]);
    }

    #[test]
    fn test_foreign_secret_rejected() {
        let token = issuer().issue("alice", Utc::now()).unwrap();
        let other = TokenIssuer::new(&TokenConfig {
            secret: "other-secret".to_string(),
            ..TokenConfig::default()
        })
        .unwrap();
        assert!(other.decode(token.value()).is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let issuer = issuer();
        let long_ago = Utc::now() - Duration::hours(2);
        let token = issuer.issue("alice", long_ago).unwrap();
        assert!(token.is_expired_at(Utc::now()));
        assert!(issuer.decode(token.value()).is_err());
    }

    #[test]
    fn test_unique_tokens() {
        let issuer = issuer();
        let now = Utc::now();
        let a = issuer.issue("alice", now).unwrap();
        let b = issuer.issue("alice", now).unwrap();
        assert_ne!(a.value(), b.value());
    }

    #[test]
    fn test_authenticated_scope_always_present() {
        let issuer = TokenIssuer::new(&TokenConfig {
            scopes: vec!["reports".to_string()],
            secret: "s".to_string(),
            ..TokenConfig::default()
        })
        .unwrap();
        let token = issuer.issue("bob", Utc::now()).unwrap();
        assert!(token.scope().contains(AUTHENTICATED_SCOPE));
    }

    #[test]
    fn test_fingerprint_is_stable_and_short() {
        assert_eq!(fingerprint("abc"), fingerprint("abc"));
        assert_eq!(fingerprint("abc").len(), 16);
        assert_ne!(fingerprint("abc"), fingerprint("abd"));
    }
}
