//! Bearer-token authentication: HMAC-signed JWTs and password hashing.

use std::collections::BTreeMap;

use hmac::{Hmac, Mac};
use jwt::{SignWithKey, VerifyWithKey};
use rand::RngCore;
use sha2::{Digest, Sha256, Sha384};
use uuid::Uuid;

use crate::common::error::{Result, ShopError};
use crate::domain::Role;

/// Name of the environment variable holding the token signing secret.
pub const TOKEN_SECRET_ENV: &str = "GYMSHOP_TOKEN_SECRET";

const DEFAULT_TTL_SECONDS: i64 = 86_400;

/// Request-scoped identity, resolved once at the authentication boundary
/// and passed down into the services.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub user_id: Uuid,
    pub role: Role,
}

impl Principal {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Issues and verifies bearer tokens for the API.
#[derive(Clone)]
pub struct TokenAuthority {
    key: Hmac<Sha384>,
    ttl_seconds: i64,
}

impl TokenAuthority {
    pub fn new(secret: &str, ttl_seconds: i64) -> Result<Self> {
        let key = Hmac::new_from_slice(secret.as_bytes())
            .map_err(|_| ShopError::Auth("invalid token secret".to_string()))?;
        Ok(Self { key, ttl_seconds })
    }

    /// Build from `GYMSHOP_TOKEN_SECRET` with the default one-day TTL.
    pub fn from_env() -> Result<Self> {
        let secret = std::env::var(TOKEN_SECRET_ENV)?;
        Self::new(&secret, DEFAULT_TTL_SECONDS)
    }

    /// Sign a token carrying the user id, role, and issue time.
    pub fn issue(&self, user_id: Uuid, role: Role) -> Result<String> {
        let mut claims: BTreeMap<&str, String> = BTreeMap::new();
        claims.insert("sub", user_id.to_string());
        claims.insert("role", role.as_str().to_string());
        claims.insert("iat", chrono::offset::Utc::now().timestamp().to_string());
        claims
            .sign_with_key(&self.key)
            .map_err(|e| ShopError::Auth(format!("failed to sign token: {e}")))
    }

    /// Verify a bearer token and resolve the request principal.
    pub fn verify(&self, token: &str) -> Result<Principal> {
        let claims: BTreeMap<String, String> = token
            .verify_with_key(&self.key)
            .map_err(|_| ShopError::Unauthorized("invalid bearer token".to_string()))?;
        let issued_at: i64 = claims
            .get("iat")
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| ShopError::Unauthorized("malformed token claims".to_string()))?;
        if chrono::offset::Utc::now().timestamp() > issued_at + self.ttl_seconds {
            return Err(ShopError::Unauthorized("token expired".to_string()));
        }
        let user_id = claims
            .get("sub")
            .and_then(|v| Uuid::parse_str(v).ok())
            .ok_or_else(|| ShopError::Unauthorized("malformed token claims".to_string()))?;
        let role = claims
            .get("role")
            .and_then(|v| Role::parse(v))
            .ok_or_else(|| ShopError::Unauthorized("malformed token claims".to_string()))?;
        Ok(Principal { user_id, role })
    }
}

/// Random per-user salt for password hashing.
pub fn generate_salt() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub fn hash_password(password: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_round_trip() {
        let authority = TokenAuthority::new("test-secret", 3600).unwrap();
        let user_id = Uuid::new_v4();
        let token = authority.issue(user_id, Role::Admin).unwrap();
        let principal = authority.verify(&token).unwrap();
        assert_eq!(principal.user_id, user_id);
        assert_eq!(principal.role, Role::Admin);
    }

    #[test]
    fn expired_token_rejected() {
        // Zero TTL: anything issued in the past is expired.
        let authority = TokenAuthority::new("test-secret", -1).unwrap();
        let token = authority.issue(Uuid::new_v4(), Role::Customer).unwrap();
        assert!(matches!(
            authority.verify(&token),
            Err(ShopError::Unauthorized(_))
        ));
    }

    #[test]
    fn tampered_token_rejected() {
        let authority = TokenAuthority::new("test-secret", 3600).unwrap();
        let other = TokenAuthority::new("other-secret", 3600).unwrap();
        let token = authority.issue(Uuid::new_v4(), Role::Customer).unwrap();
        assert!(other.verify(&token).is_err());
    }

    #[test]
    fn password_hash_depends_on_salt() {
        let a = hash_password("hunter22", "salt-a");
        let b = hash_password("hunter22", "salt-b");
        assert_ne!(a, b);
        assert_eq!(a, hash_password("hunter22", "salt-a"));
    }
}
