//! Account registration, login, and cascading deletion.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::{self, Principal, TokenAuthority};
use crate::common::error::{Result, ShopError};
use crate::domain::*;
use crate::storage::Storage;

const MIN_PASSWORD_LEN: usize = 8;

/// Outcome of account deletion. `credentials_revoked` is false when the
/// local data was removed but the stored credential could not be, in which
/// case the caller reports a partial success instead of failing outright.
#[derive(Debug, Clone, Copy, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountDeletion {
    pub credentials_revoked: bool,
}

#[derive(Clone)]
pub struct UserService {
    storage: Arc<dyn Storage>,
    tokens: Arc<TokenAuthority>,
}

impl UserService {
    pub fn new(storage: Arc<dyn Storage>, tokens: Arc<TokenAuthority>) -> Self {
        Self { storage, tokens }
    }

    /// Register a new customer account and mint its first bearer token.
    pub async fn register(&self, email: &str, password: &str) -> Result<(User, String)> {
        let email = email.trim().to_lowercase();
        if !email.contains('@') {
            return Err(ShopError::InvalidInput("invalid email address".to_string()));
        }
        if password.len() < MIN_PASSWORD_LEN {
            return Err(ShopError::InvalidInput(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        if self.storage.get_user_by_email(&email).await?.is_some() {
            return Err(ShopError::Conflict("email already registered".to_string()));
        }

        let mut user = User {
            id: None,
            email,
            role: Role::Customer,
            created_at: Utc::now(),
        };
        self.storage.create_user(&mut user).await?;
        let user_id = user
            .id
            .ok_or_else(|| ShopError::Internal("user id missing after insert".to_string()))?;

        let salt = auth::generate_salt();
        let credential = Credential {
            user_id,
            password_hash: auth::hash_password(password, &salt),
            password_salt: salt,
        };
        self.storage.upsert_credential(&credential).await?;

        let token = self.tokens.issue(user_id, user.role)?;
        info!("registered user {} with id {}", user.email, user_id);
        Ok((user, token))
    }

    /// Verify credentials and mint a bearer token.
    pub async fn login(&self, email: &str, password: &str) -> Result<(User, String)> {
        let invalid = || ShopError::Unauthorized("invalid credentials".to_string());
        let user = self
            .storage
            .get_user_by_email(email.trim())
            .await?
            .ok_or_else(invalid)?;
        let user_id = user.id.ok_or_else(invalid)?;
        let credential = self
            .storage
            .get_credential(user_id)
            .await?
            .ok_or_else(invalid)?;
        if auth::hash_password(password, &credential.password_salt) != credential.password_hash {
            return Err(invalid());
        }
        let token = self.tokens.issue(user_id, user.role)?;
        Ok((user, token))
    }

    pub async fn get_profile(&self, principal: &Principal) -> Result<User> {
        self.storage
            .get_user_by_id(principal.user_id)
            .await?
            .ok_or_else(|| ShopError::NotFound("user".to_string()))
    }

    pub async fn list_users(
        &self,
        limit: Option<usize>,
        offset: Option<usize>,
    ) -> Result<(Vec<User>, usize)> {
        let users = self.storage.get_all_users(limit, offset).await?;
        let total = self.storage.count_users().await?;
        Ok((users, total))
    }

    /// Delete the calling user's account.
    ///
    /// Addresses are snapshotted onto any referencing orders before removal,
    /// the user's orders are anonymized (kept for bookkeeping, user
    /// reference cleared), and the user row is deleted. Credential
    /// revocation runs last; if it fails the deletion is reported as a
    /// partial success because the local data is already gone.
    pub async fn delete_account(&self, principal: &Principal) -> Result<AccountDeletion> {
        let user = self.get_profile(principal).await?;
        let user_id = principal.user_id;

        for address in self.storage.get_addresses_by_user(user_id).await? {
            let address_id = address
                .id
                .ok_or_else(|| ShopError::Internal("address id missing".to_string()))?;
            self.storage
                .snapshot_order_addresses(address_id, &address.to_snapshot())
                .await?;
            self.storage.delete_address(address_id).await?;
        }

        let anonymized = self.storage.anonymize_orders_for_user(user_id).await?;
        self.storage.delete_user(user_id).await?;
        info!(
            "deleted account {} ({} orders anonymized)",
            user.email, anonymized
        );

        match self.storage.delete_credential(user_id).await {
            Ok(()) => Ok(AccountDeletion {
                credentials_revoked: true,
            }),
            Err(e) => {
                warn!(
                    "account {} deleted but credential revocation failed: {}",
                    user.email, e
                );
                Ok(AccountDeletion {
                    credentials_revoked: false,
                })
            }
        }
    }

    /// Create or promote the bootstrap admin account. Called at startup when
    /// the admin email/password env vars are present.
    pub async fn ensure_admin(&self, email: &str, password: &str) -> Result<Uuid> {
        let email = email.trim().to_lowercase();
        if let Some(mut user) = self.storage.get_user_by_email(&email).await? {
            if user.role != Role::Admin {
                user.role = Role::Admin;
                let user_id = user
                    .id
                    .ok_or_else(|| ShopError::Internal("user id missing".to_string()))?;
                // In-place role promotion: recreate preserves the id.
                self.storage.create_user(&mut user).await?;
                info!("promoted {} to admin", email);
                return Ok(user_id);
            }
            return user
                .id
                .ok_or_else(|| ShopError::Internal("user id missing".to_string()));
        }

        let mut user = User {
            id: None,
            email: email.clone(),
            role: Role::Admin,
            created_at: Utc::now(),
        };
        self.storage.create_user(&mut user).await?;
        let user_id = user
            .id
            .ok_or_else(|| ShopError::Internal("user id missing after insert".to_string()))?;
        let salt = auth::generate_salt();
        self.storage
            .upsert_credential(&Credential {
                user_id,
                password_hash: auth::hash_password(password, &salt),
                password_salt: salt,
            })
            .await?;
        info!("created bootstrap admin {}", email);
        Ok(user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStorage;

    fn service() -> UserService {
        let storage = Arc::new(InMemoryStorage::new());
        let tokens = Arc::new(TokenAuthority::new("test-secret", 3600).unwrap());
        UserService::new(storage, tokens)
    }

    #[tokio::test]
    async fn duplicate_email_rejected() {
        let users = service();
        users
            .register("member@example.com", "longenough")
            .await
            .unwrap();
        let err = users
            .register("member@example.com", "longenough")
            .await
            .unwrap_err();
        assert!(matches!(err, ShopError::Conflict(_)));
    }

    #[tokio::test]
    async fn wrong_password_rejected() {
        let users = service();
        users
            .register("member@example.com", "longenough")
            .await
            .unwrap();
        let err = users
            .login("member@example.com", "not-the-password")
            .await
            .unwrap_err();
        assert!(matches!(err, ShopError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn short_password_rejected() {
        let users = service();
        let err = users.register("member@example.com", "short").await.unwrap_err();
        assert!(matches!(err, ShopError::InvalidInput(_)));
    }
}
