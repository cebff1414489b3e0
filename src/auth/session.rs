/// Session Manager
///
/// Login, refresh-token rotation, logout and access-payload validation.
/// Holds no state of its own besides the refresh token store.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::auth::claims::{AccessClaims, AccessPayload, RefreshPayload};
use crate::auth::jwt::TokenSigner;
use crate::auth::password::CredentialHasher;
use crate::auth::refresh_token::{
    generate_nonce, token_digest, RefreshTokenRecord, RefreshTokenStore,
};
use crate::configuration::TokenSettings;
use crate::error::{AppError, AuthError, HashError, StorageError};
use crate::principal::{Principal, PrincipalDirectory, PrincipalView};

const REFRESH_REJECTED: &str = "invalid or expired refresh token";

/// A freshly issued access/refresh pair
#[derive(Debug, Clone)]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub tokens: SessionTokens,
    pub principal: PrincipalView,
}

pub struct SessionManager {
    access: Arc<TokenSigner>,
    refresh: Arc<TokenSigner>,
    hasher: CredentialHasher,
    // Verified against when the email is unknown so both login failures cost
    // the same bcrypt work
    decoy_hash: String,
    store: Arc<dyn RefreshTokenStore>,
    directory: Arc<dyn PrincipalDirectory>,
    timeout: Duration,
}

impl SessionManager {
    pub fn new(
        settings: &TokenSettings,
        store: Arc<dyn RefreshTokenStore>,
        directory: Arc<dyn PrincipalDirectory>,
        timeout: Duration,
    ) -> Result<Self, HashError> {
        let hasher = CredentialHasher::new(settings.hash_cost);
        let decoy_hash = hasher.hash(&generate_nonce())?;

        Ok(Self {
            access: Arc::new(TokenSigner::new(
                &settings.access_secret,
                settings.algorithm,
                settings.access_token_expiry,
                &settings.issuer,
            )),
            refresh: Arc::new(TokenSigner::new(
                &settings.refresh_secret,
                settings.algorithm,
                settings.refresh_token_expiry,
                &settings.issuer,
            )),
            hasher,
            decoy_hash,
            store,
            directory,
            timeout,
        })
    }

    /// Signer the access guard verifies against
    pub fn access_signer(&self) -> Arc<TokenSigner> {
        Arc::clone(&self.access)
    }

    pub fn access_token_expiry(&self) -> i64 {
        self.access.ttl_seconds()
    }

    /// Authenticate by email and password and open a new session
    ///
    /// # Errors
    /// - `InvalidCredentials` for an unknown email or a wrong password alike
    /// - storage errors if the directory or store cannot be reached in time
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        device: Option<String>,
    ) -> Result<LoginOutcome, AppError> {
        let principal = match self.bounded(self.directory.find_by_email(email)).await? {
            Some(principal) => principal,
            None => {
                let _ = self.hasher.verify(password, &self.decoy_hash);
                tracing::info!("Login rejected: unknown email");
                return Err(AuthError::InvalidCredentials.into());
            }
        };

        if !self.hasher.verify(password, &principal.password_hash)? {
            tracing::info!(user_id = principal.id, "Login rejected: wrong password");
            return Err(AuthError::InvalidCredentials.into());
        }

        let tokens = self.issue(&principal, device, Utc::now()).await?;

        tracing::info!(user_id = principal.id, "User logged in successfully");

        Ok(LoginOutcome {
            tokens,
            principal: principal.sanitized(),
        })
    }

    /// Exchange a refresh token for a new pair, consuming the old token
    ///
    /// Every failure short of a storage outage is `Unauthorized`; callers
    /// cannot tell an expired token from a forged or replayed one.
    pub async fn refresh(&self, refresh_token: &str) -> Result<SessionTokens, AppError> {
        let now = Utc::now();

        let claims = self
            .refresh
            .verify_at::<RefreshPayload>(refresh_token, now.timestamp())
            .map_err(|e| {
                tracing::info!(error = %e, "Refresh token rejected by codec");
                AuthError::unauthorized(REFRESH_REJECTED)
            })?;
        let user_id = claims.payload.sub;

        let record = match claims.payload.jti {
            Some(record_id) => self
                .bounded(self.store.find_by_id(record_id))
                .await?
                .filter(|record| record.user_id == user_id),
            None => self.bounded(self.store.find_latest_for_user(user_id)).await?,
        };
        let record = record.ok_or_else(|| {
            tracing::warn!(user_id = user_id, "No stored record for refresh token");
            AuthError::unauthorized(REFRESH_REJECTED)
        })?;

        if !self
            .hasher
            .verify(&token_digest(refresh_token), &record.secret_hash)?
        {
            tracing::warn!(
                user_id = user_id,
                record_id = %record.id,
                "Refresh token does not match stored hash"
            );
            return Err(AuthError::unauthorized(REFRESH_REJECTED).into());
        }

        if record.is_expired_at(now) {
            self.bounded(self.store.delete(record.id)).await?;
            tracing::info!(user_id = user_id, record_id = %record.id, "Expired refresh token removed");
            return Err(AuthError::unauthorized(REFRESH_REJECTED).into());
        }

        let principal = match self.bounded(self.directory.find_by_id(user_id)).await? {
            Some(principal) => principal,
            None => {
                self.bounded(self.store.delete(record.id)).await?;
                tracing::warn!(user_id = user_id, "Refresh token owner no longer exists");
                return Err(AuthError::unauthorized(REFRESH_REJECTED).into());
            }
        };

        // Claim the old record before issuing anything; of two concurrent
        // calls presenting the same token exactly one gets `true`.
        let claimed = self
            .bounded(self.store.consume(record.id, &record.secret_hash, now))
            .await?;
        if !claimed {
            tracing::warn!(
                user_id = user_id,
                record_id = %record.id,
                "Refresh token already used"
            );
            return Err(AuthError::unauthorized(REFRESH_REJECTED).into());
        }

        let tokens = self.issue(&principal, record.device.clone(), now).await?;

        tracing::info!(user_id = user_id, record_id = %record.id, "Refresh token rotated");

        Ok(tokens)
    }

    /// Revoke every refresh token of the user, on all devices
    pub async fn logout(&self, user_id: i64) -> Result<(), AppError> {
        let removed = self.bounded(self.store.delete_all_for_user(user_id)).await?;
        tracing::info!(user_id = user_id, removed = removed, "User logged out");
        Ok(())
    }

    /// Reload the principal named by a verified access token.
    ///
    /// Returns `None` when the email now belongs to a different account or to
    /// none at all.
    pub async fn validate_access_payload(
        &self,
        claims: &AccessClaims,
    ) -> Result<Option<Principal>, AppError> {
        let principal = self
            .bounded(self.directory.find_by_email(&claims.payload.email))
            .await?;
        Ok(principal.filter(|p| p.id == claims.payload.sub))
    }

    async fn issue(
        &self,
        principal: &Principal,
        device: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<SessionTokens, AppError> {
        let issued_at = now.timestamp();
        let access_token = self
            .access
            .sign_at(AccessPayload::for_principal(principal), issued_at)?;

        let record_id = Uuid::new_v4();
        let refresh_token = self.refresh.sign_at(
            RefreshPayload {
                sub: principal.id,
                jti: Some(record_id),
                nonce: generate_nonce(),
            },
            issued_at,
        )?;

        let record = RefreshTokenRecord {
            id: record_id,
            user_id: principal.id,
            secret_hash: self.hasher.hash(&token_digest(&refresh_token))?,
            expires_at: now + chrono::Duration::seconds(self.refresh.ttl_seconds()),
            created_at: now,
            device,
        };
        self.bounded(self.store.insert(&record)).await?;

        Ok(SessionTokens {
            access_token,
            refresh_token,
        })
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T, AppError>
    where
        F: Future<Output = Result<T, StorageError>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result.map_err(AppError::from),
            Err(_) => {
                tracing::error!(timeout_ms = self.timeout.as_millis() as u64, "Storage call timed out");
                Err(StorageError::Timeout.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::refresh_token::InMemoryRefreshTokenStore;
    use crate::principal::InMemoryPrincipalDirectory;
    use async_trait::async_trait;
    use jsonwebtoken::Algorithm;

    fn settings() -> TokenSettings {
        TokenSettings {
            access_secret: "session-access-secret-at-least-32-chars".to_string(),
            refresh_secret: "session-refresh-secret-at-least-32-chars".to_string(),
            access_token_expiry: 3600,
            refresh_token_expiry: 604800,
            algorithm: Algorithm::HS256,
            issuer: "test".to_string(),
            hash_cost: 4,
        }
    }

    async fn manager_with_user() -> (SessionManager, Arc<InMemoryRefreshTokenStore>) {
        let directory = Arc::new(InMemoryPrincipalDirectory::new());
        let hash = CredentialHasher::new(4).hash("secret123").unwrap();
        directory
            .upsert(Principal::new(1, "a@x.com", hash).with_branch(9))
            .await;
        let store = Arc::new(InMemoryRefreshTokenStore::new());

        let manager = SessionManager::new(
            &settings(),
            store.clone(),
            directory,
            Duration::from_secs(5),
        )
        .expect("Failed to build session manager");
        (manager, store)
    }

    #[test]
    fn test_unusable_hash_cost_fails_construction() {
        let mut bad = settings();
        bad.hash_cost = 3;

        let result = SessionManager::new(
            &bad,
            Arc::new(InMemoryRefreshTokenStore::new()),
            Arc::new(InMemoryPrincipalDirectory::new()),
            Duration::from_secs(5),
        );

        assert!(matches!(result, Err(HashError::Hashing(_))));
    }

    #[tokio::test]
    async fn test_login_stores_hashed_refresh_token() {
        let (manager, store) = manager_with_user().await;

        let outcome = manager.login("a@x.com", "secret123", None).await.unwrap();
        let record = store.find_latest_for_user(1).await.unwrap().unwrap();

        assert_ne!(record.secret_hash, outcome.tokens.refresh_token);
        assert!(!record.secret_hash.contains(&outcome.tokens.refresh_token));
        assert_eq!(outcome.principal.id, 1);
        assert_eq!(outcome.principal.branch_id, Some(9));
    }

    #[tokio::test]
    async fn test_login_failures_are_indistinguishable() {
        let (manager, _) = manager_with_user().await;

        let unknown = manager.login("b@x.com", "secret123", None).await.unwrap_err();
        let wrong = manager.login("a@x.com", "secret124", None).await.unwrap_err();

        assert!(matches!(unknown, AppError::Auth(AuthError::InvalidCredentials)));
        assert!(matches!(wrong, AppError::Auth(AuthError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_access_token_carries_tenant() {
        let (manager, _) = manager_with_user().await;
        let outcome = manager.login("a@x.com", "secret123", None).await.unwrap();

        let claims: AccessClaims = manager.access_signer().verify(&outcome.tokens.access_token).unwrap();
        assert_eq!(claims.payload.sub, 1);
        assert_eq!(claims.payload.email, "a@x.com");
        assert_eq!(claims.payload.branch_id, Some(9));
    }

    #[tokio::test]
    async fn test_device_tag_survives_rotation() {
        let (manager, store) = manager_with_user().await;
        let outcome = manager
            .login("a@x.com", "secret123", Some("phone".to_string()))
            .await
            .unwrap();

        manager.refresh(&outcome.tokens.refresh_token).await.unwrap();

        let record = store.find_latest_for_user(1).await.unwrap().unwrap();
        assert_eq!(record.device.as_deref(), Some("phone"));
        assert_eq!(store.len().await, 1);
    }

    struct StalledDirectory;

    #[async_trait]
    impl PrincipalDirectory for StalledDirectory {
        async fn find_by_email(&self, _email: &str) -> Result<Option<Principal>, StorageError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(None)
        }

        async fn find_by_id(&self, _id: i64) -> Result<Option<Principal>, StorageError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_slow_directory_times_out() {
        let manager = SessionManager::new(
            &settings(),
            Arc::new(InMemoryRefreshTokenStore::new()),
            Arc::new(StalledDirectory),
            Duration::from_millis(20),
        )
        .expect("Failed to build session manager");

        let err = manager.login("a@x.com", "secret123", None).await.unwrap_err();
        assert!(matches!(err, AppError::Storage(StorageError::Timeout)));
    }
}
