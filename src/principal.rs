//! Principal directory
//!
//! The user store is owned elsewhere; this core only reads principals by
//! email or id.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tokio::sync::RwLock;

use crate::error::StorageError;

/// A user account as stored by the user service
#[derive(Clone, sqlx::FromRow)]
pub struct Principal {
    pub id: i64,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub is_active: bool,
    pub role_id: Option<i64>,
    /// Tenant attribute carried in access tokens
    pub branch_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl fmt::Debug for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Principal")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("branch_id", &self.branch_id)
            .finish_non_exhaustive()
    }
}

impl Principal {
    pub fn new(id: i64, email: impl Into<String>, password_hash: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id,
            email: email.into(),
            password_hash: password_hash.into(),
            first_name: String::new(),
            last_name: String::new(),
            is_active: true,
            role_id: None,
            branch_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_name(mut self, first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        self.first_name = first_name.into();
        self.last_name = last_name.into();
        self
    }

    pub fn with_branch(mut self, branch_id: i64) -> Self {
        self.branch_id = Some(branch_id);
        self
    }

    /// Everything except the password hash
    pub fn sanitized(&self) -> PrincipalView {
        PrincipalView {
            id: self.id,
            email: self.email.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            is_active: self.is_active,
            role_id: self.role_id,
            branch_id: self.branch_id,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Principal as returned to callers
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PrincipalView {
    pub id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub is_active: bool,
    pub role_id: Option<i64>,
    pub branch_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Read access to principals
#[async_trait]
pub trait PrincipalDirectory: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<Principal>, StorageError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<Principal>, StorageError>;
}

const PRINCIPAL_COLUMNS: &str = "id, email, password_hash, first_name, last_name, is_active, \
     role_id, branch_id, created_at, updated_at";

/// `users` table lookups
pub struct PgPrincipalDirectory {
    pool: PgPool,
}

impl PgPrincipalDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PrincipalDirectory for PgPrincipalDirectory {
    async fn find_by_email(&self, email: &str) -> Result<Option<Principal>, StorageError> {
        let query = format!("SELECT {} FROM users WHERE email = $1", PRINCIPAL_COLUMNS);
        let principal = sqlx::query_as::<_, Principal>(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(principal)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Principal>, StorageError> {
        let query = format!("SELECT {} FROM users WHERE id = $1", PRINCIPAL_COLUMNS);
        let principal = sqlx::query_as::<_, Principal>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(principal)
    }
}

/// Principals held in memory, keyed by id
#[derive(Default)]
pub struct InMemoryPrincipalDirectory {
    principals: RwLock<HashMap<i64, Principal>>,
}

impl InMemoryPrincipalDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a principal
    pub async fn upsert(&self, principal: Principal) {
        self.principals.write().await.insert(principal.id, principal);
    }

    pub async fn remove(&self, id: i64) -> Option<Principal> {
        self.principals.write().await.remove(&id)
    }
}

#[async_trait]
impl PrincipalDirectory for InMemoryPrincipalDirectory {
    async fn find_by_email(&self, email: &str) -> Result<Option<Principal>, StorageError> {
        let principals = self.principals.read().await;
        Ok(principals.values().find(|p| p.email == email).cloned())
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Principal>, StorageError> {
        Ok(self.principals.read().await.get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_lookup_by_email_and_id() {
        let directory = InMemoryPrincipalDirectory::new();
        directory
            .upsert(Principal::new(1, "a@x.com", "$2b$04$hash").with_branch(5))
            .await;

        let by_email = directory.find_by_email("a@x.com").await.unwrap().unwrap();
        let by_id = directory.find_by_id(1).await.unwrap().unwrap();

        assert_eq!(by_email.id, 1);
        assert_eq!(by_id.branch_id, Some(5));
        assert!(directory.find_by_email("b@x.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_removed_principal_is_not_found() {
        let directory = InMemoryPrincipalDirectory::new();
        directory.upsert(Principal::new(2, "b@x.com", "hash")).await;
        directory.remove(2).await;

        assert!(directory.find_by_id(2).await.unwrap().is_none());
    }

    #[test]
    fn test_sanitized_view_has_no_hash() {
        let principal = Principal::new(3, "c@x.com", "$2b$04$secret-hash").with_name("Test", "User");
        let json = serde_json::to_string(&principal.sanitized()).unwrap();

        assert!(!json.contains("secret-hash"));
        assert!(json.contains("c@x.com"));
        assert!(!format!("{:?}", principal).contains("secret-hash"));
    }
}
