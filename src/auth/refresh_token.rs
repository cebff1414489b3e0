/// Refresh Token Storage
///
/// Records bind a hashed refresh token to its owner and expiry. The raw
/// token never reaches the store: it is digested with SHA-256 and the digest
/// is bcrypt-hashed, since bcrypt only reads the first 72 bytes of its input
/// and the first 72 bytes of two JWTs are mostly the same header.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::StorageError;

const NONCE_LENGTH: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct RefreshTokenRecord {
    pub id: Uuid,
    pub user_id: i64,
    pub secret_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub device: Option<String>,
}

impl RefreshTokenRecord {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Random component embedded in every refresh token
pub fn generate_nonce() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(NONCE_LENGTH)
        .map(char::from)
        .collect()
}

/// SHA-256 of the full token; this is what gets bcrypt-hashed and compared
pub fn token_digest(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    async fn insert(&self, record: &RefreshTokenRecord) -> Result<(), StorageError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<RefreshTokenRecord>, StorageError>;

    /// Most recently created record of a user
    async fn find_latest_for_user(
        &self,
        user_id: i64,
    ) -> Result<Option<RefreshTokenRecord>, StorageError>;

    /// Returns whether a record was removed
    async fn delete(&self, id: Uuid) -> Result<bool, StorageError>;

    /// Delete the record only if it still exists with this hash and has not
    /// expired, as one atomic step. `false` means another caller got there
    /// first (or the record expired in between).
    async fn consume(
        &self,
        id: Uuid,
        secret_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StorageError>;

    /// Returns the number of records removed
    async fn delete_all_for_user(&self, user_id: i64) -> Result<u64, StorageError>;
}

pub struct PgRefreshTokenStore {
    pool: PgPool,
}

impl PgRefreshTokenStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RefreshTokenStore for PgRefreshTokenStore {
    async fn insert(&self, record: &RefreshTokenRecord) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (id, user_id, secret_hash, expires_at, created_at, device)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(record.id)
        .bind(record.user_id)
        .bind(&record.secret_hash)
        .bind(record.expires_at)
        .bind(record.created_at)
        .bind(&record.device)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<RefreshTokenRecord>, StorageError> {
        let record = sqlx::query_as::<_, RefreshTokenRecord>(
            r#"
            SELECT id, user_id, secret_hash, expires_at, created_at, device
            FROM refresh_tokens
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn find_latest_for_user(
        &self,
        user_id: i64,
    ) -> Result<Option<RefreshTokenRecord>, StorageError> {
        let record = sqlx::query_as::<_, RefreshTokenRecord>(
            r#"
            SELECT id, user_id, secret_hash, expires_at, created_at, device
            FROM refresh_tokens
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn consume(
        &self,
        id: Uuid,
        secret_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        let result = sqlx::query(
            r#"
            DELETE FROM refresh_tokens
            WHERE id = $1 AND secret_hash = $2 AND expires_at > $3
            "#,
        )
        .bind(id)
        .bind(secret_hash)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete_all_for_user(&self, user_id: i64) -> Result<u64, StorageError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

struct Slot {
    seq: u64,
    record: RefreshTokenRecord,
}

#[derive(Default)]
struct Arena {
    slots: HashMap<Uuid, Slot>,
    next_seq: u64,
}

/// Records kept in process memory.
///
/// Every operation runs under one lock, so `consume` is atomic.
#[derive(Default)]
pub struct InMemoryRefreshTokenStore {
    arena: Mutex<Arena>,
}

impl InMemoryRefreshTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.arena.lock().await.slots.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl RefreshTokenStore for InMemoryRefreshTokenStore {
    async fn insert(&self, record: &RefreshTokenRecord) -> Result<(), StorageError> {
        let mut arena = self.arena.lock().await;
        if arena.slots.contains_key(&record.id) {
            return Err(StorageError::Query(format!(
                "duplicate refresh token id {}",
                record.id
            )));
        }
        let seq = arena.next_seq;
        arena.next_seq += 1;
        arena.slots.insert(
            record.id,
            Slot {
                seq,
                record: record.clone(),
            },
        );
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<RefreshTokenRecord>, StorageError> {
        let arena = self.arena.lock().await;
        Ok(arena.slots.get(&id).map(|slot| slot.record.clone()))
    }

    async fn find_latest_for_user(
        &self,
        user_id: i64,
    ) -> Result<Option<RefreshTokenRecord>, StorageError> {
        let arena = self.arena.lock().await;
        Ok(arena
            .slots
            .values()
            .filter(|slot| slot.record.user_id == user_id)
            .max_by_key(|slot| (slot.record.created_at, slot.seq))
            .map(|slot| slot.record.clone()))
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StorageError> {
        Ok(self.arena.lock().await.slots.remove(&id).is_some())
    }

    async fn consume(
        &self,
        id: Uuid,
        secret_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, StorageError> {
        let mut arena = self.arena.lock().await;
        let claimable = arena
            .slots
            .get(&id)
            .map(|slot| slot.record.secret_hash == secret_hash && !slot.record.is_expired_at(now))
            .unwrap_or(false);

        if claimable {
            arena.slots.remove(&id);
        }
        Ok(claimable)
    }

    async fn delete_all_for_user(&self, user_id: i64) -> Result<u64, StorageError> {
        let mut arena = self.arena.lock().await;
        let before = arena.slots.len();
        arena.slots.retain(|_, slot| slot.record.user_id != user_id);
        Ok((before - arena.slots.len()) as u64)
    }
}
