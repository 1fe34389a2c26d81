// src/csrf/store.rs - Token persistence
use async_trait::async_trait;
use sqlx::SqlitePool;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct TokenRecord {
    pub token: String,
    pub issuer_address: String,
    pub issued_at: i64,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("token already exists")]
    DuplicateKey,

    #[error("token store backend error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return StoreError::DuplicateKey;
            }
        }
        StoreError::Backend(err.to_string())
    }
}

/// Keyed storage for issued tokens.
///
/// Every operation is a single atomic statement; callers never hold a lock
/// across operations.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Fails with [`StoreError::DuplicateKey`] if the token already exists.
    async fn insert(&self, record: &TokenRecord) -> Result<(), StoreError>;

    async fn get(&self, token: &str) -> Result<Option<TokenRecord>, StoreError>;

    /// Returns `true` iff a row was removed by this call.
    async fn delete_by_token(&self, token: &str) -> Result<bool, StoreError>;

    async fn count_by_address(&self, address: &str) -> Result<u64, StoreError>;

    /// Inserts `record` only while its address holds fewer than `max_live`
    /// records issued at or after `live_since`. Count and insert are one
    /// atomic step. Returns `false` when the quota is full.
    async fn insert_within_quota(
        &self,
        record: &TokenRecord,
        max_live: u64,
        live_since: i64,
    ) -> Result<bool, StoreError>;

    /// Removes every record issued strictly before `cutoff_millis`.
    async fn delete_older_than(&self, cutoff_millis: i64) -> Result<u64, StoreError>;
}

#[derive(Clone)]
pub struct SqliteTokenStore {
    pool: SqlitePool,
}

impl SqliteTokenStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenStore for SqliteTokenStore {
    async fn insert(&self, record: &TokenRecord) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO csrf_tokens (token, issuer_address, issued_at)
             VALUES (?, ?, ?)",
        )
        .bind(&record.token)
        .bind(&record.issuer_address)
        .bind(record.issued_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, token: &str) -> Result<Option<TokenRecord>, StoreError> {
        let record = sqlx::query_as::<_, TokenRecord>(
            "SELECT token, issuer_address, issued_at FROM csrf_tokens WHERE token = ?",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn delete_by_token(&self, token: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM csrf_tokens WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn count_by_address(&self, address: &str) -> Result<u64, StoreError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM csrf_tokens WHERE issuer_address = ?")
                .bind(address)
                .fetch_one(&self.pool)
                .await?;

        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn insert_within_quota(
        &self,
        record: &TokenRecord,
        max_live: u64,
        live_since: i64,
    ) -> Result<bool, StoreError> {
        // A single write statement holds the database write lock for its
        // whole run, so concurrent issuers cannot both pass the count.
        let result = sqlx::query(
            "INSERT INTO csrf_tokens (token, issuer_address, issued_at)
             SELECT ?, ?, ?
             WHERE (SELECT COUNT(*) FROM csrf_tokens
                    WHERE issuer_address = ? AND issued_at >= ?) < ?",
        )
        .bind(&record.token)
        .bind(&record.issuer_address)
        .bind(record.issued_at)
        .bind(&record.issuer_address)
        .bind(live_since)
        .bind(i64::try_from(max_live).unwrap_or(i64::MAX))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn delete_older_than(&self, cutoff_millis: i64) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM csrf_tokens WHERE issued_at < ?")
            .bind(cutoff_millis)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
pub use memory::MemoryTokenStore;
