use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::models::{Role, TokenRecord, User};
use crate::auth_token::TokenPurpose;
use crate::pagination::{Page, SearchScope};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("email already registered")]
    DuplicateEmail,

    #[error("database error: {0}")]
    Database(#[from] mongodb::error::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Clone, Default)]
pub struct UserQuery {
    pub search: Option<String>,
    pub scope: SearchScope,
    pub role: Option<Role>,
}

#[derive(Debug, Clone)]
pub struct UserPage {
    pub users: Vec<User>,
    pub total: u64,
}

/// Identity records. Lookups that miss return `Ok(None)`.
#[async_trait]
pub trait UserStore: Send + Sync + 'static {
    async fn create(&self, user: &User) -> StoreResult<()>;
    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn find_by_id(&self, id: &str) -> StoreResult<Option<User>>;
    async fn list(&self, query: &UserQuery, page: &Page) -> StoreResult<UserPage>;
    async fn exists_by_email(&self, email: &str) -> StoreResult<bool>;
    /// Replaces an existing record. Returns `false` when the id is unknown.
    async fn update(&self, user: &User) -> StoreResult<bool>;
    /// Returns whether a record was removed.
    async fn delete(&self, id: &str) -> StoreResult<bool>;
}

/// Server-side records for refresh, reset-password and verify-email credentials.
#[async_trait]
pub trait TokenStore: Send + Sync + 'static {
    async fn create(&self, record: &TokenRecord) -> StoreResult<()>;
    /// Exact match on both the token string and the purpose.
    async fn find(&self, token: &str, purpose: TokenPurpose) -> StoreResult<Option<TokenRecord>>;
    /// Returns `true` only for the caller whose call removed the record.
    async fn delete(&self, id: &str) -> StoreResult<bool>;
    async fn delete_by_user_and_purpose(&self, user_id: &str, purpose: TokenPurpose) -> StoreResult<u64>;
    async fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<u64>;
}
