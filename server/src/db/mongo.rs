use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::TryStreamExt;
use mongodb::{
    bson::{doc, DateTime as BsonDateTime, Document},
    error::{ErrorKind, WriteFailure},
    options::IndexOptions,
    Client, Collection, Database, IndexModel,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::models::{Role, TokenRecord, User};
use super::repository::{StoreError, StoreResult, TokenStore, UserPage, UserQuery, UserStore};
use crate::auth_token::TokenPurpose;
use crate::pagination::{Page, SearchScope, SortDirection};

const DUPLICATE_KEY: i32 = 11000;

#[derive(Clone)]
pub struct MongoDbContext {
    db: Database,
}

impl MongoDbContext {
    pub fn new(client: Client, database_name: &str) -> Self {
        Self {
            db: client.database(database_name),
        }
    }

    pub fn users(&self) -> MongoUserStore {
        MongoUserStore {
            collection: self.db.collection("users"),
        }
    }

    pub fn tokens(&self) -> MongoTokenStore {
        MongoTokenStore {
            collection: self.db.collection("tokens"),
        }
    }

    pub async fn init_indexes(&self) -> StoreResult<()> {
        let email_index = IndexModel::builder()
            .keys(doc! { "email": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();

        self.db
            .collection::<UserDocument>("users")
            .create_index(email_index)
            .await?;

        let token_index = IndexModel::builder()
            .keys(doc! { "token": 1, "purpose": 1 })
            .build();

        self.db
            .collection::<TokenDocument>("tokens")
            .create_index(token_index)
            .await?;

        let owner_index = IndexModel::builder()
            .keys(doc! { "user_id": 1, "purpose": 1 })
            .build();

        self.db
            .collection::<TokenDocument>("tokens")
            .create_index(owner_index)
            .await?;

        log::info!("Database indexes created successfully");
        Ok(())
    }
}

fn to_bson_time(value: DateTime<Utc>) -> BsonDateTime {
    BsonDateTime::from_millis(value.timestamp_millis())
}

fn from_bson_time(value: BsonDateTime) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(value.timestamp_millis()).unwrap_or_default()
}

fn map_write_error(err: mongodb::error::Error) -> StoreError {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error))
            if write_error.code == DUPLICATE_KEY =>
        {
            StoreError::DuplicateEmail
        }
        _ => StoreError::Database(err),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct UserDocument {
    #[serde(rename = "_id")]
    id: String,
    name: String,
    email: String,
    password_hash: String,
    role: Role,
    is_email_verified: bool,
    created_at: BsonDateTime,
    updated_at: BsonDateTime,
}

impl From<&User> for UserDocument {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
            password_hash: user.password_hash.clone(),
            role: user.role,
            is_email_verified: user.is_email_verified,
            created_at: to_bson_time(user.created_at),
            updated_at: to_bson_time(user.updated_at),
        }
    }
}

impl From<UserDocument> for User {
    fn from(document: UserDocument) -> Self {
        Self {
            id: document.id,
            name: document.name,
            email: document.email,
            password_hash: document.password_hash,
            role: document.role,
            is_email_verified: document.is_email_verified,
            created_at: from_bson_time(document.created_at),
            updated_at: from_bson_time(document.updated_at),
        }
    }
}

fn user_filter(query: &UserQuery) -> Document {
    let mut clauses: Vec<Document> = Vec::new();

    if let Some(term) = query.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        let pattern = regex::escape(term);
        let by_name = doc! { "name": { "$regex": pattern.as_str(), "$options": "i" } };
        let by_email = doc! { "email": { "$regex": pattern.as_str(), "$options": "i" } };
        let by_id = Uuid::parse_str(term).ok().map(|_| doc! { "_id": term });

        match query.scope {
            SearchScope::All => {
                let mut any = vec![by_name, by_email];
                any.extend(by_id);
                clauses.push(doc! { "$or": any });
            }
            SearchScope::Name => clauses.push(by_name),
            SearchScope::Email => clauses.push(by_email),
            // A term that is not an id matches nothing.
            SearchScope::Id => clauses.push(by_id.unwrap_or_else(|| doc! { "_id": { "$exists": false } })),
        }
    }

    if let Some(role) = query.role {
        clauses.push(doc! { "role": role.as_str() });
    }

    if clauses.is_empty() {
        Document::new()
    } else {
        doc! { "$and": clauses }
    }
}

#[derive(Clone)]
pub struct MongoUserStore {
    collection: Collection<UserDocument>,
}

#[async_trait]
impl UserStore for MongoUserStore {
    async fn create(&self, user: &User) -> StoreResult<()> {
        self.collection
            .insert_one(UserDocument::from(user))
            .await
            .map_err(map_write_error)?;
        Ok(())
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let document = self.collection.find_one(doc! { "email": email }).await?;
        Ok(document.map(User::from))
    }

    async fn find_by_id(&self, id: &str) -> StoreResult<Option<User>> {
        let document = self.collection.find_one(doc! { "_id": id }).await?;
        Ok(document.map(User::from))
    }

    async fn list(&self, query: &UserQuery, page: &Page) -> StoreResult<UserPage> {
        let filter = user_filter(query);
        let total = self.collection.count_documents(filter.clone()).await?;

        let mut sort = Document::new();
        let direction = match page.sort.direction {
            SortDirection::Asc => 1,
            SortDirection::Desc => -1,
        };
        sort.insert(page.sort.field.column(), direction);

        let mut cursor = self
            .collection
            .find(filter)
            .sort(sort)
            .skip(page.offset())
            .limit(i64::from(page.limit))
            .await?;

        let mut users = Vec::new();
        while let Some(document) = cursor.try_next().await? {
            users.push(User::from(document));
        }

        Ok(UserPage { users, total })
    }

    async fn exists_by_email(&self, email: &str) -> StoreResult<bool> {
        let count = self
            .collection
            .count_documents(doc! { "email": email })
            .await?;
        Ok(count > 0)
    }

    async fn update(&self, user: &User) -> StoreResult<bool> {
        let result = self
            .collection
            .replace_one(doc! { "_id": user.id.as_str() }, UserDocument::from(user))
            .await
            .map_err(map_write_error)?;
        Ok(result.matched_count > 0)
    }

    async fn delete(&self, id: &str) -> StoreResult<bool> {
        let result = self.collection.delete_one(doc! { "_id": id }).await?;
        Ok(result.deleted_count > 0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TokenDocument {
    #[serde(rename = "_id")]
    id: String,
    token: String,
    user_id: String,
    purpose: TokenPurpose,
    expires: BsonDateTime,
    blacklisted: bool,
    created_at: BsonDateTime,
}

impl From<&TokenRecord> for TokenDocument {
    fn from(record: &TokenRecord) -> Self {
        Self {
            id: record.id.clone(),
            token: record.token.clone(),
            user_id: record.user_id.clone(),
            purpose: record.purpose,
            expires: to_bson_time(record.expires),
            blacklisted: record.blacklisted,
            created_at: to_bson_time(record.created_at),
        }
    }
}

impl From<TokenDocument> for TokenRecord {
    fn from(document: TokenDocument) -> Self {
        Self {
            id: document.id,
            token: document.token,
            user_id: document.user_id,
            purpose: document.purpose,
            expires: from_bson_time(document.expires),
            blacklisted: document.blacklisted,
            created_at: from_bson_time(document.created_at),
        }
    }
}

#[derive(Clone)]
pub struct MongoTokenStore {
    collection: Collection<TokenDocument>,
}

#[async_trait]
impl TokenStore for MongoTokenStore {
    async fn create(&self, record: &TokenRecord) -> StoreResult<()> {
        self.collection
            .insert_one(TokenDocument::from(record))
            .await?;
        Ok(())
    }

    async fn find(&self, token: &str, purpose: TokenPurpose) -> StoreResult<Option<TokenRecord>> {
        let document = self
            .collection
            .find_one(doc! { "token": token, "purpose": purpose.as_str() })
            .await?;
        Ok(document.map(TokenRecord::from))
    }

    async fn delete(&self, id: &str) -> StoreResult<bool> {
        let result = self.collection.delete_one(doc! { "_id": id }).await?;
        Ok(result.deleted_count > 0)
    }

    async fn delete_by_user_and_purpose(&self, user_id: &str, purpose: TokenPurpose) -> StoreResult<u64> {
        let result = self
            .collection
            .delete_many(doc! { "user_id": user_id, "purpose": purpose.as_str() })
            .await?;
        Ok(result.deleted_count)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let result = self
            .collection
            .delete_many(doc! { "expires": { "$lte": to_bson_time(now) } })
            .await?;
        Ok(result.deleted_count)
    }
}
