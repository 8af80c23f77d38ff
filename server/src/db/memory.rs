use std::cmp::Ordering;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use uuid::Uuid;

use super::models::{TokenRecord, User};
use super::repository::{StoreError, StoreResult, TokenStore, UserPage, UserQuery, UserStore};
use crate::auth_token::TokenPurpose;
use crate::pagination::{Page, SearchScope, SortDirection, SortField};

/// Process-local identity store.
#[derive(Clone, Default)]
pub struct InMemoryUserStore {
    // user id -> user
    users: Arc<DashMap<String, User>>,
    // email -> user id
    emails: Arc<DashMap<String, String>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }
}

fn matches_query(user: &User, query: &UserQuery) -> bool {
    if let Some(role) = query.role {
        if user.role != role {
            return false;
        }
    }

    let Some(term) = query.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) else {
        return true;
    };

    let needle = term.to_lowercase();
    let id_match = Uuid::parse_str(term).is_ok() && user.id == term;
    let name_match = user.name.to_lowercase().contains(&needle);
    let email_match = user.email.to_lowercase().contains(&needle);

    match query.scope {
        SearchScope::All => name_match || email_match || id_match,
        SearchScope::Name => name_match,
        SearchScope::Email => email_match,
        SearchScope::Id => id_match,
    }
}

fn compare_users(a: &User, b: &User, field: SortField) -> Ordering {
    match field {
        SortField::Id => a.id.cmp(&b.id),
        SortField::Name => a.name.cmp(&b.name),
        SortField::Email => a.email.cmp(&b.email),
        SortField::Role => a.role.as_str().cmp(b.role.as_str()),
        SortField::CreatedAt => a.created_at.cmp(&b.created_at),
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn create(&self, user: &User) -> StoreResult<()> {
        match self.emails.entry(user.email.clone()) {
            Entry::Occupied(_) => Err(StoreError::DuplicateEmail),
            Entry::Vacant(slot) => {
                slot.insert(user.id.clone());
                self.users.insert(user.id.clone(), user.clone());
                Ok(())
            }
        }
    }

    async fn find_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let id = self.emails.get(email).map(|entry| entry.value().clone());
        Ok(id.and_then(|id| self.users.get(&id).map(|u| u.clone())))
    }

    async fn find_by_id(&self, id: &str) -> StoreResult<Option<User>> {
        Ok(self.users.get(id).map(|u| u.clone()))
    }

    async fn list(&self, query: &UserQuery, page: &Page) -> StoreResult<UserPage> {
        let mut users: Vec<User> = self
            .users
            .iter()
            .filter(|entry| matches_query(entry.value(), query))
            .map(|entry| entry.value().clone())
            .collect();

        users.sort_by(|a, b| {
            let ordering = compare_users(a, b, page.sort.field);
            match page.sort.direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        });

        let total = users.len() as u64;
        let users = users
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit as usize)
            .collect();

        Ok(UserPage { users, total })
    }

    async fn exists_by_email(&self, email: &str) -> StoreResult<bool> {
        Ok(self.emails.contains_key(email))
    }

    async fn update(&self, user: &User) -> StoreResult<bool> {
        let Some(previous_email) = self.users.get(&user.id).map(|u| u.email.clone()) else {
            return Ok(false);
        };

        // Same lock order as `create`: email index first, then the user map.
        let email_changed = previous_email != user.email;
        if email_changed {
            match self.emails.entry(user.email.clone()) {
                Entry::Occupied(_) => return Err(StoreError::DuplicateEmail),
                Entry::Vacant(slot) => {
                    slot.insert(user.id.clone());
                }
            }
        }

        match self.users.get_mut(&user.id) {
            Some(mut stored) => *stored = user.clone(),
            None => {
                if email_changed {
                    self.emails.remove_if(&user.email, |_, id| id == &user.id);
                }
                return Ok(false);
            }
        }

        if email_changed {
            self.emails.remove_if(&previous_email, |_, id| id == &user.id);
        }
        Ok(true)
    }

    async fn delete(&self, id: &str) -> StoreResult<bool> {
        match self.users.remove(id) {
            Some((_, user)) => {
                self.emails.remove(&user.email);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// Process-local token record store.
#[derive(Clone, Default)]
pub struct InMemoryTokenStore {
    // record id -> record
    records: Arc<DashMap<String, TokenRecord>>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    pub fn count_for(&self, user_id: &str, purpose: TokenPurpose) -> usize {
        self.records
            .iter()
            .filter(|entry| entry.user_id == user_id && entry.purpose == purpose)
            .count()
    }

    /// Marks every record carrying `token` as blacklisted.
    pub fn blacklist(&self, token: &str) -> usize {
        let mut marked = 0;
        for mut entry in self.records.iter_mut() {
            if entry.token == token {
                entry.blacklisted = true;
                marked += 1;
            }
        }
        marked
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn create(&self, record: &TokenRecord) -> StoreResult<()> {
        self.records.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn find(&self, token: &str, purpose: TokenPurpose) -> StoreResult<Option<TokenRecord>> {
        Ok(self
            .records
            .iter()
            .find(|entry| entry.token == token && entry.purpose == purpose)
            .map(|entry| entry.value().clone()))
    }

    async fn delete(&self, id: &str) -> StoreResult<bool> {
        Ok(self.records.remove(id).is_some())
    }

    async fn delete_by_user_and_purpose(&self, user_id: &str, purpose: TokenPurpose) -> StoreResult<u64> {
        let mut removed = 0;
        self.records.retain(|_, record| {
            if record.user_id == user_id && record.purpose == purpose {
                removed += 1;
                false
            } else {
                true
            }
        });
        Ok(removed)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let mut removed = 0;
        self.records.retain(|_, record| {
            if record.is_expired(now) {
                removed += 1;
                false
            } else {
                true
            }
        });
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::Role;
    use crate::pagination::PageRequest;
    use chrono::Duration;

    fn user(name: &str, email: &str, role: Role) -> User {
        User::new(name.to_string(), email.to_string(), "password1", role, 4).unwrap()
    }

    fn page(sort: &str) -> Page {
        PageRequest {
            page: Some(1),
            limit: Some(100),
            sort: Some(sort.to_string()),
        }
        .normalize()
    }

    #[tokio::test]
    async fn test_create_rejects_duplicate_email() {
        let store = InMemoryUserStore::new();
        store.create(&user("A", "a@example.com", Role::User)).await.unwrap();

        let result = store.create(&user("B", "a@example.com", Role::User)).await;
        assert!(matches!(result, Err(StoreError::DuplicateEmail)));
        assert_eq!(store.user_count(), 1);
    }

    #[tokio::test]
    async fn test_update_moves_email_index() {
        let store = InMemoryUserStore::new();
        let mut alice = user("Alice", "alice@example.com", Role::User);
        store.create(&alice).await.unwrap();

        alice.email = "alice@new.example.com".to_string();
        assert!(store.update(&alice).await.unwrap());

        assert!(!store.exists_by_email("alice@example.com").await.unwrap());
        let found = store.find_by_email("alice@new.example.com").await.unwrap();
        assert_eq!(found.map(|u| u.id), Some(alice.id));
    }

    #[tokio::test]
    async fn test_update_does_not_resurrect_deleted_user() {
        let store = InMemoryUserStore::new();
        let mut alice = user("Alice", "alice@example.com", Role::User);
        store.create(&alice).await.unwrap();
        assert!(store.delete(&alice.id).await.unwrap());

        alice.name = "Alicia".to_string();
        assert!(!store.update(&alice).await.unwrap());
        alice.email = "alicia@example.com".to_string();
        assert!(!store.update(&alice).await.unwrap());

        assert_eq!(store.user_count(), 0);
        assert!(!store.exists_by_email("alicia@example.com").await.unwrap());
    }

    #[tokio::test]
    async fn test_search_scopes() {
        let store = InMemoryUserStore::new();
        let alice = user("Alice Smith", "alice@example.com", Role::User);
        let bob = user("Bob", "bob@smith.org", Role::Admin);
        store.create(&alice).await.unwrap();
        store.create(&bob).await.unwrap();

        let search = |term: &str, scope: SearchScope| UserQuery {
            search: Some(term.to_string()),
            scope,
            role: None,
        };

        let all = store.list(&search("smith", SearchScope::All), &page("name")).await.unwrap();
        assert_eq!(all.total, 2);

        let by_name = store.list(&search("SMITH", SearchScope::Name), &page("name")).await.unwrap();
        assert_eq!(by_name.total, 1);
        assert_eq!(by_name.users[0].id, alice.id);

        let by_email = store.list(&search("smith", SearchScope::Email), &page("name")).await.unwrap();
        assert_eq!(by_email.users[0].id, bob.id);

        let by_id = store.list(&search(&bob.id, SearchScope::Id), &page("name")).await.unwrap();
        assert_eq!(by_id.total, 1);

        let bad_id = store.list(&search("not-a-uuid", SearchScope::Id), &page("name")).await.unwrap();
        assert_eq!(bad_id.total, 0);

        let admins = UserQuery {
            role: Some(Role::Admin),
            ..UserQuery::default()
        };
        let admins = store.list(&admins, &page("name")).await.unwrap();
        assert_eq!(admins.total, 1);
        assert_eq!(admins.users[0].id, bob.id);
    }

    #[tokio::test]
    async fn test_sort_and_paginate() {
        let store = InMemoryUserStore::new();
        for name in ["Carol", "Alice", "Bob"] {
            store
                .create(&user(name, &format!("{}@example.com", name.to_lowercase()), Role::User))
                .await
                .unwrap();
        }

        let asc = store.list(&UserQuery::default(), &page("name:asc")).await.unwrap();
        let names: Vec<_> = asc.users.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, ["Alice", "Bob", "Carol"]);

        let desc = store.list(&UserQuery::default(), &page("name:desc")).await.unwrap();
        assert_eq!(desc.users[0].name, "Carol");

        let second = PageRequest {
            page: Some(2),
            limit: Some(1),
            sort: Some("name:asc".to_string()),
        }
        .normalize();
        let paged = store.list(&UserQuery::default(), &second).await.unwrap();
        assert_eq!(paged.total, 3);
        assert_eq!(paged.users.len(), 1);
        assert_eq!(paged.users[0].name, "Bob");
    }

    #[tokio::test]
    async fn test_token_find_is_purpose_scoped() {
        let store = InMemoryTokenStore::new();
        let expires = Utc::now() + Duration::minutes(5);
        let record = TokenRecord::new("tok".into(), "u1".into(), TokenPurpose::ResetPassword, expires);
        store.create(&record).await.unwrap();

        assert!(store.find("tok", TokenPurpose::ResetPassword).await.unwrap().is_some());
        assert!(store.find("tok", TokenPurpose::Refresh).await.unwrap().is_none());
        assert!(store.find("other", TokenPurpose::ResetPassword).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_token_delete_reports_first_caller_only() {
        let store = InMemoryTokenStore::new();
        let record = TokenRecord::new(
            "tok".into(),
            "u1".into(),
            TokenPurpose::Refresh,
            Utc::now() + Duration::minutes(5),
        );
        store.create(&record).await.unwrap();

        assert!(store.delete(&record.id).await.unwrap());
        assert!(!store.delete(&record.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_by_user_and_purpose() {
        let store = InMemoryTokenStore::new();
        let expires = Utc::now() + Duration::minutes(5);
        for (token, user, purpose) in [
            ("a", "u1", TokenPurpose::ResetPassword),
            ("b", "u1", TokenPurpose::ResetPassword),
            ("c", "u1", TokenPurpose::Refresh),
            ("d", "u2", TokenPurpose::ResetPassword),
        ] {
            store
                .create(&TokenRecord::new(token.into(), user.into(), purpose, expires))
                .await
                .unwrap();
        }

        let removed = store
            .delete_by_user_and_purpose("u1", TokenPurpose::ResetPassword)
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.record_count(), 2);
        assert_eq!(store.count_for("u1", TokenPurpose::Refresh), 1);
        assert_eq!(store.count_for("u2", TokenPurpose::ResetPassword), 1);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let store = InMemoryTokenStore::new();
        let now = Utc::now();
        store
            .create(&TokenRecord::new("old".into(), "u".into(), TokenPurpose::Refresh, now - Duration::seconds(1)))
            .await
            .unwrap();
        store
            .create(&TokenRecord::new("new".into(), "u".into(), TokenPurpose::Refresh, now + Duration::hours(1)))
            .await
            .unwrap();

        assert_eq!(store.purge_expired(now).await.unwrap(), 1);
        assert!(store.find("new", TokenPurpose::Refresh).await.unwrap().is_some());
    }
}
