use std::sync::Arc;

use crate::auth_token::TokenPurpose;
use crate::db::{Role, StoreError, TokenStore, User, UserQuery, UserStore};
use crate::error::{AppError, Result};
use crate::pagination::PageRequest;

use super::validation::{normalize_email, normalize_name, validate_password};

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
}

/// Fields left as `None` are unchanged.
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UserListing {
    pub users: Vec<User>,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u64,
    pub total_results: u64,
}

/// Admin-facing identity management.
#[derive(Clone)]
pub struct UserService {
    users: Arc<dyn UserStore>,
    tokens: Arc<dyn TokenStore>,
    bcrypt_cost: u32,
}

impl UserService {
    pub fn new(users: Arc<dyn UserStore>, tokens: Arc<dyn TokenStore>, bcrypt_cost: u32) -> Self {
        Self {
            users,
            tokens,
            bcrypt_cost,
        }
    }

    pub async fn create_user(&self, new_user: NewUser) -> Result<User> {
        let name = normalize_name(&new_user.name)?;
        let email = normalize_email(&new_user.email)?;
        validate_password(&new_user.password)?;

        if self.users.exists_by_email(&email).await? {
            return Err(AppError::EmailTaken);
        }

        let user = User::new(name, email, &new_user.password, new_user.role, self.bcrypt_cost)?;
        self.users.create(&user).await.map_err(email_conflict)?;

        log::info!("Created user {} with role {}", user.id, user.role);
        Ok(user)
    }

    pub async fn get_user(&self, id: &str) -> Result<User> {
        self.users
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::not_found("User not found"))
    }

    pub async fn list_users(&self, query: &UserQuery, request: PageRequest) -> Result<UserListing> {
        let page = request.normalize();
        let result = self.users.list(query, &page).await?;

        Ok(UserListing {
            users: result.users,
            page: page.page,
            limit: page.limit,
            total_pages: page.total_pages(result.total),
            total_results: result.total,
        })
    }

    pub async fn update_user(&self, id: &str, patch: UserPatch) -> Result<User> {
        let mut user = self.get_user(id).await?;

        if let Some(name) = patch.name.as_deref() {
            user.name = normalize_name(name)?;
        }

        if let Some(email) = patch.email.as_deref() {
            let email = normalize_email(email)?;
            if email != user.email {
                if self.users.exists_by_email(&email).await? {
                    return Err(AppError::EmailTaken);
                }
                user.email = email;
            }
        }

        if let Some(password) = patch.password.as_deref() {
            validate_password(password)?;
            user.set_password(password, self.bcrypt_cost)?;
        }

        user.touch();
        if !self.users.update(&user).await.map_err(email_conflict)? {
            return Err(AppError::not_found("User not found"));
        }

        log::info!("Updated user {}", user.id);
        Ok(user)
    }

    /// Removes the identity together with every stored credential it owns.
    pub async fn delete_user(&self, id: &str) -> Result<()> {
        if !self.users.delete(id).await? {
            return Err(AppError::not_found("User not found"));
        }

        for purpose in [
            TokenPurpose::Refresh,
            TokenPurpose::ResetPassword,
            TokenPurpose::VerifyEmail,
        ] {
            self.tokens.delete_by_user_and_purpose(id, purpose).await?;
        }

        log::info!("Deleted user {}", id);
        Ok(())
    }
}

fn email_conflict(err: StoreError) -> AppError {
    match err {
        StoreError::DuplicateEmail => AppError::EmailTaken,
        other => AppError::Store(other),
    }
}
