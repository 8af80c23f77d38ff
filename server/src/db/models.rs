use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth_token::TokenPurpose;
use crate::error::Result;

/// Account roles, ordered by privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }

    /// Whether this role carries every capability of `required`.
    pub fn satisfies(&self, required: Role) -> bool {
        *self >= required
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub is_email_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Builds a new account, hashing `password` with the given bcrypt cost.
    pub fn new(name: String, email: String, password: &str, role: Role, cost: u32) -> Result<Self> {
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            name,
            email,
            password_hash: bcrypt::hash(password, cost)?,
            role,
            is_email_verified: false,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn verify_password(&self, password: &str) -> Result<bool> {
        Ok(bcrypt::verify(password, &self.password_hash)?)
    }

    pub fn set_password(&mut self, password: &str, cost: u32) -> Result<()> {
        self.password_hash = bcrypt::hash(password, cost)?;
        self.touch();
        Ok(())
    }

    pub fn mark_email_verified(&mut self) {
        self.is_email_verified = true;
        self.touch();
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Server-side counterpart of every non-access credential.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub token: String,
    pub user_id: String,
    pub purpose: TokenPurpose,
    pub expires: DateTime<Utc>,
    pub blacklisted: bool,
    pub created_at: DateTime<Utc>,
}

impl TokenRecord {
    pub fn new(token: String, user_id: String, purpose: TokenPurpose, expires: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            token,
            user_id,
            purpose,
            expires,
            blacklisted: false,
            created_at: Utc::now(),
        }
    }

    pub fn is_expired(&self, reference: DateTime<Utc>) -> bool {
        reference >= self.expires
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_COST: u32 = 4;

    #[test]
    fn test_user_new() {
        let user = User::new(
            "Test".to_string(),
            "test@example.com".to_string(),
            "password123",
            Role::User,
            TEST_COST,
        )
        .unwrap();
        assert_eq!(user.name, "Test");
        assert_ne!(user.password_hash, "password123");
        assert!(!user.is_email_verified);
        assert!(Uuid::parse_str(&user.id).is_ok());
    }

    #[test]
    fn test_verify_password() {
        let user = User::new(
            "Test".to_string(),
            "test@example.com".to_string(),
            "password123",
            Role::User,
            TEST_COST,
        )
        .unwrap();
        assert!(user.verify_password("password123").unwrap());
        assert!(!user.verify_password("wrongpassword").unwrap());
    }

    #[test]
    fn test_set_password_hashes_once() {
        let mut user = User::new(
            "Test".to_string(),
            "test@example.com".to_string(),
            "password123",
            Role::User,
            TEST_COST,
        )
        .unwrap();
        // A short value that happens to look like anything is still hashed.
        user.set_password("n3wpass!", TEST_COST).unwrap();
        assert!(user.verify_password("n3wpass!").unwrap());
        assert!(!user.verify_password("password123").unwrap());
    }

    #[test]
    fn test_role_ordering() {
        assert!(Role::Admin.satisfies(Role::User));
        assert!(Role::Admin.satisfies(Role::Admin));
        assert!(Role::User.satisfies(Role::User));
        assert!(!Role::User.satisfies(Role::Admin));
    }

    #[test]
    fn test_role_parse() {
        assert_eq!("admin".parse::<Role>(), Ok(Role::Admin));
        assert_eq!(" User ".parse::<Role>(), Ok(Role::User));
        assert!("root".parse::<Role>().is_err());
    }

    #[test]
    fn test_token_record_expiry() {
        let now = Utc::now();
        let record = TokenRecord::new(
            "t".to_string(),
            "u".to_string(),
            TokenPurpose::Refresh,
            now,
        );
        assert!(record.is_expired(now));
        assert!(!record.blacklisted);
    }
}
